//! egui rendering of the preview blocks.
//!
//! The preview is read-only. Each top-level block is drawn in order and its
//! y range is recorded for scroll sync. Code block highlighting is cached on
//! the block, so only blocks touched by the last patch are highlighted again.

use eframe::egui::{
    self, text::LayoutJob, Align, Color32, FontId, Frame, Layout, Margin, RichText, ScrollArea,
    Stroke, Ui, Vec2,
};

use super::render::{MeasuredHeight, PreviewBlock};
use super::sync_scroll::BlockMapping;
use super::PreviewState;
use crate::markdown::syntax::highlight_code;
use crate::markdown::{ListType, MarkdownNode, MarkdownNodeType, TableAlignment};

/// Width of an A4 page in centimetres.
pub const A4_WIDTH_CM: f32 = 21.0;

// ─────────────────────────────────────────────────────────────────────────────
// Colors
// ─────────────────────────────────────────────────────────────────────────────

#[derive(Debug, Clone, Copy)]
pub struct PreviewColors {
    pub background: Color32,
    pub text: Color32,
    pub heading: Color32,
    pub code_bg: Color32,
    pub code_text: Color32,
    pub quote_border: Color32,
    pub quote_text: Color32,
    pub link: Color32,
    pub rule: Color32,
    pub list_marker: Color32,
    pub math: Color32,
}

impl PreviewColors {
    pub fn for_mode(dark_mode: bool) -> Self {
        if dark_mode {
            Self::dark()
        } else {
            Self::light()
        }
    }

    pub fn dark() -> Self {
        Self {
            background: Color32::from_rgb(30, 30, 30),
            text: Color32::from_rgb(220, 220, 220),
            heading: Color32::from_rgb(235, 235, 235),
            code_bg: Color32::from_rgb(45, 45, 45),
            code_text: Color32::from_rgb(200, 200, 150),
            quote_border: Color32::from_rgb(80, 80, 80),
            quote_text: Color32::from_rgb(170, 170, 170),
            link: Color32::from_rgb(100, 180, 255),
            rule: Color32::from_rgb(80, 80, 80),
            list_marker: Color32::from_rgb(150, 150, 150),
            math: Color32::from_rgb(180, 200, 255),
        }
    }

    pub fn light() -> Self {
        Self {
            background: Color32::WHITE,
            text: Color32::from_rgb(36, 41, 46),
            heading: Color32::from_rgb(20, 20, 20),
            code_bg: Color32::from_rgb(246, 248, 250),
            code_text: Color32::from_rgb(80, 80, 80),
            quote_border: Color32::from_rgb(223, 226, 229),
            quote_text: Color32::from_rgb(106, 115, 125),
            link: Color32::from_rgb(3, 102, 214),
            rule: Color32::from_rgb(225, 228, 232),
            list_marker: Color32::from_rgb(100, 100, 100),
            math: Color32::from_rgb(30, 60, 140),
        }
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Widget
// ─────────────────────────────────────────────────────────────────────────────

#[derive(Debug, Clone, Default)]
pub struct PreviewOutput {
    /// Scroll offset after this frame
    pub scroll_offset: f32,
    /// True when the offset moved without being asked to
    pub user_scrolled: bool,
    /// URL of a link clicked this frame
    pub clicked_link: Option<String>,
}

pub struct PreviewView<'a> {
    state: &'a mut PreviewState,
    font_size: f32,
    dark_mode: bool,
    /// Vertical and horizontal page margins in cm
    margins: Option<(f32, f32)>,
    scroll_to: Option<f32>,
}

impl<'a> PreviewView<'a> {
    pub fn new(state: &'a mut PreviewState) -> Self {
        Self {
            state,
            font_size: 15.0,
            dark_mode: false,
            margins: None,
            scroll_to: None,
        }
    }

    pub fn font_size(mut self, size: f32) -> Self {
        self.font_size = size;
        self
    }

    pub fn dark_mode(mut self, dark: bool) -> Self {
        self.dark_mode = dark;
        self
    }

    pub fn page_margins(mut self, margins: Option<(f32, f32)>) -> Self {
        self.margins = margins;
        self
    }

    pub fn scroll_to(mut self, offset: Option<f32>) -> Self {
        self.scroll_to = offset;
        self
    }

    pub fn show(self, ui: &mut Ui) -> PreviewOutput {
        let colors = PreviewColors::for_mode(self.dark_mode);
        let font_size = self.font_size;
        let dark_mode = self.dark_mode;
        let state = self.state;

        let width = ui.available_width();
        let padding = page_padding(width, self.margins);

        let mut scroll = ScrollArea::vertical()
            .id_source("preview_scroll")
            .auto_shrink([false, false]);
        if let Some(offset) = self.scroll_to {
            scroll = scroll.vertical_scroll_offset(offset.max(0.0));
        }

        let mut mappings = Vec::with_capacity(state.blocks.len());
        let mut clicked_link = None;

        let scroll_output = scroll.show(ui, |ui| {
            // Offsets are measured from the scroll content top, padding included
            let content_top = ui.min_rect().top();
            Frame::none()
                .fill(colors.background)
                .inner_margin(padding)
                .show(ui, |ui| {
                    ui.set_width(ui.available_width());

                    if state.blocks.is_empty() {
                        ui.label(
                            RichText::new("预览为空")
                                .color(colors.quote_text)
                                .italics(),
                        );
                    }

                    let layout_width = ui.available_width();
                    let clip = ui.clip_rect();
                    let visible = (clip.top() - content_top, clip.bottom() - content_top);

                    for block in state.blocks.iter_mut() {
                        let top = ui.cursor().top() - content_top;
                        match block.cached_height(layout_width, font_size) {
                            Some(height) if is_off_screen(top, height, visible) => {
                                ui.add_space(height);
                            }
                            _ => {
                                let mut ctx = RenderContext {
                                    colors: &colors,
                                    font_size,
                                    dark_mode,
                                    clicked_link: &mut clicked_link,
                                };
                                render_top_level(ui, block, &mut ctx);
                                block.height = Some(MeasuredHeight {
                                    width: layout_width,
                                    font_size,
                                    height: ui.cursor().top() - content_top - top,
                                });
                            }
                        }
                        let bottom = ui.cursor().top() - content_top;
                        mappings.push(BlockMapping::new(block.lines, (top, bottom), block.kind));
                        ui.add_space(font_size * 0.6);
                    }
                });
        });

        let content_height = scroll_output.content_size.y;
        let line_count = state.source_line_count;
        state
            .sync
            .set_mappings(mappings, line_count, content_height);

        let offset = scroll_output.state.offset.y;
        let user_scrolled = self.scroll_to.is_none()
            && (offset - state.sync.last_preview_offset).abs()
                >= super::sync_scroll::MIN_SCROLL_DELTA;
        state.sync.last_preview_offset = offset;

        PreviewOutput {
            scroll_offset: offset,
            user_scrolled,
            clicked_link,
        }
    }
}

/// Padding that makes the content width look like an A4 page with the
/// given margins.
pub fn page_padding(available_width: f32, margins: Option<(f32, f32)>) -> Margin {
    match margins {
        Some((vertical_cm, horizontal_cm)) => {
            let points_per_cm = available_width / A4_WIDTH_CM;
            Margin::symmetric(horizontal_cm * points_per_cm, vertical_cm * points_per_cm)
        }
        None => Margin::same(12.0),
    }
}

/// True when a block spanning `top..top + height` misses the visible range.
///
/// Such blocks are replaced by empty space of their last measured height.
pub fn is_off_screen(top: f32, height: f32, visible: (f32, f32)) -> bool {
    top + height < visible.0 || top > visible.1
}

// ─────────────────────────────────────────────────────────────────────────────
// Rendering
// ─────────────────────────────────────────────────────────────────────────────

struct RenderContext<'a> {
    colors: &'a PreviewColors,
    font_size: f32,
    dark_mode: bool,
    clicked_link: &'a mut Option<String>,
}

fn render_top_level(ui: &mut Ui, block: &mut PreviewBlock, ctx: &mut RenderContext<'_>) {
    if let MarkdownNodeType::CodeBlock { language, literal } = &block.node.node_type {
        let stale = !matches!(&block.highlighted, Some((dark, _)) if *dark == ctx.dark_mode);
        if stale {
            let code = highlight_code(literal, language, ctx.dark_mode);
            block.highlighted = Some((ctx.dark_mode, code));
        }
        if let Some((_, code)) = &block.highlighted {
            let job = code.to_layout_job(ctx.font_size * 0.9);
            let background = code.background.unwrap_or(ctx.colors.code_bg);
            render_code_frame(ui, job, background);
        }
        return;
    }
    render_node(ui, &block.node, ctx, 0);
}

fn render_node(ui: &mut Ui, node: &MarkdownNode, ctx: &mut RenderContext<'_>, depth: usize) {
    match &node.node_type {
        MarkdownNodeType::Heading { level } => render_heading(ui, node, ctx, *level),
        MarkdownNodeType::Paragraph => render_paragraph(ui, node, ctx),
        MarkdownNodeType::CodeBlock { literal, .. } => {
            let mut job = LayoutJob::default();
            job.append(
                literal.trim_end_matches('\n'),
                0.0,
                egui::TextFormat::simple(
                    FontId::monospace(ctx.font_size * 0.9),
                    ctx.colors.code_text,
                ),
            );
            render_code_frame(ui, job, ctx.colors.code_bg);
        }
        MarkdownNodeType::BlockQuote => render_blockquote(ui, node, ctx, depth),
        MarkdownNodeType::List { list_type, .. } => render_list(ui, node, ctx, depth, *list_type),
        MarkdownNodeType::ThematicBreak => render_rule(ui, ctx.colors),
        MarkdownNodeType::Table { alignments } => render_table(ui, node, ctx, alignments),
        MarkdownNodeType::HtmlBlock(html) => {
            ui.label(
                RichText::new(html.trim_end())
                    .monospace()
                    .color(ctx.colors.quote_text),
            );
        }
        MarkdownNodeType::FootnoteDefinition(name) => {
            ui.horizontal_wrapped(|ui| {
                ui.label(
                    RichText::new(format!("[{}]", name))
                        .size(ctx.font_size * 0.8)
                        .color(ctx.colors.link),
                );
                for child in &node.children {
                    if child.node_type == MarkdownNodeType::Paragraph {
                        render_inline_children(ui, child, ctx, TextStyle::default());
                    }
                }
            });
        }
        MarkdownNodeType::Document | MarkdownNodeType::Other => {
            for child in &node.children {
                render_node(ui, child, ctx, depth);
            }
        }
        _ => {
            let text = node.text_content();
            if !text.is_empty() {
                ui.label(RichText::new(text).color(ctx.colors.text));
            }
        }
    }
}

fn render_code_frame(ui: &mut Ui, job: LayoutJob, background: Color32) {
    Frame::none()
        .fill(background)
        .rounding(4.0)
        .inner_margin(Margin::same(8.0))
        .show(ui, |ui| {
            ui.set_width(ui.available_width());
            ui.label(job);
        });
}

fn render_heading(ui: &mut Ui, node: &MarkdownNode, ctx: &mut RenderContext<'_>, level: u8) {
    let scale = match level {
        1 => 1.8,
        2 => 1.5,
        3 => 1.3,
        4 => 1.15,
        5 => 1.05,
        _ => 1.0,
    };
    ui.add_space(if level <= 2 { 8.0 } else { 4.0 });
    let style = TextStyle {
        bold: true,
        size: Some(ctx.font_size * scale),
        color: Some(ctx.colors.heading),
        ..Default::default()
    };
    ui.horizontal_wrapped(|ui| {
        ui.spacing_mut().item_spacing.x = 0.0;
        for child in &node.children {
            render_inline(ui, child, ctx, style);
        }
    });
    if level <= 2 {
        render_rule(ui, ctx.colors);
    }
}

fn render_paragraph(ui: &mut Ui, node: &MarkdownNode, ctx: &mut RenderContext<'_>) {
    let display_only = node.children.iter().all(|child| match &child.node_type {
        MarkdownNodeType::Math { display, .. } => *display,
        MarkdownNodeType::SoftBreak | MarkdownNodeType::LineBreak => true,
        MarkdownNodeType::Text(t) => t.trim().is_empty(),
        _ => false,
    });

    if display_only {
        for child in &node.children {
            if let MarkdownNodeType::Math { tex, .. } = &child.node_type {
                render_display_math(ui, tex, ctx);
            }
        }
        return;
    }

    render_inline_children(ui, node, ctx, TextStyle::default());
}

fn render_display_math(ui: &mut Ui, tex: &str, ctx: &RenderContext<'_>) {
    ui.with_layout(Layout::top_down(Align::Center), |ui| {
        ui.label(
            RichText::new(tex.trim())
                .font(FontId::monospace(ctx.font_size))
                .italics()
                .color(ctx.colors.math),
        );
    });
}

fn render_inline_children(
    ui: &mut Ui,
    node: &MarkdownNode,
    ctx: &mut RenderContext<'_>,
    style: TextStyle,
) {
    ui.horizontal_wrapped(|ui| {
        ui.spacing_mut().item_spacing.x = 0.0;
        for child in &node.children {
            render_inline(ui, child, ctx, style);
        }
    });
}

#[derive(Debug, Clone, Copy, Default)]
struct TextStyle {
    bold: bool,
    italic: bool,
    strikethrough: bool,
    size: Option<f32>,
    color: Option<Color32>,
}

impl TextStyle {
    fn apply(&self, text: &str, ctx: &RenderContext<'_>) -> RichText {
        let mut rich = RichText::new(text)
            .size(self.size.unwrap_or(ctx.font_size))
            .color(self.color.unwrap_or(ctx.colors.text));
        if self.bold {
            rich = rich.strong();
        }
        if self.italic {
            rich = rich.italics();
        }
        if self.strikethrough {
            rich = rich.strikethrough();
        }
        rich
    }
}

fn render_inline(ui: &mut Ui, node: &MarkdownNode, ctx: &mut RenderContext<'_>, style: TextStyle) {
    match &node.node_type {
        MarkdownNodeType::Text(text) => {
            ui.label(style.apply(text, ctx));
        }
        MarkdownNodeType::Strong => {
            let style = TextStyle { bold: true, ..style };
            for child in &node.children {
                render_inline(ui, child, ctx, style);
            }
        }
        MarkdownNodeType::Emphasis => {
            let style = TextStyle {
                italic: true,
                ..style
            };
            for child in &node.children {
                render_inline(ui, child, ctx, style);
            }
        }
        MarkdownNodeType::Strikethrough => {
            let style = TextStyle {
                strikethrough: true,
                ..style
            };
            for child in &node.children {
                render_inline(ui, child, ctx, style);
            }
        }
        MarkdownNodeType::Code(code) => {
            ui.label(
                RichText::new(code)
                    .font(FontId::monospace(style.size.unwrap_or(ctx.font_size) * 0.9))
                    .color(ctx.colors.code_text)
                    .background_color(ctx.colors.code_bg),
            );
        }
        MarkdownNodeType::Math { tex, display } => {
            if *display {
                ui.end_row();
                render_display_math(ui, tex, ctx);
                ui.end_row();
            } else {
                ui.label(
                    RichText::new(tex)
                        .font(FontId::monospace(style.size.unwrap_or(ctx.font_size)))
                        .italics()
                        .color(ctx.colors.math),
                );
            }
        }
        MarkdownNodeType::Link { url, title } => {
            let text = node.text_content();
            let label = if text.is_empty() { url.as_str() } else { text.as_str() };
            let response = ui.link(style.apply(label, ctx).color(ctx.colors.link));
            let hover = if title.is_empty() { url } else { title };
            if response.on_hover_text(hover).clicked() {
                *ctx.clicked_link = Some(url.clone());
            }
        }
        MarkdownNodeType::Image { url, .. } => {
            let alt = node.text_content();
            let label = format!("[图片: {}]", if alt.is_empty() { url } else { &alt });
            ui.label(RichText::new(label).italics().color(ctx.colors.quote_text))
                .on_hover_text(url);
        }
        MarkdownNodeType::FootnoteReference(name) => {
            ui.label(
                RichText::new(format!("[{}]", name))
                    .size(ctx.font_size * 0.75)
                    .color(ctx.colors.link),
            );
        }
        MarkdownNodeType::SoftBreak => {
            ui.label(style.apply(" ", ctx));
        }
        MarkdownNodeType::LineBreak => {
            ui.end_row();
        }
        MarkdownNodeType::HtmlInline(html) => {
            ui.label(RichText::new(html).monospace().color(ctx.colors.quote_text));
        }
        _ => {
            for child in &node.children {
                render_inline(ui, child, ctx, style);
            }
        }
    }
}

fn render_blockquote(ui: &mut Ui, node: &MarkdownNode, ctx: &mut RenderContext<'_>, depth: usize) {
    let response = ui.horizontal(|ui| {
        ui.add_space(12.0);
        ui.vertical(|ui| {
            let mut quote_colors = *ctx.colors;
            quote_colors.text = ctx.colors.quote_text;
            let mut inner = RenderContext {
                colors: &quote_colors,
                font_size: ctx.font_size,
                dark_mode: ctx.dark_mode,
                clicked_link: &mut *ctx.clicked_link,
            };
            for child in &node.children {
                render_node(ui, child, &mut inner, depth + 1);
            }
        });
    });
    let rect = response.response.rect;
    let bar = egui::Rect::from_min_size(rect.min, Vec2::new(4.0, rect.height()));
    ui.painter().rect_filled(bar, 0.0, ctx.colors.quote_border);
}

fn render_list(
    ui: &mut Ui,
    node: &MarkdownNode,
    ctx: &mut RenderContext<'_>,
    depth: usize,
    list_type: ListType,
) {
    let mut number = match list_type {
        ListType::Ordered { start, .. } => start,
        ListType::Bullet => 0,
    };

    for item in &node.children {
        let checked = match item.node_type {
            MarkdownNodeType::TaskItem { checked } => Some(checked),
            MarkdownNodeType::Item => None,
            _ => continue,
        };

        ui.horizontal(|ui| {
            ui.add_space(8.0 + depth as f32 * 4.0);
            match (checked, list_type) {
                (Some(mut checked), _) => {
                    ui.add_enabled(false, egui::Checkbox::without_text(&mut checked));
                }
                (None, ListType::Bullet) => {
                    let bullet = if depth % 2 == 0 { "•" } else { "◦" };
                    ui.label(RichText::new(bullet).color(ctx.colors.list_marker));
                }
                (None, ListType::Ordered { delimiter, .. }) => {
                    ui.label(
                        RichText::new(format!("{}{}", number, delimiter))
                            .color(ctx.colors.list_marker),
                    );
                }
            }
            ui.vertical(|ui| {
                for child in &item.children {
                    render_node(ui, child, ctx, depth + 1);
                }
            });
        });
        number += 1;
    }
}

fn render_rule(ui: &mut Ui, colors: &PreviewColors) {
    ui.add_space(4.0);
    let (rect, _) =
        ui.allocate_exact_size(Vec2::new(ui.available_width(), 1.0), egui::Sense::hover());
    ui.painter().rect_filled(rect, 0.0, colors.rule);
    ui.add_space(4.0);
}

fn render_table(
    ui: &mut Ui,
    node: &MarkdownNode,
    ctx: &mut RenderContext<'_>,
    alignments: &[TableAlignment],
) {
    let id = ui.id().with(("preview_table", node.start_line));
    Frame::none()
        .stroke(Stroke::new(1.0, ctx.colors.quote_border))
        .inner_margin(Margin::same(4.0))
        .show(ui, |ui| {
            egui::Grid::new(id)
                .striped(true)
                .spacing([16.0, 6.0])
                .show(ui, |ui| {
                    for row in &node.children {
                        let header =
                            matches!(row.node_type, MarkdownNodeType::TableRow { header: true });
                        for (column, cell) in row.children.iter().enumerate() {
                            let align = match alignments.get(column) {
                                Some(TableAlignment::Center) => Align::Center,
                                Some(TableAlignment::Right) => Align::Max,
                                _ => Align::Min,
                            };
                            let style = TextStyle {
                                bold: header,
                                ..Default::default()
                            };
                            let layout = Layout::left_to_right(Align::Center).with_main_align(align);
                            ui.with_layout(layout, |ui| {
                                ui.spacing_mut().item_spacing.x = 0.0;
                                for child in &cell.children {
                                    render_inline(ui, child, ctx, style);
                                }
                            });
                        }
                        ui.end_row();
                    }
                });
        });
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_page_padding_scales_to_a4() {
        let padding = page_padding(420.0, Some((2.0, 3.0)));
        // 420 points across 21 cm is 20 points per cm
        assert_eq!(padding.left, 60.0);
        assert_eq!(padding.right, 60.0);
        assert_eq!(padding.top, 40.0);
        assert_eq!(padding.bottom, 40.0);
    }

    #[test]
    fn test_off_screen_blocks() {
        let visible = (500.0, 900.0);
        assert!(is_off_screen(0.0, 100.0, visible));
        assert!(is_off_screen(950.0, 40.0, visible));
        // Partly visible blocks are drawn
        assert!(!is_off_screen(450.0, 100.0, visible));
        assert!(!is_off_screen(880.0, 100.0, visible));
        assert!(!is_off_screen(600.0, 10.0, visible));
    }

    #[test]
    fn test_page_padding_without_margins() {
        let padding = page_padding(420.0, None);
        assert_eq!(padding.left, 12.0);
        assert_eq!(padding.top, 12.0);
    }

    #[test]
    fn test_colors_differ_by_mode() {
        assert_ne!(PreviewColors::dark().background, PreviewColors::light().background);
        assert_eq!(PreviewColors::for_mode(true).text, PreviewColors::dark().text);
    }
}
