//! Toolbar for PaperSmith
//!
//! One row of icon buttons grouped into file, edit, insert, export and view
//! controls. Rendering returns the clicked action; the app applies it.

use crate::markdown::FormatCommand;
use eframe::egui::{self, Color32, Response, RichText, Ui, Vec2};

const TOOLBAR_HEIGHT: f32 = 36.0;
const ICON_BUTTON_SIZE: Vec2 = Vec2::new(30.0, 26.0);

#[derive(Debug, Clone, PartialEq)]
pub enum ToolbarAction {
    New,
    Open,
    Save,
    SaveAs,
    Undo,
    Redo,
    Format(FormatCommand),
    /// Opens the row/column picker
    InsertTable,
    /// Opens a file picker for a local image
    InsertImage,
    /// Run the normalizer on the whole document
    Normalize,
    ExportDocx,
    ExportPdf,
    OpenInBrowser,
    CopyHtml,
    TogglePreview,
    ToggleSyncScroll,
    CycleTheme,
    OpenSettings,
}

/// What the toolbar needs to know to enable and highlight its buttons.
#[derive(Debug, Clone, Copy, Default)]
pub struct ToolbarState {
    pub can_undo: bool,
    pub can_redo: bool,
    pub can_save: bool,
    pub exporting: bool,
    pub preview_visible: bool,
    pub sync_scroll: bool,
    pub is_dark: bool,
}

#[derive(Debug, Clone, Default)]
pub struct Toolbar;

impl Toolbar {
    pub fn new() -> Self {
        Self
    }

    pub fn height(&self) -> f32 {
        TOOLBAR_HEIGHT
    }

    pub fn show(&mut self, ui: &mut Ui, state: ToolbarState) -> Option<ToolbarAction> {
        let mut action: Option<ToolbarAction> = None;
        let is_dark = state.is_dark;

        let separator_color = if is_dark {
            Color32::from_rgb(70, 70, 70)
        } else {
            Color32::from_rgb(210, 210, 210)
        };
        let sep_height = TOOLBAR_HEIGHT - 10.0;

        ui.horizontal(|ui| {
            ui.set_height(TOOLBAR_HEIGHT);
            ui.spacing_mut().item_spacing.x = 2.0;

            // File
            emit(&mut action, icon_button(ui, "📄", "新建 (Ctrl+N)", true, is_dark).clicked(), ToolbarAction::New);
            emit(&mut action, icon_button(ui, "📂", "打开 (Ctrl+O)", true, is_dark).clicked(), ToolbarAction::Open);
            emit(
                &mut action,
                icon_button(ui, "💾", "保存 (Ctrl+S)", state.can_save, is_dark).clicked(),
                ToolbarAction::Save,
            );
            emit(
                &mut action,
                icon_button(ui, "📥", "另存为 Markdown / Word / PDF (Ctrl+Shift+S)", true, is_dark).clicked(),
                ToolbarAction::SaveAs,
            );

            vertical_separator(ui, separator_color, sep_height);

            // Edit
            emit(
                &mut action,
                icon_button(ui, "↩", "撤销 (Ctrl+Z)", state.can_undo, is_dark).clicked(),
                ToolbarAction::Undo,
            );
            emit(
                &mut action,
                icon_button(ui, "↪", "重做 (Ctrl+Y)", state.can_redo, is_dark).clicked(),
                ToolbarAction::Redo,
            );

            vertical_separator(ui, separator_color, sep_height);

            // Format
            for (label, command, bold) in [
                ("B", FormatCommand::Bold, true),
                ("I", FormatCommand::Italic, false),
                ("S", FormatCommand::Strikethrough, false),
            ] {
                let tooltip = command.tooltip();
                emit(
                    &mut action,
                    format_button(ui, label, &tooltip, is_dark, bold).clicked(),
                    ToolbarAction::Format(command),
                );
            }

            egui::ComboBox::from_id_source("heading_dropdown")
                .selected_text(RichText::new("H").size(12.0))
                .width(36.0)
                .show_ui(ui, |ui| {
                    for level in 1..=6u8 {
                        if ui.selectable_label(false, format!("标题 {}", level)).clicked() {
                            action = Some(ToolbarAction::Format(FormatCommand::Heading(level)));
                        }
                    }
                });

            for (label, command) in [
                ("•", FormatCommand::BulletList),
                ("1.", FormatCommand::NumberedList),
                ("☑", FormatCommand::TaskList),
                ("―", FormatCommand::HorizontalRule),
            ] {
                let tooltip = command.tooltip();
                emit(
                    &mut action,
                    format_button(ui, label, &tooltip, is_dark, false).clicked(),
                    ToolbarAction::Format(command),
                );
            }

            vertical_separator(ui, separator_color, sep_height);

            // Insert
            emit(
                &mut action,
                icon_button(ui, "▦", "插入表格", true, is_dark).clicked(),
                ToolbarAction::InsertTable,
            );
            emit(
                &mut action,
                icon_button(ui, "🖼", "插入图片", true, is_dark).clicked(),
                ToolbarAction::InsertImage,
            );
            emit(
                &mut action,
                icon_button(ui, "✨", "智能排版", true, is_dark).clicked(),
                ToolbarAction::Normalize,
            );

            vertical_separator(ui, separator_color, sep_height);

            // Export
            let export_ok = !state.exporting;
            emit(
                &mut action,
                text_button(ui, "Word", "导出 Word (.docx)", export_ok).clicked(),
                ToolbarAction::ExportDocx,
            );
            emit(
                &mut action,
                text_button(ui, "PDF", "导出 PDF (F12)", export_ok).clicked(),
                ToolbarAction::ExportPdf,
            );
            emit(
                &mut action,
                icon_button(ui, "🌐", "在浏览器中预览", true, is_dark).clicked(),
                ToolbarAction::OpenInBrowser,
            );
            emit(
                &mut action,
                icon_button(ui, "📋", "复制为 HTML", true, is_dark).clicked(),
                ToolbarAction::CopyHtml,
            );

            ui.with_layout(egui::Layout::right_to_left(egui::Align::Center), |ui| {
                ui.add_space(6.0);
                emit(
                    &mut action,
                    icon_button(ui, "⚙", "设置 (Ctrl+,)", true, is_dark).clicked(),
                    ToolbarAction::OpenSettings,
                );
                emit(
                    &mut action,
                    icon_button(ui, "🎨", "切换主题", true, is_dark).clicked(),
                    ToolbarAction::CycleTheme,
                );
                emit(
                    &mut action,
                    ui.selectable_label(state.sync_scroll, "⇅")
                        .on_hover_text("同步滚动")
                        .clicked(),
                    ToolbarAction::ToggleSyncScroll,
                );
                emit(
                    &mut action,
                    ui.selectable_label(state.preview_visible, "👁")
                        .on_hover_text("显示预览")
                        .clicked(),
                    ToolbarAction::TogglePreview,
                );
            });
        });

        let rect = ui.min_rect();
        ui.painter().line_segment(
            [egui::pos2(rect.min.x, rect.max.y), egui::pos2(rect.max.x, rect.max.y)],
            egui::Stroke::new(1.0, separator_color),
        );

        action
    }
}

fn emit(action: &mut Option<ToolbarAction>, clicked: bool, clicked_action: ToolbarAction) {
    if clicked {
        *action = Some(clicked_action);
    }
}

fn text_color(enabled: bool, is_dark: bool) -> Color32 {
    match (enabled, is_dark) {
        (true, true) => Color32::from_rgb(220, 220, 220),
        (true, false) => Color32::from_rgb(50, 50, 50),
        (false, true) => Color32::from_rgb(100, 100, 100),
        (false, false) => Color32::from_rgb(160, 160, 160),
    }
}

fn icon_button(ui: &mut Ui, icon: &str, tooltip: &str, enabled: bool, is_dark: bool) -> Response {
    let hover_bg = if is_dark {
        Color32::from_rgb(60, 60, 60)
    } else {
        Color32::from_rgb(220, 220, 220)
    };

    let btn = ui.add_enabled(
        enabled,
        egui::Button::new(RichText::new(" ").size(16.0))
            .frame(false)
            .min_size(ICON_BUTTON_SIZE),
    );

    if btn.hovered() && enabled {
        ui.painter().rect_filled(btn.rect, egui::Rounding::same(3.0), hover_bg);
    }

    // The gear glyph sits above the emoji baseline
    let y_offset = if icon == "⚙" { 2.0 } else { 0.0 };
    ui.painter().text(
        egui::pos2(btn.rect.center().x, btn.rect.center().y + y_offset),
        egui::Align2::CENTER_CENTER,
        icon,
        egui::FontId::proportional(16.0),
        text_color(enabled, is_dark),
    );

    btn.on_hover_text(tooltip)
}

fn format_button(ui: &mut Ui, label: &str, tooltip: &str, is_dark: bool, bold: bool) -> Response {
    let mut text = RichText::new(label).size(13.0).color(text_color(true, is_dark));
    if bold {
        text = text.strong();
    }
    ui.add(egui::Button::new(text).frame(false).min_size(Vec2::new(24.0, 24.0)))
        .on_hover_text(tooltip)
}

fn text_button(ui: &mut Ui, label: &str, tooltip: &str, enabled: bool) -> Response {
    ui.add_enabled(enabled, egui::Button::new(RichText::new(label).size(12.0)))
        .on_hover_text(tooltip)
}

fn vertical_separator(ui: &mut Ui, color: Color32, height: f32) {
    ui.add_space(4.0);
    let (rect, _response) = ui.allocate_exact_size(Vec2::new(1.0, height), egui::Sense::hover());
    ui.painter().line_segment(
        [rect.center_top(), rect.center_bottom()],
        egui::Stroke::new(1.0, color),
    );
    ui.add_space(4.0);
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_toolbar_height() {
        assert_eq!(Toolbar::new().height(), TOOLBAR_HEIGHT);
    }

    #[test]
    fn test_action_equality() {
        assert_eq!(
            ToolbarAction::Format(FormatCommand::Heading(2)),
            ToolbarAction::Format(FormatCommand::Heading(2))
        );
        assert_ne!(ToolbarAction::ExportDocx, ToolbarAction::ExportPdf);
    }

    #[test]
    fn test_disabled_colors_are_dimmer() {
        assert_ne!(text_color(true, true), text_color(false, true));
        assert_ne!(text_color(true, false), text_color(false, false));
    }
}
