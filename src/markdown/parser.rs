//! comrak parsing into an owned block tree, with math spans as real nodes.
//!
//! The preview needs two things from one parse: a tree it can draw with egui
//! and the HTML of each top-level block for export and the browser view. Both
//! come out of [`parse_blocks`]. Math is protected before comrak sees the text
//! and comes back as [`MarkdownNodeType::Math`] nodes or renderer markup.

use comrak::{
    format_html,
    nodes::{
        AstNode, ListDelimType, ListType as ComrakListType, NodeValue,
        TableAlignment as ComrakTableAlignment,
    },
    parse_document, Arena, Options,
};

use crate::markdown::math::{self, MathRenderer, MathSegment, ProtectedMath};

// ─────────────────────────────────────────────────────────────────────────────
// Options
// ─────────────────────────────────────────────────────────────────────────────

#[derive(Debug, Clone)]
pub struct MarkdownOptions {
    pub tables: bool,
    pub strikethrough: bool,
    pub autolink: bool,
    pub tasklist: bool,
    pub footnotes: bool,
    /// Pass raw HTML through to the output
    pub allow_html: bool,
}

impl Default for MarkdownOptions {
    fn default() -> Self {
        Self {
            tables: true,
            strikethrough: true,
            autolink: true,
            tasklist: true,
            footnotes: true,
            allow_html: true,
        }
    }
}

impl MarkdownOptions {
    fn to_comrak_options(&self) -> Options {
        let mut options = Options::default();
        options.extension.strikethrough = self.strikethrough;
        options.extension.table = self.tables;
        options.extension.autolink = self.autolink;
        options.extension.tasklist = self.tasklist;
        options.extension.footnotes = self.footnotes;
        options.render.unsafe_ = self.allow_html;
        options
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Tree
// ─────────────────────────────────────────────────────────────────────────────

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ListType {
    Bullet,
    Ordered { start: u32, delimiter: char },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum TableAlignment {
    #[default]
    None,
    Left,
    Center,
    Right,
}

impl From<ComrakTableAlignment> for TableAlignment {
    fn from(align: ComrakTableAlignment) -> Self {
        match align {
            ComrakTableAlignment::None => TableAlignment::None,
            ComrakTableAlignment::Left => TableAlignment::Left,
            ComrakTableAlignment::Center => TableAlignment::Center,
            ComrakTableAlignment::Right => TableAlignment::Right,
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum MarkdownNodeType {
    Document,
    BlockQuote,
    List { list_type: ListType, tight: bool },
    Item,
    /// List item with a GFM checkbox
    TaskItem { checked: bool },
    CodeBlock { language: String, literal: String },
    HtmlBlock(String),
    Paragraph,
    Heading { level: u8 },
    ThematicBreak,
    Table { alignments: Vec<TableAlignment> },
    TableRow { header: bool },
    TableCell,
    Text(String),
    /// TeX formula, delimiters stripped
    Math { tex: String, display: bool },
    SoftBreak,
    LineBreak,
    Code(String),
    HtmlInline(String),
    Emphasis,
    Strong,
    Strikethrough,
    Link { url: String, title: String },
    Image { url: String, title: String },
    FootnoteReference(String),
    FootnoteDefinition(String),
    /// Anything this tree does not model; children are kept
    Other,
}

/// A node with its source line range (1-based, inclusive, in the original text).
#[derive(Debug, Clone, PartialEq)]
pub struct MarkdownNode {
    pub node_type: MarkdownNodeType,
    pub children: Vec<MarkdownNode>,
    pub start_line: usize,
    pub end_line: usize,
}

impl MarkdownNode {
    fn new(node_type: MarkdownNodeType, start_line: usize, end_line: usize) -> Self {
        Self {
            node_type,
            children: Vec::new(),
            start_line,
            end_line,
        }
    }

    /// Plain text of this node and its descendants.
    pub fn text_content(&self) -> String {
        let mut text = String::new();
        self.collect_text(&mut text);
        text
    }

    fn collect_text(&self, output: &mut String) {
        match &self.node_type {
            MarkdownNodeType::Text(t) | MarkdownNodeType::Code(t) => output.push_str(t),
            MarkdownNodeType::Math { tex, .. } => output.push_str(tex),
            MarkdownNodeType::SoftBreak => output.push(' '),
            MarkdownNodeType::LineBreak => output.push('\n'),
            _ => {}
        }
        for child in &self.children {
            child.collect_text(output);
        }
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Parsing
// ─────────────────────────────────────────────────────────────────────────────

/// One top-level block: its tree and its HTML.
#[derive(Debug, Clone)]
pub struct ParsedBlock {
    pub node: MarkdownNode,
    pub html: String,
}

#[derive(Debug, Clone, Default)]
pub struct ParsedDocument {
    pub blocks: Vec<ParsedBlock>,
}

impl ParsedDocument {
    pub fn html(&self) -> String {
        self.blocks.iter().map(|b| b.html.as_str()).collect()
    }
}

/// Parse into top-level blocks. Never fails: comrak accepts any input.
pub fn parse_blocks(
    markdown: &str,
    options: &MarkdownOptions,
    renderer: &dyn MathRenderer,
) -> ParsedDocument {
    let protected = math::protect(markdown);
    let comrak_options = options.to_comrak_options();
    let arena = Arena::new();
    let root = parse_document(&arena, &protected.text, &comrak_options);

    let blocks = root
        .children()
        .map(|child| {
            let mut buffer = Vec::new();
            let html = match format_html(child, &comrak_options, &mut buffer) {
                Ok(()) => String::from_utf8_lossy(&buffer).into_owned(),
                Err(err) => {
                    log::warn!("Failed to render block as HTML: {}", err);
                    String::new()
                }
            };
            ParsedBlock {
                node: convert_block(child, &protected),
                html: math::restore_html(&html, &protected.spans, renderer),
            }
        })
        .collect();

    ParsedDocument { blocks }
}

/// Full HTML body for `markdown`.
pub fn render_html(markdown: &str, renderer: &dyn MathRenderer) -> String {
    parse_blocks(markdown, &MarkdownOptions::default(), renderer).html()
}

// ─────────────────────────────────────────────────────────────────────────────
// Conversion
// ─────────────────────────────────────────────────────────────────────────────

fn convert_block<'a>(node: &'a AstNode<'a>, protected: &ProtectedMath) -> MarkdownNode {
    let ast = node.data.borrow();
    let start_line = protected.original_line(ast.sourcepos.start.line.max(1));
    let end_line = protected
        .original_end_line(ast.sourcepos.end.line.max(1))
        .max(start_line);

    let mut converted = MarkdownNode::new(convert_value(&ast.value), start_line, end_line);
    drop(ast);

    for child in node.children() {
        let is_text = matches!(child.data.borrow().value, NodeValue::Text(_));
        if is_text {
            push_text_with_math(&mut converted.children, child, protected);
        } else {
            converted.children.push(convert_block(child, protected));
        }
    }
    converted
}

/// Text nodes may carry math placeholders; split them into Text and Math nodes.
fn push_text_with_math<'a>(
    out: &mut Vec<MarkdownNode>,
    node: &'a AstNode<'a>,
    protected: &ProtectedMath,
) {
    let ast = node.data.borrow();
    let NodeValue::Text(text) = &ast.value else {
        return;
    };
    let line = protected.original_line(ast.sourcepos.start.line.max(1));

    for segment in math::split_placeholders(text) {
        let node_type = match segment {
            MathSegment::Text(t) => MarkdownNodeType::Text(t.to_string()),
            MathSegment::Math(index) => match protected.span(index) {
                Some(span) => MarkdownNodeType::Math {
                    tex: span.tex.clone(),
                    display: span.display,
                },
                None => continue,
            },
        };
        out.push(MarkdownNode::new(node_type, line, line));
    }
}

fn convert_value(value: &NodeValue) -> MarkdownNodeType {
    match value {
        NodeValue::Document => MarkdownNodeType::Document,
        NodeValue::BlockQuote => MarkdownNodeType::BlockQuote,
        NodeValue::List(list) => {
            let list_type = match list.list_type {
                ComrakListType::Bullet => ListType::Bullet,
                ComrakListType::Ordered => ListType::Ordered {
                    start: list.start as u32,
                    delimiter: if list.delimiter == ListDelimType::Period {
                        '.'
                    } else {
                        ')'
                    },
                },
            };
            MarkdownNodeType::List {
                list_type,
                tight: list.tight,
            }
        }
        NodeValue::Item(_) => MarkdownNodeType::Item,
        NodeValue::TaskItem(checked) => MarkdownNodeType::TaskItem {
            checked: checked.map(|c| c == 'x' || c == 'X').unwrap_or(false),
        },
        NodeValue::CodeBlock(code) => MarkdownNodeType::CodeBlock {
            language: code
                .info
                .split_whitespace()
                .next()
                .unwrap_or_default()
                .to_string(),
            literal: code.literal.clone(),
        },
        NodeValue::HtmlBlock(html) => MarkdownNodeType::HtmlBlock(html.literal.clone()),
        NodeValue::Paragraph => MarkdownNodeType::Paragraph,
        NodeValue::Heading(heading) => MarkdownNodeType::Heading {
            level: heading.level.clamp(1, 6),
        },
        NodeValue::ThematicBreak => MarkdownNodeType::ThematicBreak,
        NodeValue::Table(table) => MarkdownNodeType::Table {
            alignments: table
                .alignments
                .iter()
                .map(|a| TableAlignment::from(*a))
                .collect(),
        },
        NodeValue::TableRow(header) => MarkdownNodeType::TableRow { header: *header },
        NodeValue::TableCell => MarkdownNodeType::TableCell,
        NodeValue::Text(text) => MarkdownNodeType::Text(text.clone()),
        NodeValue::SoftBreak => MarkdownNodeType::SoftBreak,
        NodeValue::LineBreak => MarkdownNodeType::LineBreak,
        NodeValue::Code(code) => MarkdownNodeType::Code(code.literal.clone()),
        NodeValue::HtmlInline(html) => MarkdownNodeType::HtmlInline(html.clone()),
        NodeValue::Emph => MarkdownNodeType::Emphasis,
        NodeValue::Strong => MarkdownNodeType::Strong,
        NodeValue::Strikethrough => MarkdownNodeType::Strikethrough,
        NodeValue::Link(link) => MarkdownNodeType::Link {
            url: link.url.clone(),
            title: link.title.clone(),
        },
        NodeValue::Image(image) => MarkdownNodeType::Image {
            url: image.url.clone(),
            title: image.title.clone(),
        },
        NodeValue::FootnoteReference(reference) => {
            MarkdownNodeType::FootnoteReference(reference.name.clone())
        }
        NodeValue::FootnoteDefinition(def) => {
            MarkdownNodeType::FootnoteDefinition(def.name.clone())
        }
        _ => MarkdownNodeType::Other,
    }
}
