//! Preview blocks: one per top-level Markdown block, keyed by content.

use std::collections::hash_map::DefaultHasher;
use std::hash::{Hash, Hasher};

use crate::markdown::normalize::separator_positions;
use crate::markdown::syntax::HighlightedCode;
use crate::markdown::{
    normalize, parse_blocks, MarkdownNode, MarkdownNodeType, MarkdownOptions, MathRenderer,
};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum BlockKind {
    Heading,
    Paragraph,
    CodeBlock,
    List,
    BlockQuote,
    Table,
    HorizontalRule,
    /// A paragraph holding a single display formula
    Math,
    Html,
    Other,
}

impl BlockKind {
    fn of(node: &MarkdownNode) -> Self {
        match &node.node_type {
            MarkdownNodeType::Heading { .. } => BlockKind::Heading,
            MarkdownNodeType::Paragraph => {
                let only_display_math = node.children.iter().all(|child| match &child.node_type {
                    MarkdownNodeType::Math { display, .. } => *display,
                    MarkdownNodeType::SoftBreak | MarkdownNodeType::LineBreak => true,
                    MarkdownNodeType::Text(t) => t.trim().is_empty(),
                    _ => false,
                });
                let has_math = node
                    .children
                    .iter()
                    .any(|child| matches!(child.node_type, MarkdownNodeType::Math { .. }));
                if only_display_math && has_math {
                    BlockKind::Math
                } else {
                    BlockKind::Paragraph
                }
            }
            MarkdownNodeType::CodeBlock { .. } => BlockKind::CodeBlock,
            MarkdownNodeType::List { .. } => BlockKind::List,
            MarkdownNodeType::BlockQuote => BlockKind::BlockQuote,
            MarkdownNodeType::Table { .. } => BlockKind::Table,
            MarkdownNodeType::ThematicBreak => BlockKind::HorizontalRule,
            MarkdownNodeType::HtmlBlock(_) => BlockKind::Html,
            _ => BlockKind::Other,
        }
    }
}

/// Height of a drawn block and the layout it was measured in.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct MeasuredHeight {
    pub width: f32,
    pub font_size: f32,
    pub height: f32,
}

#[derive(Debug, Clone)]
pub struct PreviewBlock {
    /// Content hash of kind, source and rendered HTML
    pub key: u64,
    pub kind: BlockKind,
    /// 1-based inclusive line range in the editor text
    pub lines: (usize, usize),
    pub node: MarkdownNode,
    /// Set on the last draw; lets off-screen blocks be skipped
    pub height: Option<MeasuredHeight>,
    /// Highlighted code for code blocks, with the dark-mode flag it was made for
    pub highlighted: Option<(bool, HighlightedCode)>,
}

impl PreviewBlock {
    /// Measured height, if it was taken at this width and font size.
    pub fn cached_height(&self, width: f32, font_size: f32) -> Option<f32> {
        self.height
            .filter(|m| (m.width - width).abs() < 0.5 && m.font_size == font_size)
            .map(|m| m.height)
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Line mapping
// ─────────────────────────────────────────────────────────────────────────────

/// Maps lines of the normalized text back to the editor text.
///
/// Only needed when the editor buffer itself is not normalized; each inserted
/// blank line shifts the lines after it down by one.
#[derive(Debug, Clone, Default)]
pub struct LineMap {
    /// 1-based normalized line numbers of the inserted blank lines, ascending
    inserted: Vec<usize>,
}

impl LineMap {
    pub fn new(editor_text: &str) -> Self {
        let inserted = separator_positions(editor_text)
            .iter()
            .enumerate()
            // Separator before input line `l` (0-based) lands at normalized line l + i + 1
            .map(|(i, sep)| sep.line + i + 1)
            .collect();
        Self { inserted }
    }

    pub fn to_editor_line(&self, normalized_line: usize) -> usize {
        let shift = self
            .inserted
            .iter()
            .take_while(|&&line| line <= normalized_line)
            .count();
        normalized_line.saturating_sub(shift).max(1)
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Building
// ─────────────────────────────────────────────────────────────────────────────

/// Normalize, parse and split `editor_text` into preview blocks.
pub fn build_blocks(
    editor_text: &str,
    options: &MarkdownOptions,
    renderer: &dyn MathRenderer,
) -> Vec<PreviewBlock> {
    let normalized = normalize(editor_text);
    let line_map = LineMap::new(editor_text);
    let source_lines: Vec<&str> = normalized.lines().collect();
    let document = parse_blocks(&normalized, options, renderer);

    document
        .blocks
        .into_iter()
        .map(|block| {
            let kind = BlockKind::of(&block.node);
            let start = block.node.start_line;
            let end = block.node.end_line.max(start);
            let source = source_lines
                .get(start.saturating_sub(1)..end.min(source_lines.len()))
                .unwrap_or_default();
            PreviewBlock {
                key: block_key(kind, source, &block.html),
                kind,
                lines: (line_map.to_editor_line(start), line_map.to_editor_line(end)),
                node: block.node,
                height: None,
                highlighted: None,
            }
        })
        .collect()
}

fn block_key(kind: BlockKind, source: &[&str], html: &str) -> u64 {
    let mut hasher = DefaultHasher::new();
    kind.hash(&mut hasher);
    source.hash(&mut hasher);
    html.hash(&mut hasher);
    hasher.finish()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::markdown::PlainTex;

    fn blocks(text: &str) -> Vec<PreviewBlock> {
        build_blocks(text, &MarkdownOptions::default(), &PlainTex)
    }

    #[test]
    fn test_block_kinds() {
        let text = "# 标题\n\n段落\n\n- a\n- b\n\n| a |\n| --- |\n| 1 |\n\n---\n\n```rust\nfn x() {}\n```\n\n$$\nx^2\n$$\n";
        let kinds: Vec<BlockKind> = blocks(text).iter().map(|b| b.kind).collect();
        assert_eq!(
            kinds,
            vec![
                BlockKind::Heading,
                BlockKind::Paragraph,
                BlockKind::List,
                BlockKind::Table,
                BlockKind::HorizontalRule,
                BlockKind::CodeBlock,
                BlockKind::Math,
            ]
        );
    }

    #[test]
    fn test_same_content_same_key() {
        let a = blocks("# A\n\ntext");
        let b = blocks("# A\n\nother");
        assert_eq!(a[0].key, b[0].key);
        assert_ne!(a[1].key, b[1].key);
    }

    #[test]
    fn test_kind_changes_key() {
        let a = blocks("- x");
        let b = blocks("1. x");
        assert_ne!(a[0].key, b[0].key);
    }

    #[test]
    fn test_lines_map_to_unnormalized_editor_text() {
        // normalized: "- item\n\ntext" puts the paragraph on line 3
        let built = blocks("- item\ntext");
        assert_eq!(built.len(), 2);
        assert_eq!(built[1].lines, (2, 2));
    }

    #[test]
    fn test_line_map() {
        let map = LineMap::new("a\n- b\nc\n| t |");
        // normalized: a, _, - b, _, c, _, | t |
        assert_eq!(map.to_editor_line(1), 1);
        assert_eq!(map.to_editor_line(3), 2);
        assert_eq!(map.to_editor_line(5), 3);
        assert_eq!(map.to_editor_line(7), 4);
    }

    #[test]
    fn test_cached_height_tied_to_layout() {
        let mut block = blocks("段落").remove(0);
        assert_eq!(block.cached_height(400.0, 14.0), None);
        block.height = Some(MeasuredHeight {
            width: 400.0,
            font_size: 14.0,
            height: 32.0,
        });
        assert_eq!(block.cached_height(400.2, 14.0), Some(32.0));
        assert_eq!(block.cached_height(300.0, 14.0), None);
        assert_eq!(block.cached_height(400.0, 16.0), None);
    }

    #[test]
    fn test_malformed_input_still_renders() {
        let built = blocks("**unclosed\n\n| broken |\n[link](");
        assert!(!built.is_empty());
    }
}
