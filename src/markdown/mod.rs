//! Markdown handling: formatting normalization, math protection, parsing to
//! HTML blocks, editing commands and code highlighting.
//!
//! # Example
//! ```ignore
//! use crate::markdown::{normalize, parse_blocks, KatexCdn, MarkdownOptions};
//!
//! let text = normalize("段落\n- 项目");
//! let doc = parse_blocks(&text, &MarkdownOptions::default(), &KatexCdn::default());
//! let html = doc.html();
//! ```

pub mod formatting;
pub mod math;
pub mod normalize;
mod parser;
pub mod syntax;

pub use formatting::{apply_format, continue_list, toggle_task_at, FormatCommand};
pub use math::{KatexCdn, MathRenderer, PlainTex};
pub use normalize::{is_normalized, normalize, normalize_with_cursor};
pub use parser::{
    parse_blocks, render_html, ListType, MarkdownNode, MarkdownNodeType, MarkdownOptions,
    TableAlignment,
};
