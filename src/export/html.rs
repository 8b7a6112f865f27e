//! Standalone HTML pages for the browser view and the clipboard.
//!
//! The page carries the PaperSmith stylesheet (CJK font stack, GitHub-like
//! tables, task list checkboxes) and whatever the math renderer needs in the
//! head and at the end of the body.

use crate::markdown::math::escape_html;
use crate::markdown::{render_html, MathRenderer};

/// Page settings for [`generate_html_document`].
pub struct HtmlOptions<'a> {
    /// Vertical page margin in cm
    pub margin_v: f32,
    /// Horizontal page margin in cm
    pub margin_h: f32,
    /// Pad the screen view like a printed page
    pub show_margins: bool,
    pub renderer: &'a dyn MathRenderer,
}

/// A complete HTML document for `markdown`.
pub fn generate_html_document(markdown: &str, title: Option<&str>, options: &HtmlOptions) -> String {
    let body = render_html(markdown, options.renderer);
    let title = title.unwrap_or("PaperSmith");

    format!(
        r#"<!DOCTYPE html>
<html lang="zh-CN">
<head>
    <meta charset="UTF-8">
    <meta name="viewport" content="width=device-width, initial-scale=1.0">
    <meta name="generator" content="PaperSmith">
    <title>{title}</title>
    {math_head}
    <style>
{css}
    </style>
</head>
<body>
{body}
{math_script}
</body>
</html>"#,
        title = escape_html(title),
        math_head = options.renderer.head(),
        css = stylesheet(options),
        body = body,
        math_script = options.renderer.script(),
    )
}

/// HTML body only, for pasting into other applications.
pub fn generate_html_fragment(markdown: &str, renderer: &dyn MathRenderer) -> String {
    render_html(markdown, renderer)
}

fn format_cm(value: f32) -> String {
    let rounded = (value * 100.0).round() / 100.0;
    format!("{}cm", rounded)
}

fn stylesheet(options: &HtmlOptions) -> String {
    let margin_v = format_cm(options.margin_v);
    let margin_h = format_cm(options.margin_h);
    let (padding_v, padding_h) = if options.show_margins {
        (margin_v.clone(), margin_h.clone())
    } else {
        ("20px".to_string(), "20px".to_string())
    };

    format!(
        r#"@page {{ margin: {margin_v} {margin_h}; }}
body {{ font-family: 'Segoe UI', 'Microsoft YaHei', sans-serif; line-height: 1.6; color: #24292e; background-color: #ffffff; }}
@media screen {{ body {{ padding: {padding_v} {padding_h}; }} }}
@media print {{ body {{ margin: 0; padding: 0; }} }}
{BASE_CSS}"#
    )
}

const BASE_CSS: &str = r#"ul, ol { margin-top: 2px; margin-bottom: 2px; padding-left: 24px; }
li p { margin: 0; }
ol { list-style-type: decimal; }
ul { list-style-type: disc; }
table { border-collapse: collapse; width: 100%; margin: 15px 0; }
th, td { border: 1px solid #dfe2e5; padding: 8px 15px; text-align: left; }
th { background-color: #f6f8fa; font-weight: bold; }
th[align="center"], td[align="center"] { text-align: center; }
th[align="right"], td[align="right"] { text-align: right; }
code { background-color: #f6f8fa; padding: 0.2em 0.4em; border-radius: 3px; font-family: 'Consolas', monospace; }
pre { background-color: #f6f8fa; padding: 12px 16px; border-radius: 6px; overflow: auto; }
pre code { padding: 0; background: none; }
blockquote { margin: 0 0 16px 0; padding: 0 1em; color: #6a737d; border-left: 4px solid #dfe2e5; }
input[type=checkbox] { margin-right: 8px; vertical-align: middle; transform: scale(1.1); }
li:has(> input[type="checkbox"]) { list-style-type: none; margin-left: -1.3em; padding-left: 0; }
del { text-decoration: line-through; color: #666; }
img { max-width: 100%; height: auto; display: block; margin: 10px 0; border-radius: 4px; }
hr { border: 0; border-top: 2px solid #dfe2e5; margin: 20px 0; }
.katex-display { text-align: center; margin: 1em 0; overflow-x: auto; overflow-y: hidden; }
div.katex-raw[data-display="true"] { text-align: center; display: block; margin: 10px 0; }
pre.math-display { text-align: center; background: none; }"#;
