//! Copy the rendered document to the system clipboard as rich text.

use arboard::Clipboard;
use log::debug;

use super::html::generate_html_fragment;
use crate::error::{Error, Result};
use crate::markdown::PlainTex;

/// HTML placed on the clipboard. Paste targets do not run scripts, so
/// formulas stay as TeX source instead of KaTeX placeholders.
pub fn clipboard_html(markdown: &str) -> String {
    generate_html_fragment(markdown, &PlainTex)
}

/// Put the rendered HTML on the clipboard, with the Markdown source as the
/// plain-text fallback for applications that do not accept HTML.
pub fn copy_html_to_clipboard(markdown: &str) -> Result<()> {
    let html = clipboard_html(markdown);
    copy_html_with_fallback(&html, markdown)
}

pub fn copy_html_with_fallback(html: &str, plain_text: &str) -> Result<()> {
    let mut clipboard = Clipboard::new().map_err(|e| Error::Clipboard(e.to_string()))?;
    clipboard
        .set_html(html, Some(plain_text))
        .map_err(|e| Error::Clipboard(e.to_string()))?;
    debug!("Copied {} bytes of HTML to the clipboard", html.len());
    Ok(())
}
