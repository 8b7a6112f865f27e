//! TeX math spans: protection from the Markdown parser and HTML output.
//!
//! Before parsing, every `$…$` and `$$…$$` span is swapped for an opaque
//! placeholder so underscores and asterisks inside formulas are never read
//! as emphasis. After rendering, placeholders are replaced by the verbatim TeX
//! wrapped for whichever [`MathRenderer`] is active.
//!
//! Delimiter rules follow pandoc's `tex_math_dollars`: the opening `$` may not
//! be followed by whitespace, the closing `$` may not be preceded by
//! whitespace nor followed by a digit, and `\$` is a literal dollar sign.
//! Nothing inside fenced code blocks or backtick code spans is touched.

use std::ops::Range;

/// Placeholder delimiters, taken from the Unicode private use area.
const OPEN: char = '\u{E000}';
const CLOSE: char = '\u{E001}';

// ─────────────────────────────────────────────────────────────────────────────
// Spans
// ─────────────────────────────────────────────────────────────────────────────

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MathSpan {
    /// TeX source without the dollar delimiters
    pub tex: String,
    /// `$$…$$` rather than `$…$`
    pub display: bool,
    /// Byte range of the whole span, delimiters included, in the source
    pub range: Range<usize>,
}

/// Markdown with math replaced by placeholders.
#[derive(Debug, Clone, Default)]
pub struct ProtectedMath {
    pub text: String,
    pub spans: Vec<MathSpan>,
    /// `(protected line, lines removed so far)` after each multi-line span
    collapsed: Vec<(usize, usize)>,
}

impl ProtectedMath {
    /// Map a 1-based line of `text` back to the source line it came from.
    pub fn original_line(&self, protected_line: usize) -> usize {
        let removed = self
            .collapsed
            .iter()
            .take_while(|(line, _)| *line < protected_line)
            .last()
            .map_or(0, |(_, removed)| *removed);
        protected_line + removed
    }

    /// Like [`original_line`](Self::original_line) but for the last source
    /// line of a protected line that holds a collapsed multi-line span.
    pub fn original_end_line(&self, protected_line: usize) -> usize {
        let removed = self
            .collapsed
            .iter()
            .take_while(|(line, _)| *line <= protected_line)
            .last()
            .map_or(0, |(_, removed)| *removed);
        protected_line + removed
    }

    pub fn span(&self, index: usize) -> Option<&MathSpan> {
        self.spans.get(index)
    }
}

/// Placeholder text for span `index`.
pub fn placeholder(index: usize) -> String {
    format!("{OPEN}{index}{CLOSE}")
}

/// Next placeholder at or after `from`: its byte range and span index.
fn next_placeholder(text: &str, from: usize) -> Option<(Range<usize>, usize)> {
    let mut search = from;
    while let Some(rel) = text[search..].find(OPEN) {
        let start = search + rel;
        let digits_start = start + OPEN.len_utf8();
        let digits = text[digits_start..]
            .bytes()
            .take_while(u8::is_ascii_digit)
            .count();
        let digits_end = digits_start + digits;
        if digits > 0 && text[digits_end..].starts_with(CLOSE) {
            if let Ok(index) = text[digits_start..digits_end].parse::<usize>() {
                return Some((start..digits_end + CLOSE.len_utf8(), index));
            }
        }
        search = digits_start;
    }
    None
}

// ─────────────────────────────────────────────────────────────────────────────
// Scanning
// ─────────────────────────────────────────────────────────────────────────────

/// Byte ranges of fenced code blocks, fences included.
fn fenced_code_ranges(text: &str) -> Vec<Range<usize>> {
    let mut ranges = Vec::new();
    let mut open: Option<(char, usize, usize)> = None;
    let mut offset = 0;

    for raw in text.split_inclusive('\n') {
        let body = raw.trim_start_matches([' ', '\t']).trim_end();
        let marker = body.chars().next().filter(|c| *c == '`' || *c == '~');
        let run = marker.map_or(0, |m| body.chars().take_while(|c| *c == m).count());

        match (open, marker) {
            (None, Some(m)) if run >= 3 => open = Some((m, run, offset)),
            (Some((ch, len, start)), Some(m))
                if m == ch && run >= len && body[run..].trim().is_empty() =>
            {
                ranges.push(start..offset + raw.len());
                open = None;
            }
            _ => {}
        }
        offset += raw.len();
    }

    if let Some((_, _, start)) = open {
        ranges.push(start..text.len());
    }
    ranges
}

fn backtick_run(bytes: &[u8], at: usize) -> usize {
    bytes[at..].iter().take_while(|&&b| b == b'`').count()
}

/// End of the code span opened by the backtick run at `at`, if it closes.
fn code_span_end(bytes: &[u8], at: usize) -> Option<usize> {
    let run = backtick_run(bytes, at);
    let mut i = at + run;
    while i < bytes.len() {
        if bytes[i] == b'`' {
            let close = backtick_run(bytes, i);
            if close == run {
                return Some(i + close);
            }
            i += close;
        } else {
            i += 1;
        }
    }
    None
}

fn is_space(b: u8) -> bool {
    matches!(b, b' ' | b'\t' | b'\n' | b'\r')
}

/// A blank line between `start` and `end` ends any math span.
fn contains_blank_line(text: &str) -> bool {
    let mut lines = text.split('\n');
    lines.next();
    let mut rest: Vec<&str> = lines.collect();
    rest.pop();
    rest.iter().any(|l| l.trim().is_empty())
}

fn find_display_close(text: &str, from: usize) -> Option<usize> {
    let bytes = text.as_bytes();
    let mut i = from;
    while i + 1 < bytes.len() {
        match bytes[i] {
            b'\\' => i += 2,
            b'$' if bytes[i + 1] == b'$' => return Some(i),
            _ => i += 1,
        }
    }
    None
}

fn find_inline_close(text: &str, from: usize) -> Option<usize> {
    let bytes = text.as_bytes();
    let mut i = from;
    while i < bytes.len() {
        match bytes[i] {
            b'\\' => i += 2,
            b'$' => {
                let before_ok = !is_space(bytes[i - 1]);
                let after_ok = bytes.get(i + 1).map_or(true, |b| !b.is_ascii_digit());
                if before_ok && after_ok && i > from {
                    return Some(i);
                }
                i += 1;
            }
            b'\n' if bytes[i + 1..]
                .iter()
                .take_while(|b| **b != b'\n')
                .all(|b| is_space(*b)) =>
            {
                return None;
            }
            _ => i += 1,
        }
    }
    None
}

/// Every math span in `text`, in order.
pub fn find_math_spans(text: &str) -> Vec<MathSpan> {
    let bytes = text.as_bytes();
    let fenced = fenced_code_ranges(text);
    let mut fenced_iter = fenced.iter().peekable();
    let mut spans = Vec::new();
    let mut i = 0;

    while i < bytes.len() {
        while fenced_iter.peek().is_some_and(|r| r.end <= i) {
            fenced_iter.next();
        }
        if let Some(range) = fenced_iter.peek() {
            if range.contains(&i) {
                i = range.end;
                continue;
            }
        }

        match bytes[i] {
            b'\\' => i += 2,
            b'`' => {
                i = code_span_end(bytes, i).unwrap_or(i + backtick_run(bytes, i));
            }
            b'$' if bytes.get(i + 1) == Some(&b'$') => {
                let inner_start = i + 2;
                match find_display_close(text, inner_start) {
                    Some(close)
                        if !text[inner_start..close].trim().is_empty()
                            && !contains_blank_line(&text[inner_start..close])
                            && !fenced.iter().any(|r| r.start < close && r.end > i) =>
                    {
                        spans.push(MathSpan {
                            tex: text[inner_start..close].trim().to_string(),
                            display: true,
                            range: i..close + 2,
                        });
                        i = close + 2;
                    }
                    _ => i += 2,
                }
            }
            b'$' => {
                let inner_start = i + 1;
                let opens = bytes.get(inner_start).is_some_and(|b| !is_space(*b));
                match find_inline_close(text, inner_start) {
                    Some(close)
                        if opens && !fenced.iter().any(|r| r.start < close && r.end > i) =>
                    {
                        spans.push(MathSpan {
                            tex: text[inner_start..close].to_string(),
                            display: false,
                            range: i..close + 1,
                        });
                        i = close + 1;
                    }
                    _ => i += 1,
                }
            }
            _ => i += 1,
        }
    }

    spans
}

// ─────────────────────────────────────────────────────────────────────────────
// Protect / restore
// ─────────────────────────────────────────────────────────────────────────────

/// Replace math spans with placeholders.
pub fn protect(markdown: &str) -> ProtectedMath {
    let spans = find_math_spans(markdown);
    let mut text = String::with_capacity(markdown.len());
    let mut collapsed = Vec::new();
    let mut copied = 0;
    let mut line = 1;
    let mut removed = 0;

    for (index, span) in spans.iter().enumerate() {
        let before = &markdown[copied..span.range.start];
        line += before.matches('\n').count();
        text.push_str(before);
        text.push_str(&placeholder(index));

        let newlines = markdown[span.range.clone()].matches('\n').count();
        if newlines > 0 {
            removed += newlines;
            collapsed.push((line, removed));
        }
        copied = span.range.end;
    }
    text.push_str(&markdown[copied..]);

    ProtectedMath {
        text,
        spans,
        collapsed,
    }
}

/// A piece of text after splitting on placeholders.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum MathSegment<'a> {
    Text(&'a str),
    Math(usize),
}

/// Split text that may contain placeholders into text and math pieces.
pub fn split_placeholders(text: &str) -> Vec<MathSegment<'_>> {
    let mut segments = Vec::new();
    let mut last = 0;
    while let Some((range, index)) = next_placeholder(text, last) {
        if range.start > last {
            segments.push(MathSegment::Text(&text[last..range.start]));
        }
        segments.push(MathSegment::Math(index));
        last = range.end;
    }
    if last < text.len() {
        segments.push(MathSegment::Text(&text[last..]));
    }
    segments
}

/// Swap placeholders in rendered HTML for the renderer's markup.
///
/// A paragraph holding nothing but one display formula is replaced whole, so
/// block math is not nested inside `<p>`.
pub fn restore_html(html: &str, spans: &[MathSpan], renderer: &dyn MathRenderer) -> String {
    if spans.is_empty() {
        return html.to_string();
    }

    let mut out = String::with_capacity(html.len());
    let mut last = 0;
    let mut search = 0;
    while let Some((range, index)) = next_placeholder(html, search) {
        search = range.end;
        let Some(span) = spans.get(index) else {
            continue;
        };

        let mut start = range.start;
        let mut end = range.end;
        if span.display
            && html[last..start].ends_with("<p>")
            && html[end..].starts_with("</p>")
        {
            start -= "<p>".len();
            end += "</p>".len();
        }

        out.push_str(&html[last..start]);
        out.push_str(&renderer.render(&span.tex, span.display));
        last = end;
        search = end;
    }
    out.push_str(&html[last..]);
    out
}

pub fn escape_html(s: &str) -> String {
    s.replace('&', "&amp;")
        .replace('<', "&lt;")
        .replace('>', "&gt;")
        .replace('"', "&quot;")
        .replace('\'', "&#39;")
}

// ─────────────────────────────────────────────────────────────────────────────
// Renderers
// ─────────────────────────────────────────────────────────────────────────────

/// How math is presented in HTML output.
pub trait MathRenderer: Send + Sync {
    /// Markup for one formula. `tex` is raw and must be escaped.
    fn render(&self, tex: &str, display: bool) -> String;

    /// Extra `<head>` content (stylesheets, scripts).
    fn head(&self) -> String {
        String::new()
    }

    /// Script placed at the end of `<body>`.
    fn script(&self) -> String {
        String::new()
    }
}

/// KaTeX loaded from a CDN and run in the browser.
#[derive(Debug, Clone)]
pub struct KatexCdn {
    pub base_url: String,
}

impl KatexCdn {
    pub const DEFAULT_BASE_URL: &'static str = "https://cdn.staticfile.org/KaTeX/0.16.9";
}

impl Default for KatexCdn {
    fn default() -> Self {
        Self {
            base_url: Self::DEFAULT_BASE_URL.to_string(),
        }
    }
}

impl MathRenderer for KatexCdn {
    fn render(&self, tex: &str, display: bool) -> String {
        let tag = if display { "div" } else { "span" };
        format!(
            r#"<{tag} class="katex-raw" data-display="{display}">{}</{tag}>"#,
            escape_html(tex)
        )
    }

    fn head(&self) -> String {
        let base = self.base_url.trim_end_matches('/');
        format!(
            "<link rel=\"stylesheet\" href=\"{base}/katex.min.css\">\n\
             <script src=\"{base}/katex.min.js\"></script>"
        )
    }

    fn script(&self) -> String {
        KATEX_RENDER_SCRIPT.to_string()
    }
}

/// TeX source shown as code, for targets that cannot run scripts.
#[derive(Debug, Clone, Copy, Default)]
pub struct PlainTex;

impl MathRenderer for PlainTex {
    fn render(&self, tex: &str, display: bool) -> String {
        if display {
            format!(
                r#"<pre class="math math-display">$${}$$</pre>"#,
                escape_html(tex)
            )
        } else {
            format!(r#"<code class="math math-inline">${}$</code>"#, escape_html(tex))
        }
    }
}

const KATEX_RENDER_SCRIPT: &str = r#"<script>
document.addEventListener("DOMContentLoaded", function () {
    if (typeof katex === "undefined") {
        console.error("[KaTeX] library not loaded");
        return;
    }
    document.querySelectorAll(".katex-raw").forEach(function (el) {
        try {
            katex.render(el.textContent, el, {
                displayMode: el.getAttribute("data-display") === "true",
                throwOnError: false
            });
        } catch (err) {
            console.error("[KaTeX] render error:", err);
        }
    });
});
</script>"#;

#[cfg(test)]
mod tests {
    use super::*;
    use comrak::{markdown_to_html, Options};

    fn texts(text: &str) -> Vec<(String, bool)> {
        find_math_spans(text)
            .into_iter()
            .map(|s| (s.tex, s.display))
            .collect()
    }

    #[test]
    fn test_inline_and_display_spans() {
        assert_eq!(texts("$a_b$"), vec![("a_b".to_string(), false)]);
        assert_eq!(
            texts("before $$\\sum_{i=1}^n x_i$$ after"),
            vec![("\\sum_{i=1}^n x_i".to_string(), true)]
        );
    }

    #[test]
    fn test_currency_is_not_math() {
        assert!(texts("costs $5 and $10 today").is_empty());
        assert!(texts("price: $ 3 $").is_empty());
        assert!(texts("a lone $ sign").is_empty());
    }

    #[test]
    fn test_escaped_dollar() {
        assert!(texts(r"\$a_b\$").is_empty());
        assert_eq!(texts(r"$a\$b$"), vec![(r"a\$b".to_string(), false)]);
    }

    #[test]
    fn test_code_is_skipped() {
        assert!(texts("`$a_b$`").is_empty());
        assert!(texts("``code with ` and $x$``").is_empty());
        assert!(texts("```\n$a_b$\n```\n").is_empty());
        assert_eq!(texts("```\n$x$\n```\n$y$").len(), 1);
    }

    #[test]
    fn test_blank_line_ends_span() {
        assert!(texts("$a\n\nb$").is_empty());
        assert!(texts("$$a\n\nb$$").is_empty());
        assert_eq!(texts("$$\na\nb\n$$").len(), 1);
    }

    #[test]
    fn test_multiline_display_line_mapping() {
        let source = "intro\n\n$$\na_1\n+ b\n$$\n\nafter";
        let protected = protect(source);
        assert_eq!(protected.spans.len(), 1);
        assert_eq!(protected.text, format!("intro\n\n{}\n\nafter", placeholder(0)));
        // "after" is line 5 in the protected text and line 8 in the source
        assert_eq!(protected.original_line(3), 3);
        assert_eq!(protected.original_line(5), 8);
        assert_eq!(protected.original_end_line(3), 6);
    }

    #[test]
    fn test_underscore_not_emphasis() {
        let protected = protect("$a_b$ and $c_d$");
        let html = markdown_to_html(&protected.text, &Options::default());
        let restored = restore_html(&html, &protected.spans, &KatexCdn::default());
        assert!(!restored.contains("<em>"));
        assert!(restored.contains(r#"<span class="katex-raw" data-display="false">a_b</span>"#));
        assert!(restored.contains(">c_d</span>"));
    }

    #[test]
    fn test_display_math_unwraps_paragraph() {
        let protected = protect("$$x_1 < y$$");
        let html = markdown_to_html(&protected.text, &Options::default());
        let restored = restore_html(&html, &protected.spans, &KatexCdn::default());
        assert_eq!(
            restored.trim(),
            r#"<div class="katex-raw" data-display="true">x_1 &lt; y</div>"#
        );
    }

    #[test]
    fn test_plain_tex_renderer() {
        let protected = protect("$a*b*c$");
        let html = markdown_to_html(&protected.text, &Options::default());
        let restored = restore_html(&html, &protected.spans, &PlainTex);
        assert!(restored.contains(r#"<code class="math math-inline">$a*b*c$</code>"#));
        assert!(PlainTex.head().is_empty());
    }

    #[test]
    fn test_katex_head_uses_base_url() {
        let renderer = KatexCdn {
            base_url: "https://example.org/katex/".to_string(),
        };
        let head = renderer.head();
        assert!(head.contains("https://example.org/katex/katex.min.css"));
        assert!(head.contains("https://example.org/katex/katex.min.js"));
        assert!(renderer.script().contains("throwOnError: false"));
    }

    #[test]
    fn test_split_placeholders() {
        let text = format!("a {} b{}", placeholder(0), placeholder(12));
        assert_eq!(
            split_placeholders(&text),
            vec![
                MathSegment::Text("a "),
                MathSegment::Math(0),
                MathSegment::Text(" b"),
                MathSegment::Math(12),
            ]
        );
    }
}
