//! Blank-line normalization around lists and tables.
//!
//! Markdown parsers only start a list or a table cleanly when it is separated
//! from the surrounding paragraph by a blank line, and two adjacent lists with
//! different markers at the same depth may merge. This pass inserts exactly one
//! blank line at those boundaries and never touches anything else: no line is
//! edited, reindented or removed, and fenced code is copied through verbatim.
//!
//! Because the pass only inserts and a freshly inserted blank line leaves the
//! scanner in the same state as a blank line that was already there,
//! `normalize(normalize(x)) == normalize(x)`.

// ─────────────────────────────────────────────────────────────────────────────
// Line classification
// ─────────────────────────────────────────────────────────────────────────────

/// Block role of a single source line.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LineKind {
    Blank,
    /// Paragraph text or an ATX heading
    Text,
    /// `- [ ] item`, `* [x] item`
    Task,
    /// `- item`, `* item`, `+ item`
    Bullet,
    /// `1. item`, `1) item`
    Ordered,
    /// Thematic break such as `---` or `* * *`
    Rule,
    /// Table row, starting with `|`
    Table,
    /// Opening or closing code fence
    Fence,
}

impl LineKind {
    pub fn is_list(self) -> bool {
        matches!(self, LineKind::Task | LineKind::Bullet | LineKind::Ordered)
    }
}

/// Classify one line (without its line terminator).
pub fn classify_line(line: &str) -> LineKind {
    let body = line.trim_start_matches([' ', '\t']);
    let body = body.strip_suffix('\r').unwrap_or(body);

    if body.trim().is_empty() {
        LineKind::Blank
    } else if fence_marker(body).is_some() {
        LineKind::Fence
    } else if is_atx_heading(body) {
        LineKind::Text
    } else if is_task_item(body) {
        LineKind::Task
    } else if is_thematic_break(body) {
        LineKind::Rule
    } else if is_bullet_item(body) {
        LineKind::Bullet
    } else if is_ordered_item(body) {
        LineKind::Ordered
    } else if body.starts_with('|') {
        LineKind::Table
    } else {
        LineKind::Text
    }
}

/// Display width of the leading whitespace, tabs counting to the next multiple of four.
pub fn indent_width(line: &str) -> usize {
    let mut width = 0;
    for ch in line.chars() {
        match ch {
            ' ' => width += 1,
            '\t' => width += 4 - width % 4,
            _ => break,
        }
    }
    width
}

fn is_marker_end(rest: &str) -> bool {
    rest.is_empty() || rest.starts_with([' ', '\t'])
}

fn is_atx_heading(body: &str) -> bool {
    let hashes = body.bytes().take_while(|&b| b == b'#').count();
    (1..=6).contains(&hashes) && is_marker_end(&body[hashes..])
}

fn is_bullet_item(body: &str) -> bool {
    body.starts_with(['-', '*', '+']) && is_marker_end(&body[1..])
}

fn is_task_item(body: &str) -> bool {
    if !is_bullet_item(body) || body.len() < 2 {
        return false;
    }
    let rest = body[1..].trim_start_matches([' ', '\t']);
    let bytes = rest.as_bytes();
    bytes.len() >= 3
        && bytes[0] == b'['
        && matches!(bytes[1], b' ' | b'x' | b'X')
        && bytes[2] == b']'
        && is_marker_end(&rest[3..])
}

fn is_ordered_item(body: &str) -> bool {
    let digits = body.bytes().take_while(u8::is_ascii_digit).count();
    if digits == 0 || digits > 9 {
        return false;
    }
    let rest = &body[digits..];
    rest.starts_with(['.', ')']) && is_marker_end(&rest[1..])
}

fn is_thematic_break(body: &str) -> bool {
    let mut marker = None;
    let mut count = 0;
    for ch in body.trim_end().chars() {
        match ch {
            ' ' | '\t' => {}
            '-' | '*' | '_' => {
                if marker.is_some_and(|m| m != ch) {
                    return false;
                }
                marker = Some(ch);
                count += 1;
            }
            _ => return false,
        }
    }
    count >= 3
}

/// `(fence char, run length)` when `body` starts with a code fence.
/// Column where a list item's text starts: 2 for `- a`, 3 for `1. a`.
fn list_content_column(line: &str, kind: LineKind) -> usize {
    let body = line.trim_start_matches([' ', '\t']);
    let marker = match kind {
        LineKind::Ordered => body.find(['.', ')']).map_or(1, |i| i + 1),
        _ => 1,
    };
    indent_width(line) + marker + 1
}

/// Deepest indent a fence opener may have: three columns past the
/// enclosing list item's text, or past the margin outside lists. Anything
/// deeper is indented code or a lazy continuation line.
fn max_fence_indent(list_column: Option<usize>) -> usize {
    list_column.unwrap_or(0) + 3
}

fn fence_marker(body: &str) -> Option<(char, usize)> {
    let first = body.chars().next()?;
    if first != '`' && first != '~' {
        return None;
    }
    let run = body.chars().take_while(|&c| c == first).count();
    (run >= 3).then_some((first, run))
}

// ─────────────────────────────────────────────────────────────────────────────
// Separator rule
// ─────────────────────────────────────────────────────────────────────────────

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
struct LineInfo {
    kind: LineKind,
    indent: usize,
}

/// Whether a blank line belongs between two adjacent non-blank lines.
fn needs_separator(prev: LineInfo, next: LineInfo) -> bool {
    use LineKind::*;

    match (prev.kind, next.kind) {
        (Blank, _) | (_, Blank) => false,
        (Table, Table) => false,
        (_, Table) | (Table, _) => true,
        (Text, n) if n.is_list() => true,
        // A deeper line under a list item is its continuation
        (p, Text) if p.is_list() => next.indent <= prev.indent,
        (p, n) if p.is_list() && n.is_list() && p != n => next.indent <= prev.indent,
        _ => false,
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Scanner
// ─────────────────────────────────────────────────────────────────────────────

/// A blank line inserted in front of an input line.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Separator {
    /// Zero-based index of the input line that gets pushed down
    pub line: usize,
    /// Byte offset of that line's start in the input
    pub byte_offset: usize,
    /// Char offset of that line's start in the input
    pub char_offset: usize,
}

/// Where `normalize` would insert blank lines, in input order.
pub fn separator_positions(text: &str) -> Vec<Separator> {
    let mut separators = Vec::new();
    let mut fence: Option<(char, usize)> = None;
    let mut prev: Option<LineInfo> = None;
    // Text column of the list item currently open; blank lines keep it
    let mut list_column: Option<usize> = None;
    let mut byte_offset = 0;
    let mut char_offset = 0;

    for (index, raw) in text.split_inclusive('\n').enumerate() {
        let line = raw.strip_suffix('\n').unwrap_or(raw);
        let line = line.strip_suffix('\r').unwrap_or(line);
        let body = line.trim_start_matches([' ', '\t']);

        if let Some((ch, len)) = fence {
            let closes = fence_marker(body)
                .is_some_and(|(c, n)| c == ch && n >= len && body[n..].trim().is_empty());
            if closes {
                fence = None;
                prev = Some(LineInfo {
                    kind: LineKind::Fence,
                    indent: 0,
                });
            }
        } else {
            let mut info = LineInfo {
                kind: classify_line(line),
                indent: indent_width(line),
            };
            if info.kind == LineKind::Fence && info.indent > max_fence_indent(list_column) {
                info.kind = LineKind::Text;
            }
            if info.kind.is_list() {
                list_column = Some(list_content_column(line, info.kind));
            } else if info.kind != LineKind::Blank && list_column.is_some_and(|c| info.indent < c) {
                list_column = None;
            }
            match info.kind {
                LineKind::Blank => prev = None,
                LineKind::Fence => {
                    fence = fence_marker(body);
                    prev = Some(LineInfo {
                        kind: LineKind::Fence,
                        indent: 0,
                    });
                }
                _ => {
                    let continuation = match prev {
                        Some(p) if needs_separator(p, info) => {
                            separators.push(Separator {
                                line: index,
                                byte_offset,
                                char_offset,
                            });
                            false
                        }
                        Some(p) => p.kind.is_list() && info.kind == LineKind::Text,
                        None => false,
                    };
                    // Continuation text keeps the list item as the reference line
                    if !continuation {
                        prev = Some(info);
                    }
                }
            }
        }

        byte_offset += raw.len();
        char_offset += raw.chars().count();
    }

    separators
}

fn line_ending(text: &str) -> &'static str {
    if text.contains("\r\n") {
        "\r\n"
    } else {
        "\n"
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Public API
// ─────────────────────────────────────────────────────────────────────────────

/// Insert the missing blank lines around lists and tables.
pub fn normalize(text: &str) -> String {
    normalize_with_cursor(text, 0).0
}

/// Like [`normalize`], also mapping a caret (char index) into the new text.
///
/// A caret sitting at the start of a pushed-down line stays on that line.
pub fn normalize_with_cursor(text: &str, cursor: usize) -> (String, usize) {
    let separators = separator_positions(text);
    if separators.is_empty() {
        return (text.to_string(), cursor);
    }

    let newline = line_ending(text);
    let newline_chars = newline.chars().count();
    let mut out = String::with_capacity(text.len() + separators.len() * newline.len());
    let mut new_cursor = cursor;
    let mut copied = 0;

    for sep in &separators {
        out.push_str(&text[copied..sep.byte_offset]);
        out.push_str(newline);
        copied = sep.byte_offset;
        if cursor >= sep.char_offset {
            new_cursor += newline_chars;
        }
    }
    out.push_str(&text[copied..]);

    (out, new_cursor)
}

/// Cheap check used to skip the rewrite on most keystrokes.
pub fn is_normalized(text: &str) -> bool {
    separator_positions(text).is_empty()
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    // ─────────────────────────────────────────────────────────────────────────
    // Classification
    // ─────────────────────────────────────────────────────────────────────────

    #[test]
    fn test_classify_line() {
        assert_eq!(classify_line(""), LineKind::Blank);
        assert_eq!(classify_line("  \t"), LineKind::Blank);
        assert_eq!(classify_line("# Title"), LineKind::Text);
        assert_eq!(classify_line("#hashtag"), LineKind::Text);
        assert_eq!(classify_line("- [ ] todo"), LineKind::Task);
        assert_eq!(classify_line("* [X] done"), LineKind::Task);
        assert_eq!(classify_line("- item"), LineKind::Bullet);
        assert_eq!(classify_line("+ item"), LineKind::Bullet);
        assert_eq!(classify_line("-not a list"), LineKind::Text);
        assert_eq!(classify_line("12. twelve"), LineKind::Ordered);
        assert_eq!(classify_line("3) three"), LineKind::Ordered);
        assert_eq!(classify_line("2024.5 was a year"), LineKind::Text);
        assert_eq!(classify_line("---"), LineKind::Rule);
        assert_eq!(classify_line("- - -"), LineKind::Rule);
        assert_eq!(classify_line("**bold**"), LineKind::Text);
        assert_eq!(classify_line("| a | b |"), LineKind::Table);
        assert_eq!(classify_line("```rust"), LineKind::Fence);
        assert_eq!(classify_line("~~~"), LineKind::Fence);
        assert_eq!(classify_line("中文段落"), LineKind::Text);
    }

    #[test]
    fn test_indent_width() {
        assert_eq!(indent_width("- a"), 0);
        assert_eq!(indent_width("   - a"), 3);
        assert_eq!(indent_width("\t- a"), 4);
        assert_eq!(indent_width("  \t- a"), 4);
    }

    // ─────────────────────────────────────────────────────────────────────────
    // Scenarios
    // ─────────────────────────────────────────────────────────────────────────

    #[test]
    fn test_list_followed_by_text() {
        assert_eq!(normalize("- item1\nsome text"), "- item1\n\nsome text");
    }

    #[test]
    fn test_text_followed_by_list() {
        assert_eq!(normalize("intro:\n- a\n- b"), "intro:\n\n- a\n- b");
    }

    #[test]
    fn test_table_followed_by_paragraph() {
        let input = "| a | b |\n| --- | --- |\n| 1 | 2 |\nafter the table";
        let expected = "| a | b |\n| --- | --- |\n| 1 | 2 |\n\nafter the table";
        assert_eq!(normalize(input), expected);
    }

    #[test]
    fn test_paragraph_followed_by_table() {
        assert_eq!(
            normalize("成绩如下\n| 姓名 | 分数 |\n| --- | --- |"),
            "成绩如下\n\n| 姓名 | 分数 |\n| --- | --- |"
        );
    }

    #[test]
    fn test_nested_list_untouched() {
        let input = "- a\n  - b\n    - c\n  - d\n- e\n  1. f\n  2. g";
        assert_eq!(normalize(input), input);
    }

    #[test]
    fn test_different_marker_at_same_depth() {
        assert_eq!(normalize("1. a\n- b"), "1. a\n\n- b");
        assert_eq!(normalize("- a\n- [ ] b"), "- a\n\n- [ ] b");
    }

    #[test]
    fn test_deeper_list_of_other_kind_is_nested() {
        let input = "- a\n  1. b";
        assert_eq!(normalize(input), input);
    }

    #[test]
    fn test_continuation_text_keeps_list_context() {
        let input = "- a\n  more of a\n  - nested";
        assert_eq!(normalize(input), input);
    }

    #[test]
    fn test_code_fence_untouched() {
        let input = "```\n- item\ntext\n| t |\n```";
        assert_eq!(normalize(input), input);
    }

    #[test]
    fn test_tilde_fence_needs_matching_close() {
        let input = "~~~~\n```\n- x\nplain\n~~~~\n- y";
        assert_eq!(normalize(input), input);
    }

    #[test]
    fn test_unclosed_fence_protects_rest() {
        let input = "text\n```\n- a\nb\n| c |";
        assert_eq!(normalize(input), input);
    }

    #[test]
    fn test_table_right_after_fence() {
        assert_eq!(normalize("```\nx\n```\n| a |"), "```\nx\n```\n\n| a |");
    }

    #[test]
    fn test_crlf_preserved() {
        assert_eq!(normalize("- a\r\ntext\r\n"), "- a\r\n\r\ntext\r\n");
    }

    #[test]
    fn test_already_normalized_is_unchanged() {
        let input = "# 标题\n\n- a\n- b\n\n正文\n";
        assert!(is_normalized(input));
        assert_eq!(normalize(input), input);
    }

    #[test]
    fn test_cursor_mapping() {
        let input = "- a\nbc";
        // caret after "b"
        let (out, cursor) = normalize_with_cursor(input, 5);
        assert_eq!(out, "- a\n\nbc");
        assert_eq!(out.chars().nth(cursor), Some('c'));

        // caret before the insertion point does not move
        let (_, cursor) = normalize_with_cursor(input, 2);
        assert_eq!(cursor, 2);

        // caret at the start of the pushed line follows it
        let (out, cursor) = normalize_with_cursor(input, 4);
        assert_eq!(out.chars().nth(cursor), Some('b'));
    }

    #[test]
    fn test_cursor_with_multibyte_text() {
        let input = "中文\n- 项目";
        // char 3 is the `-`, char 4 the space after it
        let (out, cursor) = normalize_with_cursor(input, 3);
        assert_eq!(out, "中文\n\n- 项目");
        assert_eq!(out.chars().nth(cursor), Some('-'));

        let (out, cursor) = normalize_with_cursor(input, 4);
        assert_eq!(out.chars().nth(cursor), Some(' '));
    }

    #[test]
    fn test_deeply_indented_backticks_are_not_a_fence() {
        // Indented code: the rest of the document is still normalized
        let input = "段落\n\n    ```\n    code\n\ntext\n- item";
        assert_eq!(normalize(input), "段落\n\n    ```\n    code\n\ntext\n\n- item");

        // Lazy continuation of a paragraph
        let input = "text\n     ```\nmore\n- item";
        assert_eq!(normalize(input), "text\n     ```\nmore\n\n- item");
    }

    #[test]
    fn test_fence_inside_list_item_is_protected() {
        let input = "- item\n\n    ```\n    | not | a table |\n    - not a list\n    ```\ntext";
        assert_eq!(normalize(input), input);

        // Up to three columns at the margin still opens a fence
        let input = "   ```\ntext\n- not a list\n   ```";
        assert_eq!(normalize(input), input);
    }

    // ─────────────────────────────────────────────────────────────────────────
    // Properties
    // ─────────────────────────────────────────────────────────────────────────

    fn markdown_line() -> impl Strategy<Value = &'static str> {
        prop_oneof![
            Just(""),
            Just("text"),
            Just("  indented text"),
            Just("# Heading"),
            Just("- bullet"),
            Just("  - nested bullet"),
            Just("\t* tab bullet"),
            Just("1. ordered"),
            Just("   2) nested ordered"),
            Just("- [ ] task"),
            Just("  - [x] nested task"),
            Just("| a | b |"),
            Just("| --- | --- |"),
            Just("---"),
            Just("```"),
            Just("    ```"),
            Just("~~~~"),
            Just("$$a_b$$"),
        ]
    }

    fn markdown_doc() -> impl Strategy<Value = String> {
        (
            prop::collection::vec(markdown_line(), 0..40),
            any::<bool>(),
        )
            .prop_map(|(lines, crlf)| lines.join(if crlf { "\r\n" } else { "\n" }))
    }

    /// Output lines equal input lines with some blank lines added.
    fn only_blank_lines_added(input: &str, output: &str) -> bool {
        let mut expected = input.lines().peekable();
        for line in output.lines() {
            if expected.peek() == Some(&line) {
                expected.next();
            } else if !line.is_empty() {
                return false;
            }
        }
        expected.next().is_none()
    }

    proptest! {
        #[test]
        fn prop_idempotent(doc in markdown_doc()) {
            let once = normalize(&doc);
            prop_assert_eq!(normalize(&once), once);
        }

        #[test]
        fn prop_only_inserts_blank_lines(doc in markdown_doc()) {
            let out = normalize(&doc);
            prop_assert!(only_blank_lines_added(&doc, &out));
            prop_assert_eq!(
                out.lines().count(),
                doc.lines().count() + separator_positions(&doc).len()
            );
        }

        #[test]
        fn prop_fenced_content_unchanged(body in prop::collection::vec(markdown_line(), 0..15)) {
            let body: Vec<&str> = body.into_iter().filter(|l| classify_line(l) != LineKind::Fence).collect();
            let inner = body.join("\n");
            let doc = format!("text\n```\n{}\n```", inner);
            let fenced = format!("```\n{}\n```", inner);
            let out = normalize(&doc);
            prop_assert!(out.contains(&fenced));
        }

        #[test]
        fn prop_cursor_stays_on_same_char(doc in markdown_doc(), pick in 0usize..400) {
            let len = doc.chars().count();
            let cursor = if len == 0 { 0 } else { pick % len };
            let (out, mapped) = normalize_with_cursor(&doc, cursor);
            prop_assert_eq!(doc.chars().nth(cursor), out.chars().nth(mapped));
        }
    }
}
