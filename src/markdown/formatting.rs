//! Toolbar and keyboard editing commands on raw Markdown text.
//!
//! All positions are char indices, matching egui's text cursors. Every
//! command returns a [`FormatResult`] with the rewritten text and where the
//! caret or selection should go.
//!
//! ```ignore
//! let result = apply_format("Hello world", (0, 5), FormatCommand::Bold);
//! assert_eq!(result.text, "**Hello** world");
//! ```

use crate::markdown::normalize::{classify_line, LineKind};
use crate::string_utils::{byte_to_char, char_to_byte, line_end, line_start};
use regex::Regex;
use std::sync::OnceLock;

pub const TABLE_MAX_ROWS: usize = 100;
pub const TABLE_MAX_COLS: usize = 20;
pub const IMAGE_ALT_PLACEHOLDER: &str = "图片描述";

// ─────────────────────────────────────────────────────────────────────────────
// Commands
// ─────────────────────────────────────────────────────────────────────────────

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FormatCommand {
    Bold,
    Italic,
    Strikethrough,
    /// Heading level 1-6
    Heading(u8),
    BulletList,
    NumberedList,
    TaskList,
    HorizontalRule,
    Table { rows: usize, cols: usize },
    /// Image link to a local file
    Image(String),
}

impl FormatCommand {
    pub fn shortcut_label(&self) -> &'static str {
        match self {
            Self::Bold => "Ctrl+B",
            Self::Italic => "Ctrl+I",
            _ => "",
        }
    }

    pub fn tooltip(&self) -> String {
        let name = match self {
            Self::Bold => "Bold",
            Self::Italic => "Italic",
            Self::Strikethrough => "Strikethrough",
            Self::Heading(_) => "Heading",
            Self::BulletList => "Bullet list",
            Self::NumberedList => "Numbered list",
            Self::TaskList => "Task list",
            Self::HorizontalRule => "Horizontal rule",
            Self::Table { .. } => "Insert table",
            Self::Image(_) => "Insert image",
        };
        let shortcut = self.shortcut_label();
        if shortcut.is_empty() {
            name.to_string()
        } else {
            format!("{} ({})", name, shortcut)
        }
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Result
// ─────────────────────────────────────────────────────────────────────────────

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FormatResult {
    pub text: String,
    /// Caret position (char index)
    pub cursor: usize,
    /// Selection to restore, as char indices
    pub selection: Option<(usize, usize)>,
    /// False when an existing format was removed instead of added
    pub applied: bool,
}

impl FormatResult {
    pub fn with_cursor(text: String, cursor: usize) -> Self {
        Self {
            text,
            cursor,
            selection: None,
            applied: true,
        }
    }

    pub fn with_selection(text: String, start: usize, end: usize) -> Self {
        Self {
            text,
            cursor: end,
            selection: Some((start, end)),
            applied: true,
        }
    }

    pub fn toggled_off(mut self) -> Self {
        self.applied = false;
        self
    }
}

/// Ordered char selection converted to byte offsets.
fn byte_range(text: &str, selection: (usize, usize)) -> (usize, usize) {
    let (a, b) = selection;
    let (start, end) = if a <= b { (a, b) } else { (b, a) };
    (char_to_byte(text, start), char_to_byte(text, end))
}

fn cached(cell: &'static OnceLock<Option<Regex>>, pattern: &str) -> Option<&'static Regex> {
    cell.get_or_init(|| Regex::new(pattern).ok()).as_ref()
}

fn splice(text: &str, start: usize, end: usize, insert: &str) -> String {
    let mut out = String::with_capacity(text.len() + insert.len());
    out.push_str(&text[..start]);
    out.push_str(insert);
    out.push_str(&text[end..]);
    out
}

// ─────────────────────────────────────────────────────────────────────────────
// Dispatch
// ─────────────────────────────────────────────────────────────────────────────

/// Apply `command` to `text` with the given char selection (caret when empty).
pub fn apply_format(text: &str, selection: (usize, usize), command: FormatCommand) -> FormatResult {
    match command {
        FormatCommand::Bold => apply_inline_format(text, selection, "**"),
        FormatCommand::Italic => apply_inline_format(text, selection, "*"),
        FormatCommand::Strikethrough => apply_inline_format(text, selection, "~~"),
        FormatCommand::Heading(level) => apply_heading(text, selection, level),
        FormatCommand::BulletList => apply_list_prefix(text, selection, ListKind::Bullet),
        FormatCommand::NumberedList => apply_list_prefix(text, selection, ListKind::Numbered),
        FormatCommand::TaskList => apply_list_prefix(text, selection, ListKind::Task),
        FormatCommand::HorizontalRule => insert_horizontal_rule(text, selection),
        FormatCommand::Table { rows, cols } => insert_table(text, selection, rows, cols),
        FormatCommand::Image(path) => insert_image(text, selection, &path),
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Inline
// ─────────────────────────────────────────────────────────────────────────────

fn apply_inline_format(text: &str, selection: (usize, usize), marker: &str) -> FormatResult {
    let (start, end) = byte_range(text, selection);
    let selected = &text[start..end];
    let marker_chars = marker.chars().count();
    let start_char = byte_to_char(text, start);

    // Selection includes the markers
    if selected.len() >= 2 * marker.len()
        && selected.starts_with(marker)
        && selected.ends_with(marker)
    {
        let inner = &selected[marker.len()..selected.len() - marker.len()];
        let new_text = splice(text, start, end, inner);
        let inner_chars = inner.chars().count();
        return FormatResult::with_selection(new_text, start_char, start_char + inner_chars)
            .toggled_off();
    }

    // Markers sit just outside the selection
    if start >= marker.len()
        && text[..start].ends_with(marker)
        && text[end..].starts_with(marker)
        && !(start == end && marker.len() == 1 && text[..start].ends_with("**"))
    {
        let outer_start = start - marker.len();
        let new_text = splice(text, outer_start, end + marker.len(), selected);
        let new_start = start_char - marker_chars;
        return FormatResult::with_selection(
            new_text,
            new_start,
            new_start + selected.chars().count(),
        )
        .toggled_off();
    }

    let wrapped = format!("{marker}{selected}{marker}");
    let new_text = splice(text, start, end, &wrapped);
    if start == end {
        FormatResult::with_cursor(new_text, start_char + marker_chars)
    } else {
        let inner_start = start_char + marker_chars;
        FormatResult::with_selection(
            new_text,
            inner_start,
            inner_start + selected.chars().count(),
        )
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Headings
// ─────────────────────────────────────────────────────────────────────────────

fn heading_regex() -> Option<&'static Regex> {
    static RE: OnceLock<Option<Regex>> = OnceLock::new();
    cached(&RE, r"^\s*(#+)\s*")
}

fn apply_heading(text: &str, selection: (usize, usize), level: u8) -> FormatResult {
    let level = level.clamp(1, 6) as usize;
    let (start, _) = byte_range(text, selection);
    let ls = line_start(text, start);
    let le = line_end(text, start);
    let line = &text[ls..le];

    let (existing, content) = match heading_regex().and_then(|re| re.captures(line)) {
        Some(caps) => {
            let hashes = caps.get(1).map_or(0, |m| m.as_str().len());
            let prefix_len = caps.get(0).map_or(0, |m| m.end());
            (hashes, &line[prefix_len..])
        }
        None => (0, line.trim_start()),
    };

    let ls_char = byte_to_char(text, ls);
    if existing == level {
        let new_text = splice(text, ls, le, content);
        return FormatResult::with_cursor(new_text, ls_char + content.chars().count())
            .toggled_off();
    }

    let new_line = format!("{} {}", "#".repeat(level), content);
    let new_text = splice(text, ls, le, &new_line);
    FormatResult::with_cursor(new_text, ls_char + new_line.chars().count())
}

// ─────────────────────────────────────────────────────────────────────────────
// Lists
// ─────────────────────────────────────────────────────────────────────────────

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum ListKind {
    Bullet,
    Numbered,
    Task,
}

impl ListKind {
    fn matches(self, kind: LineKind) -> bool {
        matches!(
            (self, kind),
            (ListKind::Bullet, LineKind::Bullet)
                | (ListKind::Numbered, LineKind::Ordered)
                | (ListKind::Task, LineKind::Task)
        )
    }

    fn marker(self, index: usize) -> String {
        match self {
            ListKind::Bullet => "- ".to_string(),
            ListKind::Numbered => format!("{}. ", index + 1),
            ListKind::Task => "- [ ] ".to_string(),
        }
    }
}

fn list_marker_regex() -> Option<&'static Regex> {
    static RE: OnceLock<Option<Regex>> = OnceLock::new();
    cached(
        &RE,
        r"^([ \t]*)(?:[-*+][ \t]+\[[ xX]\]|[-*+]|\d{1,9}[.)])(?:[ \t]+|$)",
    )
}

/// `(indent, content)` of a line with any list marker removed.
fn split_list_marker(line: &str) -> (&str, &str) {
    match list_marker_regex().and_then(|re| re.captures(line)) {
        Some(caps) => {
            let indent = caps.get(1).map_or("", |m| m.as_str());
            let end = caps.get(0).map_or(0, |m| m.end());
            (indent, &line[end..])
        }
        None => {
            let content = line.trim_start_matches([' ', '\t']);
            (&line[..line.len() - content.len()], content)
        }
    }
}

fn apply_list_prefix(text: &str, selection: (usize, usize), kind: ListKind) -> FormatResult {
    let (start, end) = byte_range(text, selection);
    let ls = line_start(text, start);
    let le = line_end(text, end);
    let lines: Vec<&str> = text[ls..le].split('\n').collect();

    let all_marked = lines
        .iter()
        .filter(|l| !l.trim().is_empty())
        .all(|l| kind.matches(classify_line(l)))
        && lines.iter().any(|l| !l.trim().is_empty());

    let mut number = 0;
    let new_lines: Vec<String> = lines
        .iter()
        .map(|line| {
            let (indent, content) = split_list_marker(line);
            if all_marked {
                format!("{indent}{content}")
            } else if line.trim().is_empty() && lines.len() > 1 {
                line.to_string()
            } else {
                let marker = kind.marker(number);
                number += 1;
                format!("{indent}{marker}{content}")
            }
        })
        .collect();
    let mut replacement = new_lines.join("\n");

    // A list directly under paragraph text would be swallowed by it
    if !all_marked && ls > 0 {
        let prev_start = line_start(text, ls - 1);
        let prev = classify_line(&text[prev_start..ls - 1]);
        if prev != LineKind::Blank && !prev.is_list() {
            replacement.insert(0, '\n');
        }
    }

    let new_text = splice(text, ls, le, &replacement);
    let ls_char = byte_to_char(text, ls);
    let result = FormatResult::with_cursor(new_text, ls_char + replacement.chars().count());
    if all_marked {
        result.toggled_off()
    } else {
        result
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Block inserts
// ─────────────────────────────────────────────────────────────────────────────

fn insert_horizontal_rule(text: &str, selection: (usize, usize)) -> FormatResult {
    let (_, end) = byte_range(text, selection);
    let ls = line_start(text, end);
    let le = line_end(text, end);
    let rule = if text[ls..le].trim().is_empty() {
        "\n---\n\n"
    } else {
        "\n\n---\n\n"
    };
    let new_text = splice(text, le, le, rule);
    let cursor = byte_to_char(text, le) + rule.chars().count();
    FormatResult::with_cursor(new_text, cursor)
}

/// Markdown for an empty `rows` x `cols` table; the header row counts as a row.
pub fn table_markdown(rows: usize, cols: usize) -> String {
    let rows = rows.clamp(1, TABLE_MAX_ROWS);
    let cols = cols.clamp(1, TABLE_MAX_COLS);

    let header: Vec<String> = (1..=cols).map(|i| format!("标题{}", i)).collect();
    let mut table = format!("| {} |\n", header.join(" | "));
    table.push_str(&format!("| {} |\n", vec!["---"; cols].join(" | ")));
    for _ in 1..rows {
        table.push_str(&format!("| {} |\n", vec!["   "; cols].join(" | ")));
    }
    table
}

fn insert_table(text: &str, selection: (usize, usize), rows: usize, cols: usize) -> FormatResult {
    let (start, end) = byte_range(text, selection);
    let table = format!("\n{}", table_markdown(rows, cols));
    let new_text = splice(text, start, end, &table);

    // Select the first header cell so it can be typed over
    let first_cell = byte_to_char(text, start) + "\n| ".chars().count();
    FormatResult::with_selection(new_text, first_cell, first_cell + "标题1".chars().count())
}

fn insert_image(text: &str, selection: (usize, usize), path: &str) -> FormatResult {
    let (start, end) = byte_range(text, selection);
    let mut clean = path.replace('\\', "/");
    if clean.contains(char::is_whitespace) {
        clean = format!("<{}>", clean);
    }
    let selected = &text[start..end];
    let alt = if selected.trim().is_empty() {
        IMAGE_ALT_PLACEHOLDER
    } else {
        selected
    };
    let image = format!("![{}]({})", alt, clean);
    let new_text = splice(text, start, end, &image);
    let alt_start = byte_to_char(text, start) + 2;
    FormatResult::with_selection(new_text, alt_start, alt_start + alt.chars().count())
}

// ─────────────────────────────────────────────────────────────────────────────
// Enter continuation
// ─────────────────────────────────────────────────────────────────────────────

fn continuation_regex() -> Option<&'static Regex> {
    static RE: OnceLock<Option<Regex>> = OnceLock::new();
    cached(
        &RE,
        r"^([ \t]*)(?:([-*+])[ \t]+\[[ xX]\]|([-*+])|(\d{1,9})([.)]))([ \t]+|$)",
    )
}

/// Handle Enter at `cursor`: continue the list item on this line, end the list
/// when the item is empty, or insert a plain newline.
pub fn continue_list(text: &str, cursor: usize) -> FormatResult {
    let at = char_to_byte(text, cursor);
    let ls = line_start(text, at);
    let le = line_end(text, at);
    let line = &text[ls..le];
    let cursor_in_line = at - ls;

    let plain_newline = || FormatResult::with_cursor(splice(text, at, at, "\n"), cursor + 1);

    let Some(caps) = continuation_regex().and_then(|re| re.captures(line)) else {
        return plain_newline();
    };
    let Some(whole) = caps.get(0) else {
        return plain_newline();
    };
    // Caret inside the marker itself
    if cursor_in_line < whole.end() {
        return plain_newline();
    }

    let indent = caps.get(1).map_or("", |m| m.as_str());
    if line[whole.end()..].trim().is_empty() {
        // Empty item ends the list
        let new_text = splice(text, ls, le, "");
        return FormatResult::with_cursor(new_text, byte_to_char(text, ls));
    }

    let marker = if let Some(bullet) = caps.get(2) {
        format!("{} [ ] ", bullet.as_str())
    } else if let Some(bullet) = caps.get(3) {
        format!("{} ", bullet.as_str())
    } else {
        let number: u64 = caps
            .get(4)
            .and_then(|m| m.as_str().parse().ok())
            .unwrap_or(0);
        let delimiter = caps.get(5).map_or(".", |m| m.as_str());
        format!("{}{} ", number + 1, delimiter)
    };

    let insert = format!("\n{indent}{marker}");
    let new_text = splice(text, at, at, &insert);
    FormatResult::with_cursor(new_text, cursor + insert.chars().count())
}

// ─────────────────────────────────────────────────────────────────────────────
// Task toggle
// ─────────────────────────────────────────────────────────────────────────────

fn task_box_regex() -> Option<&'static Regex> {
    static RE: OnceLock<Option<Regex>> = OnceLock::new();
    cached(&RE, r"^[ \t]*[-*+][ \t]+(\[[ xX]\])")
}

/// Flip `[ ]`/`[x]` when `position` (char index) falls on the checkbox.
pub fn toggle_task_at(text: &str, position: usize) -> Option<FormatResult> {
    let at = char_to_byte(text, position);
    let ls = line_start(text, at);
    let le = line_end(text, at);
    let line = &text[ls..le];

    let checkbox = task_box_regex()?.captures(line)?.get(1)?;
    let offset = at - ls;
    if offset < checkbox.start() || offset > checkbox.end() {
        return None;
    }

    let replacement = if checkbox.as_str() == "[ ]" { "[x]" } else { "[ ]" };
    let new_text = splice(
        text,
        ls + checkbox.start(),
        ls + checkbox.end(),
        replacement,
    );
    Some(FormatResult::with_cursor(new_text, position))
}
