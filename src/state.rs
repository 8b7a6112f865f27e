//! Application state for PaperSmith
//!
//! `Document` owns the Markdown buffer and its history; `AppState` adds the
//! settings and the flags the UI needs between frames. The buffer is only
//! mutated on the UI thread.

use log::{debug, info, warn};
use std::path::{Path, PathBuf};

use crate::config::{load_config, save_config_silent, Settings};
use crate::error::{Error, Result};
use crate::string_utils::char_index_to_line_col;

const MAX_UNDO: usize = 200;

// ─────────────────────────────────────────────────────────────────────────────
// Document
// ─────────────────────────────────────────────────────────────────────────────

/// The Markdown document being edited.
#[derive(Debug, Clone)]
pub struct Document {
    pub path: Option<PathBuf>,
    pub content: String,
    /// Content as last loaded or saved
    saved_content: String,
    /// Caret position in chars
    pub cursor: usize,
    /// Selection in chars, `start <= end`
    pub selection: Option<(usize, usize)>,
    undo_stack: Vec<String>,
    redo_stack: Vec<String>,
    pub needs_focus: bool,
    /// Cursor/selection set by a command, to be pushed into the text widget
    pending_cursor: bool,
}

impl Default for Document {
    fn default() -> Self {
        Self::new()
    }
}

impl Document {
    pub fn new() -> Self {
        Self {
            path: None,
            content: String::new(),
            saved_content: String::new(),
            cursor: 0,
            selection: None,
            undo_stack: Vec::new(),
            redo_stack: Vec::new(),
            needs_focus: true,
            pending_cursor: false,
        }
    }

    pub fn with_file(path: PathBuf, content: String) -> Self {
        Self {
            path: Some(path),
            saved_content: content.clone(),
            content,
            ..Self::new()
        }
    }

    /// Read a UTF-8 Markdown file.
    pub fn load(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path).map_err(|source| Error::FileRead {
            path: path.to_path_buf(),
            source,
        })?;
        // Editors on Windows may leave a BOM and CRLF endings
        let content = content.trim_start_matches('\u{feff}').replace("\r\n", "\n");
        info!("Opened {}", path.display());
        Ok(Self::with_file(path.to_path_buf(), content))
    }

    pub fn is_modified(&self) -> bool {
        self.content != self.saved_content
    }

    pub fn file_name(&self) -> Option<&str> {
        self.path.as_ref()?.file_name()?.to_str()
    }

    /// Window title text, with `*` when modified.
    pub fn title(&self) -> String {
        let name = self.file_name().unwrap_or("未命名");
        if self.is_modified() {
            format!("{}*", name)
        } else {
            name.to_string()
        }
    }

    pub fn directory(&self) -> Option<&Path> {
        self.path
            .as_deref()?
            .parent()
            .filter(|d| !d.as_os_str().is_empty())
    }

    pub fn mark_saved(&mut self) {
        self.saved_content = self.content.clone();
    }

    /// Write the buffer to its path.
    pub fn save(&mut self) -> Result<PathBuf> {
        let path = self
            .path
            .clone()
            .ok_or_else(|| Error::Application("No file path set. Use 'Save As' instead.".to_string()))?;
        self.save_as(path)
    }

    pub fn save_as(&mut self, path: PathBuf) -> Result<PathBuf> {
        std::fs::write(&path, &self.content).map_err(|source| Error::FileWrite {
            path: path.clone(),
            source,
        })?;
        self.path = Some(path.clone());
        self.mark_saved();
        info!("Saved {}", path.display());
        Ok(path)
    }

    /// Replace the content from a command (format, normalize), recording undo.
    pub fn set_content(&mut self, new_content: String) {
        if new_content != self.content {
            let old = std::mem::replace(&mut self.content, new_content);
            self.push_undo(old);
        }
    }

    /// Apply a command result: new text plus where the caret goes.
    pub fn apply_result(&mut self, text: String, cursor: usize, selection: Option<(usize, usize)>) {
        self.set_content(text);
        self.place_cursor(cursor, selection);
    }

    pub fn place_cursor(&mut self, cursor: usize, selection: Option<(usize, usize)>) {
        let len = self.content.chars().count();
        self.cursor = cursor.min(len);
        self.selection = selection
            .map(|(a, b)| (a.min(len), b.min(len)))
            .filter(|(a, b)| a != b);
        self.pending_cursor = true;
        self.needs_focus = true;
    }

    /// Take the cursor a command placed, if any.
    pub fn take_pending_cursor(&mut self) -> Option<(usize, Option<(usize, usize)>)> {
        if std::mem::take(&mut self.pending_cursor) {
            Some((self.cursor, self.selection))
        } else {
            None
        }
    }

    /// Record an edit the text widget already applied in place.
    pub fn record_edit(&mut self, old_content: String) {
        if old_content != self.content {
            self.push_undo(old_content);
        }
    }

    fn push_undo(&mut self, old: String) {
        self.undo_stack.push(old);
        if self.undo_stack.len() > MAX_UNDO {
            self.undo_stack.remove(0);
        }
        self.redo_stack.clear();
    }

    pub fn undo(&mut self) -> bool {
        match self.undo_stack.pop() {
            Some(previous) => {
                let current = std::mem::replace(&mut self.content, previous);
                self.redo_stack.push(current);
                self.after_history_jump();
                true
            }
            None => false,
        }
    }

    pub fn redo(&mut self) -> bool {
        match self.redo_stack.pop() {
            Some(next) => {
                let current = std::mem::replace(&mut self.content, next);
                self.undo_stack.push(current);
                self.after_history_jump();
                true
            }
            None => false,
        }
    }

    fn after_history_jump(&mut self) {
        let len = self.content.chars().count();
        self.cursor = self.cursor.min(len);
        self.selection = None;
        self.pending_cursor = true;
    }

    pub fn can_undo(&self) -> bool {
        !self.undo_stack.is_empty()
    }

    pub fn can_redo(&self) -> bool {
        !self.redo_stack.is_empty()
    }

    /// Selection as a char range, or the empty range at the caret.
    pub fn selection_range(&self) -> (usize, usize) {
        self.selection.unwrap_or((self.cursor, self.cursor))
    }

    /// 1-based line and column of the caret.
    pub fn cursor_line_col(&self) -> (usize, usize) {
        let (line, col) = char_index_to_line_col(&self.content, self.cursor);
        (line + 1, col + 1)
    }

    pub fn stats(&self) -> TextStats {
        TextStats::from_text(&self.content)
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Text statistics
// ─────────────────────────────────────────────────────────────────────────────

/// Counts for the status bar. Each CJK character counts as one word.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct TextStats {
    pub words: usize,
    pub characters: usize,
    pub characters_no_spaces: usize,
    pub lines: usize,
}

fn is_cjk(c: char) -> bool {
    matches!(c as u32,
        0x3400..=0x4DBF
        | 0x4E00..=0x9FFF
        | 0xF900..=0xFAFF
        | 0x20000..=0x2FA1F
        | 0x3040..=0x30FF
        | 0xAC00..=0xD7AF)
}

impl TextStats {
    pub fn from_text(text: &str) -> Self {
        let mut stats = Self {
            lines: text.lines().count().max(1),
            ..Self::default()
        };
        let mut in_word = false;
        for c in text.chars() {
            stats.characters += 1;
            if c.is_whitespace() {
                in_word = false;
                continue;
            }
            stats.characters_no_spaces += 1;
            if is_cjk(c) {
                stats.words += 1;
                in_word = false;
            } else if c.is_alphanumeric() {
                if !in_word {
                    stats.words += 1;
                    in_word = true;
                }
            } else {
                in_word = false;
            }
        }
        stats
    }

    pub fn format_compact(&self) -> String {
        format!("{} 字 · {} 字符", self.words, self.characters_no_spaces)
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// UI state
// ─────────────────────────────────────────────────────────────────────────────

/// Actions that wait for "discard unsaved changes?" confirmation.
#[derive(Debug, Clone, PartialEq)]
pub enum PendingAction {
    NewDocument,
    OpenFile(PathBuf),
    Exit,
}

/// An error shown in the modal, with the follow-up the user can take.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ErrorModal {
    pub title: String,
    pub detail: String,
    /// Install instructions when a converter is missing
    pub hint: Option<String>,
    /// Offer "Locate pandoc…"
    pub offer_locate: bool,
}

#[derive(Debug, Clone, Default)]
pub struct UiState {
    pub show_settings: bool,
    pub show_table_dialog: bool,
    pub table_rows: usize,
    pub table_cols: usize,
    pub show_confirm_dialog: bool,
    pub pending_action: Option<PendingAction>,
    pub error: Option<ErrorModal>,
    pub toast_message: Option<String>,
    pub toast_expires_at: Option<f64>,
}

// ─────────────────────────────────────────────────────────────────────────────
// Application state
// ─────────────────────────────────────────────────────────────────────────────

#[derive(Debug)]
pub struct AppState {
    pub document: Document,
    pub settings: Settings,
    pub ui: UiState,
    settings_dirty: bool,
}

impl Default for AppState {
    fn default() -> Self {
        Self::new()
    }
}

impl AppState {
    pub fn new() -> Self {
        let settings = load_config();
        debug!("Theme: {:?}, font size: {}", settings.theme, settings.font_size);
        Self::with_settings(settings)
    }

    pub fn with_settings(settings: Settings) -> Self {
        Self {
            document: Document::new(),
            settings,
            ui: UiState {
                table_rows: 3,
                table_cols: 3,
                ..UiState::default()
            },
            settings_dirty: false,
        }
    }

    // ─────────────────────────────────────────────────────────────────────────
    // Documents
    // ─────────────────────────────────────────────────────────────────────────

    /// Replace the document with a new empty one, asking first when modified.
    pub fn new_document(&mut self) -> bool {
        if self.document.is_modified() {
            self.ask_confirmation(PendingAction::NewDocument);
            return false;
        }
        self.document = Document::new();
        true
    }

    /// Open `path`, asking first when the current document is modified.
    pub fn open_file(&mut self, path: PathBuf) -> Result<bool> {
        if self.document.is_modified() {
            self.ask_confirmation(PendingAction::OpenFile(path));
            return Ok(false);
        }
        self.force_open_file(path)?;
        Ok(true)
    }

    fn force_open_file(&mut self, path: PathBuf) -> Result<()> {
        self.document = Document::load(&path)?;
        self.settings.add_recent_file(path);
        self.settings_dirty = true;
        Ok(())
    }

    pub fn save_document_as(&mut self, path: PathBuf) -> Result<PathBuf> {
        let saved = self.document.save_as(path)?;
        self.settings.add_recent_file(saved.clone());
        self.settings_dirty = true;
        Ok(saved)
    }

    // ─────────────────────────────────────────────────────────────────────────
    // Confirmation
    // ─────────────────────────────────────────────────────────────────────────

    fn ask_confirmation(&mut self, action: PendingAction) {
        self.ui.pending_action = Some(action);
        self.ui.show_confirm_dialog = true;
    }

    /// Run the pending action after the user agreed to discard changes.
    ///
    /// Returns `true` when the confirmed action was an exit.
    pub fn handle_confirmed_action(&mut self) -> bool {
        self.ui.show_confirm_dialog = false;
        match self.ui.pending_action.take() {
            Some(PendingAction::NewDocument) => {
                self.document = Document::new();
                false
            }
            Some(PendingAction::OpenFile(path)) => {
                if let Err(e) = self.force_open_file(path) {
                    self.show_error(&e);
                }
                false
            }
            Some(PendingAction::Exit) => true,
            None => false,
        }
    }

    pub fn cancel_pending_action(&mut self) {
        self.ui.pending_action = None;
        self.ui.show_confirm_dialog = false;
    }

    /// `true` when exit may proceed now.
    pub fn request_exit(&mut self) -> bool {
        if self.document.is_modified() {
            self.ask_confirmation(PendingAction::Exit);
            false
        } else {
            true
        }
    }

    // ─────────────────────────────────────────────────────────────────────────
    // Settings
    // ─────────────────────────────────────────────────────────────────────────

    pub fn update_settings<F>(&mut self, f: F)
    where
        F: FnOnce(&mut Settings),
    {
        f(&mut self.settings);
        self.settings.sanitize();
        self.settings_dirty = true;
    }

    pub fn mark_settings_dirty(&mut self) {
        self.settings_dirty = true;
    }

    pub fn save_settings_if_dirty(&mut self) -> bool {
        if !self.settings_dirty {
            return false;
        }
        if save_config_silent(&self.settings) {
            self.settings_dirty = false;
            debug!("Settings saved");
            true
        } else {
            warn!("Failed to save settings");
            false
        }
    }

    pub fn shutdown(&mut self) {
        self.settings_dirty = true;
        self.save_settings_if_dirty();
        info!("AppState shutdown complete");
    }

    // ─────────────────────────────────────────────────────────────────────────
    // Messages
    // ─────────────────────────────────────────────────────────────────────────

    pub fn show_error(&mut self, error: &Error) {
        self.ui.error = Some(ErrorModal {
            title: error.user_message(),
            detail: error.to_string(),
            hint: error.install_hint().map(str::to_string),
            offer_locate: matches!(error, Error::ConverterNotFound { tool, .. } if tool == "pandoc"),
        });
    }

    pub fn show_error_message(&mut self, title: impl Into<String>, detail: impl Into<String>) {
        self.ui.error = Some(ErrorModal {
            title: title.into(),
            detail: detail.into(),
            ..ErrorModal::default()
        });
    }

    pub fn dismiss_error(&mut self) {
        self.ui.error = None;
    }

    pub fn show_toast(&mut self, message: impl Into<String>, current_time: f64, duration: f64) {
        self.ui.toast_message = Some(message.into());
        self.ui.toast_expires_at = Some(current_time + duration);
    }

    pub fn update_toast(&mut self, current_time: f64) {
        if let Some(expires_at) = self.ui.toast_expires_at {
            if current_time >= expires_at {
                self.ui.toast_message = None;
                self.ui.toast_expires_at = None;
            }
        }
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Tests
// ─────────────────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;

    fn state() -> AppState {
        AppState::with_settings(Settings::default())
    }

    #[test]
    fn test_document_modified_and_title() {
        let mut doc = Document::with_file(PathBuf::from("/notes/报告.md"), "a".to_string());
        assert!(!doc.is_modified());
        assert_eq!(doc.title(), "报告.md");
        doc.set_content("ab".to_string());
        assert!(doc.is_modified());
        assert_eq!(doc.title(), "报告.md*");
        assert_eq!(Document::new().title(), "未命名");
    }

    #[test]
    fn test_undo_redo() {
        let mut doc = Document::new();
        doc.set_content("one".to_string());
        doc.set_content("two".to_string());

        assert!(doc.undo());
        assert_eq!(doc.content, "one");
        assert!(doc.can_redo());
        assert!(doc.redo());
        assert_eq!(doc.content, "two");
        assert!(doc.undo() && doc.undo());
        assert_eq!(doc.content, "");
        assert!(!doc.undo());
    }

    #[test]
    fn test_new_edit_clears_redo() {
        let mut doc = Document::new();
        doc.set_content("a".to_string());
        doc.undo();
        assert!(doc.can_redo());
        let old = doc.content.clone();
        doc.content.push('x');
        doc.record_edit(old);
        assert!(!doc.can_redo());
        assert!(doc.can_undo());
    }

    #[test]
    fn test_undo_clamps_cursor() {
        let mut doc = Document::new();
        doc.set_content("long text".to_string());
        doc.cursor = 9;
        doc.undo();
        assert_eq!(doc.cursor, 0);
    }

    #[test]
    fn test_apply_result_places_cursor_once() {
        let mut doc = Document::new();
        doc.apply_result("**粗体**".to_string(), 2, Some((2, 4)));
        assert_eq!(doc.content, "**粗体**");
        assert_eq!(doc.take_pending_cursor(), Some((2, Some((2, 4)))));
        assert_eq!(doc.take_pending_cursor(), None);

        doc.place_cursor(99, Some((3, 3)));
        assert_eq!(doc.take_pending_cursor(), Some((6, None)));
    }

    #[test]
    fn test_undo_history_is_bounded() {
        let mut doc = Document::new();
        for i in 0..(MAX_UNDO + 20) {
            doc.set_content(i.to_string());
        }
        let mut undone = 0;
        while doc.undo() {
            undone += 1;
        }
        assert_eq!(undone, MAX_UNDO);
    }

    #[test]
    fn test_load_strips_bom_and_crlf() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("a.md");
        std::fs::write(&path, "\u{feff}# 标题\r\n正文\r\n").unwrap();
        let doc = Document::load(&path).unwrap();
        assert_eq!(doc.content, "# 标题\n正文\n");
        assert!(!doc.is_modified());
        assert_eq!(doc.directory(), Some(dir.path()));
    }

    #[test]
    fn test_load_missing_file() {
        let err = Document::load(Path::new("/definitely/missing.md")).unwrap_err();
        assert!(matches!(err, Error::FileRead { .. }));
    }

    #[test]
    fn test_save_as_sets_path() {
        let dir = tempfile::tempdir().unwrap();
        let mut doc = Document::new();
        doc.set_content("内容".to_string());
        assert!(doc.save().is_err());
        let path = dir.path().join("out.md");
        doc.save_as(path.clone()).unwrap();
        assert_eq!(std::fs::read_to_string(&path).unwrap(), "内容");
        assert!(!doc.is_modified());
        assert_eq!(doc.path.as_deref(), Some(path.as_path()));
    }

    #[test]
    fn test_cursor_line_col() {
        let mut doc = Document::with_file(PathBuf::from("a.md"), "ab\n中文".to_string());
        doc.cursor = 4;
        assert_eq!(doc.cursor_line_col(), (2, 2));
    }

    #[test]
    fn test_stats_count_cjk_per_character() {
        let stats = TextStats::from_text("中文 hello world\n第二行");
        assert_eq!(stats.words, 2 + 2 + 3);
        assert_eq!(stats.lines, 2);
        assert_eq!(stats.characters_no_spaces, 2 + 10 + 3);
        assert_eq!(TextStats::from_text("").lines, 1);
    }

    #[test]
    fn test_open_asks_when_modified() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("b.md");
        std::fs::write(&path, "B").unwrap();

        let mut state = state();
        state.document.set_content("unsaved".to_string());
        assert!(!state.open_file(path.clone()).unwrap());
        assert!(state.ui.show_confirm_dialog);
        assert_eq!(state.document.content, "unsaved");

        assert!(!state.handle_confirmed_action());
        assert_eq!(state.document.content, "B");
        assert_eq!(state.settings.recent_files.first(), Some(&path));
    }

    #[test]
    fn test_exit_confirmation() {
        let mut state = state();
        assert!(state.request_exit());
        state.document.set_content("x".to_string());
        assert!(!state.request_exit());
        assert_eq!(state.ui.pending_action, Some(PendingAction::Exit));
        state.cancel_pending_action();
        assert!(state.ui.pending_action.is_none());
        state.request_exit();
        assert!(state.handle_confirmed_action());
    }

    #[test]
    fn test_missing_pandoc_offers_locate() {
        let mut state = state();
        state.show_error(&Error::converter_not_found("pandoc"));
        let modal = state.ui.error.clone().unwrap();
        assert!(modal.offer_locate);
        assert!(modal.hint.unwrap().contains("pandoc.org"));

        state.show_error(&Error::converter_not_found("LibreOffice"));
        assert!(!state.ui.error.as_ref().unwrap().offer_locate);
        state.dismiss_error();
        assert!(state.ui.error.is_none());
    }

    #[test]
    fn test_toast_expires() {
        let mut state = state();
        state.show_toast("已保存", 10.0, 2.0);
        state.update_toast(11.0);
        assert!(state.ui.toast_message.is_some());
        state.update_toast(12.5);
        assert!(state.ui.toast_message.is_none());
    }
}
