//! Main application module for PaperSmith
//!
//! Implements `eframe::App`: toolbar, editor/preview split, status bar,
//! keyboard shortcuts, dialogs and the background export job.

use crate::config::WindowSize;
use crate::editor::{EditorOutput, EditorWidget};
use crate::error::{Error, PANDOC_INSTALL_URL};
use crate::export::{
    copy_html_to_clipboard, generate_html_document, Converters, DocumentFormat, ExportJob,
    ExportOptions, ExportRequest, HtmlOptions,
};
use crate::files::{
    export_dialog, open_file_dialog, pick_executable_dialog, pick_file_dialog, save_as_dialog,
    suggested_filename,
};
use crate::fonts;
use crate::markdown::{apply_format, is_normalized, normalize_with_cursor, FormatCommand, KatexCdn};
use crate::preview::{PreviewOutput, PreviewState, PreviewView, ScrollOrigin, MIN_SCROLL_DELTA};
use crate::state::AppState;
use crate::theme::ThemeManager;
use crate::ui::{
    format_elapsed, show_confirm_dialog, show_error_dialog, show_export_progress,
    show_table_dialog, ConfirmResult, ErrorDialogResult, SettingsPanel, TableDialogResult, Toolbar,
    ToolbarAction, ToolbarState,
};
use eframe::egui;
use log::{debug, info, warn};
use std::io::Write;
use std::path::{Path, PathBuf};
use std::time::{Duration, Instant};

const APP_NAME: &str = "PaperSmith";
const IMAGE_EXTENSIONS: &[&str] = &["png", "jpg", "jpeg", "gif", "bmp", "svg", "webp"];

/// Shortcuts detected before the editor sees the keys.
#[derive(Debug, Clone, Copy, PartialEq)]
enum KeyboardAction {
    New,
    Open,
    Save,
    SaveAs,
    Undo,
    Redo,
    Bold,
    Italic,
    OpenSettings,
}

pub struct PaperSmithApp {
    state: AppState,
    theme: ThemeManager,
    toolbar: Toolbar,
    settings_panel: SettingsPanel,
    preview: PreviewState,
    math: KatexCdn,
    preview_visible: bool,
    export_job: Option<ExportJob>,
    /// Result line of the last export, for the status bar
    export_status: Option<String>,
    pending_editor_scroll: Option<f32>,
    pending_preview_scroll: Option<f32>,
    /// HTML pages opened in the browser; removed on exit
    browser_pages: Vec<tempfile::TempPath>,
    should_exit: bool,
    start_time: Instant,
    last_title: String,
    last_window_size: Option<egui::Vec2>,
}

impl PaperSmithApp {
    pub fn new(cc: &eframe::CreationContext<'_>, initial_file: Option<PathBuf>) -> Self {
        info!("Initializing {}", APP_NAME);

        let mut state = AppState::new();
        fonts::setup_fonts(&cc.egui_ctx, state.settings.cjk_font_path.as_deref());

        let mut theme = ThemeManager::new(state.settings.theme);
        theme.apply_if_needed(&cc.egui_ctx);

        if let Some(path) = initial_file {
            if let Err(e) = state.open_file(path) {
                warn!("Failed to open startup file: {}", e);
                state.show_error(&e);
            }
        }

        let math = KatexCdn::default();
        let mut preview = PreviewState::new(state.settings.sync_scroll_enabled);
        preview.rebuild(&state.document.content, &math);

        Self {
            state,
            theme,
            toolbar: Toolbar::new(),
            settings_panel: SettingsPanel::new(),
            preview,
            math,
            preview_visible: true,
            export_job: None,
            export_status: None,
            pending_editor_scroll: None,
            pending_preview_scroll: None,
            browser_pages: Vec::new(),
            should_exit: false,
            start_time: Instant::now(),
            last_title: String::new(),
            last_window_size: None,
        }
    }

    fn get_app_time(&self) -> f64 {
        self.start_time.elapsed().as_secs_f64()
    }

    fn toast(&mut self, message: impl Into<String>) {
        let time = self.get_app_time();
        self.state.show_toast(message, time, 2.5);
    }

    fn window_title(&self) -> String {
        format!("{} - {}", self.state.document.title(), APP_NAME)
    }

    /// The document was replaced (new, open, confirmed action).
    fn on_document_replaced(&mut self) {
        self.preview.rebuild(&self.state.document.content, &self.math);
        self.pending_editor_scroll = Some(0.0);
        self.pending_preview_scroll = Some(0.0);
    }

    fn on_content_edited(&mut self) {
        self.preview.mark_dirty(Instant::now());
    }

    // ─────────────────────────────────────────────────────────────────────────
    // Window
    // ─────────────────────────────────────────────────────────────────────────

    fn update_window_state(&mut self, ctx: &egui::Context) {
        let Some(rect) = ctx.input(|i| i.viewport().inner_rect) else {
            return;
        };
        let size = rect.size();
        if self.last_window_size.map_or(false, |s| (s - size).length() <= 1.0) {
            return;
        }
        self.last_window_size = Some(size);
        let maximized = ctx.input(|i| i.viewport().maximized.unwrap_or(false));
        if !maximized {
            self.state.settings.window_size = WindowSize {
                width: size.x,
                height: size.y,
                maximized,
            };
        } else {
            self.state.settings.window_size.maximized = true;
        }
        debug!("Window state updated: {}x{}, maximized: {}", size.x, size.y, maximized);
    }

    /// `true` when the application may close now.
    fn handle_close_request(&mut self) -> bool {
        if self.should_exit {
            return true;
        }
        if self.state.request_exit() {
            self.shutdown();
            true
        } else {
            false
        }
    }

    fn shutdown(&mut self) {
        if let Some(job) = &self.export_job {
            job.cancel();
        }
        self.state.shutdown();
    }

    fn handle_dropped_files(&mut self, ctx: &egui::Context) {
        let dropped: Vec<PathBuf> = ctx.input(|i| {
            i.raw
                .dropped_files
                .iter()
                .filter_map(|f| f.path.clone())
                .collect()
        });
        let markdown = dropped
            .into_iter()
            .find(|p| DocumentFormat::from_path(p) == Some(DocumentFormat::Markdown));
        if let Some(path) = markdown {
            info!("File dropped: {}", path.display());
            self.open_path(path);
        }
    }

    // ─────────────────────────────────────────────────────────────────────────
    // Files
    // ─────────────────────────────────────────────────────────────────────────

    fn initial_directory(&self) -> Option<PathBuf> {
        self.state
            .document
            .directory()
            .map(Path::to_path_buf)
            .or_else(|| {
                self.state
                    .settings
                    .recent_files
                    .first()
                    .and_then(|p| p.parent())
                    .map(Path::to_path_buf)
            })
    }

    fn handle_new(&mut self) {
        if self.state.new_document() {
            self.on_document_replaced();
        }
    }

    fn handle_open(&mut self) {
        let dir = self.initial_directory();
        if let Some(path) = open_file_dialog(dir.as_deref()) {
            self.open_path(path);
        }
    }

    fn open_path(&mut self, path: PathBuf) {
        match self.state.open_file(path) {
            Ok(true) => self.on_document_replaced(),
            Ok(false) => {}
            Err(e) => {
                warn!("Failed to open file: {}", e);
                self.state.show_error(&e);
            }
        }
    }

    fn handle_save(&mut self) {
        if self.state.document.path.is_none() {
            self.handle_save_as();
            return;
        }
        match self.state.document.save() {
            Ok(path) => self.toast(format!("已保存 {}", display_name(&path))),
            Err(e) => {
                warn!("Failed to save: {}", e);
                self.state.show_error(&e);
            }
        }
    }

    /// Save As: the chosen extension decides between writing Markdown and exporting.
    fn handle_save_as(&mut self) {
        let dir = self.initial_directory();
        let default_name = match self.state.document.file_name() {
            Some(name) => name.to_string(),
            None => suggested_filename(
                None,
                &self.state.document.content,
                DocumentFormat::Markdown,
                chrono::Local::now(),
            ),
        };
        let Some(path) = save_as_dialog(dir.as_deref(), &default_name) else {
            return;
        };
        match DocumentFormat::from_path(&path) {
            Some(DocumentFormat::Docx) => self.start_export(path, DocumentFormat::Docx),
            Some(DocumentFormat::Pdf) => self.start_export(path, DocumentFormat::Pdf),
            Some(DocumentFormat::Markdown) | None => match self.state.save_document_as(path) {
                Ok(saved) => self.toast(format!("已保存 {}", display_name(&saved))),
                Err(e) => {
                    warn!("Failed to save: {}", e);
                    self.state.show_error(&e);
                }
            },
        }
    }

    // ─────────────────────────────────────────────────────────────────────────
    // Export
    // ─────────────────────────────────────────────────────────────────────────

    fn handle_export(&mut self, format: DocumentFormat) {
        let dir = self
            .state
            .settings
            .export_directory()
            .or_else(|| self.initial_directory());
        let name = suggested_filename(
            self.state.document.path.as_deref(),
            &self.state.document.content,
            format,
            chrono::Local::now(),
        );
        if let Some(target) = export_dialog(dir.as_deref(), &name, format) {
            self.start_export(target, format);
        }
    }

    fn start_export(&mut self, target: PathBuf, format: DocumentFormat) {
        if self.export_job.is_some() {
            self.toast("已有导出任务在运行");
            return;
        }
        if self.state.document.content.trim().is_empty() {
            self.state.show_error(&Error::EmptyDocument);
            return;
        }

        let request = ExportRequest {
            markdown: self.state.document.content.clone(),
            target: target.clone(),
            format,
            source_dir: self.state.document.directory().map(Path::to_path_buf),
        };
        let converters = Converters::from_settings(&self.state.settings);
        let options = ExportOptions::from_settings(&self.state.settings);

        match ExportJob::spawn(request, converters, options) {
            Ok(job) => {
                info!("Exporting {} to {}", format.label(), target.display());
                self.export_job = Some(job);
                self.export_status = None;
                if let Some(parent) = target.parent() {
                    self.state.update_settings(|s| s.last_export_directory = Some(parent.to_path_buf()));
                }
            }
            Err(e) => {
                warn!("Failed to start export: {}", e);
                self.state.show_error(&e);
            }
        }
    }

    fn poll_export(&mut self, ctx: &egui::Context) {
        let Some(job) = self.export_job.as_mut() else {
            return;
        };
        let Some(result) = job.poll() else {
            ctx.request_repaint_after(Duration::from_millis(100));
            return;
        };
        self.export_job = None;

        match result {
            Ok(outcome) => {
                let name = display_name(&outcome.path);
                let status = format!("已导出 {} ({})", name, format_elapsed(outcome.elapsed));
                self.toast(status.clone());
                self.export_status = Some(status);
                if self.state.settings.open_after_export {
                    if let Err(e) = open::that(&outcome.path) {
                        warn!("Failed to open exported file: {}", e);
                    }
                }
            }
            Err(e) if e.is_cancelled() => {
                self.export_status = Some("导出已取消".to_string());
                self.toast("导出已取消");
            }
            Err(e) => {
                self.export_status = Some(format!("导出失败: {}", e.user_message()));
                self.state.show_error(&e);
            }
        }
    }

    fn handle_open_in_browser(&mut self) {
        let title = self.state.document.title();
        let options = HtmlOptions {
            margin_v: self.state.settings.margin_v,
            margin_h: self.state.settings.margin_h,
            show_margins: self.state.settings.show_preview_margins,
            renderer: &self.math,
        };
        let html = generate_html_document(&self.state.document.content, Some(&title), &options);

        let written = tempfile::Builder::new()
            .prefix("papersmith-preview-")
            .suffix(".html")
            .tempfile()
            .and_then(|mut file| {
                file.write_all(html.as_bytes())?;
                file.flush()?;
                Ok(file.into_temp_path())
            });
        match written {
            Ok(page) => {
                if let Err(e) = open::that(page.as_os_str()) {
                    warn!("Failed to open browser: {}", e);
                    self.state.show_error_message("无法打开浏览器", e.to_string());
                    return;
                }
                info!("Opened preview page {}", page.display());
                self.browser_pages.push(page);
            }
            Err(e) => self.state.show_error(&Error::Io(e)),
        }
    }

    fn handle_copy_html(&mut self) {
        match copy_html_to_clipboard(&self.state.document.content) {
            Ok(()) => {
                info!("Copied HTML to clipboard");
                self.toast("已复制为富文本");
            }
            Err(e) => {
                warn!("Failed to copy HTML to clipboard: {}", e);
                self.toast(format!("复制失败: {}", e));
            }
        }
    }

    // ─────────────────────────────────────────────────────────────────────────
    // Editing
    // ─────────────────────────────────────────────────────────────────────────

    fn handle_format(&mut self, command: FormatCommand) {
        let doc = &mut self.state.document;
        debug!("Format {:?} at {:?}", command, doc.selection_range());
        let result = apply_format(&doc.content, doc.selection_range(), command);
        doc.apply_result(result.text, result.cursor, result.selection);
        self.on_content_edited();
    }

    fn handle_insert_image(&mut self) {
        let Some(path) = pick_file_dialog("插入图片", "Images", IMAGE_EXTENSIONS) else {
            return;
        };
        let link = image_link(&path, self.state.document.directory());
        self.handle_format(FormatCommand::Image(link));
    }

    fn handle_normalize(&mut self) {
        let doc = &mut self.state.document;
        let (text, cursor) = normalize_with_cursor(&doc.content, doc.cursor);
        if text == doc.content {
            self.toast("排版无需调整");
            return;
        }
        doc.apply_result(text, cursor, None);
        self.on_content_edited();
    }

    fn handle_undo(&mut self) {
        if self.state.document.undo() {
            self.on_content_edited();
        }
    }

    fn handle_redo(&mut self) {
        if self.state.document.redo() {
            self.on_content_edited();
        }
    }

    fn handle_cycle_theme(&mut self) {
        let theme = self.theme.cycle();
        self.state.update_settings(|s| s.theme = theme);
        self.toast(format!("主题: {}", theme.label()));
    }

    fn handle_toolbar_action(&mut self, action: ToolbarAction) {
        debug!("Toolbar: {:?}", action);
        match action {
            ToolbarAction::New => self.handle_new(),
            ToolbarAction::Open => self.handle_open(),
            ToolbarAction::Save => self.handle_save(),
            ToolbarAction::SaveAs => self.handle_save_as(),
            ToolbarAction::Undo => self.handle_undo(),
            ToolbarAction::Redo => self.handle_redo(),
            ToolbarAction::Format(command) => self.handle_format(command),
            ToolbarAction::InsertTable => self.state.ui.show_table_dialog = true,
            ToolbarAction::InsertImage => self.handle_insert_image(),
            ToolbarAction::Normalize => self.handle_normalize(),
            ToolbarAction::ExportDocx => self.handle_export(DocumentFormat::Docx),
            ToolbarAction::ExportPdf => self.handle_export(DocumentFormat::Pdf),
            ToolbarAction::OpenInBrowser => self.handle_open_in_browser(),
            ToolbarAction::CopyHtml => self.handle_copy_html(),
            ToolbarAction::TogglePreview => self.preview_visible = !self.preview_visible,
            ToolbarAction::ToggleSyncScroll => {
                let enabled = !self.state.settings.sync_scroll_enabled;
                self.state.update_settings(|s| s.sync_scroll_enabled = enabled);
                self.preview.sync.enabled = enabled;
            }
            ToolbarAction::CycleTheme => self.handle_cycle_theme(),
            ToolbarAction::OpenSettings => self.state.ui.show_settings = true,
        }
    }

    fn handle_keyboard_shortcuts(&mut self, ctx: &egui::Context) {
        use egui::{Key, Modifiers};
        let shift = Modifiers::COMMAND | Modifiers::SHIFT;

        let action = ctx.input_mut(|i| {
            // More specific combinations first
            if i.consume_key(shift, Key::S) || i.consume_key(Modifiers::NONE, Key::F12) {
                Some(KeyboardAction::SaveAs)
            } else if i.consume_key(shift, Key::Z) || i.consume_key(Modifiers::COMMAND, Key::Y) {
                Some(KeyboardAction::Redo)
            } else if i.consume_key(Modifiers::COMMAND, Key::Z) {
                Some(KeyboardAction::Undo)
            } else if i.consume_key(Modifiers::COMMAND, Key::S) {
                Some(KeyboardAction::Save)
            } else if i.consume_key(Modifiers::COMMAND, Key::O) {
                Some(KeyboardAction::Open)
            } else if i.consume_key(Modifiers::COMMAND, Key::N) {
                Some(KeyboardAction::New)
            } else if i.consume_key(Modifiers::COMMAND, Key::B) {
                Some(KeyboardAction::Bold)
            } else if i.consume_key(Modifiers::COMMAND, Key::I) {
                Some(KeyboardAction::Italic)
            } else if i.consume_key(Modifiers::COMMAND, Key::Comma) {
                Some(KeyboardAction::OpenSettings)
            } else {
                None
            }
        });

        let Some(action) = action else {
            return;
        };
        debug!("Keyboard shortcut: {:?}", action);
        match action {
            KeyboardAction::New => self.handle_new(),
            KeyboardAction::Open => self.handle_open(),
            KeyboardAction::Save => self.handle_save(),
            KeyboardAction::SaveAs => self.handle_save_as(),
            KeyboardAction::Undo => self.handle_undo(),
            KeyboardAction::Redo => self.handle_redo(),
            KeyboardAction::Bold => self.handle_format(FormatCommand::Bold),
            KeyboardAction::Italic => self.handle_format(FormatCommand::Italic),
            KeyboardAction::OpenSettings => self.state.ui.show_settings = true,
        }
    }

    // ─────────────────────────────────────────────────────────────────────────
    // Preview refresh
    // ─────────────────────────────────────────────────────────────────────────

    /// Rebuild the preview once edits pause; normalize the buffer first when enabled.
    fn refresh_preview(&mut self, ctx: &egui::Context) {
        let debounce = Duration::from_millis(self.state.settings.preview_debounce_ms);
        let now = Instant::now();
        match self.preview.time_until_due(now, debounce) {
            None => {}
            Some(left) if !left.is_zero() => ctx.request_repaint_after(left),
            Some(_) => {
                let doc = &mut self.state.document;
                if self.state.settings.auto_normalize && !is_normalized(&doc.content) {
                    let (text, cursor) = normalize_with_cursor(&doc.content, doc.cursor);
                    debug!("Auto-normalized document");
                    doc.apply_result(text, cursor, None);
                }
                self.preview.update_if_due(&doc.content, now, debounce, &self.math);
            }
        }
    }

    /// Follow a user scroll on one side with the other side.
    fn sync_scroll(&mut self, editor: &EditorOutput, editor_forced: bool, preview: &PreviewOutput) {
        let sync = &mut self.preview.sync;
        let editor_moved = !editor_forced
            && (editor.scroll_offset - sync.last_editor_offset).abs() >= MIN_SCROLL_DELTA;
        sync.last_editor_offset = editor.scroll_offset;

        if editor_moved && sync.should_sync_from(ScrollOrigin::Editor) {
            let target = sync.line_to_rendered_offset(editor.top_line());
            sync.mark_scroll(ScrollOrigin::Editor);
            self.pending_preview_scroll = Some(target);
        } else if preview.user_scrolled && sync.should_sync_from(ScrollOrigin::Preview) {
            let line = sync.rendered_offset_to_line(preview.scroll_offset);
            sync.mark_scroll(ScrollOrigin::Preview);
            self.pending_editor_scroll = Some(editor.offset_for_line(line));
        }
        sync.clear_origin();
    }

    // ─────────────────────────────────────────────────────────────────────────
    // Rendering
    // ─────────────────────────────────────────────────────────────────────────

    fn render_ui(&mut self, ctx: &egui::Context) {
        let is_dark = self.theme.is_dark();

        egui::TopBottomPanel::top("toolbar")
            .exact_height(self.toolbar.height())
            .show(ctx, |ui| {
                let toolbar_state = ToolbarState {
                    can_undo: self.state.document.can_undo(),
                    can_redo: self.state.document.can_redo(),
                    can_save: self.state.document.is_modified() || self.state.document.path.is_none(),
                    exporting: self.export_job.is_some(),
                    preview_visible: self.preview_visible,
                    sync_scroll: self.state.settings.sync_scroll_enabled,
                    is_dark,
                };
                if let Some(action) = self.toolbar.show(ui, toolbar_state) {
                    self.handle_toolbar_action(action);
                }
            });

        egui::TopBottomPanel::bottom("status_bar")
            .exact_height(24.0)
            .show(ctx, |ui| self.render_status_bar(ui));

        let mut preview_output = None;
        if self.preview_visible {
            let total = ctx.screen_rect().width();
            let default_width = total * (1.0 - self.state.settings.split_ratio);
            let response = egui::SidePanel::right("preview_panel")
                .resizable(true)
                .default_width(default_width)
                .width_range(200.0..=(total - 200.0).max(200.0))
                .frame(egui::Frame::none())
                .show(ctx, |ui| {
                    let margins = self
                        .state
                        .settings
                        .show_preview_margins
                        .then_some((self.state.settings.margin_v, self.state.settings.margin_h));
                    PreviewView::new(&mut self.preview)
                        .font_size(self.state.settings.font_size)
                        .dark_mode(is_dark)
                        .page_margins(margins)
                        .scroll_to(self.pending_preview_scroll.take())
                        .show(ui)
                });
            let ratio = 1.0 - response.response.rect.width() / total.max(1.0);
            if (ratio - self.state.settings.split_ratio).abs() > 0.01 {
                self.state.settings.split_ratio = ratio;
                self.state.mark_settings_dirty();
            }
            preview_output = Some(response.inner);
        }

        let editor_forced = self.pending_editor_scroll.is_some();
        let editor_output = egui::CentralPanel::default()
            .frame(egui::Frame::central_panel(&ctx.style()).inner_margin(egui::Margin::same(8.0)))
            .show(ctx, |ui| {
                EditorWidget::new(&mut self.state.document)
                    .font_size(self.state.settings.font_size)
                    .word_wrap(self.state.settings.word_wrap)
                    .scroll_to(self.pending_editor_scroll.take())
                    .show(ui)
            })
            .inner;

        if editor_output.changed {
            self.on_content_edited();
        }

        if let Some(link) = preview_output.as_ref().and_then(|p| p.clicked_link.clone()) {
            if let Err(e) = open::that(&link) {
                warn!("Failed to open link {}: {}", link, e);
            }
        }
        if let Some(preview) = &preview_output {
            self.sync_scroll(&editor_output, editor_forced, preview);
        }
    }

    fn render_status_bar(&mut self, ui: &mut egui::Ui) {
        let doc = &self.state.document;
        ui.horizontal_centered(|ui| {
            let file = doc
                .path
                .as_ref()
                .map(|p| p.display().to_string())
                .unwrap_or_else(|| doc.title());
            ui.label(egui::RichText::new(file).small());
            ui.separator();
            let (line, col) = doc.cursor_line_col();
            ui.label(egui::RichText::new(format!("行 {}, 列 {}", line, col)).small());
            ui.separator();
            ui.label(egui::RichText::new(doc.stats().format_compact()).small());

            if let Some(job) = &self.export_job {
                ui.separator();
                ui.spinner();
                ui.label(
                    egui::RichText::new(format!("{} {}", job.format().label(), job.stage().label())).small(),
                );
            } else if let Some(status) = &self.export_status {
                ui.separator();
                ui.label(egui::RichText::new(status).small());
            }

            ui.with_layout(egui::Layout::right_to_left(egui::Align::Center), |ui| {
                if let Some(message) = &self.state.ui.toast_message {
                    ui.label(egui::RichText::new(message).small().strong());
                }
            });
        });
    }

    fn render_dialogs(&mut self, ctx: &egui::Context) {
        let is_dark = self.theme.is_dark();

        if self.state.ui.show_settings {
            let output = self.settings_panel.show(ctx, &mut self.state.settings, is_dark);
            if output.changed {
                self.state.mark_settings_dirty();
                self.theme.set_theme(self.state.settings.theme);
                self.preview.sync.enabled = self.state.settings.sync_scroll_enabled;
            }
            if output.fonts_changed {
                fonts::setup_fonts(ctx, self.state.settings.cjk_font_path.as_deref());
            }
            if output.close_requested {
                self.state.ui.show_settings = false;
                self.state.save_settings_if_dirty();
            }
        }

        if self.state.ui.show_table_dialog {
            let ui_state = &mut self.state.ui;
            match show_table_dialog(ctx, &mut ui_state.table_rows, &mut ui_state.table_cols, is_dark) {
                TableDialogResult::None => {}
                TableDialogResult::Cancelled => self.state.ui.show_table_dialog = false,
                TableDialogResult::Insert { rows, cols } => {
                    self.state.ui.show_table_dialog = false;
                    self.handle_format(FormatCommand::Table { rows, cols });
                }
            }
        }

        if self.state.ui.show_confirm_dialog {
            let title = self.state.document.title();
            let result = show_confirm_dialog(ctx, self.state.ui.pending_action.as_ref(), &title, is_dark);
            match result {
                ConfirmResult::None => {}
                ConfirmResult::Save => {
                    self.handle_save();
                    if self.state.document.is_modified() {
                        self.state.cancel_pending_action();
                    } else {
                        self.finish_confirmed_action();
                    }
                }
                ConfirmResult::Discard => self.finish_confirmed_action(),
                ConfirmResult::Cancel => self.state.cancel_pending_action(),
            }
        }

        if let Some(error) = self.state.ui.error.clone() {
            match show_error_dialog(ctx, &error, is_dark) {
                ErrorDialogResult::None => {}
                ErrorDialogResult::Dismissed => self.state.dismiss_error(),
                ErrorDialogResult::LocatePandoc => {
                    if let Some(path) = pick_executable_dialog("定位 pandoc") {
                        info!("pandoc located at {}", path.display());
                        self.state.update_settings(|s| s.pandoc_path = Some(path));
                        self.state.dismiss_error();
                        self.toast("已设置 pandoc 路径，请重新导出");
                    }
                }
                ErrorDialogResult::OpenInstallPage => {
                    if let Err(e) = open::that(PANDOC_INSTALL_URL) {
                        warn!("Failed to open {}: {}", PANDOC_INSTALL_URL, e);
                    }
                }
            }
        }

        if let Some(job) = &self.export_job {
            let cancel = show_export_progress(
                ctx,
                job.format().label(),
                job.stage().label(),
                job.elapsed(),
                job.is_cancelling(),
                is_dark,
            );
            if cancel {
                info!("Cancelling export to {}", job.target().display());
                job.cancel();
            }
        }
    }

    fn finish_confirmed_action(&mut self) {
        if self.state.handle_confirmed_action() {
            self.shutdown();
            self.should_exit = true;
        } else {
            self.on_document_replaced();
        }
    }
}

impl eframe::App for PaperSmithApp {
    fn update(&mut self, ctx: &egui::Context, frame: &mut eframe::Frame) {
        self.theme
            .set_system_dark(frame.info().system_theme == Some(eframe::Theme::Dark));
        if self.theme.apply_if_needed(ctx) {
            self.preview.clear_highlight_cache();
        }

        let current_time = self.get_app_time();
        self.state.update_toast(current_time);
        if self.state.ui.toast_message.is_some() {
            ctx.request_repaint_after(Duration::from_millis(250));
        }

        let title = self.window_title();
        if title != self.last_title {
            ctx.send_viewport_cmd(egui::ViewportCommand::Title(title.clone()));
            self.last_title = title;
        }

        self.update_window_state(ctx);
        self.handle_dropped_files(ctx);
        self.poll_export(ctx);

        if ctx.input(|i| i.viewport().close_requested()) && !self.handle_close_request() {
            ctx.send_viewport_cmd(egui::ViewportCommand::CancelClose);
        }

        // Before rendering, so the text widget never sees these keys
        let modal_open = self.state.ui.show_settings
            || self.state.ui.show_table_dialog
            || self.state.ui.show_confirm_dialog
            || self.state.ui.error.is_some();
        if !modal_open {
            self.handle_keyboard_shortcuts(ctx);
        }

        self.render_ui(ctx);
        self.refresh_preview(ctx);
        self.render_dialogs(ctx);

        // Not while dragging the splitter or a slider
        if !self.state.ui.show_settings && !ctx.input(|i| i.pointer.any_down()) {
            self.state.save_settings_if_dirty();
        }

        if self.should_exit {
            ctx.send_viewport_cmd(egui::ViewportCommand::Close);
        }
    }

    fn on_exit(&mut self, _gl: Option<&eframe::glow::Context>) {
        info!("Application exiting");
        self.shutdown();
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Helper Functions
// ─────────────────────────────────────────────────────────────────────────────

fn display_name(path: &Path) -> String {
    path.file_name()
        .and_then(|n| n.to_str())
        .map(str::to_string)
        .unwrap_or_else(|| path.display().to_string())
}

/// Link text for an image: relative to the document folder when inside it.
fn image_link(image: &Path, document_dir: Option<&Path>) -> String {
    document_dir
        .and_then(|dir| image.strip_prefix(dir).ok())
        .unwrap_or(image)
        .to_string_lossy()
        .into_owned()
}
