//! Modal dialogs: table insertion, unsaved changes, errors and export progress.

use crate::error::PANDOC_INSTALL_URL;
use crate::markdown::formatting::{TABLE_MAX_COLS, TABLE_MAX_ROWS};
use crate::state::{ErrorModal, PendingAction};
use eframe::egui::{self, Color32, Key, RichText};
use std::time::Duration;

fn dialog_frame(ctx: &egui::Context, is_dark: bool) -> egui::Frame {
    let (fill, border) = if is_dark {
        (Color32::from_rgb(40, 40, 45), Color32::from_rgb(70, 70, 80))
    } else {
        (Color32::from_rgb(250, 250, 250), Color32::from_rgb(180, 180, 190))
    };
    egui::Frame::window(&ctx.style())
        .fill(fill)
        .stroke(egui::Stroke::new(1.0, border))
        .rounding(8.0)
}

fn muted(is_dark: bool) -> Color32 {
    if is_dark {
        Color32::from_rgb(150, 150, 160)
    } else {
        Color32::from_rgb(100, 100, 110)
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Table
// ─────────────────────────────────────────────────────────────────────────────

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TableDialogResult {
    None,
    Cancelled,
    Insert { rows: usize, cols: usize },
}

pub fn clamp_table_size(rows: usize, cols: usize) -> (usize, usize) {
    (rows.clamp(1, TABLE_MAX_ROWS), cols.clamp(1, TABLE_MAX_COLS))
}

/// Row and column picker. `rows` includes the header row.
pub fn show_table_dialog(ctx: &egui::Context, rows: &mut usize, cols: &mut usize, is_dark: bool) -> TableDialogResult {
    if ctx.input(|i| i.key_pressed(Key::Escape)) {
        return TableDialogResult::Cancelled;
    }
    let mut result = TableDialogResult::None;

    egui::Window::new("▦ 插入表格")
        .collapsible(false)
        .resizable(false)
        .anchor(egui::Align2::CENTER_CENTER, [0.0, 0.0])
        .frame(dialog_frame(ctx, is_dark))
        .show(ctx, |ui| {
            ui.set_min_width(260.0);
            egui::Grid::new("table_size").num_columns(2).spacing([12.0, 8.0]).show(ui, |ui| {
                ui.label("行数");
                ui.add(egui::DragValue::new(rows).range(1..=TABLE_MAX_ROWS));
                ui.end_row();
                ui.label("列数");
                ui.add(egui::DragValue::new(cols).range(1..=TABLE_MAX_COLS));
                ui.end_row();
            });
            ui.label(RichText::new("行数包含表头").small().color(muted(is_dark)));
            ui.add_space(8.0);

            ui.horizontal(|ui| {
                ui.with_layout(egui::Layout::right_to_left(egui::Align::Center), |ui| {
                    if ui.button("插入").clicked() || ctx.input(|i| i.key_pressed(Key::Enter)) {
                        let (r, c) = clamp_table_size(*rows, *cols);
                        result = TableDialogResult::Insert { rows: r, cols: c };
                    }
                    ui.add_space(8.0);
                    if ui.button("取消").clicked() {
                        result = TableDialogResult::Cancelled;
                    }
                });
            });
        });

    result
}

// ─────────────────────────────────────────────────────────────────────────────
// Unsaved changes
// ─────────────────────────────────────────────────────────────────────────────

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConfirmResult {
    None,
    Save,
    Discard,
    Cancel,
}

pub fn confirm_message(action: Option<&PendingAction>, document_title: &str) -> String {
    let name = document_title.trim_end_matches('*');
    match action {
        Some(PendingAction::Exit) => format!("“{}”尚未保存。退出前要保存吗？", name),
        Some(PendingAction::OpenFile(path)) => format!(
            "“{}”尚未保存。打开 {} 前要保存吗？",
            name,
            path.file_name().and_then(|n| n.to_str()).unwrap_or("文件")
        ),
        Some(PendingAction::NewDocument) | None => format!("“{}”尚未保存。新建前要保存吗？", name),
    }
}

pub fn show_confirm_dialog(
    ctx: &egui::Context,
    action: Option<&PendingAction>,
    document_title: &str,
    is_dark: bool,
) -> ConfirmResult {
    if ctx.input(|i| i.key_pressed(Key::Escape)) {
        return ConfirmResult::Cancel;
    }
    let mut result = ConfirmResult::None;

    egui::Window::new("未保存的更改")
        .collapsible(false)
        .resizable(false)
        .anchor(egui::Align2::CENTER_CENTER, [0.0, 0.0])
        .frame(dialog_frame(ctx, is_dark))
        .show(ctx, |ui| {
            ui.set_min_width(320.0);
            ui.add_space(4.0);
            ui.label(confirm_message(action, document_title));
            ui.add_space(12.0);
            ui.horizontal(|ui| {
                if ui.button("保存").clicked() {
                    result = ConfirmResult::Save;
                }
                if ui.button("不保存").clicked() {
                    result = ConfirmResult::Discard;
                }
                if ui.button("取消").clicked() {
                    result = ConfirmResult::Cancel;
                }
            });
        });

    result
}

// ─────────────────────────────────────────────────────────────────────────────
// Errors
// ─────────────────────────────────────────────────────────────────────────────

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorDialogResult {
    None,
    Dismissed,
    /// User wants to pick the pandoc executable
    LocatePandoc,
    OpenInstallPage,
}

pub fn show_error_dialog(ctx: &egui::Context, error: &ErrorModal, is_dark: bool) -> ErrorDialogResult {
    if ctx.input(|i| i.key_pressed(Key::Escape)) {
        return ErrorDialogResult::Dismissed;
    }
    let mut result = ErrorDialogResult::None;

    egui::Window::new(format!("⚠ {}", error.title))
        .id(egui::Id::new("error_dialog"))
        .collapsible(false)
        .resizable(false)
        .anchor(egui::Align2::CENTER_CENTER, [0.0, 0.0])
        .frame(dialog_frame(ctx, is_dark))
        .show(ctx, |ui| {
            ui.set_min_width(380.0);
            ui.set_max_width(520.0);

            egui::ScrollArea::vertical().max_height(220.0).show(ui, |ui| {
                ui.label(RichText::new(&error.detail).monospace());
            });

            if let Some(hint) = &error.hint {
                ui.add_space(8.0);
                ui.label(RichText::new(hint).color(muted(is_dark)));
            }

            ui.add_space(12.0);
            ui.horizontal(|ui| {
                if error.offer_locate {
                    if ui.button("定位 pandoc…").clicked() {
                        result = ErrorDialogResult::LocatePandoc;
                    }
                    if ui.button("安装说明").on_hover_text(PANDOC_INSTALL_URL).clicked() {
                        result = ErrorDialogResult::OpenInstallPage;
                    }
                }
                ui.with_layout(egui::Layout::right_to_left(egui::Align::Center), |ui| {
                    if ui.button("确定").clicked() {
                        result = ErrorDialogResult::Dismissed;
                    }
                });
            });
        });

    result
}

// ─────────────────────────────────────────────────────────────────────────────
// Export progress
// ─────────────────────────────────────────────────────────────────────────────

pub fn format_elapsed(elapsed: Duration) -> String {
    let secs = elapsed.as_secs();
    if secs < 60 {
        format!("{}.{}s", secs, elapsed.subsec_millis() / 100)
    } else {
        format!("{}:{:02}", secs / 60, secs % 60)
    }
}

/// Progress window shown while an export job runs. Returns `true` on Cancel.
pub fn show_export_progress(
    ctx: &egui::Context,
    format_label: &str,
    stage_label: &str,
    elapsed: Duration,
    cancelling: bool,
    is_dark: bool,
) -> bool {
    let mut cancel = false;

    egui::Window::new(format!("正在导出 {}", format_label))
        .id(egui::Id::new("export_progress"))
        .collapsible(false)
        .resizable(false)
        .anchor(egui::Align2::CENTER_CENTER, [0.0, 0.0])
        .frame(dialog_frame(ctx, is_dark))
        .show(ctx, |ui| {
            ui.set_min_width(300.0);
            ui.horizontal(|ui| {
                ui.spinner();
                let text = if cancelling { "正在取消…" } else { stage_label };
                ui.label(text);
            });
            ui.label(RichText::new(format_elapsed(elapsed)).small().color(muted(is_dark)));
            ui.add_space(8.0);
            ui.with_layout(egui::Layout::right_to_left(egui::Align::Center), |ui| {
                if ui.add_enabled(!cancelling, egui::Button::new("取消")).clicked() {
                    cancel = true;
                }
            });
        });

    cancel
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::path::PathBuf;

    #[test]
    fn test_clamp_table_size() {
        assert_eq!(clamp_table_size(0, 3), (1, 3));
        assert_eq!(clamp_table_size(500, 50), (TABLE_MAX_ROWS, TABLE_MAX_COLS));
    }

    #[test]
    fn test_table_dialog_idle_frame() {
        let ctx = egui::Context::default();
        let (mut rows, mut cols) = (4, 3);
        let mut result = TableDialogResult::Cancelled;
        let _ = ctx.run(egui::RawInput::default(), |ctx| {
            result = show_table_dialog(ctx, &mut rows, &mut cols, false);
        });
        assert_eq!(result, TableDialogResult::None);
        assert_eq!((rows, cols), (4, 3));
    }

    #[test]
    fn test_confirm_message_per_action() {
        let exit = confirm_message(Some(&PendingAction::Exit), "报告.md*");
        assert!(exit.contains("报告.md"));
        assert!(!exit.contains('*'));
        assert!(exit.contains("退出"));

        let open = confirm_message(Some(&PendingAction::OpenFile(PathBuf::from("/a/b.md"))), "x");
        assert!(open.contains("b.md"));

        assert!(confirm_message(None, "x").contains("新建"));
    }

    #[test]
    fn test_format_elapsed() {
        assert_eq!(format_elapsed(Duration::from_millis(2345)), "2.3s");
        assert_eq!(format_elapsed(Duration::from_secs(125)), "2:05");
    }
}
