//! Settings window for PaperSmith
//!
//! A modal with a section list on the left. Changes apply live and are
//! saved by the app when the panel reports them.

use crate::config::{PdfBackend, Settings, Theme};
use crate::files::{pick_executable_dialog, pick_file_dialog, pick_folder_dialog};
use eframe::egui::{self, Color32, RichText, Ui};
use std::path::PathBuf;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum SettingsSection {
    #[default]
    General,
    Page,
    Converter,
    Editor,
}

impl SettingsSection {
    pub const ALL: [SettingsSection; 4] = [
        SettingsSection::General,
        SettingsSection::Page,
        SettingsSection::Converter,
        SettingsSection::Editor,
    ];

    pub fn label(&self) -> &'static str {
        match self {
            SettingsSection::General => "常规",
            SettingsSection::Page => "页面 / PDF",
            SettingsSection::Converter => "转换器",
            SettingsSection::Editor => "编辑器",
        }
    }

    pub fn icon(&self) -> &'static str {
        match self {
            SettingsSection::General => "🎨",
            SettingsSection::Page => "📄",
            SettingsSection::Converter => "🔧",
            SettingsSection::Editor => "📝",
        }
    }
}

/// Restore the defaults of the fields shown in `section`.
pub fn reset_section(section: SettingsSection, settings: &mut Settings) {
    let defaults = Settings::default();
    match section {
        SettingsSection::General => {
            settings.theme = defaults.theme;
            settings.font_size = defaults.font_size;
            settings.cjk_font_path = defaults.cjk_font_path;
            settings.default_export_path = defaults.default_export_path;
            settings.open_after_export = defaults.open_after_export;
        }
        SettingsSection::Page => {
            settings.margin_v = defaults.margin_v;
            settings.margin_h = defaults.margin_h;
            settings.show_preview_margins = defaults.show_preview_margins;
            settings.pdf_backend = defaults.pdf_backend;
            settings.pdf_engine = defaults.pdf_engine;
            settings.cjk_main_font = defaults.cjk_main_font;
        }
        SettingsSection::Converter => {
            settings.pandoc_path = defaults.pandoc_path;
            settings.pandoc_input_format = defaults.pandoc_input_format;
            settings.reference_docx = defaults.reference_docx;
            settings.converter_timeout_secs = defaults.converter_timeout_secs;
        }
        SettingsSection::Editor => {
            settings.word_wrap = defaults.word_wrap;
            settings.auto_normalize = defaults.auto_normalize;
            settings.sync_scroll_enabled = defaults.sync_scroll_enabled;
            settings.preview_debounce_ms = defaults.preview_debounce_ms;
            settings.split_ratio = defaults.split_ratio;
        }
    }
}

#[derive(Debug, Clone, Default)]
pub struct SettingsPanelOutput {
    pub changed: bool,
    pub close_requested: bool,
    /// The CJK font file changed; fonts must be reloaded
    pub fonts_changed: bool,
}

#[derive(Debug, Clone, Default)]
pub struct SettingsPanel {
    active_section: SettingsSection,
}

fn path_row(ui: &mut Ui, value: &mut Option<PathBuf>, placeholder: &str, browse: impl FnOnce() -> Option<PathBuf>) -> bool {
    let mut changed = false;
    ui.horizontal(|ui| {
        let shown = value
            .as_ref()
            .map(|p| p.display().to_string())
            .unwrap_or_else(|| placeholder.to_string());
        ui.add(egui::Label::new(RichText::new(shown).monospace()).truncate());
        if ui.small_button("浏览…").clicked() {
            if let Some(path) = browse() {
                *value = Some(path);
                changed = true;
            }
        }
        if value.is_some() && ui.small_button("✖").on_hover_text("清除").clicked() {
            *value = None;
            changed = true;
        }
    });
    changed
}

impl SettingsPanel {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn show(&mut self, ctx: &egui::Context, settings: &mut Settings, is_dark: bool) -> SettingsPanelOutput {
        let mut output = SettingsPanelOutput::default();

        let screen_rect = ctx.screen_rect();
        let overlay_color = if is_dark {
            Color32::from_rgba_unmultiplied(0, 0, 0, 180)
        } else {
            Color32::from_rgba_unmultiplied(0, 0, 0, 120)
        };
        egui::Area::new(egui::Id::new("settings_overlay"))
            .order(egui::Order::Middle)
            .fixed_pos(screen_rect.min)
            .show(ctx, |ui| {
                let response = ui.allocate_response(screen_rect.size(), egui::Sense::click());
                ui.painter().rect_filled(screen_rect, 0.0, overlay_color);
                if response.clicked() {
                    output.close_requested = true;
                }
            });

        egui::Window::new("⚙ 设置")
            .collapsible(false)
            .resizable(false)
            .anchor(egui::Align2::CENTER_CENTER, [0.0, 0.0])
            .min_width(560.0)
            .order(egui::Order::Foreground)
            .show(ctx, |ui| {
                if ui.input(|i| i.key_pressed(egui::Key::Escape)) {
                    output.close_requested = true;
                }

                ui.horizontal(|ui| {
                    ui.vertical(|ui| {
                        ui.set_min_width(120.0);
                        for section in SettingsSection::ALL {
                            let text = format!("{} {}", section.icon(), section.label());
                            let selected = self.active_section == section;
                            if ui
                                .add_sized(
                                    [110.0, 32.0],
                                    egui::SelectableLabel::new(selected, RichText::new(text).size(14.0)),
                                )
                                .clicked()
                            {
                                self.active_section = section;
                            }
                        }
                        ui.add_space((ui.available_height() - 72.0).max(8.0));
                        if ui
                            .add_sized([110.0, 28.0], egui::Button::new("↺ 恢复本页"))
                            .clicked()
                        {
                            let old_font = settings.cjk_font_path.clone();
                            reset_section(self.active_section, settings);
                            output.fonts_changed |= old_font != settings.cjk_font_path;
                            output.changed = true;
                        }
                        if ui
                            .add_sized([110.0, 28.0], egui::Button::new("↺ 全部恢复"))
                            .on_hover_text("所有设置恢复默认值")
                            .clicked()
                        {
                            let old_font = settings.cjk_font_path.clone();
                            let recent = std::mem::take(&mut settings.recent_files);
                            let window = settings.window_size;
                            *settings = Settings::default();
                            settings.recent_files = recent;
                            settings.window_size = window;
                            output.fonts_changed |= old_font.is_some();
                            output.changed = true;
                        }
                    });

                    ui.separator();

                    ui.vertical(|ui| {
                        ui.set_min_width(400.0);
                        ui.set_min_height(340.0);
                        let changed = match self.active_section {
                            SettingsSection::General => self.show_general(ui, settings, &mut output),
                            SettingsSection::Page => self.show_page(ui, settings),
                            SettingsSection::Converter => self.show_converter(ui, settings),
                            SettingsSection::Editor => self.show_editor(ui, settings),
                        };
                        output.changed |= changed;
                    });
                });

                ui.separator();
                ui.horizontal(|ui| {
                    ui.with_layout(egui::Layout::right_to_left(egui::Align::Center), |ui| {
                        if ui.button("关闭").clicked() {
                            output.close_requested = true;
                        }
                        ui.label(RichText::new("设置会自动保存").small().weak());
                    });
                });
            });

        if output.changed {
            settings.sanitize();
        }
        output
    }

    fn show_general(&mut self, ui: &mut Ui, settings: &mut Settings, output: &mut SettingsPanelOutput) -> bool {
        let mut changed = false;
        ui.heading("常规");
        ui.add_space(8.0);

        ui.label(RichText::new("主题").strong());
        ui.horizontal(|ui| {
            for theme in Theme::all() {
                changed |= ui
                    .selectable_value(&mut settings.theme, *theme, theme.label())
                    .changed();
            }
        });

        ui.add_space(12.0);
        ui.horizontal(|ui| {
            ui.label(RichText::new("字号").strong());
            ui.label(format!("{}px", settings.font_size as u32));
        });
        changed |= ui
            .add(
                egui::Slider::new(&mut settings.font_size, Settings::MIN_FONT_SIZE..=Settings::MAX_FONT_SIZE)
                    .show_value(false)
                    .step_by(1.0),
            )
            .changed();

        ui.add_space(12.0);
        ui.label(RichText::new("中文字体文件").strong());
        if path_row(ui, &mut settings.cjk_font_path, "自动检测系统字体", || {
            pick_file_dialog("选择字体", "Fonts", &["ttf", "ttc", "otf"])
        }) {
            output.fonts_changed = true;
            changed = true;
        }

        ui.add_space(12.0);
        ui.separator();
        ui.label(RichText::new("默认导出目录").strong());
        let current = settings.default_export_path.clone();
        changed |= path_row(ui, &mut settings.default_export_path, "上次使用的目录", || {
            pick_folder_dialog(current.as_deref())
        });
        changed |= ui
            .checkbox(&mut settings.open_after_export, "导出后打开文件")
            .changed();
        changed
    }

    fn show_page(&mut self, ui: &mut Ui, settings: &mut Settings) -> bool {
        let mut changed = false;
        ui.heading("页面 / PDF");
        ui.add_space(8.0);

        egui::Grid::new("page_margins").num_columns(2).spacing([12.0, 8.0]).show(ui, |ui| {
            ui.label("上下边距 (cm)");
            changed |= ui
                .add(egui::DragValue::new(&mut settings.margin_v).speed(0.1).range(0.0..=Settings::MAX_MARGIN_CM))
                .changed();
            ui.end_row();
            ui.label("左右边距 (cm)");
            changed |= ui
                .add(egui::DragValue::new(&mut settings.margin_h).speed(0.1).range(0.0..=Settings::MAX_MARGIN_CM))
                .changed();
            ui.end_row();
        });
        changed |= ui
            .checkbox(&mut settings.show_preview_margins, "预览中显示页边距")
            .changed();

        ui.add_space(12.0);
        ui.separator();
        ui.label(RichText::new("PDF 生成方式").strong());
        for backend in PdfBackend::all() {
            changed |= ui
                .radio_value(&mut settings.pdf_backend, *backend, backend.label())
                .changed();
        }

        ui.add_enabled_ui(settings.pdf_backend == PdfBackend::Pandoc, |ui| {
            egui::Grid::new("pdf_engine").num_columns(2).spacing([12.0, 8.0]).show(ui, |ui| {
                ui.label("LaTeX 引擎");
                changed |= ui.text_edit_singleline(&mut settings.pdf_engine).changed();
                ui.end_row();
                ui.label("中文字体 (CJKmainfont)");
                changed |= ui.text_edit_singleline(&mut settings.cjk_main_font).changed();
                ui.end_row();
            });
        });
        changed
    }

    fn show_converter(&mut self, ui: &mut Ui, settings: &mut Settings) -> bool {
        let mut changed = false;
        ui.heading("转换器");
        ui.add_space(8.0);

        ui.label(RichText::new("pandoc 程序").strong());
        changed |= path_row(ui, &mut settings.pandoc_path, "从 PATH 查找", || {
            pick_executable_dialog("定位 pandoc")
        });

        ui.add_space(8.0);
        ui.label(RichText::new("Word 样式模板 (reference.docx)").strong());
        changed |= path_row(ui, &mut settings.reference_docx, "pandoc 默认样式", || {
            pick_file_dialog("选择样式模板", "Word", &["docx"])
        });

        ui.add_space(8.0);
        egui::Grid::new("converter_opts").num_columns(2).spacing([12.0, 8.0]).show(ui, |ui| {
            ui.label("输入格式 (-f)");
            changed |= ui.text_edit_singleline(&mut settings.pandoc_input_format).changed();
            ui.end_row();
            ui.label("超时 (秒)");
            changed |= ui
                .add(
                    egui::DragValue::new(&mut settings.converter_timeout_secs)
                        .range(Settings::MIN_TIMEOUT_SECS..=Settings::MAX_TIMEOUT_SECS),
                )
                .changed();
            ui.end_row();
        });
        changed
    }

    fn show_editor(&mut self, ui: &mut Ui, settings: &mut Settings) -> bool {
        let mut changed = false;
        ui.heading("编辑器");
        ui.add_space(8.0);

        changed |= ui.checkbox(&mut settings.word_wrap, "自动换行").changed();
        changed |= ui
            .checkbox(&mut settings.auto_normalize, "智能排版 (列表和表格前后自动空行)")
            .changed();
        changed |= ui
            .checkbox(&mut settings.sync_scroll_enabled, "同步滚动")
            .changed();

        ui.add_space(12.0);
        ui.horizontal(|ui| {
            ui.label(RichText::new("预览刷新延迟").strong());
            ui.label(format!("{} ms", settings.preview_debounce_ms));
        });
        changed |= ui
            .add(
                egui::Slider::new(&mut settings.preview_debounce_ms, 0..=Settings::MAX_DEBOUNCE_MS)
                    .show_value(false)
                    .step_by(50.0),
            )
            .changed();
        changed
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_section() {
        assert_eq!(SettingsSection::default(), SettingsSection::General);
        assert_eq!(SettingsPanel::new().active_section, SettingsSection::General);
    }

    #[test]
    fn test_reset_page_section_only() {
        let mut settings = Settings {
            margin_v: 5.0,
            margin_h: 1.0,
            pdf_backend: PdfBackend::Office,
            font_size: 20.0,
            ..Settings::default()
        };
        reset_section(SettingsSection::Page, &mut settings);
        assert_eq!(settings.margin_v, Settings::DEFAULT_MARGIN_CM);
        assert_eq!(settings.margin_h, Settings::DEFAULT_MARGIN_CM);
        assert_eq!(settings.pdf_backend, PdfBackend::Pandoc);
        assert_eq!(settings.font_size, 20.0);
    }

    #[test]
    fn test_reset_converter_section() {
        let mut settings = Settings {
            pandoc_path: Some(PathBuf::from("/opt/pandoc")),
            converter_timeout_secs: 600,
            ..Settings::default()
        };
        reset_section(SettingsSection::Converter, &mut settings);
        assert!(settings.pandoc_path.is_none());
        assert_eq!(settings.converter_timeout_secs, 120);
    }

    #[test]
    fn test_page_and_converter_sections_draw_without_edits() {
        let ctx = egui::Context::default();
        let mut panel = SettingsPanel::new();
        let mut settings = Settings::default();
        let mut changed = true;
        let _ = ctx.run(egui::RawInput::default(), |ctx| {
            egui::CentralPanel::default().show(ctx, |ui| {
                changed = panel.show_page(ui, &mut settings);
                changed |= panel.show_converter(ui, &mut settings);
            });
        });
        assert!(!changed);
        assert_eq!(settings.margin_v, Settings::DEFAULT_MARGIN_CM);
        assert_eq!(settings.converter_timeout_secs, 120);
    }

    #[test]
    fn test_section_labels() {
        for section in SettingsSection::ALL {
            assert!(!section.label().is_empty());
            assert!(!section.icon().is_empty());
        }
    }
}
