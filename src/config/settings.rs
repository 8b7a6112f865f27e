//! User preferences persisted as JSON.
//!
//! Every field has a default through `#[serde(default)]`, so older or
//! hand-edited config files keep loading. `sanitize` clamps anything a user
//! could have typed out of range.

use serde::{Deserialize, Serialize};
use std::path::PathBuf;

// ─────────────────────────────────────────────────────────────────────────────
// Theme
// ─────────────────────────────────────────────────────────────────────────────

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum Theme {
    #[default]
    Light,
    Dark,
    System,
}

impl Theme {
    pub fn label(&self) -> &'static str {
        match self {
            Theme::Light => "Light",
            Theme::Dark => "Dark",
            Theme::System => "System",
        }
    }

    pub fn all() -> &'static [Theme] {
        &[Theme::Light, Theme::Dark, Theme::System]
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// PDF backend
// ─────────────────────────────────────────────────────────────────────────────

/// Which external tool produces PDF output.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum PdfBackend {
    /// pandoc with a LaTeX engine (`pdf_engine`)
    #[default]
    Pandoc,
    /// LibreOffice converting the post-processed docx
    Office,
}

impl PdfBackend {
    pub fn label(&self) -> &'static str {
        match self {
            PdfBackend::Pandoc => "pandoc + LaTeX",
            PdfBackend::Office => "LibreOffice (from Word output)",
        }
    }

    pub fn all() -> &'static [PdfBackend] {
        &[PdfBackend::Pandoc, PdfBackend::Office]
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Window
// ─────────────────────────────────────────────────────────────────────────────

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct WindowSize {
    pub width: f32,
    pub height: f32,
    #[serde(default)]
    pub maximized: bool,
}

impl Default for WindowSize {
    fn default() -> Self {
        Self {
            width: 1280.0,
            height: 820.0,
            maximized: false,
        }
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Settings
// ─────────────────────────────────────────────────────────────────────────────

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Settings {
    // ─────────────────────────────────────────────────────────────────────────
    // Appearance
    // ─────────────────────────────────────────────────────────────────────────
    pub theme: Theme,

    /// Editor font size in points
    pub font_size: f32,

    pub word_wrap: bool,

    /// Explicit CJK font file; system fonts are probed when unset
    pub cjk_font_path: Option<PathBuf>,

    // ─────────────────────────────────────────────────────────────────────────
    // Editing & Preview
    // ─────────────────────────────────────────────────────────────────────────
    /// Insert blank lines around lists and tables after every edit
    pub auto_normalize: bool,

    /// Idle time before the preview is rebuilt
    pub preview_debounce_ms: u64,

    /// Linked scrolling between editor and preview
    pub sync_scroll_enabled: bool,

    /// Simulate the page margins in the preview pane
    pub show_preview_margins: bool,

    /// Editor share of the split view (0.0 to 1.0)
    pub split_ratio: f32,

    // ─────────────────────────────────────────────────────────────────────────
    // Page layout (centimetres)
    // ─────────────────────────────────────────────────────────────────────────
    /// Top and bottom margin
    pub margin_v: f32,
    /// Left and right margin
    pub margin_h: f32,

    // ─────────────────────────────────────────────────────────────────────────
    // Export
    // ─────────────────────────────────────────────────────────────────────────
    /// Preferred export folder; the last used folder when unset
    pub default_export_path: Option<PathBuf>,

    pub last_export_directory: Option<PathBuf>,

    pub open_after_export: bool,

    /// Explicit pandoc executable, overrides the PATH lookup
    pub pandoc_path: Option<PathBuf>,

    /// Value of pandoc's `-f` option
    pub pandoc_input_format: String,

    /// Style template passed as `--reference-doc`
    pub reference_docx: Option<PathBuf>,

    pub pdf_backend: PdfBackend,

    /// LaTeX engine for pandoc PDF output
    pub pdf_engine: String,

    /// Value of the `CJKmainfont` template variable
    pub cjk_main_font: String,

    pub converter_timeout_secs: u64,

    // ─────────────────────────────────────────────────────────────────────────
    // Session
    // ─────────────────────────────────────────────────────────────────────────
    pub recent_files: Vec<PathBuf>,

    pub max_recent_files: usize,

    pub window_size: WindowSize,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            theme: Theme::default(),
            font_size: 15.0,
            word_wrap: true,
            cjk_font_path: None,

            auto_normalize: true,
            preview_debounce_ms: 300,
            sync_scroll_enabled: true,
            show_preview_margins: true,
            split_ratio: 0.5,

            margin_v: Self::DEFAULT_MARGIN_CM,
            margin_h: Self::DEFAULT_MARGIN_CM,

            default_export_path: None,
            last_export_directory: None,
            open_after_export: false,
            pandoc_path: None,
            pandoc_input_format: String::from("gfm+tex_math_dollars"),
            reference_docx: None,
            pdf_backend: PdfBackend::default(),
            pdf_engine: String::from("xelatex"),
            cjk_main_font: String::from("Microsoft YaHei"),
            converter_timeout_secs: 120,

            recent_files: Vec::new(),
            max_recent_files: 10,
            window_size: WindowSize::default(),
        }
    }
}

impl Settings {
    pub const MIN_FONT_SIZE: f32 = 8.0;
    pub const MAX_FONT_SIZE: f32 = 48.0;
    pub const DEFAULT_MARGIN_CM: f32 = 2.0;
    pub const MAX_MARGIN_CM: f32 = 10.0;
    pub const MAX_DEBOUNCE_MS: u64 = 2000;
    pub const MIN_TIMEOUT_SECS: u64 = 10;
    pub const MAX_TIMEOUT_SECS: u64 = 1800;
    pub const MIN_WINDOW_SIZE: f32 = 200.0;
    pub const MAX_WINDOW_SIZE: f32 = 10000.0;

    /// Move `path` to the front of the recent files list.
    pub fn add_recent_file(&mut self, path: PathBuf) {
        self.recent_files.retain(|p| p != &path);
        self.recent_files.insert(0, path);
        self.recent_files.truncate(self.max_recent_files);
    }

    /// Folder export dialogs should start in.
    pub fn export_directory(&self) -> Option<PathBuf> {
        self.default_export_path
            .as_ref()
            .filter(|p| p.is_dir())
            .or(self.last_export_directory.as_ref())
            .cloned()
    }

    /// Clamp every value to its valid range.
    pub fn sanitize(&mut self) {
        self.font_size = clamp_f32(self.font_size, Self::MIN_FONT_SIZE, Self::MAX_FONT_SIZE, 15.0);
        self.margin_v = clamp_f32(
            self.margin_v,
            0.0,
            Self::MAX_MARGIN_CM,
            Self::DEFAULT_MARGIN_CM,
        );
        self.margin_h = clamp_f32(
            self.margin_h,
            0.0,
            Self::MAX_MARGIN_CM,
            Self::DEFAULT_MARGIN_CM,
        );
        self.split_ratio = clamp_f32(self.split_ratio, 0.1, 0.9, 0.5);

        self.preview_debounce_ms = self.preview_debounce_ms.min(Self::MAX_DEBOUNCE_MS);
        self.converter_timeout_secs = self
            .converter_timeout_secs
            .clamp(Self::MIN_TIMEOUT_SECS, Self::MAX_TIMEOUT_SECS);

        self.window_size.width = clamp_f32(
            self.window_size.width,
            Self::MIN_WINDOW_SIZE,
            Self::MAX_WINDOW_SIZE,
            1280.0,
        );
        self.window_size.height = clamp_f32(
            self.window_size.height,
            Self::MIN_WINDOW_SIZE,
            Self::MAX_WINDOW_SIZE,
            820.0,
        );

        if self.pandoc_input_format.trim().is_empty() {
            self.pandoc_input_format = Settings::default().pandoc_input_format;
        }
        if self.pdf_engine.trim().is_empty() {
            self.pdf_engine = Settings::default().pdf_engine;
        }

        if self.max_recent_files == 0 {
            self.max_recent_files = 10;
        } else if self.max_recent_files > 100 {
            self.max_recent_files = 100;
        }
        self.recent_files.truncate(self.max_recent_files);
    }

    pub fn from_json_sanitized(json: &str) -> Result<Self, serde_json::Error> {
        let mut settings: Self = serde_json::from_str(json)?;
        settings.sanitize();
        Ok(settings)
    }
}

/// Clamp, replacing NaN with `fallback`.
fn clamp_f32(value: f32, min: f32, max: f32, fallback: f32) -> f32 {
    if value.is_nan() {
        fallback
    } else {
        value.clamp(min, max)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_settings() {
        let settings = Settings::default();
        assert!(settings.sync_scroll_enabled);
        assert!(settings.auto_normalize);
        assert!(settings.show_preview_margins);
        assert_eq!(settings.margin_v, 2.0);
        assert_eq!(settings.margin_h, 2.0);
        assert_eq!(settings.preview_debounce_ms, 300);
        assert_eq!(settings.pdf_backend, PdfBackend::Pandoc);
        assert_eq!(settings.pandoc_input_format, "gfm+tex_math_dollars");
    }

    #[test]
    fn test_add_recent_file_moves_to_front() {
        let mut settings = Settings {
            max_recent_files: 2,
            ..Settings::default()
        };
        settings.add_recent_file(PathBuf::from("/a.md"));
        settings.add_recent_file(PathBuf::from("/b.md"));
        settings.add_recent_file(PathBuf::from("/a.md"));
        assert_eq!(
            settings.recent_files,
            vec![PathBuf::from("/a.md"), PathBuf::from("/b.md")]
        );
        settings.add_recent_file(PathBuf::from("/c.md"));
        assert_eq!(settings.recent_files.len(), 2);
        assert_eq!(settings.recent_files[0], PathBuf::from("/c.md"));
    }

    #[test]
    fn test_sync_scroll_state_round_trips() {
        let settings = Settings {
            sync_scroll_enabled: false,
            ..Settings::default()
        };
        let json = serde_json::to_string(&settings).unwrap();
        let loaded = Settings::from_json_sanitized(&json).unwrap();
        assert!(!loaded.sync_scroll_enabled);
    }

    #[test]
    fn test_deserialize_partial_json_uses_defaults() {
        let settings: Settings = serde_json::from_str(r#"{"margin_v": 3.5}"#).unwrap();
        assert_eq!(settings.margin_v, 3.5);
        assert_eq!(settings.margin_h, 2.0);
        assert!(settings.sync_scroll_enabled);
    }

    #[test]
    fn test_enum_serialization() {
        assert_eq!(serde_json::to_string(&Theme::Dark).unwrap(), "\"dark\"");
        assert_eq!(
            serde_json::to_string(&PdfBackend::Office).unwrap(),
            "\"office\""
        );
        let backend: PdfBackend = serde_json::from_str("\"pandoc\"").unwrap();
        assert_eq!(backend, PdfBackend::Pandoc);
    }

    #[test]
    fn test_sanitize_clamps_margins_and_timeouts() {
        let json = r#"{
            "margin_v": -1.0,
            "margin_h": 42.0,
            "preview_debounce_ms": 99999,
            "converter_timeout_secs": 1,
            "font_size": 2.0
        }"#;
        let settings = Settings::from_json_sanitized(json).unwrap();
        assert_eq!(settings.margin_v, 0.0);
        assert_eq!(settings.margin_h, Settings::MAX_MARGIN_CM);
        assert_eq!(settings.preview_debounce_ms, Settings::MAX_DEBOUNCE_MS);
        assert_eq!(settings.converter_timeout_secs, Settings::MIN_TIMEOUT_SECS);
        assert_eq!(settings.font_size, Settings::MIN_FONT_SIZE);
    }

    #[test]
    fn test_sanitize_restores_blank_strings() {
        let mut settings = Settings {
            pandoc_input_format: "  ".to_string(),
            pdf_engine: String::new(),
            ..Settings::default()
        };
        settings.sanitize();
        assert_eq!(settings.pandoc_input_format, "gfm+tex_math_dollars");
        assert_eq!(settings.pdf_engine, "xelatex");
    }

    #[test]
    fn test_sanitize_nan() {
        let mut settings = Settings {
            split_ratio: f32::NAN,
            ..Settings::default()
        };
        settings.sanitize();
        assert_eq!(settings.split_ratio, 0.5);
    }

    #[test]
    fn test_export_directory_prefers_existing_default() {
        let dir = tempfile::tempdir().unwrap();
        let settings = Settings {
            default_export_path: Some(dir.path().to_path_buf()),
            last_export_directory: Some(PathBuf::from("/elsewhere")),
            ..Settings::default()
        };
        assert_eq!(settings.export_directory(), Some(dir.path().to_path_buf()));

        let settings = Settings {
            default_export_path: Some(PathBuf::from("/does/not/exist/papersmith")),
            last_export_directory: Some(PathBuf::from("/elsewhere")),
            ..Settings::default()
        };
        assert_eq!(
            settings.export_directory(),
            Some(PathBuf::from("/elsewhere"))
        );
    }

    #[test]
    fn test_unknown_fields_ignored() {
        let settings: Settings =
            serde_json::from_str(r#"{"enable_gpu": true, "theme": "dark"}"#).unwrap();
        assert_eq!(settings.theme, Theme::Dark);
    }
}
