//! Code block highlighting for the preview pane.
//!
//! Loads syntect's bundled syntaxes and themes once and turns a fenced
//! block into an egui [`LayoutJob`]. Unknown languages fall back to plain
//! monospace text in the theme's foreground color.

use eframe::egui::text::LayoutJob;
use eframe::egui::{Color32, FontId, Stroke, TextFormat};
use log::{debug, warn};
use std::sync::OnceLock;
use syntect::easy::HighlightLines;
use syntect::highlighting::{FontStyle, Style, Theme, ThemeSet};
use syntect::parsing::{SyntaxReference, SyntaxSet};
use syntect::util::LinesWithEndings;

pub const DARK_THEME: &str = "base16-ocean.dark";
pub const LIGHT_THEME: &str = "InspiredGitHub";

// ─────────────────────────────────────────────────────────────────────────────
// Segments
// ─────────────────────────────────────────────────────────────────────────────

#[derive(Debug, Clone, PartialEq)]
pub struct HighlightedSegment {
    pub text: String,
    pub foreground: Color32,
    pub bold: bool,
    pub italic: bool,
    pub underline: bool,
}

impl HighlightedSegment {
    fn plain(text: &str, foreground: Color32) -> Self {
        Self {
            text: text.to_string(),
            foreground,
            bold: false,
            italic: false,
            underline: false,
        }
    }

    fn from_style(style: Style, text: &str) -> Self {
        Self {
            text: text.to_string(),
            foreground: syntect_to_egui_color(style.foreground),
            bold: style.font_style.contains(FontStyle::BOLD),
            italic: style.font_style.contains(FontStyle::ITALIC),
            underline: style.font_style.contains(FontStyle::UNDERLINE),
        }
    }
}

/// Highlighted code block: the segments in order, newlines included.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct HighlightedCode {
    pub segments: Vec<HighlightedSegment>,
    pub background: Option<Color32>,
}

impl HighlightedCode {
    pub fn to_layout_job(&self, font_size: f32) -> LayoutJob {
        let mut job = LayoutJob::default();
        for segment in &self.segments {
            let mut format = TextFormat {
                font_id: FontId::monospace(font_size),
                color: segment.foreground,
                italics: segment.italic,
                ..Default::default()
            };
            if segment.underline {
                format.underline = Stroke::new(1.0, segment.foreground);
            }
            if segment.bold {
                // No bold monospace face; push the color away from the background
                format.color = emphasize(segment.foreground, self.background);
            }
            job.append(&segment.text, 0.0, format);
        }
        job
    }
}

/// Stronger variant of `color` against `background`: lighter on dark
/// backgrounds, darker on light ones. Alpha is kept.
fn emphasize(color: Color32, background: Option<Color32>) -> Color32 {
    const AMOUNT: f32 = 0.25;
    let dark_background = background.map_or(false, |bg| {
        u16::from(bg.r()) + u16::from(bg.g()) + u16::from(bg.b()) < 3 * 128
    });
    let target: f32 = if dark_background { 255.0 } else { 0.0 };
    let mix = |c: u8| (f32::from(c) + (target - f32::from(c)) * AMOUNT).round() as u8;
    Color32::from_rgba_unmultiplied(mix(color.r()), mix(color.g()), mix(color.b()), color.a())
}

// ─────────────────────────────────────────────────────────────────────────────
// Highlighter
// ─────────────────────────────────────────────────────────────────────────────

pub struct SyntaxHighlighter {
    syntax_set: SyntaxSet,
    theme_set: ThemeSet,
}

impl Default for SyntaxHighlighter {
    fn default() -> Self {
        Self::new()
    }
}

impl SyntaxHighlighter {
    pub fn new() -> Self {
        let syntax_set = SyntaxSet::load_defaults_newlines();
        let theme_set = ThemeSet::load_defaults();
        debug!(
            "Loaded {} syntaxes and {} themes",
            syntax_set.syntaxes().len(),
            theme_set.themes.len()
        );
        Self {
            syntax_set,
            theme_set,
        }
    }

    fn theme(&self, dark_mode: bool) -> Option<&Theme> {
        let name = if dark_mode { DARK_THEME } else { LIGHT_THEME };
        self.theme_set
            .themes
            .get(name)
            .or_else(|| self.theme_set.themes.values().next())
    }

    /// Highlight `code` as `language` (a fence info string's first word).
    pub fn highlight(&self, code: &str, language: &str, dark_mode: bool) -> HighlightedCode {
        let fallback = if dark_mode {
            Color32::from_gray(210)
        } else {
            Color32::from_gray(40)
        };
        let Some(theme) = self.theme(dark_mode) else {
            return plain_code(code, fallback);
        };
        let foreground = theme
            .settings
            .foreground
            .map(syntect_to_egui_color)
            .unwrap_or(fallback);
        let background = theme.settings.background.map(syntect_to_egui_color);

        let Some(syntax) = self.find_syntax(language) else {
            let mut plain = plain_code(code, foreground);
            plain.background = background;
            return plain;
        };

        let mut highlighter = HighlightLines::new(syntax, theme);
        let mut segments = Vec::new();
        for line in LinesWithEndings::from(code) {
            match highlighter.highlight_line(line, &self.syntax_set) {
                Ok(ranges) => segments.extend(
                    ranges
                        .into_iter()
                        .map(|(style, text)| HighlightedSegment::from_style(style, text)),
                ),
                Err(e) => {
                    warn!("Failed to highlight line: {}", e);
                    segments.push(HighlightedSegment::plain(line, foreground));
                }
            }
        }

        HighlightedCode {
            segments,
            background,
        }
    }

    fn find_syntax(&self, language: &str) -> Option<&SyntaxReference> {
        let lang = language.trim().to_lowercase();
        if lang.is_empty() {
            return None;
        }

        let extension = match lang.as_str() {
            "rust" => "rs",
            "python" => "py",
            "javascript" => "js",
            "typescript" => "ts",
            "c++" | "cxx" => "cpp",
            "csharp" | "c#" => "cs",
            "golang" => "go",
            "ruby" => "rb",
            "yml" => "yaml",
            "markdown" => "md",
            "shell" | "bash" | "zsh" | "console" => "sh",
            "tex" | "latex" => "tex",
            "htm" => "html",
            other => other,
        };

        self.syntax_set
            .find_syntax_by_extension(extension)
            .or_else(|| self.syntax_set.find_syntax_by_name(language.trim()))
            .or_else(|| {
                self.syntax_set
                    .syntaxes()
                    .iter()
                    .find(|syntax| syntax.name.to_lowercase() == lang)
            })
    }
}

fn plain_code(code: &str, foreground: Color32) -> HighlightedCode {
    HighlightedCode {
        segments: vec![HighlightedSegment::plain(code, foreground)],
        background: None,
    }
}

pub fn syntect_to_egui_color(color: syntect::highlighting::Color) -> Color32 {
    Color32::from_rgba_unmultiplied(color.r, color.g, color.b, color.a)
}

static HIGHLIGHTER: OnceLock<SyntaxHighlighter> = OnceLock::new();

/// Shared highlighter; the syntax and theme sets load on first use.
pub fn get_highlighter() -> &'static SyntaxHighlighter {
    HIGHLIGHTER.get_or_init(SyntaxHighlighter::new)
}

pub fn highlight_code(code: &str, language: &str, dark_mode: bool) -> HighlightedCode {
    get_highlighter().highlight(code, language, dark_mode)
}
