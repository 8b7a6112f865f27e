//! Font setup for PaperSmith
//!
//! egui's bundled fonts carry no CJK glyphs, so Chinese text would render as
//! boxes. At startup a system CJK font (or the one configured in settings) is
//! read from disk and appended as a fallback to both font families.

use eframe::egui::{self, FontData, FontDefinitions, FontFamily, FontId, TextStyle};
use log::{info, warn};
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

/// Name of the fallback font inside egui's font table.
pub const FONT_CJK: &str = "PaperSmith-CJK";

// ─────────────────────────────────────────────────────────────────────────────
// Font discovery
// ─────────────────────────────────────────────────────────────────────────────

#[cfg(target_os = "windows")]
fn system_candidates() -> Vec<PathBuf> {
    let windir = std::env::var_os("WINDIR")
        .map(PathBuf::from)
        .unwrap_or_else(|| PathBuf::from(r"C:\Windows"));
    let fonts = windir.join("Fonts");
    ["msyh.ttc", "msyh.ttf", "simhei.ttf", "simsun.ttc", "Deng.ttf"]
        .iter()
        .map(|name| fonts.join(name))
        .collect()
}

#[cfg(target_os = "macos")]
fn system_candidates() -> Vec<PathBuf> {
    [
        "/System/Library/Fonts/PingFang.ttc",
        "/System/Library/Fonts/Hiragino Sans GB.ttc",
        "/System/Library/Fonts/STHeiti Light.ttc",
        "/Library/Fonts/Arial Unicode.ttf",
    ]
    .iter()
    .map(PathBuf::from)
    .collect()
}

#[cfg(not(any(target_os = "windows", target_os = "macos")))]
fn system_candidates() -> Vec<PathBuf> {
    [
        "/usr/share/fonts/opentype/noto/NotoSansCJK-Regular.ttc",
        "/usr/share/fonts/noto-cjk/NotoSansCJK-Regular.ttc",
        "/usr/share/fonts/google-noto-cjk/NotoSansCJK-Regular.ttc",
        "/usr/share/fonts/truetype/noto/NotoSansCJK-Regular.ttc",
        "/usr/share/fonts/truetype/wqy/wqy-microhei.ttc",
        "/usr/share/fonts/wqy-microhei/wqy-microhei.ttc",
        "/usr/share/fonts/truetype/wqy/wqy-zenhei.ttc",
        "/usr/share/fonts/truetype/droid/DroidSansFallbackFull.ttf",
    ]
    .iter()
    .map(PathBuf::from)
    .collect()
}

/// Font files to try, the configured one first.
pub fn candidate_paths(custom: Option<&Path>) -> Vec<PathBuf> {
    let mut paths: Vec<PathBuf> = custom.map(Path::to_path_buf).into_iter().collect();
    paths.extend(system_candidates());
    paths
}

/// Read the first candidate that exists.
pub fn find_cjk_font(custom: Option<&Path>) -> Option<(PathBuf, Vec<u8>)> {
    for path in candidate_paths(custom) {
        if !path.is_file() {
            continue;
        }
        match std::fs::read(&path) {
            Ok(bytes) if !bytes.is_empty() => return Some((path, bytes)),
            Ok(_) => warn!("Font file {} is empty", path.display()),
            Err(e) => warn!("Failed to read font {}: {}", path.display(), e),
        }
    }
    None
}

// ─────────────────────────────────────────────────────────────────────────────
// Font loading
// ─────────────────────────────────────────────────────────────────────────────

/// egui's default fonts, with `cjk` appended as the last fallback.
pub fn create_font_definitions(cjk: Option<Vec<u8>>) -> FontDefinitions {
    let mut fonts = FontDefinitions::default();

    if let Some(bytes) = cjk {
        fonts
            .font_data
            .insert(FONT_CJK.to_owned(), FontData::from_owned(bytes));
        for family in [FontFamily::Proportional, FontFamily::Monospace] {
            fonts
                .families
                .entry(family)
                .or_default()
                .push(FONT_CJK.to_owned());
        }
    }

    fonts
}

/// Install fonts and text styles on the egui context. Called once at startup.
pub fn setup_fonts(ctx: &egui::Context, custom: Option<&Path>) {
    let cjk = match find_cjk_font(custom) {
        Some((path, bytes)) => {
            info!("Using CJK font {}", path.display());
            Some(bytes)
        }
        None => {
            warn!("No CJK font found; Chinese text may not render. Set a font file in Settings.");
            None
        }
    };
    ctx.set_fonts(create_font_definitions(cjk));

    let text_styles: BTreeMap<TextStyle, FontId> = [
        (TextStyle::Heading, FontId::new(22.0, FontFamily::Proportional)),
        (TextStyle::Body, FontId::new(14.0, FontFamily::Proportional)),
        (TextStyle::Monospace, FontId::new(14.0, FontFamily::Monospace)),
        (TextStyle::Button, FontId::new(14.0, FontFamily::Proportional)),
        (TextStyle::Small, FontId::new(12.0, FontFamily::Proportional)),
    ]
    .into();

    ctx.style_mut(|style| {
        style.text_styles = text_styles.clone();
    });
}
