//! Loading and saving `config.json` in the platform config directory.
//!
//! Loading never fails: a missing, empty or corrupt file yields defaults.
//! Saving writes a sibling temp file first and renames it over the old one.

use crate::config::Settings;
use crate::error::{Error, Result, ResultExt};
use log::{debug, info, warn};
use std::fs;
use std::path::{Path, PathBuf};

// ─────────────────────────────────────────────────────────────────────────────
// Constants
// ─────────────────────────────────────────────────────────────────────────────

const APP_NAME: &str = "papersmith";

const CONFIG_FILE_NAME: &str = "config.json";

/// Written first, then renamed over the real file
const CONFIG_TEMP_NAME: &str = "config.json.tmp";

// ─────────────────────────────────────────────────────────────────────────────
// Directory resolution
// ─────────────────────────────────────────────────────────────────────────────

/// `%APPDATA%\papersmith`, `~/Library/Application Support/papersmith` or
/// `~/.config/papersmith`.
pub fn get_config_dir() -> Result<PathBuf> {
    dirs::config_dir()
        .map(|base| base.join(APP_NAME))
        .ok_or(Error::ConfigDirNotFound)
}

pub fn get_config_file_path() -> Result<PathBuf> {
    Ok(get_config_dir()?.join(CONFIG_FILE_NAME))
}

// ─────────────────────────────────────────────────────────────────────────────
// Load
// ─────────────────────────────────────────────────────────────────────────────

/// Load settings, falling back to defaults on any problem.
pub fn load_config() -> Settings {
    get_config_file_path()
        .and_then(|path| load_config_from(&path))
        .unwrap_or_warn_default(Settings::default(), "Failed to load configuration")
}

/// Load and sanitize settings from an explicit file.
pub fn load_config_from(config_path: &Path) -> Result<Settings> {
    if !config_path.exists() {
        debug!(
            "Config file not found at {}, using defaults",
            config_path.display()
        );
        return Ok(Settings::default());
    }

    let contents = fs::read_to_string(config_path).map_err(|e| Error::FileRead {
        path: config_path.to_path_buf(),
        source: e,
    })?;

    if contents.trim().is_empty() {
        debug!("Config file is empty, using defaults");
        return Ok(Settings::default());
    }

    let settings = Settings::from_json_sanitized(&contents).map_err(|e| {
        warn!(
            "Config file at {} contains invalid JSON: {}",
            config_path.display(),
            e
        );
        Error::from(e)
    })?;

    info!("Configuration loaded from {}", config_path.display());
    Ok(settings)
}

// ─────────────────────────────────────────────────────────────────────────────
// Save
// ─────────────────────────────────────────────────────────────────────────────

pub fn save_config(settings: &Settings) -> Result<()> {
    save_config_to(&get_config_dir()?, settings)
}

/// Write `config.json` into `config_dir`, creating the directory if needed.
pub fn save_config_to(config_dir: &Path, settings: &Settings) -> Result<()> {
    if !config_dir.exists() {
        debug!("Creating config directory: {}", config_dir.display());
        fs::create_dir_all(config_dir).map_err(|e| Error::FileWrite {
            path: config_dir.to_path_buf(),
            source: e,
        })?;
    }

    let config_path = config_dir.join(CONFIG_FILE_NAME);
    let temp_path = config_dir.join(CONFIG_TEMP_NAME);

    let json = serde_json::to_string_pretty(settings)?;

    fs::write(&temp_path, &json).map_err(|e| Error::FileWrite {
        path: temp_path.clone(),
        source: e,
    })?;
    fs::rename(&temp_path, &config_path).map_err(|e| Error::FileWrite {
        path: config_path.clone(),
        source: e,
    })?;

    debug!("Configuration saved to {}", config_path.display());
    Ok(())
}

/// Best-effort save used on exit and after toggles.
pub fn save_config_silent(settings: &Settings) -> bool {
    match save_config(settings) {
        Ok(()) => true,
        Err(e) => {
            warn!("Failed to save configuration: {}", e);
            false
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::{PdfBackend, Theme};
    use tempfile::TempDir;

    #[test]
    fn test_config_dir_uses_app_name() {
        if let Ok(path) = get_config_dir() {
            assert!(path.ends_with(APP_NAME));
        }
    }

    #[test]
    fn test_missing_file_gives_defaults() {
        let dir = TempDir::new().unwrap();
        let settings = load_config_from(&dir.path().join(CONFIG_FILE_NAME)).unwrap();
        assert_eq!(settings, Settings::default());
    }

    #[test]
    fn test_empty_file_gives_defaults() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join(CONFIG_FILE_NAME);
        fs::write(&path, "   \n").unwrap();
        assert_eq!(load_config_from(&path).unwrap(), Settings::default());
    }

    #[test]
    fn test_corrupt_file_is_an_error() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join(CONFIG_FILE_NAME);
        fs::write(&path, "{ not json").unwrap();
        assert!(matches!(
            load_config_from(&path),
            Err(Error::ConfigParse { .. })
        ));
    }

    #[test]
    fn test_save_and_load_roundtrip() {
        let dir = TempDir::new().unwrap();
        let config_dir = dir.path().join(APP_NAME);
        let original = Settings {
            theme: Theme::Dark,
            sync_scroll_enabled: false,
            margin_v: 2.5,
            pdf_backend: PdfBackend::Office,
            pandoc_path: Some(PathBuf::from("/opt/pandoc/bin/pandoc")),
            ..Settings::default()
        };

        save_config_to(&config_dir, &original).unwrap();
        assert!(!config_dir.join(CONFIG_TEMP_NAME).exists());

        let loaded = load_config_from(&config_dir.join(CONFIG_FILE_NAME)).unwrap();
        assert_eq!(original, loaded);
    }

    #[test]
    fn test_load_sanitizes_values() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join(CONFIG_FILE_NAME);
        fs::write(&path, r#"{"margin_h": 99.0, "font_size": 1.0}"#).unwrap();
        let settings = load_config_from(&path).unwrap();
        assert_eq!(settings.margin_h, Settings::MAX_MARGIN_CM);
        assert_eq!(settings.font_size, Settings::MIN_FONT_SIZE);
    }

    #[test]
    fn test_save_overwrites_existing() {
        let dir = TempDir::new().unwrap();
        let mut settings = Settings::default();
        save_config_to(dir.path(), &settings).unwrap();
        settings.margin_h = 3.0;
        save_config_to(dir.path(), &settings).unwrap();
        let loaded = load_config_from(&dir.path().join(CONFIG_FILE_NAME)).unwrap();
        assert_eq!(loaded.margin_h, 3.0);
    }
}
