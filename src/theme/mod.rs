//! Theme handling for PaperSmith
//!
//! Resolves the Light/Dark/System setting to egui visuals and applies them
//! only when the effective mode changes.

use eframe::egui::{Color32, Context, Rounding, Stroke, Visuals};
use log::{debug, info};

use crate::config::Theme;

const ACCENT: Color32 = Color32::from_rgb(0, 120, 212);

/// egui visuals for one mode with PaperSmith's accent color.
pub fn create_visuals(dark: bool) -> Visuals {
    let mut visuals = if dark { Visuals::dark() } else { Visuals::light() };
    visuals.selection.bg_fill = if dark {
        Color32::from_rgb(38, 79, 120)
    } else {
        Color32::from_rgb(173, 214, 255)
    };
    visuals.selection.stroke = Stroke::new(1.0, ACCENT);
    visuals.hyperlink_color = if dark {
        Color32::from_rgb(100, 170, 255)
    } else {
        ACCENT
    };
    visuals.window_rounding = Rounding::same(8.0);
    if !dark {
        visuals.panel_fill = Color32::from_rgb(248, 248, 248);
        visuals.extreme_bg_color = Color32::WHITE;
    }
    visuals
}

#[derive(Debug, Clone)]
pub struct ThemeManager {
    current_theme: Theme,
    /// Last dark-mode preference reported by the OS
    system_dark: bool,
    /// Dark flag of the visuals last applied
    applied: Option<bool>,
}

impl Default for ThemeManager {
    fn default() -> Self {
        Self::new(Theme::default())
    }
}

impl ThemeManager {
    pub fn new(theme: Theme) -> Self {
        info!("ThemeManager initialized with theme: {:?}", theme);
        Self {
            current_theme: theme,
            system_dark: false,
            applied: None,
        }
    }

    pub fn set_theme(&mut self, theme: Theme) {
        if self.current_theme != theme {
            info!("Theme changed from {:?} to {:?}", self.current_theme, theme);
            self.current_theme = theme;
        }
    }

    /// Light → Dark → System → Light.
    pub fn cycle(&mut self) -> Theme {
        let next = match self.current_theme {
            Theme::Light => Theme::Dark,
            Theme::Dark => Theme::System,
            Theme::System => Theme::Light,
        };
        self.set_theme(next);
        next
    }

    pub fn set_system_dark(&mut self, dark: bool) {
        if self.system_dark != dark {
            debug!("System dark mode changed to: {}", dark);
            self.system_dark = dark;
        }
    }

    pub fn is_dark(&self) -> bool {
        match self.current_theme {
            Theme::Dark => true,
            Theme::Light => false,
            Theme::System => self.system_dark,
        }
    }

    pub fn needs_apply(&self) -> bool {
        self.applied != Some(self.is_dark())
    }

    /// Returns `true` when visuals were replaced, so cached colors must go.
    pub fn apply_if_needed(&mut self, ctx: &Context) -> bool {
        if !self.needs_apply() {
            return false;
        }
        let dark = self.is_dark();
        ctx.set_visuals(create_visuals(dark));
        self.applied = Some(dark);
        debug!("Applied theme: {:?} (dark: {})", self.current_theme, dark);
        true
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_new_needs_apply() {
        let manager = ThemeManager::new(Theme::Dark);
        assert!(manager.needs_apply());
        assert!(manager.is_dark());
    }

    #[test]
    fn test_system_follows_os() {
        let mut manager = ThemeManager::new(Theme::System);
        assert!(!manager.is_dark());
        manager.set_system_dark(true);
        assert!(manager.is_dark());
    }

    #[test]
    fn test_cycle() {
        let mut manager = ThemeManager::new(Theme::Light);
        assert_eq!(manager.cycle(), Theme::Dark);
        assert_eq!(manager.cycle(), Theme::System);
        assert_eq!(manager.cycle(), Theme::Light);
    }

    #[test]
    fn test_apply_only_on_change() {
        let ctx = Context::default();
        let mut manager = ThemeManager::new(Theme::Light);
        assert!(manager.apply_if_needed(&ctx));
        assert!(!manager.apply_if_needed(&ctx));

        // System resolving to the same mode needs nothing new
        manager.set_theme(Theme::System);
        assert!(!manager.needs_apply());

        manager.set_system_dark(true);
        assert!(manager.apply_if_needed(&ctx));
        assert!(ctx.style().visuals.dark_mode);
    }

    #[test]
    fn test_visuals_mode() {
        assert!(create_visuals(true).dark_mode);
        assert!(!create_visuals(false).dark_mode);
    }
}
