//! UI components for PaperSmith
//!
//! Toolbar, settings window and modal dialogs. The editor/preview split
//! itself lives in the app.

mod dialogs;
mod settings;
mod toolbar;

pub use dialogs::{
    format_elapsed, show_confirm_dialog, show_error_dialog, show_export_progress,
    show_table_dialog, ConfirmResult, ErrorDialogResult, TableDialogResult,
};
pub use settings::SettingsPanel;
pub use toolbar::{Toolbar, ToolbarAction, ToolbarState};
