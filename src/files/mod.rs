//! File dialogs and export file naming.

pub mod dialogs;

pub use dialogs::{
    export_dialog, open_file_dialog, pick_executable_dialog, pick_file_dialog,
    pick_folder_dialog, save_as_dialog, suggested_filename,
};
