// Hide console window on Windows in release builds
#![cfg_attr(not(debug_assertions), windows_subsystem = "windows")]

//! PaperSmith - Main Entry Point
//!
//! A Markdown editor for Chinese documents with live preview and Word/PDF export.

mod app;
mod config;
mod editor;
mod error;
mod export;
mod files;
mod fonts;
mod markdown;
mod preview;
mod state;
mod string_utils;
mod theme;
mod ui;

use app::PaperSmithApp;
use config::load_config;
use log::info;
use std::path::PathBuf;

const APP_NAME: &str = "PaperSmith";

fn main() -> eframe::Result<()> {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();

    info!("Starting {}", APP_NAME);

    // Optional file to open, e.g. from "Open with"
    let initial_file = std::env::args_os().nth(1).map(PathBuf::from);
    if let Some(path) = &initial_file {
        info!("Startup file: {}", path.display());
    }

    let settings = load_config();
    let window_size = &settings.window_size;

    info!(
        "Window configuration: {}x{}, maximized: {}",
        window_size.width, window_size.height, window_size.maximized
    );

    let viewport = eframe::egui::ViewportBuilder::default()
        .with_title(APP_NAME)
        .with_inner_size([window_size.width, window_size.height])
        .with_min_inner_size([640.0, 400.0])
        .with_maximized(window_size.maximized)
        .with_drag_and_drop(true);

    let native_options = eframe::NativeOptions {
        viewport,
        ..Default::default()
    };

    eframe::run_native(
        APP_NAME,
        native_options,
        Box::new(move |cc| Ok(Box::new(PaperSmithApp::new(cc, initial_file)))),
    )
}
