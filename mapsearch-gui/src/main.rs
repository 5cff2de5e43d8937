// Disable console window on Windows in release builds
#![cfg_attr(not(debug_assertions), windows_subsystem = "windows")]

mod app;

use app::MapSearchApp;
use eframe::egui;
use mapsearch_core::MapSearchConfig;
use std::path::Path;

fn main() -> eframe::Result<()> {
    env_logger::init(); // Initialize logging

    let config = load_config().with_env_overrides();

    let native_options = eframe::NativeOptions {
        viewport: egui::ViewportBuilder::default()
            .with_inner_size([700.0, 760.0])
            .with_min_inner_size([
                config.map_width as f32 + 40.0,
                config.map_height as f32 + 260.0,
            ])
            .with_title("Map Search"),
        ..Default::default()
    };

    eframe::run_native(
        "mapsearch",
        native_options,
        Box::new(move |cc| Ok(Box::new(MapSearchApp::new(cc, config)))),
    )
}

/// Read the file named by MAPSEARCH_CONFIG, falling back to defaults
fn load_config() -> MapSearchConfig {
    match std::env::var_os("MAPSEARCH_CONFIG") {
        Some(path) => MapSearchConfig::load(Path::new(&path)).unwrap_or_else(|e| {
            log::warn!("Ignoring config file: {:#}", e);
            MapSearchConfig::default()
        }),
        None => MapSearchConfig::default(),
    }
}
