mod app;
mod color;
mod config;
mod data;
mod error;
mod spectra;
mod state;
mod ui;

use app::SpectraExplorerApp;
use config::ViewerConfig;
use eframe::egui;

fn main() -> eframe::Result {
    env_logger::init();

    let config = ViewerConfig::load();
    let options = eframe::NativeOptions {
        viewport: egui::ViewportBuilder::default()
            .with_inner_size([config.window_width, config.window_height])
            .with_min_inner_size([800.0, 500.0]),
        ..Default::default()
    };

    eframe::run_native(
        "Spectra Explorer",
        options,
        Box::new(|_cc| Ok(Box::new(SpectraExplorerApp::new(config)))),
    )
}
