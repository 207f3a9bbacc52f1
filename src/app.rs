use eframe::egui;

use crate::config::ViewerConfig;
use crate::state::AppState;
use crate::ui::plot::ImageView;
use crate::ui::{panels, plot};

// ---------------------------------------------------------------------------
// eframe App implementation
// ---------------------------------------------------------------------------

pub struct SpectraExplorerApp {
    pub state: AppState,
    image_view: ImageView,
}

impl SpectraExplorerApp {
    pub fn new(config: ViewerConfig) -> Self {
        Self {
            state: AppState::new(config),
            image_view: ImageView::default(),
        }
    }
}

impl eframe::App for SpectraExplorerApp {
    fn update(&mut self, ctx: &egui::Context, _frame: &mut eframe::Frame) {
        // ---- Top panel: menu bar ----
        egui::TopBottomPanel::top("top_bar").show(ctx, |ui| {
            panels::top_bar(ui, &mut self.state);
        });

        // ---- Left side panel: files, channels, traces ----
        egui::SidePanel::left("side_panel")
            .default_width(260.0)
            .resizable(true)
            .show(ctx, |ui| {
                panels::side_panel(ui, &mut self.state);
            });

        // ---- Right half: spectra ----
        egui::SidePanel::right("spectra_panel")
            .default_width(ctx.screen_rect().width() * 0.4)
            .resizable(true)
            .show(ctx, |ui| {
                plot::spectra_plot(ui, &self.state);
            });

        // ---- Central panel: image and selection ----
        egui::CentralPanel::default().show(ctx, |ui| {
            plot::image_plot(ui, &mut self.state, &mut self.image_view);
        });
    }
}
