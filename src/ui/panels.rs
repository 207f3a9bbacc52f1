use eframe::egui::{self, Color32, RichText, ScrollArea, Ui};
use egui_extras::{Column, TableBuilder};

use crate::color::ColorMap;
use crate::data::loader::Format;
use crate::data::schema::Section;
use crate::data::store::ChannelOption;
use crate::spectra::transform::TransformMode;
use crate::state::AppState;

// ---------------------------------------------------------------------------
// Left side panel – files, channels, traces
// ---------------------------------------------------------------------------

/// Render the left panel.
pub fn side_panel(ui: &mut Ui, state: &mut AppState) {
    ui.heading("Files");
    ui.separator();

    if state.store.is_empty() {
        ui.label("No files loaded.");
        return;
    }
    files_table(ui, state);
    ui.separator();

    // Clone the options so state can be mutated inside the widgets.
    let channels = state.channels.clone();

    ScrollArea::vertical()
        .auto_shrink([false, false])
        .show(ui, |ui: &mut Ui| {
            ui.strong("Image channel");
            let current = state.image_channel.clone().unwrap_or_default();
            if let Some(choice) = channel_combo(ui, "image_channel", &current, &channels.image) {
                state.image_channel = Some(choice);
            }
            ui.add_space(6.0);

            ui.strong("X channel");
            let current = state.x_channel.clone().unwrap_or_default();
            if let Some(choice) = channel_combo(ui, "x_channel", &current, &channels.spectra_x) {
                state.set_x_channel(choice);
            }
            ui.add_space(6.0);

            egui::CollapsingHeader::new(
                RichText::new(format!(
                    "Y channels  ({}/{})",
                    state.y_channels.len(),
                    channels.spectra_y.len()
                ))
                .strong(),
            )
            .id_salt("y_channels")
            .default_open(true)
            .show(ui, |ui: &mut Ui| {
                for opt in &channels.spectra_y {
                    let mut checked = state.y_channels.contains(&opt.value);
                    if ui.checkbox(&mut checked, &opt.label).changed() {
                        state.toggle_y_channel(&opt.value);
                    }
                }
            });
            ui.separator();

            trace_list(ui, state);
        });
}

fn files_table(ui: &mut Ui, state: &AppState) {
    let started = state
        .store
        .collect(Section::ExperimentMetadata, "time_start")
        .unwrap_or_default();

    TableBuilder::new(ui)
        .striped(true)
        .max_scroll_height(140.0)
        .column(Column::auto())
        .column(Column::remainder().clip(true))
        .column(Column::auto())
        .column(Column::auto())
        .column(Column::auto())
        .header(18.0, |mut header| {
            for title in ["#", "Experiment", "Type", "Points", "Started"] {
                header.col(|ui: &mut Ui| {
                    ui.strong(title);
                });
            }
        })
        .body(|mut body| {
            for (file_index, record) in state.store.iter() {
                body.row(18.0, |mut row| {
                    row.col(|ui: &mut Ui| {
                        ui.label(file_index.to_string());
                    });
                    row.col(|ui: &mut Ui| {
                        let comment = record.experiment_metadata.comment.as_deref();
                        ui.label(record.name())
                            .on_hover_text(comment.unwrap_or("no comment"));
                    });
                    row.col(|ui: &mut Ui| {
                        ui.label(record.experiment_metadata.data_type.as_str());
                    });
                    row.col(|ui: &mut Ui| {
                        ui.label(record.positions().len().to_string());
                    });
                    row.col(|ui: &mut Ui| {
                        match started.get(file_index) {
                            Some(value) if !value.is_null() => ui.label(value.to_string()),
                            _ => ui.weak("unknown"),
                        };
                    });
                });
            }
        });
}

/// A combo box over `options`; returns the newly chosen value, if any.
fn channel_combo(
    ui: &mut Ui,
    id: &str,
    current: &str,
    options: &[ChannelOption],
) -> Option<String> {
    let mut choice = None;
    egui::ComboBox::from_id_salt(id)
        .selected_text(current)
        .width(ui.available_width() - 8.0)
        .show_ui(ui, |ui: &mut Ui| {
            for opt in options {
                if ui.selectable_label(current == opt.value, &opt.label).clicked() {
                    choice = Some(opt.value.clone());
                }
            }
        });
    choice.filter(|c| c != current)
}

fn trace_list(ui: &mut Ui, state: &mut AppState) {
    let Some(set) = &state.traces else {
        ui.label("Click or right-drag on the image to pick spectra.");
        return;
    };
    ui.strong(format!(
        "Traces ({} points, {} means)",
        set.points().count(),
        set.means().count()
    ));

    let color_map = ColorMap::new(&set.traces);
    let mut toggled = None;
    for (i, trace) in set.traces.iter().enumerate() {
        let text = RichText::new(format!("{}  [{}]", trace.label, trace.channel))
            .color(color_map.color_for(trace));
        let mut visible = trace.visible;
        if ui.checkbox(&mut visible, text).changed() {
            toggled = Some(i);
        }
    }
    if let Some(i) = toggled {
        state.toggle_trace_visibility(i);
    }
}

// ---------------------------------------------------------------------------
// Top bar
// ---------------------------------------------------------------------------

/// Render the top menu / toolbar.
pub fn top_bar(ui: &mut Ui, state: &mut AppState) {
    egui::menu::bar(ui, |ui: &mut Ui| {
        ui.menu_button("File", |ui: &mut Ui| {
            if ui.button("Open…").clicked() {
                open_file_dialog(state);
                ui.close_menu();
            }
            if ui.button("Reset").clicked() {
                state.reset_all();
                ui.close_menu();
            }
        });

        ui.separator();

        if !state.store.is_empty() {
            ui.label(format!("{} files loaded", state.store.len()));
            ui.separator();
        }

        for mode in TransformMode::ALL {
            if ui.selectable_label(state.mode == mode, mode.label()).clicked() {
                state.set_mode(mode);
            }
        }

        ui.separator();

        if ui
            .selectable_label(state.background.is_some(), "Remove Background")
            .clicked()
        {
            state.toggle_background();
        }
        if ui.button("Clear Spectra").clicked() {
            state.clear_spectra();
        }

        if let Some(msg) = &state.status_message {
            ui.label(RichText::new(msg).color(Color32::RED));
        }
    });
}

// ---------------------------------------------------------------------------
// File dialog
// ---------------------------------------------------------------------------

pub fn open_file_dialog(state: &mut AppState) {
    let files = rfd::FileDialog::new()
        .set_title("Open Nanonis data")
        .add_filter("Supported files", &Format::EXTENSIONS)
        .add_filter("Grid spectroscopy", &["3ds"])
        .add_filter("Point spectroscopy", &["dat"])
        .add_filter("Scan", &["sxm"])
        .pick_files();

    if let Some(paths) = files {
        state.open_files(&paths);
    }
}
