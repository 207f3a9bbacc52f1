use std::collections::HashMap;

use eframe::egui::{self, Color32, PointerButton, RichText, Stroke, TextureHandle, TextureOptions, Ui};
use egui_plot::{Legend, Line, MarkerShape, Plot, PlotImage, PlotPoint, PlotPoints, Points, Polygon};

use crate::color::{colorize, ColorMap};
use crate::data::selection::SelectionPayload;
use crate::spectra::trace::{SeriesKind, Trace};
use crate::state::AppState;

/// Positions are stored in metres and drawn in nanometres.
const NM: f64 = 1e9;

const SELECTED_COLOR: Color32 = Color32::from_rgb(255, 220, 60);

// ---------------------------------------------------------------------------
// Image plot (positions, topography, selection)
// ---------------------------------------------------------------------------

/// Rendering caches for the image plot.
#[derive(Default)]
pub struct ImageView {
    /// Uploaded layers keyed by `(file_index, channel)`.
    textures: HashMap<(usize, String), TextureHandle>,
    /// Store generation the textures were built for.
    generation: u64,
    /// Where the current secondary-button drag started, in plot units.
    drag_start: Option<[f64; 2]>,
}

/// Draw every image layer and spectroscopy marker; turn clicks and
/// right-drags into selection payloads.
pub fn image_plot(ui: &mut Ui, state: &mut AppState, view: &mut ImageView) {
    if state.store.is_empty() {
        ui.centered_and_justified(|ui: &mut Ui| {
            ui.heading("Open a file to view data  (File → Open…)");
        });
        return;
    }
    if view.generation != state.generation {
        view.textures.clear();
        view.generation = state.generation;
    }

    let ctx = ui.ctx().clone();
    let selection = state.selection();
    let channel = state.image_channel.clone();
    let marker_radius = state.config.marker_radius;

    let response = Plot::new("image_plot")
        .legend(Legend::default())
        .data_aspect(1.0)
        .x_axis_label("x (nm)")
        .y_axis_label("y (nm)")
        .allow_boxed_zoom(false)
        .allow_drag(true)
        .allow_scroll(true)
        .allow_zoom(true)
        .show(ui, |plot_ui| {
            for (file_index, record) in state.store.iter() {
                let Some(channel) = &channel else { break };
                let (Some((values, res)), Some((origin, size))) =
                    (record.image(channel), record.image_extent())
                else {
                    continue;
                };
                let texture = view
                    .textures
                    .entry((file_index, channel.clone()))
                    .or_insert_with(|| {
                        ctx.load_texture(
                            format!("{file_index}:{channel}"),
                            colorize(values, res),
                            TextureOptions::NEAREST,
                        )
                    });
                let center = PlotPoint::new(
                    (origin[0] + size[0] / 2.0) * NM,
                    (origin[1] + size[1] / 2.0) * NM,
                );
                let extent = egui::vec2((size[0] * NM) as f32, (size[1] * NM) as f32);
                plot_ui.image(PlotImage::new(texture.id(), center, extent));
            }

            for (_, record) in state.store.iter().filter(|(_, r)| r.is_spectra()) {
                let points: PlotPoints = record
                    .positions()
                    .iter()
                    .map(|p| [p[0] * NM, p[1] * NM])
                    .collect();
                plot_ui.points(
                    Points::new(points)
                        .name(record.name())
                        .radius(marker_radius)
                        .shape(MarkerShape::Circle)
                        .filled(true),
                );
            }

            if let Some(selection) = &selection {
                let points: PlotPoints = selection
                    .iter()
                    .map(|(_, p)| [p[0] * NM, p[1] * NM])
                    .collect();
                plot_ui.points(
                    Points::new(points)
                        .name("Selected")
                        .radius(marker_radius + 2.0)
                        .shape(MarkerShape::Circle)
                        .filled(false)
                        .color(SELECTED_COLOR),
                );
            }

            if let (Some(a), Some(b)) = (view.drag_start, plot_ui.pointer_coordinate()) {
                let corners = vec![[a[0], a[1]], [b.x, a[1]], [b.x, b.y], [a[0], b.y]];
                plot_ui.polygon(
                    Polygon::new(PlotPoints::from(corners))
                        .stroke(Stroke::new(1.0, SELECTED_COLOR))
                        .fill_color(SELECTED_COLOR.gamma_multiply(0.15)),
                );
            }
        });

    let transform = response.transform;
    let pointer = response
        .response
        .interact_pointer_pos()
        .or(response.response.hover_pos())
        .map(|pos| transform.value_from_position(pos));

    if response.response.clicked() {
        if let Some(at) = pointer {
            let [dx, dy] = transform.dvalue_dpos();
            let radius = f64::from(state.config.pick_radius_px);
            let tolerance = [radius * dx.abs() / NM, radius * dy.abs() / NM];
            match SelectionPayload::click(&state.store, at.x / NM, at.y / NM, tolerance) {
                Some(payload) => state.set_click(Some(payload)),
                None => log::debug!("No spectroscopy point near ({:.3}, {:.3}) nm", at.x, at.y),
            }
        }
    }

    if response.response.drag_started_by(PointerButton::Secondary) {
        view.drag_start = pointer.map(|p| [p.x, p.y]);
    }
    if response.response.drag_stopped_by(PointerButton::Secondary) {
        if let (Some(a), Some(b)) = (view.drag_start.take(), pointer) {
            let payload =
                SelectionPayload::boxed(&state.store, [a[0] / NM, a[1] / NM], [b.x / NM, b.y / NM]);
            log::debug!("Box selected {} points", payload.points.len());
            state.set_box(Some(payload));
        }
    }
}

// ---------------------------------------------------------------------------
// Spectra plot
// ---------------------------------------------------------------------------

fn legend_name(trace: &Trace) -> String {
    match trace.origin {
        Some(origin) => format!("{} #{} ({})", trace.label, origin.point_index, trace.channel),
        None => trace.label.clone(),
    }
}

/// Render the current trace list.
pub fn spectra_plot(ui: &mut Ui, state: &AppState) {
    let Some(set) = &state.traces else {
        ui.centered_and_justified(|ui: &mut Ui| {
            ui.label("Click or right-drag on the image to plot spectra.");
        });
        return;
    };

    ui.label(RichText::new(set.title()).strong());

    let color_map = ColorMap::new(&set.traces);
    let y_label = match &set.y_label {
        Some(channel) => format!("{channel}  [{}]", set.mode.label()),
        None => set.mode.label().to_string(),
    };

    Plot::new("spectra_plot")
        .legend(Legend::default())
        .x_axis_label(set.x_channel.clone())
        .y_axis_label(y_label)
        .allow_boxed_zoom(true)
        .allow_drag(true)
        .allow_scroll(true)
        .allow_zoom(true)
        .show(ui, |plot_ui| {
            for trace in set.traces.iter().filter(|t| t.visible) {
                let points: PlotPoints = trace
                    .x
                    .iter()
                    .zip(&trace.y)
                    .map(|(&x, &y)| [x, y])
                    .collect();

                let width = match trace.kind {
                    SeriesKind::Mean => state.config.mean_line_width,
                    SeriesKind::Point => 1.5,
                };
                plot_ui.line(
                    Line::new(points)
                        .name(legend_name(trace))
                        .color(color_map.color_for(trace))
                        .width(width),
                );
            }
        });
}
