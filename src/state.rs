use std::path::PathBuf;

use crate::config::ViewerConfig;
use crate::data::loader::{ingest, Upload};
use crate::data::selection::{resolve, Selection, SelectionPayload};
use crate::data::store::{ChannelOption, ChannelOptions, DataStore};
use crate::spectra::aggregate::{aggregate, recompute_means, SpectraRequest};
use crate::spectra::background::{capture, BackgroundSnapshot};
use crate::spectra::trace::TraceSet;
use crate::spectra::transform::TransformMode;

/// Image layers shown by default when a file offers them.
const PREFERRED_IMAGE_CHANNELS: [&str; 2] = ["Z (forward)", "topo"];

/// Which interaction happened last; its payload wins on overlapping points.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Interaction {
    Click,
    Box,
}

// ---------------------------------------------------------------------------
// Application state
// ---------------------------------------------------------------------------

/// The full session state, independent of rendering.
pub struct AppState {
    pub config: ViewerConfig,

    /// Every file loaded this session, in upload order.
    pub store: DataStore,

    /// Channel names offered by the pickers (cached from the store).
    pub channels: ChannelOptions,

    pub click: Option<SelectionPayload>,
    pub boxed: Option<SelectionPayload>,
    latest: Interaction,

    /// Current traces (None until the first successful aggregation).
    pub traces: Option<TraceSet>,

    /// Frozen reference curves, when background removal is on.
    pub background: Option<BackgroundSnapshot>,

    pub x_channel: Option<String>,
    pub y_channels: Vec<String>,
    pub image_channel: Option<String>,
    pub mode: TransformMode,

    /// Status / error message shown in the UI.
    pub status_message: Option<String>,

    /// Bumped whenever the store is replaced, so views can drop caches.
    pub generation: u64,
}

impl Default for AppState {
    fn default() -> Self {
        Self::new(ViewerConfig::default())
    }
}

impl AppState {
    pub fn new(config: ViewerConfig) -> Self {
        Self {
            mode: config.default_mode,
            config,
            store: DataStore::create_empty(),
            channels: ChannelOptions::default(),
            click: None,
            boxed: None,
            latest: Interaction::Click,
            traces: None,
            background: None,
            x_channel: None,
            y_channels: Vec::new(),
            image_channel: None,
            status_message: None,
            generation: 0,
        }
    }

    // ---- Files -----------------------------------------------------------

    /// Append a batch of uploads. Rejected files are reported in the status
    /// line; the rest of the batch is kept.
    pub fn ingest_uploads(&mut self, uploads: &[Upload]) {
        let outcome = ingest(&self.store, uploads);
        let loaded = outcome.store.len() - self.store.len();

        self.status_message = match outcome.failures.as_slice() {
            [] => None,
            failures => Some(
                failures
                    .iter()
                    .map(|(name, e)| format!("Failed to load {name}: {e}"))
                    .collect::<Vec<_>>()
                    .join("\n"),
            ),
        };
        if loaded > 0 {
            self.set_store(outcome.store);
        }
    }

    /// Read files from disk and ingest them as one batch.
    pub fn open_files(&mut self, paths: &[PathBuf]) {
        let mut uploads = Vec::with_capacity(paths.len());
        let mut unreadable = Vec::new();
        for path in paths {
            match Upload::from_path(path) {
                Ok(upload) => uploads.push(upload),
                Err(e) => {
                    log::error!("Cannot read {}: {e}", path.display());
                    unreadable.push(format!("Failed to read {}: {e}", path.display()));
                }
            }
        }
        self.ingest_uploads(&uploads);
        if !unreadable.is_empty() {
            let mut lines = unreadable;
            lines.extend(self.status_message.take());
            self.status_message = Some(lines.join("\n"));
        }
    }

    fn set_store(&mut self, store: DataStore) {
        self.store = store;
        self.channels = self.store.channel_options();
        self.generation += 1;

        let first = |opts: &[ChannelOption]| opts.first().map(|o| o.value.clone());
        if self.x_channel.is_none() {
            self.x_channel = first(&self.channels.spectra_x);
        }
        if self.y_channels.is_empty() {
            self.y_channels = self
                .channels
                .spectra_y
                .iter()
                .find(|o| Some(&o.value) != self.x_channel.as_ref())
                .map(|o| vec![o.value.clone()])
                .unwrap_or_default();
        }
        if self.image_channel.is_none() {
            self.image_channel = PREFERRED_IMAGE_CHANNELS
                .iter()
                .find(|name| self.channels.image.iter().any(|o| o.value == **name))
                .map(|name| name.to_string())
                .or_else(|| first(&self.channels.image));
        }
    }

    /// Discard files, selection, traces and background together.
    pub fn reset_all(&mut self) {
        *self = Self {
            store: self.store.reset(),
            generation: self.generation + 1,
            ..Self::new(self.config.clone())
        };
        log::info!("Session reset");
    }

    /// Drop the trace list and the selection; loaded files stay.
    pub fn clear_spectra(&mut self) {
        self.traces = None;
        self.click = None;
        self.boxed = None;
        self.status_message = None;
    }

    // ---- Selection -------------------------------------------------------

    pub fn set_click(&mut self, payload: Option<SelectionPayload>) {
        self.click = payload;
        self.latest = Interaction::Click;
        self.redraw();
    }

    pub fn set_box(&mut self, payload: Option<SelectionPayload>) {
        self.boxed = payload;
        self.latest = Interaction::Box;
        self.redraw();
    }

    /// The merged click and box selection, most recent interaction last.
    pub fn selection(&self) -> Option<Selection> {
        let (older, newer) = match self.latest {
            Interaction::Click => (&self.boxed, &self.click),
            Interaction::Box => (&self.click, &self.boxed),
        };
        resolve(&[older.as_ref(), newer.as_ref()])
    }

    // ---- Spectra ---------------------------------------------------------

    /// Re-run aggregation for the current inputs. Failures keep the last
    /// good trace list.
    pub fn redraw(&mut self) {
        let selection = self.selection();
        let request = SpectraRequest {
            x_channel: self.x_channel.as_deref().unwrap_or_default(),
            y_channels: &self.y_channels,
            selection: selection.as_ref(),
            background: self.background.as_ref(),
            mode: self.mode,
        };
        match aggregate(&self.store, &request, self.traces.as_ref()) {
            Ok(set) => {
                self.traces = Some(set);
                self.status_message = None;
            }
            Err(e) if e.is_precondition() => log::debug!("Nothing to draw: {e}"),
            Err(e) => {
                log::error!("Aggregation failed: {e}");
                self.status_message = Some(e.to_string());
            }
        }
    }

    /// Freeze the current means as background, or clear an active one.
    pub fn toggle_background(&mut self) {
        if self.background.take().is_some() {
            log::info!("Background cleared");
        } else {
            let Some(set) = self.traces.as_ref().filter(|set| !set.is_empty()) else {
                log::debug!("No traces to capture a background from");
                return;
            };
            self.background = capture(set, &self.y_channels);
            match &self.background {
                Some(bg) => log::info!("Background captured for {} channel(s)", bg.channels.len()),
                None => {
                    log::debug!("No background captured");
                    return;
                }
            }
        }
        self.redraw();
    }

    /// Switch the transform. A background captured under another mode no
    /// longer applies and is dropped.
    pub fn set_mode(&mut self, mode: TransformMode) {
        if self.mode == mode {
            return;
        }
        self.mode = mode;
        if self.background.as_ref().is_some_and(|bg| bg.mode != mode) {
            self.background = None;
            log::info!("Background cleared on switch to {}", mode.label());
        }
        self.redraw();
    }

    pub fn set_x_channel(&mut self, channel: String) {
        if self.x_channel.as_ref() != Some(&channel) {
            self.x_channel = Some(channel);
            self.redraw();
        }
    }

    /// Add or remove a y-channel. Removing the last one leaves the trace
    /// list as it is.
    pub fn toggle_y_channel(&mut self, channel: &str) {
        match self.y_channels.iter().position(|c| c == channel) {
            Some(i) => {
                self.y_channels.remove(i);
                if self.y_channels.is_empty() {
                    log::debug!("No y-channels left, keeping the current traces");
                    return;
                }
                if let Some(set) = &mut self.traces {
                    set.traces.retain(|t| t.channel != channel);
                }
            }
            None => self.y_channels.push(channel.to_string()),
        }
        self.redraw();
    }

    /// Show or hide one trace; the means follow the visible points.
    pub fn toggle_trace_visibility(&mut self, index: usize) {
        let Some(set) = &self.traces else {
            return;
        };
        let mut traces = set.traces.clone();
        let Some(trace) = traces.get_mut(index) else {
            return;
        };
        trace.visible = !trace.visible;

        match recompute_means(&mut traces, &self.y_channels) {
            Ok(()) => {
                if let Some(set) = &mut self.traces {
                    set.traces = traces;
                }
            }
            Err(e) => {
                log::error!("Cannot update means: {e}");
                self.status_message = Some(e.to_string());
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::data::nanonis::fixtures;
    use crate::data::selection::PickedPoint;

    fn grid_state() -> AppState {
        let mut state = AppState::default();
        state.ingest_uploads(&[Upload::new("grid.3ds", fixtures::grid_3ds(2, 2, 4))]);
        state
    }

    fn picks(points: &[usize]) -> SelectionPayload {
        SelectionPayload {
            points: points
                .iter()
                .map(|&point_index| PickedPoint {
                    file_index: 0,
                    point_index,
                    x: (point_index % 2) as f64,
                    y: (point_index / 2) as f64,
                })
                .collect(),
        }
    }

    #[test]
    fn ingest_picks_default_channels() {
        let state = grid_state();
        assert_eq!(state.store.len(), 1);
        assert_eq!(state.x_channel.as_deref(), Some("Bias (V)"));
        assert_eq!(state.y_channels, vec!["Current (A)".to_string()]);
        assert_eq!(state.image_channel.as_deref(), Some("topo"));
        assert!(state.status_message.is_none());
    }

    #[test]
    fn failed_upload_is_reported_and_rest_kept() {
        let mut state = AppState::default();
        state.ingest_uploads(&[
            Upload::new("bad.xyz", vec![1, 2, 3]),
            Upload::new("point.dat", fixtures::point_dat(3)),
        ]);
        assert_eq!(state.store.len(), 1);
        let msg = state.status_message.unwrap();
        assert!(msg.contains("bad.xyz"));
        assert!(msg.contains(".xyz"));
    }

    #[test]
    fn clicks_accumulate_with_mean() {
        let mut state = grid_state();
        state.set_click(Some(picks(&[0])));
        assert_eq!(state.traces.as_ref().unwrap().len(), 1);

        state.set_click(Some(picks(&[3])));
        let set = state.traces.as_ref().unwrap();
        assert_eq!(set.points().count(), 2);
        assert_eq!(set.means().count(), 1);
    }

    #[test]
    fn empty_selection_keeps_previous_traces() {
        let mut state = grid_state();
        state.set_box(Some(picks(&[0, 1])));
        let before = state.traces.clone();
        state.set_box(None);
        state.set_click(None);
        assert_eq!(state.traces, before);
    }

    #[test]
    fn background_toggle_captures_and_clears() {
        let mut state = grid_state();
        state.set_box(Some(picks(&[0, 1])));
        state.toggle_background();
        let bg = state.background.clone().unwrap();
        let set = state.traces.as_ref().unwrap();
        assert_eq!(set.title(), "Spectra (Background Removed)");
        // mean of pixels 0 and 1 is 0.5 + i; pixel 0 is i
        let p0 = set.points().find(|t| t.origin.unwrap().point_index == 0).unwrap();
        assert_eq!(bg.channel("Current (A)").unwrap()[0], 0.5);
        assert_eq!(p0.y, vec![-0.5; 4]);

        state.toggle_background();
        assert!(state.background.is_none());
        assert_eq!(state.traces.as_ref().unwrap().title(), "Spectra");
    }

    #[test]
    fn derivative_background_removal_flattens_traces() {
        let mut state = grid_state();
        state.set_mode(TransformMode::Derivative);
        state.set_box(Some(picks(&[0, 1])));
        state.toggle_background();
        let bg = state.background.clone().unwrap();
        assert_eq!(bg.mode, TransformMode::Derivative);
        assert!(bg.channel("Current (A)").unwrap().iter().all(|b| (b - 1.5).abs() < 1e-6));

        let set = state.traces.as_ref().unwrap();
        assert!(set.background_removed);
        for trace in set.points() {
            assert!(trace.y.iter().all(|v| v.abs() < 1e-6));
        }

        state.set_mode(TransformMode::Raw);
        assert!(state.background.is_none());
        assert!(!state.traces.as_ref().unwrap().background_removed);
    }

    #[test]
    fn hidden_mean_stays_hidden() {
        let mut state = grid_state();
        state.set_box(Some(picks(&[0, 1])));
        let mean_index = |state: &AppState| {
            let set = state.traces.as_ref().unwrap();
            set.traces.iter().position(|t| t.origin.is_none()).unwrap()
        };
        state.toggle_trace_visibility(mean_index(&state));
        let set = state.traces.as_ref().unwrap();
        assert_eq!(set.means().count(), 1);
        assert!(!set.means().next().unwrap().visible);

        state.toggle_trace_visibility(mean_index(&state));
        assert!(state.traces.as_ref().unwrap().means().next().unwrap().visible);
    }

    #[test]
    fn hiding_a_trace_drops_the_mean() {
        let mut state = grid_state();
        state.set_box(Some(picks(&[0, 1])));
        state.toggle_trace_visibility(0);
        let set = state.traces.as_ref().unwrap();
        assert!(!set.traces[0].visible);
        assert_eq!(set.means().count(), 0);

        state.toggle_trace_visibility(0);
        assert_eq!(state.traces.as_ref().unwrap().means().count(), 1);
    }

    #[test]
    fn mode_change_restarts_trace_list() {
        let mut state = grid_state();
        state.set_click(Some(picks(&[0])));
        state.set_click(Some(picks(&[1])));
        state.set_mode(TransformMode::Derivative);
        let set = state.traces.as_ref().unwrap();
        assert_eq!(set.mode, TransformMode::Derivative);
        // only the current click survives the restart
        assert_eq!(set.points().count(), 1);
        // Current rises by 1 per sample over a 2/3 V step
        assert!(set.traces[0].y.iter().all(|v| (v - 1.5).abs() < 1e-6));
    }

    #[test]
    fn reset_discards_everything() {
        let mut state = grid_state();
        state.set_box(Some(picks(&[0, 1])));
        state.toggle_background();
        let generation = state.generation;
        state.reset_all();
        assert!(state.store.is_empty());
        assert!(state.traces.is_none());
        assert!(state.background.is_none());
        assert!(state.selection().is_none());
        assert!(state.x_channel.is_none());
        assert!(state.generation > generation);
    }

    #[test]
    fn toggling_y_channel_adds_and_removes_traces() {
        let mut state = grid_state();
        state.set_click(Some(picks(&[2])));
        state.toggle_y_channel("LIX (A)");
        assert_eq!(state.traces.as_ref().unwrap().len(), 2);
        state.toggle_y_channel("Current (A)");
        let set = state.traces.as_ref().unwrap();
        assert!(set.traces.iter().all(|t| t.channel == "LIX (A)"));
    }

    #[test]
    fn removing_the_last_y_channel_keeps_traces() {
        let mut state = grid_state();
        state.set_click(Some(picks(&[2])));
        let before = state.traces.clone();
        state.toggle_y_channel("Current (A)");
        assert!(state.y_channels.is_empty());
        assert_eq!(state.traces, before);
        assert!(state.status_message.is_none());
    }
}
