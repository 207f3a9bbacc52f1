use serde::{Deserialize, Serialize};

use super::transform::TransformMode;
use crate::data::selection::PointKey;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SeriesKind {
    Point,
    Mean,
}

/// One renderable x/y curve.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Trace {
    pub x: Vec<f64>,
    pub y: Vec<f64>,
    pub label: String,
    pub kind: SeriesKind,
    /// The y-channel this curve belongs to.
    pub channel: String,
    /// The spectroscopy point a `Point` trace was taken from.
    pub origin: Option<PointKey>,
    pub visible: bool,
}

impl Trace {
    pub fn point(x: Vec<f64>, y: Vec<f64>, label: &str, channel: &str, origin: PointKey) -> Self {
        Self {
            x,
            y,
            label: label.to_string(),
            kind: SeriesKind::Point,
            channel: channel.to_string(),
            origin: Some(origin),
            visible: true,
        }
    }

    pub fn mean(x: Vec<f64>, y: Vec<f64>, channel: &str) -> Self {
        Self {
            x,
            y,
            label: format!("Mean ({channel})"),
            kind: SeriesKind::Mean,
            channel: channel.to_string(),
            origin: None,
            visible: true,
        }
    }

    pub fn is_mean_of(&self, channel: &str) -> bool {
        self.kind == SeriesKind::Mean && self.channel == channel
    }

    pub fn is_point_of(&self, channel: &str) -> bool {
        self.kind == SeriesKind::Point && self.channel == channel
    }
}

/// The trace list handed to the plotting sink, plus the context it was
/// computed in so the next redraw knows whether it may build on it.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TraceSet {
    pub traces: Vec<Trace>,
    pub mode: TransformMode,
    pub x_channel: String,
    pub y_label: Option<String>,
    pub background_removed: bool,
}

impl TraceSet {
    pub fn empty(mode: TransformMode, x_channel: &str, background_removed: bool) -> Self {
        Self {
            traces: Vec::new(),
            mode,
            x_channel: x_channel.to_string(),
            y_label: None,
            background_removed,
        }
    }

    pub fn title(&self) -> &'static str {
        if self.background_removed {
            "Spectra (Background Removed)"
        } else {
            "Spectra"
        }
    }

    pub fn is_empty(&self) -> bool {
        self.traces.is_empty()
    }

    pub fn len(&self) -> usize {
        self.traces.len()
    }

    pub fn means(&self) -> impl Iterator<Item = &Trace> {
        self.traces.iter().filter(|t| t.kind == SeriesKind::Mean)
    }

    pub fn points(&self) -> impl Iterator<Item = &Trace> {
        self.traces.iter().filter(|t| t.kind == SeriesKind::Point)
    }
}
