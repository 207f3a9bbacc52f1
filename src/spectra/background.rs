use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use super::trace::TraceSet;
use super::transform::TransformMode;
use crate::error::{SpmError, SpmResult};

/// Frozen per-channel reference curves subtracted from later point traces.
///
/// Curves live in the transformed space of `mode` and are only subtracted
/// from traces already transformed the same way.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BackgroundSnapshot {
    pub mode: TransformMode,
    pub x: Vec<f64>,
    pub channels: BTreeMap<String, Vec<f64>>,
}

impl BackgroundSnapshot {
    pub fn channel(&self, name: &str) -> Option<&[f64]> {
        self.channels.get(name).map(Vec::as_slice)
    }

    /// Subtract the stored curve for `channel` from `y`, which must already
    /// be transformed with `mode`. Channels without a stored curve are left
    /// as they are.
    pub fn subtract(&self, mode: TransformMode, channel: &str, y: &mut [f64]) -> SpmResult<()> {
        if mode != self.mode {
            return Err(SpmError::BackgroundModeMismatch {
                captured: self.mode.label(),
                requested: mode.label(),
            });
        }
        let Some(bg) = self.channel(channel) else {
            log::warn!("no background stored for '{channel}', leaving it unchanged");
            return Ok(());
        };
        if bg.len() != y.len() {
            return Err(SpmError::BackgroundLengthMismatch {
                channel: channel.to_string(),
                expected: bg.len(),
                found: y.len(),
            });
        }
        for (v, b) in y.iter_mut().zip(bg) {
            *v -= b;
        }
        Ok(())
    }
}

/// Freeze the currently displayed mean of each active channel.
///
/// A channel with a single visible point trace has no mean overlay; that
/// trace is its own mean and is captured instead. Returns `None` when there
/// is nothing to capture.
pub fn capture(set: &TraceSet, y_channels: &[String]) -> Option<BackgroundSnapshot> {
    let first = set.traces.first()?;

    let mut channels = BTreeMap::new();
    for channel in y_channels {
        let mean = set.traces.iter().find(|t| t.is_mean_of(channel));
        let curve = match mean {
            Some(mean) => Some(mean),
            None => {
                let mut points = set
                    .traces
                    .iter()
                    .filter(|t| t.visible && t.is_point_of(channel));
                match (points.next(), points.next()) {
                    (Some(only), None) => Some(only),
                    _ => None,
                }
            }
        };
        if let Some(trace) = curve {
            channels.insert(channel.clone(), trace.y.clone());
        }
    }

    if channels.is_empty() {
        return None;
    }
    Some(BackgroundSnapshot {
        mode: set.mode,
        x: first.x.clone(),
        channels,
    })
}
