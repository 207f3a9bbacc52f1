use super::background::BackgroundSnapshot;
use super::trace::{Trace, TraceSet};
use super::transform::TransformMode;
use crate::data::selection::Selection;
use crate::data::store::DataStore;
use crate::error::{SpmError, SpmResult};

/// Everything one aggregation pass depends on, besides the store.
#[derive(Debug, Clone, Copy)]
pub struct SpectraRequest<'a> {
    pub x_channel: &'a str,
    pub y_channels: &'a [String],
    pub selection: Option<&'a Selection>,
    pub background: Option<&'a BackgroundSnapshot>,
    pub mode: TransformMode,
}

impl SpectraRequest<'_> {
    /// `Err` when there is nothing to aggregate; see [`SpmError::is_precondition`].
    pub fn check(&self) -> SpmResult<&Selection> {
        if self.x_channel.is_empty() || self.y_channels.is_empty() {
            return Err(SpmError::EmptyChannels);
        }
        match self.selection {
            Some(sel) if !sel.is_empty() => Ok(sel),
            _ => Err(SpmError::EmptySelection),
        }
    }

    /// Whether `previous` was drawn under the same mode, axis and background
    /// state, so new point traces may be added to it.
    fn continues(&self, previous: &TraceSet) -> bool {
        previous.mode == self.mode
            && previous.x_channel == self.x_channel
            && previous.background_removed == self.background.is_some()
    }
}

/// Resolve selected points into traces.
///
/// Point traces accumulate on top of `previous` unless the transform mode,
/// x-channel or background state changed. The mean of each y-channel is
/// rebuilt from scratch. On error `previous` is untouched.
pub fn aggregate(
    store: &DataStore,
    req: &SpectraRequest<'_>,
    previous: Option<&TraceSet>,
) -> SpmResult<TraceSet> {
    let selection = req.check()?;

    let mut set = match previous {
        Some(prev) if req.continues(prev) => prev.clone(),
        _ => TraceSet::empty(req.mode, req.x_channel, req.background.is_some()),
    };

    for key in selection.keys() {
        let Some(record) = store.get(key.file_index) else {
            log::debug!("selection refers to unknown file #{}", key.file_index);
            continue;
        };
        for channel in req.y_channels {
            let (Some(x), Some(matrix)) = (record.sweep(req.x_channel), record.spectra(channel))
            else {
                continue;
            };
            let Some(row) = matrix.row(key.point_index) else {
                log::debug!("{} has no point #{}", record.name(), key.point_index);
                continue;
            };
            if row.len() != x.len() {
                return Err(SpmError::SweepLengthMismatch {
                    channel: channel.clone(),
                    expected: x.len(),
                    found: row.len(),
                });
            }

            let mut y = req.mode.apply(x, row);
            if let Some(background) = req.background {
                background.subtract(req.mode, channel, &mut y)?;
            }
            let trace = Trace::point(x.to_vec(), y, record.name(), channel, key);

            match set
                .traces
                .iter_mut()
                .find(|t| t.origin == Some(key) && t.is_point_of(channel))
            {
                Some(existing) => *existing = Trace { visible: existing.visible, ..trace },
                None => set.traces.push(trace),
            }
        }
    }

    recompute_means(&mut set.traces, req.y_channels)?;
    set.y_label = req.y_channels.last().cloned();

    log::debug!(
        "aggregated {} points into {} traces ({})",
        selection.len(),
        set.len(),
        req.mode.label()
    );
    Ok(set)
}

/// Replace each channel's mean trace with the element-wise mean of its
/// visible point traces. Fewer than two contributors produce no mean.
/// A hidden mean stays hidden.
pub fn recompute_means(traces: &mut Vec<Trace>, y_channels: &[String]) -> SpmResult<()> {
    for channel in y_channels {
        let visible = !traces.iter().any(|t| t.is_mean_of(channel) && !t.visible);
        traces.retain(|t| !t.is_mean_of(channel));

        let contributors: Vec<&Trace> = traces
            .iter()
            .filter(|t| t.visible && t.is_point_of(channel))
            .collect();
        let [first, rest @ ..] = contributors.as_slice() else {
            continue;
        };
        if rest.is_empty() {
            continue;
        }

        let mut sum = first.y.clone();
        for trace in rest {
            if trace.y.len() != sum.len() {
                return Err(SpmError::SweepLengthMismatch {
                    channel: channel.clone(),
                    expected: sum.len(),
                    found: trace.y.len(),
                });
            }
            for (s, v) in sum.iter_mut().zip(&trace.y) {
                *s += v;
            }
        }
        let n = contributors.len() as f64;
        let mean: Vec<f64> = sum.into_iter().map(|s| s / n).collect();
        let x = first.x.clone();
        traces.push(Trace {
            visible,
            ..Trace::mean(x, mean, channel)
        });
    }
    Ok(())
}
