use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use super::store::DataStore;

// ---------------------------------------------------------------------------
// Raw UI payloads
// ---------------------------------------------------------------------------

/// One spectroscopy point hit by a click or box selection on the image.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct PickedPoint {
    /// File the marker was rendered from.
    pub file_index: usize,
    /// Index into that file's `pos_xy` / `spectra_y` point dimension.
    pub point_index: usize,
    pub x: f64,
    pub y: f64,
}

/// Points carried by one interaction (a click, or a box selection).
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct SelectionPayload {
    pub points: Vec<PickedPoint>,
}

impl SelectionPayload {
    /// The spectroscopy point nearest to `(x, y)`, if it lies within
    /// `tolerance` (plot units per axis).
    pub fn click(store: &DataStore, x: f64, y: f64, tolerance: [f64; 2]) -> Option<Self> {
        let scaled = |p: &PickedPoint| {
            let dx = (p.x - x) / tolerance[0].max(f64::MIN_POSITIVE);
            let dy = (p.y - y) / tolerance[1].max(f64::MIN_POSITIVE);
            dx * dx + dy * dy
        };
        let nearest = spectroscopy_points(store)
            .filter(|p| scaled(p) <= 1.0)
            .min_by(|a, b| scaled(a).total_cmp(&scaled(b)))?;
        Some(Self {
            points: vec![nearest],
        })
    }

    /// Every spectroscopy point inside the rectangle spanned by two corners.
    pub fn boxed(store: &DataStore, a: [f64; 2], b: [f64; 2]) -> Self {
        let (x0, x1) = (a[0].min(b[0]), a[0].max(b[0]));
        let (y0, y1) = (a[1].min(b[1]), a[1].max(b[1]));
        Self {
            points: spectroscopy_points(store)
                .filter(|p| (x0..=x1).contains(&p.x) && (y0..=y1).contains(&p.y))
                .collect(),
        }
    }
}

/// Every selectable point: positions of files that carry spectra.
fn spectroscopy_points(store: &DataStore) -> impl Iterator<Item = PickedPoint> + '_ {
    store
        .iter()
        .filter(|(_, rec)| rec.is_spectra())
        .flat_map(|(file_index, rec)| {
            rec.positions()
                .iter()
                .enumerate()
                .map(move |(point_index, &[x, y])| PickedPoint {
                    file_index,
                    point_index,
                    x,
                    y,
                })
        })
}

// ---------------------------------------------------------------------------
// Resolved selection
// ---------------------------------------------------------------------------

/// Identity of a spectroscopy point across the whole store.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct PointKey {
    pub file_index: usize,
    pub point_index: usize,
}

/// Deduplicated selection: point identity → last known marker position.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Selection {
    points: BTreeMap<PointKey, [f64; 2]>,
}

impl Selection {
    pub fn len(&self) -> usize {
        self.points.len()
    }

    pub fn is_empty(&self) -> bool {
        self.points.is_empty()
    }

    /// Keys in `(file_index, point_index)` order.
    pub fn keys(&self) -> impl Iterator<Item = PointKey> + '_ {
        self.points.keys().copied()
    }

    pub fn iter(&self) -> impl Iterator<Item = (PointKey, [f64; 2])> + '_ {
        self.points.iter().map(|(k, v)| (*k, *v))
    }
}

/// Merge UI payloads into one selection.
///
/// `None` payloads mean "no active selection of that kind". Later payloads
/// overwrite earlier entries for the same point. Returns `None` when the merge
/// is empty; the caller must skip aggregation in that case.
pub fn resolve(payloads: &[Option<&SelectionPayload>]) -> Option<Selection> {
    let points: BTreeMap<PointKey, [f64; 2]> = payloads
        .iter()
        .flatten()
        .flat_map(|payload| payload.points.iter())
        .map(|p| {
            let key = PointKey {
                file_index: p.file_index,
                point_index: p.point_index,
            };
            (key, [p.x, p.y])
        })
        .collect();

    (!points.is_empty()).then_some(Selection { points })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::data::loader::load_bytes;
    use crate::data::nanonis::fixtures;

    fn pick(file_index: usize, point_index: usize, x: f64) -> PickedPoint {
        PickedPoint {
            file_index,
            point_index,
            x,
            y: 0.0,
        }
    }

    fn payload(points: &[PickedPoint]) -> SelectionPayload {
        SelectionPayload {
            points: points.to_vec(),
        }
    }

    #[test]
    fn empty_merge_is_none() {
        assert!(resolve(&[]).is_none());
        assert!(resolve(&[None, None]).is_none());
        assert!(resolve(&[Some(&SelectionPayload::default())]).is_none());
    }

    #[test]
    fn duplicate_events_are_idempotent() {
        let click = payload(&[pick(0, 3, 1.0), pick(1, 0, 2.0)]);
        let once = resolve(&[Some(&click)]).unwrap();
        let twice = resolve(&[Some(&click), Some(&click)]).unwrap();
        assert_eq!(once, twice);
        assert_eq!(once.len(), 2);
    }

    #[test]
    fn later_payload_wins_for_same_point() {
        let first = payload(&[pick(0, 3, 1.0)]);
        let second = payload(&[pick(0, 3, 9.0)]);
        let sel = resolve(&[Some(&first), None, Some(&second)]).unwrap();
        assert_eq!(sel.len(), 1);
        assert_eq!(sel.iter().next().unwrap().1, [9.0, 0.0]);
    }

    #[test]
    fn same_point_index_in_different_files_is_distinct() {
        let sel = resolve(&[Some(&payload(&[pick(0, 1, 0.0), pick(2, 1, 0.0)]))]).unwrap();
        let keys: Vec<PointKey> = sel.keys().collect();
        assert_eq!(keys.len(), 2);
        assert_eq!(keys[1].file_index, 2);
    }

    #[test]
    fn click_and_box_pick_spectroscopy_points_only() {
        let store = DataStore::create_empty()
            .append(load_bytes("scan.sxm", &fixtures::scan_sxm(2, 2)).unwrap())
            .append(load_bytes("grid.3ds", &fixtures::grid_3ds(3, 3, 2)).unwrap());

        // grid pixel (ix, iy) sits at (ix, iy)
        let hit = SelectionPayload::click(&store, 1.1, 1.9, [0.5, 0.5]).unwrap();
        assert_eq!(hit.points.len(), 1);
        assert_eq!((hit.points[0].file_index, hit.points[0].point_index), (1, 7));
        assert!(SelectionPayload::click(&store, 5.0, 5.0, [0.5, 0.5]).is_none());

        let boxed = SelectionPayload::boxed(&store, [1.5, -0.5], [0.5, 1.5]);
        let ids: Vec<usize> = boxed.points.iter().map(|p| p.point_index).collect();
        assert_eq!(ids, vec![1, 4]);
        assert!(boxed.points.iter().all(|p| p.file_index == 1));
    }
}
