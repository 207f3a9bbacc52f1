use std::collections::BTreeMap;
use std::fmt;

use serde::{Deserialize, Serialize};

// ---------------------------------------------------------------------------
// FieldValue – one value in an adapter's flat key → value output
// ---------------------------------------------------------------------------

/// A dynamically-shaped value emitted by a format adapter before
/// normalization pins it to a typed field of [`CanonicalRecord`].
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum FieldValue {
    Null,
    Text(String),
    Integer(i64),
    /// A single `(a, b)` pair, e.g. physical extent.
    Pair([f64; 2]),
    /// A pixel resolution `(nx, ny)`.
    Dims([usize; 2]),
    /// One `(x, y)` coordinate per spectroscopy point.
    Points(Vec<[f64; 2]>),
    Names(Vec<String>),
    /// Channel name → flat numeric sequence.
    Series(BTreeMap<String, Vec<f64>>),
    /// Channel name → `(n_points, spectra_res)` array.
    Matrices(BTreeMap<String, SpectraMatrix>),
}

impl FieldValue {
    /// Short shape name used in error messages.
    pub fn kind(&self) -> &'static str {
        match self {
            FieldValue::Null => "null",
            FieldValue::Text(_) => "text",
            FieldValue::Integer(_) => "integer",
            FieldValue::Pair(_) => "pair",
            FieldValue::Dims(_) => "dims",
            FieldValue::Points(_) => "points",
            FieldValue::Names(_) => "names",
            FieldValue::Series(_) => "series",
            FieldValue::Matrices(_) => "matrices",
        }
    }

    pub fn is_null(&self) -> bool {
        matches!(self, FieldValue::Null)
    }
}

impl fmt::Display for FieldValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            FieldValue::Null => write!(f, "<null>"),
            FieldValue::Text(s) => write!(f, "{s}"),
            FieldValue::Integer(i) => write!(f, "{i}"),
            FieldValue::Pair([a, b]) => write!(f, "({a:.3e}, {b:.3e})"),
            FieldValue::Dims([a, b]) => write!(f, "{a} × {b}"),
            FieldValue::Points(p) => write!(f, "{} points", p.len()),
            FieldValue::Names(n) => write!(f, "{}", n.join(", ")),
            FieldValue::Series(s) => write!(f, "{} series", s.len()),
            FieldValue::Matrices(m) => write!(f, "{} arrays", m.len()),
        }
    }
}

// ---------------------------------------------------------------------------
// SpectraMatrix – row-major (n_points, spectra_res) array
// ---------------------------------------------------------------------------

/// Dependent-channel values for every spectroscopy point of one file.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SpectraMatrix {
    pub rows: usize,
    pub cols: usize,
    pub values: Vec<f64>,
}

impl SpectraMatrix {
    /// Wrap a flat buffer; `None` unless `values.len() == rows * cols`.
    pub fn new(rows: usize, cols: usize, values: Vec<f64>) -> Option<Self> {
        (rows * cols == values.len()).then_some(Self { rows, cols, values })
    }

    /// The sweep of point `index`.
    pub fn row(&self, index: usize) -> Option<&[f64]> {
        if index >= self.rows {
            return None;
        }
        let start = index * self.cols;
        self.values.get(start..start + self.cols)
    }
}

// ---------------------------------------------------------------------------
// CanonicalRecord – one normalized uploaded file
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DataType {
    Image,
    Spectra,
}

impl DataType {
    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "image" => Some(DataType::Image),
            "spectra" => Some(DataType::Spectra),
            _ => None,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            DataType::Image => "image",
            DataType::Spectra => "spectra",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ExperimentMetadata {
    pub data_type: DataType,
    pub filetype: Option<String>,
    pub experiment_name: String,
    pub time_start: Option<String>,
    pub time_end: Option<String>,
    pub comment: Option<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct SignalMetadata {
    pub pos_xy: Option<Vec<[f64; 2]>>,
    pub size_xy: Option<[f64; 2]>,
    pub image_points_res: Option<[usize; 2]>,
    pub spectra_res: Option<usize>,
    pub spectra_x_channels: Option<Vec<String>>,
    pub spectra_y_channels: Option<Vec<String>>,
    pub img_channels: Option<Vec<String>>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Signals {
    pub spectra_x: Option<BTreeMap<String, Vec<f64>>>,
    pub spectra_y: Option<BTreeMap<String, SpectraMatrix>>,
    pub img: Option<BTreeMap<String, Vec<f64>>>,
}

/// The fixed three-section schema every instrument file is normalized into.
/// Absent fields are `None` (serialized as `null`), never omitted.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CanonicalRecord {
    pub experiment_metadata: ExperimentMetadata,
    pub signal_metadata: SignalMetadata,
    pub signals: Signals,
}

impl CanonicalRecord {
    pub fn name(&self) -> &str {
        &self.experiment_metadata.experiment_name
    }

    pub fn is_spectra(&self) -> bool {
        self.experiment_metadata.data_type == DataType::Spectra
    }

    /// Sweep axis for `channel`, if this file recorded it.
    pub fn sweep(&self, channel: &str) -> Option<&[f64]> {
        self.signals
            .spectra_x
            .as_ref()?
            .get(channel)
            .map(Vec::as_slice)
    }

    /// Dependent values for `channel`, if this file recorded it.
    pub fn spectra(&self, channel: &str) -> Option<&SpectraMatrix> {
        self.signals.spectra_y.as_ref()?.get(channel)
    }

    /// Flat image layer for `channel` and its `(nx, ny)` resolution.
    pub fn image(&self, channel: &str) -> Option<(&[f64], [usize; 2])> {
        let res = self.signal_metadata.image_points_res?;
        let layer = self.signals.img.as_ref()?.get(channel)?;
        (layer.len() == res[0] * res[1]).then_some((layer.as_slice(), res))
    }

    pub fn positions(&self) -> &[[f64; 2]] {
        self.signal_metadata.pos_xy.as_deref().unwrap_or(&[])
    }

    /// Lower-left corner and size of the scanned area in plot units.
    pub fn image_extent(&self) -> Option<([f64; 2], [f64; 2])> {
        let size = self.signal_metadata.size_xy?;
        let (first, rest) = self.positions().split_first()?;
        let origin = rest.iter().fold(*first, |acc, p| {
            [acc[0].min(p[0]), acc[1].min(p[1])]
        });
        Some((origin, size))
    }

    /// Look up any vocabulary key as a [`FieldValue`], placeholders included.
    pub fn field(&self, key: &str) -> Option<FieldValue> {
        let em = &self.experiment_metadata;
        let sm = &self.signal_metadata;
        let sig = &self.signals;
        fn text(v: &Option<String>) -> FieldValue {
            v.clone().map_or(FieldValue::Null, FieldValue::Text)
        }
        fn names(v: &Option<Vec<String>>) -> FieldValue {
            v.clone().map_or(FieldValue::Null, FieldValue::Names)
        }
        let value = match key {
            "data_type" => FieldValue::Text(em.data_type.as_str().to_string()),
            "filetype" => text(&em.filetype),
            "experiment_name" => FieldValue::Text(em.experiment_name.clone()),
            "time_start" => text(&em.time_start),
            "time_end" => text(&em.time_end),
            "comment" => text(&em.comment),
            "pos_xy" => sm.pos_xy.clone().map_or(FieldValue::Null, FieldValue::Points),
            "size_xy" => sm.size_xy.map_or(FieldValue::Null, FieldValue::Pair),
            "image_points_res" => sm.image_points_res.map_or(FieldValue::Null, FieldValue::Dims),
            "spectra_res" => sm
                .spectra_res
                .map_or(FieldValue::Null, |n| FieldValue::Integer(n as i64)),
            "spectra_x_channels" => names(&sm.spectra_x_channels),
            "spectra_y_channels" => names(&sm.spectra_y_channels),
            "img_channels" => names(&sm.img_channels),
            "spectra_x" => sig.spectra_x.clone().map_or(FieldValue::Null, FieldValue::Series),
            "spectra_y" => sig
                .spectra_y
                .clone()
                .map_or(FieldValue::Null, FieldValue::Matrices),
            "img" => sig.img.clone().map_or(FieldValue::Null, FieldValue::Series),
            _ => return None,
        };
        Some(value)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn matrix_rows_are_sweeps() {
        let m = SpectraMatrix::new(2, 3, vec![1.0, 2.0, 3.0, 4.0, 5.0, 6.0]).unwrap();
        assert_eq!(m.row(1), Some(&[4.0, 5.0, 6.0][..]));
        assert_eq!(m.row(2), None);
        assert!(SpectraMatrix::new(2, 2, vec![1.0]).is_none());
    }

    #[test]
    fn scan_extent_is_centred_on_offset() {
        let rec = crate::data::loader::load_bytes(
            "scan.sxm",
            &crate::data::nanonis::fixtures::scan_sxm(2, 2),
        )
        .unwrap();
        let (origin, size) = rec.image_extent().unwrap();
        assert!((origin[0] + 5e-9).abs() < 1e-15);
        assert!((origin[1] + 1e-8).abs() < 1e-15);
        assert_eq!(size, [1e-8, 2e-8]);
    }
}
