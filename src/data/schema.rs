use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use super::model::{
    CanonicalRecord, DataType, ExperimentMetadata, FieldValue, SignalMetadata, Signals,
    SpectraMatrix,
};
use crate::error::{SpmError, SpmResult};

/// Flat key → value mapping produced by a format adapter.
pub type RawRecord = BTreeMap<String, FieldValue>;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Section {
    ExperimentMetadata,
    SignalMetadata,
    Signals,
}

/// Every key a canonical record may carry, partitioned by section.
pub const VOCABULARY: [(&str, Section); 16] = [
    ("data_type", Section::ExperimentMetadata),
    ("filetype", Section::ExperimentMetadata),
    ("experiment_name", Section::ExperimentMetadata),
    ("time_start", Section::ExperimentMetadata),
    ("time_end", Section::ExperimentMetadata),
    ("comment", Section::ExperimentMetadata),
    ("pos_xy", Section::SignalMetadata),
    ("size_xy", Section::SignalMetadata),
    ("image_points_res", Section::SignalMetadata),
    ("spectra_res", Section::SignalMetadata),
    ("spectra_x_channels", Section::SignalMetadata),
    ("spectra_y_channels", Section::SignalMetadata),
    ("img_channels", Section::SignalMetadata),
    ("spectra_x", Section::Signals),
    ("spectra_y", Section::Signals),
    ("img", Section::Signals),
];

pub fn section_of(key: &str) -> Option<Section> {
    VOCABULARY
        .iter()
        .find(|(k, _)| *k == key)
        .map(|(_, section)| *section)
}

/// Map adapter output into the fixed three-section schema.
///
/// Any key outside [`VOCABULARY`] is rejected with [`SpmError::UnknownField`];
/// vocabulary keys the adapter did not emit become `None`.
pub fn normalize(raw: RawRecord) -> SpmResult<CanonicalRecord> {
    if let Some(key) = raw.keys().find(|k| section_of(k).is_none()) {
        return Err(SpmError::UnknownField(key.clone()));
    }
    let mut fields = Fields(raw);

    let data_type = match fields.text("data_type")? {
        Some(s) => DataType::parse(&s).ok_or_else(|| SpmError::FieldType {
            key: "data_type".into(),
            expected: "\"image\" or \"spectra\"",
            found: "text",
        })?,
        None => return Err(SpmError::MissingField("data_type".into())),
    };
    let experiment_name = fields
        .text("experiment_name")?
        .ok_or_else(|| SpmError::MissingField("experiment_name".into()))?;

    let experiment_metadata = ExperimentMetadata {
        data_type,
        filetype: fields.text("filetype")?,
        experiment_name,
        time_start: fields.text("time_start")?,
        time_end: fields.text("time_end")?,
        comment: fields.text("comment")?,
    };

    let signal_metadata = SignalMetadata {
        pos_xy: fields.points("pos_xy")?,
        size_xy: fields.pair("size_xy")?,
        image_points_res: fields.dims("image_points_res")?,
        spectra_res: fields.count("spectra_res")?,
        spectra_x_channels: fields.names("spectra_x_channels")?,
        spectra_y_channels: fields.names("spectra_y_channels")?,
        img_channels: fields.names("img_channels")?,
    };

    let signals = Signals {
        spectra_x: fields.series("spectra_x")?,
        spectra_y: fields.matrices("spectra_y")?,
        img: fields.series("img")?,
    };

    Ok(CanonicalRecord {
        experiment_metadata,
        signal_metadata,
        signals,
    })
}

/// Typed accessors that drain the raw mapping one key at a time.
struct Fields(RawRecord);

macro_rules! take_as {
    ($name:ident, $variant:ident, $ty:ty, $expected:literal) => {
        fn $name(&mut self, key: &str) -> SpmResult<Option<$ty>> {
            match self.0.remove(key) {
                None | Some(FieldValue::Null) => Ok(None),
                Some(FieldValue::$variant(v)) => Ok(Some(v)),
                Some(other) => Err(SpmError::FieldType {
                    key: key.to_string(),
                    expected: $expected,
                    found: other.kind(),
                }),
            }
        }
    };
}

impl Fields {
    take_as!(text, Text, String, "text");
    take_as!(pair, Pair, [f64; 2], "pair");
    take_as!(dims, Dims, [usize; 2], "dims");
    take_as!(points, Points, Vec<[f64; 2]>, "points");
    take_as!(names, Names, Vec<String>, "names");
    take_as!(series, Series, BTreeMap<String, Vec<f64>>, "series");
    take_as!(matrices, Matrices, BTreeMap<String, SpectraMatrix>, "matrices");

    fn count(&mut self, key: &str) -> SpmResult<Option<usize>> {
        match self.0.remove(key) {
            None | Some(FieldValue::Null) => Ok(None),
            Some(FieldValue::Integer(n)) if n >= 0 => Ok(Some(n as usize)),
            Some(other) => Err(SpmError::FieldType {
                key: key.to_string(),
                expected: "non-negative integer",
                found: other.kind(),
            }),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn minimal() -> RawRecord {
        let mut raw = RawRecord::new();
        raw.insert("data_type".into(), FieldValue::Text("spectra".into()));
        raw.insert("experiment_name".into(), FieldValue::Text("grid_001".into()));
        raw
    }

    #[test]
    fn missing_keys_become_placeholders() {
        let rec = normalize(minimal()).unwrap();
        assert_eq!(rec.experiment_metadata.data_type, DataType::Spectra);
        assert_eq!(rec.signal_metadata, SignalMetadata::default());
        assert_eq!(rec.signals, Signals::default());
        for (key, _) in VOCABULARY {
            assert!(rec.field(key).is_some(), "{key} not addressable");
        }
    }

    #[test]
    fn unknown_key_is_rejected() {
        let mut raw = minimal();
        raw.insert("pos_x".into(), FieldValue::Pair([0.0, 1.0]));
        match normalize(raw) {
            Err(SpmError::UnknownField(key)) => assert_eq!(key, "pos_x"),
            other => panic!("expected UnknownField, got {other:?}"),
        }
    }

    #[test]
    fn required_fields_must_be_present() {
        let mut raw = minimal();
        raw.insert("experiment_name".into(), FieldValue::Null);
        assert!(matches!(normalize(raw), Err(SpmError::MissingField(_))));
    }

    #[test]
    fn wrong_shape_is_reported() {
        let mut raw = minimal();
        raw.insert("size_xy".into(), FieldValue::Text("10nm".into()));
        assert!(matches!(
            normalize(raw),
            Err(SpmError::FieldType { expected: "pair", .. })
        ));
    }

    #[test]
    fn placeholders_serialize_as_null() {
        let rec = normalize(minimal()).unwrap();
        let json = serde_json::to_value(&rec).unwrap();
        for (key, section) in VOCABULARY {
            let section = serde_json::to_value(section).unwrap();
            let section = section.as_str().unwrap();
            assert!(
                json[section].as_object().unwrap().contains_key(key),
                "{section}.{key} omitted"
            );
        }
        assert!(json["signals"]["img"].is_null());
    }
}
