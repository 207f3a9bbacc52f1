use std::collections::BTreeSet;
use std::sync::Arc;

use serde::Serialize;

use super::model::{CanonicalRecord, FieldValue};
use super::schema::{section_of, Section};
use crate::error::{SpmError, SpmResult};

// ---------------------------------------------------------------------------
// DataStore – append-only sequence of normalized files
// ---------------------------------------------------------------------------

/// Ordered collection of canonical records. The index of a record is its
/// stable file index; records are shared, never mutated after insertion.
#[derive(Debug, Clone, Default)]
pub struct DataStore {
    records: Vec<Arc<CanonicalRecord>>,
}

impl DataStore {
    pub fn create_empty() -> Self {
        Self::default()
    }

    /// A new store with `record` at index `self.len()`. `self` is untouched.
    pub fn append(&self, record: CanonicalRecord) -> Self {
        let mut records = self.records.clone();
        records.push(Arc::new(record));
        Self { records }
    }

    /// Discard every record.
    pub fn reset(&self) -> Self {
        Self::create_empty()
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    pub fn get(&self, file_index: usize) -> Option<&CanonicalRecord> {
        self.records.get(file_index).map(Arc::as_ref)
    }

    /// `(file_index, record)` in upload order.
    pub fn iter(&self) -> impl Iterator<Item = (usize, &CanonicalRecord)> {
        self.records.iter().map(Arc::as_ref).enumerate()
    }

    /// Every record's value at `section`/`key`, one entry per file,
    /// placeholders included.
    pub fn collect(&self, section: Section, key: &str) -> SpmResult<Vec<FieldValue>> {
        if section_of(key) != Some(section) {
            return Err(SpmError::UnknownField(key.to_string()));
        }
        Ok(self
            .records
            .iter()
            .map(|rec| rec.field(key).unwrap_or(FieldValue::Null))
            .collect())
    }

    /// Dropdown options: the union of every file's channel lists per category.
    pub fn channel_options(&self) -> ChannelOptions {
        let union = |pick: fn(&CanonicalRecord) -> Option<&Vec<String>>| {
            let names: BTreeSet<&String> = self
                .records
                .iter()
                .map(Arc::as_ref)
                .filter_map(pick)
                .flatten()
                .collect();
            names.into_iter().map(ChannelOption::new).collect::<Vec<_>>()
        };
        ChannelOptions {
            image: union(|r| r.signal_metadata.img_channels.as_ref()),
            spectra_x: union(|r| r.signal_metadata.spectra_x_channels.as_ref()),
            spectra_y: union(|r| r.signal_metadata.spectra_y_channels.as_ref()),
        }
    }
}

// ---------------------------------------------------------------------------
// Channel options exposed to the UI
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Serialize)]
pub struct ChannelOption {
    pub label: String,
    pub value: String,
}

impl ChannelOption {
    fn new(name: &String) -> Self {
        Self {
            label: name.clone(),
            value: name.clone(),
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct ChannelOptions {
    pub image: Vec<ChannelOption>,
    pub spectra_x: Vec<ChannelOption>,
    pub spectra_y: Vec<ChannelOption>,
}
