use std::path::Path;

use super::model::CanonicalRecord;
use super::nanonis::{grid, point, scan};
use super::schema::{normalize, RawRecord};
use super::store::DataStore;
use crate::error::{SpmError, SpmResult};

// ---------------------------------------------------------------------------
// Format dispatch
// ---------------------------------------------------------------------------

/// Instrument formats understood by the loader, selected by file extension.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Format {
    /// `.3ds` grid spectroscopy
    Grid,
    /// `.dat` point spectroscopy
    Point,
    /// `.sxm` topography scan
    Scan,
}

impl Format {
    pub const EXTENSIONS: [&'static str; 3] = ["3ds", "dat", "sxm"];

    /// Pick the adapter for `filename`. Extensions are case-insensitive.
    pub fn from_filename(filename: &str) -> SpmResult<Self> {
        let ext = Path::new(filename)
            .extension()
            .and_then(|e| e.to_str())
            .unwrap_or("")
            .to_ascii_lowercase();

        match ext.as_str() {
            "3ds" => Ok(Format::Grid),
            "dat" => Ok(Format::Point),
            "sxm" => Ok(Format::Scan),
            _ => Err(SpmError::UnsupportedFormat(ext)),
        }
    }

    fn adapter(self) -> fn(&str, &[u8]) -> anyhow::Result<RawRecord> {
        match self {
            Format::Grid => grid::adapt,
            Format::Point => point::adapt,
            Format::Scan => scan::adapt,
        }
    }
}

/// Run the format adapter for `filename` over its raw bytes.
pub fn adapt(filename: &str, bytes: &[u8]) -> SpmResult<RawRecord> {
    let format = Format::from_filename(filename)?;
    format.adapter()(filename, bytes).map_err(|e| SpmError::Malformed {
        file: filename.to_string(),
        reason: format!("{e:#}"),
    })
}

/// Adapt and normalize one uploaded file.
pub fn load_bytes(filename: &str, bytes: &[u8]) -> SpmResult<CanonicalRecord> {
    normalize(adapt(filename, bytes)?)
}

// ---------------------------------------------------------------------------
// Batch ingestion
// ---------------------------------------------------------------------------

/// One file handed over by the upload boundary.
#[derive(Debug, Clone)]
pub struct Upload {
    pub filename: String,
    pub bytes: Vec<u8>,
}

impl Upload {
    pub fn new(filename: impl Into<String>, bytes: Vec<u8>) -> Self {
        Self {
            filename: filename.into(),
            bytes,
        }
    }

    pub fn from_path(path: &Path) -> SpmResult<Self> {
        Ok(Self::new(path.to_string_lossy(), std::fs::read(path)?))
    }
}

/// Outcome of a batch: the grown store plus every file that was rejected.
#[derive(Debug)]
pub struct Ingest {
    pub store: DataStore,
    pub failures: Vec<(String, SpmError)>,
}

/// Append every loadable upload to `store`, in order.
/// A failing file is reported and skipped; the rest of the batch continues.
pub fn ingest(store: &DataStore, uploads: &[Upload]) -> Ingest {
    let mut store = store.clone();
    let mut failures = Vec::new();

    for upload in uploads {
        match load_bytes(&upload.filename, &upload.bytes) {
            Ok(record) => {
                let md = &record.signal_metadata;
                log::info!(
                    "Loaded {} as file #{} ({} points, {} x / {} y / {} image channels)",
                    record.name(),
                    store.len(),
                    record.positions().len(),
                    md.spectra_x_channels.as_ref().map_or(0, Vec::len),
                    md.spectra_y_channels.as_ref().map_or(0, Vec::len),
                    md.img_channels.as_ref().map_or(0, Vec::len),
                );
                store = store.append(record);
            }
            Err(e) => {
                log::error!("Failed to load {}: {e}", upload.filename);
                failures.push((upload.filename.clone(), e));
            }
        }
    }

    Ingest { store, failures }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::data::nanonis::fixtures;
    use crate::data::schema::VOCABULARY;

    #[test]
    fn extension_selects_adapter() {
        assert_eq!(Format::from_filename("a/b/grid.3DS").unwrap(), Format::Grid);
        assert_eq!(Format::from_filename("sts.dat").unwrap(), Format::Point);
        assert_eq!(Format::from_filename("scan.sxm").unwrap(), Format::Scan);
        match Format::from_filename("notes.xyz") {
            Err(SpmError::UnsupportedFormat(ext)) => assert_eq!(ext, "xyz"),
            other => panic!("expected UnsupportedFormat, got {other:?}"),
        }
        assert!(matches!(
            Format::from_filename("README"),
            Err(SpmError::UnsupportedFormat(ext)) if ext.is_empty()
        ));
    }

    #[test]
    fn every_format_normalizes_with_full_vocabulary() {
        let files = [
            ("grid.3ds", fixtures::grid_3ds(2, 2, 4)),
            ("point.dat", fixtures::point_dat(4)),
            ("scan.sxm", fixtures::scan_sxm(3, 3)),
        ];
        for (name, bytes) in files {
            let record = load_bytes(name, &bytes).unwrap();
            for (key, _) in VOCABULARY {
                assert!(record.field(key).is_some(), "{name}: {key}");
            }
            assert_eq!(record.name(), name);
        }
    }

    #[test]
    fn unsupported_upload_leaves_store_unchanged() {
        let result = ingest(&DataStore::create_empty(), &[Upload::new("data.xyz", vec![1, 2, 3])]);
        assert!(result.store.is_empty());
        assert_eq!(result.failures.len(), 1);
        assert!(matches!(&result.failures[0].1, SpmError::UnsupportedFormat(ext) if ext == "xyz"));
    }

    #[test]
    fn bad_file_does_not_abort_batch() {
        let uploads = [
            Upload::new("grid.3ds", fixtures::grid_3ds(2, 1, 3)),
            Upload::new("broken.sxm", b":SCAN_PIXELS:\n2 2\n".to_vec()),
            Upload::new("point.dat", fixtures::point_dat(3)),
        ];
        let result = ingest(&DataStore::create_empty(), &uploads);
        assert_eq!(result.store.len(), 2);
        assert_eq!(result.store.get(1).unwrap().name(), "point.dat");
        assert_eq!(result.failures.len(), 1);
        assert!(matches!(&result.failures[0].1, SpmError::Malformed { file, .. } if file == "broken.sxm"));
    }

    #[test]
    fn oversized_grid_header_fails_only_that_file() {
        let huge = fixtures::replace_once(
            &fixtures::grid_3ds(2, 2, 3),
            "Grid dim=\"2 x 2\"",
            "Grid dim=\"4294967296 x 4294967296\"",
        );
        let store = DataStore::create_empty().append(load_bytes("a.dat", &fixtures::point_dat(3)).unwrap());
        let uploads = [
            Upload::new("huge.3ds", huge),
            Upload::new("b.dat", fixtures::point_dat(3)),
        ];
        let result = ingest(&store, &uploads);
        assert_eq!(result.store.len(), 2);
        assert_eq!(result.store.get(1).unwrap().name(), "b.dat");
        assert_eq!(result.failures.len(), 1);
        assert!(matches!(&result.failures[0].1, SpmError::Malformed { file, .. } if file == "huge.3ds"));
        assert_eq!(store.len(), 1);
    }
}
