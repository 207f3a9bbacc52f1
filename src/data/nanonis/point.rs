use std::collections::BTreeMap;

use anyhow::{bail, Context, Result};

use super::{basename, parse_f64};
use crate::data::model::{FieldValue, SpectraMatrix};
use crate::data::schema::RawRecord;

const DATA_MARKER: &str = "[DATA]";

/// Adapt a Nanonis point spectroscopy (`.dat`) file.
///
/// Layout: `key<TAB>value<TAB>` header lines, a `[DATA]` line, then a
/// tab-separated table whose first row names the channels.
pub fn adapt(filename: &str, bytes: &[u8]) -> Result<RawRecord> {
    let text = String::from_utf8_lossy(bytes);
    let marker = text
        .find(DATA_MARKER)
        .with_context(|| format!("{DATA_MARKER} section not found"))?;

    let header: BTreeMap<&str, &str> = text[..marker]
        .lines()
        .filter_map(|line| {
            let mut cols = line.split('\t');
            let key = cols.next()?.trim();
            let value = cols.next().unwrap_or("").trim();
            (!key.is_empty()).then_some((key, value))
        })
        .collect();

    let table = text[marker + DATA_MARKER.len()..].trim_start_matches(['\r', '\n']);
    let (channels, columns) = read_table(table).context("reading [DATA] table")?;
    let Some(spectra_res) = columns.first().map(Vec::len) else {
        bail!("[DATA] table has no columns");
    };

    let pos_xy = match (header.get("X (m)"), header.get("Y (m)")) {
        (Some(x), Some(y)) => FieldValue::Points(vec![[parse_f64(x, "X (m)")?, parse_f64(y, "Y (m)")?]]),
        _ => FieldValue::Null,
    };
    let text_field = |key: &str| {
        header
            .get(key)
            .filter(|v| !v.is_empty())
            .map_or(FieldValue::Null, |v| FieldValue::Text(v.to_string()))
    };

    let spectra_x: BTreeMap<String, Vec<f64>> = channels
        .iter()
        .cloned()
        .zip(columns.iter().cloned())
        .collect();
    let spectra_y = channels
        .iter()
        .cloned()
        .zip(columns)
        .map(|(name, col)| -> Result<(String, SpectraMatrix)> {
            let matrix = SpectraMatrix::new(1, spectra_res, col)
                .with_context(|| format!("column '{name}' is ragged"))?;
            Ok((name, matrix))
        })
        .collect::<Result<BTreeMap<_, _>>>()?;

    let mut raw = RawRecord::new();
    raw.insert("data_type".into(), FieldValue::Text("spectra".into()));
    raw.insert(
        "experiment_name".into(),
        FieldValue::Text(basename(filename).to_string()),
    );
    raw.insert("filetype".into(), FieldValue::Text("dat".into()));
    raw.insert("time_start".into(), text_field("Start time"));
    raw.insert("time_end".into(), text_field("Saved Date"));
    raw.insert("comment".into(), text_field("Comment"));
    raw.insert("pos_xy".into(), pos_xy);
    raw.insert("spectra_res".into(), FieldValue::Integer(spectra_res as i64));
    raw.insert("spectra_x_channels".into(), FieldValue::Names(channels.clone()));
    raw.insert("spectra_y_channels".into(), FieldValue::Names(channels));
    raw.insert("spectra_x".into(), FieldValue::Series(spectra_x));
    raw.insert("spectra_y".into(), FieldValue::Matrices(spectra_y));
    Ok(raw)
}

/// Parse the tab-separated data table into column vectors.
/// Empty cells read as NaN.
fn read_table(table: &str) -> Result<(Vec<String>, Vec<Vec<f64>>)> {
    let mut reader = csv::ReaderBuilder::new()
        .delimiter(b'\t')
        .flexible(true)
        .trim(csv::Trim::All)
        .from_reader(table.as_bytes());

    let channels: Vec<String> = reader
        .headers()
        .context("reading channel names")?
        .iter()
        .map(str::to_string)
        .filter(|h| !h.is_empty())
        .collect();
    if channels.is_empty() {
        bail!("no channel names");
    }

    let mut columns = vec![Vec::new(); channels.len()];
    for (row_no, result) in reader.records().enumerate() {
        let record = result.with_context(|| format!("data row {row_no}"))?;
        if record.iter().all(str::is_empty) {
            continue;
        }
        for (c, column) in columns.iter_mut().enumerate() {
            let cell = record.get(c).unwrap_or("");
            let value = if cell.is_empty() {
                f64::NAN
            } else {
                cell.parse::<f64>()
                    .with_context(|| format!("row {row_no}, {}: '{cell}' is not a number", channels[c]))?
            };
            column.push(value);
        }
    }
    Ok((channels, columns))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::data::nanonis::fixtures;
    use crate::data::schema::normalize;

    #[test]
    fn every_column_is_both_axis_and_signal() {
        let rec = normalize(adapt("bias_0001.dat", &fixtures::point_dat(5)).unwrap()).unwrap();
        let md = &rec.signal_metadata;
        assert_eq!(md.spectra_res, Some(5));
        assert_eq!(
            md.spectra_x_channels.as_deref(),
            Some(&["Bias calc (V)".to_string(), "Current (A)".to_string()][..])
        );
        assert_eq!(md.spectra_x_channels, md.spectra_y_channels);
        assert_eq!(md.pos_xy, Some(vec![[1.5e-9, 2.5e-9]]));

        assert_eq!(rec.sweep("Bias calc (V)").unwrap(), &[0.0, 0.5, 1.0, 1.5, 2.0]);
        let current = rec.spectra("Current (A)").unwrap();
        assert_eq!((current.rows, current.cols), (1, 5));
        assert_eq!(current.row(0).unwrap(), &[0.0, 2.0, 4.0, 6.0, 8.0]);

        assert_eq!(rec.experiment_metadata.time_end.as_deref(), Some("02.02.2023 12:30:00"));
        assert_eq!(rec.experiment_metadata.filetype.as_deref(), Some("dat"));
        assert!(rec.signals.img.is_none());
    }

    #[test]
    fn non_numeric_cell_is_an_error() {
        let bytes = b"X (m)\t0\t\n[DATA]\nBias (V)\tCurrent (A)\n0.1\tabc\n";
        assert!(adapt("bad.dat", bytes).is_err());
    }

    #[test]
    fn missing_data_section_is_an_error() {
        assert!(adapt("empty.dat", b"Experiment\tbias\t\n").is_err());
    }
}
