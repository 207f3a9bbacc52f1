use std::collections::BTreeMap;

use anyhow::{bail, Context, Result};

use super::{basename, find, parse_f64, parse_usize, read_be_f32, split_header};
use crate::data::model::FieldValue;
use crate::data::schema::RawRecord;

const HEADER_END: &str = ":SCANIT_END:";
const DATA_TAG: [u8; 2] = [0x1A, 0x04];

/// One row of the `DATA_INFO` table.
#[derive(Debug, Clone, PartialEq)]
struct ChannelInfo {
    name: String,
    bidirectional: bool,
}

impl ChannelInfo {
    fn directions(&self) -> &'static [&'static str] {
        if self.bidirectional {
            &["forward", "backward"]
        } else {
            &["forward"]
        }
    }
}

/// `:KEY:` blocks; the value is every line up to the next key.
fn parse_blocks(text: &str) -> BTreeMap<String, String> {
    let mut blocks = BTreeMap::new();
    let mut current: Option<(String, Vec<&str>)> = None;
    for line in text.lines() {
        let trimmed = line.trim_end_matches('\r');
        let is_key = trimmed.len() > 1 && trimmed.starts_with(':') && trimmed.ends_with(':');
        if is_key {
            if let Some((key, lines)) = current.take() {
                blocks.insert(key, lines.join("\n"));
            }
            current = Some((trimmed.trim_matches(':').to_string(), Vec::new()));
        } else if let Some((_, lines)) = current.as_mut() {
            lines.push(trimmed);
        }
    }
    if let Some((key, lines)) = current {
        blocks.insert(key, lines.join("\n"));
    }
    blocks
}

fn parse_data_info(table: &str) -> Result<Vec<ChannelInfo>> {
    let mut rows = table
        .lines()
        .map(str::trim)
        .filter(|line| !line.is_empty())
        .map(|line| line.split('\t').map(str::trim).collect::<Vec<_>>());

    let header = rows.next().context("DATA_INFO is empty")?;
    let name_col = header
        .iter()
        .position(|h| *h == "Name")
        .context("DATA_INFO has no Name column")?;
    let dir_col = header
        .iter()
        .position(|h| *h == "Direction")
        .context("DATA_INFO has no Direction column")?;

    rows.map(|row| -> Result<ChannelInfo> {
        let name = row.get(name_col).context("DATA_INFO row without name")?;
        let direction = row.get(dir_col).copied().unwrap_or("forward");
        Ok(ChannelInfo {
            name: name.to_string(),
            bidirectional: direction == "both",
        })
    })
    .collect()
}

fn pair(blocks: &BTreeMap<String, String>, key: &str) -> Result<[f64; 2]> {
    let value = blocks
        .get(key)
        .with_context(|| format!("header block {key} missing"))?;
    let nums: Vec<f64> = value
        .split_whitespace()
        .map(|v| parse_f64(v, key))
        .collect::<Result<_>>()?;
    match nums.as_slice() {
        [a, b, ..] => Ok([*a, *b]),
        _ => bail!("{key} needs two values, got {}", nums.len()),
    }
}

/// Adapt a Nanonis scan (`.sxm`) file.
///
/// Nested channel/direction signals are flattened as `"Z (forward)"`.
pub fn adapt(filename: &str, bytes: &[u8]) -> Result<RawRecord> {
    let (text, offset) = split_header(bytes, HEADER_END)?;
    let blocks = parse_blocks(&text);

    let pixels: Vec<usize> = blocks
        .get("SCAN_PIXELS")
        .context("header block SCAN_PIXELS missing")?
        .split_whitespace()
        .map(|v| parse_usize(v, "SCAN_PIXELS"))
        .collect::<Result<_>>()?;
    let [nx, ny] = pixels.as_slice() else {
        bail!("SCAN_PIXELS needs two values, got {}", pixels.len());
    };
    let (nx, ny) = (*nx, *ny);

    let range = pair(&blocks, "SCAN_RANGE")?;
    let center = pair(&blocks, "SCAN_OFFSET")?;
    let channels = parse_data_info(
        blocks
            .get("DATA_INFO")
            .context("header block DATA_INFO missing")?,
    )?;

    let tag = find(&bytes[offset..], &DATA_TAG).context("binary data tag not found")?;
    let data = read_be_f32(&bytes[offset + tag + DATA_TAG.len()..]);

    let n_frames: usize = channels.iter().map(|c| c.directions().len()).sum();
    let Some((frame, expected)) = nx
        .checked_mul(ny)
        .and_then(|frame| Some((frame, frame.checked_mul(n_frames)?)))
    else {
        bail!("scan of {nx}×{ny} pixels is too large");
    };
    if data.len() != expected {
        bail!(
            "scan data holds {} values, {n_frames} channels of {nx}×{ny} need {expected}",
            data.len()
        );
    }

    let mut img_channels = Vec::with_capacity(n_frames);
    let mut img = BTreeMap::new();
    let mut frames = data.chunks_exact(frame.max(1));
    for channel in &channels {
        for direction in channel.directions() {
            let values = frames.next().context("scan data ended early")?;
            let key = format!("{} ({direction})", channel.name);
            img_channels.push(key.clone());
            img.insert(key, values.to_vec());
        }
    }

    let non_empty = |key: &str| {
        blocks
            .get(key)
            .map(|v| v.trim())
            .filter(|v| !v.is_empty())
    };
    let time_start = match (non_empty("REC_DATE"), non_empty("REC_TIME")) {
        (Some(date), Some(time)) => FieldValue::Text(format!("{date} {time}")),
        (Some(date), None) => FieldValue::Text(date.to_string()),
        _ => FieldValue::Null,
    };

    // SCAN_OFFSET is the frame centre; the canonical origin is its lower-left corner.
    let origin = [center[0] - range[0] / 2.0, center[1] - range[1] / 2.0];

    let mut raw = RawRecord::new();
    raw.insert("data_type".into(), FieldValue::Text("image".into()));
    raw.insert(
        "experiment_name".into(),
        FieldValue::Text(basename(filename).to_string()),
    );
    raw.insert("filetype".into(), FieldValue::Text("sxm".into()));
    raw.insert("time_start".into(), time_start);
    raw.insert(
        "comment".into(),
        non_empty("COMMENT").map_or(FieldValue::Null, |c| FieldValue::Text(c.to_string())),
    );
    raw.insert("pos_xy".into(), FieldValue::Points(vec![origin]));
    raw.insert("size_xy".into(), FieldValue::Pair(range));
    raw.insert("image_points_res".into(), FieldValue::Dims([nx, ny]));
    raw.insert("img_channels".into(), FieldValue::Names(img_channels));
    raw.insert("img".into(), FieldValue::Series(img));
    Ok(raw)
}
