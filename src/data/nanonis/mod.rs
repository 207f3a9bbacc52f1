//! Nanonis instrument formats.
//!
//! | extension | adapter        | content                                   |
//! |-----------|----------------|-------------------------------------------|
//! | `.3ds`    | [`grid`]       | spectroscopy on a 2-D grid of points      |
//! | `.dat`    | [`point`]      | spectroscopy at a single location         |
//! | `.sxm`    | [`scan`]       | topography / image scan, no sweep axis    |
//!
//! Every adapter returns a flat [`RawRecord`](crate::data::schema::RawRecord)
//! that only uses canonical vocabulary keys.

pub mod grid;
pub mod point;
pub mod scan;

use anyhow::{Context, Result};
use byteorder::{BigEndian, ByteOrder};

/// Split `bytes` at the first occurrence of `marker`.
/// Returns the text before the marker and the byte offset just past it.
fn split_header(bytes: &[u8], marker: &str) -> Result<(String, usize)> {
    let pos = find(bytes, marker.as_bytes())
        .with_context(|| format!("header terminator {marker} not found"))?;
    let header = String::from_utf8_lossy(&bytes[..pos]).into_owned();
    Ok((header, pos + marker.len()))
}

fn find(haystack: &[u8], needle: &[u8]) -> Option<usize> {
    haystack
        .windows(needle.len())
        .position(|window| window == needle)
}

/// Decode consecutive big-endian `f32` values. A trailing partial word is ignored.
fn read_be_f32(bytes: &[u8]) -> Vec<f64> {
    bytes
        .chunks_exact(4)
        .map(|chunk| BigEndian::read_f32(chunk) as f64)
        .collect()
}

fn unquote(s: &str) -> &str {
    s.trim().trim_matches('"')
}

/// Split a `;`-separated header list, dropping empty entries.
fn split_list(s: &str) -> Vec<String> {
    unquote(s)
        .split(';')
        .map(str::trim)
        .filter(|item| !item.is_empty())
        .map(str::to_string)
        .collect()
}

fn parse_f64(s: &str, what: &str) -> Result<f64> {
    unquote(s)
        .parse::<f64>()
        .with_context(|| format!("{what}: '{s}' is not a number"))
}

fn parse_usize(s: &str, what: &str) -> Result<usize> {
    unquote(s)
        .parse::<usize>()
        .with_context(|| format!("{what}: '{s}' is not a count"))
}

/// Final path component, used as the experiment name.
pub fn basename(filename: &str) -> &str {
    filename
        .rsplit(['/', '\\'])
        .next()
        .unwrap_or(filename)
}

/// Evenly spaced values from `start` to `end` inclusive.
fn linspace(start: f64, end: f64, n: usize) -> Vec<f64> {
    match n {
        0 => Vec::new(),
        1 => vec![start],
        _ => {
            let step = (end - start) / (n - 1) as f64;
            (0..n).map(|i| start + step * i as f64).collect()
        }
    }
}

// ---------------------------------------------------------------------------
// Synthetic files for tests
// ---------------------------------------------------------------------------
