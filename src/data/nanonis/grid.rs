use std::collections::BTreeMap;

use anyhow::{bail, Context, Result};

use super::{basename, linspace, parse_f64, parse_usize, read_be_f32, split_header, split_list, unquote};
use crate::data::model::{FieldValue, SpectraMatrix};
use crate::data::schema::RawRecord;

const HEADER_END: &str = ":HEADER_END:";
/// Largest grid an incomplete file may be padded up to.
const MAX_GRID_VALUES: usize = 1 << 27;

/// Parsed `.3ds` header fields.
#[derive(Debug)]
struct GridHeader {
    dim_px: [usize; 2],
    size_xy: [f64; 2],
    sweep_signal: String,
    fixed_parameters: Vec<String>,
    experimental_parameters: Vec<String>,
    num_parameters: usize,
    num_sweep: usize,
    channels: Vec<String>,
    start_time: Option<String>,
    end_time: Option<String>,
    comment: Option<String>,
}

impl GridHeader {
    fn parse(text: &str) -> Result<Self> {
        let entries: BTreeMap<&str, &str> = text
            .lines()
            .filter_map(|line| line.trim_end_matches('\r').split_once('='))
            .collect();
        let get = |key: &str| {
            entries
                .get(key)
                .copied()
                .with_context(|| format!("header key '{key}' missing"))
        };
        let optional = |key: &str| {
            entries
                .get(key)
                .map(|v| unquote(v).to_string())
                .filter(|v| !v.is_empty())
        };

        let dims: Vec<usize> = unquote(get("Grid dim")?)
            .split('x')
            .map(|d| parse_usize(d, "Grid dim"))
            .collect::<Result<_>>()?;
        let [nx, ny] = dims.as_slice() else {
            bail!("Grid dim must have two entries, got {}", dims.len());
        };

        // x_center;y_center;width;height;angle
        let settings: Vec<f64> = unquote(get("Grid settings")?)
            .split(';')
            .map(|v| parse_f64(v, "Grid settings"))
            .collect::<Result<_>>()?;
        if settings.len() < 4 {
            bail!("Grid settings has {} entries, expected 5", settings.len());
        }

        let fixed_parameters = split_list(get("Fixed parameters")?);
        let experimental_parameters = split_list(get("Experiment parameters")?);
        let num_parameters = parse_usize(get("# Parameters (4 byte)")?, "# Parameters")?;
        if num_parameters != fixed_parameters.len() + experimental_parameters.len() {
            bail!(
                "{num_parameters} parameters declared but {} named",
                fixed_parameters.len() + experimental_parameters.len()
            );
        }

        Ok(GridHeader {
            dim_px: [*nx, *ny],
            size_xy: [settings[2], settings[3]],
            sweep_signal: unquote(get("Sweep Signal")?).to_string(),
            fixed_parameters,
            experimental_parameters,
            num_parameters,
            num_sweep: parse_usize(get("Points")?, "Points")?,
            channels: split_list(get("Channels")?),
            start_time: optional("Start time"),
            end_time: optional("End time"),
            comment: optional("Comment"),
        })
    }

    fn parameter_names(&self) -> impl Iterator<Item = &String> {
        self.fixed_parameters
            .iter()
            .chain(&self.experimental_parameters)
    }

    fn parameter_index(&self, name: &str) -> Option<usize> {
        self.parameter_names().position(|p| p == name)
    }
}

/// Adapt a Nanonis grid spectroscopy (`.3ds`) file.
pub fn adapt(filename: &str, bytes: &[u8]) -> Result<RawRecord> {
    let (text, offset) = split_header(bytes, HEADER_END)?;
    let header = GridHeader::parse(&text).context("parsing .3ds header")?;

    // Binary block starts after the terminator's line break.
    let data_start = bytes[offset..]
        .iter()
        .position(|&b| b == b'\n')
        .map_or(offset, |p| offset + p + 1);

    let [nx, ny] = header.dim_px;
    let n_sweep = header.num_sweep;
    let sizes = nx.checked_mul(ny).and_then(|n_pixels| {
        let per_pixel = header
            .channels
            .len()
            .checked_mul(n_sweep)?
            .checked_add(header.num_parameters)?;
        Some((n_pixels, per_pixel, n_pixels.checked_mul(per_pixel)?))
    });
    let Some((n_pixels, per_pixel, expected)) = sizes else {
        bail!("grid of {nx}×{ny} pixels with {n_sweep} sweep points is too large");
    };

    let mut data = read_be_f32(&bytes[data_start..]);
    if data.len() < expected {
        if data.len() < per_pixel || expected > MAX_GRID_VALUES {
            bail!(
                "{} values found, header describes {n_pixels} pixels of {per_pixel}",
                data.len()
            );
        }
        // Aborted grids stop early; the remaining pixels were never measured.
        log::warn!(
            "{filename}: grid incomplete ({} of {expected} values), padding with NaN",
            data.len()
        );
        data.resize(expected, f64::NAN);
    } else if data.len() > expected {
        bail!("{} values found, header describes {expected}", data.len());
    }

    let pixels: Vec<&[f64]> = data.chunks_exact(per_pixel.max(1)).collect();

    let x_idx = header
        .parameter_index("X (m)")
        .context("no 'X (m)' experiment parameter")?;
    let y_idx = header
        .parameter_index("Y (m)")
        .context("no 'Y (m)' experiment parameter")?;
    let pos_xy: Vec<[f64; 2]> = pixels
        .iter()
        .map(|px| [px[x_idx], px[y_idx]])
        .collect();

    // Sweep limits are the first two fixed parameters of the first pixel.
    let (sweep_start, sweep_end) = match pixels.first() {
        Some(px) if header.num_parameters >= 2 => (px[0], px[1]),
        _ => bail!("grid has no sweep start/end parameters"),
    };
    let sweep = linspace(sweep_start, sweep_end, n_sweep);

    let mut spectra_y = BTreeMap::new();
    for (c, channel) in header.channels.iter().enumerate() {
        let start = header.num_parameters + c * n_sweep;
        let values: Vec<f64> = pixels
            .iter()
            .flat_map(|px| px[start..start + n_sweep].iter().copied())
            .collect();
        let matrix = SpectraMatrix::new(n_pixels, n_sweep, values)
            .context("spectra array does not match grid shape")?;
        spectra_y.insert(channel.clone(), matrix);
    }

    let mut img_channels = Vec::new();
    let mut img: BTreeMap<String, Vec<f64>> = BTreeMap::new();
    if let Some(z_idx) = header.parameter_index("Z (m)") {
        img_channels.push("topo".to_string());
        img.insert("topo".to_string(), pixels.iter().map(|px| px[z_idx]).collect());
    }
    for (i, name) in header.parameter_names().enumerate() {
        img_channels.push(name.clone());
        img.insert(name.clone(), pixels.iter().map(|px| px[i]).collect());
    }

    let mut raw = RawRecord::new();
    let mut put = |key: &str, value: FieldValue| {
        raw.insert(key.to_string(), value);
    };
    put("data_type", FieldValue::Text("spectra".into()));
    put("experiment_name", FieldValue::Text(basename(filename).to_string()));
    put("filetype", FieldValue::Text("3ds".into()));
    put("time_start", header.start_time.clone().map_or(FieldValue::Null, FieldValue::Text));
    put("time_end", header.end_time.clone().map_or(FieldValue::Null, FieldValue::Text));
    put("comment", header.comment.clone().map_or(FieldValue::Null, FieldValue::Text));
    put("pos_xy", FieldValue::Points(pos_xy));
    put("size_xy", FieldValue::Pair(header.size_xy));
    put("image_points_res", FieldValue::Dims(header.dim_px));
    put("spectra_res", FieldValue::Integer(n_sweep as i64));
    put("spectra_x_channels", FieldValue::Names(vec![header.sweep_signal.clone()]));
    put("spectra_y_channels", FieldValue::Names(header.channels.clone()));
    put("img_channels", FieldValue::Names(img_channels));
    put(
        "spectra_x",
        FieldValue::Series(BTreeMap::from([(header.sweep_signal.clone(), sweep)])),
    );
    put("spectra_y", FieldValue::Matrices(spectra_y));
    put("img", FieldValue::Series(img));
    Ok(raw)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::data::nanonis::fixtures;
    use crate::data::schema::normalize;

    #[test]
    fn grid_is_reshaped_per_point() {
        let raw = adapt("/data/grid_001.3ds", &fixtures::grid_3ds(3, 2, 4)).unwrap();
        let rec = normalize(raw).unwrap();

        assert_eq!(rec.name(), "grid_001.3ds");
        assert_eq!(rec.signal_metadata.image_points_res, Some([3, 2]));
        assert_eq!(rec.signal_metadata.spectra_res, Some(4));
        assert_eq!(rec.signal_metadata.size_xy, Some([1e-8, 1e-8]));
        assert_eq!(rec.experiment_metadata.comment.as_deref(), Some("test grid"));

        let current = rec.spectra("Current (A)").unwrap();
        assert_eq!((current.rows, current.cols), (6, 4));
        assert_eq!(current.row(4), Some(&[4.0, 5.0, 6.0, 7.0][..]));
        let lix = rec.spectra("LIX (A)").unwrap();
        assert_eq!(lix.row(1), Some(&[10.0, 9.0, 8.0, 7.0][..]));

        let sweep = rec.sweep("Bias (V)").unwrap();
        assert_eq!(sweep.len(), 4);
        assert!((sweep[0] + 1.0).abs() < 1e-12 && (sweep[3] - 1.0).abs() < 1e-12);

        // pixel 4 sits at ix = 1, iy = 1
        assert_eq!(rec.positions()[4], [1.0, 1.0]);
    }

    #[test]
    fn every_parameter_becomes_an_image_layer() {
        let rec = normalize(adapt("g.3ds", &fixtures::grid_3ds(2, 2, 3)).unwrap()).unwrap();
        let channels = rec.signal_metadata.img_channels.clone().unwrap();
        assert_eq!(
            channels,
            vec!["topo", "Sweep Start", "Sweep End", "X (m)", "Y (m)", "Z (m)"]
        );
        let (topo, res) = rec.image("topo").unwrap();
        assert_eq!(res, [2, 2]);
        assert_eq!(topo, &[0.0, 0.5, 1.0, 1.5]);
    }

    #[test]
    fn truncated_grid_is_padded() {
        let mut bytes = fixtures::grid_3ds(2, 2, 3);
        let per_pixel = 5 + 2 * 3;
        bytes.truncate(bytes.len() - per_pixel * 4);
        let rec = normalize(adapt("g.3ds", &bytes).unwrap()).unwrap();
        let current = rec.spectra("Current (A)").unwrap();
        assert!(current.row(3).unwrap().iter().all(|v| v.is_nan()));
        assert_eq!(current.row(2), Some(&[2.0, 3.0, 4.0][..]));
    }

    #[test]
    fn overflowing_grid_dim_is_an_error() {
        let bytes = fixtures::replace_once(
            &fixtures::grid_3ds(2, 2, 3),
            "Grid dim=\"2 x 2\"",
            "Grid dim=\"4294967296 x 4294967296\"",
        );
        let err = adapt("g.3ds", &bytes).unwrap_err();
        assert!(err.to_string().contains("too large"));
    }

    #[test]
    fn implausible_grid_is_not_padded() {
        let bytes = fixtures::replace_once(
            &fixtures::grid_3ds(2, 2, 3),
            "Grid dim=\"2 x 2\"",
            "Grid dim=\"60000 x 60000\"",
        );
        assert!(adapt("g.3ds", &bytes).is_err());

        // not even one whole pixel to take the sweep limits from
        let mut bytes = fixtures::grid_3ds(2, 2, 3);
        bytes.truncate(bytes.len() - (4 * (5 + 2 * 3) - 3) * 4);
        assert!(adapt("g.3ds", &bytes).is_err());
    }

    #[test]
    fn missing_terminator_is_an_error() {
        assert!(adapt("g.3ds", b"Grid dim=\"2 x 2\"\r\n").is_err());
    }
}
