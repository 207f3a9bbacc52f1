use std::collections::BTreeMap;

use eframe::egui::{Color32, ColorImage};
use palette::{Hsl, IntoColor, Srgb};

use crate::spectra::trace::{SeriesKind, Trace};

fn hsl_to_color32(hsl: Hsl) -> Color32 {
    let rgb: Srgb = hsl.into_color();
    Color32::from_rgb(
        (rgb.red.clamp(0.0, 1.0) * 255.0) as u8,
        (rgb.green.clamp(0.0, 1.0) * 255.0) as u8,
        (rgb.blue.clamp(0.0, 1.0) * 255.0) as u8,
    )
}

// ---------------------------------------------------------------------------
// Color palette generator
// ---------------------------------------------------------------------------

/// Generates `n` visually distinct colours using evenly spaced hues.
pub fn generate_palette(n: usize) -> Vec<Color32> {
    if n == 0 {
        return Vec::new();
    }
    (0..n)
        .map(|i| {
            let hue = (i as f32 / n as f32) * 360.0;
            hsl_to_color32(Hsl::new(hue, 0.75, 0.55))
        })
        .collect()
}

// ---------------------------------------------------------------------------
// Trace colours
// ---------------------------------------------------------------------------

/// Key shared by every trace of the same spectroscopy point, so a point
/// keeps its colour across channels.
fn trace_key(trace: &Trace) -> String {
    match trace.origin {
        Some(origin) => format!("{}#{}", origin.file_index, origin.point_index),
        None => format!("mean:{}", trace.channel),
    }
}

/// Maps each selected point to a distinct colour.
#[derive(Debug, Clone)]
pub struct ColorMap {
    mapping: BTreeMap<String, Color32>,
    default_color: Color32,
}

impl ColorMap {
    pub fn new(traces: &[Trace]) -> Self {
        let mut keys: Vec<String> = Vec::new();
        for key in traces
            .iter()
            .filter(|t| t.kind == SeriesKind::Point)
            .map(trace_key)
        {
            if !keys.contains(&key) {
                keys.push(key);
            }
        }
        let palette = generate_palette(keys.len());
        let mapping = keys.into_iter().zip(palette).collect();

        ColorMap {
            mapping,
            default_color: Color32::LIGHT_GRAY,
        }
    }

    /// Colour for a trace; mean overlays use the neutral default.
    pub fn color_for(&self, trace: &Trace) -> Color32 {
        self.mapping
            .get(&trace_key(trace))
            .copied()
            .unwrap_or(self.default_color)
    }
}

// ---------------------------------------------------------------------------
// Image colour map
// ---------------------------------------------------------------------------

/// Dark-brown → orange → pale-yellow ramp for topography, `t` in `[0, 1]`.
pub fn topo_color(t: f64) -> Color32 {
    let t = t.clamp(0.0, 1.0) as f32;
    hsl_to_color32(Hsl::new(10.0 + 45.0 * t, 0.85, 0.05 + 0.85 * t))
}

/// Render a flat `(nx, ny)` layer as an image. Row 0 of the layer is the
/// bottom of the picture. Non-finite pixels are transparent.
pub fn colorize(values: &[f64], [nx, ny]: [usize; 2]) -> ColorImage {
    let (lo, hi) = values
        .iter()
        .copied()
        .filter(|v| v.is_finite())
        .fold((f64::INFINITY, f64::NEG_INFINITY), |(lo, hi), v| (lo.min(v), hi.max(v)));
    let range = hi - lo;

    let mut rgba = Vec::with_capacity(nx * ny * 4);
    for row in (0..ny).rev() {
        for col in 0..nx {
            let v = values.get(row * nx + col).copied().unwrap_or(f64::NAN);
            if !v.is_finite() {
                rgba.extend_from_slice(&[0, 0, 0, 0]);
                continue;
            }
            let t = if range > 0.0 { (v - lo) / range } else { 0.5 };
            let c = topo_color(t);
            rgba.extend_from_slice(&[c.r(), c.g(), c.b(), 255]);
        }
    }
    ColorImage::from_rgba_unmultiplied([nx, ny], &rgba)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::data::selection::PointKey;

    #[test]
    fn palette_colours_are_distinct() {
        let colors = generate_palette(6);
        assert_eq!(colors.len(), 6);
        for (i, a) in colors.iter().enumerate() {
            for b in &colors[i + 1..] {
                assert_ne!(a, b);
            }
        }
        assert!(generate_palette(0).is_empty());
    }

    #[test]
    fn point_keeps_colour_across_channels() {
        let key = PointKey {
            file_index: 0,
            point_index: 2,
        };
        let other = PointKey {
            file_index: 1,
            point_index: 2,
        };
        let traces = vec![
            Trace::point(vec![0.0], vec![1.0], "a", "I", key),
            Trace::point(vec![0.0], vec![1.0], "a", "LIX", key),
            Trace::point(vec![0.0], vec![1.0], "b", "I", other),
            Trace::mean(vec![0.0], vec![1.0], "I"),
        ];
        let map = ColorMap::new(&traces);
        assert_eq!(map.color_for(&traces[0]), map.color_for(&traces[1]));
        assert_ne!(map.color_for(&traces[0]), map.color_for(&traces[2]));
        assert_eq!(map.color_for(&traces[3]), Color32::LIGHT_GRAY);
    }

    #[test]
    fn colorize_flips_rows_and_hides_nan() {
        let img = colorize(&[0.0, 1.0, 2.0, f64::NAN], [2, 2]);
        assert_eq!(img.size, [2, 2]);
        // layer row 1 (top of picture) holds the NaN in its second column
        assert_eq!(img.pixels[1].a(), 0);
        assert_eq!(img.pixels[2], topo_color(0.0));
    }
}
