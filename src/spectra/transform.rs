use serde::{Deserialize, Serialize};

/// Signal transform applied to every point trace before averaging.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TransformMode {
    #[default]
    Raw,
    Integrate,
    Derivative,
    DoubleDerivative,
}

impl TransformMode {
    pub const ALL: [TransformMode; 4] = [
        TransformMode::Raw,
        TransformMode::Integrate,
        TransformMode::Derivative,
        TransformMode::DoubleDerivative,
    ];

    pub fn label(&self) -> &'static str {
        match self {
            TransformMode::Raw => "Raw",
            TransformMode::Integrate => "Integral",
            TransformMode::Derivative => "dY/dX",
            TransformMode::DoubleDerivative => "d²Y/dX²",
        }
    }

    pub fn apply(&self, x: &[f64], y: &[f64]) -> Vec<f64> {
        match self {
            TransformMode::Raw => y.to_vec(),
            TransformMode::Integrate => cumulative_trapezoid(x, y),
            TransformMode::Derivative => gradient(x, y),
            TransformMode::DoubleDerivative => gradient(x, &gradient(x, y)),
        }
    }
}

/// Running trapezoidal integral, starting at zero; same length as `y`.
pub fn cumulative_trapezoid(x: &[f64], y: &[f64]) -> Vec<f64> {
    let mut out = Vec::with_capacity(y.len());
    let mut acc = 0.0;
    for i in 0..y.len().min(x.len()) {
        if i > 0 {
            acc += 0.5 * (y[i] + y[i - 1]) * (x[i] - x[i - 1]);
        }
        out.push(acc);
    }
    out
}

/// First derivative `dy/dx`: central differences inside, one-sided at the ends.
/// Shorter than two samples yields zeros.
pub fn gradient(x: &[f64], y: &[f64]) -> Vec<f64> {
    let n = y.len().min(x.len());
    if n < 2 {
        return vec![0.0; n];
    }
    (0..n)
        .map(|i| {
            let (lo, hi) = match i {
                0 => (0, 1),
                i if i == n - 1 => (n - 2, n - 1),
                i => (i - 1, i + 1),
            };
            (y[hi] - y[lo]) / (x[hi] - x[lo])
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn close(a: &[f64], b: &[f64]) -> bool {
        a.len() == b.len() && a.iter().zip(b).all(|(p, q)| (p - q).abs() < 1e-9)
    }

    #[test]
    fn raw_is_identity() {
        let y = [3.0, 1.0, 4.0];
        assert_eq!(TransformMode::Raw.apply(&[0.0, 1.0, 2.0], &y), y.to_vec());
    }

    #[test]
    fn derivative_of_quadratic() {
        let x: Vec<f64> = (0..6).map(|i| i as f64 * 0.5).collect();
        let y: Vec<f64> = x.iter().map(|v| v * v).collect();
        let d = gradient(&x, &y);
        // central differences are exact for a parabola
        assert!(close(&d[1..5], &[1.0, 2.0, 3.0, 4.0]));
        assert!((d[0] - 0.5).abs() < 1e-12);
    }

    #[test]
    fn integral_of_constant_is_linear() {
        let x = [0.0, 1.0, 3.0];
        assert!(close(&cumulative_trapezoid(&x, &[2.0, 2.0, 2.0]), &[0.0, 2.0, 6.0]));
    }

    #[test]
    fn derivative_undoes_integral_inside_boundaries() {
        let x: Vec<f64> = (0..8).map(|i| -1.0 + i as f64 * 0.25).collect();
        let y: Vec<f64> = x.iter().map(|v| 3.0 * v + 1.0).collect();
        let back = gradient(&x, &cumulative_trapezoid(&x, &y));
        assert!(close(&back[1..7], &y[1..7]));
    }

    #[test]
    fn double_derivative_is_gradient_of_gradient() {
        let x = [0.0, 1.0, 2.0, 3.0, 4.0];
        let y = [0.0, 1.0, 8.0, 27.0, 64.0];
        assert_eq!(
            TransformMode::DoubleDerivative.apply(&x, &y),
            gradient(&x, &gradient(&x, &y))
        );
    }

    #[test]
    fn degenerate_lengths() {
        assert_eq!(gradient(&[1.0], &[5.0]), vec![0.0]);
        assert!(cumulative_trapezoid(&[], &[]).is_empty());
    }
}
