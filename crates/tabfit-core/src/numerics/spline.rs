//! Cubic-spline primitives for tabulated potential columns.
//!
//! A column stores sampled values on either a uniform or an explicit knot
//! grid together with a cached second-derivative (curvature) table. The
//! curvature table must be rebuilt whenever the sampled values change;
//! evaluation then only needs the precomputed interval/offset coordinates
//! carried by a [`SplineSlot`].

use serde::{Deserialize, Serialize};

/// Boundary-slope sentinel selecting a natural (zero-curvature) end.
pub const NATURAL_BOUNDARY: f64 = 1.0e30;

const NATURAL_THRESHOLD: f64 = 0.99e30;

#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum SplineError {
    #[error("spline needs at least 2 knots, got {actual}")]
    TooFewKnots { actual: usize },
    #[error("spline knot spacing must be finite and > 0, got {step}")]
    InvalidStep { step: f64 },
    #[error("spline value/coordinate length mismatch: values={values}, coords={coords}")]
    LengthMismatch { values: usize, coords: usize },
    #[error(
        "spline knot coordinates must be strictly increasing, index {index} has {current} after {previous}"
    )]
    NonIncreasingKnots {
        index: usize,
        previous: f64,
        current: f64,
    },
}

/// Precomputed lookup coordinates for one query point: the knot interval it
/// falls in, the fractional offset within that interval, and the interval
/// width.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct SplineSlot {
    pub interval: usize,
    pub fraction: f64,
    pub width: f64,
}

impl SplineSlot {
    /// Locate `x` on a uniform grid starting at `start` with spacing `step`.
    pub fn locate_uniform(start: f64, step: f64, knot_count: usize, x: f64) -> Option<Self> {
        if !(step.is_finite() && step > 0.0) || knot_count < 2 {
            return None;
        }
        let position = (x - start) / step;
        if position < 0.0 {
            return None;
        }
        let interval = (position.floor() as usize).min(knot_count - 2);
        Some(Self {
            interval,
            fraction: position - interval as f64,
            width: step,
        })
    }

    /// Locate `x` on an explicit, strictly increasing coordinate grid.
    pub fn locate_explicit(coords: &[f64], x: f64) -> Option<Self> {
        if coords.len() < 2 || x < coords[0] || x > coords[coords.len() - 1] {
            return None;
        }
        let interval = match coords.iter().position(|&knot| x < knot) {
            Some(upper) => upper - 1,
            None => coords.len() - 2,
        };
        let width = coords[interval + 1] - coords[interval];
        Some(Self {
            interval,
            fraction: (x - coords[interval]) / width,
            width,
        })
    }
}

/// Curvature table for values sampled on a uniform grid.
///
/// Boundary slopes at or above the [`NATURAL_BOUNDARY`] sentinel select a
/// natural end; finite slopes clamp the first derivative there.
pub fn second_derivatives_uniform(
    step: f64,
    values: &[f64],
    left_slope: f64,
    right_slope: f64,
) -> Result<Vec<f64>, SplineError> {
    let n = values.len();
    if n < 2 {
        return Err(SplineError::TooFewKnots { actual: n });
    }
    if !(step.is_finite() && step > 0.0) {
        return Err(SplineError::InvalidStep { step });
    }

    let mut curvature = vec![0.0; n];
    let mut scratch = vec![0.0; n];

    if left_slope < NATURAL_THRESHOLD {
        curvature[0] = -0.5;
        scratch[0] = (3.0 / step) * ((values[1] - values[0]) / step - left_slope);
    }
    for i in 1..n - 1 {
        let sig = 0.5;
        let p = sig * curvature[i - 1] + 2.0;
        curvature[i] = (sig - 1.0) / p;
        let second_diff = (values[i + 1] - 2.0 * values[i] + values[i - 1]) / step;
        scratch[i] = (3.0 * second_diff / step - sig * scratch[i - 1]) / p;
    }

    let (qn, un) = if right_slope < NATURAL_THRESHOLD {
        (
            0.5,
            (3.0 / step) * (right_slope - (values[n - 1] - values[n - 2]) / step),
        )
    } else {
        (0.0, 0.0)
    };
    curvature[n - 1] = (un - qn * scratch[n - 2]) / (qn * curvature[n - 2] + 1.0);
    for k in (0..n - 1).rev() {
        curvature[k] = curvature[k] * curvature[k + 1] + scratch[k];
    }

    Ok(curvature)
}

/// Curvature table for values sampled on an explicit coordinate grid.
pub fn second_derivatives_explicit(
    coords: &[f64],
    values: &[f64],
    left_slope: f64,
    right_slope: f64,
) -> Result<Vec<f64>, SplineError> {
    let n = values.len();
    if n < 2 {
        return Err(SplineError::TooFewKnots { actual: n });
    }
    if coords.len() != n {
        return Err(SplineError::LengthMismatch {
            values: n,
            coords: coords.len(),
        });
    }
    for i in 1..n {
        if coords[i] <= coords[i - 1] {
            return Err(SplineError::NonIncreasingKnots {
                index: i,
                previous: coords[i - 1],
                current: coords[i],
            });
        }
    }

    let mut curvature = vec![0.0; n];
    let mut scratch = vec![0.0; n];

    if left_slope < NATURAL_THRESHOLD {
        let h0 = coords[1] - coords[0];
        curvature[0] = -0.5;
        scratch[0] = (3.0 / h0) * ((values[1] - values[0]) / h0 - left_slope);
    }
    for i in 1..n - 1 {
        let sig = (coords[i] - coords[i - 1]) / (coords[i + 1] - coords[i - 1]);
        let p = sig * curvature[i - 1] + 2.0;
        curvature[i] = (sig - 1.0) / p;
        let slope_diff = (values[i + 1] - values[i]) / (coords[i + 1] - coords[i])
            - (values[i] - values[i - 1]) / (coords[i] - coords[i - 1]);
        scratch[i] = (6.0 * slope_diff / (coords[i + 1] - coords[i - 1]) - sig * scratch[i - 1]) / p;
    }

    let (qn, un) = if right_slope < NATURAL_THRESHOLD {
        let hn = coords[n - 1] - coords[n - 2];
        (
            0.5,
            (3.0 / hn) * (right_slope - (values[n - 1] - values[n - 2]) / hn),
        )
    } else {
        (0.0, 0.0)
    };
    curvature[n - 1] = (un - qn * scratch[n - 2]) / (qn * curvature[n - 2] + 1.0);
    for k in (0..n - 1).rev() {
        curvature[k] = curvature[k] * curvature[k + 1] + scratch[k];
    }

    Ok(curvature)
}

/// Interpolated value at a precomputed slot.
#[inline]
pub fn evaluate(values: &[f64], curvature: &[f64], slot: SplineSlot) -> f64 {
    let a = 1.0 - slot.fraction;
    let b = slot.fraction;
    let k = slot.interval;
    a * values[k]
        + b * values[k + 1]
        + ((a * a * a - a) * curvature[k] + (b * b * b - b) * curvature[k + 1]) * slot.width
            * slot.width
            / 6.0
}

/// Interpolated value and first derivative at a precomputed slot.
#[inline]
pub fn evaluate_with_gradient(values: &[f64], curvature: &[f64], slot: SplineSlot) -> (f64, f64) {
    let a = 1.0 - slot.fraction;
    let b = slot.fraction;
    let k = slot.interval;
    let value = a * values[k]
        + b * values[k + 1]
        + ((a * a * a - a) * curvature[k] + (b * b * b - b) * curvature[k + 1]) * slot.width
            * slot.width
            / 6.0;
    let gradient = (values[k + 1] - values[k]) / slot.width
        + ((3.0 * b * b - 1.0) * curvature[k + 1] - (3.0 * a * a - 1.0) * curvature[k]) * slot.width
            / 6.0;
    (value, gradient)
}

#[cfg(test)]
mod tests {
    use super::{
        NATURAL_BOUNDARY, SplineError, SplineSlot, evaluate, evaluate_with_gradient,
        second_derivatives_explicit, second_derivatives_uniform,
    };

    fn sample_uniform(start: f64, step: f64, count: usize, f: impl Fn(f64) -> f64) -> Vec<f64> {
        (0..count).map(|i| f(start + step * i as f64)).collect()
    }

    #[test]
    fn uniform_spline_reproduces_cubic_with_clamped_ends() {
        // y = x^3 - 2x with exact end slopes; a cubic spline with clamped
        // boundaries interpolates a cubic closely on a fine grid.
        let start = 0.0;
        let step = 0.05;
        let count = 81;
        let f = |x: f64| x * x * x - 2.0 * x;
        let df = |x: f64| 3.0 * x * x - 2.0;
        let values = sample_uniform(start, step, count, f);
        let end = start + step * (count - 1) as f64;
        let curvature =
            second_derivatives_uniform(step, &values, df(start), df(end)).expect("curvature");

        for &x in &[0.111, 0.987, 1.5, 2.6, 3.33] {
            let slot = SplineSlot::locate_uniform(start, step, count, x).expect("slot");
            let (value, gradient) = evaluate_with_gradient(&values, &curvature, slot);
            assert!(
                (value - f(x)).abs() < 5.0e-6,
                "value at {x}: {value} vs {}",
                f(x)
            );
            assert!(
                (gradient - df(x)).abs() < 5.0e-4,
                "gradient at {x}: {gradient} vs {}",
                df(x)
            );
        }
    }

    #[test]
    fn natural_boundary_sentinel_zeroes_end_curvature() {
        let values = sample_uniform(0.0, 0.1, 21, |x| x * x);
        let curvature =
            second_derivatives_uniform(0.1, &values, NATURAL_BOUNDARY, NATURAL_BOUNDARY)
                .expect("curvature");
        assert_eq!(curvature[0], 0.0);
        assert_eq!(curvature[20], 0.0);
    }

    #[test]
    fn explicit_grid_matches_uniform_grid_on_same_knots() {
        let start = 1.0;
        let step = 0.2;
        let count = 16;
        let values = sample_uniform(start, step, count, |x| (0.7 * x).sin());
        let coords: Vec<f64> = (0..count).map(|i| start + step * i as f64).collect();

        let uniform = second_derivatives_uniform(step, &values, 0.7, -0.1).expect("uniform");
        let explicit = second_derivatives_explicit(&coords, &values, 0.7, -0.1).expect("explicit");
        for (u, e) in uniform.iter().zip(&explicit) {
            assert!((u - e).abs() < 1.0e-10, "{u} vs {e}");
        }

        let slot_u = SplineSlot::locate_uniform(start, step, count, 2.37).expect("slot");
        let slot_e = SplineSlot::locate_explicit(&coords, 2.37).expect("slot");
        assert!((evaluate(&values, &uniform, slot_u) - evaluate(&values, &explicit, slot_e)).abs() < 1.0e-10);
    }

    #[test]
    fn value_only_evaluation_matches_gradient_variant() {
        let values = sample_uniform(0.0, 0.25, 9, |x| 1.0 / (1.0 + x));
        let curvature =
            second_derivatives_uniform(0.25, &values, NATURAL_BOUNDARY, 0.0).expect("curvature");
        let slot = SplineSlot::locate_uniform(0.0, 0.25, 9, 1.4).expect("slot");
        let (with_gradient, _) = evaluate_with_gradient(&values, &curvature, slot);
        assert_eq!(evaluate(&values, &curvature, slot), with_gradient);
    }

    #[test]
    fn curvature_rejects_degenerate_input() {
        assert_eq!(
            second_derivatives_uniform(0.1, &[1.0], 0.0, 0.0),
            Err(SplineError::TooFewKnots { actual: 1 })
        );
        assert_eq!(
            second_derivatives_uniform(0.0, &[1.0, 2.0], 0.0, 0.0),
            Err(SplineError::InvalidStep { step: 0.0 })
        );
        assert_eq!(
            second_derivatives_explicit(&[0.0, 1.0, 0.5], &[0.0, 1.0, 2.0], 0.0, 0.0),
            Err(SplineError::NonIncreasingKnots {
                index: 2,
                previous: 1.0,
                current: 0.5,
            })
        );
        assert_eq!(
            second_derivatives_explicit(&[0.0, 1.0], &[0.0, 1.0, 2.0], 0.0, 0.0),
            Err(SplineError::LengthMismatch {
                values: 3,
                coords: 2,
            })
        );
    }

    #[test]
    fn slot_lookup_clamps_last_interval_and_rejects_out_of_range() {
        let slot = SplineSlot::locate_uniform(0.0, 0.5, 5, 2.0).expect("slot at upper knot");
        assert_eq!(slot.interval, 3);
        assert!((slot.fraction - 1.0).abs() < 1.0e-12);
        assert!(SplineSlot::locate_uniform(0.0, 0.5, 5, -0.1).is_none());

        let coords = [0.0, 0.4, 1.0, 1.9];
        let slot = SplineSlot::locate_explicit(&coords, 1.9).expect("upper knot");
        assert_eq!(slot.interval, 2);
        assert!(SplineSlot::locate_explicit(&coords, 2.0).is_none());
    }
}
