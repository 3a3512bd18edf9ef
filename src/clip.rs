//! Clip options and L2 norm clipping.

use ndarray::{ArrayD, Axis};
use serde::{Deserialize, Serialize};

use crate::error::{DpError, Result};

/// Whether and how to bound a tensor's L2 norm before aggregation
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct ClipOption {
    /// Maximum allowed L2 norm; `None` means "not specified here"
    #[serde(default)]
    pub l2norm_bound: Option<f64>,
    /// Whether to clip at all
    #[serde(default)]
    pub clip: bool,
}

impl ClipOption {
    /// Create a clip option
    pub fn new(l2norm_bound: Option<f64>, clip: bool) -> Self {
        Self { l2norm_bound, clip }
    }

    /// Clip to `bound`
    pub fn clipped(bound: f64) -> Self {
        Self { l2norm_bound: Some(bound), clip: true }
    }

    /// Carry `bound` for noise calibration without clipping
    pub fn unclipped(bound: f64) -> Self {
        Self { l2norm_bound: Some(bound), clip: false }
    }

    /// Whether this option takes part in resolution
    pub fn has_bound(&self) -> bool {
        self.l2norm_bound.is_some()
    }
}

/// Which slices of the batch the norm bound applies to
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ClipScope {
    /// Bound the norm of the whole tensor
    #[default]
    Tensor,
    /// Bound the norm of every slice along axis 0 independently
    PerExample,
}

/// Compute the L2 norm of all elements
///
/// Elements are scaled by the largest magnitude before squaring, so large
/// finite tensors do not overflow to infinity.
pub fn l2_norm(x: &ArrayD<f64>) -> f64 {
    scaled_norm(x.iter())
}

fn scaled_norm<'a>(values: impl Iterator<Item = &'a f64> + Clone) -> f64 {
    if values.clone().any(|v| v.is_nan()) {
        return f64::NAN;
    }
    let max = values.clone().fold(0.0f64, |m, v| m.max(v.abs()));
    if max == 0.0 || max.is_infinite() {
        return max;
    }
    max * values.map(|v| (v / max).powi(2)).sum::<f64>().sqrt()
}

fn ensure_finite(x: &ArrayD<f64>) -> Result<()> {
    if x.iter().all(|v| v.is_finite()) {
        Ok(())
    } else {
        Err(DpError::NonFinite { tensor: "clip input".to_string() })
    }
}

/// Rescale `x` so its L2 norm does not exceed `max_norm`.
///
/// Tensors at or under the bound are returned unchanged. NaN or infinite
/// elements are refused since no rescaling can bound them.
pub fn clip_by_norm(x: &ArrayD<f64>, max_norm: f64) -> Result<ArrayD<f64>> {
    ensure_finite(x)?;
    let norm = l2_norm(x);

    if norm > max_norm {
        let scale = max_norm / norm;
        Ok(x.mapv(|v| v * scale))
    } else {
        Ok(x.clone())
    }
}

/// Clip every example (slice along axis 0) to `max_norm` independently.
pub fn clip_per_example(x: &ArrayD<f64>, max_norm: f64) -> Result<ArrayD<f64>> {
    if x.ndim() == 0 {
        return Err(DpError::Shape("per-example clipping needs a leading axis".to_string()));
    }
    ensure_finite(x)?;

    let mut clipped = x.clone();
    for mut example in clipped.axis_iter_mut(Axis(0)) {
        let norm = scaled_norm(example.iter());
        if norm > max_norm {
            let scale = max_norm / norm;
            example.mapv_inplace(|v| v * scale);
        }
    }
    Ok(clipped)
}

/// Clip `x` under the given scope
pub fn clip_with_scope(x: &ArrayD<f64>, max_norm: f64, scope: ClipScope) -> Result<ArrayD<f64>> {
    match scope {
        ClipScope::Tensor => clip_by_norm(x, max_norm),
        ClipScope::PerExample => clip_per_example(x, max_norm),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_abs_diff_eq;
    use ndarray::{arr0, arr1, arr2};

    fn values(x: &ArrayD<f64>) -> Vec<f64> {
        x.iter().copied().collect()
    }

    #[test]
    fn test_clip_by_norm_within_bound() {
        let x = arr1(&[0.3, 0.4, 0.0]).into_dyn();
        let clipped = clip_by_norm(&x, 1.0).unwrap();
        assert_eq!(clipped, x);
    }

    #[test]
    fn test_clip_by_norm_exceeds_bound() {
        let x = arr1(&[3.0, 4.0]).into_dyn();
        let clipped = clip_by_norm(&x, 1.0).unwrap();
        assert_abs_diff_eq!(l2_norm(&clipped), 1.0, epsilon = 1e-12);
        let v = values(&clipped);
        assert_abs_diff_eq!(v[0], 0.6, epsilon = 1e-12);
        assert_abs_diff_eq!(v[1], 0.8, epsilon = 1e-12);
    }

    #[test]
    fn test_clip_by_norm_exactly_at_bound() {
        let x = arr1(&[3.0, 4.0]).into_dyn();
        assert_eq!(clip_by_norm(&x, 5.0).unwrap(), x);
    }

    #[test]
    fn test_clip_by_norm_zero_tensor() {
        let x = arr1(&[0.0, 0.0]).into_dyn();
        assert_eq!(clip_by_norm(&x, 1.0).unwrap(), x);
    }

    #[test]
    fn test_clip_by_norm_whole_tensor() {
        // Two rows of norm 5: global norm sqrt(50)
        let x = arr2(&[[3.0, 4.0], [3.0, 4.0]]).into_dyn();
        let clipped = clip_by_norm(&x, 5.0).unwrap();
        assert_abs_diff_eq!(l2_norm(&clipped), 5.0, epsilon = 1e-12);
    }

    #[test]
    fn test_clip_per_example() {
        let x = arr2(&[[3.0, 4.0], [0.3, 0.4]]).into_dyn();
        let v = values(&clip_per_example(&x, 1.0).unwrap());
        for (got, want) in v.iter().zip([0.6, 0.8, 0.3, 0.4]) {
            assert_abs_diff_eq!(*got, want, epsilon = 1e-12);
        }
    }

    #[test]
    fn test_clip_per_example_rejects_scalar() {
        let x = arr0(2.0).into_dyn();
        assert!(matches!(clip_per_example(&x, 1.0), Err(DpError::Shape(_))));
    }

    #[test]
    fn test_l2_norm_large_values_do_not_overflow() {
        let x = arr2(&[[1e200, 1e200]]).into_dyn();
        assert_abs_diff_eq!(l2_norm(&x) / 1e200, 2.0f64.sqrt(), epsilon = 1e-12);
    }

    #[test]
    fn test_clip_by_norm_large_values_reach_bound() {
        let x = arr2(&[[1e200, 1e200]]).into_dyn();
        let clipped = clip_by_norm(&x, 2.0).unwrap();
        assert_abs_diff_eq!(l2_norm(&clipped), 2.0, epsilon = 1e-12);
        let v = values(&clipped);
        assert_abs_diff_eq!(v[0], 2.0f64.sqrt(), epsilon = 1e-12);
    }

    #[test]
    fn test_clip_per_example_large_values_reach_bound() {
        let x = arr2(&[[1e200, 1e200], [0.3, 0.4]]).into_dyn();
        let v = values(&clip_per_example(&x, 2.0).unwrap());
        assert_abs_diff_eq!(v[0], 2.0f64.sqrt(), epsilon = 1e-12);
        assert_abs_diff_eq!(v[2], 0.3, epsilon = 1e-12);
    }

    #[test]
    fn test_clip_rejects_non_finite() {
        let nan = arr2(&[[f64::NAN, 10.0]]).into_dyn();
        assert!(matches!(clip_by_norm(&nan, 2.0), Err(DpError::NonFinite { .. })));
        assert!(matches!(clip_per_example(&nan, 2.0), Err(DpError::NonFinite { .. })));

        let inf = arr1(&[f64::INFINITY, 1.0]).into_dyn();
        assert!(matches!(clip_by_norm(&inf, 2.0), Err(DpError::NonFinite { .. })));
    }

    #[test]
    fn test_l2_norm_propagates_nan() {
        assert!(l2_norm(&arr1(&[f64::NAN, 1.0]).into_dyn()).is_nan());
    }

    #[test]
    fn test_clip_option_constructors() {
        assert_eq!(ClipOption::default(), ClipOption::new(None, false));
        assert_eq!(ClipOption::clipped(2.0), ClipOption::new(Some(2.0), true));
        assert!(!ClipOption::unclipped(2.0).clip);
        assert!(!ClipOption::new(None, true).has_bound());
    }
}
