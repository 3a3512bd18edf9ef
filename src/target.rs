//! Per-call privacy target and Gaussian noise calibration.

use serde::{Deserialize, Serialize};

use crate::error::{DpError, Result};

/// Privacy target (epsilon, delta) for a single sanitize call
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct PrivacyTarget {
    /// Privacy loss parameter epsilon (smaller = more private)
    pub epsilon: f64,
    /// Probability of privacy breach delta (smaller = more private)
    pub delta: f64,
}

impl PrivacyTarget {
    /// Create a new privacy target
    pub fn new(epsilon: f64, delta: f64) -> Self {
        Self { epsilon, delta }
    }

    /// Calibrate the Gaussian mechanism noise scale for this target.
    ///
    /// `sigma = sqrt(2 ln(1.25 / delta)) / epsilon`
    ///
    /// Only `epsilon > 0` and `delta > 0` are checked. `delta >= 1.25` makes the
    /// logarithm non-positive and is caught by the finiteness check on the result.
    pub fn gaussian_sigma(&self) -> Result<f64> {
        if self.epsilon.is_nan() || self.epsilon <= 0.0 {
            return Err(DpError::InvalidPrivacyParameter {
                name: "epsilon",
                value: self.epsilon,
                reason: "eps needs to be greater than 0",
            });
        }
        if self.delta.is_nan() || self.delta <= 0.0 {
            return Err(DpError::InvalidPrivacyParameter {
                name: "delta",
                value: self.delta,
                reason: "delta needs to be greater than 0",
            });
        }

        let sigma = (2.0 * (1.25 / self.delta).ln()).sqrt() / self.epsilon;
        if !sigma.is_finite() {
            return Err(DpError::InvalidPrivacyParameter {
                name: "delta",
                value: self.delta,
                reason: "noise scale is undefined for this delta",
            });
        }
        Ok(sigma)
    }
}

impl From<(f64, f64)> for PrivacyTarget {
    fn from((epsilon, delta): (f64, f64)) -> Self {
        Self { epsilon, delta }
    }
}

/// Check a caller-supplied noise scale.
pub(crate) fn validate_sigma(sigma: f64) -> Result<f64> {
    if sigma.is_finite() && sigma >= 0.0 {
        Ok(sigma)
    } else {
        Err(DpError::InvalidPrivacyParameter {
            name: "sigma",
            value: sigma,
            reason: "noise scale must be finite and non-negative",
        })
    }
}
