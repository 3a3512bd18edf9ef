//! Gaussian perturbation primitive.

use ndarray::ArrayD;
use rand::rngs::StdRng;
use rand::SeedableRng;
use rand_distr::{Distribution, Normal};

use crate::error::{DpError, Result};

/// Adds element-wise zero-mean Gaussian noise to a tensor
pub trait NoiseSource {
    /// Return `tensor` plus independent N(0, std_dev^2) noise per element.
    fn add_gaussian_noise(&mut self, tensor: &ArrayD<f64>, std_dev: f64) -> Result<ArrayD<f64>>;
}

/// Gaussian noise backed by a seedable `StdRng`
#[derive(Debug, Clone)]
pub struct GaussianNoise {
    rng: StdRng,
}

impl GaussianNoise {
    /// Seed from the operating system
    pub fn new() -> Self {
        Self { rng: StdRng::from_os_rng() }
    }

    /// Create with a deterministic seed (for reproducible runs)
    pub fn with_seed(seed: u64) -> Self {
        Self { rng: StdRng::seed_from_u64(seed) }
    }
}

impl Default for GaussianNoise {
    fn default() -> Self {
        Self::new()
    }
}

impl NoiseSource for GaussianNoise {
    fn add_gaussian_noise(&mut self, tensor: &ArrayD<f64>, std_dev: f64) -> Result<ArrayD<f64>> {
        if !std_dev.is_finite() || std_dev < 0.0 {
            return Err(DpError::Noise(format!("invalid standard deviation {std_dev}")));
        }
        if std_dev == 0.0 {
            return Ok(tensor.clone());
        }

        let normal = Normal::new(0.0, std_dev).map_err(|e| DpError::Noise(e.to_string()))?;
        Ok(tensor.mapv(|x| x + normal.sample(&mut self.rng)))
    }
}
