//! Gradient sanitizer: clip, record spend, then add calibrated Gaussian noise.
//!
//! The steps of [`Sanitizer::sanitize`] run strictly in order:
//! 1. Resolve sigma (from the privacy target unless supplied)
//! 2. Resolve the clip option (explicit > per-tensor override > default)
//! 3. Clip
//! 4. Record the spend with the accountant
//! 5. Add noise with standard deviation `sigma * l2norm_bound`
//!
//! Non-finite batches are refused up front. Every check that can fail runs
//! before step 4, and step 5 only runs once the accountant has returned its
//! receipt. A failure at any step returns an error and no tensor, so a noised
//! release whose spend went unrecorded cannot exist.

mod request;


use std::collections::HashMap;
use std::sync::Arc;

use ndarray::Axis;
use tracing::debug;

use crate::accountant::PrivacyAccountant;
use crate::clip::{clip_with_scope, l2_norm, ClipOption, ClipScope};
use crate::config::SanitizerConfig;
use crate::error::{DpError, Result};
use crate::noise::{GaussianNoise, NoiseSource};
use crate::target::validate_sigma;
use crate::Tensor;

pub use request::SanitizeRequest;

const UNNAMED: &str = "<unnamed>";

/// Per-tensor gradient sanitizer
///
/// Holds a shared accountant, a default clip option and per-tensor overrides.
/// Holds no per-call state.
pub struct Sanitizer<A = dyn PrivacyAccountant, N = GaussianNoise>
where
    A: PrivacyAccountant + ?Sized,
    N: NoiseSource,
{
    accountant: Arc<A>,
    default_option: ClipOption,
    options: HashMap<String, ClipOption>,
    clip_scope: ClipScope,
    noise: N,
}

impl<A> Sanitizer<A>
where
    A: PrivacyAccountant + ?Sized,
{
    /// Create a sanitizer with OS-seeded Gaussian noise
    pub fn new(accountant: Arc<A>, default_option: ClipOption) -> Self {
        Self {
            accountant,
            default_option,
            options: HashMap::new(),
            clip_scope: ClipScope::default(),
            noise: GaussianNoise::new(),
        }
    }

    /// Create a sanitizer from configuration around an existing accountant
    pub fn from_config(config: &SanitizerConfig, accountant: Arc<A>) -> Result<Self> {
        config.validate()?;

        let mut sanitizer = Self::new(accountant, config.default_option)
            .with_clip_scope(config.clip_scope);
        if let Some(seed) = config.seed {
            sanitizer.noise = GaussianNoise::with_seed(seed);
        }
        for (name, option) in &config.overrides {
            sanitizer.configure_override(name.clone(), *option);
        }
        Ok(sanitizer)
    }
}

impl<A, N> Sanitizer<A, N>
where
    A: PrivacyAccountant + ?Sized,
    N: NoiseSource,
{
    /// Replace the noise source
    pub fn with_noise_source<M: NoiseSource>(self, noise: M) -> Sanitizer<A, M> {
        Sanitizer {
            accountant: self.accountant,
            default_option: self.default_option,
            options: self.options,
            clip_scope: self.clip_scope,
            noise,
        }
    }

    /// Set clip scope
    pub fn with_clip_scope(mut self, scope: ClipScope) -> Self {
        self.clip_scope = scope;
        self
    }

    /// Register or replace the clip option for a named tensor.
    ///
    /// Values are not validated here; an unusable bound surfaces when a
    /// sanitize call resolves to it.
    pub fn configure_override(&mut self, tensor_name: impl Into<String>, option: ClipOption) {
        self.options.insert(tensor_name.into(), option);
    }

    /// Get the override registered for `tensor_name`
    pub fn clip_option(&self, tensor_name: &str) -> Option<&ClipOption> {
        self.options.get(tensor_name)
    }

    /// Get the default clip option
    pub fn default_option(&self) -> ClipOption {
        self.default_option
    }

    /// Get the clip scope
    pub fn clip_scope(&self) -> ClipScope {
        self.clip_scope
    }

    /// Get the shared accountant
    pub fn accountant(&self) -> &Arc<A> {
        &self.accountant
    }

    /// Resolve the clip option for a call.
    ///
    /// An explicit option wins only when it carries a bound; `clip = true`
    /// without a bound falls through to the override, then the default.
    pub fn resolve_option(&self, explicit: &ClipOption, tensor_name: Option<&str>) -> ClipOption {
        if explicit.has_bound() {
            return *explicit;
        }
        tensor_name
            .and_then(|name| self.options.get(name))
            .copied()
            .unwrap_or(self.default_option)
    }

    /// Produce a sanitized tensor from `batch`.
    ///
    /// With `add_noise` the result keeps the batch's shape: the (clipped) batch
    /// plus N(0, (sigma * bound)^2) noise, released only after the accountant
    /// has committed the spend. Without it the result is the exact (clipped)
    /// sum over axis 0 and the accountant is not consulted.
    pub fn sanitize(&mut self, batch: &Tensor, request: &SanitizeRequest) -> Result<Tensor> {
        let sigma = match request.sigma {
            Some(sigma) => validate_sigma(sigma)?,
            None => request.target.gaussian_sigma()?,
        };

        let tensor = request.tensor_name.as_deref().unwrap_or(UNNAMED);
        if !batch.iter().all(|v| v.is_finite()) {
            return Err(DpError::NonFinite { tensor: tensor.to_string() });
        }

        let resolved = self.resolve_option(&request.option, request.tensor_name.as_deref());
        debug!(tensor, ?resolved, sigma, "resolved clip option");

        let clipped;
        let x = if resolved.clip {
            let bound = require_bound(&resolved, tensor)?;
            clipped = clip_with_scope(batch, bound, self.clip_scope)?;
            debug!(
                tensor,
                bound,
                norm_before = l2_norm(batch),
                norm_after = l2_norm(&clipped),
                "clipped batch"
            );
            &clipped
        } else {
            batch
        };

        if !request.add_noise {
            if x.ndim() == 0 {
                return Err(DpError::Shape(format!(
                    "cannot reduce scalar tensor {tensor} over axis 0"
                )));
            }
            return Ok(x.sum_axis(Axis(0)));
        }

        let bound = require_bound(&resolved, tensor)?;
        let std_dev = sigma * bound;
        if !std_dev.is_finite() {
            return Err(DpError::InvalidPrivacyParameter {
                name: "noise_std",
                value: std_dev,
                reason: "sigma * l2norm_bound overflows",
            });
        }
        let num_examples = match request.num_examples {
            Some(n) => n,
            None => leading_dim(x, tensor)?,
        };

        let receipt =
            self.accountant.accumulate_privacy_spending(request.target, sigma, num_examples)?;
        debug!(tensor, sequence = receipt.sequence, std_dev, "adding noise");

        self.noise.add_gaussian_noise(x, std_dev)
    }
}

fn require_bound(option: &ClipOption, tensor: &str) -> Result<f64> {
    match option.l2norm_bound {
        Some(bound) if bound.is_finite() && bound > 0.0 => Ok(bound),
        Some(bound) => Err(DpError::InvalidClipBound { tensor: tensor.to_string(), bound }),
        None => Err(DpError::MissingClipBound { tensor: tensor.to_string() }),
    }
}

fn leading_dim(x: &Tensor, tensor: &str) -> Result<usize> {
    x.shape()
        .first()
        .copied()
        .ok_or_else(|| {
            DpError::Shape(format!("tensor {tensor} has no leading axis to count examples"))
        })
}
