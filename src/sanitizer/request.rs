//! Per-call sanitize arguments.

use crate::clip::ClipOption;
use crate::target::PrivacyTarget;

/// Arguments of a single [`Sanitizer::sanitize`](super::Sanitizer::sanitize) call
#[derive(Debug, Clone, PartialEq)]
pub struct SanitizeRequest {
    /// Privacy target used to calibrate sigma and reported to the accountant
    pub target: PrivacyTarget,
    /// Noise scale; derived from `target` when absent
    pub sigma: Option<f64>,
    /// Explicit clip option; only consulted when it carries a bound
    pub option: ClipOption,
    /// Name used to look up a per-tensor override
    pub tensor_name: Option<String>,
    /// Examples in the batch; defaults to the leading dimension
    pub num_examples: Option<usize>,
    /// Add noise (and record spend), or reduce over axis 0 without noise
    pub add_noise: bool,
}

impl SanitizeRequest {
    /// Create a request with all optional arguments at their defaults
    pub fn new(target: PrivacyTarget) -> Self {
        Self {
            target,
            sigma: None,
            option: ClipOption::default(),
            tensor_name: None,
            num_examples: None,
            add_noise: true,
        }
    }

    /// Set noise scale
    pub fn with_sigma(mut self, sigma: f64) -> Self {
        self.sigma = Some(sigma);
        self
    }

    /// Set explicit clip option
    pub fn with_option(mut self, option: ClipOption) -> Self {
        self.option = option;
        self
    }

    /// Set tensor name
    pub fn with_tensor_name(mut self, name: impl Into<String>) -> Self {
        self.tensor_name = Some(name.into());
        self
    }

    /// Set number of examples
    pub fn with_num_examples(mut self, n: usize) -> Self {
        self.num_examples = Some(n);
        self
    }

    /// Sum over the example axis instead of adding noise
    pub fn without_noise(mut self) -> Self {
        self.add_noise = false;
        self
    }
}
