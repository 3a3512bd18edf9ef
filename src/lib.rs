//! Gradient sanitization for differentially-private SGD
//!
//! Clips a batch of gradient contributions to a bounded L2 norm, records the
//! privacy spend with an accountant and adds Gaussian noise calibrated to an
//! (epsilon, delta) target, following Abadi et al. (2016).
//!
//! # Jidoka
//!
//! Privacy failures stop the line. Invalid privacy parameters, missing clip
//! bounds and accountant refusals all return an error before any noised tensor
//! exists; nothing is retried or substituted with a default.
//!
//! # Example
//!
//! ```
//! use std::sync::Arc;
//! use dp_sanitizer::{AmortizedAccountant, ClipOption, PrivacyTarget, SanitizeRequest, Sanitizer};
//! use ndarray::Array2;
//!
//! let accountant = Arc::new(AmortizedAccountant::new(60_000));
//! let mut sanitizer = Sanitizer::new(Arc::clone(&accountant), ClipOption::clipped(4.0));
//! sanitizer.configure_override("layer1/bias", ClipOption::clipped(1.0));
//!
//! let grads = Array2::<f64>::ones((32, 10)).into_dyn();
//! let request =
//!     SanitizeRequest::new(PrivacyTarget::new(1.0, 1e-5)).with_tensor_name("layer1/bias");
//! let noised = sanitizer.sanitize(&grads, &request)?;
//!
//! assert_eq!(noised.shape(), &[32, 10]);
//! assert_eq!(accountant.n_spends()?, 1);
//! # Ok::<(), dp_sanitizer::DpError>(())
//! ```
//!
//! # References
//!
//! \[1\] Abadi et al. (2016) - Deep Learning with Differential Privacy
//! \[2\] Mironov (2017) - Renyi Differential Privacy

pub mod accountant;
pub mod budget;
pub mod clip;
pub mod config;
pub mod error;
pub mod noise;
pub mod sanitizer;
pub mod target;

pub use accountant::{
    AccountantConfig, AccountantKind, AmortizedAccountant, PrivacyAccountant, RdpAccountant,
    SpendReceipt,
};
pub use budget::PrivacyBudget;
pub use clip::{clip_by_norm, clip_per_example, l2_norm, ClipOption, ClipScope};
pub use config::SanitizerConfig;
pub use error::{DpError, Result};
pub use noise::{GaussianNoise, NoiseSource};
pub use sanitizer::{SanitizeRequest, Sanitizer};
pub use target::PrivacyTarget;

/// Sanitized tensors are dense `f64` arrays; axis 0 is the example axis.
pub type Tensor = ndarray::ArrayD<f64>;
