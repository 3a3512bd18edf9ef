//! Error types for gradient sanitization.

use thiserror::Error;

/// Sanitization errors
///
/// Privacy-relevant failures are never retried or substituted with defaults:
/// every variant aborts the call it was raised from.
#[derive(Debug, Error)]
pub enum DpError {
    #[error("Invalid privacy parameter: {name} = {value} ({reason})")]
    InvalidPrivacyParameter { name: &'static str, value: f64, reason: &'static str },

    #[error(
        "No clip bound resolved for tensor {tensor}; \
         set an explicit option, an override or a default bound"
    )]
    MissingClipBound { tensor: String },

    #[error("Invalid clip bound for tensor {tensor}: {bound} (must be positive and finite)")]
    InvalidClipBound { tensor: String, bound: f64 },

    #[error("Privacy budget exhausted: spent {spent:.4} > allowed {budget:.4}")]
    BudgetExhausted { spent: f64, budget: f64 },

    #[error("Privacy accounting failed: {0}")]
    Accounting(String),

    #[error("Tensor shape error: {0}")]
    Shape(String),

    #[error("Tensor {tensor} contains non-finite values")]
    NonFinite { tensor: String },

    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),

    #[error("Noise sampling failed: {0}")]
    Noise(String),
}

impl DpError {
    /// Whether the error originates from the privacy accountant.
    pub fn is_accounting(&self) -> bool {
        matches!(self, Self::BudgetExhausted { .. } | Self::Accounting(_))
    }
}

/// Result type for sanitization operations
pub type Result<T> = std::result::Result<T, DpError>;
