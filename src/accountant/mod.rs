//! Privacy accountants.
//!
//! The sanitizer records every noised release with an accountant before the
//! noised tensor is produced. Accountants are shared between sanitizers (one
//! per tensor family is common), so recording goes through `&self` and each
//! implementation guards its own state.
//!
//! - [`AmortizedAccountant`]: privacy amplification by sampling, summed linearly
//! - [`RdpAccountant`]: Renyi-DP composition (Mironov 2017), tighter over many steps

pub mod amortized;
pub mod rdp;

use serde::{Deserialize, Serialize};

use crate::budget::PrivacyBudget;
use crate::error::{DpError, Result};
use crate::target::PrivacyTarget;

pub use amortized::AmortizedAccountant;
pub use rdp::{compute_rdp_gaussian, rdp_to_dp, RdpAccountant};

/// Records privacy spending for noised releases
pub trait PrivacyAccountant: Send + Sync {
    /// Record the spend of one noised release of `num_examples` examples.
    ///
    /// The returned receipt is the completion signal: once it exists the spend
    /// is committed and visible through the accountant's queries.
    fn accumulate_privacy_spending(
        &self,
        target: PrivacyTarget,
        sigma: f64,
        num_examples: usize,
    ) -> Result<SpendReceipt>;
}

/// Proof that a spend was committed
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct SpendReceipt {
    /// Position in the accountant's ledger (0-based)
    pub sequence: usize,
    /// Privacy target the release was calibrated for
    pub target: PrivacyTarget,
    /// Noise scale used for the release
    pub sigma: f64,
    /// Number of examples in the release
    pub num_examples: usize,
}

/// Which accountant to build from configuration
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AccountantKind {
    #[default]
    Amortized,
    Rdp,
}

/// Accountant section of the sanitizer configuration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AccountantConfig {
    /// Accountant implementation
    #[serde(default)]
    pub kind: AccountantKind,
    /// Size of the training set the batches are sampled from
    pub total_examples: usize,
    /// Optional cumulative budget; spends beyond it are refused
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub budget: Option<PrivacyBudget>,
}

impl AccountantConfig {
    /// Create an accountant configuration
    pub fn new(kind: AccountantKind, total_examples: usize) -> Self {
        Self { kind, total_examples, budget: None }
    }

    /// Set cumulative budget
    pub fn with_budget(mut self, budget: PrivacyBudget) -> Self {
        self.budget = Some(budget);
        self
    }

    /// Validate configuration
    pub fn validate(&self) -> Result<()> {
        if self.total_examples == 0 {
            return Err(DpError::InvalidConfig("total_examples must be > 0".to_string()));
        }
        if let Some(budget) = &self.budget {
            budget.validate()?;
        }
        Ok(())
    }

    /// Build the configured accountant
    pub fn build(&self) -> Result<Box<dyn PrivacyAccountant>> {
        self.validate()?;
        let accountant: Box<dyn PrivacyAccountant> = match self.kind {
            AccountantKind::Amortized => {
                let mut acc = AmortizedAccountant::new(self.total_examples);
                if let Some(budget) = self.budget {
                    acc = acc.with_budget(budget);
                }
                Box::new(acc)
            }
            AccountantKind::Rdp => {
                let mut acc = RdpAccountant::new(self.total_examples);
                if let Some(budget) = self.budget {
                    acc = acc.with_budget(budget);
                }
                Box::new(acc)
            }
        };
        Ok(accountant)
    }
}

/// Sampling ratio of a release, rejecting batches larger than the dataset.
pub(crate) fn sampling_ratio(num_examples: usize, total_examples: usize) -> Result<f64> {
    if total_examples == 0 {
        return Err(DpError::Accounting("total_examples is zero".to_string()));
    }
    if num_examples > total_examples {
        return Err(DpError::Accounting(format!(
            "batch of {num_examples} examples exceeds dataset of {total_examples}"
        )));
    }
    Ok(num_examples as f64 / total_examples as f64)
}

/// Refuse spends that would lower or corrupt the cumulative record.
///
/// Sanitizers skip target validation when sigma is supplied, so the accountant
/// checks again: epsilon must be positive and finite, delta in (0, 1], sigma
/// finite and non-negative.
pub(crate) fn validate_spend(target: &PrivacyTarget, sigma: f64) -> Result<()> {
    if !target.epsilon.is_finite() || target.epsilon <= 0.0 {
        return Err(DpError::InvalidPrivacyParameter {
            name: "epsilon",
            value: target.epsilon,
            reason: "spent epsilon must be positive and finite",
        });
    }
    if target.delta.is_nan() || target.delta <= 0.0 || target.delta > 1.0 {
        return Err(DpError::InvalidPrivacyParameter {
            name: "delta",
            value: target.delta,
            reason: "spent delta must be in (0, 1]",
        });
    }
    if !sigma.is_finite() || sigma < 0.0 {
        return Err(DpError::InvalidPrivacyParameter {
            name: "sigma",
            value: sigma,
            reason: "recorded noise scale must be finite and non-negative",
        });
    }
    Ok(())
}

pub(crate) fn poisoned() -> DpError {
    DpError::Accounting("accountant state poisoned by a panicked recorder".to_string())
}
