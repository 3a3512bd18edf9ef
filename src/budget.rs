//! Cumulative privacy budget enforced by the accountants.

use serde::{Deserialize, Serialize};

use crate::error::{DpError, Result};

/// Upper bound on total (epsilon, delta) an accountant may record
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct PrivacyBudget {
    /// Maximum cumulative epsilon
    pub epsilon: f64,
    /// Maximum cumulative delta
    pub delta: f64,
}

impl PrivacyBudget {
    /// Create a new privacy budget
    pub fn new(epsilon: f64, delta: f64) -> Self {
        Self { epsilon, delta }
    }

    /// Check if the budget allows the given cumulative epsilon
    pub fn allows(&self, spent: f64) -> bool {
        spent <= self.epsilon
    }

    /// Get remaining epsilon
    pub fn remaining(&self, spent: f64) -> f64 {
        (self.epsilon - spent).max(0.0)
    }

    /// Reject a spend whose cumulative epsilon would exceed the budget.
    pub fn check(&self, spent: f64) -> Result<()> {
        if self.allows(spent) {
            Ok(())
        } else {
            Err(DpError::BudgetExhausted { spent, budget: self.epsilon })
        }
    }

    /// Validate budget parameters
    pub fn validate(&self) -> Result<()> {
        if self.epsilon.is_nan() || self.epsilon <= 0.0 {
            return Err(DpError::InvalidConfig("budget epsilon must be positive".to_string()));
        }
        if self.delta.is_nan() || self.delta <= 0.0 || self.delta >= 1.0 {
            return Err(DpError::InvalidConfig("budget delta must be in (0, 1)".to_string()));
        }
        Ok(())
    }
}

impl Default for PrivacyBudget {
    fn default() -> Self {
        // Commonly used default: (8.0, 1e-5)
        Self { epsilon: 8.0, delta: 1e-5 }
    }
}
