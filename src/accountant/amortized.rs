//! Amortized accountant: privacy amplification by sampling with linear composition.

use std::sync::Mutex;

use tracing::{info, warn};

use super::{poisoned, sampling_ratio, validate_spend, PrivacyAccountant, SpendReceipt};
use crate::budget::PrivacyBudget;
use crate::error::Result;
use crate::target::PrivacyTarget;

/// Accountant that amortizes each spend over the sampling ratio.
///
/// A release of `n` out of `N` examples at (eps, delta) costs
/// `ln(1 + q (e^eps - 1))` epsilon and `q * delta` delta with `q = n / N`.
/// Costs add up across releases. The noise scale is recorded but does not
/// enter the bound.
#[derive(Debug)]
pub struct AmortizedAccountant {
    total_examples: usize,
    budget: Option<PrivacyBudget>,
    state: Mutex<AmortizedState>,
}

#[derive(Debug, Default)]
struct AmortizedState {
    eps_so_far: f64,
    delta_so_far: f64,
    ledger: Vec<SpendReceipt>,
}

impl AmortizedAccountant {
    /// Create an accountant for a dataset of `total_examples`
    pub fn new(total_examples: usize) -> Self {
        Self { total_examples, budget: None, state: Mutex::new(AmortizedState::default()) }
    }

    /// Refuse spends that would push cumulative epsilon past `budget`
    pub fn with_budget(mut self, budget: PrivacyBudget) -> Self {
        self.budget = Some(budget);
        self
    }

    /// Get cumulative (epsilon, delta)
    pub fn privacy_spent(&self) -> Result<(f64, f64)> {
        let state = self.state.lock().map_err(|_| poisoned())?;
        Ok((state.eps_so_far, state.delta_so_far))
    }

    /// Get all committed spends in order
    pub fn ledger(&self) -> Result<Vec<SpendReceipt>> {
        let state = self.state.lock().map_err(|_| poisoned())?;
        Ok(state.ledger.clone())
    }

    /// Get number of committed spends
    pub fn n_spends(&self) -> Result<usize> {
        Ok(self.state.lock().map_err(|_| poisoned())?.ledger.len())
    }

    /// Get dataset size
    pub fn total_examples(&self) -> usize {
        self.total_examples
    }
}

/// Amortized (epsilon, delta) cost of one release at sampling ratio `q`
pub fn amortized_cost(target: PrivacyTarget, q: f64) -> (f64, f64) {
    let eps = (q * target.epsilon.exp_m1()).ln_1p();
    let delta = q * target.delta;
    (eps, delta)
}

impl PrivacyAccountant for AmortizedAccountant {
    fn accumulate_privacy_spending(
        &self,
        target: PrivacyTarget,
        sigma: f64,
        num_examples: usize,
    ) -> Result<SpendReceipt> {
        validate_spend(&target, sigma)?;
        let q = sampling_ratio(num_examples, self.total_examples)?;
        let (eps, delta) = amortized_cost(target, q);

        let mut state = self.state.lock().map_err(|_| poisoned())?;
        let eps_total = state.eps_so_far + eps;

        if let Some(budget) = &self.budget {
            if let Err(e) = budget.check(eps_total) {
                warn!(eps_total, budget = budget.epsilon, "amortized accountant refused spend");
                return Err(e);
            }
        }

        state.eps_so_far = eps_total;
        state.delta_so_far += delta;
        let receipt = SpendReceipt { sequence: state.ledger.len(), target, sigma, num_examples };
        state.ledger.push(receipt);

        info!(
            sequence = receipt.sequence,
            num_examples,
            eps_spent = state.eps_so_far,
            delta_spent = state.delta_so_far,
            "recorded privacy spend"
        );
        Ok(receipt)
    }
}
