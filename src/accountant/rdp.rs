//! RDP (Renyi Differential Privacy) accountant.
//!
//! Provides tighter privacy bounds than linear composition.
//! Based on Mironov (2017).

use std::sync::Mutex;

use tracing::{info, warn};

use super::{poisoned, sampling_ratio, validate_spend, PrivacyAccountant, SpendReceipt};
use crate::budget::PrivacyBudget;
use crate::error::Result;
use crate::target::PrivacyTarget;

/// RDP accountant for the subsampled Gaussian mechanism.
///
/// Each release contributes the RDP of a Gaussian with noise multiplier
/// `sigma` at sampling rate `num_examples / total_examples` to every tracked
/// order. The (epsilon, delta) view is derived on demand.
#[derive(Debug)]
pub struct RdpAccountant {
    /// RDP orders to track
    orders: Vec<f64>,
    total_examples: usize,
    budget: Option<PrivacyBudget>,
    state: Mutex<RdpState>,
}

#[derive(Debug)]
struct RdpState {
    /// Accumulated RDP values for each order
    rdp: Vec<f64>,
    ledger: Vec<SpendReceipt>,
}

impl RdpAccountant {
    /// Create an accountant for a dataset of `total_examples`
    pub fn new(total_examples: usize) -> Self {
        // Standard orders for RDP accounting
        let orders: Vec<f64> = (2..=256).map(f64::from).collect();
        Self::with_orders(total_examples, orders)
    }

    /// Create with custom orders
    pub fn with_orders(total_examples: usize, orders: Vec<f64>) -> Self {
        let rdp = vec![0.0; orders.len()];
        Self {
            orders,
            total_examples,
            budget: None,
            state: Mutex::new(RdpState { rdp, ledger: Vec::new() }),
        }
    }

    /// Refuse spends whose epsilon at the budget's delta would exceed it
    pub fn with_budget(mut self, budget: PrivacyBudget) -> Self {
        self.budget = Some(budget);
        self
    }

    /// Get privacy spent as (epsilon, delta)
    pub fn privacy_spent(&self, delta: f64) -> Result<(f64, f64)> {
        let state = self.state.lock().map_err(|_| poisoned())?;
        Ok(rdp_to_dp(&self.orders, &state.rdp, delta))
    }

    /// Get all committed spends in order
    pub fn ledger(&self) -> Result<Vec<SpendReceipt>> {
        Ok(self.state.lock().map_err(|_| poisoned())?.ledger.clone())
    }

    /// Get number of committed spends
    pub fn n_steps(&self) -> Result<usize> {
        Ok(self.state.lock().map_err(|_| poisoned())?.ledger.len())
    }

    /// Reset the accountant
    pub fn reset(&self) -> Result<()> {
        let mut state = self.state.lock().map_err(|_| poisoned())?;
        for r in &mut state.rdp {
            *r = 0.0;
        }
        state.ledger.clear();
        Ok(())
    }
}

impl PrivacyAccountant for RdpAccountant {
    fn accumulate_privacy_spending(
        &self,
        target: PrivacyTarget,
        sigma: f64,
        num_examples: usize,
    ) -> Result<SpendReceipt> {
        validate_spend(&target, sigma)?;
        let sample_rate = sampling_ratio(num_examples, self.total_examples)?;

        let mut state = self.state.lock().map_err(|_| poisoned())?;
        let updated: Vec<f64> = self
            .orders
            .iter()
            .zip(state.rdp.iter())
            .map(|(&alpha, &rdp)| rdp + compute_rdp_gaussian(sigma, sample_rate, alpha))
            .collect();

        if let Some(budget) = &self.budget {
            let (eps_total, _) = rdp_to_dp(&self.orders, &updated, budget.delta);
            if let Err(e) = budget.check(eps_total) {
                warn!(eps_total, budget = budget.epsilon, "rdp accountant refused spend");
                return Err(e);
            }
        }

        state.rdp = updated;
        let receipt = SpendReceipt { sequence: state.ledger.len(), target, sigma, num_examples };
        state.ledger.push(receipt);

        info!(
            sequence = receipt.sequence,
            num_examples,
            sigma,
            sample_rate,
            "recorded privacy spend"
        );
        Ok(receipt)
    }
}

/// Compute RDP of Gaussian mechanism for subsampled data
pub fn compute_rdp_gaussian(noise_multiplier: f64, sample_rate: f64, alpha: f64) -> f64 {
    if sample_rate <= 0.0 {
        // Nothing released
        return 0.0;
    }
    if noise_multiplier <= 0.0 {
        return f64::INFINITY;
    }

    let sigma = noise_multiplier;

    if sample_rate >= 1.0 {
        // Full batch: alpha / (2 * sigma^2)
        alpha / (2.0 * sigma.powi(2))
    } else {
        if alpha <= 1.0 {
            return f64::INFINITY;
        }

        // Approximate subsampled RDP: log1p(min(1, q^2 alpha / (2 sigma^2)))
        let q = sample_rate;
        let log_a = (alpha - 1.0) * ((alpha * q.powi(2)) / (2.0 * sigma.powi(2))).min(1.0).ln_1p();
        log_a / (alpha - 1.0)
    }
}

/// Convert RDP to (epsilon, delta)-DP
pub fn rdp_to_dp(orders: &[f64], rdp: &[f64], delta: f64) -> (f64, f64) {
    if delta <= 0.0 || orders.is_empty() {
        return (f64::INFINITY, delta);
    }

    let log_delta = delta.max(f64::MIN_POSITIVE).ln();

    // Find optimal order
    let mut min_epsilon = f64::INFINITY;
    for (&alpha, &rdp_alpha) in orders.iter().zip(rdp.iter()) {
        if alpha <= 1.0 {
            continue;
        }
        // epsilon = rdp_alpha + log((alpha - 1) / alpha) / (alpha - 1)
        //           - (log(delta) + log(alpha - 1)) / (alpha - 1)
        let epsilon = rdp_alpha
            + (1.0 / (alpha - 1.0)) * ((alpha - 1.0) / alpha).max(f64::MIN_POSITIVE).ln()
            - (log_delta + (alpha - 1.0).max(f64::MIN_POSITIVE).ln()) / (alpha - 1.0);

        if epsilon < min_epsilon && epsilon >= 0.0 {
            min_epsilon = epsilon;
        }
    }

    (min_epsilon, delta)
}
