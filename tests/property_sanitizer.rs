//! Property tests for gradient sanitization
//!
//! Ensures sanitization satisfies its privacy invariants:
//! - Clipped norms never exceed the bound
//! - Noise calibration is monotone in epsilon and delta
//! - Invalid privacy targets never reach the accountant
//! - Noise-free aggregation is an exact, repeatable sum

use std::sync::Arc;

use dp_sanitizer::{
    clip_by_norm, clip_per_example, l2_norm, AmortizedAccountant, ClipOption, ClipScope, DpError,
    PrivacyTarget, SanitizeRequest, Sanitizer, Tensor,
};
use ndarray::{Array2, Axis};
use proptest::collection::vec;
use proptest::prelude::*;

// =============================================================================
// Strategy Helpers
// =============================================================================

/// Generate a (rows x cols) batch with bounded entries
fn batch(
    rows: std::ops::Range<usize>,
    cols: std::ops::Range<usize>,
) -> impl Strategy<Value = Tensor> {
    (rows, cols).prop_flat_map(|(r, c)| {
        vec(-100.0f64..100.0, r * c).prop_map(move |data| {
            Array2::from_shape_vec((r, c), data).expect("shape matches length").into_dyn()
        })
    })
}

/// Generate a privacy target with epsilon <= 0 or delta <= 0
fn invalid_target() -> impl Strategy<Value = PrivacyTarget> {
    prop_oneof![
        (-5.0f64..=0.0, 1e-9f64..0.5).prop_map(|(e, d)| PrivacyTarget::new(e, d)),
        (0.01f64..10.0, -1.0f64..=0.0).prop_map(|(e, d)| PrivacyTarget::new(e, d)),
    ]
}

// =============================================================================
// Clipping Properties
// =============================================================================

proptest! {
    #![proptest_config(ProptestConfig::with_cases(500))]

    #[test]
    fn prop_clip_norm_bounded(x in batch(1..8, 1..16), bound in 0.1f64..10.0) {
        let original = l2_norm(&x);
        let clipped = clip_by_norm(&x, bound).unwrap();
        let norm = l2_norm(&clipped);

        prop_assert!(norm <= bound + 1e-9);
        if original > bound {
            prop_assert!((norm - bound).abs() < 1e-9);
        } else {
            prop_assert_eq!(clipped, x);
        }
    }

    #[test]
    fn prop_per_example_norm_bounded(x in batch(1..8, 1..16), bound in 0.1f64..10.0) {
        let clipped = clip_per_example(&x, bound).unwrap();
        for (before, after) in x.axis_iter(Axis(0)).zip(clipped.axis_iter(Axis(0))) {
            let n_before = before.iter().map(|v| v * v).sum::<f64>().sqrt();
            let n_after = after.iter().map(|v| v * v).sum::<f64>().sqrt();
            prop_assert!(n_after <= bound + 1e-9);
            if n_before <= bound {
                prop_assert_eq!(before, after);
            }
        }
    }

    // -------------------------------------------------------------------------
    // Noise Calibration Properties
    // -------------------------------------------------------------------------

    #[test]
    fn prop_sigma_matches_formula(epsilon in 0.01f64..20.0, delta in 1e-12f64..0.99) {
        let sigma = PrivacyTarget::new(epsilon, delta).gaussian_sigma().unwrap();
        let expected = (2.0 * (1.25 / delta).ln()).sqrt() / epsilon;
        prop_assert!((sigma - expected).abs() <= 1e-12 * expected.max(1.0));
    }

    #[test]
    fn prop_sigma_decreasing_in_epsilon(epsilon in 0.01f64..10.0, delta in 1e-12f64..0.99) {
        let s1 = PrivacyTarget::new(epsilon, delta).gaussian_sigma().unwrap();
        let s2 = PrivacyTarget::new(epsilon * 1.5, delta).gaussian_sigma().unwrap();
        prop_assert!(s2 < s1);
    }

    #[test]
    fn prop_sigma_increases_as_delta_shrinks(epsilon in 0.01f64..10.0, delta in 1e-12f64..0.99) {
        let s1 = PrivacyTarget::new(epsilon, delta).gaussian_sigma().unwrap();
        let s2 = PrivacyTarget::new(epsilon, delta / 2.0).gaussian_sigma().unwrap();
        prop_assert!(s2 > s1);
    }

    // -------------------------------------------------------------------------
    // Sanitizer Properties
    // -------------------------------------------------------------------------

    #[test]
    fn prop_non_positive_target_never_spends(target in invalid_target(), x in batch(1..4, 1..4)) {
        let accountant = Arc::new(AmortizedAccountant::new(1000));
        let mut sanitizer = Sanitizer::new(Arc::clone(&accountant), ClipOption::clipped(1.0));

        let request = SanitizeRequest::new(target);
        let err = sanitizer.sanitize(&x, &request);
        let is_privacy_error = matches!(err, Err(DpError::InvalidPrivacyParameter { .. }));
        prop_assert!(is_privacy_error);
        prop_assert_eq!(accountant.n_spends().unwrap(), 0);
    }

    #[test]
    fn prop_invalid_target_with_sigma_never_spends(
        target in invalid_target(),
        sigma in 0.1f64..5.0,
        x in batch(1..4, 1..4)
    ) {
        let accountant = Arc::new(AmortizedAccountant::new(1000));
        let mut sanitizer = Sanitizer::new(Arc::clone(&accountant), ClipOption::clipped(1.0));

        let request = SanitizeRequest::new(target).with_sigma(sigma);
        prop_assert!(sanitizer.sanitize(&x, &request).is_err());
        prop_assert_eq!(accountant.privacy_spent().unwrap(), (0.0, 0.0));
    }

    #[test]
    fn prop_noise_free_sum_is_exact(x in batch(1..8, 1..8), bound in 0.1f64..50.0) {
        let accountant = Arc::new(AmortizedAccountant::new(1000));
        let mut sanitizer = Sanitizer::new(Arc::clone(&accountant), ClipOption::clipped(bound))
            .with_clip_scope(ClipScope::PerExample);
        let request = SanitizeRequest::new(PrivacyTarget::new(1.0, 1e-5)).without_noise();

        let out = sanitizer.sanitize(&x, &request).unwrap();
        let expected = clip_per_example(&x, bound).unwrap().sum_axis(Axis(0));

        prop_assert_eq!(&out, &expected);
        prop_assert_eq!(sanitizer.sanitize(&x, &request).unwrap(), out);
        prop_assert_eq!(accountant.n_spends().unwrap(), 0);
    }

    #[test]
    fn prop_noised_release_records_one_spend(x in batch(1..16, 1..8), calls in 1usize..5) {
        let accountant = Arc::new(AmortizedAccountant::new(1000));
        let mut sanitizer = Sanitizer::new(Arc::clone(&accountant), ClipOption::clipped(1.0));
        let request = SanitizeRequest::new(PrivacyTarget::new(0.5, 1e-6));

        for _ in 0..calls {
            let out = sanitizer.sanitize(&x, &request).unwrap();
            prop_assert_eq!(out.shape(), x.shape());
        }

        let ledger = accountant.ledger().unwrap();
        prop_assert_eq!(ledger.len(), calls);
        for receipt in ledger {
            prop_assert_eq!(receipt.num_examples, x.shape()[0]);
            prop_assert_eq!(receipt.target, request.target);
        }
    }
}
