//! Property-based tests for the KPI calculator.
//!
//! No database or network access required.
//!
//! ```bash
//! cargo test --test property_tests
//! PROPTEST_CASES=10000 cargo test --test property_tests
//! ```
//!
//! Each property is named `prop_<function>_<invariant>`.

use plantkeeper::kpi::{self, KpiMetrics, KpiSettings};
use proptest::prelude::*;
use rust_decimal::Decimal;

fn settings() -> KpiSettings {
    KpiSettings::default()
}

proptest! {
    #[test]
    fn prop_compute_ipu_is_ratio_or_zero(active in 0i64..100_000, total in 0i64..10_000_000) {
        let m = KpiMetrics::compute(active, total, &settings());
        if active == 0 {
            prop_assert_eq!(m.impressions_per_user, 0.0);
            prop_assert_eq!(m.estimated_arpu, Decimal::ZERO);
        } else {
            prop_assert_eq!(m.impressions_per_user, total as f64 / active as f64);
        }
    }

    #[test]
    fn prop_compute_revenue_is_linear_in_impressions(active in 0i64..1000, total in 0i64..10_000_000) {
        let m = KpiMetrics::compute(active, total, &settings());
        prop_assert_eq!(m.estimated_revenue, Decimal::from(total) * Decimal::new(5, 3));
    }

    #[test]
    fn prop_compute_target_matches_threshold(active in 1i64..1000, total in 0i64..200_000) {
        let m = KpiMetrics::compute(active, total, &settings());
        prop_assert_eq!(m.target_achieved, m.impressions_per_user >= 50.0);
    }

    #[test]
    fn prop_compute_arpu_times_users_recovers_revenue(active in 1i64..1000, total in 0i64..1_000_000) {
        let m = KpiMetrics::compute(active, total, &settings());
        let recovered = m.estimated_arpu * Decimal::from(active);
        // Rounded to six places, so at most half a micro-unit per user off.
        let tolerance = Decimal::new(5, 7) * Decimal::from(active);
        prop_assert!((recovered - m.estimated_revenue).abs() <= tolerance);
    }

    #[test]
    fn prop_compute_is_deterministic(active in -10i64..1000, total in -10i64..1_000_000) {
        let a = KpiMetrics::compute(active, total, &settings());
        let b = KpiMetrics::compute(active, total, &settings());
        prop_assert_eq!(&a, &b);
        prop_assert!(a.active_users >= 0 && a.total_impressions >= 0);
    }

    #[test]
    fn prop_click_through_rate_bounded(impressions in 0i64..1_000_000, ratio in 0.0f64..=1.0) {
        let clicks = (impressions as f64 * ratio) as i64;
        let ctr = kpi::click_through_rate(clicks, impressions);
        prop_assert!((0.0..=100.0).contains(&ctr));
        if impressions == 0 {
            prop_assert_eq!(ctr, 0.0);
        }
    }

    #[test]
    fn prop_target_percentage_capped(ipu in 0.0f64..1000.0, target in 0.1f64..200.0) {
        let pct = kpi::target_percentage(ipu, target);
        prop_assert!((0.0..=100.0).contains(&pct));
    }
}

#[test]
fn reference_day_matches_published_example() {
    let m = KpiMetrics::compute(2, 130, &settings());
    assert_eq!(m.impressions_per_user, 65.0);
    assert_eq!(m.estimated_revenue, Decimal::new(65, 2));
    assert_eq!(m.estimated_arpu, Decimal::new(325, 3));
    assert!(m.target_achieved);
}
