//! # KPI: Derived Ad Metrics
//!
//! Pure functions that turn the two raw daily counts (active users and total
//! impressions) into the derived KPI columns stored on `ad_kpis`. Every write
//! path for a KPI row goes through [`KpiMetrics::compute`], so the derived
//! fields can never drift from the counts they were computed from.
//!
//! | Field | Formula |
//! |-------|---------|
//! | `impressions_per_user` | `total_impressions / active_users`, 0 when no active users |
//! | `estimated_revenue` | `total_impressions * revenue_per_impression` |
//! | `estimated_arpu` | `estimated_revenue / active_users`, 0 when no active users |
//! | `target_achieved` | `impressions_per_user >= target_impressions_per_user` |

use rust_decimal::prelude::ToPrimitive;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

/// Decimal places kept for money columns (matches `NUMERIC(12, 6)`).
pub const MONEY_SCALE: u32 = 6;

/// Product constants for the KPI calculation. Loaded from the `[kpi]` config section.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct KpiSettings {
    /// Daily impressions per active user that count as hitting the target.
    pub target_impressions_per_user: f64,
    /// Estimated revenue credited for a single impression.
    pub revenue_per_impression: Decimal,
}

impl Default for KpiSettings {
    fn default() -> Self {
        KpiSettings {
            target_impressions_per_user: 50.0,
            revenue_per_impression: Decimal::new(5, 3),
        }
    }
}

impl KpiSettings {
    /// Largest daily impression count whose estimated revenue still fits a
    /// money column.
    pub fn max_total_impressions(&self) -> i64 {
        if self.revenue_per_impression.is_zero() {
            return i64::MAX;
        }
        crate::dto::MONEY
            .max()
            .checked_div(self.revenue_per_impression)
            .and_then(|n| n.floor().to_i64())
            .unwrap_or(i64::MAX)
    }
}

pub fn impressions_per_user(total_impressions: i64, active_users: i64) -> f64 {
    if active_users > 0 {
        total_impressions as f64 / active_users as f64
    } else {
        0.0
    }
}

pub fn estimated_revenue(total_impressions: i64, revenue_per_impression: Decimal) -> Decimal {
    (Decimal::from(total_impressions) * revenue_per_impression).round_dp(MONEY_SCALE)
}

pub fn arpu(revenue: Decimal, active_users: i64) -> Decimal {
    if active_users > 0 {
        (revenue / Decimal::from(active_users)).round_dp(MONEY_SCALE)
    } else {
        Decimal::ZERO
    }
}

pub fn target_achieved(impressions_per_user: f64, target: f64) -> bool {
    impressions_per_user >= target
}

/// Share of the target reached, capped at 100 and rounded to one decimal.
pub fn target_percentage(impressions_per_user: f64, target: f64) -> f64 {
    if impressions_per_user <= 0.0 {
        return 0.0;
    }
    if target <= 0.0 {
        return 100.0;
    }
    let pct = (impressions_per_user / target * 100.0 * 10.0).round() / 10.0;
    pct.min(100.0)
}

/// A full set of KPI columns for one day.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct KpiMetrics {
    pub active_users: i64,
    pub total_impressions: i64,
    pub impressions_per_user: f64,
    pub estimated_revenue: Decimal,
    pub estimated_arpu: Decimal,
    pub target_achieved: bool,
}

impl KpiMetrics {
    /// Recompute every derived column from the raw counts. Negative counts are
    /// clamped to zero.
    pub fn compute(active_users: i64, total_impressions: i64, settings: &KpiSettings) -> Self {
        let active_users = active_users.max(0);
        let total_impressions = total_impressions.max(0);
        let ipu = impressions_per_user(total_impressions, active_users);
        let revenue = estimated_revenue(total_impressions, settings.revenue_per_impression);
        KpiMetrics {
            active_users,
            total_impressions,
            impressions_per_user: ipu,
            estimated_revenue: revenue,
            estimated_arpu: arpu(revenue, active_users),
            target_achieved: target_achieved(ipu, settings.target_impressions_per_user),
        }
    }
}

/// Click-through rate in percent. Zero impressions yields 0.0.
pub fn click_through_rate(clicks: i64, impressions: i64) -> f64 {
    if impressions <= 0 {
        return 0.0;
    }
    clicks as f64 / impressions as f64 * 100.0
}

/// Effective revenue per thousand impressions. Zero impressions yields 0.
pub fn ecpm(revenue: Decimal, impressions: i64) -> Decimal {
    if impressions <= 0 {
        return Decimal::ZERO;
    }
    (revenue / Decimal::from(impressions) * Decimal::from(1000)).round_dp(MONEY_SCALE)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::str::FromStr;

    fn dec(s: &str) -> Decimal {
        Decimal::from_str(s).unwrap()
    }

    #[test]
    fn two_users_one_hundred_thirty_impressions() {
        let m = KpiMetrics::compute(2, 130, &KpiSettings::default());
        assert_eq!(m.impressions_per_user, 65.0);
        assert_eq!(m.estimated_revenue, dec("0.65"));
        assert_eq!(m.estimated_arpu, dec("0.325"));
        assert!(m.target_achieved);
    }

    #[test]
    fn zero_active_users_yields_zero_ratios() {
        let m = KpiMetrics::compute(0, 400, &KpiSettings::default());
        assert_eq!(m.impressions_per_user, 0.0);
        assert_eq!(m.estimated_revenue, dec("2"));
        assert_eq!(m.estimated_arpu, Decimal::ZERO);
        assert!(!m.target_achieved);
    }

    #[test]
    fn target_boundary_is_inclusive() {
        let settings = KpiSettings::default();
        assert!(KpiMetrics::compute(2, 100, &settings).target_achieved);
        assert!(!KpiMetrics::compute(2, 99, &settings).target_achieved);
    }

    #[test]
    fn custom_settings_are_honoured() {
        let settings = KpiSettings {
            target_impressions_per_user: 10.0,
            revenue_per_impression: dec("0.01"),
        };
        let m = KpiMetrics::compute(4, 40, &settings);
        assert_eq!(m.impressions_per_user, 10.0);
        assert_eq!(m.estimated_revenue, dec("0.4"));
        assert_eq!(m.estimated_arpu, dec("0.1"));
        assert!(m.target_achieved);
    }

    #[test]
    fn negative_counts_are_clamped() {
        let m = KpiMetrics::compute(-3, -10, &KpiSettings::default());
        assert_eq!(m.active_users, 0);
        assert_eq!(m.total_impressions, 0);
        assert_eq!(m.estimated_revenue, Decimal::ZERO);
    }

    #[test]
    fn target_percentage_caps_and_rounds() {
        assert_eq!(target_percentage(0.0, 50.0), 0.0);
        assert_eq!(target_percentage(25.0, 50.0), 50.0);
        assert_eq!(target_percentage(65.0, 50.0), 100.0);
        assert_eq!(target_percentage(33.333, 50.0), 66.7);
    }

    #[test]
    fn ctr_special_cases_zero_impressions() {
        assert_eq!(click_through_rate(0, 0), 0.0);
        assert_eq!(click_through_rate(5, 0), 0.0);
        assert_eq!(click_through_rate(5, 200), 2.5);
    }

    #[test]
    fn ecpm_per_thousand() {
        assert_eq!(ecpm(dec("1.5"), 1000), dec("1.5"));
        assert_eq!(ecpm(dec("0.3"), 200), dec("1.5"));
        assert_eq!(ecpm(dec("3"), 0), Decimal::ZERO);
    }
}
