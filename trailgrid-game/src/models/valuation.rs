//! Distance valuation and settlement payout modes.
use serde::{Deserialize, Serialize};

use crate::constants::{KM_PER_CURRENCY_UNIT, PAYOUT_ASSISTED, PAYOUT_NORMAL, PAYOUT_PREMIUM};

/// Monetary estimate for cumulative distance: 50 km is worth one unit.
#[must_use]
pub fn estimated_value(cumulative_km: f64) -> f64 {
    if cumulative_km <= 0.0 || !cumulative_km.is_finite() {
        return 0.0;
    }
    cumulative_km / KM_PER_CURRENCY_UNIT
}

/// Payout mode chosen when unloading.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PayoutMode {
    Normal,
    /// Requires an external reward grant.
    Assisted,
    /// Requires external verification.
    Premium,
}

impl PayoutMode {
    #[must_use]
    pub const fn multiplier(self) -> f64 {
        match self {
            Self::Normal => PAYOUT_NORMAL,
            Self::Assisted => PAYOUT_ASSISTED,
            Self::Premium => PAYOUT_PREMIUM,
        }
    }

    #[must_use]
    pub const fn requires_grant(self) -> bool {
        !matches!(self, Self::Normal)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn fifty_km_is_one_unit() {
        assert!((estimated_value(50.0) - 1.0).abs() < 1e-12);
        assert!((estimated_value(12.5) - 0.25).abs() < 1e-12);
        assert!(estimated_value(-3.0).abs() < f64::EPSILON);
    }

    #[test]
    fn payout_multipliers() {
        assert!((PayoutMode::Normal.multiplier() - 1.0).abs() < f64::EPSILON);
        assert!((PayoutMode::Assisted.multiplier() - 2.0).abs() < f64::EPSILON);
        assert!((PayoutMode::Premium.multiplier() - 10.0).abs() < f64::EPSILON);
        assert!(!PayoutMode::Normal.requires_grant());
        assert!(PayoutMode::Premium.requires_grant());
    }
}
