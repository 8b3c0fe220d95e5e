//! Durability wear and hygiene contamination.
use crate::constants::{DURABILITY_WEAR_RATE, DURABILITY_WEIGHT_FACTOR};
use crate::item::Tier;

/// Durability points worn by one movement tick.
#[must_use]
pub fn durability_wear(distance_km: f64, current_weight_kg: f64) -> f64 {
    if distance_km <= 0.0 {
        return 0.0;
    }
    distance_km * (1.0 + current_weight_kg.max(0.0) * DURABILITY_WEIGHT_FACTOR) * DURABILITY_WEAR_RATE
}

/// Hygiene points charged by a single pickup.
#[must_use]
pub const fn contamination(tier: Tier) -> f64 {
    tier.contamination()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn wear_scales_sub_linearly_with_weight() {
        assert!((durability_wear(1.0, 0.0) - 0.1).abs() < 1e-12);
        assert!((durability_wear(1.0, 10.0) - 0.25).abs() < 1e-12);
        assert!((durability_wear(2.0, 10.0) - 0.5).abs() < 1e-12);
        assert!(durability_wear(0.0, 10.0).abs() < f64::EPSILON);
    }

    #[test]
    fn contamination_follows_tier_table() {
        assert!((contamination(Tier::Common) - 0.2).abs() < f64::EPSILON);
        assert!((contamination(Tier::Uncommon) - 0.6).abs() < f64::EPSILON);
        assert!((contamination(Tier::Rare) - 1.0).abs() < f64::EPSILON);
    }
}
