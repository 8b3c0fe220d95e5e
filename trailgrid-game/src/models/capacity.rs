//! Capacity and the decile-stepped quality multiplier.
use crate::constants::{
    STAT_MAX, TEMP_EXPANSION_FACTOR, TIERED_MAX_MULTIPLIER, TIERED_MIN_MULTIPLIER,
    TIERED_TOP_THRESHOLD,
};
use crate::numbers::floor_f64_to_u32;

/// Map a 0-100 condition onto deciles 0.1..=1.0, flattening 90-100 to 1.0.
#[must_use]
pub fn tiered_multiplier(value: f64) -> f64 {
    if value.is_nan() {
        return TIERED_MIN_MULTIPLIER;
    }
    let value = value.clamp(0.0, STAT_MAX);
    if value >= TIERED_TOP_THRESHOLD {
        return TIERED_MAX_MULTIPLIER;
    }
    let decile = floor_f64_to_u32(value / 10.0) + 1;
    (f64::from(decile) / 10.0).clamp(TIERED_MIN_MULTIPLIER, TIERED_MAX_MULTIPLIER)
}

/// Linear capacity `base × durability/100`.
#[must_use]
pub fn raw_capacity(base_kg: f64, durability: f64) -> f64 {
    (base_kg.max(0.0) * durability.clamp(0.0, STAT_MAX) / STAT_MAX).max(0.0)
}

/// Usable capacity.
///
/// Zero durability forces zero capacity. Otherwise the base (optionally under a
/// temporary expansion) is scaled by the tiered multiplier, which caps any worn
/// state below 90 durability at 90% of base while ignoring small wear.
#[must_use]
pub fn effective_capacity(base_kg: f64, durability: f64, temp_expansion: bool) -> f64 {
    if durability <= 0.0 || durability.is_nan() {
        return 0.0;
    }
    let expanded = if temp_expansion {
        base_kg * TEMP_EXPANSION_FACTOR
    } else {
        base_kg
    };
    (expanded * tiered_multiplier(durability)).max(0.0)
}
