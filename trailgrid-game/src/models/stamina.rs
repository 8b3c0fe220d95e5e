//! Stamina burn for travelled distance.
use crate::constants::STAMINA_BURN_PER_KM;

/// Load multiplier `1 + current/max`; an unusable capacity carries no penalty.
#[must_use]
pub fn weight_multiplier(current_weight_kg: f64, max_weight_kg: f64) -> f64 {
    if max_weight_kg <= 0.0 || !max_weight_kg.is_finite() {
        return 1.0;
    }
    1.0 + current_weight_kg.max(0.0) / max_weight_kg
}

/// Stamina consumed by moving `distance_km` while carrying `current_weight_kg`.
#[must_use]
pub fn movement_burn(distance_km: f64, current_weight_kg: f64, max_weight_kg: f64) -> f64 {
    if distance_km <= 0.0 {
        return 0.0;
    }
    distance_km * STAMINA_BURN_PER_KM * weight_multiplier(current_weight_kg, max_weight_kg)
}
