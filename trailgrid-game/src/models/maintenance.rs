//! Station pricing: cleaning, repair and permanent capacity expansion.
use crate::constants::{
    BASE_CAPACITY_KG, CLEAN_COST_PER_POINT, EXPANSION_BEGINNER_PRICE, EXPANSION_GROWTH_MIN_KG,
    EXPANSION_GROWTH_PRICE, EXPANSION_MASTER_MIN_KG, EXPANSION_MASTER_PRICE, EXPANSION_UNIT_KG,
    REPAIR_TAX_PER_POINT, STAT_MAX,
};
use crate::numbers::floor_f64_to_u32;

/// Cost to restore hygiene to full.
#[must_use]
pub fn clean_cost(hygiene: f64) -> f64 {
    (STAT_MAX - hygiene.clamp(0.0, STAT_MAX)) * CLEAN_COST_PER_POINT
}

/// Heavy-duty repair price; larger frames pay proportionally more per point.
#[must_use]
pub fn repair_cost(base_capacity_kg: f64, points: f64) -> f64 {
    if points <= 0.0 {
        return 0.0;
    }
    let multiplier = 1.0 + (base_capacity_kg - BASE_CAPACITY_KG) / BASE_CAPACITY_KG;
    REPAIR_TAX_PER_POINT * multiplier * points
}

fn unit_price(capacity_kg: f64) -> f64 {
    if capacity_kg >= EXPANSION_MASTER_MIN_KG {
        EXPANSION_MASTER_PRICE
    } else if capacity_kg >= EXPANSION_GROWTH_MIN_KG {
        EXPANSION_GROWTH_PRICE
    } else {
        EXPANSION_BEGINNER_PRICE
    }
}

fn bracket_ceiling(capacity_kg: f64) -> Option<f64> {
    if capacity_kg < EXPANSION_GROWTH_MIN_KG {
        Some(EXPANSION_GROWTH_MIN_KG)
    } else if capacity_kg < EXPANSION_MASTER_MIN_KG {
        Some(EXPANSION_MASTER_MIN_KG)
    } else {
        None
    }
}

/// Price of `units` expansion units starting at `capacity_kg`, walking price brackets.
#[must_use]
pub fn expansion_cost(capacity_kg: f64, units: u32) -> f64 {
    let mut total = 0.0;
    let mut remaining = units;
    let mut current = capacity_kg;
    while remaining > 0 {
        let in_bracket = bracket_ceiling(current).map_or(remaining, |ceiling| {
            let span = ((ceiling - current) / EXPANSION_UNIT_KG).ceil();
            floor_f64_to_u32(span).clamp(1, remaining)
        });
        total += unit_price(current) * f64::from(in_bracket);
        current += f64::from(in_bracket) * EXPANSION_UNIT_KG;
        remaining -= in_bracket;
    }
    total
}
