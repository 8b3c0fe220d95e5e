//! Loot-tier probability model.
use rand::Rng;
use serde::{Deserialize, Serialize};

use crate::constants::{
    BASE_T1_PCT, BASE_T2_PCT, BASE_T3_PCT, DEEP_ZONE_T3_FACTOR, LUCK_MAX_BONUS_PCT,
    LUCK_STREAK_CAP_DAYS, PATHFINDER_BONUS_PCT,
};
use crate::item::Tier;
use crate::numbers::round_to;

/// Conditions that shift the base 85/14/1 distribution.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct LootModifiers {
    /// Consecutive active days.
    pub streak_days: u32,
    /// Current cell is unexplored or stale.
    pub pathfinder: bool,
    /// Per-trip distance reached the deep zone.
    pub deep_zone: bool,
}

/// Per-tier drop chances in percent.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct TierOdds {
    pub common: f64,
    pub uncommon: f64,
    pub rare: f64,
}

impl TierOdds {
    /// Select a tier for a roll in `[0, 100)`.
    #[must_use]
    pub fn pick(&self, roll_pct: f64) -> Tier {
        if roll_pct < self.common {
            Tier::Common
        } else if roll_pct < self.common + self.uncommon {
            Tier::Uncommon
        } else {
            Tier::Rare
        }
    }

    /// Draw a tier from `rng`.
    pub fn roll<R: Rng + ?Sized>(&self, rng: &mut R) -> Tier {
        let roll = rng.r#gen::<f64>() * 100.0;
        self.pick(roll)
    }
}

/// Uncommon-tier bonus for a login streak, +0.5 points per day up to 30 days.
#[must_use]
pub fn luck_gradient_bonus(streak_days: u32) -> f64 {
    let capped = streak_days.min(LUCK_STREAK_CAP_DAYS);
    round_to(
        f64::from(capped) / f64::from(LUCK_STREAK_CAP_DAYS) * LUCK_MAX_BONUS_PCT,
        2,
    )
}

/// Resolve the modified distribution. Common takes the remainder.
#[must_use]
pub fn tier_odds(mods: LootModifiers) -> TierOdds {
    let mut uncommon = BASE_T2_PCT + luck_gradient_bonus(mods.streak_days);
    if mods.pathfinder {
        uncommon += PATHFINDER_BONUS_PCT;
    }
    let mut rare = BASE_T3_PCT;
    if mods.deep_zone {
        rare *= DEEP_ZONE_T3_FACTOR;
    }
    let uncommon = uncommon.clamp(0.0, 100.0);
    let rare = rare.clamp(0.0, 100.0);
    let common = (100.0 - uncommon - rare).clamp(0.0, 100.0);
    debug_assert!(common <= BASE_T1_PCT + f64::EPSILON);
    TierOdds {
        common,
        uncommon,
        rare,
    }
}
