//! Pure numeric models driving progression.
//!
//! Every function here is side-effect free; the engine and settlement decide
//! when a result is applied to state.

pub mod capacity;
pub mod loot;
pub mod maintenance;
pub mod stamina;
pub mod valuation;
pub mod wear;

pub use capacity::{effective_capacity, raw_capacity, tiered_multiplier};
pub use loot::{LootModifiers, TierOdds, luck_gradient_bonus, tier_odds};
pub use maintenance::{clean_cost, expansion_cost, repair_cost};
pub use stamina::{movement_burn, weight_multiplier};
pub use valuation::{PayoutMode, estimated_value};
pub use wear::{contamination, durability_wear};
