//! Centralized balance and tuning constants for Trailgrid progression logic.
//!
//! These values define the deterministic math for the core simulation.
//! Keeping them together ensures that gameplay can only be adjusted via
//! code changes reviewed in version control.

// Physical stats -----------------------------------------------------------
pub const STAT_MAX: f64 = 100.0;
pub const STAT_MIN: f64 = 0.0;

// Stamina ------------------------------------------------------------------
/// 100 m of travel costs one stamina point.
pub const STAMINA_BURN_PER_KM: f64 = 10.0;

// Durability wear ----------------------------------------------------------
pub const DURABILITY_WEAR_RATE: f64 = 0.1;
/// Sub-linear weight factor ("industrial reinforcement").
pub const DURABILITY_WEIGHT_FACTOR: f64 = 0.15;

// Capacity -----------------------------------------------------------------
pub const BASE_CAPACITY_KG: f64 = 10.0;
pub const EXPANSION_UNIT_KG: f64 = 2.0;
pub const TEMP_EXPANSION_FACTOR: f64 = 1.5;
/// Inputs at or above this value map to the flat top multiplier.
pub const TIERED_TOP_THRESHOLD: f64 = 90.0;
pub const TIERED_MIN_MULTIPLIER: f64 = 0.1;
pub const TIERED_MAX_MULTIPLIER: f64 = 1.0;

// Item tiers ---------------------------------------------------------------
pub const T1_WEIGHT_KG: f64 = 0.5;
pub const T1_VALUE: f64 = 10.0;
pub const T1_PICKUP_COST: f64 = 3.0;
pub const T1_RESTORE: f64 = 5.0;
pub const T1_CONTAMINATION: f64 = 0.2;

pub const T2_WEIGHT_KG: f64 = 1.5;
pub const T2_VALUE: f64 = 50.0;
pub const T2_PICKUP_COST: f64 = 9.0;
pub const T2_RESTORE: f64 = 15.0;
pub const T2_CONTAMINATION: f64 = 0.6;

pub const T3_WEIGHT_KG: f64 = 4.0;
pub const T3_VALUE: f64 = 500.0;
pub const T3_PICKUP_COST: f64 = 30.0;
pub const T3_RESTORE: f64 = 100.0;
pub const T3_CONTAMINATION: f64 = 1.0;

// Loot probabilities (percent) -----------------------------------------------
pub const LOOT_UNIT_KM: f64 = 0.1;
pub const BASE_T1_PCT: f64 = 85.0;
pub const BASE_T2_PCT: f64 = 14.0;
pub const BASE_T3_PCT: f64 = 1.0;
pub const LUCK_STREAK_CAP_DAYS: u32 = 30;
pub const LUCK_MAX_BONUS_PCT: f64 = 15.0;
pub const PATHFINDER_BONUS_PCT: f64 = 10.0;
pub const DEEP_ZONE_KM: f64 = 10.0;
pub const DEEP_ZONE_T3_FACTOR: f64 = 2.0;

// Economy ------------------------------------------------------------------
pub const KM_PER_CURRENCY_UNIT: f64 = 50.0;
pub const PAYOUT_NORMAL: f64 = 1.0;
pub const PAYOUT_ASSISTED: f64 = 2.0;
pub const PAYOUT_PREMIUM: f64 = 10.0;
pub const CLEAN_COST_PER_POINT: f64 = 2.0;
pub const REPAIR_TAX_PER_POINT: f64 = 5.0;
pub const EXPANSION_GROWTH_MIN_KG: f64 = 20.0;
pub const EXPANSION_MASTER_MIN_KG: f64 = 30.0;
pub const EXPANSION_BEGINNER_PRICE: f64 = 100.0;
pub const EXPANSION_GROWTH_PRICE: f64 = 500.0;
pub const EXPANSION_MASTER_PRICE: f64 = 1000.0;

// Position filter ------------------------------------------------------------
pub const FILTER_MAX_ACCURACY_M: f64 = 20.0;
pub const FILTER_DRIFT_SPEED_MPS: f64 = 15.0;
pub const FILTER_DRIFT_DISTANCE_M: f64 = 30.0;
pub const FILTER_IMPOSSIBLE_SPEED_MPS: f64 = 25.0;
/// Below the ~25 m cell edge, so a rejected sample can never skip a cell.
pub const FILTER_NOISE_FLOOR_M: f64 = 2.0;

// Grid & exploration ---------------------------------------------------------
pub const CELL_EDGE_M: f64 = 25.0;
pub const EARTH_RADIUS_M: f64 = 6_371_008.8;
pub const PATH_CAP_CELLS: usize = 20;
pub const GRAY_ZONE_DAYS: u32 = 7;
pub const MS_PER_DAY: i64 = 86_400_000;

// Rescue ---------------------------------------------------------------------
pub const RESCUE_STAMINA_RESTORE: f64 = 30.0;
pub const RESCUE_STAMINA_CAP: u8 = 5;
pub const RESCUE_CAPACITY_CAP: u8 = 3;
pub const RESCUE_REVIVAL_CAP: u8 = 1;
pub const RESCUE_REVIVAL_RESTORE: f64 = 30.0;
pub const RESCUE_REVIVAL_MIN_DAILY_KM: f64 = 1.0;
pub const RESCUE_UNLOCK_FIRST_KM: f64 = 1.0;
pub const RESCUE_UNLOCK_SECOND_KM: f64 = 2.0;

// Persistence keys -----------------------------------------------------------
pub const KEY_EXPLORED: &str = "trailgrid/explored";
pub const KEY_PENDING_ENCOUNTER: &str = "trailgrid/pending_encounter";
pub const KEY_STATE: &str = "trailgrid/state";
pub const KEY_TRIPS: &str = "trailgrid/trips";

// Float tolerance for unit accumulation.
pub(crate) const DISTANCE_EPSILON: f64 = 1e-9;
