//! Owned player, trip and wallet state.
//!
//! Durability and hygiene on [`PlayerPhysicalState`] only move at settlement or at
//! a station. During a trip, wear and contamination accrue as debt on
//! [`TripState`]; that debt is never reduced by anything the player carries later.
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::constants::{BASE_CAPACITY_KG, STAT_MAX, STAT_MIN};
use crate::engine::rescue::{PendingEncounter, RescueKind};
use crate::item::Inventory;
use crate::models::capacity::effective_capacity;
use crate::models::valuation::estimated_value;
use crate::numbers::clamp_stat;

/// Terminal-ish flags derived from stats.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct StatusFlags {
    pub ghost: bool,
    pub immobilized: bool,
}

/// Physical condition of the player.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PlayerPhysicalState {
    #[serde(default = "PlayerPhysicalState::default_stat")]
    stamina: f64,
    #[serde(default = "PlayerPhysicalState::default_stat")]
    durability: f64,
    #[serde(default = "PlayerPhysicalState::default_stat")]
    hygiene: f64,
    #[serde(default = "PlayerPhysicalState::default_base_capacity")]
    base_capacity_kg: f64,
    #[serde(default)]
    current_weight_kg: f64,
    #[serde(default = "PlayerPhysicalState::default_base_capacity")]
    max_weight_kg: f64,
    /// Capacity rescue active until the next settlement.
    #[serde(default)]
    temp_expansion: bool,
    #[serde(default)]
    flags: StatusFlags,
}

impl Default for PlayerPhysicalState {
    fn default() -> Self {
        Self::with_stats(STAT_MAX, STAT_MAX, STAT_MAX)
    }
}

impl PlayerPhysicalState {
    const fn default_stat() -> f64 {
        STAT_MAX
    }

    const fn default_base_capacity() -> f64 {
        BASE_CAPACITY_KG
    }

    /// Build a player with explicit stats, clamped into range.
    #[must_use]
    pub fn with_stats(stamina: f64, durability: f64, hygiene: f64) -> Self {
        let mut player = Self {
            stamina: clamp_stat(stamina, STAT_MIN, STAT_MAX),
            durability: clamp_stat(durability, STAT_MIN, STAT_MAX),
            hygiene: clamp_stat(hygiene, STAT_MIN, STAT_MAX),
            base_capacity_kg: BASE_CAPACITY_KG,
            current_weight_kg: 0.0,
            max_weight_kg: BASE_CAPACITY_KG,
            temp_expansion: false,
            flags: StatusFlags::default(),
        };
        player.refresh();
        player
    }

    #[must_use]
    pub const fn stamina(&self) -> f64 {
        self.stamina
    }

    #[must_use]
    pub const fn durability(&self) -> f64 {
        self.durability
    }

    #[must_use]
    pub const fn hygiene(&self) -> f64 {
        self.hygiene
    }

    #[must_use]
    pub const fn base_capacity_kg(&self) -> f64 {
        self.base_capacity_kg
    }

    #[must_use]
    pub const fn current_weight_kg(&self) -> f64 {
        self.current_weight_kg
    }

    /// Effective carry limit.
    #[must_use]
    pub const fn max_weight_kg(&self) -> f64 {
        self.max_weight_kg
    }

    #[must_use]
    pub const fn temp_expansion(&self) -> bool {
        self.temp_expansion
    }

    #[must_use]
    pub const fn flags(&self) -> StatusFlags {
        self.flags
    }

    #[must_use]
    pub const fn is_ghost(&self) -> bool {
        self.flags.ghost
    }

    #[must_use]
    pub const fn is_immobilized(&self) -> bool {
        self.flags.immobilized
    }

    /// Apply a signed stamina delta, clamped to `[0, 100]`.
    pub fn adjust_stamina(&mut self, delta: f64) {
        if !delta.is_finite() {
            log::warn!("ignoring non-finite stamina delta {delta}");
            return;
        }
        self.stamina = clamp_stat(self.stamina + delta, STAT_MIN, STAT_MAX);
        self.refresh();
    }

    /// Reduce durability, clamping at zero.
    pub fn apply_durability_loss(&mut self, amount: f64) {
        if amount <= 0.0 || !amount.is_finite() {
            return;
        }
        self.durability = clamp_stat(self.durability - amount, STAT_MIN, STAT_MAX);
        self.refresh();
    }

    /// Restore durability, clamping to max.
    pub fn restore_durability(&mut self, amount: f64) {
        if amount <= 0.0 || !amount.is_finite() {
            return;
        }
        self.durability = clamp_stat(self.durability + amount, STAT_MIN, STAT_MAX);
        self.refresh();
    }

    pub fn apply_hygiene_loss(&mut self, amount: f64) {
        if amount <= 0.0 || !amount.is_finite() {
            return;
        }
        self.hygiene = clamp_stat(self.hygiene - amount, STAT_MIN, STAT_MAX);
    }

    pub fn restore_hygiene(&mut self, amount: f64) {
        if amount <= 0.0 || !amount.is_finite() {
            return;
        }
        self.hygiene = clamp_stat(self.hygiene + amount, STAT_MIN, STAT_MAX);
    }

    pub fn set_temp_expansion(&mut self, active: bool) {
        self.temp_expansion = active;
        self.refresh();
    }

    /// Grow the permanent frame.
    pub fn expand_base_capacity(&mut self, kg: f64) {
        if kg <= 0.0 || !kg.is_finite() {
            return;
        }
        self.base_capacity_kg += kg;
        self.refresh();
    }

    pub fn set_current_weight(&mut self, kg: f64) {
        self.current_weight_kg = if kg.is_finite() { kg.max(0.0) } else { 0.0 };
    }

    /// Recompute capacity and flags from stats. Called at every mutation site.
    fn refresh(&mut self) {
        self.max_weight_kg =
            effective_capacity(self.base_capacity_kg, self.durability, self.temp_expansion);
        self.flags = StatusFlags {
            ghost: self.stamina <= STAT_MIN,
            immobilized: self.durability <= STAT_MIN,
        };
    }
}

#[derive(Debug, Error, Clone, PartialEq)]
#[error("balance {balance:.2} cannot cover {cost:.2}")]
pub struct InsufficientFunds {
    pub balance: f64,
    pub cost: f64,
}

/// Currency balance.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct Wallet {
    #[serde(default)]
    balance: f64,
}

impl Wallet {
    #[must_use]
    pub const fn with_balance(balance: f64) -> Self {
        Self { balance }
    }

    #[must_use]
    pub const fn balance(&self) -> f64 {
        self.balance
    }

    pub fn credit(&mut self, amount: f64) {
        if amount > 0.0 && amount.is_finite() {
            self.balance += amount;
        }
    }

    /// Withdraw `cost`.
    ///
    /// # Errors
    ///
    /// Returns `InsufficientFunds` and leaves the balance untouched when it cannot cover `cost`.
    pub fn debit(&mut self, cost: f64) -> Result<(), InsufficientFunds> {
        if cost > self.balance {
            return Err(InsufficientFunds {
                balance: self.balance,
                cost,
            });
        }
        if cost > 0.0 {
            self.balance -= cost;
        }
        Ok(())
    }
}

/// Consecutive active-day streak feeding the luck gradient.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct LuckRecord {
    #[serde(default)]
    pub streak: u32,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub last_active_day: Option<u32>,
}

impl LuckRecord {
    /// Record activity on `day` (days since epoch).
    pub fn record_day(&mut self, day: u32) {
        self.streak = match self.last_active_day {
            Some(last) if last == day => self.streak,
            Some(last) if last.checked_add(1) == Some(day) => self.streak.saturating_add(1),
            _ => 1,
        };
        self.last_active_day = Some(day);
    }
}

/// Per-day counters for distance and rescue usage.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct DailyCounters {
    #[serde(default)]
    pub day: u32,
    #[serde(default)]
    pub distance_km: f64,
    #[serde(default)]
    pub stamina_rescues: u8,
    #[serde(default)]
    pub capacity_rescues: u8,
    #[serde(default)]
    pub revivals: u8,
}

impl DailyCounters {
    /// Reset counters when `day` differs from the tracked day.
    pub fn roll_to(&mut self, day: u32) {
        if self.day != day {
            *self = Self {
                day,
                ..Self::default()
            };
        }
    }

    #[must_use]
    pub const fn used(&self, kind: RescueKind) -> u8 {
        match kind {
            RescueKind::Stamina => self.stamina_rescues,
            RescueKind::Capacity => self.capacity_rescues,
            RescueKind::Revival => self.revivals,
        }
    }

    pub fn record_use(&mut self, kind: RescueKind) {
        let slot = match kind {
            RescueKind::Stamina => &mut self.stamina_rescues,
            RescueKind::Capacity => &mut self.capacity_rescues,
            RescueKind::Revival => &mut self.revivals,
        };
        *slot = slot.saturating_add(1);
    }
}

/// Accumulators for the current trip and the span since the last settlement.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct TripState {
    /// Distance since the last settlement; drives valuation.
    #[serde(default)]
    pub total_distance_km: f64,
    /// Distance since the trip started; drives the deep zone.
    #[serde(default)]
    pub trip_distance_km: f64,
    /// Sub-unit carry-over awaiting loot rolls.
    #[serde(default)]
    pub pending_distance_km: f64,
    #[serde(default)]
    pub durability_debt: f64,
    /// Charged at pickup time and locked in; consumed cargo does not refund it.
    #[serde(default)]
    pub hygiene_debt: f64,
    #[serde(default)]
    pub luck: LuckRecord,
    #[serde(default)]
    pub pathfinder: bool,
    #[serde(default)]
    pub daily: DailyCounters,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub last_movement_ms: Option<i64>,
    #[serde(default)]
    pub movement_ticks: u64,
    #[serde(default)]
    pub loot_rolls: u64,
}

impl TripState {
    /// Estimated monetary value of distance since the last settlement.
    #[must_use]
    pub fn estimated_value(&self) -> f64 {
        estimated_value(self.total_distance_km)
    }

    /// Clear settlement-scoped accumulators.
    pub fn reset_after_settlement(&mut self) {
        self.total_distance_km = 0.0;
        self.durability_debt = 0.0;
        self.hygiene_debt = 0.0;
    }

    /// Clear trip-scoped accumulators.
    pub fn reset_for_new_trip(&mut self) {
        self.trip_distance_km = 0.0;
        self.pending_distance_km = 0.0;
        self.pathfinder = false;
        self.last_movement_ms = None;
    }
}

/// Everything the engine mutates per validated movement.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct GameState {
    #[serde(default)]
    pub player: PlayerPhysicalState,
    #[serde(default)]
    pub trip: TripState,
    #[serde(default)]
    pub inventory: Inventory,
    #[serde(default)]
    pub wallet: Wallet,
    /// Mirrored to its own persistence key on every change.
    #[serde(skip)]
    pub pending: Option<PendingEncounter>,
}

impl GameState {
    /// Recompute carried weight from the inventory.
    pub fn sync_weight(&mut self) {
        let weight = self.inventory.total_weight();
        self.player.set_current_weight(weight);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn stamina_clamps_and_toggles_ghost() {
        let mut player = PlayerPhysicalState::default();
        player.adjust_stamina(-250.0);
        assert!(player.stamina().abs() < f64::EPSILON);
        assert!(player.is_ghost());
        player.adjust_stamina(500.0);
        assert!((player.stamina() - 100.0).abs() < f64::EPSILON);
        assert!(!player.is_ghost());
        player.adjust_stamina(f64::NAN);
        assert!((player.stamina() - 100.0).abs() < f64::EPSILON);
    }

    #[test]
    fn zero_durability_immobilizes_and_repair_clears() {
        let mut player = PlayerPhysicalState::default();
        player.apply_durability_loss(120.0);
        assert!(player.durability().abs() < f64::EPSILON);
        assert!(player.max_weight_kg().abs() < f64::EPSILON);
        assert!(player.is_immobilized());
        player.restore_durability(30.0);
        assert!(!player.is_immobilized());
        assert!((player.max_weight_kg() - 4.0).abs() < 1e-9);
    }

    #[test]
    fn with_stats_clamps_inputs() {
        let player = PlayerPhysicalState::with_stats(-4.0, 140.0, f64::NAN);
        assert!(player.stamina().abs() < f64::EPSILON);
        assert!((player.durability() - 100.0).abs() < f64::EPSILON);
        assert!(player.hygiene().abs() < f64::EPSILON);
        assert!(player.is_ghost());
    }

    #[test]
    fn wallet_debit_is_all_or_nothing() {
        let mut wallet = Wallet::with_balance(40.0);
        assert!(wallet.debit(50.0).is_err());
        assert!((wallet.balance() - 40.0).abs() < f64::EPSILON);
        wallet.debit(15.0).unwrap();
        wallet.credit(5.0);
        assert!((wallet.balance() - 30.0).abs() < f64::EPSILON);
    }

    #[test]
    fn luck_streak_tracks_consecutive_days() {
        let mut luck = LuckRecord::default();
        luck.record_day(10);
        luck.record_day(11);
        luck.record_day(11);
        luck.record_day(12);
        assert_eq!(luck.streak, 3);
        luck.record_day(20);
        assert_eq!(luck.streak, 1);
    }

    #[test]
    fn daily_counters_roll_over() {
        let mut daily = DailyCounters::default();
        daily.roll_to(3);
        daily.record_use(RescueKind::Stamina);
        daily.distance_km = 4.0;
        daily.roll_to(3);
        assert_eq!(daily.used(RescueKind::Stamina), 1);
        daily.roll_to(4);
        assert_eq!(daily.used(RescueKind::Stamina), 0);
        assert!(daily.distance_km.abs() < f64::EPSILON);
    }

    #[test]
    fn settlement_reset_keeps_trip_distance() {
        let mut trip = TripState {
            total_distance_km: 50.0,
            trip_distance_km: 12.0,
            durability_debt: 3.0,
            hygiene_debt: 1.2,
            ..TripState::default()
        };
        assert!((trip.estimated_value() - 1.0).abs() < 1e-12);
        trip.reset_after_settlement();
        assert!(trip.total_distance_km.abs() < f64::EPSILON);
        assert!(trip.durability_debt.abs() < f64::EPSILON);
        assert!((trip.trip_distance_km - 12.0).abs() < f64::EPSILON);
    }
}
