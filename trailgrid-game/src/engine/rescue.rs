//! Rescue encounters and the reward-grant protocol.
//!
//! A pending encounter suspends loot rolls until the player either earns a grant
//! from the reward collaborator or abandons the item. Nothing here times out.
use serde::{Deserialize, Serialize};
use std::convert::Infallible;
use thiserror::Error;

use crate::constants::{
    RESCUE_CAPACITY_CAP, RESCUE_REVIVAL_CAP, RESCUE_REVIVAL_MIN_DAILY_KM, RESCUE_REVIVAL_RESTORE,
    RESCUE_STAMINA_CAP, RESCUE_STAMINA_RESTORE, RESCUE_UNLOCK_FIRST_KM, RESCUE_UNLOCK_SECOND_KM,
    STAT_MAX,
};
use crate::engine::event::{EventKind, EventRecorder};
use crate::engine::loot::{LootRoll, place_item};
use crate::engine::{EngineConfigError, EventBatch, ProgressionEngine};
use crate::item::InventoryItem;
use crate::models::valuation::PayoutMode;
use crate::state::GameState;

/// Kind of rescue the reward collaborator can grant.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RescueKind {
    /// Adrenaline: flat stamina restore.
    Stamina,
    /// Temporary capacity expansion until the next settlement.
    Capacity,
    /// Ghost revival.
    Revival,
}

impl RescueKind {
    #[must_use]
    pub const fn label(self) -> &'static str {
        match self {
            Self::Stamina => "stamina",
            Self::Capacity => "capacity",
            Self::Revival => "revival",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EncounterStatus {
    AwaitingReward,
    /// A grant was applied but the pickup still could not complete.
    GrantApplied,
}

/// Item waiting on a rescue. Must survive a restart.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PendingEncounter {
    pub item: InventoryItem,
    pub status: EncounterStatus,
    pub created_at_ms: i64,
    #[serde(default)]
    pub attempts: u32,
}

impl PendingEncounter {
    #[must_use]
    pub const fn new(item: InventoryItem, created_at_ms: i64) -> Self {
        Self {
            item,
            status: EncounterStatus::AwaitingReward,
            created_at_ms,
            attempts: 0,
        }
    }
}

/// What the core asks the reward collaborator for.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "request", content = "kind", rename_all = "snake_case")]
pub enum RewardRequest {
    Rescue(RescueKind),
    Settlement(PayoutMode),
}

/// External reward-granting collaborator (an ad view or a verification step).
///
/// `Ok(false)` means the player declined or the reward was not earned; `Err` means the
/// collaborator itself failed and the call may be retried.
pub trait RewardGrant {
    type Error: std::error::Error + Send + Sync + 'static;

    /// # Errors
    ///
    /// Returns the collaborator's error when the grant could not be attempted.
    fn grant(&mut self, request: &RewardRequest) -> Result<bool, Self::Error>;
}

impl<F> RewardGrant for F
where
    F: FnMut(&RewardRequest) -> bool,
{
    type Error = Infallible;

    fn grant(&mut self, request: &RewardRequest) -> Result<bool, Self::Error> {
        Ok(self(request))
    }
}

#[derive(Debug, Error)]
pub enum RescueError {
    #[error("no rescue encounter is pending")]
    NoPendingEncounter,
    #[error("{} rescues cannot resolve a pending pickup", .0.label())]
    UnsupportedKind(RescueKind),
    #[error("daily {} rescue cap of {cap} reached", .kind.label())]
    CapReached { kind: RescueKind, cap: u8 },
    #[error("{} rescue needs {required_km:.1} km today (have {daily_km:.2})", .kind.label())]
    ThresholdNotMet {
        kind: RescueKind,
        required_km: f64,
        daily_km: f64,
    },
    #[error("reward was not granted")]
    Declined,
    #[error("player is not a ghost")]
    NotGhost,
    #[error("temporary capacity expansion is already active")]
    AlreadyExpanded,
    #[error("reward collaborator failed: {0}")]
    Collaborator(#[source] Box<dyn std::error::Error + Send + Sync>),
}

impl RescueError {
    /// Collaborator failures leave the encounter intact and may be retried.
    #[must_use]
    pub const fn is_retryable(&self) -> bool {
        matches!(self, Self::Collaborator(_))
    }
}

/// Rescue tuning.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RescueCfg {
    #[serde(default = "RescueCfg::default_stamina_restore")]
    pub stamina_restore: f64,
    #[serde(default = "RescueCfg::default_stamina_cap")]
    pub stamina_cap: u8,
    #[serde(default = "RescueCfg::default_capacity_cap")]
    pub capacity_cap: u8,
    #[serde(default = "RescueCfg::default_revival_cap")]
    pub revival_cap: u8,
    #[serde(default = "RescueCfg::default_revival_restore")]
    pub revival_restore: f64,
    #[serde(default = "RescueCfg::default_revival_min_daily_km")]
    pub revival_min_daily_km: f64,
    #[serde(default = "RescueCfg::default_unlock_first_km")]
    pub unlock_first_km: f64,
    #[serde(default = "RescueCfg::default_unlock_second_km")]
    pub unlock_second_km: f64,
}

impl Default for RescueCfg {
    fn default() -> Self {
        Self {
            stamina_restore: Self::default_stamina_restore(),
            stamina_cap: Self::default_stamina_cap(),
            capacity_cap: Self::default_capacity_cap(),
            revival_cap: Self::default_revival_cap(),
            revival_restore: Self::default_revival_restore(),
            revival_min_daily_km: Self::default_revival_min_daily_km(),
            unlock_first_km: Self::default_unlock_first_km(),
            unlock_second_km: Self::default_unlock_second_km(),
        }
    }
}

impl RescueCfg {
    const fn default_stamina_restore() -> f64 {
        RESCUE_STAMINA_RESTORE
    }

    const fn default_stamina_cap() -> u8 {
        RESCUE_STAMINA_CAP
    }

    const fn default_capacity_cap() -> u8 {
        RESCUE_CAPACITY_CAP
    }

    const fn default_revival_cap() -> u8 {
        RESCUE_REVIVAL_CAP
    }

    const fn default_revival_restore() -> f64 {
        RESCUE_REVIVAL_RESTORE
    }

    const fn default_revival_min_daily_km() -> f64 {
        RESCUE_REVIVAL_MIN_DAILY_KM
    }

    const fn default_unlock_first_km() -> f64 {
        RESCUE_UNLOCK_FIRST_KM
    }

    const fn default_unlock_second_km() -> f64 {
        RESCUE_UNLOCK_SECOND_KM
    }

    #[must_use]
    pub const fn cap(&self, kind: RescueKind) -> u8 {
        match kind {
            RescueKind::Stamina => self.stamina_cap,
            RescueKind::Capacity => self.capacity_cap,
            RescueKind::Revival => self.revival_cap,
        }
    }

    /// Daily distance required before the next use, given uses so far today.
    #[must_use]
    pub fn unlock_km(&self, kind: RescueKind, used: u8) -> Option<f64> {
        if kind == RescueKind::Revival {
            return Some(self.revival_min_daily_km);
        }
        match used {
            0 => Some(self.unlock_first_km),
            1 => Some(self.unlock_second_km),
            _ => None,
        }
    }

    /// # Errors
    ///
    /// Returns `EngineConfigError` when restores fall outside `(0, 100]` or unlocks are unordered.
    pub fn validate(&self) -> Result<(), EngineConfigError> {
        for (field, value) in [
            ("rescue.stamina_restore", self.stamina_restore),
            ("rescue.revival_restore", self.revival_restore),
        ] {
            if !(value > 0.0 && value <= STAT_MAX) {
                return Err(EngineConfigError::RangeViolation {
                    field,
                    min: 0.0,
                    max: STAT_MAX,
                    value,
                });
            }
        }
        if self.unlock_first_km.is_nan() || self.unlock_first_km < 0.0 {
            return Err(EngineConfigError::MinViolation {
                field: "rescue.unlock_first_km",
                min: 0.0,
                value: self.unlock_first_km,
            });
        }
        if self.unlock_second_km.is_nan() || self.unlock_second_km < self.unlock_first_km {
            return Err(EngineConfigError::MinViolation {
                field: "rescue.unlock_second_km",
                min: self.unlock_first_km,
                value: self.unlock_second_km,
            });
        }
        Ok(())
    }

    pub fn sanitize(&mut self) {
        if !self.stamina_restore.is_finite() {
            self.stamina_restore = Self::default_stamina_restore();
        }
        if !self.revival_restore.is_finite() {
            self.revival_restore = Self::default_revival_restore();
        }
        if !self.revival_min_daily_km.is_finite() {
            self.revival_min_daily_km = Self::default_revival_min_daily_km();
        }
        if !self.unlock_first_km.is_finite() {
            self.unlock_first_km = Self::default_unlock_first_km();
        }
        if !self.unlock_second_km.is_finite() {
            self.unlock_second_km = Self::default_unlock_second_km();
        }
    }
}

/// How a rescue call ended.
#[derive(Debug, Clone, PartialEq)]
pub enum RescueResolution {
    /// Grant applied and the pending item is now carried.
    PickedUp(InventoryItem),
    /// Grant applied but the pickup still cannot complete.
    StillPending,
    Abandoned(InventoryItem),
    Revived,
    CapacityExpanded,
}

#[derive(Debug, Clone, PartialEq)]
pub struct RescueOutcome {
    pub resolution: RescueResolution,
    pub events: EventBatch,
}

impl ProgressionEngine {
    fn check_allowance(&self, state: &GameState, kind: RescueKind) -> Result<(), RescueError> {
        let cfg = &self.cfg.rescue;
        let used = state.trip.daily.used(kind);
        let cap = cfg.cap(kind);
        if used >= cap {
            return Err(RescueError::CapReached { kind, cap });
        }
        let daily_km = state.trip.daily.distance_km;
        if let Some(required_km) = cfg.unlock_km(kind, used)
            && daily_km <= required_km
        {
            return Err(RescueError::ThresholdNotMet {
                kind,
                required_km,
                daily_km,
            });
        }
        Ok(())
    }

    fn request_grant<G>(grant: &mut G, request: RewardRequest) -> Result<(), RescueError>
    where
        G: RewardGrant + ?Sized,
    {
        match grant.grant(&request) {
            Ok(true) => Ok(()),
            Ok(false) => Err(RescueError::Declined),
            Err(err) => {
                log::warn!("reward grant for {request:?} failed: {err}");
                Err(RescueError::Collaborator(Box::new(err)))
            }
        }
    }

    /// Resolve the pending encounter with a stamina rescue.
    ///
    /// Encounters only exist for items that fit but cost more stamina than is left, so
    /// stamina is the one kind that can complete them. The encounter is cleared only
    /// when the retried pickup succeeds.
    ///
    /// # Errors
    ///
    /// Returns `RescueError::UnsupportedKind` for capacity and revival rescues, and
    /// otherwise when nothing is pending, the daily allowance is exhausted or locked,
    /// or the grant is declined or fails. State is untouched in every error case.
    pub fn resolve_rescue<G>(
        &mut self,
        state: &mut GameState,
        kind: RescueKind,
        grant: &mut G,
        now_ms: i64,
    ) -> Result<RescueOutcome, RescueError>
    where
        G: RewardGrant + ?Sized,
    {
        if kind != RescueKind::Stamina {
            return Err(RescueError::UnsupportedKind(kind));
        }
        if state.pending.is_none() {
            return Err(RescueError::NoPendingEncounter);
        }
        self.check_allowance(state, kind)?;
        Self::request_grant(grant, RewardRequest::Rescue(kind))?;

        let mut events = EventRecorder::new(self.next_tick(), now_ms);
        state.player.adjust_stamina(self.cfg.rescue.stamina_restore);
        state.trip.daily.record_use(kind);
        events.push(EventKind::RescueResolved { kind });

        let Some(mut encounter) = state.pending.take() else {
            return Err(RescueError::NoPendingEncounter);
        };
        encounter.attempts = encounter.attempts.saturating_add(1);
        let stamina = state.player.stamina();
        let roll = place_item(state, encounter.item.clone(), stamina);
        let resolution = if let LootRoll::Collected(item) = &roll {
            state.player.adjust_stamina(roll.stamina_delta());
            events.push(roll.event());
            log::info!("rescue {} recovered {}", kind.label(), item.id);
            RescueResolution::PickedUp(item.clone())
        } else {
            encounter.status = EncounterStatus::GrantApplied;
            state.pending = Some(encounter);
            RescueResolution::StillPending
        };
        Ok(RescueOutcome {
            resolution,
            events: events.finish(),
        })
    }

    /// Give up the pending item.
    ///
    /// # Errors
    ///
    /// Returns `RescueError::NoPendingEncounter` when nothing is pending.
    pub fn abandon_rescue(
        &mut self,
        state: &mut GameState,
        now_ms: i64,
    ) -> Result<RescueOutcome, RescueError> {
        let encounter = state.pending.take().ok_or(RescueError::NoPendingEncounter)?;
        let mut events = EventRecorder::new(self.next_tick(), now_ms);
        events.push(EventKind::RescueAbandoned {
            item_id: encounter.item.id.clone(),
        });
        Ok(RescueOutcome {
            resolution: RescueResolution::Abandoned(encounter.item),
            events: events.finish(),
        })
    }

    /// Temporary capacity expansion (x1.5 until the next settlement).
    ///
    /// # Errors
    ///
    /// Returns `RescueError::AlreadyExpanded` when the expansion is active, allowance
    /// errors when the daily capacity rescues are spent or locked, and grant errors.
    pub fn expand_capacity<G>(
        &mut self,
        state: &mut GameState,
        grant: &mut G,
        now_ms: i64,
    ) -> Result<RescueOutcome, RescueError>
    where
        G: RewardGrant + ?Sized,
    {
        if state.player.temp_expansion() {
            return Err(RescueError::AlreadyExpanded);
        }
        self.check_allowance(state, RescueKind::Capacity)?;
        Self::request_grant(grant, RewardRequest::Rescue(RescueKind::Capacity))?;

        let mut events = EventRecorder::new(self.next_tick(), now_ms);
        state.player.set_temp_expansion(true);
        state.trip.daily.record_use(RescueKind::Capacity);
        events.push(EventKind::RescueResolved {
            kind: RescueKind::Capacity,
        });
        Ok(RescueOutcome {
            resolution: RescueResolution::CapacityExpanded,
            events: events.finish(),
        })
    }

    /// Revive a ghost.
    ///
    /// # Errors
    ///
    /// Returns `RescueError::NotGhost` for a living player, allowance errors when the
    /// daily revival is spent or not yet unlocked, and grant errors.
    pub fn revive<G>(
        &mut self,
        state: &mut GameState,
        grant: &mut G,
        now_ms: i64,
    ) -> Result<RescueOutcome, RescueError>
    where
        G: RewardGrant + ?Sized,
    {
        if !state.player.is_ghost() {
            return Err(RescueError::NotGhost);
        }
        self.check_allowance(state, RescueKind::Revival)?;
        Self::request_grant(grant, RewardRequest::Rescue(RescueKind::Revival))?;

        let mut events = EventRecorder::new(self.next_tick(), now_ms);
        state.player.adjust_stamina(self.cfg.rescue.revival_restore);
        state.trip.daily.record_use(RescueKind::Revival);
        events.push(EventKind::RescueResolved {
            kind: RescueKind::Revival,
        });
        if !state.player.is_ghost() {
            events.push(EventKind::GhostCleared);
        }
        Ok(RescueOutcome {
            resolution: RescueResolution::Revived,
            events: events.finish(),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::engine::EngineCfg;
    use crate::item::Tier;
    use crate::state::PlayerPhysicalState;

    #[derive(Debug, Error)]
    #[error("network down")]
    struct Offline;

    struct FailingGrant;

    impl RewardGrant for FailingGrant {
        type Error = Offline;

        fn grant(&mut self, _request: &RewardRequest) -> Result<bool, Self::Error> {
            Err(Offline)
        }
    }

    fn engine() -> ProgressionEngine {
        ProgressionEngine::new(EngineCfg::default(), 7).unwrap()
    }

    fn pending_state(stamina: f64, daily_km: f64) -> GameState {
        let mut state = GameState {
            player: PlayerPhysicalState::with_stats(stamina, 100.0, 100.0),
            ..GameState::default()
        };
        state.trip.daily.distance_km = daily_km;
        state.pending = Some(PendingEncounter::new(
            InventoryItem::new("itm-rare", Tier::Rare, 10),
            10,
        ));
        state
    }

    #[test]
    fn stamina_rescue_picks_up_and_clears_pending() {
        let mut engine = engine();
        let mut state = pending_state(5.0, 1.5);
        let mut grant = |_: &RewardRequest| true;
        let outcome = engine
            .resolve_rescue(&mut state, RescueKind::Stamina, &mut grant, 20)
            .unwrap();
        assert!(matches!(outcome.resolution, RescueResolution::PickedUp(_)));
        assert!(state.pending.is_none());
        // 5 + 30 restore - 30 pickup cost
        assert!((state.player.stamina() - 5.0).abs() < 1e-9);
        assert_eq!(state.trip.daily.used(RescueKind::Stamina), 1);
        assert!((state.trip.hygiene_debt - 1.0).abs() < 1e-9);
        assert_eq!(outcome.events.len(), 2);
    }

    #[test]
    fn grant_that_still_falls_short_keeps_encounter() {
        let mut cfg = EngineCfg::default();
        cfg.rescue.stamina_restore = 10.0;
        let mut engine = ProgressionEngine::new(cfg, 7).unwrap();
        let mut state = pending_state(5.0, 1.5);
        let mut grant = |_: &RewardRequest| true;
        let outcome = engine
            .resolve_rescue(&mut state, RescueKind::Stamina, &mut grant, 20)
            .unwrap();
        assert_eq!(outcome.resolution, RescueResolution::StillPending);
        let pending = state.pending.as_ref().unwrap();
        assert_eq!(pending.status, EncounterStatus::GrantApplied);
        assert_eq!(pending.attempts, 1);
        assert!((state.player.stamina() - 15.0).abs() < 1e-9);
    }

    #[test]
    fn capacity_rescue_cannot_resolve_a_stamina_shortfall() {
        let mut engine = engine();
        let mut state = pending_state(5.0, 1.5);
        let before = state.clone();
        let mut asked = 0;
        let mut grant = |_: &RewardRequest| {
            asked += 1;
            true
        };
        let err = engine
            .resolve_rescue(&mut state, RescueKind::Capacity, &mut grant, 20)
            .unwrap_err();
        assert!(matches!(err, RescueError::UnsupportedKind(RescueKind::Capacity)));
        assert_eq!(asked, 0);
        assert_eq!(state, before);
        assert_eq!(state.trip.daily.used(RescueKind::Capacity), 0);
    }

    #[test]
    fn capacity_expansion_is_its_own_rescue() {
        let mut engine = engine();
        let mut state = pending_state(50.0, 1.5);
        state.pending = None;
        let mut grant = |_: &RewardRequest| true;
        let outcome = engine.expand_capacity(&mut state, &mut grant, 20).unwrap();
        assert_eq!(outcome.resolution, RescueResolution::CapacityExpanded);
        assert!(state.player.temp_expansion());
        assert!((state.player.max_weight_kg() - 15.0).abs() < 1e-9);
        assert_eq!(state.trip.daily.used(RescueKind::Capacity), 1);
        assert!(matches!(
            engine.expand_capacity(&mut state, &mut grant, 21),
            Err(RescueError::AlreadyExpanded)
        ));
    }

    #[test]
    fn unlock_thresholds_gate_first_and_second_use() {
        let mut engine = engine();
        let mut state = pending_state(5.0, 1.0);
        let mut grant = |_: &RewardRequest| true;
        let err = engine
            .resolve_rescue(&mut state, RescueKind::Stamina, &mut grant, 20)
            .unwrap_err();
        assert!(matches!(err, RescueError::ThresholdNotMet { .. }));
        assert!(state.pending.is_some());

        state.trip.daily.distance_km = 1.5;
        state.trip.daily.record_use(RescueKind::Stamina);
        let err = engine
            .resolve_rescue(&mut state, RescueKind::Stamina, &mut grant, 20)
            .unwrap_err();
        assert!(matches!(
            err,
            RescueError::ThresholdNotMet { required_km, .. } if (required_km - 2.0).abs() < 1e-9
        ));
    }

    #[test]
    fn daily_cap_enforced() {
        let mut engine = engine();
        let mut state = pending_state(5.0, 5.0);
        for _ in 0..3 {
            state.trip.daily.record_use(RescueKind::Capacity);
        }
        let mut grant = |_: &RewardRequest| true;
        let err = engine.expand_capacity(&mut state, &mut grant, 20).unwrap_err();
        assert!(matches!(err, RescueError::CapReached { cap: 3, .. }));
    }

    #[test]
    fn collaborator_failure_is_retryable_and_preserves_state() {
        let mut engine = engine();
        let mut state = pending_state(5.0, 5.0);
        let before = state.clone();
        let err = engine
            .resolve_rescue(&mut state, RescueKind::Stamina, &mut FailingGrant, 20)
            .unwrap_err();
        assert!(err.is_retryable());
        assert_eq!(state, before);

        let mut decline = |_: &RewardRequest| false;
        let err = engine
            .resolve_rescue(&mut state, RescueKind::Stamina, &mut decline, 20)
            .unwrap_err();
        assert!(matches!(err, RescueError::Declined));
        assert!(!err.is_retryable());
        assert_eq!(state, before);
    }

    #[test]
    fn abandon_discards_item() {
        let mut engine = engine();
        let mut state = pending_state(5.0, 0.0);
        let outcome = engine.abandon_rescue(&mut state, 30).unwrap();
        assert!(matches!(outcome.resolution, RescueResolution::Abandoned(ref item) if item.id == "itm-rare"));
        assert!(state.pending.is_none());
        assert!(matches!(
            engine.abandon_rescue(&mut state, 31),
            Err(RescueError::NoPendingEncounter)
        ));
    }

    #[test]
    fn revive_requires_ghost_and_distance() {
        let mut engine = engine();
        let mut grant = |_: &RewardRequest| true;
        let mut living = GameState::default();
        assert!(matches!(
            engine.revive(&mut living, &mut grant, 0),
            Err(RescueError::NotGhost)
        ));

        let mut ghost = GameState {
            player: PlayerPhysicalState::with_stats(0.0, 100.0, 100.0),
            ..GameState::default()
        };
        ghost.trip.daily.distance_km = 0.5;
        assert!(matches!(
            engine.revive(&mut ghost, &mut grant, 0),
            Err(RescueError::ThresholdNotMet { .. })
        ));
        ghost.trip.daily.distance_km = 1.2;
        let outcome = engine.revive(&mut ghost, &mut grant, 0).unwrap();
        assert_eq!(outcome.resolution, RescueResolution::Revived);
        assert!((ghost.player.stamina() - 30.0).abs() < 1e-9);
        assert!(!ghost.player.is_ghost());
        ghost.player.adjust_stamina(-100.0);
        assert!(matches!(
            engine.revive(&mut ghost, &mut grant, 0),
            Err(RescueError::CapReached { .. })
        ));
    }

    #[test]
    fn revival_kind_cannot_resolve_pickup() {
        let mut engine = engine();
        let mut state = pending_state(5.0, 5.0);
        let mut grant = |_: &RewardRequest| true;
        assert!(matches!(
            engine.resolve_rescue(&mut state, RescueKind::Revival, &mut grant, 0),
            Err(RescueError::UnsupportedKind(RescueKind::Revival))
        ));
    }
}
