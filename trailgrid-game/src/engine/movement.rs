//! Validated movement and the per-movement progression step.
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::constants::DISTANCE_EPSILON;
use crate::engine::event::{EventBatch, EventKind, EventRecorder};
use crate::engine::loot::{LootRoll, RollContext, roll_once};
use crate::engine::rescue::PendingEncounter;
use crate::engine::ProgressionEngine;
use crate::filter::AcceptedFix;
use crate::item::Tier;
use crate::models::loot::{LootModifiers, tier_odds};
use crate::models::stamina::movement_burn;
use crate::models::wear::durability_wear;
use crate::state::{GameState, StatusFlags};

/// Distance delta produced by the filter (or supplied directly by a caller).
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct ValidatedMovement {
    pub distance_km: f64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub speed_kmh: Option<f64>,
    pub timestamp_ms: i64,
    /// Debug override applied to every roll of this movement.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub forced_tier: Option<Tier>,
}

impl ValidatedMovement {
    #[must_use]
    pub const fn new(distance_km: f64, timestamp_ms: i64) -> Self {
        Self {
            distance_km,
            speed_kmh: None,
            timestamp_ms,
            forced_tier: None,
        }
    }

    #[must_use]
    pub const fn with_speed(mut self, speed_kmh: f64) -> Self {
        self.speed_kmh = Some(speed_kmh);
        self
    }

    #[must_use]
    pub const fn with_forced_tier(mut self, tier: Tier) -> Self {
        self.forced_tier = Some(tier);
        self
    }

    /// Movement implied by an accepted filter fix.
    #[must_use]
    pub fn from_fix(fix: &AcceptedFix) -> Self {
        Self {
            distance_km: fix.distance_m / 1000.0,
            speed_kmh: Some(fix.implied_speed_mps * 3.6),
            timestamp_ms: fix.sample.timestamp_ms,
            forced_tier: None,
        }
    }

    pub(crate) fn check(&self, last_ms: Option<i64>) -> Result<(), MovementError> {
        if !self.distance_km.is_finite() || self.distance_km < 0.0 {
            return Err(MovementError::InvalidDistance(self.distance_km));
        }
        if let Some(speed) = self.speed_kmh
            && (!speed.is_finite() || speed < 0.0)
        {
            return Err(MovementError::InvalidSpeed(speed));
        }
        if let Some(last_ms) = last_ms
            && self.timestamp_ms < last_ms
        {
            return Err(MovementError::OutOfOrder {
                timestamp_ms: self.timestamp_ms,
                last_ms,
            });
        }
        Ok(())
    }
}

/// Malformed movement input. State is never touched when one of these is returned.
#[derive(Debug, Error, Clone, Copy, PartialEq)]
pub enum MovementError {
    #[error("distance must be finite and non-negative (got {0})")]
    InvalidDistance(f64),
    #[error("speed must be finite and non-negative (got {0})")]
    InvalidSpeed(f64),
    #[error("movement at {timestamp_ms} precedes the last applied movement at {last_ms}")]
    OutOfOrder { timestamp_ms: i64, last_ms: i64 },
}

/// Summary of one applied movement.
#[derive(Debug, Clone, PartialEq)]
pub struct MovementOutcome {
    pub distance_km: f64,
    pub movement_burn: f64,
    /// Sum of pickup costs and overflow conversions across the rolls.
    pub loot_delta: f64,
    /// Stamina actually applied after clamping.
    pub stamina_change: f64,
    pub durability_wear: f64,
    pub rolls: u32,
    /// Set when this movement paused loot on a new rescue encounter.
    pub new_encounter: Option<PendingEncounter>,
    pub events: EventBatch,
}

impl ProgressionEngine {
    /// Apply one validated movement to `state`.
    ///
    /// Burn and wear use the load carried when the movement began. Each full loot unit
    /// of accumulated distance triggers one roll. A roll that needs a rescue suspends
    /// loot: the rest of the buffer is dropped and nothing accrues until the encounter
    /// is gone. Stamina changes once, after all rolls, by `loot_delta - burn`.
    ///
    /// # Errors
    ///
    /// Returns `MovementError` for malformed input; `state` is left unchanged.
    pub fn apply_movement(
        &mut self,
        state: &mut GameState,
        movement: &ValidatedMovement,
    ) -> Result<MovementOutcome, MovementError> {
        movement
            .check(state.trip.last_movement_ms)
            .inspect_err(|err| log::warn!("rejected movement input: {err}"))?;

        let tick = self.next_tick();
        let mut events = EventRecorder::new(tick, movement.timestamp_ms);
        let distance = movement.distance_km;
        let flags_before = state.player.flags();
        let carried = state.inventory.total_weight();

        let burn = movement_burn(distance, carried, state.player.max_weight_kg());
        let wear = durability_wear(distance, carried);
        state.trip.durability_debt += wear;
        if state.pending.is_none() {
            state.trip.pending_distance_km += distance;
        }

        let was_deep = state.trip.trip_distance_km >= self.cfg.deep_zone_km;
        let odds = tier_odds(LootModifiers {
            streak_days: state.trip.luck.streak,
            pathfinder: state.trip.pathfinder,
            deep_zone: was_deep,
        });

        let mut loot_delta = 0.0;
        let mut rolls = 0_u32;
        let mut new_encounter = None;
        let unit = self.cfg.loot_unit_km;
        while state.pending.is_none()
            && state.trip.pending_distance_km + DISTANCE_EPSILON >= unit
        {
            state.trip.pending_distance_km = (state.trip.pending_distance_km - unit).max(0.0);
            state.trip.loot_rolls = state.trip.loot_rolls.saturating_add(1);
            rolls = rolls.saturating_add(1);

            let ctx = RollContext {
                flags: flags_before,
                available_stamina: (state.player.stamina() - burn + loot_delta).max(0.0),
                forced_tier: movement.forced_tier,
                timestamp_ms: movement.timestamp_ms,
            };
            let item_id = self.rng.item_id(state.trip.loot_rolls);
            let roll = roll_once(self.rng.loot(), &odds, state, ctx, item_id);
            loot_delta += roll.stamina_delta();
            events.push(roll.event());
            if let LootRoll::RescuePending(item) = roll {
                let encounter = PendingEncounter::new(item, movement.timestamp_ms);
                log::info!("loot paused on rescue encounter {}", encounter.item.id);
                state.pending = Some(encounter.clone());
                state.trip.pending_distance_km = 0.0;
                new_encounter = Some(encounter);
            }
        }

        let before = state.player.stamina();
        state.player.adjust_stamina(loot_delta - burn);
        let stamina_change = state.player.stamina() - before;
        state.sync_weight();

        state.trip.total_distance_km += distance;
        state.trip.trip_distance_km += distance;
        state.trip.daily.distance_km += distance;
        state.trip.last_movement_ms = Some(movement.timestamp_ms);
        state.trip.movement_ticks = state.trip.movement_ticks.saturating_add(1);

        if !was_deep && state.trip.trip_distance_km >= self.cfg.deep_zone_km {
            events.push(EventKind::DeepZoneEntered {
                trip_distance_km: state.trip.trip_distance_km,
            });
        }
        push_flag_transitions(&mut events, flags_before, state.player.flags());

        Ok(MovementOutcome {
            distance_km: distance,
            movement_burn: burn,
            loot_delta,
            stamina_change,
            durability_wear: wear,
            rolls,
            new_encounter,
            events: events.finish(),
        })
    }
}

fn push_flag_transitions(events: &mut EventRecorder, before: StatusFlags, after: StatusFlags) {
    match (before.ghost, after.ghost) {
        (false, true) => events.push(EventKind::GhostEntered),
        (true, false) => events.push(EventKind::GhostCleared),
        _ => {}
    }
    match (before.immobilized, after.immobilized) {
        (false, true) => events.push(EventKind::Immobilized),
        (true, false) => events.push(EventKind::Mobilized),
        _ => {}
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::engine::EngineCfg;
    use crate::engine::event::LootFailure;
    use crate::state::PlayerPhysicalState;

    fn engine() -> ProgressionEngine {
        ProgressionEngine::new(EngineCfg::default(), 11).unwrap()
    }

    #[test]
    fn one_kilometre_burns_ten_and_rolls_ten_times() {
        let mut engine = engine();
        let mut state = GameState::default();
        let movement = ValidatedMovement::new(1.0, 1_000).with_forced_tier(Tier::Common);
        let outcome = engine.apply_movement(&mut state, &movement).unwrap();
        assert!((outcome.movement_burn - 10.0).abs() < 1e-9);
        assert_eq!(outcome.rolls, 10);
        assert!((outcome.loot_delta + 30.0).abs() < 1e-9);
        assert!((state.player.stamina() - 60.0).abs() < 1e-9);
        assert_eq!(state.inventory.len(), 10);
        assert!((state.player.current_weight_kg() - 5.0).abs() < 1e-9);
        assert!(state.trip.pending_distance_km.abs() < 1e-9);
        assert!((state.trip.durability_debt - 0.1).abs() < 1e-9);
        assert!((state.trip.hygiene_debt - 2.0).abs() < 1e-9);
    }

    #[test]
    fn sub_unit_distance_carries_over() {
        let mut engine = engine();
        let mut state = GameState::default();
        let first = engine
            .apply_movement(&mut state, &ValidatedMovement::new(0.06, 1))
            .unwrap();
        assert_eq!(first.rolls, 0);
        let second = engine
            .apply_movement(&mut state, &ValidatedMovement::new(0.06, 2))
            .unwrap();
        assert_eq!(second.rolls, 1);
        assert!((state.trip.pending_distance_km - 0.02).abs() < 1e-9);
    }

    #[test]
    fn invalid_input_leaves_state_untouched() {
        let mut engine = engine();
        let mut state = GameState::default();
        engine
            .apply_movement(&mut state, &ValidatedMovement::new(0.05, 100))
            .unwrap();
        let before = state.clone();
        for movement in [
            ValidatedMovement::new(-0.1, 200),
            ValidatedMovement::new(f64::NAN, 200),
            ValidatedMovement::new(0.1, 200).with_speed(f64::INFINITY),
            ValidatedMovement::new(0.1, 50),
        ] {
            assert!(engine.apply_movement(&mut state, &movement).is_err());
            assert_eq!(state, before);
        }
    }

    #[test]
    fn rescue_pauses_remaining_rolls() {
        let mut engine = engine();
        let mut state = GameState {
            player: PlayerPhysicalState::with_stats(35.0, 100.0, 100.0),
            ..GameState::default()
        };
        let movement = ValidatedMovement::new(0.5, 10).with_forced_tier(Tier::Rare);
        let outcome = engine.apply_movement(&mut state, &movement).unwrap();
        // First rare costs 30 of the 30 left after burn; the second cannot be paid.
        assert_eq!(outcome.rolls, 2);
        assert!(outcome.new_encounter.is_some());
        assert!(state.pending.is_some());
        assert!(state.trip.pending_distance_km.abs() < f64::EPSILON);
        assert!(state.player.stamina().abs() < 1e-9);
        assert!(outcome.events.iter().any(|e| matches!(e.kind, EventKind::LootRescueAvailable { .. })));

        // Distance walked while the encounter is open still counts, but never rolls.
        let next = engine
            .apply_movement(&mut state, &ValidatedMovement::new(0.2, 20))
            .unwrap();
        assert_eq!(next.rolls, 0);
        assert!(state.trip.pending_distance_km.abs() < f64::EPSILON);
        assert!((state.trip.trip_distance_km - 0.7).abs() < 1e-9);
    }

    #[test]
    fn suspended_distance_does_not_burst_after_abandon() {
        let mut engine = engine();
        let mut state = GameState {
            player: PlayerPhysicalState::with_stats(20.0, 100.0, 100.0),
            ..GameState::default()
        };
        engine
            .apply_movement(&mut state, &ValidatedMovement::new(0.1, 10).with_forced_tier(Tier::Rare))
            .unwrap();
        assert!(state.pending.is_some());

        for step in 0..30 {
            let outcome = engine
                .apply_movement(&mut state, &ValidatedMovement::new(0.1, 20 + step))
                .unwrap();
            assert_eq!(outcome.rolls, 0);
        }
        engine.abandon_rescue(&mut state, 100).unwrap();

        let after = engine
            .apply_movement(&mut state, &ValidatedMovement::new(0.005, 200))
            .unwrap();
        assert_eq!(after.rolls, 0);
        assert!((state.trip.pending_distance_km - 0.005).abs() < 1e-9);
    }

    #[test]
    fn ghost_rolls_fail_and_emit_entry_once() {
        let mut engine = engine();
        let mut state = GameState {
            player: PlayerPhysicalState::with_stats(0.4, 100.0, 100.0),
            ..GameState::default()
        };
        let outcome = engine
            .apply_movement(&mut state, &ValidatedMovement::new(0.05, 1))
            .unwrap();
        assert!(state.player.is_ghost());
        assert!(outcome.events.iter().any(|e| e.kind == EventKind::GhostEntered));

        let outcome = engine
            .apply_movement(&mut state, &ValidatedMovement::new(0.2, 2))
            .unwrap();
        assert_eq!(outcome.rolls, 2);
        assert!(outcome.events.iter().all(|e| e.kind
            == EventKind::LootFailed {
                reason: LootFailure::Ghost
            }));
        assert!(state.inventory.is_empty());
    }

    #[test]
    fn deep_zone_announced_on_crossing() {
        let mut engine = ProgressionEngine::new(
            EngineCfg {
                deep_zone_km: 0.3,
                ..EngineCfg::default()
            },
            3,
        )
        .unwrap();
        let mut state = GameState::default();
        let first = engine
            .apply_movement(&mut state, &ValidatedMovement::new(0.2, 1))
            .unwrap();
        assert!(!first.events.iter().any(|e| matches!(e.kind, EventKind::DeepZoneEntered { .. })));
        let second = engine
            .apply_movement(&mut state, &ValidatedMovement::new(0.2, 2))
            .unwrap();
        assert!(second.events.iter().any(|e| matches!(e.kind, EventKind::DeepZoneEntered { .. })));
    }

    #[test]
    fn same_seed_same_outcome() {
        let run = || {
            let mut engine = engine();
            let mut state = GameState::default();
            for step in 0..20 {
                engine
                    .apply_movement(&mut state, &ValidatedMovement::new(0.25, step))
                    .unwrap();
            }
            state
        };
        assert_eq!(run(), run());
    }

    #[test]
    fn from_fix_converts_units() {
        let fix = AcceptedFix {
            sample: crate::filter::PositionSample::new(0.0, 0.0, 9),
            distance_m: 250.0,
            elapsed_s: 100.0,
            implied_speed_mps: 2.5,
            bootstrap: false,
        };
        let movement = ValidatedMovement::from_fix(&fix);
        assert!((movement.distance_km - 0.25).abs() < 1e-12);
        assert!(movement.speed_kmh.is_some_and(|kmh| (kmh - 9.0).abs() < 1e-9));
        assert_eq!(movement.timestamp_ms, 9);
    }
}
