//! Single loot roll and the overflow / rescue / pickup branching.
use rand::Rng;
use thiserror::Error;

use crate::engine::ProgressionEngine;
use crate::engine::event::{EventBatch, EventKind, LootFailure};
use crate::item::{InventoryItem, Tier};
use crate::models::loot::TierOdds;
use crate::state::{GameState, StatusFlags};

/// Result of one loot roll.
#[derive(Debug, Clone, PartialEq)]
pub enum LootRoll {
    /// Ghosted or immobilized players cannot loot.
    Failed(LootFailure),
    /// Capacity was exceeded; restore minus cost goes straight to stamina.
    Converted {
        tier: Tier,
        gross_restore: f64,
        pickup_cost: f64,
        net: f64,
    },
    /// Capacity fits but stamina cannot pay the pickup cost.
    RescuePending(InventoryItem),
    /// Item added to the inventory.
    Collected(InventoryItem),
}

impl LootRoll {
    /// Stamina change this roll contributes to the movement's net delta.
    #[must_use]
    pub fn stamina_delta(&self) -> f64 {
        match self {
            Self::Converted { net, .. } => *net,
            Self::Collected(item) => -item.pickup_cost,
            Self::Failed(_) | Self::RescuePending(_) => 0.0,
        }
    }

    #[must_use]
    pub fn event(&self) -> EventKind {
        match self {
            Self::Failed(reason) => EventKind::LootFailed { reason: *reason },
            Self::Converted {
                tier,
                gross_restore,
                pickup_cost,
                net,
            } => EventKind::LootConverted {
                tier: *tier,
                gross_restore: *gross_restore,
                pickup_cost: *pickup_cost,
                net: *net,
            },
            Self::RescuePending(item) => EventKind::LootRescueAvailable {
                item_id: item.id.clone(),
                tier: item.tier,
                stamina_cost: item.pickup_cost,
            },
            Self::Collected(item) => EventKind::LootSuccess {
                item_id: item.id.clone(),
                tier: item.tier,
                stamina_cost: item.pickup_cost,
                contamination: item.tier.contamination(),
            },
        }
    }
}

/// Inputs for one roll that the caller tracks across a movement.
#[derive(Debug, Clone, Copy)]
pub struct RollContext {
    /// Flags as they stood when the movement arrived.
    pub flags: StatusFlags,
    /// Stamina left after burn and earlier rolls in the same movement.
    pub available_stamina: f64,
    pub forced_tier: Option<Tier>,
    pub timestamp_ms: i64,
}

/// Roll a tier and route the found item through [`place_item`].
pub fn roll_once<R: Rng + ?Sized>(
    rng: &mut R,
    odds: &TierOdds,
    state: &mut GameState,
    ctx: RollContext,
    item_id: String,
) -> LootRoll {
    if ctx.flags.ghost {
        return LootRoll::Failed(LootFailure::Ghost);
    }
    if ctx.flags.immobilized {
        return LootRoll::Failed(LootFailure::Immobilized);
    }
    let tier = ctx.forced_tier.unwrap_or_else(|| odds.roll(rng));
    let item = InventoryItem::new(item_id, tier, ctx.timestamp_ms);
    place_item(state, item, ctx.available_stamina)
}

/// Apply the capacity and stamina checks to a found item.
///
/// Only the `Collected` branch mutates `state`: the item joins the inventory and its
/// contamination is charged to the trip's hygiene debt. Stamina is left to the caller.
pub fn place_item(
    state: &mut GameState,
    item: InventoryItem,
    available_stamina: f64,
) -> LootRoll {
    let capacity = state.player.max_weight_kg();
    if !state.inventory.fits(item.weight_kg, capacity) {
        return LootRoll::Converted {
            tier: item.tier,
            gross_restore: item.restore,
            pickup_cost: item.pickup_cost,
            net: item.tier.overflow_gain(),
        };
    }
    if available_stamina < item.pickup_cost {
        return LootRoll::RescuePending(item);
    }
    let contamination = item.tier.contamination();
    match state.inventory.add(item.clone(), capacity) {
        Ok(()) => {
            state.trip.hygiene_debt += contamination;
            state.sync_weight();
            LootRoll::Collected(item)
        }
        Err(err) => {
            log::warn!("pickup refused after capacity check: {err}");
            LootRoll::Converted {
                tier: item.tier,
                gross_restore: item.restore,
                pickup_cost: item.pickup_cost,
                net: item.tier.overflow_gain(),
            }
        }
    }
}

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum ConsumeError {
    #[error("item {0} is not carried")]
    UnknownItem(String),
}

impl ProgressionEngine {
    /// Eat a carried item: restores its tier's stamina and frees its weight.
    ///
    /// Trip debt is not touched; contamination charged at pickup stays charged.
    ///
    /// # Errors
    ///
    /// Returns `ConsumeError::UnknownItem` when no carried item has `item_id`.
    pub fn consume_item(
        &mut self,
        state: &mut GameState,
        item_id: &str,
        now_ms: i64,
    ) -> Result<(f64, EventBatch), ConsumeError> {
        let item = state
            .inventory
            .remove(item_id)
            .ok_or_else(|| ConsumeError::UnknownItem(item_id.to_string()))?;
        let was_ghost = state.player.is_ghost();
        let before = state.player.stamina();
        state.player.adjust_stamina(item.restore);
        state.sync_weight();
        let restored = state.player.stamina() - before;

        let mut events = self.recorder(now_ms);
        events.push(EventKind::ItemConsumed {
            item_id: item.id,
            restored,
        });
        if was_ghost && !state.player.is_ghost() {
            events.push(EventKind::GhostCleared);
        }
        Ok((restored, events.finish()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::loot::{LootModifiers, tier_odds};
    use rand::rngs::mock::StepRng;

    fn fill_to(state: &mut GameState, kg: f64) {
        let mut n = 0;
        while state.inventory.total_weight() + 0.5 <= kg + 1e-9 {
            let item = InventoryItem::new(format!("fill-{n}"), Tier::Common, 0);
            state.inventory.add(item, 100.0).unwrap();
            n += 1;
        }
        state.sync_weight();
    }

    fn ctx(stamina: f64, tier: Tier) -> RollContext {
        RollContext {
            flags: StatusFlags::default(),
            available_stamina: stamina,
            forced_tier: Some(tier),
            timestamp_ms: 1,
        }
    }

    #[test]
    fn full_bag_converts_overflow_to_stamina() {
        let mut state = GameState::default();
        let capacity = state.player.max_weight_kg();
        fill_to(&mut state, capacity);
        let before = state.inventory.len();
        let odds = tier_odds(LootModifiers::default());
        let mut rng = StepRng::new(0, 0);
        for (tier, net) in [(Tier::Common, 2.0), (Tier::Uncommon, 6.0), (Tier::Rare, 70.0)] {
            let roll = roll_once(&mut rng, &odds, &mut state, ctx(100.0, tier), "x".into());
            assert!((roll.stamina_delta() - net).abs() < 1e-9, "{tier:?}");
            assert!(matches!(roll.event(), EventKind::LootConverted { .. }));
        }
        assert_eq!(state.inventory.len(), before);
        assert!(state.trip.hygiene_debt.abs() < f64::EPSILON);
    }

    #[test]
    fn low_stamina_defers_to_rescue_without_mutation() {
        let mut state = GameState::default();
        let odds = tier_odds(LootModifiers::default());
        let mut rng = StepRng::new(0, 0);
        let roll = roll_once(&mut rng, &odds, &mut state, ctx(5.0, Tier::Uncommon), "r".into());
        let LootRoll::RescuePending(item) = &roll else {
            panic!("expected rescue, got {roll:?}");
        };
        assert_eq!(item.id, "r");
        assert!(roll.stamina_delta().abs() < f64::EPSILON);
        assert!(state.inventory.is_empty());
    }

    #[test]
    fn pickup_charges_hygiene_debt_and_weight() {
        let mut state = GameState::default();
        let odds = tier_odds(LootModifiers::default());
        let mut rng = StepRng::new(0, 0);
        let roll = roll_once(&mut rng, &odds, &mut state, ctx(100.0, Tier::Rare), "g".into());
        assert!(matches!(roll, LootRoll::Collected(_)));
        assert!((roll.stamina_delta() + Tier::Rare.pickup_cost()).abs() < 1e-9);
        assert!((state.trip.hygiene_debt - Tier::Rare.contamination()).abs() < 1e-9);
        assert!((state.player.current_weight_kg() - Tier::Rare.weight_kg()).abs() < 1e-9);
    }

    #[test]
    fn ghost_and_immobilized_rolls_fail() {
        let mut state = GameState::default();
        let odds = tier_odds(LootModifiers::default());
        let mut rng = StepRng::new(0, 0);
        let mut context = ctx(100.0, Tier::Common);
        context.flags.immobilized = true;
        let roll = roll_once(&mut rng, &odds, &mut state, context, "a".into());
        assert_eq!(roll, LootRoll::Failed(LootFailure::Immobilized));
        context.flags.ghost = true;
        let roll = roll_once(&mut rng, &odds, &mut state, context, "b".into());
        assert_eq!(roll, LootRoll::Failed(LootFailure::Ghost));
        assert!(state.inventory.is_empty());
    }

    #[test]
    fn consuming_restores_stamina_but_keeps_debt() {
        let mut engine =
            ProgressionEngine::new(crate::engine::EngineCfg::default(), 1).unwrap();
        let mut state = GameState::default();
        state.player.adjust_stamina(-50.0);
        let odds = tier_odds(LootModifiers::default());
        let mut rng = StepRng::new(0, 0);
        roll_once(&mut rng, &odds, &mut state, ctx(50.0, Tier::Uncommon), "u".into());
        let debt = state.trip.hygiene_debt;
        let (restored, events) = engine.consume_item(&mut state, "u", 9).unwrap();
        assert!((restored - 15.0).abs() < 1e-9);
        assert!((state.player.stamina() - 65.0).abs() < 1e-9);
        assert!(state.player.current_weight_kg().abs() < 1e-9);
        assert!((state.trip.hygiene_debt - debt).abs() < f64::EPSILON);
        assert_eq!(events.len(), 1);
        assert_eq!(
            engine.consume_item(&mut state, "u", 10),
            Err(ConsumeError::UnknownItem("u".into()))
        );
    }

    #[test]
    fn unforced_roll_uses_odds() {
        let mut state = GameState::default();
        let odds = tier_odds(LootModifiers::default());
        // StepRng at u64::MAX maps to a roll just under 100: the rare band.
        let mut rng = StepRng::new(u64::MAX, 0);
        let mut context = ctx(100.0, Tier::Common);
        context.forced_tier = None;
        let roll = roll_once(&mut rng, &odds, &mut state, context, "z".into());
        let LootRoll::Collected(item) = roll else {
            panic!("expected pickup");
        };
        assert_eq!(item.tier, Tier::Rare);
    }
}
