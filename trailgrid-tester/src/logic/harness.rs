//! In-memory collaborators and the walk driver used by every scenario.
use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::cell::RefCell;
use std::collections::BTreeMap;
use std::convert::Infallible;
use std::rc::Rc;

use trailgrid_game::constants::KEY_STATE;
use trailgrid_game::{
    EngineCfg, Event, EventKind, GameEngine, GameState, IngestOutcome, InventoryItem, KvStore,
    PayoutMode, PlayerPhysicalState, PositionSample, RescueError, RescueKind, RewardGrant,
    RewardRequest, Tier, TripError, TripSession,
};

/// Store backed by a shared map; clones see the same data.
#[derive(Debug, Clone, Default)]
pub struct MemoryStore {
    values: Rc<RefCell<BTreeMap<String, Value>>>,
}

#[cfg(test)]
impl MemoryStore {
    pub fn contains(&self, key: &str) -> bool {
        self.values.borrow().contains_key(key)
    }

    pub fn len(&self) -> usize {
        self.values.borrow().len()
    }
}

impl KvStore for MemoryStore {
    type Error = Infallible;

    fn put(&self, key: &str, value: &Value) -> Result<(), Self::Error> {
        self.values
            .borrow_mut()
            .insert(key.to_string(), value.clone());
        Ok(())
    }

    fn get(&self, key: &str) -> Result<Option<Value>, Self::Error> {
        Ok(self.values.borrow().get(key).cloned())
    }

    fn remove(&self, key: &str) -> Result<(), Self::Error> {
        self.values.borrow_mut().remove(key);
        Ok(())
    }
}

/// Reward collaborator answering every request the same way and remembering what it was asked.
#[derive(Debug, Clone)]
pub struct ScriptedGrant {
    approve: bool,
    pub requests: Vec<RewardRequest>,
}

impl ScriptedGrant {
    pub const fn approving() -> Self {
        Self {
            approve: true,
            requests: Vec::new(),
        }
    }

    #[cfg(test)]
    pub const fn declining() -> Self {
        Self {
            approve: false,
            requests: Vec::new(),
        }
    }
}

impl RewardGrant for ScriptedGrant {
    type Error = Infallible;

    fn grant(&mut self, request: &RewardRequest) -> Result<bool, Self::Error> {
        self.requests.push(*request);
        Ok(self.approve)
    }
}

/// Synthetic walk heading due north from a fixed origin.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WalkPlan {
    pub fixes: usize,
    pub step_m: f64,
    pub interval_ms: i64,
    /// Every n-th fix reports this accuracy instead of 5 m.
    #[serde(default)]
    pub poor_accuracy: Option<(usize, f64)>,
    /// Every n-th fix jumps this many metres east of the path.
    #[serde(default)]
    pub spike: Option<(usize, f64)>,
    #[serde(default)]
    pub start_stamina: Option<f64>,
    /// Common items carried from the start.
    #[serde(default)]
    pub preload_items: usize,
    /// Eat the lightest carried item whenever stamina drops below this.
    #[serde(default)]
    pub feed_below: Option<f64>,
    #[serde(default)]
    pub settle: Option<PayoutMode>,
}

impl Default for WalkPlan {
    fn default() -> Self {
        Self {
            fixes: 40,
            step_m: 12.0,
            interval_ms: 10_000,
            poor_accuracy: None,
            spike: None,
            start_stamina: None,
            preload_items: 0,
            feed_below: None,
            settle: None,
        }
    }
}

const ORIGIN_LAT: f64 = 47.6062;
const ORIGIN_LON: f64 = -122.3321;
const METRES_PER_DEGREE: f64 = 111_195.0;

impl WalkPlan {
    /// Length of the clean path, ignoring rejected fixes.
    pub fn path_km(&self) -> f64 {
        let steps = self.fixes.saturating_sub(1);
        #[allow(clippy::cast_precision_loss)]
        let steps = steps as f64;
        steps * self.step_m / 1000.0
    }

    pub fn samples(&self) -> Vec<PositionSample> {
        let lon_scale = METRES_PER_DEGREE * ORIGIN_LAT.to_radians().cos();
        (0..self.fixes)
            .map(|index| {
                #[allow(clippy::cast_precision_loss)]
                let north_m = index as f64 * self.step_m;
                let east_m = match self.spike {
                    Some((every, metres)) if index > 0 && index % every == 0 => metres,
                    _ => 0.0,
                };
                let accuracy = match self.poor_accuracy {
                    Some((every, metres)) if index > 0 && index % every == 0 => metres,
                    _ => 5.0,
                };
                let ts = i64::try_from(index).unwrap_or(i64::MAX) * self.interval_ms;
                PositionSample::new(
                    ORIGIN_LAT + north_m / METRES_PER_DEGREE,
                    ORIGIN_LON + east_m / lon_scale,
                    ts,
                )
                .with_accuracy(accuracy)
            })
            .collect()
    }

    fn starting_state(&self) -> Option<GameState> {
        if self.start_stamina.is_none() && self.preload_items == 0 {
            return None;
        }
        let mut state = GameState {
            player: PlayerPhysicalState::with_stats(
                self.start_stamina.unwrap_or(100.0),
                100.0,
                100.0,
            ),
            ..GameState::default()
        };
        let capacity = state.player.max_weight_kg();
        for n in 0..self.preload_items {
            let item = InventoryItem::new(format!("preload-{n}"), Tier::Common, 0);
            if state.inventory.add(item, capacity).is_err() {
                break;
            }
        }
        state.sync_weight();
        Some(state)
    }
}

/// What a walk did, as counted from its events and final state.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct WalkSummary {
    pub fixes_sent: usize,
    pub accepted: usize,
    pub rejected: usize,
    pub distance_km: f64,
    pub new_cells: usize,
    pub collected: usize,
    pub converted: usize,
    pub rescues_offered: usize,
    pub rescues_resolved: usize,
    pub rescues_abandoned: usize,
    pub consumed: usize,
    pub deep_zone_entered: bool,
    pub ghosted: bool,
    pub revenue: Option<f64>,
    pub final_stamina: f64,
    pub final_durability: f64,
    pub items_carried: usize,
    pub unsynced_keys: Vec<String>,
}

impl WalkSummary {
    fn count_events(&mut self, events: &[Event]) {
        for event in events {
            match &event.kind {
                EventKind::LootSuccess { .. } => self.collected += 1,
                EventKind::LootConverted { .. } => self.converted += 1,
                EventKind::LootRescueAvailable { .. } => self.rescues_offered += 1,
                EventKind::RescueResolved { .. } => self.rescues_resolved += 1,
                EventKind::RescueAbandoned { .. } => self.rescues_abandoned += 1,
                EventKind::ItemConsumed { .. } => self.consumed += 1,
                EventKind::DeepZoneEntered { .. } => self.deep_zone_entered = true,
                EventKind::GhostEntered => self.ghosted = true,
                _ => {}
            }
        }
    }
}

/// Drives sessions over in-memory collaborators.
#[derive(Debug, Clone)]
pub struct GameTester {
    cfg: EngineCfg,
    verbose: bool,
}

impl GameTester {
    pub fn new(verbose: bool) -> Self {
        Self {
            cfg: EngineCfg::default(),
            verbose,
        }
    }

    /// Run a synthetic plan from a fresh store.
    pub fn run_plan(&self, plan: &WalkPlan, seed: u64) -> Result<WalkSummary> {
        let store = MemoryStore::default();
        if let Some(state) = plan.starting_state() {
            let value = serde_json::to_value(&state).context("encoding starting state")?;
            store
                .put(KEY_STATE, &value)
                .context("seeding starting state")?;
        }
        self.walk(store, &plan.samples(), plan, seed)
    }

    /// Replay recorded samples with no scripted extras.
    pub fn run_trace(&self, samples: &[PositionSample], seed: u64) -> Result<WalkSummary> {
        let plan = WalkPlan {
            fixes: samples.len(),
            ..WalkPlan::default()
        };
        self.walk(MemoryStore::default(), samples, &plan, seed)
    }

    fn walk(
        &self,
        store: MemoryStore,
        samples: &[PositionSample],
        plan: &WalkPlan,
        seed: u64,
    ) -> Result<WalkSummary> {
        let engine = GameEngine::new(self.cfg.clone(), store)?;
        let opened_at = samples.first().map_or(0, |s| s.timestamp_ms);
        let mut session = engine.open_session(seed, opened_at)?;
        let mut grant = ScriptedGrant::approving();
        let mut events: Vec<Event> = Vec::new();
        let mut summary = WalkSummary {
            fixes_sent: samples.len(),
            ..WalkSummary::default()
        };

        for sample in samples {
            let outcome = session.ingest(sample, &mut events)?;
            if outcome.is_rejected() {
                summary.rejected += 1;
                if self.verbose {
                    log::info!("fix at {} rejected: {outcome:?}", sample.timestamp_ms);
                }
                continue;
            }
            summary.accepted += 1;
            if matches!(outcome, IngestOutcome::Moved { .. }) {
                tend(&mut session, plan, &mut grant, sample.timestamp_ms, &mut events)?;
            }
        }

        let ended_at = samples.last().map_or(opened_at, |s| s.timestamp_ms);
        if let Some(mode) = plan.settle {
            let report = session.settle(mode, &mut grant, ended_at, &mut events)?;
            summary.revenue = Some(report.revenue);
        }
        let trip = session.end_trip(ended_at);

        summary.count_events(&events);
        summary.distance_km = trip.distance_km;
        summary.new_cells = trip.new_cells;
        summary.unsynced_keys = trip.unsynced_keys;
        let state = session.state();
        summary.final_stamina = state.player.stamina();
        summary.final_durability = state.player.durability();
        summary.items_carried = state.inventory.len();
        log::debug!(
            "walk seed {seed}: {:.3} km, {} accepted, {} rejected",
            summary.distance_km,
            summary.accepted,
            summary.rejected
        );
        Ok(summary)
    }
}

/// Between-fix housekeeping a player would do: answer rescues, revive, eat.
fn tend(
    session: &mut TripSession<MemoryStore>,
    plan: &WalkPlan,
    grant: &mut ScriptedGrant,
    now_ms: i64,
    events: &mut Vec<Event>,
) -> Result<()> {
    if session.state().pending.is_some() {
        match session.resolve_rescue(RescueKind::Stamina, grant, now_ms, events) {
            Ok(_) | Err(TripError::Rescue(RescueError::ThresholdNotMet { .. })) => {}
            Err(TripError::Rescue(_)) => {
                session.abandon_rescue(now_ms, events)?;
            }
            Err(err) => return Err(err.into()),
        }
    }
    if session.state().player.is_ghost() {
        match session.revive(grant, now_ms, events) {
            Ok(_) | Err(TripError::Rescue(_)) => {}
            Err(err) => return Err(err.into()),
        }
    }
    if let Some(threshold) = plan.feed_below
        && session.state().player.stamina() < threshold
        && let Some(id) = session
            .state()
            .inventory
            .items()
            .iter()
            .min_by(|a, b| a.weight_kg.total_cmp(&b.weight_kg))
            .map(|item| item.id.clone())
    {
        session.consume(&id, now_ms, events)?;
    }
    Ok(())
}
