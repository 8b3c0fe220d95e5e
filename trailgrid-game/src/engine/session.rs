//! Trip session: the single writer binding filter, ledger, engine and persistence.
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::KvStore;
use crate::constants::KEY_PENDING_ENCOUNTER;
use crate::engine::event::{EventKind, EventSink};
use crate::engine::loot::ConsumeError;
use crate::engine::movement::{MovementError, MovementOutcome, ValidatedMovement};
use crate::engine::rescue::{RescueError, RescueKind, RescueOutcome, RewardGrant};
use crate::engine::ProgressionEngine;
use crate::exploration::{Discovery, ExplorationLedger, TrackPoint, TripRecord};
use crate::filter::{FilterDecision, FilterReject, PositionFilter, PositionSample};
use crate::grid::{GridCell, GridError, HexGrid};
use crate::item::Tier;
use crate::models::valuation::PayoutMode;
use crate::numbers::epoch_day;
use crate::persistence::{PersistError, PersistenceGate};
use crate::settlement::{self, SettlementError, SettlementReport};
use crate::state::GameState;
use crate::workshop::{self, Receipt, WorkshopError};

#[derive(Debug, Error)]
pub enum TripError {
    #[error(transparent)]
    Grid(#[from] GridError),
    #[error(transparent)]
    Movement(#[from] MovementError),
    #[error(transparent)]
    Rescue(#[from] RescueError),
    #[error(transparent)]
    Consume(#[from] ConsumeError),
    #[error(transparent)]
    Settlement(#[from] SettlementError),
    #[error(transparent)]
    Workshop(#[from] WorkshopError),
    #[error(transparent)]
    Persist(#[from] PersistError),
}

impl TripError {
    /// Whether retrying the same call may succeed.
    #[must_use]
    pub const fn is_retryable(&self) -> bool {
        match self {
            Self::Rescue(err) => err.is_retryable(),
            Self::Settlement(err) => err.is_retryable(),
            Self::Persist(err) => err.is_retryable(),
            _ => false,
        }
    }
}

/// What happened to one position sample.
#[derive(Debug, Clone, PartialEq)]
pub enum IngestOutcome {
    Rejected(FilterReject),
    /// First accepted fix of the trip: cell registered, no distance yet.
    Anchored { cell: GridCell, discovery: Discovery },
    Moved {
        cell: GridCell,
        discovery: Discovery,
        movement: MovementOutcome,
    },
}

impl IngestOutcome {
    #[must_use]
    pub const fn is_rejected(&self) -> bool {
        matches!(self, Self::Rejected(_))
    }
}

/// Result of ending a trip.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TripSummary {
    pub trip_id: String,
    pub started_at_ms: i64,
    pub ended_at_ms: i64,
    pub distance_km: f64,
    pub new_cells: usize,
    pub track_points: usize,
    /// Keys still waiting on [`TripSession::flush`].
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub unsynced_keys: Vec<String>,
}

/// Owns all mutable trip state. Callers must serialize access; see
/// [`crate::engine::funnel`] for merging concurrent position streams.
#[derive(Debug)]
pub struct TripSession<S: KvStore> {
    engine: ProgressionEngine,
    filter: PositionFilter,
    ledger: ExplorationLedger,
    state: GameState,
    gate: PersistenceGate<S>,
    trips: Vec<TripRecord>,
    trip_id: String,
    started_at_ms: i64,
    track: Vec<TrackPoint>,
    forced_tier: Option<Tier>,
}

impl<S: KvStore> TripSession<S> {
    /// Restore persisted state and start a trip at `now_ms`.
    ///
    /// # Errors
    ///
    /// Returns `TripError` when stored values cannot be read or belong to another grid.
    pub fn open(engine: ProgressionEngine, store: S, now_ms: i64) -> Result<Self, TripError> {
        let gate = PersistenceGate::new(store);
        let mut state = gate.load_state()?.unwrap_or_default();
        state.pending = gate.load_pending()?;
        let cfg = engine.config();
        let grid = HexGrid::new(cfg.cell_edge_m)?;
        let ledger = ExplorationLedger::from_entries(grid, cfg.ledger, gate.load_explored()?)?;
        let filter = PositionFilter::new(cfg.filter);
        let trips = gate.load_trips()?;
        let mut session = Self {
            engine,
            filter,
            ledger,
            state,
            gate,
            trips,
            trip_id: String::new(),
            started_at_ms: now_ms,
            track: Vec::new(),
            forced_tier: None,
        };
        session.begin_trip(now_ms);
        session.start_day(epoch_day(now_ms));
        Ok(session)
    }

    fn begin_trip(&mut self, now_ms: i64) {
        self.trip_id = format!("trip-{now_ms}");
        self.started_at_ms = now_ms;
        self.track.clear();
        self.filter.reset();
        self.state.trip.reset_for_new_trip();
    }

    #[must_use]
    pub const fn state(&self) -> &GameState {
        &self.state
    }

    #[must_use]
    pub const fn ledger(&self) -> &ExplorationLedger {
        &self.ledger
    }

    #[must_use]
    pub const fn engine(&self) -> &ProgressionEngine {
        &self.engine
    }

    #[must_use]
    pub fn trips(&self) -> &[TripRecord] {
        &self.trips
    }

    #[must_use]
    pub fn trip_id(&self) -> &str {
        &self.trip_id
    }

    pub const fn persistence(&self) -> &PersistenceGate<S> {
        &self.gate
    }

    /// Debug override: every roll of the next movement yields `tier`.
    pub fn force_next_tier(&mut self, tier: Tier) {
        self.forced_tier = Some(tier);
    }

    /// Roll daily counters and the luck streak to `day` (days since epoch).
    pub fn start_day(&mut self, day: u32) {
        self.state.trip.daily.roll_to(day);
        self.state.trip.luck.record_day(day);
    }

    /// Filter a raw sample and, when accepted, advance exploration and progression.
    ///
    /// The filter reference, ledger and track only change once the fix is known to
    /// index and to follow the last applied movement.
    ///
    /// # Errors
    ///
    /// Returns `TripError::Grid` when the accepted position cannot be indexed and
    /// `TripError::Movement` when it precedes the last applied movement. Filter
    /// rejections are not errors.
    pub fn ingest<E>(&mut self, sample: &PositionSample, sink: &mut E) -> Result<IngestOutcome, TripError>
    where
        E: EventSink + ?Sized,
    {
        let fix = match self.filter.evaluate(sample) {
            FilterDecision::Accept(fix) => fix,
            FilterDecision::Reject(reason) => return Ok(IngestOutcome::Rejected(reason)),
        };
        let cell = self.ledger.grid().cell_at(sample.latitude, sample.longitude)?;
        let movement = ValidatedMovement::from_fix(&fix);
        movement
            .check(self.state.trip.last_movement_ms)
            .inspect_err(|err| log::warn!("rejected fix at {}: {err}", sample.timestamp_ms))?;

        let discovery = self.ledger.discover(cell, sample.timestamp_ms)?;
        self.filter.commit(&fix);
        self.state.trip.pathfinder = discovery.is_gray_zone;
        self.track.push(TrackPoint {
            lat: sample.latitude,
            lon: sample.longitude,
            timestamp_ms: sample.timestamp_ms,
        });

        if discovery.is_new_discovery {
            let mut events = self.engine.recorder(sample.timestamp_ms);
            events.push(EventKind::CellDiscovered {
                cell,
                new_cells: u32::try_from(discovery.new_cells.len()).unwrap_or(u32::MAX),
                gray_zone: discovery.is_gray_zone,
            });
            for event in events.finish() {
                sink.emit(event);
            }
        }
        if fix.bootstrap {
            return Ok(IngestOutcome::Anchored { cell, discovery });
        }
        let movement = self.apply_movement(&movement, sink)?;
        Ok(IngestOutcome::Moved {
            cell,
            discovery,
            movement,
        })
    }

    /// Apply an already-validated movement, bypassing the filter and ledger.
    ///
    /// A rescue encounter created by this movement is written to the store before
    /// returning. A failed write is reported as an event and kept for [`Self::flush`].
    ///
    /// # Errors
    ///
    /// Returns `TripError::Movement` for malformed input.
    pub fn apply_movement<E>(
        &mut self,
        movement: &ValidatedMovement,
        sink: &mut E,
    ) -> Result<MovementOutcome, TripError>
    where
        E: EventSink + ?Sized,
    {
        let mut movement = *movement;
        if let Some(tier) = self.forced_tier.take() {
            movement.forced_tier = Some(tier);
        }
        let outcome = self.engine.apply_movement(&mut self.state, &movement)?;
        for event in outcome.events.iter().cloned() {
            sink.emit(event);
        }
        if let Some(encounter) = &outcome.new_encounter
            && let Err(err) = self.gate.save_pending(Some(encounter))
        {
            self.report_persist_failure(&err, movement.timestamp_ms, sink);
        }
        Ok(outcome)
    }

    fn report_persist_failure<E>(&mut self, err: &PersistError, now_ms: i64, sink: &mut E)
    where
        E: EventSink + ?Sized,
    {
        log::warn!("persistence failed: {err}");
        let mut events = self.engine.recorder(now_ms);
        events.push(EventKind::PersistenceFailed {
            key: err.key().to_string(),
        });
        for event in events.finish() {
            sink.emit(event);
        }
    }

    fn sync_pending<E>(&mut self, now_ms: i64, sink: &mut E)
    where
        E: EventSink + ?Sized,
    {
        if let Err(err) = self.gate.save_pending(self.state.pending.as_ref()) {
            self.report_persist_failure(&err, now_ms, sink);
        }
    }

    fn sync_state<E>(&mut self, now_ms: i64, sink: &mut E)
    where
        E: EventSink + ?Sized,
    {
        if let Err(err) = self.gate.save_state(&self.state) {
            self.report_persist_failure(&err, now_ms, sink);
        }
    }

    /// Eat a carried item.
    ///
    /// # Errors
    ///
    /// Returns `TripError::Consume` when the item is not carried.
    pub fn consume<E>(&mut self, item_id: &str, now_ms: i64, sink: &mut E) -> Result<f64, TripError>
    where
        E: EventSink + ?Sized,
    {
        let (restored, events) = self.engine.consume_item(&mut self.state, item_id, now_ms)?;
        for event in events {
            sink.emit(event);
        }
        Ok(restored)
    }

    /// # Errors
    ///
    /// See [`ProgressionEngine::resolve_rescue`].
    pub fn resolve_rescue<G, E>(
        &mut self,
        kind: RescueKind,
        grant: &mut G,
        now_ms: i64,
        sink: &mut E,
    ) -> Result<RescueOutcome, TripError>
    where
        G: RewardGrant + ?Sized,
        E: EventSink + ?Sized,
    {
        let outcome = self
            .engine
            .resolve_rescue(&mut self.state, kind, grant, now_ms)?;
        for event in outcome.events.iter().cloned() {
            sink.emit(event);
        }
        self.sync_pending(now_ms, sink);
        Ok(outcome)
    }

    /// # Errors
    ///
    /// Returns `TripError::Rescue` when nothing is pending.
    pub fn abandon_rescue<E>(&mut self, now_ms: i64, sink: &mut E) -> Result<RescueOutcome, TripError>
    where
        E: EventSink + ?Sized,
    {
        let outcome = self.engine.abandon_rescue(&mut self.state, now_ms)?;
        for event in outcome.events.iter().cloned() {
            sink.emit(event);
        }
        self.sync_pending(now_ms, sink);
        Ok(outcome)
    }

    /// # Errors
    ///
    /// See [`ProgressionEngine::revive`].
    pub fn revive<G, E>(&mut self, grant: &mut G, now_ms: i64, sink: &mut E) -> Result<RescueOutcome, TripError>
    where
        G: RewardGrant + ?Sized,
        E: EventSink + ?Sized,
    {
        let outcome = self.engine.revive(&mut self.state, grant, now_ms)?;
        for event in outcome.events.iter().cloned() {
            sink.emit(event);
        }
        Ok(outcome)
    }

    /// # Errors
    ///
    /// See [`ProgressionEngine::expand_capacity`].
    pub fn expand_capacity<G, E>(
        &mut self,
        grant: &mut G,
        now_ms: i64,
        sink: &mut E,
    ) -> Result<RescueOutcome, TripError>
    where
        G: RewardGrant + ?Sized,
        E: EventSink + ?Sized,
    {
        let outcome = self.engine.expand_capacity(&mut self.state, grant, now_ms)?;
        for event in outcome.events.iter().cloned() {
            sink.emit(event);
        }
        self.sync_state(now_ms, sink);
        Ok(outcome)
    }

    #[must_use]
    pub fn preview_settlement(&self, mode: PayoutMode) -> SettlementReport {
        settlement::preview(&self.state, mode)
    }

    /// Unload: settle and persist the result. Allowed while a rescue is pending.
    ///
    /// # Errors
    ///
    /// Returns `TripError::Settlement` when a required payout grant is refused or fails.
    pub fn settle<G, E>(
        &mut self,
        mode: PayoutMode,
        grant: &mut G,
        now_ms: i64,
        sink: &mut E,
    ) -> Result<SettlementReport, TripError>
    where
        G: RewardGrant + ?Sized,
        E: EventSink + ?Sized,
    {
        let flags_before = self.state.player.flags();
        let report = settlement::settle(&mut self.state, mode, grant)?;
        let mut events = self.engine.recorder(now_ms);
        events.push(EventKind::Settled {
            revenue: report.revenue,
            items: report.item_count,
        });
        if !flags_before.immobilized && self.state.player.is_immobilized() {
            events.push(EventKind::Immobilized);
        }
        for event in events.finish() {
            sink.emit(event);
        }
        if report.discarded_encounter {
            self.sync_pending(now_ms, sink);
        }
        self.sync_state(now_ms, sink);
        Ok(report)
    }

    /// Charge a workshop service, report flag changes and persist the result.
    ///
    /// A failed write never undoes the charge or fails the call; it is reported as an
    /// event and kept for [`Self::flush`].
    fn service<E>(
        &mut self,
        now_ms: i64,
        sink: &mut E,
        run: impl FnOnce(&mut GameState) -> Result<Receipt, WorkshopError>,
    ) -> Result<Receipt, TripError>
    where
        E: EventSink + ?Sized,
    {
        let flags_before = self.state.player.flags();
        let receipt = run(&mut self.state)?;
        if flags_before.immobilized && !self.state.player.is_immobilized() {
            let mut events = self.engine.recorder(now_ms);
            events.push(EventKind::Mobilized);
            for event in events.finish() {
                sink.emit(event);
            }
        }
        self.sync_state(now_ms, sink);
        Ok(receipt)
    }

    /// # Errors
    ///
    /// See [`workshop::repair`].
    pub fn repair<E>(&mut self, points: f64, now_ms: i64, sink: &mut E) -> Result<Receipt, TripError>
    where
        E: EventSink + ?Sized,
    {
        self.service(now_ms, sink, |state| workshop::repair(state, points))
    }

    /// # Errors
    ///
    /// See [`workshop::clean`].
    pub fn clean<E>(&mut self, now_ms: i64, sink: &mut E) -> Result<Receipt, TripError>
    where
        E: EventSink + ?Sized,
    {
        self.service(now_ms, sink, workshop::clean)
    }

    /// # Errors
    ///
    /// See [`workshop::expand`].
    pub fn expand<E>(&mut self, units: u32, now_ms: i64, sink: &mut E) -> Result<Receipt, TripError>
    where
        E: EventSink + ?Sized,
    {
        self.service(now_ms, sink, |state| workshop::expand(state, units))
    }

    /// Close the trip: merge fresh cells, archive the track and persist. A new trip
    /// starts at `now_ms`. Store failures are listed in the summary, not returned.
    pub fn end_trip(&mut self, now_ms: i64) -> TripSummary {
        let new_cells = self.ledger.merge_current_session(now_ms);
        let record = TripRecord {
            id: self.trip_id.clone(),
            started_at_ms: self.started_at_ms,
            ended_at_ms: now_ms,
            path: std::mem::take(&mut self.track),
        };
        let track_points = record.path.len();
        self.trips.push(record);

        let distance_km = self.state.trip.trip_distance_km;
        let summary_id = self.trip_id.clone();
        let started_at_ms = self.started_at_ms;
        self.begin_trip(now_ms);

        let entries = self.ledger.entries();
        let writes = [
            self.gate.save_explored(&entries),
            self.gate.save_trips(&self.trips),
            self.gate.save_state(&self.state),
            self.gate.save_pending(self.state.pending.as_ref()),
        ];
        for err in writes.iter().filter_map(|write| write.as_ref().err()) {
            log::warn!("end of trip {summary_id}: {err}");
        }
        let unsynced_keys = self.gate.dirty_keys().map(str::to_string).collect();
        log::info!("trip {summary_id} ended: {distance_km:.2} km, {new_cells} new cells");
        TripSummary {
            trip_id: summary_id,
            started_at_ms,
            ended_at_ms: now_ms,
            distance_km,
            new_cells,
            track_points,
            unsynced_keys,
        }
    }

    /// Rebuild the explored set from recent archived trips.
    ///
    /// # Errors
    ///
    /// Returns `TripError::Grid` when an archived point cannot be indexed and
    /// `TripError::Persist` when the rebuilt set cannot be written.
    pub fn reconcile_exploration(&mut self, now_ms: i64) -> Result<usize, TripError> {
        let count = self.ledger.reconcile(&self.trips, now_ms)?;
        self.gate.save_explored(&self.ledger.entries())?;
        Ok(count)
    }

    /// Retry unsynced writes.
    ///
    /// # Errors
    ///
    /// Returns the first store failure.
    pub fn flush(&mut self) -> Result<usize, TripError> {
        Ok(self.gate.flush()?)
    }

    /// Whether the pending encounter has reached the store.
    #[must_use]
    pub fn pending_is_durable(&self) -> bool {
        !self.gate.dirty_keys().any(|key| key == KEY_PENDING_ENCOUNTER)
    }

    /// Consume the session, returning the owned state.
    #[must_use]
    pub fn into_state(self) -> GameState {
        self.state
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::constants::{KEY_STATE, KEY_TRIPS};
    use crate::engine::{EngineCfg, Event, NullSink, RescueResolution, RewardRequest};
    use crate::state::{PlayerPhysicalState, Wallet};
    use crate::test_support::{FlakyStore, MemoryStorage};

    // ~1 m of latitude in degrees.
    const METRE: f64 = 1.0 / 111_195.0;

    fn session_with<S: KvStore>(store: S) -> TripSession<S> {
        let engine = ProgressionEngine::new(EngineCfg::default(), 11).unwrap();
        TripSession::open(engine, store, 1_000).unwrap()
    }

    fn sample(north_m: f64, ts: i64) -> PositionSample {
        PositionSample::new(37.0 + north_m * METRE, -122.0, ts).with_accuracy(5.0)
    }

    fn worn_state(durability: f64) -> GameState {
        GameState {
            player: PlayerPhysicalState::with_stats(100.0, durability, 100.0),
            wallet: Wallet::with_balance(1_000_000.0),
            ..GameState::default()
        }
    }

    fn loot_tiers(events: &[Event]) -> Vec<Tier> {
        events
            .iter()
            .filter_map(|event| match &event.kind {
                EventKind::LootSuccess { tier, .. }
                | EventKind::LootConverted { tier, .. }
                | EventKind::LootRescueAvailable { tier, .. } => Some(*tier),
                _ => None,
            })
            .collect()
    }

    #[test]
    fn forced_tier_covers_one_movement_only() {
        let mut session = session_with(MemoryStorage::default());
        session.force_next_tier(Tier::Rare);
        let mut events: Vec<Event> = Vec::new();
        let outcome = session
            .apply_movement(&ValidatedMovement::new(0.5, 2_000), &mut events)
            .unwrap();
        assert!(outcome.rolls > 0);
        let tiers = loot_tiers(&events);
        assert!(!tiers.is_empty());
        assert!(tiers.iter().all(|tier| *tier == Tier::Rare));
        assert!(session.forced_tier.is_none());
    }

    #[test]
    fn end_trip_archives_and_starts_fresh() {
        let store = MemoryStorage::default();
        let mut session = session_with(store.clone());
        let first_id = session.trip_id().to_string();
        assert_eq!(first_id, "trip-1000");
        session
            .apply_movement(&ValidatedMovement::new(0.2, 5_000), &mut NullSink)
            .unwrap();

        let summary = session.end_trip(60_000);
        assert_eq!(summary.trip_id, first_id);
        assert!((summary.distance_km - 0.2).abs() < 1e-9);
        assert_eq!(session.trip_id(), "trip-60000");
        assert!(session.state().trip.trip_distance_km.abs() < f64::EPSILON);
        assert_eq!(session.trips().len(), 1);
        assert!(store.values.borrow().contains_key(KEY_TRIPS));
    }

    #[test]
    fn workshop_services_persist_state() {
        let store = MemoryStorage::default();
        store
            .values
            .borrow_mut()
            .insert(KEY_STATE.to_string(), serde_json::to_value(worn_state(50.0)).unwrap());

        let mut session = session_with(store.clone());
        let receipt = session.repair(10.0, 2_000, &mut NullSink).unwrap();
        assert!(receipt.cost > 0.0);

        let stored: GameState =
            serde_json::from_value(store.values.borrow()[KEY_STATE].clone()).unwrap();
        assert!((stored.player.durability() - 60.0).abs() < 1e-9);
        assert!(stored.wallet.balance() < 1_000_000.0);
    }

    #[test]
    fn workshop_refusal_changes_nothing() {
        let store = MemoryStorage::default();
        let mut session = session_with(store.clone());
        assert!(matches!(
            session.clean(2_000, &mut NullSink),
            Err(TripError::Workshop(_))
        ));
        assert!(!store.values.borrow().contains_key(KEY_STATE));
    }

    #[test]
    fn failed_save_after_repair_charges_once() {
        let store = FlakyStore::default();
        store
            .data
            .borrow_mut()
            .insert(KEY_STATE.to_string(), serde_json::to_value(worn_state(50.0)).unwrap());
        let mut session = session_with(store.clone());
        store.failing.set(true);

        let mut events: Vec<Event> = Vec::new();
        let receipt = session.repair(10.0, 2_000, &mut events).unwrap();
        assert!((session.state().wallet.balance() - (1_000_000.0 - receipt.cost)).abs() < 1e-9);
        assert!(events.iter().any(
            |e| matches!(&e.kind, EventKind::PersistenceFailed { key } if key == KEY_STATE)
        ));
        assert!(session.persistence().dirty_keys().any(|key| key == KEY_STATE));

        store.failing.set(false);
        assert_eq!(session.flush().unwrap(), 1);
        let stored: GameState =
            serde_json::from_value(store.data.borrow()[KEY_STATE].clone()).unwrap();
        assert!((stored.wallet.balance() - session.state().wallet.balance()).abs() < 1e-9);
    }

    #[test]
    fn repairing_from_zero_durability_reports_mobilized() {
        let store = MemoryStorage::default();
        store
            .values
            .borrow_mut()
            .insert(KEY_STATE.to_string(), serde_json::to_value(worn_state(0.0)).unwrap());
        let mut session = session_with(store);
        assert!(session.state().player.is_immobilized());

        let mut events: Vec<Event> = Vec::new();
        session.repair(5.0, 2_000, &mut events).unwrap();
        assert!(!session.state().player.is_immobilized());
        assert_eq!(
            events.iter().filter(|e| e.kind == EventKind::Mobilized).count(),
            1
        );

        events.clear();
        session.repair(5.0, 3_000, &mut events).unwrap();
        assert!(events.is_empty());
    }

    #[test]
    fn out_of_order_fix_leaves_session_untouched() {
        let mut session = session_with(MemoryStorage::default());
        session
            .apply_movement(&ValidatedMovement::new(0.01, 1_000_000), &mut NullSink)
            .unwrap();
        let state_before = session.state().clone();
        let cells_before = session.ledger().session_count();

        for (north_m, ts) in [(0.0, 10_000), (60.0, 30_000)] {
            let err = session.ingest(&sample(north_m, ts), &mut NullSink).unwrap_err();
            assert!(matches!(
                err,
                TripError::Movement(MovementError::OutOfOrder { .. })
            ));
        }
        assert!(session.track.is_empty());
        assert_eq!(session.ledger().session_count(), cells_before);
        assert!(session.filter.last_accepted().is_none());
        assert_eq!(session.state(), &state_before);

        // A fix after the last movement is taken as usual.
        let outcome = session.ingest(&sample(0.0, 1_010_000), &mut NullSink).unwrap();
        assert!(matches!(outcome, IngestOutcome::Anchored { .. }));
        assert_eq!(session.track.len(), 1);
    }

    #[test]
    fn capacity_expansion_is_persisted() {
        let store = MemoryStorage::default();
        let mut session = session_with(store.clone());
        session.start_day(10);
        session.state.trip.daily.distance_km = 1.5;
        let mut grant = |_: &RewardRequest| true;
        let outcome = session.expand_capacity(&mut grant, 2_000, &mut NullSink).unwrap();
        assert_eq!(outcome.resolution, RescueResolution::CapacityExpanded);

        let stored: GameState =
            serde_json::from_value(store.values.borrow()[KEY_STATE].clone()).unwrap();
        assert!(stored.player.temp_expansion());
    }

    #[test]
    fn abandoning_without_encounter_is_an_error() {
        let mut session = session_with(MemoryStorage::default());
        let err = session.abandon_rescue(0, &mut NullSink).unwrap_err();
        assert!(matches!(err, TripError::Rescue(RescueError::NoPendingEncounter)));
        assert!(!err.is_retryable());
        assert!(session.pending_is_durable());
    }
}
