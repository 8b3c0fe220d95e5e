//! Trailgrid Game Engine
//!
//! Movement-driven progression core: position filtering, stamina and wear models,
//! tiered loot with overflow and rescue handling, hex-grid exploration and the
//! deferred settlement economy. No UI or platform-specific dependencies.

pub mod constants;
pub mod engine;
pub mod exploration;
pub mod filter;
pub mod grid;
pub mod item;
pub mod models;
pub mod numbers;
pub mod persistence;
pub mod settlement;
pub mod state;
pub mod workshop;

// Re-export commonly used types
pub use engine::{
    EngineCfg, EngineConfigError, Event, EventBatch, EventKind, EventSink, FunnelReport,
    IngestOutcome, MovementError, MovementOutcome, NullSink, PendingEncounter, ProgressionEngine,
    RescueError, RescueKind, RescueOutcome, RescueResolution, RewardGrant, RewardRequest,
    SampleFunnel, StreamSource, TripError, TripSession, TripSummary, ValidatedMovement,
};
pub use exploration::{Discovery, ExplorationLedger, ExploredEntry, LedgerCfg, TrackPoint, TripRecord};
pub use filter::{FilterCfg, FilterDecision, FilterReject, PositionFilter, PositionSample};
pub use grid::{GridCell, GridError, HexCoord, HexGrid};
pub use item::{Inventory, InventoryItem, Tier};
pub use models::valuation::PayoutMode;
pub use persistence::{PersistError, PersistenceGate};
pub use settlement::{SettlementError, SettlementReport};
pub use state::{GameState, PlayerPhysicalState, TripState, Wallet};
pub use workshop::{Receipt, WorkshopError};

/// Opaque key to JSON store provided by the host platform.
///
/// The explored set and any pending rescue encounter must survive a restart, so
/// implementations should make `put` durable before returning.
pub trait KvStore {
    type Error: std::error::Error + Send + Sync + 'static;

    /// Store `value` under `key`, replacing any previous value.
    ///
    /// # Errors
    ///
    /// Returns an error if the value cannot be written.
    fn put(&self, key: &str, value: &serde_json::Value) -> Result<(), Self::Error>;

    /// Fetch the value under `key`.
    ///
    /// # Errors
    ///
    /// Returns an error if the store cannot be read.
    fn get(&self, key: &str) -> Result<Option<serde_json::Value>, Self::Error>;

    /// Delete `key`. Deleting a missing key is not an error.
    ///
    /// # Errors
    ///
    /// Returns an error if the key cannot be removed.
    fn remove(&self, key: &str) -> Result<(), Self::Error>;
}

/// Entry point binding configuration to a store.
pub struct GameEngine<S>
where
    S: KvStore + Clone,
{
    cfg: EngineCfg,
    storage: S,
}

impl<S> GameEngine<S>
where
    S: KvStore + Clone,
{
    /// Create an engine with a validated configuration.
    ///
    /// # Errors
    ///
    /// Returns `EngineConfigError` when `cfg` is out of bounds.
    pub fn new(cfg: EngineCfg, storage: S) -> Result<Self, EngineConfigError> {
        cfg.validate()?;
        Ok(Self { cfg, storage })
    }

    #[must_use]
    pub const fn config(&self) -> &EngineCfg {
        &self.cfg
    }

    /// Open a trip session restoring whatever the store holds.
    ///
    /// # Errors
    ///
    /// Returns an error if persisted state cannot be read or does not match the grid.
    pub fn open_session(&self, seed: u64, now_ms: i64) -> anyhow::Result<TripSession<S>> {
        let engine = ProgressionEngine::new(self.cfg.clone(), seed)?;
        let session = TripSession::open(engine, self.storage.clone(), now_ms)?;
        log::debug!(
            "opened {} with {} explored cells",
            session.trip_id(),
            session.ledger().explored_count()
        );
        Ok(session)
    }

    /// Rebuild the stored explored set from archived trips of the last gray-zone window.
    ///
    /// # Errors
    ///
    /// Returns an error if the store cannot be read or written.
    pub fn reconcile_exploration(&self, now_ms: i64) -> anyhow::Result<usize> {
        let mut gate = PersistenceGate::new(self.storage.clone());
        let trips = gate.load_trips()?;
        let mut ledger = ExplorationLedger::new(HexGrid::new(self.cfg.cell_edge_m)?, self.cfg.ledger);
        let count = ledger.reconcile(&trips, now_ms)?;
        gate.save_explored(&ledger.entries())?;
        Ok(count)
    }
}
