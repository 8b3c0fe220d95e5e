//! Progression engine: turns validated movement into stamina, loot and debt.
use hmac::{Hmac, Mac};
use rand::SeedableRng;
use rand::rngs::SmallRng;
use serde::{Deserialize, Serialize};
use sha2::Sha256;
use std::hash::Hasher;
use thiserror::Error;
use twox_hash::XxHash64;

use crate::constants::{CELL_EDGE_M, DEEP_ZONE_KM, LOOT_UNIT_KM};
use crate::exploration::LedgerCfg;
use crate::filter::FilterCfg;

pub mod event;
pub mod funnel;
pub mod loot;
pub mod movement;
pub mod rescue;
pub mod session;

pub use event::{
    Event, EventBatch, EventId, EventKind, EventRecorder, EventSeverity, EventSink, LootFailure,
    NullSink, UiSurfaceHint,
};
pub use funnel::{FunnelHandle, FunnelReport, SampleFunnel, StreamSource, TaggedSample};
pub use loot::{ConsumeError, LootRoll};
pub use movement::{MovementError, MovementOutcome, ValidatedMovement};
pub use rescue::{
    EncounterStatus, PendingEncounter, RescueCfg, RescueError, RescueKind, RescueOutcome,
    RescueResolution, RewardGrant, RewardRequest,
};
pub use session::{IngestOutcome, TripError, TripSession, TripSummary};

/// Errors raised when engine configuration invariants are violated.
#[derive(Debug, Error, PartialEq)]
pub enum EngineConfigError {
    #[error("{field} must be at least {min:.3} (got {value:.3})")]
    MinViolation {
        field: &'static str,
        min: f64,
        value: f64,
    },
    #[error("{field} must be between {min:.3} and {max:.3} (got {value:.3})")]
    RangeViolation {
        field: &'static str,
        min: f64,
        max: f64,
        value: f64,
    },
    #[error("engine config is not valid JSON: {0}")]
    Parse(String),
}

/// Engine tuning.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EngineCfg {
    /// Travel covered by one loot roll.
    #[serde(default = "EngineCfg::default_loot_unit_km")]
    pub loot_unit_km: f64,
    #[serde(default = "EngineCfg::default_deep_zone_km")]
    pub deep_zone_km: f64,
    #[serde(default = "EngineCfg::default_cell_edge_m")]
    pub cell_edge_m: f64,
    #[serde(default)]
    pub ledger: LedgerCfg,
    #[serde(default)]
    pub filter: FilterCfg,
    #[serde(default)]
    pub rescue: RescueCfg,
}

impl Default for EngineCfg {
    fn default() -> Self {
        Self {
            loot_unit_km: Self::default_loot_unit_km(),
            deep_zone_km: Self::default_deep_zone_km(),
            cell_edge_m: Self::default_cell_edge_m(),
            ledger: LedgerCfg::default(),
            filter: FilterCfg::default(),
            rescue: RescueCfg::default(),
        }
    }
}

impl EngineCfg {
    const fn default_loot_unit_km() -> f64 {
        LOOT_UNIT_KM
    }

    const fn default_deep_zone_km() -> f64 {
        DEEP_ZONE_KM
    }

    const fn default_cell_edge_m() -> f64 {
        CELL_EDGE_M
    }

    /// Parse and validate a JSON config.
    ///
    /// # Errors
    ///
    /// Returns `EngineConfigError::Parse` for malformed JSON and any validation error.
    pub fn from_json(json: &str) -> Result<Self, EngineConfigError> {
        let mut cfg: Self =
            serde_json::from_str(json).map_err(|err| EngineConfigError::Parse(err.to_string()))?;
        cfg.sanitize();
        cfg.validate()?;
        Ok(cfg)
    }

    /// Validate configuration bounds.
    ///
    /// # Errors
    ///
    /// Returns `EngineConfigError` when any field violates the documented bounds.
    pub fn validate(&self) -> Result<(), EngineConfigError> {
        if !(0.001..=1.0).contains(&self.loot_unit_km) {
            return Err(EngineConfigError::RangeViolation {
                field: "loot_unit_km",
                min: 0.001,
                max: 1.0,
                value: self.loot_unit_km,
            });
        }
        if self.deep_zone_km.is_nan() || self.deep_zone_km < 0.0 {
            return Err(EngineConfigError::MinViolation {
                field: "deep_zone_km",
                min: 0.0,
                value: self.deep_zone_km,
            });
        }
        if !(1.0..=1_000.0).contains(&self.cell_edge_m) {
            return Err(EngineConfigError::RangeViolation {
                field: "cell_edge_m",
                min: 1.0,
                max: 1_000.0,
                value: self.cell_edge_m,
            });
        }
        if self.ledger.path_cap_cells < 1 {
            return Err(EngineConfigError::MinViolation {
                field: "ledger.path_cap_cells",
                min: 1.0,
                value: 0.0,
            });
        }
        self.validate_filter()?;
        self.rescue.validate()
    }

    fn validate_filter(&self) -> Result<(), EngineConfigError> {
        let checks = [
            ("filter.max_accuracy_m", self.filter.max_accuracy_m),
            ("filter.drift_speed_mps", self.filter.drift_speed_mps),
            ("filter.drift_distance_m", self.filter.drift_distance_m),
            ("filter.impossible_speed_mps", self.filter.impossible_speed_mps),
            ("filter.noise_floor_m", self.filter.noise_floor_m),
        ];
        for (field, value) in checks {
            if value.is_nan() || value <= 0.0 {
                return Err(EngineConfigError::MinViolation {
                    field,
                    min: 0.0,
                    value,
                });
            }
        }
        if self.filter.noise_floor_m >= self.cell_edge_m {
            return Err(EngineConfigError::RangeViolation {
                field: "filter.noise_floor_m",
                min: 0.0,
                max: self.cell_edge_m,
                value: self.filter.noise_floor_m,
            });
        }
        Ok(())
    }

    /// Replace non-finite values with defaults.
    pub fn sanitize(&mut self) {
        if !self.loot_unit_km.is_finite() {
            self.loot_unit_km = Self::default_loot_unit_km();
        }
        if !self.deep_zone_km.is_finite() {
            self.deep_zone_km = Self::default_deep_zone_km();
        }
        if !self.cell_edge_m.is_finite() {
            self.cell_edge_m = Self::default_cell_edge_m();
        }
        self.rescue.sanitize();
    }
}

/// Deterministic bundle of RNG streams segregated by simulation domain.
#[derive(Debug, Clone)]
pub struct RngBundle {
    loot: CountingRng<SmallRng>,
    identity_salt: u64,
}

impl RngBundle {
    /// Construct the bundle from a user-visible seed.
    #[must_use]
    pub fn from_user_seed(seed: u64) -> Self {
        Self {
            loot: CountingRng::new(derive_stream_seed(seed, b"loot")),
            identity_salt: derive_stream_seed(seed, b"identity"),
        }
    }

    /// Access the loot RNG stream.
    pub const fn loot(&mut self) -> &mut CountingRng<SmallRng> {
        &mut self.loot
    }

    /// Deterministic item id for the given roll counter.
    #[must_use]
    pub fn item_id(&self, roll: u64) -> String {
        let mut hasher = XxHash64::with_seed(self.identity_salt);
        hasher.write(&roll.to_le_bytes());
        format!("itm-{:016x}", hasher.finish())
    }
}

/// Counting wrapper for RNG streams providing instrumentation.
#[derive(Debug, Clone)]
pub struct CountingRng<R> {
    rng: R,
    draws: u64,
}

impl CountingRng<SmallRng> {
    fn new(seed: u64) -> Self {
        Self {
            rng: SmallRng::seed_from_u64(seed),
            draws: 0,
        }
    }
}

impl<R: rand::RngCore> CountingRng<R> {
    /// Number of draw calls performed against this stream.
    #[must_use]
    pub const fn draws(&self) -> u64 {
        self.draws
    }
}

impl<R: rand::RngCore> rand::RngCore for CountingRng<R> {
    fn next_u32(&mut self) -> u32 {
        self.draws = self.draws.saturating_add(1);
        self.rng.next_u32()
    }

    fn next_u64(&mut self) -> u64 {
        self.draws = self.draws.saturating_add(1);
        self.rng.next_u64()
    }

    fn fill_bytes(&mut self, dest: &mut [u8]) {
        self.draws = self.draws.saturating_add(1);
        self.rng.fill_bytes(dest);
    }

    fn try_fill_bytes(&mut self, dest: &mut [u8]) -> Result<(), rand::Error> {
        self.draws = self.draws.saturating_add(1);
        self.rng.try_fill_bytes(dest)
    }
}

fn derive_stream_seed(user_seed: u64, domain_tag: &[u8]) -> u64 {
    let mut mac =
        Hmac::<Sha256>::new_from_slice(&user_seed.to_le_bytes()).expect("64-bit seed is valid key");
    mac.update(domain_tag);
    let digest = mac.finalize().into_bytes();
    let mut seed_bytes = [0_u8; 8];
    seed_bytes.copy_from_slice(&digest[..8]);
    u64::from_le_bytes(seed_bytes)
}

/// Stateless-per-call orchestrator over a [`crate::state::GameState`].
#[derive(Debug, Clone)]
pub struct ProgressionEngine {
    cfg: EngineCfg,
    rng: RngBundle,
    tick: u64,
}

impl ProgressionEngine {
    /// Build an engine from a validated config.
    ///
    /// # Errors
    ///
    /// Returns `EngineConfigError` when `cfg` fails validation.
    pub fn new(cfg: EngineCfg, seed: u64) -> Result<Self, EngineConfigError> {
        cfg.validate()?;
        Ok(Self {
            cfg,
            rng: RngBundle::from_user_seed(seed),
            tick: 0,
        })
    }

    #[must_use]
    pub const fn config(&self) -> &EngineCfg {
        &self.cfg
    }

    #[must_use]
    pub const fn rng(&self) -> &RngBundle {
        &self.rng
    }

    fn next_tick(&mut self) -> u64 {
        self.tick = self.tick.saturating_add(1);
        self.tick
    }

    /// Event recorder for a call that happens outside the engine's own operations.
    pub fn recorder(&mut self, timestamp_ms: i64) -> EventRecorder {
        EventRecorder::new(self.next_tick(), timestamp_ms)
    }
}
