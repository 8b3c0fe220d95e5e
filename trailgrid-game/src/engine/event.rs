//! Typed events emitted by the progression engine.
//!
//! Events form a closed enum delivered through [`EventSink`]; subscribers match on
//! variants instead of string tags.
use serde::{Deserialize, Serialize};
use smallvec::SmallVec;
use std::sync::mpsc::Sender;

use crate::engine::rescue::RescueKind;
use crate::grid::GridCell;
use crate::item::Tier;

/// Events produced while handling a single call; rarely more than a handful.
pub type EventBatch = SmallVec<[Event; 4]>;

/// Stable, deterministic identifier for a single event.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct EventId {
    /// Engine call counter when the event occurred.
    pub tick: u64,
    /// Sequence number within that call.
    pub seq: u16,
}

impl EventId {
    #[must_use]
    pub const fn new(tick: u64, seq: u16) -> Self {
        Self { tick, seq }
    }
}

/// Why a loot roll produced nothing.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LootFailure {
    Ghost,
    Immobilized,
}

/// Mechanical event kind.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum EventKind {
    LootSuccess {
        item_id: String,
        tier: Tier,
        stamina_cost: f64,
        contamination: f64,
    },
    /// Capacity was full; the item was converted straight into stamina.
    LootConverted {
        tier: Tier,
        gross_restore: f64,
        pickup_cost: f64,
        net: f64,
    },
    LootRescueAvailable {
        item_id: String,
        tier: Tier,
        stamina_cost: f64,
    },
    LootFailed {
        reason: LootFailure,
    },
    CellDiscovered {
        cell: GridCell,
        new_cells: u32,
        gray_zone: bool,
    },
    DeepZoneEntered {
        trip_distance_km: f64,
    },
    GhostEntered,
    GhostCleared,
    Immobilized,
    Mobilized,
    ItemConsumed {
        item_id: String,
        restored: f64,
    },
    RescueResolved {
        kind: RescueKind,
    },
    RescueAbandoned {
        item_id: String,
    },
    Settled {
        revenue: f64,
        items: u32,
    },
    PersistenceFailed {
        key: String,
    },
}

impl EventKind {
    #[must_use]
    pub const fn severity(&self) -> EventSeverity {
        match self {
            Self::LootSuccess { .. }
            | Self::LootConverted { .. }
            | Self::CellDiscovered { .. }
            | Self::DeepZoneEntered { .. }
            | Self::GhostCleared
            | Self::Mobilized
            | Self::ItemConsumed { .. }
            | Self::RescueResolved { .. }
            | Self::RescueAbandoned { .. }
            | Self::Settled { .. } => EventSeverity::Info,
            Self::LootRescueAvailable { .. }
            | Self::LootFailed { .. }
            | Self::PersistenceFailed { .. } => EventSeverity::Warning,
            Self::GhostEntered | Self::Immobilized => EventSeverity::Critical,
        }
    }

    #[must_use]
    pub const fn surface_hint(&self) -> UiSurfaceHint {
        match self {
            Self::LootRescueAvailable { .. } | Self::GhostEntered | Self::Immobilized => {
                UiSurfaceHint::Modal
            }
            Self::LootSuccess { .. }
            | Self::LootConverted { .. }
            | Self::DeepZoneEntered { .. }
            | Self::Settled { .. }
            | Self::PersistenceFailed { .. } => UiSurfaceHint::Toast,
            _ => UiSurfaceHint::Log,
        }
    }
}

/// Severity tier for an event.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EventSeverity {
    Info,
    Warning,
    Critical,
}

/// Hint for how the UI should surface an event.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum UiSurfaceHint {
    Log,
    Toast,
    Modal,
}

/// Structured event emitted by the engine.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Event {
    pub id: EventId,
    pub timestamp_ms: i64,
    #[serde(flatten)]
    pub kind: EventKind,
    pub severity: EventSeverity,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub ui_surface_hint: Option<UiSurfaceHint>,
}

impl Event {
    #[must_use]
    pub fn new(id: EventId, timestamp_ms: i64, kind: EventKind) -> Self {
        Self {
            id,
            timestamp_ms,
            severity: kind.severity(),
            ui_surface_hint: Some(kind.surface_hint()),
            kind,
        }
    }
}

/// Sequencing buffer for the events of one engine call.
#[derive(Debug, Clone, Default)]
pub struct EventRecorder {
    tick: u64,
    timestamp_ms: i64,
    next_seq: u16,
    batch: EventBatch,
}

impl EventRecorder {
    #[must_use]
    pub fn new(tick: u64, timestamp_ms: i64) -> Self {
        Self {
            tick,
            timestamp_ms,
            next_seq: 0,
            batch: EventBatch::new(),
        }
    }

    pub fn push(&mut self, kind: EventKind) {
        let id = EventId::new(self.tick, self.next_seq);
        self.next_seq = self.next_seq.saturating_add(1);
        self.batch.push(Event::new(id, self.timestamp_ms, kind));
    }

    #[must_use]
    pub fn events(&self) -> &[Event] {
        &self.batch
    }

    #[must_use]
    pub fn finish(self) -> EventBatch {
        self.batch
    }
}

/// Observer receiving engine events.
pub trait EventSink {
    fn emit(&mut self, event: Event);

    fn emit_all<I>(&mut self, events: I)
    where
        I: IntoIterator<Item = Event>,
        Self: Sized,
    {
        for event in events {
            self.emit(event);
        }
    }
}

impl EventSink for Vec<Event> {
    fn emit(&mut self, event: Event) {
        self.push(event);
    }
}

impl EventSink for Sender<Event> {
    fn emit(&mut self, event: Event) {
        if self.send(event).is_err() {
            log::debug!("event receiver dropped; discarding event");
        }
    }
}

/// Sink that drops everything.
#[derive(Debug, Clone, Copy, Default)]
pub struct NullSink;

impl EventSink for NullSink {
    fn emit(&mut self, _event: Event) {}
}
