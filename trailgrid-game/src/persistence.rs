//! Write-through persistence over a [`KvStore`].
//!
//! A failed write keeps the value in a dirty cache so nothing is lost in memory;
//! reads prefer the cache and [`PersistenceGate::flush`] retries it.
use serde::Serialize;
use serde::de::DeserializeOwned;
use serde_json::Value;
use std::collections::BTreeMap;
use thiserror::Error;

use crate::KvStore;
use crate::constants::{KEY_EXPLORED, KEY_PENDING_ENCOUNTER, KEY_STATE, KEY_TRIPS};
use crate::engine::rescue::PendingEncounter;
use crate::exploration::{ExploredEntry, TripRecord};
use crate::state::GameState;

#[derive(Debug, Error)]
pub enum PersistError {
    #[error("store failed for key {key}: {source}")]
    Store {
        key: String,
        #[source]
        source: Box<dyn std::error::Error + Send + Sync>,
    },
    #[error("could not encode {key}: {source}")]
    Encode {
        key: String,
        #[source]
        source: serde_json::Error,
    },
    #[error("stored value for {key} is malformed: {source}")]
    Decode {
        key: String,
        #[source]
        source: serde_json::Error,
    },
}

impl PersistError {
    /// Store failures are transient; encoding problems are not.
    #[must_use]
    pub const fn is_retryable(&self) -> bool {
        matches!(self, Self::Store { .. })
    }

    #[must_use]
    pub fn key(&self) -> &str {
        match self {
            Self::Store { key, .. } | Self::Encode { key, .. } | Self::Decode { key, .. } => key,
        }
    }
}

fn store_error<E>(key: &str, err: E) -> PersistError
where
    E: std::error::Error + Send + Sync + 'static,
{
    PersistError::Store {
        key: key.to_string(),
        source: Box::new(err),
    }
}

/// Persistence front for one store. `None` in the dirty cache is a pending delete.
#[derive(Debug)]
pub struct PersistenceGate<S: KvStore> {
    store: S,
    dirty: BTreeMap<String, Option<Value>>,
}

impl<S: KvStore> PersistenceGate<S> {
    pub const fn new(store: S) -> Self {
        Self {
            store,
            dirty: BTreeMap::new(),
        }
    }

    pub const fn store(&self) -> &S {
        &self.store
    }

    #[must_use]
    pub fn is_dirty(&self) -> bool {
        !self.dirty.is_empty()
    }

    pub fn dirty_keys(&self) -> impl Iterator<Item = &str> {
        self.dirty.keys().map(String::as_str)
    }

    /// Encode and write `value` immediately.
    ///
    /// # Errors
    ///
    /// Returns `PersistError::Encode` when `value` cannot be encoded and
    /// `PersistError::Store` when the write fails; the latter leaves the value cached.
    pub fn write<T: Serialize + ?Sized>(&mut self, key: &str, value: &T) -> Result<(), PersistError> {
        let encoded = serde_json::to_value(value).map_err(|source| PersistError::Encode {
            key: key.to_string(),
            source,
        })?;
        self.put_value(key, Some(encoded))
    }

    /// Delete `key`.
    ///
    /// # Errors
    ///
    /// Returns `PersistError::Store` when the delete fails; it is retried on flush.
    pub fn clear(&mut self, key: &str) -> Result<(), PersistError> {
        self.put_value(key, None)
    }

    fn put_value(&mut self, key: &str, value: Option<Value>) -> Result<(), PersistError> {
        let result = match &value {
            Some(value) => self.store.put(key, value),
            None => self.store.remove(key),
        };
        match result {
            Ok(()) => {
                self.dirty.remove(key);
                Ok(())
            }
            Err(err) => {
                log::warn!("persisting {key} failed, keeping it for retry: {err}");
                self.dirty.insert(key.to_string(), value);
                Err(store_error(key, err))
            }
        }
    }

    /// Read and decode `key`, preferring unsynced values.
    ///
    /// # Errors
    ///
    /// Returns `PersistError` when the store read fails or the value is malformed.
    pub fn read<T: DeserializeOwned>(&self, key: &str) -> Result<Option<T>, PersistError> {
        let raw = match self.dirty.get(key) {
            Some(cached) => cached.clone(),
            None => self.store.get(key).map_err(|err| store_error(key, err))?,
        };
        raw.map(|value| {
            serde_json::from_value(value).map_err(|source| PersistError::Decode {
                key: key.to_string(),
                source,
            })
        })
        .transpose()
    }

    /// Retry every unsynced key. Returns how many were written.
    ///
    /// # Errors
    ///
    /// Returns the first store failure; keys not yet retried stay dirty.
    pub fn flush(&mut self) -> Result<usize, PersistError> {
        let pending: Vec<(String, Option<Value>)> = self
            .dirty
            .iter()
            .map(|(key, value)| (key.clone(), value.clone()))
            .collect();
        let mut written = 0;
        for (key, value) in pending {
            self.put_value(&key, value)?;
            written += 1;
        }
        Ok(written)
    }

    /// # Errors
    ///
    /// See [`Self::write`].
    pub fn save_state(&mut self, state: &GameState) -> Result<(), PersistError> {
        self.write(KEY_STATE, state)
    }

    /// # Errors
    ///
    /// See [`Self::read`].
    pub fn load_state(&self) -> Result<Option<GameState>, PersistError> {
        self.read(KEY_STATE)
    }

    /// Mirror the pending encounter: write it when present, delete the key otherwise.
    ///
    /// # Errors
    ///
    /// See [`Self::write`].
    pub fn save_pending(&mut self, pending: Option<&PendingEncounter>) -> Result<(), PersistError> {
        match pending {
            Some(encounter) => self.write(KEY_PENDING_ENCOUNTER, encounter),
            None => self.clear(KEY_PENDING_ENCOUNTER),
        }
    }

    /// # Errors
    ///
    /// See [`Self::read`].
    pub fn load_pending(&self) -> Result<Option<PendingEncounter>, PersistError> {
        self.read(KEY_PENDING_ENCOUNTER)
    }

    /// Stored as a sorted array of records.
    ///
    /// # Errors
    ///
    /// See [`Self::write`].
    pub fn save_explored(&mut self, entries: &[ExploredEntry]) -> Result<(), PersistError> {
        self.write(KEY_EXPLORED, entries)
    }

    /// # Errors
    ///
    /// See [`Self::read`].
    pub fn load_explored(&self) -> Result<Vec<ExploredEntry>, PersistError> {
        Ok(self.read(KEY_EXPLORED)?.unwrap_or_default())
    }

    /// # Errors
    ///
    /// See [`Self::write`].
    pub fn save_trips(&mut self, trips: &[TripRecord]) -> Result<(), PersistError> {
        self.write(KEY_TRIPS, trips)
    }

    /// # Errors
    ///
    /// See [`Self::read`].
    pub fn load_trips(&self) -> Result<Vec<TripRecord>, PersistError> {
        Ok(self.read(KEY_TRIPS)?.unwrap_or_default())
    }
}
