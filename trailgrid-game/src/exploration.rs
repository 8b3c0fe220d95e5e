//! Exploration ledger: long-lived explored cells plus this trip's fresh cells.
//!
//! A cell lives in at most one of the two sets. Fresh cells are promoted into
//! the explored set only by [`ExplorationLedger::merge_current_session`].
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet, HashMap};

use crate::constants::{GRAY_ZONE_DAYS, MS_PER_DAY, PATH_CAP_CELLS};
use crate::grid::{GridCell, GridError, HexGrid};

/// Long-lived visit record for an explored cell.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct ExploredRecord {
    pub first_explored_ms: i64,
    pub last_visited_ms: i64,
    pub visit_count: u32,
}

/// Persisted form of one explored cell.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ExploredEntry {
    pub cell: GridCell,
    #[serde(flatten)]
    pub record: ExploredRecord,
}

/// Ledger tuning.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct LedgerCfg {
    #[serde(default = "LedgerCfg::default_path_cap")]
    pub path_cap_cells: usize,
    #[serde(default = "LedgerCfg::default_gray_zone_days")]
    pub gray_zone_days: u32,
}

impl Default for LedgerCfg {
    fn default() -> Self {
        Self {
            path_cap_cells: Self::default_path_cap(),
            gray_zone_days: Self::default_gray_zone_days(),
        }
    }
}

impl LedgerCfg {
    const fn default_path_cap() -> usize {
        PATH_CAP_CELLS
    }

    const fn default_gray_zone_days() -> u32 {
        GRAY_ZONE_DAYS
    }

    fn gray_zone_ms(&self) -> i64 {
        i64::from(self.gray_zone_days) * MS_PER_DAY
    }
}

/// Result of registering a position's cell.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Discovery {
    pub is_new_discovery: bool,
    /// Target cell was unrecorded or stale before this call.
    pub is_gray_zone: bool,
    /// Cells freshly added to this trip's set, in path order.
    pub new_cells: Vec<GridCell>,
    /// Interpolation was skipped because the jump exceeded the path cap.
    pub interpolation_skipped: bool,
}

/// Position recorded on a completed trip.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct TrackPoint {
    pub lat: f64,
    pub lon: f64,
    pub timestamp_ms: i64,
}

/// Archived trip used to rebuild the explored set.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TripRecord {
    pub id: String,
    pub started_at_ms: i64,
    pub ended_at_ms: i64,
    #[serde(default)]
    pub path: Vec<TrackPoint>,
}

#[derive(Debug, Clone)]
pub struct ExplorationLedger {
    grid: HexGrid,
    cfg: LedgerCfg,
    explored: BTreeMap<GridCell, ExploredRecord>,
    session_new: BTreeSet<GridCell>,
    /// Already-explored cells walked through this trip; refreshed on merge.
    session_revisits: BTreeSet<GridCell>,
    last_cell: Option<GridCell>,
}

impl ExplorationLedger {
    #[must_use]
    pub const fn new(grid: HexGrid, cfg: LedgerCfg) -> Self {
        Self {
            grid,
            cfg,
            explored: BTreeMap::new(),
            session_new: BTreeSet::new(),
            session_revisits: BTreeSet::new(),
            last_cell: None,
        }
    }

    /// Restore the explored set from persisted entries.
    ///
    /// # Errors
    ///
    /// Returns `GridError::ForeignCell` when an entry was recorded on a different grid.
    pub fn from_entries(
        grid: HexGrid,
        cfg: LedgerCfg,
        entries: Vec<ExploredEntry>,
    ) -> Result<Self, GridError> {
        let mut ledger = Self::new(grid, cfg);
        for entry in entries {
            grid.ensure_owned(entry.cell)?;
            ledger.explored.insert(entry.cell, entry.record);
        }
        Ok(ledger)
    }

    /// Snapshot of the explored set, sorted by cell id.
    #[must_use]
    pub fn entries(&self) -> Vec<ExploredEntry> {
        self.explored
            .iter()
            .map(|(cell, record)| ExploredEntry {
                cell: *cell,
                record: *record,
            })
            .collect()
    }

    #[must_use]
    pub const fn grid(&self) -> &HexGrid {
        &self.grid
    }

    #[must_use]
    pub fn explored_count(&self) -> usize {
        self.explored.len()
    }

    #[must_use]
    pub fn session_count(&self) -> usize {
        self.session_new.len()
    }

    #[must_use]
    pub fn is_explored(&self, cell: &GridCell) -> bool {
        self.explored.contains_key(cell)
    }

    #[must_use]
    pub fn is_session_cell(&self, cell: &GridCell) -> bool {
        self.session_new.contains(cell)
    }

    #[must_use]
    pub fn session_cells(&self) -> impl Iterator<Item = &GridCell> {
        self.session_new.iter()
    }

    #[must_use]
    pub fn record(&self, cell: &GridCell) -> Option<&ExploredRecord> {
        self.explored.get(cell)
    }

    #[must_use]
    pub const fn last_cell(&self) -> Option<GridCell> {
        self.last_cell
    }

    /// A cell with no long-lived record, or one not visited within the gray-zone window.
    #[must_use]
    pub fn is_gray_zone(&self, cell: &GridCell, now_ms: i64) -> bool {
        self.explored.get(cell).is_none_or(|record| {
            now_ms.saturating_sub(record.last_visited_ms) > self.cfg.gray_zone_ms()
        })
    }

    /// Register the cell of an accepted position.
    ///
    /// # Errors
    ///
    /// Returns `GridError::ForeignCell` when `cell` was produced by a different grid.
    pub fn discover(&mut self, cell: GridCell, now_ms: i64) -> Result<Discovery, GridError> {
        if self.last_cell == Some(cell) {
            return Ok(Discovery {
                is_gray_zone: self.is_gray_zone(&cell, now_ms),
                ..Discovery::default()
            });
        }
        let is_gray_zone = self.is_gray_zone(&cell, now_ms);
        let (path, interpolation_skipped) = match self.last_cell {
            Some(previous) => self.capped_path(previous, cell)?,
            None => {
                self.grid.ensure_owned(cell)?;
                (vec![cell], false)
            }
        };
        if interpolation_skipped {
            log::debug!(
                "path from {:?} to {cell} exceeds {} cells; registering endpoint only",
                self.last_cell.map(|c| c.to_string()),
                self.cfg.path_cap_cells
            );
        }

        let mut new_cells = Vec::new();
        for step in path {
            if self.explored.contains_key(&step) {
                self.session_revisits.insert(step);
            } else if self.session_new.insert(step) {
                new_cells.push(step);
            }
        }
        self.last_cell = Some(cell);
        Ok(Discovery {
            is_new_discovery: !new_cells.is_empty(),
            is_gray_zone,
            new_cells,
            interpolation_skipped,
        })
    }

    fn capped_path(
        &self,
        from: GridCell,
        to: GridCell,
    ) -> Result<(Vec<GridCell>, bool), GridError> {
        let steps = self.grid.distance(from, to)?;
        let cells = usize::try_from(steps).unwrap_or(usize::MAX).saturating_add(1);
        if cells > self.cfg.path_cap_cells {
            return Ok((vec![to], true));
        }
        // The origin was registered by the previous call.
        let path = self.grid.path(from, to)?.into_iter().skip(1).collect();
        Ok((path, false))
    }

    /// Promote this trip's fresh cells into the explored set.
    ///
    /// Returns the number of newly explored cells.
    pub fn merge_current_session(&mut self, now_ms: i64) -> usize {
        let promoted = self.session_new.len();
        for cell in std::mem::take(&mut self.session_new) {
            self.explored.insert(
                cell,
                ExploredRecord {
                    first_explored_ms: now_ms,
                    last_visited_ms: now_ms,
                    visit_count: 1,
                },
            );
        }
        for cell in std::mem::take(&mut self.session_revisits) {
            if let Some(record) = self.explored.get_mut(&cell) {
                record.last_visited_ms = record.last_visited_ms.max(now_ms);
                record.visit_count = record.visit_count.saturating_add(1);
            }
        }
        self.last_cell = None;
        log::info!(
            "merged {promoted} fresh cells; {} explored in total",
            self.explored.len()
        );
        promoted
    }

    /// Rebuild the explored set from trips that ended within the gray-zone window.
    ///
    /// Interpolation runs within each trip only, so gaps between unrelated trips are
    /// never bridged. Any fresh cells of the current trip are discarded.
    ///
    /// # Errors
    ///
    /// Returns `GridError` when a recorded point cannot be indexed.
    pub fn reconcile(&mut self, trips: &[TripRecord], now_ms: i64) -> Result<usize, GridError> {
        let cutoff = now_ms.saturating_sub(self.cfg.gray_zone_ms());
        let mut rebuilt: BTreeMap<GridCell, ExploredRecord> = BTreeMap::new();
        for trip in trips.iter().filter(|trip| trip.ended_at_ms >= cutoff) {
            let mut previous: Option<GridCell> = None;
            let mut visited: BTreeSet<GridCell> = BTreeSet::new();
            for point in &trip.path {
                let cell = self.grid.cell_at(point.lat, point.lon)?;
                if previous == Some(cell) {
                    continue;
                }
                let steps = match previous {
                    Some(from) => self.capped_path(from, cell)?.0,
                    None => vec![cell],
                };
                for step in steps {
                    visited.insert(step);
                    rebuilt
                        .entry(step)
                        .and_modify(|record| {
                            record.first_explored_ms =
                                record.first_explored_ms.min(point.timestamp_ms);
                            record.last_visited_ms =
                                record.last_visited_ms.max(point.timestamp_ms);
                        })
                        .or_insert(ExploredRecord {
                            first_explored_ms: point.timestamp_ms,
                            last_visited_ms: point.timestamp_ms,
                            visit_count: 0,
                        });
                }
                previous = Some(cell);
            }
            for cell in visited {
                if let Some(record) = rebuilt.get_mut(&cell) {
                    record.visit_count = record.visit_count.saturating_add(1);
                }
            }
        }
        self.explored = rebuilt;
        self.session_new.clear();
        self.session_revisits.clear();
        self.last_cell = None;
        Ok(self.explored.len())
    }

    /// Cells sampled at least `min_visits` times by recent trips, most visited first.
    ///
    /// # Errors
    ///
    /// Returns `GridError` when a recorded point cannot be indexed.
    pub fn frequently_visited(
        &self,
        trips: &[TripRecord],
        now_ms: i64,
        min_visits: u32,
    ) -> Result<Vec<(GridCell, u32)>, GridError> {
        let cutoff = now_ms.saturating_sub(self.cfg.gray_zone_ms());
        let mut counts: HashMap<GridCell, u32> = HashMap::new();
        for point in trips
            .iter()
            .flat_map(|trip| trip.path.iter())
            .filter(|point| point.timestamp_ms >= cutoff)
        {
            let cell = self.grid.cell_at(point.lat, point.lon)?;
            *counts.entry(cell).or_default() += 1;
        }
        let mut ranked: Vec<(GridCell, u32)> = counts
            .into_iter()
            .filter(|(_, visits)| *visits >= min_visits)
            .collect();
        ranked.sort_by(|a, b| b.1.cmp(&a.1).then(a.0.cmp(&b.0)));
        Ok(ranked)
    }
}
