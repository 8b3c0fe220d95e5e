//! Hexagonal grid indexing over an equal-area projection.
//!
//! Positions are projected with a sinusoidal projection and bucketed into
//! pointy-top hexagons of a fixed edge length. Cells are addressed by axial
//! coordinates and exposed as opaque string ids of the form `hx<edge_dm>:<q>:<r>`.
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use thiserror::Error;

use crate::constants::EARTH_RADIUS_M;
use crate::numbers::{floor_f64_to_u32, round_f64_to_i32};

const SQRT_3: f64 = 1.732_050_807_568_877_2;

#[derive(Debug, Error, Clone, PartialEq)]
pub enum GridError {
    #[error("cell edge must be a positive finite length (got {0})")]
    InvalidEdge(f64),
    #[error("coordinate out of range: lat {lat}, lon {lon}")]
    InvalidCoordinate { lat: f64, lon: f64 },
    #[error("malformed cell id `{0}`")]
    MalformedId(String),
    #[error("cell {cell} belongs to a grid with edge {found_dm} dm, expected {expected_dm} dm")]
    ForeignCell {
        cell: String,
        found_dm: u32,
        expected_dm: u32,
    },
}

/// Axial hex coordinate (q, r system).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct HexCoord {
    pub q: i32,
    pub r: i32,
}

impl HexCoord {
    #[must_use]
    pub const fn new(q: i32, r: i32) -> Self {
        Self { q, r }
    }

    /// All six adjacent hexes.
    #[must_use]
    pub const fn neighbors(&self) -> [Self; 6] {
        [
            Self::new(self.q + 1, self.r),
            Self::new(self.q + 1, self.r - 1),
            Self::new(self.q, self.r - 1),
            Self::new(self.q - 1, self.r),
            Self::new(self.q - 1, self.r + 1),
            Self::new(self.q, self.r + 1),
        ]
    }

    /// Distance in hex steps.
    #[must_use]
    pub const fn distance(&self, other: &Self) -> u32 {
        let dq = (self.q - other.q).unsigned_abs();
        let dr = (self.r - other.r).unsigned_abs();
        let ds = ((self.q + self.r) - (other.q + other.r)).unsigned_abs();
        (dq + dr + ds) / 2
    }

    #[must_use]
    pub const fn to_cube(&self) -> (i32, i32, i32) {
        (self.q, -self.q - self.r, self.r)
    }

    /// Round fractional cube coordinates to the containing hex.
    #[must_use]
    pub fn from_fractional(q: f64, r: f64) -> Self {
        let s = -q - r;
        let mut rq = q.round();
        let mut rr = r.round();
        let rs = s.round();
        let dq = (rq - q).abs();
        let dr = (rr - r).abs();
        let ds = (rs - s).abs();
        if dq > dr && dq > ds {
            rq = -rr - rs;
        } else if dr > ds {
            rr = -rq - rs;
        }
        Self::new(round_f64_to_i32(rq), round_f64_to_i32(rr))
    }

    /// Hexes on the straight line from `self` to `other`, both ends included.
    #[must_use]
    pub fn line_to(&self, other: &Self) -> Vec<Self> {
        let steps = self.distance(other);
        if steps == 0 {
            return vec![*self];
        }
        // Nudge off exact edges so ties resolve consistently.
        let (aq, ar) = (f64::from(self.q) + 1e-6, f64::from(self.r) + 1e-6);
        let (bq, br) = (f64::from(other.q) + 1e-6, f64::from(other.r) + 1e-6);
        let n = f64::from(steps);
        (0..=steps)
            .map(|i| {
                let t = f64::from(i) / n;
                Self::from_fractional(aq + (bq - aq) * t, ar + (br - ar) * t)
            })
            .collect()
    }
}

/// Opaque identifier of one grid cell.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct GridCell {
    edge_dm: u32,
    coord: HexCoord,
}

impl GridCell {
    #[must_use]
    pub const fn coord(&self) -> HexCoord {
        self.coord
    }

    /// Cell edge in decimetres.
    #[must_use]
    pub const fn edge_dm(&self) -> u32 {
        self.edge_dm
    }
}

impl fmt::Display for GridCell {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "hx{}:{}:{}", self.edge_dm, self.coord.q, self.coord.r)
    }
}

impl FromStr for GridCell {
    type Err = GridError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let malformed = || GridError::MalformedId(s.to_string());
        let body = s.strip_prefix("hx").ok_or_else(malformed)?;
        let mut parts = body.split(':');
        let edge_dm = parts
            .next()
            .and_then(|p| p.parse::<u32>().ok())
            .filter(|edge| *edge > 0)
            .ok_or_else(malformed)?;
        let q = parts
            .next()
            .and_then(|p| p.parse::<i32>().ok())
            .ok_or_else(malformed)?;
        let r = parts
            .next()
            .and_then(|p| p.parse::<i32>().ok())
            .ok_or_else(malformed)?;
        if parts.next().is_some() {
            return Err(malformed());
        }
        Ok(Self {
            edge_dm,
            coord: HexCoord::new(q, r),
        })
    }
}

impl TryFrom<String> for GridCell {
    type Error = GridError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        value.parse()
    }
}

impl From<GridCell> for String {
    fn from(cell: GridCell) -> Self {
        cell.to_string()
    }
}

/// Fixed-resolution hex grid.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct HexGrid {
    edge_m: f64,
    edge_dm: u32,
}

impl HexGrid {
    /// Build a grid with the given cell edge.
    ///
    /// # Errors
    ///
    /// Returns `GridError::InvalidEdge` for a non-positive, non-finite or sub-decimetre edge.
    pub fn new(edge_m: f64) -> Result<Self, GridError> {
        if !edge_m.is_finite() || edge_m < 0.1 {
            return Err(GridError::InvalidEdge(edge_m));
        }
        let edge_dm = floor_f64_to_u32((edge_m * 10.0).round());
        Ok(Self { edge_m, edge_dm })
    }

    #[must_use]
    pub const fn edge_m(&self) -> f64 {
        self.edge_m
    }

    /// Cell containing a WGS84 position.
    ///
    /// # Errors
    ///
    /// Returns `GridError::InvalidCoordinate` for non-finite or out-of-range input.
    pub fn cell_at(&self, lat: f64, lon: f64) -> Result<GridCell, GridError> {
        if !lat.is_finite() || !lon.is_finite() || lat.abs() > 90.0 || lon.abs() > 180.0 {
            return Err(GridError::InvalidCoordinate { lat, lon });
        }
        let lat_rad = lat.to_radians();
        let x = EARTH_RADIUS_M * lon.to_radians() * lat_rad.cos();
        let y = EARTH_RADIUS_M * lat_rad;
        let q = (SQRT_3 / 3.0 * x - y / 3.0) / self.edge_m;
        let r = (2.0 / 3.0 * y) / self.edge_m;
        Ok(GridCell {
            edge_dm: self.edge_dm,
            coord: HexCoord::from_fractional(q, r),
        })
    }

    /// Approximate centre of a cell as `(lat, lon)`.
    ///
    /// # Errors
    ///
    /// Returns `GridError::ForeignCell` when the cell was produced by a different grid.
    pub fn center(&self, cell: GridCell) -> Result<(f64, f64), GridError> {
        self.ensure_owned(cell)?;
        let HexCoord { q, r } = cell.coord;
        let y = self.edge_m * 1.5 * f64::from(r);
        let x = self.edge_m * SQRT_3 * (f64::from(q) + f64::from(r) / 2.0);
        let lat_rad = y / EARTH_RADIUS_M;
        let cos = lat_rad.cos();
        let lon_rad = if cos.abs() < f64::EPSILON {
            0.0
        } else {
            x / (EARTH_RADIUS_M * cos)
        };
        Ok((lat_rad.to_degrees(), lon_rad.to_degrees()))
    }

    /// Cells crossed walking from `from` to `to`, both included.
    ///
    /// # Errors
    ///
    /// Returns `GridError::ForeignCell` when either cell was produced by a different grid.
    pub fn path(&self, from: GridCell, to: GridCell) -> Result<Vec<GridCell>, GridError> {
        self.ensure_owned(from)?;
        self.ensure_owned(to)?;
        Ok(from
            .coord
            .line_to(&to.coord)
            .into_iter()
            .map(|coord| GridCell {
                edge_dm: self.edge_dm,
                coord,
            })
            .collect())
    }

    /// Hex-step distance between two cells.
    ///
    /// # Errors
    ///
    /// Returns `GridError::ForeignCell` when either cell was produced by a different grid.
    pub fn distance(&self, a: GridCell, b: GridCell) -> Result<u32, GridError> {
        self.ensure_owned(a)?;
        self.ensure_owned(b)?;
        Ok(a.coord.distance(&b.coord))
    }

    /// Confirm `cell` was produced by this grid.
    ///
    /// # Errors
    ///
    /// Returns `GridError::ForeignCell` for cells of a different resolution.
    pub fn ensure_owned(&self, cell: GridCell) -> Result<(), GridError> {
        if cell.edge_dm == self.edge_dm {
            Ok(())
        } else {
            Err(GridError::ForeignCell {
                cell: cell.to_string(),
                found_dm: cell.edge_dm,
                expected_dm: self.edge_dm,
            })
        }
    }
}
