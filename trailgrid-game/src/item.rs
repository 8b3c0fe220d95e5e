//! Item tiers and the carried inventory.
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::constants::{
    T1_CONTAMINATION, T1_PICKUP_COST, T1_RESTORE, T1_VALUE, T1_WEIGHT_KG, T2_CONTAMINATION,
    T2_PICKUP_COST, T2_RESTORE, T2_VALUE, T2_WEIGHT_KG, T3_CONTAMINATION, T3_PICKUP_COST,
    T3_RESTORE, T3_VALUE, T3_WEIGHT_KG,
};

/// Rarity class of a collectible.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(try_from = "u8", into = "u8")]
pub enum Tier {
    Common,
    Uncommon,
    Rare,
}

/// Fixed per-tier constants.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct TierSpec {
    pub weight_kg: f64,
    pub value: f64,
    pub pickup_cost: f64,
    pub restore: f64,
    /// Hygiene percentage points charged once per pickup.
    pub contamination: f64,
}

impl Tier {
    pub const ALL: [Self; 3] = [Self::Common, Self::Uncommon, Self::Rare];

    #[must_use]
    pub const fn spec(self) -> TierSpec {
        match self {
            Self::Common => TierSpec {
                weight_kg: T1_WEIGHT_KG,
                value: T1_VALUE,
                pickup_cost: T1_PICKUP_COST,
                restore: T1_RESTORE,
                contamination: T1_CONTAMINATION,
            },
            Self::Uncommon => TierSpec {
                weight_kg: T2_WEIGHT_KG,
                value: T2_VALUE,
                pickup_cost: T2_PICKUP_COST,
                restore: T2_RESTORE,
                contamination: T2_CONTAMINATION,
            },
            Self::Rare => TierSpec {
                weight_kg: T3_WEIGHT_KG,
                value: T3_VALUE,
                pickup_cost: T3_PICKUP_COST,
                restore: T3_RESTORE,
                contamination: T3_CONTAMINATION,
            },
        }
    }

    /// One-based tier index (1 = common).
    #[must_use]
    pub const fn index(self) -> u8 {
        match self {
            Self::Common => 1,
            Self::Uncommon => 2,
            Self::Rare => 3,
        }
    }

    #[must_use]
    pub const fn from_index(index: u8) -> Option<Self> {
        match index {
            1 => Some(Self::Common),
            2 => Some(Self::Uncommon),
            3 => Some(Self::Rare),
            _ => None,
        }
    }

    #[must_use]
    pub const fn weight_kg(self) -> f64 {
        self.spec().weight_kg
    }

    #[must_use]
    pub const fn pickup_cost(self) -> f64 {
        self.spec().pickup_cost
    }

    #[must_use]
    pub const fn restore(self) -> f64 {
        self.spec().restore
    }

    #[must_use]
    pub const fn contamination(self) -> f64 {
        self.spec().contamination
    }

    /// Stamina gained when an item of this tier is converted on overflow.
    #[must_use]
    pub fn overflow_gain(self) -> f64 {
        let spec = self.spec();
        spec.restore - spec.pickup_cost
    }
}

impl From<Tier> for u8 {
    fn from(tier: Tier) -> Self {
        tier.index()
    }
}

impl TryFrom<u8> for Tier {
    type Error = String;

    fn try_from(value: u8) -> Result<Self, Self::Error> {
        Self::from_index(value).ok_or_else(|| format!("unknown item tier {value}"))
    }
}

/// A collected item carried by the player.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct InventoryItem {
    pub id: String,
    pub tier: Tier,
    pub weight_kg: f64,
    pub value: f64,
    pub pickup_cost: f64,
    pub restore: f64,
    pub found_at_ms: i64,
}

impl InventoryItem {
    #[must_use]
    pub fn new(id: impl Into<String>, tier: Tier, found_at_ms: i64) -> Self {
        let spec = tier.spec();
        Self {
            id: id.into(),
            tier,
            weight_kg: spec.weight_kg,
            value: spec.value,
            pickup_cost: spec.pickup_cost,
            restore: spec.restore,
            found_at_ms,
        }
    }
}

#[derive(Debug, Error, Clone, PartialEq)]
pub enum InventoryError {
    #[error("item {id} needs {needed:.2} kg but only {available:.2} kg is free")]
    OverCapacity {
        id: String,
        needed: f64,
        available: f64,
    },
    #[error("item {0} is already carried")]
    Duplicate(String),
}

/// Carried items. Capacity is owned by the player and passed in per call.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Inventory {
    #[serde(default)]
    items: Vec<InventoryItem>,
}

impl Inventory {
    #[must_use]
    pub const fn new() -> Self {
        Self { items: Vec::new() }
    }

    #[must_use]
    pub fn items(&self) -> &[InventoryItem] {
        &self.items
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.items.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }

    #[must_use]
    pub fn total_weight(&self) -> f64 {
        self.items.iter().map(|item| item.weight_kg).sum()
    }

    #[must_use]
    pub fn total_value(&self) -> f64 {
        self.items.iter().map(|item| item.value).sum()
    }

    /// Whether `weight_kg` more can be carried under `capacity_kg`.
    #[must_use]
    pub fn fits(&self, weight_kg: f64, capacity_kg: f64) -> bool {
        self.total_weight() + weight_kg <= capacity_kg + crate::constants::DISTANCE_EPSILON
    }

    /// Add an item if it fits under `capacity_kg`.
    ///
    /// # Errors
    ///
    /// Returns `InventoryError::OverCapacity` when the item would exceed capacity and
    /// `InventoryError::Duplicate` when an item with the same id is already carried.
    pub fn add(&mut self, item: InventoryItem, capacity_kg: f64) -> Result<(), InventoryError> {
        if self.items.iter().any(|held| held.id == item.id) {
            return Err(InventoryError::Duplicate(item.id));
        }
        if !self.fits(item.weight_kg, capacity_kg) {
            let available = (capacity_kg - self.total_weight()).max(0.0);
            return Err(InventoryError::OverCapacity {
                id: item.id,
                needed: item.weight_kg,
                available,
            });
        }
        self.items.push(item);
        Ok(())
    }

    /// Remove an item by id.
    pub fn remove(&mut self, id: &str) -> Option<InventoryItem> {
        let index = self.items.iter().position(|item| item.id == id)?;
        Some(self.items.remove(index))
    }

    /// Remove every item, returning what was carried.
    pub fn drain(&mut self) -> Vec<InventoryItem> {
        std::mem::take(&mut self.items)
    }
}
