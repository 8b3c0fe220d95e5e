//! Station services paid from the wallet: repair, cleaning and frame expansion.
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::constants::{EXPANSION_UNIT_KG, STAT_MAX};
use crate::models::maintenance::{clean_cost, expansion_cost, repair_cost};
use crate::state::{GameState, InsufficientFunds};

#[derive(Debug, Error, Clone, PartialEq)]
pub enum WorkshopError {
    #[error(transparent)]
    Funds(#[from] InsufficientFunds),
    #[error("nothing to do: {0}")]
    NothingToDo(&'static str),
    #[error("repair points must be finite and positive (got {0})")]
    InvalidPoints(f64),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Service {
    Repair,
    Clean,
    Expand,
}

/// What a completed service cost and changed.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Receipt {
    pub service: Service,
    pub cost: f64,
    /// Durability or hygiene points restored, or kilograms added.
    pub amount: f64,
    pub balance_after: f64,
}

/// Restore up to `points` of durability, capped at what is missing.
///
/// # Errors
///
/// Returns `WorkshopError` when the input is invalid, durability is already full, or
/// the wallet cannot pay. Nothing changes on error.
pub fn repair(state: &mut GameState, points: f64) -> Result<Receipt, WorkshopError> {
    if !points.is_finite() || points <= 0.0 {
        return Err(WorkshopError::InvalidPoints(points));
    }
    let missing = STAT_MAX - state.player.durability();
    if missing <= 0.0 {
        return Err(WorkshopError::NothingToDo("durability is full"));
    }
    let amount = points.min(missing);
    let cost = repair_cost(state.player.base_capacity_kg(), amount);
    state.wallet.debit(cost)?;
    state.player.restore_durability(amount);
    Ok(Receipt {
        service: Service::Repair,
        cost,
        amount,
        balance_after: state.wallet.balance(),
    })
}

/// Restore hygiene to full.
///
/// # Errors
///
/// Returns `WorkshopError` when hygiene is already full or the wallet cannot pay.
pub fn clean(state: &mut GameState) -> Result<Receipt, WorkshopError> {
    let amount = STAT_MAX - state.player.hygiene();
    if amount <= 0.0 {
        return Err(WorkshopError::NothingToDo("hygiene is full"));
    }
    let cost = clean_cost(state.player.hygiene());
    state.wallet.debit(cost)?;
    state.player.restore_hygiene(amount);
    Ok(Receipt {
        service: Service::Clean,
        cost,
        amount,
        balance_after: state.wallet.balance(),
    })
}

/// Permanently add `units` expansion units to the frame.
///
/// # Errors
///
/// Returns `WorkshopError` when `units` is zero or the wallet cannot pay.
pub fn expand(state: &mut GameState, units: u32) -> Result<Receipt, WorkshopError> {
    if units == 0 {
        return Err(WorkshopError::NothingToDo("zero expansion units"));
    }
    let cost = expansion_cost(state.player.base_capacity_kg(), units);
    state.wallet.debit(cost)?;
    let amount = f64::from(units) * EXPANSION_UNIT_KG;
    state.player.expand_base_capacity(amount);
    log::info!(
        "frame expanded by {amount} kg to {} kg",
        state.player.base_capacity_kg()
    );
    Ok(Receipt {
        service: Service::Expand,
        cost,
        amount,
        balance_after: state.wallet.balance(),
    })
}
