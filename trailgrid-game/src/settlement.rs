//! Unloading: converts carried cargo into currency and applies the trip's debt.
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::engine::rescue::{RewardGrant, RewardRequest};
use crate::models::capacity::tiered_multiplier;
use crate::models::valuation::PayoutMode;
use crate::numbers::round_to;
use crate::state::GameState;

/// Result of an unload.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SettlementReport {
    pub mode: PayoutMode,
    /// Sum of carried item values.
    pub base_value: f64,
    pub mode_multiplier: f64,
    /// Tiered multiplier of hygiene before this trip's debt is applied.
    pub quality_multiplier: f64,
    pub revenue: f64,
    pub durability_loss: f64,
    pub hygiene_loss: f64,
    /// Distance since the previous settlement.
    pub distance_km: f64,
    pub item_count: u32,
    /// A pending rescue item was dropped by this settlement.
    pub discarded_encounter: bool,
}

#[derive(Debug, Error)]
pub enum SettlementError {
    #[error("{mode:?} payout was not granted")]
    NotGranted { mode: PayoutMode },
    #[error("payout grant collaborator failed: {0}")]
    Collaborator(#[source] Box<dyn std::error::Error + Send + Sync>),
}

impl SettlementError {
    #[must_use]
    pub const fn is_retryable(&self) -> bool {
        matches!(self, Self::Collaborator(_))
    }
}

/// Compute the report `settle` would produce, without mutating anything.
#[must_use]
pub fn preview(state: &GameState, mode: PayoutMode) -> SettlementReport {
    let base_value = state.inventory.total_value();
    let mode_multiplier = mode.multiplier();
    let quality_multiplier = tiered_multiplier(state.player.hygiene());
    SettlementReport {
        mode,
        base_value,
        mode_multiplier,
        quality_multiplier,
        revenue: round_to(base_value * mode_multiplier * quality_multiplier, 2),
        durability_loss: state.trip.durability_debt,
        hygiene_loss: state.trip.hygiene_debt,
        distance_km: state.trip.total_distance_km,
        item_count: u32::try_from(state.inventory.len()).unwrap_or(u32::MAX),
        discarded_encounter: state.pending.is_some(),
    }
}

/// Settle the trip.
///
/// Assisted and premium payouts consult `grant` first; a refusal leaves the state
/// untouched. On success the wallet is credited, debt lands on the player, the
/// inventory is cleared, any temporary capacity expansion ends and a pending rescue
/// encounter is discarded.
///
/// # Errors
///
/// Returns `SettlementError` when a required grant is refused or fails.
pub fn settle<G>(
    state: &mut GameState,
    mode: PayoutMode,
    grant: &mut G,
) -> Result<SettlementReport, SettlementError>
where
    G: RewardGrant + ?Sized,
{
    if mode.requires_grant() {
        match grant.grant(&RewardRequest::Settlement(mode)) {
            Ok(true) => {}
            Ok(false) => return Err(SettlementError::NotGranted { mode }),
            Err(err) => return Err(SettlementError::Collaborator(Box::new(err))),
        }
    }
    let report = preview(state, mode);

    state.wallet.credit(report.revenue);
    state.player.apply_durability_loss(report.durability_loss);
    state.player.apply_hygiene_loss(report.hygiene_loss);
    state.player.set_temp_expansion(false);
    state.inventory.drain();
    state.sync_weight();
    state.trip.reset_after_settlement();
    if state.pending.take().is_some() {
        log::info!("settlement discarded a pending rescue encounter");
    }
    log::info!(
        "settled {} items for {:.2} ({:?})",
        report.item_count,
        report.revenue,
        mode
    );
    Ok(report)
}
