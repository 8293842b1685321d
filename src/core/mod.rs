//! Business operations of the Lak ledger
//!
//! Each submodule owns one operation family; the [`LedgerEngine`] facade
//! wires them to the store and is the only public entry point for callers:
//!
//! - [`policy`] - daily-earn and holding-cap enforcement
//! - [`redemption`] - code validation and consumption
//! - [`purchase`] - cart pricing, stock, debit, and the dispute workflow
//! - [`rewards`] - letters, batch grants, and the team-completion bonus
//! - [`migration`] - account-data transplant and one-shot revert

pub mod clock;
pub mod engine;
pub mod migration;
pub mod policy;
pub mod purchase;
pub mod redemption;
pub mod rewards;

pub use clock::{Clock, FixedClock, SystemClock};
pub use engine::LedgerEngine;
pub use policy::{evaluate_credit, CreditDecision};
pub use purchase::{PurchaseRequest, Receipt};
pub use redemption::RedemptionOutcome;
pub use rewards::TeamJoinOutcome;

use crate::types::{Account, LedgerError, SystemSettings};
use chrono::{DateTime, Utc};

/// Points each party receives per mate-code use
pub const MATE_REWARD_POINTS: i64 = 1;

/// Points each correspondent receives when a letter is approved
pub const LETTER_REWARD_POINTS: i64 = 5;

/// Points each member receives when a team link completes
pub const TEAM_BONUS_POINTS: i64 = 10;

/// Gate for self-service operations
///
/// Maintenance mode closes the platform to everyone but admins, and an
/// active restriction window blocks the account from initiating anything.
/// Staff workflows (approvals, fulfilment, migration) are not gated here.
pub(crate) fn ensure_operable(
    account: &Account,
    settings: &SystemSettings,
    now: DateTime<Utc>,
) -> Result<(), LedgerError> {
    if settings.maintenance_mode && !account.role.bypasses_maintenance() {
        return Err(LedgerError::MaintenanceClosed);
    }
    if account.is_restricted(now) {
        return Err(LedgerError::restricted(&account.id, account.restricted_until));
    }
    Ok(())
}
