//! Account migration records
//!
//! A migration transplants one account's balance and ledger history onto
//! another identity. The record stores just enough state (balances and
//! ledger lengths at the moment of migration) for one explicit compensating
//! revert; no event-sourcing replay.

use super::account::AccountId;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Point-in-time marker of an account taken before a migration
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct BalanceSnapshot {
    pub balance: i64,

    /// Ledger length at snapshot time; entries past this index were created
    /// by the migration and are removed on revert
    pub ledger_len: usize,
}

/// Record of one performed migration
///
/// Only the most recent non-reverted record can be reverted; performing a
/// newer migration strands older records permanently.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MigrationRecord {
    pub id: Uuid,
    pub from: AccountId,
    pub to: AccountId,
    pub prior_from: BalanceSnapshot,
    pub prior_to: BalanceSnapshot,
    pub performed_at: DateTime<Utc>,
    pub reverted: bool,
}
