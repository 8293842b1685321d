//! Account migration and one-shot reversal
//!
//! A migration transplants an account's balance and ledger history onto
//! another identity: the history is copied (re-keyed, appended after the
//! target's own history), the balance is copied rather than summed, and the
//! source balance is zeroed. The source keeps its own entry history as
//! audit trail.
//!
//! Reversal is an explicit compensating action driven by the snapshots in
//! the migration record: both balances are restored and the entries the
//! migration created on the target are removed. Only the newest
//! non-reverted record can be reverted; a newer migration strands older
//! records permanently.

use crate::store::Txn;
use crate::types::{BalanceSnapshot, LedgerError, MigrationRecord};
use chrono::{DateTime, Utc};
use uuid::Uuid;

/// Transplant `from_id`'s balance and ledger history onto `to_id`
pub(crate) fn migrate(
    tx: &mut Txn,
    from_id: &str,
    to_id: &str,
    now: DateTime<Utc>,
) -> Result<MigrationRecord, LedgerError> {
    if from_id == to_id {
        return Err(LedgerError::invalid(
            "cannot migrate an account onto itself",
        ));
    }

    let mut from = tx.account(from_id)?;
    let mut to = tx.account(to_id)?;
    let from_entries = tx.ledger_entries(from_id);
    let to_len = tx.ledger_len(to_id);

    let record = MigrationRecord {
        id: Uuid::new_v4(),
        from: from_id.to_string(),
        to: to_id.to_string(),
        prior_from: BalanceSnapshot {
            balance: from.balance,
            ledger_len: from_entries.len(),
        },
        prior_to: BalanceSnapshot {
            balance: to.balance,
            ledger_len: to_len,
        },
        performed_at: now,
        reverted: false,
    };

    // History is copied onto the target, after its own entries, under fresh
    // ids; the source keeps its history as audit trail.
    for entry in from_entries {
        let mut copy = entry;
        copy.id = Uuid::new_v4();
        copy.account = to_id.to_string();
        tx.append_entry(copy);
    }

    // Balance transplants: copied, never summed.
    to.balance = from.balance;
    from.balance = 0;
    tx.put_account(from);
    tx.put_account(to);

    let mut log = tx.migrations();
    log.push(record.clone());
    tx.put_migrations(log);

    Ok(record)
}

/// Revert the newest migration, once
pub(crate) fn revert_last(tx: &mut Txn) -> Result<MigrationRecord, LedgerError> {
    let mut log = tx.migrations();
    let record = match log.last_mut() {
        Some(record) if !record.reverted => record,
        _ => return Err(LedgerError::NothingToRevert),
    };

    let mut from = tx.account(&record.from)?;
    let mut to = tx.account(&record.to)?;
    // Stamp the target history length so a concurrent append conflicts.
    tx.ledger_len(&record.to);

    from.balance = record.prior_from.balance;
    to.balance = record.prior_to.balance;
    tx.truncate_ledger(&record.to, record.prior_to.ledger_len);
    tx.put_account(from);
    tx.put_account(to);

    record.reverted = true;
    let reverted = record.clone();
    tx.put_migrations(log);

    Ok(reverted)
}
