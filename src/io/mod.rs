//! I/O handling for the batch-replay surface
//!
//! Reads an operation log in CSV form, drives the engine with it, and
//! writes the final balances back out as CSV. Malformed rows and rejected
//! operations are recoverable: they are logged and skipped so a replay
//! never stops halfway through a log.

pub mod csv_format;

pub use csv_format::{convert_record, write_balances_csv, OpRecord, Operation};

use crate::core::{LedgerEngine, PurchaseRequest};
use crate::types::{CartItem, LedgerError, OperationReply};
use std::io::Read;
use tracing::{info, warn};

/// Counts of a finished replay
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct ReplaySummary {
    pub applied: usize,
    pub skipped: usize,
}

/// Replay an operation log against the engine
///
/// Each row is parsed, converted, and applied independently; a bad row or a
/// rejected operation increments `skipped` and the replay continues. Only
/// I/O failures on the reader itself abort the run.
pub fn replay<R: Read>(engine: &LedgerEngine, reader: R) -> Result<ReplaySummary, LedgerError> {
    let mut csv_reader = csv::ReaderBuilder::new()
        .trim(csv::Trim::All)
        .flexible(true)
        .from_reader(reader);

    let mut summary = ReplaySummary::default();
    for (row, result) in csv_reader.deserialize::<OpRecord>().enumerate() {
        let line = row as u64 + 2; // header occupies line 1
        let record = match result {
            Ok(record) => record,
            Err(error) => {
                let error: LedgerError = error.into();
                warn!(line, %error, "skipping malformed row");
                summary.skipped += 1;
                continue;
            }
        };

        let reply = OperationReply::from_result(
            convert_record(record).and_then(|operation| apply(engine, operation)),
            |message| message.clone(),
        );
        if reply.success {
            info!(line, message = %reply.message, "operation applied");
            summary.applied += 1;
        } else {
            warn!(line, message = %reply.message, "operation rejected");
            summary.skipped += 1;
        }
    }

    Ok(summary)
}

/// Apply one typed operation, returning the reply line for the log
fn apply(engine: &LedgerEngine, operation: Operation) -> Result<String, LedgerError> {
    match operation {
        Operation::Open { account, role } => engine
            .open_account(&account, role)
            .map(|opened| format!("opened {} with mate code {}", opened.id, opened.mate_code)),
        Operation::CreateCode { code, value } => engine
            .create_standard_code(&code, value)
            .map(|created| format!("code {created} worth {value}")),
        Operation::Redeem {
            account,
            code,
            partner,
        } => engine
            .redeem_code(&account, &code, partner.as_deref())
            .map(|outcome| {
                format!(
                    "credited {} to {account} ({} banked)",
                    outcome.credited, outcome.banked
                )
            }),
        Operation::Grant {
            granter,
            target,
            amount,
        } => {
            let outcome =
                engine.batch_grant(&granter, &[target.clone()], amount, "Teacher grant")?;
            if outcome.failed > 0 {
                Err(LedgerError::invalid(outcome.errors.join("; ")))
            } else {
                Ok(format!("granted {amount} to {target}"))
            }
        }
        Operation::Product { id, price, stock } => engine
            .stock_product(&id, &id, price, stock)
            .map(|_| format!("stocked {stock} x {id} at {price}")),
        Operation::Buy {
            account,
            product,
            quantity,
        } => engine
            .purchase(&PurchaseRequest {
                account: account.clone(),
                items: vec![CartItem {
                    product,
                    quantity,
                }],
                cashier: None,
                staff_discount_percent: None,
                expected_total: None,
            })
            .map(|receipt| format!("receipt {} for {}", receipt.code, receipt.total)),
        Operation::Letter { sender, receiver } => {
            let letter = engine.submit_letter(&sender, &receiver)?;
            engine.approve_letter(letter.id)?;
            Ok(format!("letter {sender} -> {receiver} approved"))
        }
        Operation::JoinTeam { account, team } => {
            engine.join_team(&account, &team).map(|outcome| {
                if outcome.completed {
                    format!("team {team} completed with {account}")
                } else {
                    format!("{account} joined team {team} ({}/5)", outcome.member_count)
                }
            })
        }
        Operation::Migrate { from, to } => engine
            .migrate_account(&from, &to)
            .map(|record| format!("migrated {from} -> {to} ({})", record.id)),
        Operation::Revert => engine
            .revert_last_migration()
            .map(|record| format!("reverted migration {}", record.id)),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_replay_continues_past_rejections() {
        let engine = LedgerEngine::new();
        let log = "\
op,account,target,value,extra
open,s-1001,student,,
code,,lak-games,10,
redeem,s-1001,lak-games,,
redeem,s-1001,lak-games,,
teleport,,,,
";

        let summary = replay(&engine, log.as_bytes()).unwrap();

        // The duplicate redemption and the unknown op are skipped.
        assert_eq!(summary.applied, 3);
        assert_eq!(summary.skipped, 2);
        assert_eq!(
            engine.store().account_snapshot("s-1001").unwrap().balance,
            10
        );
    }

    #[test]
    fn test_replay_balances_roundtrip() {
        let engine = LedgerEngine::new();
        let log = "\
op,account,target,value,extra
open,t-1,teacher,,
open,s-1001,student,,
grant,t-1,s-1001,7,
";
        replay(&engine, log.as_bytes()).unwrap();

        let mut out = Vec::new();
        write_balances_csv(engine.store(), &mut out).unwrap();
        let rendered = String::from_utf8(out).unwrap();

        assert!(rendered.starts_with("account,balance,banked,role\n"));
        assert!(rendered.contains("s-1001,7,0,student"));
        assert!(rendered.contains("t-1,0,0,teacher"));
    }
}
