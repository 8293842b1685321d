//! CSV format handling for operation records and balance output
//!
//! This module centralizes the CSV concerns of the batch-replay binary:
//! - OpRecord structure for deserialization
//! - Conversion from CSV rows to typed ledger operations
//! - Balance output serialization
//!
//! Conversion functions are pure (no I/O) for easy testing.

use crate::store::LedgerStore;
use crate::types::{AccountId, LedgerError, ProductId, Role, TeamId};
use serde::Deserialize;
use std::io::Write;

/// Raw CSV row of the operation log
///
/// Columns: `op, account, target, value, extra`. Which columns are required
/// depends on the operation; see [`convert_record`].
#[derive(Debug, Deserialize, Clone, PartialEq)]
pub struct OpRecord {
    pub op: String,
    pub account: Option<String>,
    pub target: Option<String>,
    pub value: Option<i64>,
    pub extra: Option<String>,
}

/// One typed ledger operation parsed from the log
#[derive(Debug, Clone, PartialEq)]
pub enum Operation {
    /// `open,<account>,<role>,,`
    Open { account: AccountId, role: Role },

    /// `code,,<token>,<value>,`
    CreateCode { code: String, value: i64 },

    /// `redeem,<account>,<token>,,[partner]`
    Redeem {
        account: AccountId,
        code: String,
        partner: Option<AccountId>,
    },

    /// `grant,<granter>,<target>,<amount>,`
    Grant {
        granter: AccountId,
        target: AccountId,
        amount: i64,
    },

    /// `product,,<id>,<price>,<stock>`
    Product {
        id: ProductId,
        price: i64,
        stock: u32,
    },

    /// `buy,<account>,<product>,<quantity>,`
    Buy {
        account: AccountId,
        product: ProductId,
        quantity: u32,
    },

    /// `letter,<sender>,<receiver>,,` (submits and approves in one step)
    Letter {
        sender: AccountId,
        receiver: AccountId,
    },

    /// `team,<account>,<team>,,`
    JoinTeam { account: AccountId, team: TeamId },

    /// `migrate,<from>,<to>,,`
    Migrate { from: AccountId, to: AccountId },

    /// `revert,,,,`
    Revert,
}

/// Convert a raw CSV row into a typed operation
pub fn convert_record(record: OpRecord) -> Result<Operation, LedgerError> {
    let op = record.op.trim().to_lowercase();
    match op.as_str() {
        "open" => Ok(Operation::Open {
            account: required(&record.account, "open", "account")?,
            role: parse_role(&required(&record.target, "open", "role")?)?,
        }),
        "code" => Ok(Operation::CreateCode {
            code: required(&record.target, "code", "token")?,
            value: positive(record.value, "code", "value")?,
        }),
        "redeem" => Ok(Operation::Redeem {
            account: required(&record.account, "redeem", "account")?,
            code: required(&record.target, "redeem", "token")?,
            partner: record.extra.as_deref().map(str::trim).filter(|s| !s.is_empty()).map(String::from),
        }),
        "grant" => Ok(Operation::Grant {
            granter: required(&record.account, "grant", "granter")?,
            target: required(&record.target, "grant", "target")?,
            amount: positive(record.value, "grant", "amount")?,
        }),
        "product" => Ok(Operation::Product {
            id: required(&record.target, "product", "id")?,
            price: positive(record.value, "product", "price")?,
            stock: parse_stock(record.extra.as_deref())?,
        }),
        "buy" => {
            let quantity = positive(record.value, "buy", "quantity")?;
            let quantity = u32::try_from(quantity)
                .map_err(|_| LedgerError::invalid("buy quantity out of range"))?;
            Ok(Operation::Buy {
                account: required(&record.account, "buy", "account")?,
                product: required(&record.target, "buy", "product")?,
                quantity,
            })
        }
        "letter" => Ok(Operation::Letter {
            sender: required(&record.account, "letter", "sender")?,
            receiver: required(&record.target, "letter", "receiver")?,
        }),
        "team" => Ok(Operation::JoinTeam {
            account: required(&record.account, "team", "account")?,
            team: required(&record.target, "team", "team")?,
        }),
        "migrate" => Ok(Operation::Migrate {
            from: required(&record.account, "migrate", "from")?,
            to: required(&record.target, "migrate", "to")?,
        }),
        "revert" => Ok(Operation::Revert),
        other => Err(LedgerError::invalid(format!("unknown operation '{other}'"))),
    }
}

fn required(field: &Option<String>, op: &str, name: &str) -> Result<String, LedgerError> {
    field
        .as_deref()
        .map(str::trim)
        .filter(|value| !value.is_empty())
        .map(String::from)
        .ok_or_else(|| LedgerError::invalid(format!("{op} requires a {name}")))
}

fn positive(value: Option<i64>, op: &str, name: &str) -> Result<i64, LedgerError> {
    match value {
        Some(value) if value > 0 => Ok(value),
        _ => Err(LedgerError::invalid(format!(
            "{op} requires a positive {name}"
        ))),
    }
}

fn parse_role(raw: &str) -> Result<Role, LedgerError> {
    match raw.to_lowercase().as_str() {
        "student" => Ok(Role::Student),
        "teacher" => Ok(Role::Teacher),
        "council" => Ok(Role::Council),
        "admin" => Ok(Role::Admin),
        "kiosk" => Ok(Role::Kiosk),
        other => Err(LedgerError::invalid(format!("unknown role '{other}'"))),
    }
}

fn parse_stock(raw: Option<&str>) -> Result<u32, LedgerError> {
    raw.map(str::trim)
        .filter(|value| !value.is_empty())
        .ok_or_else(|| LedgerError::invalid("product requires a stock count"))?
        .parse()
        .map_err(|_| LedgerError::invalid("product stock must be a non-negative integer"))
}

/// Write final balances to CSV
///
/// Columns: `account, balance, banked, role`. Accounts come pre-sorted from
/// the store snapshot for deterministic output; `banked` is the sum of the
/// account's piggy-bank entries.
pub fn write_balances_csv(
    store: &LedgerStore,
    output: &mut dyn Write,
) -> Result<(), LedgerError> {
    let mut writer = csv::Writer::from_writer(output);
    writer.write_record(["account", "balance", "banked", "role"])?;

    for account in store.accounts_snapshot() {
        let banked: i64 = store
            .ledger_snapshot(&account.id)
            .iter()
            .filter(|entry| entry.excluded_from_circulation)
            .map(|entry| entry.amount)
            .sum();
        let role = match account.role {
            Role::Student => "student",
            Role::Teacher => "teacher",
            Role::Council => "council",
            Role::Admin => "admin",
            Role::Kiosk => "kiosk",
        };
        writer.write_record(&[
            account.id.clone(),
            account.balance.to_string(),
            banked.to_string(),
            role.to_string(),
        ])?;
    }

    writer.flush()?;
    Ok(())
}
