//! Account-related types for the Lak ledger
//!
//! This module defines the Account structure, the role model, and the
//! append-only LedgerEntry records that make up an account's audit trail.

use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Stable account identity
///
/// One account per business student/staff id; the id string is the identity
/// handed to the ledger by the identity provider.
pub type AccountId = String;

/// Role attached to an account
///
/// Roles gate a handful of business rules: staff point-of-sale roles may
/// bypass the online-shop toggle, and admins may operate during maintenance.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    Student,
    Teacher,
    Council,
    Admin,
    Kiosk,
}

impl Role {
    /// Whether this role operates a staff point of sale
    ///
    /// POS roles may complete purchases while the online shop toggle is off.
    pub fn is_point_of_sale(&self) -> bool {
        matches!(
            self,
            Role::Teacher | Role::Council | Role::Admin | Role::Kiosk
        )
    }

    /// Whether this role may operate while maintenance mode is on
    pub fn bypasses_maintenance(&self) -> bool {
        matches!(self, Role::Admin)
    }
}

/// Per-account ledger state
///
/// The balance is the circulating point total and is never negative.
/// Daily-earn tracking resets whenever `daily_earned_on` differs from the
/// current date. Accounts are never hard-deleted; restrictions and roles
/// carry the soft state.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Account {
    /// Stable identity, 1:1 with the business student/staff id
    pub id: AccountId,

    /// Circulating balance in points (invariant: >= 0)
    pub balance: i64,

    /// Points counted against the daily earn cap on `daily_earned_on`
    pub daily_earned: i64,

    /// The day `daily_earned` applies to
    pub daily_earned_on: NaiveDate,

    /// Role of the account holder
    pub role: Role,

    /// End of the current restriction window, if any
    pub restricted_until: Option<DateTime<Utc>>,

    /// Human-readable reason for the restriction window
    pub restriction_reason: Option<String>,

    /// The account's own perpetually reusable mate code (normalized form)
    pub mate_code: String,

    /// Team the account is currently linked to, if any
    pub active_team: Option<String>,
}

impl Account {
    /// Create a fresh account with a zero balance
    pub fn new(id: AccountId, role: Role, mate_code: String, today: NaiveDate) -> Self {
        Account {
            id,
            balance: 0,
            daily_earned: 0,
            daily_earned_on: today,
            role,
            restricted_until: None,
            restriction_reason: None,
            mate_code,
            active_team: None,
        }
    }

    /// Whether the account is inside an active restriction window
    ///
    /// An expired `restricted_until` is treated as no restriction; the field
    /// is left in place as history until a staff member lifts it.
    pub fn is_restricted(&self, now: DateTime<Utc>) -> bool {
        self.restricted_until.is_some_and(|until| until > now)
    }

    /// Points already earned today, accounting for the daily reset
    ///
    /// Returns 0 when the stored earn date is not `today`; the stored
    /// counter belongs to a previous day and resets on the next credit.
    pub fn earned_today(&self, today: NaiveDate) -> i64 {
        if self.daily_earned_on == today {
            self.daily_earned
        } else {
            0
        }
    }
}

/// Direction of a ledger entry
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum EntryKind {
    Credit,
    Debit,
}

/// One immutable line in an account's audit trail
///
/// Entries are strictly append-only per account and ordered by creation.
/// Credits carry a positive amount, debits a negative one. Entries flagged
/// `excluded_from_circulation` record points banked past the holding cap
/// (the piggy bank) and are not part of the circulating balance.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LedgerEntry {
    pub id: Uuid,
    pub account: AccountId,

    /// Signed amount: positive for credits, negative for debits
    pub amount: i64,
    pub kind: EntryKind,
    pub description: String,
    pub created_at: DateTime<Utc>,

    /// Piggy-bank flag: banked overflow, not circulating balance
    pub excluded_from_circulation: bool,
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn day(y: i32, m: u32, d: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(y, m, d).unwrap()
    }

    #[test]
    fn test_new_account_starts_empty() {
        let account = Account::new(
            "s-1001".to_string(),
            Role::Student,
            "mate-abc123".to_string(),
            day(2026, 3, 2),
        );

        assert_eq!(account.balance, 0);
        assert_eq!(account.daily_earned, 0);
        assert_eq!(account.daily_earned_on, day(2026, 3, 2));
        assert!(account.restricted_until.is_none());
        assert!(account.active_team.is_none());
    }

    #[test]
    fn test_earned_today_resets_on_new_day() {
        let mut account = Account::new(
            "s-1001".to_string(),
            Role::Student,
            "mate-abc123".to_string(),
            day(2026, 3, 2),
        );
        account.daily_earned = 12;

        assert_eq!(account.earned_today(day(2026, 3, 2)), 12);
        assert_eq!(account.earned_today(day(2026, 3, 3)), 0);
    }

    #[test]
    fn test_restriction_window_expires() {
        let mut account = Account::new(
            "s-1001".to_string(),
            Role::Student,
            "mate-abc123".to_string(),
            day(2026, 3, 2),
        );
        account.restricted_until = Some(Utc.with_ymd_and_hms(2026, 3, 5, 12, 0, 0).unwrap());

        let before = Utc.with_ymd_and_hms(2026, 3, 4, 0, 0, 0).unwrap();
        let after = Utc.with_ymd_and_hms(2026, 3, 6, 0, 0, 0).unwrap();
        assert!(account.is_restricted(before));
        assert!(!account.is_restricted(after));
    }

    #[test]
    fn test_pos_roles() {
        assert!(Role::Kiosk.is_point_of_sale());
        assert!(Role::Teacher.is_point_of_sale());
        assert!(Role::Council.is_point_of_sale());
        assert!(Role::Admin.is_point_of_sale());
        assert!(!Role::Student.is_point_of_sale());
    }

    #[test]
    fn test_only_admin_bypasses_maintenance() {
        assert!(Role::Admin.bypasses_maintenance());
        assert!(!Role::Teacher.bypasses_maintenance());
        assert!(!Role::Kiosk.bypasses_maintenance());
    }
}
