//! Limit policy enforcement
//!
//! Every reward-granting operation routes its proposed credit through this
//! module before touching a balance. The policy splits a proposed amount
//! into the portion applied to the circulating balance and the portion
//! banked past the caps (the piggy bank). The evaluation itself is pure;
//! [`apply_capped_credit`] performs the resulting writes inside the
//! caller's transaction.

use crate::store::Txn;
use crate::types::{Account, LedgerError, SystemSettings};
use chrono::{DateTime, NaiveDate, Utc};

/// How a proposed credit splits under the active caps
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CreditDecision {
    /// Points added to the circulating balance (counts toward today's earn)
    pub applied: i64,

    /// Overflow recorded as an excluded-from-circulation entry
    pub banked: i64,
}

impl CreditDecision {
    /// Total points recorded across both entries
    pub fn total(&self) -> i64 {
        self.applied + self.banked
    }
}

/// Split a proposed credit under the daily-earn and holding caps
///
/// The daily cap limits what the account may still earn on `today`
/// (the stored counter resets when its date is stale); the holding cap
/// limits how far the circulating balance may rise. Whichever cap bites
/// harder wins, and the remainder is banked. With `point_limit_enabled`
/// off the full amount is applied.
pub fn evaluate_credit(
    proposed: i64,
    account: &Account,
    settings: &SystemSettings,
    today: NaiveDate,
) -> CreditDecision {
    if !settings.point_limit_enabled {
        return CreditDecision {
            applied: proposed,
            banked: 0,
        };
    }

    let daily_headroom = (settings.daily_earn_cap - account.earned_today(today)).max(0);
    let holding_headroom = (settings.holding_cap - account.balance).max(0);
    let applied = proposed.min(daily_headroom).min(holding_headroom);

    CreditDecision {
        applied,
        banked: proposed - applied,
    }
}

/// Grant a capped credit inside an active transaction
///
/// Evaluates the policy, credits the applied portion, records the banked
/// overflow as a piggy-bank entry, and rolls the daily-earn counter
/// forward. The caller stages the account document once all of its
/// mutations are done.
pub fn apply_capped_credit(
    tx: &mut Txn,
    account: &mut Account,
    proposed: i64,
    settings: &SystemSettings,
    description: &str,
    now: DateTime<Utc>,
) -> Result<CreditDecision, LedgerError> {
    if proposed <= 0 {
        return Err(LedgerError::invalid("credit amount must be positive"));
    }

    let today = now.date_naive();
    let decision = evaluate_credit(proposed, account, settings, today);

    if decision.applied > 0 {
        tx.credit(account, decision.applied, description, false, now)?;
        // With the policy off nothing counts against the caps; the counter
        // only tracks credits the daily cap actually governed.
        if settings.point_limit_enabled {
            account.daily_earned = account
                .earned_today(today)
                .checked_add(decision.applied)
                .ok_or_else(|| LedgerError::overflow("daily earn", &account.id))?;
            account.daily_earned_on = today;
        }
    }
    if decision.banked > 0 {
        let banked_description = format!("{description} (over cap, banked)");
        tx.credit(account, decision.banked, &banked_description, true, now)?;
    }

    Ok(decision)
}
