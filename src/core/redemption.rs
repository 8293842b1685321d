//! Code redemption engine
//!
//! Validates and consumes redeemable codes. Dispatch is a match over the
//! [`CodeKind`] sum type; every variant goes through the same
//! verify-then-mutate sequence and credits through the limit policy.

use super::policy;
use super::{ensure_operable, CreditDecision};
use crate::store::Txn;
use crate::types::{normalize_code, AccountId, CodeKind, LedgerError};
use chrono::{DateTime, Utc};
use tracing::warn;

/// What a successful redemption did
#[derive(Debug, Clone, PartialEq)]
pub struct RedemptionOutcome {
    /// Normalized code that was redeemed
    pub code: String,

    /// Points applied to the redeemer's circulating balance
    pub credited: i64,

    /// Redeemer overflow banked past the caps
    pub banked: i64,

    /// Second account credited by dual-reward kinds, with its applied amount
    pub counterparty: Option<(AccountId, i64)>,
}

/// Redeem a code for `redeemer_id` inside an active transaction
///
/// `partner_id` names the second beneficiary for hidden-partner codes and
/// must be absent for every other kind.
///
/// # Errors
///
/// `CodeNotFound`, `CodeAlreadyUsed`, `SelfRedemption`, plus the standard
/// gates (`AccountRestricted`, `MaintenanceClosed`).
pub(crate) fn attempt_redeem(
    tx: &mut Txn,
    redeemer_id: &str,
    raw_code: &str,
    partner_id: Option<&str>,
    now: DateTime<Utc>,
) -> Result<RedemptionOutcome, LedgerError> {
    let normalized = normalize_code(raw_code);
    if normalized.is_empty() {
        return Err(LedgerError::invalid("code must not be empty"));
    }

    let settings = tx.settings();
    let mut redeemer = tx.account(redeemer_id)?;
    ensure_operable(&redeemer, &settings, now)?;

    let mut code = tx.code(&normalized)?;

    let outcome = match code.kind.clone() {
        CodeKind::Standard => {
            reject_partner(partner_id)?;
            consume(tx, &mut code, redeemer_id)?;
            let decision = policy::apply_capped_credit(
                tx,
                &mut redeemer,
                code.value,
                &settings,
                &format!("Code redemption ({normalized})"),
                now,
            )?;
            outcome_of(&normalized, decision, None)
        }
        CodeKind::HiddenPartner => {
            let partner_id = partner_id
                .ok_or_else(|| LedgerError::invalid("hidden codes require a partner account"))?;
            if partner_id == redeemer_id {
                return Err(LedgerError::invalid(
                    "partner account must differ from the redeemer",
                ));
            }
            let mut partner = tx.account(partner_id)?;
            consume(tx, &mut code, redeemer_id)?;
            let decision = policy::apply_capped_credit(
                tx,
                &mut redeemer,
                code.value,
                &settings,
                &format!("Hidden code redemption ({normalized})"),
                now,
            )?;
            let partner_decision = policy::apply_capped_credit(
                tx,
                &mut partner,
                code.value,
                &settings,
                &format!("Hidden code partner reward ({normalized})"),
                now,
            )?;
            tx.put_account(partner);
            outcome_of(
                &normalized,
                decision,
                Some((partner_id.to_string(), partner_decision.applied)),
            )
        }
        CodeKind::Mate { owner, mut redeemed_by } => {
            if owner == redeemer_id {
                return Err(LedgerError::self_redemption(redeemer_id));
            }
            let mut owner_account = tx.account(&owner)?;
            let decision = policy::apply_capped_credit(
                tx,
                &mut redeemer,
                code.value,
                &settings,
                &format!("Mate code of {owner}"),
                now,
            )?;
            let owner_decision = policy::apply_capped_credit(
                tx,
                &mut owner_account,
                code.value,
                &settings,
                &format!("Mate code used by {redeemer_id}"),
                now,
            )?;
            tx.put_account(owner_account);
            // Usage history is display-only and never gates reuse.
            redeemed_by.push(redeemer_id.to_string());
            code.kind = CodeKind::Mate { owner: owner.clone(), redeemed_by };
            tx.put_code(code);
            outcome_of(&normalized, decision, Some((owner, owner_decision.applied)))
        }
        CodeKind::StaffOnetime { intended_for } => {
            reject_partner(partner_id)?;
            if intended_for != redeemer_id {
                // Recorded for audit only; redemption proceeds.
                warn!(
                    code = %normalized,
                    intended_for = %intended_for,
                    redeemer = %redeemer_id,
                    "staff code redeemed by an account other than its intended recipient"
                );
            }
            consume(tx, &mut code, redeemer_id)?;
            let decision = policy::apply_capped_credit(
                tx,
                &mut redeemer,
                code.value,
                &settings,
                &format!("Staff code redemption ({normalized})"),
                now,
            )?;
            outcome_of(&normalized, decision, None)
        }
    };

    tx.put_account(redeemer);
    Ok(outcome)
}

/// Transition a single-use code from unused to consumed, exactly once
fn consume(
    tx: &mut Txn,
    code: &mut crate::types::RedeemableCode,
    redeemer_id: &str,
) -> Result<(), LedgerError> {
    if code.consumed {
        return Err(LedgerError::code_already_used(&code.code));
    }
    code.consumed = true;
    code.consumed_by = Some(redeemer_id.to_string());
    tx.put_code(code.clone());
    Ok(())
}

fn reject_partner(partner_id: Option<&str>) -> Result<(), LedgerError> {
    if partner_id.is_some() {
        return Err(LedgerError::invalid(
            "this code kind does not take a partner account",
        ));
    }
    Ok(())
}

fn outcome_of(
    code: &str,
    decision: CreditDecision,
    counterparty: Option<(AccountId, i64)>,
) -> RedemptionOutcome {
    RedemptionOutcome {
        code: code.to_string(),
        credited: decision.applied,
        banked: decision.banked,
        counterparty,
    }
}
