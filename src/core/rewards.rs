//! Letter, batch-grant, and team-bonus operations
//!
//! The reward operations that are not code redemptions: approving a letter
//! credits both correspondents, a booth/teacher batch grant credits a list
//! of targets best-effort, and the fifth member joining a team link pays
//! every member the completion bonus exactly once.

use super::policy;
use super::{ensure_operable, LETTER_REWARD_POINTS, TEAM_BONUS_POINTS};
use crate::store::Txn;
use crate::types::{
    LedgerError, Letter, LetterStatus, TeamLink, TEAM_SIZE,
};
use chrono::{DateTime, Utc};
use uuid::Uuid;

/// Create a pending letter between two existing accounts
pub(crate) fn submit_letter(
    tx: &mut Txn,
    sender_id: &str,
    receiver_id: &str,
    now: DateTime<Utc>,
) -> Result<Letter, LedgerError> {
    if sender_id == receiver_id {
        return Err(LedgerError::invalid("a letter needs two distinct accounts"));
    }
    let settings = tx.settings();
    let sender = tx.account(sender_id)?;
    ensure_operable(&sender, &settings, now)?;
    tx.account(receiver_id)?;

    let letter = Letter {
        id: Uuid::new_v4(),
        sender: sender_id.to_string(),
        receiver: receiver_id.to_string(),
        status: LetterStatus::Pending,
        created_at: now,
    };
    tx.put_letter(letter.clone());
    Ok(letter)
}

/// Staff approval of a pending letter
///
/// Credits sender and receiver the fixed letter reward, each independently
/// capped. Approving an already-approved letter is rejected, never a double
/// credit.
pub(crate) fn approve_letter(
    tx: &mut Txn,
    letter_id: Uuid,
    now: DateTime<Utc>,
) -> Result<(), LedgerError> {
    let settings = tx.settings();
    let mut letter = tx.letter(letter_id)?;
    if letter.status == LetterStatus::Approved {
        return Err(LedgerError::LetterAlreadyApproved { letter: letter_id });
    }

    let mut sender = tx.account(&letter.sender)?;
    let mut receiver = tx.account(&letter.receiver)?;
    policy::apply_capped_credit(
        tx,
        &mut sender,
        LETTER_REWARD_POINTS,
        &settings,
        "Letter approved (sent)",
        now,
    )?;
    policy::apply_capped_credit(
        tx,
        &mut receiver,
        LETTER_REWARD_POINTS,
        &settings,
        "Letter approved (received)",
        now,
    )?;
    tx.put_account(sender);
    tx.put_account(receiver);

    letter.status = LetterStatus::Approved;
    tx.put_letter(letter);
    Ok(())
}

/// Credit one batch-grant target inside its own transaction
///
/// The batch loop lives in the engine; this is the per-target unit of work.
/// Restricted targets fail like unknown ones: reported, never fatal to the
/// rest of the batch.
pub(crate) fn grant_points(
    tx: &mut Txn,
    target_id: &str,
    amount: i64,
    description: &str,
    now: DateTime<Utc>,
) -> Result<policy::CreditDecision, LedgerError> {
    let settings = tx.settings();
    let mut target = tx.account(target_id)?;
    if target.is_restricted(now) {
        return Err(LedgerError::restricted(target_id, target.restricted_until));
    }
    let decision = policy::apply_capped_credit(tx, &mut target, amount, &settings, description, now)?;
    tx.put_account(target);
    Ok(decision)
}

/// What a team join did
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TeamJoinOutcome {
    pub member_count: usize,

    /// True when this join completed the team and paid the bonus
    pub completed: bool,
}

/// Join a team link, paying the completion bonus on the fifth member
///
/// The team link is created on first join. The `bonus_granted` flag on the
/// link guards against any re-trigger once the team has been complete.
pub(crate) fn join_team(
    tx: &mut Txn,
    account_id: &str,
    team_id: &str,
    now: DateTime<Utc>,
) -> Result<TeamJoinOutcome, LedgerError> {
    if team_id.trim().is_empty() {
        return Err(LedgerError::invalid("team id must not be empty"));
    }
    let settings = tx.settings();
    let mut joiner = tx.account(account_id)?;
    ensure_operable(&joiner, &settings, now)?;

    let mut team = tx
        .team(team_id)
        .unwrap_or_else(|| TeamLink::new(team_id.to_string(), now));
    if team.members.iter().any(|member| member == account_id) {
        return Err(LedgerError::AlreadyTeamMember {
            account: account_id.to_string(),
            team: team_id.to_string(),
        });
    }
    if team.is_complete() {
        return Err(LedgerError::TeamFull {
            team: team_id.to_string(),
        });
    }

    team.members.push(account_id.to_string());
    joiner.active_team = Some(team_id.to_string());

    let completed = team.members.len() == TEAM_SIZE && !team.bonus_granted;
    if completed {
        team.bonus_granted = true;
        for member_id in team.members.clone() {
            if member_id == account_id {
                policy::apply_capped_credit(
                    tx,
                    &mut joiner,
                    TEAM_BONUS_POINTS,
                    &settings,
                    &format!("Team {team_id} completed"),
                    now,
                )?;
            } else {
                let mut member = tx.account(&member_id)?;
                policy::apply_capped_credit(
                    tx,
                    &mut member,
                    TEAM_BONUS_POINTS,
                    &settings,
                    &format!("Team {team_id} completed"),
                    now,
                )?;
                tx.put_account(member);
            }
        }
    }

    let member_count = team.members.len();
    tx.put_account(joiner);
    tx.put_team(team);

    Ok(TeamJoinOutcome {
        member_count,
        completed,
    })
}
