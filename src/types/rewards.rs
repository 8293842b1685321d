//! Letter and team-link types
//!
//! Letters and team links are the two reward-bearing records outside the
//! shop: an approved letter credits both correspondents, and a completed
//! five-member team credits every member once.

use super::account::AccountId;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Members needed before a team link pays its completion bonus
pub const TEAM_SIZE: usize = 5;

/// Approval state of a letter
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LetterStatus {
    Pending,
    Approved,
}

/// A letter awaiting or past staff approval
///
/// The letter body lives with the UI layer; the ledger only needs the
/// correspondents and the approval state that gates the reward.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Letter {
    pub id: Uuid,
    pub sender: AccountId,
    pub receiver: AccountId,
    pub status: LetterStatus,
    pub created_at: DateTime<Utc>,
}

/// Team identity (a join token shared among members)
pub type TeamId = String;

/// A team-link record
///
/// Members are distinct; once the fifth joins, the completion bonus is paid
/// and `bonus_granted` blocks any re-trigger.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TeamLink {
    pub id: TeamId,
    pub members: Vec<AccountId>,
    pub bonus_granted: bool,
    pub created_at: DateTime<Utc>,
}

impl TeamLink {
    pub fn new(id: TeamId, created_at: DateTime<Utc>) -> Self {
        TeamLink {
            id,
            members: Vec::new(),
            bonus_granted: false,
            created_at,
        }
    }

    pub fn is_complete(&self) -> bool {
        self.members.len() >= TEAM_SIZE
    }
}

/// Aggregated result of a booth/teacher batch grant
///
/// The batch is best-effort: each target is processed independently and a
/// failure never aborts the rest.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct BatchGrantOutcome {
    pub granted: usize,
    pub failed: usize,

    /// One human-readable message per failed target, in input order
    pub errors: Vec<String>,
}
