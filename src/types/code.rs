//! Redeemable code types
//!
//! A code is a token redeemable for points. The four kinds differ in reuse
//! and dual-reward semantics and are modelled as a tagged union so the
//! redemption engine dispatches on the variant instead of sniffing fields.

use super::account::AccountId;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Normalize a raw code token for storage and lookup
///
/// Codes are case-insensitive; the normalized (trimmed, lowercased) form is
/// the document key.
pub fn normalize_code(raw: &str) -> String {
    raw.trim().to_lowercase()
}

/// The kind of a redeemable code
///
/// - `Standard`: single-use, credits the redeemer.
/// - `Mate`: owned by an account, perpetually reusable, credits redeemer and
///   owner on every use. The usage list is kept for display only.
/// - `HiddenPartner`: single-use, credits the redeemer and a partner account
///   the redeemer names.
/// - `StaffOnetime`: single-use, created by staff for a specific intended
///   recipient (recorded for audit, not enforced at redemption).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum CodeKind {
    Standard,
    Mate {
        owner: AccountId,
        /// Accounts that have used this code, in redemption order
        redeemed_by: Vec<AccountId>,
    },
    HiddenPartner,
    StaffOnetime { intended_for: AccountId },
}

/// A redeemable code document
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RedeemableCode {
    /// Normalized token, unique across all codes
    pub code: String,

    /// Points credited per redemption (per party for dual-reward kinds)
    pub value: i64,
    pub kind: CodeKind,

    /// Single-use consumption flag; never set for `Mate` codes
    pub consumed: bool,
    pub consumed_by: Option<AccountId>,
    pub created_at: DateTime<Utc>,
}

impl RedeemableCode {
    pub fn new(raw_code: &str, value: i64, kind: CodeKind, created_at: DateTime<Utc>) -> Self {
        RedeemableCode {
            code: normalize_code(raw_code),
            value,
            kind,
            consumed: false,
            consumed_by: None,
            created_at,
        }
    }

    /// Whether this code survives redemption (mate codes never consume)
    pub fn is_reusable(&self) -> bool {
        matches!(self.kind, CodeKind::Mate { .. })
    }
}
