//! Error types for the Lak ledger
//!
//! This module defines all errors a ledger operation can surface. Every
//! variant belongs to exactly one category of the taxonomy below, which
//! callers use to decide whether a retry can ever help.
//!
//! # Error Categories
//!
//! - **Validation**: malformed input, rejected before any transaction
//! - **NotFound**: unknown account/code/product/record
//! - **Conflict**: the current state cannot accept the change (used code,
//!   short stock, short balance, duplicate transitions)
//! - **Policy**: a business toggle or window forbids the operation
//! - **Transient**: store contention or I/O; safe to retry the whole call
//!
//! Deterministic categories (everything but Transient) must never be
//! retried automatically.

use super::account::AccountId;
use super::purchase::ProductId;
use chrono::{DateTime, Utc};
use thiserror::Error;
use uuid::Uuid;

/// Coarse classification of a ledger error
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorCategory {
    Validation,
    NotFound,
    Conflict,
    Policy,
    Transient,
}

/// Main error type for ledger operations
#[derive(Debug, Clone, PartialEq, Error)]
pub enum LedgerError {
    /// Malformed argument rejected before any transaction was opened
    #[error("Invalid request: {reason}")]
    InvalidArgument { reason: String },

    /// No account exists for the given id
    #[error("Account {account} not found")]
    AccountNotFound { account: AccountId },

    /// No code exists for the given token
    #[error("Code {code} not found")]
    CodeNotFound { code: String },

    /// No product exists for the given id
    #[error("Product {product} not found")]
    ProductNotFound { product: ProductId },

    /// No purchase exists for the given id
    #[error("Purchase {purchase} not found")]
    PurchaseNotFound { purchase: Uuid },

    /// No letter exists for the given id
    #[error("Letter {letter} not found")]
    LetterNotFound { letter: Uuid },

    /// A single-use code was already consumed
    #[error("Code {code} has already been used")]
    CodeAlreadyUsed { code: String },

    /// An account tried to redeem its own mate code
    #[error("Account {account} cannot redeem its own code")]
    SelfRedemption { account: AccountId },

    /// The balance cannot cover the requested debit
    #[error("Insufficient balance for {account}: balance {balance}, required {required}")]
    InsufficientBalance {
        account: AccountId,
        balance: i64,
        required: i64,
    },

    /// A cart line asks for more units than are in stock
    #[error("Insufficient stock for {product}: in stock {stock}, requested {requested}")]
    InsufficientStock {
        product: ProductId,
        stock: u32,
        requested: u32,
    },

    /// The letter reward was already paid out
    #[error("Letter {letter} is already approved")]
    LetterAlreadyApproved { letter: Uuid },

    /// The account already belongs to the team link
    #[error("Account {account} already joined team {team}")]
    AlreadyTeamMember { account: AccountId, team: String },

    /// The team link already has its full member count
    #[error("Team {team} is already complete")]
    TeamFull { team: String },

    /// Dispute transition rejected by the purchase's current dispute state
    #[error("Purchase {purchase} has no open dispute")]
    DisputeNotOpen { purchase: Uuid },

    /// A dispute was already opened (or resolved) for this purchase
    #[error("Purchase {purchase} already has a dispute on record")]
    DisputeAlreadyOpen { purchase: Uuid },

    /// Fulfilment requested for a purchase that is not pending
    #[error("Purchase {purchase} is not awaiting fulfilment")]
    PurchaseNotPending { purchase: Uuid },

    /// No migration record is currently revertible
    #[error("No revertible migration on record")]
    NothingToRevert,

    /// The account is inside an active restriction window
    #[error("Account {account} is restricted{}", .until.map(|u| format!(" until {}", u.format("%Y-%m-%d %H:%M"))).unwrap_or_default())]
    AccountRestricted {
        account: AccountId,
        until: Option<DateTime<Utc>>,
    },

    /// The online shop toggle is off and the buyer has no POS role
    #[error("The shop is currently disabled")]
    ShopDisabled,

    /// Maintenance mode rejects all non-admin mutations
    #[error("The platform is closed for maintenance")]
    MaintenanceClosed,

    /// A balance computation would overflow
    #[error("Arithmetic overflow in {operation} for {account}")]
    ArithmeticOverflow {
        operation: String,
        account: AccountId,
    },

    /// Optimistic transaction retries were exhausted
    #[error("Store contention: transaction failed after {attempts} attempts")]
    TransactionContention { attempts: u32 },

    /// CSV parse failure in the batch-replay surface
    #[error("Parse error{}: {message}", .line.map(|l| format!(" at line {}", l)).unwrap_or_default())]
    ParseError { line: Option<u64>, message: String },

    /// I/O failure in the batch-replay surface
    #[error("I/O error: {message}")]
    IoError { message: String },
}

impl LedgerError {
    /// The taxonomy slot this error belongs to
    pub fn category(&self) -> ErrorCategory {
        match self {
            LedgerError::InvalidArgument { .. } | LedgerError::ParseError { .. } => {
                ErrorCategory::Validation
            }
            LedgerError::AccountNotFound { .. }
            | LedgerError::CodeNotFound { .. }
            | LedgerError::ProductNotFound { .. }
            | LedgerError::PurchaseNotFound { .. }
            | LedgerError::LetterNotFound { .. } => ErrorCategory::NotFound,
            LedgerError::CodeAlreadyUsed { .. }
            | LedgerError::SelfRedemption { .. }
            | LedgerError::InsufficientBalance { .. }
            | LedgerError::InsufficientStock { .. }
            | LedgerError::LetterAlreadyApproved { .. }
            | LedgerError::AlreadyTeamMember { .. }
            | LedgerError::TeamFull { .. }
            | LedgerError::DisputeNotOpen { .. }
            | LedgerError::DisputeAlreadyOpen { .. }
            | LedgerError::PurchaseNotPending { .. }
            | LedgerError::NothingToRevert
            | LedgerError::ArithmeticOverflow { .. } => ErrorCategory::Conflict,
            LedgerError::AccountRestricted { .. }
            | LedgerError::ShopDisabled
            | LedgerError::MaintenanceClosed => ErrorCategory::Policy,
            LedgerError::TransactionContention { .. } | LedgerError::IoError { .. } => {
                ErrorCategory::Transient
            }
        }
    }

    /// Whether retrying the whole call can ever succeed
    ///
    /// Only transient errors qualify; every deterministic category will fail
    /// identically on replay.
    pub fn is_retryable(&self) -> bool {
        self.category() == ErrorCategory::Transient
    }
}

// Conversions from the I/O layer used by the batch-replay binary

impl From<std::io::Error> for LedgerError {
    fn from(error: std::io::Error) -> Self {
        LedgerError::IoError {
            message: error.to_string(),
        }
    }
}

impl From<csv::Error> for LedgerError {
    fn from(error: csv::Error) -> Self {
        let line = error.position().map(|pos| pos.line());
        LedgerError::ParseError {
            line,
            message: error.to_string(),
        }
    }
}

// Helper constructors for the variants built in more than one place

impl LedgerError {
    pub fn invalid(reason: impl Into<String>) -> Self {
        LedgerError::InvalidArgument {
            reason: reason.into(),
        }
    }

    pub fn account_not_found(account: &str) -> Self {
        LedgerError::AccountNotFound {
            account: account.to_string(),
        }
    }

    pub fn code_not_found(code: &str) -> Self {
        LedgerError::CodeNotFound {
            code: code.to_string(),
        }
    }

    pub fn code_already_used(code: &str) -> Self {
        LedgerError::CodeAlreadyUsed {
            code: code.to_string(),
        }
    }

    pub fn self_redemption(account: &str) -> Self {
        LedgerError::SelfRedemption {
            account: account.to_string(),
        }
    }

    pub fn insufficient_balance(account: &str, balance: i64, required: i64) -> Self {
        LedgerError::InsufficientBalance {
            account: account.to_string(),
            balance,
            required,
        }
    }

    pub fn insufficient_stock(product: &str, stock: u32, requested: u32) -> Self {
        LedgerError::InsufficientStock {
            product: product.to_string(),
            stock,
            requested,
        }
    }

    pub fn restricted(account: &str, until: Option<DateTime<Utc>>) -> Self {
        LedgerError::AccountRestricted {
            account: account.to_string(),
            until,
        }
    }

    pub fn overflow(operation: &str, account: &str) -> Self {
        LedgerError::ArithmeticOverflow {
            operation: operation.to_string(),
            account: account.to_string(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rstest::rstest;

    #[rstest]
    #[case::code_not_found(
        LedgerError::code_not_found("lak-ab12"),
        "Code lak-ab12 not found"
    )]
    #[case::code_already_used(
        LedgerError::code_already_used("lak-ab12"),
        "Code lak-ab12 has already been used"
    )]
    #[case::self_redemption(
        LedgerError::self_redemption("s-1001"),
        "Account s-1001 cannot redeem its own code"
    )]
    #[case::insufficient_balance(
        LedgerError::insufficient_balance("s-1001", 5, 12),
        "Insufficient balance for s-1001: balance 5, required 12"
    )]
    #[case::insufficient_stock(
        LedgerError::insufficient_stock("keychain", 1, 2),
        "Insufficient stock for keychain: in stock 1, requested 2"
    )]
    #[case::restricted_without_window(
        LedgerError::restricted("s-1001", None),
        "Account s-1001 is restricted"
    )]
    #[case::contention(
        LedgerError::TransactionContention { attempts: 5 },
        "Store contention: transaction failed after 5 attempts"
    )]
    #[case::parse_with_line(
        LedgerError::ParseError { line: Some(3), message: "bad row".to_string() },
        "Parse error at line 3: bad row"
    )]
    fn test_error_display(#[case] error: LedgerError, #[case] expected: &str) {
        assert_eq!(error.to_string(), expected);
    }

    #[rstest]
    #[case(LedgerError::invalid("empty cart"), ErrorCategory::Validation)]
    #[case(LedgerError::account_not_found("x"), ErrorCategory::NotFound)]
    #[case(LedgerError::code_already_used("c"), ErrorCategory::Conflict)]
    #[case(LedgerError::insufficient_stock("p", 0, 1), ErrorCategory::Conflict)]
    #[case(LedgerError::ShopDisabled, ErrorCategory::Policy)]
    #[case(LedgerError::MaintenanceClosed, ErrorCategory::Policy)]
    #[case(
        LedgerError::TransactionContention { attempts: 5 },
        ErrorCategory::Transient
    )]
    fn test_error_categories(#[case] error: LedgerError, #[case] expected: ErrorCategory) {
        assert_eq!(error.category(), expected);
    }

    #[test]
    fn test_only_transient_errors_are_retryable() {
        assert!(LedgerError::TransactionContention { attempts: 5 }.is_retryable());
        assert!(!LedgerError::code_already_used("c").is_retryable());
        assert!(!LedgerError::ShopDisabled.is_retryable());
    }

    #[test]
    fn test_io_error_conversion() {
        let io_error = std::io::Error::new(std::io::ErrorKind::PermissionDenied, "denied");
        let error: LedgerError = io_error.into();
        assert!(matches!(error, LedgerError::IoError { .. }));
        assert!(error.is_retryable());
    }
}
