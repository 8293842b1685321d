//! Core data types for the Lak ledger
//!
//! This module contains the document types persisted by the store, the
//! error taxonomy, and the caller-facing reply shape.

pub mod account;
pub mod code;
pub mod error;
pub mod migration;
pub mod purchase;
pub mod reply;
pub mod rewards;
pub mod settings;

pub use account::{Account, AccountId, EntryKind, LedgerEntry, Role};
pub use code::{normalize_code, CodeKind, RedeemableCode};
pub use error::{ErrorCategory, LedgerError};
pub use migration::{BalanceSnapshot, MigrationRecord};
pub use purchase::{
    CartItem, DisputeStatus, Product, ProductId, Purchase, PurchaseStatus, PurchasedItem,
};
pub use reply::OperationReply;
pub use rewards::{BatchGrantOutcome, Letter, LetterStatus, TeamId, TeamLink, TEAM_SIZE};
pub use settings::SystemSettings;
