//! Versioned document store with optimistic-concurrency transactions
//!
//! This module provides the `LedgerStore`, the persistence primitive every
//! ledger operation is built on. Documents live in concurrent maps and carry
//! a version counter; a transaction records the version of everything it
//! reads, stages its writes in memory, and commits only if none of the
//! observed versions moved underneath it. On conflict the whole
//! read-compute-write closure re-runs, a bounded number of times.
//!
//! # Atomicity
//!
//! All staged writes of a transaction are applied under the store's commit
//! lock, after validation, or not at all. A failed operation therefore
//! leaves the store exactly as if it never ran: no partial credit, no
//! half-decremented stock.
//!
//! # Thread Safety
//!
//! Collections use `DashMap` for fine-grained concurrent access; only the
//! commit path takes the store-wide lock, and holds it briefly. Contention
//! is short-lived and retries are cheap, so no further locking is needed.

mod txn;

pub use txn::Txn;

use crate::types::{
    Account, AccountId, LedgerEntry, LedgerError, Letter, MigrationRecord, Product, ProductId,
    Purchase, RedeemableCode, SystemSettings, TeamId, TeamLink,
};
use dashmap::DashMap;
use std::sync::Mutex;
use uuid::Uuid;

/// Maximum read-compute-write cycles before a transaction fails transient
pub const MAX_TXN_ATTEMPTS: u32 = 5;

/// A document plus its optimistic-concurrency version
#[derive(Debug, Clone, PartialEq)]
pub(crate) struct Versioned<T> {
    pub version: u64,
    pub doc: T,
}

impl<T> Versioned<T> {
    fn first(doc: T) -> Self {
        Versioned { version: 1, doc }
    }
}

/// The shared document store backing the ledger
///
/// Holds every collection the ledger mutates: accounts with their
/// append-only entry sub-collections, codes, the shop catalog, purchases,
/// letters, team links, the migration log, and the settings singleton.
pub struct LedgerStore {
    pub(crate) accounts: DashMap<AccountId, Versioned<Account>>,

    /// Append-only LedgerEntry sub-collection per account, ordered by
    /// creation; the length doubles as its version marker
    pub(crate) ledgers: DashMap<AccountId, Vec<LedgerEntry>>,

    pub(crate) codes: DashMap<String, Versioned<RedeemableCode>>,
    pub(crate) products: DashMap<ProductId, Versioned<Product>>,
    pub(crate) purchases: DashMap<Uuid, Versioned<Purchase>>,
    pub(crate) letters: DashMap<Uuid, Versioned<Letter>>,
    pub(crate) teams: DashMap<TeamId, Versioned<TeamLink>>,

    /// Migration log, newest last; versioned as a single document
    pub(crate) migrations: Mutex<Versioned<Vec<MigrationRecord>>>,

    /// The settings singleton, read transactionally by every dependent op
    pub(crate) settings: Mutex<Versioned<SystemSettings>>,

    /// Serializes commit validation and apply
    commit_lock: Mutex<()>,
}

impl LedgerStore {
    /// Create an empty store with default settings
    pub fn new() -> Self {
        Self::with_settings(SystemSettings::default())
    }

    /// Create an empty store seeded with the given settings
    pub fn with_settings(settings: SystemSettings) -> Self {
        LedgerStore {
            accounts: DashMap::new(),
            ledgers: DashMap::new(),
            codes: DashMap::new(),
            products: DashMap::new(),
            purchases: DashMap::new(),
            letters: DashMap::new(),
            teams: DashMap::new(),
            migrations: Mutex::new(Versioned::first(Vec::new())),
            settings: Mutex::new(Versioned::first(settings)),
            commit_lock: Mutex::new(()),
        }
    }

    /// Run a closure as one atomic read-compute-write transaction
    ///
    /// The closure reads documents through the supplied [`Txn`] and stages
    /// writes on it. If the commit-time validation finds that any document
    /// read by the closure changed, the closure re-runs against fresh state,
    /// up to [`MAX_TXN_ATTEMPTS`] times.
    ///
    /// # Errors
    ///
    /// Deterministic errors returned by the closure abort immediately with
    /// nothing written. Exhausted retries surface as
    /// [`LedgerError::TransactionContention`], the one transient outcome a
    /// caller may retry.
    pub fn run_transaction<T, F>(&self, mut f: F) -> Result<T, LedgerError>
    where
        F: FnMut(&mut Txn) -> Result<T, LedgerError>,
    {
        for _ in 0..MAX_TXN_ATTEMPTS {
            let mut txn = Txn::new(self);
            let value = f(&mut txn)?;
            if self.try_commit(txn) {
                return Ok(value);
            }
        }
        Err(LedgerError::TransactionContention {
            attempts: MAX_TXN_ATTEMPTS,
        })
    }

    /// Validate a transaction's read set and apply its writes
    ///
    /// Returns false when any observed version moved, signalling a retry.
    fn try_commit(&self, txn: Txn) -> bool {
        let _guard = self
            .commit_lock
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner());

        if !txn.reads_are_current(self) {
            return false;
        }
        txn.apply(self);
        true
    }

    /// Mutate the settings singleton (admin surface)
    ///
    /// Takes the commit lock so any in-flight transaction that already read
    /// the settings will observe the version bump and retry.
    pub fn write_settings<F>(&self, f: F)
    where
        F: FnOnce(&mut SystemSettings),
    {
        let _guard = self
            .commit_lock
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner());
        let mut settings = self
            .settings
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner());
        f(&mut settings.doc);
        settings.version += 1;
    }

    /// Snapshot of the current settings (non-transactional, display only)
    pub fn settings_snapshot(&self) -> SystemSettings {
        self.settings
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .doc
            .clone()
    }

    /// Snapshot of all accounts, sorted by id for deterministic output
    pub fn accounts_snapshot(&self) -> Vec<Account> {
        let mut accounts: Vec<Account> = self
            .accounts
            .iter()
            .map(|entry| entry.value().doc.clone())
            .collect();
        accounts.sort_by(|a, b| a.id.cmp(&b.id));
        accounts
    }

    /// Snapshot of one account's entry history (display and audit)
    pub fn ledger_snapshot(&self, account: &str) -> Vec<LedgerEntry> {
        self.ledgers
            .get(account)
            .map(|entries| entries.value().clone())
            .unwrap_or_default()
    }

    /// Snapshot of one account document, if it exists
    pub fn account_snapshot(&self, account: &str) -> Option<Account> {
        self.accounts.get(account).map(|v| v.doc.clone())
    }

    /// Snapshot of one purchase document, if it exists
    pub fn purchase_snapshot(&self, purchase: Uuid) -> Option<Purchase> {
        self.purchases.get(&purchase).map(|v| v.doc.clone())
    }

    /// Snapshot of one product document, if it exists
    pub fn product_snapshot(&self, product: &str) -> Option<Product> {
        self.products.get(product).map(|v| v.doc.clone())
    }
}

impl Default for LedgerStore {
    fn default() -> Self {
        Self::new()
    }
}
