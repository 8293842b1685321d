//! Transaction context: read stamps, staged writes, and balance deltas
//!
//! A `Txn` is handed to the closure of [`LedgerStore::run_transaction`].
//! Every read records the observed document version (including reads that
//! found nothing; absence is part of the read set); every write is staged
//! in memory and applied only after commit-time validation. A transaction
//! reads each document once, before staging writes to it; staged writes are
//! not visible to later reads in the same transaction.

use super::{LedgerStore, Versioned};
use crate::types::{
    Account, AccountId, EntryKind, LedgerEntry, LedgerError, Letter, MigrationRecord, Product,
    ProductId, Purchase, RedeemableCode, SystemSettings, TeamId, TeamLink,
};
use chrono::{DateTime, Utc};
use uuid::Uuid;

/// One observed read, validated at commit time
#[derive(Debug, Clone)]
enum ReadStamp {
    /// `version: None` means the document was observed absent
    Account {
        id: AccountId,
        version: Option<u64>,
    },
    /// Entry sub-collections are append-only; the length is the version
    Ledger {
        account: AccountId,
        len: usize,
    },
    Code {
        code: String,
        version: Option<u64>,
    },
    Product {
        id: ProductId,
        version: Option<u64>,
    },
    Purchase {
        id: Uuid,
        version: Option<u64>,
    },
    Letter {
        id: Uuid,
        version: Option<u64>,
    },
    Team {
        id: TeamId,
        version: Option<u64>,
    },
    Settings {
        version: u64,
    },
    Migrations {
        version: u64,
    },
}

/// One buffered write, applied in order on commit
#[derive(Debug, Clone)]
enum StagedWrite {
    PutAccount(Account),
    AppendEntry(LedgerEntry),
    TruncateLedger { account: AccountId, len: usize },
    PutCode(RedeemableCode),
    PutProduct(Product),
    PutPurchase(Purchase),
    PutLetter(Letter),
    PutTeam(TeamLink),
    PutMigrations(Vec<MigrationRecord>),
}

/// An in-flight optimistic transaction
pub struct Txn<'a> {
    store: &'a LedgerStore,
    reads: Vec<ReadStamp>,
    writes: Vec<StagedWrite>,
}

impl<'a> Txn<'a> {
    pub(crate) fn new(store: &'a LedgerStore) -> Self {
        Txn {
            store,
            reads: Vec::new(),
            writes: Vec::new(),
        }
    }

    // ----- reads ---------------------------------------------------------

    /// Read an account document or fail `AccountNotFound`
    pub fn account(&mut self, id: &str) -> Result<Account, LedgerError> {
        let found = self.store.accounts.get(id).map(|v| (v.version, v.doc.clone()));
        self.reads.push(ReadStamp::Account {
            id: id.to_string(),
            version: found.as_ref().map(|(version, _)| *version),
        });
        found
            .map(|(_, doc)| doc)
            .ok_or_else(|| LedgerError::account_not_found(id))
    }

    /// Observe that no account exists for the id (stamped for commit)
    pub fn account_absent(&mut self, id: &str) -> bool {
        let version = self.store.accounts.get(id).map(|v| v.version);
        let absent = version.is_none();
        self.reads.push(ReadStamp::Account {
            id: id.to_string(),
            version,
        });
        absent
    }

    /// Read an account's full entry history, stamped by its length
    pub fn ledger_entries(&mut self, account: &str) -> Vec<LedgerEntry> {
        let entries = self
            .store
            .ledgers
            .get(account)
            .map(|v| v.value().clone())
            .unwrap_or_default();
        self.reads.push(ReadStamp::Ledger {
            account: account.to_string(),
            len: entries.len(),
        });
        entries
    }

    /// Read the length of an account's entry history
    pub fn ledger_len(&mut self, account: &str) -> usize {
        let len = self.store.ledgers.get(account).map(|v| v.len()).unwrap_or(0);
        self.reads.push(ReadStamp::Ledger {
            account: account.to_string(),
            len,
        });
        len
    }

    /// Read a code document by its normalized token or fail `CodeNotFound`
    pub fn code(&mut self, normalized: &str) -> Result<RedeemableCode, LedgerError> {
        let found = self
            .store
            .codes
            .get(normalized)
            .map(|v| (v.version, v.doc.clone()));
        self.reads.push(ReadStamp::Code {
            code: normalized.to_string(),
            version: found.as_ref().map(|(version, _)| *version),
        });
        found
            .map(|(_, doc)| doc)
            .ok_or_else(|| LedgerError::code_not_found(normalized))
    }

    /// Observe that no code exists for the token (stamped for commit)
    pub fn code_absent(&mut self, normalized: &str) -> bool {
        let version = self.store.codes.get(normalized).map(|v| v.version);
        let absent = version.is_none();
        self.reads.push(ReadStamp::Code {
            code: normalized.to_string(),
            version,
        });
        absent
    }

    /// Read a product document or fail `ProductNotFound`
    pub fn product(&mut self, id: &str) -> Result<Product, LedgerError> {
        let found = self.store.products.get(id).map(|v| (v.version, v.doc.clone()));
        self.reads.push(ReadStamp::Product {
            id: id.to_string(),
            version: found.as_ref().map(|(version, _)| *version),
        });
        found.map(|(_, doc)| doc).ok_or_else(|| {
            LedgerError::ProductNotFound {
                product: id.to_string(),
            }
        })
    }

    /// Read a purchase document or fail `PurchaseNotFound`
    pub fn purchase(&mut self, id: Uuid) -> Result<Purchase, LedgerError> {
        let found = self.store.purchases.get(&id).map(|v| (v.version, v.doc.clone()));
        self.reads.push(ReadStamp::Purchase {
            id,
            version: found.as_ref().map(|(version, _)| *version),
        });
        found
            .map(|(_, doc)| doc)
            .ok_or(LedgerError::PurchaseNotFound { purchase: id })
    }

    /// Read a letter document or fail `LetterNotFound`
    pub fn letter(&mut self, id: Uuid) -> Result<Letter, LedgerError> {
        let found = self.store.letters.get(&id).map(|v| (v.version, v.doc.clone()));
        self.reads.push(ReadStamp::Letter {
            id,
            version: found.as_ref().map(|(version, _)| *version),
        });
        found
            .map(|(_, doc)| doc)
            .ok_or(LedgerError::LetterNotFound { letter: id })
    }

    /// Read a team link, if one exists for the id
    pub fn team(&mut self, id: &str) -> Option<TeamLink> {
        let found = self.store.teams.get(id).map(|v| (v.version, v.doc.clone()));
        self.reads.push(ReadStamp::Team {
            id: id.to_string(),
            version: found.as_ref().map(|(version, _)| *version),
        });
        found.map(|(_, doc)| doc)
    }

    /// Read the settings singleton inside this transaction
    pub fn settings(&mut self) -> SystemSettings {
        let settings = self
            .store
            .settings
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner());
        self.reads.push(ReadStamp::Settings {
            version: settings.version,
        });
        settings.doc.clone()
    }

    /// Read the migration log, newest record last
    pub fn migrations(&mut self) -> Vec<MigrationRecord> {
        let migrations = self
            .store
            .migrations
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner());
        self.reads.push(ReadStamp::Migrations {
            version: migrations.version,
        });
        migrations.doc.clone()
    }

    // ----- balance deltas -------------------------------------------------

    /// Credit an account and stage the matching ledger entry
    ///
    /// Mutates the in-transaction account copy and stages an `EntryKind::
    /// Credit` entry; the caller stages the account document itself with
    /// [`Txn::put_account`] once all mutations are done. Entry and balance
    /// land in the same commit, or neither does.
    ///
    /// With `excluded` set the entry is flagged as piggy-bank overflow and
    /// the circulating balance is left untouched.
    pub fn credit(
        &mut self,
        account: &mut Account,
        amount: i64,
        description: &str,
        excluded: bool,
        now: DateTime<Utc>,
    ) -> Result<(), LedgerError> {
        if amount <= 0 {
            return Err(LedgerError::invalid("credit amount must be positive"));
        }
        if !excluded {
            account.balance = account
                .balance
                .checked_add(amount)
                .ok_or_else(|| LedgerError::overflow("credit", &account.id))?;
        }
        self.writes.push(StagedWrite::AppendEntry(LedgerEntry {
            id: Uuid::new_v4(),
            account: account.id.clone(),
            amount,
            kind: EntryKind::Credit,
            description: description.to_string(),
            created_at: now,
            excluded_from_circulation: excluded,
        }));
        Ok(())
    }

    /// Debit an account and stage the matching ledger entry
    ///
    /// Fails `InsufficientBalance` when the circulating balance cannot cover
    /// the amount; the balance invariant (never negative) is enforced here.
    pub fn debit(
        &mut self,
        account: &mut Account,
        amount: i64,
        description: &str,
        now: DateTime<Utc>,
    ) -> Result<(), LedgerError> {
        if amount <= 0 {
            return Err(LedgerError::invalid("debit amount must be positive"));
        }
        if account.balance < amount {
            return Err(LedgerError::insufficient_balance(
                &account.id,
                account.balance,
                amount,
            ));
        }
        account.balance -= amount;
        self.writes.push(StagedWrite::AppendEntry(LedgerEntry {
            id: Uuid::new_v4(),
            account: account.id.clone(),
            amount: -amount,
            kind: EntryKind::Debit,
            description: description.to_string(),
            created_at: now,
            excluded_from_circulation: false,
        }));
        Ok(())
    }

    // ----- staged writes --------------------------------------------------

    pub fn put_account(&mut self, account: Account) {
        self.writes.push(StagedWrite::PutAccount(account));
    }

    /// Stage a pre-built ledger entry (migration history copies)
    pub fn append_entry(&mut self, entry: LedgerEntry) {
        self.writes.push(StagedWrite::AppendEntry(entry));
    }

    /// Stage removal of every entry past `len` (migration revert only)
    pub fn truncate_ledger(&mut self, account: &str, len: usize) {
        self.writes.push(StagedWrite::TruncateLedger {
            account: account.to_string(),
            len,
        });
    }

    pub fn put_code(&mut self, code: RedeemableCode) {
        self.writes.push(StagedWrite::PutCode(code));
    }

    pub fn put_product(&mut self, product: Product) {
        self.writes.push(StagedWrite::PutProduct(product));
    }

    pub fn put_purchase(&mut self, purchase: Purchase) {
        self.writes.push(StagedWrite::PutPurchase(purchase));
    }

    pub fn put_letter(&mut self, letter: Letter) {
        self.writes.push(StagedWrite::PutLetter(letter));
    }

    pub fn put_team(&mut self, team: TeamLink) {
        self.writes.push(StagedWrite::PutTeam(team));
    }

    pub fn put_migrations(&mut self, migrations: Vec<MigrationRecord>) {
        self.writes.push(StagedWrite::PutMigrations(migrations));
    }

    // ----- commit ---------------------------------------------------------

    /// Re-check every read stamp against current store state
    ///
    /// Called under the commit lock.
    pub(crate) fn reads_are_current(&self, store: &LedgerStore) -> bool {
        self.reads.iter().all(|stamp| match stamp {
            ReadStamp::Account { id, version } => {
                store.accounts.get(id).map(|v| v.version) == *version
            }
            ReadStamp::Ledger { account, len } => {
                store.ledgers.get(account).map(|v| v.len()).unwrap_or(0) == *len
            }
            ReadStamp::Code { code, version } => {
                store.codes.get(code).map(|v| v.version) == *version
            }
            ReadStamp::Product { id, version } => {
                store.products.get(id).map(|v| v.version) == *version
            }
            ReadStamp::Purchase { id, version } => {
                store.purchases.get(id).map(|v| v.version) == *version
            }
            ReadStamp::Letter { id, version } => {
                store.letters.get(id).map(|v| v.version) == *version
            }
            ReadStamp::Team { id, version } => {
                store.teams.get(id).map(|v| v.version) == *version
            }
            ReadStamp::Settings { version } => {
                store
                    .settings
                    .lock()
                    .unwrap_or_else(|poisoned| poisoned.into_inner())
                    .version
                    == *version
            }
            ReadStamp::Migrations { version } => {
                store
                    .migrations
                    .lock()
                    .unwrap_or_else(|poisoned| poisoned.into_inner())
                    .version
                    == *version
            }
        })
    }

    /// Apply staged writes in order
    ///
    /// Called under the commit lock, after validation.
    pub(crate) fn apply(self, store: &LedgerStore) {
        for write in self.writes {
            match write {
                StagedWrite::PutAccount(account) => {
                    put_versioned(&store.accounts, account.id.clone(), account);
                }
                StagedWrite::AppendEntry(entry) => {
                    store
                        .ledgers
                        .entry(entry.account.clone())
                        .or_default()
                        .push(entry);
                }
                StagedWrite::TruncateLedger { account, len } => {
                    if let Some(mut entries) = store.ledgers.get_mut(&account) {
                        entries.truncate(len);
                    }
                }
                StagedWrite::PutCode(code) => {
                    put_versioned(&store.codes, code.code.clone(), code);
                }
                StagedWrite::PutProduct(product) => {
                    put_versioned(&store.products, product.id.clone(), product);
                }
                StagedWrite::PutPurchase(purchase) => {
                    put_versioned(&store.purchases, purchase.id, purchase);
                }
                StagedWrite::PutLetter(letter) => {
                    put_versioned(&store.letters, letter.id, letter);
                }
                StagedWrite::PutTeam(team) => {
                    put_versioned(&store.teams, team.id.clone(), team);
                }
                StagedWrite::PutMigrations(migrations) => {
                    let mut log = store
                        .migrations
                        .lock()
                        .unwrap_or_else(|poisoned| poisoned.into_inner());
                    log.doc = migrations;
                    log.version += 1;
                }
            }
        }
    }
}

/// Insert or replace a document, bumping its version
///
/// Runs under the commit lock, so the lookup-then-insert pair is race-free.
fn put_versioned<K, V>(map: &dashmap::DashMap<K, Versioned<V>>, key: K, doc: V)
where
    K: std::hash::Hash + Eq,
{
    if let Some(mut existing) = map.get_mut(&key) {
        existing.version += 1;
        existing.doc = doc;
    } else {
        map.insert(key, Versioned::first(doc));
    }
}
