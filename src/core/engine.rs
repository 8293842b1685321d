//! The ledger engine facade
//!
//! `LedgerEngine` owns the document store and the clock and exposes every
//! balance-mutating operation of the platform as a single call. Each call
//! opens one atomic transaction (the batch grant's outer loop being the
//! deliberate exception), consults the settings snapshot inside that
//! transaction, and returns a typed result that the outermost surface
//! adapts into a `{ success, message }` reply.

use super::clock::{Clock, SystemClock};
use super::{migration, policy, purchase, redemption, rewards, MATE_REWARD_POINTS};
use crate::store::LedgerStore;
use crate::types::{
    Account, BatchGrantOutcome, CodeKind, LedgerError, Letter, MigrationRecord, Product,
    RedeemableCode, Role, SystemSettings,
};
use chrono::{DateTime, Utc};
use rand::distributions::Alphanumeric;
use rand::Rng;
use std::sync::Arc;
use tracing::{info, warn};
use uuid::Uuid;

pub use super::purchase::{PurchaseRequest, Receipt};
pub use super::redemption::RedemptionOutcome;
pub use super::rewards::TeamJoinOutcome;

/// Attempts at allocating a random token before giving up
const TOKEN_ALLOC_ATTEMPTS: usize = 5;

/// Upper bound on one bulk code-generation request
const MAX_GENERATED_CODES: usize = 500;

/// The single entry point for all ledger mutations
///
/// Safe to share behind an `Arc` and call from many request handlers
/// concurrently; every operation is an optimistic transaction against the
/// shared store.
pub struct LedgerEngine {
    store: LedgerStore,
    clock: Arc<dyn Clock>,
}

impl LedgerEngine {
    /// Engine over an empty store with default settings and wall-clock time
    pub fn new() -> Self {
        Self::with_settings(SystemSettings::default())
    }

    /// Engine over an empty store seeded with the given settings
    pub fn with_settings(settings: SystemSettings) -> Self {
        LedgerEngine {
            store: LedgerStore::with_settings(settings),
            clock: Arc::new(SystemClock),
        }
    }

    /// Engine with an injected clock (tests pin the date through this)
    pub fn with_clock(settings: SystemSettings, clock: Arc<dyn Clock>) -> Self {
        LedgerEngine {
            store: LedgerStore::with_settings(settings),
            clock,
        }
    }

    /// Read access to the underlying store (snapshots, audit queries)
    pub fn store(&self) -> &LedgerStore {
        &self.store
    }

    /// Mutate the settings singleton (admin surface)
    pub fn update_settings<F>(&self, f: F)
    where
        F: FnOnce(&mut SystemSettings),
    {
        self.store.write_settings(f);
    }

    // ----- accounts -------------------------------------------------------

    /// Open an account at signup, allocating its reusable mate code
    pub fn open_account(&self, id: &str, role: Role) -> Result<Account, LedgerError> {
        if id.trim().is_empty() {
            return Err(LedgerError::invalid("account id must not be empty"));
        }
        let now = self.clock.now();

        let account = self.store.run_transaction(|tx| {
            if !tx.account_absent(id) {
                return Err(LedgerError::invalid(format!("account {id} already exists")));
            }
            let mut mate_code = None;
            for _ in 0..TOKEN_ALLOC_ATTEMPTS {
                let candidate = random_token("mate", 6);
                if tx.code_absent(&candidate) {
                    mate_code = Some(candidate);
                    break;
                }
            }
            let mate_code = mate_code
                .ok_or_else(|| LedgerError::invalid("could not allocate a unique mate code"))?;

            let account = Account::new(id.to_string(), role, mate_code.clone(), now.date_naive());
            tx.put_code(RedeemableCode::new(
                &mate_code,
                MATE_REWARD_POINTS,
                CodeKind::Mate {
                    owner: id.to_string(),
                    redeemed_by: Vec::new(),
                },
                now,
            ));
            tx.put_account(account.clone());
            Ok(account)
        })?;

        info!(account = %id, role = ?role, "account opened");
        Ok(account)
    }

    /// Open a restriction window on an account
    pub fn restrict_account(
        &self,
        id: &str,
        until: DateTime<Utc>,
        reason: &str,
    ) -> Result<(), LedgerError> {
        self.store.run_transaction(|tx| {
            let mut account = tx.account(id)?;
            account.restricted_until = Some(until);
            account.restriction_reason = Some(reason.to_string());
            tx.put_account(account);
            Ok(())
        })?;
        info!(account = %id, %until, "restriction placed");
        Ok(())
    }

    /// Clear an account's restriction window
    pub fn lift_restriction(&self, id: &str) -> Result<(), LedgerError> {
        self.store.run_transaction(|tx| {
            let mut account = tx.account(id)?;
            account.restricted_until = None;
            account.restriction_reason = None;
            tx.put_account(account);
            Ok(())
        })
    }

    // ----- codes ----------------------------------------------------------

    /// Create a single-use standard code with an explicit token
    pub fn create_standard_code(&self, raw: &str, value: i64) -> Result<String, LedgerError> {
        self.create_code(raw, value, CodeKind::Standard)
    }

    /// Create a hidden-partner code (redeemer names a second beneficiary)
    pub fn create_hidden_code(&self, raw: &str, value: i64) -> Result<String, LedgerError> {
        self.create_code(raw, value, CodeKind::HiddenPartner)
    }

    /// Create a staff one-time code bound (for audit) to a recipient
    pub fn create_staff_code(
        &self,
        raw: &str,
        value: i64,
        intended_for: &str,
    ) -> Result<String, LedgerError> {
        let now = self.clock.now();
        let code = crate::types::normalize_code(raw);
        if code.is_empty() {
            return Err(LedgerError::invalid("code must not be empty"));
        }
        if value <= 0 {
            return Err(LedgerError::invalid("code value must be positive"));
        }
        self.store.run_transaction(|tx| {
            tx.account(intended_for)?;
            if !tx.code_absent(&code) {
                return Err(LedgerError::invalid(format!("code {code} already exists")));
            }
            tx.put_code(RedeemableCode::new(
                &code,
                value,
                CodeKind::StaffOnetime {
                    intended_for: intended_for.to_string(),
                },
                now,
            ));
            Ok(())
        })?;
        Ok(code)
    }

    /// Bulk-generate random single-use standard codes
    pub fn generate_standard_codes(
        &self,
        count: usize,
        value: i64,
    ) -> Result<Vec<String>, LedgerError> {
        if count == 0 || count > MAX_GENERATED_CODES {
            return Err(LedgerError::invalid(format!(
                "code count must be between 1 and {MAX_GENERATED_CODES}"
            )));
        }
        if value <= 0 {
            return Err(LedgerError::invalid("code value must be positive"));
        }
        let now = self.clock.now();

        self.store.run_transaction(|tx| {
            let mut generated = Vec::with_capacity(count);
            for _ in 0..count {
                let mut token = None;
                for _ in 0..TOKEN_ALLOC_ATTEMPTS {
                    let candidate = random_token("lak", 8);
                    if tx.code_absent(&candidate) && !generated.contains(&candidate) {
                        token = Some(candidate);
                        break;
                    }
                }
                let token = token
                    .ok_or_else(|| LedgerError::invalid("could not allocate a unique code"))?;
                tx.put_code(RedeemableCode::new(&token, value, CodeKind::Standard, now));
                generated.push(token);
            }
            Ok(generated)
        })
    }

    fn create_code(&self, raw: &str, value: i64, kind: CodeKind) -> Result<String, LedgerError> {
        let code = crate::types::normalize_code(raw);
        if code.is_empty() {
            return Err(LedgerError::invalid("code must not be empty"));
        }
        if value <= 0 {
            return Err(LedgerError::invalid("code value must be positive"));
        }
        let now = self.clock.now();
        self.store.run_transaction(|tx| {
            if !tx.code_absent(&code) {
                return Err(LedgerError::invalid(format!("code {code} already exists")));
            }
            tx.put_code(RedeemableCode::new(&code, value, kind.clone(), now));
            Ok(())
        })?;
        Ok(code)
    }

    /// Redeem a code for an account
    ///
    /// `partner` names the second beneficiary for hidden-partner codes.
    pub fn redeem_code(
        &self,
        redeemer: &str,
        raw_code: &str,
        partner: Option<&str>,
    ) -> Result<RedemptionOutcome, LedgerError> {
        let now = self.clock.now();
        let outcome = self
            .store
            .run_transaction(|tx| redemption::attempt_redeem(tx, redeemer, raw_code, partner, now))?;
        info!(
            account = %redeemer,
            code = %outcome.code,
            credited = outcome.credited,
            banked = outcome.banked,
            "code redeemed"
        );
        Ok(outcome)
    }

    // ----- shop -----------------------------------------------------------

    /// Administrative catalog upsert: replaces the product document
    pub fn stock_product(
        &self,
        id: &str,
        name: &str,
        unit_price: i64,
        stock: u32,
    ) -> Result<(), LedgerError> {
        if id.trim().is_empty() {
            return Err(LedgerError::invalid("product id must not be empty"));
        }
        if unit_price < 0 {
            return Err(LedgerError::invalid("unit price must not be negative"));
        }
        self.store.run_transaction(|tx| {
            tx.put_product(Product {
                id: id.to_string(),
                name: name.to_string(),
                unit_price,
                stock,
            });
            Ok(())
        })
    }

    /// Execute a purchase (online or cashier-assisted)
    pub fn purchase(&self, request: &PurchaseRequest) -> Result<Receipt, LedgerError> {
        let now = self.clock.now();
        let receipt = self
            .store
            .run_transaction(|tx| purchase::execute(tx, request, now))?;
        info!(
            account = %request.account,
            receipt = %receipt.code,
            total = receipt.total,
            status = ?receipt.status,
            "purchase committed"
        );
        Ok(receipt)
    }

    /// Staff completes a pending purchase
    pub fn fulfill_purchase(&self, purchase_id: Uuid) -> Result<(), LedgerError> {
        self.store
            .run_transaction(|tx| purchase::fulfill(tx, purchase_id))
    }

    /// Buyer opens a dispute on one of their purchases
    pub fn open_dispute(&self, purchase_id: Uuid, account: &str) -> Result<(), LedgerError> {
        let now = self.clock.now();
        self.store
            .run_transaction(|tx| purchase::open_dispute(tx, purchase_id, account, now))
    }

    /// Staff resolves an open dispute; returns the refunded amount
    pub fn resolve_dispute(&self, purchase_id: Uuid, refund: bool) -> Result<i64, LedgerError> {
        let now = self.clock.now();
        let refunded = self
            .store
            .run_transaction(|tx| purchase::resolve_dispute(tx, purchase_id, refund, now))?;
        info!(purchase = %purchase_id, refunded, "dispute resolved");
        Ok(refunded)
    }

    // ----- rewards --------------------------------------------------------

    /// Create a pending letter between two accounts
    pub fn submit_letter(&self, sender: &str, receiver: &str) -> Result<Letter, LedgerError> {
        let now = self.clock.now();
        self.store
            .run_transaction(|tx| rewards::submit_letter(tx, sender, receiver, now))
    }

    /// Staff approval of a pending letter; credits both correspondents once
    pub fn approve_letter(&self, letter_id: Uuid) -> Result<(), LedgerError> {
        let now = self.clock.now();
        self.store
            .run_transaction(|tx| rewards::approve_letter(tx, letter_id, now))
    }

    /// Booth/teacher batch grant over a list of target ids
    ///
    /// Each target is one independent transaction: a bad id or a restricted
    /// account fails that target alone and the rest proceed. The outcome
    /// aggregates successes, failures, and one message per failure.
    pub fn batch_grant(
        &self,
        granter: &str,
        targets: &[String],
        amount: i64,
        reason: &str,
    ) -> Result<BatchGrantOutcome, LedgerError> {
        if amount <= 0 {
            return Err(LedgerError::invalid("grant amount must be positive"));
        }
        let now = self.clock.now();

        // The granter must exist and hold a staff role before any target is
        // touched; this check is deterministic and fails the whole call.
        self.store.run_transaction(|tx| {
            let granter_account = tx.account(granter)?;
            if !granter_account.role.is_point_of_sale() {
                return Err(LedgerError::invalid("batch grants require a staff role"));
            }
            Ok(())
        })?;

        let description = format!("{reason} (granted by {granter})");
        let mut outcome = BatchGrantOutcome::default();
        for target in targets {
            let result = self
                .store
                .run_transaction(|tx| rewards::grant_points(tx, target, amount, &description, now));
            match result {
                Ok(_) => outcome.granted += 1,
                Err(error) => {
                    warn!(target = %target, %error, "batch grant target failed");
                    outcome.failed += 1;
                    outcome.errors.push(error.to_string());
                }
            }
        }

        info!(
            granter = %granter,
            granted = outcome.granted,
            failed = outcome.failed,
            "batch grant finished"
        );
        Ok(outcome)
    }

    /// Join a team link; the fifth member triggers the completion bonus
    pub fn join_team(&self, account: &str, team: &str) -> Result<TeamJoinOutcome, LedgerError> {
        let now = self.clock.now();
        let outcome = self
            .store
            .run_transaction(|tx| rewards::join_team(tx, account, team, now))?;
        if outcome.completed {
            info!(team = %team, "team completed, bonus paid");
        }
        Ok(outcome)
    }

    // ----- migration ------------------------------------------------------

    /// Transplant one account's balance and ledger history onto another
    pub fn migrate_account(&self, from: &str, to: &str) -> Result<MigrationRecord, LedgerError> {
        let now = self.clock.now();
        let record = self
            .store
            .run_transaction(|tx| migration::migrate(tx, from, to, now))?;
        info!(from = %from, to = %to, record = %record.id, "account migrated");
        Ok(record)
    }

    /// Revert the most recent migration, once
    pub fn revert_last_migration(&self) -> Result<MigrationRecord, LedgerError> {
        let record = self.store.run_transaction(migration::revert_last)?;
        info!(record = %record.id, "migration reverted");
        Ok(record)
    }

    // ----- direct policy query -------------------------------------------

    /// Preview how a credit would split under the current caps
    ///
    /// Display-only helper for kiosks; reads a non-transactional snapshot.
    pub fn preview_credit(&self, account: &str, amount: i64) -> Result<policy::CreditDecision, LedgerError> {
        let account = self
            .store
            .account_snapshot(account)
            .ok_or_else(|| LedgerError::account_not_found(account))?;
        let settings = self.store.settings_snapshot();
        Ok(policy::evaluate_credit(
            amount,
            &account,
            &settings,
            self.clock.now().date_naive(),
        ))
    }
}

impl Default for LedgerEngine {
    fn default() -> Self {
        Self::new()
    }
}

/// Random lowercase token with a prefix, e.g. `lak-x7k2p9qa`
fn random_token(prefix: &str, len: usize) -> String {
    let token: String = rand::thread_rng()
        .sample_iter(&Alphanumeric)
        .take(len)
        .map(char::from)
        .collect();
    format!("{prefix}-{}", token.to_lowercase())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::clock::FixedClock;
    use crate::core::{LETTER_REWARD_POINTS, TEAM_BONUS_POINTS};
    use crate::types::{CartItem, DisputeStatus, PurchaseStatus};
    use chrono::{Duration, TimeZone};

    fn fixed_clock() -> Arc<FixedClock> {
        Arc::new(FixedClock::new(
            Utc.with_ymd_and_hms(2026, 3, 2, 9, 0, 0).unwrap(),
        ))
    }

    fn engine() -> (LedgerEngine, Arc<FixedClock>) {
        let clock = fixed_clock();
        let settings = SystemSettings {
            point_limit_enabled: false,
            ..SystemSettings::default()
        };
        (
            LedgerEngine::with_clock(settings, clock.clone()),
            clock,
        )
    }

    fn seed_balance(engine: &LedgerEngine, account: &str, amount: i64) {
        engine.open_account("granter", Role::Teacher).ok();
        engine
            .batch_grant("granter", &[account.to_string()], amount, "seed")
            .unwrap();
    }

    #[test]
    fn test_open_account_registers_mate_code() {
        let (engine, _) = engine();
        let account = engine.open_account("s-1001", Role::Student).unwrap();

        assert_eq!(account.balance, 0);
        assert!(account.mate_code.starts_with("mate-"));

        // The mate code is immediately redeemable by another student.
        engine.open_account("s-1002", Role::Student).unwrap();
        let outcome = engine
            .redeem_code("s-1002", &account.mate_code, None)
            .unwrap();
        assert_eq!(outcome.credited, MATE_REWARD_POINTS);
    }

    #[test]
    fn test_open_account_rejects_duplicate_id() {
        let (engine, _) = engine();
        engine.open_account("s-1001", Role::Student).unwrap();

        let result = engine.open_account("s-1001", Role::Student);
        assert!(matches!(
            result.unwrap_err(),
            LedgerError::InvalidArgument { .. }
        ));
    }

    #[test]
    fn test_standard_code_credits_once() {
        let (engine, _) = engine();
        engine.open_account("s-1001", Role::Student).unwrap();
        engine.create_standard_code("LAK-GAMES", 10).unwrap();

        let outcome = engine.redeem_code("s-1001", "lak-games", None).unwrap();
        assert_eq!(outcome.credited, 10);
        assert_eq!(outcome.banked, 0);
        assert_eq!(
            engine.store().account_snapshot("s-1001").unwrap().balance,
            10
        );

        // Case-insensitive second attempt hits the consumed flag.
        engine.open_account("s-1002", Role::Student).unwrap();
        let result = engine.redeem_code("s-1002", "LAK-GAMES", None);
        assert_eq!(
            result.unwrap_err(),
            LedgerError::code_already_used("lak-games")
        );
    }

    #[test]
    fn test_unknown_code_is_not_found() {
        let (engine, _) = engine();
        engine.open_account("s-1001", Role::Student).unwrap();

        let result = engine.redeem_code("s-1001", "lak-nope", None);
        assert_eq!(result.unwrap_err(), LedgerError::code_not_found("lak-nope"));
    }

    #[test]
    fn test_mate_code_rewards_both_and_stays_usable() {
        let (engine, _) = engine();
        let owner = engine.open_account("s-owner", Role::Student).unwrap();
        engine.open_account("s-friend", Role::Student).unwrap();
        engine.open_account("s-other", Role::Student).unwrap();

        engine
            .redeem_code("s-friend", &owner.mate_code, None)
            .unwrap();
        engine
            .redeem_code("s-other", &owner.mate_code, None)
            .unwrap();

        assert_eq!(engine.store().account_snapshot("s-owner").unwrap().balance, 2);
        assert_eq!(
            engine.store().account_snapshot("s-friend").unwrap().balance,
            1
        );
    }

    #[test]
    fn test_mate_code_rejects_owner() {
        let (engine, _) = engine();
        let owner = engine.open_account("s-owner", Role::Student).unwrap();

        let result = engine.redeem_code("s-owner", &owner.mate_code, None);
        assert_eq!(result.unwrap_err(), LedgerError::self_redemption("s-owner"));
        assert_eq!(engine.store().account_snapshot("s-owner").unwrap().balance, 0);
    }

    #[test]
    fn test_hidden_code_requires_distinct_partner() {
        let (engine, _) = engine();
        engine.open_account("s-1001", Role::Student).unwrap();
        engine.open_account("s-1002", Role::Student).unwrap();
        engine.create_hidden_code("duo-2026", 8).unwrap();

        let missing = engine.redeem_code("s-1001", "duo-2026", None);
        assert!(matches!(
            missing.unwrap_err(),
            LedgerError::InvalidArgument { .. }
        ));

        let same = engine.redeem_code("s-1001", "duo-2026", Some("s-1001"));
        assert!(matches!(
            same.unwrap_err(),
            LedgerError::InvalidArgument { .. }
        ));

        let outcome = engine
            .redeem_code("s-1001", "duo-2026", Some("s-1002"))
            .unwrap();
        assert_eq!(outcome.credited, 8);
        assert_eq!(outcome.counterparty, Some(("s-1002".to_string(), 8)));
        assert_eq!(engine.store().account_snapshot("s-1002").unwrap().balance, 8);
    }

    #[test]
    fn test_staff_code_allows_other_recipient() {
        let (engine, _) = engine();
        engine.open_account("s-intended", Role::Student).unwrap();
        engine.open_account("s-walkup", Role::Student).unwrap();
        engine
            .create_staff_code("desk-42", 4, "s-intended")
            .unwrap();

        // Mismatched recipient redeems anyway (warning is logged).
        let outcome = engine.redeem_code("s-walkup", "desk-42", None).unwrap();
        assert_eq!(outcome.credited, 4);

        let result = engine.redeem_code("s-intended", "desk-42", None);
        assert_eq!(result.unwrap_err(), LedgerError::code_already_used("desk-42"));
    }

    #[test]
    fn test_restricted_account_cannot_redeem() {
        let (engine, clock) = engine();
        engine.open_account("s-1001", Role::Student).unwrap();
        engine.create_standard_code("lak-a", 5).unwrap();
        engine
            .restrict_account("s-1001", clock.now() + Duration::days(3), "shop misuse")
            .unwrap();

        let result = engine.redeem_code("s-1001", "lak-a", None);
        assert!(matches!(
            result.unwrap_err(),
            LedgerError::AccountRestricted { .. }
        ));

        engine.lift_restriction("s-1001").unwrap();
        assert!(engine.redeem_code("s-1001", "lak-a", None).is_ok());
    }

    #[test]
    fn test_maintenance_blocks_students_not_admins() {
        let (engine, _) = engine();
        engine.open_account("s-1001", Role::Student).unwrap();
        engine.open_account("a-1", Role::Admin).unwrap();
        engine.create_standard_code("lak-a", 5).unwrap();
        engine.create_standard_code("lak-b", 5).unwrap();
        engine.update_settings(|s| s.maintenance_mode = true);

        let blocked = engine.redeem_code("s-1001", "lak-a", None);
        assert_eq!(blocked.unwrap_err(), LedgerError::MaintenanceClosed);

        assert!(engine.redeem_code("a-1", "lak-b", None).is_ok());
    }

    #[test]
    fn test_caps_split_credit_into_piggy_bank() {
        let (engine, _) = engine();
        engine.open_account("s-1001", Role::Student).unwrap();
        seed_balance(&engine, "s-1001", 20);
        engine.update_settings(|s| {
            s.point_limit_enabled = true;
            s.daily_earn_cap = 15;
            s.holding_cap = 25;
        });
        engine.create_standard_code("lak-big", 10).unwrap();

        let outcome = engine.redeem_code("s-1001", "lak-big", None).unwrap();
        assert_eq!(outcome.credited, 5);
        assert_eq!(outcome.banked, 5);

        let account = engine.store().account_snapshot("s-1001").unwrap();
        assert_eq!(account.balance, 25);

        // Total recorded credit equals the code's value plus the seed.
        let entries = engine.store().ledger_snapshot("s-1001");
        let total: i64 = entries.iter().map(|e| e.amount).sum();
        assert_eq!(total, 30);
        assert_eq!(
            entries
                .iter()
                .filter(|e| e.excluded_from_circulation)
                .map(|e| e.amount)
                .sum::<i64>(),
            5
        );
    }

    #[test]
    fn test_daily_cap_resets_next_day() {
        let (engine, clock) = engine();
        engine.open_account("s-1001", Role::Student).unwrap();
        engine.update_settings(|s| {
            s.point_limit_enabled = true;
            s.daily_earn_cap = 10;
            s.holding_cap = 1_000;
        });
        for (code, value) in [("lak-a", 10), ("lak-b", 10)] {
            engine.create_standard_code(code, value).unwrap();
        }

        let first = engine.redeem_code("s-1001", "lak-a", None).unwrap();
        assert_eq!((first.credited, first.banked), (10, 0));

        clock.advance(Duration::days(1));
        let second = engine.redeem_code("s-1001", "lak-b", None).unwrap();
        assert_eq!((second.credited, second.banked), (10, 0));
    }

    #[test]
    fn test_purchase_debits_and_decrements_stock() {
        let (engine, _) = engine();
        engine.open_account("s-1001", Role::Student).unwrap();
        seed_balance(&engine, "s-1001", 50);
        engine.stock_product("pencil", "Pencil", 10, 3).unwrap();

        let receipt = engine
            .purchase(&PurchaseRequest {
                account: "s-1001".to_string(),
                items: vec![CartItem {
                    product: "pencil".to_string(),
                    quantity: 2,
                }],
                cashier: None,
                staff_discount_percent: None,
                expected_total: None,
            })
            .unwrap();

        assert_eq!(receipt.total, 20);
        assert_eq!(receipt.status, PurchaseStatus::Completed);
        assert_eq!(engine.store().account_snapshot("s-1001").unwrap().balance, 30);
        assert_eq!(engine.store().product_snapshot("pencil").unwrap().stock, 1);

        let purchase = engine.store().purchase_snapshot(receipt.purchase).unwrap();
        assert_eq!(purchase.total_cost, 20);
        assert_eq!(purchase.items[0].unit_price, 10);
    }

    #[test]
    fn test_purchase_fails_whole_cart_on_any_stock_shortfall() {
        let (engine, _) = engine();
        engine.open_account("s-1001", Role::Student).unwrap();
        seed_balance(&engine, "s-1001", 100);
        engine.stock_product("pencil", "Pencil", 5, 10).unwrap();
        engine.stock_product("mug", "Mug", 20, 1).unwrap();

        let result = engine.purchase(&PurchaseRequest {
            account: "s-1001".to_string(),
            items: vec![
                CartItem {
                    product: "pencil".to_string(),
                    quantity: 2,
                },
                CartItem {
                    product: "mug".to_string(),
                    quantity: 2,
                },
            ],
            cashier: None,
            staff_discount_percent: None,
            expected_total: None,
        });

        assert_eq!(
            result.unwrap_err(),
            LedgerError::insufficient_stock("mug", 1, 2)
        );
        // No partial commit: the pencil stock is untouched.
        assert_eq!(engine.store().product_snapshot("pencil").unwrap().stock, 10);
        assert_eq!(engine.store().account_snapshot("s-1001").unwrap().balance, 100);
    }

    #[test]
    fn test_purchase_rejects_duplicate_cart_lines() {
        let (engine, _) = engine();
        engine.open_account("s-1001", Role::Student).unwrap();
        seed_balance(&engine, "s-1001", 50);
        engine.stock_product("pencil", "Pencil", 10, 3).unwrap();

        let result = engine.purchase(&PurchaseRequest {
            account: "s-1001".to_string(),
            items: vec![
                CartItem {
                    product: "pencil".to_string(),
                    quantity: 1,
                },
                CartItem {
                    product: "pencil".to_string(),
                    quantity: 1,
                },
            ],
            cashier: None,
            staff_discount_percent: None,
            expected_total: None,
        });

        assert!(matches!(
            result.unwrap_err(),
            LedgerError::InvalidArgument { .. }
        ));
        assert_eq!(engine.store().product_snapshot("pencil").unwrap().stock, 3);
        assert_eq!(engine.store().account_snapshot("s-1001").unwrap().balance, 50);
    }

    #[test]
    fn test_purchase_requires_covering_balance() {
        let (engine, _) = engine();
        engine.open_account("s-1001", Role::Student).unwrap();
        seed_balance(&engine, "s-1001", 5);
        engine.stock_product("mug", "Mug", 20, 5).unwrap();

        let result = engine.purchase(&PurchaseRequest {
            account: "s-1001".to_string(),
            items: vec![CartItem {
                product: "mug".to_string(),
                quantity: 1,
            }],
            cashier: None,
            staff_discount_percent: None,
            expected_total: None,
        });

        assert_eq!(
            result.unwrap_err(),
            LedgerError::insufficient_balance("s-1001", 5, 20)
        );
        assert_eq!(engine.store().product_snapshot("mug").unwrap().stock, 5);
    }

    #[test]
    fn test_disabled_shop_allows_pos_flow_only() {
        let (engine, _) = engine();
        engine.open_account("s-1001", Role::Student).unwrap();
        engine.open_account("k-1", Role::Kiosk).unwrap();
        seed_balance(&engine, "s-1001", 50);
        engine.stock_product("mug", "Mug", 20, 5).unwrap();
        engine.update_settings(|s| s.shop_enabled = false);

        let online = engine.purchase(&PurchaseRequest {
            account: "s-1001".to_string(),
            items: vec![CartItem {
                product: "mug".to_string(),
                quantity: 1,
            }],
            cashier: None,
            staff_discount_percent: None,
            expected_total: None,
        });
        assert_eq!(online.unwrap_err(), LedgerError::ShopDisabled);

        let pos = engine
            .purchase(&PurchaseRequest {
                account: "s-1001".to_string(),
                items: vec![CartItem {
                    product: "mug".to_string(),
                    quantity: 1,
                }],
                cashier: Some("k-1".to_string()),
                staff_discount_percent: None,
                expected_total: None,
            })
            .unwrap();
        assert_eq!(pos.status, PurchaseStatus::Pending);

        engine.fulfill_purchase(pos.purchase).unwrap();
        assert_eq!(
            engine
                .store()
                .purchase_snapshot(pos.purchase)
                .unwrap()
                .status,
            PurchaseStatus::Completed
        );
    }

    #[test]
    fn test_discounts_combine_and_round_half_up() {
        let (engine, _) = engine();
        engine.open_account("s-1001", Role::Student).unwrap();
        engine.open_account("t-1", Role::Teacher).unwrap();
        seed_balance(&engine, "s-1001", 100);
        engine.stock_product("shirt", "Shirt", 30, 5).unwrap();
        engine.update_settings(|s| s.global_discount_percent = 10);

        // 30 points, 10% global + 15% cashier = 25% off -> 22.5 -> 23.
        let receipt = engine
            .purchase(&PurchaseRequest {
                account: "s-1001".to_string(),
                items: vec![CartItem {
                    product: "shirt".to_string(),
                    quantity: 1,
                }],
                cashier: Some("t-1".to_string()),
                staff_discount_percent: Some(15),
                expected_total: None,
            })
            .unwrap();
        assert_eq!(receipt.total, 23);

        // A manual discount without a cashier is rejected up front.
        let invalid = engine.purchase(&PurchaseRequest {
            account: "s-1001".to_string(),
            items: vec![CartItem {
                product: "shirt".to_string(),
                quantity: 1,
            }],
            cashier: None,
            staff_discount_percent: Some(15),
            expected_total: None,
        });
        assert!(matches!(
            invalid.unwrap_err(),
            LedgerError::InvalidArgument { .. }
        ));
    }

    #[test]
    fn test_stale_expected_total_rejects_purchase() {
        let (engine, _) = engine();
        engine.open_account("s-1001", Role::Student).unwrap();
        seed_balance(&engine, "s-1001", 100);
        engine.stock_product("shirt", "Shirt", 30, 5).unwrap();

        // The cart was displayed before the discount changed; the re-priced
        // total no longer matches and the purchase is rejected, not charged.
        engine.update_settings(|s| s.global_discount_percent = 10);
        let stale = engine.purchase(&PurchaseRequest {
            account: "s-1001".to_string(),
            items: vec![CartItem {
                product: "shirt".to_string(),
                quantity: 1,
            }],
            cashier: None,
            staff_discount_percent: None,
            expected_total: Some(30),
        });
        assert!(matches!(
            stale.unwrap_err(),
            LedgerError::InvalidArgument { .. }
        ));
        assert_eq!(engine.store().product_snapshot("shirt").unwrap().stock, 5);

        let fresh = engine
            .purchase(&PurchaseRequest {
                account: "s-1001".to_string(),
                items: vec![CartItem {
                    product: "shirt".to_string(),
                    quantity: 1,
                }],
                cashier: None,
                staff_discount_percent: None,
                expected_total: Some(27),
            })
            .unwrap();
        assert_eq!(fresh.total, 27);
    }

    #[test]
    fn test_dispute_lifecycle_with_refund() {
        let (engine, _) = engine();
        engine.open_account("s-1001", Role::Student).unwrap();
        seed_balance(&engine, "s-1001", 50);
        engine.stock_product("mug", "Mug", 20, 5).unwrap();
        let receipt = engine
            .purchase(&PurchaseRequest {
                account: "s-1001".to_string(),
                items: vec![CartItem {
                    product: "mug".to_string(),
                    quantity: 1,
                }],
                cashier: None,
                staff_discount_percent: None,
                expected_total: None,
            })
            .unwrap();

        // Resolving before any dispute is open is rejected.
        let early = engine.resolve_dispute(receipt.purchase, true);
        assert!(matches!(
            early.unwrap_err(),
            LedgerError::DisputeNotOpen { .. }
        ));

        engine.open_dispute(receipt.purchase, "s-1001").unwrap();
        let duplicate = engine.open_dispute(receipt.purchase, "s-1001");
        assert!(matches!(
            duplicate.unwrap_err(),
            LedgerError::DisputeAlreadyOpen { .. }
        ));

        let refunded = engine.resolve_dispute(receipt.purchase, true).unwrap();
        assert_eq!(refunded, 20);
        assert_eq!(engine.store().account_snapshot("s-1001").unwrap().balance, 50);
        assert_eq!(
            engine
                .store()
                .purchase_snapshot(receipt.purchase)
                .unwrap()
                .dispute,
            DisputeStatus::Resolved
        );
    }

    #[test]
    fn test_letter_approval_credits_both_exactly_once() {
        let (engine, _) = engine();
        engine.open_account("s-1001", Role::Student).unwrap();
        engine.open_account("s-1002", Role::Student).unwrap();

        let letter = engine.submit_letter("s-1001", "s-1002").unwrap();
        engine.approve_letter(letter.id).unwrap();

        assert_eq!(
            engine.store().account_snapshot("s-1001").unwrap().balance,
            LETTER_REWARD_POINTS
        );
        assert_eq!(
            engine.store().account_snapshot("s-1002").unwrap().balance,
            LETTER_REWARD_POINTS
        );

        let again = engine.approve_letter(letter.id);
        assert!(matches!(
            again.unwrap_err(),
            LedgerError::LetterAlreadyApproved { .. }
        ));
        assert_eq!(
            engine.store().account_snapshot("s-1001").unwrap().balance,
            LETTER_REWARD_POINTS
        );
    }

    #[test]
    fn test_batch_grant_reports_partial_failure() {
        let (engine, _) = engine();
        engine.open_account("t-1", Role::Teacher).unwrap();
        engine.open_account("s-1001", Role::Student).unwrap();
        engine.open_account("s-1002", Role::Student).unwrap();

        let targets = vec![
            "s-1001".to_string(),
            "s-ghost".to_string(),
            "s-1002".to_string(),
        ];
        let outcome = engine.batch_grant("t-1", &targets, 3, "Booth visit").unwrap();

        assert_eq!(outcome.granted, 2);
        assert_eq!(outcome.failed, 1);
        assert_eq!(outcome.errors, vec!["Account s-ghost not found".to_string()]);
        assert_eq!(engine.store().account_snapshot("s-1001").unwrap().balance, 3);
        assert_eq!(engine.store().account_snapshot("s-1002").unwrap().balance, 3);
    }

    #[test]
    fn test_batch_grant_requires_staff_granter() {
        let (engine, _) = engine();
        engine.open_account("s-1001", Role::Student).unwrap();

        let result = engine.batch_grant("s-1001", &["s-1001".to_string()], 3, "nope");
        assert!(matches!(
            result.unwrap_err(),
            LedgerError::InvalidArgument { .. }
        ));
    }

    #[test]
    fn test_team_bonus_pays_all_five_exactly_once() {
        let (engine, _) = engine();
        for n in 1..=6 {
            engine.open_account(&format!("s-{n}"), Role::Student).unwrap();
        }

        for n in 1..=4 {
            let outcome = engine.join_team(&format!("s-{n}"), "team-7").unwrap();
            assert!(!outcome.completed);
        }
        let fifth = engine.join_team("s-5", "team-7").unwrap();
        assert!(fifth.completed);

        for n in 1..=5 {
            assert_eq!(
                engine
                    .store()
                    .account_snapshot(&format!("s-{n}"))
                    .unwrap()
                    .balance,
                TEAM_BONUS_POINTS
            );
        }

        let sixth = engine.join_team("s-6", "team-7");
        assert!(matches!(sixth.unwrap_err(), LedgerError::TeamFull { .. }));

        let duplicate = engine.join_team("s-1", "team-7");
        assert!(matches!(
            duplicate.unwrap_err(),
            LedgerError::AlreadyTeamMember { .. }
        ));
    }

    #[test]
    fn test_migration_transplants_and_reverts() {
        let (engine, _) = engine();
        engine.open_account("s-old", Role::Student).unwrap();
        engine.open_account("s-new", Role::Student).unwrap();
        seed_balance(&engine, "s-old", 30);

        let old_entries = engine.store().ledger_snapshot("s-old").len();

        engine.migrate_account("s-old", "s-new").unwrap();
        assert_eq!(engine.store().account_snapshot("s-old").unwrap().balance, 0);
        assert_eq!(engine.store().account_snapshot("s-new").unwrap().balance, 30);
        assert_eq!(engine.store().ledger_snapshot("s-new").len(), old_entries);

        engine.revert_last_migration().unwrap();
        assert_eq!(engine.store().account_snapshot("s-old").unwrap().balance, 30);
        assert_eq!(engine.store().account_snapshot("s-new").unwrap().balance, 0);
        assert_eq!(engine.store().ledger_snapshot("s-old").len(), old_entries);
        assert!(engine.store().ledger_snapshot("s-new").is_empty());

        let twice = engine.revert_last_migration();
        assert_eq!(twice.unwrap_err(), LedgerError::NothingToRevert);
    }

    #[test]
    fn test_migration_onto_itself_is_rejected() {
        let (engine, _) = engine();
        engine.open_account("s-1001", Role::Student).unwrap();

        let result = engine.migrate_account("s-1001", "s-1001");
        assert!(matches!(
            result.unwrap_err(),
            LedgerError::InvalidArgument { .. }
        ));
    }

    #[test]
    fn test_generate_codes_are_unique_and_redeemable() {
        let (engine, _) = engine();
        engine.open_account("s-1001", Role::Student).unwrap();

        let codes = engine.generate_standard_codes(20, 2).unwrap();
        assert_eq!(codes.len(), 20);
        let unique: std::collections::HashSet<_> = codes.iter().collect();
        assert_eq!(unique.len(), 20);

        engine.redeem_code("s-1001", &codes[0], None).unwrap();
        assert_eq!(engine.store().account_snapshot("s-1001").unwrap().balance, 2);
    }

    #[test]
    fn test_preview_credit_matches_policy() {
        let (engine, _) = engine();
        engine.open_account("s-1001", Role::Student).unwrap();
        engine.update_settings(|s| {
            s.point_limit_enabled = true;
            s.daily_earn_cap = 4;
            s.holding_cap = 100;
        });

        let decision = engine.preview_credit("s-1001", 10).unwrap();
        assert_eq!(decision.applied, 4);
        assert_eq!(decision.banked, 6);
    }
}
