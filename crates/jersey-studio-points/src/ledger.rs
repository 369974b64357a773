/// Points ledger for one signed-in user.
///
/// `PointsLedger` mirrors the user's account from an `AccountStore` and
/// routes every balance change through it: the stored balance is updated
/// first (conditionally, against the counters the ledger last saw), then
/// the change is appended to the transaction log. The local mirror only
/// moves after the store accepted the change.
use chrono::{DateTime, Utc};
use jersey_studio_config::StudioConfig;
use serde::Serialize;

use crate::account::{AccountUpdate, PointsAccount, PointsTransaction, TransactionKind};
use crate::error::{LedgerError, StoreError};
use crate::session::AuthSession;
use crate::store::{AccountStore, AuditStatus};

/// Authentication lifecycle of the ledger.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum LedgerState {
    Unauthenticated,
    /// Session accepted, account being fetched or created.
    Loading,
    Ready,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct LedgerConfig {
    /// Points granted when an account is created on first sign-in.
    pub trial_grant: u64,
    /// Lifetime purchased points above which an account is premium.
    pub premium_threshold: u64,
}

impl LedgerConfig {
    pub fn from_studio(config: &StudioConfig) -> Self {
        Self {
            trial_grant: config.trial_grant,
            premium_threshold: config.premium_threshold,
        }
    }
}

impl Default for LedgerConfig {
    fn default() -> Self {
        Self::from_studio(&StudioConfig::default())
    }
}

/// Result of a successful balance change.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LedgerReceipt {
    /// Account after the change.
    pub account: PointsAccount,
    pub transaction: PointsTransaction,
    pub audit: AuditStatus,
}

/// Balance compared with the logged transactions.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ReconcileReport {
    pub balance: u64,
    pub logged_count: usize,
    pub logged_total: i64,
    /// Entries whose log write failed and still await `retry_pending_audit`.
    pub pending_count: usize,
    pub pending_total: i64,
}

impl ReconcileReport {
    /// Balance minus everything logged or waiting to be logged.
    pub fn drift(&self) -> i128 {
        i128::from(self.balance)
            - i128::from(self.logged_total)
            - i128::from(self.pending_total)
    }

    pub fn is_consistent(&self) -> bool {
        self.drift() == 0
    }
}

fn sum_amounts<'a>(transactions: impl IntoIterator<Item = &'a PointsTransaction>) -> i64 {
    transactions
        .into_iter()
        .fold(0i64, |total, tx| total.saturating_add(tx.amount))
}

pub struct PointsLedger<S: AccountStore> {
    store: S,
    config: LedgerConfig,
    state: LedgerState,
    session: Option<AuthSession>,
    account: Option<PointsAccount>,
    /// Log entries whose balance change is committed but whose insert failed.
    pending_audit: Vec<PointsTransaction>,
}

impl<S: AccountStore> std::fmt::Debug for PointsLedger<S> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PointsLedger")
            .field("backend", &self.store.backend_name())
            .field("state", &self.state)
            .field("user_id", &self.session.as_ref().map(|s| s.user_id.as_str()))
            .field("balance", &self.account.as_ref().map(|a| a.balance))
            .field("pending_audit", &self.pending_audit.len())
            .finish()
    }
}

impl<S: AccountStore> PointsLedger<S> {
    pub fn new(store: S, config: LedgerConfig) -> Self {
        Self {
            store,
            config,
            state: LedgerState::Unauthenticated,
            session: None,
            account: None,
            pending_audit: Vec::new(),
        }
    }

    pub fn state(&self) -> LedgerState {
        self.state
    }

    pub fn session(&self) -> Option<&AuthSession> {
        self.session.as_ref()
    }

    /// The mirrored account, if signed in.
    pub fn account(&self) -> Option<&PointsAccount> {
        self.account.as_ref()
    }

    pub fn store(&self) -> &S {
        &self.store
    }

    pub fn config(&self) -> LedgerConfig {
        self.config
    }

    /// Establishes a session and loads the user's account.
    ///
    /// A user without an account gets one holding the free trial grant,
    /// with a matching `bonus` entry in the log.
    ///
    /// # Errors
    ///
    /// `NotAuthenticated` for an expired session; `Remote` or
    /// `MalformedRecord` if the account cannot be loaded. The ledger is
    /// left `Unauthenticated` on any error.
    pub fn sign_in(&mut self, session: AuthSession) -> Result<&PointsAccount, LedgerError> {
        self.sign_out();
        if !session.is_valid_at(Utc::now()) {
            return Err(LedgerError::NotAuthenticated);
        }

        self.state = LedgerState::Loading;
        tracing::debug!(
            user_id = %session.user_id,
            backend = self.store.backend_name(),
            "Loading points account"
        );

        match self.load_or_create(&session.user_id) {
            Ok(account) => {
                tracing::debug!(
                    user_id = %session.user_id,
                    balance = account.balance,
                    "Points account ready"
                );
                self.session = Some(session);
                self.state = LedgerState::Ready;
                Ok(&*self.account.insert(account))
            }
            Err(e) => {
                self.state = LedgerState::Unauthenticated;
                Err(e)
            }
        }
    }

    /// Drops the session and the mirrored account.
    ///
    /// Entries awaiting `retry_pending_audit` are kept.
    pub fn sign_out(&mut self) {
        if self.state != LedgerState::Unauthenticated {
            tracing::debug!("Signed out of points ledger");
        }
        self.state = LedgerState::Unauthenticated;
        self.session = None;
        self.account = None;
    }

    fn load_or_create(&mut self, user_id: &str) -> Result<PointsAccount, LedgerError> {
        if let Some(account) = self.fetch(user_id, "sign_in")? {
            return Ok(account);
        }

        let grant = self.config.trial_grant;
        let account = PointsAccount::trial(user_id, grant);
        match self.store.create_account(account.to_row()?) {
            Ok(()) => {}
            Err(StoreError::AlreadyExists { .. }) => {
                // Created by another session in the meantime
                return self
                    .fetch(user_id, "sign_in")?
                    .ok_or_else(|| {
                        LedgerError::remote(
                            "sign_in",
                            StoreError::NotFound {
                                user_id: user_id.to_string(),
                            },
                        )
                    });
            }
            Err(e) => return Err(LedgerError::remote("sign_in", e)),
        }
        tracing::debug!(user_id = %user_id, grant, "Created points account");

        if grant > 0 {
            let bonus = PointsTransaction::new(
                user_id,
                TransactionKind::Bonus,
                grant,
                format!("Free trial - {grant} free exports"),
            );
            if let Err(e) = self.store.insert_transaction(bonus.to_row()?) {
                tracing::warn!(user_id = %user_id, "Failed to log trial grant: {e}");
                self.pending_audit.push(bonus);
            }
        }
        Ok(account)
    }

    fn fetch(
        &self,
        user_id: &str,
        operation: &'static str,
    ) -> Result<Option<PointsAccount>, LedgerError> {
        let Some(row) = self
            .store
            .fetch_account(user_id)
            .map_err(|e| LedgerError::remote(operation, e))?
        else {
            return Ok(None);
        };

        let account = PointsAccount::parse(row)?;
        if account.user_id != user_id {
            return Err(LedgerError::malformed(
                "account",
                format!("requested {user_id}, store returned {}", account.user_id),
            ));
        }
        Ok(Some(account))
    }

    /// The signed-in user's id, without touching an expired session.
    fn ready_user(&self) -> Result<&str, LedgerError> {
        match (&self.state, &self.session) {
            (LedgerState::Ready, Some(session)) if session.is_valid_at(Utc::now()) => {
                Ok(session.user_id.as_str())
            }
            _ => Err(LedgerError::NotAuthenticated),
        }
    }

    /// Signs out if the session is no longer valid at `now`.
    ///
    /// Returns `true` if this call ended the session.
    pub fn expire_session_at(&mut self, now: DateTime<Utc>) -> bool {
        let expired = self.state == LedgerState::Ready
            && !self.session.as_ref().is_some_and(|s| s.is_valid_at(now));
        if expired {
            tracing::debug!("Session expired");
            self.sign_out();
        }
        expired
    }

    /// Current account for a mutation; signs out if the session expired.
    fn require_ready(&mut self) -> Result<PointsAccount, LedgerError> {
        self.expire_session_at(Utc::now());
        self.ready_user()?;
        self.account.clone().ok_or(LedgerError::NotAuthenticated)
    }

    /// Whether the balance covers `points_needed`. `false` when signed out.
    pub fn check_balance(&self, points_needed: u64) -> bool {
        self.account
            .as_ref()
            .is_some_and(|account| account.balance >= points_needed)
    }

    /// Current balance, 0 when signed out.
    pub fn current_points(&self) -> u64 {
        self.account.as_ref().map_or(0, |account| account.balance)
    }

    pub fn has_enough_points(&self) -> bool {
        self.current_points() > 0
    }

    pub fn is_premium(&self) -> bool {
        self.account
            .as_ref()
            .is_some_and(|account| account.total_purchased > self.config.premium_threshold)
    }

    /// Spends points on an export.
    ///
    /// # Errors
    ///
    /// `NotAuthenticated`, `InvalidAmount` for zero points,
    /// `InsufficientPoints`, `StaleBalance` if another session changed the
    /// balance first, or `Remote` if the balance write failed.
    pub fn deduct(&mut self, points: u64, description: &str) -> Result<LedgerReceipt, LedgerError> {
        self.commit(TransactionKind::Usage, points, description, "deduct")
    }

    /// Credits purchased points.
    ///
    /// # Errors
    ///
    /// As [`PointsLedger::deduct`], minus `InsufficientPoints`.
    pub fn add(&mut self, points: u64, description: &str) -> Result<LedgerReceipt, LedgerError> {
        self.commit(TransactionKind::Purchase, points, description, "add")
    }

    /// Credits promotional points. Counted as purchased.
    pub fn add_bonus(
        &mut self,
        points: u64,
        description: &str,
    ) -> Result<LedgerReceipt, LedgerError> {
        self.commit(TransactionKind::Bonus, points, description, "add_bonus")
    }

    /// Returns points spent on a failed export.
    ///
    /// The points are credited like a purchase; `total_used` keeps counting
    /// the original spend.
    ///
    /// # Errors
    ///
    /// `InvalidAmount` if `points` exceeds the points used so far, plus the
    /// errors of [`PointsLedger::deduct`].
    pub fn refund(&mut self, points: u64, description: &str) -> Result<LedgerReceipt, LedgerError> {
        self.commit(TransactionKind::Refund, points, description, "refund")
    }

    fn commit(
        &mut self,
        kind: TransactionKind,
        points: u64,
        description: &str,
        operation: &'static str,
    ) -> Result<LedgerReceipt, LedgerError> {
        let before = self.require_ready()?;
        let after = before.apply(kind, points)?;
        let transaction = PointsTransaction::new(&before.user_id, kind, points, description);
        let update = AccountUpdate::between(&before, &after);

        let audit = match self.store.commit_entry(&update, transaction.to_row()?) {
            Ok(audit) => audit,
            Err(StoreError::Conflict { expected, actual }) => {
                tracing::warn!(
                    user_id = %before.user_id,
                    expected,
                    actual,
                    "Account changed concurrently, refreshing"
                );
                let current = self.refresh()?.balance;
                return Err(LedgerError::StaleBalance { current });
            }
            Err(e) => return Err(LedgerError::remote(operation, e)),
        };

        if let AuditStatus::Pending { reason } = &audit {
            tracing::warn!(
                user_id = %before.user_id,
                transaction_id = %transaction.id,
                "Balance updated but transaction log write failed: {reason}"
            );
            self.pending_audit.push(transaction.clone());
        }

        tracing::debug!(
            user_id = %after.user_id,
            kind = %kind,
            points,
            balance = after.balance,
            "Points ledger updated"
        );
        self.account = Some(after.clone());
        Ok(LedgerReceipt {
            account: after,
            transaction,
            audit,
        })
    }

    /// Re-reads the account from the store.
    ///
    /// # Errors
    ///
    /// `NotAuthenticated`, `Remote` (including an account that vanished
    /// from the store), or `MalformedRecord`.
    pub fn refresh(&mut self) -> Result<&PointsAccount, LedgerError> {
        self.require_ready()?;
        let user_id = self.ready_user()?.to_string();
        let account = self.fetch(&user_id, "refresh")?.ok_or_else(|| {
            LedgerError::remote("refresh", StoreError::NotFound { user_id: user_id.clone() })
        })?;
        Ok(&*self.account.insert(account))
    }

    /// The signed-in user's transaction log, newest first.
    ///
    /// # Errors
    ///
    /// `NotAuthenticated`, `Remote`, or `MalformedRecord` for the first row
    /// that fails validation.
    pub fn transactions(&self) -> Result<Vec<PointsTransaction>, LedgerError> {
        let user_id = self.ready_user()?;
        self.store
            .list_transactions(user_id)
            .map_err(|e| LedgerError::remote("transactions", e))?
            .into_iter()
            .map(PointsTransaction::parse)
            .collect()
    }

    /// Compares the mirrored balance with the logged transactions.
    pub fn reconcile(&self) -> Result<ReconcileReport, LedgerError> {
        let user_id = self.ready_user()?;
        let logged = self.transactions()?;
        let pending: Vec<&PointsTransaction> = self
            .pending_audit
            .iter()
            .filter(|tx| tx.user_id == user_id)
            .collect();

        let report = ReconcileReport {
            balance: self.current_points(),
            logged_count: logged.len(),
            logged_total: sum_amounts(&logged),
            pending_count: pending.len(),
            pending_total: sum_amounts(pending.iter().copied()),
        };
        if !report.is_consistent() {
            tracing::warn!(
                user_id = %user_id,
                drift = %report.drift(),
                "Points log does not match balance"
            );
        }
        Ok(report)
    }

    /// Log entries still waiting to be written.
    pub fn pending_audit(&self) -> &[PointsTransaction] {
        &self.pending_audit
    }

    /// Writes queued log entries, oldest first.
    ///
    /// Stops at the first failure and keeps it and everything after it
    /// queued. Returns how many entries were written.
    ///
    /// # Errors
    ///
    /// `Remote` with the insert failure.
    pub fn retry_pending_audit(&mut self) -> Result<usize, LedgerError> {
        let mut written = 0;
        while let Some(transaction) = self.pending_audit.first() {
            self.store
                .insert_transaction(transaction.to_row()?)
                .map_err(|e| LedgerError::remote("retry_pending_audit", e))?;
            self.pending_audit.remove(0);
            written += 1;
        }
        if written > 0 {
            tracing::debug!(written, "Flushed pending transaction log entries");
        }
        Ok(written)
    }
}
