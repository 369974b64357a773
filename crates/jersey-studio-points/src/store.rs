/// The remote account collaborator and an in-memory backend.
use std::collections::HashMap;
use std::sync::{Arc, Mutex, MutexGuard};

use serde_json::Value;

use crate::account::AccountUpdate;
use crate::error::StoreError;

/// Outcome of the transaction-log half of a ledger write.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AuditStatus {
    /// The log entry was stored with the balance change.
    Recorded,
    /// The balance changed but the log entry could not be stored.
    Pending { reason: String },
}

impl AuditStatus {
    pub fn is_recorded(&self) -> bool {
        matches!(self, AuditStatus::Recorded)
    }
}

/// Source of truth for accounts and their transaction logs.
///
/// Rows are JSON objects (see `AccountRecord` / `TransactionRecord`);
/// validation happens in the ledger, not in the store.
pub trait AccountStore: Send + Sync {
    fn backend_name(&self) -> &'static str;

    /// Returns the account row, or `None` if the user has no account yet.
    fn fetch_account(&self, user_id: &str) -> Result<Option<Value>, StoreError>;

    /// Inserts a new account row. Fails with `AlreadyExists` if one is
    /// stored under the same id.
    fn create_account(&self, row: Value) -> Result<(), StoreError>;

    /// Applies `update` if the stored counters still equal its
    /// `expected_*` values (`AccountUpdate::check_row`), otherwise fails
    /// with `Conflict`.
    fn update_account(&self, update: &AccountUpdate) -> Result<(), StoreError>;

    fn insert_transaction(&self, row: Value) -> Result<(), StoreError>;

    /// All transaction rows of a user, newest first.
    fn list_transactions(&self, user_id: &str) -> Result<Vec<Value>, StoreError>;

    /// Balance update followed by the log insert.
    ///
    /// The default runs the two writes one after the other. A failed
    /// update aborts; a failed insert after a successful update is
    /// reported as `AuditStatus::Pending` so the caller can retry it.
    fn commit_entry(
        &self,
        update: &AccountUpdate,
        transaction: Value,
    ) -> Result<AuditStatus, StoreError> {
        self.update_account(update)?;
        match self.insert_transaction(transaction) {
            Ok(()) => Ok(AuditStatus::Recorded),
            Err(e) => Ok(AuditStatus::Pending {
                reason: e.to_string(),
            }),
        }
    }
}

impl<S: AccountStore + ?Sized> AccountStore for Arc<S> {
    fn backend_name(&self) -> &'static str {
        (**self).backend_name()
    }

    fn fetch_account(&self, user_id: &str) -> Result<Option<Value>, StoreError> {
        (**self).fetch_account(user_id)
    }

    fn create_account(&self, row: Value) -> Result<(), StoreError> {
        (**self).create_account(row)
    }

    fn update_account(&self, update: &AccountUpdate) -> Result<(), StoreError> {
        (**self).update_account(update)
    }

    fn insert_transaction(&self, row: Value) -> Result<(), StoreError> {
        (**self).insert_transaction(row)
    }

    fn list_transactions(&self, user_id: &str) -> Result<Vec<Value>, StoreError> {
        (**self).list_transactions(user_id)
    }

    fn commit_entry(
        &self,
        update: &AccountUpdate,
        transaction: Value,
    ) -> Result<AuditStatus, StoreError> {
        (**self).commit_entry(update, transaction)
    }
}

fn row_str<'a>(row: &'a Value, field: &str) -> Result<&'a str, StoreError> {
    row.get(field)
        .and_then(Value::as_str)
        .ok_or_else(|| StoreError::Backend(anyhow::anyhow!("row has no string field '{field}'")))
}

/// Account store held entirely in memory.
///
/// Used for tests and offline sessions; share one between ledgers with
/// `Arc<MemoryAccountStore>`.
#[derive(Debug, Default)]
pub struct MemoryAccountStore {
    accounts: Mutex<HashMap<String, Value>>,
    /// Chronological.
    transactions: Mutex<Vec<Value>>,
}

impl MemoryAccountStore {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Stores a row as-is, bypassing all checks.
    pub fn insert_raw_account(&self, user_id: &str, row: Value) -> Result<(), StoreError> {
        self.accounts()?.insert(user_id.to_string(), row);
        Ok(())
    }

    /// Stores a transaction row as-is.
    pub fn insert_raw_transaction(&self, row: Value) -> Result<(), StoreError> {
        self.transactions()?.push(row);
        Ok(())
    }

    fn accounts(&self) -> Result<MutexGuard<'_, HashMap<String, Value>>, StoreError> {
        self.accounts
            .lock()
            .map_err(|_| StoreError::Backend(anyhow::anyhow!("account table lock poisoned")))
    }

    fn transactions(&self) -> Result<MutexGuard<'_, Vec<Value>>, StoreError> {
        self.transactions
            .lock()
            .map_err(|_| StoreError::Backend(anyhow::anyhow!("transaction table lock poisoned")))
    }
}

impl AccountStore for MemoryAccountStore {
    fn backend_name(&self) -> &'static str {
        "memory"
    }

    fn fetch_account(&self, user_id: &str) -> Result<Option<Value>, StoreError> {
        Ok(self.accounts()?.get(user_id).cloned())
    }

    fn create_account(&self, row: Value) -> Result<(), StoreError> {
        let user_id = row_str(&row, "id")?.to_string();
        let mut accounts = self.accounts()?;
        if accounts.contains_key(&user_id) {
            return Err(StoreError::AlreadyExists { user_id });
        }
        accounts.insert(user_id, row);
        Ok(())
    }

    fn update_account(&self, update: &AccountUpdate) -> Result<(), StoreError> {
        let mut accounts = self.accounts()?;
        let row = accounts
            .get_mut(&update.user_id)
            .ok_or_else(|| StoreError::NotFound {
                user_id: update.user_id.clone(),
            })?;

        update.check_row(row)?;
        update.apply_to_row(row);
        Ok(())
    }

    fn insert_transaction(&self, row: Value) -> Result<(), StoreError> {
        row_str(&row, "user_id")?;
        self.transactions()?.push(row);
        Ok(())
    }

    fn list_transactions(&self, user_id: &str) -> Result<Vec<Value>, StoreError> {
        Ok(self
            .transactions()?
            .iter()
            .rev()
            .filter(|row| row.get("user_id").and_then(Value::as_str) == Some(user_id))
            .cloned()
            .collect())
    }
}
