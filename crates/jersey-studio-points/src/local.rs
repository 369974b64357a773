/// Embedded account store backed by redb.
///
/// Uses a single database file with two tables:
/// - `accounts`: account rows as JSON keyed by user id
/// - `transactions`: transaction rows as JSON keyed by `"{user_id}#{seq:020}"`
///
/// Rows are kept as JSON text so they stay byte-compatible with what a
/// hosted backend returns.
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use redb::{Database, ReadableDatabase, ReadableTable, TableDefinition, WriteTransaction};
use serde_json::Value;

use crate::account::AccountUpdate;
use crate::error::StoreError;
use crate::store::{AccountStore, AuditStatus};

const ACCOUNT_TABLE: TableDefinition<&str, &str> = TableDefinition::new("accounts");

const TRANSACTION_TABLE: TableDefinition<&str, &str> = TableDefinition::new("transactions");

fn transaction_key(user_id: &str, seq: u64) -> String {
    format!("{user_id}#{seq:020}")
}

/// `#` .. `$` covers exactly one user's keys.
fn user_range(user_id: &str) -> (String, String) {
    (format!("{user_id}#"), format!("{user_id}$"))
}

fn parse_row(raw: &str) -> Result<Value> {
    serde_json::from_str(raw).context("Failed to parse stored row")
}

fn row_user_id(row: &Value) -> Result<String> {
    row.get("user_id")
        .and_then(Value::as_str)
        .map(str::to_string)
        .context("Transaction row has no user_id")
}

/// Conditionally rewrites the account row inside an open write transaction.
fn apply_update(write_txn: &WriteTransaction, update: &AccountUpdate) -> Result<(), StoreError> {
    let mut table = write_txn
        .open_table(ACCOUNT_TABLE)
        .context("Failed to open account table")?;

    let mut row = match table
        .get(update.user_id.as_str())
        .context("Failed to read account")?
    {
        Some(guard) => parse_row(guard.value())?,
        None => {
            return Err(StoreError::NotFound {
                user_id: update.user_id.clone(),
            });
        }
    };

    update.check_row(&row)?;
    update.apply_to_row(&mut row);
    let json = serde_json::to_string(&row).context("Failed to serialize account")?;
    table
        .insert(update.user_id.as_str(), json.as_str())
        .context("Failed to write account")?;
    Ok(())
}

/// Appends a transaction row inside an open write transaction.
fn append_transaction(write_txn: &WriteTransaction, row: &Value) -> Result<()> {
    let user_id = row_user_id(row)?;
    let json = serde_json::to_string(row).context("Failed to serialize transaction")?;

    let mut table = write_txn
        .open_table(TRANSACTION_TABLE)
        .context("Failed to open transaction table")?;
    let (start, end) = user_range(&user_id);
    let seq = table
        .range::<&str>(start.as_str()..end.as_str())
        .context("Failed to range query transaction table")?
        .count() as u64;

    table
        .insert(transaction_key(&user_id, seq).as_str(), json.as_str())
        .context("Failed to insert transaction")?;
    Ok(())
}

/// Account store in a local redb file, for offline and CLI use.
///
/// Balance update and log insert commit in one write transaction, so
/// `commit_entry` never returns `AuditStatus::Pending`.
pub struct LocalAccountStore {
    db: Database,
    path: PathBuf,
}

impl std::fmt::Debug for LocalAccountStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("LocalAccountStore")
            .field("path", &self.path)
            .finish()
    }
}

impl LocalAccountStore {
    /// Path of the account database inside a data directory.
    pub fn database_path(data_dir: &Path) -> PathBuf {
        data_dir.join("accounts.redb")
    }

    /// Opens or creates the account database in `data_dir`.
    ///
    /// # Errors
    ///
    /// Returns an error if the directory cannot be created or the database
    /// cannot be opened.
    pub fn open(data_dir: &Path) -> Result<Self> {
        std::fs::create_dir_all(data_dir)
            .with_context(|| format!("Failed to create data directory: {}", data_dir.display()))?;

        let path = Self::database_path(data_dir);
        let db = Database::create(&path)
            .with_context(|| format!("Failed to open account database: {}", path.display()))?;

        let write_txn = db
            .begin_write()
            .context("Failed to begin initial write transaction")?;
        {
            let _ = write_txn
                .open_table(ACCOUNT_TABLE)
                .context("Failed to create account table")?;
            let _ = write_txn
                .open_table(TRANSACTION_TABLE)
                .context("Failed to create transaction table")?;
        }
        write_txn
            .commit()
            .context("Failed to commit initial transaction")?;

        tracing::debug!(path = %path.display(), "Opened account store");
        Ok(Self { db, path })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    fn fetch(&self, user_id: &str) -> Result<Option<Value>> {
        let read_txn = self
            .db
            .begin_read()
            .context("Failed to begin read transaction")?;
        let table = read_txn
            .open_table(ACCOUNT_TABLE)
            .context("Failed to open account table")?;
        match table.get(user_id).context("Failed to read account")? {
            Some(guard) => Ok(Some(parse_row(guard.value())?)),
            None => Ok(None),
        }
    }

    fn list(&self, user_id: &str) -> Result<Vec<Value>> {
        let read_txn = self
            .db
            .begin_read()
            .context("Failed to begin read transaction")?;
        let table = read_txn
            .open_table(TRANSACTION_TABLE)
            .context("Failed to open transaction table")?;

        let (start, end) = user_range(user_id);
        let mut rows = Vec::new();
        for entry in table
            .range::<&str>(start.as_str()..end.as_str())
            .context("Failed to range query transaction table")?
            .rev()
        {
            let (_, value) = entry.context("Failed to read transaction entry")?;
            rows.push(parse_row(value.value())?);
        }
        Ok(rows)
    }

    fn begin_write(&self) -> Result<WriteTransaction> {
        self.db
            .begin_write()
            .context("Failed to begin write transaction")
    }
}

impl AccountStore for LocalAccountStore {
    fn backend_name(&self) -> &'static str {
        "local"
    }

    fn fetch_account(&self, user_id: &str) -> Result<Option<Value>, StoreError> {
        Ok(self.fetch(user_id)?)
    }

    fn create_account(&self, row: Value) -> Result<(), StoreError> {
        let user_id = row
            .get("id")
            .and_then(Value::as_str)
            .map(str::to_string)
            .context("Account row has no id")?;
        let json = serde_json::to_string(&row).context("Failed to serialize account")?;

        let write_txn = self.begin_write()?;
        {
            let mut table = write_txn
                .open_table(ACCOUNT_TABLE)
                .context("Failed to open account table")?;
            if table
                .get(user_id.as_str())
                .context("Failed to read account")?
                .is_some()
            {
                return Err(StoreError::AlreadyExists { user_id });
            }
            table
                .insert(user_id.as_str(), json.as_str())
                .context("Failed to insert account")?;
        }
        write_txn
            .commit()
            .context("Failed to commit account creation")?;
        Ok(())
    }

    fn update_account(&self, update: &AccountUpdate) -> Result<(), StoreError> {
        let write_txn = self.begin_write()?;
        apply_update(&write_txn, update)?;
        write_txn
            .commit()
            .context("Failed to commit account update")?;
        Ok(())
    }

    fn insert_transaction(&self, row: Value) -> Result<(), StoreError> {
        let write_txn = self.begin_write()?;
        append_transaction(&write_txn, &row)?;
        write_txn
            .commit()
            .context("Failed to commit transaction insert")?;
        Ok(())
    }

    fn list_transactions(&self, user_id: &str) -> Result<Vec<Value>, StoreError> {
        Ok(self.list(user_id)?)
    }

    fn commit_entry(
        &self,
        update: &AccountUpdate,
        transaction: Value,
    ) -> Result<AuditStatus, StoreError> {
        let write_txn = self.begin_write()?;
        apply_update(&write_txn, update)?;
        append_transaction(&write_txn, &transaction)?;
        write_txn
            .commit()
            .context("Failed to commit ledger entry")?;
        Ok(AuditStatus::Recorded)
    }
}
