/// Disk persistence layer backed by redb.
///
/// Uses a single redb database file with two tables:
/// - `snapshots`: stores serialized `HistorySnapshot` entries keyed by `"{doc_id}#{seq:020}"`
/// - `meta`: stores per-document metadata keyed by `doc_id`
use std::path::Path;
use std::sync::Arc;

use anyhow::{Context, Result};
use chrono::Utc;
use redb::{Database, ReadableDatabase, ReadableTable, TableDefinition, WriteTransaction};

use crate::log::HistoryLog;
use crate::snapshot::HistorySnapshot;

/// Snapshot table: composite string key → bincode-serialized HistorySnapshot.
const SNAPSHOT_TABLE: TableDefinition<&str, &[u8]> = TableDefinition::new("snapshots");

/// Metadata table: doc_id → bincode-serialized DocumentMeta.
const META_TABLE: TableDefinition<&str, &[u8]> = TableDefinition::new("meta");

/// Per-document metadata persisted alongside the snapshots.
#[derive(Debug, serde::Serialize, serde::Deserialize)]
struct DocumentMeta {
    cursor: Option<u64>,
    saved_at: i64,
}

/// Formats a snapshot table key from doc_id and position in the log.
///
/// The position is zero-padded to 20 digits to ensure correct
/// lexicographic ordering in the B-tree.
fn snapshot_key(doc_id: &str, seq: u64) -> String {
    format!("{doc_id}#{seq:020}")
}

/// Returns the exclusive range bounds for all snapshots of a document.
///
/// Uses `#` as separator and `$` (one ASCII codepoint above `#`) as the
/// exclusive upper bound, ensuring the range captures exactly the entries
/// for the given doc_id.
fn doc_range(doc_id: &str) -> (String, String) {
    let start = format!("{doc_id}#");
    let end = format!("{doc_id}$");
    (start, end)
}

/// Removes every snapshot of `doc_id` inside an open write transaction.
fn remove_snapshots(write_txn: &WriteTransaction, doc_id: &str) -> Result<usize> {
    let mut table = write_txn
        .open_table(SNAPSHOT_TABLE)
        .context("Failed to open snapshot table")?;

    let (start, end) = doc_range(doc_id);
    let keys_to_remove: Vec<String> = table
        .range::<&str>(start.as_str()..end.as_str())
        .context("Failed to range query snapshot table")?
        .filter_map(|entry| entry.ok().map(|(k, _)| k.value().to_string()))
        .collect();

    for key in &keys_to_remove {
        table
            .remove(key.as_str())
            .context("Failed to remove snapshot")?;
    }
    Ok(keys_to_remove.len())
}

/// Persistence layer for canvas history backed by redb.
///
/// Thread-safe: redb supports concurrent readers and serialized writers.
/// Shared across documents via `Arc<HistoryStore>`.
pub struct HistoryStore {
    db: Database,
}

impl std::fmt::Debug for HistoryStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("HistoryStore").finish()
    }
}

impl HistoryStore {
    /// Opens or creates the history database in the given directory.
    ///
    /// Creates the directory and database file if they don't exist.
    /// Initializes tables on first use.
    ///
    /// # Errors
    ///
    /// Returns an error if the directory cannot be created or the database
    /// cannot be opened.
    pub fn open(data_dir: &Path) -> Result<Arc<Self>> {
        std::fs::create_dir_all(data_dir)
            .with_context(|| format!("Failed to create data directory: {}", data_dir.display()))?;

        let db_path = data_dir.join("history.redb");
        let db = Database::create(&db_path)
            .with_context(|| format!("Failed to open history database: {}", db_path.display()))?;

        // Ensure tables exist
        let write_txn = db
            .begin_write()
            .context("Failed to begin initial write transaction")?;
        {
            let _ = write_txn
                .open_table(SNAPSHOT_TABLE)
                .context("Failed to create snapshot table")?;
            let _ = write_txn
                .open_table(META_TABLE)
                .context("Failed to create meta table")?;
        }
        write_txn
            .commit()
            .context("Failed to commit initial transaction")?;

        Ok(Arc::new(Self { db }))
    }

    /// Replaces the stored history of a document with `log`.
    ///
    /// Snapshots and cursor are written in one transaction, so a reader
    /// never sees a cursor pointing past the stored entries.
    ///
    /// # Errors
    ///
    /// Returns an error if serialization or the write transaction fails.
    pub fn write_log(&self, doc_id: &str, log: &HistoryLog) -> Result<()> {
        let meta = DocumentMeta {
            cursor: log.cursor().map(|c| c as u64),
            saved_at: Utc::now().timestamp_millis(),
        };
        let meta_bytes =
            bincode::serialize(&meta).context("Failed to serialize document metadata")?;

        let write_txn = self
            .db
            .begin_write()
            .context("Failed to begin write transaction")?;
        remove_snapshots(&write_txn, doc_id)?;
        {
            let mut table = write_txn
                .open_table(SNAPSHOT_TABLE)
                .context("Failed to open snapshot table")?;
            for (seq, snapshot) in log.entries().enumerate() {
                let key = snapshot_key(doc_id, seq as u64);
                let bytes = bincode::serialize(snapshot).context("Failed to serialize snapshot")?;
                table
                    .insert(key.as_str(), bytes.as_slice())
                    .context("Failed to insert snapshot")?;
            }
        }
        {
            let mut meta_table = write_txn
                .open_table(META_TABLE)
                .context("Failed to open meta table")?;
            meta_table
                .insert(doc_id, meta_bytes.as_slice())
                .context("Failed to insert metadata")?;
        }
        write_txn
            .commit()
            .context("Failed to commit write transaction")?;
        Ok(())
    }

    /// Reads a document's history back into a log of the given capacity.
    ///
    /// Returns `None` if no history exists for this document.
    ///
    /// # Errors
    ///
    /// Returns an error if the read transaction or deserialization fails.
    pub fn read_log(&self, doc_id: &str, capacity: usize) -> Result<Option<HistoryLog>> {
        let read_txn = self
            .db
            .begin_read()
            .context("Failed to begin read transaction")?;

        let meta_table = read_txn
            .open_table(META_TABLE)
            .context("Failed to open meta table")?;
        let meta: DocumentMeta = match meta_table.get(doc_id).context("Failed to read metadata")? {
            Some(guard) => bincode::deserialize(guard.value())
                .context("Failed to deserialize metadata")?,
            None => return Ok(None),
        };

        let table = read_txn
            .open_table(SNAPSHOT_TABLE)
            .context("Failed to open snapshot table")?;
        let (start, end) = doc_range(doc_id);
        let mut entries = Vec::new();
        for entry in table
            .range::<&str>(start.as_str()..end.as_str())
            .context("Failed to range query snapshot table")?
        {
            let (_, value_guard) = entry.context("Failed to read snapshot entry")?;
            let snapshot: HistorySnapshot = bincode::deserialize(value_guard.value())
                .context("Failed to deserialize snapshot")?;
            entries.push(snapshot);
        }

        let cursor = meta.cursor.map(|c| c as usize);
        Ok(Some(HistoryLog::from_parts(capacity, entries, cursor)))
    }

    /// Counts the snapshots stored for a document.
    ///
    /// # Errors
    ///
    /// Returns an error if the read transaction fails.
    pub fn count_snapshots(&self, doc_id: &str) -> Result<usize> {
        let read_txn = self
            .db
            .begin_read()
            .context("Failed to begin read transaction")?;
        let table = read_txn
            .open_table(SNAPSHOT_TABLE)
            .context("Failed to open snapshot table")?;

        let (start, end) = doc_range(doc_id);
        let count = table
            .range::<&str>(start.as_str()..end.as_str())
            .context("Failed to range query for count")?
            .count();

        Ok(count)
    }

    /// Removes all snapshots and metadata for a document.
    ///
    /// # Errors
    ///
    /// Returns an error if the write transaction fails.
    pub fn delete_document(&self, doc_id: &str) -> Result<()> {
        let write_txn = self
            .db
            .begin_write()
            .context("Failed to begin write transaction")?;
        remove_snapshots(&write_txn, doc_id)?;
        {
            let mut meta_table = write_txn
                .open_table(META_TABLE)
                .context("Failed to open meta table")?;
            let _ = meta_table.remove(doc_id);
        }
        write_txn.commit().context("Failed to commit deletion")?;
        Ok(())
    }

    /// Removes every document whose id starts with `prefix`.
    ///
    /// Returns the number of documents removed.
    ///
    /// # Errors
    ///
    /// Returns an error if listing or deletion fails.
    pub fn delete_documents_with_prefix(&self, prefix: &str) -> Result<usize> {
        let doomed: Vec<String> = self
            .list_documents()?
            .into_iter()
            .filter(|id| id.starts_with(prefix))
            .collect();

        for doc_id in &doomed {
            self.delete_document(doc_id)?;
        }
        Ok(doomed.len())
    }

    /// Removes the history of every player canvas. Drafts are kept.
    pub fn clear_canvas_documents(&self) -> Result<usize> {
        let removed = self.delete_documents_with_prefix(crate::config::CANVAS_DOC_PREFIX)?;
        tracing::debug!(removed, "Cleared canvas histories");
        Ok(removed)
    }

    /// Lists all document IDs that have stored metadata.
    ///
    /// # Errors
    ///
    /// Returns an error if the read transaction fails.
    pub fn list_documents(&self) -> Result<Vec<String>> {
        let read_txn = self
            .db
            .begin_read()
            .context("Failed to begin read transaction")?;
        let table = read_txn
            .open_table(META_TABLE)
            .context("Failed to open meta table")?;

        let mut doc_ids = Vec::new();
        for entry in table.iter().context("Failed to iterate meta table")? {
            let (key_guard, _) = entry.context("Failed to read meta entry")?;
            doc_ids.push(key_guard.value().to_string());
        }
        Ok(doc_ids)
    }
}
