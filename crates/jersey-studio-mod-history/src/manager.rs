/// Per-document canvas history with optional disk mirroring.
///
/// Wraps a `HistoryLog` for one canvas (one player, one jersey view) and
/// keeps track of whether it changed since it was last written to the
/// `HistoryStore`.
use std::sync::Arc;

use anyhow::{Context, Result};

use crate::config::HistoryConfig;
use crate::log::{HistoryLog, HistoryStats};
use crate::persistence::HistoryStore;
use crate::snapshot::HistorySnapshot;

/// Undo/redo history for a single canvas document.
pub struct CanvasHistory {
    log: HistoryLog,
    /// Document identifier used as the persistence key.
    doc_id: String,
    /// Optional disk persistence (None = in-memory only).
    persistence: Option<Arc<HistoryStore>>,
    /// Whether in-memory state has changed since the last flush.
    dirty: bool,
}

impl std::fmt::Debug for CanvasHistory {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CanvasHistory")
            .field("doc_id", &self.doc_id)
            .field("len", &self.log.len())
            .field("cursor", &self.log.cursor())
            .field("recording", &self.log.is_recording())
            .field("dirty", &self.dirty)
            .finish()
    }
}

impl CanvasHistory {
    /// Creates an empty history.
    ///
    /// Pass `persistence: None` for in-memory-only mode.
    pub fn new(
        doc_id: String,
        config: &HistoryConfig,
        persistence: Option<Arc<HistoryStore>>,
    ) -> Self {
        Self {
            log: HistoryLog::new(config.capacity),
            doc_id,
            persistence,
            dirty: false,
        }
    }

    /// Creates an in-memory-only history with default capacity.
    pub fn in_memory() -> Self {
        Self {
            log: HistoryLog::new(crate::config::DEFAULT_CAPACITY),
            doc_id: String::from("scratch"),
            persistence: None,
            dirty: false,
        }
    }

    /// Loads existing history from disk, or creates a fresh one.
    ///
    /// # Errors
    ///
    /// Returns an error if the persistence layer fails to read.
    pub fn load_or_new(
        doc_id: String,
        config: &HistoryConfig,
        persistence: Option<Arc<HistoryStore>>,
    ) -> Result<Self> {
        let log = match &persistence {
            Some(store) => store
                .read_log(&doc_id, config.capacity)
                .with_context(|| format!("Failed to load history for {doc_id}"))?,
            None => None,
        };

        let log = match log {
            Some(log) => {
                tracing::debug!(doc_id = %doc_id, entries = log.len(), "Restored canvas history");
                log
            }
            None => HistoryLog::new(config.capacity),
        };

        Ok(Self {
            log,
            doc_id,
            persistence,
            dirty: false,
        })
    }

    pub fn doc_id(&self) -> &str {
        &self.doc_id
    }

    /// Records the canvas state after an edit.
    ///
    /// Ignored while a replay is in progress.
    pub fn push(&mut self, payload: impl Into<String>) {
        if !self.log.is_recording() {
            return;
        }
        self.log.push(payload);
        self.dirty = true;
    }

    /// Steps back one snapshot. Returns `None` if there's nothing to undo.
    pub fn undo(&mut self) -> Option<HistorySnapshot> {
        let snapshot = self.log.undo()?;
        self.dirty = true;
        Some(snapshot)
    }

    /// Steps forward one snapshot. Returns `None` if there's nothing to redo.
    pub fn redo(&mut self) -> Option<HistorySnapshot> {
        let snapshot = self.log.redo()?;
        self.dirty = true;
        Some(snapshot)
    }

    /// See [`HistoryLog::undo_with`].
    pub fn undo_with<R>(
        &mut self,
        apply: impl FnOnce(&HistorySnapshot, &mut HistoryLog) -> R,
    ) -> Option<R> {
        let out = self.log.undo_with(apply)?;
        self.dirty = true;
        Some(out)
    }

    /// See [`HistoryLog::redo_with`].
    pub fn redo_with<R>(
        &mut self,
        apply: impl FnOnce(&HistorySnapshot, &mut HistoryLog) -> R,
    ) -> Option<R> {
        let out = self.log.redo_with(apply)?;
        self.dirty = true;
        Some(out)
    }

    pub fn can_undo(&self) -> bool {
        self.log.can_undo()
    }

    pub fn can_redo(&self) -> bool {
        self.log.can_redo()
    }

    /// Temporarily disables recording (used while a replay re-renders).
    pub fn pause_recording(&mut self) {
        self.log.pause_recording();
    }

    /// Re-enables recording after a pause.
    pub fn resume_recording(&mut self) {
        self.log.resume_recording();
    }

    pub fn stats(&self) -> HistoryStats {
        self.log.stats()
    }

    /// The snapshot currently shown on the canvas.
    pub fn current(&self) -> Option<&HistorySnapshot> {
        self.log.current()
    }

    pub fn log(&self) -> &HistoryLog {
        &self.log
    }

    pub fn is_dirty(&self) -> bool {
        self.dirty
    }

    /// Clears all history from memory and disk.
    ///
    /// # Errors
    ///
    /// Returns an error if disk cleanup fails.
    pub fn clear(&mut self) -> Result<()> {
        self.log.clear();
        self.dirty = false;

        if let Some(store) = &self.persistence {
            store
                .delete_document(&self.doc_id)
                .context("Failed to clear history from disk")?;
        }
        Ok(())
    }

    /// Writes in-memory history to disk.
    ///
    /// No-op if the history is in-memory-only or nothing has changed.
    ///
    /// # Errors
    ///
    /// Returns an error if the disk write fails.
    pub fn flush(&mut self) -> Result<()> {
        if !self.dirty {
            return Ok(());
        }

        if let Some(store) = &self.persistence {
            store
                .write_log(&self.doc_id, &self.log)
                .context("Failed to flush history to disk")?;
            self.dirty = false;
        }
        Ok(())
    }

    /// Deletes all persisted history for this document.
    ///
    /// Called when a player is removed from the roster.
    ///
    /// # Errors
    ///
    /// Returns an error if disk cleanup fails.
    pub fn delete_history(&mut self) -> Result<()> {
        self.clear()
    }
}

impl Drop for CanvasHistory {
    fn drop(&mut self) {
        if let Err(e) = self.flush() {
            tracing::warn!("Failed to flush history for {}: {e}", self.doc_id);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use jersey_studio_config::JerseyView;
    use tempfile::TempDir;

    use crate::config::canvas_doc_id;

    fn small_config() -> HistoryConfig {
        HistoryConfig {
            capacity: 5,
            data_dir: std::path::PathBuf::from("."),
        }
    }

    fn persistent_history(dir: &std::path::Path) -> (CanvasHistory, Arc<HistoryStore>) {
        let store = HistoryStore::open(dir).expect("open db");
        let history = CanvasHistory::new(
            "test-doc".to_string(),
            &small_config(),
            Some(Arc::clone(&store)),
        );
        (history, store)
    }

    #[test]
    fn test_undo_redo_basic() {
        let mut history = CanvasHistory::in_memory();
        history.push("a");
        history.push("b");

        assert!(history.can_undo());
        assert_eq!(history.undo().expect("undo").payload, "a");
        assert!(history.can_redo());
        assert_eq!(history.redo().expect("redo").payload, "b");
    }

    #[test]
    fn test_empty_history() {
        let mut history = CanvasHistory::in_memory();
        assert!(!history.can_undo());
        assert!(!history.can_redo());
        assert!(history.undo().is_none());
        assert!(history.redo().is_none());
        assert!(!history.is_dirty());
    }

    #[test]
    fn test_noop_undo_does_not_dirty() {
        let mut history = CanvasHistory::in_memory();
        history.push("a");
        history.dirty = false;
        assert!(history.undo().is_none());
        assert!(!history.is_dirty());
    }

    #[test]
    fn test_pause_recording() {
        let mut history = CanvasHistory::in_memory();
        history.pause_recording();
        history.push("a");
        assert_eq!(history.stats().total, 0);
        assert!(!history.is_dirty());

        history.resume_recording();
        history.push("b");
        assert_eq!(history.stats().total, 1);
    }

    #[test]
    fn test_undo_with_ignores_rerender_push() {
        let mut history = CanvasHistory::in_memory();
        history.push("a");
        history.push("b");

        let payload = history.undo_with(|snapshot, log| {
            log.push("object:modified");
            snapshot.payload.clone()
        });
        assert_eq!(payload.as_deref(), Some("a"));
        assert_eq!(history.stats().total, 2);

        let payload = history.redo_with(|snapshot, _| snapshot.payload.clone());
        assert_eq!(payload.as_deref(), Some("b"));
    }

    #[test]
    fn test_capacity_from_config() {
        let mut history = CanvasHistory::new("doc".to_string(), &small_config(), None);
        for i in 0..20 {
            history.push(format!("s{i}"));
        }
        assert_eq!(history.stats().total, 5);
        assert_eq!(history.current().map(|s| s.payload.as_str()), Some("s19"));
    }

    #[test]
    fn test_flush_writes_to_disk() {
        let dir = TempDir::new().expect("create temp dir");
        let (mut history, store) = persistent_history(dir.path());

        history.push("hello");
        history.flush().expect("flush");
        assert!(!history.is_dirty());

        assert_eq!(store.count_snapshots("test-doc").expect("count"), 1);
    }

    #[test]
    fn test_flush_noop_when_not_dirty() {
        let dir = TempDir::new().expect("create temp dir");
        let (mut history, store) = persistent_history(dir.path());

        history.flush().expect("flush");
        assert!(store.list_documents().expect("list").is_empty());
    }

    #[test]
    fn test_drop_flushes_pending_changes() {
        let dir = TempDir::new().expect("create temp dir");
        let store = HistoryStore::open(dir.path()).expect("open");
        {
            let mut history = CanvasHistory::new(
                "dropped".to_string(),
                &small_config(),
                Some(Arc::clone(&store)),
            );
            history.push("unsaved edit");
        }
        assert_eq!(store.count_snapshots("dropped").expect("count"), 1);
    }

    #[test]
    fn test_load_or_new_restores_history() {
        let dir = TempDir::new().expect("create temp dir");
        let doc_id = canvas_doc_id(2, JerseyView::Back);

        {
            let store = HistoryStore::open(dir.path()).expect("open");
            let mut history =
                CanvasHistory::new(doc_id.clone(), &small_config(), Some(Arc::clone(&store)));
            history.push("first");
            history.push("second");
            history.push("third");
            history.undo();
            history.flush().expect("flush");
        }

        {
            let store = HistoryStore::open(dir.path()).expect("reopen");
            let mut history =
                CanvasHistory::load_or_new(doc_id, &small_config(), Some(store)).expect("load");

            assert_eq!(history.current().map(|s| s.payload.as_str()), Some("second"));
            assert!(history.can_redo());
            assert_eq!(history.undo().expect("undo").payload, "first");
            assert!(!history.can_undo());
        }
    }

    #[test]
    fn test_load_or_new_fresh_document() {
        let dir = TempDir::new().expect("create temp dir");
        let store = HistoryStore::open(dir.path()).expect("open");

        let history =
            CanvasHistory::load_or_new("new-doc".to_string(), &small_config(), Some(store))
                .expect("load");

        assert!(!history.can_undo());
        assert!(!history.can_redo());
        assert_eq!(history.stats().cursor, None);
    }

    #[test]
    fn test_delete_history_clears_disk() {
        let dir = TempDir::new().expect("create temp dir");
        let (mut history, store) = persistent_history(dir.path());

        history.push("data");
        history.flush().expect("flush");
        assert_eq!(store.count_snapshots("test-doc").expect("count"), 1);

        history.delete_history().expect("delete");

        assert_eq!(store.count_snapshots("test-doc").expect("count"), 0);
        assert!(!history.can_undo());
        assert_eq!(history.stats().total, 0);
    }

    #[test]
    fn test_doc_id() {
        let history = CanvasHistory::new("my-doc".to_string(), &small_config(), None);
        assert_eq!(history.doc_id(), "my-doc");
    }
}
