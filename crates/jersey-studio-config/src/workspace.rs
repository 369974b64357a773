/// Workspace persistence: saves/restores the design wizard across restarts.
///
/// Wizard metadata (step, selected player, session id) is stored in a redb
/// table as bincode. Uploaded images, the player roster and the shared design
/// template are stored as raw JSON strings in a separate table, exactly as the
/// editor hands them over.
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use chrono::{DateTime, TimeZone, Utc};
use redb::{Database, ReadableDatabase, ReadableTable, TableDefinition};
use serde::{Deserialize, Serialize};

/// Workspace metadata table: `"state"` → bincode(`WorkspaceState`).
const WORKSPACE_META: TableDefinition<&str, &[u8]> = TableDefinition::new("workspace_meta");

/// Workspace documents table: document key → raw JSON.
const WORKSPACE_DOCS: TableDefinition<&str, &str> = TableDefinition::new("workspace_docs");

const STATE_KEY: &str = "state";

/// Generates a unique editor session id.
pub fn generate_session_id() -> String {
    let millis = Utc::now().timestamp_millis();
    let suffix = uuid::Uuid::new_v4().simple().to_string();
    format!("session_{millis}_{}", &suffix[..9])
}

/// JSON documents kept alongside the wizard state.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WorkspaceDoc {
    /// Uploaded jersey template images (one per view).
    JerseyImages,
    /// Imported player roster.
    PlayerData,
    /// Text/logo positions shared by every player.
    DesignTemplate,
}

impl WorkspaceDoc {
    pub const ALL: [WorkspaceDoc; 3] = [
        WorkspaceDoc::JerseyImages,
        WorkspaceDoc::PlayerData,
        WorkspaceDoc::DesignTemplate,
    ];

    fn key(self) -> &'static str {
        match self {
            WorkspaceDoc::JerseyImages => "jersey_images",
            WorkspaceDoc::PlayerData => "player_data",
            WorkspaceDoc::DesignTemplate => "design_template",
        }
    }
}

/// Position in the design wizard.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct WorkspaceState {
    /// 1-based wizard step.
    pub current_step: u8,
    pub selected_player_index: usize,
    pub session_id: String,
    /// Last save time in epoch milliseconds.
    pub last_save_ms: Option<i64>,
}

impl WorkspaceState {
    /// Fresh state at step 1 with a new session id.
    pub fn new() -> Self {
        Self {
            current_step: 1,
            selected_player_index: 0,
            session_id: generate_session_id(),
            last_save_ms: None,
        }
    }

    pub fn last_save(&self) -> Option<DateTime<Utc>> {
        self.last_save_ms
            .and_then(|ms| Utc.timestamp_millis_opt(ms).single())
    }
}

impl Default for WorkspaceState {
    fn default() -> Self {
        Self::new()
    }
}

/// Formats a last-save time relative to `now` for the status line.
pub fn format_last_save(last_save: Option<DateTime<Utc>>, now: DateTime<Utc>) -> String {
    let Some(last) = last_save else {
        return "Never".to_string();
    };

    let mins = (now - last).num_minutes();
    let hours = mins / 60;
    let days = hours / 24;
    let plural = |n: i64| if n > 1 { "s" } else { "" };

    if mins < 1 {
        "Just now".to_string()
    } else if mins < 60 {
        format!("{mins} minute{} ago", plural(mins))
    } else if hours < 24 {
        format!("{hours} hour{} ago", plural(hours))
    } else {
        format!("{days} day{} ago", plural(days))
    }
}

/// Persistence layer for workspace state, backed by redb.
pub struct WorkspaceStore {
    db: Database,
}

impl std::fmt::Debug for WorkspaceStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("WorkspaceStore").finish()
    }
}

impl WorkspaceStore {
    /// Returns the workspace database path inside `data_dir`.
    pub fn workspace_path(data_dir: &Path) -> PathBuf {
        data_dir.join("workspace.redb")
    }

    /// Opens or creates the workspace database at `path`.
    pub fn open(path: &Path) -> Result<Self> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent).with_context(|| {
                format!("Failed to create data directory: {}", parent.display())
            })?;
        }
        let db = Database::create(path)
            .with_context(|| format!("Failed to open workspace database: {}", path.display()))?;

        // Ensure tables exist
        let write_txn = db
            .begin_write()
            .context("Failed to begin initial workspace write transaction")?;
        {
            let _ = write_txn
                .open_table(WORKSPACE_META)
                .context("Failed to create workspace_meta table")?;
            let _ = write_txn
                .open_table(WORKSPACE_DOCS)
                .context("Failed to create workspace_docs table")?;
        }
        write_txn
            .commit()
            .context("Failed to commit initial workspace transaction")?;

        Ok(Self { db })
    }

    /// Saves the wizard state, stamping it with the current time.
    pub fn save_state(&self, state: &WorkspaceState) -> Result<WorkspaceState> {
        let mut stamped = state.clone();
        stamped.last_save_ms = Some(Utc::now().timestamp_millis());
        let bytes = bincode::serialize(&stamped).context("Failed to serialize workspace state")?;

        let write_txn = self
            .db
            .begin_write()
            .context("Failed to begin write transaction")?;
        {
            let mut table = write_txn
                .open_table(WORKSPACE_META)
                .context("Failed to open workspace_meta table")?;
            table
                .insert(STATE_KEY, bytes.as_slice())
                .context("Failed to insert workspace state")?;
        }
        write_txn
            .commit()
            .context("Failed to commit workspace state")?;
        Ok(stamped)
    }

    /// Loads the wizard state, or `None` if nothing was saved.
    pub fn load_state(&self) -> Result<Option<WorkspaceState>> {
        let read_txn = self
            .db
            .begin_read()
            .context("Failed to begin read transaction")?;
        let table = read_txn
            .open_table(WORKSPACE_META)
            .context("Failed to open workspace_meta table")?;

        match table.get(STATE_KEY).context("Failed to read workspace state")? {
            Some(guard) => {
                let state: WorkspaceState = bincode::deserialize(guard.value())
                    .context("Failed to deserialize workspace state")?;
                Ok(Some(state))
            }
            None => Ok(None),
        }
    }

    /// Returns the stored session id, creating and saving a new one if absent.
    pub fn session_id(&self) -> Result<String> {
        if let Some(state) = self.load_state()? {
            return Ok(state.session_id);
        }
        let state = self.save_state(&WorkspaceState::new())?;
        Ok(state.session_id)
    }

    /// Saves one JSON document.
    pub fn save_doc(&self, doc: WorkspaceDoc, json: &str) -> Result<()> {
        let write_txn = self
            .db
            .begin_write()
            .context("Failed to begin write transaction")?;
        {
            let mut table = write_txn
                .open_table(WORKSPACE_DOCS)
                .context("Failed to open workspace_docs table")?;
            table
                .insert(doc.key(), json)
                .context("Failed to insert workspace document")?;
        }
        write_txn
            .commit()
            .context("Failed to commit workspace document")?;
        Ok(())
    }

    /// Loads one JSON document, or `None` if not found.
    pub fn load_doc(&self, doc: WorkspaceDoc) -> Result<Option<String>> {
        let read_txn = self
            .db
            .begin_read()
            .context("Failed to begin read transaction")?;
        let table = read_txn
            .open_table(WORKSPACE_DOCS)
            .context("Failed to open workspace_docs table")?;

        match table
            .get(doc.key())
            .context("Failed to read workspace document")?
        {
            Some(guard) => Ok(Some(guard.value().to_string())),
            None => Ok(None),
        }
    }

    /// Whether uploaded images or a roster survive from a previous run.
    pub fn has_saved_session(&self) -> Result<bool> {
        Ok(self.load_doc(WorkspaceDoc::JerseyImages)?.is_some()
            || self.load_doc(WorkspaceDoc::PlayerData)?.is_some())
    }

    /// Wipes the wizard state and every stored document.
    pub fn clear(&self) -> Result<()> {
        let write_txn = self
            .db
            .begin_write()
            .context("Failed to begin write transaction")?;
        {
            let mut meta = write_txn
                .open_table(WORKSPACE_META)
                .context("Failed to open workspace_meta table")?;
            let _ = meta.remove(STATE_KEY);
        }
        {
            let mut docs = write_txn
                .open_table(WORKSPACE_DOCS)
                .context("Failed to open workspace_docs table")?;
            let keys: Vec<String> = docs
                .iter()
                .context("Failed to iterate workspace_docs")?
                .filter_map(|entry| entry.ok().map(|(k, _)| k.value().to_string()))
                .collect();

            for key in &keys {
                let _ = docs.remove(key.as_str());
            }
        }
        write_txn
            .commit()
            .context("Failed to commit workspace clear")?;
        Ok(())
    }
}
