/// Configuration and document-id helpers for the history system.
use std::path::PathBuf;
use std::sync::atomic::{AtomicU64, Ordering};

use jersey_studio_config::{JerseyView, StudioConfig};

/// Maximum number of snapshots retained per document.
pub const DEFAULT_CAPACITY: usize = 50;

/// Prefix shared by every canvas document id.
pub const CANVAS_DOC_PREFIX: &str = "canvas-";

/// Configuration for the history system.
#[derive(Debug, Clone)]
pub struct HistoryConfig {
    /// Max snapshots kept per document.
    pub capacity: usize,
    /// Root directory for the persistence database.
    pub data_dir: PathBuf,
}

impl Default for HistoryConfig {
    fn default() -> Self {
        Self::from_studio(&StudioConfig::default())
    }
}

impl HistoryConfig {
    /// Derives history settings from the application config.
    pub fn from_studio(config: &StudioConfig) -> Self {
        Self {
            capacity: config.history_capacity.max(1),
            data_dir: config.resolve_data_dir(),
        }
    }
}

/// Document id for one player's canvas on one jersey view.
pub fn canvas_doc_id(player_index: usize, view: JerseyView) -> String {
    format!("{CANVAS_DOC_PREFIX}{view}-{player_index}")
}

/// Counter for generating unique draft document ids within a session.
static DRAFT_COUNTER: AtomicU64 = AtomicU64::new(0);

/// Generates a unique document id for a canvas not yet tied to a player.
pub fn generate_draft_id() -> String {
    let count = DRAFT_COUNTER.fetch_add(1, Ordering::Relaxed);
    format!("draft-{count}")
}
