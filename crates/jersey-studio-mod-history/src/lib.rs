/// Undo/redo history for the jersey canvas editor.
///
/// Provides a bounded linear `HistoryLog` of serialized canvas snapshots,
/// a per-document `CanvasHistory` wrapper, and an embedded key-value store
/// (redb) that mirrors a document's history so it survives restarts.
pub mod config;
pub mod log;
pub mod manager;
pub mod persistence;
pub mod snapshot;

pub use config::HistoryConfig;
pub use log::{HistoryLog, HistoryStats};
pub use manager::CanvasHistory;
pub use persistence::HistoryStore;
pub use snapshot::HistorySnapshot;
