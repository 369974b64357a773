/// A captured canvas state.
use chrono::Utc;
use serde::{Deserialize, Serialize};

/// One full serialized editor state.
///
/// The payload is opaque to the history system; it is whatever the canvas
/// library produced (typically JSON).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct HistorySnapshot {
    pub payload: String,
    /// Capture time in epoch milliseconds.
    pub taken_at: i64,
}

impl HistorySnapshot {
    /// Captures `payload` at the current time.
    pub fn now(payload: impl Into<String>) -> Self {
        Self {
            payload: payload.into(),
            taken_at: Utc::now().timestamp_millis(),
        }
    }
}
