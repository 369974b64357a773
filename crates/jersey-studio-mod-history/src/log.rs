/// Bounded linear undo/redo log of canvas snapshots.
///
/// Every committed edit pushes one snapshot. Undo and redo move a cursor over
/// the log and hand back the snapshot to re-render. Pushing after an undo
/// discards the redo branch, and the oldest snapshot is evicted once the log
/// is full.
use std::collections::VecDeque;

use serde::Serialize;

use crate::snapshot::HistorySnapshot;

/// Read-only summary of a log, for diagnostics and UI enablement.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct HistoryStats {
    pub total: usize,
    /// Index of the current snapshot, `None` when the log is empty.
    pub cursor: Option<usize>,
    pub can_undo: bool,
    pub can_redo: bool,
}

/// Linear history for a single document.
#[derive(Debug, Clone)]
pub struct HistoryLog {
    /// Snapshots in chronological order.
    entries: VecDeque<HistorySnapshot>,
    /// Index of the current snapshot (`None` = empty).
    cursor: Option<usize>,
    /// Max retained snapshots, at least 1.
    capacity: usize,
    /// Cleared while a replay is in progress so the replay's own re-render
    /// is not recorded as an edit.
    recording: bool,
}

impl HistoryLog {
    /// Creates an empty log holding at most `capacity` snapshots.
    pub fn new(capacity: usize) -> Self {
        Self {
            entries: VecDeque::new(),
            cursor: None,
            capacity: capacity.max(1),
            recording: true,
        }
    }

    /// Rebuilds a log from stored parts.
    ///
    /// Keeps the newest `capacity` snapshots and clamps the cursor into range,
    /// shifting it the same way eviction would.
    pub fn from_parts(
        capacity: usize,
        entries: Vec<HistorySnapshot>,
        cursor: Option<usize>,
    ) -> Self {
        let mut log = Self::new(capacity);
        let skip = entries.len().saturating_sub(log.capacity);
        log.entries = entries.into_iter().skip(skip).collect();

        log.cursor = match (cursor, log.entries.len()) {
            (_, 0) => None,
            (None, _) => Some(log.entries.len() - 1),
            (Some(c), len) => Some(c.saturating_sub(skip).min(len - 1)),
        };
        log
    }

    /// Records a new snapshot of `payload` taken now.
    pub fn push(&mut self, payload: impl Into<String>) {
        self.push_snapshot(HistorySnapshot::now(payload));
    }

    /// Records `snapshot` as the new current state.
    ///
    /// Ignored while recording is paused. Drops every snapshot after the
    /// cursor, appends, and evicts the oldest entry if over capacity.
    pub fn push_snapshot(&mut self, snapshot: HistorySnapshot) {
        if !self.recording {
            tracing::trace!("Ignoring snapshot pushed during replay");
            return;
        }

        let keep = self.cursor.map_or(0, |c| c + 1);
        self.entries.truncate(keep);
        self.entries.push_back(snapshot);

        let mut cursor = keep;
        if self.entries.len() > self.capacity {
            self.entries.pop_front();
            cursor -= 1;
        }
        self.cursor = Some(cursor);
    }

    /// Steps back one snapshot and returns it.
    ///
    /// Returns `None` if there's nothing to undo.
    pub fn undo(&mut self) -> Option<HistorySnapshot> {
        self.undo_with(|snapshot, _| snapshot.clone())
    }

    /// Steps forward one snapshot and returns it.
    ///
    /// Returns `None` if already at the newest snapshot.
    pub fn redo(&mut self) -> Option<HistorySnapshot> {
        self.redo_with(|snapshot, _| snapshot.clone())
    }

    /// Steps back and runs `apply` on the restored snapshot with recording
    /// paused, so pushes made by `apply` (e.g. a canvas re-render firing its
    /// change hooks) are ignored.
    pub fn undo_with<R>(
        &mut self,
        apply: impl FnOnce(&HistorySnapshot, &mut Self) -> R,
    ) -> Option<R> {
        if !self.can_undo() {
            return None;
        }
        let target = self.cursor? - 1;
        Some(self.replay(target, apply))
    }

    /// Redo counterpart of [`HistoryLog::undo_with`].
    pub fn redo_with<R>(
        &mut self,
        apply: impl FnOnce(&HistorySnapshot, &mut Self) -> R,
    ) -> Option<R> {
        if !self.can_redo() {
            return None;
        }
        let target = self.cursor.map_or(0, |c| c + 1);
        Some(self.replay(target, apply))
    }

    fn replay<R>(
        &mut self,
        target: usize,
        apply: impl FnOnce(&HistorySnapshot, &mut Self) -> R,
    ) -> R {
        self.cursor = Some(target);
        let snapshot = self.entries[target].clone();

        let was_recording = std::mem::replace(&mut self.recording, false);
        let out = apply(&snapshot, self);
        self.recording = was_recording;
        out
    }

    /// Whether an earlier snapshot exists.
    pub fn can_undo(&self) -> bool {
        self.cursor.is_some_and(|c| c > 0)
    }

    /// Whether a later snapshot exists.
    pub fn can_redo(&self) -> bool {
        match self.cursor {
            Some(c) => c + 1 < self.entries.len(),
            None => false,
        }
    }

    /// Temporarily disables recording, for re-renders that finish after
    /// `undo`/`redo` has returned.
    pub fn pause_recording(&mut self) {
        self.recording = false;
    }

    /// Re-enables recording after a pause.
    pub fn resume_recording(&mut self) {
        self.recording = true;
    }

    pub fn is_recording(&self) -> bool {
        self.recording
    }

    /// Drops every snapshot.
    pub fn clear(&mut self) {
        self.entries.clear();
        self.cursor = None;
    }

    pub fn stats(&self) -> HistoryStats {
        HistoryStats {
            total: self.entries.len(),
            cursor: self.cursor,
            can_undo: self.can_undo(),
            can_redo: self.can_redo(),
        }
    }

    /// The snapshot the editor is currently showing.
    pub fn current(&self) -> Option<&HistorySnapshot> {
        self.cursor.and_then(|c| self.entries.get(c))
    }

    pub fn cursor(&self) -> Option<usize> {
        self.cursor
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Snapshots in chronological order.
    pub fn entries(&self) -> impl Iterator<Item = &HistorySnapshot> {
        self.entries.iter()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn payloads(log: &HistoryLog) -> Vec<String> {
        log.entries().map(|s| s.payload.clone()).collect()
    }

    fn undo_payload(log: &mut HistoryLog) -> Option<String> {
        log.undo().map(|s| s.payload)
    }

    fn redo_payload(log: &mut HistoryLog) -> Option<String> {
        log.redo().map(|s| s.payload)
    }

    #[test]
    fn test_empty_log() {
        let mut log = HistoryLog::new(10);
        assert!(log.is_empty());
        assert_eq!(log.cursor(), None);
        assert!(!log.can_undo());
        assert!(!log.can_redo());
        assert!(log.undo().is_none());
        assert!(log.redo().is_none());
        assert!(log.current().is_none());
    }

    #[test]
    fn test_push_advances_cursor_by_one() {
        let mut log = HistoryLog::new(10);
        for i in 0..5 {
            log.push(format!("s{i}"));
            assert_eq!(log.cursor(), Some(i));
        }
        assert_eq!(log.current().map(|s| s.payload.as_str()), Some("s4"));
    }

    #[test]
    fn test_undo_walks_back_in_reverse_order() {
        let mut log = HistoryLog::new(10);
        log.push("a");
        log.push("b");
        log.push("c");

        assert_eq!(undo_payload(&mut log).as_deref(), Some("b"));
        assert_eq!(undo_payload(&mut log).as_deref(), Some("a"));
        // The first snapshot is the floor
        assert!(log.undo().is_none());
        assert_eq!(log.cursor(), Some(0));
    }

    #[test]
    fn test_single_push_cannot_undo() {
        let mut log = HistoryLog::new(10);
        log.push("only");
        assert!(!log.can_undo());
        assert!(log.undo().is_none());
    }

    #[test]
    fn test_redo_returns_state_before_undo() {
        let mut log = HistoryLog::new(10);
        log.push("a");
        log.push("b");

        log.undo();
        assert!(log.can_redo());
        assert_eq!(redo_payload(&mut log).as_deref(), Some("b"));
        assert!(!log.can_redo());
        assert!(log.redo().is_none());
    }

    #[test]
    fn test_undo_redo_pairs_do_not_drift() {
        let mut log = HistoryLog::new(10);
        log.push("a");
        log.push("b");
        log.push("c");
        let before = payloads(&log);

        for _ in 0..20 {
            log.undo();
            log.redo();
        }

        assert_eq!(payloads(&log), before);
        assert_eq!(log.cursor(), Some(2));
    }

    #[test]
    fn test_push_after_undo_discards_redo_branch() {
        let mut log = HistoryLog::new(10);
        log.push("a");
        log.push("b");
        log.undo();
        log.push("c");

        assert!(log.redo().is_none());
        assert_eq!(payloads(&log), vec!["a", "c"]);
        assert_eq!(log.cursor(), Some(1));
    }

    #[test]
    fn test_capacity_evicts_oldest() {
        let mut log = HistoryLog::new(3);
        log.push("a");
        log.push("b");
        log.push("c");
        log.push("d");

        assert_eq!(log.len(), 3);
        assert_eq!(payloads(&log), vec!["b", "c", "d"]);
        assert_eq!(log.cursor(), Some(2));
        assert!(log.can_undo());
        assert!(!log.can_redo());
    }

    #[test]
    fn test_length_never_exceeds_capacity() {
        let mut log = HistoryLog::new(5);
        for i in 0..100 {
            log.push(format!("s{i}"));
            if i % 7 == 0 {
                log.undo();
            }
            assert!(log.len() <= 5);
            let cursor = log.cursor().expect("non-empty");
            assert!(cursor < log.len());
        }
    }

    #[test]
    fn test_capacity_one() {
        let mut log = HistoryLog::new(1);
        log.push("a");
        log.push("b");
        assert_eq!(payloads(&log), vec!["b"]);
        assert_eq!(log.cursor(), Some(0));
        assert!(!log.can_undo());
    }

    #[test]
    fn test_zero_capacity_is_raised_to_one() {
        let log = HistoryLog::new(0);
        assert_eq!(log.capacity(), 1);
    }

    #[test]
    fn test_push_during_replay_is_ignored() {
        let mut log = HistoryLog::new(10);
        log.push("a");
        log.push("b");

        let restored = log.undo_with(|snapshot, log| {
            // The canvas re-renders and fires its modification hook
            log.push(format!("rerender of {}", snapshot.payload));
            snapshot.payload.clone()
        });

        assert_eq!(restored.as_deref(), Some("a"));
        assert_eq!(payloads(&log), vec!["a", "b"]);
        assert!(log.can_redo());
        assert!(log.is_recording());
    }

    #[test]
    fn test_redo_with_suppresses_push() {
        let mut log = HistoryLog::new(10);
        log.push("a");
        log.push("b");
        log.undo();

        log.redo_with(|_, log| log.push("echo"));
        assert_eq!(payloads(&log), vec!["a", "b"]);
        assert_eq!(log.cursor(), Some(1));
    }

    #[test]
    fn test_pause_recording() {
        let mut log = HistoryLog::new(10);
        log.pause_recording();
        log.push("a");
        assert!(log.is_empty());

        log.resume_recording();
        log.push("b");
        assert_eq!(payloads(&log), vec!["b"]);
    }

    #[test]
    fn test_clear_resets_to_empty() {
        let mut log = HistoryLog::new(10);
        log.push("a");
        log.push("b");
        log.clear();

        assert!(log.is_empty());
        assert_eq!(log.cursor(), None);
        assert!(!log.can_undo());
        assert!(!log.can_redo());

        log.push("c");
        assert_eq!(log.cursor(), Some(0));
    }

    #[test]
    fn test_stats() {
        let mut log = HistoryLog::new(10);
        assert_eq!(
            log.stats(),
            HistoryStats {
                total: 0,
                cursor: None,
                can_undo: false,
                can_redo: false,
            }
        );

        log.push("a");
        log.push("b");
        log.push("c");
        log.undo();
        assert_eq!(
            log.stats(),
            HistoryStats {
                total: 3,
                cursor: Some(1),
                can_undo: true,
                can_redo: true,
            }
        );
    }

    #[test]
    fn test_from_parts_trims_to_capacity() {
        let entries: Vec<HistorySnapshot> = (0..6)
            .map(|i| HistorySnapshot {
                payload: format!("s{i}"),
                taken_at: i,
            })
            .collect();

        let log = HistoryLog::from_parts(4, entries.clone(), Some(3));
        assert_eq!(payloads(&log), vec!["s2", "s3", "s4", "s5"]);
        assert_eq!(log.cursor(), Some(1));

        let log = HistoryLog::from_parts(4, entries.clone(), Some(0));
        assert_eq!(log.cursor(), Some(0));

        let log = HistoryLog::from_parts(10, entries.clone(), Some(99));
        assert_eq!(log.cursor(), Some(5));

        let log = HistoryLog::from_parts(10, entries, None);
        assert_eq!(log.cursor(), Some(5));

        let log = HistoryLog::from_parts(10, Vec::new(), Some(2));
        assert_eq!(log.cursor(), None);
    }
}
