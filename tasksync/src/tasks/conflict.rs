//! Conflict detection and last-write-wins merging for remote task changes.
//!
//! A remote change conflicts with the local user only when the user is
//! editing the same task and both sides touch at least one common field.
//! The refreshed timestamp is written by every change and never counts as
//! an overlap.
//!
//! Merging is deliberately asymmetric: the local edit is applied first and
//! the remote change on top of it, so the remote side wins every field both
//! touched. This models "the other party committed first".

use std::collections::BTreeSet;

use tasksync_proto::task::{Task, TaskField, TaskId, TaskPatch, now_ms};

/// The single task the local user is currently editing.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EditSession {
    /// Task being edited.
    pub task_id: TaskId,
    /// Changes made locally that are not yet confirmed.
    pub changes: TaskPatch,
    /// When the session was opened (milliseconds since epoch).
    pub started_at: u64,
}

impl EditSession {
    /// Opens a session on `task_id` with the given unconfirmed changes.
    #[must_use]
    pub fn new(task_id: TaskId, changes: TaskPatch) -> Self {
        Self {
            task_id,
            changes,
            started_at: now_ms(),
        }
    }
}

/// Content fields written by both patches. The timestamp is never included.
#[must_use]
pub fn overlapping_fields(a: &TaskPatch, b: &TaskPatch) -> BTreeSet<TaskField> {
    a.content_fields()
        .intersection(&b.content_fields())
        .copied()
        .collect()
}

/// Returns `true` iff `external` collides with the active edit session.
///
/// No session, or a session on a different task, is never a conflict.
#[must_use]
pub fn detect_conflict(task_id: &TaskId, external: &TaskPatch, session: Option<&EditSession>) -> bool {
    let Some(session) = session else {
        return false;
    };
    session.task_id == *task_id && !overlapping_fields(external, &session.changes).is_empty()
}

/// Merges a local edit and a remote change onto `original`.
///
/// Applies `local`, then `external`, then stamps a fresh `updated_at` that
/// is strictly newer than `original.updated_at` even if the wall clock has
/// not advanced.
#[must_use]
pub fn merge_changes(original: &Task, external: &TaskPatch, local: &TaskPatch) -> Task {
    let mut merged = original.apply(local).apply(external);
    merged.updated_at = now_ms().max(original.updated_at.saturating_add(1));
    merged
}
