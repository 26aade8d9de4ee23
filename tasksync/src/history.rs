//! Bounded undo/redo history of user-initiated task mutations.
//!
//! `past` holds undoable actions (most recent last) and `future` holds
//! redoable ones (most recent first). Recording a new action clears
//! `future`; `past` never grows beyond the configured capacity, evicting
//! the oldest entry first.
//!
//! Every record goes through [`HistoryManager::add_to_history`], which only
//! accepts [`MutationOrigin::User`]. Undo/redo replays run with
//! [`MutationOrigin::Replay`] and remote changes with
//! [`MutationOrigin::External`], so neither can re-enter the history.

use std::collections::VecDeque;
use std::fmt;

use serde::{Deserialize, Serialize};
use tasksync_proto::task::{Task, TaskId, TaskPatch, TaskStatus, now_ms};
use uuid::Uuid;

/// Default number of undoable actions kept.
pub const DEFAULT_HISTORY_CAPACITY: usize = 50;

/// Where a task mutation came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum MutationOrigin {
    /// A direct, already-confirmed user action.
    User,
    /// A user action applied ahead of backend confirmation. Recorded once
    /// the backing call confirms it.
    Optimistic,
    /// A change made by another actor.
    External,
    /// Undo/redo replay or optimistic rollback.
    Replay,
}

impl MutationOrigin {
    /// Whether a mutation with this origin is recorded immediately.
    #[must_use]
    pub const fn records_history(self) -> bool {
        matches!(self, Self::User)
    }
}

/// Unique identifier for a history action.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ActionId(Uuid);

impl ActionId {
    /// Creates a new time-ordered action identifier (UUID v7).
    #[must_use]
    pub fn new() -> Self {
        Self(Uuid::now_v7())
    }
}

impl Default for ActionId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for ActionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// A task's column and position within it.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Placement {
    /// Column.
    pub status: TaskStatus,
    /// Position within the column.
    pub order: u32,
}

impl Placement {
    /// Where `task` currently sits.
    #[must_use]
    pub const fn of(task: &Task) -> Self {
        Self {
            status: task.status,
            order: task.order,
        }
    }
}

/// The reversible payload of a history action.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum ActionKind {
    /// A task was created; undo removes it.
    Create {
        /// The created task.
        task: Task,
    },
    /// Fields were changed; undo applies `previous`, redo applies `next`.
    Update {
        /// Task that changed.
        task_id: TaskId,
        /// Values of the changed fields before the edit.
        previous: TaskPatch,
        /// Values of the changed fields after the edit.
        next: TaskPatch,
    },
    /// A task was deleted; undo puts it back.
    Delete {
        /// The full removed record.
        task: Task,
    },
    /// A task moved between or within columns.
    Reorder {
        /// Task that moved.
        task_id: TaskId,
        /// Placement before the move.
        previous: Placement,
        /// Placement after the move.
        next: Placement,
    },
}

/// One reversible user action.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct HistoryAction {
    /// Unique action ID.
    pub id: ActionId,
    /// When the action was recorded (milliseconds since epoch).
    pub timestamp: u64,
    /// Human-readable summary, e.g. `Moved "Ship it" to Done`.
    pub description: String,
    /// What to reverse.
    pub kind: ActionKind,
}

impl HistoryAction {
    fn new(kind: ActionKind, description: String) -> Self {
        Self {
            id: ActionId::new(),
            timestamp: now_ms(),
            description,
            kind,
        }
    }
}

/// Bounded past/future stacks for undo and redo.
#[derive(Debug)]
pub struct HistoryManager {
    past: VecDeque<HistoryAction>,
    future: VecDeque<HistoryAction>,
    capacity: usize,
}

impl Default for HistoryManager {
    fn default() -> Self {
        Self::new(DEFAULT_HISTORY_CAPACITY)
    }
}

impl HistoryManager {
    /// Creates an empty history keeping at most `capacity` undoable actions.
    ///
    /// A capacity of zero is raised to one.
    #[must_use]
    pub fn new(capacity: usize) -> Self {
        let capacity = capacity.max(1);
        Self {
            past: VecDeque::with_capacity(capacity),
            future: VecDeque::new(),
            capacity,
        }
    }

    /// Records the creation of `task`.
    pub fn record_create(&mut self, task: &Task, origin: MutationOrigin) -> bool {
        let description = format!("Created \"{}\"", task.title);
        self.add_to_history(
            HistoryAction::new(ActionKind::Create { task: task.clone() }, description),
            origin,
        )
    }

    /// Records a field update. `previous` and `next` must cover the same fields.
    pub fn record_update(
        &mut self,
        task_id: &TaskId,
        title: &str,
        previous: TaskPatch,
        next: TaskPatch,
        origin: MutationOrigin,
    ) -> bool {
        let fields: Vec<String> = next.content_fields().iter().map(ToString::to_string).collect();
        let description = if fields.is_empty() {
            format!("Updated \"{title}\"")
        } else {
            format!("Updated {} on \"{title}\"", fields.join(", "))
        };
        self.add_to_history(
            HistoryAction::new(
                ActionKind::Update {
                    task_id: task_id.clone(),
                    previous,
                    next,
                },
                description,
            ),
            origin,
        )
    }

    /// Records the deletion of `task`.
    pub fn record_delete(&mut self, task: &Task, origin: MutationOrigin) -> bool {
        let description = format!("Deleted \"{}\"", task.title);
        self.add_to_history(
            HistoryAction::new(ActionKind::Delete { task: task.clone() }, description),
            origin,
        )
    }

    /// Records a move between or within columns.
    pub fn record_reorder(
        &mut self,
        task_id: &TaskId,
        title: &str,
        previous: Placement,
        next: Placement,
        origin: MutationOrigin,
    ) -> bool {
        let description = if previous.status == next.status {
            format!("Reordered \"{title}\"")
        } else {
            format!("Moved \"{title}\" to {}", next.status.label())
        };
        self.add_to_history(
            HistoryAction::new(
                ActionKind::Reorder {
                    task_id: task_id.clone(),
                    previous,
                    next,
                },
                description,
            ),
            origin,
        )
    }

    /// The single entry point into `past`.
    ///
    /// Drops the action unless `origin` is [`MutationOrigin::User`].
    /// Otherwise appends it, evicts the oldest entries beyond capacity and
    /// clears `future`. Returns whether the action was recorded.
    pub fn add_to_history(&mut self, action: HistoryAction, origin: MutationOrigin) -> bool {
        if !origin.records_history() {
            tracing::trace!(?origin, description = %action.description, "not recording");
            return false;
        }
        tracing::debug!(action_id = %action.id, description = %action.description, "recorded");
        self.past.push_back(action);
        self.evict_overflow();
        self.future.clear();
        true
    }

    /// Moves the newest `past` entry to the front of `future` and returns it
    /// for the caller to reverse. `None` (and no change) if `past` is empty.
    pub fn undo(&mut self) -> Option<HistoryAction> {
        let action = self.past.pop_back()?;
        self.future.push_front(action.clone());
        Some(action)
    }

    /// Moves the first `future` entry to the end of `past` and returns it
    /// for the caller to re-apply. `None` (and no change) if `future` is empty.
    pub fn redo(&mut self) -> Option<HistoryAction> {
        let action = self.future.pop_front()?;
        self.past.push_back(action.clone());
        self.evict_overflow();
        Some(action)
    }

    /// Forgets every action.
    pub fn clear_history(&mut self) {
        self.past.clear();
        self.future.clear();
    }

    /// Description of the action [`undo`](Self::undo) would return.
    #[must_use]
    pub fn undo_description(&self) -> Option<&str> {
        self.past.back().map(|a| a.description.as_str())
    }

    /// Description of the action [`redo`](Self::redo) would return.
    #[must_use]
    pub fn redo_description(&self) -> Option<&str> {
        self.future.front().map(|a| a.description.as_str())
    }

    /// Whether there is anything to undo.
    #[must_use]
    pub fn can_undo(&self) -> bool {
        !self.past.is_empty()
    }

    /// Whether there is anything to redo.
    #[must_use]
    pub fn can_redo(&self) -> bool {
        !self.future.is_empty()
    }

    /// Undoable actions, oldest first.
    #[must_use]
    pub const fn past(&self) -> &VecDeque<HistoryAction> {
        &self.past
    }

    /// Redoable actions, next-to-redo first.
    #[must_use]
    pub const fn future(&self) -> &VecDeque<HistoryAction> {
        &self.future
    }

    /// Maximum length of `past`.
    #[must_use]
    pub const fn capacity(&self) -> usize {
        self.capacity
    }

    fn evict_overflow(&mut self) {
        while self.past.len() > self.capacity {
            if let Some(evicted) = self.past.pop_front() {
                tracing::trace!(action_id = %evicted.id, "evicted oldest history entry");
            }
        }
    }
}
