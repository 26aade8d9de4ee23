//! Task storage behind the [`TaskStore`] trait.
//!
//! Every write replaces a whole record under the store's write lock, so
//! concurrent readers see either the old task or the new one, never a mix.

use std::collections::HashMap;

use parking_lot::RwLock;
use tasksync_proto::task::{Task, TaskId, TaskPatch};

use super::TaskError;

/// Every task by ID, as handed to [`TaskStore::transact`].
pub type TaskMap = HashMap<TaskId, Task>;

/// Read/write access to the current set of tasks.
///
/// Implementations must be cheap to read: the external-change generator
/// calls [`list_tasks`](Self::list_tasks) on every firing instead of caching.
pub trait TaskStore: Send + Sync {
    /// Returns a snapshot of every task.
    fn list_tasks(&self) -> Vec<Task>;

    /// Returns one task by ID.
    fn get_task(&self, id: &TaskId) -> Option<Task>;

    /// Applies a partial change to an existing task and returns the new record.
    ///
    /// # Errors
    ///
    /// Returns [`TaskError::TaskNotFound`] if no task has this ID.
    fn apply_task_change(&self, id: &TaskId, patch: &TaskPatch) -> Result<Task, TaskError>;

    /// Inserts a task, replacing any record with the same ID.
    fn put_task(&self, task: Task);

    /// Removes a task, returning it if it existed.
    fn remove_task(&self, id: &TaskId) -> Option<Task>;

    /// Runs `f` with exclusive access to every task.
    ///
    /// No other write can land between the reads and writes `f` makes, so
    /// read-modify-write sequences (merges, column renumbering) go through
    /// here rather than pairing [`get_task`](Self::get_task) with
    /// [`put_task`](Self::put_task).
    fn transact<R>(&self, f: impl FnOnce(&mut TaskMap) -> R) -> R;
}

/// In-memory [`TaskStore`] backed by a `HashMap`.
#[derive(Debug, Default)]
pub struct InMemoryTaskStore {
    tasks: RwLock<TaskMap>,
}

impl InMemoryTaskStore {
    /// Creates an empty store.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Creates a store pre-populated with `tasks`.
    #[must_use]
    pub fn with_tasks<I>(tasks: I) -> Self
    where
        I: IntoIterator<Item = Task>,
    {
        let tasks = tasks.into_iter().map(|t| (t.id.clone(), t)).collect();
        Self {
            tasks: RwLock::new(tasks),
        }
    }

    /// Number of stored tasks.
    #[must_use]
    pub fn len(&self) -> usize {
        self.tasks.read().len()
    }

    /// Whether the store is empty.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.tasks.read().is_empty()
    }
}

impl TaskStore for InMemoryTaskStore {
    /// Tasks are returned grouped by column, then by position.
    fn list_tasks(&self) -> Vec<Task> {
        let mut tasks: Vec<Task> = self.tasks.read().values().cloned().collect();
        tasks.sort_by(|a, b| {
            (a.status, a.order, a.created_at).cmp(&(b.status, b.order, b.created_at))
        });
        tasks
    }

    fn get_task(&self, id: &TaskId) -> Option<Task> {
        self.tasks.read().get(id).cloned()
    }

    fn apply_task_change(&self, id: &TaskId, patch: &TaskPatch) -> Result<Task, TaskError> {
        let mut tasks = self.tasks.write();
        let current = tasks
            .get(id)
            .ok_or_else(|| TaskError::TaskNotFound(id.to_string()))?;
        let next = current.apply(patch);
        tasks.insert(id.clone(), next.clone());
        Ok(next)
    }

    fn put_task(&self, task: Task) {
        self.tasks.write().insert(task.id.clone(), task);
    }

    fn remove_task(&self, id: &TaskId) -> Option<Task> {
        self.tasks.write().remove(id)
    }

    fn transact<R>(&self, f: impl FnOnce(&mut TaskMap) -> R) -> R {
        f(&mut self.tasks.write())
    }
}
