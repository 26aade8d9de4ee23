//! The user mutation path: store writes, history recording, optimistic flows.
//!
//! Every mutation carries a [`MutationOrigin`]. Only user mutations are
//! recorded; optimistic ones are recorded once their backing call confirms,
//! and undo/redo replays run with [`MutationOrigin::Replay`] so they can never
//! record themselves. Nothing here relies on a flag being reset later.
//!
//! Each read-modify-write runs inside one [`TaskStore::transact`], so a
//! concurrent external change can land before or after it, never between.

use std::collections::HashMap;
use std::sync::Arc;

use parking_lot::Mutex;
use tasksync_proto::task::{Task, TaskId, TaskPatch, TaskStatus, now_ms, validate_title};

use crate::api::TaskApi;
use crate::history::{ActionKind, HistoryAction, HistoryManager, MutationOrigin, Placement};
use crate::optimistic::{ExecuteHooks, KeyedCoordinator};

use super::TaskError;
use super::store::{TaskMap, TaskStore};

/// A task board backed by a [`TaskStore`] with undo/redo history.
pub struct TaskBoard<S> {
    store: Arc<S>,
    history: Mutex<HistoryManager>,
    pending: KeyedCoordinator<TaskId>,
    /// Last confirmed record of each task with optimistic calls in flight.
    baselines: Mutex<HashMap<TaskId, Task>>,
}

impl<S: TaskStore> TaskBoard<S> {
    /// Creates a board over `store` keeping `history_capacity` undoable actions.
    #[must_use]
    pub fn new(store: Arc<S>, history_capacity: usize) -> Self {
        Self {
            store,
            history: Mutex::new(HistoryManager::new(history_capacity)),
            pending: KeyedCoordinator::new(),
            baselines: Mutex::new(HashMap::new()),
        }
    }

    /// The underlying store.
    #[must_use]
    pub const fn store(&self) -> &Arc<S> {
        &self.store
    }

    /// Per-task optimistic call state (loading ids, last errors).
    #[must_use]
    pub const fn pending(&self) -> &KeyedCoordinator<TaskId> {
        &self.pending
    }

    /// Runs `f` with read access to the history.
    pub fn with_history<R>(&self, f: impl FnOnce(&HistoryManager) -> R) -> R {
        f(&self.history.lock())
    }

    /// Description of the next undo candidate.
    #[must_use]
    pub fn undo_description(&self) -> Option<String> {
        self.history.lock().undo_description().map(str::to_string)
    }

    /// Description of the next redo candidate.
    #[must_use]
    pub fn redo_description(&self) -> Option<String> {
        self.history.lock().redo_description().map(str::to_string)
    }

    /// Forgets all undo/redo state.
    pub fn clear_history(&self) {
        self.history.lock().clear_history();
    }

    // -----------------------------------------------------------------------
    // Direct mutations
    // -----------------------------------------------------------------------

    /// Creates a task at the end of the `status` column.
    ///
    /// # Errors
    ///
    /// Returns [`TaskError::TitleEmpty`] or [`TaskError::TitleTooLong`] for
    /// an invalid title.
    pub fn create_task(
        &self,
        title: &str,
        status: TaskStatus,
        origin: MutationOrigin,
    ) -> Result<Task, TaskError> {
        validate_title(title)?;
        let task = self.store.transact(|tasks| {
            let position = column(tasks, status, None).len();
            let task = Task::new(title, status, u32::try_from(position).unwrap_or(u32::MAX));
            tasks.insert(task.id.clone(), task.clone());
            task
        });
        tracing::debug!(task_id = %task.id, %status, ?origin, "task created");
        self.history.lock().record_create(&task, origin);
        Ok(task)
    }

    /// Applies `patch` to a task, stamping a fresh `updated_at`.
    ///
    /// A status change renumbers both columns.
    ///
    /// # Errors
    ///
    /// Returns [`TaskError::TaskNotFound`] for an unknown ID, or a title
    /// error if the patch carries an invalid title.
    pub fn update_task(
        &self,
        id: &TaskId,
        patch: &TaskPatch,
        origin: MutationOrigin,
    ) -> Result<Task, TaskError> {
        if let Some(title) = &patch.title {
            validate_title(title)?;
        }
        let (current, updated) = self.patch_with(id, |_| Some(patch.clone()))?;

        let previous = current.snapshot(patch.content_fields());
        let mut next = patch.clone();
        next.updated_at = None;
        self.history
            .lock()
            .record_update(id, &current.title, previous, next, origin);
        Ok(updated)
    }

    /// Removes a task and closes the gap it leaves in its column.
    ///
    /// # Errors
    ///
    /// Returns [`TaskError::TaskNotFound`] for an unknown ID.
    pub fn delete_task(&self, id: &TaskId, origin: MutationOrigin) -> Result<Task, TaskError> {
        let removed = self
            .store
            .transact(|tasks: &mut TaskMap| -> Option<Task> {
                let removed = tasks.remove(id)?;
                renumber(tasks, removed.status);
                Some(removed)
            })
            .ok_or_else(|| not_found(id))?;
        tracing::debug!(task_id = %id, ?origin, "task deleted");
        self.history.lock().record_delete(&removed, origin);
        Ok(removed)
    }

    /// Moves a task to position `index` of the `status` column.
    ///
    /// `index` is clamped to the column length. Both the source and the
    /// target column are renumbered.
    ///
    /// # Errors
    ///
    /// Returns [`TaskError::TaskNotFound`] for an unknown ID.
    pub fn move_task(
        &self,
        id: &TaskId,
        status: TaskStatus,
        index: u32,
        origin: MutationOrigin,
    ) -> Result<Task, TaskError> {
        let (current, moved) = self.relocate(id, status, index)?;
        self.history.lock().record_reorder(
            id,
            &current.title,
            Placement::of(&current),
            Placement::of(&moved),
            origin,
        );
        Ok(moved)
    }

    /// Puts a previously removed task back at its recorded position.
    fn restore_task(&self, task: Task) -> Task {
        let (status, index) = (task.status, task.order);
        self.store
            .transact(|tasks| place(tasks, task, status, index))
    }

    // -----------------------------------------------------------------------
    // Undo / redo
    // -----------------------------------------------------------------------

    /// Reverses the most recent user action.
    ///
    /// Returns `Ok(None)` if there is nothing to undo.
    ///
    /// # Errors
    ///
    /// Returns [`TaskError::TaskNotFound`] if the action's task has since
    /// disappeared (e.g. removed by another actor). The action still moves
    /// to the redo stack.
    pub fn undo(&self) -> Result<Option<HistoryAction>, TaskError> {
        let Some(action) = self.history.lock().undo() else {
            return Ok(None);
        };
        tracing::info!(description = %action.description, "undo");
        self.revert(&action)?;
        Ok(Some(action))
    }

    /// Re-applies the most recently undone action.
    ///
    /// Returns `Ok(None)` if there is nothing to redo.
    ///
    /// # Errors
    ///
    /// Returns [`TaskError::TaskNotFound`] if the action's task has since
    /// disappeared.
    pub fn redo(&self) -> Result<Option<HistoryAction>, TaskError> {
        let Some(action) = self.history.lock().redo() else {
            return Ok(None);
        };
        tracing::info!(description = %action.description, "redo");
        self.reapply(&action)?;
        Ok(Some(action))
    }

    fn revert(&self, action: &HistoryAction) -> Result<(), TaskError> {
        let replay = MutationOrigin::Replay;
        match &action.kind {
            ActionKind::Create { task } => {
                self.delete_task(&task.id, replay)?;
            }
            ActionKind::Update {
                task_id, previous, ..
            } => {
                self.update_task(task_id, previous, replay)?;
            }
            ActionKind::Delete { task } => {
                self.restore_task(task.clone());
            }
            ActionKind::Reorder {
                task_id, previous, ..
            } => {
                self.move_task(task_id, previous.status, previous.order, replay)?;
            }
        }
        Ok(())
    }

    fn reapply(&self, action: &HistoryAction) -> Result<(), TaskError> {
        let replay = MutationOrigin::Replay;
        match &action.kind {
            ActionKind::Create { task } => {
                self.restore_task(task.clone());
            }
            ActionKind::Update { task_id, next, .. } => {
                self.update_task(task_id, next, replay)?;
            }
            ActionKind::Delete { task } => {
                self.delete_task(&task.id, replay)?;
            }
            ActionKind::Reorder { task_id, next, .. } => {
                self.move_task(task_id, next.status, next.order, replay)?;
            }
        }
        Ok(())
    }

    // -----------------------------------------------------------------------
    // Optimistic flows
    // -----------------------------------------------------------------------

    /// Applies `patch` immediately, then confirms it through `api`.
    ///
    /// On confirmation the update is recorded in history against the task's
    /// last confirmed state, not against the value of an overlapping call
    /// still in flight. On failure only the fields that still hold this
    /// call's values are restored; a field someone else has changed since
    /// is left alone. Returns the confirmed task, or `None` if the call
    /// failed or a newer call for the same task superseded it.
    ///
    /// # Errors
    ///
    /// Returns a [`TaskError`] if the local change cannot be applied; no
    /// backing call is made in that case.
    pub async fn update_optimistic<A: TaskApi>(
        &self,
        api: &A,
        id: &TaskId,
        patch: &TaskPatch,
    ) -> Result<Option<Task>, TaskError> {
        if let Some(title) = &patch.title {
            validate_title(title)?;
        }
        let (current, optimistic) = self.patch_with(id, |_| Some(patch.clone()))?;
        let baseline = self.baseline(id, &current);

        let title = baseline.title.clone();
        let recorded = baseline.snapshot(patch.content_fields());
        let mut next = patch.clone();
        next.updated_at = None;
        let applied = patch.clone();
        let hooks = ExecuteHooks::new()
            .on_success(move |_: &Task| {
                self.settle(id);
                self.history.lock().record_update(
                    id,
                    &title,
                    recorded,
                    next,
                    MutationOrigin::User,
                );
            })
            .on_rollback(move || {
                self.settle(id);
                let rollback = self.patch_with(id, |now| {
                    let held = now.fields_matching(&applied);
                    if held.is_empty() {
                        tracing::debug!(task_id = %id, "update overwritten, nothing to roll back");
                        return None;
                    }
                    Some(baseline.snapshot(held))
                });
                if let Err(error) = rollback {
                    tracing::warn!(task_id = %id, %error, "rollback of update failed");
                }
            })
            .on_error(|error| tracing::warn!(task_id = %id, %error, "update rejected"));

        Ok(self
            .pending
            .execute(id.clone(), api.update_task(optimistic), hooks)
            .await)
    }

    /// Moves a task immediately, then confirms the move through `api`.
    ///
    /// On failure the task returns to its last confirmed column and
    /// position, unless someone else has moved it to another column since.
    ///
    /// # Errors
    ///
    /// Returns [`TaskError::TaskNotFound`] for an unknown ID.
    pub async fn move_optimistic<A: TaskApi>(
        &self,
        api: &A,
        id: &TaskId,
        status: TaskStatus,
        index: u32,
    ) -> Result<Option<Task>, TaskError> {
        let (current, moved) = self.relocate(id, status, index)?;
        let baseline = self.baseline(id, &current);
        let previous = Placement::of(&baseline);
        let next = Placement::of(&moved);

        let hooks = ExecuteHooks::new()
            .on_success(move |_: &Task| {
                self.settle(id);
                self.history.lock().record_reorder(
                    id,
                    &baseline.title,
                    previous,
                    next,
                    MutationOrigin::User,
                );
            })
            .on_rollback(move || {
                self.settle(id);
                let restored = self.store.transact(|tasks: &mut TaskMap| -> Option<Task> {
                    let current = tasks.get(id).filter(|t| t.status == next.status).cloned()?;
                    Some(place(tasks, current, previous.status, previous.order))
                });
                if restored.is_none() {
                    tracing::debug!(task_id = %id, "move overwritten, nothing to roll back");
                }
            })
            .on_error(|error| tracing::warn!(task_id = %id, %error, "move rejected"));

        Ok(self
            .pending
            .execute(id.clone(), api.move_task(moved), hooks)
            .await)
    }

    /// Creates a task immediately, then confirms the creation through `api`.
    ///
    /// On failure the task is removed again.
    ///
    /// # Errors
    ///
    /// Returns a title error for an invalid title.
    pub async fn create_optimistic<A: TaskApi>(
        &self,
        api: &A,
        title: &str,
        status: TaskStatus,
    ) -> Result<Option<Task>, TaskError> {
        let created = self.create_task(title, status, MutationOrigin::Optimistic)?;
        let id = created.id.clone();

        let hooks = ExecuteHooks::new()
            .on_success(|confirmed: &Task| {
                self.history
                    .lock()
                    .record_create(confirmed, MutationOrigin::User);
            })
            .on_rollback(|| {
                if let Err(error) = self.delete_task(&id, MutationOrigin::Replay) {
                    tracing::warn!(task_id = %id, %error, "rollback of create failed");
                }
            })
            .on_error(|error| tracing::warn!(task_id = %id, %error, "create rejected"));

        Ok(self
            .pending
            .execute(id.clone(), api.create_task(created), hooks)
            .await)
    }

    /// Deletes a task immediately, then confirms the deletion through `api`.
    ///
    /// On failure the task is put back where it was. Returns the removed
    /// task once the deletion is confirmed.
    ///
    /// # Errors
    ///
    /// Returns [`TaskError::TaskNotFound`] for an unknown ID.
    pub async fn delete_optimistic<A: TaskApi>(
        &self,
        api: &A,
        id: &TaskId,
    ) -> Result<Option<Task>, TaskError> {
        let removed = self.delete_task(id, MutationOrigin::Optimistic)?;
        let restore = removed.clone();

        let hooks = ExecuteHooks::new()
            .on_success(|_: &TaskId| {
                self.history
                    .lock()
                    .record_delete(&removed, MutationOrigin::User);
            })
            .on_rollback(move || {
                self.restore_task(restore);
            })
            .on_error(|error| tracing::warn!(task_id = %id, %error, "delete rejected"));

        let confirmed = self
            .pending
            .execute(id.clone(), api.delete_task(id.clone()), hooks)
            .await;
        Ok(confirmed.map(|_| removed))
    }

    // -----------------------------------------------------------------------
    // Helpers
    // -----------------------------------------------------------------------

    /// Applies the patch `build` derives from the current record, in one
    /// transaction. Returns the record before and after; `None` from
    /// `build` writes nothing.
    fn patch_with(
        &self,
        id: &TaskId,
        build: impl FnOnce(&Task) -> Option<TaskPatch>,
    ) -> Result<(Task, Task), TaskError> {
        self.store
            .transact(|tasks: &mut TaskMap| -> Result<(Task, Task), TaskError> {
                let current = tasks.get(id).cloned().ok_or_else(|| not_found(id))?;
                let Some(patch) = build(&current) else {
                    return Ok((current.clone(), current));
                };
                let updated = current.apply(&patch.touched());
                tasks.insert(id.clone(), updated.clone());
                if updated.status != current.status {
                    renumber(tasks, current.status);
                    renumber(tasks, updated.status);
                }
                let updated = tasks.get(id).cloned().unwrap_or(updated);
                Ok((current, updated))
            })
    }

    /// Moves a task in one transaction. Returns the record before and after.
    fn relocate(
        &self,
        id: &TaskId,
        status: TaskStatus,
        index: u32,
    ) -> Result<(Task, Task), TaskError> {
        self.store
            .transact(|tasks: &mut TaskMap| -> Result<(Task, Task), TaskError> {
                let current = tasks.get(id).cloned().ok_or_else(|| not_found(id))?;
                let moved = place(tasks, current.clone(), status, index);
                Ok((current, moved))
            })
    }

    /// The confirmed state overlapping calls for `id` are measured against.
    ///
    /// Captured from `current` when no call for `id` is in flight; kept
    /// until the newest call settles.
    fn baseline(&self, id: &TaskId, current: &Task) -> Task {
        let mut baselines = self.baselines.lock();
        if !self.pending.is_loading(id) {
            baselines.insert(id.clone(), current.clone());
        }
        baselines
            .entry(id.clone())
            .or_insert_with(|| current.clone())
            .clone()
    }

    fn settle(&self, id: &TaskId) {
        self.baselines.lock().remove(id);
    }
}

fn not_found(id: &TaskId) -> TaskError {
    TaskError::TaskNotFound(id.to_string())
}

/// Tasks in `status`, by position, optionally leaving one out.
fn column(tasks: &TaskMap, status: TaskStatus, except: Option<&TaskId>) -> Vec<Task> {
    let mut column: Vec<Task> = tasks
        .values()
        .filter(|t| t.status == status && Some(&t.id) != except)
        .cloned()
        .collect();
    column.sort_by(|a, b| (a.order, a.created_at, &a.id).cmp(&(b.order, b.created_at, &b.id)));
    column
}

/// Inserts `task` at `index` of `status` and renumbers both columns.
fn place(tasks: &mut TaskMap, task: Task, status: TaskStatus, index: u32) -> Task {
    let source = task.status;
    let mut target = column(tasks, status, Some(&task.id));
    let index = usize::try_from(index).unwrap_or(usize::MAX).min(target.len());

    let mut moved = task;
    moved.status = status;
    moved.order = u32::try_from(index).unwrap_or(u32::MAX);
    moved.updated_at = now_ms().max(moved.updated_at);
    target.insert(index, moved.clone());

    for (position, mut entry) in target.into_iter().enumerate() {
        let position = u32::try_from(position).unwrap_or(u32::MAX);
        if entry.id == moved.id || entry.order != position {
            entry.order = position;
            tasks.insert(entry.id.clone(), entry);
        }
    }
    if source != status {
        renumber(tasks, source);
    }
    tracing::debug!(task_id = %moved.id, %status, order = moved.order, "task placed");
    moved
}

/// Renumbers a column to contiguous `0..n` positions.
fn renumber(tasks: &mut TaskMap, status: TaskStatus) {
    for (position, mut task) in column(tasks, status, None).into_iter().enumerate() {
        let position = u32::try_from(position).unwrap_or(u32::MAX);
        if task.order != position {
            task.order = position;
            tasks.insert(task.id.clone(), task);
        }
    }
}
