//! Wires external changes into the task store.
//!
//! The [`SyncOrchestrator`] owns the external change generator and the
//! single active [`EditSession`]. Each external update is checked against
//! that session: a conflicting update is merged over the local edit
//! (external wins) and the session is closed with a warning, anything else
//! is applied directly with an informational notice.

use std::sync::{Arc, Weak};

use parking_lot::Mutex;
use tasksync_proto::task::{Task, TaskId, TaskPatch, normalize_column_order};

use crate::generator::{ExternalChangeGenerator, ExternalUpdate, GeneratorConfig, UpdateCategory};
use crate::notify::Notifier;
use crate::tasks::{
    EditSession, TaskMap, TaskStore, detect_conflict, merge_changes, overlapping_fields,
};

/// Called after a conflict is resolved with `(task_id, external, local)`.
pub type ConflictCallback = Arc<dyn Fn(&TaskId, &TaskPatch, &TaskPatch) + Send + Sync>;

/// What [`SyncOrchestrator::handle_external_update`] did with an update.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SyncOutcome {
    /// No conflict; the change was applied as-is.
    Applied(Task),
    /// The change collided with the active edit and was merged over it.
    Merged(Task),
    /// The target task no longer exists.
    Skipped,
}

struct Inner<S, N> {
    store: Arc<S>,
    notifier: N,
    session: Mutex<Option<EditSession>>,
    generator: Mutex<Option<ExternalChangeGenerator>>,
    on_conflict: Mutex<Option<ConflictCallback>>,
}

/// Coordinates the external actor, the edit session and the store.
///
/// Clones share the same state.
pub struct SyncOrchestrator<S, N> {
    inner: Arc<Inner<S, N>>,
}

impl<S, N> Clone for SyncOrchestrator<S, N> {
    fn clone(&self) -> Self {
        Self {
            inner: Arc::clone(&self.inner),
        }
    }
}

impl<S, N> SyncOrchestrator<S, N>
where
    S: TaskStore + 'static,
    N: Notifier + 'static,
{
    /// Creates an orchestrator over `store`, reporting through `notifier`.
    #[must_use]
    pub fn new(store: Arc<S>, notifier: N) -> Self {
        Self {
            inner: Arc::new(Inner {
                store,
                notifier,
                session: Mutex::new(None),
                generator: Mutex::new(None),
                on_conflict: Mutex::new(None),
            }),
        }
    }

    /// The shared store.
    #[must_use]
    pub fn store(&self) -> &Arc<S> {
        &self.inner.store
    }

    /// Registers a callback fired after every resolved conflict.
    pub fn set_conflict_callback(
        &self,
        callback: impl Fn(&TaskId, &TaskPatch, &TaskPatch) + Send + Sync + 'static,
    ) {
        *self.inner.on_conflict.lock() = Some(Arc::new(callback));
    }

    // -----------------------------------------------------------------------
    // Lifecycle
    // -----------------------------------------------------------------------

    /// Starts the external change generator. Must run inside a tokio runtime.
    ///
    /// Does nothing if it is already running.
    pub fn start(&self, config: GeneratorConfig, seed: Option<u64>) {
        let mut slot = self.inner.generator.lock();
        if slot.as_ref().is_some_and(ExternalChangeGenerator::is_active) {
            tracing::warn!("sync already running, ignoring start");
            return;
        }

        let store = Arc::clone(&self.inner.store);
        let weak: Weak<Inner<S, N>> = Arc::downgrade(&self.inner);
        let mut generator = ExternalChangeGenerator::new(config, seed);
        generator.start(
            move || store.list_tasks(),
            move |update| {
                if let Some(inner) = weak.upgrade() {
                    Self { inner }.handle_external_update(&update);
                }
            },
        );
        *slot = Some(generator);
    }

    /// Stops the generator and cancels its pending firing. Idempotent.
    pub fn stop(&self) {
        let generator = self.inner.generator.lock().take();
        if let Some(mut generator) = generator {
            generator.stop();
        }
    }

    /// Whether the generator is running.
    #[must_use]
    pub fn is_running(&self) -> bool {
        self.inner
            .generator
            .lock()
            .as_ref()
            .is_some_and(ExternalChangeGenerator::is_active)
    }

    // -----------------------------------------------------------------------
    // Edit session
    // -----------------------------------------------------------------------

    /// Opens the edit session on `task_id`, replacing any previous one.
    pub fn start_editing(&self, task_id: TaskId, changes: TaskPatch) {
        let mut session = self.inner.session.lock();
        if let Some(previous) = session.as_ref() {
            tracing::debug!(task_id = %previous.task_id, "replacing edit session");
        }
        tracing::debug!(%task_id, fields = ?changes.content_fields(), "edit session started");
        *session = Some(EditSession::new(task_id, changes));
    }

    /// Adds `changes` to the active session. Returns `false` if none is open.
    pub fn update_editing(&self, changes: &TaskPatch) -> bool {
        let mut session = self.inner.session.lock();
        match session.as_mut() {
            Some(active) => {
                active.changes.merge_from(changes);
                true
            }
            None => false,
        }
    }

    /// Closes the edit session and returns it.
    pub fn stop_editing(&self) -> Option<EditSession> {
        let closed = self.inner.session.lock().take();
        if let Some(session) = &closed {
            tracing::debug!(task_id = %session.task_id, "edit session closed");
        }
        closed
    }

    /// The active edit session, if any.
    #[must_use]
    pub fn active_edit(&self) -> Option<EditSession> {
        self.inner.session.lock().clone()
    }

    // -----------------------------------------------------------------------
    // External updates
    // -----------------------------------------------------------------------

    /// Applies one external update, merging it over the active edit if they
    /// collide.
    ///
    /// The read, the merge and the write happen in one store transaction, so
    /// a user write can never be overwritten with a stale copy and a task
    /// deleted meanwhile is never brought back. Columns are renumbered
    /// whenever the resulting status differs from the stored one, whichever
    /// side of the merge changed it.
    pub fn handle_external_update(&self, update: &ExternalUpdate) -> SyncOutcome {
        let resolved = self
            .inner
            .store
            .transact(|tasks: &mut TaskMap| -> Option<(Task, Option<TaskPatch>)> {
                let original = tasks.get(&update.task_id).cloned()?;
                let local = self.take_conflicting_edit(update);
                let next = match &local {
                    Some(local) => merge_changes(&original, &update.changes, local),
                    None => original.apply(&update.changes),
                };
                tasks.insert(next.id.clone(), next.clone());

                if next.status != original.status || update.changes.status.is_some() {
                    normalize_columns(tasks);
                }
                let next = tasks.get(&update.task_id).cloned().unwrap_or(next);
                Some((next, local))
            });

        let Some((task, local)) = resolved else {
            tracing::warn!(task_id = %update.task_id, actor = %update.actor, "external update for unknown task");
            return SyncOutcome::Skipped;
        };

        let description = describe_update(update);
        let Some(local) = local else {
            tracing::info!(
                task_id = %update.task_id,
                actor = %update.actor,
                category = %update.category,
                "external change applied"
            );
            self.inner.notifier.notify_info(&description);
            return SyncOutcome::Applied(task);
        };

        let fields: Vec<String> = overlapping_fields(&update.changes, &local)
            .iter()
            .map(ToString::to_string)
            .collect();
        tracing::warn!(
            task_id = %update.task_id,
            actor = %update.actor,
            fields = %fields.join(","),
            "conflict resolved in favor of external change"
        );
        self.inner.notifier.notify_warning(&format!(
            "Conflict: {description} while you were editing it. Their {} change was kept.",
            fields.join(", ")
        ));

        let callback = self.inner.on_conflict.lock().clone();
        if let Some(callback) = callback {
            callback(&update.task_id, &update.changes, &local);
        }
        SyncOutcome::Merged(task)
    }

    /// Closes the edit session and returns its changes if `update` collides
    /// with it.
    fn take_conflicting_edit(&self, update: &ExternalUpdate) -> Option<TaskPatch> {
        let mut session = self.inner.session.lock();
        if detect_conflict(&update.task_id, &update.changes, session.as_ref()) {
            session.take().map(|s| s.changes)
        } else {
            None
        }
    }
}

/// Closes gaps and duplicate positions left by a column change.
fn normalize_columns(tasks: &mut TaskMap) {
    let snapshot: Vec<Task> = tasks.values().cloned().collect();
    for task in normalize_column_order(&snapshot) {
        tracing::trace!(task_id = %task.id, order = task.order, "renumbered");
        tasks.insert(task.id.clone(), task);
    }
}

/// Human-readable summary of an external update.
#[must_use]
pub fn describe_update(update: &ExternalUpdate) -> String {
    let actor = &update.actor;
    let changes = &update.changes;
    match update.category {
        UpdateCategory::StatusChange => match changes.status {
            Some(status) => format!("{actor} moved a task to {}", status.label()),
            None => format!("{actor} updated a task"),
        },
        UpdateCategory::PriorityChange => match changes.priority {
            Some(priority) => format!("{actor} set a task's priority to {}", priority.label()),
            None => format!("{actor} updated a task"),
        },
        UpdateCategory::AssigneeChange => match &changes.assignee {
            Some(Some(name)) => format!("{actor} reassigned a task to {name}"),
            _ => format!("{actor} unassigned a task"),
        },
    }
}
