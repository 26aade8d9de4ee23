//! Integration tests for overlapping optimistic calls.
//!
//! Covers the "freshest call wins" contract end to end: a slow call issued
//! first and a fast call issued second on the same slot, where the fast
//! one resolves first and the slow one must be discarded on arrival.

#![allow(clippy::expect_used, clippy::unwrap_used, clippy::similar_names)]

use std::collections::VecDeque;
use std::sync::Arc;
use std::time::Duration;

use parking_lot::Mutex;
use tasksync::api::{ApiError, TaskApi};
use tasksync::history::MutationOrigin;
use tasksync::optimistic::{ExecuteHooks, KeyedCoordinator, OptimisticCoordinator};
use tasksync::tasks::{InMemoryTaskStore, TaskBoard, TaskStore};
use tasksync_proto::task::{Task, TaskId, TaskPatch, TaskStatus};

/// A backing API whose calls resolve in a scripted order.
///
/// Each call pops `(latency, succeeds)` from the script; an exhausted
/// script confirms immediately.
struct ScriptedApi {
    script: Mutex<VecDeque<(Duration, bool)>>,
}

impl ScriptedApi {
    fn new(script: impl IntoIterator<Item = (u64, bool)>) -> Self {
        Self {
            script: Mutex::new(
                script
                    .into_iter()
                    .map(|(ms, ok)| (Duration::from_millis(ms), ok))
                    .collect(),
            ),
        }
    }

    async fn resolve<T>(&self, value: T, error: ApiError) -> Result<T, ApiError> {
        let (latency, ok) = self
            .script
            .lock()
            .pop_front()
            .unwrap_or((Duration::ZERO, true));
        tokio::time::sleep(latency).await;
        if ok { Ok(value) } else { Err(error) }
    }
}

impl TaskApi for ScriptedApi {
    async fn update_task(&self, task: Task) -> Result<Task, ApiError> {
        self.resolve(task, ApiError::UpdateFailed).await
    }

    async fn move_task(&self, task: Task) -> Result<Task, ApiError> {
        self.resolve(task, ApiError::MoveFailed).await
    }

    async fn create_task(&self, task: Task) -> Result<Task, ApiError> {
        self.resolve(task, ApiError::CreateFailed).await
    }

    async fn delete_task(&self, id: TaskId) -> Result<TaskId, ApiError> {
        self.resolve(id, ApiError::DeleteFailed).await
    }
}

async fn after<T>(ms: u64, result: Result<T, ApiError>) -> Result<T, ApiError> {
    tokio::time::sleep(Duration::from_millis(ms)).await;
    result
}

fn board_with(task: &Task) -> TaskBoard<InMemoryTaskStore> {
    TaskBoard::new(Arc::new(InMemoryTaskStore::with_tasks([task.clone()])), 50)
}

// ---------------------------------------------------------------------------
// Coordinator level
// ---------------------------------------------------------------------------

#[tokio::test(start_paused = true)]
async fn slow_first_fast_second_keeps_fast_result() {
    let coordinator = OptimisticCoordinator::new();
    let state = Mutex::new(Vec::new());

    let (first, second) = tokio::join!(
        coordinator.execute(
            after(500, Ok("call #1")),
            ExecuteHooks::new().on_success(|v: &&str| state.lock().push(*v)),
        ),
        async {
            tokio::time::sleep(Duration::from_millis(10)).await;
            coordinator
                .execute(
                    after(50, Ok("call #2")),
                    ExecuteHooks::new().on_success(|v: &&str| state.lock().push(*v)),
                )
                .await
        }
    );

    assert_eq!(first, None);
    assert_eq!(second, Some("call #2"));
    assert_eq!(*state.lock(), ["call #2"]);
    assert!(!coordinator.is_loading());
    assert!(coordinator.error().is_none());
}

#[tokio::test(start_paused = true)]
async fn three_overlapping_calls_only_last_applies() {
    let coordinator = OptimisticCoordinator::new();
    let applied = Mutex::new(Vec::new());

    let (a, b, c) = tokio::join!(
        coordinator.execute(
            after(300, Ok(1)),
            ExecuteHooks::new().on_success(|v: &i32| applied.lock().push(*v)),
        ),
        async {
            tokio::time::sleep(Duration::from_millis(1)).await;
            coordinator
                .execute(
                    after::<i32>(10, Err(ApiError::UpdateFailed)),
                    ExecuteHooks::new().on_rollback(|| applied.lock().push(-2)),
                )
                .await
        },
        async {
            tokio::time::sleep(Duration::from_millis(2)).await;
            coordinator
                .execute(
                    after(100, Ok(3)),
                    ExecuteHooks::new().on_success(|v: &i32| applied.lock().push(*v)),
                )
                .await
        }
    );

    assert_eq!((a, b, c), (None, None, Some(3)));
    assert_eq!(*applied.lock(), [3]);
}

#[tokio::test(start_paused = true)]
async fn keyed_slots_race_independently() {
    let coordinator = KeyedCoordinator::new();
    let (a_old, a_new, b) = tokio::join!(
        coordinator.execute("a", after(400, Ok(1)), ExecuteHooks::new()),
        async {
            tokio::time::sleep(Duration::from_millis(5)).await;
            coordinator
                .execute("a", after(20, Ok(2)), ExecuteHooks::new())
                .await
        },
        coordinator.execute("b", after(600, Ok(3)), ExecuteHooks::new()),
    );
    assert_eq!((a_old, a_new, b), (None, Some(2), Some(3)));
    assert!(coordinator.loading_ids().is_empty());
}

// ---------------------------------------------------------------------------
// Board level
// ---------------------------------------------------------------------------

#[tokio::test(start_paused = true)]
async fn board_discards_stale_confirmation() {
    let task = Task::new("original", TaskStatus::Todo, 0);
    let board = board_with(&task);
    let api = ScriptedApi::new([(500, true), (50, true)]);
    let slow = TaskPatch::new().title("slow");
    let fast = TaskPatch::new().title("fast");

    let (first, second) = tokio::join!(board.update_optimistic(&api, &task.id, &slow), async {
        tokio::time::sleep(Duration::from_millis(10)).await;
        board.update_optimistic(&api, &task.id, &fast).await
    });

    assert!(first.unwrap().is_none());
    assert_eq!(second.unwrap().unwrap().title, "fast");
    assert_eq!(board.store().get_task(&task.id).unwrap().title, "fast");
    assert_eq!(board.with_history(|h| h.past().len()), 1);
    assert!(board.pending().loading_ids().is_empty());

    board.undo().unwrap().unwrap();
    assert_eq!(board.store().get_task(&task.id).unwrap().title, "original");
}

#[tokio::test(start_paused = true)]
async fn stale_failure_does_not_roll_back_newer_edit() {
    let task = Task::new("original", TaskStatus::Todo, 0);
    let board = board_with(&task);
    let api = ScriptedApi::new([(500, false), (50, true)]);
    let slow = TaskPatch::new().title("slow");
    let fast = TaskPatch::new().title("fast");

    let (first, second) = tokio::join!(board.update_optimistic(&api, &task.id, &slow), async {
        tokio::time::sleep(Duration::from_millis(10)).await;
        board.update_optimistic(&api, &task.id, &fast).await
    });

    assert!(first.unwrap().is_none());
    assert!(second.unwrap().is_some());
    assert_eq!(board.store().get_task(&task.id).unwrap().title, "fast");
    assert!(board.pending().error(&task.id).is_none());
}

#[tokio::test(start_paused = true)]
async fn current_failure_rolls_back_and_reports() {
    let task = Task::new("original", TaskStatus::Todo, 0);
    let board = board_with(&task);
    let api = ScriptedApi::new([(100, false)]);

    let result = board
        .move_optimistic(&api, &task.id, TaskStatus::Done, 0)
        .await
        .unwrap();

    assert!(result.is_none());
    let restored = board.store().get_task(&task.id).unwrap();
    assert_eq!(restored.status, TaskStatus::Todo);
    assert_eq!(board.pending().error(&task.id), Some(ApiError::MoveFailed));
    assert!(!board.with_history(|h| h.can_undo()));
}

#[tokio::test(start_paused = true)]
async fn edits_to_different_tasks_both_confirm() {
    let a = Task::new("a", TaskStatus::Todo, 0);
    let b = Task::new("b", TaskStatus::Todo, 1);
    let board = TaskBoard::new(
        Arc::new(InMemoryTaskStore::with_tasks([a.clone(), b.clone()])),
        50,
    );
    let api = ScriptedApi::new([(300, true), (20, true)]);

    let (a2, b2) = (TaskPatch::new().title("a2"), TaskPatch::new().title("b2"));

    let (ra, rb) = tokio::join!(
        board.update_optimistic(&api, &a.id, &a2),
        board.update_optimistic(&api, &b.id, &b2),
    );

    assert!(ra.unwrap().is_some());
    assert!(rb.unwrap().is_some());
    assert_eq!(board.with_history(|h| h.past().len()), 2);
}

#[tokio::test(start_paused = true)]
async fn direct_user_edit_still_records_while_call_pending() {
    let task = Task::new("original", TaskStatus::Todo, 0);
    let other = Task::new("other", TaskStatus::Done, 0);
    let board = TaskBoard::new(
        Arc::new(InMemoryTaskStore::with_tasks([task.clone(), other.clone()])),
        50,
    );
    let api = ScriptedApi::new([(200, true)]);

    let edit = TaskPatch::new().title("x");

    let (pending, ()) = tokio::join!(
        board.update_optimistic(&api, &task.id, &edit),
        async {
            tokio::time::sleep(Duration::from_millis(50)).await;
            board
                .update_task(&other.id, &TaskPatch::new().title("y"), MutationOrigin::User)
                .unwrap();
        }
    );

    assert!(pending.unwrap().is_some());
    let descriptions: Vec<String> =
        board.with_history(|h| h.past().iter().map(|a| a.description.clone()).collect());
    assert_eq!(
        descriptions,
        ["Updated title on \"other\"", "Updated title on \"original\""]
    );
}
