//! Integration tests for external changes flowing into the board.
//!
//! Exercises the orchestrator with hand-built updates for each conflict
//! case and with the live generator on a paused clock.

#![allow(clippy::expect_used, clippy::unwrap_used, clippy::redundant_clone)]

use std::sync::Arc;
use std::time::Duration;

use parking_lot::Mutex;
use tasksync::api::{ApiConfig, SimulatedApi};
use tasksync::generator::{ExternalUpdate, GeneratorConfig, UpdateCategory};
use tasksync::notify::{ChannelNotifier, Notification, NotificationLevel};
use tasksync::sync::{SyncOrchestrator, SyncOutcome};
use tasksync::tasks::{InMemoryTaskStore, TaskBoard, TaskStore};
use tasksync_proto::task::{Task, TaskPatch, TaskPriority, TaskStatus};
use tokio::sync::mpsc;

type Orchestrator = SyncOrchestrator<InMemoryTaskStore, ChannelNotifier>;

fn orchestrator(tasks: Vec<Task>) -> (Orchestrator, mpsc::Receiver<Notification>) {
    let (notifier, rx) = ChannelNotifier::new(32);
    let store = Arc::new(InMemoryTaskStore::with_tasks(tasks));
    (SyncOrchestrator::new(store, notifier), rx)
}

fn external(task: &Task, changes: TaskPatch, category: UpdateCategory) -> ExternalUpdate {
    ExternalUpdate {
        task_id: task.id.clone(),
        changes: changes.touched(),
        actor: "Priya Patel".to_string(),
        category,
    }
}

fn drain(rx: &mut mpsc::Receiver<Notification>) -> Vec<Notification> {
    let mut out = Vec::new();
    while let Ok(note) = rx.try_recv() {
        out.push(note);
    }
    out
}

// ---------------------------------------------------------------------------
// Conflict cases
// ---------------------------------------------------------------------------

#[test]
fn status_change_without_edit_applies_directly() {
    let task = Task::new("T", TaskStatus::Todo, 0);
    let (sync, mut rx) = orchestrator(vec![task.clone()]);

    let outcome = sync.handle_external_update(&external(
        &task,
        TaskPatch::new().status(TaskStatus::InProgress),
        UpdateCategory::StatusChange,
    ));

    assert!(matches!(outcome, SyncOutcome::Applied(_)));
    let stored = sync.store().get_task(&task.id).unwrap();
    assert_eq!(stored.status, TaskStatus::InProgress);
    let notes = drain(&mut rx);
    assert_eq!(notes.len(), 1);
    assert_eq!(notes[0].level, NotificationLevel::Info);
    assert!(notes[0].text.contains("Priya Patel"));
    assert!(notes[0].text.contains("In Progress"));
}

#[test]
fn overlapping_priority_edit_is_overridden() {
    let task = Task::new("T", TaskStatus::Todo, 0);
    let (sync, mut rx) = orchestrator(vec![task.clone()]);
    sync.start_editing(task.id.clone(), TaskPatch::new().priority(TaskPriority::High));

    let outcome = sync.handle_external_update(&external(
        &task,
        TaskPatch::new().priority(TaskPriority::Low),
        UpdateCategory::PriorityChange,
    ));

    let SyncOutcome::Merged(merged) = outcome else {
        panic!("expected a merge");
    };
    assert_eq!(merged.priority, TaskPriority::Low);
    assert_eq!(sync.store().get_task(&task.id).unwrap().priority, TaskPriority::Low);
    assert!(sync.active_edit().is_none());
    let notes = drain(&mut rx);
    assert_eq!(notes.len(), 1);
    assert_eq!(notes[0].level, NotificationLevel::Warning);
}

#[test]
fn disjoint_assignee_edit_survives_status_change() {
    let task = Task::new("T", TaskStatus::Todo, 0);
    let (sync, mut rx) = orchestrator(vec![task.clone()]);
    let local = TaskPatch::new().assignee(Some("Bob".to_string()));
    sync.start_editing(task.id.clone(), local.clone());

    let outcome = sync.handle_external_update(&external(
        &task,
        TaskPatch::new().status(TaskStatus::Done),
        UpdateCategory::StatusChange,
    ));

    assert!(matches!(outcome, SyncOutcome::Applied(_)));
    assert_eq!(sync.store().get_task(&task.id).unwrap().status, TaskStatus::Done);
    let session = sync.active_edit().unwrap();
    assert_eq!(session.task_id, task.id);
    assert_eq!(session.changes, local);
    assert_eq!(drain(&mut rx)[0].level, NotificationLevel::Info);
}

#[test]
fn merge_keeps_local_only_fields() {
    let task = Task::new("T", TaskStatus::Todo, 0);
    let (sync, _rx) = orchestrator(vec![task.clone()]);
    sync.start_editing(
        task.id.clone(),
        TaskPatch::new()
            .priority(TaskPriority::High)
            .description("local notes"),
    );

    let outcome = sync.handle_external_update(&external(
        &task,
        TaskPatch::new().priority(TaskPriority::Low),
        UpdateCategory::PriorityChange,
    ));

    let SyncOutcome::Merged(merged) = outcome else {
        panic!("expected a merge");
    };
    assert_eq!(merged.priority, TaskPriority::Low);
    assert_eq!(merged.description, "local notes");
    assert!(merged.updated_at > task.updated_at);
}

// ---------------------------------------------------------------------------
// Live generator
// ---------------------------------------------------------------------------

#[tokio::test(start_paused = true)]
async fn generator_drives_store_and_notifications() {
    let tasks = vec![Task::new("a", TaskStatus::Todo, 0)];
    let before = tasks.clone();
    let (sync, mut rx) = orchestrator(tasks);
    sync.start(GeneratorConfig::default(), Some(21));

    tokio::time::sleep(Duration::from_secs(14)).await;
    assert!(drain(&mut rx).is_empty());

    tokio::time::sleep(Duration::from_millis(6_100)).await;
    let notes = drain(&mut rx);
    assert_eq!(notes.len(), 1);
    assert_eq!(notes[0].level, NotificationLevel::Info);

    let changed = sync
        .store()
        .list_tasks()
        .into_iter()
        .filter(|t| !before.contains(t))
        .count();
    assert_eq!(changed, 1);

    sync.stop();
    tokio::time::sleep(Duration::from_secs(60)).await;
    assert!(drain(&mut rx).is_empty());
}

#[tokio::test(start_paused = true)]
async fn generator_fires_repeatedly_within_bounds() {
    let (sync, mut rx) = orchestrator(vec![Task::new("only", TaskStatus::Todo, 0)]);
    sync.start(GeneratorConfig::default(), Some(8));

    // Firings land every 15..=20 s, so 100 s holds between 5 and 6 of them.
    tokio::time::sleep(Duration::from_secs(100)).await;
    let count = drain(&mut rx).len();
    assert!((5..=6).contains(&count), "count = {count}");
    sync.stop();
}

#[tokio::test(start_paused = true)]
async fn conflict_callback_fires_for_generated_update() {
    let task = Task::new("T", TaskStatus::Todo, 0).with_assignee("Sarah Chen");
    let (sync, _rx) = orchestrator(vec![task.clone()]);
    let conflicts = Arc::new(Mutex::new(0_usize));
    let counter = Arc::clone(&conflicts);
    sync.set_conflict_callback(move |_, _, _| *counter.lock() += 1);

    // Every field group the generator can touch is part of the edit.
    sync.start_editing(
        task.id.clone(),
        TaskPatch::new()
            .status(TaskStatus::Todo)
            .priority(TaskPriority::Medium)
            .assignee(Some("Sarah Chen".to_string())),
    );
    sync.start(GeneratorConfig::default(), Some(5));
    tokio::time::sleep(Duration::from_millis(20_100)).await;
    sync.stop();

    assert_eq!(*conflicts.lock(), 1);
    assert!(sync.active_edit().is_none());
}

#[tokio::test(start_paused = true)]
async fn external_change_during_pending_optimistic_update() {
    let task = Task::new("T", TaskStatus::Todo, 0);
    let (sync, mut rx) = orchestrator(vec![task.clone()]);
    let board = TaskBoard::new(Arc::clone(sync.store()), 50);
    let api = SimulatedApi::seeded(
        ApiConfig {
            latency: Duration::from_millis(2000),
            failure_rate: 0.0,
        },
        1,
    );
    let local = TaskPatch::new().priority(TaskPriority::High);
    sync.start_editing(task.id.clone(), local.clone());

    let (confirmed, ()) = tokio::join!(board.update_optimistic(&api, &task.id, &local), async {
        tokio::time::sleep(Duration::from_millis(500)).await;
        sync.handle_external_update(&external(
            &task,
            TaskPatch::new().priority(TaskPriority::Low),
            UpdateCategory::PriorityChange,
        ));
    });

    assert!(confirmed.unwrap().is_some());
    let stored = sync.store().get_task(&task.id).unwrap();
    assert_eq!(stored.priority, TaskPriority::Low);
    assert_eq!(drain(&mut rx)[0].level, NotificationLevel::Warning);
    assert!(board.with_history(|h| h.can_undo()));
}

#[tokio::test(start_paused = true)]
async fn rejected_local_edit_keeps_external_winner() {
    let task = Task::new("T", TaskStatus::Todo, 0);
    let (sync, mut rx) = orchestrator(vec![task.clone()]);
    let board = TaskBoard::new(Arc::clone(sync.store()), 50);
    let api = SimulatedApi::seeded(
        ApiConfig {
            latency: Duration::from_millis(2000),
            failure_rate: 1.0,
        },
        1,
    );
    let local = TaskPatch::new().priority(TaskPriority::High);
    sync.start_editing(task.id.clone(), local.clone());

    let (rejected, ()) = tokio::join!(board.update_optimistic(&api, &task.id, &local), async {
        tokio::time::sleep(Duration::from_millis(500)).await;
        sync.handle_external_update(&external(
            &task,
            TaskPatch::new().priority(TaskPriority::Low),
            UpdateCategory::PriorityChange,
        ));
    });

    assert!(rejected.unwrap().is_none());
    let stored = sync.store().get_task(&task.id).unwrap();
    assert_eq!(stored.priority, TaskPriority::Low);
    assert_eq!(drain(&mut rx)[0].level, NotificationLevel::Warning);
    assert!(!board.with_history(|h| h.can_undo()));
}
