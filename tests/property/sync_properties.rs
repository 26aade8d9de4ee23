//! Property-based tests for merging, conflict detection and history.
//!
//! Uses proptest to verify:
//! 1. `merge_changes` lets external fields win, keeps local-only fields,
//!    leaves untouched fields alone and always produces a newer timestamp.
//! 2. `detect_conflict` is true exactly when the same task's content
//!    fields overlap.
//! 3. History stays within capacity, keeps the newest actions, and an
//!    undo/redo sequence restores the same past.
//! 4. The change planner never picks a task's current value.

#![allow(clippy::expect_used, clippy::unwrap_used)]

use std::collections::BTreeSet;

use proptest::prelude::*;
use tasksync::generator::{ChangePlanner, GeneratorConfig, UpdateCategory};
use tasksync::history::{HistoryManager, MutationOrigin};
use tasksync::tasks::{EditSession, detect_conflict, merge_changes};
use tasksync_proto::task::{Task, TaskField, TaskId, TaskPatch, TaskPriority, TaskStatus, now_ms};

// --- Strategies ---

fn arb_status() -> impl Strategy<Value = TaskStatus> {
    prop_oneof![
        Just(TaskStatus::Todo),
        Just(TaskStatus::InProgress),
        Just(TaskStatus::Done),
    ]
}

fn arb_priority() -> impl Strategy<Value = TaskPriority> {
    prop_oneof![
        Just(TaskPriority::Low),
        Just(TaskPriority::Medium),
        Just(TaskPriority::High),
    ]
}

fn arb_name() -> impl Strategy<Value = String> {
    prop_oneof![
        Just("Sarah Chen".to_string()),
        Just("Marcus Webb".to_string()),
        Just("Priya Patel".to_string()),
        Just("Jonas Berg".to_string()),
        Just("Elena Rossi".to_string()),
    ]
}

/// Patches over content fields only; the timestamp is left unset.
fn arb_patch() -> impl Strategy<Value = TaskPatch> {
    (
        proptest::option::of("[a-z]{1,12}"),
        proptest::option::of("[a-z ]{0,24}"),
        proptest::option::of(arb_status()),
        proptest::option::of(arb_priority()),
        proptest::option::of(proptest::option::of(arb_name())),
        proptest::option::of(proptest::collection::btree_set("[a-z]{1,6}", 0..3)),
        proptest::option::of(0u32..8),
    )
        .prop_map(
            |(title, description, status, priority, assignee, tags, order)| TaskPatch {
                title,
                description,
                status,
                priority,
                assignee,
                tags,
                order,
                ..TaskPatch::default()
            },
        )
}

fn arb_task() -> impl Strategy<Value = Task> {
    (arb_status(), arb_priority(), proptest::option::of(arb_name()), 0u64..5_000).prop_map(
        |(status, priority, assignee, ahead_ms)| {
            let mut task = Task::new("original", status, 0).with_priority(priority);
            task.assignee = assignee;
            task.updated_at = now_ms() + ahead_ms;
            task
        },
    )
}

fn without(all: &BTreeSet<TaskField>, remove: &BTreeSet<TaskField>) -> BTreeSet<TaskField> {
    all.difference(remove).copied().collect()
}

// --- Properties ---

proptest! {
    #[test]
    fn merge_external_wins_local_survives(
        original in arb_task(),
        external in arb_patch(),
        local in arb_patch(),
    ) {
        let merged = merge_changes(&original, &external, &local);
        let ext_fields = external.content_fields();
        let local_fields = local.content_fields();
        let all: BTreeSet<TaskField> = TaskField::CONTENT.into_iter().collect();

        prop_assert_eq!(merged.snapshot(ext_fields.iter().copied()), external.clone());

        let local_only = without(&local_fields, &ext_fields);
        prop_assert_eq!(
            merged.snapshot(local_only.iter().copied()),
            original.apply(&local).snapshot(local_only.iter().copied())
        );

        let touched: BTreeSet<TaskField> = ext_fields.union(&local_fields).copied().collect();
        let untouched = without(&all, &touched);
        prop_assert_eq!(
            merged.snapshot(untouched.iter().copied()),
            original.snapshot(untouched.iter().copied())
        );

        prop_assert!(merged.updated_at > original.updated_at);
        prop_assert_eq!(&merged.id, &original.id);
    }

    #[test]
    fn conflict_iff_same_task_and_overlap(external in arb_patch(), local in arb_patch()) {
        let id = TaskId::new();
        let session = EditSession::new(id.clone(), local.clone());
        let overlap = external
            .content_fields()
            .iter()
            .any(|f| local.content_fields().contains(f));

        prop_assert_eq!(detect_conflict(&id, &external, Some(&session)), overlap);
        prop_assert!(!detect_conflict(&TaskId::new(), &external, Some(&session)));
        prop_assert!(!detect_conflict(&id, &external, None));
    }

    #[test]
    fn timestamp_alone_never_conflicts(local in arb_patch()) {
        let id = TaskId::new();
        let session = EditSession::new(id.clone(), local.touched());
        let external = TaskPatch::new().touched();
        prop_assert!(!detect_conflict(&id, &external, Some(&session)));
    }

    #[test]
    fn history_keeps_newest_within_capacity(capacity in 1usize..40, actions in 0usize..100) {
        let mut history = HistoryManager::new(capacity);
        let id = TaskId::new();
        for i in 0..actions {
            history.record_update(
                &id,
                &format!("t{i}"),
                TaskPatch::new().title(format!("t{i}")),
                TaskPatch::new().title(format!("t{}", i + 1)),
                MutationOrigin::User,
            );
        }

        let kept = actions.min(capacity);
        prop_assert_eq!(history.past().len(), kept);
        if kept > 0 {
            let newest = format!("\"t{}\"", actions - 1);
            let oldest = format!("\"t{}\"", actions - kept);
            prop_assert!(history.past().back().unwrap().description.ends_with(&newest));
            prop_assert!(history.past().front().unwrap().description.ends_with(&oldest));
        }
    }

    #[test]
    fn non_user_origins_never_record(
        origin in prop_oneof![
            Just(MutationOrigin::Optimistic),
            Just(MutationOrigin::External),
            Just(MutationOrigin::Replay),
        ],
        actions in 1usize..20,
    ) {
        let mut history = HistoryManager::new(50);
        for _ in 0..actions {
            let task = Task::new("t", TaskStatus::Todo, 0);
            prop_assert!(!history.record_create(&task, origin));
        }
        prop_assert!(!history.can_undo());
    }

    #[test]
    fn undo_then_redo_restores_past(actions in 1usize..30, undos in 0usize..40) {
        let mut history = HistoryManager::new(50);
        for i in 0..actions {
            let task = Task::new(format!("t{i}"), TaskStatus::Todo, 0);
            history.record_create(&task, MutationOrigin::User);
        }
        let before: Vec<_> = history.past().iter().map(|a| a.id.clone()).collect();

        let mut undone = 0;
        for _ in 0..undos {
            if history.undo().is_some() {
                undone += 1;
            }
        }
        prop_assert_eq!(undone, undos.min(actions));
        prop_assert_eq!(history.future().len(), undone);

        for _ in 0..undone {
            prop_assert!(history.redo().is_some());
        }
        prop_assert!(history.redo().is_none());
        let after: Vec<_> = history.past().iter().map(|a| a.id.clone()).collect();
        prop_assert_eq!(before, after);
    }

    #[test]
    fn planner_never_picks_current_value(seed in any::<u64>(), task in arb_task()) {
        let mut planner = ChangePlanner::new(&GeneratorConfig::default(), Some(seed));
        let tasks = [task.clone()];
        for _ in 0..20 {
            let Some(update) = planner.plan(&tasks) else { continue };
            prop_assert_eq!(&update.task_id, &task.id);
            prop_assert_eq!(update.changes.content_fields().len(), 1);
            match update.category {
                UpdateCategory::StatusChange => {
                    prop_assert_ne!(update.changes.status, Some(task.status));
                }
                UpdateCategory::PriorityChange => {
                    prop_assert_ne!(update.changes.priority, Some(task.priority));
                }
                UpdateCategory::AssigneeChange => {
                    prop_assert_ne!(update.changes.assignee.clone(), Some(task.assignee.clone()));
                    prop_assert!(matches!(update.changes.assignee, Some(Some(_))));
                }
            }
        }
    }
}
