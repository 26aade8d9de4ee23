//! Task storage, conflict resolution, and the user mutation path.
//!
//! The [`TaskStore`] holds the current records. The [`TaskBoard`] is the
//! only place user-initiated mutations enter, so it is also where history
//! recording and optimistic rollback are wired in. Remote changes go through
//! [`conflict`] before reaching the store.

pub mod board;
pub mod conflict;
pub mod store;

pub use board::TaskBoard;
pub use conflict::{EditSession, detect_conflict, merge_changes, overlapping_fields};
pub use store::{InMemoryTaskStore, TaskMap, TaskStore};

use tasksync_proto::task::TitleError;
use thiserror::Error;

/// Errors that can occur during task operations.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum TaskError {
    /// Task title cannot be empty.
    #[error("task title cannot be empty")]
    TitleEmpty,
    /// Task title exceeds the maximum length.
    #[error("task title too long (max 256 characters)")]
    TitleTooLong,
    /// Task with the given ID was not found.
    #[error("task not found: {0}")]
    TaskNotFound(String),
}

impl From<TitleError> for TaskError {
    fn from(err: TitleError) -> Self {
        match err {
            TitleError::Empty => Self::TitleEmpty,
            TitleError::TooLong => Self::TitleTooLong,
        }
    }
}
