//! Shared task data model for `TaskSync` boards.

pub mod task;
