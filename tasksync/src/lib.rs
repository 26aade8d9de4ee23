//! `tasksync` — optimistic task board synchronization engine.
//!
//! Keeps a local task list consistent while user edits are applied ahead
//! of confirmation, a simulated remote actor changes tasks on its own
//! timer, and an unreliable backing call confirms or rejects each edit.

pub mod api;
pub mod config;
pub mod generator;
pub mod history;
pub mod notify;
pub mod optimistic;
pub mod sync;
pub mod tasks;
