//! Simulated backing API for task mutations.
//!
//! [`SimulatedApi`] stands in for a remote service: every call waits a fixed
//! latency and then either echoes its payload back or fails with an
//! [`ApiError`] for the operation's category. Failures are decided up front
//! from a seedable RNG so tests can reproduce a run exactly.

use std::fmt;
use std::future::Future;
use std::time::Duration;

use parking_lot::Mutex;
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use tasksync_proto::task::{Task, TaskId};

/// Default latency of every simulated call.
pub const DEFAULT_LATENCY: Duration = Duration::from_millis(2000);

/// Default probability that a simulated call fails.
pub const DEFAULT_FAILURE_RATE: f64 = 0.1;

/// Kind of remote operation, used to categorize failures.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Operation {
    /// Edit fields of one task.
    Update,
    /// Move a task to another column.
    Move,
    /// Change positions within a column.
    Reorder,
    /// Create a task.
    Create,
    /// Delete a task.
    Delete,
    /// Update several tasks at once.
    Batch,
}

impl fmt::Display for Operation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::Update => "update",
            Self::Move => "move",
            Self::Reorder => "reorder",
            Self::Create => "create",
            Self::Delete => "delete",
            Self::Batch => "batch",
        };
        f.write_str(name)
    }
}

/// A rejected backing call.
///
/// Every variant is recoverable: the optimistic change is rolled back and
/// the user can retry. The display text is the message shown to the user.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ApiError {
    /// Updating a task failed.
    #[error("Failed to update task. Your changes have been reverted.")]
    UpdateFailed,
    /// Moving a task to another column failed.
    #[error("Failed to move task. It has been restored to its original column.")]
    MoveFailed,
    /// Reordering tasks failed.
    #[error("Failed to reorder tasks. The previous order has been restored.")]
    ReorderFailed,
    /// Creating a task failed.
    #[error("Failed to create task. It has been removed from the board.")]
    CreateFailed,
    /// Deleting a task failed.
    #[error("Failed to delete task. It has been restored.")]
    DeleteFailed,
    /// A batch update failed.
    #[error("Failed to update tasks. All changes have been reverted.")]
    BatchFailed,
}

impl ApiError {
    /// The failure for a given operation.
    #[must_use]
    pub const fn for_operation(operation: Operation) -> Self {
        match operation {
            Operation::Update => Self::UpdateFailed,
            Operation::Move => Self::MoveFailed,
            Operation::Reorder => Self::ReorderFailed,
            Operation::Create => Self::CreateFailed,
            Operation::Delete => Self::DeleteFailed,
            Operation::Batch => Self::BatchFailed,
        }
    }

    /// The operation that failed.
    #[must_use]
    pub const fn operation(&self) -> Operation {
        match self {
            Self::UpdateFailed => Operation::Update,
            Self::MoveFailed => Operation::Move,
            Self::ReorderFailed => Operation::Reorder,
            Self::CreateFailed => Operation::Create,
            Self::DeleteFailed => Operation::Delete,
            Self::BatchFailed => Operation::Batch,
        }
    }

    /// Backing-call failures never leave the board in an unrecoverable state.
    #[must_use]
    pub const fn is_recoverable(&self) -> bool {
        true
    }
}

/// Latency and failure settings for [`SimulatedApi`].
#[derive(Debug, Clone, PartialEq)]
pub struct ApiConfig {
    /// How long every call takes to resolve.
    pub latency: Duration,
    /// Probability in `0.0..=1.0` that a call fails.
    pub failure_rate: f64,
}

impl Default for ApiConfig {
    fn default() -> Self {
        Self {
            latency: DEFAULT_LATENCY,
            failure_rate: DEFAULT_FAILURE_RATE,
        }
    }
}

/// Remote confirmation of task mutations.
///
/// Each call eventually echoes the confirmed value or fails with the
/// [`ApiError`] for its category. Implementations include:
/// - [`SimulatedApi`] — fixed latency and random failure, for demos and tests
pub trait TaskApi: Send + Sync {
    /// Confirm a field update.
    fn update_task(&self, task: Task) -> impl Future<Output = Result<Task, ApiError>> + Send;

    /// Confirm a column move or reorder.
    fn move_task(&self, task: Task) -> impl Future<Output = Result<Task, ApiError>> + Send;

    /// Confirm a creation.
    fn create_task(&self, task: Task) -> impl Future<Output = Result<Task, ApiError>> + Send;

    /// Confirm a deletion.
    fn delete_task(&self, id: TaskId) -> impl Future<Output = Result<TaskId, ApiError>> + Send;
}

/// A local stand-in for the remote task service.
pub struct SimulatedApi {
    config: ApiConfig,
    rng: Mutex<StdRng>,
}

impl SimulatedApi {
    /// Creates a simulator seeded from the OS.
    #[must_use]
    pub fn new(config: ApiConfig) -> Self {
        Self::with_rng(config, StdRng::from_os_rng())
    }

    /// Creates a simulator with a fixed seed.
    #[must_use]
    pub fn seeded(config: ApiConfig, seed: u64) -> Self {
        Self::with_rng(config, StdRng::seed_from_u64(seed))
    }

    fn with_rng(mut config: ApiConfig, rng: StdRng) -> Self {
        config.failure_rate = if config.failure_rate.is_finite() {
            config.failure_rate.clamp(0.0, 1.0)
        } else {
            0.0
        };
        Self {
            config,
            rng: Mutex::new(rng),
        }
    }

    /// The active configuration.
    #[must_use]
    pub const fn config(&self) -> &ApiConfig {
        &self.config
    }

    /// Roll the RNG and return true if this call should fail.
    fn should_fail(&self) -> bool {
        if self.config.failure_rate <= 0.0 {
            return false;
        }
        self.rng.lock().random_bool(self.config.failure_rate)
    }

    /// Performs a simulated call that resolves to `payload` after the
    /// configured latency, or fails with the operation's [`ApiError`].
    ///
    /// # Errors
    ///
    /// Returns the [`ApiError`] for `operation` with probability
    /// `failure_rate`.
    pub async fn call<T>(&self, operation: Operation, payload: T) -> Result<T, ApiError> {
        let fail = self.should_fail();
        tokio::time::sleep(self.config.latency).await;
        if fail {
            tracing::debug!(%operation, "simulated call rejected");
            Err(ApiError::for_operation(operation))
        } else {
            tracing::trace!(%operation, "simulated call confirmed");
            Ok(payload)
        }
    }

    /// Confirms a reorder of several tasks.
    ///
    /// # Errors
    ///
    /// Returns [`ApiError::ReorderFailed`] on a simulated failure.
    pub async fn reorder_tasks(&self, tasks: Vec<Task>) -> Result<Vec<Task>, ApiError> {
        self.call(Operation::Reorder, tasks).await
    }

    /// Confirms a batch update.
    ///
    /// # Errors
    ///
    /// Returns [`ApiError::BatchFailed`] on a simulated failure.
    pub async fn batch_update(&self, tasks: Vec<Task>) -> Result<Vec<Task>, ApiError> {
        self.call(Operation::Batch, tasks).await
    }
}

impl TaskApi for SimulatedApi {
    async fn update_task(&self, task: Task) -> Result<Task, ApiError> {
        self.call(Operation::Update, task).await
    }

    async fn move_task(&self, task: Task) -> Result<Task, ApiError> {
        self.call(Operation::Move, task).await
    }

    async fn create_task(&self, task: Task) -> Result<Task, ApiError> {
        self.call(Operation::Create, task).await
    }

    async fn delete_task(&self, id: TaskId) -> Result<TaskId, ApiError> {
        self.call(Operation::Delete, id).await
    }
}
