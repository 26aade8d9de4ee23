//! Race-safe execution of optimistic remote calls.
//!
//! The caller applies a change locally, then hands the confirming remote
//! call to a coordinator. Each call is tagged with the next sequence number
//! for its slot; when it resolves, it may touch shared state only if it
//! still holds the slot's newest number. Older resolutions are dropped
//! silently, whether they arrive before or after the newer one.
//!
//! - [`OptimisticCoordinator`] guards a single slot (e.g. "the task list
//!   sync call").
//! - [`KeyedCoordinator`] guards one slot per item ID, for many items in
//!   flight at once (several cards mid-drag).
//!
//! Failures never propagate past the coordinator: they are stored as the
//! slot's error and routed through the rollback and error hooks, in that
//! order. Nothing is retried automatically.

pub mod keyed;

pub use keyed::KeyedCoordinator;

use std::future::Future;

use parking_lot::Mutex;

use crate::api::ApiError;

type SuccessHook<'a, T> = Box<dyn FnOnce(&T) + Send + 'a>;
type ErrorHook<'a> = Box<dyn FnOnce(&ApiError) + Send + 'a>;
type RollbackHook<'a> = Box<dyn FnOnce() + Send + 'a>;

/// Side effects fired when the current call for a slot resolves.
///
/// None of them fire for a stale resolution.
pub struct ExecuteHooks<'a, T> {
    on_success: Option<SuccessHook<'a, T>>,
    on_error: Option<ErrorHook<'a>>,
    on_rollback: Option<RollbackHook<'a>>,
}

impl<T> Default for ExecuteHooks<'_, T> {
    fn default() -> Self {
        Self {
            on_success: None,
            on_error: None,
            on_rollback: None,
        }
    }
}

impl<'a, T> ExecuteHooks<'a, T> {
    /// No hooks.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Runs with the confirmed value.
    #[must_use]
    pub fn on_success(mut self, hook: impl FnOnce(&T) + Send + 'a) -> Self {
        self.on_success = Some(Box::new(hook));
        self
    }

    /// Runs with the failure, after the rollback hook.
    #[must_use]
    pub fn on_error(mut self, hook: impl FnOnce(&ApiError) + Send + 'a) -> Self {
        self.on_error = Some(Box::new(hook));
        self
    }

    /// Restores the pre-change state when the call fails.
    #[must_use]
    pub fn on_rollback(mut self, hook: impl FnOnce() + Send + 'a) -> Self {
        self.on_rollback = Some(Box::new(hook));
        self
    }

    pub(crate) fn succeed(self, value: &T) {
        if let Some(hook) = self.on_success {
            hook(value);
        }
    }

    pub(crate) fn fail(self, error: &ApiError) {
        if let Some(rollback) = self.on_rollback {
            rollback();
        }
        if let Some(hook) = self.on_error {
            hook(error);
        }
    }
}

#[derive(Debug, Default)]
struct SlotState {
    sequence: u64,
    loading: bool,
    error: Option<ApiError>,
}

/// Coordinates optimistic calls on a single logical slot.
#[derive(Debug, Default)]
pub struct OptimisticCoordinator {
    state: Mutex<SlotState>,
}

impl OptimisticCoordinator {
    /// Creates an idle coordinator.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Runs `operation` as the newest call on this slot.
    ///
    /// Returns the confirmed value, or `None` if the call failed or was
    /// superseded before it resolved.
    pub async fn execute<T, F>(&self, operation: F, hooks: ExecuteHooks<'_, T>) -> Option<T>
    where
        F: Future<Output = Result<T, ApiError>>,
    {
        let sequence = self.begin();

        match operation.await {
            Ok(value) => {
                if !self.finish(sequence, None) {
                    tracing::debug!(sequence, "discarding stale success");
                    return None;
                }
                hooks.succeed(&value);
                Some(value)
            }
            Err(error) => {
                if !self.finish(sequence, Some(error.clone())) {
                    tracing::debug!(sequence, %error, "discarding stale failure");
                    return None;
                }
                tracing::warn!(sequence, %error, "optimistic call rejected, rolling back");
                hooks.fail(&error);
                None
            }
        }
    }

    /// Clears loading and error state and detaches any in-flight call.
    ///
    /// The in-flight call still resolves, but its sequence number is now
    /// stale so its result is ignored.
    pub fn reset(&self) {
        let mut state = self.state.lock();
        state.sequence += 1;
        state.loading = false;
        state.error = None;
    }

    /// Whether the newest call is still pending.
    #[must_use]
    pub fn is_loading(&self) -> bool {
        self.state.lock().loading
    }

    /// Failure of the newest resolved call, if it failed.
    #[must_use]
    pub fn error(&self) -> Option<ApiError> {
        self.state.lock().error.clone()
    }

    /// The newest issued sequence number.
    #[must_use]
    pub fn current_sequence(&self) -> u64 {
        self.state.lock().sequence
    }

    fn begin(&self) -> u64 {
        let mut state = self.state.lock();
        state.sequence += 1;
        state.loading = true;
        state.error = None;
        state.sequence
    }

    /// Returns `false` (and changes nothing) if `sequence` is stale.
    fn finish(&self, sequence: u64, error: Option<ApiError>) -> bool {
        let mut state = self.state.lock();
        if state.sequence != sequence {
            return false;
        }
        state.loading = false;
        state.error = error;
        true
    }
}
