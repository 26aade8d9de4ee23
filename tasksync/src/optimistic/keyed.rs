//! Per-item optimistic slots.
//!
//! Same contract as [`OptimisticCoordinator`](super::OptimisticCoordinator),
//! but every key has its own slot, so calls for different items never
//! supersede each other. Sequence numbers come from one shared counter and
//! a key's entry is dropped once its newest call settles, so finished items
//! cost nothing and a stale call can never match a recycled number.

use std::collections::{HashMap, HashSet};
use std::fmt::Debug;
use std::future::Future;
use std::hash::Hash;

use parking_lot::Mutex;

use crate::api::ApiError;

use super::ExecuteHooks;

#[derive(Debug)]
struct KeyedState<K> {
    next_sequence: u64,
    current: HashMap<K, u64>,
    loading: HashSet<K>,
    errors: HashMap<K, ApiError>,
}

impl<K> Default for KeyedState<K> {
    fn default() -> Self {
        Self {
            next_sequence: 0,
            current: HashMap::new(),
            loading: HashSet::new(),
            errors: HashMap::new(),
        }
    }
}

/// Coordinates optimistic calls with one independent slot per key.
#[derive(Debug)]
pub struct KeyedCoordinator<K> {
    state: Mutex<KeyedState<K>>,
}

impl<K> Default for KeyedCoordinator<K> {
    fn default() -> Self {
        Self {
            state: Mutex::new(KeyedState::default()),
        }
    }
}

impl<K> KeyedCoordinator<K>
where
    K: Clone + Eq + Hash + Debug,
{
    /// Creates a coordinator with no slots in flight.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Runs `operation` as the newest call for `key`.
    ///
    /// Returns the confirmed value, or `None` if the call failed or a newer
    /// call for the same key superseded it.
    pub async fn execute<T, F>(&self, key: K, operation: F, hooks: ExecuteHooks<'_, T>) -> Option<T>
    where
        F: Future<Output = Result<T, ApiError>>,
    {
        let sequence = self.begin(&key);

        match operation.await {
            Ok(value) => {
                if !self.finish(&key, sequence, None) {
                    tracing::debug!(?key, sequence, "discarding stale success");
                    return None;
                }
                hooks.succeed(&value);
                Some(value)
            }
            Err(error) => {
                if !self.finish(&key, sequence, Some(error.clone())) {
                    tracing::debug!(?key, sequence, %error, "discarding stale failure");
                    return None;
                }
                tracing::warn!(?key, sequence, %error, "optimistic call rejected, rolling back");
                hooks.fail(&error);
                None
            }
        }
    }

    /// Whether a call for `key` is pending.
    #[must_use]
    pub fn is_loading(&self, key: &K) -> bool {
        self.state.lock().loading.contains(key)
    }

    /// Keys with a pending call.
    #[must_use]
    pub fn loading_ids(&self) -> HashSet<K> {
        self.state.lock().loading.clone()
    }

    /// Failure of the newest resolved call for `key`, if it failed.
    #[must_use]
    pub fn error(&self, key: &K) -> Option<ApiError> {
        self.state.lock().errors.get(key).cloned()
    }

    /// Every key whose newest call failed.
    #[must_use]
    pub fn errors(&self) -> HashMap<K, ApiError> {
        self.state.lock().errors.clone()
    }

    /// Clears `key`'s state and detaches its in-flight call.
    pub fn reset(&self, key: &K) {
        let mut state = self.state.lock();
        state.current.remove(key);
        state.loading.remove(key);
        state.errors.remove(key);
    }

    /// Clears every slot and detaches every in-flight call.
    pub fn reset_all(&self) {
        let mut state = self.state.lock();
        state.current.clear();
        state.loading.clear();
        state.errors.clear();
    }

    fn begin(&self, key: &K) -> u64 {
        let mut state = self.state.lock();
        state.next_sequence += 1;
        let sequence = state.next_sequence;
        state.current.insert(key.clone(), sequence);
        state.loading.insert(key.clone());
        state.errors.remove(key);
        sequence
    }

    /// Returns `false` (and changes nothing) if `sequence` is stale for `key`.
    fn finish(&self, key: &K, sequence: u64, error: Option<ApiError>) -> bool {
        let mut state = self.state.lock();
        if state.current.get(key) != Some(&sequence) {
            return false;
        }
        state.current.remove(key);
        state.loading.remove(key);
        match error {
            Some(error) => {
                state.errors.insert(key.clone(), error);
            }
            None => {
                state.errors.remove(key);
            }
        }
        true
    }
}
