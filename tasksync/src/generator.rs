//! Simulated external actor.
//!
//! At random intervals the generator picks a task from the latest list and
//! produces a small, non-destructive change to it (new status, priority or
//! assignee) attributed to a synthetic actor. Choices come from a seedable
//! RNG, so a run is reproducible from its seed, and all waiting uses tokio
//! timers so tests can drive it with a paused clock.

use std::fmt;
use std::time::Duration;

use rand::rngs::StdRng;
use rand::seq::IndexedRandom;
use rand::{Rng, SeedableRng};
use serde::{Deserialize, Serialize};
use tasksync_proto::task::{Task, TaskId, TaskPatch, TaskPriority, TaskStatus};
use tokio::task::JoinHandle;

/// Default lower bound of the delay between firings.
pub const DEFAULT_MIN_INTERVAL: Duration = Duration::from_secs(15);

/// Default upper bound of the delay between firings.
pub const DEFAULT_MAX_INTERVAL: Duration = Duration::from_secs(20);

/// Default pool of synthetic actor names.
pub const DEFAULT_ACTORS: [&str; 5] = [
    "Sarah Chen",
    "Marcus Webb",
    "Priya Patel",
    "Jonas Berg",
    "Elena Rossi",
];

/// Timing and identity settings for the generator.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GeneratorConfig {
    /// Shortest delay between firings.
    pub min_interval: Duration,
    /// Longest delay between firings.
    pub max_interval: Duration,
    /// Names used both as actor identities and as assignee candidates.
    pub actors: Vec<String>,
}

impl Default for GeneratorConfig {
    fn default() -> Self {
        Self {
            min_interval: DEFAULT_MIN_INTERVAL,
            max_interval: DEFAULT_MAX_INTERVAL,
            actors: DEFAULT_ACTORS.iter().map(ToString::to_string).collect(),
        }
    }
}

/// Which field group an external update touches.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum UpdateCategory {
    /// The task moves to another column.
    StatusChange,
    /// The task's priority changes.
    PriorityChange,
    /// The task is handed to someone else.
    AssigneeChange,
}

impl UpdateCategory {
    /// Every category, in declaration order.
    pub const ALL: [Self; 3] = [
        Self::StatusChange,
        Self::PriorityChange,
        Self::AssigneeChange,
    ];
}

impl fmt::Display for UpdateCategory {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::StatusChange => "status_change",
            Self::PriorityChange => "priority_change",
            Self::AssigneeChange => "assignee_change",
        };
        f.write_str(name)
    }
}

/// One change made by the external actor.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ExternalUpdate {
    /// Target task.
    pub task_id: TaskId,
    /// Exactly one field group plus a refreshed `updated_at`.
    pub changes: TaskPatch,
    /// Who made the change.
    pub actor: String,
    /// Which field group changed.
    pub category: UpdateCategory,
}

/// Draws delays and changes from a seedable RNG.
#[derive(Debug)]
pub struct ChangePlanner {
    rng: StdRng,
    min_ms: u64,
    max_ms: u64,
    actors: Vec<String>,
}

impl ChangePlanner {
    /// Creates a planner. `None` seeds from the OS.
    #[must_use]
    pub fn new(config: &GeneratorConfig, seed: Option<u64>) -> Self {
        let rng = seed.map_or_else(StdRng::from_os_rng, StdRng::seed_from_u64);
        let min_ms = duration_ms(config.min_interval);
        let max_ms = duration_ms(config.max_interval);
        Self {
            rng,
            min_ms: min_ms.min(max_ms),
            max_ms: max_ms.max(min_ms),
            actors: config.actors.clone(),
        }
    }

    /// Delay before the next firing, uniform over the configured window.
    pub fn next_delay(&mut self) -> Duration {
        Duration::from_millis(self.rng.random_range(self.min_ms..=self.max_ms))
    }

    /// Picks a task and a change for it.
    ///
    /// Returns `None` when there is nothing to change: no tasks, no actors,
    /// or no assignee left to pick once the current one is excluded.
    pub fn plan(&mut self, tasks: &[Task]) -> Option<ExternalUpdate> {
        let task = tasks.choose(&mut self.rng)?;
        let category = *UpdateCategory::ALL.choose(&mut self.rng)?;
        let actor = self.actors.choose(&mut self.rng)?.clone();

        let changes = match category {
            UpdateCategory::StatusChange => {
                let options: Vec<TaskStatus> = TaskStatus::ALL
                    .into_iter()
                    .filter(|status| *status != task.status)
                    .collect();
                TaskPatch::new().status(*options.choose(&mut self.rng)?)
            }
            UpdateCategory::PriorityChange => {
                let options: Vec<TaskPriority> = TaskPriority::ALL
                    .into_iter()
                    .filter(|priority| *priority != task.priority)
                    .collect();
                TaskPatch::new().priority(*options.choose(&mut self.rng)?)
            }
            UpdateCategory::AssigneeChange => {
                let options: Vec<&String> = self
                    .actors
                    .iter()
                    .filter(|name| task.assignee.as_ref() != Some(*name))
                    .collect();
                let assignee = (*options.choose(&mut self.rng)?).clone();
                TaskPatch::new().assignee(Some(assignee))
            }
        };

        Some(ExternalUpdate {
            task_id: task.id.clone(),
            changes: changes.touched(),
            actor,
            category,
        })
    }
}

fn duration_ms(duration: Duration) -> u64 {
    u64::try_from(duration.as_millis()).unwrap_or(u64::MAX)
}

/// Owns the background loop that fires external updates.
///
/// At most one loop runs per generator. Dropping the generator stops it.
#[derive(Debug)]
pub struct ExternalChangeGenerator {
    config: GeneratorConfig,
    seed: Option<u64>,
    handle: Option<JoinHandle<()>>,
}

impl ExternalChangeGenerator {
    /// Creates an idle generator. `seed` fixes the RNG for reproducible runs.
    #[must_use]
    pub const fn new(config: GeneratorConfig, seed: Option<u64>) -> Self {
        Self {
            config,
            seed,
            handle: None,
        }
    }

    /// The active configuration.
    #[must_use]
    pub const fn config(&self) -> &GeneratorConfig {
        &self.config
    }

    /// Starts the firing loop on the current tokio runtime.
    ///
    /// Each firing reads the task list through `list_tasks`, so it always
    /// sees the latest state, and hands the planned change to `on_update`.
    /// Calling this while the loop is running does nothing.
    pub fn start<L, U>(&mut self, list_tasks: L, on_update: U)
    where
        L: Fn() -> Vec<Task> + Send + 'static,
        U: Fn(ExternalUpdate) + Send + 'static,
    {
        if self.is_active() {
            tracing::warn!("external change generator already running, ignoring start");
            return;
        }
        let mut planner = ChangePlanner::new(&self.config, self.seed);
        tracing::info!(
            min_ms = planner.min_ms,
            max_ms = planner.max_ms,
            seeded = self.seed.is_some(),
            "external change generator started"
        );

        self.handle = Some(tokio::spawn(async move {
            loop {
                let delay = planner.next_delay();
                tokio::time::sleep(delay).await;

                let tasks = list_tasks();
                match planner.plan(&tasks) {
                    Some(update) => {
                        tracing::debug!(
                            task_id = %update.task_id,
                            actor = %update.actor,
                            category = %update.category,
                            "external change fired"
                        );
                        on_update(update);
                    }
                    None => tracing::trace!(tasks = tasks.len(), "no external change this round"),
                }
            }
        }));
    }

    /// Cancels the pending firing and stops the loop. Safe to call repeatedly.
    pub fn stop(&mut self) {
        if let Some(handle) = self.handle.take() {
            handle.abort();
            tracing::info!("external change generator stopped");
        }
    }

    /// Whether the loop is armed.
    #[must_use]
    pub fn is_active(&self) -> bool {
        self.handle.as_ref().is_some_and(|handle| !handle.is_finished())
    }
}

impl Drop for ExternalChangeGenerator {
    fn drop(&mut self) {
        self.stop();
    }
}
