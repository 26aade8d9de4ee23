//! Task records and partial change sets for `TaskSync` boards.
//!
//! A [`Task`] is always replaced as a whole record: [`Task::apply`] returns a
//! new value instead of mutating the receiver, so readers holding an older
//! clone never observe a half-applied change.

use std::collections::{BTreeMap, BTreeSet};
use std::fmt;
use std::time::{SystemTime, UNIX_EPOCH};

use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Maximum allowed task title length in characters.
pub const MAX_TASK_TITLE_LENGTH: usize = 256;

/// Returns the current wall-clock time in milliseconds since epoch.
#[must_use]
pub fn now_ms() -> u64 {
    u64::try_from(
        SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .unwrap_or_default()
            .as_millis(),
    )
    .unwrap_or(u64::MAX)
}

/// Unique identifier for a task, based on UUID v7 for time-ordering.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct TaskId(Uuid);

impl TaskId {
    /// Creates a new time-ordered task identifier (UUID v7).
    #[must_use]
    pub fn new() -> Self {
        Self(Uuid::now_v7())
    }

    /// Creates a `TaskId` from an existing UUID.
    #[must_use]
    pub const fn from_uuid(uuid: Uuid) -> Self {
        Self(uuid)
    }

    /// Returns the inner UUID value.
    #[must_use]
    pub const fn as_uuid(&self) -> &Uuid {
        &self.0
    }
}

impl Default for TaskId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for TaskId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Board column a task lives in.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum TaskStatus {
    /// Not started.
    Todo,
    /// Actively being worked on.
    InProgress,
    /// Finished.
    Done,
}

impl TaskStatus {
    /// Every status, in column order.
    pub const ALL: [Self; 3] = [Self::Todo, Self::InProgress, Self::Done];

    /// Human-readable column name.
    #[must_use]
    pub const fn label(self) -> &'static str {
        match self {
            Self::Todo => "To Do",
            Self::InProgress => "In Progress",
            Self::Done => "Done",
        }
    }
}

impl fmt::Display for TaskStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Todo => write!(f, "todo"),
            Self::InProgress => write!(f, "in_progress"),
            Self::Done => write!(f, "done"),
        }
    }
}

/// Task priority.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum TaskPriority {
    /// Can wait.
    Low,
    /// Default priority.
    Medium,
    /// Needs attention first.
    High,
}

impl TaskPriority {
    /// Every priority, lowest first.
    pub const ALL: [Self; 3] = [Self::Low, Self::Medium, Self::High];

    /// Human-readable priority name.
    #[must_use]
    pub const fn label(self) -> &'static str {
        match self {
            Self::Low => "Low",
            Self::Medium => "Medium",
            Self::High => "High",
        }
    }
}

impl fmt::Display for TaskPriority {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Low => write!(f, "low"),
            Self::Medium => write!(f, "medium"),
            Self::High => write!(f, "high"),
        }
    }
}

/// Names of the mutable task fields a [`TaskPatch`] can carry.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TaskField {
    /// [`Task::title`].
    Title,
    /// [`Task::description`].
    Description,
    /// [`Task::status`].
    Status,
    /// [`Task::priority`].
    Priority,
    /// [`Task::assignee`].
    Assignee,
    /// [`Task::tags`].
    Tags,
    /// [`Task::order`].
    Order,
    /// [`Task::updated_at`]. Touched by every change, so conflict
    /// detection never counts it as an overlap.
    UpdatedAt,
}

impl TaskField {
    /// Every field that carries user-visible content (excludes the timestamp).
    pub const CONTENT: [Self; 7] = [
        Self::Title,
        Self::Description,
        Self::Status,
        Self::Priority,
        Self::Assignee,
        Self::Tags,
        Self::Order,
    ];

    /// Whether this is the refreshed-timestamp field.
    #[must_use]
    pub const fn is_timestamp(self) -> bool {
        matches!(self, Self::UpdatedAt)
    }
}

impl fmt::Display for TaskField {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::Title => "title",
            Self::Description => "description",
            Self::Status => "status",
            Self::Priority => "priority",
            Self::Assignee => "assignee",
            Self::Tags => "tags",
            Self::Order => "order",
            Self::UpdatedAt => "updated_at",
        };
        f.write_str(name)
    }
}

/// A task on the board.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Task {
    /// Unique task identifier (UUID v7, time-ordered).
    pub id: TaskId,
    /// Short title shown on the card.
    pub title: String,
    /// Free-form description.
    pub description: String,
    /// Column the task lives in.
    pub status: TaskStatus,
    /// Task priority.
    pub priority: TaskPriority,
    /// Actor the task is assigned to, if any.
    pub assignee: Option<String>,
    /// Free-form labels.
    pub tags: BTreeSet<String>,
    /// Position within the status column. Columns are ordered independently.
    pub order: u32,
    /// When the task was created (milliseconds since epoch).
    pub created_at: u64,
    /// When the task was last changed (milliseconds since epoch).
    pub updated_at: u64,
}

impl Task {
    /// Creates a task with medium priority, no assignee and no tags.
    #[must_use]
    pub fn new(title: impl Into<String>, status: TaskStatus, order: u32) -> Self {
        let now = now_ms();
        Self {
            id: TaskId::new(),
            title: title.into(),
            description: String::new(),
            status,
            priority: TaskPriority::Medium,
            assignee: None,
            tags: BTreeSet::new(),
            order,
            created_at: now,
            updated_at: now,
        }
    }

    /// Sets the description.
    #[must_use]
    pub fn with_description(mut self, description: impl Into<String>) -> Self {
        self.description = description.into();
        self
    }

    /// Sets the priority.
    #[must_use]
    pub const fn with_priority(mut self, priority: TaskPriority) -> Self {
        self.priority = priority;
        self
    }

    /// Sets the assignee.
    #[must_use]
    pub fn with_assignee(mut self, assignee: impl Into<String>) -> Self {
        self.assignee = Some(assignee.into());
        self
    }

    /// Adds a tag.
    #[must_use]
    pub fn with_tag(mut self, tag: impl Into<String>) -> Self {
        self.tags.insert(tag.into());
        self
    }

    /// Returns a new record with every field present in `patch` replaced.
    ///
    /// The receiver is left untouched. Fields absent from the patch keep
    /// their current value, including `updated_at`.
    #[must_use]
    pub fn apply(&self, patch: &TaskPatch) -> Self {
        let mut next = self.clone();
        if let Some(title) = &patch.title {
            next.title.clone_from(title);
        }
        if let Some(description) = &patch.description {
            next.description.clone_from(description);
        }
        if let Some(status) = patch.status {
            next.status = status;
        }
        if let Some(priority) = patch.priority {
            next.priority = priority;
        }
        if let Some(assignee) = &patch.assignee {
            next.assignee.clone_from(assignee);
        }
        if let Some(tags) = &patch.tags {
            next.tags.clone_from(tags);
        }
        if let Some(order) = patch.order {
            next.order = order;
        }
        if let Some(updated_at) = patch.updated_at {
            next.updated_at = updated_at;
        }
        next
    }

    /// Captures the current value of each named field as a patch.
    ///
    /// Applying the snapshot later restores those fields to today's values,
    /// which is how reverse changes for undo and rollback are built.
    #[must_use]
    pub fn snapshot<I>(&self, fields: I) -> TaskPatch
    where
        I: IntoIterator<Item = TaskField>,
    {
        let mut patch = TaskPatch::default();
        for field in fields {
            match field {
                TaskField::Title => patch.title = Some(self.title.clone()),
                TaskField::Description => patch.description = Some(self.description.clone()),
                TaskField::Status => patch.status = Some(self.status),
                TaskField::Priority => patch.priority = Some(self.priority),
                TaskField::Assignee => patch.assignee = Some(self.assignee.clone()),
                TaskField::Tags => patch.tags = Some(self.tags.clone()),
                TaskField::Order => patch.order = Some(self.order),
                TaskField::UpdatedAt => patch.updated_at = Some(self.updated_at),
            }
        }
        patch
    }

    /// Content fields of `patch` whose value this task currently holds.
    ///
    /// A field someone else has overwritten since `patch` was applied is
    /// left out.
    #[must_use]
    pub fn fields_matching(&self, patch: &TaskPatch) -> BTreeSet<TaskField> {
        patch
            .content_fields()
            .into_iter()
            .filter(|field| match field {
                TaskField::Title => patch.title.as_ref() == Some(&self.title),
                TaskField::Description => patch.description.as_ref() == Some(&self.description),
                TaskField::Status => patch.status == Some(self.status),
                TaskField::Priority => patch.priority == Some(self.priority),
                TaskField::Assignee => patch.assignee.as_ref() == Some(&self.assignee),
                TaskField::Tags => patch.tags.as_ref() == Some(&self.tags),
                TaskField::Order => patch.order == Some(self.order),
                TaskField::UpdatedAt => false,
            })
            .collect()
    }
}

/// A partial change set for a single task.
///
/// Every field is optional; only present fields are written by
/// [`Task::apply`]. `assignee` is doubly optional so that clearing the
/// assignee (`Some(None)`) is distinguishable from leaving it alone (`None`).
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct TaskPatch {
    /// New title.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub title: Option<String>,
    /// New description.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    /// New column.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub status: Option<TaskStatus>,
    /// New priority.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub priority: Option<TaskPriority>,
    /// New assignee (`Some(None)` clears it).
    #[serde(skip_serializing_if = "Option::is_none")]
    pub assignee: Option<Option<String>>,
    /// Replacement tag set.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub tags: Option<BTreeSet<String>>,
    /// New position within the column.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub order: Option<u32>,
    /// Refreshed update timestamp.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub updated_at: Option<u64>,
}

impl TaskPatch {
    /// An empty patch.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Sets the title.
    #[must_use]
    pub fn title(mut self, title: impl Into<String>) -> Self {
        self.title = Some(title.into());
        self
    }

    /// Sets the description.
    #[must_use]
    pub fn description(mut self, description: impl Into<String>) -> Self {
        self.description = Some(description.into());
        self
    }

    /// Sets the status.
    #[must_use]
    pub const fn status(mut self, status: TaskStatus) -> Self {
        self.status = Some(status);
        self
    }

    /// Sets the priority.
    #[must_use]
    pub const fn priority(mut self, priority: TaskPriority) -> Self {
        self.priority = Some(priority);
        self
    }

    /// Sets (or clears, with `None`) the assignee.
    #[must_use]
    pub fn assignee(mut self, assignee: Option<String>) -> Self {
        self.assignee = Some(assignee);
        self
    }

    /// Replaces the tag set.
    #[must_use]
    pub fn tags<I, T>(mut self, tags: I) -> Self
    where
        I: IntoIterator<Item = T>,
        T: Into<String>,
    {
        self.tags = Some(tags.into_iter().map(Into::into).collect());
        self
    }

    /// Sets the column position.
    #[must_use]
    pub const fn order(mut self, order: u32) -> Self {
        self.order = Some(order);
        self
    }

    /// Sets the update timestamp.
    #[must_use]
    pub const fn updated_at(mut self, updated_at: u64) -> Self {
        self.updated_at = Some(updated_at);
        self
    }

    /// Sets the update timestamp to now.
    #[must_use]
    pub fn touched(self) -> Self {
        self.updated_at(now_ms())
    }

    /// The set of fields this patch writes.
    #[must_use]
    pub fn field_names(&self) -> BTreeSet<TaskField> {
        let mut fields = BTreeSet::new();
        if self.title.is_some() {
            fields.insert(TaskField::Title);
        }
        if self.description.is_some() {
            fields.insert(TaskField::Description);
        }
        if self.status.is_some() {
            fields.insert(TaskField::Status);
        }
        if self.priority.is_some() {
            fields.insert(TaskField::Priority);
        }
        if self.assignee.is_some() {
            fields.insert(TaskField::Assignee);
        }
        if self.tags.is_some() {
            fields.insert(TaskField::Tags);
        }
        if self.order.is_some() {
            fields.insert(TaskField::Order);
        }
        if self.updated_at.is_some() {
            fields.insert(TaskField::UpdatedAt);
        }
        fields
    }

    /// Fields this patch writes, excluding the update timestamp.
    #[must_use]
    pub fn content_fields(&self) -> BTreeSet<TaskField> {
        self.field_names()
            .into_iter()
            .filter(|field| !field.is_timestamp())
            .collect()
    }

    /// Whether the patch writes nothing at all.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.field_names().is_empty()
    }

    /// Overlays every field present in `other` onto `self`.
    pub fn merge_from(&mut self, other: &Self) {
        if other.title.is_some() {
            self.title.clone_from(&other.title);
        }
        if other.description.is_some() {
            self.description.clone_from(&other.description);
        }
        if other.status.is_some() {
            self.status = other.status;
        }
        if other.priority.is_some() {
            self.priority = other.priority;
        }
        if other.assignee.is_some() {
            self.assignee.clone_from(&other.assignee);
        }
        if other.tags.is_some() {
            self.tags.clone_from(&other.tags);
        }
        if other.order.is_some() {
            self.order = other.order;
        }
        if other.updated_at.is_some() {
            self.updated_at = other.updated_at;
        }
    }
}

/// Validates a task title.
///
/// # Errors
///
/// Returns [`TitleError::Empty`] for an empty title and
/// [`TitleError::TooLong`] when it exceeds [`MAX_TASK_TITLE_LENGTH`] characters.
pub fn validate_title(title: &str) -> Result<(), TitleError> {
    if title.is_empty() {
        return Err(TitleError::Empty);
    }
    if title.chars().count() > MAX_TASK_TITLE_LENGTH {
        return Err(TitleError::TooLong);
    }
    Ok(())
}

/// Reasons a task title is rejected.
#[derive(Debug, Clone, Copy, PartialEq, Eq, thiserror::Error)]
pub enum TitleError {
    /// Title is empty.
    #[error("task title cannot be empty")]
    Empty,
    /// Title exceeds [`MAX_TASK_TITLE_LENGTH`] characters.
    #[error("task title too long (max 256 characters)")]
    TooLong,
}

/// Renumbers every status column to contiguous `0..n` positions.
///
/// Tasks are ranked within their column by `(order, created_at, id)`, so
/// duplicates and gaps collapse deterministically. Returns replacement
/// records for the tasks whose `order` actually changed; untouched tasks
/// are not included.
#[must_use]
pub fn normalize_column_order(tasks: &[Task]) -> Vec<Task> {
    let mut columns: BTreeMap<TaskStatus, Vec<&Task>> = BTreeMap::new();
    for task in tasks {
        columns.entry(task.status).or_default().push(task);
    }

    let mut changed = Vec::new();
    for column in columns.values_mut() {
        column.sort_by(|a, b| {
            (a.order, a.created_at, &a.id).cmp(&(b.order, b.created_at, &b.id))
        });
        for (position, task) in column.iter().enumerate() {
            let position = u32::try_from(position).unwrap_or(u32::MAX);
            if task.order != position {
                let mut fixed = (*task).clone();
                fixed.order = position;
                changed.push(fixed);
            }
        }
    }
    changed
}
