use std::{fmt, str::FromStr};

use serde::{Deserialize, Serialize};
use sqlx::FromRow;
use time::OffsetDateTime;
use uuid::Uuid;

#[derive(
    Debug, Clone, Copy, Default, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize,
    sqlx::Type,
)]
#[serde(rename_all = "kebab-case")]
#[sqlx(type_name = "task_status", rename_all = "kebab-case")]
pub enum TaskStatus {
    #[default]
    Pending,
    InProgress,
    Completed,
}

impl TaskStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            TaskStatus::Pending => "pending",
            TaskStatus::InProgress => "in-progress",
            TaskStatus::Completed => "completed",
        }
    }
}

impl fmt::Display for TaskStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for TaskStatus {
    type Err = ();

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "pending" => Ok(TaskStatus::Pending),
            "in-progress" => Ok(TaskStatus::InProgress),
            "completed" => Ok(TaskStatus::Completed),
            _ => Err(()),
        }
    }
}

#[derive(
    Debug, Clone, Copy, Default, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize,
    sqlx::Type,
)]
#[serde(rename_all = "lowercase")]
#[sqlx(type_name = "task_priority", rename_all = "lowercase")]
pub enum TaskPriority {
    Low,
    #[default]
    Medium,
    High,
}

impl TaskPriority {
    pub fn as_str(&self) -> &'static str {
        match self {
            TaskPriority::Low => "low",
            TaskPriority::Medium => "medium",
            TaskPriority::High => "high",
        }
    }
}

impl fmt::Display for TaskPriority {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for TaskPriority {
    type Err = ();

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "low" => Ok(TaskPriority::Low),
            "medium" => Ok(TaskPriority::Medium),
            "high" => Ok(TaskPriority::High),
            _ => Err(()),
        }
    }
}

/// Task row as stored.
#[derive(Debug, Clone, PartialEq, FromRow)]
pub struct Task {
    pub id: Uuid,
    pub title: String,
    pub description: Option<String>,
    pub status: TaskStatus,
    pub priority: TaskPriority,
    pub category: Option<String>,
    pub due_date: Option<OffsetDateTime>,
    pub completed: bool,
    pub completed_at: Option<OffsetDateTime>,
    pub owner_id: Uuid,
    pub created_at: OffsetDateTime,
    pub updated_at: OffsetDateTime,
}

/// Task joined with the owner's public fields.
#[derive(Debug, Clone, FromRow)]
pub struct TaskRecord {
    #[sqlx(flatten)]
    pub task: Task,
    pub owner_name: String,
    pub owner_email: String,
}

/// Supplied fields of a partial update; `None` keeps the stored value.
/// `due_date: Some(None)` clears the due date.
#[derive(Debug, Clone, Default)]
pub struct TaskPatch {
    pub title: Option<String>,
    pub description: Option<String>,
    pub status: Option<TaskStatus>,
    pub priority: Option<TaskPriority>,
    pub category: Option<String>,
    pub due_date: Option<Option<OffsetDateTime>>,
    pub completed: Option<bool>,
}

/// Insert payload with derived fields already settled.
#[derive(Debug, Clone, PartialEq)]
pub struct NewTask {
    pub title: String,
    pub description: Option<String>,
    pub status: TaskStatus,
    pub priority: TaskPriority,
    pub category: Option<String>,
    pub due_date: Option<OffsetDateTime>,
    pub completed: bool,
    pub completed_at: Option<OffsetDateTime>,
    pub owner_id: Uuid,
}

#[derive(Debug, Clone, Copy, PartialEq)]
struct Completion {
    status: TaskStatus,
    completed: bool,
    completed_at: Option<OffsetDateTime>,
}

impl Completion {
    const FRESH: Completion = Completion {
        status: TaskStatus::Pending,
        completed: false,
        completed_at: None,
    };

    /// Reconciles `status` and `completed` and derives `completed_at` from the
    /// transition of `completed`.
    fn settle(
        self,
        status: Option<TaskStatus>,
        completed: Option<bool>,
        now: OffsetDateTime,
    ) -> Completion {
        let (status, completed) = match (status, completed) {
            (Some(s), Some(c)) => (s, c),
            (Some(s), None) => (s, s == TaskStatus::Completed),
            (None, Some(true)) => (TaskStatus::Completed, true),
            (None, Some(false)) if self.status == TaskStatus::Completed => {
                (TaskStatus::Pending, false)
            }
            (None, Some(false)) => (self.status, false),
            (None, None) => (self.status, self.completed),
        };

        let completed_at = match (self.completed, completed) {
            (_, false) => None,
            (false, true) => Some(now),
            (true, true) => self.completed_at.or(Some(now)),
        };

        Completion {
            status,
            completed,
            completed_at,
        }
    }
}

fn trimmed(value: String) -> String {
    value.trim().to_string()
}

impl NewTask {
    pub fn new(owner_id: Uuid, title: String, patch: TaskPatch, now: OffsetDateTime) -> Self {
        let settled = Completion::FRESH.settle(patch.status, patch.completed, now);
        Self {
            title: trimmed(title),
            description: patch.description.map(trimmed),
            status: settled.status,
            priority: patch.priority.unwrap_or_default(),
            category: patch.category.map(trimmed),
            due_date: patch.due_date.flatten(),
            completed: settled.completed,
            completed_at: settled.completed_at,
            owner_id,
        }
    }
}

impl Task {
    /// Merges the supplied fields; everything else keeps its prior value.
    pub fn apply(&mut self, patch: TaskPatch, now: OffsetDateTime) {
        let current = Completion {
            status: self.status,
            completed: self.completed,
            completed_at: self.completed_at,
        };
        let settled = current.settle(patch.status, patch.completed, now);

        if let Some(title) = patch.title {
            self.title = trimmed(title);
        }
        if let Some(description) = patch.description {
            self.description = Some(trimmed(description));
        }
        if let Some(priority) = patch.priority {
            self.priority = priority;
        }
        if let Some(category) = patch.category {
            self.category = Some(trimmed(category));
        }
        if let Some(due_date) = patch.due_date {
            self.due_date = due_date;
        }
        self.status = settled.status;
        self.completed = settled.completed;
        self.completed_at = settled.completed_at;
        self.updated_at = now;
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, FromRow)]
#[serde(rename_all = "camelCase")]
pub struct PriorityCount {
    pub priority: TaskPriority,
    pub count: i64,
}

#[derive(Debug, Clone, PartialEq, Serialize, FromRow)]
#[serde(rename_all = "camelCase")]
pub struct CategoryCount {
    pub category: String,
    pub count: i64,
}

#[derive(Debug, Clone, PartialEq, Serialize, FromRow)]
#[serde(rename_all = "camelCase")]
pub struct OwnerCount {
    pub user_id: Uuid,
    pub name: String,
    pub email: String,
    pub count: i64,
}

/// Aggregates across every task in the store.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct TaskStats {
    pub total_tasks: i64,
    pub completed_tasks: i64,
    pub pending_tasks: i64,
    pub by_priority: Vec<PriorityCount>,
    pub by_category: Vec<CategoryCount>,
    pub by_user: Vec<OwnerCount>,
}
