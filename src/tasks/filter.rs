use std::str::FromStr;

use time::OffsetDateTime;
use uuid::Uuid;

use crate::tasks::repo_types::{TaskPriority, TaskStatus};

/// Column a task listing is ordered by.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum SortField {
    #[default]
    CreatedAt,
    UpdatedAt,
    DueDate,
    CompletedAt,
    Title,
    Status,
    Priority,
    Category,
}

impl SortField {
    pub const NAMES: &'static str =
        "createdAt, updatedAt, dueDate, completedAt, title, status, priority, category";

    pub fn column(&self) -> &'static str {
        match self {
            SortField::CreatedAt => "t.created_at",
            SortField::UpdatedAt => "t.updated_at",
            SortField::DueDate => "t.due_date",
            SortField::CompletedAt => "t.completed_at",
            SortField::Title => "t.title",
            SortField::Status => "t.status",
            SortField::Priority => "t.priority",
            SortField::Category => "t.category",
        }
    }
}

impl FromStr for SortField {
    type Err = ();

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "createdAt" => Ok(SortField::CreatedAt),
            "updatedAt" => Ok(SortField::UpdatedAt),
            "dueDate" => Ok(SortField::DueDate),
            "completedAt" => Ok(SortField::CompletedAt),
            "title" => Ok(SortField::Title),
            "status" => Ok(SortField::Status),
            "priority" => Ok(SortField::Priority),
            "category" => Ok(SortField::Category),
            _ => Err(()),
        }
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum SortOrder {
    Asc,
    #[default]
    Desc,
}

impl SortOrder {
    /// Only the literal `asc` sorts ascending.
    pub fn from_param(raw: &str) -> Self {
        if raw == "asc" {
            SortOrder::Asc
        } else {
            SortOrder::Desc
        }
    }

    pub fn keyword(&self) -> &'static str {
        match self {
            SortOrder::Asc => "ASC",
            SortOrder::Desc => "DESC",
        }
    }
}

/// Conditions for a task listing. Every `Some` narrows the result.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct TaskFilter {
    /// Set for non-admin callers: only their own tasks.
    pub owner: Option<Uuid>,
    pub status: Option<TaskStatus>,
    pub priority: Option<TaskPriority>,
    pub category: Option<String>,
    pub completed: Option<bool>,
    /// Inclusive upper bound on the due date.
    pub due_before: Option<OffsetDateTime>,
    /// Inclusive lower bound on the due date.
    pub due_after: Option<OffsetDateTime>,
    /// Case-insensitive substring of title or description.
    pub search: Option<String>,
    pub sort: SortField,
    pub order: SortOrder,
}

/// `%`, `_` and `\` are matched literally in a LIKE pattern.
pub fn like_pattern(search: &str) -> String {
    let mut escaped = String::with_capacity(search.len() + 2);
    escaped.push('%');
    for c in search.chars() {
        if matches!(c, '%' | '_' | '\\') {
            escaped.push('\\');
        }
        escaped.push(c);
    }
    escaped.push('%');
    escaped
}
