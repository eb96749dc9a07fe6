use serde::{Deserialize, Serialize};
use time::OffsetDateTime;
use uuid::Uuid;
use validator::{Validate, ValidationError};

use crate::{
    auth::extractors::AuthUser,
    error::AppError,
    tasks::{
        filter::{SortField, SortOrder, TaskFilter},
        repo_types::{TaskPatch, TaskPriority, TaskRecord, TaskStats, TaskStatus},
    },
    validation::{nullable, parse_iso_date, trimmed, violation, BodyFields, FieldType},
};

fn validate_title(title: &str) -> Result<(), ValidationError> {
    match title.chars().count() {
        0..=2 => Err(violation("length", "Title must be at least 3 characters")),
        3..=200 => Ok(()),
        _ => Err(violation("length", "Title cannot exceed 200 characters")),
    }
}

fn validate_description(description: &str) -> Result<(), ValidationError> {
    if description.chars().count() > 1000 {
        return Err(violation(
            "length",
            "Description cannot exceed 1000 characters",
        ));
    }
    Ok(())
}

fn validate_category(category: &str) -> Result<(), ValidationError> {
    if category.chars().count() > 50 {
        return Err(violation("length", "Category cannot exceed 50 characters"));
    }
    Ok(())
}

fn validate_status(status: &str) -> Result<(), ValidationError> {
    status.parse::<TaskStatus>().map(|_| ()).map_err(|_| {
        violation(
            "one_of",
            "Status must be one of: pending, in-progress, completed",
        )
    })
}

fn validate_priority(priority: &str) -> Result<(), ValidationError> {
    priority
        .parse::<TaskPriority>()
        .map(|_| ())
        .map_err(|_| violation("one_of", "Priority must be one of: low, medium, high"))
}

fn validate_due_date(raw: &str) -> Result<(), ValidationError> {
    parse_iso_date(raw)
        .map(|_| ())
        .ok_or_else(|| violation("date", "Due date must be a valid ISO date"))
}

fn validate_future_due_date(raw: &str) -> Result<(), ValidationError> {
    let due = parse_iso_date(raw)
        .ok_or_else(|| violation("date", "Due date must be a valid ISO date"))?;
    if due < OffsetDateTime::now_utc() {
        return Err(violation("date", "Due date cannot be in the past"));
    }
    Ok(())
}

fn require_any_field(req: &UpdateTaskRequest) -> Result<(), ValidationError> {
    let supplied = req.title.is_some()
        || req.description.is_some()
        || req.status.is_some()
        || req.priority.is_some()
        || req.category.is_some()
        || req.due_date.is_some()
        || req.completed.is_some();
    if supplied {
        Ok(())
    } else {
        Err(violation(
            "min_fields",
            "At least one field must be provided for update",
        ))
    }
}

/// Body of `POST /api/tasks`. Unknown keys (including `owner`) are ignored.
#[derive(Debug, Deserialize, Validate)]
#[serde(rename_all = "camelCase")]
pub struct CreateTaskRequest {
    #[serde(default, deserialize_with = "trimmed")]
    #[validate(
        required(message = "Title is required"),
        custom(function = "validate_title")
    )]
    pub title: Option<String>,
    #[serde(default, deserialize_with = "trimmed")]
    #[validate(custom(function = "validate_description"))]
    pub description: Option<String>,
    #[validate(custom(function = "validate_status"))]
    pub status: Option<String>,
    #[validate(custom(function = "validate_priority"))]
    pub priority: Option<String>,
    #[serde(default, deserialize_with = "trimmed")]
    #[validate(custom(function = "validate_category"))]
    pub category: Option<String>,
    #[validate(custom(function = "validate_future_due_date"))]
    pub due_date: Option<String>,
    pub completed: Option<bool>,
}

impl CreateTaskRequest {
    /// Splits a validated request into the title and the remaining fields.
    pub fn into_parts(self) -> (String, TaskPatch) {
        let patch = TaskPatch {
            title: None,
            description: self.description,
            status: self.status.and_then(|s| s.parse().ok()),
            priority: self.priority.and_then(|p| p.parse().ok()),
            category: self.category,
            due_date: self.due_date.map(|d| parse_iso_date(&d)),
            completed: self.completed,
        };
        (self.title.unwrap_or_default(), patch)
    }
}

/// Body of `PUT /api/tasks/:id`; at least one field must be present.
#[derive(Debug, Deserialize, Validate)]
#[serde(rename_all = "camelCase")]
#[validate(schema(function = "require_any_field"))]
pub struct UpdateTaskRequest {
    #[serde(default, deserialize_with = "trimmed")]
    #[validate(custom(function = "validate_title"))]
    pub title: Option<String>,
    #[serde(default, deserialize_with = "trimmed")]
    #[validate(custom(function = "validate_description"))]
    pub description: Option<String>,
    #[validate(custom(function = "validate_status"))]
    pub status: Option<String>,
    #[validate(custom(function = "validate_priority"))]
    pub priority: Option<String>,
    #[serde(default, deserialize_with = "trimmed")]
    #[validate(custom(function = "validate_category"))]
    pub category: Option<String>,
    /// `null` clears the due date.
    #[serde(default, deserialize_with = "nullable")]
    #[validate(custom(function = "validate_due_date"))]
    pub due_date: Option<Option<String>>,
    pub completed: Option<bool>,
}

impl From<UpdateTaskRequest> for TaskPatch {
    fn from(req: UpdateTaskRequest) -> Self {
        TaskPatch {
            title: req.title,
            description: req.description,
            status: req.status.and_then(|s| s.parse().ok()),
            priority: req.priority.and_then(|p| p.parse().ok()),
            category: req.category,
            due_date: req
                .due_date
                .map(|due| due.and_then(|raw| parse_iso_date(&raw))),
            completed: req.completed,
        }
    }
}

const TASK_FIELDS: &[FieldType] = &[
    FieldType::text("title", "title", "Title must be a string"),
    FieldType::text("description", "description", "Description must be a string"),
    FieldType::text(
        "status",
        "status",
        "Status must be one of: pending, in-progress, completed",
    ),
    FieldType::text(
        "priority",
        "priority",
        "Priority must be one of: low, medium, high",
    ),
    FieldType::text("category", "category", "Category must be a string"),
    FieldType::text("dueDate", "due_date", "Due date must be a valid ISO date"),
    FieldType::flag("completed", "completed", "Completed must be a boolean"),
];

impl BodyFields for CreateTaskRequest {
    const FIELDS: &'static [FieldType] = TASK_FIELDS;
}

impl BodyFields for UpdateTaskRequest {
    const FIELDS: &'static [FieldType] = TASK_FIELDS;
}

/// Query string of `GET /api/tasks`. Serialized back as the `filters` echo.
#[derive(Debug, Clone, Default, Deserialize, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct TaskQuery {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub status: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub priority: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub category: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub completed: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub due_before: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub due_after: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub search: Option<String>,
    #[serde(skip_serializing)]
    pub sort: Option<String>,
    #[serde(skip_serializing)]
    pub order: Option<String>,
}

fn non_empty(value: &Option<String>) -> Option<&str> {
    value.as_deref().filter(|v| !v.is_empty())
}

impl TaskQuery {
    /// Builds the store filter, scoping non-admins to their own tasks.
    /// Every malformed parameter is reported at once.
    pub fn to_filter(&self, requester: &AuthUser) -> Result<TaskFilter, AppError> {
        let mut problems = Vec::new();

        let status = non_empty(&self.status).and_then(|raw| {
            raw.parse::<TaskStatus>().ok().or_else(|| {
                problems.push("Status must be one of: pending, in-progress, completed".into());
                None
            })
        });
        let priority = non_empty(&self.priority).and_then(|raw| {
            raw.parse::<TaskPriority>().ok().or_else(|| {
                problems.push("Priority must be one of: low, medium, high".into());
                None
            })
        });
        let due_before = non_empty(&self.due_before).and_then(|raw| {
            parse_iso_date(raw).or_else(|| {
                problems.push("dueBefore must be a valid ISO date".into());
                None
            })
        });
        let due_after = non_empty(&self.due_after).and_then(|raw| {
            parse_iso_date(raw).or_else(|| {
                problems.push("dueAfter must be a valid ISO date".into());
                None
            })
        });
        let sort = match non_empty(&self.sort) {
            None => SortField::default(),
            Some(raw) => raw.parse::<SortField>().unwrap_or_else(|_| {
                problems.push(format!("Sort must be one of: {}", SortField::NAMES));
                SortField::default()
            }),
        };

        if !problems.is_empty() {
            return Err(AppError::Validation(problems));
        }

        Ok(TaskFilter {
            owner: (!requester.is_admin()).then_some(requester.id),
            status,
            priority,
            category: non_empty(&self.category).map(str::to_string),
            completed: self.completed.as_deref().map(|c| c == "true"),
            due_before,
            due_after,
            search: non_empty(&self.search).map(str::to_string),
            sort,
            order: self
                .order
                .as_deref()
                .map(SortOrder::from_param)
                .unwrap_or_default(),
        })
    }
}

#[derive(Debug, Serialize)]
pub struct OwnerSummary {
    pub id: Uuid,
    pub name: String,
    pub email: String,
}

/// Task as returned to clients, owner embedded.
#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct TaskResponse {
    pub id: Uuid,
    pub title: String,
    pub description: Option<String>,
    pub status: TaskStatus,
    pub priority: TaskPriority,
    pub category: Option<String>,
    #[serde(with = "time::serde::rfc3339::option")]
    pub due_date: Option<OffsetDateTime>,
    pub completed: bool,
    #[serde(with = "time::serde::rfc3339::option")]
    pub completed_at: Option<OffsetDateTime>,
    pub owner: OwnerSummary,
    #[serde(with = "time::serde::rfc3339")]
    pub created_at: OffsetDateTime,
    #[serde(with = "time::serde::rfc3339")]
    pub updated_at: OffsetDateTime,
}

impl From<TaskRecord> for TaskResponse {
    fn from(record: TaskRecord) -> Self {
        let TaskRecord {
            task,
            owner_name,
            owner_email,
        } = record;
        Self {
            id: task.id,
            title: task.title,
            description: task.description,
            status: task.status,
            priority: task.priority,
            category: task.category,
            due_date: task.due_date,
            completed: task.completed,
            completed_at: task.completed_at,
            owner: OwnerSummary {
                id: task.owner_id,
                name: owner_name,
                email: owner_email,
            },
            created_at: task.created_at,
            updated_at: task.updated_at,
        }
    }
}

#[derive(Debug, Serialize)]
pub struct TaskListResponse {
    pub tasks: Vec<TaskResponse>,
    pub count: usize,
    pub filters: TaskQuery,
}

#[derive(Debug, Serialize)]
pub struct TaskEnvelope {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub message: Option<&'static str>,
    pub task: TaskResponse,
}

#[derive(Debug, Serialize)]
pub struct MessageResponse {
    pub message: &'static str,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct PurgeResponse {
    pub message: &'static str,
    pub deleted_count: u64,
}

pub type StatsResponse = TaskStats;
