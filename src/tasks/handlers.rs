use axum::{
    extract::{Path, Query, State},
    http::StatusCode,
    routing::{delete, get},
    Json, Router,
};
use time::OffsetDateTime;
use tracing::{info, instrument, warn};
use uuid::Uuid;

use crate::{
    auth::extractors::AuthUser,
    error::AppError,
    state::AppState,
    tasks::{
        dto::{
            CreateTaskRequest, MessageResponse, PurgeResponse, StatsResponse, TaskEnvelope,
            TaskListResponse, TaskQuery, TaskResponse, UpdateTaskRequest,
        },
        repo_types::{NewTask, TaskRecord},
    },
    validation::ValidatedJson,
};

const NOT_FOUND: &str = "Task not found";
const ACCESS_DENIED: &str = "Access denied";

pub fn task_routes() -> Router<AppState> {
    Router::new()
        .route("/", get(list_tasks).post(create_task))
        .route("/:id", get(get_task).put(update_task).delete(delete_task))
}

pub fn admin_routes() -> Router<AppState> {
    Router::new()
        .route("/stats/overview", get(stats_overview))
        .route("/admin/purge-completed", delete(purge_completed))
}

fn parse_task_id(raw: &str) -> Result<Uuid, AppError> {
    Uuid::parse_str(raw).map_err(|_| AppError::MalformedId("task"))
}

/// Loads a task and checks the requester may touch it. Existence is checked
/// before ownership.
async fn load_owned(
    state: &AppState,
    user: &AuthUser,
    id: Uuid,
    context: &'static str,
) -> Result<TaskRecord, AppError> {
    let record = state
        .tasks
        .find(id)
        .await
        .map_err(|e| AppError::internal(context, e))?
        .ok_or_else(|| AppError::NotFound(NOT_FOUND.into()))?;

    if !user.can_access(record.task.owner_id) {
        warn!(user_id = %user.id, task_id = %id, owner_id = %record.task.owner_id, "task access denied");
        return Err(AppError::Forbidden(ACCESS_DENIED.into()));
    }
    Ok(record)
}

#[instrument(skip(state, query), fields(user_id = %user.id))]
pub async fn list_tasks(
    State(state): State<AppState>,
    user: AuthUser,
    Query(query): Query<TaskQuery>,
) -> Result<Json<TaskListResponse>, AppError> {
    let filter = query.to_filter(&user)?;
    let records = state
        .tasks
        .list(&filter)
        .await
        .map_err(|e| AppError::internal("Failed to fetch tasks", e))?;

    let tasks: Vec<TaskResponse> = records.into_iter().map(TaskResponse::from).collect();
    Ok(Json(TaskListResponse {
        count: tasks.len(),
        tasks,
        filters: query,
    }))
}

#[instrument(skip(state), fields(user_id = %user.id))]
pub async fn get_task(
    State(state): State<AppState>,
    user: AuthUser,
    Path(id): Path<String>,
) -> Result<Json<TaskEnvelope>, AppError> {
    let id = parse_task_id(&id)?;
    let record = load_owned(&state, &user, id, "Failed to fetch task").await?;
    Ok(Json(TaskEnvelope {
        message: None,
        task: record.into(),
    }))
}

#[instrument(skip(state, payload), fields(user_id = %user.id))]
pub async fn create_task(
    State(state): State<AppState>,
    user: AuthUser,
    ValidatedJson(payload): ValidatedJson<CreateTaskRequest>,
) -> Result<(StatusCode, Json<TaskEnvelope>), AppError> {
    let (title, patch) = payload.into_parts();
    let task = NewTask::new(user.id, title, patch, OffsetDateTime::now_utc());

    let record = state
        .tasks
        .create(task)
        .await
        .map_err(|e| AppError::internal("Failed to create task", e))?;

    info!(task_id = %record.task.id, "task created");
    Ok((
        StatusCode::CREATED,
        Json(TaskEnvelope {
            message: Some("Task created successfully"),
            task: record.into(),
        }),
    ))
}

#[instrument(skip(state, payload), fields(user_id = %user.id))]
pub async fn update_task(
    State(state): State<AppState>,
    user: AuthUser,
    Path(id): Path<String>,
    ValidatedJson(payload): ValidatedJson<UpdateTaskRequest>,
) -> Result<Json<TaskEnvelope>, AppError> {
    let id = parse_task_id(&id)?;
    let mut task = load_owned(&state, &user, id, "Failed to update task")
        .await?
        .task;

    task.apply(payload.into(), OffsetDateTime::now_utc());

    let record = state
        .tasks
        .save(&task)
        .await
        .map_err(|e| AppError::internal("Failed to update task", e))?
        .ok_or_else(|| AppError::NotFound(NOT_FOUND.into()))?;

    info!(task_id = %id, status = %record.task.status, "task updated");
    Ok(Json(TaskEnvelope {
        message: Some("Task updated successfully"),
        task: record.into(),
    }))
}

#[instrument(skip(state), fields(user_id = %user.id))]
pub async fn delete_task(
    State(state): State<AppState>,
    user: AuthUser,
    Path(id): Path<String>,
) -> Result<Json<MessageResponse>, AppError> {
    let id = parse_task_id(&id)?;
    load_owned(&state, &user, id, "Failed to delete task").await?;

    let removed = state
        .tasks
        .delete(id)
        .await
        .map_err(|e| AppError::internal("Failed to delete task", e))?;
    if !removed {
        return Err(AppError::NotFound(NOT_FOUND.into()));
    }

    info!(task_id = %id, "task deleted");
    Ok(Json(MessageResponse {
        message: "Task deleted successfully",
    }))
}

#[instrument(skip(state), fields(user_id = %user.id))]
pub async fn stats_overview(
    State(state): State<AppState>,
    user: AuthUser,
) -> Result<Json<StatsResponse>, AppError> {
    let stats = state
        .tasks
        .stats()
        .await
        .map_err(|e| AppError::internal("Failed to fetch statistics", e))?;
    Ok(Json(stats))
}

#[instrument(skip(state), fields(user_id = %user.id))]
pub async fn purge_completed(
    State(state): State<AppState>,
    user: AuthUser,
) -> Result<Json<PurgeResponse>, AppError> {
    let deleted_count = state
        .tasks
        .purge_completed()
        .await
        .map_err(|e| AppError::internal("Failed to purge tasks", e))?;

    info!(deleted_count, "completed tasks purged");
    Ok(Json(PurgeResponse {
        message: "Completed tasks purged successfully",
        deleted_count,
    }))
}
