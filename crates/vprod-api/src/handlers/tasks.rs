//! Task submission and query handlers.

use axum::extract::{Path, Query, State};
use axum::http::StatusCode;
use axum::Json;
use serde::Deserialize;
use serde_json::Value;
use tracing::{debug, info};
use vprod_models::{
    ProduceVideoParams, Task, TaskId, TaskKind, TaskPriority, TaskStatus, TaskType,
};
use vprod_store::TaskFilter;

use crate::error::{ApiError, ApiResult};
use crate::metrics;
use crate::state::AppState;

/// Body of `POST /api/tasks`.
#[derive(Debug, Deserialize)]
pub struct CreateTaskRequest {
    pub task_type: TaskType,
    #[serde(default)]
    pub params: Value,
    #[serde(default)]
    pub priority: Option<TaskPriority>,
    /// Caller-chosen task id
    #[serde(default)]
    pub id: Option<String>,
}

/// Query of `GET /api/tasks`.
#[derive(Debug, Default, Deserialize)]
pub struct ListTasksQuery {
    pub status: Option<String>,
    pub task_type: Option<String>,
}

fn task_kind(task_type: TaskType, params: Value) -> ApiResult<TaskKind> {
    let params = match params {
        Value::Null => Value::Object(Default::default()),
        Value::Object(map) => {
            if map.contains_key("priority") {
                debug!("Ignoring params.priority; the task-level priority is used");
            }
            Value::Object(map)
        }
        _ => return Err(ApiError::bad_request("params must be an object")),
    };

    match task_type {
        TaskType::ProduceVideo => serde_json::from_value::<ProduceVideoParams>(params)
            .map(TaskKind::ProduceVideo)
            .map_err(|e| ApiError::bad_request(format!("invalid params: {}", e))),
    }
}

/// Submit a task.
pub async fn create_task(
    State(state): State<AppState>,
    Json(request): Json<CreateTaskRequest>,
) -> ApiResult<(StatusCode, Json<Task>)> {
    let kind = task_kind(request.task_type, request.params)?;
    let priority = request.priority.unwrap_or_default();

    let task = match request.id {
        Some(id) if id.trim().is_empty() => {
            return Err(ApiError::bad_request("id must not be empty"));
        }
        Some(id) => {
            state
                .store
                .insert(Task::new(kind, priority).with_id(TaskId::from_string(id.trim())))
                .await?
        }
        None => state.store.create(kind, priority).await?,
    };

    metrics::record_task_created(task.task_type().as_str());

    Ok((StatusCode::CREATED, Json(task)))
}

/// List tasks, newest first, optionally filtered.
pub async fn list_tasks(
    State(state): State<AppState>,
    Query(query): Query<ListTasksQuery>,
) -> ApiResult<Json<Vec<Task>>> {
    let filter = TaskFilter {
        status: query
            .status
            .as_deref()
            .map(str::parse::<TaskStatus>)
            .transpose()
            .map_err(ApiError::bad_request)?,
        task_type: query
            .task_type
            .as_deref()
            .map(str::parse::<TaskType>)
            .transpose()
            .map_err(ApiError::bad_request)?,
    };

    Ok(Json(state.store.list(filter).await?))
}

pub async fn get_task(
    State(state): State<AppState>,
    Path(task_id): Path<String>,
) -> ApiResult<Json<Task>> {
    let id = TaskId::from_string(task_id);
    state
        .store
        .get(&id)
        .await?
        .map(Json)
        .ok_or_else(|| ApiError::not_found(format!("task {}", id)))
}

/// Cancel a pending or processing task. Terminal tasks answer 409.
pub async fn cancel_task(
    State(state): State<AppState>,
    Path(task_id): Path<String>,
) -> ApiResult<Json<Task>> {
    let id = TaskId::from_string(task_id);
    if !state.store.cancel(&id).await? {
        return Err(ApiError::not_found(format!("task {}", id)));
    }
    info!(task_id = %id, "Task canceled");

    state
        .store
        .get(&id)
        .await?
        .map(Json)
        .ok_or_else(|| ApiError::not_found(format!("task {}", id)))
}

pub async fn delete_task(
    State(state): State<AppState>,
    Path(task_id): Path<String>,
) -> ApiResult<StatusCode> {
    let id = TaskId::from_string(task_id);
    if state.store.delete(&id).await? {
        Ok(StatusCode::NO_CONTENT)
    } else {
        Err(ApiError::not_found(format!("task {}", id)))
    }
}
