//! Admin REST surface over [`SchedulerService`].

use std::sync::Arc;

use axum::extract::{Path, State};
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::routing::{get, post};
use axum::{Json, Router};
use tower_http::cors::CorsLayer;
use tower_http::trace::TraceLayer;

use crate::engine::SchedulerService;
use crate::error::{Error, TaskError};
use crate::task::TaskDraft;

/// Shared state for the API routes.
#[derive(Clone)]
pub struct ApiState {
    pub service: Arc<SchedulerService>,
}

/// Build the router. Every mutating route goes through the service, which
/// rebuilds the schedule.
pub fn routes(service: Arc<SchedulerService>) -> Router {
    Router::new()
        .route("/health", get(health))
        .route("/api/status", get(status))
        .route("/api/tasks", get(list_tasks).post(create_task))
        .route(
            "/api/tasks/{id}",
            get(get_task).put(update_task).delete(delete_task),
        )
        .route("/api/tasks/{id}/run", post(run_task))
        .route("/api/destinations/{destination}/tasks", post(create_task_from_text))
        .with_state(ApiState { service })
        .layer(TraceLayer::new_for_http())
        .layer(CorsLayer::permissive())
}

/// Maps service errors to status codes.
struct ApiError(Error);

impl From<Error> for ApiError {
    fn from(e: Error) -> Self {
        Self(e)
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        match self.0 {
            Error::Task(TaskError::Invalid(fields)) => (
                StatusCode::UNPROCESSABLE_ENTITY,
                Json(serde_json::json!({
                    "error": "Invalid task",
                    "fields": fields,
                })),
            )
                .into_response(),
            Error::Task(TaskError::NotFound(id)) => (
                StatusCode::NOT_FOUND,
                Json(serde_json::json!({ "error": format!("Task with ID {id} not found.") })),
            )
                .into_response(),
            other => {
                tracing::error!("Request failed: {}", other);
                (
                    StatusCode::INTERNAL_SERVER_ERROR,
                    Json(serde_json::json!({ "error": other.to_string() })),
                )
                    .into_response()
            }
        }
    }
}

type ApiResult<T> = Result<T, ApiError>;

// ── Health ──────────────────────────────────────────────────────────────

async fn health() -> impl IntoResponse {
    Json(serde_json::json!({
        "status": "ok",
        "service": "site-digest"
    }))
}

async fn status(State(state): State<ApiState>) -> impl IntoResponse {
    Json(state.service.status().await)
}

// ── Tasks ───────────────────────────────────────────────────────────────

async fn list_tasks(State(state): State<ApiState>) -> ApiResult<impl IntoResponse> {
    Ok(Json(state.service.list_tasks().await?))
}

async fn get_task(
    State(state): State<ApiState>,
    Path(id): Path<i64>,
) -> ApiResult<impl IntoResponse> {
    Ok(Json(state.service.get_task(id).await?))
}

async fn create_task(
    State(state): State<ApiState>,
    Json(draft): Json<TaskDraft>,
) -> ApiResult<impl IntoResponse> {
    let task = state.service.create_task(draft).await?;
    Ok((StatusCode::CREATED, Json(task)))
}

/// `key=value` lines, one field per line; the destination comes from the path.
async fn create_task_from_text(
    State(state): State<ApiState>,
    Path(destination): Path<String>,
    body: String,
) -> ApiResult<impl IntoResponse> {
    let draft = TaskDraft::from_key_value(&body).with_destination(destination);
    let task = state.service.create_task(draft).await?;
    Ok((StatusCode::CREATED, Json(task)))
}

async fn update_task(
    State(state): State<ApiState>,
    Path(id): Path<i64>,
    Json(draft): Json<TaskDraft>,
) -> ApiResult<impl IntoResponse> {
    Ok(Json(state.service.update_task(id, draft).await?))
}

async fn delete_task(
    State(state): State<ApiState>,
    Path(id): Path<i64>,
) -> ApiResult<impl IntoResponse> {
    state.service.delete_task(id).await?;
    Ok(StatusCode::NO_CONTENT)
}

async fn run_task(
    State(state): State<ApiState>,
    Path(id): Path<i64>,
) -> ApiResult<impl IntoResponse> {
    state.service.get_task(id).await?;
    let result = state.service.run_manual(id).await?;
    Ok(Json(serde_json::json!({
        "task_id": id,
        "result": result,
    })))
}
