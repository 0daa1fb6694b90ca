use std::sync::Arc;

use axum::{
    extract::{Path, State},
    http::StatusCode,
    response::IntoResponse,
    routing::{get, post},
    Json, Router,
};
use serde::Serialize;
use serde_json::{json, Value};
use uuid::Uuid;

use crate::jobs::model::Job;
use crate::store::TaskStore;

/// Front-end state: the shared store plus the queue producers push onto.
///
/// Give the API a store handle of its own; the dispatch loop's connection
/// sits inside a blocking pop most of the time.
#[derive(Clone)]
pub struct ApiState {
    pub store: Arc<dyn TaskStore>,
    pub queue_key: String,
}

pub fn router(state: ApiState) -> Router {
    Router::new()
        .route("/tasks", post(create_task))
        .route("/status/:job_id", get(get_status))
        .route("/health", get(health))
        .with_state(state)
}

fn internal_err(e: anyhow::Error) -> (StatusCode, String) {
    (
        StatusCode::INTERNAL_SERVER_ERROR,
        format!("internal error: {e}"),
    )
}

#[derive(Debug, Serialize)]
pub struct EnqueueResponse {
    pub id: String,
}

/// Wrap an arbitrary payload object in a job envelope and push it onto the
/// live queue. The serialized envelope is the job's identity everywhere
/// downstream, delayed set included.
pub async fn create_task(
    State(state): State<ApiState>,
    Json(payload): Json<Value>,
) -> Result<Json<EnqueueResponse>, (StatusCode, String)> {
    if !payload.is_object() {
        return Err((
            StatusCode::BAD_REQUEST,
            "payload must be a JSON object".into(),
        ));
    }

    let job = Job::new(Uuid::new_v4().to_string(), payload);
    let raw = serde_json::to_string(&job).map_err(|e| internal_err(e.into()))?;

    state
        .store
        .push(&state.queue_key, &raw)
        .await
        .map_err(internal_err)?;

    Ok(Json(EnqueueResponse { id: job.id }))
}

/// Status-slot lookup. An absent slot means the job has not finished or
/// deferred yet, which callers see as a pending marker.
pub async fn get_status(
    State(state): State<ApiState>,
    Path(job_id): Path<String>,
) -> Result<Json<Value>, (StatusCode, String)> {
    let stored = state
        .store
        .get_status(&job_id)
        .await
        .map_err(internal_err)?;

    match stored {
        None => Ok(Json(json!({ "status": "pending" }))),
        Some(raw) => {
            let value = serde_json::from_str(&raw).map_err(|e| internal_err(e.into()))?;
            Ok(Json(value))
        }
    }
}

pub async fn health() -> impl IntoResponse {
    (StatusCode::OK, "ok")
}
