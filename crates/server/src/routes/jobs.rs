// crates/server/src/routes/jobs.rs
//! Job submission, status and cancellation.
//!
//! - POST /jobs - queue a new job, 202 with the hub URL to subscribe on
//! - GET /jobs/{id} - full status snapshot
//! - POST /jobs/{id}/cancel - request cancellation

use std::sync::Arc;

use axum::{
    extract::{Path, State},
    http::{header, HeaderMap, StatusCode},
    routing::{get, post},
    Json, Router,
};
use chrono::{DateTime, Utc};
use longrun_core::{Job, JobId, JobStatus};
use serde::{Deserialize, Serialize};

use crate::error::{ApiError, ApiResult};
use crate::state::AppState;

#[derive(Debug, Deserialize)]
#[cfg_attr(test, derive(Serialize))]
pub struct CreateJobRequest {
    pub input: String,
}

#[derive(Debug, Serialize)]
#[cfg_attr(test, derive(Deserialize))]
#[serde(rename_all = "camelCase")]
pub struct CreateJobResponse {
    pub job_id: JobId,
    pub status: JobStatus,
    pub created_at: DateTime<Utc>,
    pub hub_url: String,
}

#[derive(Debug, Serialize)]
#[cfg_attr(test, derive(Deserialize))]
#[serde(rename_all = "camelCase")]
pub struct JobStatusResponse {
    pub job_id: JobId,
    pub input: String,
    pub status: JobStatus,
    pub result: Option<String>,
    pub created_at: DateTime<Utc>,
    pub started_at: Option<DateTime<Utc>>,
    pub completed_at: Option<DateTime<Utc>>,
    pub error_message: Option<String>,
    pub total_units: usize,
    pub processed_units: usize,
    pub progress_percentage: f64,
}

impl From<&Job> for JobStatusResponse {
    fn from(job: &Job) -> Self {
        Self {
            job_id: job.id(),
            input: job.input().to_string(),
            status: job.status(),
            result: job.result().map(str::to_string),
            created_at: job.created_at(),
            started_at: job.started_at(),
            completed_at: job.completed_at(),
            error_message: job.error_message().map(str::to_string),
            total_units: job.total_units(),
            processed_units: job.processed_units(),
            progress_percentage: job.progress_percentage(),
        }
    }
}

#[derive(Debug, Serialize)]
#[cfg_attr(test, derive(Deserialize))]
pub struct CancelJobResponse {
    pub success: bool,
    pub message: String,
}

/// POST /api/jobs - Queue a job for background processing.
async fn create_job(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
    Json(request): Json<CreateJobRequest>,
) -> ApiResult<(StatusCode, Json<CreateJobResponse>)> {
    let handle = state.store.create_job(&request.input)?;

    Ok((
        StatusCode::ACCEPTED,
        Json(CreateJobResponse {
            job_id: handle.id,
            status: handle.status,
            created_at: handle.created_at,
            hub_url: hub_url(&headers, state.hub_path),
        }),
    ))
}

/// GET /api/jobs/{id} - Current status of a job.
async fn get_job(
    State(state): State<Arc<AppState>>,
    Path(id): Path<String>,
) -> ApiResult<Json<JobStatusResponse>> {
    let job_id = parse_id(&id)?;
    let job = state
        .store
        .get_job(&job_id)
        .ok_or_else(|| ApiError::JobNotFound(id))?;
    Ok(Json(JobStatusResponse::from(&job)))
}

/// POST /api/jobs/{id}/cancel - Request cancellation.
///
/// A job that exists but is already finished answers 200 with
/// `success: false`.
async fn cancel_job(
    State(state): State<Arc<AppState>>,
    Path(id): Path<String>,
) -> ApiResult<Json<CancelJobResponse>> {
    let job_id = parse_id(&id)?;
    if state.store.get_job(&job_id).is_none() {
        return Err(ApiError::JobNotFound(id));
    }

    let success = state.store.cancel_job(&job_id);
    let message = if success {
        "Job cancellation requested".to_string()
    } else {
        "Job cannot be cancelled (already completed or cancelled)".to_string()
    };
    tracing::info!(%job_id, success, "cancel requested over HTTP");

    Ok(Json(CancelJobResponse { success, message }))
}

fn parse_id(raw: &str) -> ApiResult<JobId> {
    raw.parse()
        .map_err(|_| ApiError::BadRequest(format!("invalid job id: {raw}")))
}

/// WebSocket URL for the hub, derived from the request's `Host`.
fn hub_url(headers: &HeaderMap, hub_path: &str) -> String {
    match headers.get(header::HOST).and_then(|h| h.to_str().ok()) {
        Some(host) => format!("ws://{host}{hub_path}"),
        None => hub_path.to_string(),
    }
}

/// Build the jobs router.
pub fn router() -> Router<Arc<AppState>> {
    Router::new()
        .route("/jobs", post(create_job))
        .route("/jobs/{id}", get(get_job))
        .route("/jobs/{id}/cancel", post(cancel_job))
}
