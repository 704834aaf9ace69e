//! Coordinator HTTP API.
//!
//! `POST /jobs`, `GET /jobs`, `GET /jobs/{id}`, `GET /jobs/events` (SSE),
//! `GET /agents`, `GET /health`.

use axum::extract::rejection::JsonRejection;
use axum::extract::{Path, State};
use axum::http::{header, StatusCode};
use axum::response::sse::{Event, KeepAlive, Sse};
use axum::response::{IntoResponse, Response};
use axum::routing::get;
use axum::{Json, Router};
use futures::{Stream, StreamExt};
use serde::{Deserialize, Serialize};
use serde_json::json;
use std::convert::Infallible;
use std::sync::Arc;
use std::time::Duration;
use tokio_util::sync::CancellationToken;
use tower_http::cors::{Any, CorsLayer};

use crate::broadcast::BroadcastHub;
use crate::model::{Agent, Job};
use crate::registry::{AgentRegistry, JobRegistry};
use crate::submit::{SubmitError, Submitter};

#[derive(Clone)]
pub(crate) struct AppState {
    pub(crate) jobs: Arc<JobRegistry>,
    pub(crate) agents: Arc<AgentRegistry>,
    pub(crate) hub: Arc<BroadcastHub>,
    pub(crate) submitter: Submitter,
    pub(crate) liveness_window: Duration,
    pub(crate) shutdown: CancellationToken,
}

pub(crate) fn router(state: AppState) -> Router {
    Router::new()
        .route("/health", get(health))
        .route("/jobs", get(list_jobs).post(submit_job))
        .route("/jobs/events", get(job_events))
        .route("/jobs/{id}", get(get_job))
        .route("/agents", get(list_agents))
        .with_state(state)
        // Observer UIs are served from other origins.
        .layer(
            CorsLayer::new()
                .allow_origin(Any)
                .allow_methods(Any)
                .allow_headers(Any),
        )
}

/// Job record as returned by the API, with the derived percentage.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct JobView {
    #[serde(flatten)]
    pub job: Job,
    pub percent_complete: f64,
}

impl From<Job> for JobView {
    fn from(job: Job) -> Self {
        let percent_complete = job.percent_complete();
        Self { job, percent_complete }
    }
}

#[derive(Debug, Deserialize)]
struct SubmitRequest {
    url: Option<String>,
}

enum ApiError {
    BadRequest(String),
    NotFound,
    Unavailable(String),
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let (status, message) = match self {
            ApiError::BadRequest(m) => (StatusCode::BAD_REQUEST, m),
            ApiError::NotFound => (StatusCode::NOT_FOUND, "not found".to_string()),
            ApiError::Unavailable(m) => (StatusCode::SERVICE_UNAVAILABLE, m),
        };
        (status, Json(json!({ "error": message }))).into_response()
    }
}

impl From<SubmitError> for ApiError {
    fn from(e: SubmitError) -> Self {
        match e {
            SubmitError::InvalidUrl(_) => ApiError::BadRequest("Invalid or missing URL.".to_string()),
            SubmitError::Bus(e) => ApiError::Unavailable(e.to_string()),
        }
    }
}

async fn health() -> Json<serde_json::Value> {
    Json(json!({ "service": "dlfleet-coordinator", "status": "running" }))
}

async fn submit_job(
    State(state): State<AppState>,
    body: Result<Json<SubmitRequest>, JsonRejection>,
) -> Result<Response, ApiError> {
    let Json(request) = body.map_err(|e| ApiError::BadRequest(e.body_text()))?;
    let url = request
        .url
        .ok_or_else(|| ApiError::BadRequest("Invalid or missing URL.".to_string()))?;
    let job = state.submitter.submit(&url).await?;
    let location = format!("/jobs/{}", job.download_id);
    let body = Json(json!({
        "downloadId": job.download_id,
        "url": job.url,
        "status": job.status,
    }));
    Ok((StatusCode::CREATED, [(header::LOCATION, location)], body).into_response())
}

async fn list_jobs(State(state): State<AppState>) -> Json<Vec<JobView>> {
    Json(state.jobs.list_all().into_iter().map(JobView::from).collect())
}

async fn get_job(State(state): State<AppState>, Path(id): Path<String>) -> Result<Json<JobView>, ApiError> {
    state
        .jobs
        .get(&id)
        .map(|job| Json(JobView::from(job)))
        .ok_or(ApiError::NotFound)
}

async fn list_agents(State(state): State<AppState>) -> Json<Vec<Agent>> {
    Json(state.agents.list_available(state.liveness_window))
}

/// Live progress events, one `data:` JSON line per event. No history.
async fn job_events(State(state): State<AppState>) -> Sse<impl Stream<Item = Result<Event, Infallible>>> {
    let subscription = state.hub.subscribe();
    tracing::debug!(subscriber = subscription.id(), "event stream opened");
    let stream = subscription
        .take_until(state.shutdown.clone().cancelled_owned())
        .map(|event| {
            let data = serde_json::to_string(&event).unwrap_or_default();
            Ok(Event::default().data(data))
        });
    Sse::new(stream).keep_alive(KeepAlive::new().interval(Duration::from_secs(15)).text("ping"))
}
