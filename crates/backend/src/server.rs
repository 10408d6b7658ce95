//! HTTP surface for the orchestration engine.
//!
//! A thin axum layer: every handler delegates to the [`Orchestrator`] and
//! maps its errors onto status codes. Webhook rejections are 401,
//! concurrency conflicts 409, unknown records 404.

use std::sync::Arc;

use axum::{
  Json, Router,
  body::Bytes,
  extract::{Path, State},
  http::{HeaderMap, StatusCode},
  response::{IntoResponse, Response},
  routing::{get, post},
};
use serde::Serialize;
use serde_json::json;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

use crate::{
  domain::{IndexingJob, JobId, Project, ProjectId},
  queue::QueueStats,
  service::{Orchestrator, ServiceError},
  store::StoreError,
  trigger::{IndexRequest, TriggerError, sweep::SweepTargetResult, webhook::WebhookError},
};

/// Errors from running the HTTP server
#[derive(Debug, thiserror::Error)]
pub enum ServerError {
  #[error("IO error: {0}")]
  Io(#[from] std::io::Error),
}

#[derive(Clone)]
struct AppState {
  orchestrator: Arc<Orchestrator>,
}

/// Build the API router.
pub fn router(orchestrator: Arc<Orchestrator>) -> Router {
  Router::new()
    .route("/projects/{id}/index", post(start_indexing).delete(stop_indexing))
    .route("/projects/{id}/status", get(project_status))
    .route("/webhooks/{id}", post(receive_webhook))
    .route("/scheduler/sweep", post(run_sweep).get(due_targets))
    .route("/queue/stats", get(queue_stats).post(queue_stats))
    .with_state(AppState { orchestrator })
}

/// Bind and serve until the cancellation token fires.
pub async fn run(addr: &str, orchestrator: Arc<Orchestrator>, cancel: CancellationToken) -> Result<(), ServerError> {
  let listener = tokio::net::TcpListener::bind(addr).await?;
  info!(addr, "HTTP server listening");

  axum::serve(listener, router(orchestrator))
    .with_graceful_shutdown(cancel.cancelled_owned())
    .await?;

  info!("HTTP server stopped");
  Ok(())
}

// ============================================================================
// Error mapping
// ============================================================================

struct ApiError {
  status: StatusCode,
  message: String,
}

impl ApiError {
  fn new(status: StatusCode, message: impl Into<String>) -> Self {
    Self {
      status,
      message: message.into(),
    }
  }
}

impl IntoResponse for ApiError {
  fn into_response(self) -> Response {
    (self.status, Json(json!({ "error": self.message }))).into_response()
  }
}

impl From<TriggerError> for ApiError {
  fn from(e: TriggerError) -> Self {
    match e {
      TriggerError::AlreadyIndexing(_) => ApiError::new(StatusCode::CONFLICT, e.to_string()),
      TriggerError::Store(StoreError::ProjectNotFound(_)) => ApiError::new(StatusCode::NOT_FOUND, e.to_string()),
      TriggerError::Store(other) => {
        warn!(error = %other, "Store error in trigger path");
        ApiError::new(StatusCode::INTERNAL_SERVER_ERROR, other.to_string())
      }
    }
  }
}

impl From<WebhookError> for ApiError {
  fn from(e: WebhookError) -> Self {
    match e {
      WebhookError::Rejected(_) => ApiError::new(StatusCode::UNAUTHORIZED, e.to_string()),
      WebhookError::ProjectNotFound(_) => ApiError::new(StatusCode::NOT_FOUND, e.to_string()),
      WebhookError::Store(other) => {
        warn!(error = %other, "Store error in webhook path");
        ApiError::new(StatusCode::INTERNAL_SERVER_ERROR, other.to_string())
      }
    }
  }
}

impl From<ServiceError> for ApiError {
  fn from(e: ServiceError) -> Self {
    match e {
      ServiceError::Store(
        err @ (StoreError::ProjectNotFound(_) | StoreError::JobNotFound(_) | StoreError::DocRepositoryNotFound(_)),
      ) => ApiError::new(StatusCode::NOT_FOUND, err.to_string()),
      ServiceError::Store(other) => ApiError::new(StatusCode::INTERNAL_SERVER_ERROR, other.to_string()),
    }
  }
}

// ============================================================================
// Handlers
// ============================================================================

async fn start_indexing(
  State(state): State<AppState>,
  Path(id): Path<String>,
  body: Option<Json<IndexRequest>>,
) -> Result<Json<IndexingJob>, ApiError> {
  let request = body.map(|Json(r)| r).unwrap_or_default();
  let job = state
    .orchestrator
    .start_indexing(&ProjectId::from(id.as_str()), request)
    .await?;
  Ok(Json(job))
}

#[derive(Debug, Serialize)]
struct StopResponse {
  message: String,
  #[serde(skip_serializing_if = "Option::is_none")]
  job_id: Option<JobId>,
}

async fn stop_indexing(
  State(state): State<AppState>,
  Path(id): Path<String>,
) -> Result<Json<StopResponse>, ApiError> {
  let cancelled = state.orchestrator.stop_indexing(&ProjectId::from(id.as_str())).await?;
  let response = match cancelled {
    Some(job_id) => StopResponse {
      message: "Indexing cancelled".to_string(),
      job_id: Some(job_id),
    },
    None => StopResponse {
      message: "No active indexing job".to_string(),
      job_id: None,
    },
  };
  Ok(Json(response))
}

#[derive(Debug, Serialize)]
struct ProjectStatusResponse {
  project: Project,
  #[serde(skip_serializing_if = "Option::is_none")]
  active_job: Option<IndexingJob>,
}

async fn project_status(
  State(state): State<AppState>,
  Path(id): Path<String>,
) -> Result<Json<ProjectStatusResponse>, ApiError> {
  let project_id = ProjectId::from(id.as_str());
  let project = state.orchestrator.project(&project_id).await?;
  let active_job = state
    .orchestrator
    .store()
    .active_job_for_project(&project_id)
    .await
    .map_err(ServiceError::Store)?;
  Ok(Json(ProjectStatusResponse { project, active_job }))
}

async fn receive_webhook(
  State(state): State<AppState>,
  Path(id): Path<String>,
  headers: HeaderMap,
  body: Bytes,
) -> Result<Response, ApiError> {
  let response = state
    .orchestrator
    .handle_webhook(&ProjectId::from(id.as_str()), &headers, &body)
    .await?;
  Ok(Json(response).into_response())
}

#[derive(Debug, Serialize)]
struct SweepResponse {
  success: bool,
  projects_processed: usize,
  results: Vec<SweepTargetResult>,
}

async fn run_sweep(State(state): State<AppState>) -> Json<SweepResponse> {
  let report = state.orchestrator.run_sweep().await;
  Json(SweepResponse {
    success: true,
    projects_processed: report.projects_processed,
    results: report.results,
  })
}

async fn due_targets(State(state): State<AppState>) -> Json<crate::trigger::sweep::DueTargets> {
  Json(state.orchestrator.due_targets().await)
}

#[derive(Debug, Serialize)]
struct StatsResponse {
  queue_stats: QueueStats,
}

async fn queue_stats(State(state): State<AppState>) -> Json<StatsResponse> {
  Json(StatsResponse {
    queue_stats: state.orchestrator.queue_stats(),
  })
}
