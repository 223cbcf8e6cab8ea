//! HTTP surface.
//!
//! - `POST /jobs`, `GET /jobs/:id/status`, `GET /jobs/:id/data`
//! - `POST /internal/outcomes` for collectors running out of process
//! - `GET /health`, `POST /health` (sweep + wake), `GET /queue/stats`

use std::sync::Arc;

use axum::extract::{Path, State};
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::routing::{get, post};
use axum::{Json, Router};
use bytes::Bytes;
use persona_core::App;
use persona_core::app::{JobStatusView, ReportResult};
use persona_core::domain::{CollectorError, CollectorOutcome, JobId, JobInputs, Source};
use persona_core::ports::QueueStats;
use serde::Deserialize;
use serde::de::DeserializeOwned;
use serde_json::{Value, json};

use crate::error::ApiError;

#[derive(Clone)]
pub struct AppState {
    pub app: Arc<App>,
}

pub fn router(state: AppState) -> Router {
    Router::new()
        .route("/jobs", post(create_job))
        .route("/jobs/:id/status", get(job_status))
        .route("/jobs/:id/data", get(job_data))
        .route("/internal/outcomes", post(report_outcome))
        .route("/health", get(health).post(sweep))
        .route("/queue/stats", get(queue_stats))
        .with_state(state)
}

/// Parses a JSON body. An empty body reads as `{}` so missing fields surface as
/// validation errors rather than parse errors.
fn parse_body<T: DeserializeOwned>(body: &[u8]) -> Result<T, ApiError> {
    let body: &[u8] = if body.iter().all(u8::is_ascii_whitespace) {
        b"{}"
    } else {
        body
    };
    serde_json::from_slice(body).map_err(|e| ApiError::validation(format!("invalid JSON body: {e}")))
}

fn parse_job_id(raw: &str) -> Result<JobId, ApiError> {
    raw.parse().map_err(|e| ApiError::validation(format!("{e}")))
}

async fn create_job(
    State(state): State<AppState>,
    body: Bytes,
) -> Result<(StatusCode, Json<Value>), ApiError> {
    let inputs: JobInputs = parse_body(&body)?;
    let job_id = state.app.orchestrator.create_job(inputs).await?;
    Ok((StatusCode::ACCEPTED, Json(json!({ "jobId": job_id }))))
}

async fn job_status(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> Result<Json<JobStatusView>, ApiError> {
    let job = state.app.orchestrator.get_status(parse_job_id(&id)?).await?;
    Ok(Json(JobStatusView::from(&job)))
}

async fn job_data(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> Result<Json<Value>, ApiError> {
    let job_id = parse_job_id(&id)?;
    let records = state.app.orchestrator.job_data(job_id).await?;
    Ok(Json(json!({ "jobId": job_id, "records": records })))
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct OutcomeRequest {
    job_id: String,
    source_name: String,
    #[serde(default)]
    result: Option<Value>,
    #[serde(default)]
    error: Option<CollectorError>,
}

impl OutcomeRequest {
    fn into_parts(self) -> Result<(JobId, Source, CollectorOutcome), ApiError> {
        let job_id = parse_job_id(&self.job_id)?;
        let source: Source = self
            .source_name
            .parse()
            .map_err(|e| ApiError::validation(format!("{e}")))?;
        let outcome = match (self.result, self.error) {
            (Some(result), None) => CollectorOutcome::Succeeded(result),
            (None, Some(error)) => CollectorOutcome::Failed(error),
            _ => {
                return Err(ApiError::validation(
                    "exactly one of `result` or `error` is required",
                ));
            }
        };
        Ok((job_id, source, outcome))
    }
}

async fn report_outcome(
    State(state): State<AppState>,
    body: Bytes,
) -> Result<Json<ReportResult>, ApiError> {
    let request: OutcomeRequest = parse_body(&body)?;
    let (job_id, source, outcome) = request.into_parts()?;
    let result = state
        .app
        .orchestrator
        .report_outcome(job_id, source, outcome)
        .await?;
    Ok(Json(result))
}

async fn health(State(state): State<AppState>) -> Response {
    let report = state.app.health.check().await;
    let status = StatusCode::from_u16(report.status.status_code())
        .unwrap_or(StatusCode::INTERNAL_SERVER_ERROR);
    (status, Json(report)).into_response()
}

async fn sweep(State(state): State<AppState>) -> Response {
    let timestamp = state.app.clock.now();
    match state.app.sweeper.sweep_stuck_jobs().await {
        Ok(report) => {
            state.app.sweeper.trigger_processing();
            (
                StatusCode::OK,
                Json(json!({ "success": true, "timestamp": timestamp, "sweep": report })),
            )
                .into_response()
        }
        Err(e) => {
            tracing::error!(error = %e, "manual sweep failed");
            (
                StatusCode::INTERNAL_SERVER_ERROR,
                Json(json!({ "success": false, "error": e.to_string(), "timestamp": timestamp })),
            )
                .into_response()
        }
    }
}

async fn queue_stats(State(state): State<AppState>) -> Result<Json<QueueStats>, ApiError> {
    Ok(Json(state.app.queue.stats().await?))
}
