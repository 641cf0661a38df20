//! REST API handlers for policy queries and operational endpoints.

use axum::extract::{Query, State};
use axum::http::StatusCode;
use axum::Json;
use campaign_core::types::CampaignState;
use campaign_core::CampaignError;
use campaign_reporting::{AudienceReport, AudienceReportBuilder};
use campaign_rl_engine::PolicyEngine;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use std::time::Instant;
use tracing::{error, warn};
use utoipa::{IntoParams, ToSchema};

/// Shared application state for REST handlers.
#[derive(Clone)]
pub struct AppState {
    pub engine: Arc<PolicyEngine>,
    pub reports: Arc<AudienceReportBuilder>,
    pub node_id: String,
    pub start_time: Instant,
}

type ApiError = (StatusCode, Json<ErrorResponse>);

#[derive(Debug, Serialize, Deserialize, ToSchema)]
pub struct NextActionRequest {
    /// `[subject, day, tenure, domain, age, gender, type]`
    pub state: Vec<i64>,
    pub action: i64,
}

#[derive(Debug, Serialize, Deserialize, ToSchema)]
pub struct NextActionResponse {
    pub next_action: usize,
}

#[derive(Debug, Deserialize, IntoParams)]
#[into_params(parameter_in = Query)]
pub struct AudienceQuery {
    /// Email subject id (1-based).
    #[serde(rename = "subjectId")]
    pub subject_id: i64,
}

fn reject(e: CampaignError) -> ApiError {
    let (status, error, message) = match &e {
        CampaignError::Validation(_) | CampaignError::DimensionMismatch { .. } => {
            metrics::counter!("api.validation_errors").increment(1);
            (StatusCode::BAD_REQUEST, "invalid_request", e.to_string())
        }
        CampaignError::PolicyDiverged { .. } => (
            StatusCode::UNPROCESSABLE_ENTITY,
            "policy_diverged",
            e.to_string(),
        ),
        CampaignError::DeadlineExceeded { .. } => (
            StatusCode::SERVICE_UNAVAILABLE,
            "deadline_exceeded",
            e.to_string(),
        ),
        _ => {
            error!(error = %e, "Policy query failed");
            metrics::counter!("api.errors").increment(1);
            (
                StatusCode::INTERNAL_SERVER_ERROR,
                "internal_error",
                "Internal processing error".to_string(),
            )
        }
    };
    if status != StatusCode::INTERNAL_SERVER_ERROR {
        warn!(error = %e, status = status.as_u16(), "Rejected policy query");
    }
    (
        status,
        Json(ErrorResponse {
            error: error.to_string(),
            message,
        }),
    )
}

/// POST /get-next-action: Greedy next action after applying `action` to `state`.
#[utoipa::path(
    post,
    path = "/get-next-action",
    tag = "Policy",
    request_body = NextActionRequest,
    responses(
        (status = 200, description = "Recommended next action", body = NextActionResponse),
        (status = 400, description = "State out of range", body = ErrorResponse),
    )
)]
pub async fn get_next_action(
    State(state): State<AppState>,
    Json(request): Json<NextActionRequest>,
) -> Result<Json<NextActionResponse>, ApiError> {
    metrics::counter!("api.next_action.requests").increment(1);

    let campaign_state = CampaignState::from_wire(&request.state).map_err(reject)?;
    // Negative ids are just another invalid action.
    let action = usize::try_from(request.action).unwrap_or(usize::MAX);

    let snapshot = state.engine.current();
    let next_action = snapshot
        .next_action(campaign_state, action)
        .map_err(reject)?;
    Ok(Json(NextActionResponse { next_action }))
}

/// GET /campaign-audience: Audience permutations for an email subject.
#[utoipa::path(
    get,
    path = "/campaign-audience",
    tag = "Policy",
    params(AudienceQuery),
    responses(
        (status = 200, description = "Audience report", body = AudienceReport),
        (status = 400, description = "Unknown subject", body = ErrorResponse),
        (status = 422, description = "Policy did not terminate", body = ErrorResponse),
        (status = 503, description = "Rollout deadline exceeded", body = ErrorResponse),
    )
)]
pub async fn campaign_audience(
    State(state): State<AppState>,
    Query(query): Query<AudienceQuery>,
) -> Result<Json<AudienceReport>, ApiError> {
    metrics::counter!("api.audience.requests").increment(1);
    let started = Instant::now();

    let subject_id = u32::try_from(query.subject_id).map_err(|_| {
        reject(CampaignError::validation(format!(
            "subjectId {} is out of range",
            query.subject_id
        )))
    })?;

    let snapshot = state.engine.current();
    let reports = state.reports.clone();
    let report = tokio::task::spawn_blocking(move || reports.for_subject(&snapshot, subject_id))
        .await
        .map_err(|e| reject(CampaignError::Internal(e.into())))?
        .map_err(reject)?;

    metrics::histogram!("api.audience.latency_us").record(started.elapsed().as_micros() as f64);
    Ok(Json(report))
}

/// GET /health: Health check endpoint.
#[utoipa::path(
    get,
    path = "/health",
    tag = "Operations",
    responses((status = 200, description = "Service health", body = HealthResponse))
)]
pub async fn health_check(State(state): State<AppState>) -> Json<HealthResponse> {
    let snapshot = state.engine.current();
    Json(HealthResponse {
        status: "healthy".to_string(),
        node_id: state.node_id.clone(),
        uptime_secs: state.start_time.elapsed().as_secs(),
        policy_states: snapshot.space().total_states(),
        policy_run_id: snapshot.metadata().map(|m| m.run_id.to_string()),
    })
}

/// GET /ready: Readiness probe. Ready once a non-empty policy is loaded.
#[utoipa::path(
    get,
    path = "/ready",
    tag = "Operations",
    responses(
        (status = 200, description = "Ready"),
        (status = 503, description = "No policy loaded"),
    )
)]
pub async fn readiness(State(state): State<AppState>) -> StatusCode {
    if state.engine.current().q_table().states() > 0 {
        StatusCode::OK
    } else {
        StatusCode::SERVICE_UNAVAILABLE
    }
}

/// GET /live: Liveness probe.
#[utoipa::path(
    get,
    path = "/live",
    tag = "Operations",
    responses((status = 200, description = "Alive"))
)]
pub async fn liveness() -> StatusCode {
    StatusCode::OK
}

#[derive(Debug, Serialize, Deserialize, ToSchema)]
pub struct ErrorResponse {
    pub error: String,
    pub message: String,
}

#[derive(Debug, Serialize, Deserialize, ToSchema)]
pub struct HealthResponse {
    pub status: String,
    pub node_id: String,
    pub uptime_secs: u64,
    pub policy_states: usize,
    pub policy_run_id: Option<String>,
}
