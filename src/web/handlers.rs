//! HTTP request handlers.

use super::{ApiError, AppState};
use crate::db::{MonitorState, ProbeResult};
use crate::scheduler::SchedulerStatus;

use axum::{
    extract::{Query, State},
    response::Json,
};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Results embedded in the status response for the dashboard.
const STATUS_CHECKS: usize = 10;

/// Upper bound for `GET /api/history?limit=`.
pub const MAX_HISTORY_LIMIT: usize = 1000;

// ============================================================================
// Status
// ============================================================================

#[derive(Debug, Serialize)]
pub struct StatusResponse {
    pub last_result: Option<ProbeResult>,
    pub checks: Vec<ProbeResult>,
    pub statistics: MonitorState,
    pub monitoring_info: SchedulerStatus,
}

pub async fn handle_status(
    State(state): State<AppState>,
) -> Result<Json<StatusResponse>, ApiError> {
    let (statistics, checks) = state.store.status_snapshot(STATUS_CHECKS)?;

    Ok(Json(StatusResponse {
        last_result: statistics.last_result.clone(),
        checks,
        statistics,
        monitoring_info: state.scheduler.status(),
    }))
}

// ============================================================================
// History
// ============================================================================

#[derive(Debug, Deserialize)]
pub struct HistoryQuery {
    #[serde(default)]
    pub limit: Option<String>,
}

pub async fn handle_history(
    State(state): State<AppState>,
    Query(query): Query<HistoryQuery>,
) -> Result<Json<Vec<ProbeResult>>, ApiError> {
    let limit = parse_limit(query.limit.as_deref())?;
    Ok(Json(state.store.recent(limit)?))
}

fn parse_limit(raw: Option<&str>) -> Result<Option<usize>, ApiError> {
    let Some(raw) = raw else {
        return Ok(None);
    };
    match raw.trim().parse::<usize>() {
        Ok(0) | Err(_) => Err(ApiError::BadRequest(format!(
            "limit must be a positive integer, got {:?}",
            raw
        ))),
        Ok(limit) => Ok(Some(limit.min(MAX_HISTORY_LIMIT))),
    }
}

// ============================================================================
// Manual check and control
// ============================================================================

pub async fn handle_check_now(
    State(state): State<AppState>,
) -> Result<Json<ProbeResult>, ApiError> {
    Ok(Json(state.scheduler.trigger_now().await?))
}

#[derive(Debug, Deserialize)]
pub struct ControlRequest {
    pub action: String,
}

#[derive(Debug, Serialize)]
pub struct ControlResponse {
    pub message: &'static str,
    pub active: bool,
}

pub async fn handle_control(
    State(state): State<AppState>,
    Json(req): Json<ControlRequest>,
) -> Result<Json<ControlResponse>, ApiError> {
    let (active, message) = match req.action.as_str() {
        "stop" => (false, "Monitoring stopped"),
        "start" => (true, "Monitoring started"),
        _ => {
            return Err(ApiError::BadRequest(
                "Invalid action. Use 'start' or 'stop'".to_string(),
            ))
        }
    };

    state.scheduler.set_active(active);
    Ok(Json(ControlResponse { message, active }))
}

// ============================================================================
// Health
// ============================================================================

#[derive(Debug, Serialize)]
pub struct HealthResponse {
    pub status: &'static str,
    pub timestamp: DateTime<Utc>,
    pub monitoring_active: bool,
    pub total_checks: u64,
}

pub async fn handle_health(State(state): State<AppState>) -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "healthy",
        timestamp: Utc::now(),
        monitoring_active: state.scheduler.status().monitoring_active,
        total_checks: state.store.statistics().total_checks,
    })
}
