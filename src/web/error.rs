//! API error responses.

use crate::db::StoreError;
use crate::scheduler::TriggerError;

use axum::{
    http::{header, StatusCode},
    response::{IntoResponse, Response},
    Json,
};
use serde_json::json;

/// Error type returned by the API handlers.
#[derive(Debug)]
pub enum ApiError {
    BadRequest(String),
    Trigger(TriggerError),
    Store(StoreError),
}

impl From<TriggerError> for ApiError {
    fn from(err: TriggerError) -> Self {
        ApiError::Trigger(err)
    }
}

impl From<StoreError> for ApiError {
    fn from(err: StoreError) -> Self {
        ApiError::Store(err)
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        match self {
            ApiError::BadRequest(message) => {
                (StatusCode::BAD_REQUEST, Json(json!({ "error": message }))).into_response()
            }
            ApiError::Trigger(TriggerError::CoolingDown { retry_after }) => {
                let wait = retry_after.as_secs().max(1);
                (
                    StatusCode::TOO_MANY_REQUESTS,
                    [(header::RETRY_AFTER, wait.to_string())],
                    Json(json!({
                        "error": format!("Please wait {} seconds between manual checks.", wait),
                        "next_check_in": wait,
                    })),
                )
                    .into_response()
            }
            ApiError::Trigger(TriggerError::InFlight) => (
                StatusCode::TOO_MANY_REQUESTS,
                Json(json!({ "error": "A check is already in progress. Try again shortly." })),
            )
                .into_response(),
            ApiError::Trigger(err @ (TriggerError::Stopped | TriggerError::Paused)) => (
                StatusCode::SERVICE_UNAVAILABLE,
                Json(json!({ "error": err.to_string() })),
            )
                .into_response(),
            ApiError::Trigger(err) => internal_error(&err),
            ApiError::Store(err) => internal_error(&err),
        }
    }
}

fn internal_error(err: &dyn std::error::Error) -> Response {
    // Full details go to the log only
    tracing::error!("API error: {}", err);
    (
        StatusCode::INTERNAL_SERVER_ERROR,
        Json(json!({ "error": "internal error" })),
    )
        .into_response()
}
