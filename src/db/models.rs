//! Database model types.

use chrono::{DateTime, Utc};
use serde::{Serialize, Serializer};

/// The outcome of a single probe against the monitored target.
///
/// Use [`ProbeResult::from_status`] or [`ProbeResult::failed`] to build one;
/// they keep `status_code` and `error` mutually exclusive.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ProbeResult {
    /// When the probe was issued.
    pub timestamp: DateTime<Utc>,
    pub success: bool,
    /// Absent when the request failed before a response arrived.
    pub status_code: Option<u16>,
    /// Seconds from request start to response completion or failure.
    pub response_time: f64,
    /// Failure class, only set when no status code was obtained.
    pub error: Option<String>,
}

impl ProbeResult {
    /// A probe that received an HTTP response.
    pub fn from_status(
        timestamp: DateTime<Utc>,
        status_code: u16,
        response_time: f64,
        healthy: bool,
    ) -> Self {
        Self {
            timestamp,
            success: healthy,
            status_code: Some(status_code),
            response_time,
            error: None,
        }
    }

    /// A probe that failed before any response was received.
    pub fn failed(timestamp: DateTime<Utc>, response_time: f64, error: impl Into<String>) -> Self {
        Self {
            timestamp,
            success: false,
            status_code: None,
            response_time,
            error: Some(error.into()),
        }
    }
}

/// Aggregate view over the stored results.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct MonitorState {
    pub total_checks: u64,
    pub successful_checks: u64,
    #[serde(serialize_with = "round_two_places")]
    pub uptime_percentage: f64,
    /// Mean response time in seconds, `None` when nothing was recorded.
    pub average_response_time: Option<f64>,
    /// Served at the top level of the status response instead.
    #[serde(skip_serializing)]
    pub last_result: Option<ProbeResult>,
}

impl Default for MonitorState {
    fn default() -> Self {
        Self {
            total_checks: 0,
            successful_checks: 0,
            uptime_percentage: 100.0,
            average_response_time: None,
            last_result: None,
        }
    }
}

fn round_two_places<S: Serializer>(value: &f64, serializer: S) -> Result<S::Ok, S::Error> {
    serializer.serialize_f64((value * 100.0).round() / 100.0)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_constructors_keep_status_and_error_exclusive() {
        let now = Utc::now();

        let ok = ProbeResult::from_status(now, 200, 0.15, true);
        assert!(ok.success);
        assert_eq!(ok.status_code, Some(200));
        assert!(ok.error.is_none());

        let unhealthy = ProbeResult::from_status(now, 503, 0.2, false);
        assert!(!unhealthy.success);
        assert_eq!(unhealthy.status_code, Some(503));
        assert!(unhealthy.error.is_none());

        let failed = ProbeResult::failed(now, 10.0, "timeout");
        assert!(!failed.success);
        assert!(failed.status_code.is_none());
        assert_eq!(failed.error.as_deref(), Some("timeout"));
    }

    #[test]
    fn test_probe_result_json_shape() {
        let failed = ProbeResult::failed(Utc::now(), 10.0, "timeout");
        let json = serde_json::to_value(&failed).unwrap();

        assert_eq!(json["success"], false);
        assert!(json["status_code"].is_null());
        assert_eq!(json["response_time"], 10.0);
        assert_eq!(json["error"], "timeout");
        assert!(json["timestamp"].as_str().unwrap().ends_with('Z'));
    }

    #[test]
    fn test_uptime_serialized_with_two_decimals() {
        let state = MonitorState {
            total_checks: 3,
            successful_checks: 2,
            uptime_percentage: 200.0 / 3.0,
            ..Default::default()
        };
        let json = serde_json::to_value(&state).unwrap();
        assert_eq!(json["uptime_percentage"], 66.67);
    }
}
