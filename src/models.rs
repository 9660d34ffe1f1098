//! Shared API models
//!
//! Request and response bodies used by the web API.

use crate::event_log_service::PlateStatus;
use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};

/// Standard API response wrapper
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ApiResponse<T> {
    pub ok: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub data: Option<T>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl<T> ApiResponse<T> {
    pub fn success(data: T) -> Self {
        Self {
            ok: true,
            data: Some(data),
            error: None,
        }
    }

    pub fn error(message: impl Into<String>) -> Self {
        Self {
            ok: false,
            data: None,
            error: Some(message.into()),
        }
    }
}

/// Health check response
#[derive(Debug, Serialize, Deserialize)]
pub struct HealthResponse {
    pub status: String,
    pub version: String,
    pub uptime_sec: u64,
    pub active_cameras: usize,
    pub ws_connections: u64,
}

/// System load and camera count
#[derive(Debug, Serialize, Deserialize)]
pub struct SystemStatus {
    pub cpu_percent: f32,
    pub memory_percent: f32,
    pub memory_used_gb: f64,
    pub memory_total_gb: f64,
    pub overloaded: bool,
    pub active_cameras: usize,
}

/// Today's detection counters (UTC day)
#[derive(Debug, Default, Serialize, Deserialize, PartialEq, Eq)]
pub struct DetectionStats {
    pub total_today: u64,
    pub allowed_today: u64,
    pub blocked_today: u64,
    pub unknown_today: u64,
}

/// Result of a start request
#[derive(Debug, Serialize, Deserialize)]
pub struct CameraStartResponse {
    pub camera_id: String,
    /// "started" or "already running"
    pub message: String,
    pub simulated: bool,
}

/// Result of a stop request
#[derive(Debug, Serialize, Deserialize)]
pub struct CameraStopResponse {
    pub camera_id: String,
    pub stopped: bool,
}

/// Manual door open result
#[derive(Debug, Serialize, Deserialize)]
pub struct DoorOpenResponse {
    pub success: bool,
    pub message: String,
}

/// Query parameters of the detection list
#[derive(Debug, Default, Deserialize)]
pub struct DetectionQuery {
    /// Inclusive day, `YYYY-MM-DD`
    pub start_date: Option<NaiveDate>,
    /// Inclusive day, `YYYY-MM-DD`
    pub end_date: Option<NaiveDate>,
    pub status: Option<PlateStatus>,
    pub camera_id: Option<String>,
    pub limit: Option<u32>,
}

/// `GET /api/detections/recent` parameters
#[derive(Debug, Default, Deserialize)]
pub struct RecentQuery {
    pub camera_id: Option<String>,
}

/// Start of the UTC day containing `now`
pub fn start_of_day(now: DateTime<Utc>) -> DateTime<Utc> {
    now.date_naive()
        .and_hms_opt(0, 0, 0)
        .map(|dt| dt.and_utc())
        .unwrap_or(now)
}

/// Last representable instant of the given UTC day
pub fn end_of_day(day: NaiveDate) -> Option<DateTime<Utc>> {
    day.and_hms_milli_opt(23, 59, 59, 999).map(|dt| dt.and_utc())
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    #[test]
    fn test_api_response_skips_empty_fields() {
        let ok = serde_json::to_value(ApiResponse::success(3)).unwrap();
        assert_eq!(ok, serde_json::json!({"ok": true, "data": 3}));

        let err = serde_json::to_value(ApiResponse::<()>::error("nope")).unwrap();
        assert_eq!(err, serde_json::json!({"ok": false, "error": "nope"}));
    }

    #[test]
    fn test_day_bounds() {
        let now = Utc.with_ymd_and_hms(2024, 5, 6, 17, 30, 0).unwrap();
        assert_eq!(start_of_day(now), Utc.with_ymd_and_hms(2024, 5, 6, 0, 0, 0).unwrap());

        let end = end_of_day(now.date_naive()).unwrap();
        assert!(end > Utc.with_ymd_and_hms(2024, 5, 6, 23, 59, 59).unwrap());
        assert!(end < Utc.with_ymd_and_hms(2024, 5, 7, 0, 0, 0).unwrap());
    }

    #[test]
    fn test_detection_query_parses_dates() {
        let q: DetectionQuery =
            serde_json::from_str(r#"{"start_date":"2024-05-01","status":"blocked"}"#).unwrap();
        assert_eq!(q.start_date, NaiveDate::from_ymd_opt(2024, 5, 1));
        assert_eq!(q.status, Some(PlateStatus::Blocked));
        assert!(q.end_date.is_none());
    }
}
