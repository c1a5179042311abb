use chrono::{DateTime, Utc};
use serde::Serialize;

/// Health check response.
#[derive(Debug, Serialize)]
pub struct HealthResponse {
    /// Service health status
    pub status: String,
    /// Service version
    pub version: String,
    /// Whether request logging is configured
    pub log_enabled: bool,
    /// Records held by the log store, when it can tell
    pub log_records: Option<u64>,
    /// Uptime in seconds
    pub uptime_seconds: u64,
    /// Current timestamp
    pub timestamp: DateTime<Utc>,
}

/// Readiness response.
#[derive(Debug, Serialize)]
pub struct ReadinessResponse {
    pub ready: bool,
    /// Why the service is not ready, if it is not
    #[serde(skip_serializing_if = "Option::is_none")]
    pub reason: Option<String>,
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use super::*;

    #[test]
    fn test_health_response_serialization() {
        let response = HealthResponse {
            status: "healthy".to_string(),
            version: "0.1.0".to_string(),
            log_enabled: true,
            log_records: Some(3),
            uptime_seconds: 12,
            timestamp: Utc::now(),
        };

        let json = serde_json::to_string(&response).expect("Serialization should succeed");
        assert!(json.contains("\"status\":\"healthy\""));
        assert!(json.contains("\"log_records\":3"));
    }

    #[test]
    fn test_readiness_omits_empty_reason() {
        let json = serde_json::to_string(&ReadinessResponse {
            ready: true,
            reason: None,
        })
        .expect("Serialization should succeed");
        assert_eq!(json, r#"{"ready":true}"#);
    }
}
