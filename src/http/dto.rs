//! Request and response bodies for the HTTP sidecar.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::ratelimit::{AdmissionResult, OverrideRule};

/// Body of `POST /v1/check`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CheckRequest {
    /// Caller identity: account id, source address, or a combination
    pub identifier: String,
    /// Endpoint name; selects the endpoint policy and a per-endpoint quota
    #[serde(default)]
    pub endpoint: Option<String>,
    /// Per-call policy override
    #[serde(default)]
    pub policy: Option<OverrideRule>,
}

/// Admission decision as returned to HTTP callers.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CheckResponse {
    pub allowed: bool,
    pub remaining: u32,
    pub reset_time_ms: u64,
    pub reset_at: DateTime<Utc>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub retry_after_ms: Option<u64>,
}

impl From<AdmissionResult> for CheckResponse {
    fn from(result: AdmissionResult) -> Self {
        Self {
            allowed: result.allowed,
            remaining: result.remaining,
            reset_time_ms: result.reset_time,
            reset_at: DateTime::from_timestamp_millis(result.reset_time as i64).unwrap_or_default(),
            retry_after_ms: result.retry_after.map(|d| d.as_millis() as u64),
        }
    }
}

/// Error body shared by all routes.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ErrorBody {
    pub success: bool,
    pub error: String,
}
