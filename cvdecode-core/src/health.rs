//! Advisory liveness check against the inference service

use crate::client::InferenceClient;
use crate::error::OutcomeError;
use serde::Serialize;
use tracing::{info, warn};

/// Result of a health probe
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum HealthStatus {
    /// The endpoint answered 200
    Healthy,
    /// The endpoint answered with another status
    Unhealthy { code: u16 },
    /// The request never produced a response
    Unreachable { reason: String },
}

impl HealthStatus {
    pub fn is_healthy(&self) -> bool {
        matches!(self, HealthStatus::Healthy)
    }
}

/// Probe the liveness endpoint once.
///
/// Never fails: every non-200 status and every transport error is logged as a
/// warning and reported back as data.
pub async fn probe_health(client: &InferenceClient) -> HealthStatus {
    match client.ping().await {
        Ok(status) if status.as_u16() == 200 => {
            info!("API health check status ok");
            HealthStatus::Healthy
        }
        Ok(status) => {
            warn!("API health check failed with status: {}", status.as_u16());
            HealthStatus::Unhealthy {
                code: status.as_u16(),
            }
        }
        Err(err) => {
            let reason = match err {
                OutcomeError::Transport(msg) => msg,
                other => other.to_string(),
            };
            warn!("API health check failed: {}", reason);
            HealthStatus::Unreachable { reason }
        }
    }
}
