//! Health endpoints for container orchestration.
//!
//! The container runtime polls `GET /health` every 30 seconds with a
//! 3-second timeout (after a 20-second start grace period) to decide whether
//! the process stays in rotation. Liveness only confirms the process can
//! answer HTTP; `GET /health/ready` additionally checks the dependencies the
//! service needs to answer questions. Both are unauthenticated and must
//! respond promptly, so the readiness check runs under an internal budget
//! shorter than the prober's timeout and any internal fault is reported as
//! unhealthy instead of escaping as a crash.

use std::time::Duration;

use axum::{
    extract::State,
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde::Serialize;
use serde_json::json;

use crate::config::READY_CHECK_TIMEOUT_SECS;
use crate::state::AppState;

/// Readiness snapshot, computed fresh on every probe.
#[derive(Debug, Serialize)]
pub struct ReadinessReport {
    /// Whether the process should receive traffic.
    pub ok: bool,
    /// Index files present on disk.
    pub index_ok: bool,
    /// OpenAI credentials configured (diagnostic only; the service still
    /// serves dev-mode answers without them).
    pub api_key_present: bool,
    /// Human-readable hint for operators.
    pub detail: String,
}

/// Liveness probe: the process is running and can answer HTTP.
pub async fn live() -> impl IntoResponse {
    (StatusCode::OK, Json(json!({ "ok": true })))
}

/// Readiness probe: 200 when dependencies are in place, 503 otherwise.
pub async fn ready(State(state): State<AppState>) -> Response {
    let budget = Duration::from_secs(READY_CHECK_TIMEOUT_SECS);
    match tokio::time::timeout(budget, readiness_report(state)).await {
        Ok(report) => {
            let status = if report.ok {
                StatusCode::OK
            } else {
                StatusCode::SERVICE_UNAVAILABLE
            };
            (status, Json(report)).into_response()
        }
        Err(_) => {
            tracing::warn!("Readiness check exceeded its internal budget");
            (
                StatusCode::SERVICE_UNAVAILABLE,
                Json(ReadinessReport {
                    ok: false,
                    index_ok: false,
                    api_key_present: false,
                    detail: "readiness check timed out".to_string(),
                }),
            )
                .into_response()
        }
    }
}

async fn readiness_report(state: AppState) -> ReadinessReport {
    // File checks go to the blocking pool; a JoinError counts as unhealthy
    // rather than propagating a panic into the probe.
    let index = state.index.clone();
    let index_ok = tokio::task::spawn_blocking(move || index.files_present())
        .await
        .unwrap_or(false);

    ReadinessReport {
        ok: index_ok,
        index_ok,
        api_key_present: state.llm.has_credentials(),
        detail: format!(
            "index_ok requires {} and {}",
            state.config.index.meta_path().display(),
            state.config.index.vectors_path().display()
        ),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::AppConfig;
    use std::fs;
    use tempfile::TempDir;

    fn state_with_index_dir(dir: &TempDir) -> AppState {
        let mut config = AppConfig::default();
        config.index.dir = dir.path().to_string_lossy().into_owned();
        AppState::new(config)
    }

    #[tokio::test]
    async fn test_live_is_200() {
        let response = live().await.into_response();
        assert_eq!(response.status(), StatusCode::OK);
    }

    #[tokio::test]
    async fn test_readiness_false_without_index_files() {
        let dir = TempDir::new().unwrap();
        let report = readiness_report(state_with_index_dir(&dir)).await;
        assert!(!report.ok);
        assert!(!report.index_ok);
        assert!(!report.api_key_present);
        assert!(report.detail.contains("meta.jsonl"));
    }

    #[tokio::test]
    async fn test_readiness_true_with_index_files() {
        let dir = TempDir::new().unwrap();
        fs::write(
            dir.path().join("meta.jsonl"),
            r#"{"text":"t","source":"s.pdf","page":1}"#,
        )
        .unwrap();
        fs::write(dir.path().join("vectors.jsonl"), "[1.0, 0.0]").unwrap();

        let report = readiness_report(state_with_index_dir(&dir)).await;
        assert!(report.ok);
        assert!(report.index_ok);
    }
}
