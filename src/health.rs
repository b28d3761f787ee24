use std::path::Path;
use std::sync::Arc;

use axum::extract::State;
use axum::http::StatusCode;
use axum::response::IntoResponse;
use axum::Json;
use serde::Serialize;

use crate::git::commands::git_version;
use crate::server::GitServer;

// ---------------------------------------------------------------------------
// Response types
// ---------------------------------------------------------------------------

#[derive(Debug, Serialize)]
pub struct HealthResponse {
    pub status: HealthStatus,
    pub checks: HealthChecks,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum HealthStatus {
    Ok,
    Unhealthy,
}

#[derive(Debug, Serialize)]
pub struct HealthChecks {
    pub root_dir: CheckResult,
    pub git: CheckResult,
}

#[derive(Debug, Serialize)]
pub struct CheckResult {
    pub ok: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub detail: Option<String>,
}

impl CheckResult {
    fn healthy(detail: Option<String>) -> Self {
        Self { ok: true, detail }
    }

    fn unhealthy(detail: impl Into<String>) -> Self {
        Self {
            ok: false,
            detail: Some(detail.into()),
        }
    }
}

// ---------------------------------------------------------------------------
// Individual checks
// ---------------------------------------------------------------------------

async fn check_root_dir(root: &Path) -> CheckResult {
    match tokio::fs::read_dir(root).await {
        Ok(_) => CheckResult::healthy(None),
        Err(e) => CheckResult::unhealthy(format!("cannot read {}: {e}", root.display())),
    }
}

async fn check_git(git_path: &Path) -> CheckResult {
    match git_version(git_path).await {
        Ok(version) => CheckResult::healthy(Some(version)),
        Err(e) => CheckResult::unhealthy(format!("{e:#}")),
    }
}

fn aggregate_status(checks: &HealthChecks) -> HealthStatus {
    if checks.root_dir.ok && checks.git.ok {
        HealthStatus::Ok
    } else {
        HealthStatus::Unhealthy
    }
}

// ---------------------------------------------------------------------------
// Axum handler
// ---------------------------------------------------------------------------

/// `GET /healthz` handler.  Returns 200 when every check passes, 503
/// otherwise.
pub async fn handle_health(State(server): State<Arc<GitServer>>) -> impl IntoResponse {
    let (root_dir, git) = tokio::join!(
        check_root_dir(&server.config.root_dir),
        check_git(&server.config.git_path),
    );

    let checks = HealthChecks { root_dir, git };
    let status = aggregate_status(&checks);
    let body = HealthResponse { status, checks };

    let http_status = match status {
        HealthStatus::Ok => StatusCode::OK,
        HealthStatus::Unhealthy => StatusCode::SERVICE_UNAVAILABLE,
    };

    (http_status, Json(body))
}
