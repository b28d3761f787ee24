//! axum router and request dispatch for the Git smart HTTP server.
//!
//! Routes:
//! - `GET    /healthz`                    - Health check
//! - `GET    /metrics`                    - Prometheus metrics
//! - `GET    /<repo>/info/refs?service=`  - Ref advertisement
//! - `POST   /<repo>/git-upload-pack`     - Fetch negotiation / pack transfer
//! - `POST   /<repo>/git-receive-pack`    - Push
//! - `GET    /repos`                      - List repositories
//! - `POST   /<repo>/repo`                - Create a repository
//! - `DELETE /<repo>/repo`                - Delete a repository
//!
//! `<repo>` is `namespace/.../leaf`, so everything except the two operational
//! routes goes through [`dispatch`] instead of axum's path router.

use std::sync::Arc;

use axum::{
    body::Body,
    extract::{Request, State},
    http::{header, StatusCode},
    response::{IntoResponse, Response},
    routing::get,
    Router,
};
use tracing::{debug, error, info, instrument};

use super::context::{RepoName, RequestContext};
use super::services::{find_service, ServiceKind};
use super::{repos, rpc};
use crate::auth::AuthRejection;
use crate::metrics::ServiceLabels;
use crate::server::GitServer;

// ---------------------------------------------------------------------------
// Router
// ---------------------------------------------------------------------------

/// Build the axum [`Router`] with all HTTP routes and shared state.
pub fn create_router(server: Arc<GitServer>) -> Router {
    Router::new()
        .route("/healthz", get(crate::health::handle_health))
        .route("/metrics", get(handle_metrics))
        .fallback(dispatch)
        .with_state(server)
}

// ---------------------------------------------------------------------------
// Dispatch
// ---------------------------------------------------------------------------

/// Route, name, authenticate, ensure the repository exists, then hand off.
/// Each step either passes or ends the request.
#[instrument(skip_all, fields(method = %request.method(), path = %request.uri().path()))]
async fn dispatch(State(server): State<Arc<GitServer>>, request: Request) -> Response {
    let host = request
        .headers()
        .get(header::HOST)
        .and_then(|v| v.to_str().ok())
        .unwrap_or_default();
    info!(method = %request.method(), host = host, uri = %request.uri(), "request");

    match dispatch_inner(server, request).await {
        Ok(response) => response,
        Err(err) => err.into_response(),
    }
}

async fn dispatch_inner(server: Arc<GitServer>, request: Request) -> Result<Response, AppError> {
    let (parts, body) = request.into_parts();

    // 1. Route.
    let (kind, name) = {
        let path = parts.uri.path();
        let (service, remainder) =
            find_service(&server.services, &parts.method, path).ok_or(AppError::Forbidden)?;

        // 2. Name.
        let name = if service.kind.needs_repo_name() {
            let name = RepoName::parse(remainder);
            if name.is_empty() {
                debug!("no repository name provided");
                return Err(AppError::BadRequest);
            }
            name
        } else {
            RepoName::default()
        };
        (service.kind, name)
    };

    server
        .metrics
        .metrics
        .requests_total
        .get_or_create(&ServiceLabels {
            service: kind.label(),
        })
        .inc();

    let ctx = RequestContext::new(&parts, &name, server.repos.root());

    // 3. Authenticate.
    if let Err(rejection) = server.gate.check(&ctx).await {
        server.metrics.metrics.auth_failures_total.inc();
        return Err(AppError::Unauthorized(rejection));
    }

    // 4. Existence, creating the repository first if allowed.
    if kind.needs_existing_repo() {
        ensure_repo(&server, kind, &ctx).await?;
    }

    // 5. Handle.
    match kind {
        ServiceKind::InfoRefs => rpc::info_refs(&server, &ctx).await,
        ServiceKind::Rpc(which) => rpc::post_rpc(&server, which, &ctx, body).await,
        ServiceKind::ListRepos => repos::list_repos(&server, &ctx).await,
        ServiceKind::CreateRepo => repos::create_repo(&server, &ctx).await,
        ServiceKind::DeleteRepo => repos::delete_repo(&server, &ctx).await,
    }
}

async fn ensure_repo(
    server: &GitServer,
    kind: ServiceKind,
    ctx: &RequestContext,
) -> Result<(), AppError> {
    if server.repos.exists(&ctx.repo_path).await {
        return Ok(());
    }

    if server.config.auto_create && kind.may_auto_create() {
        match server.repos.create(&ctx.repo_name).await {
            Ok(_) => {
                server.metrics.metrics.repos_created_total.inc();
            }
            Err(e) => error!(context = "repo-init", error = %e, "auto-create failed"),
        }
        if server.repos.exists(&ctx.repo_path).await {
            return Ok(());
        }
    }

    error!(
        context = "repo-init",
        path = %ctx.repo_path.display(),
        "repository does not exist"
    );
    Err(AppError::NotFound)
}

/// `GET /metrics`
async fn handle_metrics(State(server): State<Arc<GitServer>>) -> Result<Response, AppError> {
    let body = server
        .metrics
        .encode()
        .map_err(AppError::internal("metrics"))?;
    Ok((
        StatusCode::OK,
        [(
            header::CONTENT_TYPE,
            "application/openmetrics-text; version=1.0.0; charset=utf-8",
        )],
        body,
    )
        .into_response())
}

// ---------------------------------------------------------------------------
// Error type
// ---------------------------------------------------------------------------

/// Every way a request can end before a handler produces a response.
///
/// Bodies never carry error details; internal errors are logged once, with
/// their context tag, when converted into a response.
#[derive(Debug)]
pub enum AppError {
    /// No route matched.
    Forbidden,
    /// A repository route without a usable repository name.
    BadRequest,
    /// The authentication gate turned the request away.
    Unauthorized(AuthRejection),
    /// The repository (or the requested service) does not exist.
    NotFound,
    /// An unexpected failure, tagged with where it happened.
    Internal(&'static str, anyhow::Error),
}

impl AppError {
    /// Adapter for `map_err` that tags an error with `context`.
    pub fn internal<E: Into<anyhow::Error>>(context: &'static str) -> impl FnOnce(E) -> Self {
        move |err| AppError::Internal(context, err.into())
    }
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        match self {
            AppError::Forbidden => (StatusCode::FORBIDDEN, "Forbidden").into_response(),
            AppError::BadRequest => StatusCode::BAD_REQUEST.into_response(),
            AppError::Unauthorized(AuthRejection::Challenge) => (
                StatusCode::UNAUTHORIZED,
                [(header::WWW_AUTHENTICATE, "Basic realm=\"\"")],
                Body::empty(),
            )
                .into_response(),
            AppError::Unauthorized(AuthRejection::Denied) => {
                StatusCode::UNAUTHORIZED.into_response()
            }
            AppError::NotFound => (StatusCode::NOT_FOUND, "Not Found").into_response(),
            AppError::Internal(context, err) => {
                error!(context = context, error = %format!("{err:#}"), "internal server error");
                (StatusCode::INTERNAL_SERVER_ERROR, "Internal Server Error").into_response()
            }
        }
    }
}
