//! Repository lifecycle endpoints: create, list and delete.
//!
//! Responses use a small JSON envelope whose `code` mirrors the HTTP status.

use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde::Serialize;

use super::context::RequestContext;
use super::handler::AppError;
use crate::git::bare_repo::RepoError;
use crate::server::GitServer;

// ---------------------------------------------------------------------------
// Response envelope
// ---------------------------------------------------------------------------

#[derive(Debug, Serialize)]
pub struct KitResponse<T> {
    pub code: u16,
    pub data: T,
}

#[derive(Debug, Serialize)]
pub struct RepoPathData {
    #[serde(rename = "repoPath")]
    pub repo_path: String,
}

#[derive(Debug, Serialize)]
pub struct RepoListData {
    #[serde(rename = "repoPath")]
    pub repo_path: Vec<String>,
}

impl<T: Serialize> KitResponse<T> {
    fn new(status: StatusCode, data: T) -> Self {
        Self {
            code: status.as_u16(),
            data,
        }
    }
}

impl<T: Serialize> IntoResponse for KitResponse<T> {
    fn into_response(self) -> Response {
        let status = StatusCode::from_u16(self.code).unwrap_or(StatusCode::INTERNAL_SERVER_ERROR);
        (status, Json(self)).into_response()
    }
}

fn repo_path(status: StatusCode, ctx: &RequestContext) -> Response {
    KitResponse::new(
        status,
        RepoPathData {
            repo_path: ctx.repo_name.clone(),
        },
    )
    .into_response()
}

// ---------------------------------------------------------------------------
// Handlers
// ---------------------------------------------------------------------------

/// `POST /<repo>/repo`: 201 when created, 409 when it already exists.
pub async fn create_repo(server: &GitServer, ctx: &RequestContext) -> Result<Response, AppError> {
    if server.repos.exists(&ctx.repo_path).await {
        return Ok(repo_path(StatusCode::CONFLICT, ctx));
    }

    server
        .repos
        .create(&ctx.repo_name)
        .await
        .map_err(AppError::internal("repo-init"))?;
    server.metrics.metrics.repos_created_total.inc();

    Ok(repo_path(StatusCode::CREATED, ctx))
}

/// `GET /repos`
pub async fn list_repos(server: &GitServer, ctx: &RequestContext) -> Result<Response, AppError> {
    let repos = server
        .repos
        .list(ctx)
        .await
        .map_err(AppError::internal("list repo"))?;

    Ok(KitResponse::new(StatusCode::OK, RepoListData { repo_path: repos }).into_response())
}

/// `DELETE /<repo>/repo`: 202 once the directory is gone.
pub async fn delete_repo(server: &GitServer, ctx: &RequestContext) -> Result<Response, AppError> {
    match server.repos.delete(&ctx.repo_name).await {
        Ok(_) => {
            server.metrics.metrics.repos_deleted_total.inc();
            Ok(repo_path(StatusCode::ACCEPTED, ctx))
        }
        Err(RepoError::EmptyName) => Ok(repo_path(StatusCode::BAD_REQUEST, ctx)),
        Err(e) => Err(AppError::Internal("find repo", e.into())),
    }
}
