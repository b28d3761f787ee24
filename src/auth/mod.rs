//! Authentication and authorisation subsystem.
//!
//! The server never decides on its own who may do what.  It extracts a
//! [`Credential`] from the request and asks an injected [`Authorizer`];
//! repository listings are passed through an injected [`RepoFilter`].
//! Both capabilities are shared by every in-flight request, hence the
//! `Send + Sync` bounds.

pub mod credential;
pub mod gate;
pub mod users;

use anyhow::Result;

use crate::http::context::RequestContext;

pub use credential::extract_credential;
pub use gate::{AuthGate, AuthRejection};
pub use users::StaticAuthorizer;

/// Caller identity pulled from the `Authorization` header.
///
/// Either `username` + `password` (HTTP Basic) or `token` is populated,
/// never both.
#[derive(Clone, Default, PartialEq, Eq)]
pub struct Credential {
    pub username: String,
    pub password: String,
    pub token: String,
}

impl std::fmt::Debug for Credential {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Credential")
            .field("username", &self.username)
            .field("password", &"<redacted>")
            .field("token", &"<redacted>")
            .finish()
    }
}

/// Decides whether a request may proceed.
///
/// An `Err` and `Ok(false)` are both treated as a denial; the error is only
/// logged.
#[async_trait::async_trait]
pub trait Authorizer: Send + Sync {
    async fn authorize(&self, credential: &Credential, request: &RequestContext) -> Result<bool>;
}

#[async_trait::async_trait]
impl<F> Authorizer for F
where
    F: Fn(&Credential, &RequestContext) -> Result<bool> + Send + Sync,
{
    async fn authorize(&self, credential: &Credential, request: &RequestContext) -> Result<bool> {
        self(credential, request)
    }
}

/// Redacts repositories the requester is not allowed to see.
pub trait RepoFilter: Send + Sync {
    fn filter(&self, repos: Vec<String>, request: &RequestContext) -> Vec<String>;
}

impl<F> RepoFilter for F
where
    F: Fn(Vec<String>, &RequestContext) -> Vec<String> + Send + Sync,
{
    fn filter(&self, repos: Vec<String>, request: &RequestContext) -> Vec<String> {
        self(repos, request)
    }
}

/// Filter that returns every repository unchanged.
#[derive(Debug, Clone, Copy, Default)]
pub struct ShowAll;

impl RepoFilter for ShowAll {
    fn filter(&self, repos: Vec<String>, _request: &RequestContext) -> Vec<String> {
        repos
    }
}
