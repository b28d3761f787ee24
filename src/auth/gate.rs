//! The authentication step of request dispatch.

use std::sync::Arc;

use axum::http::header;
use tracing::warn;

use super::{extract_credential, Authorizer};
use crate::http::context::RequestContext;

/// Why a request was turned away.  Both variants become a 401.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AuthRejection {
    /// No `Authorization` header: the client should retry with credentials.
    Challenge,
    /// Credentials were present but unusable or refused.
    Denied,
}

/// Authentication policy of a server, fixed at construction.
#[derive(Clone)]
pub enum AuthGate {
    Disabled,
    Required(Arc<dyn Authorizer>),
}

impl AuthGate {
    pub fn is_required(&self) -> bool {
        matches!(self, Self::Required(_))
    }

    /// Admit or reject `request`.
    ///
    /// Failure details are logged here and never reach the client.
    pub async fn check(&self, request: &RequestContext) -> Result<(), AuthRejection> {
        let authorizer = match self {
            Self::Disabled => return Ok(()),
            Self::Required(authorizer) => authorizer,
        };

        if !request.headers.contains_key(header::AUTHORIZATION) {
            return Err(AuthRejection::Challenge);
        }

        let credential = extract_credential(&request.headers).map_err(|e| {
            warn!(context = "auth", error = %e, "unusable credentials");
            AuthRejection::Denied
        })?;

        match authorizer.authorize(&credential, request).await {
            Ok(true) => Ok(()),
            Ok(false) => {
                warn!(
                    context = "auth",
                    user = %credential.username,
                    repo = %request.repo_name,
                    "rejected user"
                );
                Err(AuthRejection::Denied)
            }
            Err(e) => {
                warn!(
                    context = "auth",
                    user = %credential.username,
                    error = %e,
                    "authorizer failed"
                );
                Err(AuthRejection::Denied)
            }
        }
    }
}
