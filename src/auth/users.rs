//! Authorizer backed by the users and tokens listed in the config file.
//!
//! Only SHA-256 digests of passwords and tokens are configured, so raw
//! credentials never sit on disk.

use std::collections::{HashMap, HashSet};

use anyhow::Result;
use sha2::{Digest, Sha256};
use tracing::debug;

use super::{Authorizer, Credential};
use crate::config::{TokenConfig, UserConfig};
use crate::http::context::RequestContext;

/// Admits any configured user or token, for every repository.
#[derive(Debug, Clone, Default)]
pub struct StaticAuthorizer {
    users: HashMap<String, String>,
    tokens: HashSet<String>,
}

impl StaticAuthorizer {
    pub fn new(users: &[UserConfig], tokens: &[TokenConfig]) -> Self {
        Self {
            users: users
                .iter()
                .map(|u| (u.username.clone(), u.password_sha256.to_ascii_lowercase()))
                .collect(),
            tokens: tokens
                .iter()
                .map(|t| t.token_sha256.to_ascii_lowercase())
                .collect(),
        }
    }
}

/// Lowercase hex SHA-256 of `secret`.
pub fn sha256_hex(secret: &str) -> String {
    let mut hasher = Sha256::new();
    hasher.update(secret.as_bytes());
    hex::encode(hasher.finalize())
}

#[async_trait::async_trait]
impl Authorizer for StaticAuthorizer {
    async fn authorize(&self, credential: &Credential, request: &RequestContext) -> Result<bool> {
        let allowed = if !credential.token.is_empty() {
            self.tokens.contains(&sha256_hex(&credential.token))
        } else {
            self.users
                .get(&credential.username)
                .is_some_and(|digest| *digest == sha256_hex(&credential.password))
        };
        debug!(
            user = %credential.username,
            repo = %request.repo_name,
            allowed,
            "static auth decision"
        );
        Ok(allowed)
    }
}
