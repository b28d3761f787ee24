//! The assembled server: configuration plus injected capabilities.

use std::sync::Arc;

use anyhow::{bail, Result};
use tracing::info;

use crate::auth::{AuthGate, Authorizer, RepoFilter};
use crate::config::ServerConfig;
use crate::git::bare_repo::RepoStore;
use crate::git::hooks::HookInstaller;
use crate::http::services::{service_table, Service};
use crate::metrics::MetricsRegistry;

/// Shared state for every request.  Immutable once built.
pub struct GitServer {
    pub config: ServerConfig,
    pub services: Vec<Service>,
    pub gate: AuthGate,
    pub repos: RepoStore,
    pub metrics: MetricsRegistry,
}

impl GitServer {
    pub fn builder(config: ServerConfig) -> GitServerBuilder {
        GitServerBuilder {
            config,
            authorizer: None,
            repo_filter: None,
            hooks: None,
            metrics: None,
        }
    }

    /// Create the root directory and refresh hooks in existing repositories.
    pub async fn setup(&self) -> Result<()> {
        self.repos.setup().await?;
        info!(
            root = %self.config.root_dir.display(),
            auth = self.gate.is_required(),
            auto_create = self.config.auto_create,
            auto_hooks = self.config.auto_hooks,
            "git server ready"
        );
        Ok(())
    }
}

/// Collects the capabilities a [`GitServer`] needs.  [`build`] refuses to
/// produce a server that is missing one its configuration depends on.
///
/// [`build`]: GitServerBuilder::build
pub struct GitServerBuilder {
    config: ServerConfig,
    authorizer: Option<Arc<dyn Authorizer>>,
    repo_filter: Option<Arc<dyn RepoFilter>>,
    hooks: Option<Arc<dyn HookInstaller>>,
    metrics: Option<MetricsRegistry>,
}

impl GitServerBuilder {
    pub fn authorizer(mut self, authorizer: impl Authorizer + 'static) -> Self {
        self.authorizer = Some(Arc::new(authorizer));
        self
    }

    pub fn repo_filter(mut self, filter: impl RepoFilter + 'static) -> Self {
        self.repo_filter = Some(Arc::new(filter));
        self
    }

    pub fn hooks(mut self, hooks: impl HookInstaller + 'static) -> Self {
        self.hooks = Some(Arc::new(hooks));
        self
    }

    /// Use an existing registry instead of a fresh one.
    pub fn metrics(mut self, metrics: MetricsRegistry) -> Self {
        self.metrics = Some(metrics);
        self
    }

    pub fn build(self) -> Result<GitServer> {
        let Some(filter) = self.repo_filter else {
            bail!("a repository filter is required");
        };

        let gate = match (self.config.auth, self.authorizer) {
            (true, Some(authorizer)) => AuthGate::Required(authorizer),
            (true, None) => bail!("authentication is enabled but no authorizer was provided"),
            (false, _) => AuthGate::Disabled,
        };

        let hooks = match (self.config.auto_hooks, self.hooks) {
            (true, Some(hooks)) => Some(hooks),
            (true, None) => bail!("auto_hooks is enabled but no hook installer was provided"),
            (false, _) => None,
        };

        let repos = RepoStore::new(
            self.config.root_dir.clone(),
            self.config.git_path.clone(),
            hooks,
            filter,
        );

        Ok(GitServer {
            config: self.config,
            services: service_table(),
            gate,
            repos,
            metrics: self.metrics.unwrap_or_default(),
        })
    }
}
