use std::sync::Arc;

use prometheus_client::encoding::{EncodeLabelSet, EncodeLabelValue};
use prometheus_client::metrics::counter::Counter;
use prometheus_client::metrics::family::Family;
use prometheus_client::metrics::gauge::Gauge;
use prometheus_client::registry::Registry;

use crate::git::commands::Rpc;

// ---------------------------------------------------------------------------
// Label types
// ---------------------------------------------------------------------------

#[derive(Clone, Debug, Hash, PartialEq, Eq, EncodeLabelValue)]
pub enum ServiceLabel {
    InfoRefs,
    UploadPack,
    ReceivePack,
    ListRepos,
    CreateRepo,
    DeleteRepo,
}

#[derive(Clone, Debug, Hash, PartialEq, Eq, EncodeLabelSet)]
pub struct ServiceLabels {
    pub service: ServiceLabel,
}

#[derive(Clone, Debug, Hash, PartialEq, Eq, EncodeLabelValue)]
pub enum RpcLabel {
    UploadPack,
    ReceivePack,
}

impl From<Rpc> for RpcLabel {
    fn from(rpc: Rpc) -> Self {
        match rpc {
            Rpc::UploadPack => Self::UploadPack,
            Rpc::ReceivePack => Self::ReceivePack,
        }
    }
}

#[derive(Clone, Debug, Hash, PartialEq, Eq, EncodeLabelSet)]
pub struct RpcLabels {
    pub rpc: RpcLabel,
}

// ---------------------------------------------------------------------------
// Metrics struct
// ---------------------------------------------------------------------------

/// Every Prometheus metric exposed by the server.
pub struct Metrics {
    pub requests_total: Family<ServiceLabels, Counter>,
    pub auth_failures_total: Counter,
    pub git_processes_total: Family<RpcLabels, Counter>,
    pub repos_created_total: Counter,
    pub repos_deleted_total: Counter,
    pub active_streams: Gauge,
}

impl Metrics {
    /// Create a new [`Metrics`] instance and register every metric with the
    /// supplied `registry`.
    pub fn new(registry: &mut Registry) -> Self {
        let requests_total = Family::<ServiceLabels, Counter>::default();
        registry.register(
            "gitserve_requests",
            "Routed requests by service",
            requests_total.clone(),
        );

        let auth_failures_total = Counter::default();
        registry.register(
            "gitserve_auth_failures",
            "Requests rejected by the authentication gate",
            auth_failures_total.clone(),
        );

        let git_processes_total = Family::<RpcLabels, Counter>::default();
        registry.register(
            "gitserve_git_processes",
            "git stateless-rpc processes spawned",
            git_processes_total.clone(),
        );

        let repos_created_total = Counter::default();
        registry.register(
            "gitserve_repos_created",
            "Repositories created (explicitly or on first use)",
            repos_created_total.clone(),
        );

        let repos_deleted_total = Counter::default();
        registry.register(
            "gitserve_repos_deleted",
            "Repositories deleted",
            repos_deleted_total.clone(),
        );

        let active_streams: Gauge = Gauge::default();
        registry.register(
            "gitserve_active_streams",
            "Responses currently streaming git output",
            active_streams.clone(),
        );

        Self {
            requests_total,
            auth_failures_total,
            git_processes_total,
            repos_created_total,
            repos_deleted_total,
            active_streams,
        }
    }
}

// ---------------------------------------------------------------------------
// Shared handle
// ---------------------------------------------------------------------------

/// Thread-safe wrapper for the metrics registry, held by the server.
#[derive(Clone)]
pub struct MetricsRegistry {
    pub registry: Arc<Registry>,
    pub metrics: Arc<Metrics>,
}

impl MetricsRegistry {
    /// Build a fresh registry and pre-register all server metrics.
    pub fn new() -> Self {
        let mut registry = Registry::default();
        let metrics = Metrics::new(&mut registry);
        Self {
            registry: Arc::new(registry),
            metrics: Arc::new(metrics),
        }
    }

    /// Render the registry in OpenMetrics text format.
    pub fn encode(&self) -> anyhow::Result<String> {
        let mut buf = String::new();
        prometheus_client::encoding::text::encode(&mut buf, &self.registry)
            .map_err(|e| anyhow::anyhow!("metrics encoding failed: {e}"))?;
        Ok(buf)
    }
}

impl Default for MetricsRegistry {
    fn default() -> Self {
        Self::new()
    }
}
