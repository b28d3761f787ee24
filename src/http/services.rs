//! Static route table for the dispatcher.
//!
//! Routing is done by method and path *suffix*: whatever precedes the suffix
//! is the repository name, which may span any number of namespace segments.
//! That shape does not fit axum's segment-based router, so the dispatcher
//! walks this table instead.

use axum::http::Method;

use crate::git::commands::Rpc;
use crate::metrics::ServiceLabel;

/// What a matched route does.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ServiceKind {
    InfoRefs,
    Rpc(Rpc),
    ListRepos,
    CreateRepo,
    DeleteRepo,
}

impl ServiceKind {
    /// Routes that operate on one named repository.
    pub fn needs_repo_name(self) -> bool {
        !matches!(self, Self::ListRepos)
    }

    /// Routes that require the repository to already exist (or be
    /// auto-created) before the handler runs.
    pub fn needs_existing_repo(self) -> bool {
        !matches!(self, Self::ListRepos | Self::CreateRepo)
    }

    /// Routes that may create a missing repository on the fly.
    pub fn may_auto_create(self) -> bool {
        matches!(self, Self::InfoRefs | Self::Rpc(_))
    }

    pub fn label(self) -> ServiceLabel {
        match self {
            Self::InfoRefs => ServiceLabel::InfoRefs,
            Self::Rpc(Rpc::UploadPack) => ServiceLabel::UploadPack,
            Self::Rpc(Rpc::ReceivePack) => ServiceLabel::ReceivePack,
            Self::ListRepos => ServiceLabel::ListRepos,
            Self::CreateRepo => ServiceLabel::CreateRepo,
            Self::DeleteRepo => ServiceLabel::DeleteRepo,
        }
    }
}

/// One entry of the route table.
#[derive(Debug, Clone)]
pub struct Service {
    pub method: Method,
    pub suffix: &'static str,
    pub kind: ServiceKind,
}

/// The routes in match order.  The first entry whose method matches and
/// whose suffix ends the path wins.
pub fn service_table() -> Vec<Service> {
    vec![
        Service {
            method: Method::GET,
            suffix: "/info/refs",
            kind: ServiceKind::InfoRefs,
        },
        Service {
            method: Method::POST,
            suffix: "/git-upload-pack",
            kind: ServiceKind::Rpc(Rpc::UploadPack),
        },
        Service {
            method: Method::POST,
            suffix: "/git-receive-pack",
            kind: ServiceKind::Rpc(Rpc::ReceivePack),
        },
        Service {
            method: Method::GET,
            suffix: "/repos",
            kind: ServiceKind::ListRepos,
        },
        Service {
            method: Method::POST,
            suffix: "/repo",
            kind: ServiceKind::CreateRepo,
        },
        Service {
            method: Method::DELETE,
            suffix: "/repo",
            kind: ServiceKind::DeleteRepo,
        },
    ]
}

/// Find the route for `method` + `path`, returning it together with the
/// part of the path that precedes the suffix.
pub fn find_service<'s, 'p>(
    services: &'s [Service],
    method: &Method,
    path: &'p str,
) -> Option<(&'s Service, &'p str)> {
    services.iter().find_map(|service| {
        if service.method != *method {
            return None;
        }
        path.strip_suffix(service.suffix)
            .map(|remainder| (service, remainder))
    })
}
