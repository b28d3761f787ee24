//! Per-request context handed to handlers and injected capabilities.

use std::path::{Path, PathBuf};

use axum::http::{request::Parts, HeaderMap, Method, Uri};

/// A repository identifier parsed from the URL path: everything before the
/// last segment is the namespace, the last segment is the leaf.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RepoName {
    pub namespace: String,
    pub leaf: String,
}

impl RepoName {
    /// Parse `/ns/sub/repo.git` into `("ns/sub", "repo.git")`.
    ///
    /// Paths with `.`/`..` or empty segments parse as empty, so no request
    /// can address anything outside the repository root.
    pub fn parse(path: &str) -> Self {
        let path = path.strip_prefix('/').unwrap_or(path);
        if path.is_empty() {
            return Self::default();
        }

        let segments: Vec<&str> = path.split('/').collect();
        if segments
            .iter()
            .any(|s| s.is_empty() || *s == "." || *s == "..")
        {
            return Self::default();
        }

        let (leaf, namespace) = match segments.split_last() {
            Some((leaf, namespace)) => (*leaf, namespace.join("/")),
            None => return Self::default(),
        };
        Self {
            namespace,
            leaf: leaf.to_string(),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.leaf.is_empty()
    }

    /// `namespace/leaf`, or just `leaf` without a namespace.
    pub fn slug(&self) -> String {
        if self.namespace.is_empty() {
            self.leaf.clone()
        } else {
            format!("{}/{}", self.namespace, self.leaf)
        }
    }

    /// Absolute location of the repository under `root`.
    pub fn path_under(&self, root: &Path) -> PathBuf {
        let mut path = root.to_path_buf();
        if !self.namespace.is_empty() {
            path.push(&self.namespace);
        }
        if !self.leaf.is_empty() {
            path.push(&self.leaf);
        }
        path
    }
}

/// The inbound request as seen by the gate, the handlers and the injected
/// capabilities.  Built once after routing and never mutated.
#[derive(Debug, Clone)]
pub struct RequestContext {
    pub method: Method,
    pub uri: Uri,
    pub headers: HeaderMap,
    /// Namespace-joined slug, e.g. `team/project.git`.  Empty for listings.
    pub repo_name: String,
    /// `repo_name` resolved under the server's root directory.
    pub repo_path: PathBuf,
}

impl RequestContext {
    /// Name and path are derived from the same [`RepoName`] so they always
    /// agree.
    pub fn new(parts: &Parts, name: &RepoName, root: &Path) -> Self {
        Self {
            method: parts.method.clone(),
            uri: parts.uri.clone(),
            headers: parts.headers.clone(),
            repo_name: name.slug(),
            repo_path: name.path_under(root),
        }
    }

    /// Percent-decoded value of the first `key` query parameter, if present.
    pub fn query_param(&self, key: &str) -> Option<String> {
        let query = self.uri.query()?;
        form_urlencoded::parse(query.as_bytes())
            .find(|(k, _)| k == key)
            .map(|(_, v)| v.into_owned())
    }

    #[cfg(test)]
    pub(crate) fn for_test(repo: &str) -> Self {
        let name = RepoName::parse(repo);
        Self {
            method: Method::GET,
            uri: Uri::from_static("/"),
            headers: HeaderMap::new(),
            repo_name: name.slug(),
            repo_path: name.path_under(Path::new("/srv/git")),
        }
    }
}
