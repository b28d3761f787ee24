//! Bare Git repository lifecycle management.
//!
//! [`RepoStore`] owns the root directory under which repositories live as
//! `namespace/leaf.git`.  Nothing is cached: existence is re-read from the
//! filesystem on every call, and concurrent create/delete of the same name
//! race exactly as the underlying filesystem operations do.

use std::io;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use anyhow::{Context, Result};
use tracing::{debug, instrument};

use super::commands::git_init_bare;
use super::hooks::HookInstaller;
use crate::auth::RepoFilter;
use crate::http::context::RequestContext;

/// Suffix a directory name needs to show up in listings.
pub const REPO_SUFFIX: &str = ".git";

/// Lifecycle failures the HTTP layer needs to tell apart.
#[derive(Debug, thiserror::Error)]
pub enum RepoError {
    #[error("no repository name provided")]
    EmptyName,

    #[error("repository {} not found: {source}", .path.display())]
    NotFound { path: PathBuf, source: io::Error },

    #[error(transparent)]
    Other(#[from] anyhow::Error),
}

/// Creates, lists and deletes bare repositories under one root directory.
pub struct RepoStore {
    root: PathBuf,
    git_path: PathBuf,
    hooks: Option<Arc<dyn HookInstaller>>,
    filter: Arc<dyn RepoFilter>,
}

impl RepoStore {
    /// `hooks` is only `Some` when hooks should be installed automatically.
    pub fn new(
        root: PathBuf,
        git_path: PathBuf,
        hooks: Option<Arc<dyn HookInstaller>>,
        filter: Arc<dyn RepoFilter>,
    ) -> Self {
        Self {
            root,
            git_path,
            hooks,
            filter,
        }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    // -----------------------------------------------------------------------
    // Setup
    // -----------------------------------------------------------------------

    /// Create the root directory if needed and, when hooks are managed,
    /// (re)install them into every existing repository.
    #[instrument(skip(self), fields(root = %self.root.display()))]
    pub async fn setup(&self) -> Result<()> {
        tokio::fs::create_dir_all(&self.root)
            .await
            .with_context(|| format!("failed to create root directory {}", self.root.display()))?;

        if let Some(hooks) = &self.hooks {
            for name in self.scan().await? {
                let path = self.root.join(&name);
                install_hooks(Arc::clone(hooks), path).await?;
                debug!(repo = %name, "hooks refreshed");
            }
        }
        Ok(())
    }

    // -----------------------------------------------------------------------
    // Exists
    // -----------------------------------------------------------------------

    /// A directory is a repository iff it has an `objects` entry.
    pub async fn exists(&self, path: &Path) -> bool {
        tokio::fs::metadata(path.join("objects")).await.is_ok()
    }

    // -----------------------------------------------------------------------
    // Create
    // -----------------------------------------------------------------------

    /// `git init --bare <root>/<name>`, then install hooks if configured.
    #[instrument(skip(self))]
    pub async fn create(&self, name: &str) -> Result<PathBuf> {
        let path = self.root.join(name);
        git_init_bare(&self.git_path, &path).await?;

        if let Some(hooks) = &self.hooks {
            install_hooks(Arc::clone(hooks), path.clone()).await?;
        }

        debug!(path = %path.display(), "repository created");
        Ok(path)
    }

    // -----------------------------------------------------------------------
    // Delete
    // -----------------------------------------------------------------------

    /// Recursively remove `<root>/<name>`.
    ///
    /// Not idempotent: a missing repository is an error.
    #[instrument(skip(self))]
    pub async fn delete(&self, name: &str) -> Result<PathBuf, RepoError> {
        if name.is_empty() {
            return Err(RepoError::EmptyName);
        }
        let path = self.root.join(name);

        tokio::fs::symlink_metadata(&path)
            .await
            .map_err(|source| RepoError::NotFound {
                path: path.clone(),
                source,
            })?;

        tokio::fs::remove_dir_all(&path)
            .await
            .with_context(|| format!("failed to remove repo directory: {}", path.display()))?;

        debug!(path = %path.display(), "repository removed");
        Ok(path)
    }

    // -----------------------------------------------------------------------
    // List
    // -----------------------------------------------------------------------

    /// Every `namespace/leaf.git` under the root, as seen by `request`.
    pub async fn list(&self, request: &RequestContext) -> Result<Vec<String>> {
        let repos = self.scan().await?;
        Ok(self.filter.filter(repos, request))
    }

    /// Unfiltered, sorted listing.
    async fn scan(&self) -> Result<Vec<String>> {
        let root = self.root.clone();
        tokio::task::spawn_blocking(move || scan_sync(&root))
            .await
            .context("blocking task panicked")?
    }
}

/// Two-level walk: namespaces directly under `root`, repositories directly
/// under each namespace.
fn scan_sync(root: &Path) -> Result<Vec<String>> {
    let mut repos = Vec::new();

    let namespaces = std::fs::read_dir(root)
        .with_context(|| format!("failed to read {}", root.display()))?;
    for ns in namespaces {
        let ns = ns.with_context(|| format!("failed to read entry in {}", root.display()))?;
        if !ns.file_type()?.is_dir() {
            continue;
        }
        let ns_name = ns.file_name().to_string_lossy().into_owned();

        let leaves = std::fs::read_dir(ns.path())
            .with_context(|| format!("failed to read {}", ns.path().display()))?;
        for leaf in leaves {
            let leaf = leaf?;
            let leaf_name = leaf.file_name().to_string_lossy().into_owned();
            if leaf.file_type()?.is_dir() && leaf_name.ends_with(REPO_SUFFIX) {
                repos.push(format!("{ns_name}/{leaf_name}"));
            }
        }
    }

    repos.sort();
    Ok(repos)
}

async fn install_hooks(hooks: Arc<dyn HookInstaller>, path: PathBuf) -> Result<()> {
    tokio::task::spawn_blocking(move || hooks.install(&path))
        .await
        .context("blocking task panicked")?
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;

    use crate::auth::ShowAll;

    fn store(root: &Path) -> RepoStore {
        RepoStore::new(
            root.to_path_buf(),
            PathBuf::from("git"),
            None,
            Arc::new(ShowAll),
        )
    }

    fn fake_repo(root: &Path, name: &str) {
        std::fs::create_dir_all(root.join(name).join("objects")).unwrap();
    }

    #[tokio::test]
    async fn exists_requires_objects_entry() {
        let tmp = tempfile::tempdir().unwrap();
        let s = store(tmp.path());
        let repo = tmp.path().join("ns/a.git");
        std::fs::create_dir_all(&repo).unwrap();
        assert!(!s.exists(&repo).await);
        std::fs::create_dir(repo.join("objects")).unwrap();
        assert!(s.exists(&repo).await);
    }

    #[tokio::test]
    async fn list_only_returns_git_suffixed_leaves() {
        let tmp = tempfile::tempdir().unwrap();
        fake_repo(tmp.path(), "team/b.git");
        fake_repo(tmp.path(), "team/a.git");
        fake_repo(tmp.path(), "team/not-a-repo");
        fake_repo(tmp.path(), "other/c.git");
        std::fs::write(tmp.path().join("team/file.git"), "").unwrap();
        std::fs::write(tmp.path().join("stray.txt"), "").unwrap();

        let ctx = RequestContext::for_test("");
        let repos = store(tmp.path()).list(&ctx).await.unwrap();
        assert_eq!(repos, vec!["other/c.git", "team/a.git", "team/b.git"]);
    }

    #[tokio::test]
    async fn list_applies_filter() {
        let tmp = tempfile::tempdir().unwrap();
        fake_repo(tmp.path(), "team/a.git");
        fake_repo(tmp.path(), "secret/b.git");
        let hide_secret = |repos: Vec<String>, _: &RequestContext| -> Vec<String> {
            repos
                .into_iter()
                .filter(|r| !r.starts_with("secret/"))
                .collect()
        };
        let s = RepoStore::new(
            tmp.path().to_path_buf(),
            PathBuf::from("git"),
            None,
            Arc::new(hide_secret),
        );
        let ctx = RequestContext::for_test("");
        assert_eq!(s.list(&ctx).await.unwrap(), vec!["team/a.git"]);
    }

    #[tokio::test]
    async fn list_fails_when_root_is_missing() {
        let tmp = tempfile::tempdir().unwrap();
        let s = store(&tmp.path().join("missing"));
        let ctx = RequestContext::for_test("");
        assert!(s.list(&ctx).await.is_err());
    }

    #[tokio::test]
    async fn delete_removes_tree() {
        let tmp = tempfile::tempdir().unwrap();
        fake_repo(tmp.path(), "team/a.git");
        let s = store(tmp.path());
        s.delete("team/a.git").await.unwrap();
        assert!(!tmp.path().join("team/a.git").exists());
        assert!(tmp.path().join("team").exists());
    }

    #[tokio::test]
    async fn delete_missing_is_not_found() {
        let tmp = tempfile::tempdir().unwrap();
        let err = store(tmp.path()).delete("team/none.git").await.unwrap_err();
        assert!(matches!(err, RepoError::NotFound { .. }));
    }

    #[tokio::test]
    async fn delete_empty_name_is_rejected() {
        let tmp = tempfile::tempdir().unwrap();
        let err = store(tmp.path()).delete("").await.unwrap_err();
        assert!(matches!(err, RepoError::EmptyName));
        assert!(tmp.path().exists());
    }

    #[tokio::test]
    async fn setup_creates_root() {
        let tmp = tempfile::tempdir().unwrap();
        let root = tmp.path().join("nested/root");
        store(&root).setup().await.unwrap();
        assert!(root.is_dir());
    }

    #[tokio::test]
    async fn setup_refreshes_hooks_in_existing_repos() {
        let tmp = tempfile::tempdir().unwrap();
        fake_repo(tmp.path(), "team/a.git");
        let hooks = crate::git::hooks::HookScripts {
            post_receive: Some("#!/bin/sh\n".into()),
            ..Default::default()
        };
        let s = RepoStore::new(
            tmp.path().to_path_buf(),
            PathBuf::from("git"),
            Some(Arc::new(hooks)),
            Arc::new(ShowAll),
        );
        s.setup().await.unwrap();
        assert!(tmp.path().join("team/a.git/hooks/post-receive").is_file());
    }
}
