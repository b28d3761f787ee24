//! Shared fixtures for integration tests.
//!
//! The server runs against a shell script standing in for `git`, so the
//! tests exercise dispatch, streaming and process handling without needing
//! a real git installation.

#![allow(dead_code)]

use std::os::unix::fs::PermissionsExt;
use std::path::{Path, PathBuf};
use std::sync::{Arc, LazyLock};

use anyhow::Result;
use axum::body::Body;
use axum::http::{Request, StatusCode};
use axum::response::Response;
use axum::Router;
use gitserve::auth::{Credential, ShowAll};
use gitserve::config::ServerConfig;
use gitserve::http::context::RequestContext;
use gitserve::{create_router, GitServer, GitServerBuilder};
use tempfile::TempDir;
use tower::ServiceExt;

/// Behaviour of the stand-in `git`:
///
/// - `--version` prints a version line.
/// - `init --bare <path>` creates `<path>/objects`.
/// - `<rpc> --stateless-rpc --advertise-refs <path>` prints `refs:<rpc>\n`.
/// - `<rpc> --stateless-rpc <path>` prints `result:<rpc>:` then echoes stdin.
///   If `<path>/hang` exists it then starts a `sleep` in the background,
///   records its pid in `<path>/sleeper.pid` and keeps the output open.
///   If `<path>/detach` exists it instead leaves a `sleep` running with its
///   stdio detached, records its pid in `<path>/child.pid` and exits 0.
///
/// Every protocol command fails if `<path>/objects` is missing, records its
/// pid in `<path>/git.pid` when `<path>/record-pid` exists, and writes
/// `stderr:<rpc>\n` to stderr first when `<path>/noisy` exists.
const FAKE_GIT: &str = r#"#!/bin/sh
case "$1" in
  --version)
    echo "git version 2.45.0.fake"
    exit 0
    ;;
  init)
    mkdir -p "$3/objects" || exit 1
    exit 0
    ;;
  upload-pack|receive-pack)
    rpc="git-$1"
    shift
    advertise=""
    repo=""
    for arg in "$@"; do
      case "$arg" in
        --stateless-rpc) ;;
        --advertise-refs) advertise=1 ;;
        *) repo="$arg" ;;
      esac
    done
    if [ ! -d "$repo/objects" ]; then
      echo "fatal: not a git repository: $repo" >&2
      exit 128
    fi
    if [ -f "$repo/record-pid" ]; then
      echo $$ > "$repo/git.pid"
    fi
    if [ -f "$repo/noisy" ]; then
      echo "stderr:$rpc" >&2
    fi
    if [ -n "$advertise" ]; then
      printf 'refs:%s\n' "$rpc"
      exit 0
    fi
    printf 'result:%s:' "$rpc"
    cat
    if [ -f "$repo/detach" ]; then
      sleep 300 >/dev/null 2>&1 </dev/null &
      echo $! > "$repo/child.pid"
    fi
    if [ -f "$repo/hang" ]; then
      sleep 300 &
      echo $! > "$repo/sleeper.pid"
      wait
    fi
    exit 0
    ;;
esac
echo "unsupported: $*" >&2
exit 1
"#;

/// Written once per test binary, before any test spawns it.
static FAKE_GIT_PATH: LazyLock<(TempDir, PathBuf)> = LazyLock::new(|| {
    let dir = tempfile::tempdir().expect("Failed to create fake git dir");
    let path = dir.path().join("git");
    std::fs::write(&path, FAKE_GIT).expect("Failed to write fake git");
    std::fs::set_permissions(&path, std::fs::Permissions::from_mode(0o755))
        .expect("Failed to chmod fake git");
    (dir, path)
});

pub fn fake_git() -> PathBuf {
    FAKE_GIT_PATH.1.clone()
}

/// A router over a fresh temporary repository root.
pub struct TestServer {
    pub router: Router,
    pub server: Arc<GitServer>,
    root: TempDir,
}

impl TestServer {
    /// No auth, no auto-create, every repository visible.
    pub async fn new() -> Self {
        Self::with(|config| config, |builder| builder).await
    }

    /// Adjust the config and the builder before the server is built.
    pub async fn with(
        configure: impl FnOnce(ServerConfig) -> ServerConfig,
        build: impl FnOnce(GitServerBuilder) -> GitServerBuilder,
    ) -> Self {
        let git = fake_git();
        let root = tempfile::tempdir().expect("Failed to create repo root");

        let mut config = ServerConfig::new(root.path());
        config.git_path = git;
        let config = configure(config);

        let server = build(GitServer::builder(config).repo_filter(ShowAll))
            .build()
            .expect("Failed to build server");
        server.setup().await.expect("Failed to set up server");

        let server = Arc::new(server);
        Self {
            router: create_router(Arc::clone(&server)),
            server,
            root,
        }
    }

    pub fn root(&self) -> &Path {
        self.root.path()
    }

    /// Create a repository directly on disk, bypassing the server.
    pub fn seed_repo(&self, name: &str) -> PathBuf {
        let path = self.root.path().join(name);
        std::fs::create_dir_all(path.join("objects")).expect("Failed to seed repo");
        path
    }

    pub async fn send(&self, request: Request<Body>) -> Response {
        self.router.clone().oneshot(request).await.unwrap()
    }

    pub async fn request(&self, method: &str, uri: &str) -> Response {
        self.send(
            Request::builder()
                .method(method)
                .uri(uri)
                .body(Body::empty())
                .unwrap(),
        )
        .await
    }
}

pub async fn body_bytes(response: Response) -> Vec<u8> {
    axum::body::to_bytes(response.into_body(), usize::MAX)
        .await
        .unwrap()
        .to_vec()
}

pub async fn body_json(response: Response) -> serde_json::Value {
    serde_json::from_slice(&body_bytes(response).await).unwrap()
}

pub fn assert_status(response: &Response, expected: StatusCode) {
    assert_eq!(response.status(), expected, "unexpected status");
}

/// Authorizer that admits `alice`/`secret` and the token `letmein`.
pub fn alice_or_token(credential: &Credential, _request: &RequestContext) -> Result<bool> {
    Ok((credential.username == "alice" && credential.password == "secret")
        || credential.token == "letmein")
}

/// Authorizer that refuses everyone.
pub fn deny_all(_credential: &Credential, _request: &RequestContext) -> Result<bool> {
    Ok(false)
}

pub fn with_auth(mut config: ServerConfig) -> ServerConfig {
    config.auth = true;
    config
}

pub fn with_auto_create(mut config: ServerConfig) -> ServerConfig {
    config.auto_create = true;
    config
}
