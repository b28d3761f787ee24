//! Git command wrappers using [`tokio::process::Command`].
//!
//! Every function in this module shells out to the configured `git` binary.
//! The protocol commands run inside a [`ProcessGroup`] so the caller owns the
//! whole process tree for the lifetime of one request.

use std::fmt;
use std::path::Path;
use std::process::Stdio;

use anyhow::{bail, Context, Result};
use tokio::process::Command;
use tracing::{debug, instrument};

use super::process_group::ProcessGroup;

// ---------------------------------------------------------------------------
// Types
// ---------------------------------------------------------------------------

/// The two smart-protocol services `git` can run in stateless-RPC mode.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Rpc {
    UploadPack,
    ReceivePack,
}

impl Rpc {
    /// Parse the service name used on the wire (`?service=` and URL suffix).
    pub fn from_service(name: &str) -> Option<Self> {
        match name {
            "git-upload-pack" => Some(Self::UploadPack),
            "git-receive-pack" => Some(Self::ReceivePack),
            _ => None,
        }
    }

    /// Wire name, e.g. `git-upload-pack`.
    pub fn service_name(self) -> &'static str {
        match self {
            Self::UploadPack => "git-upload-pack",
            Self::ReceivePack => "git-receive-pack",
        }
    }

    /// `git` subcommand, e.g. `upload-pack`.
    pub fn subcommand(self) -> &'static str {
        match self {
            Self::UploadPack => "upload-pack",
            Self::ReceivePack => "receive-pack",
        }
    }
}

impl fmt::Display for Rpc {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.service_name())
    }
}

/// Which half of the smart protocol a stateless-RPC process serves.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RpcMode {
    /// `--advertise-refs`: emit the ref advertisement and exit.
    AdvertiseRefs,
    /// Read one negotiation request from stdin and answer it.
    Negotiate,
}

// ---------------------------------------------------------------------------
// Stateless RPC
// ---------------------------------------------------------------------------

/// Spawn `git <rpc> --stateless-rpc [--advertise-refs] <repo_path>` in its
/// own process group.
#[instrument(fields(%rpc, repo = %repo_path.display()))]
pub fn git_stateless_rpc(
    git_path: &Path,
    rpc: Rpc,
    mode: RpcMode,
    repo_path: &Path,
) -> Result<ProcessGroup> {
    let mut cmd = Command::new(git_path);
    cmd.arg(rpc.subcommand()).arg("--stateless-rpc");
    if mode == RpcMode::AdvertiseRefs {
        cmd.arg("--advertise-refs");
    }
    cmd.arg(repo_path);

    debug!(?mode, "spawning git stateless-rpc");

    ProcessGroup::spawn(cmd).with_context(|| format!("failed to start git {}", rpc.subcommand()))
}

// ---------------------------------------------------------------------------
// Init
// ---------------------------------------------------------------------------

/// Run `git init --bare <path>`.
#[instrument(fields(path = %path.display()))]
pub async fn git_init_bare(git_path: &Path, path: &Path) -> Result<()> {
    let output = Command::new(git_path)
        .arg("init")
        .arg("--bare")
        .arg(path)
        .stdin(Stdio::null())
        .stdout(Stdio::piped())
        .stderr(Stdio::piped())
        .output()
        .await
        .context("failed to spawn git init --bare")?;

    if !output.status.success() {
        let stderr = String::from_utf8_lossy(&output.stderr);
        bail!(
            "git init --bare failed (status {}): {}",
            output.status,
            stderr.trim(),
        );
    }

    debug!("bare repo initialised");
    Ok(())
}

// ---------------------------------------------------------------------------
// Version
// ---------------------------------------------------------------------------

/// Run `git --version` and return its trimmed output.
pub async fn git_version(git_path: &Path) -> Result<String> {
    let output = Command::new(git_path)
        .arg("--version")
        .stdin(Stdio::null())
        .stdout(Stdio::piped())
        .stderr(Stdio::piped())
        .output()
        .await
        .context("failed to spawn git --version")?;

    if !output.status.success() {
        bail!("git --version exited with {}", output.status);
    }

    Ok(String::from_utf8_lossy(&output.stdout).trim().to_string())
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
