//! Git command wrappers and bare repository management.
//!
//! All operations shell out to the configured `git` binary using
//! `tokio::process::Command`.  Long-running protocol commands are wrapped in
//! a [`ProcessGroup`] so their whole process tree dies with the request.

pub mod bare_repo;
pub mod commands;
pub mod hooks;
pub mod process_group;

pub use bare_repo::{RepoError, RepoStore};
pub use commands::{git_init_bare, git_stateless_rpc, git_version, Rpc, RpcMode};
pub use hooks::{HookInstaller, HookScripts};
pub use process_group::ProcessGroup;
