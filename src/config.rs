use std::net::SocketAddr;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use serde::Deserialize;

use crate::git::hooks::HookScripts;

// ---------------------------------------------------------------------------
// Top-level config
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Deserialize)]
pub struct Config {
    /// Socket address for the HTTP listener (e.g. `0.0.0.0:8080`).
    #[serde(default = "default_listen")]
    pub listen: String,
    pub server: ServerConfig,
    /// Basic-auth users admitted when `server.auth` is on.
    #[serde(default)]
    pub users: Vec<UserConfig>,
    /// Bearer tokens admitted when `server.auth` is on.
    #[serde(default)]
    pub tokens: Vec<TokenConfig>,
    /// Scripts installed into repositories when `server.auto_hooks` is on.
    #[serde(default)]
    pub hooks: HookScripts,
}

fn default_listen() -> String {
    "0.0.0.0:8080".to_string()
}

// ---------------------------------------------------------------------------
// Server behaviour
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Deserialize)]
pub struct ServerConfig {
    /// Directory holding `namespace/leaf.git` repositories.
    pub root_dir: PathBuf,
    /// `git` executable; a bare name is resolved through `PATH`.
    #[serde(default = "default_git_path")]
    pub git_path: PathBuf,
    /// Require every request to pass the authorizer.
    #[serde(default)]
    pub auth: bool,
    /// Create a missing repository on first fetch or push.
    #[serde(default)]
    pub auto_create: bool,
    /// Install hooks into repositories this server creates, and refresh them
    /// in existing ones at startup.
    #[serde(default)]
    pub auto_hooks: bool,
}

fn default_git_path() -> PathBuf {
    PathBuf::from("git")
}

impl ServerConfig {
    /// Defaults for everything except the root directory.
    pub fn new(root_dir: impl Into<PathBuf>) -> Self {
        Self {
            root_dir: root_dir.into(),
            git_path: default_git_path(),
            auth: false,
            auto_create: false,
            auto_hooks: false,
        }
    }
}

// ---------------------------------------------------------------------------
// Credentials
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Deserialize)]
pub struct UserConfig {
    pub username: String,
    /// Hex SHA-256 of the password.
    pub password_sha256: String,
}

#[derive(Debug, Clone, Deserialize)]
pub struct TokenConfig {
    /// Hex SHA-256 of the token.
    pub token_sha256: String,
}

// ---------------------------------------------------------------------------
// Loader
// ---------------------------------------------------------------------------

/// Load and validate a [`Config`] from a YAML file at `path`.
pub fn load_config<P: AsRef<Path>>(path: P) -> Result<Config> {
    let path = path.as_ref();
    let contents = std::fs::read_to_string(path)
        .with_context(|| format!("failed to read config file: {}", path.display()))?;
    let config: Config = serde_yaml::from_str(&contents)
        .with_context(|| format!("failed to parse config file: {}", path.display()))?;
    validate_config(&config)?;
    Ok(config)
}

/// Basic sanity checks that cannot be expressed purely with serde.
pub fn validate_config(config: &Config) -> Result<()> {
    config
        .listen
        .parse::<SocketAddr>()
        .with_context(|| format!("invalid listen address: {}", config.listen))?;
    anyhow::ensure!(
        !config.server.root_dir.as_os_str().is_empty(),
        "server.root_dir must not be empty"
    );
    anyhow::ensure!(
        !config.server.git_path.as_os_str().is_empty(),
        "server.git_path must not be empty"
    );
    anyhow::ensure!(
        !config.server.auth || !config.users.is_empty() || !config.tokens.is_empty(),
        "server.auth is enabled but no users or tokens are configured"
    );
    anyhow::ensure!(
        !config.server.auto_hooks || !config.hooks.is_empty(),
        "server.auto_hooks is enabled but no hook scripts are configured"
    );
    for user in &config.users {
        anyhow::ensure!(
            is_sha256_hex(&user.password_sha256),
            "password_sha256 for user {} is not a hex SHA-256 digest",
            user.username
        );
    }
    for (i, token) in config.tokens.iter().enumerate() {
        anyhow::ensure!(
            is_sha256_hex(&token.token_sha256),
            "tokens[{i}].token_sha256 is not a hex SHA-256 digest"
        );
    }
    Ok(())
}

fn is_sha256_hex(s: &str) -> bool {
    s.len() == 64 && s.bytes().all(|b| b.is_ascii_hexdigit())
}
