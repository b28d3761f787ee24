//! Server-side hook installation for newly created repositories.

use std::os::unix::fs::PermissionsExt;
use std::path::Path;

use anyhow::{Context, Result};
use serde::Deserialize;
use tracing::{debug, instrument};

/// Installs hook scripts into a bare repository directory.
pub trait HookInstaller: Send + Sync {
    fn install(&self, repo_path: &Path) -> Result<()>;
}

/// Script bodies for the hooks `git receive-pack` runs.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct HookScripts {
    #[serde(default)]
    pub pre_receive: Option<String>,
    #[serde(default)]
    pub update: Option<String>,
    #[serde(default)]
    pub post_receive: Option<String>,
}

impl HookScripts {
    /// `(file name, body)` for every configured hook.
    fn scripts(&self) -> impl Iterator<Item = (&'static str, &str)> {
        [
            ("pre-receive", self.pre_receive.as_deref()),
            ("update", self.update.as_deref()),
            ("post-receive", self.post_receive.as_deref()),
        ]
        .into_iter()
        .filter_map(|(name, body)| body.map(|b| (name, b)))
    }

    pub fn is_empty(&self) -> bool {
        self.scripts().next().is_none()
    }
}

impl HookInstaller for HookScripts {
    #[instrument(skip(self), fields(repo = %repo_path.display()))]
    fn install(&self, repo_path: &Path) -> Result<()> {
        let hooks_dir = repo_path.join("hooks");
        std::fs::create_dir_all(&hooks_dir)
            .with_context(|| format!("failed to create {}", hooks_dir.display()))?;

        for (name, body) in self.scripts() {
            let path = hooks_dir.join(name);
            std::fs::write(&path, body)
                .with_context(|| format!("failed to write hook {}", path.display()))?;
            std::fs::set_permissions(&path, std::fs::Permissions::from_mode(0o755))
                .with_context(|| format!("failed to chmod hook {}", path.display()))?;
            debug!(hook = name, "hook installed");
        }
        Ok(())
    }
}
