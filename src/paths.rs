//! On-host layout of the taskbox root directory.
//!
//! Everything lives under `~/.taskbox/`; tests substitute a temporary root
//! by constructing `Paths::at` directly.

use std::path::{Path, PathBuf};

use anyhow::{Result, anyhow};

/// Resolved locations under the taskbox root.
#[derive(Debug, Clone)]
pub struct Paths {
    root: PathBuf,
}

impl Paths {
    /// Root derived from the user's home directory (`~/.taskbox`).
    pub fn from_home() -> Result<Self> {
        let home = home::home_dir().ok_or_else(|| anyhow!("Could not determine home directory"))?;
        Ok(Self::at(home.join(".taskbox")))
    }

    /// Explicit root; used by tests and by the migrator.
    pub fn at(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    pub fn state_file(&self) -> PathBuf {
        self.root.join("state.yaml")
    }

    pub fn profiles_dir(&self) -> PathBuf {
        self.root.join("profiles")
    }

    pub fn profile_dir(&self, name: &str) -> PathBuf {
        self.profiles_dir().join(name)
    }

    pub fn base_config_file(&self) -> PathBuf {
        self.profile_dir("base").join("config.yaml")
    }

    pub fn sandboxes_dir(&self) -> PathBuf {
        self.root.join("sandboxes")
    }

    pub fn sandbox_dir(&self, name: &str) -> PathBuf {
        self.sandboxes_dir().join(name)
    }

    pub fn cache_dir(&self) -> PathBuf {
        self.root.join("cache")
    }
}

/// Layout of one sandbox's directory tree.
#[derive(Debug, Clone)]
pub struct SandboxPaths {
    dir: PathBuf,
}

impl SandboxPaths {
    pub fn new(paths: &Paths, name: &str) -> Self {
        Self {
            dir: paths.sandbox_dir(name),
        }
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    pub fn meta_file(&self) -> PathBuf {
        self.dir.join("meta.json")
    }

    pub fn config_file(&self) -> PathBuf {
        self.dir.join("config.json")
    }

    pub fn context_file(&self) -> PathBuf {
        self.dir.join("context.md")
    }

    pub fn prompt_file(&self) -> PathBuf {
        self.dir.join("prompt.txt")
    }

    pub fn log_file(&self) -> PathBuf {
        self.dir.join("log.txt")
    }

    pub fn work_dir(&self) -> PathBuf {
        self.dir.join("work")
    }

    /// The per-mounted-directory work copy for a given host path.
    pub fn work_copy(&self, host_path: &Path) -> PathBuf {
        self.work_dir()
            .join(crate::pathcodec::encode(&host_path.to_string_lossy()))
    }

    pub fn agent_state_dir(&self) -> PathBuf {
        self.dir.join("agent-state")
    }

    pub fn home_seed_dir(&self) -> PathBuf {
        self.dir.join("home-seed")
    }
}

/// Runtime instance name for a sandbox.
pub fn instance_name(sandbox: &str) -> String {
    format!("taskbox-{sandbox}")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn layout_under_root() {
        let p = Paths::at("/tmp/tb-root");
        assert_eq!(p.state_file(), PathBuf::from("/tmp/tb-root/state.yaml"));
        assert_eq!(
            p.base_config_file(),
            PathBuf::from("/tmp/tb-root/profiles/base/config.yaml")
        );
        assert_eq!(
            p.sandbox_dir("fix-auth"),
            PathBuf::from("/tmp/tb-root/sandboxes/fix-auth")
        );
    }

    #[test]
    fn sandbox_files() {
        let p = Paths::at("/tmp/tb-root");
        let sb = SandboxPaths::new(&p, "s1");
        assert_eq!(sb.meta_file().file_name().unwrap(), "meta.json");
        assert_eq!(sb.agent_state_dir().file_name().unwrap(), "agent-state");
    }

    #[test]
    fn work_copy_uses_encoded_path() {
        let p = Paths::at("/tmp/tb-root");
        let sb = SandboxPaths::new(&p, "s1");
        let copy = sb.work_copy(Path::new("/tmp/proj"));
        assert!(copy.starts_with("/tmp/tb-root/sandboxes/s1/work"));
        assert!(!copy.to_string_lossy().contains("/tmp/proj"));
    }

    #[test]
    fn instance_name_prefix() {
        assert_eq!(instance_name("fix-auth"), "taskbox-fix-auth");
    }
}
