//! Reset: re-baseline the work copy from the host directory.

use std::fs;

use anyhow::{Context, Result};
use tracing::info;

use crate::agents;
use crate::cmd::{self, Cmd};
use crate::errors::usage;
use crate::manager::SandboxManager;
use crate::manager::types::Status;
use crate::paths::instance_name;
use crate::seed;
use crate::workspace;

#[derive(Debug, Clone, Copy, Default)]
pub struct ResetOptions {
    /// Also wipe `agent-state/` and re-apply the container settings.
    pub clean: bool,
    /// Hide the prompt for this run.
    pub no_prompt: bool,
    /// Synchronize the work copy in place instead of restarting.
    pub no_restart: bool,
}

/// Renames `prompt.txt` aside for the duration of a reset and restores
/// it on drop.
struct PromptShelf {
    original: std::path::PathBuf,
    shelved: Option<std::path::PathBuf>,
}

impl PromptShelf {
    fn shelve(prompt: &std::path::Path) -> Result<Self> {
        if !prompt.exists() {
            return Ok(Self {
                original: prompt.to_path_buf(),
                shelved: None,
            });
        }
        let aside = prompt.with_extension("txt.skip");
        fs::rename(prompt, &aside)
            .with_context(|| format!("failed to shelve {}", prompt.display()))?;
        Ok(Self {
            original: prompt.to_path_buf(),
            shelved: Some(aside),
        })
    }
}

impl Drop for PromptShelf {
    fn drop(&mut self) {
        if let Some(aside) = self.shelved.take() {
            let _ = fs::rename(aside, &self.original);
        }
    }
}

impl SandboxManager {
    pub fn reset(&mut self, name: &str, opts: ResetOptions) -> Result<()> {
        let cancel = self.cancel().clone();
        cancel.check()?;
        let mut meta = self.load_meta(name)?;

        if meta.workdir.mode == "rw" {
            return Err(usage(format!(
                "sandbox {name:?} mounts its workdir rw; there is no isolated copy to reset"
            )));
        }

        // In-place sync avoids a restart when the instance is up;
        // otherwise fall through to the restart path.
        if opts.no_restart && self.detect_status(name)? == Status::Running {
            return self.sync_in_place(name, &mut meta);
        }

        let sandbox = self.sandbox(name);
        let instance = instance_name(name);
        self.runtime().stop(&cancel, &instance)?;

        if meta.workdir.mode == "copy" {
            let host = meta.workdir.host_path.clone();
            if !host.exists() {
                return Err(usage(format!(
                    "original workdir {} no longer exists; cannot re-copy",
                    host.display()
                )));
            }
            let copy = sandbox.work_copy(&host);
            if copy.exists() {
                fs::remove_dir_all(&copy)
                    .with_context(|| format!("failed to remove {}", copy.display()))?;
            }
            cancel.check()?;
            meta.workdir.baseline_sha = workspace::copy_with_baseline(&host, &copy, &cancel)?;
            info!(name, sha = %meta.workdir.baseline_sha, "reset:workdir re-baselined");
        }

        if opts.clean {
            let state_dir = sandbox.agent_state_dir();
            if state_dir.exists() {
                fs::remove_dir_all(&state_dir)?;
            }
            fs::create_dir_all(&state_dir)?;
            if let Some(agent) = agents::find(&meta.agent) {
                seed::ensure_container_settings(agent, &sandbox)?;
            }
            info!(name, "reset:agent state wiped");
        }

        meta.save(&sandbox.meta_file())?;

        let _shelf = if opts.no_prompt {
            Some(PromptShelf::shelve(&sandbox.prompt_file())?)
        } else {
            None
        };
        self.start(name, false)?;
        Ok(())
    }

    /// Synchronize the work copy from the host without restarting: rsync
    /// with deletion (keeping the baseline repository), commit a new
    /// baseline, and tell the running agent.
    fn sync_in_place(
        &mut self,
        name: &str,
        meta: &mut crate::manager::meta::SandboxMeta,
    ) -> Result<()> {
        let cancel = self.cancel().clone();
        let sandbox = self.sandbox(name);
        let host = meta.workdir.host_path.clone();
        if !host.exists() {
            return Err(usage(format!(
                "original workdir {} no longer exists; cannot re-sync",
                host.display()
            )));
        }
        let copy = sandbox.work_copy(&host);

        cancel.check()?;
        Cmd::new("rsync")
            .args(["-a", "--delete", "--exclude", "/.git"])
            .arg(format!("{}/", host.display()))
            .arg(format!("{}/", copy.display()))
            .run()
            .context("rsync of work copy failed")?;
        workspace::strip_git_metadata(&copy)?;

        cancel.check()?;
        cmd::git(&copy).args(["add", "-A"]).run()?;
        cmd::git(&copy)
            .args(["commit", "-m", "taskbox baseline", "--allow-empty"])
            .run()?;
        meta.workdir.baseline_sha = cmd::git(&copy)
            .args(["rev-parse", "HEAD"])
            .run_and_capture_stdout()?;
        meta.save(&sandbox.meta_file())?;
        info!(name, sha = %meta.workdir.baseline_sha, "reset:work copy synced in place");

        // Tell the agent its tree changed underneath it.
        let instance = instance_name(name);
        let note = "[taskbox] The working directory was re-synced from the host; files may have changed.";
        let _ = self
            .runtime()
            .exec(&cancel, &instance, &["tmux", "set-buffer", note], "");
        let _ = self.runtime().exec(
            &cancel,
            &instance,
            &["tmux", "paste-buffer", "-t", "main"],
            "",
        );
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn prompt_shelf_roundtrip() {
        let dir = tempfile::tempdir().unwrap();
        let prompt = dir.path().join("prompt.txt");
        fs::write(&prompt, "do the thing").unwrap();

        {
            let _shelf = PromptShelf::shelve(&prompt).unwrap();
            assert!(!prompt.exists());
        }
        assert!(prompt.exists());
        assert_eq!(fs::read_to_string(&prompt).unwrap(), "do the thing");
    }

    #[test]
    fn prompt_shelf_tolerates_missing_file() {
        let dir = tempfile::tempdir().unwrap();
        let prompt = dir.path().join("prompt.txt");
        let shelf = PromptShelf::shelve(&prompt).unwrap();
        assert!(shelf.shelved.is_none());
    }
}
