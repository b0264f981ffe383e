//! Start, stop, and destroy.

use std::fs;

use anyhow::{Context, Result, bail};
use tracing::info;

use crate::agents;
use crate::errors::{Sentinel, usage};
use crate::manager::SandboxManager;
use crate::manager::meta::SandboxMeta;
use crate::manager::types::{ContainerConfig, Status};
use crate::paths::instance_name;

impl SandboxManager {
    /// Load a sandbox's meta, mapping a missing or unreadable descriptor
    /// to the not-found sentinel.
    pub(crate) fn load_meta(&self, name: &str) -> Result<SandboxMeta> {
        let sandbox = self.sandbox(name);
        if !sandbox.dir().exists() {
            return Err(anyhow::Error::from(Sentinel::SandboxNotFound)
                .context(format!("no sandbox named {name:?}")));
        }
        SandboxMeta::load(&sandbox.meta_file()).map_err(|e| {
            anyhow::Error::from(Sentinel::SandboxNotFound)
                .context(format!("sandbox {name:?} is broken: {e}"))
        })
    }

    /// Bring a sandbox back to running, whatever state it is in.
    /// `resume` relaunches the agent in session-resume form and requires
    /// the sandbox to have been created with a prompt.
    pub fn start(&mut self, name: &str, resume: bool) -> Result<Status> {
        let cancel = self.cancel().clone();
        cancel.check()?;
        let meta = self.load_meta(name)?;
        if resume && !meta.has_prompt {
            return Err(usage(format!(
                "--resume requires a sandbox created with a prompt; {name:?} has none"
            )));
        }

        let status = self.detect_status(name)?;
        let instance = instance_name(name);
        match status {
            Status::Running => {
                println!("sandbox {name:?} is already running");
                Ok(Status::Running)
            }
            Status::Done | Status::Failed => {
                // The instance survives; only the agent pane is dead.
                let command = self.relaunch_command(&meta, resume)?;
                info!(name, %command, "start:respawning agent pane");
                let result = self.runtime().exec(
                    &cancel,
                    &instance,
                    &["tmux", "respawn-pane", "-k", "-t", "main", &command],
                    "",
                )?;
                if result.exit_code != 0 {
                    bail!(
                        "failed to respawn agent pane in {instance}: {}",
                        result.stderr.trim()
                    );
                }
                Ok(Status::Running)
            }
            Status::Stopped => {
                // A stopped instance is stale; rebuild it from meta.
                if resume {
                    self.rewrite_config_for_resume(&meta)?;
                }
                self.runtime().remove(&cancel, &instance)?;
                self.recreate_container(&meta)?;
                let info = self.runtime().inspect(&cancel, &instance)?;
                if !info.running {
                    bail!("instance {instance} did not stay running after start");
                }
                Ok(Status::Running)
            }
            Status::Removed => {
                if resume {
                    self.rewrite_config_for_resume(&meta)?;
                }
                self.recreate_container(&meta)?;
                Ok(Status::Running)
            }
            Status::Broken => Err(anyhow::Error::from(Sentinel::SandboxNotFound)
                .context(format!("sandbox {name:?} is broken"))),
        }
    }

    /// The agent command used when relaunching inside an existing
    /// instance: the persisted command, or the interactive resume form.
    fn relaunch_command(&self, meta: &SandboxMeta, resume: bool) -> Result<String> {
        let sandbox = self.sandbox(&meta.name);
        let config: ContainerConfig = serde_json::from_str(
            &fs::read_to_string(sandbox.config_file())
                .with_context(|| format!("failed to read {}", sandbox.config_file().display()))?,
        )?;
        if !resume {
            return Ok(config.agent_command);
        }
        let command = resume_command(meta)?;
        self.rewrite_config_for_resume(meta)?;
        Ok(command)
    }

    /// Rewrite `config.json` so the entrypoint relaunches the agent in
    /// interactive resume form instead of replaying the headless prompt.
    fn rewrite_config_for_resume(&self, meta: &SandboxMeta) -> Result<()> {
        let sandbox = self.sandbox(&meta.name);
        let mut config: ContainerConfig =
            serde_json::from_str(&fs::read_to_string(sandbox.config_file())?)?;
        config.agent_command = resume_command(meta)?;
        fs::write(
            sandbox.config_file(),
            serde_json::to_string_pretty(&config)? + "\n",
        )?;
        Ok(())
    }

    /// Stop a sandbox's instance. A missing or already-stopped instance
    /// counts as success.
    pub fn stop(&mut self, name: &str) -> Result<()> {
        let cancel = self.cancel().clone();
        self.load_meta(name)?;
        self.runtime().stop(&cancel, &instance_name(name))?;
        info!(name, "stop:instance stopped");
        Ok(())
    }

    /// Tear down the instance and the on-host tree. Each phase is
    /// idempotent, so a partially destroyed sandbox can be destroyed
    /// again.
    pub fn destroy(&mut self, name: &str) -> Result<()> {
        let cancel = self.cancel().clone();
        let instance = instance_name(name);
        self.runtime().stop(&cancel, &instance)?;
        self.runtime().remove(&cancel, &instance)?;

        let sandbox = self.sandbox(name);
        if sandbox.dir().exists() {
            fs::remove_dir_all(sandbox.dir())
                .with_context(|| format!("failed to remove {}", sandbox.dir().display()))?;
        }
        info!(name, "destroy:sandbox removed");
        Ok(())
    }

    /// Whether the CLI should confirm before destroying: true when the
    /// sandbox exists and its work copies carry uncommitted changes.
    pub fn needs_confirmation(&self, name: &str) -> Result<bool> {
        let Ok(meta) = self.load_meta(name) else {
            return Ok(false);
        };
        let sandbox = self.sandbox(name);
        for dir in meta.copy_mounts() {
            let copy = sandbox.work_copy(&dir.host_path);
            if copy.exists()
                && let Some(_report) = crate::safety::check_dirty_repo(&copy)?
            {
                return Ok(true);
            }
        }
        Ok(false)
    }
}

/// The interactive session-resume command for an agent. The claude-style
/// `--continue` pattern is applied uniformly.
fn resume_command(meta: &SandboxMeta) -> Result<String> {
    let agent = agents::find(&meta.agent)
        .ok_or_else(|| usage(format!("sandbox references unknown agent {:?}", meta.agent)))?;
    let mut command = agent.interactive_cmd.to_string();
    if !meta.model.is_empty() && !agent.model_flag.is_empty() {
        command.push_str(&format!(" {} {}", agent.model_flag, meta.model));
    }
    command.push_str(" --continue");
    Ok(command)
}
