//! Translation of sandbox state into the runtime's mount and port specs.

use std::path::PathBuf;

use anyhow::{Context, Result};

use crate::agents::AgentDefinition;
use crate::errors::usage;
use crate::manager::meta::SandboxMeta;
use crate::paths::SandboxPaths;
use crate::runtime::{MountSpec, PortSpec};

/// Home directory of the agent user inside an instance.
pub const INSTANCE_HOME: &str = "/home/agent";

/// Directory where taskbox control files appear inside an instance.
pub const INSTANCE_CONTROL_DIR: &str = "/taskbox";

/// Target directory for materialized secrets inside an instance.
pub const SECRETS_TARGET: &str = "/run/secrets";

#[derive(Debug, Default)]
pub struct MountPlan {
    pub mounts: Vec<MountSpec>,
    pub ports: Vec<PortSpec>,
}

/// Assemble the ordered mount list and port mappings for a sandbox.
/// `secret_files` are the per-key files from the secrets temp dir, if
/// any were materialized.
pub fn assemble(
    meta: &SandboxMeta,
    sandbox: &SandboxPaths,
    agent: &AgentDefinition,
    tmux_conf: &str,
    secret_files: &[PathBuf],
) -> Result<MountPlan> {
    let mut plan = MountPlan::default();

    // 1. Workdir.
    plan.mounts.push(dir_mount(&meta.workdir, sandbox));

    // 2. Auxiliary directories.
    for dir in &meta.directories {
        plan.mounts.push(dir_mount(dir, sandbox));
    }

    // 3. Agent state.
    if !agent.state_dir.is_empty() {
        plan.mounts.push(MountSpec {
            source: sandbox.agent_state_dir(),
            target: format!("{INSTANCE_HOME}/{}", agent.state_dir),
            read_only: false,
        });
    }

    // 4-6. Control files.
    plan.mounts.push(MountSpec {
        source: sandbox.log_file(),
        target: format!("{INSTANCE_CONTROL_DIR}/log.txt"),
        read_only: false,
    });
    // The prompt file can be shelved aside during a `reset --no-prompt`.
    if meta.has_prompt && sandbox.prompt_file().exists() {
        plan.mounts.push(MountSpec {
            source: sandbox.prompt_file(),
            target: format!("{INSTANCE_CONTROL_DIR}/prompt.txt"),
            read_only: true,
        });
    }
    plan.mounts.push(MountSpec {
        source: sandbox.config_file(),
        target: format!("{INSTANCE_CONTROL_DIR}/config.json"),
        read_only: true,
    });

    // 7. Home seed. Each top-level directory mounts whole (so the agent
    // can create new state files under it at runtime); top-level files
    // mount individually.
    let home_seed = sandbox.home_seed_dir();
    if home_seed.is_dir() {
        let mut entries: Vec<_> = std::fs::read_dir(&home_seed)
            .with_context(|| format!("Failed to read {}", home_seed.display()))?
            .flatten()
            .collect();
        entries.sort_by_key(|e| e.file_name());
        for entry in entries {
            let name = entry.file_name().to_string_lossy().into_owned();
            plan.mounts.push(MountSpec {
                source: entry.path(),
                target: format!("{INSTANCE_HOME}/{name}"),
                read_only: false,
            });
        }
    }

    // 8. Host tmux config.
    if matches!(tmux_conf, "host" | "default+host")
        && let Some(home) = home::home_dir()
    {
        let host_conf = home.join(".tmux.conf");
        if host_conf.exists() {
            plan.mounts.push(MountSpec {
                source: host_conf,
                target: format!("{INSTANCE_HOME}/.tmux.conf"),
                read_only: true,
            });
        }
    }

    // 9. Secrets.
    for file in secret_files {
        let name = file
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_default();
        plan.mounts.push(MountSpec {
            source: file.clone(),
            target: format!("{SECRETS_TARGET}/{name}"),
            read_only: true,
        });
    }

    for port in &meta.ports {
        plan.ports.push(parse_port(port)?);
    }

    Ok(plan)
}

fn dir_mount(dir: &crate::manager::meta::DirSpec, sandbox: &SandboxPaths) -> MountSpec {
    match dir.mode.as_str() {
        "copy" => MountSpec {
            source: sandbox.work_copy(&dir.host_path),
            target: dir.mount_path.clone(),
            read_only: false,
        },
        "rw" => MountSpec {
            source: dir.host_path.clone(),
            target: dir.mount_path.clone(),
            read_only: false,
        },
        _ => MountSpec {
            source: dir.host_path.clone(),
            target: dir.mount_path.clone(),
            read_only: true,
        },
    }
}

/// Parse a `HOST:CONTAINER` port string into a tcp port spec.
pub fn parse_port(spec: &str) -> Result<PortSpec> {
    let (host, instance) = spec
        .split_once(':')
        .ok_or_else(|| usage(format!("invalid port mapping {spec:?} (expected HOST:CONTAINER)")))?;
    let host: u16 = host
        .parse()
        .map_err(|_| usage(format!("invalid host port in {spec:?}")))?;
    let instance: u16 = instance
        .parse()
        .map_err(|_| usage(format!("invalid container port in {spec:?}")))?;
    Ok(PortSpec {
        host,
        instance,
        protocol: "tcp".to_string(),
    })
}
