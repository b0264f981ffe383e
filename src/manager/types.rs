//! Shared types for the sandbox manager.

use std::fmt;

use serde::{Deserialize, Serialize};

use crate::manager::meta::SandboxMeta;

/// Observable state of a sandbox.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Status {
    /// Instance up, agent pane alive.
    Running,
    /// Instance up, agent exited cleanly.
    Done,
    /// Instance up, agent exited with a failure.
    Failed,
    /// Instance exists but is not running.
    Stopped,
    /// No instance; meta.json can rebuild it.
    Removed,
    /// On-disk state is unusable (no valid meta.json).
    Broken,
}

impl fmt::Display for Status {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Status::Running => "running",
            Status::Done => "done",
            Status::Failed => "failed",
            Status::Stopped => "stopped",
            Status::Removed => "removed",
            Status::Broken => "broken",
        };
        write!(f, "{name}")
    }
}

/// Options collected by the CLI for `create`.
#[derive(Debug, Clone, Default)]
pub struct CreateOptions {
    pub name: String,
    /// "" picks the configured agent.
    pub agent: String,
    pub model: String,
    /// "" picks the configured backend.
    pub backend: String,
    pub profile: String,
    /// Workdir argument (`path[:mode][:force][=mount]`); "" falls back to
    /// the profile workdir, then the current directory.
    pub workdir_arg: String,
    /// Auxiliary directory arguments.
    pub dir_args: Vec<String>,
    pub prompt: String,
    /// Prompt file path; "-" reads stdin.
    pub prompt_file: String,
    pub replace: bool,
    /// Skip interactive confirmations.
    pub yes: bool,
    pub no_start: bool,
    pub network: NetworkRequest,
    pub network_allow: Vec<String>,
    pub ports: Vec<String>,
    pub cpus: String,
    pub memory: String,
    /// Extra args appended verbatim to the agent command.
    pub passthrough_args: Vec<String>,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum NetworkRequest {
    /// Use the configured default.
    #[default]
    Unset,
    None,
    Isolated,
}

/// The result of a create call.
#[derive(Debug)]
pub enum CreateOutcome {
    Created(SandboxMeta),
    /// The user declined a confirmation; nothing was created.
    Cancelled,
}

/// What `inspect` reports for one sandbox.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct InspectReport {
    pub meta: SandboxMeta,
    #[serde(skip)]
    pub status: Option<Status>,
    pub status_name: String,
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub container_id: String,
    pub has_changes: bool,
    pub disk_usage_bytes: u64,
}

/// One row of `list` output; broken sandboxes have no meta.
#[derive(Debug, Clone)]
pub struct ListEntry {
    pub name: String,
    pub status: Status,
    pub agent: String,
    pub profile: String,
    pub created_at: String,
    pub has_changes: bool,
}

/// The in-instance runtime configuration (`config.json`), read by the
/// entrypoint.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ContainerConfig {
    pub host_uid: u32,
    pub host_gid: u32,
    pub agent_command: String,
    /// Milliseconds to wait before the agent is launched.
    pub startup_delay: u64,
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub ready_pattern: String,
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub submit_sequence: String,
    pub tmux_conf: String,
    pub working_dir: String,
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub state_dir_name: String,
    #[serde(default, skip_serializing_if = "std::ops::Not::not")]
    pub debug: bool,
    #[serde(default, skip_serializing_if = "std::ops::Not::not")]
    pub network_isolated: bool,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub allowed_domains: Vec<String>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn status_display() {
        assert_eq!(Status::Running.to_string(), "running");
        assert_eq!(Status::Broken.to_string(), "broken");
    }

    #[test]
    fn container_config_omits_empty_optionals() {
        let config = ContainerConfig {
            host_uid: 1000,
            host_gid: 1000,
            agent_command: "claude".to_string(),
            tmux_conf: "default".to_string(),
            working_dir: "/tmp/proj".to_string(),
            ..Default::default()
        };
        let text = serde_json::to_string(&config).unwrap();
        assert!(!text.contains("debug"));
        assert!(!text.contains("network_isolated"));
        assert!(!text.contains("allowed_domains"));
        assert!(!text.contains("ready_pattern"));
    }

    #[test]
    fn container_config_roundtrip() {
        let config = ContainerConfig {
            host_uid: 501,
            host_gid: 20,
            agent_command: "claude -p \"x\"".to_string(),
            startup_delay: 1500,
            tmux_conf: "default".to_string(),
            working_dir: "/tmp/proj".to_string(),
            state_dir_name: ".claude".to_string(),
            network_isolated: true,
            allowed_domains: vec!["api.anthropic.com".to_string()],
            ..Default::default()
        };
        let text = serde_json::to_string_pretty(&config).unwrap();
        let back: ContainerConfig = serde_json::from_str(&text).unwrap();
        assert_eq!(back.agent_command, config.agent_command);
        assert!(back.network_isolated);
    }
}
