//! Docker CLI runtime backend.
//!
//! Drives instances through the `docker` binary rather than the engine
//! API; podman is CLI-compatible and picked up when docker is absent.

use std::path::Path;

use anyhow::{Context, Result, bail};
use tracing::{debug, info};

use crate::cancel::CancelToken;
use crate::cmd::Cmd;

use super::{ExecResult, InstanceConfig, InstanceInfo, NotFound, ProfileImageBuilder, Runtime};

pub struct DockerRuntime {
    binary: String,
}

impl DockerRuntime {
    /// Locate a usable engine binary (`docker`, falling back to `podman`).
    pub fn new() -> Result<Self> {
        for candidate in ["docker", "podman"] {
            if which::which(candidate).is_ok() {
                return Ok(Self {
                    binary: candidate.to_string(),
                });
            }
        }
        bail!("neither docker nor podman found on PATH")
    }

    #[cfg(test)]
    fn with_binary(binary: &str) -> Self {
        Self {
            binary: binary.to_string(),
        }
    }

    fn cmd(&self) -> Cmd<'_> {
        Cmd::new(&self.binary)
    }
}

/// Build the `docker create` argument list for an instance config.
/// Separated from execution for testability.
fn create_args(config: &InstanceConfig) -> Vec<String> {
    let mut args: Vec<String> = vec![
        "create".to_string(),
        "--name".to_string(),
        config.name.clone(),
        "--label".to_string(),
        "taskbox=true".to_string(),
    ];

    if config.use_init {
        args.push("--init".to_string());
    }

    if !config.working_dir.is_empty() {
        args.push("--workdir".to_string());
        args.push(config.working_dir.clone());
    }

    if !config.network_mode.is_empty() {
        args.push("--network".to_string());
        args.push(config.network_mode.clone());
    }

    for cap in &config.capabilities {
        args.push("--cap-add".to_string());
        args.push(cap.clone());
    }

    if let Some(resources) = config.resources {
        if let Some(nano) = resources.nano_cpus {
            args.push("--cpus".to_string());
            args.push(format!("{}", nano as f64 / 1e9));
        }
        if let Some(bytes) = resources.memory_bytes {
            args.push("--memory".to_string());
            args.push(format!("{bytes}b"));
        }
    }

    for mount in &config.mounts {
        let mut spec = format!(
            "type=bind,source={},target={}",
            mount.source.display(),
            mount.target
        );
        if mount.read_only {
            spec.push_str(",readonly");
        }
        args.push("--mount".to_string());
        args.push(spec);
    }

    for port in &config.ports {
        args.push("-p".to_string());
        args.push(format!("{}:{}/{}", port.host, port.instance, port.protocol));
    }

    args.push(config.image.clone());
    args
}

fn stderr_means_not_found(stderr: &str) -> bool {
    let lower = stderr.to_lowercase();
    lower.contains("no such container") || lower.contains("no such object")
}

impl Runtime for DockerRuntime {
    fn ensure_image(
        &self,
        cancel: &CancelToken,
        source_dir: &Path,
        tag: &str,
        force: bool,
    ) -> Result<()> {
        cancel.check()?;
        if !force && self.image_exists(cancel, tag)? {
            debug!(tag, "docker:image exists, skipping build");
            return Ok(());
        }

        info!(tag, dir = %source_dir.display(), "docker:building image");
        cancel.check()?;
        self.cmd()
            .args(["build", "-t", tag])
            .arg(source_dir.to_string_lossy().into_owned())
            .run_interactive()
            .with_context(|| format!("image build failed for {tag}"))?;
        cancel.check()?;
        Ok(())
    }

    fn image_exists(&self, cancel: &CancelToken, tag: &str) -> Result<bool> {
        cancel.check()?;
        self.cmd()
            .args(["image", "inspect", tag])
            .quiet()
            .run_as_check()
    }

    fn create(&self, cancel: &CancelToken, config: &InstanceConfig) -> Result<()> {
        cancel.check()?;
        let args = create_args(config);
        self.cmd()
            .args(args.iter().map(String::as_str))
            .run()
            .with_context(|| format!("failed to create instance {}", config.name))?;
        cancel.check()?;
        Ok(())
    }

    fn start(&self, cancel: &CancelToken, name: &str) -> Result<()> {
        cancel.check()?;
        self.cmd()
            .args(["start", name])
            .run()
            .with_context(|| format!("failed to start instance {name}"))?;
        Ok(())
    }

    fn stop(&self, cancel: &CancelToken, name: &str) -> Result<()> {
        cancel.check()?;
        let output = self.cmd().args(["stop", "-t", "2", name]).quiet().run();
        match output {
            Ok(_) => Ok(()),
            // Already stopped or gone both count as stopped.
            Err(e) if stderr_means_not_found(&e.to_string()) => Ok(()),
            Err(e) => Err(e.context(format!("failed to stop instance {name}"))),
        }
    }

    fn remove(&self, cancel: &CancelToken, name: &str) -> Result<()> {
        cancel.check()?;
        let output = self.cmd().args(["rm", "-f", name]).quiet().run();
        match output {
            Ok(_) => Ok(()),
            Err(e) if stderr_means_not_found(&e.to_string()) => Ok(()),
            Err(e) => Err(e.context(format!("failed to remove instance {name}"))),
        }
    }

    fn inspect(&self, cancel: &CancelToken, name: &str) -> Result<InstanceInfo> {
        cancel.check()?;
        let output = self
            .cmd()
            .args([
                "container",
                "inspect",
                "-f",
                "{{.Id}} {{.State.Running}} {{.State.ExitCode}}",
                name,
            ])
            .quiet()
            .run();

        let output = match output {
            Ok(o) => o,
            Err(e) if stderr_means_not_found(&e.to_string()) => {
                return Err(NotFound(name.to_string()).into());
            }
            Err(e) => return Err(e.context(format!("failed to inspect instance {name}"))),
        };

        let text = String::from_utf8_lossy(&output.stdout);
        let mut fields = text.split_whitespace();
        let id = fields.next().unwrap_or_default().to_string();
        let running = fields.next() == Some("true");
        let exit_code = fields.next().and_then(|f| f.parse().ok());
        Ok(InstanceInfo {
            id,
            running,
            exit_code,
        })
    }

    fn exec(
        &self,
        cancel: &CancelToken,
        name: &str,
        cmd: &[&str],
        user: &str,
    ) -> Result<ExecResult> {
        cancel.check()?;
        let mut args = vec!["exec".to_string()];
        if !user.is_empty() {
            args.push("--user".to_string());
            args.push(user.to_string());
        }
        args.push(name.to_string());
        args.extend(cmd.iter().map(|s| s.to_string()));

        // Command failure is data, not an error; only a spawn failure
        // propagates.
        let output = std::process::Command::new(&self.binary)
            .args(&args)
            .output()
            .with_context(|| format!("failed to exec in instance {name}"))?;

        Ok(ExecResult {
            stdout: String::from_utf8_lossy(&output.stdout).into_owned(),
            stderr: String::from_utf8_lossy(&output.stderr).into_owned(),
            exit_code: output.status.code().unwrap_or(-1),
        })
    }

    fn interactive_exec(
        &self,
        cancel: &CancelToken,
        name: &str,
        cmd: &[&str],
        user: &str,
    ) -> Result<()> {
        cancel.check()?;
        let mut args = vec!["exec".to_string(), "-it".to_string()];
        if !user.is_empty() {
            args.push("--user".to_string());
            args.push(user.to_string());
        }
        args.push(name.to_string());
        args.extend(cmd.iter().map(|s| s.to_string()));
        self.cmd().args(args.iter().map(String::as_str)).run_interactive()
    }

    fn diag_hint(&self, name: &str) -> String {
        format!("run `{} logs {name}` for the instance output", self.binary)
    }

    fn as_image_builder(&self) -> Option<&dyn ProfileImageBuilder> {
        Some(self)
    }
}

impl ProfileImageBuilder for DockerRuntime {
    fn build_profile_image(
        &self,
        cancel: &CancelToken,
        profile_dir: &Path,
        tag: &str,
        force: bool,
    ) -> Result<()> {
        self.ensure_image(cancel, profile_dir, tag, force)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::runtime::{MountSpec, PortSpec, ResourceLimits};
    use std::path::PathBuf;

    fn sample_config() -> InstanceConfig {
        InstanceConfig {
            name: "taskbox-s1".to_string(),
            image: "taskbox-base".to_string(),
            working_dir: "/tmp/proj".to_string(),
            mounts: vec![
                MountSpec {
                    source: PathBuf::from("/host/work"),
                    target: "/tmp/proj".to_string(),
                    read_only: false,
                },
                MountSpec {
                    source: PathBuf::from("/host/config.json"),
                    target: "/taskbox/config.json".to_string(),
                    read_only: true,
                },
            ],
            ports: vec![PortSpec {
                host: 8080,
                instance: 80,
                protocol: "tcp".to_string(),
            }],
            network_mode: String::new(),
            use_init: true,
            resources: Some(ResourceLimits {
                nano_cpus: Some(1_500_000_000),
                memory_bytes: Some(1_073_741_824),
            }),
            capabilities: vec!["NET_ADMIN".to_string()],
        }
    }

    #[test]
    fn create_args_shape() {
        let args = create_args(&sample_config());
        let joined = args.join(" ");
        assert!(joined.starts_with("create --name taskbox-s1"));
        assert!(joined.contains("--init"));
        assert!(joined.contains("--workdir /tmp/proj"));
        assert!(joined.contains("--cap-add NET_ADMIN"));
        assert!(joined.contains("--cpus 1.5"));
        assert!(joined.contains("--memory 1073741824b"));
        assert!(joined.contains("--mount type=bind,source=/host/work,target=/tmp/proj"));
        assert!(joined.contains("type=bind,source=/host/config.json,target=/taskbox/config.json,readonly"));
        assert!(joined.contains("-p 8080:80/tcp"));
        assert!(joined.ends_with("taskbox-base"));
    }

    #[test]
    fn create_args_omit_empty_network() {
        let mut config = sample_config();
        config.network_mode = String::new();
        assert!(!create_args(&config).contains(&"--network".to_string()));

        config.network_mode = "none".to_string();
        let args = create_args(&config);
        let idx = args.iter().position(|a| a == "--network").unwrap();
        assert_eq!(args[idx + 1], "none");
    }

    #[test]
    fn not_found_stderr_detection() {
        assert!(stderr_means_not_found("Error: No such container: taskbox-x"));
        assert!(stderr_means_not_found("error: no such object"));
        assert!(!stderr_means_not_found("permission denied"));
    }

    #[test]
    fn diag_hint_names_binary() {
        let runtime = DockerRuntime::with_binary("docker");
        assert!(runtime.diag_hint("taskbox-s1").contains("docker logs taskbox-s1"));
    }

    #[test]
    fn docker_runtime_is_image_builder() {
        let runtime = DockerRuntime::with_binary("docker");
        assert!(runtime.as_image_builder().is_some());
    }
}
