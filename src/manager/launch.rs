//! Instance launch: secrets, mounts, resource limits, and the
//! immediate-exit health check.

use std::collections::BTreeMap;
use std::fs;
use std::path::Path;
use std::time::Duration;

use anyhow::{Context, Result, bail};
use tracing::{info, warn};

use crate::agents::{self, AgentDefinition};
use crate::auth;
use crate::config::{ConfigStore, Resources};
use crate::errors::usage;
use crate::manager::SandboxManager;
use crate::manager::meta::SandboxMeta;
use crate::manager::types::ContainerConfig;
use crate::mounts;
use crate::paths::instance_name;
use crate::profile::ProfileResolver;
use crate::runtime::{InstanceConfig, ResourceLimits};
use crate::seed;

impl SandboxManager {
    /// Create and start the runtime instance for a persisted sandbox.
    pub(crate) fn launch_container(
        &self,
        meta: &SandboxMeta,
        agent: &AgentDefinition,
    ) -> Result<()> {
        let cancel = self.cancel().clone();
        cancel.check()?;

        // In-instance firewalling enforces the allowlist, so isolated
        // mode needs CAP_NET_ADMIN, which only the docker backend grants.
        if meta.network_mode == "isolated" && meta.backend != "docker" {
            return Err(usage(format!(
                "isolated network mode requires the docker backend (sandbox uses {:?})",
                meta.backend
            )));
        }

        let sandbox = self.sandbox(&meta.name);
        let instance = instance_name(&meta.name);

        let merged_env = self.merged_env_for(meta);
        let secrets = auth::materialize_secrets(agent, &merged_env)?;
        let secret_files = secrets
            .as_ref()
            .map(auth::secret_files)
            .unwrap_or_default();

        let container_config: ContainerConfig = serde_json::from_str(
            &fs::read_to_string(sandbox.config_file())
                .with_context(|| format!("failed to read {}", sandbox.config_file().display()))?,
        )
        .context("config.json is not valid")?;

        let plan = mounts::assemble(
            meta,
            &sandbox,
            agent,
            &container_config.tmux_conf,
            &secret_files,
        )?;

        // The runtime sees "" (default bridge) for isolated mode; the
        // entrypoint's firewall enforces the allowlist.
        let (network_mode, capabilities) = match meta.network_mode.as_str() {
            "isolated" => (String::new(), vec!["NET_ADMIN".to_string()]),
            other => (other.to_string(), Vec::new()),
        };

        let image = if meta.image_ref.is_empty() {
            "taskbox-base".to_string()
        } else {
            meta.image_ref.clone()
        };
        self.ensure_profile_image(&cancel, &image)?;

        let config = InstanceConfig {
            name: instance.clone(),
            image,
            working_dir: meta.workdir.mount_path.clone(),
            mounts: plan.mounts,
            ports: plan.ports,
            network_mode,
            use_init: true,
            resources: parse_resources(meta.resources.as_ref())?,
            capabilities,
        };

        cancel.check()?;
        self.runtime().create(&cancel, &config)?;
        self.runtime().start(&cancel, &instance)?;
        info!(name = %meta.name, instance = %instance, "launch:instance started");

        // Give the entrypoint time to pick up secrets and come up, then
        // verify it survived.
        std::thread::sleep(Duration::from_secs(1));
        cancel.check()?;
        let info = self.runtime().inspect(&cancel, &instance)?;
        if !info.running {
            let tail = log_tail(&sandbox.log_file(), 20);
            let diagnostics = if tail.is_empty() {
                self.runtime().diag_hint(&instance)
            } else {
                tail
            };
            bail!(
                "instance {instance} exited immediately after start (exit code {:?})\n{diagnostics}",
                info.exit_code
            );
        }

        // The instance has had its pickup window; the secrets dir is
        // removed when `secrets` drops here.
        drop(secrets);
        Ok(())
    }

    /// Rebuild a removed instance from persisted metadata: refresh the
    /// seed files, then launch as usual.
    pub(crate) fn recreate_container(&self, meta: &SandboxMeta) -> Result<()> {
        let agent = agents::find(&meta.agent)
            .ok_or_else(|| usage(format!("sandbox references unknown agent {:?}", meta.agent)))?;
        let sandbox = self.sandbox(&meta.name);

        let auth_status = auth::discover(agent, &self.merged_env_for(meta));
        seed::materialize(agent, &sandbox, &auth_status)?;
        seed::ensure_container_settings(agent, &sandbox)?;
        if meta.backend != "seatbelt" {
            seed::ensure_home_seed_config(agent, &sandbox)?;
        }

        self.launch_container(meta, agent)
    }

    /// Build a missing per-profile image when the runtime can. Backends
    /// without the capability silently skip; the base image is setup's
    /// responsibility.
    fn ensure_profile_image(
        &self,
        cancel: &crate::cancel::CancelToken,
        image: &str,
    ) -> Result<()> {
        let Some(profile) = image.strip_prefix("taskbox-") else {
            return Ok(());
        };
        if profile == "base" || self.runtime().image_exists(cancel, image)? {
            return Ok(());
        }
        let profile_dir = self.paths().profile_dir(profile);
        if !profile_dir.join("Dockerfile").exists() {
            return Ok(());
        }
        let Some(builder) = self.runtime().as_image_builder() else {
            warn!(image, "launch:runtime cannot build profile images, using tag as-is");
            return Ok(());
        };
        builder.build_profile_image(cancel, &profile_dir, image, false)
    }

    /// The env the sandbox was configured with: base config env plus its
    /// profile chain. Best-effort; a deleted profile falls back to the
    /// base env.
    fn merged_env_for(&self, meta: &SandboxMeta) -> BTreeMap<String, String> {
        let store = ConfigStore::new(self.paths().base_config_file());
        let base = match store.load() {
            Ok(base) => base,
            Err(e) => {
                warn!(error = %e, "launch:failed to load config, using empty env");
                return BTreeMap::new();
            }
        };
        if meta.profile.is_empty() {
            return base.env;
        }
        let resolver = ProfileResolver::new(self.paths());
        match resolver
            .resolve_chain(&meta.profile)
            .and_then(|chain| resolver.merge(&base, &chain))
        {
            Ok(merged) => merged.env,
            Err(e) => {
                warn!(profile = %meta.profile, error = %e, "launch:profile unavailable, using base env");
                base.env
            }
        }
    }
}

/// Parse the meta resource strings into runtime limits.
pub fn parse_resources(resources: Option<&Resources>) -> Result<Option<ResourceLimits>> {
    let Some(resources) = resources else {
        return Ok(None);
    };
    let limits = ResourceLimits {
        nano_cpus: parse_cpus(&resources.cpus)?,
        memory_bytes: parse_memory(&resources.memory)?,
    };
    Ok((limits.nano_cpus.is_some() || limits.memory_bytes.is_some()).then_some(limits))
}

/// CPUs: a decimal float ≥ 0; the runtime receives `floor(x * 1e9)`.
pub fn parse_cpus(value: &str) -> Result<Option<i64>> {
    if value.is_empty() {
        return Ok(None);
    }
    let cpus: f64 = value
        .parse()
        .map_err(|_| usage(format!("invalid cpus value {value:?}")))?;
    if cpus < 0.0 || !cpus.is_finite() {
        return Err(usage(format!("invalid cpus value {value:?}")));
    }
    Ok(Some((cpus * 1e9).floor() as i64))
}

/// Memory: `[0-9.]+` with an optional case-insensitive b/k/m/g suffix;
/// no suffix means bytes. Zero, negative, or unparsable values error.
pub fn parse_memory(value: &str) -> Result<Option<i64>> {
    if value.is_empty() {
        return Ok(None);
    }
    let lower = value.trim().to_lowercase();
    let (number, multiplier) = match lower.chars().last() {
        Some('b') => (&lower[..lower.len() - 1], 1i64),
        Some('k') => (&lower[..lower.len() - 1], 1024),
        Some('m') => (&lower[..lower.len() - 1], 1024 * 1024),
        Some('g') => (&lower[..lower.len() - 1], 1024 * 1024 * 1024),
        _ => (lower.as_str(), 1),
    };
    if number.is_empty() || !number.chars().all(|c| c.is_ascii_digit() || c == '.') {
        return Err(usage(format!("invalid memory value {value:?}")));
    }
    let amount: f64 = number
        .parse()
        .map_err(|_| usage(format!("invalid memory value {value:?}")))?;
    let bytes = (amount * multiplier as f64) as i64;
    if bytes <= 0 {
        return Err(usage(format!("memory value {value:?} must be positive")));
    }
    Ok(Some(bytes))
}

/// The last `lines` lines of a log file, empty when unreadable.
pub fn log_tail(path: &Path, lines: usize) -> String {
    let Ok(contents) = fs::read_to_string(path) else {
        return String::new();
    };
    let all: Vec<&str> = contents.lines().collect();
    let start = all.len().saturating_sub(lines);
    all[start..].join("\n")
}
