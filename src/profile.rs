//! Profile loading and inheritance resolution.
//!
//! Profiles are reusable overlays of config, env, ports, and directories,
//! composable via single-parent `extends`. The chain always terminates in
//! the implicit `base` root, which has no profile file of its own.

use std::collections::BTreeMap;
use std::fs;
use std::path::PathBuf;

use anyhow::Result;
use serde::Deserialize;
use tracing::debug;

use crate::config::{Config, NetworkConfig, Resources, expand};
use crate::errors::ConfigError;
use crate::paths::Paths;

#[derive(Debug, Clone, Default, Deserialize)]
pub struct Profile {
    /// Parent profile; "" normalizes to "base".
    #[serde(default)]
    pub extends: String,
    #[serde(default)]
    pub agent: String,
    #[serde(default)]
    pub model: String,
    #[serde(default)]
    pub backend: String,
    #[serde(default)]
    pub tart_image: String,
    #[serde(default)]
    pub env: BTreeMap<String, String>,
    #[serde(default)]
    pub ports: Vec<String>,
    /// Directory-argument string (`path[:mode][=mount]`), parsed later.
    #[serde(default)]
    pub workdir: Option<String>,
    #[serde(default)]
    pub directories: Vec<String>,
    #[serde(default)]
    pub resources: Option<Resources>,
}

/// The result of merging the base config with a profile chain.
#[derive(Debug, Clone, Default)]
pub struct MergedConfig {
    pub agent: String,
    pub model: String,
    pub backend: String,
    pub tart_image: String,
    pub tmux_conf: String,
    pub env: BTreeMap<String, String>,
    pub ports: Vec<String>,
    pub workdir: Option<String>,
    pub directories: Vec<String>,
    pub resources: Option<Resources>,
    pub network: Option<NetworkConfig>,
}

impl MergedConfig {
    /// The merged view of a bare base config (no profile).
    pub fn from_base(base: &Config) -> Self {
        Self {
            agent: base.agent.clone(),
            model: base.model.clone(),
            backend: base.backend.clone(),
            tart_image: base.tart_image.clone(),
            tmux_conf: base.tmux_conf.clone(),
            env: base.env.clone(),
            ports: Vec::new(),
            workdir: None,
            directories: Vec::new(),
            resources: base.resources.clone(),
            network: base.network.clone(),
        }
    }
}

pub struct ProfileResolver<'a> {
    paths: &'a Paths,
}

impl<'a> ProfileResolver<'a> {
    pub fn new(paths: &'a Paths) -> Self {
        Self { paths }
    }

    fn profile_file(&self, name: &str) -> PathBuf {
        self.paths.profile_dir(name).join("profile.yaml")
    }

    /// Load one profile file, expanding `${VAR}` in its scalars.
    pub fn load(&self, name: &str) -> Result<Profile> {
        let path = self.profile_file(name);
        if !path.exists() {
            return Err(ConfigError::new(
                "",
                format!("profile {name:?} not found: {}", path.display()),
            )
            .into());
        }
        let contents = fs::read_to_string(&path).map_err(|e| {
            ConfigError::new("", format!("failed to read {}: {e}", path.display()))
        })?;
        let mut value: serde_yaml::Value = serde_yaml::from_str(&contents)
            .map_err(|e| ConfigError::new("", format!("{}: {e}", path.display())))?;
        expand::expand_tree(&mut value, "")?;
        serde_yaml::from_value(value)
            .map_err(|e| ConfigError::new("", format!("{}: {e}", path.display())).into())
    }

    /// Walk the `extends` chain from `name` toward the root, returning
    /// the chain root-first: `[base, ..., name]`. A revisit before
    /// reaching `base` is a cycle.
    pub fn resolve_chain(&self, name: &str) -> Result<Vec<String>> {
        if name.is_empty() || name == "base" {
            return Ok(vec!["base".to_string()]);
        }

        let mut walked = vec![name.to_string()];
        let mut current = name.to_string();

        loop {
            let profile = self.load(&current)?;
            let parent = if profile.extends.is_empty() {
                "base".to_string()
            } else {
                profile.extends.clone()
            };

            if parent == "base" {
                walked.push(parent);
                break;
            }
            if walked.contains(&parent) {
                walked.push(parent);
                return Err(ConfigError::new(
                    "",
                    format!("cycle: {}", walked.join(" → ")),
                )
                .into());
            }
            walked.push(parent.clone());
            current = parent;
        }

        walked.reverse();
        debug!(profile = name, chain = ?walked, "profile:chain resolved");
        Ok(walked)
    }

    /// Merge the base config with each profile in chain order. Scalars
    /// override when non-empty, env merges key-wise (later wins), ports
    /// and directories append, and the last non-nil workdir wins.
    pub fn merge(&self, base: &Config, chain: &[String]) -> Result<MergedConfig> {
        let mut merged = MergedConfig::from_base(base);

        for name in chain {
            if name == "base" {
                continue;
            }
            let profile = self.load(name)?;
            if !profile.agent.is_empty() {
                merged.agent = profile.agent;
            }
            if !profile.model.is_empty() {
                merged.model = profile.model;
            }
            if !profile.backend.is_empty() {
                merged.backend = profile.backend;
            }
            if !profile.tart_image.is_empty() {
                merged.tart_image = profile.tart_image;
            }
            merged.env.extend(profile.env);
            merged.ports.extend(profile.ports);
            merged.directories.extend(profile.directories);
            if profile.workdir.is_some() {
                merged.workdir = profile.workdir;
            }
            if profile.resources.is_some() {
                merged.resources = profile.resources;
            }
        }

        Ok(merged)
    }

    /// The image tag for a chain: `taskbox-<name>` for the nearest
    /// Dockerfile-bearing profile walking child to root, else
    /// `taskbox-base`.
    pub fn resolve_image(&self, chain: &[String]) -> String {
        for name in chain.iter().rev() {
            if self.paths.profile_dir(name).join("Dockerfile").exists() {
                return format!("taskbox-{name}");
            }
        }
        "taskbox-base".to_string()
    }
}
