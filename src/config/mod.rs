//! Layered configuration: global config file, profiles, CLI overrides.
//!
//! The global config lives at `profiles/base/config.yaml`; tool state at
//! `state.yaml`. Dotted-path edits preserve comments (see [`document`]);
//! scalar reads expand `${VAR}` references (see [`expand`]).

pub mod document;
pub mod expand;
pub mod store;

use std::collections::BTreeMap;
use std::fs;
use std::path::Path;

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};

pub use store::ConfigStore;

/// Resource limits for a sandbox instance. Strings are parsed at launch
/// time (`cpus` decimal, `memory` with optional b/k/m/g suffix).
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Resources {
    #[serde(default)]
    pub cpus: String,
    #[serde(default)]
    pub memory: String,
}

impl Resources {
    pub fn is_empty(&self) -> bool {
        self.cpus.is_empty() && self.memory.is_empty()
    }
}

/// Network policy carried by the global config.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct NetworkConfig {
    /// "" (default), "none", or "isolated".
    #[serde(default)]
    pub mode: String,
    /// Allowed domains, meaningful only for mode "isolated".
    #[serde(default)]
    pub allow: Vec<String>,
}

/// The global configuration file model.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Config {
    #[serde(default)]
    pub agent: String,
    #[serde(default)]
    pub model: String,
    #[serde(default)]
    pub backend: String,
    #[serde(default)]
    pub tmux_conf: String,
    #[serde(default)]
    pub tart_image: String,
    #[serde(default)]
    pub env: BTreeMap<String, String>,
    #[serde(default)]
    pub resources: Option<Resources>,
    #[serde(default)]
    pub network: Option<NetworkConfig>,
}

/// Known settings and their defaults, consulted by `get` and `effective`.
pub fn known_defaults() -> Vec<(&'static str, &'static str)> {
    vec![
        ("agent", "claude"),
        ("model", ""),
        ("backend", "docker"),
        ("tmux_conf", "default"),
        ("tart_image", "ghcr.io/cirruslabs/macos-sonoma-base:latest"),
    ]
}

/// Known collection-valued settings, emitted empty by `effective` when
/// the file does not set them.
pub fn known_collections() -> Vec<&'static str> {
    vec!["env"]
}

impl Config {
    /// Fill unset scalars from the known defaults.
    pub fn with_defaults(mut self) -> Self {
        for (key, default) in known_defaults() {
            let slot = match key {
                "agent" => &mut self.agent,
                "model" => &mut self.model,
                "backend" => &mut self.backend,
                "tmux_conf" => &mut self.tmux_conf,
                "tart_image" => &mut self.tart_image,
                _ => continue,
            };
            if slot.is_empty() {
                *slot = default.to_string();
            }
        }
        self
    }
}

/// Persistent tool state, separate from user configuration.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct State {
    #[serde(default)]
    pub setup_complete: bool,
}

impl State {
    pub fn load(path: &Path) -> Result<Self> {
        if !path.exists() {
            return Ok(Self::default());
        }
        let contents = fs::read_to_string(path)
            .with_context(|| format!("Failed to read state file: {}", path.display()))?;
        serde_yaml::from_str(&contents)
            .with_context(|| format!("Failed to parse state file: {}", path.display()))
    }

    pub fn save(&self, path: &Path) -> Result<()> {
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent)?;
        }
        let contents = serde_yaml::to_string(self)?;
        fs::write(path, contents)
            .with_context(|| format!("Failed to write state file: {}", path.display()))
    }
}
