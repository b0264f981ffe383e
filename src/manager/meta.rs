//! The persistent sandbox descriptor.
//!
//! `meta.json` fully determines how to rebuild the runtime instance; no
//! state that mutates inside the instance is required. Unset scalar
//! fields, empty lists, and absent optionals are omitted from the
//! serialized form, and unknown fields are tolerated on read so newer
//! metas load under older binaries.

use std::fs;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};

use crate::config::Resources;

/// One mounted directory: the workdir or an auxiliary mount.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct DirSpec {
    pub host_path: PathBuf,
    pub mount_path: String,
    /// "copy", "rw", or "ro".
    pub mode: String,
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub baseline_sha: String,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct SandboxMeta {
    /// Tool version that created the sandbox.
    pub version: String,
    pub name: String,
    pub created_at: String,
    pub backend: String,
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub profile: String,
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub image_ref: String,
    pub agent: String,
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub model: String,
    pub workdir: DirSpec,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub directories: Vec<DirSpec>,
    #[serde(default, skip_serializing_if = "std::ops::Not::not")]
    pub has_prompt: bool,
    /// "", "none", or "isolated".
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub network_mode: String,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub network_allow: Vec<String>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub ports: Vec<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub resources: Option<Resources>,
}

impl SandboxMeta {
    pub fn load(path: &Path) -> Result<Self> {
        let contents = fs::read_to_string(path)
            .with_context(|| format!("Failed to read {}", path.display()))?;
        serde_json::from_str(&contents)
            .with_context(|| format!("Failed to parse {}", path.display()))
    }

    pub fn save(&self, path: &Path) -> Result<()> {
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent)?;
        }
        let contents = serde_json::to_string_pretty(self)?;
        fs::write(path, contents + "\n")
            .with_context(|| format!("Failed to write {}", path.display()))
    }

    /// All copy-mode mounts (workdir first), the set that carries a work
    /// copy and participates in change detection.
    pub fn copy_mounts(&self) -> Vec<&DirSpec> {
        let mut mounts = Vec::new();
        if self.workdir.mode == "copy" {
            mounts.push(&self.workdir);
        }
        mounts.extend(self.directories.iter().filter(|d| d.mode == "copy"));
        mounts
    }
}
