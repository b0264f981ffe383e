//! One-shot migration of the legacy on-disk layout.
//!
//! Early versions kept everything at the root: `Dockerfile.base`,
//! `entrypoint.sh`, `tmux.conf`, and a single `config.yaml` holding both
//! user defaults and tool state. The current layout puts the base
//! profile under `profiles/base/` and splits state into `state.yaml`.
//! The migration is idempotent and a no-op once the markers are gone.

use std::fs;
use std::path::Path;

use anyhow::{Context, Result};
use serde_yaml::Value;
use tracing::info;

use crate::config::State;
use crate::paths::Paths;

/// Root-level files that move into `profiles/base/` unchanged.
const MOVED_FILES: &[&str] = &[
    "entrypoint.sh",
    "tmux.conf",
    ".resource-checksums",
    ".last-build-checksum",
];

/// True when the root still carries the legacy layout.
fn is_legacy(paths: &Paths) -> bool {
    if paths.root().join("Dockerfile.base").exists() {
        return true;
    }
    let legacy_config = paths.root().join("config.yaml");
    match fs::read_to_string(&legacy_config) {
        Ok(contents) => contents.contains("setup_complete") || contents.contains("defaults:"),
        Err(_) => false,
    }
}

/// Migrate the legacy layout when present. Returns true when a migration
/// ran.
pub fn migrate_if_needed(paths: &Paths) -> Result<bool> {
    if !is_legacy(paths) {
        return Ok(false);
    }
    info!(root = %paths.root().display(), "migrate:legacy layout detected");

    let base_dir = paths.profile_dir("base");
    fs::create_dir_all(&base_dir)
        .with_context(|| format!("failed to create {}", base_dir.display()))?;

    move_if_present(
        &paths.root().join("Dockerfile.base"),
        &base_dir.join("Dockerfile"),
    )?;
    move_if_present(
        &paths.root().join("Dockerfile.base.new"),
        &base_dir.join("Dockerfile.new"),
    )?;
    for name in MOVED_FILES {
        move_if_present(&paths.root().join(name), &base_dir.join(name))?;
        let sibling = format!("{name}.new");
        move_if_present(&paths.root().join(&sibling), &base_dir.join(&sibling))?;
    }

    rename_checksum_key(&base_dir.join(".resource-checksums"))?;
    split_legacy_config(paths)?;

    info!("migrate:completed");
    Ok(true)
}

fn move_if_present(from: &Path, to: &Path) -> Result<()> {
    if from.exists() {
        fs::rename(from, to).with_context(|| {
            format!("failed to move {} to {}", from.display(), to.display())
        })?;
    }
    Ok(())
}

/// The checksum manifest keys follow the new file names.
fn rename_checksum_key(manifest: &Path) -> Result<()> {
    let Ok(contents) = fs::read_to_string(manifest) else {
        return Ok(());
    };
    let mut map: serde_json::Map<String, serde_json::Value> = serde_json::from_str(&contents)
        .with_context(|| format!("{} is not valid JSON", manifest.display()))?;
    if let Some(value) = map.remove("Dockerfile.base") {
        map.insert("Dockerfile".to_string(), value);
        fs::write(manifest, serde_json::to_string_pretty(&map)? + "\n")?;
    }
    Ok(())
}

/// Split the legacy root config.yaml: the `defaults:` mapping becomes
/// the new base config, `setup_complete` moves into state.yaml, and any
/// other top-level keys are preserved in the new config.
fn split_legacy_config(paths: &Paths) -> Result<()> {
    let legacy_path = paths.root().join("config.yaml");
    let Ok(contents) = fs::read_to_string(&legacy_path) else {
        return Ok(());
    };
    let legacy: Value = serde_yaml::from_str(&contents)
        .with_context(|| format!("{} is not valid YAML", legacy_path.display()))?;
    let Value::Mapping(legacy) = legacy else {
        return Ok(());
    };

    let mut new_config = serde_yaml::Mapping::new();
    let mut setup_complete = false;

    for (key, value) in legacy {
        match key.as_str() {
            Some("defaults") => {
                if let Value::Mapping(defaults) = value {
                    for (k, v) in defaults {
                        new_config.insert(k, v);
                    }
                }
            }
            Some("setup_complete") => {
                setup_complete = value.as_bool().unwrap_or(false);
            }
            _ => {
                new_config.insert(key, value);
            }
        }
    }

    let config_path = paths.base_config_file();
    if let Some(parent) = config_path.parent() {
        fs::create_dir_all(parent)?;
    }
    fs::write(
        &config_path,
        serde_yaml::to_string(&Value::Mapping(new_config))?,
    )?;

    State { setup_complete }.save(&paths.state_file())?;
    fs::remove_file(&legacy_path)
        .with_context(|| format!("failed to remove {}", legacy_path.display()))?;
    Ok(())
}
