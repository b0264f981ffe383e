//! CLI command implementations. Each module holds one subcommand's glue
//! between parsed arguments and the manager.

pub mod config;
pub mod create;
pub mod destroy;
pub mod inspect;
pub mod list;
pub mod prune_temp;
pub mod reset;
pub mod setup;
pub mod start;
pub mod stop;

use anyhow::Result;

use crate::cancel::CancelToken;
use crate::config::ConfigStore;
use crate::manager::SandboxManager;
use crate::manager::meta::SandboxMeta;
use crate::paths::Paths;
use crate::runtime;

/// Build a manager whose runtime matches the sandbox's backend when the
/// sandbox exists, falling back to the configured default backend.
pub(crate) fn manager_for(
    paths: &Paths,
    cancel: &CancelToken,
    sandbox_name: Option<&str>,
) -> Result<SandboxManager> {
    let backend = sandbox_name
        .and_then(|name| {
            SandboxMeta::load(&paths.sandbox_dir(name).join("meta.json"))
                .ok()
                .map(|meta| meta.backend)
        })
        .unwrap_or_else(|| {
            ConfigStore::new(paths.base_config_file())
                .load()
                .map(|config| config.backend)
                .unwrap_or_else(|_| "docker".to_string())
        });

    let runtime = runtime::for_backend(&backend)?;
    Ok(SandboxManager::new(paths.clone(), runtime, cancel.clone()))
}
