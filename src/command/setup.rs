use anyhow::Result;

use crate::cancel::CancelToken;
use crate::config::ConfigStore;
use crate::paths::Paths;
use crate::{runtime, setup};

pub fn run(paths: &Paths, cancel: &CancelToken, force: bool) -> Result<()> {
    let backend = ConfigStore::new(paths.base_config_file())
        .load()
        .map(|config| config.backend)
        .unwrap_or_else(|_| "docker".to_string());
    let runtime = runtime::for_backend(&backend)?;
    setup::run(paths, runtime.as_ref(), cancel, force)
}
