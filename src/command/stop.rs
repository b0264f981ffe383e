use anyhow::Result;

use crate::cancel::CancelToken;
use crate::paths::Paths;

pub fn run(paths: &Paths, cancel: &CancelToken, name: &str) -> Result<()> {
    let mut manager = super::manager_for(paths, cancel, Some(name))?;
    manager.stop(name)?;
    println!("sandbox {name} stopped");
    Ok(())
}
