use anyhow::Result;

use crate::cancel::CancelToken;
use crate::paths::Paths;

pub fn run(paths: &Paths, cancel: &CancelToken, name: &str, resume: bool) -> Result<()> {
    let mut manager = super::manager_for(paths, cancel, Some(name))?;
    manager.start(name, resume)?;
    println!("sandbox {name} started");
    Ok(())
}
