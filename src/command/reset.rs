use anyhow::Result;

use crate::cancel::CancelToken;
use crate::manager::reset::ResetOptions;
use crate::paths::Paths;

pub fn run(paths: &Paths, cancel: &CancelToken, name: &str, opts: ResetOptions) -> Result<()> {
    let mut manager = super::manager_for(paths, cancel, Some(name))?;
    manager.reset(name, opts)?;
    println!("sandbox {name} reset");
    Ok(())
}
