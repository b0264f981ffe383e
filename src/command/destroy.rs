use std::io::BufRead;

use anyhow::Result;

use crate::cancel::CancelToken;
use crate::confirm;
use crate::paths::Paths;

pub fn run(paths: &Paths, cancel: &CancelToken, name: &str, yes: bool) -> Result<()> {
    let mut manager = super::manager_for(paths, cancel, Some(name))?;

    if !yes && manager.needs_confirmation(name)? {
        let mut stdin = std::io::BufReader::new(std::io::stdin());
        let question = format!("Sandbox {name:?} has uncommitted changes. Destroy anyway?");
        if !confirm::confirm(&question, &mut stdin as &mut dyn BufRead)? {
            println!("Aborted.");
            return Ok(());
        }
    }

    manager.destroy(name)?;
    println!("sandbox {name} destroyed");
    Ok(())
}
