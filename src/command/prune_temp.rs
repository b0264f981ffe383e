use std::time::Duration;

use anyhow::Result;

use crate::reaper;

pub fn run(dry_run: bool, max_age_secs: u64) -> Result<()> {
    let removed = reaper::prune(dry_run, Duration::from_secs(max_age_secs))?;
    if removed.is_empty() {
        println!("Nothing to prune");
        return Ok(());
    }
    let verb = if dry_run { "Would remove" } else { "Removed" };
    for path in &removed {
        println!("{verb} {}", path.display());
    }
    Ok(())
}
