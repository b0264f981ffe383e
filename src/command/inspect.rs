use anyhow::Result;
use console::style;

use crate::cancel::CancelToken;
use crate::paths::Paths;

pub fn run(paths: &Paths, cancel: &CancelToken, name: &str, json: bool) -> Result<()> {
    let manager = super::manager_for(paths, cancel, Some(name))?;
    let report = manager.inspect(name)?;

    if json {
        println!("{}", serde_json::to_string_pretty(&report)?);
        return Ok(());
    }

    println!("{}", style(&report.meta.name).bold());
    println!("  status:   {}", report.status_name);
    println!("  agent:    {}", report.meta.agent);
    if !report.meta.model.is_empty() {
        println!("  model:    {}", report.meta.model);
    }
    println!("  backend:  {}", report.meta.backend);
    if !report.meta.profile.is_empty() {
        println!("  profile:  {}", report.meta.profile);
    }
    println!(
        "  workdir:  {} ({})",
        report.meta.workdir.host_path.display(),
        report.meta.workdir.mode
    );
    for dir in &report.meta.directories {
        println!("  dir:      {} ({})", dir.host_path.display(), dir.mode);
    }
    if !report.container_id.is_empty() {
        let short = &report.container_id[..report.container_id.len().min(12)];
        println!("  instance: {short}");
    }
    println!("  changes:  {}", if report.has_changes { "yes" } else { "no" });
    println!("  disk:     {}", human_bytes(report.disk_usage_bytes));
    println!("  created:  {}", report.meta.created_at);
    Ok(())
}

fn human_bytes(bytes: u64) -> String {
    const UNITS: &[&str] = &["B", "KiB", "MiB", "GiB", "TiB"];
    let mut value = bytes as f64;
    let mut unit = 0;
    while value >= 1024.0 && unit < UNITS.len() - 1 {
        value /= 1024.0;
        unit += 1;
    }
    if unit == 0 {
        format!("{bytes} B")
    } else {
        format!("{value:.1} {}", UNITS[unit])
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn human_bytes_scales() {
        assert_eq!(human_bytes(512), "512 B");
        assert_eq!(human_bytes(2048), "2.0 KiB");
        assert_eq!(human_bytes(1_572_864), "1.5 MiB");
    }
}
