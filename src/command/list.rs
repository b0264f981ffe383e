use anyhow::Result;
use tabled::{
    Table, Tabled,
    settings::{Padding, Style, object::Columns},
};

use crate::cancel::CancelToken;
use crate::paths::Paths;

#[derive(Tabled)]
struct SandboxRow {
    #[tabled(rename = "NAME")]
    name: String,
    #[tabled(rename = "STATUS")]
    status: String,
    #[tabled(rename = "AGENT")]
    agent: String,
    #[tabled(rename = "PROFILE")]
    profile: String,
    #[tabled(rename = "CHANGES")]
    changes: String,
    #[tabled(rename = "CREATED")]
    created: String,
}

pub fn run(paths: &Paths, cancel: &CancelToken) -> Result<()> {
    let manager = super::manager_for(paths, cancel, None)?;
    let entries = manager.list()?;

    if entries.is_empty() {
        println!("No sandboxes found");
        return Ok(());
    }

    let rows: Vec<SandboxRow> = entries
        .into_iter()
        .map(|entry| SandboxRow {
            name: entry.name,
            status: entry.status.to_string(),
            agent: dash_if_empty(entry.agent),
            profile: dash_if_empty(entry.profile),
            changes: if entry.has_changes { "●" } else { "-" }.to_string(),
            created: short_timestamp(&entry.created_at),
        })
        .collect();

    let mut table = Table::new(rows);
    table
        .with(Style::blank())
        .modify(Columns::new(0..6), Padding::new(0, 1, 0, 0));
    println!("{table}");
    Ok(())
}

fn dash_if_empty(value: String) -> String {
    if value.is_empty() { "-".to_string() } else { value }
}

/// Trim an RFC 3339 timestamp to date + minutes for the table.
fn short_timestamp(ts: &str) -> String {
    if ts.is_empty() {
        return "-".to_string();
    }
    ts.chars().take(16).collect::<String>().replace('T', " ")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn timestamps_shorten() {
        assert_eq!(
            short_timestamp("2026-03-01T12:34:56.789Z"),
            "2026-03-01 12:34"
        );
        assert_eq!(short_timestamp(""), "-");
    }
}
