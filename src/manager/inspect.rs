//! Inspect, list, and status detection.

use std::fs;
use std::path::Path;

use anyhow::Result;
use tracing::debug;

use crate::manager::SandboxManager;
use crate::manager::meta::SandboxMeta;
use crate::manager::types::{InspectReport, ListEntry, Status};
use crate::paths::instance_name;
use crate::runtime;
use crate::safety;

impl SandboxManager {
    /// Observable status of one sandbox, combining runtime state with
    /// in-instance tmux pane introspection.
    pub fn detect_status(&self, name: &str) -> Result<Status> {
        let cancel = self.cancel().clone();
        let instance = instance_name(name);

        let info = match self.runtime().inspect(&cancel, &instance) {
            Err(e) if runtime::is_not_found(&e) => return Ok(Status::Removed),
            Err(e) => return Err(e),
            Ok(info) => info,
        };
        if !info.running {
            return Ok(Status::Stopped);
        }

        // The agent runs in the instance's tmux pane `main`; a dead pane
        // plus its exit status tells done from failed.
        let exec = self.runtime().exec(
            &cancel,
            &instance,
            &[
                "tmux",
                "list-panes",
                "-t",
                "main",
                "-F",
                "#{pane_dead} #{pane_dead_status}",
            ],
            "",
        );
        match exec {
            Err(e) => {
                debug!(name, error = %e, "inspect:pane query failed, assuming running");
                Ok(Status::Running)
            }
            Ok(result) if result.exit_code != 0 => Ok(Status::Running),
            Ok(result) => Ok(classify_pane_output(&result.stdout)),
        }
    }

    /// Full report for one sandbox.
    pub fn inspect(&self, name: &str) -> Result<InspectReport> {
        let meta = self.load_meta(name)?;
        let status = self.detect_status(name)?;

        let container_id = match self
            .runtime()
            .inspect(&self.cancel().clone(), &instance_name(name))
        {
            Ok(info) => info.id,
            Err(_) => String::new(),
        };

        let sandbox = self.sandbox(name);
        let mut has_changes = false;
        for dir in meta.copy_mounts() {
            let copy = sandbox.work_copy(&dir.host_path);
            if copy.exists() && safety::check_dirty_repo(&copy)?.is_some() {
                has_changes = true;
                break;
            }
        }

        Ok(InspectReport {
            status_name: status.to_string(),
            status: Some(status),
            container_id,
            has_changes,
            disk_usage_bytes: dir_size(sandbox.dir()),
            meta,
        })
    }

    /// Every sandbox under the root. Entries that cannot be inspected
    /// appear as broken stubs rather than failing the listing.
    pub fn list(&self) -> Result<Vec<ListEntry>> {
        let dir = self.paths().sandboxes_dir();
        if !dir.exists() {
            return Ok(Vec::new());
        }

        let mut entries = Vec::new();
        let mut names: Vec<_> = fs::read_dir(&dir)?
            .flatten()
            .map(|e| (e.file_name().to_string_lossy().into_owned(), e.path()))
            .collect();
        names.sort();

        for (name, path) in names {
            if !path.is_dir() {
                entries.push(broken_stub(&name));
                continue;
            }
            let Ok(meta) = SandboxMeta::load(&path.join("meta.json")) else {
                entries.push(broken_stub(&name));
                continue;
            };
            let status = self.detect_status(&name).unwrap_or(Status::Broken);
            let has_changes = self
                .inspect_changes(&meta)
                .unwrap_or(false);
            entries.push(ListEntry {
                name,
                status,
                agent: meta.agent,
                profile: meta.profile,
                created_at: meta.created_at,
                has_changes,
            });
        }
        Ok(entries)
    }

    fn inspect_changes(&self, meta: &SandboxMeta) -> Result<bool> {
        let sandbox = self.sandbox(&meta.name);
        for dir in meta.copy_mounts() {
            let copy = sandbox.work_copy(&dir.host_path);
            if copy.exists() && safety::check_dirty_repo(&copy)?.is_some() {
                return Ok(true);
            }
        }
        Ok(false)
    }
}

fn broken_stub(name: &str) -> ListEntry {
    ListEntry {
        name: name.to_string(),
        status: Status::Broken,
        agent: String::new(),
        profile: String::new(),
        created_at: String::new(),
        has_changes: false,
    }
}

/// Classify `tmux list-panes` output for the agent pane.
fn classify_pane_output(output: &str) -> Status {
    let first_line = output.lines().next().unwrap_or("");
    let mut fields = first_line.split_whitespace();
    match fields.next() {
        None | Some("0") => Status::Running,
        Some(_) => match fields.next() {
            Some("0") => Status::Done,
            _ => Status::Failed,
        },
    }
}

/// Recursive directory size in bytes, best-effort.
fn dir_size(path: &Path) -> u64 {
    let Ok(entries) = fs::read_dir(path) else {
        return 0;
    };
    let mut total = 0;
    for entry in entries.flatten() {
        let Ok(file_type) = entry.file_type() else {
            continue;
        };
        if file_type.is_dir() {
            total += dir_size(&entry.path());
        } else if let Ok(meta) = entry.metadata() {
            total += meta.len();
        }
    }
    total
}
