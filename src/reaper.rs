//! Pruning of stale secrets directories.
//!
//! Secrets temp dirs normally disappear with their create invocation; a
//! crash can leave them behind under `/tmp/taskbox-*`.

use std::fs;
use std::path::{Path, PathBuf};
use std::time::{Duration, SystemTime};

use anyhow::Result;
use tracing::{info, warn};

/// Remove stale `taskbox-*` directories under `/tmp`. Returns the paths
/// that were (or, in dry-run mode, would be) removed.
pub fn prune(dry_run: bool, max_age: Duration) -> Result<Vec<PathBuf>> {
    prune_in(Path::new("/tmp"), dry_run, max_age)
}

fn prune_in(dir: &Path, dry_run: bool, max_age: Duration) -> Result<Vec<PathBuf>> {
    let mut removed = Vec::new();
    let Ok(entries) = fs::read_dir(dir) else {
        return Ok(removed);
    };
    let cutoff = SystemTime::now() - max_age;

    for entry in entries.flatten() {
        let path = entry.path();
        let name = entry.file_name().to_string_lossy().into_owned();
        if !name.starts_with("taskbox-") {
            continue;
        }
        let Ok(meta) = entry.metadata() else {
            continue;
        };
        if !meta.is_dir() {
            continue;
        }
        let modified = meta.modified().unwrap_or(SystemTime::UNIX_EPOCH);
        if modified > cutoff {
            continue;
        }

        if dry_run {
            info!(path = %path.display(), "prune:would remove");
        } else if let Err(e) = fs::remove_dir_all(&path) {
            warn!(path = %path.display(), error = %e, "prune:removal failed");
            continue;
        } else {
            info!(path = %path.display(), "prune:removed");
        }
        removed.push(path);
    }

    removed.sort();
    Ok(removed)
}
