//! Guard rails applied before a sandbox touches host directories.

use std::path::{Path, PathBuf};

use anyhow::Result;
use tracing::debug;

use crate::cmd;
use crate::errors::usage;

/// System directories that must never be mounted as a sandbox workdir.
const DANGEROUS: &[&str] = &[
    "/", "/usr", "/etc", "/var", "/boot", "/bin", "/sbin", "/lib", "/System", "/Library",
    "/Applications",
];

/// True when `path` (literal or symlink-resolved) is a protected system
/// directory or the user's home directory.
pub fn is_dangerous(path: &Path) -> bool {
    let mut candidates = vec![path.to_path_buf()];
    if let Ok(resolved) = path.canonicalize() {
        if resolved != path {
            candidates.push(resolved);
        }
    }

    let home = home::home_dir();
    for candidate in &candidates {
        if DANGEROUS.iter().any(|d| Path::new(d) == candidate) {
            return true;
        }
        if let Some(ref home) = home
            && candidate == home
        {
            return true;
        }
    }
    false
}

/// Error when any two paths are equal or one contains the other.
/// `/abc` vs `/ab` is fine; `/a` vs `/a/b` is not.
pub fn check_overlap(paths: &[PathBuf]) -> Result<()> {
    let resolved: Vec<PathBuf> = paths
        .iter()
        .map(|p| p.canonicalize().unwrap_or_else(|_| p.clone()))
        .collect();

    for (i, a) in resolved.iter().enumerate() {
        for (j, b) in resolved.iter().enumerate() {
            if i >= j {
                continue;
            }
            if a == b {
                return Err(usage(format!(
                    "directories overlap: {} and {} are the same path",
                    paths[i].display(),
                    paths[j].display()
                )));
            }
            if a.starts_with(b) || b.starts_with(a) {
                return Err(usage(format!(
                    "directories overlap: {} contains {}",
                    if a.starts_with(b) { paths[j].display() } else { paths[i].display() },
                    if a.starts_with(b) { paths[i].display() } else { paths[j].display() },
                )));
            }
        }
    }
    Ok(())
}

/// When `path` is a git repository, report uncommitted work as a short
/// human string ("3 modified, 2 untracked"). Ok(None) when clean or not
/// a repository.
pub fn check_dirty_repo(path: &Path) -> Result<Option<String>> {
    if !path.join(".git").exists() {
        return Ok(None);
    }

    let output = cmd::git(path)
        .args(["status", "--porcelain"])
        .run_and_capture_stdout()?;

    let mut modified = 0usize;
    let mut untracked = 0usize;
    for line in output.lines() {
        if line.starts_with("??") {
            untracked += 1;
        } else if !line.trim().is_empty() {
            modified += 1;
        }
    }

    if modified == 0 && untracked == 0 {
        return Ok(None);
    }

    debug!(path = %path.display(), modified, untracked, "safety:dirty repo");
    let mut parts = Vec::new();
    if modified > 0 {
        parts.push(format!("{modified} modified"));
    }
    if untracked > 0 {
        parts.push(format!("{untracked} untracked"));
    }
    Ok(Some(parts.join(", ")))
}

/// True when a URL points at the host loopback interface, which is
/// unreachable from inside a container or VM.
pub fn url_references_localhost(url: &str) -> bool {
    let Some(host_start) = url.find("://").map(|i| i + 3) else {
        return false;
    };
    let rest = &url[host_start..];
    let host_end = rest
        .find(|c| c == ':' || c == '/' || c == '?')
        .unwrap_or(rest.len());
    matches!(&rest[..host_end], "localhost" | "127.0.0.1" | "[::1]")
}
