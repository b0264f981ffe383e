//! Work-copy management: copying the user's directory into the sandbox
//! tree and establishing a fresh git baseline to diff against.

use std::fs;
use std::path::Path;

use anyhow::{Context, Result};
use tracing::{debug, info};

use crate::cancel::CancelToken;
use crate::cmd;

/// Recursively copy `src` into `dst` (contents, permissions preserved).
pub fn copy_tree(src: &Path, dst: &Path) -> Result<()> {
    fs::create_dir_all(dst)
        .with_context(|| format!("Failed to create work copy dir: {}", dst.display()))?;

    let mut options = fs_extra::dir::CopyOptions::new();
    options.content_only = true;
    options.copy_inside = true;
    fs_extra::dir::copy(src, dst, &options).with_context(|| {
        format!(
            "Failed to copy {} to {}",
            src.display(),
            dst.display()
        )
    })?;
    Ok(())
}

/// Remove every entry named `.git` under `dir`, post-order. This detaches
/// the copy from worktree links, submodule gitfiles, and LFS hooks,
/// whether `.git` is a directory or a file.
pub fn strip_git_metadata(dir: &Path) -> Result<()> {
    let entries = fs::read_dir(dir)
        .with_context(|| format!("Failed to read directory: {}", dir.display()))?;

    for entry in entries {
        let entry = entry?;
        let path = entry.path();
        let file_type = entry.file_type()?;

        if file_type.is_dir() && !file_type.is_symlink() {
            strip_git_metadata(&path)?;
        }

        if entry.file_name() == ".git" {
            if file_type.is_dir() {
                fs::remove_dir_all(&path)
                    .with_context(|| format!("Failed to remove {}", path.display()))?;
            } else {
                fs::remove_file(&path)
                    .with_context(|| format!("Failed to remove {}", path.display()))?;
            }
            debug!(path = %path.display(), "workspace:stripped .git");
        }
    }
    Ok(())
}

/// Initialize a fresh repository in `dir` and commit everything as the
/// baseline. Returns the baseline commit SHA.
pub fn git_baseline(dir: &Path, cancel: &CancelToken) -> Result<String> {
    cancel.check()?;
    cmd::git(dir).arg("init").run().context("git init failed")?;
    cmd::git(dir)
        .args(["config", "user.name", "taskbox"])
        .run()?;
    cmd::git(dir)
        .args(["config", "user.email", "taskbox@localhost"])
        .run()?;
    cancel.check()?;
    cmd::git(dir).args(["add", "-A"]).run().context("git add failed")?;
    cmd::git(dir)
        .args(["commit", "-m", "taskbox baseline", "--allow-empty"])
        .run()
        .context("baseline commit failed")?;
    cancel.check()?;

    let sha = cmd::git(dir)
        .args(["rev-parse", "HEAD"])
        .run_and_capture_stdout()
        .context("failed to read baseline SHA")?;
    info!(dir = %dir.display(), sha = %sha, "workspace:baseline created");
    Ok(sha)
}

/// Copy + strip + baseline, the full sequence for a copy-mode mount.
pub fn copy_with_baseline(src: &Path, dst: &Path, cancel: &CancelToken) -> Result<String> {
    cancel.check()?;
    copy_tree(src, dst)?;
    strip_git_metadata(dst)?;
    git_baseline(dst, cancel)
}

/// The host repository's HEAD, best-effort. Empty when `dir` is not a
/// repository or has no commits.
pub fn host_head(dir: &Path) -> String {
    cmd::git(dir)
        .args(["rev-parse", "HEAD"])
        .quiet()
        .run_and_capture_stdout()
        .unwrap_or_default()
}

/// Stage untracked files in a live work copy so a following diff sees
/// them.
pub fn stage_untracked(work_dir: &Path) -> Result<()> {
    cmd::git(work_dir).args(["add", "-A"]).run()?;
    Ok(())
}
