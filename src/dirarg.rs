//! Parsing of user directory arguments.
//!
//! Grammar (scanned right to left): `path[:mode][:force][=mount]`. The
//! mount is split off first on the last `=`, then mode/force suffixes are
//! stripped from the right, and whatever remains is the host path.

use std::path::{Path, PathBuf};

use anyhow::Result;

use crate::config::expand;
use crate::errors::usage;

/// Parsed form of a directory argument.
#[derive(Debug, Clone, PartialEq)]
pub struct DirArg {
    pub path: PathBuf,
    pub mount_path: Option<String>,
    /// "" (caller default, read-only for auxiliaries), "copy", or "rw".
    pub mode: String,
    pub force: bool,
}

/// Parse one directory argument. `default_mode` applies when the argument
/// carries no `:copy`/`:rw` suffix ("copy" for the workdir, "" for
/// auxiliaries).
pub fn parse(arg: &str, default_mode: &str) -> Result<DirArg> {
    // Mount target first: everything after the last '='.
    let (mut token, mount_raw) = match arg.rsplit_once('=') {
        Some((l, r)) if !r.is_empty() => (l, Some(r)),
        _ => (arg, None),
    };

    let mut mode = String::new();
    let mut force = false;
    loop {
        if let Some(rest) = token.strip_suffix(":force") {
            if force {
                return Err(usage(format!("duplicate :force in {arg:?}")));
            }
            force = true;
            token = rest;
        } else if let Some(rest) = token.strip_suffix(":copy") {
            if !mode.is_empty() {
                return Err(usage(format!(":copy and :{mode} conflict in {arg:?}")));
            }
            mode = "copy".to_string();
            token = rest;
        } else if let Some(rest) = token.strip_suffix(":rw") {
            if !mode.is_empty() {
                return Err(usage(format!(":rw and :{mode} conflict in {arg:?}")));
            }
            mode = "rw".to_string();
            token = rest;
        } else {
            break;
        }
    }

    if token.is_empty() {
        return Err(usage(format!("empty path in directory argument {arg:?}")));
    }
    if mode.is_empty() {
        mode = default_mode.to_string();
    }

    let path = absolutize(&expand_path(token, arg)?);
    let mount_path = match mount_raw {
        Some(m) => Some(expand_path(m, arg)?),
        None => None,
    };

    Ok(DirArg {
        path,
        mount_path,
        mode,
        force,
    })
}

/// `~` expansion followed by `${VAR}` expansion.
fn expand_path(token: &str, arg: &str) -> Result<String> {
    let tilde_expanded = if token == "~" || token.starts_with("~/") {
        let home = home::home_dir()
            .ok_or_else(|| usage("Could not determine home directory for ~ expansion"))?;
        if token == "~" {
            home.to_string_lossy().into_owned()
        } else {
            home.join(&token[2..]).to_string_lossy().into_owned()
        }
    } else {
        token.to_string()
    };
    expand::expand(&tilde_expanded, arg)
}

fn absolutize(path: &str) -> PathBuf {
    let p = Path::new(path);
    if p.is_absolute() {
        p.to_path_buf()
    } else {
        std::env::current_dir()
            .map(|cwd| cwd.join(p))
            .unwrap_or_else(|_| p.to_path_buf())
    }
}
