//! The sandbox lifecycle orchestrator.
//!
//! One manager instance serves one CLI invocation: it owns the sandbox
//! directory tree and the runtime instance for whichever sandbox a
//! command touches, and serializes the pipeline stages itself. There is
//! no in-process locking; concurrent invocations against the same name
//! race and recover through `create --replace` or `destroy`.

pub mod create;
pub mod inspect;
pub mod launch;
pub mod lifecycle;
pub mod meta;
pub mod reset;
pub mod types;

use std::io::BufRead;
use std::sync::OnceLock;

use anyhow::Result;
use regex::Regex;

use crate::cancel::CancelToken;
use crate::errors::usage;
use crate::paths::{Paths, SandboxPaths};
use crate::runtime::Runtime;

pub use types::{CreateOptions, CreateOutcome, ListEntry, NetworkRequest, Status};

/// Sandbox names that collide with tool-internal vocabulary.
const RESERVED_NAMES: &[&str] = &["base", "all", ".", ".."];

pub struct SandboxManager {
    paths: Paths,
    runtime: Box<dyn Runtime>,
    cancel: CancelToken,
    input: Box<dyn BufRead>,
}

impl SandboxManager {
    pub fn new(paths: Paths, runtime: Box<dyn Runtime>, cancel: CancelToken) -> Self {
        Self {
            paths,
            runtime,
            cancel,
            input: Box::new(std::io::BufReader::new(std::io::stdin())),
        }
    }

    /// Replace the confirmation input; tests feed canned answers here.
    pub fn with_input(mut self, input: Box<dyn BufRead>) -> Self {
        self.input = input;
        self
    }

    pub fn paths(&self) -> &Paths {
        &self.paths
    }

    pub(crate) fn sandbox(&self, name: &str) -> SandboxPaths {
        SandboxPaths::new(&self.paths, name)
    }

    pub(crate) fn runtime(&self) -> &dyn Runtime {
        self.runtime.as_ref()
    }

    pub(crate) fn cancel(&self) -> &CancelToken {
        &self.cancel
    }
}

/// Validate a sandbox name: `^[A-Za-z0-9][A-Za-z0-9_.-]{0,55}$` and not a
/// reserved token.
pub fn validate_name(name: &str) -> Result<()> {
    static NAME_RE: OnceLock<Regex> = OnceLock::new();
    let re = NAME_RE
        .get_or_init(|| Regex::new(r"^[A-Za-z0-9][A-Za-z0-9_.-]{0,55}$").expect("name regex"));

    if !re.is_match(name) {
        return Err(usage(format!(
            "invalid sandbox name {name:?}: use letters, digits, '_', '.', '-'; max 56 characters; must start with a letter or digit"
        )));
    }
    if RESERVED_NAMES.contains(&name) {
        return Err(usage(format!("sandbox name {name:?} is reserved")));
    }
    Ok(())
}
