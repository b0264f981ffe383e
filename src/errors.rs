//! Error taxonomy shared across the lifecycle core.
//!
//! Sentinels are matched by downcast through `anyhow::Error`; the two
//! wrapper kinds carry the process exit code the CLI maps them to.

use std::fmt;

/// Typed sentinel errors the CLI and tests distinguish by identity.
#[derive(Debug, thiserror::Error, PartialEq, Eq)]
pub enum Sentinel {
    #[error("sandbox not found")]
    SandboxNotFound,
    #[error("sandbox already exists")]
    SandboxExists,
    #[error("no usable agent credentials")]
    MissingApiKey,
    #[error("container is not running")]
    ContainerNotRunning,
    /// User declined an interactive confirmation; not a failure.
    #[error("cancelled")]
    Cancelled,
}

/// Bad CLI arguments or missing required inputs. Exit code 2.
#[derive(Debug, thiserror::Error)]
#[error("{0}")]
pub struct UsageError(pub String);

/// Malformed config or profile file. Exit code 3.
#[derive(Debug)]
pub struct ConfigError {
    /// Dotted path of the offending key, when known.
    pub path: String,
    pub message: String,
}

impl fmt::Display for ConfigError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.path.is_empty() {
            write!(f, "{}", self.message)
        } else {
            write!(f, "{}: {}", self.path, self.message)
        }
    }
}

impl std::error::Error for ConfigError {}

impl ConfigError {
    pub fn new(path: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            path: path.into(),
            message: message.into(),
        }
    }
}

/// Shorthand for a `UsageError` wrapped in `anyhow::Error`.
pub fn usage(msg: impl Into<String>) -> anyhow::Error {
    UsageError(msg.into()).into()
}

/// Map an error chain to the process exit code.
pub fn exit_code(err: &anyhow::Error) -> i32 {
    if err.downcast_ref::<UsageError>().is_some() {
        return 2;
    }
    if err.downcast_ref::<ConfigError>().is_some() {
        return 3;
    }
    1
}

/// True when the chain bottoms out in the given sentinel.
pub fn is_sentinel(err: &anyhow::Error, which: Sentinel) -> bool {
    err.downcast_ref::<Sentinel>() == Some(&which)
}
