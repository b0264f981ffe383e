//! Runtime abstraction layer for instance backends.
//!
//! The lifecycle core drives instances (containers or VMs) through this
//! trait. Docker ships in-tree; the `tart` and `seatbelt` drivers are
//! external collaborators and selecting them without a driver present is
//! a usage error.

pub mod docker;

use std::path::{Path, PathBuf};

use anyhow::Result;

use crate::cancel::CancelToken;
use crate::errors::usage;

/// Runtime-level "no such instance".
#[derive(Debug, thiserror::Error)]
#[error("no such instance: {0}")]
pub struct NotFound(pub String);

/// One bind mount handed to the runtime.
#[derive(Debug, Clone, PartialEq)]
pub struct MountSpec {
    pub source: PathBuf,
    pub target: String,
    pub read_only: bool,
}

/// One published port.
#[derive(Debug, Clone, PartialEq)]
pub struct PortSpec {
    pub host: u16,
    pub instance: u16,
    pub protocol: String,
}

/// Parsed resource limits.
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct ResourceLimits {
    /// CPU quota in billionths of a core.
    pub nano_cpus: Option<i64>,
    pub memory_bytes: Option<i64>,
}

#[derive(Debug, Clone, Default)]
pub struct InstanceConfig {
    pub name: String,
    pub image: String,
    pub working_dir: String,
    pub mounts: Vec<MountSpec>,
    pub ports: Vec<PortSpec>,
    /// "" for the backend default network, or "none".
    pub network_mode: String,
    pub use_init: bool,
    pub resources: Option<ResourceLimits>,
    pub capabilities: Vec<String>,
}

#[derive(Debug, Clone, Default)]
pub struct InstanceInfo {
    pub id: String,
    pub running: bool,
    pub exit_code: Option<i32>,
}

#[derive(Debug, Clone, Default)]
pub struct ExecResult {
    pub stdout: String,
    pub stderr: String,
    pub exit_code: i32,
}

/// Capability interface for backends that can build per-profile images.
/// Backends without it silently skip profile-image builds.
pub trait ProfileImageBuilder {
    fn build_profile_image(
        &self,
        cancel: &CancelToken,
        profile_dir: &Path,
        tag: &str,
        force: bool,
    ) -> Result<()>;
}

pub trait Runtime {
    /// Build (or reuse) the image for `tag` from a directory containing a
    /// Dockerfile. `force` rebuilds even when the tag exists.
    fn ensure_image(
        &self,
        cancel: &CancelToken,
        source_dir: &Path,
        tag: &str,
        force: bool,
    ) -> Result<()>;

    fn image_exists(&self, cancel: &CancelToken, tag: &str) -> Result<bool>;

    fn create(&self, cancel: &CancelToken, config: &InstanceConfig) -> Result<()>;

    fn start(&self, cancel: &CancelToken, name: &str) -> Result<()>;

    /// Idempotent: Ok on already-stopped or not-found.
    fn stop(&self, cancel: &CancelToken, name: &str) -> Result<()>;

    /// Idempotent: Ok on not-found.
    fn remove(&self, cancel: &CancelToken, name: &str) -> Result<()>;

    /// Errors with [`NotFound`] (downcastable) when the instance does not
    /// exist.
    fn inspect(&self, cancel: &CancelToken, name: &str) -> Result<InstanceInfo>;

    /// Run a command inside the instance, capturing output. A non-zero
    /// command exit is reported through the result, not as an error.
    fn exec(
        &self,
        cancel: &CancelToken,
        name: &str,
        cmd: &[&str],
        user: &str,
    ) -> Result<ExecResult>;

    fn interactive_exec(
        &self,
        cancel: &CancelToken,
        name: &str,
        cmd: &[&str],
        user: &str,
    ) -> Result<()>;

    /// A human hint for diagnosing an instance that exited immediately.
    fn diag_hint(&self, name: &str) -> String;

    /// Capability probe; backends that can build profile images return
    /// themselves here.
    fn as_image_builder(&self) -> Option<&dyn ProfileImageBuilder> {
        None
    }

    fn close(&self) -> Result<()> {
        Ok(())
    }
}

/// Instantiate the runtime for a configured backend name.
pub fn for_backend(backend: &str) -> Result<Box<dyn Runtime>> {
    match backend {
        "docker" => Ok(Box::new(docker::DockerRuntime::new()?)),
        "tart" | "seatbelt" => Err(usage(format!(
            "backend {backend:?} requires its driver, which is not bundled with this build"
        ))),
        other => Err(usage(format!(
            "unknown backend {other:?} (expected docker, tart, or seatbelt)"
        ))),
    }
}

/// True when an error chain bottoms out in [`NotFound`].
pub fn is_not_found(err: &anyhow::Error) -> bool {
    err.downcast_ref::<NotFound>().is_some()
}
