use std::path::Path;
use std::process::{Command, Output, Stdio};

use anyhow::{Context, Result, anyhow};
use tracing::{debug, trace};

/// A builder for executing external commands with unified error handling.
pub struct Cmd<'a> {
    command: &'a str,
    args: Vec<String>,
    workdir: Option<&'a Path>,
    envs: Vec<(String, String)>,
    quiet: bool,
}

impl<'a> Cmd<'a> {
    pub fn new(command: &'a str) -> Self {
        Self {
            command,
            args: Vec::new(),
            workdir: None,
            envs: Vec::new(),
            quiet: false,
        }
    }

    pub fn arg(mut self, arg: impl Into<String>) -> Self {
        self.args.push(arg.into());
        self
    }

    pub fn args<I, S>(mut self, args: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.args.extend(args.into_iter().map(Into::into));
        self
    }

    /// Set the working directory for the command.
    pub fn workdir(mut self, path: &'a Path) -> Self {
        self.workdir = Some(path);
        self
    }

    pub fn env(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.envs.push((key.into(), value.into()));
        self
    }

    /// Suppress the failure log line; callers expecting failure use this.
    pub fn quiet(mut self) -> Self {
        self.quiet = true;
        self
    }

    fn build(&self) -> Command {
        let mut cmd = Command::new(self.command);
        if let Some(dir) = self.workdir {
            cmd.current_dir(dir);
        }
        for (k, v) in &self.envs {
            cmd.env(k, v);
        }
        cmd.args(&self.args);
        cmd
    }

    /// Execute and return the output, erroring on a non-zero exit code.
    pub fn run(self) -> Result<Output> {
        trace!(command = self.command, args = ?self.args, workdir = ?self.workdir, "cmd:run start");

        let output = self.build().output().with_context(|| {
            format!(
                "Failed to execute command: {} {}",
                self.command,
                self.args.join(" ")
            )
        })?;

        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr);
            if !self.quiet {
                debug!(
                    command = self.command,
                    args = ?self.args,
                    status = ?output.status.code(),
                    stderr = %stderr.trim(),
                    "cmd:run failure"
                );
            }
            return Err(anyhow!(
                "Command failed: {} {}\n{}",
                self.command,
                self.args.join(" "),
                stderr.trim()
            ));
        }
        trace!(command = self.command, "cmd:run success");
        Ok(output)
    }

    /// Execute and return stdout as a trimmed string.
    pub fn run_and_capture_stdout(self) -> Result<String> {
        let output = self.run()?;
        Ok(String::from_utf8(output.stdout)?.trim().to_string())
    }

    /// Execute, returning Ok(true) on success and Ok(false) on a non-zero
    /// exit. Used for commands that act as checks.
    pub fn run_as_check(self) -> Result<bool> {
        trace!(command = self.command, args = ?self.args, "cmd:check start");
        let output = self.build().output().with_context(|| {
            format!(
                "Failed to execute command: {} {}",
                self.command,
                self.args.join(" ")
            )
        })?;
        let success = output.status.success();
        trace!(command = self.command, success, "cmd:check result");
        Ok(success)
    }

    /// Execute with inherited stdio, for interactive subprocesses.
    pub fn run_interactive(self) -> Result<()> {
        let status = self
            .build()
            .stdin(Stdio::inherit())
            .stdout(Stdio::inherit())
            .stderr(Stdio::inherit())
            .status()
            .with_context(|| format!("Failed to execute command: {}", self.command))?;

        if !status.success() {
            return Err(anyhow!(
                "Command failed with exit code {}: {}",
                status.code().unwrap_or(-1),
                self.command
            ));
        }
        Ok(())
    }
}

/// A git invocation scoped to `dir` with repository hooks disabled.
///
/// Every internal git call goes through here so that user hooks never run
/// against sandbox work copies.
pub fn git(dir: &Path) -> Cmd<'_> {
    Cmd::new("git")
        .arg("-C")
        .arg(dir.to_string_lossy().into_owned())
        .args(["-c", "core.hooksPath=/dev/null"])
}
