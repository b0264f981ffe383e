//! Shared fixtures: a recording mock runtime and a temp-root manager.
#![allow(dead_code)] // each test binary uses a different subset

use std::collections::{HashMap, HashSet};
use std::path::Path;
use std::sync::{Arc, Mutex};

use anyhow::Result;

use taskbox::cancel::CancelToken;
use taskbox::manager::SandboxManager;
use taskbox::paths::Paths;
use taskbox::runtime::{
    ExecResult, InstanceConfig, InstanceInfo, NotFound, Runtime,
};

#[derive(Default)]
pub struct MockState {
    /// instance name -> running
    pub instances: HashMap<String, bool>,
    pub images: HashSet<String>,
    /// Every runtime call, as "op name".
    pub calls: Vec<String>,
    /// Response for exec calls; None answers exit 0 with empty output.
    pub exec_output: Option<ExecResult>,
    /// When set, instances die immediately after start.
    pub die_on_start: bool,
    /// Mount specs from the last create call.
    pub last_create: Option<InstanceConfig>,
}

#[derive(Clone, Default)]
pub struct MockRuntime {
    pub state: Arc<Mutex<MockState>>,
}

impl MockRuntime {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_instance(self, name: &str, running: bool) -> Self {
        self.state
            .lock()
            .unwrap()
            .instances
            .insert(name.to_string(), running);
        self
    }

    pub fn set_exec_output(&self, stdout: &str) {
        self.state.lock().unwrap().exec_output = Some(ExecResult {
            stdout: stdout.to_string(),
            stderr: String::new(),
            exit_code: 0,
        });
    }

    pub fn calls(&self) -> Vec<String> {
        self.state.lock().unwrap().calls.clone()
    }

    fn record(&self, op: &str, name: &str) {
        self.state
            .lock()
            .unwrap()
            .calls
            .push(format!("{op} {name}"));
    }
}

impl Runtime for MockRuntime {
    fn ensure_image(
        &self,
        _cancel: &CancelToken,
        _source_dir: &Path,
        tag: &str,
        _force: bool,
    ) -> Result<()> {
        self.record("ensure_image", tag);
        self.state.lock().unwrap().images.insert(tag.to_string());
        Ok(())
    }

    fn image_exists(&self, _cancel: &CancelToken, tag: &str) -> Result<bool> {
        Ok(self.state.lock().unwrap().images.contains(tag))
    }

    fn create(&self, _cancel: &CancelToken, config: &InstanceConfig) -> Result<()> {
        self.record("create", &config.name);
        let mut state = self.state.lock().unwrap();
        state.last_create = Some(config.clone());
        state.instances.insert(config.name.clone(), false);
        Ok(())
    }

    fn start(&self, _cancel: &CancelToken, name: &str) -> Result<()> {
        self.record("start", name);
        let mut state = self.state.lock().unwrap();
        let running = !state.die_on_start;
        state.instances.insert(name.to_string(), running);
        Ok(())
    }

    fn stop(&self, _cancel: &CancelToken, name: &str) -> Result<()> {
        self.record("stop", name);
        if let Some(running) = self.state.lock().unwrap().instances.get_mut(name) {
            *running = false;
        }
        Ok(())
    }

    fn remove(&self, _cancel: &CancelToken, name: &str) -> Result<()> {
        self.record("remove", name);
        self.state.lock().unwrap().instances.remove(name);
        Ok(())
    }

    fn inspect(&self, _cancel: &CancelToken, name: &str) -> Result<InstanceInfo> {
        let state = self.state.lock().unwrap();
        match state.instances.get(name) {
            None => Err(NotFound(name.to_string()).into()),
            Some(&running) => Ok(InstanceInfo {
                id: format!("mock-{name}"),
                running,
                exit_code: (!running).then_some(1),
            }),
        }
    }

    fn exec(
        &self,
        _cancel: &CancelToken,
        name: &str,
        cmd: &[&str],
        _user: &str,
    ) -> Result<ExecResult> {
        self.record("exec", &format!("{name}: {}", cmd.join(" ")));
        Ok(self
            .state
            .lock()
            .unwrap()
            .exec_output
            .clone()
            .unwrap_or_default())
    }

    fn interactive_exec(
        &self,
        _cancel: &CancelToken,
        name: &str,
        _cmd: &[&str],
        _user: &str,
    ) -> Result<()> {
        self.record("interactive_exec", name);
        Ok(())
    }

    fn diag_hint(&self, name: &str) -> String {
        format!("mock hint for {name}")
    }
}

pub struct Fixture {
    pub root: tempfile::TempDir,
    pub paths: Paths,
    pub runtime: MockRuntime,
}

impl Fixture {
    pub fn new() -> Self {
        let root = tempfile::tempdir().unwrap();
        let paths = Paths::at(root.path());
        Self {
            root,
            paths,
            runtime: MockRuntime::new(),
        }
    }

    /// A manager wired to the mock runtime, answering `answer` to every
    /// confirmation prompt.
    pub fn manager_with_input(&self, answer: &str) -> SandboxManager {
        SandboxManager::new(
            self.paths.clone(),
            Box::new(self.runtime.clone()),
            CancelToken::new(),
        )
        .with_input(Box::new(std::io::Cursor::new(answer.as_bytes().to_vec())))
    }

    pub fn manager(&self) -> SandboxManager {
        self.manager_with_input("")
    }
}

/// A sample project directory with content and no git history.
pub fn sample_project() -> tempfile::TempDir {
    let dir = tempfile::tempdir().unwrap();
    std::fs::write(dir.path().join("file.txt"), "hello").unwrap();
    std::fs::create_dir(dir.path().join("src")).unwrap();
    std::fs::write(dir.path().join("src/main.rs"), "fn main() {}\n").unwrap();
    dir
}

/// Baseline create options for the credential-free test agent.
pub fn test_options(name: &str, workdir: &Path) -> taskbox::manager::CreateOptions {
    taskbox::manager::CreateOptions {
        name: name.to_string(),
        agent: "test".to_string(),
        workdir_arg: workdir.to_string_lossy().into_owned(),
        no_start: true,
        yes: true,
        ..Default::default()
    }
}
