//! The create pipeline: from validated options to a persisted sandbox
//! and (unless `--no-start`) a running instance.

use std::collections::BTreeSet;
use std::fs;
use std::io::Read;
use std::path::PathBuf;

use anyhow::{Context, Result};
use tracing::{info, warn};

use crate::agents::{self, AgentDefinition, PromptMode};
use crate::auth;
use crate::config::ConfigStore;
use crate::confirm;
use crate::context;
use crate::dirarg::{self, DirArg};
use crate::errors::{Sentinel, usage};
use crate::manager::meta::{DirSpec, SandboxMeta};
use crate::manager::types::{ContainerConfig, CreateOptions, CreateOutcome, NetworkRequest};
use crate::manager::{SandboxManager, validate_name};
use crate::profile::{MergedConfig, ProfileResolver};
use crate::safety;
use crate::seed;
use crate::workspace;

const BACKENDS: &[&str] = &["docker", "tart", "seatbelt"];

/// Removes a partially created sandbox tree unless disarmed.
struct CleanupGuard {
    path: PathBuf,
    armed: bool,
}

impl CleanupGuard {
    fn new(path: PathBuf) -> Self {
        Self { path, armed: true }
    }

    fn disarm(&mut self) {
        self.armed = false;
    }
}

impl Drop for CleanupGuard {
    fn drop(&mut self) {
        if self.armed {
            warn!(path = %self.path.display(), "create:cleaning up partial sandbox");
            let _ = fs::remove_dir_all(&self.path);
        }
    }
}

impl SandboxManager {
    pub fn create(&mut self, opts: CreateOptions) -> Result<CreateOutcome> {
        let cancel = self.cancel().clone();
        cancel.check()?;

        validate_name(&opts.name)?;
        if !opts.agent.is_empty() && agents::find(&opts.agent).is_none() {
            return Err(unknown_agent(&opts.agent));
        }

        // An existing directory is either a live sandbox (refuse) or a
        // broken stub (auto-clean).
        let sandbox = self.sandbox(&opts.name);
        if sandbox.dir().exists() && !opts.replace {
            if SandboxMeta::load(&sandbox.meta_file()).is_ok() {
                return Err(anyhow::Error::from(Sentinel::SandboxExists).context(format!(
                    "sandbox {:?} already exists; use --replace to recreate it",
                    opts.name
                )));
            }
            warn!(name = %opts.name, "create:removing broken sandbox stub");
            fs::remove_dir_all(sandbox.dir())
                .with_context(|| format!("failed to clean broken sandbox {:?}", opts.name))?;
        }

        if !opts.prompt.is_empty() && !opts.prompt_file.is_empty() {
            return Err(usage("--prompt and --prompt-file are mutually exclusive"));
        }

        // Configuration: base config, then profile chain, then CLI.
        let paths = self.paths().clone();
        let store = ConfigStore::new(paths.base_config_file());
        let base = store.load()?;
        let resolver = ProfileResolver::new(&paths);
        let (merged, chain) = if opts.profile.is_empty() {
            (MergedConfig::from_base(&base), vec!["base".to_string()])
        } else {
            let chain = resolver.resolve_chain(&opts.profile)?;
            (resolver.merge(&base, &chain)?, chain)
        };

        let agent_name = pick(&opts.agent, &merged.agent);
        let backend = pick(&opts.backend, &merged.backend);
        if !BACKENDS.contains(&backend.as_str()) {
            return Err(usage(format!(
                "invalid backend {backend:?} (expected docker, tart, or seatbelt)"
            )));
        }
        let agent = agents::find(&agent_name).ok_or_else(|| unknown_agent(&agent_name))?;

        let mut resources = merged.resources.clone().unwrap_or_default();
        if !opts.cpus.is_empty() {
            resources.cpus = opts.cpus.clone();
        }
        if !opts.memory.is_empty() {
            resources.memory = opts.memory.clone();
        }
        let resources = (!resources.is_empty()).then_some(resources);

        cancel.check()?;
        let auth_status = auth::require_credentials(agent, &merged.env)?;
        auth::check_localhost_hints(agent, &merged.env, &backend)?;

        // Directory arguments: profile workdir fills a missing CLI
        // workdir, profile directories come first.
        let workdir_arg = if !opts.workdir_arg.is_empty() {
            opts.workdir_arg.clone()
        } else if let Some(profile_workdir) = merged.workdir.clone() {
            profile_workdir
        } else {
            ".".to_string()
        };
        let workdir = parse_workdir(&workdir_arg)?;
        let mut aux: Vec<DirArg> = Vec::new();
        for arg in merged.directories.iter().chain(opts.dir_args.iter()) {
            let mut parsed = dirarg::parse(arg, "")?;
            if parsed.mode.is_empty() {
                parsed.mode = "ro".to_string();
            }
            aux.push(parsed);
        }

        for dir in std::iter::once(&workdir).chain(aux.iter()) {
            if !dir.path.exists() {
                return Err(usage(format!(
                    "directory does not exist: {}",
                    dir.path.display()
                )));
            }
            if safety::is_dangerous(&dir.path) {
                if dir.force {
                    confirm::warn_user(&format!(
                        "mounting protected directory {} (forced)",
                        dir.path.display()
                    ));
                } else {
                    return Err(usage(format!(
                        "refusing to mount protected directory {}; append :force to override",
                        dir.path.display()
                    )));
                }
            }
        }

        let host_paths: Vec<PathBuf> = std::iter::once(&workdir)
            .chain(aux.iter())
            .map(|d| d.path.clone())
            .collect();
        safety::check_overlap(&host_paths)?;

        let mut mount_targets = BTreeSet::new();
        for dir in std::iter::once(&workdir).chain(aux.iter()) {
            let target = mount_target(dir);
            if !mount_targets.insert(target.clone()) {
                return Err(usage(format!("duplicate container mount path {target:?}")));
            }
        }

        if opts.replace {
            self.destroy(&opts.name)?;
        }

        // Dirty-repo confirmation: the workdir plus every copy/rw
        // auxiliary participates.
        cancel.check()?;
        let mut dirty = Vec::new();
        for dir in std::iter::once(&workdir)
            .chain(aux.iter().filter(|d| d.mode == "copy" || d.mode == "rw"))
        {
            if let Some(report) = safety::check_dirty_repo(&dir.path)? {
                dirty.push(format!("{} ({report})", dir.path.display()));
            }
        }
        if !dirty.is_empty() && !opts.yes {
            cancel.check()?;
            let question = format!(
                "Uncommitted changes in {}. Continue?",
                dirty.join(", ")
            );
            if !confirm::confirm(&question, self.input.as_mut())? {
                info!(name = %opts.name, "create:cancelled at dirty-repo prompt");
                return Ok(CreateOutcome::Cancelled);
            }
        }

        // From here on, a failure removes the partial tree.
        fs::create_dir_all(sandbox.work_dir())?;
        fs::create_dir_all(sandbox.agent_state_dir())?;
        fs::create_dir_all(sandbox.home_seed_dir())?;
        let mut guard = CleanupGuard::new(sandbox.dir().to_path_buf());

        seed::materialize(agent, &sandbox, &auth_status)?;
        seed::ensure_container_settings(agent, &sandbox)?;
        if backend != "seatbelt" {
            seed::ensure_home_seed_config(agent, &sandbox)?;
        }

        cancel.check()?;
        let workdir_spec = self.prepare_dir(&sandbox, &workdir, &cancel)?;
        let mut dir_specs = Vec::new();
        for dir in &aux {
            dir_specs.push(self.prepare_dir(&sandbox, dir, &cancel)?);
        }

        let prompt = read_prompt(&opts)?;
        let model = resolve_model(agent, &pick(&opts.model, &merged.model), &merged.env);
        let agent_command = build_agent_command(agent, &model, &prompt, &opts.passthrough_args);

        let (network_mode, network_allow) = resolve_network(&opts, &merged, agent);
        let mut ports = merged.ports.clone();
        ports.extend(opts.ports.iter().cloned());

        let image_ref = if opts.profile.is_empty() {
            String::new()
        } else {
            resolver.resolve_image(&chain)
        };

        let meta = SandboxMeta {
            version: env!("CARGO_PKG_VERSION").to_string(),
            name: opts.name.clone(),
            created_at: chrono::Utc::now().to_rfc3339(),
            backend: backend.clone(),
            profile: opts.profile.clone(),
            image_ref,
            agent: agent.name.to_string(),
            model: model.clone(),
            workdir: workdir_spec,
            directories: dir_specs,
            has_prompt: !prompt.is_empty(),
            network_mode: network_mode.clone(),
            network_allow: network_allow.clone(),
            ports,
            resources,
        };

        let container_config = ContainerConfig {
            host_uid: unsafe { libc::getuid() },
            host_gid: unsafe { libc::getgid() },
            agent_command,
            startup_delay: agent.startup_delay.as_millis() as u64,
            ready_pattern: agent.ready_pattern.to_string(),
            submit_sequence: agent.submit_sequence.to_string(),
            tmux_conf: merged.tmux_conf.clone(),
            working_dir: meta.workdir.mount_path.clone(),
            state_dir_name: agent.state_dir.to_string(),
            debug: false,
            network_isolated: network_mode == "isolated",
            allowed_domains: network_allow,
        };

        meta.save(&sandbox.meta_file())?;
        if !prompt.is_empty() {
            fs::write(sandbox.prompt_file(), &prompt)?;
        }
        fs::write(sandbox.log_file(), "")?;
        fs::write(
            sandbox.config_file(),
            serde_json::to_string_pretty(&container_config)? + "\n",
        )?;
        context::write(&meta, &sandbox, agent)?;

        guard.disarm();
        info!(name = %opts.name, agent = agent.name, backend = %backend, "create:sandbox persisted");

        if opts.no_start {
            return Ok(CreateOutcome::Created(meta));
        }

        if let Err(err) = self.launch_container(&meta, agent) {
            // A failed launch leaves neither the tree nor a partial
            // instance behind.
            let _ = fs::remove_dir_all(sandbox.dir());
            let _ = self
                .runtime()
                .remove(&cancel, &crate::paths::instance_name(&opts.name));
            return Err(err);
        }

        Ok(CreateOutcome::Created(meta))
    }

    /// Copy-mode mounts get a work copy and a fresh baseline; rw/ro
    /// mounts record the host HEAD best-effort.
    fn prepare_dir(
        &self,
        sandbox: &crate::paths::SandboxPaths,
        dir: &DirArg,
        cancel: &crate::cancel::CancelToken,
    ) -> Result<DirSpec> {
        let baseline_sha = if dir.mode == "copy" {
            workspace::copy_with_baseline(&dir.path, &sandbox.work_copy(&dir.path), cancel)?
        } else {
            workspace::host_head(&dir.path)
        };
        Ok(DirSpec {
            host_path: dir.path.clone(),
            mount_path: mount_target(dir),
            mode: dir.mode.clone(),
            baseline_sha,
        })
    }
}

fn pick(cli: &str, merged: &str) -> String {
    if cli.is_empty() {
        merged.to_string()
    } else {
        cli.to_string()
    }
}

fn unknown_agent(name: &str) -> anyhow::Error {
    usage(format!(
        "unknown agent {name:?} (available: {})",
        agents::visible_names().join(", ")
    ))
}

fn parse_workdir(arg: &str) -> Result<DirArg> {
    let parsed = dirarg::parse(arg, "copy")?;
    Ok(parsed)
}

fn mount_target(dir: &DirArg) -> String {
    dir.mount_path
        .clone()
        .unwrap_or_else(|| dir.path.to_string_lossy().into_owned())
}

fn read_prompt(opts: &CreateOptions) -> Result<String> {
    if !opts.prompt.is_empty() {
        return Ok(opts.prompt.clone());
    }
    if opts.prompt_file == "-" {
        let mut buffer = String::new();
        std::io::stdin()
            .read_to_string(&mut buffer)
            .context("failed to read prompt from stdin")?;
        return Ok(buffer);
    }
    if !opts.prompt_file.is_empty() {
        return fs::read_to_string(&opts.prompt_file)
            .with_context(|| format!("failed to read prompt file {:?}", opts.prompt_file));
    }
    Ok(String::new())
}

/// Resolve the model alias, then apply a provider prefix when its hint
/// variable is set in the host env or the merged config env.
fn resolve_model(
    agent: &AgentDefinition,
    model: &str,
    config_env: &std::collections::BTreeMap<String, String>,
) -> String {
    let mut resolved = agent.resolve_model_alias(model);
    if resolved.is_empty() {
        return resolved;
    }
    for (var, prefix) in agent.model_prefixes {
        let set = std::env::var(var).is_ok_and(|v| !v.is_empty())
            || config_env.get(*var).is_some_and(|v| !v.is_empty());
        if set && !resolved.starts_with(prefix) {
            resolved = format!("{prefix}{resolved}");
        }
    }
    resolved
}

/// Escape a prompt for embedding in a double-quoted shell string.
fn shell_escape_prompt(prompt: &str) -> String {
    let mut out = String::with_capacity(prompt.len());
    for c in prompt.chars() {
        if matches!(c, '\\' | '"' | '`' | '$') {
            out.push('\\');
        }
        out.push(c);
    }
    out
}

/// Build the in-instance agent command from the catalog templates.
fn build_agent_command(
    agent: &AgentDefinition,
    model: &str,
    prompt: &str,
    passthrough: &[String],
) -> String {
    let mut command = if !prompt.is_empty() && agent.prompt_mode == PromptMode::Headless {
        agent
            .headless_cmd
            .replace("PROMPT", &shell_escape_prompt(prompt))
    } else {
        let mut cmd = agent.interactive_cmd.to_string();
        if !model.is_empty() && !agent.model_flag.is_empty() {
            cmd.push_str(&format!(" {} {}", agent.model_flag, model));
        }
        cmd
    };

    for arg in passthrough {
        command.push(' ');
        command.push_str(arg);
    }
    command
}

/// Decide the network mode and, for isolated mode, the allowlist: the
/// agent's baseline domains plus config and CLI additions.
fn resolve_network(
    opts: &CreateOptions,
    merged: &MergedConfig,
    agent: &AgentDefinition,
) -> (String, Vec<String>) {
    let mode = match opts.network {
        NetworkRequest::Isolated => "isolated".to_string(),
        NetworkRequest::None => "none".to_string(),
        NetworkRequest::Unset => merged
            .network
            .as_ref()
            .map(|n| n.mode.clone())
            .unwrap_or_default(),
    };

    if mode != "isolated" {
        return (mode, Vec::new());
    }

    let mut allow: Vec<String> = Vec::new();
    let mut seen = BTreeSet::new();
    let config_allow = merged
        .network
        .as_ref()
        .map(|n| n.allow.clone())
        .unwrap_or_default();
    for domain in agent
        .network_allowlist
        .iter()
        .map(|d| d.to_string())
        .chain(config_allow)
        .chain(opts.network_allow.iter().cloned())
    {
        if seen.insert(domain.clone()) {
            allow.push(domain);
        }
    }
    (mode, allow)
}
