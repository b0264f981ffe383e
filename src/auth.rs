//! Credential discovery and secrets materialization.
//!
//! Before a sandbox is created, the agent must have at least one usable
//! credential source: an API key in the environment, an auth file on disk
//! (or in the keychain), or an auth-hint variable pointing at a
//! self-hosted endpoint. Secrets are handed to the instance as one
//! mode-0600 file per key under a private temp dir the entrypoint reads
//! during startup.

use std::collections::BTreeMap;
use std::fs;
use std::os::unix::fs::PermissionsExt;
use std::path::PathBuf;
use std::sync::RwLock;

use anyhow::{Context, Result};
use tempfile::TempDir;
use tracing::{debug, warn};

use crate::agents::AgentDefinition;
use crate::cmd::Cmd;
use crate::errors::{Sentinel, usage};
use crate::safety;

pub type KeychainReader = fn(&str) -> Option<String>;

/// Module-level hook for keychain access; tests replace it.
static KEYCHAIN_READER: RwLock<KeychainReader> = RwLock::new(default_keychain_read);

pub fn set_keychain_reader(reader: KeychainReader) {
    *KEYCHAIN_READER.write().expect("keychain reader lock") = reader;
}

pub fn read_keychain(service: &str) -> Option<String> {
    let reader = *KEYCHAIN_READER.read().expect("keychain reader lock");
    reader(service)
}

fn default_keychain_read(service: &str) -> Option<String> {
    if service.is_empty() || !cfg!(target_os = "macos") {
        return None;
    }
    Cmd::new("security")
        .args(["find-generic-password", "-s", service, "-w"])
        .quiet()
        .run_and_capture_stdout()
        .ok()
        .filter(|v| !v.is_empty())
}

#[derive(Debug, Clone, Copy, Default)]
pub struct AuthStatus {
    pub has_api_key: bool,
    pub has_auth_file: bool,
    pub has_auth_hint: bool,
}

impl AuthStatus {
    pub fn any(&self) -> bool {
        self.has_api_key || self.has_auth_file || self.has_auth_hint
    }
}

/// Probe the three credential sources for an agent.
pub fn discover(agent: &AgentDefinition, config_env: &BTreeMap<String, String>) -> AuthStatus {
    discover_with(agent, config_env, |name| std::env::var(name).ok())
}

fn discover_with<F>(
    agent: &AgentDefinition,
    config_env: &BTreeMap<String, String>,
    env: F,
) -> AuthStatus
where
    F: Fn(&str) -> Option<String>,
{
    let has_api_key = agent
        .api_key_env_vars
        .iter()
        .any(|var| env(var).is_some_and(|v| !v.is_empty()));

    let home = home::home_dir().unwrap_or_default();
    let has_auth_file = agent.seed_files.iter().filter(|s| s.auth_only).any(|s| {
        home.join(s.host_path).exists()
            || (!s.keychain_service.is_empty() && read_keychain(s.keychain_service).is_some())
    });

    let has_auth_hint = agent.auth_hint_env_vars.iter().any(|var| {
        env(var).is_some_and(|v| !v.is_empty())
            || config_env.get(*var).is_some_and(|v| !v.is_empty())
    });

    AuthStatus {
        has_api_key,
        has_auth_file,
        has_auth_hint,
    }
}

/// Fail with `MissingApiKey` unless the agent has at least one credential
/// source. Agents that declare no sources at all (shell, test) pass.
pub fn require_credentials(
    agent: &AgentDefinition,
    config_env: &BTreeMap<String, String>,
) -> Result<AuthStatus> {
    let status = discover(agent, config_env);

    let declares_sources = !agent.api_key_env_vars.is_empty()
        || agent.seed_files.iter().any(|s| s.auth_only)
        || !agent.auth_hint_env_vars.is_empty();
    if !declares_sources || status.any() {
        debug!(agent = agent.name, ?status, "auth:discovered");
        return Ok(status);
    }

    let mut missing = Vec::new();
    if !agent.api_key_env_vars.is_empty() {
        missing.push(format!(
            "environment variable {}",
            agent.api_key_env_vars.join(" or ")
        ));
    }
    for seed in agent.seed_files.iter().filter(|s| s.auth_only) {
        let mut source = format!("~/{}", seed.host_path);
        if !seed.keychain_service.is_empty() {
            source.push_str(&format!(" (or keychain entry {:?})", seed.keychain_service));
        }
        missing.push(source);
    }
    let mut msg = format!(
        "agent {:?} has no usable credentials; checked: {}",
        agent.name,
        missing.join(", ")
    );
    if !agent.auth_hint_env_vars.is_empty() {
        msg.push_str(&format!(
            ". For a local model server, set {} and supply a model explicitly",
            agent.auth_hint_env_vars.join(" or ")
        ));
    }

    Err(anyhow::Error::from(Sentinel::MissingApiKey).context(msg))
}

/// Containerized backends cannot reach the host loopback: reject auth
/// hints that point at localhost, with a backend-appropriate fix.
pub fn check_localhost_hints(
    agent: &AgentDefinition,
    config_env: &BTreeMap<String, String>,
    backend: &str,
) -> Result<()> {
    if backend == "seatbelt" {
        return Ok(());
    }
    for var in agent.auth_hint_env_vars {
        let value = std::env::var(var)
            .ok()
            .filter(|v| !v.is_empty())
            .or_else(|| config_env.get(*var).cloned());
        if let Some(value) = value
            && safety::url_references_localhost(&value)
        {
            let fix = if backend == "docker" {
                "use host.docker.internal instead"
            } else {
                "use an IP routable from the VM instead"
            };
            return Err(usage(format!(
                "{var}={value} points at the host loopback, which is unreachable from a {backend} instance; {fix}"
            )));
        }
    }
    Ok(())
}

/// Write each secret to its own 0600 file under a private `/tmp/taskbox-*`
/// directory: the merged config env first, then the agent's API-key
/// variables from the host environment (overwriting on name conflict).
/// Returns None when there is nothing to materialize.
pub fn materialize_secrets(
    agent: &AgentDefinition,
    env: &BTreeMap<String, String>,
) -> Result<Option<TempDir>> {
    let mut entries: BTreeMap<String, String> = env.clone();
    for var in agent.api_key_env_vars {
        if let Ok(value) = std::env::var(var)
            && !value.is_empty()
        {
            entries.insert(var.to_string(), value);
        }
    }

    if entries.is_empty() {
        return Ok(None);
    }

    let dir = tempfile::Builder::new()
        .prefix("taskbox-")
        .tempdir_in("/tmp")
        .context("Failed to create secrets directory")?;

    for (name, value) in &entries {
        let path = dir.path().join(name);
        fs::write(&path, value)
            .with_context(|| format!("Failed to write secret {name}"))?;
        fs::set_permissions(&path, fs::Permissions::from_mode(0o600))?;
    }
    debug!(count = entries.len(), dir = %dir.path().display(), "auth:secrets materialized");

    Ok(Some(dir))
}

/// The file paths inside a secrets dir, for mount assembly.
pub fn secret_files(dir: &TempDir) -> Vec<PathBuf> {
    let mut files: Vec<PathBuf> = fs::read_dir(dir.path())
        .map(|entries| {
            entries
                .flatten()
                .map(|e| e.path())
                .filter(|p| p.is_file())
                .collect()
        })
        .unwrap_or_else(|e| {
            warn!(error = %e, "auth:failed to list secrets dir");
            Vec::new()
        });
    files.sort();
    files
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::agents;

    fn no_env(_: &str) -> Option<String> {
        None
    }

    #[test]
    fn discover_api_key_from_env() {
        let agent = agents::find("claude").unwrap();
        let status = discover_with(agent, &BTreeMap::new(), |name| {
            (name == "ANTHROPIC_API_KEY").then(|| "sk-test".to_string())
        });
        assert!(status.has_api_key);
    }

    #[test]
    fn discover_hint_from_config_env() {
        let agent = agents::find("claude").unwrap();
        let mut config_env = BTreeMap::new();
        config_env.insert("ANTHROPIC_BASE_URL".to_string(), "http://my-proxy".to_string());
        let status = discover_with(agent, &config_env, no_env);
        assert!(status.has_auth_hint);
    }

    #[test]
    fn empty_env_values_do_not_count() {
        let agent = agents::find("claude").unwrap();
        let status = discover_with(agent, &BTreeMap::new(), |name| {
            (name == "ANTHROPIC_API_KEY").then(String::new)
        });
        assert!(!status.has_api_key);
    }

    #[test]
    fn agents_without_sources_pass() {
        let agent = agents::find("test").unwrap();
        assert!(require_credentials(agent, &BTreeMap::new()).is_ok());
    }

    #[test]
    fn keychain_reader_is_replaceable() {
        set_keychain_reader(|service| {
            (service == "fake-service").then(|| "secret".to_string())
        });
        assert_eq!(read_keychain("fake-service").as_deref(), Some("secret"));
        assert_eq!(read_keychain("other"), None);
        set_keychain_reader(default_keychain_read);
    }

    #[test]
    fn localhost_hint_rejected_for_docker() {
        let agent = agents::find("claude").unwrap();
        let mut config_env = BTreeMap::new();
        config_env.insert(
            "ANTHROPIC_BASE_URL".to_string(),
            "http://localhost:4000".to_string(),
        );
        let err = check_localhost_hints(agent, &config_env, "docker").unwrap_err();
        assert!(err.to_string().contains("host.docker.internal"));
    }

    #[test]
    fn localhost_hint_allowed_for_seatbelt() {
        let agent = agents::find("claude").unwrap();
        let mut config_env = BTreeMap::new();
        config_env.insert(
            "ANTHROPIC_BASE_URL".to_string(),
            "http://localhost:4000".to_string(),
        );
        assert!(check_localhost_hints(agent, &config_env, "seatbelt").is_ok());
    }

    #[test]
    fn materialize_writes_0600_files() {
        let agent = agents::find("test").unwrap();
        let mut env = BTreeMap::new();
        env.insert("MY_TOKEN".to_string(), "value-1".to_string());
        let dir = materialize_secrets(agent, &env).unwrap().unwrap();

        let path = dir.path().join("MY_TOKEN");
        assert_eq!(fs::read_to_string(&path).unwrap(), "value-1");
        let mode = fs::metadata(&path).unwrap().permissions().mode();
        assert_eq!(mode & 0o777, 0o600);
        assert!(dir.path().file_name().unwrap().to_string_lossy().starts_with("taskbox-"));
    }

    #[test]
    fn materialize_empty_env_is_none() {
        let agent = agents::find("test").unwrap();
        assert!(materialize_secrets(agent, &BTreeMap::new()).unwrap().is_none());
    }

    #[test]
    fn secret_files_sorted() {
        let agent = agents::find("test").unwrap();
        let mut env = BTreeMap::new();
        env.insert("B_VAR".to_string(), "b".to_string());
        env.insert("A_VAR".to_string(), "a".to_string());
        let dir = materialize_secrets(agent, &env).unwrap().unwrap();
        let files = secret_files(&dir);
        assert_eq!(files.len(), 2);
        assert!(files[0].ends_with("A_VAR"));
    }
}
