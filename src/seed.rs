//! Seeding of host-side agent files into the sandbox tree, and the
//! container-only settings patches applied on top.

use std::fs;
use std::os::unix::fs::PermissionsExt;
use std::path::Path;

use anyhow::{Context, Result};
use serde_json::{Value, json};
use tracing::debug;

use crate::agents::{self, AgentDefinition, SeedFile};
use crate::auth::{self, AuthStatus};
use crate::paths::SandboxPaths;

/// Copy the agent's seed files from the host into the sandbox tree.
/// Files land in `agent-state/` unless the descriptor targets the
/// in-instance home dir, in which case they land in `home-seed/`.
pub fn materialize(
    agent: &AgentDefinition,
    sandbox: &SandboxPaths,
    auth: &AuthStatus,
) -> Result<()> {
    let home = home::home_dir().unwrap_or_default();

    for seed in agent.seed_files {
        if skip_auth_only(seed, auth) {
            debug!(agent = agent.name, file = seed.host_path, "seed:skipped (api key present)");
            continue;
        }
        let Some(bytes) = read_seed_source(&home, seed) else {
            continue;
        };
        let dest = if seed.home_dir {
            sandbox.home_seed_dir().join(seed.target_path)
        } else {
            sandbox.agent_state_dir().join(seed.target_path)
        };
        write_seed(&dest, &bytes)?;
        debug!(agent = agent.name, file = seed.host_path, dest = %dest.display(), "seed:written");
    }

    // A meta-agent seeds each real sub-agent's files into the home-seed
    // tree at their natural home locations.
    for sub_name in agent.sub_agents {
        let Some(sub) = agents::find(sub_name) else {
            continue;
        };
        let sub_auth = auth::discover(sub, &Default::default());
        for seed in sub.seed_files {
            if skip_auth_only(seed, &sub_auth) {
                continue;
            }
            let Some(bytes) = read_seed_source(&home, seed) else {
                continue;
            };
            let dest = sandbox.home_seed_dir().join(seed.host_path);
            write_seed(&dest, &bytes)?;
        }
    }

    Ok(())
}

/// auth_only files are skipped when an API key covers them. A non-empty
/// owner list narrows the skip to that list's keys.
fn skip_auth_only(seed: &SeedFile, auth: &AuthStatus) -> bool {
    if !seed.auth_only || !auth.has_api_key {
        return false;
    }
    if seed.owner_api_keys.is_empty() {
        return true;
    }
    seed.owner_api_keys
        .iter()
        .any(|var| std::env::var(var).is_ok_and(|v| !v.is_empty()))
}

fn read_seed_source(home: &Path, seed: &SeedFile) -> Option<Vec<u8>> {
    let host = home.join(seed.host_path);
    if let Ok(bytes) = fs::read(&host) {
        return Some(bytes);
    }
    if !seed.keychain_service.is_empty()
        && let Some(value) = auth::read_keychain(seed.keychain_service)
    {
        return Some(value.into_bytes());
    }
    None
}

fn write_seed(dest: &Path, bytes: &[u8]) -> Result<()> {
    if let Some(parent) = dest.parent() {
        fs::create_dir_all(parent)?;
    }
    fs::write(dest, bytes).with_context(|| format!("Failed to write seed {}", dest.display()))?;
    fs::set_permissions(dest, fs::Permissions::from_mode(0o600))?;
    Ok(())
}

/// Apply container-only settings patches for the sandboxed agent. The
/// instance runs unattended, so permission prompts and nested sandboxes
/// are disabled inside it.
pub fn ensure_container_settings(agent: &AgentDefinition, sandbox: &SandboxPaths) -> Result<()> {
    match agent.name {
        "claude" => patch_claude_settings(&sandbox.agent_state_dir().join("settings.json")),
        "gemini" => patch_gemini_settings(&sandbox.agent_state_dir().join("settings.json")),
        "shell" => {
            for sub in agent.sub_agents {
                let sub_home = sandbox.home_seed_dir().join(format!(".{sub}"));
                match *sub {
                    "claude" => patch_claude_settings(&sub_home.join("settings.json"))?,
                    "gemini" => patch_gemini_settings(&sub_home.join("settings.json"))?,
                    _ => {}
                }
            }
            Ok(())
        }
        _ => Ok(()),
    }
}

/// Patch `.claude.json` in the home seed so the in-instance CLI treats
/// itself as a global npm install (no self-update attempts). Skipped for
/// the seatbelt backend, where the host install is reused.
pub fn ensure_home_seed_config(agent: &AgentDefinition, sandbox: &SandboxPaths) -> Result<()> {
    let mut targets = Vec::new();
    if agent.name == "claude" {
        targets.push(sandbox.home_seed_dir().join(".claude.json"));
    }
    if agent.sub_agents.contains(&"claude") {
        targets.push(sandbox.home_seed_dir().join(".claude.json"));
    }
    for path in targets {
        patch_json(&path, |root| {
            root["installMethod"] = json!("npm-global");
        })?;
    }
    Ok(())
}

fn patch_claude_settings(path: &Path) -> Result<()> {
    patch_json(path, |root| {
        root["skipDangerousModePermissionPrompt"] = json!(true);
        if !root["sandbox"].is_object() {
            root["sandbox"] = json!({});
        }
        root["sandbox"]["enabled"] = json!(false);
    })
}

fn patch_gemini_settings(path: &Path) -> Result<()> {
    patch_json(path, |root| {
        if !root["security"].is_object() {
            root["security"] = json!({});
        }
        if !root["security"]["folderTrust"].is_object() {
            root["security"]["folderTrust"] = json!({});
        }
        root["security"]["folderTrust"]["enabled"] = json!(false);
    })
}

/// Read-modify-write a JSON file, creating it (and parents) when absent.
/// Sibling keys are preserved.
fn patch_json<F>(path: &Path, patch: F) -> Result<()>
where
    F: FnOnce(&mut Value),
{
    let mut root: Value = match fs::read_to_string(path) {
        Ok(contents) => serde_json::from_str(&contents)
            .with_context(|| format!("{} is not valid JSON", path.display()))?,
        Err(_) => json!({}),
    };

    patch(&mut root);

    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent)?;
    }
    let output = serde_json::to_string_pretty(&root)?;
    fs::write(path, output + "\n")
        .with_context(|| format!("Failed to write {}", path.display()))?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::paths::Paths;

    fn sandbox() -> (tempfile::TempDir, SandboxPaths) {
        let dir = tempfile::tempdir().unwrap();
        let paths = Paths::at(dir.path());
        let sb = SandboxPaths::new(&paths, "s1");
        fs::create_dir_all(sb.agent_state_dir()).unwrap();
        fs::create_dir_all(sb.home_seed_dir()).unwrap();
        (dir, sb)
    }

    #[test]
    fn claude_patch_sets_flags_and_preserves_siblings() {
        let (_dir, sb) = sandbox();
        let path = sb.agent_state_dir().join("settings.json");
        fs::write(&path, r#"{"theme": "dark", "sandbox": {"profile": "x"}}"#).unwrap();

        patch_claude_settings(&path).unwrap();

        let root: Value = serde_json::from_str(&fs::read_to_string(&path).unwrap()).unwrap();
        assert_eq!(root["skipDangerousModePermissionPrompt"], json!(true));
        assert_eq!(root["sandbox"]["enabled"], json!(false));
        assert_eq!(root["sandbox"]["profile"], json!("x"));
        assert_eq!(root["theme"], json!("dark"));
    }

    #[test]
    fn gemini_patch_preserves_security_siblings() {
        let (_dir, sb) = sandbox();
        let path = sb.agent_state_dir().join("settings.json");
        fs::write(&path, r#"{"security": {"auth": {"selectedType": "oauth"}}}"#).unwrap();

        patch_gemini_settings(&path).unwrap();

        let root: Value = serde_json::from_str(&fs::read_to_string(&path).unwrap()).unwrap();
        assert_eq!(root["security"]["folderTrust"]["enabled"], json!(false));
        assert_eq!(root["security"]["auth"]["selectedType"], json!("oauth"));
    }

    #[test]
    fn patch_creates_missing_file() {
        let (_dir, sb) = sandbox();
        let path = sb.agent_state_dir().join("settings.json");
        patch_claude_settings(&path).unwrap();
        let root: Value = serde_json::from_str(&fs::read_to_string(&path).unwrap()).unwrap();
        assert_eq!(root["sandbox"]["enabled"], json!(false));
    }

    #[test]
    fn shell_patches_sub_agent_home_seeds() {
        let (_dir, sb) = sandbox();
        let shell = agents::find("shell").unwrap();
        ensure_container_settings(shell, &sb).unwrap();

        let claude_settings = sb.home_seed_dir().join(".claude/settings.json");
        assert!(claude_settings.exists());
        let root: Value =
            serde_json::from_str(&fs::read_to_string(&claude_settings).unwrap()).unwrap();
        assert_eq!(root["skipDangerousModePermissionPrompt"], json!(true));

        let gemini_settings = sb.home_seed_dir().join(".gemini/settings.json");
        assert!(gemini_settings.exists());
    }

    #[test]
    fn home_seed_config_sets_install_method() {
        let (_dir, sb) = sandbox();
        let claude = agents::find("claude").unwrap();
        fs::write(
            sb.home_seed_dir().join(".claude.json"),
            r#"{"projects": {"/x": {}}}"#,
        )
        .unwrap();

        ensure_home_seed_config(claude, &sb).unwrap();

        let root: Value = serde_json::from_str(
            &fs::read_to_string(sb.home_seed_dir().join(".claude.json")).unwrap(),
        )
        .unwrap();
        assert_eq!(root["installMethod"], json!("npm-global"));
        assert!(root["projects"]["/x"].is_object());
    }

    #[test]
    fn skip_auth_only_respects_owner_keys() {
        let with_key = AuthStatus {
            has_api_key: true,
            ..Default::default()
        };
        let without_key = AuthStatus::default();

        let plain = SeedFile {
            host_path: "x",
            target_path: "x",
            home_dir: false,
            auth_only: true,
            owner_api_keys: &[],
            keychain_service: "",
        };
        assert!(skip_auth_only(&plain, &with_key));
        assert!(!skip_auth_only(&plain, &without_key));

        let owned = SeedFile {
            owner_api_keys: &["TB_SEED_TEST_UNSET_KEY"],
            ..plain
        };
        // The set key is not one of the owners, so the file still seeds.
        assert!(!skip_auth_only(&owned, &with_key));
    }

    #[test]
    fn materialize_copies_from_fake_home() {
        // Exercises the write path via a directly constructed seed file.
        let (_dir, sb) = sandbox();
        let dest = sb.agent_state_dir().join("nested/creds.json");
        write_seed(&dest, b"{}").unwrap();
        assert!(dest.exists());
        let mode = fs::metadata(&dest).unwrap().permissions().mode();
        assert_eq!(mode & 0o777, 0o600);
    }
}
