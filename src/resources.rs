//! Embedded base-profile resources and the checksum manifest that
//! tracks user edits to them.
//!
//! `setup` writes these files into `profiles/base/`. A file the user has
//! edited is never clobbered: the new upstream content lands beside it
//! as `<file>.new` instead.

use std::fs;
use std::path::Path;

use anyhow::{Context, Result};
use serde_json::Value;
use sha2::{Digest, Sha256};

use crate::paths::Paths;

pub const CHECKSUM_MANIFEST: &str = ".resource-checksums";
pub const LAST_BUILD_CHECKSUM: &str = ".last-build-checksum";

pub const BASE_DOCKERFILE: &str = r#"FROM debian:bookworm-slim

RUN apt-get update && apt-get install -y --no-install-recommends \
    ca-certificates \
    curl \
    git \
    jq \
    tmux \
    rsync \
    nodejs \
    npm \
    iptables \
    dnsutils \
    && rm -rf /var/lib/apt/lists/*

# Agent CLIs
RUN npm install -g @anthropic-ai/claude-code @google/gemini-cli @openai/codex

RUN useradd -m -d /home/agent -s /bin/bash agent
RUN mkdir /taskbox && chown agent:agent /taskbox

COPY entrypoint.sh /usr/local/bin/entrypoint.sh
COPY tmux.conf /etc/taskbox-tmux.conf
RUN chmod +x /usr/local/bin/entrypoint.sh

ENTRYPOINT ["/usr/local/bin/entrypoint.sh"]
"#;

pub const ENTRYPOINT_SH: &str = r#"#!/bin/bash
# In-instance entrypoint: reads /taskbox/config.json, loads secrets, and
# runs the agent command inside a tmux session named "main".
set -uo pipefail

CONFIG=/taskbox/config.json
LOG=/taskbox/log.txt

exec >>"$LOG" 2>&1
echo "[entrypoint] starting at $(date -Is)"

AGENT_CMD=$(jq -r '.agent_command' "$CONFIG")
WORKDIR=$(jq -r '.working_dir' "$CONFIG")
STARTUP_DELAY=$(jq -r '.startup_delay // 0' "$CONFIG")
TMUX_CONF=$(jq -r '.tmux_conf // "default"' "$CONFIG")
NETWORK_ISOLATED=$(jq -r '.network_isolated // false' "$CONFIG")

# Secrets arrive as one file per variable; export and forget.
if [ -d /run/secrets ]; then
    for f in /run/secrets/*; do
        [ -f "$f" ] || continue
        export "$(basename "$f")"="$(cat "$f")"
    done
fi

# Isolated mode: default-deny egress, allow DNS plus resolved addresses
# of the configured domains. Requires CAP_NET_ADMIN.
if [ "$NETWORK_ISOLATED" = "true" ]; then
    iptables -P OUTPUT DROP
    iptables -A OUTPUT -o lo -j ACCEPT
    iptables -A OUTPUT -p udp --dport 53 -j ACCEPT
    iptables -A OUTPUT -p tcp --dport 53 -j ACCEPT
    iptables -A OUTPUT -m state --state ESTABLISHED,RELATED -j ACCEPT
    for domain in $(jq -r '.allowed_domains[]? // empty' "$CONFIG"); do
        for ip in $(dig +short "$domain" | grep -E '^[0-9.]+$'); do
            iptables -A OUTPUT -d "$ip" -j ACCEPT
        done
    done
    echo "[entrypoint] egress restricted to allowed domains"
fi

TMUX_ARGS=()
case "$TMUX_CONF" in
    default|default+host) TMUX_ARGS+=(-f /etc/taskbox-tmux.conf) ;;
    host) [ -f "$HOME/.tmux.conf" ] && TMUX_ARGS+=(-f "$HOME/.tmux.conf") ;;
esac

if [ "$STARTUP_DELAY" -gt 0 ] 2>/dev/null; then
    sleep "$(awk "BEGIN {print $STARTUP_DELAY/1000}")"
fi

echo "[entrypoint] launching agent: $AGENT_CMD"
tmux "${TMUX_ARGS[@]}" new-session -d -s main -c "$WORKDIR" "$AGENT_CMD"
tmux set-option -t main remain-on-exit on

# Keep the instance alive; the host inspects the pane for liveness.
exec tail -f /dev/null
"#;

pub const TMUX_CONF: &str = r#"# taskbox default tmux configuration
set -g mouse on
set -g history-limit 50000
set -g default-terminal "screen-256color"
set -g status off
set -g remain-on-exit on
"#;

/// The embedded resources, by file name.
pub fn embedded() -> Vec<(&'static str, &'static str)> {
    vec![
        ("Dockerfile", BASE_DOCKERFILE),
        ("entrypoint.sh", ENTRYPOINT_SH),
        ("tmux.conf", TMUX_CONF),
    ]
}

pub fn sha256_hex(bytes: &[u8]) -> String {
    let mut hasher = Sha256::new();
    hasher.update(bytes);
    hex::encode(hasher.finalize())
}

fn load_manifest(path: &Path) -> serde_json::Map<String, Value> {
    fs::read_to_string(path)
        .ok()
        .and_then(|c| serde_json::from_str(&c).ok())
        .unwrap_or_default()
}

/// Write the embedded resources into `profiles/base/`, respecting user
/// edits. Returns human-readable notes about what happened.
pub fn materialize_base_profile(paths: &Paths) -> Result<Vec<String>> {
    let base_dir = paths.profile_dir("base");
    fs::create_dir_all(&base_dir)
        .with_context(|| format!("failed to create {}", base_dir.display()))?;

    let manifest_path = base_dir.join(CHECKSUM_MANIFEST);
    let mut manifest = load_manifest(&manifest_path);
    let mut notes = Vec::new();

    for (name, content) in embedded() {
        let target = base_dir.join(name);
        let embedded_hash = sha256_hex(content.as_bytes());
        let recorded = manifest.get(name).and_then(Value::as_str).unwrap_or("");

        if !target.exists() {
            fs::write(&target, content)?;
            manifest.insert(name.to_string(), Value::from(embedded_hash));
            notes.push(format!("wrote {name}"));
            continue;
        }

        let on_disk = fs::read(&target)?;
        let on_disk_hash = sha256_hex(&on_disk);
        if on_disk_hash == embedded_hash {
            manifest.insert(name.to_string(), Value::from(embedded_hash));
            continue;
        }

        if on_disk_hash == recorded {
            // Unedited since the last write; safe to refresh.
            fs::write(&target, content)?;
            manifest.insert(name.to_string(), Value::from(embedded_hash));
            notes.push(format!("updated {name}"));
        } else {
            // The user changed it; stage the upstream version beside it.
            fs::write(base_dir.join(format!("{name}.new")), content)?;
            notes.push(format!(
                "{name} was modified locally; new version saved as {name}.new"
            ));
        }
    }

    fs::write(
        &manifest_path,
        serde_json::to_string_pretty(&Value::Object(manifest))? + "\n",
    )?;
    Ok(notes)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn temp_paths() -> (tempfile::TempDir, Paths) {
        let dir = tempfile::tempdir().unwrap();
        let paths = Paths::at(dir.path());
        (dir, paths)
    }

    #[test]
    fn first_run_writes_everything() {
        let (_dir, paths) = temp_paths();
        let notes = materialize_base_profile(&paths).unwrap();
        assert_eq!(notes.len(), 3);

        let base = paths.profile_dir("base");
        assert!(base.join("Dockerfile").exists());
        assert!(base.join("entrypoint.sh").exists());
        assert!(base.join("tmux.conf").exists());

        let manifest = load_manifest(&base.join(CHECKSUM_MANIFEST));
        assert_eq!(
            manifest["Dockerfile"].as_str().unwrap(),
            sha256_hex(BASE_DOCKERFILE.as_bytes())
        );
    }

    #[test]
    fn second_run_is_quiet() {
        let (_dir, paths) = temp_paths();
        materialize_base_profile(&paths).unwrap();
        let notes = materialize_base_profile(&paths).unwrap();
        assert!(notes.is_empty());
    }

    #[test]
    fn user_edit_is_preserved() {
        let (_dir, paths) = temp_paths();
        materialize_base_profile(&paths).unwrap();

        let dockerfile = paths.profile_dir("base").join("Dockerfile");
        fs::write(&dockerfile, "FROM my-custom-base\n").unwrap();

        let notes = materialize_base_profile(&paths).unwrap();
        assert!(notes.iter().any(|n| n.contains("Dockerfile.new")));
        assert_eq!(
            fs::read_to_string(&dockerfile).unwrap(),
            "FROM my-custom-base\n"
        );
        assert!(paths.profile_dir("base").join("Dockerfile.new").exists());
    }

    #[test]
    fn sha256_is_stable_hex() {
        let hash = sha256_hex(b"hello");
        assert_eq!(hash.len(), 64);
        assert_eq!(
            hash,
            "2cf24dba5fb0a30e26e83b2ac5b9e29e1b161e5c1fa7425e73043362938b9824"
        );
    }
}
