//! The built-in agent catalog.
//!
//! Each entry is a plain data record: command templates, credential
//! sources, and seed files. Command templates are literal strings; the
//! `PROMPT` marker in a headless template is replaced by plain string
//! substitution at create time.

use std::time::Duration;

/// How an initial prompt is delivered to the agent.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PromptMode {
    /// The prompt is baked into the launch command.
    Headless,
    /// The prompt is typed into the running agent once it is ready.
    Interactive,
}

/// A host-side file seeded into the sandbox at create time.
#[derive(Debug, Clone)]
pub struct SeedFile {
    /// Path on the host, relative to the home directory.
    pub host_path: &'static str,
    /// Path inside the seeded tree.
    pub target_path: &'static str,
    /// Seed into `home-seed/` (true) or `agent-state/` (false).
    pub home_dir: bool,
    /// Only needed when the agent has no API key.
    pub auth_only: bool,
    /// When non-empty, skip-on-API-key applies only to these key vars.
    pub owner_api_keys: &'static [&'static str],
    /// Keychain service to fall back to when the file is absent.
    pub keychain_service: &'static str,
}

#[derive(Debug, Clone)]
pub struct AgentDefinition {
    pub name: &'static str,
    pub description: &'static str,
    /// The agent's state directory inside the instance home (mount target
    /// of `agent-state/`). Empty when the agent keeps no state dir.
    pub state_dir: &'static str,
    /// Instruction file the agent reads from its state dir, if any.
    pub context_file: &'static str,
    pub interactive_cmd: &'static str,
    /// Contains the literal marker `PROMPT`.
    pub headless_cmd: &'static str,
    pub model_flag: &'static str,
    pub prompt_mode: PromptMode,
    pub startup_delay: Duration,
    pub ready_pattern: &'static str,
    pub submit_sequence: &'static str,
    pub api_key_env_vars: &'static [&'static str],
    pub auth_hint_env_vars: &'static [&'static str],
    /// Provider prefix applied to the model when the hint var is set.
    pub model_prefixes: &'static [(&'static str, &'static str)],
    pub model_aliases: &'static [(&'static str, &'static str)],
    pub seed_files: &'static [SeedFile],
    pub network_allowlist: &'static [&'static str],
    /// For meta-agents: the real agents whose settings also get seeded.
    pub sub_agents: &'static [&'static str],
}

impl AgentDefinition {
    pub fn resolve_model_alias(&self, model: &str) -> String {
        for (alias, canonical) in self.model_aliases {
            if *alias == model {
                return canonical.to_string();
            }
        }
        model.to_string()
    }
}

static CLAUDE: AgentDefinition = AgentDefinition {
    name: "claude",
    description: "Claude Code",
    state_dir: ".claude",
    context_file: "CLAUDE.md",
    interactive_cmd: "claude --dangerously-skip-permissions",
    headless_cmd: "claude --dangerously-skip-permissions -p \"PROMPT\"",
    model_flag: "--model",
    prompt_mode: PromptMode::Headless,
    startup_delay: Duration::from_millis(1500),
    ready_pattern: "",
    submit_sequence: "Enter",
    api_key_env_vars: &["ANTHROPIC_API_KEY"],
    auth_hint_env_vars: &["ANTHROPIC_BASE_URL"],
    model_prefixes: &[],
    model_aliases: &[
        ("opus", "claude-opus-4-5"),
        ("sonnet", "claude-sonnet-4-5"),
        ("haiku", "claude-haiku-4-5"),
    ],
    seed_files: &[
        SeedFile {
            host_path: ".claude/.credentials.json",
            target_path: ".credentials.json",
            home_dir: false,
            auth_only: true,
            owner_api_keys: &[],
            keychain_service: "Claude Code-credentials",
        },
        SeedFile {
            host_path: ".claude/settings.json",
            target_path: "settings.json",
            home_dir: false,
            auth_only: false,
            owner_api_keys: &[],
            keychain_service: "",
        },
        SeedFile {
            host_path: ".claude.json",
            target_path: ".claude.json",
            home_dir: true,
            auth_only: false,
            owner_api_keys: &[],
            keychain_service: "",
        },
    ],
    network_allowlist: &["api.anthropic.com", "statsig.anthropic.com", "sentry.io"],
    sub_agents: &[],
};

static GEMINI: AgentDefinition = AgentDefinition {
    name: "gemini",
    description: "Gemini CLI",
    state_dir: ".gemini",
    context_file: "GEMINI.md",
    interactive_cmd: "gemini --yolo",
    headless_cmd: "gemini --yolo -p \"PROMPT\"",
    model_flag: "--model",
    prompt_mode: PromptMode::Headless,
    startup_delay: Duration::from_millis(2000),
    ready_pattern: "",
    submit_sequence: "Enter",
    api_key_env_vars: &["GEMINI_API_KEY", "GOOGLE_API_KEY"],
    auth_hint_env_vars: &["GOOGLE_GEMINI_BASE_URL"],
    model_prefixes: &[],
    model_aliases: &[("pro", "gemini-2.5-pro"), ("flash", "gemini-2.5-flash")],
    seed_files: &[
        SeedFile {
            host_path: ".gemini/oauth_creds.json",
            target_path: "oauth_creds.json",
            home_dir: false,
            auth_only: true,
            owner_api_keys: &[],
            keychain_service: "",
        },
        SeedFile {
            host_path: ".gemini/settings.json",
            target_path: "settings.json",
            home_dir: false,
            auth_only: false,
            owner_api_keys: &[],
            keychain_service: "",
        },
    ],
    network_allowlist: &[
        "generativelanguage.googleapis.com",
        "oauth2.googleapis.com",
        "cloudcode-pa.googleapis.com",
    ],
    sub_agents: &[],
};

static CODEX: AgentDefinition = AgentDefinition {
    name: "codex",
    description: "OpenAI Codex CLI",
    state_dir: ".codex",
    context_file: "AGENTS.md",
    interactive_cmd: "codex --dangerously-bypass-approvals-and-sandbox",
    headless_cmd: "codex exec --dangerously-bypass-approvals-and-sandbox \"PROMPT\"",
    model_flag: "--model",
    prompt_mode: PromptMode::Headless,
    startup_delay: Duration::from_millis(1500),
    ready_pattern: "",
    submit_sequence: "Enter",
    api_key_env_vars: &["OPENAI_API_KEY"],
    auth_hint_env_vars: &["OPENAI_BASE_URL"],
    model_prefixes: &[("OPENAI_BASE_URL", "openai/")],
    model_aliases: &[],
    seed_files: &[
        SeedFile {
            host_path: ".codex/auth.json",
            target_path: "auth.json",
            home_dir: false,
            auth_only: true,
            owner_api_keys: &[],
            keychain_service: "",
        },
        SeedFile {
            host_path: ".codex/config.toml",
            target_path: "config.toml",
            home_dir: false,
            auth_only: false,
            owner_api_keys: &[],
            keychain_service: "",
        },
    ],
    network_allowlist: &["api.openai.com", "chatgpt.com"],
    sub_agents: &[],
};

static SHELL: AgentDefinition = AgentDefinition {
    name: "shell",
    description: "Plain shell with agent CLIs on PATH",
    state_dir: "",
    context_file: "",
    interactive_cmd: "bash -l",
    headless_cmd: "bash -lc \"PROMPT\"",
    model_flag: "",
    prompt_mode: PromptMode::Headless,
    startup_delay: Duration::from_millis(200),
    ready_pattern: "\\$ $",
    submit_sequence: "Enter",
    api_key_env_vars: &[],
    auth_hint_env_vars: &[],
    model_prefixes: &[],
    model_aliases: &[],
    seed_files: &[],
    network_allowlist: &[],
    sub_agents: &["claude", "gemini", "codex"],
};

/// Minimal agent used by the integration tests: no credentials, trivial
/// commands.
static TEST: AgentDefinition = AgentDefinition {
    name: "test",
    description: "Test agent (no credentials required)",
    state_dir: ".test-agent",
    context_file: "",
    interactive_cmd: "sh",
    headless_cmd: "sh -c \"PROMPT\"",
    model_flag: "",
    prompt_mode: PromptMode::Headless,
    startup_delay: Duration::from_millis(0),
    ready_pattern: "",
    submit_sequence: "Enter",
    api_key_env_vars: &[],
    auth_hint_env_vars: &[],
    model_prefixes: &[],
    model_aliases: &[],
    seed_files: &[],
    network_allowlist: &[],
    sub_agents: &[],
};

static CATALOG: [&AgentDefinition; 5] = [&CLAUDE, &GEMINI, &CODEX, &SHELL, &TEST];

pub fn all() -> &'static [&'static AgentDefinition] {
    &CATALOG
}

pub fn find(name: &str) -> Option<&'static AgentDefinition> {
    all().iter().copied().find(|a| a.name == name)
}

/// Names offered in user-facing listings (the test agent stays hidden).
pub fn visible_names() -> Vec<&'static str> {
    all()
        .iter()
        .filter(|a| a.name != "test")
        .map(|a| a.name)
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn find_known_agents() {
        assert!(find("claude").is_some());
        assert!(find("gemini").is_some());
        assert!(find("shell").is_some());
        assert!(find("nope").is_none());
    }

    #[test]
    fn headless_templates_carry_prompt_marker() {
        for agent in all() {
            assert!(
                agent.headless_cmd.contains("PROMPT"),
                "{} headless template missing PROMPT",
                agent.name
            );
        }
    }

    #[test]
    fn shell_sub_agents_resolve() {
        let shell = find("shell").unwrap();
        for sub in shell.sub_agents {
            assert!(find(sub).is_some(), "unknown sub-agent {sub}");
        }
    }

    #[test]
    fn model_alias_resolution() {
        let claude = find("claude").unwrap();
        assert_eq!(claude.resolve_model_alias("opus"), "claude-opus-4-5");
        assert_eq!(claude.resolve_model_alias("custom-x"), "custom-x");
    }

    #[test]
    fn auth_only_seeds_exist_for_credentialed_agents() {
        for name in ["claude", "gemini", "codex"] {
            let agent = find(name).unwrap();
            assert!(agent.seed_files.iter().any(|s| s.auth_only), "{name}");
            assert!(!agent.api_key_env_vars.is_empty(), "{name}");
        }
    }

    #[test]
    fn test_agent_is_hidden() {
        assert!(!visible_names().contains(&"test"));
    }
}
