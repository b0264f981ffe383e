//! Rendering of `context.md`, the environment description the agent
//! reads on startup.

use std::fs;

use anyhow::{Context, Result};

use crate::agents::AgentDefinition;
use crate::manager::meta::SandboxMeta;
use crate::paths::SandboxPaths;

/// Render the markdown description of a sandbox environment.
pub fn render(meta: &SandboxMeta) -> String {
    let mut out = String::new();
    out.push_str("# Sandbox environment\n\n");
    out.push_str(
        "You are running inside an isolated sandbox. Directories mounted in \
         copy mode are snapshots; your edits stay inside the sandbox until \
         the user exports them.\n",
    );

    out.push_str("\n## Directories\n\n");
    out.push_str(&render_dir_line(&meta.workdir, true));
    for dir in &meta.directories {
        out.push_str(&render_dir_line(dir, false));
    }

    if !meta.network_mode.is_empty() {
        out.push_str("\n## Network\n\n");
        match meta.network_mode.as_str() {
            "none" => out.push_str("This sandbox has no network access.\n"),
            "isolated" => {
                out.push_str("Outbound traffic is restricted to these domains:\n\n");
                for domain in &meta.network_allow {
                    out.push_str(&format!("- {domain}\n"));
                }
            }
            other => out.push_str(&format!("Network mode: {other}\n")),
        }
    }

    if let Some(resources) = &meta.resources
        && !resources.is_empty()
    {
        out.push_str("\n## Resources\n\n");
        if !resources.cpus.is_empty() {
            out.push_str(&format!("- CPUs: {}\n", resources.cpus));
        }
        if !resources.memory.is_empty() {
            out.push_str(&format!("- Memory: {}\n", resources.memory));
        }
    }

    out
}

fn render_dir_line(dir: &crate::manager::meta::DirSpec, is_workdir: bool) -> String {
    let mode = match dir.mode.as_str() {
        "copy" => "isolated copy",
        "rw" => "read-write",
        _ => "read-only",
    };
    let mut line = format!("- {}", dir.mount_path);
    if dir.mount_path != dir.host_path.to_string_lossy() {
        line.push_str(&format!(" → {}", dir.host_path.display()));
    }
    line.push_str(&format!(" ({mode})"));
    if is_workdir {
        line.push_str(" ← working directory");
    }
    line.push('\n');
    line
}

/// Write `context.md` and, when the agent advertises a context file,
/// inline the same markdown into the agent-state tree.
pub fn write(meta: &SandboxMeta, sandbox: &SandboxPaths, agent: &AgentDefinition) -> Result<()> {
    let markdown = render(meta);
    fs::write(sandbox.context_file(), &markdown)
        .with_context(|| format!("Failed to write {}", sandbox.context_file().display()))?;

    if !agent.context_file.is_empty() {
        let agent_copy = sandbox.agent_state_dir().join(agent.context_file);
        if let Some(parent) = agent_copy.parent() {
            fs::create_dir_all(parent)?;
        }
        fs::write(&agent_copy, &markdown)
            .with_context(|| format!("Failed to write {}", agent_copy.display()))?;
    }
    Ok(())
}
