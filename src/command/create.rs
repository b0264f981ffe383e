use anyhow::Result;
use console::style;

use crate::cancel::CancelToken;
use crate::manager::{CreateOptions, CreateOutcome};
use crate::paths::Paths;

pub fn run(paths: &Paths, cancel: &CancelToken, opts: CreateOptions) -> Result<()> {
    let backend_hint = if opts.backend.is_empty() {
        None
    } else {
        Some(opts.backend.clone())
    };
    let mut manager = match backend_hint {
        Some(backend) => {
            let runtime = crate::runtime::for_backend(&backend)?;
            crate::manager::SandboxManager::new(paths.clone(), runtime, cancel.clone())
        }
        None => super::manager_for(paths, cancel, None)?,
    };

    let no_start = opts.no_start;
    match manager.create(opts)? {
        CreateOutcome::Cancelled => {
            println!("Cancelled; no sandbox was created.");
            Ok(())
        }
        CreateOutcome::Created(meta) => {
            println!(
                "{} sandbox {} ({} on {})",
                style("Created").green().bold(),
                style(&meta.name).bold(),
                meta.agent,
                meta.backend,
            );
            println!("  workdir: {} ({})", meta.workdir.host_path.display(), meta.workdir.mode);
            if meta.has_prompt {
                println!("  prompt:  yes");
            }
            if no_start {
                println!("  not started (--no-start); run `taskbox start {}`", meta.name);
            } else {
                println!("  attach:  docker exec -it taskbox-{} tmux attach -t main", meta.name);
            }
            Ok(())
        }
    }
}
