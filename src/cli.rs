use anyhow::Result;
use clap::{CommandFactory, Parser, Subcommand};
use clap_complete::{Shell, generate};

use crate::cancel::CancelToken;
use crate::command;
use crate::manager::types::NetworkRequest;
use crate::paths::Paths;

#[derive(Parser)]
#[command(author, version, about, long_about = None)]
#[command(name = "taskbox")]
#[command(about = "Per-task sandboxes for AI coding agents")]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Create a sandbox and start its instance
    Create {
        /// Sandbox name
        name: String,
        /// Working directory argument: path[:copy|:rw][:force][=mount]
        workdir: Option<String>,
        /// Agent to run (defaults to the configured agent)
        #[arg(long)]
        agent: Option<String>,
        /// Model name or alias
        #[arg(long)]
        model: Option<String>,
        /// Backend: docker, tart, or seatbelt
        #[arg(long)]
        backend: Option<String>,
        /// Profile to apply
        #[arg(long)]
        profile: Option<String>,
        /// Additional directory: path[:copy|:rw][:force][=mount]
        #[arg(short = 'd', long = "dir")]
        dirs: Vec<String>,
        /// Initial prompt text
        #[arg(short = 'p', long)]
        prompt: Option<String>,
        /// Read the initial prompt from a file ("-" for stdin)
        #[arg(long)]
        prompt_file: Option<String>,
        /// Destroy an existing sandbox of the same name first
        #[arg(long)]
        replace: bool,
        /// Skip interactive confirmations
        #[arg(short = 'y', long)]
        yes: bool,
        /// Create everything but do not start the instance
        #[arg(long)]
        no_start: bool,
        /// Restrict outbound traffic to an allowlist (docker only)
        #[arg(long, conflicts_with = "network_none")]
        network_isolated: bool,
        /// Disable networking entirely
        #[arg(long)]
        network_none: bool,
        /// Extra allowed domain (with --network-isolated)
        #[arg(long = "allow")]
        network_allow: Vec<String>,
        /// Publish a port (HOST:CONTAINER)
        #[arg(long = "port")]
        ports: Vec<String>,
        /// CPU limit (e.g. 1.5)
        #[arg(long)]
        cpus: Option<String>,
        /// Memory limit (e.g. 512m, 2g)
        #[arg(long)]
        memory: Option<String>,
        /// Extra arguments passed through to the agent command
        #[arg(last = true)]
        agent_args: Vec<String>,
    },
    /// Start a stopped or removed sandbox
    Start {
        name: String,
        /// Relaunch the agent resuming its previous session
        #[arg(long)]
        resume: bool,
    },
    /// Stop a sandbox's instance
    Stop { name: String },
    /// Remove a sandbox and its instance
    Destroy {
        name: String,
        /// Skip the confirmation prompt
        #[arg(short = 'y', long)]
        yes: bool,
    },
    /// Re-copy the workdir and restart from a fresh baseline
    Reset {
        name: String,
        /// Also wipe the agent state directory
        #[arg(long)]
        clean: bool,
        /// Hide the initial prompt for this run
        #[arg(long)]
        no_prompt: bool,
        /// Sync the work copy in place without restarting
        #[arg(long)]
        no_restart: bool,
    },
    /// Show a sandbox's status and metadata
    Inspect {
        name: String,
        /// Emit JSON
        #[arg(long)]
        json: bool,
    },
    /// List sandboxes
    List,
    /// Read or edit the global configuration
    Config {
        #[command(subcommand)]
        action: ConfigAction,
    },
    /// Prepare the taskbox root and build the base image
    Setup {
        /// Rebuild the base image even when up to date
        #[arg(long)]
        force: bool,
    },
    /// Remove stale taskbox temp directories
    PruneTemp {
        /// Report without deleting
        #[arg(long)]
        dry_run: bool,
        /// Only remove entries older than this many seconds
        #[arg(long, default_value_t = 3600)]
        max_age_secs: u64,
    },
    /// Generate shell completions
    Completions { shell: Shell },
}

#[derive(Subcommand)]
enum ConfigAction {
    /// Print one setting (dotted path)
    Get { key: String },
    /// Set one or more settings (KEY=VALUE, dotted paths)
    Set { assignments: Vec<String> },
    /// Remove a setting
    Delete { key: String },
    /// Print the effective configuration with defaults filled in
    Show,
}

pub fn run() -> Result<()> {
    let cli = Cli::parse();
    let paths = Paths::from_home()?;
    let cancel = CancelToken::new();
    cancel.arm_ctrlc()?;

    // The legacy-layout migration is idempotent and cheap; run it before
    // any command touches the root.
    crate::migrate::migrate_if_needed(&paths)?;

    match cli.command {
        Commands::Create {
            name,
            workdir,
            agent,
            model,
            backend,
            profile,
            dirs,
            prompt,
            prompt_file,
            replace,
            yes,
            no_start,
            network_isolated,
            network_none,
            network_allow,
            ports,
            cpus,
            memory,
            agent_args,
        } => {
            let network = if network_isolated {
                NetworkRequest::Isolated
            } else if network_none {
                NetworkRequest::None
            } else {
                NetworkRequest::Unset
            };
            let opts = crate::manager::CreateOptions {
                name,
                agent: agent.unwrap_or_default(),
                model: model.unwrap_or_default(),
                backend: backend.unwrap_or_default(),
                profile: profile.unwrap_or_default(),
                workdir_arg: workdir.unwrap_or_default(),
                dir_args: dirs,
                prompt: prompt.unwrap_or_default(),
                prompt_file: prompt_file.unwrap_or_default(),
                replace,
                yes,
                no_start,
                network,
                network_allow,
                ports,
                cpus: cpus.unwrap_or_default(),
                memory: memory.unwrap_or_default(),
                passthrough_args: agent_args,
            };
            command::create::run(&paths, &cancel, opts)
        }
        Commands::Start { name, resume } => command::start::run(&paths, &cancel, &name, resume),
        Commands::Stop { name } => command::stop::run(&paths, &cancel, &name),
        Commands::Destroy { name, yes } => command::destroy::run(&paths, &cancel, &name, yes),
        Commands::Reset {
            name,
            clean,
            no_prompt,
            no_restart,
        } => command::reset::run(
            &paths,
            &cancel,
            &name,
            crate::manager::reset::ResetOptions {
                clean,
                no_prompt,
                no_restart,
            },
        ),
        Commands::Inspect { name, json } => command::inspect::run(&paths, &cancel, &name, json),
        Commands::List => command::list::run(&paths, &cancel),
        Commands::Config { action } => match action {
            ConfigAction::Get { key } => command::config::get(&paths, &key),
            ConfigAction::Set { assignments } => command::config::set(&paths, &assignments),
            ConfigAction::Delete { key } => command::config::delete(&paths, &key),
            ConfigAction::Show => command::config::show(&paths),
        },
        Commands::Setup { force } => command::setup::run(&paths, &cancel, force),
        Commands::PruneTemp {
            dry_run,
            max_age_secs,
        } => command::prune_temp::run(dry_run, max_age_secs),
        Commands::Completions { shell } => {
            let mut cmd = Cli::command();
            let name = cmd.get_name().to_string();
            generate(shell, &mut cmd, name, &mut std::io::stdout());
            Ok(())
        }
    }
}
