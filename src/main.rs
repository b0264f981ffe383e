use anyhow::Result;
use tracing::{error, info};

use taskbox::{cli, errors, logger};

fn main() {
    if let Err(err) = logger::init() {
        eprintln!("taskbox: failed to initialize logging: {err}");
    }
    info!(args = ?std::env::args().collect::<Vec<_>>(), "taskbox start");

    match run() {
        Ok(()) => {
            info!("taskbox finished successfully");
        }
        Err(err) => {
            if errors::is_sentinel(&err, errors::Sentinel::Cancelled) {
                info!("taskbox cancelled by user");
                std::process::exit(1);
            }
            error!(error = ?err, "taskbox failed");
            eprintln!("taskbox: {err:#}");
            std::process::exit(errors::exit_code(&err));
        }
    }
}

fn run() -> Result<()> {
    cli::run()
}
