use std::io;
use std::process::ExitCode;

use cgm_cli::{Cli, Commands};
use clap::Parser;
use tracing::{debug, error};
use tracing_subscriber::FmtSubscriber;

mod commands;

fn main() -> ExitCode {
    let cli = Cli::parse();

    let subscriber = FmtSubscriber::builder()
        .with_max_level(cli.log_level)
        .with_writer(io::stderr)
        .finish();
    if let Err(err) = tracing::subscriber::set_global_default(subscriber) {
        eprintln!("could not install log subscriber: {err}");
    }

    debug!(command = ?cli.command, "starting cgm");

    let result = match &cli.command {
        Commands::Areas {
            snapshot,
            min_buses,
        } => commands::areas::handle(snapshot, *min_buses),
        Commands::Config { command } => commands::config::handle(command),
        Commands::Targets {
            schedules,
            horizon,
            at,
        } => commands::targets::handle(schedules, *horizon, *at),
        Commands::Report { outcome } => commands::report::handle(outcome),
    };

    match result {
        Ok(()) => ExitCode::SUCCESS,
        Err(err) => {
            error!("{err:#}");
            ExitCode::FAILURE
        }
    }
}
