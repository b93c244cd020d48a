use chrono::{DateTime, Utc};
use cgm_scaling::TimeHorizon;
use clap::{Parser, Subcommand, ValueHint};
use std::path::PathBuf;

#[derive(Parser, Debug)]
#[command(name = "cgm", author, version, about, long_about = None)]
pub struct Cli {
    /// Set the logging level
    #[arg(long, default_value = "info")]
    pub log_level: tracing::Level,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Show the island/area partition of a merged snapshot
    Areas {
        /// Snapshot JSON file
        #[arg(value_hint = ValueHint::FilePath)]
        snapshot: PathBuf,
        /// Islands with fewer buses are ignored
        #[arg(long, default_value_t = 2)]
        min_buses: usize,
    },
    /// Balancing configuration utilities
    Config {
        #[command(subcommand)]
        command: ConfigCommands,
    },
    /// Resolve the schedule targets that apply at an instant
    Targets {
        /// Schedule store (JSON)
        #[arg(long, value_hint = ValueHint::FilePath)]
        schedules: PathBuf,
        /// Horizon code: 1D, 2D, ID, WK, MO or YR
        #[arg(long)]
        horizon: TimeHorizon,
        /// Instant in RFC 3339, e.g. 2024-05-01T10:30:00Z
        #[arg(long)]
        at: DateTime<Utc>,
    },
    /// Summarise a stored balancing outcome
    Report {
        /// Outcome JSON written by the balancing engine
        #[arg(value_hint = ValueHint::FilePath)]
        outcome: PathBuf,
    },
}

#[derive(Subcommand, Debug)]
pub enum ConfigCommands {
    /// Parse and validate a balancing config (TOML, YAML or JSON)
    Check {
        #[arg(value_hint = ValueHint::FilePath)]
        file: PathBuf,
    },
}
