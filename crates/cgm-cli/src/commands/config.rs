use std::io::{self, Write};
use std::path::Path;

use anyhow::{Context, Result};
use cgm_scaling::BalanceConfig;
use tabwriter::TabWriter;

use cgm_cli::ConfigCommands;

pub fn handle(command: &ConfigCommands) -> Result<()> {
    match command {
        ConfigCommands::Check { file } => handle_check(file),
    }
}

fn handle_check(file: &Path) -> Result<()> {
    let config = BalanceConfig::load_from_path(file)
        .with_context(|| format!("checking config {}", file.display()))?;

    let mut writer = TabWriter::new(io::stdout());
    writeln!(writer, "OPTION\tVALUE")?;
    writeln!(writer, "max_iteration\t{}", config.max_iteration)?;
    writeln!(writer, "balance_threshold\t{}", config.balance_threshold)?;
    writeln!(writer, "constant_power_factor\t{}", config.constant_power_factor)?;
    writeln!(writer, "power_factor_threshold\t{}", config.power_factor_threshold)?;
    writeln!(writer, "min_component_buses\t{}", config.min_component_buses)?;
    writer.flush()?;
    println!("{} is valid", file.display());
    Ok(())
}
