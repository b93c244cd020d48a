use std::io::{self, Write};
use std::path::Path;

use anyhow::{Context, Result};
use cgm_scaling::{resolve_ac_targets, ScheduleSource, StaticSchedules, TimeHorizon};
use chrono::{DateTime, Utc};
use tabwriter::TabWriter;
use tracing::{info, warn};

pub fn handle(schedules: &Path, horizon: TimeHorizon, at: DateTime<Utc>) -> Result<()> {
    let source = StaticSchedules::load_from_path(schedules)
        .with_context(|| format!("loading schedules {}", schedules.display()))?;
    let ac = source.ac_targets(horizon, at)?;
    let dc = source.dc_targets(horizon, at)?;
    info!(ac_rows = ac.len(), dc_rows = dc.len(), "schedules for {horizon} at {at}");

    if ac.is_empty() {
        warn!("no AC schedule published for {horizon} at {at}");
        println!("AC schedule unavailable");
    } else {
        let mut writer = TabWriter::new(io::stdout());
        writeln!(writer, "AREA\tNET POSITION (MW)")?;
        for (area, target) in resolve_ac_targets(&ac) {
            writeln!(writer, "{area}\t{:.3}", target.value())?;
        }
        writer.flush()?;
    }

    if dc.is_empty() {
        println!("DC schedule unavailable");
        return Ok(());
    }
    let mut writer = TabWriter::new(io::stdout());
    writeln!(writer, "RESOURCE\tOUT\tIN\tVALUE (MW)")?;
    for row in &dc {
        writeln!(
            writer,
            "{}\t{}\t{}\t{:.3}",
            row.registered_resource,
            row.out_domain.as_ref().map_or("-".to_string(), |a| a.to_string()),
            row.in_domain.as_ref().map_or("-".to_string(), |a| a.to_string()),
            row.value
        )?;
    }
    writer.flush()?;
    Ok(())
}
