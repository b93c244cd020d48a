use std::fs;
use std::io::{self, Write};
use std::path::Path;

use anyhow::{Context, Result};
use cgm_core::Megawatts;
use cgm_scaling::ScalingOutcome;
use tabwriter::TabWriter;

fn mw(value: Option<Megawatts>) -> String {
    value.map_or("-".to_string(), |v| format!("{:.3}", v.value()))
}

pub fn handle(path: &Path) -> Result<()> {
    let content =
        fs::read_to_string(path).with_context(|| format!("reading {}", path.display()))?;
    let outcome: ScalingOutcome = serde_json::from_str(&content)
        .with_context(|| format!("parsing outcome {}", path.display()))?;

    println!("{}", outcome.summary());

    if !outcome.areas.is_empty() {
        let mut writer = TabWriter::new(io::stdout());
        writeln!(writer, "AREA\tTARGET\tINITIAL OFFSET\tFINAL OFFSET\tOK")?;
        for (area, result) in &outcome.areas {
            writeln!(
                writer,
                "{area}\t{:.3}\t{}\t{}\t{}",
                result.target.value(),
                mw(result.initial_offset),
                mw(result.final_offset),
                if result.success { "yes" } else { "no" }
            )?;
        }
        writer.flush()?;
    }

    if !outcome.dc_links.is_empty() {
        let mut writer = TabWriter::new(io::stdout());
        writeln!(writer, "DC LINK\tRESOURCE\tSETPOINT\tTARGET\tFLOW\tOK")?;
        for link in &outcome.dc_links {
            writeln!(
                writer,
                "{}\t{}\t{:.3}\t{}\t{:.3}\t{}",
                link.name,
                link.resource_id.as_deref().unwrap_or("-"),
                link.post_setpoint.value(),
                mw(link.target),
                link.post_flow.value(),
                if link.success { "yes" } else { "no" }
            )?;
        }
        writer.flush()?;
    }

    for issue in &outcome.diagnostics.issues {
        println!("{issue}");
    }
    Ok(())
}
