//! Island/area partition of a snapshot, as the balancing engine would see it.

use std::io::{self, Write};
use std::path::Path;

use anyhow::{Context, Result};
use cgm_core::{
    load_snapshot, CgmError, CgmResult, ComponentLabels, ComponentSolution, GridModel, Network,
    NetworkModel, PowerFlowOracle,
};
use cgm_scaling::{partition_areas, ComponentState};
use tabwriter::TabWriter;
use tracing::info;

/// Stands in for a solver when only topology is needed.
struct TopologyOnly;

impl PowerFlowOracle for TopologyOnly {
    fn solve(&mut self, _: &mut Network, _: &ComponentLabels) -> CgmResult<Vec<ComponentSolution>> {
        Err(CgmError::Solver(
            "topology inspection does not run a power flow".to_string(),
        ))
    }
}

pub fn handle(snapshot: &Path, min_buses: usize) -> Result<()> {
    let network = load_snapshot(snapshot)
        .with_context(|| format!("loading snapshot {}", snapshot.display()))?;
    let model = GridModel::new(network, TopologyOnly);
    let partition = partition_areas(&model, min_buses);
    info!(
        islands = model.labels().islands().len(),
        kept = partition.components().count(),
        "partitioned {}",
        snapshot.display()
    );

    let main = model.main_component();
    let mut writer = TabWriter::new(io::stdout());
    writeln!(writer, "COMPONENT\tBUSES\tSTATE\tAREA\tWEIGHT")?;
    for component in partition.components() {
        let state = match component.state {
            ComponentState::Valid => "valid",
            ComponentState::Internal => "internal",
            ComponentState::Diverged => "diverged",
        };
        let label = if Some(component.id) == main {
            format!("{} (main)", component.id)
        } else {
            component.id.to_string()
        };
        if component.areas.is_empty() {
            writeln!(writer, "{label}\t{}\t{state}\t-\t-", component.bus_count)?;
        }
        for area in &component.areas {
            writeln!(
                writer,
                "{label}\t{}\t{state}\t{area}\t{:.3}",
                component.bus_count,
                partition.weight(area, component.id)
            )?;
        }
    }
    writer.flush()?;

    let fragmented = partition.fragmented_areas();
    if fragmented.is_empty() {
        println!("fragmented areas: none");
    } else {
        let codes: Vec<String> = fragmented.iter().map(|a| a.to_string()).collect();
        println!("fragmented areas: {}", codes.join(", "));
    }
    Ok(())
}
