//! `courier swarm`: several clients fanning messages out to each other

use anyhow::{Context, Result};
use tokio_util::sync::CancellationToken;

use cr_client::Swarm;
use cr_core::config::{ClientConfig, SwarmConfig};

use crate::output::{format_swarm, print_info, print_success};

/// Run the swarm and print per-client counters
pub async fn swarm_command(
    client: ClientConfig,
    swarm: SwarmConfig,
    shutdown: CancellationToken,
) -> Result<()> {
    print_info(&format!(
        "Starting {} client(s) against {}",
        swarm.clients, client.url
    ));

    let report = Swarm::new(client, swarm)
        .context("Invalid configuration")?
        .run(shutdown)
        .await
        .context("No client could connect")?;

    println!("{}", format_swarm(&report));
    print_success(&format!(
        "{} tick(s): {} sent, {} received",
        report.ticks,
        report.total_sent(),
        report.total_received()
    ));
    Ok(())
}
