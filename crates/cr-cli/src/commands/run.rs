//! `courier run`: one full login / traffic / logout session

use std::sync::Arc;

use anyhow::{Context, Result};
use tokio_util::sync::CancellationToken;

use cr_client::{Connector, SessionDriver, Supervisor};
use cr_core::config::ClientConfig;
use cr_core::error::SessionError;

use crate::output::{format_report, print_error, print_info, print_success, print_warning};

/// Run a session and print its report.
///
/// With `reconnect`, failed or dropped sessions are retried with backoff.
pub async fn run_command(
    config: ClientConfig,
    reconnect: bool,
    shutdown: CancellationToken,
) -> Result<()> {
    print_info(&format!("Connecting to {}", config.url));

    let result = if reconnect {
        Supervisor::new(config)
            .context("Invalid configuration")?
            .run(shutdown)
            .await
    } else {
        let connector = Connector::new(config.clone()).context("Invalid configuration")?;
        match connector.connect().await {
            Ok(transport) => {
                SessionDriver::new(Arc::new(transport), config)
                    .run(shutdown)
                    .await
            }
            Err(e) => Err(SessionError::Connect(e)),
        }
    };

    match result {
        Ok(report) => {
            println!("{}", format_report(&report));
            if report.timeouts > 0 || !report.logout_confirmed {
                print_warning("Session finished with unanswered requests");
            } else {
                print_success("Session complete");
            }
            Ok(())
        }
        Err(SessionError::ConnectionLost { report }) => {
            println!("{}", format_report(&report));
            print_error("Connection lost during the session");
            anyhow::bail!("Connection lost after {} envelope(s)", report.sent)
        }
        Err(e) => Err(e.into()),
    }
}
