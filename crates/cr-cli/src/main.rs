//! courier CLI
//!
//! Single binary for talking to a WebSocket message relay:
//! - `run`: login, a few cycles of traffic, logout
//! - `send`: one correlated request
//! - `swarm`: several clients messaging each other
//! - `config`: manage the configuration file

use std::path::PathBuf;
use std::time::Duration;

use anyhow::Result;
use clap::{Parser, Subcommand};
use tokio_util::sync::CancellationToken;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use courier::commands::{self, ConnectionArgs, SendOptions};
use cr_core::config::MAX_DURATION;

#[derive(Parser)]
#[command(name = "courier")]
#[command(author, version, about = "WebSocket message relay client")]
#[command(propagate_version = true)]
struct Cli {
    /// Path to configuration file
    #[arg(short, long, global = true)]
    config: Option<PathBuf>,

    /// Enable verbose output
    #[arg(short, long, global = true, action = clap::ArgAction::Count)]
    verbose: u8,

    /// Suppress all output except errors
    #[arg(short, long, global = true)]
    quiet: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Run a login / traffic / logout session
    Run {
        #[command(flatten)]
        connection: ConnectionArgs,
        /// Number of traffic cycles (0 = until interrupted)
        #[arg(long)]
        cycles: Option<u32>,
        /// Retry failed or dropped sessions with backoff
        #[arg(long)]
        reconnect: bool,
    },

    /// Send one envelope and print the reply
    Send {
        /// Envelope type (login, logout, msg, log, heartbeat, or any other string)
        #[arg(value_name = "TYPE")]
        message_type: String,
        /// Recipient (repeat for fan-out)
        #[arg(long)]
        to: Option<Vec<String>>,
        /// Subject line
        #[arg(long)]
        subject: Option<String>,
        /// Content, parsed as JSON when possible
        #[arg(long)]
        content: Option<String>,
        /// Seconds to wait for the reply
        #[arg(long, value_parser = parse_seconds)]
        timeout: Option<Duration>,
        #[command(flatten)]
        connection: ConnectionArgs,
    },

    /// Connect several clients that message each other
    Swarm {
        /// Number of clients
        #[arg(long)]
        clients: Option<u32>,
        /// Number of fan-out rounds (0 = until interrupted)
        #[arg(long)]
        ticks: Option<u32>,
        /// Seconds between rounds
        #[arg(long, value_parser = parse_seconds)]
        interval: Option<Duration>,
        /// Extra recipient added to every round
        #[arg(long)]
        extra: Option<String>,
        #[command(flatten)]
        connection: ConnectionArgs,
    },

    /// Manage configuration
    Config {
        #[command(subcommand)]
        action: ConfigAction,
    },
}

#[derive(Subcommand)]
enum ConfigAction {
    /// Show current configuration
    Show,
    /// Get specific config value
    Get { key: String },
    /// Set config value
    Set { key: String, value: String },
    /// Write a commented default configuration
    Init {
        /// Overwrite an existing file
        #[arg(long)]
        force: bool,
    },
    /// Show config file path
    Path,
}

fn parse_seconds(value: &str) -> Result<Duration, String> {
    let secs: f64 = value
        .parse()
        .map_err(|_| format!("'{}' is not a number of seconds", value))?;
    if !secs.is_finite() || secs < 0.0 {
        return Err(format!("'{}' must be a non-negative number of seconds", value));
    }
    match Duration::try_from_secs_f64(secs) {
        Ok(duration) if duration <= MAX_DURATION => Ok(duration),
        _ => Err(format!(
            "'{}' exceeds the maximum of {} seconds",
            value,
            MAX_DURATION.as_secs()
        )),
    }
}

/// Cancel `token` on Ctrl+C or SIGTERM
fn spawn_signal_handler(token: CancellationToken) {
    tokio::spawn(async move {
        let ctrl_c = tokio::signal::ctrl_c();

        #[cfg(unix)]
        let terminate = async {
            match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
                Ok(mut sig) => {
                    sig.recv().await;
                }
                Err(e) => {
                    tracing::warn!("Failed to install SIGTERM handler: {}", e);
                    std::future::pending::<()>().await;
                }
            }
        };

        #[cfg(not(unix))]
        let terminate = std::future::pending::<()>();

        tokio::select! {
            _ = ctrl_c => {
                tracing::info!("Received Ctrl+C, initiating shutdown...");
            }
            _ = terminate => {
                tracing::info!("Received SIGTERM, initiating shutdown...");
            }
        }

        token.cancel();
    });
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    // Setup logging based on verbosity
    let log_level = match (cli.quiet, cli.verbose) {
        (true, _) => "error",
        (false, 0) => "warn",
        (false, 1) => "info",
        (false, 2) => "debug",
        (false, _) => "trace",
    };

    tracing_subscriber::registry()
        .with(tracing_subscriber::EnvFilter::new(
            std::env::var("RUST_LOG").unwrap_or_else(|_| log_level.into()),
        ))
        .with(tracing_subscriber::fmt::layer().with_target(false))
        .init();

    let shutdown = CancellationToken::new();

    match cli.command {
        Commands::Run {
            connection,
            cycles,
            reconnect,
        } => {
            let mut config = commands::load_config_file(cli.config.as_ref())?.client;
            connection.apply(&mut config);
            if let Some(cycles) = cycles {
                config.cycles = cycles;
            }

            spawn_signal_handler(shutdown.clone());
            commands::run_command(config, reconnect, shutdown).await?;
        }

        Commands::Send {
            message_type,
            to,
            subject,
            content,
            timeout,
            connection,
        } => {
            let mut config = commands::load_config_file(cli.config.as_ref())?.client;
            connection.apply(&mut config);

            let options = SendOptions {
                message_type,
                to,
                subject,
                content,
                timeout,
            };

            spawn_signal_handler(shutdown.clone());
            commands::send_command(config, options, shutdown).await?;
        }

        Commands::Swarm {
            clients,
            ticks,
            interval,
            extra,
            connection,
        } => {
            let file = commands::load_config_file(cli.config.as_ref())?;
            let mut client = file.client;
            let mut swarm = file.swarm;
            connection.apply(&mut client);
            if let Some(clients) = clients {
                swarm.clients = clients;
            }
            if let Some(ticks) = ticks {
                swarm.ticks = ticks;
            }
            if let Some(interval) = interval {
                swarm.interval = interval;
            }
            if extra.is_some() {
                swarm.extra_recipient = extra;
            }

            spawn_signal_handler(shutdown.clone());
            commands::swarm_command(client, swarm, shutdown).await?;
        }

        Commands::Config { action } => match action {
            ConfigAction::Show => {
                commands::config_show(cli.config.as_ref())?;
            }
            ConfigAction::Get { key } => {
                commands::config_get(cli.config.as_ref(), &key)?;
            }
            ConfigAction::Set { key, value } => {
                commands::config_set(cli.config.as_ref(), &key, &value)?;
            }
            ConfigAction::Init { force } => {
                commands::config_init(cli.config.as_ref(), force)?;
            }
            ConfigAction::Path => {
                commands::config_path(cli.config.as_ref())?;
            }
        },
    }

    Ok(())
}
