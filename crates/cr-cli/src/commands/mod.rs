//! CLI command implementations

mod config;
mod run;
mod send;
mod swarm;

pub use config::{config_get, config_init, config_path, config_set, config_show};
pub use run::run_command;
pub use send::{send_command, SendOptions};
pub use swarm::swarm_command;

use std::path::PathBuf;

use anyhow::{Context, Result};
use clap::Args;

use cr_core::config::{self as core_config, ClientConfig, ConfigFile, CorrelationMode};

/// Connection options shared by every command that talks to a relay
#[derive(Debug, Clone, Default, Args)]
pub struct ConnectionArgs {
    /// Relay URL (ws:// or wss://)
    #[arg(long, env = "COURIER_URL")]
    pub url: Option<String>,

    /// Client ID sent as the clientID query parameter
    #[arg(long, env = "COURIER_CLIENT_ID")]
    pub client_id: Option<String>,

    /// Bearer credential for the handshake and the login envelope
    #[arg(long, env = "COURIER_TOKEN", hide_env_values = true)]
    pub token: Option<String>,

    /// Match replies by id/replyTo instead of taking the next inbound envelope
    #[arg(long)]
    pub strict: bool,
}

impl ConnectionArgs {
    /// Overlay command-line values on the file configuration
    pub fn apply(&self, config: &mut ClientConfig) {
        if let Some(url) = &self.url {
            config.url = url.clone();
        }
        if let Some(client_id) = &self.client_id {
            config.client_id = Some(client_id.clone());
        }
        if let Some(token) = &self.token {
            config.credential = Some(token.clone());
        }
        if self.strict {
            config.correlation = CorrelationMode::Strict;
        }
    }
}

/// Load the configuration file, falling back to defaults.
///
/// An explicit `--config` path must exist and parse; the default path is
/// optional and a broken default file only produces a warning.
pub fn load_config_file(config_path: Option<&PathBuf>) -> Result<ConfigFile> {
    if let Some(path) = config_path {
        return core_config::load_config(path)
            .with_context(|| format!("Failed to load config from {:?}", path));
    }

    let default_path = core_config::default_config_path();
    if !default_path.exists() {
        tracing::debug!("Using default configuration");
        return Ok(ConfigFile::default());
    }

    Ok(core_config::load_config(&default_path).unwrap_or_else(|e| {
        tracing::warn!("Failed to load config from {:?}: {}", default_path, e);
        ConfigFile::default()
    }))
}
