//! Reconnecting supervisor
//!
//! Repeats connect + drive with exponential backoff when a session attempt
//! fails or loses its connection. Authentication failures and invalid
//! configuration end supervision immediately.

use std::sync::Arc;

use tokio_util::sync::CancellationToken;

use cr_core::config::ClientConfig;
use cr_core::error::{ConfigError, SessionError};
use cr_core::SessionReport;

use crate::driver::SessionDriver;
use crate::reconnect::ExponentialBackoff;
use crate::transport::Connector;

/// Runs sessions until one completes or retrying stops making sense
pub struct Supervisor {
    connector: Connector,
}

impl Supervisor {
    /// Create a supervisor for `config`
    pub fn new(config: ClientConfig) -> Result<Self, ConfigError> {
        Ok(Self {
            connector: Connector::new(config)?,
        })
    }

    /// Get the client configuration
    pub fn config(&self) -> &ClientConfig {
        self.connector.config()
    }

    /// Drive sessions until one reaches logout.
    ///
    /// The client ID is resolved once so every attempt presents the same one.
    /// Gives up after `max_attempts` attempts (0 = never), on a
    /// non-retryable error, or when `shutdown` is cancelled.
    pub async fn run(&self, shutdown: CancellationToken) -> Result<SessionReport, SessionError> {
        let config = self.connector.config();
        let client_id = config.resolve_client_id();
        let mut backoff = ExponentialBackoff::from_config(&config.backoff);
        let mut attempt: u32 = 0;

        loop {
            attempt += 1;
            tracing::debug!("Client {}: session attempt {}", client_id, attempt);

            let result = match self.connector.connect_as(client_id.clone()).await {
                Ok(transport) => {
                    backoff.reset();
                    SessionDriver::new(Arc::new(transport), config.clone())
                        .run(shutdown.clone())
                        .await
                }
                Err(e) => Err(SessionError::Connect(e)),
            };

            let err = match result {
                Ok(report) => return Ok(report),
                Err(e) => e,
            };

            if !err.is_retryable() {
                tracing::error!("Client {}: {} (not retrying)", client_id, err);
                return Err(err);
            }
            if shutdown.is_cancelled() {
                return Err(err);
            }
            if config.max_attempts != 0 && attempt >= config.max_attempts {
                tracing::error!(
                    "Client {}: giving up after {} attempt(s): {}",
                    client_id,
                    attempt,
                    err
                );
                return Err(err);
            }

            let delay = backoff.next_delay();
            tracing::warn!(
                "Client {}: {}. Retrying in {:?}",
                client_id,
                err,
                delay
            );
            tokio::select! {
                _ = tokio::time::sleep(delay) => {}
                _ = shutdown.cancelled() => return Err(err),
            }
        }
    }
}
