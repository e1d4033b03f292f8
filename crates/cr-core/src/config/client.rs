//! Client session configuration

use serde::{Deserialize, Serialize};
use std::time::Duration;

use cr_protocol::MessageType;

use super::backoff::BackoffConfig;
use super::serde_utils::duration_secs;
use super::MAX_DURATION;
use crate::error::ConfigError;
use crate::types::ClientId;

/// How replies are matched to requests
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum CorrelationMode {
    /// The next inbound envelope after a send is its reply.
    /// Requests are serialized so only one is ever outstanding.
    #[default]
    NextInbound,
    /// Requests carry `id`; only an envelope with a matching `replyTo` answers.
    Strict,
}

/// Configuration for one client session
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ClientConfig {
    /// Relay URL (`ws://` or `wss://`)
    pub url: String,

    /// Identifier sent as the `clientID` query parameter.
    /// A random `Client-<n>` is used when unset.
    pub client_id: Option<String>,

    /// Bearer credential sent in the `Authorization` header and in the login envelope
    pub credential: Option<String>,

    /// Value of the `from` field; defaults to the client ID
    pub sender: Option<String>,

    /// Value of the `to` field for driver traffic
    pub recipient: String,

    /// Subject prefix for driver traffic
    pub subject: String,

    /// Handshake timeout
    #[serde(with = "duration_secs")]
    pub connect_timeout: Duration,

    /// How long to wait for the login reply
    #[serde(with = "duration_secs")]
    pub login_timeout: Duration,

    /// How long to wait for each application reply
    #[serde(with = "duration_secs")]
    pub request_timeout: Duration,

    /// How long to wait for the logout reply
    #[serde(with = "duration_secs")]
    pub logout_timeout: Duration,

    /// Pause between traffic cycles
    #[serde(with = "duration_secs")]
    pub cycle_delay: Duration,

    /// Upper bound on a graceful close
    #[serde(with = "duration_secs")]
    pub close_grace: Duration,

    /// Number of traffic cycles; 0 runs until interrupted
    pub cycles: u32,

    /// Envelope types cycled through during the traffic phase
    pub traffic: Vec<MessageType>,

    /// Reply matching strategy
    pub correlation: CorrelationMode,

    /// Connection attempts made by the supervisor; 0 retries forever
    pub max_attempts: u32,

    /// Backoff used by the reconnecting supervisor
    pub backoff: BackoffConfig,
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self {
            url: "ws://localhost:7502/".to_string(),
            client_id: None,
            credential: None,
            sender: None,
            recipient: "server".to_string(),
            subject: "Test message".to_string(),
            connect_timeout: Duration::from_secs(45),
            login_timeout: Duration::from_secs(5),
            request_timeout: Duration::from_secs(5),
            logout_timeout: Duration::from_secs(5),
            cycle_delay: Duration::from_secs(1),
            close_grace: Duration::from_secs(5),
            cycles: 5,
            traffic: vec![MessageType::Msg, MessageType::Log, MessageType::Heartbeat],
            correlation: CorrelationMode::default(),
            max_attempts: 5,
            backoff: BackoffConfig::default(),
        }
    }
}

impl ClientConfig {
    /// Configured client ID, or a freshly generated random one
    pub fn resolve_client_id(&self) -> ClientId {
        self.client_id
            .clone()
            .map(ClientId::new)
            .unwrap_or_else(ClientId::random)
    }

    /// The `from` value for envelopes sent by `client_id`
    pub fn sender_for(&self, client_id: &ClientId) -> String {
        self.sender
            .clone()
            .unwrap_or_else(|| client_id.as_str().to_string())
    }

    /// Check the settings that would otherwise fail late
    pub fn validate(&self) -> Result<(), ConfigError> {
        if !(self.url.starts_with("ws://") || self.url.starts_with("wss://")) {
            return Err(ConfigError::Invalid(format!(
                "url must start with ws:// or wss://, got '{}'",
                self.url
            )));
        }
        if self.traffic.is_empty() {
            return Err(ConfigError::Invalid(
                "traffic must list at least one envelope type".to_string(),
            ));
        }
        if let Some(bad) = self
            .traffic
            .iter()
            .find(|t| matches!(t, MessageType::Login | MessageType::Logout))
        {
            return Err(ConfigError::Invalid(format!(
                "'{}' is a session envelope and cannot be used as traffic",
                bad
            )));
        }
        for (name, value) in [
            ("connect_timeout", self.connect_timeout),
            ("login_timeout", self.login_timeout),
            ("request_timeout", self.request_timeout),
            ("logout_timeout", self.logout_timeout),
        ] {
            if value.is_zero() {
                return Err(ConfigError::Invalid(format!("{} must be non-zero", name)));
            }
        }
        for (name, value) in [
            ("connect_timeout", self.connect_timeout),
            ("login_timeout", self.login_timeout),
            ("request_timeout", self.request_timeout),
            ("logout_timeout", self.logout_timeout),
            ("close_grace", self.close_grace),
            ("cycle_delay", self.cycle_delay),
            ("backoff.initial", self.backoff.initial),
            ("backoff.max", self.backoff.max),
        ] {
            if value > MAX_DURATION {
                return Err(ConfigError::Invalid(format!(
                    "{} must be at most {} seconds",
                    name,
                    MAX_DURATION.as_secs()
                )));
            }
        }
        for (name, value) in [
            ("backoff.multiplier", self.backoff.multiplier),
            ("backoff.jitter", self.backoff.jitter),
        ] {
            if !value.is_finite() {
                return Err(ConfigError::Invalid(format!(
                    "{} must be a finite number, got {}",
                    name, value
                )));
            }
        }
        Ok(())
    }
}
