//! Core error types for courier

use cr_protocol::ProtocolError;
use std::path::PathBuf;
use std::time::Duration;
use thiserror::Error;

use crate::types::SessionReport;

/// Connection-related errors
#[derive(Error, Debug)]
pub enum ConnectionError {
    /// The configured URL could not be used
    #[error("Invalid URL: {0}")]
    InvalidUrl(String),

    /// DNS, TCP or TLS failure before the handshake completed
    #[error("Connection refused: {0}")]
    Refused(String),

    /// The relay refused the credential (HTTP 401/403)
    #[error("Authentication failed (HTTP {status})")]
    AuthenticationFailed { status: u16 },

    /// The relay refused the upgrade for another reason
    #[error("Handshake rejected (HTTP {status})")]
    Rejected { status: u16 },

    /// Handshake did not complete in time
    #[error("Connection timed out after {0:?}")]
    Timeout(Duration),

    /// Connection is no longer usable
    #[error("Connection lost: {0}")]
    Lost(String),

    /// Envelope could not be encoded
    #[error("Encode error: {0}")]
    Encode(#[from] ProtocolError),
}

impl ConnectionError {
    /// Whether a supervisor may retry after this error
    pub fn is_retryable(&self) -> bool {
        !matches!(
            self,
            ConnectionError::AuthenticationFailed { .. }
                | ConnectionError::InvalidUrl(_)
                | ConnectionError::Encode(_)
        )
    }
}

/// Errors resolving a correlated request
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum RequestError {
    /// No reply arrived before the deadline
    #[error("No reply within {timeout:?}")]
    Timeout { timeout: Duration },

    /// The transport ended before a reply arrived
    #[error("Connection lost")]
    ConnectionLost,
}

/// Errors ending a driven session
#[derive(Error, Debug)]
pub enum SessionError {
    /// Connecting failed
    #[error("Connect failed: {0}")]
    Connect(#[from] ConnectionError),

    /// Login got no reply or the connection dropped during login
    #[error("Login failed: {0}")]
    LoginFailed(#[source] RequestError),

    /// The connection dropped during the traffic phase
    #[error("Connection lost after {} envelope(s)", .report.sent)]
    ConnectionLost { report: Box<SessionReport> },
}

impl SessionError {
    /// Whether a supervisor may retry after this error
    pub fn is_retryable(&self) -> bool {
        match self {
            SessionError::Connect(e) => e.is_retryable(),
            SessionError::LoginFailed(_) | SessionError::ConnectionLost { .. } => true,
        }
    }
}

/// Configuration-related errors
#[derive(Error, Debug)]
pub enum ConfigError {
    /// Config file not found
    #[error("Config file not found: {0}")]
    NotFound(PathBuf),

    /// Invalid configuration
    #[error("Invalid config: {0}")]
    Invalid(String),

    /// TOML parse error
    #[error("TOML parse error: {0}")]
    Parse(#[from] toml::de::Error),

    /// TOML serialize error
    #[error("TOML serialize error: {0}")]
    Serialize(#[from] toml::ser::Error),
}
