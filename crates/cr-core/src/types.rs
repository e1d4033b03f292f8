//! Core domain types

use serde::{Deserialize, Serialize};
use std::fmt;
use std::time::Duration;

/// Identifier a client presents to the relay via the `clientID` query parameter
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ClientId(pub String);

impl ClientId {
    /// Create a new client ID
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    /// Random ID of the form `Client-<n>`, n in 0..1000
    pub fn random() -> Self {
        Self(format!("Client-{}", rand::random::<u16>() % 1000))
    }

    /// Get the raw ID string
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for ClientId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<String> for ClientId {
    fn from(s: String) -> Self {
        Self(s)
    }
}

impl From<&str> for ClientId {
    fn from(s: &str) -> Self {
        Self(s.to_string())
    }
}

/// Lifecycle state of a transport session
///
/// ```text
/// Connecting -> Authenticated -> Active -> Closing -> Closed
///      \              \             \          \
///       `--------------`-------------`----------`--> Failed
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum SessionState {
    /// Handshake in progress
    Connecting,
    /// Handshake accepted
    Authenticated,
    /// Ready for application traffic
    Active,
    /// Shutdown initiated by either side
    Closing,
    /// Connection released
    Closed,
    /// Connection failed
    Failed,
}

impl SessionState {
    /// Whether the state machine allows moving from `self` to `next`
    pub fn can_transition_to(self, next: SessionState) -> bool {
        use SessionState::*;
        match (self, next) {
            (Closed | Failed, _) => false,
            (_, Failed) => true,
            (Connecting, Authenticated) => true,
            (Authenticated, Active | Closing) => true,
            (Active, Closing) => true,
            (Closing, Closed) => true,
            _ => false,
        }
    }

    /// Closed or Failed
    pub fn is_terminal(self) -> bool {
        matches!(self, SessionState::Closed | SessionState::Failed)
    }

    /// Closing, Closed or Failed: no more application traffic
    pub fn is_shutting_down(self) -> bool {
        matches!(
            self,
            SessionState::Closing | SessionState::Closed | SessionState::Failed
        )
    }
}

impl fmt::Display for SessionState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SessionState::Connecting => write!(f, "connecting"),
            SessionState::Authenticated => write!(f, "authenticated"),
            SessionState::Active => write!(f, "active"),
            SessionState::Closing => write!(f, "closing"),
            SessionState::Closed => write!(f, "closed"),
            SessionState::Failed => write!(f, "failed"),
        }
    }
}

/// Outcome of one driven session
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SessionReport {
    /// Client this report belongs to
    pub client_id: ClientId,
    /// Whether the login exchange got a reply
    pub logged_in: bool,
    /// Application envelopes sent during the traffic phase
    pub sent: u32,
    /// Replies received during the traffic phase
    pub replies: u32,
    /// Requests that timed out during the traffic phase
    pub timeouts: u32,
    /// Inbound envelopes that matched no request
    pub unsolicited: u32,
    /// Whether the logout exchange got a reply
    pub logout_confirmed: bool,
    /// Transport state when the driver returned
    pub final_state: SessionState,
    /// Wall-clock duration of the session
    pub elapsed: Duration,
}

impl SessionReport {
    /// Empty report for a session that is just starting
    pub fn new(client_id: ClientId) -> Self {
        Self {
            client_id,
            logged_in: false,
            sent: 0,
            replies: 0,
            timeouts: 0,
            unsolicited: 0,
            logout_confirmed: false,
            final_state: SessionState::Connecting,
            elapsed: Duration::ZERO,
        }
    }
}
