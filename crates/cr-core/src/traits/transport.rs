//! Transport trait

use async_trait::async_trait;
use futures::stream::BoxStream;
use tokio::sync::watch;

use crate::error::ConnectionError;
use crate::types::{ClientId, SessionState};
use cr_protocol::Envelope;

/// Stream of decoded inbound envelopes.
///
/// Lazy, unbounded and non-restartable; it ends when the connection closes.
pub type Inbound = BoxStream<'static, Envelope>;

/// Abstraction over one persistent bidirectional connection to the relay
#[async_trait]
pub trait Transport: Send + Sync + 'static {
    /// Identifier presented at connect time
    fn client_id(&self) -> &ClientId;

    /// Current lifecycle state
    fn state(&self) -> SessionState;

    /// Subscribe to lifecycle changes
    fn watch_state(&self) -> watch::Receiver<SessionState>;

    /// Queue an envelope for writing; returns once queued
    async fn send(&self, envelope: Envelope) -> Result<(), ConnectionError>;

    /// Take the inbound stream. Returns `None` after the first call.
    fn take_inbound(&self) -> Option<Inbound>;

    /// Close the connection. Idempotent; bounded by the transport's grace period.
    async fn close(&self) -> Result<(), ConnectionError>;
}
