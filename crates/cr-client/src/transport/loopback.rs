//! In-memory transport
//!
//! [`LoopbackTransport::pair`] returns a transport and the [`LoopbackPeer`]
//! playing the relay: it sees everything the client sends, can inject
//! inbound envelopes and can hang up. Useful for tests and for embedding a
//! driver without a network.

use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use futures::StreamExt;
use tokio::sync::{mpsc, watch};

use cr_core::error::ConnectionError;
use cr_core::traits::{Inbound, Transport};
use cr_core::{ClientId, SessionState, SessionStateCell};
use cr_protocol::Envelope;

/// Client side of an in-memory connection; starts `Active`
pub struct LoopbackTransport {
    client_id: ClientId,
    state: Arc<SessionStateCell>,
    to_peer: mpsc::UnboundedSender<Envelope>,
    inbound: Mutex<Option<Inbound>>,
}

/// Relay side of an in-memory connection
pub struct LoopbackPeer {
    from_client: mpsc::UnboundedReceiver<Envelope>,
    to_client: Option<mpsc::UnboundedSender<Envelope>>,
    state: Arc<SessionStateCell>,
}

impl LoopbackTransport {
    /// Create a connected transport/peer pair
    pub fn pair(client_id: impl Into<ClientId>) -> (Self, LoopbackPeer) {
        let state = Arc::new(SessionStateCell::new());
        state.transition(SessionState::Authenticated);
        state.transition(SessionState::Active);

        let (to_peer, from_client) = mpsc::unbounded_channel();
        let (to_client, inbound_rx) = mpsc::unbounded_channel();

        let transport = Self {
            client_id: client_id.into(),
            state: Arc::clone(&state),
            to_peer,
            inbound: Mutex::new(Some(inbound_stream(inbound_rx, state.subscribe()))),
        };
        let peer = LoopbackPeer {
            from_client,
            to_client: Some(to_client),
            state,
        };
        (transport, peer)
    }
}

/// Inbound envelopes until the peer hangs up or the session shuts down
fn inbound_stream(
    rx: mpsc::UnboundedReceiver<Envelope>,
    state_rx: watch::Receiver<SessionState>,
) -> Inbound {
    futures::stream::unfold((rx, state_rx), |(mut rx, mut state_rx)| async move {
        let next = tokio::select! {
            biased;
            envelope = rx.recv() => envelope,
            _ = state_rx.wait_for(|s| s.is_terminal()) => None,
        };
        next.map(|envelope| (envelope, (rx, state_rx)))
    })
    .boxed()
}

#[async_trait]
impl Transport for LoopbackTransport {
    fn client_id(&self) -> &ClientId {
        &self.client_id
    }

    fn state(&self) -> SessionState {
        self.state.get()
    }

    fn watch_state(&self) -> watch::Receiver<SessionState> {
        self.state.subscribe()
    }

    async fn send(&self, envelope: Envelope) -> Result<(), ConnectionError> {
        let state = self.state.get();
        if state != SessionState::Active {
            return Err(ConnectionError::Lost(format!("session is {}", state)));
        }
        self.to_peer
            .send(envelope)
            .map_err(|_| ConnectionError::Lost("peer dropped".to_string()))
    }

    fn take_inbound(&self) -> Option<Inbound> {
        self.inbound.lock().ok()?.take()
    }

    async fn close(&self) -> Result<(), ConnectionError> {
        self.state.close();
        Ok(())
    }
}

impl LoopbackPeer {
    /// Next envelope the client sent; `None` once the client side is gone
    pub async fn recv(&mut self) -> Option<Envelope> {
        self.from_client.recv().await
    }

    /// Envelope the client sent, if one is already waiting
    pub fn try_recv(&mut self) -> Option<Envelope> {
        self.from_client.try_recv().ok()
    }

    /// Deliver an envelope to the client. Returns false after a hang-up.
    pub fn push(&self, envelope: Envelope) -> bool {
        match &self.to_client {
            Some(tx) => tx.send(envelope).is_ok(),
            None => false,
        }
    }

    /// Current state of the client session
    pub fn state(&self) -> SessionState {
        self.state.get()
    }

    /// Close from the relay side, as a remote close frame would
    pub fn hang_up(&mut self) {
        self.to_client = None;
        self.state.close();
    }

    /// Drop the connection as a network failure would
    pub fn fail(&mut self) {
        self.to_client = None;
        self.state.transition(SessionState::Failed);
    }
}
