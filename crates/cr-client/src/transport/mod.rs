//! Transport implementations
//!
//! [`WsTransport`] speaks to a real relay over WebSocket; [`LoopbackTransport`]
//! is an in-memory stand-in driven by a [`LoopbackPeer`].

mod connector;
pub mod loopback;

pub use connector::{build_request, Connector, WsTransport};
pub use loopback::{LoopbackPeer, LoopbackTransport};

/// Channel capacity for envelopes queued towards the socket writer.
///
/// Sends return once an envelope is in this queue, so it bounds how far a
/// caller can run ahead of a slow socket before `send` starts waiting.
const OUTBOUND_CHANNEL_CAPACITY: usize = 256;
