//! cr-protocol: Envelope wire format for the courier session protocol
//!
//! This crate defines the JSON envelope exchanged between a courier client
//! and the relay over a WebSocket connection. Each text frame carries exactly
//! one envelope; there is no additional framing.

pub mod codec;
pub mod correlation;
pub mod error;
pub mod message;

pub use codec::{decode, decode_str, encode, MAX_FRAME_SIZE};
pub use correlation::{CorrelationId, CorrelationIdGenerator};
pub use error::ProtocolError;
pub use message::{Envelope, MessageType, Recipient};
