//! JSON text codec for envelopes
//!
//! One WebSocket text frame holds one envelope. There is no length prefix
//! and no compression.

use serde_json::Value;

use crate::error::ProtocolError;
use crate::message::Envelope;

/// Maximum frame size accepted or produced (16 MiB)
pub const MAX_FRAME_SIZE: usize = 16 * 1024 * 1024;

/// Encode an envelope as a JSON text frame
pub fn encode(envelope: &Envelope) -> Result<String, ProtocolError> {
    let text = serde_json::to_string(envelope)?;
    if text.len() > MAX_FRAME_SIZE {
        return Err(ProtocolError::FrameTooLarge {
            size: text.len(),
            max: MAX_FRAME_SIZE,
        });
    }
    Ok(text)
}

/// Decode an envelope from raw frame bytes
pub fn decode(bytes: &[u8]) -> Result<Envelope, ProtocolError> {
    if bytes.len() > MAX_FRAME_SIZE {
        return Err(ProtocolError::FrameTooLarge {
            size: bytes.len(),
            max: MAX_FRAME_SIZE,
        });
    }
    let value: Value = serde_json::from_slice(bytes)?;
    Envelope::try_from(value)
}

/// Decode an envelope from a text frame
pub fn decode_str(text: &str) -> Result<Envelope, ProtocolError> {
    decode(text.as_bytes())
}
