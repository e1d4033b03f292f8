//! Protocol error types

use thiserror::Error;

/// Errors that can occur while encoding or decoding envelopes
#[derive(Error, Debug)]
pub enum ProtocolError {
    /// Payload is not valid JSON
    #[error("Malformed frame: {0}")]
    Malformed(#[from] serde_json::Error),

    /// Payload is valid JSON but not an object
    #[error("Frame is not a JSON object")]
    NotAnObject,

    /// The mandatory `type` field is absent or null
    #[error("Envelope is missing the 'type' field")]
    MissingType,

    /// The `type` field is present but not a string
    #[error("Invalid envelope type: {0}")]
    InvalidType(String),

    /// Frame exceeds the maximum size
    #[error("Frame too large: {size} bytes exceeds maximum of {max} bytes")]
    FrameTooLarge { size: usize, max: usize },
}
