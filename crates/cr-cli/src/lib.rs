//! courier: command-line client for WebSocket message relays
//!
//! Provides the `courier` binary for running scripted sessions,
//! sending one-off requests and driving multi-client fan-out.

pub mod commands;
pub mod output;
