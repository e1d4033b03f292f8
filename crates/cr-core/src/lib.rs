//! cr-core: Core abstractions and configuration for courier
//!
//! This crate provides the shared types, the transport trait, the error
//! taxonomy and the configuration structures used by the client library
//! and the CLI.

pub mod config;
pub mod error;
pub mod state;
pub mod time;
pub mod traits;
pub mod types;

pub use state::SessionStateCell;
pub use types::{ClientId, SessionReport, SessionState};
