//! Core trait definitions

mod transport;

pub use transport::{Inbound, Transport};
