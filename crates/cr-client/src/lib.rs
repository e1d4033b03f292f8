//! cr-client: Session engine for courier
//!
//! This crate turns a relay connection into a usable client session:
//! - WebSocket transport with an owned I/O task ([`transport`])
//! - Request/reply correlation with deadlines ([`request`])
//! - Login, traffic cycles and logout ([`driver`])
//! - Reconnecting supervision ([`supervisor`]) and multi-client fan-out ([`swarm`])

pub mod driver;
pub mod reconnect;
pub mod request;
pub mod supervisor;
pub mod swarm;
pub mod transport;

pub use driver::SessionDriver;
pub use reconnect::ExponentialBackoff;
pub use request::RequestEngine;
pub use supervisor::Supervisor;
pub use swarm::{Swarm, SwarmClientStats, SwarmReport};
pub use transport::{Connector, LoopbackPeer, LoopbackTransport, WsTransport};
