//! Multi-client fan-out runner
//!
//! Connects several independent sessions to one relay. On every tick a
//! random connected client sends a `msg` addressed to all the others, and
//! every client counts what it receives. Handy for exercising a relay's
//! routing under concurrent connections.

use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::Arc;
use std::time::Duration;

use futures::StreamExt;
use rand::Rng;
use serde::Serialize;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

use cr_core::config::{ClientConfig, SwarmConfig};
use cr_core::error::{ConfigError, ConnectionError};
use cr_core::time::current_time_millis;
use cr_core::traits::Transport;
use cr_core::{ClientId, SessionState};
use cr_protocol::{Envelope, MessageType};

use crate::transport::{Connector, WsTransport};

/// Floor for the tick period; a zero interval would spin
const MIN_INTERVAL: Duration = Duration::from_millis(1);

/// Per-client counters after a swarm run
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct SwarmClientStats {
    pub client_id: ClientId,
    /// Fan-out envelopes this client sent
    pub sent: u32,
    /// Envelopes this client received
    pub received: u32,
    /// Transport state at the end of the run
    pub final_state: SessionState,
}

/// Outcome of a swarm run
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct SwarmReport {
    /// Ticks that elapsed
    pub ticks: u32,
    /// Clients that connected, in connection order
    pub clients: Vec<SwarmClientStats>,
}

impl SwarmReport {
    pub fn total_sent(&self) -> u32 {
        self.clients.iter().map(|c| c.sent).sum()
    }

    pub fn total_received(&self) -> u32 {
        self.clients.iter().map(|c| c.received).sum()
    }
}

struct Member {
    transport: Arc<WsTransport>,
    sent: u32,
    received: Arc<AtomicU32>,
    reader: Option<JoinHandle<()>>,
}

impl Member {
    fn start(transport: WsTransport) -> Self {
        let transport = Arc::new(transport);
        let received = Arc::new(AtomicU32::new(0));

        let reader = transport.take_inbound().map(|mut inbound| {
            let id = transport.client_id().clone();
            let counter = Arc::clone(&received);
            tokio::spawn(async move {
                while let Some(envelope) = inbound.next().await {
                    counter.fetch_add(1, Ordering::Relaxed);
                    tracing::debug!(
                        "{} received {} from {}: {}",
                        id,
                        envelope.message_type,
                        envelope.from,
                        envelope.content
                    );
                }
            })
        });

        Self {
            transport,
            sent: 0,
            received,
            reader,
        }
    }

    fn id(&self) -> &ClientId {
        self.transport.client_id()
    }
}

/// Runs a group of clients against one relay
pub struct Swarm {
    connector: Connector,
    config: SwarmConfig,
}

impl Swarm {
    /// Create a swarm; `client` supplies URL, credential and timeouts
    pub fn new(client: ClientConfig, config: SwarmConfig) -> Result<Self, ConfigError> {
        Ok(Self {
            connector: Connector::new(client)?,
            config,
        })
    }

    /// Connect, fan out for the configured number of ticks, then disconnect.
    ///
    /// Individual connection failures are logged and skipped; the run fails
    /// only when no client could connect at all.
    pub async fn run(&self, shutdown: CancellationToken) -> Result<SwarmReport, ConnectionError> {
        let mut members: Vec<Member> = Vec::new();
        let mut last_error = None;

        for n in 0..self.config.clients {
            let id = unique_id(&members, n);
            match self.connector.connect_as(id).await {
                Ok(transport) => {
                    tracing::info!("Client {} connected successfully", transport.client_id());
                    members.push(Member::start(transport));
                }
                Err(e) => {
                    tracing::warn!("Failed to connect client {}: {}", n, e);
                    last_error = Some(e);
                }
            }
        }
        tracing::info!("Connected clients: {}", members.len());

        if members.is_empty() {
            if let Some(e) = last_error {
                return Err(e);
            }
        }

        let ticks = self.fan_out(&mut members, &shutdown).await;

        // Let the last round land before hanging up
        if !shutdown.is_cancelled() {
            tokio::time::sleep(self.config.interval).await;
        }

        futures::future::join_all(members.iter().map(|m| m.transport.close())).await;

        let mut clients = Vec::with_capacity(members.len());
        for member in members {
            if let Some(reader) = member.reader {
                let _ = reader.await;
            }
            clients.push(SwarmClientStats {
                client_id: member.transport.client_id().clone(),
                sent: member.sent,
                received: member.received.load(Ordering::Relaxed),
                final_state: member.transport.state(),
            });
        }

        Ok(SwarmReport { ticks, clients })
    }

    async fn fan_out(&self, members: &mut [Member], shutdown: &CancellationToken) -> u32 {
        let mut interval = tokio::time::interval(self.config.interval.max(MIN_INTERVAL));
        interval.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
        // The first tick completes immediately
        interval.tick().await;

        let mut tick = 0;
        while self.config.ticks == 0 || tick < self.config.ticks {
            tokio::select! {
                _ = interval.tick() => {}
                _ = shutdown.cancelled() => break,
            }
            tick += 1;

            let active: Vec<usize> = members
                .iter()
                .enumerate()
                .filter(|(_, m)| m.transport.state() == SessionState::Active)
                .map(|(i, _)| i)
                .collect();
            if active.is_empty() {
                tracing::warn!("No connected clients left");
                break;
            }

            let sender = active[rand::thread_rng().gen_range(0..active.len())];
            let mut recipients: Vec<String> = active
                .iter()
                .filter(|&&i| i != sender)
                .map(|&i| members[i].id().to_string())
                .collect();
            if let Some(extra) = &self.config.extra_recipient {
                recipients.push(extra.clone());
            }

            let member = &mut members[sender];
            let from = member.id().to_string();
            let envelope = Envelope::new(MessageType::Msg)
                .from(from.clone())
                .to(recipients)
                .subject("Test Message")
                .content(format!("Hello from {} at {}", from, current_time_millis()));

            match member.transport.send(envelope).await {
                Ok(()) => member.sent += 1,
                Err(e) => {
                    tracing::warn!("Error sending from {}: {}; removing it", from, e);
                    let _ = member.transport.close().await;
                }
            }
        }
        tick
    }
}

/// Random `Client-<n>` not already used by a member
fn unique_id(members: &[Member], n: u32) -> ClientId {
    for _ in 0..16 {
        let id = ClientId::random();
        if members.iter().all(|m| m.id() != &id) {
            return id;
        }
    }
    ClientId::new(format!("Client-{}", 1000 + n))
}
