//! Session driver: login, traffic cycles, logout

use std::sync::Arc;

use serde_json::json;
use tokio::sync::mpsc;
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;

use cr_core::config::ClientConfig;
use cr_core::error::{RequestError, SessionError};
use cr_core::time::current_time_millis;
use cr_core::traits::Transport;
use cr_core::{ClientId, SessionReport};
use cr_protocol::{Envelope, MessageType};

use crate::request::RequestEngine;

/// The traffic phase stopped because the connection went away
struct TrafficInterrupted;

/// Drives one session through login, traffic and logout
pub struct SessionDriver<T: Transport> {
    engine: RequestEngine<T>,
    config: ClientConfig,
    client_id: ClientId,
    sender: String,
    unsolicited: Option<mpsc::Receiver<Envelope>>,
}

impl<T: Transport> SessionDriver<T> {
    /// Wrap a connected transport
    pub fn new(transport: Arc<T>, config: ClientConfig) -> Self {
        let client_id = transport.client_id().clone();
        let sender = config.sender_for(&client_id);
        let engine = RequestEngine::new(transport, config.correlation);
        let unsolicited = engine.take_unsolicited();
        Self {
            engine,
            config,
            client_id,
            sender,
            unsolicited,
        }
    }

    /// The request engine used by this driver
    pub fn engine(&self) -> &RequestEngine<T> {
        &self.engine
    }

    /// Run the whole session.
    ///
    /// Cancelling `shutdown` ends the traffic phase early; logout still runs.
    /// The transport is closed on every path.
    pub async fn run(mut self, shutdown: CancellationToken) -> Result<SessionReport, SessionError> {
        let started = Instant::now();
        let mut report = SessionReport::new(self.client_id.clone());

        if let Err(e) = self.login().await {
            tracing::error!("Client {}: login failed: {}", self.client_id, e);
            self.close().await;
            return Err(SessionError::LoginFailed(e));
        }
        report.logged_in = true;

        if self.traffic(&mut report, &shutdown).await.is_err() {
            self.close().await;
            report.final_state = self.engine.transport().state();
            report.elapsed = started.elapsed();
            return Err(SessionError::ConnectionLost {
                report: Box::new(report),
            });
        }

        report.logout_confirmed = self.logout().await;
        report.unsolicited += self.drain_unsolicited();
        report.final_state = self.engine.transport().state();
        report.elapsed = started.elapsed();

        tracing::info!(
            "Client {} finished: {} sent, {} replies, {} timeouts",
            self.client_id,
            report.sent,
            report.replies,
            report.timeouts
        );
        Ok(report)
    }

    /// Send the login envelope and wait for its reply
    pub async fn login(&self) -> Result<Envelope, RequestError> {
        let credential = self.config.credential.as_deref().unwrap_or_default();
        let envelope = Envelope::login(credential)
            .from(self.sender.clone())
            .to(self.config.recipient.clone())
            .subject("Login");

        let reply = self
            .engine
            .request(envelope, self.config.login_timeout)
            .await?;
        tracing::info!("Client {} logged in", self.client_id);
        Ok(reply)
    }

    /// Envelope sent on traffic cycle `cycle` (zero-based)
    pub fn traffic_envelope(&self, message_type: &MessageType, cycle: u32) -> Envelope {
        let base = match message_type {
            MessageType::Heartbeat => Envelope::heartbeat(),
            MessageType::Msg => Envelope::new(MessageType::Msg).content(format!(
                "Hello from {} (cycle {})",
                self.sender,
                cycle + 1
            )),
            MessageType::Log => Envelope::new(MessageType::Log).content(json!({
                "level": "info",
                "message": format!("{} cycle {}", self.sender, cycle + 1),
                "timestamp": current_time_millis(),
            })),
            other => Envelope::new(other.clone()),
        };
        base.from(self.sender.clone())
            .to(self.config.recipient.clone())
            .subject(format!("{} - {}", self.config.subject, message_type))
    }

    async fn traffic(
        &mut self,
        report: &mut SessionReport,
        shutdown: &CancellationToken,
    ) -> Result<(), TrafficInterrupted> {
        let cycles = self.config.cycles;
        let mut cycle: u32 = 0;

        while cycles == 0 || cycle < cycles {
            if shutdown.is_cancelled() {
                tracing::info!("Client {}: shutdown requested", self.client_id);
                break;
            }

            let message_type = self
                .config
                .traffic
                .get(cycle as usize % self.config.traffic.len().max(1))
                .cloned()
                .unwrap_or(MessageType::Heartbeat);
            let envelope = self.traffic_envelope(&message_type, cycle);

            report.sent += 1;
            match self
                .engine
                .request(envelope, self.config.request_timeout)
                .await
            {
                Ok(reply) => {
                    report.replies += 1;
                    if reply.message_type == MessageType::Heartbeat {
                        tracing::trace!("Client {}: heartbeat acknowledged", self.client_id);
                    } else {
                        tracing::info!(
                            "Client {}: {} answered with {} from {}",
                            self.client_id,
                            message_type,
                            reply.message_type,
                            reply.from
                        );
                    }
                }
                Err(RequestError::Timeout { timeout }) => {
                    report.timeouts += 1;
                    tracing::warn!(
                        "Client {}: no reply to {} within {:?}",
                        self.client_id,
                        message_type,
                        timeout
                    );
                }
                Err(RequestError::ConnectionLost) => {
                    tracing::warn!("Client {}: connection lost during traffic", self.client_id);
                    return Err(TrafficInterrupted);
                }
            }

            report.unsolicited += self.drain_unsolicited();
            cycle += 1;
            if cycles != 0 && cycle >= cycles {
                break;
            }

            tokio::select! {
                _ = tokio::time::sleep(self.config.cycle_delay) => {}
                _ = self.engine.connection_lost() => {
                    tracing::warn!("Client {}: connection lost between cycles", self.client_id);
                    return Err(TrafficInterrupted);
                }
                _ = shutdown.cancelled() => {
                    tracing::info!("Client {}: shutdown requested", self.client_id);
                    break;
                }
            }
        }
        Ok(())
    }

    /// Send logout, wait for the reply, then close whatever happened.
    /// Returns whether the relay confirmed.
    async fn logout(&mut self) -> bool {
        let envelope = Envelope::logout()
            .from(self.sender.clone())
            .to(self.config.recipient.clone())
            .subject("Logout");

        let confirmed = match self
            .engine
            .request(envelope, self.config.logout_timeout)
            .await
        {
            Ok(_) => {
                tracing::info!("Client {} logged out", self.client_id);
                true
            }
            Err(e) => {
                tracing::warn!("Client {}: logout not confirmed: {}", self.client_id, e);
                false
            }
        };

        self.close().await;
        confirmed
    }

    async fn close(&self) {
        if let Err(e) = self.engine.transport().close().await {
            tracing::warn!("Client {}: close failed: {}", self.client_id, e);
        }
    }

    fn drain_unsolicited(&mut self) -> u32 {
        let Some(rx) = self.unsolicited.as_mut() else {
            return 0;
        };
        let mut drained = 0;
        while let Ok(envelope) = rx.try_recv() {
            drained += 1;
            tracing::info!(
                "Client {}: unsolicited {} from {}: {}",
                self.client_id,
                envelope.message_type,
                envelope.from,
                envelope.content
            );
        }
        drained
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::transport::LoopbackTransport;

    fn driver() -> SessionDriver<LoopbackTransport> {
        let (transport, _peer) = LoopbackTransport::pair("c1");
        SessionDriver::new(Arc::new(transport), ClientConfig::default())
    }

    #[tokio::test]
    async fn test_heartbeat_has_empty_content() {
        let envelope = driver().traffic_envelope(&MessageType::Heartbeat, 0);
        assert_eq!(envelope.content, "");
        assert_eq!(envelope.from, "c1");
        assert_eq!(envelope.to.targets(), vec!["server"]);
        assert_eq!(envelope.subject, "Test message - heartbeat");
    }

    #[tokio::test]
    async fn test_log_content_is_structured() {
        let envelope = driver().traffic_envelope(&MessageType::Log, 2);
        assert_eq!(envelope.content["level"], "info");
        assert_eq!(envelope.content["message"], "c1 cycle 3");
        assert!(envelope.content["timestamp"].as_u64().unwrap() > 0);
    }

    #[tokio::test]
    async fn test_msg_content_names_sender() {
        let envelope = driver().traffic_envelope(&MessageType::Msg, 0);
        assert_eq!(envelope.content, "Hello from c1 (cycle 1)");
    }
}
