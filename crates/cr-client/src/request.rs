//! Correlated request/reply over a transport
//!
//! A [`RequestEngine`] owns the transport's inbound stream. A background
//! demultiplexer routes each inbound envelope either to the pending request
//! it answers or to the unsolicited channel.
//!
//! Every pending request has a slot in a shared table. Whoever removes the
//! slot resolves the request: the demultiplexer (reply), the requester
//! (deadline), or the shutdown path (`ConnectionLost`). That removal is the
//! single point of resolution, so a reply racing its deadline is observed
//! exactly once.
//!
//! Waits longer than [`MAX_DURATION`] are cut to it.
//!
//! In [`CorrelationMode::NextInbound`] a reply is whatever arrives next. A
//! reply that comes in after its request timed out goes to the unsolicited
//! channel only while no other request is pending; once the next request
//! has registered, it takes that late reply as its own. Use
//! [`CorrelationMode::Strict`] when the relay echoes `replyTo`.

use std::sync::{Arc, Mutex};
use std::time::Duration;

use dashmap::DashMap;
use futures::StreamExt;
use tokio::sync::{mpsc, oneshot, watch};
use tokio::task::JoinHandle;
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;

use cr_core::config::{CorrelationMode, MAX_DURATION};
use cr_core::error::RequestError;
use cr_core::traits::{Inbound, Transport};
use cr_core::SessionState;
use cr_protocol::{CorrelationId, CorrelationIdGenerator, Envelope};

/// Channel capacity for inbound envelopes that answered no request.
///
/// Anything beyond this while nobody drains the channel is dropped with a
/// warning; the session itself is never blocked by an unread backlog.
pub const UNSOLICITED_CHANNEL_CAPACITY: usize = 256;

type Slot = oneshot::Sender<Result<Envelope, RequestError>>;

/// State shared between requesters and the demultiplexer
struct Shared {
    pending: DashMap<CorrelationId, Slot>,
    lost: CancellationToken,
    mode: CorrelationMode,
}

impl Shared {
    fn route(&self, envelope: Envelope, unsolicited_tx: &mpsc::Sender<Envelope>) {
        let slot = match self.mode {
            CorrelationMode::Strict => envelope
                .reply_to
                .as_ref()
                .and_then(|id| self.pending.remove(id))
                .map(|(_, slot)| slot),
            CorrelationMode::NextInbound => self.take_any(),
        };

        let envelope = match slot {
            Some(slot) => match slot.send(Ok(envelope)) {
                Ok(()) => return,
                // Requester went away between removal and delivery
                Err(Ok(envelope)) => envelope,
                Err(Err(_)) => return,
            },
            None => envelope,
        };

        match unsolicited_tx.try_send(envelope) {
            Ok(()) => {}
            Err(mpsc::error::TrySendError::Full(envelope)) => {
                tracing::warn!(
                    "Unsolicited queue full, dropping {} from {}",
                    envelope.message_type,
                    envelope.from
                );
            }
            Err(mpsc::error::TrySendError::Closed(_)) => {}
        }
    }

    fn take_any(&self) -> Option<Slot> {
        let key = self.pending.iter().next().map(|entry| entry.key().clone())?;
        self.pending.remove(&key).map(|(_, slot)| slot)
    }

    /// Mark the connection lost and fail every pending request
    fn fail_all(&self) {
        self.lost.cancel();
        let keys: Vec<CorrelationId> = self.pending.iter().map(|e| e.key().clone()).collect();
        for key in keys {
            if let Some((_, slot)) = self.pending.remove(&key) {
                let _ = slot.send(Err(RequestError::ConnectionLost));
            }
        }
    }
}

/// Removes a pending slot if the request future is dropped early
struct PendingGuard<'a> {
    pending: &'a DashMap<CorrelationId, Slot>,
    key: CorrelationId,
}

impl Drop for PendingGuard<'_> {
    fn drop(&mut self) {
        self.pending.remove(&self.key);
    }
}

/// Request/reply engine over one transport
pub struct RequestEngine<T: Transport> {
    transport: Arc<T>,
    shared: Arc<Shared>,
    ids: CorrelationIdGenerator,
    serial: tokio::sync::Mutex<()>,
    unsolicited_rx: Mutex<Option<mpsc::Receiver<Envelope>>>,
    demux: Option<JoinHandle<()>>,
}

impl<T: Transport> RequestEngine<T> {
    /// Take over the transport's inbound stream and start demultiplexing
    pub fn new(transport: Arc<T>, mode: CorrelationMode) -> Self {
        let shared = Arc::new(Shared {
            pending: DashMap::new(),
            lost: CancellationToken::new(),
            mode,
        });
        let (unsolicited_tx, unsolicited_rx) = mpsc::channel(UNSOLICITED_CHANNEL_CAPACITY);

        let demux = match transport.take_inbound() {
            Some(inbound) => Some(tokio::spawn(demultiplex(
                inbound,
                transport.watch_state(),
                Arc::clone(&shared),
                unsolicited_tx,
            ))),
            None => {
                tracing::warn!(
                    "Inbound stream of {} already taken; engine starts disconnected",
                    transport.client_id()
                );
                shared.fail_all();
                None
            }
        };

        Self {
            transport,
            shared,
            ids: CorrelationIdGenerator::new("req"),
            serial: tokio::sync::Mutex::new(()),
            unsolicited_rx: Mutex::new(Some(unsolicited_rx)),
            demux,
        }
    }

    /// The underlying transport
    pub fn transport(&self) -> &Arc<T> {
        &self.transport
    }

    /// Correlation mode this engine was built with
    pub fn mode(&self) -> CorrelationMode {
        self.shared.mode
    }

    /// Send `envelope` and wait for its reply.
    ///
    /// Resolves with the reply, `Timeout` once `timeout` has elapsed since
    /// the request was registered (never earlier), or `ConnectionLost` as
    /// soon as the transport shuts down. In strict mode the envelope's `id` is stamped unless the
    /// caller already set one.
    pub async fn request(
        &self,
        mut envelope: Envelope,
        timeout: Duration,
    ) -> Result<Envelope, RequestError> {
        let _serial = match self.shared.mode {
            CorrelationMode::NextInbound => Some(self.serial.lock().await),
            CorrelationMode::Strict => None,
        };
        if self.shared.lost.is_cancelled() {
            return Err(RequestError::ConnectionLost);
        }

        let key = match self.shared.mode {
            CorrelationMode::Strict => envelope
                .id
                .get_or_insert_with(|| self.ids.next_id())
                .clone(),
            CorrelationMode::NextInbound => self.ids.next_id(),
        };

        let deadline = Instant::now() + timeout.min(MAX_DURATION);
        let (tx, mut rx) = oneshot::channel();
        if self.shared.pending.insert(key.clone(), tx).is_some() {
            tracing::warn!("Correlation id {} reused while still pending", key);
        }
        let _guard = PendingGuard {
            pending: &self.shared.pending,
            key: key.clone(),
        };
        // A shutdown that swept the table before our insert
        if self.shared.lost.is_cancelled() {
            return Err(RequestError::ConnectionLost);
        }

        if let Err(e) = self.transport.send(envelope).await {
            tracing::debug!("Request {} not sent: {}", key, e);
            return Err(RequestError::ConnectionLost);
        }

        match tokio::time::timeout_at(deadline, &mut rx).await {
            Ok(Ok(result)) => result,
            Ok(Err(_)) => Err(RequestError::ConnectionLost),
            Err(_) => match self.shared.pending.remove(&key) {
                Some(_) => Err(RequestError::Timeout { timeout }),
                // The demultiplexer claimed the slot first; its result stands
                None => rx.await.unwrap_or(Err(RequestError::ConnectionLost)),
            },
        }
    }

    /// Take the receiver of unsolicited envelopes. Returns `None` after the first call.
    pub fn take_unsolicited(&self) -> Option<mpsc::Receiver<Envelope>> {
        self.unsolicited_rx.lock().ok()?.take()
    }

    /// Resolves once the transport has shut down
    pub async fn connection_lost(&self) {
        self.shared.lost.cancelled().await
    }

    /// Whether the transport has shut down
    pub fn is_connection_lost(&self) -> bool {
        self.shared.lost.is_cancelled()
    }

    /// Number of requests awaiting a reply
    pub fn pending_count(&self) -> usize {
        self.shared.pending.len()
    }
}

impl<T: Transport> Drop for RequestEngine<T> {
    fn drop(&mut self) {
        if let Some(demux) = self.demux.take() {
            demux.abort();
        }
    }
}

async fn demultiplex(
    mut inbound: Inbound,
    mut state_rx: watch::Receiver<SessionState>,
    shared: Arc<Shared>,
    unsolicited_tx: mpsc::Sender<Envelope>,
) {
    loop {
        tokio::select! {
            // Frames already received are routed before a shutdown is noticed
            biased;
            next = inbound.next() => match next {
                Some(envelope) => shared.route(envelope, &unsolicited_tx),
                None => {
                    tracing::debug!("Inbound stream ended");
                    break;
                }
            },
            _ = state_rx.wait_for(|s| s.is_shutting_down()) => {
                tracing::debug!("Transport shutting down");
                break;
            }
        }
    }
    shared.fail_all();
}
