//! Outbound WebSocket connector
//!
//! Opens the persistent connection to the relay and hands back a
//! [`WsTransport`] whose socket is owned by a single I/O task.

use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use futures::{SinkExt, StreamExt};
use tokio::net::TcpStream;
use tokio::sync::{mpsc, watch};
use tokio::task::JoinHandle;
use tokio_tungstenite::tungstenite::client::IntoClientRequest;
use tokio_tungstenite::tungstenite::handshake::client::Request;
use tokio_tungstenite::tungstenite::http::header::AUTHORIZATION;
use tokio_tungstenite::tungstenite::http::HeaderValue;
use tokio_tungstenite::tungstenite::protocol::frame::coding::CloseCode;
use tokio_tungstenite::tungstenite::protocol::CloseFrame;
use tokio_tungstenite::tungstenite::{Error as WsError, Message};
use tokio_tungstenite::{MaybeTlsStream, WebSocketStream};
use url::Url;

use cr_core::config::ClientConfig;
use cr_core::error::{ConfigError, ConnectionError};
use cr_core::traits::{Inbound, Transport};
use cr_core::{ClientId, SessionState, SessionStateCell};
use cr_protocol::{Envelope, MessageType};

use super::OUTBOUND_CHANNEL_CAPACITY;

type WsStream = WebSocketStream<MaybeTlsStream<TcpStream>>;

/// Upper bound on flushing the final close handshake once the read side ended
const CLOSE_FLUSH_TIMEOUT: Duration = Duration::from_secs(1);

/// Build the handshake request: `clientID` query parameter plus bearer header
pub fn build_request(
    config: &ClientConfig,
    client_id: &ClientId,
) -> Result<Request, ConnectionError> {
    let mut url = Url::parse(&config.url)
        .map_err(|e| ConnectionError::InvalidUrl(format!("{}: {}", config.url, e)))?;
    if !matches!(url.scheme(), "ws" | "wss") {
        return Err(ConnectionError::InvalidUrl(format!(
            "unsupported scheme '{}'",
            url.scheme()
        )));
    }
    url.query_pairs_mut()
        .append_pair("clientID", client_id.as_str());

    let mut request = url
        .as_str()
        .into_client_request()
        .map_err(|e| ConnectionError::InvalidUrl(e.to_string()))?;

    if let Some(credential) = &config.credential {
        let value = HeaderValue::from_str(&format!("Bearer {}", credential)).map_err(|_| {
            ConnectionError::InvalidUrl("credential is not a valid header value".to_string())
        })?;
        request.headers_mut().insert(AUTHORIZATION, value);
    }

    Ok(request)
}

/// Map a handshake failure onto the connection error taxonomy
fn handshake_error(err: WsError) -> ConnectionError {
    match err {
        WsError::Http(response) => {
            let status = response.status().as_u16();
            if status == 401 || status == 403 {
                ConnectionError::AuthenticationFailed { status }
            } else {
                ConnectionError::Rejected { status }
            }
        }
        WsError::Url(e) => ConnectionError::InvalidUrl(e.to_string()),
        WsError::Io(e) => ConnectionError::Refused(e.to_string()),
        other => ConnectionError::Refused(other.to_string()),
    }
}

/// Establishes WebSocket sessions to the relay
#[derive(Debug, Clone)]
pub struct Connector {
    config: ClientConfig,
}

impl Connector {
    /// Create a connector after validating the configuration
    pub fn new(config: ClientConfig) -> Result<Self, ConfigError> {
        config.validate()?;
        Ok(Self { config })
    }

    /// Get the client configuration
    pub fn config(&self) -> &ClientConfig {
        &self.config
    }

    /// Connect using the configured (or a random) client ID
    pub async fn connect(&self) -> Result<WsTransport, ConnectionError> {
        self.connect_as(self.config.resolve_client_id()).await
    }

    /// Connect presenting `client_id`.
    ///
    /// The handshake is bounded by `connect_timeout`. No retries happen here;
    /// see [`crate::Supervisor`] for that.
    pub async fn connect_as(&self, client_id: ClientId) -> Result<WsTransport, ConnectionError> {
        let state = Arc::new(SessionStateCell::new());

        match self.handshake(&client_id).await {
            Ok(ws) => {
                state.transition(SessionState::Authenticated);
                state.transition(SessionState::Active);
                tracing::info!("Client {} connected to {}", client_id, self.config.url);
                Ok(WsTransport::spawn(
                    ws,
                    client_id,
                    state,
                    self.config.close_grace,
                ))
            }
            Err(e) => {
                state.transition(SessionState::Failed);
                tracing::debug!("Client {} failed to connect: {}", client_id, e);
                Err(e)
            }
        }
    }

    async fn handshake(&self, client_id: &ClientId) -> Result<WsStream, ConnectionError> {
        let request = build_request(&self.config, client_id)?;

        tracing::debug!("Connecting to {} as {}", self.config.url, client_id);
        let (ws, _response) = tokio::time::timeout(
            self.config.connect_timeout,
            tokio_tungstenite::connect_async(request),
        )
        .await
        .map_err(|_| ConnectionError::Timeout(self.config.connect_timeout))?
        .map_err(handshake_error)?;

        Ok(ws)
    }
}

/// Commands for the I/O task
enum Outbound {
    Frame(String),
    Close,
}

/// How the I/O loop ended
enum Ended {
    /// Close handshake completed (either side started it)
    Closed,
    /// Socket failed mid-session
    Failed(String),
}

/// A live WebSocket session
pub struct WsTransport {
    client_id: ClientId,
    state: Arc<SessionStateCell>,
    outbound_tx: mpsc::Sender<Outbound>,
    inbound: Mutex<Option<Inbound>>,
    io_task: tokio::sync::Mutex<Option<JoinHandle<()>>>,
    close_grace: Duration,
}

impl WsTransport {
    fn spawn(
        ws: WsStream,
        client_id: ClientId,
        state: Arc<SessionStateCell>,
        close_grace: Duration,
    ) -> Self {
        let (outbound_tx, outbound_rx) = mpsc::channel(OUTBOUND_CHANNEL_CAPACITY);
        let (inbound_tx, inbound_rx) = mpsc::unbounded_channel();

        let io_task = tokio::spawn(run_io_loop(
            ws,
            client_id.clone(),
            Arc::clone(&state),
            outbound_rx,
            inbound_tx,
        ));

        let inbound = futures::stream::unfold(inbound_rx, |mut rx| async move {
            rx.recv().await.map(|envelope| (envelope, rx))
        })
        .boxed();

        Self {
            client_id,
            state,
            outbound_tx,
            inbound: Mutex::new(Some(inbound)),
            io_task: tokio::sync::Mutex::new(Some(io_task)),
            close_grace,
        }
    }
}

#[async_trait]
impl Transport for WsTransport {
    fn client_id(&self) -> &ClientId {
        &self.client_id
    }

    fn state(&self) -> SessionState {
        self.state.get()
    }

    fn watch_state(&self) -> watch::Receiver<SessionState> {
        self.state.subscribe()
    }

    async fn send(&self, envelope: Envelope) -> Result<(), ConnectionError> {
        let state = self.state.get();
        if state != SessionState::Active {
            return Err(ConnectionError::Lost(format!("session is {}", state)));
        }

        let text = cr_protocol::encode(&envelope)?;
        if envelope.message_type == MessageType::Heartbeat {
            tracing::trace!("{} -> heartbeat", self.client_id);
        } else {
            tracing::debug!("{} -> {}", self.client_id, text);
        }

        self.outbound_tx
            .send(Outbound::Frame(text))
            .await
            .map_err(|_| ConnectionError::Lost("writer stopped".to_string()))
    }

    fn take_inbound(&self) -> Option<Inbound> {
        self.inbound.lock().ok()?.take()
    }

    async fn close(&self) -> Result<(), ConnectionError> {
        let Some(mut handle) = self.io_task.lock().await.take() else {
            return Ok(());
        };

        if !self.state.get().is_terminal() {
            self.state.transition(SessionState::Closing);
            let graceful = async {
                // Queued frames are written before the close frame
                let _ = self.outbound_tx.send(Outbound::Close).await;
                let _ = (&mut handle).await;
            };
            if tokio::time::timeout(self.close_grace, graceful).await.is_err() {
                tracing::warn!(
                    "Client {}: relay did not acknowledge close within {:?}",
                    self.client_id,
                    self.close_grace
                );
            }
        }

        handle.abort();
        self.state.close();
        tracing::info!("Client {} disconnected", self.client_id);
        Ok(())
    }
}

impl Drop for WsTransport {
    fn drop(&mut self) {
        if let Some(handle) = self.io_task.get_mut().take() {
            handle.abort();
        }
    }
}

/// Owns the socket: writes queued frames, decodes inbound frames
async fn run_io_loop(
    ws: WsStream,
    client_id: ClientId,
    state: Arc<SessionStateCell>,
    mut outbound_rx: mpsc::Receiver<Outbound>,
    inbound_tx: mpsc::UnboundedSender<Envelope>,
) {
    let (mut ws_tx, mut ws_rx) = ws.split();
    let mut closing = false;

    let ended = loop {
        tokio::select! {
            command = outbound_rx.recv(), if !closing => match command {
                Some(Outbound::Frame(text)) => {
                    if let Err(e) = ws_tx.send(Message::Text(text.into())).await {
                        break Ended::Failed(e.to_string());
                    }
                }
                Some(Outbound::Close) | None => {
                    closing = true;
                    let frame = CloseFrame {
                        code: CloseCode::Normal,
                        reason: "session closed".into(),
                    };
                    if let Err(e) = ws_tx.send(Message::Close(Some(frame))).await {
                        tracing::debug!("Client {}: close frame not sent: {}", client_id, e);
                        break Ended::Closed;
                    }
                }
            },
            frame = ws_rx.next() => match frame {
                Some(Ok(Message::Text(text))) => deliver(&client_id, text.as_bytes(), &inbound_tx),
                Some(Ok(Message::Binary(data))) => deliver(&client_id, &data, &inbound_tx),
                Some(Ok(Message::Close(frame))) => {
                    if !closing {
                        tracing::info!("Client {}: relay closed the connection ({:?})", client_id, frame);
                        state.transition(SessionState::Closing);
                    }
                    break Ended::Closed;
                }
                Some(Ok(_)) => {}
                Some(Err(e)) if closing => {
                    tracing::debug!("Client {}: error while closing: {}", client_id, e);
                    break Ended::Closed;
                }
                Some(Err(e)) => break Ended::Failed(e.to_string()),
                None if closing => break Ended::Closed,
                None => break Ended::Failed("connection reset".to_string()),
            },
        }
    };

    // Flush our close reply (or frame) before releasing the socket
    let _ = tokio::time::timeout(CLOSE_FLUSH_TIMEOUT, ws_tx.close()).await;

    match ended {
        Ended::Closed => state.close(),
        Ended::Failed(reason) => {
            tracing::warn!("Client {}: connection lost: {}", client_id, reason);
            state.transition(SessionState::Failed);
        }
    }
}

/// Decode one frame and hand it to the inbound stream; malformed frames stop here
fn deliver(client_id: &ClientId, bytes: &[u8], inbound_tx: &mpsc::UnboundedSender<Envelope>) {
    match cr_protocol::decode(bytes) {
        Ok(envelope) => {
            if envelope.message_type == MessageType::Heartbeat {
                tracing::trace!("{} <- heartbeat from {}", client_id, envelope.from);
            } else {
                tracing::debug!("{} <- {} from {}", client_id, envelope.message_type, envelope.from);
            }
            let _ = inbound_tx.send(envelope);
        }
        Err(e) => {
            tracing::warn!("Client {}: dropping malformed frame: {}", client_id, e);
        }
    }
}
