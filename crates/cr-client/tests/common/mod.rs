//! In-process relay used by the integration tests
//!
//! Accepts WebSocket connections the way the deployed relay does (a
//! `clientID` query parameter, optional bearer token), answers each
//! envelope with a reply addressed back to its sender and forwards `msg`
//! envelopes to any connected client listed in `to`.

#![allow(dead_code)]

use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use futures::{SinkExt, StreamExt};
use serde_json::json;
use tokio::net::{TcpListener, TcpStream};
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio_tungstenite::tungstenite::handshake::server::{ErrorResponse, Request, Response};
use tokio_tungstenite::tungstenite::http::StatusCode;
use tokio_tungstenite::tungstenite::Message;

use cr_core::config::ClientConfig;
use cr_protocol::{Envelope, MessageType};

/// Behaviour switches for the test relay
#[derive(Debug, Clone, Default)]
pub struct RelayOptions {
    /// Required bearer token; any token is accepted when unset
    pub token: Option<String>,
    /// Envelope types that never get a reply
    pub silent: Vec<MessageType>,
    /// Drop the TCP connection (no close frame) after this many frames
    pub hang_up_after: Option<usize>,
    /// Send undecodable frames ahead of every reply
    pub garbage_before_reply: bool,
    /// Send an unrelated envelope ahead of every reply
    pub push_before_reply: bool,
    /// Complete the handshake, then never read or write again
    pub deaf: bool,
}

/// What the relay saw during one handshake
#[derive(Debug, Clone)]
pub struct Handshake {
    pub client_id: String,
    pub authorization: Option<String>,
}

#[derive(Default)]
struct RelayState {
    clients: Mutex<HashMap<String, mpsc::UnboundedSender<Message>>>,
    handshakes: Mutex<Vec<Handshake>>,
    received: Mutex<Vec<Envelope>>,
}

pub struct TestRelay {
    pub url: String,
    state: Arc<RelayState>,
    task: JoinHandle<()>,
}

impl TestRelay {
    pub async fn start(options: RelayOptions) -> Self {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        let state = Arc::new(RelayState::default());

        let accept_state = Arc::clone(&state);
        let task = tokio::spawn(async move {
            while let Ok((stream, _)) = listener.accept().await {
                tokio::spawn(serve(stream, options.clone(), Arc::clone(&accept_state)));
            }
        });

        Self {
            url: format!("ws://{}/", addr),
            state,
            task,
        }
    }

    pub fn handshakes(&self) -> Vec<Handshake> {
        self.state.handshakes.lock().unwrap().clone()
    }

    pub fn received(&self) -> Vec<Envelope> {
        self.state.received.lock().unwrap().clone()
    }

    pub fn received_types(&self) -> Vec<MessageType> {
        self.received()
            .into_iter()
            .map(|e| e.message_type)
            .collect()
    }

    /// Client config pointed at this relay with short test timings
    pub fn client_config(&self) -> ClientConfig {
        ClientConfig {
            url: self.url.clone(),
            client_id: Some("c1".to_string()),
            credential: Some("t".to_string()),
            cycle_delay: Duration::from_millis(50),
            close_grace: Duration::from_secs(2),
            ..Default::default()
        }
    }
}

impl Drop for TestRelay {
    fn drop(&mut self) {
        self.task.abort();
    }
}

/// A `ws://` URL with nothing listening behind it
pub async fn unused_url() -> String {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    drop(listener);
    format!("ws://{}/", addr)
}

fn reject(status: StatusCode, reason: &str) -> ErrorResponse {
    let mut response = ErrorResponse::new(Some(reason.to_string()));
    *response.status_mut() = status;
    response
}

fn text(envelope: &Envelope) -> Message {
    Message::Text(cr_protocol::encode(envelope).unwrap().into())
}

async fn serve(stream: TcpStream, options: RelayOptions, state: Arc<RelayState>) {
    let mut handshake = None;
    let callback = |req: &Request, response: Response| -> Result<Response, ErrorResponse> {
        let client_id = req.uri().query().and_then(|q| {
            url::form_urlencoded::parse(q.as_bytes())
                .find(|(key, _)| key == "clientID")
                .map(|(_, value)| value.into_owned())
        });
        let Some(client_id) = client_id else {
            return Err(reject(StatusCode::BAD_REQUEST, "clientID is required"));
        };
        let authorization = req
            .headers()
            .get("authorization")
            .and_then(|v| v.to_str().ok())
            .map(str::to_string);
        if let Some(token) = &options.token {
            if authorization.as_deref() != Some(format!("Bearer {}", token).as_str()) {
                return Err(reject(StatusCode::UNAUTHORIZED, "Unauthorized"));
            }
        }
        handshake = Some(Handshake {
            client_id,
            authorization,
        });
        Ok(response)
    };

    let Ok(ws) = tokio_tungstenite::accept_hdr_async(stream, callback).await else {
        return;
    };
    let Some(handshake) = handshake else {
        return;
    };
    let client_id = handshake.client_id.clone();
    state.handshakes.lock().unwrap().push(handshake);

    if options.deaf {
        let _held = ws;
        tokio::time::sleep(Duration::from_secs(30)).await;
        return;
    }

    let (tx, mut rx) = mpsc::unbounded_channel();
    state
        .clients
        .lock()
        .unwrap()
        .insert(client_id.clone(), tx.clone());

    let (mut ws_tx, mut ws_rx) = ws.split();
    let mut frames = 0;

    loop {
        tokio::select! {
            outgoing = rx.recv() => match outgoing {
                Some(message) => {
                    if ws_tx.send(message).await.is_err() {
                        break;
                    }
                }
                None => break,
            },
            incoming = ws_rx.next() => match incoming {
                Some(Ok(Message::Text(frame))) => {
                    frames += 1;
                    if let Ok(envelope) = cr_protocol::decode_str(frame.as_str()) {
                        state.received.lock().unwrap().push(envelope.clone());
                        for message in respond(&envelope, &client_id, &options, &state) {
                            let _ = tx.send(message);
                        }
                    }
                    if options.hang_up_after == Some(frames) {
                        // Let the replies out, then vanish without a close frame
                        while let Ok(message) = rx.try_recv() {
                            let _ = ws_tx.send(message).await;
                        }
                        break;
                    }
                }
                Some(Ok(Message::Close(_))) => {
                    let _ = ws_tx.close().await;
                    break;
                }
                Some(Ok(_)) => {}
                Some(Err(_)) | None => break,
            },
        }
    }

    state.clients.lock().unwrap().remove(&client_id);
}

fn respond(
    envelope: &Envelope,
    client_id: &str,
    options: &RelayOptions,
    state: &RelayState,
) -> Vec<Message> {
    if envelope.message_type == MessageType::Msg {
        let clients = state.clients.lock().unwrap();
        let mut forwarded = false;
        for target in envelope.to.targets() {
            if target == client_id {
                continue;
            }
            if let Some(peer) = clients.get(target) {
                let _ = peer.send(text(envelope));
                forwarded = true;
            }
        }
        if forwarded {
            return Vec::new();
        }
    }

    if options.silent.contains(&envelope.message_type) {
        return Vec::new();
    }

    let mut out = Vec::new();
    if options.garbage_before_reply {
        out.push(Message::Text("not json".into()));
        out.push(Message::Text(r#"{"from":"relay","content":"no type"}"#.into()));
    }
    if options.push_before_reply {
        let push = Envelope::new(MessageType::parse("presence"))
            .from("relay")
            .to(client_id)
            .content("someone joined");
        out.push(text(&push));
    }

    let reply = Envelope::reply_to(envelope, envelope.message_type.clone())
        .content(json!({ "status": "ok" }));
    out.push(text(&reply));
    out
}
