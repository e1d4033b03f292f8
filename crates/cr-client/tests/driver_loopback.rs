//! Session driver tests over the loopback transport with a paused clock

use std::sync::Arc;
use std::time::Duration;

use tokio::task::JoinHandle;
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;

use cr_client::{LoopbackPeer, LoopbackTransport, SessionDriver};
use cr_core::config::ClientConfig;
use cr_core::error::{RequestError, SessionError};
use cr_core::SessionState;
use cr_protocol::{Envelope, MessageType};

/// Answers everything except `silent` types; hangs up after `hang_up_after` envelopes
fn spawn_relay(
    mut peer: LoopbackPeer,
    silent: Vec<MessageType>,
    hang_up_after: Option<usize>,
) -> JoinHandle<Vec<Envelope>> {
    tokio::spawn(async move {
        let mut seen = Vec::new();
        while let Some(envelope) = peer.recv().await {
            seen.push(envelope.clone());
            if !silent.contains(&envelope.message_type) {
                peer.push(Envelope::reply_to(&envelope, envelope.message_type.clone()));
            }
            if hang_up_after == Some(seen.len()) {
                peer.hang_up();
                break;
            }
            if envelope.message_type == MessageType::Logout {
                break;
            }
        }
        seen
    })
}

fn config() -> ClientConfig {
    ClientConfig {
        credential: Some("t".to_string()),
        ..Default::default()
    }
}

fn driver(config: ClientConfig) -> (SessionDriver<LoopbackTransport>, LoopbackPeer) {
    let (transport, peer) = LoopbackTransport::pair("c1");
    (SessionDriver::new(Arc::new(transport), config), peer)
}

#[tokio::test(start_paused = true)]
async fn test_full_session() {
    let (driver, peer) = driver(config());
    let relay = spawn_relay(peer, Vec::new(), None);

    let started = Instant::now();
    let report = driver.run(CancellationToken::new()).await.unwrap();

    assert!(report.logged_in);
    assert_eq!(report.sent, 5);
    assert_eq!(report.replies, 5);
    assert_eq!(report.timeouts, 0);
    assert!(report.logout_confirmed);
    assert_eq!(report.final_state, SessionState::Closed);
    // Four one-second pauses between five cycles
    assert_eq!(started.elapsed(), Duration::from_secs(4));

    let seen = relay.await.unwrap();
    use MessageType::*;
    let types: Vec<_> = seen.iter().map(|e| e.message_type.clone()).collect();
    assert_eq!(types, vec![Login, Msg, Log, Heartbeat, Msg, Log, Logout]);
    assert_eq!(seen[0].content["token"], "t");
    assert_eq!(seen[3].content, "");
}

#[tokio::test(start_paused = true)]
async fn test_login_timeout_is_fatal_and_closes() {
    let (driver, peer) = driver(config());
    let relay = spawn_relay(peer, vec![MessageType::Login], None);

    let started = Instant::now();
    let result = driver.run(CancellationToken::new()).await;

    assert!(matches!(
        result,
        Err(SessionError::LoginFailed(RequestError::Timeout { .. }))
    ));
    assert_eq!(started.elapsed(), Duration::from_secs(5));
    assert_eq!(relay.await.unwrap().len(), 1);
}

#[tokio::test(start_paused = true)]
async fn test_login_timeout_leaves_transport_closed() {
    let (transport, mut peer) = LoopbackTransport::pair("c1");
    let transport = Arc::new(transport);
    let driver = SessionDriver::new(Arc::clone(&transport), config());

    let result = driver.run(CancellationToken::new()).await;
    assert!(matches!(result, Err(SessionError::LoginFailed(_))));
    assert_eq!(peer.recv().await.unwrap().message_type, MessageType::Login);
    assert_eq!(peer.state(), SessionState::Closed);
}

#[tokio::test(start_paused = true)]
async fn test_timeouts_are_counted_and_loop_continues() {
    let (driver, peer) = driver(config());
    let relay = spawn_relay(peer, vec![MessageType::Heartbeat], None);

    let report = driver.run(CancellationToken::new()).await.unwrap();

    assert_eq!(report.sent, 5);
    assert_eq!(report.replies, 4);
    assert_eq!(report.timeouts, 1);
    assert!(report.logout_confirmed);
    relay.await.unwrap();
}

#[tokio::test(start_paused = true)]
async fn test_hang_up_stops_traffic() {
    let (driver, peer) = driver(config());
    // login + two traffic envelopes, then gone
    let relay = spawn_relay(peer, Vec::new(), Some(3));

    let result = driver.run(CancellationToken::new()).await;

    match result {
        Err(SessionError::ConnectionLost { report }) => {
            assert_eq!(report.sent, 2);
            assert_eq!(report.replies, 2);
            assert!(report.final_state.is_terminal());
        }
        other => panic!("expected ConnectionLost, got {:?}", other),
    }
    assert_eq!(relay.await.unwrap().len(), 3);
}

#[tokio::test(start_paused = true)]
async fn test_shutdown_goes_straight_to_logout() {
    let mut config = config();
    config.cycles = 0;
    let (driver, peer) = driver(config);
    let relay = spawn_relay(peer, Vec::new(), None);

    let shutdown = CancellationToken::new();
    let trigger = shutdown.clone();
    tokio::spawn(async move {
        tokio::time::sleep(Duration::from_millis(2500)).await;
        trigger.cancel();
    });

    let report = driver.run(shutdown).await.unwrap();

    // Cycles start at 0s, 1s and 2s; the pause after the third is cut short
    assert_eq!(report.sent, 3);
    assert!(report.logout_confirmed);
    let seen = relay.await.unwrap();
    assert_eq!(seen.last().unwrap().message_type, MessageType::Logout);
}

#[tokio::test(start_paused = true)]
async fn test_unanswered_logout_still_closes() {
    let mut config = config();
    config.cycles = 1;
    let (driver, peer) = driver(config);
    let relay = spawn_relay(peer, vec![MessageType::Logout], None);

    let started = Instant::now();
    let report = driver.run(CancellationToken::new()).await.unwrap();

    assert!(!report.logout_confirmed);
    assert_eq!(report.final_state, SessionState::Closed);
    assert_eq!(started.elapsed(), Duration::from_secs(5));
    relay.await.unwrap();
}

#[tokio::test(start_paused = true)]
async fn test_unsolicited_envelopes_are_drained() {
    let mut config = config();
    config.cycles = 2;
    let (driver, mut peer) = driver(config);

    let relay = tokio::spawn(async move {
        while let Some(envelope) = peer.recv().await {
            if envelope.message_type == MessageType::Msg {
                peer.push(Envelope::reply_to(&envelope, MessageType::Msg));
                peer.push(Envelope::new(MessageType::Msg).from("c2").content("hi"));
            } else {
                peer.push(Envelope::reply_to(&envelope, envelope.message_type.clone()));
            }
            if envelope.message_type == MessageType::Logout {
                break;
            }
        }
    });

    let report = driver.run(CancellationToken::new()).await.unwrap();
    assert_eq!(report.replies, 2);
    assert_eq!(report.unsolicited, 1);
    relay.await.unwrap();
}
