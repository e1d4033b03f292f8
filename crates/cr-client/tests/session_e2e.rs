//! End-to-end session tests against an in-process WebSocket relay

mod common;

use std::sync::Arc;
use std::time::{Duration, Instant};

use tokio_util::sync::CancellationToken;

use common::{unused_url, RelayOptions, TestRelay};
use cr_client::{Connector, SessionDriver, Supervisor, Swarm};
use cr_core::config::{BackoffConfig, CorrelationMode, SwarmConfig};
use cr_core::error::{ConnectionError, SessionError};
use cr_core::traits::Transport;
use cr_core::SessionState;
use cr_protocol::MessageType;

#[tokio::test]
async fn test_connect_and_login_reaches_active() {
    let relay = TestRelay::start(RelayOptions {
        token: Some("t".to_string()),
        ..Default::default()
    })
    .await;
    let config = relay.client_config();

    let transport = Arc::new(Connector::new(config.clone()).unwrap().connect().await.unwrap());
    assert_eq!(transport.state(), SessionState::Active);

    let driver = SessionDriver::new(Arc::clone(&transport), config);
    let reply = driver.login().await.unwrap();
    assert_eq!(reply.message_type, MessageType::Login);
    assert_eq!(transport.state(), SessionState::Active);

    let handshakes = relay.handshakes();
    assert_eq!(handshakes.len(), 1);
    assert_eq!(handshakes[0].client_id, "c1");
    assert_eq!(handshakes[0].authorization.as_deref(), Some("Bearer t"));

    let login = &relay.received()[0];
    assert_eq!(login.message_type, MessageType::Login);
    assert_eq!(login.content["token"], "t");

    transport.close().await.unwrap();
    assert_eq!(transport.state(), SessionState::Closed);
}

#[tokio::test]
async fn test_five_cycles_with_one_second_spacing() {
    let relay = TestRelay::start(RelayOptions::default()).await;
    let mut config = relay.client_config();
    config.cycle_delay = Duration::from_secs(1);

    let transport = Connector::new(config.clone()).unwrap().connect().await.unwrap();
    let started = Instant::now();
    let report = SessionDriver::new(Arc::new(transport), config)
        .run(CancellationToken::new())
        .await
        .unwrap();

    assert!(started.elapsed() >= Duration::from_secs(4));
    assert!(report.logged_in);
    assert_eq!(report.sent, 5);
    assert_eq!(report.replies + report.timeouts, 5);
    assert!(report.logout_confirmed);
    assert_eq!(report.final_state, SessionState::Closed);

    use MessageType::*;
    assert_eq!(
        relay.received_types(),
        vec![Login, Msg, Log, Heartbeat, Msg, Log, Logout]
    );
}

#[tokio::test]
async fn test_unanswered_heartbeat_times_out_and_loop_continues() {
    let relay = TestRelay::start(RelayOptions {
        silent: vec![MessageType::Heartbeat],
        ..Default::default()
    })
    .await;
    let mut config = relay.client_config();
    config.request_timeout = Duration::from_millis(300);

    let transport = Connector::new(config.clone()).unwrap().connect().await.unwrap();
    let report = SessionDriver::new(Arc::new(transport), config)
        .run(CancellationToken::new())
        .await
        .unwrap();

    assert_eq!(report.sent, 5);
    assert_eq!(report.replies, 4);
    assert_eq!(report.timeouts, 1);
    assert_eq!(report.final_state, SessionState::Closed);
}

#[tokio::test]
async fn test_logout_without_reply_still_closes() {
    let relay = TestRelay::start(RelayOptions {
        silent: vec![MessageType::Logout],
        ..Default::default()
    })
    .await;
    let mut config = relay.client_config();
    config.cycles = 1;
    config.logout_timeout = Duration::from_millis(300);

    let transport = Connector::new(config.clone()).unwrap().connect().await.unwrap();
    let started = Instant::now();
    let report = SessionDriver::new(Arc::new(transport), config.clone())
        .run(CancellationToken::new())
        .await
        .unwrap();

    assert!(!report.logout_confirmed);
    assert_eq!(report.final_state, SessionState::Closed);
    assert!(started.elapsed() < config.logout_timeout + config.close_grace);
}

#[tokio::test]
async fn test_close_is_bounded_when_relay_never_acknowledges() {
    let relay = TestRelay::start(RelayOptions {
        deaf: true,
        ..Default::default()
    })
    .await;
    let mut config = relay.client_config();
    config.close_grace = Duration::from_millis(300);

    let transport = Connector::new(config).unwrap().connect().await.unwrap();
    let started = Instant::now();
    transport.close().await.unwrap();
    transport.close().await.unwrap();

    assert!(started.elapsed() < Duration::from_secs(2));
    assert_eq!(transport.state(), SessionState::Closed);
}

#[tokio::test]
async fn test_wrong_credential_is_authentication_failure() {
    let relay = TestRelay::start(RelayOptions {
        token: Some("secret".to_string()),
        ..Default::default()
    })
    .await;
    let mut config = relay.client_config();
    config.credential = Some("wrong".to_string());

    let result = Connector::new(config.clone()).unwrap().connect().await;
    assert!(matches!(
        result,
        Err(ConnectionError::AuthenticationFailed { status: 401 })
    ));

    // Never retried, even with unlimited attempts
    config.max_attempts = 0;
    let result = tokio::time::timeout(
        Duration::from_secs(5),
        Supervisor::new(config).unwrap().run(CancellationToken::new()),
    )
    .await
    .unwrap();
    assert!(matches!(
        result,
        Err(SessionError::Connect(ConnectionError::AuthenticationFailed { .. }))
    ));
    assert_eq!(relay.handshakes().len(), 0);
}

#[tokio::test]
async fn test_nothing_listening_is_refused() {
    let mut config = cr_core::config::ClientConfig::default();
    config.url = unused_url().await;

    let result = Connector::new(config).unwrap().connect().await;
    assert!(matches!(result, Err(ConnectionError::Refused(_))));
}

#[tokio::test]
async fn test_supervisor_gives_up_after_max_attempts() {
    let mut config = cr_core::config::ClientConfig::default();
    config.url = unused_url().await;
    config.max_attempts = 2;
    config.backoff = BackoffConfig {
        initial: Duration::from_millis(50),
        jitter: 0.0,
        ..Default::default()
    };

    let started = Instant::now();
    let result = Supervisor::new(config)
        .unwrap()
        .run(CancellationToken::new())
        .await;

    assert!(matches!(
        result,
        Err(SessionError::Connect(ConnectionError::Refused(_)))
    ));
    assert!(started.elapsed() >= Duration::from_millis(50));
}

#[tokio::test]
async fn test_relay_hang_up_reports_connection_lost() {
    // login, msg and log are answered, then the connection vanishes
    let relay = TestRelay::start(RelayOptions {
        hang_up_after: Some(3),
        ..Default::default()
    })
    .await;
    let config = relay.client_config();

    let transport = Connector::new(config.clone()).unwrap().connect().await.unwrap();
    let result = SessionDriver::new(Arc::new(transport), config)
        .run(CancellationToken::new())
        .await;

    match result {
        Err(SessionError::ConnectionLost { report }) => {
            assert!(report.logged_in);
            assert_eq!(report.replies, 2);
            assert!(report.sent >= 2);
            assert!(report.final_state.is_terminal());
        }
        other => panic!("expected ConnectionLost, got {:?}", other),
    }
}

#[tokio::test]
async fn test_malformed_frames_are_dropped() {
    let relay = TestRelay::start(RelayOptions {
        garbage_before_reply: true,
        ..Default::default()
    })
    .await;
    let mut config = relay.client_config();
    config.cycles = 2;

    let transport = Connector::new(config.clone()).unwrap().connect().await.unwrap();
    let report = SessionDriver::new(Arc::new(transport), config)
        .run(CancellationToken::new())
        .await
        .unwrap();

    assert_eq!(report.replies, 2);
    assert_eq!(report.timeouts, 0);
    assert!(report.logout_confirmed);
}

#[tokio::test]
async fn test_strict_mode_routes_pushes_to_unsolicited() {
    let relay = TestRelay::start(RelayOptions {
        push_before_reply: true,
        ..Default::default()
    })
    .await;
    let mut config = relay.client_config();
    config.cycles = 3;
    config.correlation = CorrelationMode::Strict;

    let transport = Connector::new(config.clone()).unwrap().connect().await.unwrap();
    let report = SessionDriver::new(Arc::new(transport), config)
        .run(CancellationToken::new())
        .await
        .unwrap();

    assert_eq!(report.replies, 3);
    assert_eq!(report.timeouts, 0);
    // One push ahead of login, each cycle and logout
    assert_eq!(report.unsolicited, 5);
    assert!(relay.received().iter().all(|e| e.id.is_some()));
}

#[tokio::test]
async fn test_shutdown_skips_to_logout() {
    let relay = TestRelay::start(RelayOptions::default()).await;
    let mut config = relay.client_config();
    config.cycles = 0;
    config.cycle_delay = Duration::from_millis(100);

    let transport = Connector::new(config.clone()).unwrap().connect().await.unwrap();
    let shutdown = CancellationToken::new();
    let trigger = shutdown.clone();
    tokio::spawn(async move {
        tokio::time::sleep(Duration::from_millis(350)).await;
        trigger.cancel();
    });

    let report = SessionDriver::new(Arc::new(transport), config)
        .run(shutdown)
        .await
        .unwrap();

    assert!(report.sent >= 1);
    assert!(report.logout_confirmed);
    assert_eq!(relay.received_types().last(), Some(&MessageType::Logout));
}

#[tokio::test]
async fn test_swarm_fans_out_to_every_other_client() {
    let relay = TestRelay::start(RelayOptions::default()).await;
    let mut client = relay.client_config();
    client.client_id = None;
    let swarm = SwarmConfig {
        clients: 3,
        interval: Duration::from_millis(100),
        ticks: 3,
        extra_recipient: None,
    };

    let report = Swarm::new(client, swarm)
        .unwrap()
        .run(CancellationToken::new())
        .await
        .unwrap();

    assert_eq!(report.ticks, 3);
    assert_eq!(report.clients.len(), 3);
    assert_eq!(report.total_sent(), 3);
    assert_eq!(report.total_received(), 6);
    assert!(report
        .clients
        .iter()
        .all(|c| c.final_state == SessionState::Closed));
    assert_eq!(relay.handshakes().len(), 3);
}
