//! `courier send`: a single correlated request

use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result};
use serde_json::Value;
use tokio_util::sync::CancellationToken;

use cr_client::{Connector, RequestEngine};
use cr_core::config::ClientConfig;
use cr_core::error::RequestError;
use cr_core::traits::Transport;
use cr_protocol::{Envelope, MessageType};

use crate::output::print_warning;

/// What to send
#[derive(Debug, Clone)]
pub struct SendOptions {
    pub message_type: String,
    pub to: Option<Vec<String>>,
    pub subject: Option<String>,
    pub content: Option<String>,
    pub timeout: Option<Duration>,
}

/// Build the envelope described by `options`
pub fn build_envelope(options: &SendOptions, config: &ClientConfig, sender: &str) -> Envelope {
    let message_type = MessageType::parse(&options.message_type);
    let envelope = match message_type {
        MessageType::Login => {
            Envelope::login(config.credential.as_deref().unwrap_or_default())
        }
        other => Envelope::new(other),
    };

    let envelope = match &options.to {
        Some(to) if to.len() == 1 => envelope.to(to[0].clone()),
        Some(to) => envelope.to(to.clone()),
        None => envelope.to(config.recipient.clone()),
    };

    let envelope = match &options.content {
        // JSON if it parses, plain text otherwise
        Some(raw) => envelope.content(
            serde_json::from_str::<Value>(raw).unwrap_or_else(|_| Value::String(raw.clone())),
        ),
        None => envelope,
    };

    envelope
        .from(sender)
        .subject(options.subject.clone().unwrap_or_else(|| config.subject.clone()))
}

/// Connect, send one envelope, print the reply as JSON, then close
pub async fn send_command(
    config: ClientConfig,
    options: SendOptions,
    shutdown: CancellationToken,
) -> Result<()> {
    let connector = Connector::new(config.clone()).context("Invalid configuration")?;
    let transport = Arc::new(
        connector
            .connect()
            .await
            .with_context(|| format!("Failed to connect to {}", config.url))?,
    );

    let sender = config.sender_for(transport.client_id());
    let envelope = build_envelope(&options, &config, &sender);
    let timeout = options.timeout.unwrap_or(config.request_timeout);

    let engine = RequestEngine::new(Arc::clone(&transport), config.correlation);
    let outcome = tokio::select! {
        result = engine.request(envelope, timeout) => Some(result),
        _ = shutdown.cancelled() => None,
    };

    if let Err(e) = transport.close().await {
        tracing::warn!("Close failed: {}", e);
    }

    match outcome {
        Some(Ok(reply)) => {
            println!("{}", serde_json::to_string_pretty(&reply)?);
            Ok(())
        }
        Some(Err(RequestError::Timeout { timeout })) => {
            print_warning(&format!("No reply within {:?}", timeout));
            anyhow::bail!("Request timed out")
        }
        Some(Err(RequestError::ConnectionLost)) => {
            anyhow::bail!("Connection lost before a reply arrived")
        }
        None => {
            print_warning("Interrupted");
            Ok(())
        }
    }
}
