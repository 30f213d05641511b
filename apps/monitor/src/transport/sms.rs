use async_trait::async_trait;
use reqwest::Client;
use serde::Serialize;
use std::time::Duration;
use thiserror::Error;

use crate::config::SmsGatewayConfig;

#[derive(Debug, Error)]
pub enum SendError {
    #[error("no SMS gateway is configured")]
    NotConfigured,
    #[error("network error: {0}")]
    Network(#[from] reqwest::Error),
    #[error("gateway returned non-success status {status}: {body}")]
    Rejected { status: u16, body: String },
}

/// Hands outbound text messages to whatever delivers them.
///
/// Delivery is asynchronous: `Ok` means the message was accepted, not that it
/// reached the destination.
#[async_trait]
pub trait MessageTransport: Send + Sync {
    async fn send(&self, destination: &str, text: &str) -> Result<(), SendError>;
}

#[derive(Debug, Serialize)]
struct OutboundMessage<'a> {
    to: &'a str,
    text: &'a str,
}

/// Posts outbound messages as JSON to an HTTP SMS gateway
pub struct HttpSmsGateway {
    client: Client,
    url: String,
    token: Option<String>,
}

impl HttpSmsGateway {
    pub fn new(config: &SmsGatewayConfig) -> Result<Self, SendError> {
        let client = Client::builder()
            .timeout(Duration::from_secs(config.request_timeout_seconds))
            .build()?;

        Ok(Self { client, url: config.url.clone(), token: config.token.clone() })
    }
}

#[async_trait]
impl MessageTransport for HttpSmsGateway {
    async fn send(&self, destination: &str, text: &str) -> Result<(), SendError> {
        let mut request = self
            .client
            .post(&self.url)
            .json(&OutboundMessage { to: destination, text });

        if let Some(token) = &self.token {
            request = request.bearer_auth(token);
        }

        let response = request.send().await?;
        let status = response.status();

        if !status.is_success() {
            let body = response.text().await.unwrap_or_else(|_| "Failed to read error body".to_string());
            return Err(SendError::Rejected { status: status.as_u16(), body });
        }

        tracing::debug!(destination, "SMS handed to gateway");
        Ok(())
    }
}

/// Stand-in used when no gateway is configured; every send fails
#[derive(Debug, Default)]
pub struct UnconfiguredGateway;

#[async_trait]
impl MessageTransport for UnconfiguredGateway {
    async fn send(&self, _destination: &str, _text: &str) -> Result<(), SendError> {
        Err(SendError::NotConfigured)
    }
}

#[cfg(test)]
pub use recording::RecordingTransport;
