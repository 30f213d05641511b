use async_trait::async_trait;
use reqwest::Client;
use serde::Serialize;
use std::time::Duration;
use thiserror::Error;

use super::Notification;
use crate::config::MailConfig;

#[derive(Error, Debug)]
pub enum MailError {
    #[error("Network error: {0}")]
    NetworkError(#[from] reqwest::Error),
    #[error("Mail relay returned non-success status: {status}. Body: {body}")]
    SendFailed { status: u16, body: String },
}

/// Delivers a composed alert to its recipients
#[async_trait]
pub trait Mailer: Send + Sync {
    async fn send(&self, notification: &Notification) -> Result<(), MailError>;
}

#[derive(Debug, Serialize)]
struct RelayMessage<'a> {
    from: &'a str,
    to: &'a [String],
    subject: &'a str,
    body: &'a str,
}

/// Posts alerts as JSON to an HTTP mail relay
pub struct HttpMailRelay {
    client: Client,
    relay_url: String,
    from: String,
}

impl HttpMailRelay {
    pub fn new(config: &MailConfig) -> Result<Self, MailError> {
        let client = Client::builder()
            .timeout(Duration::from_secs(config.request_timeout_seconds))
            .build()?;

        Ok(Self { client, relay_url: config.relay_url.clone(), from: config.from.clone() })
    }
}

#[async_trait]
impl Mailer for HttpMailRelay {
    async fn send(&self, notification: &Notification) -> Result<(), MailError> {
        let message = RelayMessage {
            from: &self.from,
            to: &notification.recipients,
            subject: &notification.subject,
            body: &notification.body,
        };

        let response = self.client.post(&self.relay_url).json(&message).send().await?;
        let status = response.status();

        if !status.is_success() {
            let body = response.text().await.unwrap_or_else(|_| "Failed to read error body".to_string());
            return Err(MailError::SendFailed { status: status.as_u16(), body });
        }

        Ok(())
    }
}

/// Writes alerts to the log when no relay is configured
#[derive(Debug, Default)]
pub struct LogMailer;

#[async_trait]
impl Mailer for LogMailer {
    async fn send(&self, notification: &Notification) -> Result<(), MailError> {
        tracing::warn!(
            to = %notification.recipients.join(", "),
            subject = %notification.subject,
            "{}",
            notification.body
        );
        Ok(())
    }
}

#[cfg(test)]
pub use recording::RecordingMailer;
