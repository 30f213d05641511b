use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::time::Duration;

use crate::monitoring::types::{PingState, ServiceKind};

/// Separator used in the stored recipient list
pub const RECIPIENT_SEPARATOR: char = '|';

/// MonitoredService model - one external target and its runtime state
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MonitoredService {
    pub id: Option<i64>,
    pub name: String,
    pub kind: ServiceKind,
    /// HTTP only: the url to fetch
    pub url: Option<String>,
    /// SMS only: the connection identity probes are sent to and replies come from
    pub connection_identity: Option<String>,
    /// SMS only: the text sent with each probe
    pub probe_text: String,
    /// SMS only: replies must match this pattern; `None` accepts any non-empty reply
    pub response_pattern: Option<String>,
    /// Alert recipients separated by `|`
    pub recipients: String,
    pub ping_interval: Duration,
    pub timeout: Duration,
    pub active: bool,
    pub last_request_at: Option<DateTime<Utc>>,
    pub last_response_at: Option<DateTime<Utc>>,
    pub ping_state: PingState,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl MonitoredService {
    fn new(name: String, kind: ServiceKind, recipients: String) -> Self {
        let now = Utc::now();
        Self {
            id: None,
            name,
            kind,
            url: None,
            connection_identity: None,
            probe_text: String::new(),
            response_pattern: None,
            recipients,
            ping_interval: Duration::from_secs(30 * 60),
            timeout: Duration::from_secs(5 * 60),
            active: true,
            last_request_at: None,
            last_response_at: None,
            ping_state: PingState::NeverProbed,
            created_at: now,
            updated_at: now,
        }
    }

    /// Create a new HTTP service
    pub fn http(name: impl Into<String>, url: impl Into<String>, recipients: impl Into<String>) -> Self {
        let mut service = Self::new(name.into(), ServiceKind::Http, recipients.into());
        service.url = Some(url.into());
        service
    }

    /// Create a new SMS service
    pub fn sms(
        name: impl Into<String>,
        identity: impl Into<String>,
        probe_text: impl Into<String>,
        recipients: impl Into<String>,
    ) -> Self {
        let mut service = Self::new(name.into(), ServiceKind::Sms, recipients.into());
        service.connection_identity = Some(identity.into());
        service.probe_text = probe_text.into();
        service
    }

    pub fn with_interval(mut self, interval: Duration) -> Self {
        self.ping_interval = interval;
        self
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    pub fn with_pattern(mut self, pattern: impl Into<String>) -> Self {
        self.response_pattern = Some(pattern.into());
        self
    }

    /// Recipients as individual addresses, blanks dropped
    pub fn recipient_list(&self) -> Vec<String> {
        self.recipients
            .split(RECIPIENT_SEPARATOR)
            .map(str::trim)
            .filter(|address| !address.is_empty())
            .map(str::to_string)
            .collect()
    }

    /// Where probes for this service go, for logs and alerts
    pub fn target(&self) -> &str {
        match self.kind {
            ServiceKind::Http => self.url.as_deref().unwrap_or_default(),
            ServiceKind::Sms => self.connection_identity.as_deref().unwrap_or_default(),
        }
    }

    /// Convert a timestamp to the stored unix milliseconds
    pub fn timestamp_to_i64(time: DateTime<Utc>) -> i64 {
        time.timestamp_millis()
    }

    /// Convert stored unix milliseconds back to a timestamp
    pub fn i64_to_timestamp(millis: i64) -> DateTime<Utc> {
        DateTime::from_timestamp_millis(millis).unwrap_or_default()
    }
}

/// PingLogEntry model - one state transition of one service
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PingLogEntry {
    pub id: Option<i64>,
    pub service_id: i64,
    pub logged_at: DateTime<Utc>,
    pub ping_state: PingState,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn splits_recipients_on_pipe() {
        let service = MonitoredService::http("site", "https://example.com", " ops@example.org| |dev@example.org |");
        assert_eq!(service.recipient_list(), vec!["ops@example.org", "dev@example.org"]);
    }

    #[test]
    fn target_follows_kind() {
        let http = MonitoredService::http("site", "https://example.com", "ops@example.org");
        assert_eq!(http.target(), "https://example.com");

        let sms = MonitoredService::sms("gateway", "+15550100", "PING", "ops@example.org");
        assert_eq!(sms.target(), "+15550100");
        assert_eq!(sms.ping_state, PingState::NeverProbed);
    }

    #[test]
    fn timestamps_keep_millisecond_precision() {
        let time = MonitoredService::i64_to_timestamp(1_700_000_000_123);
        assert_eq!(MonitoredService::timestamp_to_i64(time), 1_700_000_000_123);
    }
}
