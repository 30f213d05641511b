use async_trait::async_trait;
use regex::Regex;
use std::sync::Arc;
use thiserror::Error;

use super::types::{FailureReason, ProbeStart, ReplyVerdict, ServiceKind};
use crate::database::models::MonitoredService;
use crate::transport::MessageTransport;

#[derive(Debug, Error)]
pub enum ProbeError {
    #[error("invalid response pattern: {0}")]
    InvalidPattern(#[from] regex::Error),
    #[error("{0} probes do not receive replies")]
    RepliesNotSupported(ServiceKind),
}

/// Prober trait for the transports a service can be reached over
#[async_trait]
pub trait Prober: Send + Sync {
    fn kind(&self) -> ServiceKind;

    /// Send a probe to the service.
    ///
    /// Synchronous transports return the final outcome; asynchronous ones
    /// return `AwaitingReply` once the probe is handed off.
    async fn begin(&self, service: &MonitoredService) -> ProbeStart;

    /// Judge a reply that arrived later for an outstanding probe
    fn judge_reply(&self, _service: &MonitoredService, _text: &str) -> Result<ReplyVerdict, ProbeError> {
        Err(ProbeError::RepliesNotSupported(self.kind()))
    }
}

/// The prober used for each service kind
#[derive(Clone)]
pub struct Probers {
    pub http: Arc<dyn Prober>,
    pub sms: Arc<dyn Prober>,
}

impl Probers {
    pub fn for_kind(&self, kind: ServiceKind) -> &dyn Prober {
        match kind {
            ServiceKind::Http => self.http.as_ref(),
            ServiceKind::Sms => self.sms.as_ref(),
        }
    }
}

/// Render an error and its sources on one line
fn error_chain(error: &(dyn std::error::Error + 'static)) -> String {
    let mut message = error.to_string();
    let mut source = error.source();
    while let Some(cause) = source {
        message.push_str(": ");
        message.push_str(&cause.to_string());
        source = cause.source();
    }
    message
}

/// HTTP prober: one bounded GET, classified on the spot
pub struct HttpProber {
    client: reqwest::Client,
}

impl HttpProber {
    pub fn new(user_agent: &str) -> anyhow::Result<Self> {
        let client = reqwest::Client::builder().user_agent(user_agent).build()?;
        Ok(Self { client })
    }
}

#[async_trait]
impl Prober for HttpProber {
    fn kind(&self) -> ServiceKind {
        ServiceKind::Http
    }

    async fn begin(&self, service: &MonitoredService) -> ProbeStart {
        let Some(url) = service.url.as_deref() else {
            return ProbeStart::Failed(FailureReason::TransportError("URL Error 'no url configured'".into()));
        };

        // The service's own timeout bounds the fetch, which cancels itself past it
        match self.client.get(url).timeout(service.timeout).send().await {
            Ok(response) => {
                let status = response.status();
                // Consider 2xx and 3xx as success
                if status.is_success() || status.is_redirection() {
                    ProbeStart::Responded
                } else {
                    ProbeStart::Failed(FailureReason::TransportError(format!(
                        "HTTP Error Code '{}'",
                        status.as_u16()
                    )))
                }
            }
            Err(e) if e.is_timeout() => ProbeStart::Failed(FailureReason::NoResponse),
            Err(e) => {
                let e = e.without_url();
                ProbeStart::Failed(FailureReason::TransportError(format!("URL Error '{}'", error_chain(&e))))
            }
        }
    }
}

/// Reply validation for SMS services, anchored at both ends of the text
#[derive(Debug, Clone)]
pub struct ResponsePattern(Option<Regex>);

impl ResponsePattern {
    /// A blank or missing pattern accepts any non-empty reply
    pub fn compile(pattern: Option<&str>) -> Result<Self, regex::Error> {
        match pattern.filter(|pattern| !pattern.trim().is_empty()) {
            None => Ok(Self(None)),
            Some(pattern) => Ok(Self(Some(Regex::new(&format!("^(?:{pattern})$"))?))),
        }
    }

    pub fn matches(&self, text: &str) -> bool {
        match &self.0 {
            None => !text.is_empty(),
            Some(regex) => regex.is_match(text),
        }
    }
}

/// SMS prober: fire-and-forget send, replies judged later by the correlator
pub struct SmsProber {
    transport: Arc<dyn MessageTransport>,
}

impl SmsProber {
    pub fn new(transport: Arc<dyn MessageTransport>) -> Self {
        Self { transport }
    }
}

#[async_trait]
impl Prober for SmsProber {
    fn kind(&self) -> ServiceKind {
        ServiceKind::Sms
    }

    async fn begin(&self, service: &MonitoredService) -> ProbeStart {
        let Some(identity) = service.connection_identity.as_deref() else {
            return ProbeStart::Failed(FailureReason::TransportError("no connection identity configured".into()));
        };

        match self.transport.send(identity, &service.probe_text).await {
            Ok(()) => ProbeStart::AwaitingReply,
            Err(e) => ProbeStart::Failed(FailureReason::TransportError(format!("SMS send failed: {e}"))),
        }
    }

    fn judge_reply(&self, service: &MonitoredService, text: &str) -> Result<ReplyVerdict, ProbeError> {
        let pattern = ResponsePattern::compile(service.response_pattern.as_deref())?;
        Ok(if pattern.matches(text) { ReplyVerdict::Valid } else { ReplyVerdict::Invalid })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::transport::sms::RecordingTransport;
    use std::time::Duration;
    use tokio::io::{AsyncReadExt, AsyncWriteExt};
    use tokio::net::TcpListener;

    /// Serve `response` to every connection on a local port
    async fn canned_server(response: &'static str) -> String {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        tokio::spawn(async move {
            while let Ok((mut socket, _)) = listener.accept().await {
                let mut buf = [0u8; 1024];
                let _ = socket.read(&mut buf).await;
                let _ = socket.write_all(response.as_bytes()).await;
            }
        });
        format!("http://{addr}/health")
    }

    /// Accept connections but never answer
    async fn silent_server() -> (String, tokio::task::JoinHandle<()>) {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        let handle = tokio::spawn(async move {
            let mut held = Vec::new();
            while let Ok((socket, _)) = listener.accept().await {
                held.push(socket);
            }
        });
        (format!("http://{addr}/"), handle)
    }

    fn http_service(url: &str) -> MonitoredService {
        MonitoredService::http("site", url, "ops@example.org").with_timeout(Duration::from_secs(2))
    }

    fn prober() -> HttpProber {
        HttpProber::new("service-monitor-test").unwrap()
    }

    #[tokio::test]
    async fn ok_response_counts_as_responded() {
        let url = canned_server("HTTP/1.1 200 OK\r\nContent-Length: 0\r\nConnection: close\r\n\r\n").await;
        assert_eq!(prober().begin(&http_service(&url)).await, ProbeStart::Responded);
    }

    #[tokio::test]
    async fn error_status_is_reported_with_code() {
        let url = canned_server("HTTP/1.1 503 Service Unavailable\r\nContent-Length: 0\r\nConnection: close\r\n\r\n").await;
        assert_eq!(
            prober().begin(&http_service(&url)).await,
            ProbeStart::Failed(FailureReason::TransportError("HTTP Error Code '503'".into()))
        );
    }

    #[tokio::test]
    async fn refused_connection_is_a_url_error() {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let url = format!("http://{}/", listener.local_addr().unwrap());
        drop(listener);

        match prober().begin(&http_service(&url)).await {
            ProbeStart::Failed(FailureReason::TransportError(detail)) => assert!(detail.starts_with("URL Error '")),
            other => panic!("unexpected outcome {other:?}"),
        }
    }

    #[tokio::test]
    async fn silence_past_timeout_is_no_response() {
        let (url, _server) = silent_server().await;
        let service = http_service(&url).with_timeout(Duration::from_millis(200));
        assert_eq!(prober().begin(&service).await, ProbeStart::Failed(FailureReason::NoResponse));
    }

    #[tokio::test]
    async fn http_prober_does_not_judge_replies() {
        let service = http_service("http://127.0.0.1:1/");
        assert!(matches!(
            prober().judge_reply(&service, "pong"),
            Err(ProbeError::RepliesNotSupported(ServiceKind::Http))
        ));
    }

    #[tokio::test]
    async fn sms_probe_is_handed_off_and_awaits_reply() {
        let transport = Arc::new(RecordingTransport::default());
        let prober = SmsProber::new(transport.clone());
        let service = MonitoredService::sms("gateway", "+15550100", "PING", "ops@example.org");

        assert_eq!(prober.begin(&service).await, ProbeStart::AwaitingReply);
        assert_eq!(transport.sent(), vec![("+15550100".to_string(), "PING".to_string())]);
    }

    #[tokio::test]
    async fn failed_sms_send_is_a_transport_error() {
        let prober = SmsProber::new(Arc::new(RecordingTransport::failing()));
        let service = MonitoredService::sms("gateway", "+15550100", "PING", "ops@example.org");

        match prober.begin(&service).await {
            ProbeStart::Failed(FailureReason::TransportError(detail)) => assert!(detail.contains("503")),
            other => panic!("unexpected outcome {other:?}"),
        }
    }

    #[test]
    fn pattern_must_match_whole_reply() {
        let pattern = ResponsePattern::compile(Some("PONG \\d+")).unwrap();
        assert!(pattern.matches("PONG 42"));
        assert!(!pattern.matches("PONG 42 extra"));
        assert!(!pattern.matches("say PONG 42"));
    }

    #[test]
    fn missing_or_blank_pattern_accepts_any_non_empty_reply() {
        for pattern in [None, Some(""), Some("   ")] {
            let pattern = ResponsePattern::compile(pattern).unwrap();
            assert!(pattern.matches("anything\nat all"));
            assert!(!pattern.matches(""));
        }
    }

    #[test]
    fn alternation_is_anchored_as_a_group() {
        let pattern = ResponsePattern::compile(Some("OK|FINE")).unwrap();
        assert!(pattern.matches("FINE"));
        assert!(!pattern.matches("OK then"));
    }

    #[test]
    fn sms_prober_judges_replies_against_pattern() {
        let prober = SmsProber::new(Arc::new(RecordingTransport::default()));
        let service =
            MonitoredService::sms("gateway", "+15550100", "PING", "ops@example.org").with_pattern("(?i)pong");

        assert_eq!(prober.judge_reply(&service, "Pong").unwrap(), ReplyVerdict::Valid);
        assert_eq!(prober.judge_reply(&service, "nope").unwrap(), ReplyVerdict::Invalid);

        let broken = service.with_pattern("(unclosed");
        assert!(matches!(prober.judge_reply(&broken, "pong"), Err(ProbeError::InvalidPattern(_))));
    }
}
