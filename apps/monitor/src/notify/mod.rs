//! Failure alerts.
//!
//! Alerts are composed from a tagged failure reason and handed to a `Mailer`.
//! Delivery is best-effort: it runs after the failure state is committed and
//! a delivery error is only logged.

pub mod mailer;

pub use mailer::{HttpMailRelay, LogMailer, Mailer};

use std::sync::Arc;
use tracing::{info, warn};

use crate::database::models::MonitoredService;
use crate::monitoring::types::{FailureReason, ServiceKind};

/// A composed alert
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Notification {
    pub subject: String,
    pub body: String,
    pub recipients: Vec<String>,
}

/// Subject and body describing why `service` failed
pub fn describe_failure(service: &MonitoredService, reason: &FailureReason) -> (String, String) {
    let subject = format!("Service Monitor: Service '{}'", service.name);
    let label = match service.kind {
        ServiceKind::Sms => "mobile number",
        ServiceKind::Http => "url",
    };
    let target = service.target();

    let body = match reason {
        FailureReason::NoResponse => format!("No response for {label}: {target}"),
        FailureReason::InvalidResponse { reply } => {
            format!("Invalid response for {label}: {target}\n\nReceived: '{reply}'")
        }
        FailureReason::TransportError(detail) => format!("{detail} for {label}: {target}"),
    };

    (subject, body)
}

/// Sends one alert per failed probe to the service's recipients
pub struct Notifier {
    mailer: Arc<dyn Mailer>,
}

impl Notifier {
    pub fn new(mailer: Arc<dyn Mailer>) -> Self {
        Self { mailer }
    }

    pub fn compose(service: &MonitoredService, reason: &FailureReason) -> Notification {
        let (subject, body) = describe_failure(service, reason);
        Notification { subject, body, recipients: service.recipient_list() }
    }

    /// Deliver an alert, logging instead of failing.
    ///
    /// A service can lose its recipients while a probe is outstanding, so the
    /// timeout alert for it has nobody to go to.
    pub async fn dispatch(&self, service: &MonitoredService, reason: &FailureReason) {
        let notification = Self::compose(service, reason);

        if notification.recipients.is_empty() {
            warn!(service = %service.name, "No alert recipients configured, dropping notification");
            return;
        }

        match self.mailer.send(&notification).await {
            Ok(()) => info!(
                service = %service.name,
                recipients = notification.recipients.len(),
                "Failure notification sent"
            ),
            Err(e) => warn!(service = %service.name, "Failed to send failure notification: {}", e),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::notify::mailer::RecordingMailer;

    fn sms() -> MonitoredService {
        MonitoredService::sms("gateway", "+15550100", "PING", "ops@example.org|dev@example.org")
    }

    fn http() -> MonitoredService {
        MonitoredService::http("site", "https://example.com/health", "ops@example.org")
    }

    #[test]
    fn subject_names_the_service() {
        let (subject, _) = describe_failure(&sms(), &FailureReason::NoResponse);
        assert_eq!(subject, "Service Monitor: Service 'gateway'");
    }

    #[test]
    fn sms_bodies_name_the_mobile_number() {
        let (_, body) = describe_failure(&sms(), &FailureReason::NoResponse);
        assert_eq!(body, "No response for mobile number: +15550100");

        let (_, body) = describe_failure(&sms(), &FailureReason::InvalidResponse { reply: "ERR".into() });
        assert!(body.starts_with("Invalid response for mobile number: +15550100"));
        assert!(body.contains("'ERR'"));
    }

    #[test]
    fn http_bodies_carry_the_transport_detail() {
        let (_, body) = describe_failure(&http(), &FailureReason::TransportError("HTTP Error Code '500'".into()));
        assert_eq!(body, "HTTP Error Code '500' for url: https://example.com/health");

        let (_, body) = describe_failure(&http(), &FailureReason::NoResponse);
        assert_eq!(body, "No response for url: https://example.com/health");
    }

    #[tokio::test]
    async fn dispatch_addresses_every_recipient() {
        let mailer = Arc::new(RecordingMailer::default());
        let notifier = Notifier::new(mailer.clone());

        notifier.dispatch(&sms(), &FailureReason::NoResponse).await;

        let sent = mailer.sent();
        assert_eq!(sent.len(), 1);
        assert_eq!(sent[0].recipients, vec!["ops@example.org", "dev@example.org"]);
    }

    #[tokio::test]
    async fn dispatch_without_recipients_sends_nothing() {
        let mailer = Arc::new(RecordingMailer::default());
        let notifier = Notifier::new(mailer.clone());
        let mut service = http();
        service.recipients = " | ".into();

        notifier.dispatch(&service, &FailureReason::NoResponse).await;

        assert!(mailer.sent().is_empty());
    }

    #[tokio::test]
    async fn delivery_failure_is_swallowed() {
        let mailer = Arc::new(RecordingMailer::failing());
        let notifier = Notifier::new(mailer.clone());

        notifier.dispatch(&http(), &FailureReason::NoResponse).await;

        assert_eq!(mailer.sent().len(), 1);
    }
}
