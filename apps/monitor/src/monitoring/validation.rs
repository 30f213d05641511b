//! Configuration checks for monitored services.
//!
//! Services are written by an administrative process the monitor does not
//! control, so every poll validates a service before probing it.

use anyhow::{Result, anyhow};
use std::time::Duration;
use url::Url;

use super::prober::ResponsePattern;
use super::types::ServiceKind;
use crate::database::models::MonitoredService;

/// Validates a service's configuration for its transport kind
pub fn validate_service(service: &MonitoredService) -> Result<()> {
    if service.name.trim().is_empty() {
        return Err(anyhow!("Service name must not be empty"));
    }

    match service.kind {
        ServiceKind::Http => validate_http_target(service.url.as_deref())?,
        ServiceKind::Sms => validate_sms_target(service)?,
    }

    validate_ping_interval(service.ping_interval)?;
    validate_timeout(service.timeout)?;
    validate_recipients(&service.recipient_list())?;

    Ok(())
}

/// Validate HTTP/HTTPS target
fn validate_http_target(target: Option<&str>) -> Result<()> {
    let target = target.ok_or_else(|| anyhow!("HTTP service has no url"))?;
    let url = Url::parse(target).map_err(|e| anyhow!("Invalid URL: {}", e))?;

    match url.scheme() {
        "http" | "https" => {}
        other => return Err(anyhow!("Invalid scheme for HTTP service: {}", other)),
    }

    if url.host_str().is_none() {
        return Err(anyhow!("URL has no host: {}", target));
    }

    Ok(())
}

/// Validate SMS target, probe text and reply pattern
fn validate_sms_target(service: &MonitoredService) -> Result<()> {
    match service.connection_identity.as_deref().map(str::trim) {
        None | Some("") => return Err(anyhow!("SMS service has no connection identity")),
        Some(_) => {}
    }

    if service.probe_text.trim().is_empty() {
        return Err(anyhow!("SMS service has no probe text"));
    }

    ResponsePattern::compile(service.response_pattern.as_deref())
        .map_err(|e| anyhow!("Invalid response pattern: {}", e))?;

    Ok(())
}

pub fn validate_ping_interval(interval: Duration) -> Result<()> {
    if interval.is_zero() {
        return Err(anyhow!("Ping interval must be greater than zero"));
    }
    Ok(())
}

pub fn validate_timeout(timeout: Duration) -> Result<()> {
    if timeout.is_zero() {
        return Err(anyhow!("Timeout must be greater than zero"));
    }
    Ok(())
}

fn validate_recipients(recipients: &[String]) -> Result<()> {
    if recipients.is_empty() {
        return Err(anyhow!("At least one alert recipient is required"));
    }

    if let Some(bad) = recipients.iter().find(|address| !address.contains('@')) {
        return Err(anyhow!("Invalid recipient address: {}", bad));
    }

    Ok(())
}

/// Timeout longer than the interval means a new probe can supersede an
/// unanswered one before it is declared timed out. Allowed, but worth a warning.
pub fn timeout_exceeds_interval(service: &MonitoredService) -> bool {
    service.timeout > service.ping_interval
}

#[cfg(test)]
mod tests {
    use super::*;

    fn http(url: &str) -> MonitoredService {
        MonitoredService::http("site", url, "ops@example.org")
    }

    fn sms() -> MonitoredService {
        MonitoredService::sms("gateway", "+15550100", "PING", "ops@example.org")
    }

    #[test]
    fn test_validate_http_service() {
        // Valid, private addresses included
        assert!(validate_service(&http("https://example.com")).is_ok());
        assert!(validate_service(&http("http://10.0.0.1:8080/health")).is_ok());

        // Invalid
        assert!(validate_service(&http("ftp://example.com")).is_err());
        assert!(validate_service(&http("not a url")).is_err());

        let mut no_url = http("https://example.com");
        no_url.url = None;
        assert!(validate_service(&no_url).is_err());
    }

    #[test]
    fn test_validate_sms_service() {
        assert!(validate_service(&sms()).is_ok());
        assert!(validate_service(&sms().with_pattern("PONG \\d+")).is_ok());

        assert!(validate_service(&sms().with_pattern("(unclosed")).is_err());

        let mut no_identity = sms();
        no_identity.connection_identity = Some("  ".into());
        assert!(validate_service(&no_identity).is_err());

        let mut no_text = sms();
        no_text.probe_text = String::new();
        assert!(validate_service(&no_text).is_err());
    }

    #[test]
    fn test_validate_durations() {
        assert!(validate_service(&sms().with_interval(Duration::ZERO)).is_err());
        assert!(validate_service(&sms().with_timeout(Duration::ZERO)).is_err());
    }

    #[test]
    fn test_validate_recipients() {
        let mut service = sms();
        service.recipients = String::new();
        assert!(validate_service(&service).is_err());

        service.recipients = "ops@example.org|oncall".into();
        assert!(validate_service(&service).is_err());

        service.recipients = "ops@example.org | oncall@example.org".into();
        assert!(validate_service(&service).is_ok());
    }

    #[test]
    fn test_timeout_exceeds_interval() {
        let service = sms().with_interval(Duration::from_secs(60)).with_timeout(Duration::from_secs(120));
        assert!(timeout_exceeds_interval(&service));
        assert!(!timeout_exceeds_interval(&sms()));
    }
}
