//! Per-service state machine predicates.
//!
//! A service cycles `NeverProbed -> RequestSent -> {Valid, Invalid, NoResponse}
//! -> RequestSent -> ...` while it is active. Re-probing is gated by the ping
//! interval alone; the timeout only decides when an outstanding request is
//! declared unanswered. The two durations are independent and neither is
//! required to be shorter than the other.

use chrono::{DateTime, Utc};
use std::time::Duration;

use super::types::PingState;
use crate::database::models::MonitoredService;

/// What a poll cycle should do with a service right now
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NextStep {
    /// Start a new probe
    Probe,
    /// Declare the outstanding request unanswered
    TimeOut,
    /// Nothing to do until a later cycle
    Wait,
}

/// Time between two instants, zero when `now` is earlier than `since`
fn elapsed(since: DateTime<Utc>, now: DateTime<Utc>) -> Duration {
    (now - since).to_std().unwrap_or(Duration::ZERO)
}

impl MonitoredService {
    /// True if no probe was ever sent or the ping interval has passed since the last one.
    pub fn can_probe_again(&self, now: DateTime<Utc>) -> bool {
        match self.last_request_at {
            None => true,
            Some(requested) => elapsed(requested, now) >= self.ping_interval,
        }
    }

    /// True if a probe was sent and the timeout has passed since.
    ///
    /// Callers only act on this while the service is in `RequestSent`.
    pub fn has_timed_out(&self, now: DateTime<Utc>) -> bool {
        match self.last_request_at {
            None => false,
            Some(requested) => elapsed(requested, now) >= self.timeout,
        }
    }

    pub fn is_awaiting_response(&self) -> bool {
        self.ping_state == PingState::RequestSent
    }

    pub fn next_step(&self, now: DateTime<Utc>) -> NextStep {
        if self.can_probe_again(now) {
            NextStep::Probe
        } else if self.is_awaiting_response() && self.has_timed_out(now) {
            NextStep::TimeOut
        } else {
            NextStep::Wait
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeDelta;

    fn minutes(n: i64) -> TimeDelta {
        TimeDelta::minutes(n)
    }

    fn service() -> MonitoredService {
        MonitoredService::http("site", "https://example.com", "ops@example.org")
            .with_interval(Duration::from_secs(30 * 60))
            .with_timeout(Duration::from_secs(5 * 60))
    }

    fn sent_at(t0: DateTime<Utc>) -> MonitoredService {
        let mut service = service();
        service.last_request_at = Some(t0);
        service.ping_state = PingState::RequestSent;
        service
    }

    #[test]
    fn never_probed_can_probe_and_never_times_out() {
        let now = Utc::now();
        let service = service();
        assert!(service.can_probe_again(now));
        assert!(!service.has_timed_out(now));
        assert_eq!(service.next_step(now), NextStep::Probe);
    }

    #[test]
    fn interval_boundary_is_inclusive() {
        let t0 = Utc::now();
        let service = sent_at(t0);
        assert!(!service.can_probe_again(t0 + minutes(29)));
        assert!(service.can_probe_again(t0 + minutes(30)));
        assert!(service.can_probe_again(t0 + minutes(31)));
    }

    #[test]
    fn timeout_boundary_is_inclusive() {
        let t0 = Utc::now();
        let service = sent_at(t0);
        assert!(!service.has_timed_out(t0 + minutes(4)));
        assert!(service.has_timed_out(t0 + minutes(5)));
    }

    #[test]
    fn waits_before_timeout_and_times_out_after() {
        let t0 = Utc::now();
        let service = sent_at(t0);
        assert_eq!(service.next_step(t0 + minutes(3)), NextStep::Wait);
        assert_eq!(service.next_step(t0 + minutes(6)), NextStep::TimeOut);
    }

    #[test]
    fn resolved_service_waits_for_interval() {
        let t0 = Utc::now();
        let mut service = sent_at(t0);
        service.ping_state = PingState::InvalidResponseReceived;
        assert_eq!(service.next_step(t0 + minutes(6)), NextStep::Wait);
        assert_eq!(service.next_step(t0 + minutes(30)), NextStep::Probe);
    }

    #[test]
    fn interval_wins_over_pending_timeout() {
        // timeout longer than interval: a new probe supersedes the old one
        let t0 = Utc::now();
        let mut service = sent_at(t0);
        service.timeout = Duration::from_secs(60 * 60);
        assert_eq!(service.next_step(t0 + minutes(30)), NextStep::Probe);
    }

    #[test]
    fn clock_skew_counts_as_no_time_elapsed() {
        let t0 = Utc::now();
        let service = sent_at(t0);
        assert!(!service.has_timed_out(t0 - minutes(10)));
        assert!(!service.can_probe_again(t0 - minutes(10)));
    }
}
