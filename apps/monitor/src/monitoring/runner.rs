use anyhow::{Result, anyhow};
use chrono::{DateTime, Utc};
use std::sync::Arc;
use tokio::task::JoinSet;
use tracing::{debug, error, info, warn};

use super::clock::Clock;
use super::prober::Probers;
use super::state::NextStep;
use super::types::{FailureReason, PingState, ProbeStart};
use super::validation::{timeout_exceeds_interval, validate_service};
use crate::database::Database;
use crate::database::models::MonitoredService;
use crate::notify::Notifier;

/// What happened to one service during a cycle
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ServiceOutcome {
    /// Not due for a probe and nothing outstanding
    Idle,
    /// Probe outstanding, still within its timeout
    Awaiting,
    /// Probe handed off, reply expected later
    ProbeSent,
    /// Probe answered within the same call
    Responded,
    /// Probe failed within the same call
    ProbeFailed,
    /// Outstanding probe declared unanswered
    TimedOut,
    /// Another writer changed the service first; nothing was written
    Superseded,
}

/// Summary of one poll cycle
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct CycleReport {
    pub examined: usize,
    pub probes_sent: usize,
    pub responses: usize,
    pub failures: usize,
    pub timeouts: usize,
    pub awaiting: usize,
    pub idle: usize,
    pub superseded: usize,
    pub faults: usize,
}

impl CycleReport {
    fn record(&mut self, outcome: ServiceOutcome) {
        match outcome {
            ServiceOutcome::Idle => self.idle += 1,
            ServiceOutcome::Awaiting => self.awaiting += 1,
            ServiceOutcome::ProbeSent => self.probes_sent += 1,
            ServiceOutcome::Responded => {
                self.probes_sent += 1;
                self.responses += 1;
            }
            ServiceOutcome::ProbeFailed => {
                self.probes_sent += 1;
                self.failures += 1;
            }
            ServiceOutcome::TimedOut => self.timeouts += 1,
            ServiceOutcome::Superseded => self.superseded += 1,
        }
    }
}

/// Runs one poll cycle over all active services.
///
/// Services are processed concurrently and independently: each gets its own
/// task, and an error in one is logged and counted without touching the rest.
/// The caller must not start a new cycle before the previous one returned.
#[derive(Clone)]
pub struct PollCycleRunner {
    database: Arc<dyn Database>,
    probers: Probers,
    notifier: Arc<Notifier>,
    clock: Arc<dyn Clock>,
}

impl PollCycleRunner {
    pub fn new(
        database: Arc<dyn Database>,
        probers: Probers,
        notifier: Arc<Notifier>,
        clock: Arc<dyn Clock>,
    ) -> Self {
        Self { database, probers, notifier, clock }
    }

    /// Run one cycle. Never fails: every problem ends up in the report's fault count.
    pub async fn run_cycle(&self) -> CycleReport {
        let mut report = CycleReport::default();

        let services = match self.database.get_active_services().await {
            Ok(services) => services,
            Err(e) => {
                error!("Failed to load active services: {:#}", e);
                report.faults += 1;
                return report;
            }
        };
        report.examined = services.len();

        let mut tasks = JoinSet::new();
        for service in services {
            let runner = self.clone();
            tasks.spawn(async move {
                let name = service.name.clone();
                (name, runner.process_service(service).await)
            });
        }

        while let Some(joined) = tasks.join_next().await {
            match joined {
                Ok((_, Ok(outcome))) => report.record(outcome),
                Ok((name, Err(e))) => {
                    error!(service = %name, "Failed to process service: {:#}", e);
                    report.faults += 1;
                }
                Err(e) => {
                    error!("Service task aborted: {}", e);
                    report.faults += 1;
                }
            }
        }

        report
    }

    /// Apply the state machine to one service.
    ///
    /// Only a new probe requires a valid config. An outstanding request still
    /// times out after the service was edited into an invalid one.
    pub async fn process_service(&self, service: MonitoredService) -> Result<ServiceOutcome> {
        let id = service.id.ok_or_else(|| anyhow!("service '{}' has not been persisted", service.name))?;

        let now = self.clock.now();
        match service.next_step(now) {
            NextStep::Probe => {
                validate_service(&service)?;
                self.probe(service, id, now).await
            }
            NextStep::TimeOut => {
                let request_at = service
                    .last_request_at
                    .ok_or_else(|| anyhow!("service '{}' timed out without a request", service.name))?;
                self.fail(&service, id, request_at, FailureReason::NoResponse, ServiceOutcome::TimedOut).await
            }
            NextStep::Wait if service.is_awaiting_response() => Ok(ServiceOutcome::Awaiting),
            NextStep::Wait => Ok(ServiceOutcome::Idle),
        }
    }

    async fn probe(&self, mut service: MonitoredService, id: i64, now: DateTime<Utc>) -> Result<ServiceOutcome> {
        if service.is_awaiting_response() {
            debug!(service = %service.name, "Previous probe unresolved, superseding it");
        }
        if timeout_exceeds_interval(&service) {
            warn!(
                service = %service.name,
                interval = ?service.ping_interval,
                timeout = ?service.timeout,
                "Timeout is longer than the ping interval, unanswered probes will be superseded"
            );
        }

        if !self.database.mark_request_sent(id, service.last_request_at, now).await? {
            debug!(service = %service.name, "Service changed since it was loaded, skipping probe");
            return Ok(ServiceOutcome::Superseded);
        }

        service.last_request_at = Some(now);
        service.last_response_at = None;
        service.ping_state = PingState::RequestSent;
        info!(service = %service.name, kind = %service.kind, target = %service.target(), "Probe sent");

        // No store lock is held while the transport works
        match self.probers.for_kind(service.kind).begin(&service).await {
            ProbeStart::AwaitingReply => Ok(ServiceOutcome::ProbeSent),
            ProbeStart::Responded => {
                let resolved = self
                    .database
                    .record_resolution(id, now, PingState::ValidResponseReceived, self.clock.now())
                    .await?;
                if resolved {
                    info!(service = %service.name, "Valid response received");
                    Ok(ServiceOutcome::Responded)
                } else {
                    Ok(ServiceOutcome::Superseded)
                }
            }
            ProbeStart::Failed(reason) => {
                self.fail(&service, id, now, reason, ServiceOutcome::ProbeFailed).await
            }
        }
    }

    /// Commit a failure state, then alert
    async fn fail(
        &self,
        service: &MonitoredService,
        id: i64,
        request_at: DateTime<Utc>,
        reason: FailureReason,
        outcome: ServiceOutcome,
    ) -> Result<ServiceOutcome> {
        let state = reason.resulting_state();
        if !self.database.record_resolution(id, request_at, state, self.clock.now()).await? {
            debug!(service = %service.name, "Request already resolved elsewhere");
            return Ok(ServiceOutcome::Superseded);
        }

        warn!(service = %service.name, state = %state, reason = ?reason, "Service failed to respond");
        self.notifier.dispatch(service, &reason).await;
        Ok(outcome)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn report_counts_probe_outcomes() {
        let mut report = CycleReport::default();
        for outcome in [
            ServiceOutcome::ProbeSent,
            ServiceOutcome::Responded,
            ServiceOutcome::ProbeFailed,
            ServiceOutcome::TimedOut,
            ServiceOutcome::Awaiting,
            ServiceOutcome::Idle,
            ServiceOutcome::Superseded,
        ] {
            report.record(outcome);
        }

        assert_eq!(report.probes_sent, 3);
        assert_eq!(report.responses, 1);
        assert_eq!(report.failures, 1);
        assert_eq!(report.timeouts, 1);
        assert_eq!(report.awaiting, 1);
        assert_eq!(report.idle, 1);
        assert_eq!(report.superseded, 1);
        assert_eq!(report.faults, 0);
    }
}
