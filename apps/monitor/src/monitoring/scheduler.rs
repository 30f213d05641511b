use std::time::Duration;
use tokio::sync::watch;
use tokio::time::{MissedTickBehavior, interval};
use tracing::{debug, info, warn};

use super::runner::PollCycleRunner;

/// Periodic trigger for poll cycles
#[derive(Debug, Clone)]
pub struct Schedule {
    pub description: String,
    pub every: Duration,
}

impl Schedule {
    pub fn new(description: impl Into<String>, every: Duration) -> Self {
        Self { description: description.into(), every }
    }

    /// Run a poll cycle on every tick until `shutdown` flips to true.
    ///
    /// Cycles never overlap: the next tick is only awaited once the current
    /// cycle has returned, and ticks missed meanwhile are skipped.
    pub fn spawn(&self, runner: PollCycleRunner, mut shutdown: watch::Receiver<bool>) -> tokio::task::JoinHandle<()> {
        let schedule = self.clone();

        tokio::spawn(async move {
            info!("{} started, polling every {:?}", schedule.description, schedule.every);
            let mut timer = interval(schedule.every);
            timer.set_missed_tick_behavior(MissedTickBehavior::Skip);

            loop {
                tokio::select! {
                    _ = timer.tick() => {}
                    _ = shutdown.changed() => break,
                }
                if *shutdown.borrow() {
                    break;
                }

                let report = runner.run_cycle().await;
                if report.faults > 0 {
                    warn!(faults = report.faults, "Poll cycle finished with faults");
                }
                debug!(
                    examined = report.examined,
                    probes_sent = report.probes_sent,
                    responses = report.responses,
                    failures = report.failures,
                    timeouts = report.timeouts,
                    awaiting = report.awaiting,
                    "Poll cycle complete"
                );
            }

            info!("{} stopped", schedule.description);
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::database::{Database, DatabaseImpl, initialize_database};
    use crate::database::models::MonitoredService;
    use crate::monitoring::clock::SystemClock;
    use crate::monitoring::prober::{Probers, SmsProber};
    use crate::monitoring::types::PingState;
    use crate::notify::Notifier;
    use crate::notify::mailer::RecordingMailer;
    use crate::transport::sms::RecordingTransport;
    use std::sync::Arc;

    #[tokio::test]
    async fn scheduled_cycles_probe_until_shutdown() {
        let dir = tempfile::tempdir().unwrap();
        let pool = crate::pool::connect(dir.path().join("monitor.db").to_str().unwrap()).await.unwrap();
        initialize_database(&pool.get().await.unwrap()).await.unwrap();
        let database: Arc<dyn Database> = Arc::new(DatabaseImpl::new_from_pool(pool));
        database
            .save_service(&MonitoredService::sms("gateway", "+15550100", "PING", "ops@example.org"))
            .await
            .unwrap();

        let transport = Arc::new(RecordingTransport::default());
        let sms = Arc::new(SmsProber::new(transport.clone()));
        let probers = Probers { http: sms.clone(), sms };
        let notifier = Arc::new(Notifier::new(Arc::new(RecordingMailer::default())));
        let runner = PollCycleRunner::new(database.clone(), probers, notifier, Arc::new(SystemClock));

        let (shutdown_tx, shutdown_rx) = watch::channel(false);
        let handle = Schedule::new("Test Schedule", Duration::from_millis(50)).spawn(runner, shutdown_rx);

        tokio::time::sleep(Duration::from_millis(200)).await;
        shutdown_tx.send(true).unwrap();
        tokio::time::timeout(Duration::from_secs(2), handle).await.unwrap().unwrap();

        // Interval is 30 minutes, so several ticks still mean a single probe
        assert_eq!(transport.sent().len(), 1);
        let service = database.get_service_by_name("gateway").await.unwrap().unwrap();
        assert_eq!(service.ping_state, PingState::RequestSent);
    }
}
