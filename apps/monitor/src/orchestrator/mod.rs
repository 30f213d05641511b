/// Orchestrator module - wires the monitor together
///
/// The orchestrator:
/// - Opens the store and applies migrations
/// - Picks the configured transports, or the fallbacks when none are configured
/// - Drives the poll schedule and the inbound webhook until shutdown
/// - Serves the one-shot operations behind the CLI


use anyhow::{Result, anyhow};
use chrono::TimeDelta;
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::watch;
use tracing::{info, warn};

use crate::config::Config;
use crate::database::models::{MonitoredService, PingLogEntry};
use crate::database::{Database, DatabaseImpl, initialize_database};
use crate::monitoring::clock::{Clock, SystemClock};
use crate::monitoring::correlator::{CorrelationOutcome, Correlator};
use crate::monitoring::prober::{HttpProber, Probers, SmsProber};
use crate::monitoring::runner::{CycleReport, PollCycleRunner};
use crate::monitoring::scheduler::Schedule;
use crate::notify::{HttpMailRelay, LogMailer, Mailer, Notifier};
use crate::pool;
use crate::server;
use crate::transport::{HttpSmsGateway, MessageTransport, UnconfiguredGateway};

/// Main orchestrator for the service monitor
pub struct Orchestrator {
    config: Arc<Config>,
    database: Arc<dyn Database>,
    runner: PollCycleRunner,
    correlator: Arc<Correlator>,
    clock: Arc<dyn Clock>,
}

impl Orchestrator {
    /// Create an orchestrator backed by the configured database and transports
    pub async fn new(config: Config) -> Result<Self> {
        let pool = pool::connect(&config.database.path).await?;

        // Get database connection for initialization
        let conn = pool.get().await?;
        info!("Initializing database schema...");
        initialize_database(&conn).await?;
        drop(conn);

        let database: Arc<dyn Database> = Arc::new(DatabaseImpl::new_from_pool(pool));

        let transport: Arc<dyn MessageTransport> = match &config.sms_gateway {
            Some(gateway) => {
                info!("Sending SMS probes through {}", gateway.url);
                Arc::new(HttpSmsGateway::new(gateway)?)
            }
            None => {
                warn!("No SMS gateway configured - SMS probes will be recorded as failed sends");
                Arc::new(UnconfiguredGateway)
            }
        };

        let mailer: Arc<dyn Mailer> = match &config.mail {
            Some(mail) => Arc::new(HttpMailRelay::new(mail)?),
            None => {
                warn!("No mail relay configured - failure alerts will only be logged");
                Arc::new(LogMailer)
            }
        };

        let probers = Probers {
            http: Arc::new(HttpProber::new(&config.http.user_agent)?),
            sms: Arc::new(SmsProber::new(transport)),
        };

        Ok(Self::with_parts(config, database, probers, mailer, Arc::new(SystemClock)))
    }

    /// Assemble an orchestrator from already built parts
    pub fn with_parts(
        config: Config,
        database: Arc<dyn Database>,
        probers: Probers,
        mailer: Arc<dyn Mailer>,
        clock: Arc<dyn Clock>,
    ) -> Self {
        let notifier = Arc::new(Notifier::new(mailer));
        let runner = PollCycleRunner::new(database.clone(), probers.clone(), notifier.clone(), clock.clone());
        let correlator = Arc::new(Correlator::new(database.clone(), probers.sms, notifier, clock.clone()));

        Self { config: Arc::new(config), database, runner, correlator, clock }
    }

    /// Run the schedule and the inbound webhook until Ctrl-C
    pub async fn run(&self) -> Result<()> {
        info!("Starting service monitor...");

        let (shutdown_tx, shutdown_rx) = watch::channel(false);
        let schedule = Schedule::new(self.config.schedule.description.clone(), self.config.schedule.tick());
        let poller = schedule.spawn(self.runner.clone(), shutdown_rx);

        if self.config.inbound.enabled {
            let server = server::build_server(&self.config.inbound, self.correlator.clone())?;
            let handle = server.handle();
            tokio::pin!(server);

            tokio::select! {
                result = &mut server => {
                    result?;
                    warn!("Inbound webhook stopped unexpectedly");
                }
                result = tokio::signal::ctrl_c() => {
                    result?;
                    info!("Shutdown requested, stopping inbound webhook...");
                    let (_, result) = tokio::join!(handle.stop(true), &mut server);
                    result?;
                }
            }
        } else {
            info!("Inbound webhook disabled - SMS replies will not be correlated");
            tokio::signal::ctrl_c().await?;
            info!("Shutdown requested");
        }

        // The running cycle, if any, completes before the poller exits
        shutdown_tx.send_replace(true);
        poller.await?;

        info!("Service monitor stopped");
        Ok(())
    }

    /// Run a single poll cycle
    pub async fn poll_once(&self) -> CycleReport {
        self.runner.run_cycle().await
    }

    /// Feed one inbound message to the correlator
    pub async fn inbound(&self, sender: &str, text: &str) -> Result<CorrelationOutcome> {
        Ok(self.correlator.handle_inbound(sender, text).await?)
    }

    /// Every registered service, active or not
    pub async fn services(&self) -> Result<Vec<MonitoredService>> {
        self.database.get_all_services().await
    }

    /// Ping log of one service by name, newest first
    pub async fn history(&self, name: &str, limit: usize) -> Result<Vec<PingLogEntry>> {
        let service = self
            .database
            .get_service_by_name(name)
            .await?
            .ok_or_else(|| anyhow!("no service named '{}'", name))?;
        let id = service.id.ok_or_else(|| anyhow!("service '{}' has no id", name))?;

        self.database.get_ping_log(id, limit).await
    }

    /// Failure entries of the last `hours`, paired with the service name
    pub async fn recent_failures(&self, hours: i64, limit: usize) -> Result<Vec<(String, PingLogEntry)>> {
        let window = TimeDelta::try_hours(hours.max(0)).ok_or_else(|| anyhow!("{} hours is too far back", hours))?;
        let since = self
            .clock
            .now()
            .checked_sub_signed(window)
            .ok_or_else(|| anyhow!("{} hours is too far back", hours))?;
        let entries = self.database.get_recent_failures(since, limit).await?;

        let names: HashMap<i64, String> = self
            .database
            .get_all_services()
            .await?
            .into_iter()
            .filter_map(|service| Some((service.id?, service.name)))
            .collect();

        Ok(entries
            .into_iter()
            .map(|entry| {
                let name = names.get(&entry.service_id).cloned().unwrap_or_else(|| format!("#{}", entry.service_id));
                (name, entry)
            })
            .collect())
    }
}
