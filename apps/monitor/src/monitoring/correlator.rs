use std::sync::Arc;
use thiserror::Error;
use tracing::{debug, info, warn};

use super::clock::Clock;
use super::prober::{ProbeError, Prober};
use super::types::{FailureReason, PingState, ReplyVerdict};
use crate::database::Database;
use crate::notify::Notifier;

#[derive(Debug, Error)]
pub enum CorrelationError {
    #[error("cannot judge reply for service '{service}': {source}")]
    Judge {
        service: String,
        #[source]
        source: ProbeError,
    },
    #[error(transparent)]
    Store(#[from] anyhow::Error),
}

/// What became of an inbound message
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CorrelationOutcome {
    /// No active SMS service is bound to the sender
    Ignored,
    /// The sender's service was not awaiting a reply, or another writer resolved it first
    Stale { service: String },
    /// The reply resolved the outstanding request
    Recorded { service: String, state: PingState },
}

/// Matches inbound SMS messages to the services awaiting them
pub struct Correlator {
    database: Arc<dyn Database>,
    sms: Arc<dyn Prober>,
    notifier: Arc<Notifier>,
    clock: Arc<dyn Clock>,
}

impl Correlator {
    pub fn new(
        database: Arc<dyn Database>,
        sms: Arc<dyn Prober>,
        notifier: Arc<Notifier>,
        clock: Arc<dyn Clock>,
    ) -> Self {
        Self { database, sms, notifier, clock }
    }

    /// Resolve the sender's outstanding probe with `text`.
    ///
    /// Replies arriving after a timeout, or for a service that was never
    /// probed, are dropped without touching the store.
    pub async fn handle_inbound(&self, sender: &str, text: &str) -> Result<CorrelationOutcome, CorrelationError> {
        let sender = sender.trim();
        let candidates = self.database.find_sms_services_by_identity(sender).await?;

        if candidates.is_empty() {
            debug!(sender, "No service bound to sender, ignoring message");
            return Ok(CorrelationOutcome::Ignored);
        }
        if candidates.len() > 1 {
            warn!(sender, count = candidates.len(), "Several services share one connection identity");
        }

        // Most recent outstanding request wins
        let awaiting = candidates
            .iter()
            .filter(|service| service.is_awaiting_response())
            .filter_map(|service| Some((service, service.id?, service.last_request_at?)))
            .max_by_key(|(_, _, request_at)| *request_at);

        let Some((service, id, request_at)) = awaiting else {
            info!(service = %candidates[0].name, "Reply arrived with no request outstanding, dropping it");
            return Ok(CorrelationOutcome::Stale { service: candidates[0].name.clone() });
        };

        let verdict = self.sms.judge_reply(service, text).map_err(|source| CorrelationError::Judge {
            service: service.name.clone(),
            source,
        })?;
        let state = verdict.state();

        if !self.database.record_resolution(id, request_at, state, self.clock.now()).await? {
            info!(service = %service.name, "Request resolved elsewhere before the reply was recorded");
            return Ok(CorrelationOutcome::Stale { service: service.name.clone() });
        }

        match verdict {
            ReplyVerdict::Valid => info!(service = %service.name, "Valid reply received"),
            ReplyVerdict::Invalid => {
                warn!(service = %service.name, reply = text, "Reply did not match the expected pattern");
                let reason = FailureReason::InvalidResponse { reply: text.to_string() };
                self.notifier.dispatch(service, &reason).await;
            }
        }

        Ok(CorrelationOutcome::Recorded { service: service.name.clone(), state })
    }
}
