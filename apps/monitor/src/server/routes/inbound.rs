use actix_web::{HttpResponse, post, web};
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::monitoring::correlator::{CorrelationOutcome, Correlator};
use crate::server::ServerError;

/// Message pushed by the SMS gateway
#[derive(Debug, Deserialize)]
pub struct InboundMessage {
    pub from: String,
    pub text: String,
}

#[derive(Debug, Serialize, PartialEq, Eq)]
pub struct InboundReply {
    pub outcome: &'static str,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub service: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub state: Option<String>,
}

impl From<CorrelationOutcome> for InboundReply {
    fn from(outcome: CorrelationOutcome) -> Self {
        match outcome {
            CorrelationOutcome::Ignored => Self { outcome: "ignored", service: None, state: None },
            CorrelationOutcome::Stale { service } => Self { outcome: "stale", service: Some(service), state: None },
            CorrelationOutcome::Recorded { service, state } => Self {
                outcome: "recorded",
                service: Some(service),
                state: Some(state.to_string()),
            },
        }
    }
}

/// Inbound SMS route
/// Unknown senders and late replies still answer 200 so the gateway does not retry them.
#[post("/sms/inbound")]
pub async fn inbound_route(
    correlator: web::Data<Correlator>,
    message: web::Json<InboundMessage>,
) -> Result<HttpResponse, ServerError> {
    let InboundMessage { from, text } = message.into_inner();
    debug!(sender = %from, "Inbound message received");

    let outcome = correlator.handle_inbound(&from, &text).await?;
    Ok(HttpResponse::Ok().json(InboundReply::from(outcome)))
}
