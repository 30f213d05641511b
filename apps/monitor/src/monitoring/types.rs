use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// How a monitored service is reached
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ServiceKind {
    Http,
    Sms,
}

impl fmt::Display for ServiceKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ServiceKind::Http => write!(f, "http"),
            ServiceKind::Sms => write!(f, "sms"),
        }
    }
}

impl FromStr for ServiceKind {
    type Err = UnknownVariant;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "http" => Ok(ServiceKind::Http),
            "sms" => Ok(ServiceKind::Sms),
            other => Err(UnknownVariant { kind: "service kind", value: other.to_string() }),
        }
    }
}

/// Responsiveness state of a monitored service
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PingState {
    NeverProbed,
    RequestSent,
    ValidResponseReceived,
    InvalidResponseReceived,
    NoResponse,
}

impl PingState {
    /// States that alert the service's recipients when entered
    pub fn is_failure(self) -> bool {
        matches!(self, PingState::InvalidResponseReceived | PingState::NoResponse)
    }

    pub fn as_str(self) -> &'static str {
        match self {
            PingState::NeverProbed => "never_probed",
            PingState::RequestSent => "request_sent",
            PingState::ValidResponseReceived => "valid_response",
            PingState::InvalidResponseReceived => "invalid_response",
            PingState::NoResponse => "no_response",
        }
    }
}

impl fmt::Display for PingState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for PingState {
    type Err = UnknownVariant;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "never_probed" => Ok(PingState::NeverProbed),
            "request_sent" => Ok(PingState::RequestSent),
            "valid_response" => Ok(PingState::ValidResponseReceived),
            "invalid_response" => Ok(PingState::InvalidResponseReceived),
            "no_response" => Ok(PingState::NoResponse),
            other => Err(UnknownVariant { kind: "ping state", value: other.to_string() }),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("unknown {kind}: '{value}'")]
pub struct UnknownVariant {
    kind: &'static str,
    value: String,
}

/// Why a service entered a failure state
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FailureReason {
    /// Nothing came back before the timeout
    NoResponse,
    /// An SMS reply arrived but did not match the expected pattern
    InvalidResponse { reply: String },
    /// The probe itself failed (HTTP error status, network error, SMS send error)
    TransportError(String),
}

impl FailureReason {
    /// State the service ends up in for this failure
    pub fn resulting_state(&self) -> PingState {
        match self {
            FailureReason::InvalidResponse { .. } => PingState::InvalidResponseReceived,
            FailureReason::NoResponse | FailureReason::TransportError(_) => PingState::NoResponse,
        }
    }
}

/// What a prober reports right after starting a probe
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ProbeStart {
    /// The service answered within the same call (synchronous transports)
    Responded,
    /// The probe failed within the same call
    Failed(FailureReason),
    /// The answer will arrive later through the correlator, or never
    AwaitingReply,
}

/// Verdict on an inbound reply for a service awaiting one
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ReplyVerdict {
    Valid,
    Invalid,
}

impl ReplyVerdict {
    pub fn state(&self) -> PingState {
        match self {
            ReplyVerdict::Valid => PingState::ValidResponseReceived,
            ReplyVerdict::Invalid => PingState::InvalidResponseReceived,
        }
    }
}
