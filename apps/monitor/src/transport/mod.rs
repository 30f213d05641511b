//! Outbound message transports.
//!
//! The monitor never talks to a phone network itself: probes go out through an
//! SMS gateway and replies come back through the inbound webhook in `server`.

pub mod sms;

pub use sms::{HttpSmsGateway, MessageTransport, UnconfiguredGateway};
