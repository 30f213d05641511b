/// Monitoring module - the probe engine
///
/// This module contains:
/// - Per-service state machine predicates
/// - HTTP and SMS probers behind the `Prober` trait
/// - The poll cycle runner and the schedule that drives it
/// - The correlator resolving SMS probes from inbound replies

pub mod clock;
pub mod correlator;
pub mod prober;
pub mod runner;
pub mod scheduler;
pub mod state;
pub mod types;
pub mod validation;
