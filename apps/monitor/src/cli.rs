//! Command line interface

use std::path::PathBuf;

use clap::{Parser, Subcommand};

use crate::database::models::{MonitoredService, PingLogEntry};
use crate::monitoring::correlator::CorrelationOutcome;
use crate::monitoring::runner::CycleReport;

const COL_NAME: usize = 24;
const COL_KIND: usize = 5;
const COL_TARGET: usize = 36;
const COL_STATE: usize = 17;

#[derive(Parser, Debug)]
#[command(author, version, about = "Probes HTTP and SMS services and alerts when they stop answering", long_about = None)]
pub struct Cli {
    /// Path to the configuration file
    #[arg(short, long, global = true)]
    pub config: Option<PathBuf>,

    #[command(subcommand)]
    pub command: Option<Commands>,
}

#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Run the poll schedule and the inbound webhook until Ctrl-C (default)
    Run,
    /// Run a single poll cycle and exit
    Poll,
    /// Feed one inbound SMS to the correlator
    Inbound {
        /// Sender connection identity
        #[arg(long)]
        from: String,
        /// Message text
        text: String,
    },
    /// List registered services with their current state
    #[command(alias = "ls")]
    Services,
    /// Show the ping log of one service, newest first
    History {
        name: String,
        #[arg(short, long, default_value_t = 20)]
        limit: usize,
    },
    /// Show failures across all services
    Failures {
        /// How far back to look
        #[arg(long, default_value_t = 24)]
        hours: i64,
        #[arg(short, long, default_value_t = 50)]
        limit: usize,
    },
    /// Print the effective configuration
    Config,
}

/// Shorten `s` to `max` characters, marking the cut with "..."
pub fn truncate(s: &str, max: usize) -> String {
    if s.chars().count() <= max {
        s.to_string()
    } else if max <= 3 {
        s.chars().take(max).collect()
    } else {
        format!("{}...", s.chars().take(max - 3).collect::<String>())
    }
}

pub fn print_report(report: &CycleReport) {
    println!(
        "examined {}  probes {}  responses {}  failures {}  timeouts {}  awaiting {}  idle {}  superseded {}  faults {}",
        report.examined,
        report.probes_sent,
        report.responses,
        report.failures,
        report.timeouts,
        report.awaiting,
        report.idle,
        report.superseded,
        report.faults
    );
}

pub fn print_outcome(outcome: &CorrelationOutcome) {
    match outcome {
        CorrelationOutcome::Ignored => println!("ignored: no active SMS service for this sender"),
        CorrelationOutcome::Stale { service } => println!("stale: '{service}' was not awaiting a reply"),
        CorrelationOutcome::Recorded { service, state } => println!("recorded: '{service}' is now {state}"),
    }
}

pub fn print_services(services: &[MonitoredService]) {
    if services.is_empty() {
        println!("No services registered.");
        return;
    }

    println!(
        "{:<COL_NAME$} {:<COL_KIND$} {:<COL_TARGET$} {:<COL_STATE$} LAST REQUEST",
        "NAME", "KIND", "TARGET", "STATE"
    );
    println!("{}", "-".repeat(COL_NAME + COL_KIND + COL_TARGET + COL_STATE + 24));

    for service in services {
        let state = if service.active { service.ping_state.to_string() } else { "inactive".to_string() };
        let last_request = service
            .last_request_at
            .map(|at| at.format("%Y-%m-%d %H:%M:%S").to_string())
            .unwrap_or_else(|| "-".to_string());

        println!(
            "{:<COL_NAME$} {:<COL_KIND$} {:<COL_TARGET$} {:<COL_STATE$} {}",
            truncate(&service.name, COL_NAME),
            service.kind.to_string(),
            truncate(service.target(), COL_TARGET),
            state,
            last_request
        );
    }
}

pub fn print_history(name: &str, entries: &[PingLogEntry]) {
    if entries.is_empty() {
        println!("No ping history for '{name}'.");
        return;
    }

    for entry in entries {
        let marker = if entry.ping_state.is_failure() { "!" } else { " " };
        println!("{} {}  {}", marker, entry.logged_at.format("%Y-%m-%d %H:%M:%S"), entry.ping_state);
    }
}

pub fn print_failures(hours: i64, failures: &[(String, PingLogEntry)]) {
    if failures.is_empty() {
        println!("No failures in the last {hours}h.");
        return;
    }

    for (name, entry) in failures {
        println!(
            "{}  {:<COL_NAME$} {}",
            entry.logged_at.format("%Y-%m-%d %H:%M:%S"),
            truncate(name, COL_NAME),
            entry.ping_state
        );
    }
}
