/// Structured logging for the ingestion service
///
/// Installs a `tracing` subscriber with a console layer and an optional
/// plain-text file layer, and classifies source attempt failures so that
/// routine misses stay quiet while service degradation is loud.

use std::fmt;
use std::fs::{File, OpenOptions};
use std::path::Path;
use std::sync::Mutex;

use tracing::{debug, error, info, warn};
use tracing_subscriber::EnvFilter;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;

use crate::ingest::AttemptOutcome;
use crate::ingest::fetch::TransportCause;
use crate::sweep::SweepSummary;

// ---------------------------------------------------------------------------
// Subscriber Setup
// ---------------------------------------------------------------------------

/// Install the global subscriber.
///
/// `RUST_LOG` takes precedence over `level`. When `log_file` is given,
/// events are also appended there without ANSI colours. Calling this again
/// after a subscriber is installed does nothing.
pub fn init_logging(level: &str, log_file: Option<&Path>) -> std::io::Result<()> {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(format!("brownclaw_ingest={}", level)));

    let file_layer = match log_file {
        Some(path) => {
            let file = open_log_file(path)?;
            Some(
                tracing_subscriber::fmt::layer()
                    .with_ansi(false)
                    .with_writer(Mutex::new(file)),
            )
        }
        None => None,
    };

    let _ = tracing_subscriber::registry()
        .with(filter)
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .with(file_layer)
        .try_init();

    Ok(())
}

fn open_log_file(path: &Path) -> std::io::Result<File> {
    OpenOptions::new().create(true).append(true).open(path)
}

// ---------------------------------------------------------------------------
// Failure Classification
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FailureType {
    /// The station simply isn't served by this source
    Expected,
    /// Service degradation, a retired endpoint, or an upstream format change
    Unexpected,
    /// Could be transient; cannot tell from one attempt
    Unknown,
}

impl fmt::Display for FailureType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            FailureType::Expected => write!(f, "EXPECTED"),
            FailureType::Unexpected => write!(f, "UNEXPECTED"),
            FailureType::Unknown => write!(f, "UNKNOWN"),
        }
    }
}

/// Classify a source attempt. `None` for a successful attempt.
pub fn classify_attempt(outcome: &AttemptOutcome) -> Option<FailureType> {
    match outcome {
        AttemptOutcome::Success => None,
        AttemptOutcome::NotFound => Some(FailureType::Expected),
        AttemptOutcome::Rejected(_) => Some(FailureType::Unexpected),
        AttemptOutcome::Malformed(_) => Some(FailureType::Unexpected),
        AttemptOutcome::TransportError(cause) => Some(match cause {
            TransportCause::Timeout | TransportCause::Body(_) => FailureType::Unknown,
            TransportCause::Connect(_) | TransportCause::Protocol(_) => FailureType::Unexpected,
        }),
    }
}

// ---------------------------------------------------------------------------
// Structured Failure Logging
// ---------------------------------------------------------------------------

/// Log one attempt at the level its classification calls for.
pub fn log_attempt(station_id: &str, source: &str, url: &str, outcome: &AttemptOutcome) {
    let Some(failure_type) = classify_attempt(outcome) else {
        debug!(station = station_id, source, url, "fetched");
        return;
    };

    match failure_type {
        FailureType::Expected => {
            debug!(station = station_id, source, url, kind = %failure_type, "{}", outcome)
        }
        FailureType::Unexpected => {
            error!(station = station_id, source, url, kind = %failure_type, "{}", outcome)
        }
        FailureType::Unknown => {
            warn!(station = station_id, source, url, kind = %failure_type, "{}", outcome)
        }
    }
}

// ---------------------------------------------------------------------------
// Sweep Summary Logging
// ---------------------------------------------------------------------------

/// Log a summary of a sweep
pub fn log_sweep_summary(summary: &SweepSummary) {
    let unsuccessful = summary.total - summary.succeeded;

    if unsuccessful == 0 {
        info!(total = summary.total, "Sweep complete: all stations acquired");
    } else if summary.succeeded == 0 {
        error!(
            total = summary.total,
            not_found = summary.not_found,
            exhausted = summary.exhausted,
            failed = summary.failed,
            cancelled = summary.cancelled,
            "Sweep complete: no station acquired"
        );
    } else {
        warn!(
            total = summary.total,
            not_found = summary.not_found,
            exhausted = summary.exhausted,
            failed = summary.failed,
            cancelled = summary.cancelled,
            "Sweep complete: {}/{} acquired",
            summary.succeeded,
            summary.total
        );
    }
}
