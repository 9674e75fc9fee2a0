//! Bulk station sweep
//!
//! Acquires many stations with a bounded pool of worker threads and
//! collects a per-station report. One station failing never stops the
//! sweep; the report says what happened to each.

use std::collections::HashSet;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::mpsc;
use std::thread;

use chrono::{DateTime, Utc};
use serde::Serialize;
use tracing::{debug, info};

use crate::ingest::fetch::Fetcher;
use crate::ingest::{
    Acquisition, Attempt, AttemptOutcome, CancellationToken, IngestError, Ingestor, Session,
};
use crate::model::StationRecord;

pub const DEFAULT_CONCURRENCY_LIMIT: usize = 8;

// ============================================================================
// Sweep Results
// ============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum SweepStatus {
    Succeeded,
    /// Every source said the station does not exist.
    NotFound,
    /// Sources ran out for any other mix of reasons.
    Exhausted,
    /// Stopped on an invalid id or an unusable body.
    Failed,
    Cancelled,
}

#[derive(Debug, Clone, Serialize)]
pub struct StationReport {
    pub station_id: String,
    pub status: SweepStatus,
    pub source: Option<String>,
    pub record: Option<StationRecord>,
    pub attempts: Vec<Attempt>,
    pub error: Option<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct SweepSummary {
    pub total: usize,
    pub succeeded: usize,
    pub not_found: usize,
    pub exhausted: usize,
    pub failed: usize,
    pub cancelled: usize,
}

impl SweepSummary {
    pub fn from_reports(stations: &[StationReport]) -> Self {
        let mut summary = SweepSummary {
            total: stations.len(),
            ..Default::default()
        };
        for station in stations {
            match station.status {
                SweepStatus::Succeeded => summary.succeeded += 1,
                SweepStatus::NotFound => summary.not_found += 1,
                SweepStatus::Exhausted => summary.exhausted += 1,
                SweepStatus::Failed => summary.failed += 1,
                SweepStatus::Cancelled => summary.cancelled += 1,
            }
        }
        summary
    }

    pub fn success_rate(&self) -> f64 {
        if self.total > 0 {
            (self.succeeded as f64 / self.total as f64) * 100.0
        } else {
            0.0
        }
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct SweepReport {
    pub started_at: DateTime<Utc>,
    pub finished_at: DateTime<Utc>,
    /// In the order the station ids were given.
    pub stations: Vec<StationReport>,
    pub summary: SweepSummary,
}

impl SweepReport {
    /// Records from the stations that succeeded.
    pub fn records(&self) -> impl Iterator<Item = &StationRecord> {
        self.stations.iter().filter_map(|s| s.record.as_ref())
    }
}

#[derive(Debug, Clone)]
pub struct SweepOptions {
    pub concurrency_limit: usize,
    pub cancel: CancellationToken,
}

impl Default for SweepOptions {
    fn default() -> Self {
        Self {
            concurrency_limit: DEFAULT_CONCURRENCY_LIMIT,
            cancel: CancellationToken::new(),
        }
    }
}

// ============================================================================
// Classification
// ============================================================================

pub fn classify_result(result: &Result<Acquisition, IngestError>) -> SweepStatus {
    match result {
        Ok(_) => SweepStatus::Succeeded,
        Err(IngestError::StationNotFound { .. }) => SweepStatus::NotFound,
        Err(IngestError::AllSourcesExhausted { attempts }) => {
            if !attempts.is_empty()
                && attempts.iter().all(|a| a.outcome == AttemptOutcome::NotFound)
            {
                SweepStatus::NotFound
            } else {
                SweepStatus::Exhausted
            }
        }
        Err(IngestError::Cancelled { .. }) => SweepStatus::Cancelled,
        Err(_) => SweepStatus::Failed,
    }
}

fn station_report(station_id: &str, result: Result<Acquisition, IngestError>) -> StationReport {
    let status = classify_result(&result);
    match result {
        Ok(acquisition) => StationReport {
            station_id: station_id.to_string(),
            status,
            source: Some(acquisition.source),
            record: Some(acquisition.record),
            attempts: acquisition.attempts,
            error: None,
        },
        Err(err) => StationReport {
            station_id: station_id.to_string(),
            status,
            source: None,
            record: None,
            attempts: err.attempts().to_vec(),
            error: Some(err.to_string()),
        },
    }
}

fn not_started_report(station_id: &str) -> StationReport {
    StationReport {
        station_id: station_id.to_string(),
        status: SweepStatus::Cancelled,
        source: None,
        record: None,
        attempts: Vec::new(),
        error: Some("cancelled before start".to_string()),
    }
}

// ============================================================================
// Runner
// ============================================================================

/// Drops repeated station ids, comparing them trimmed and upper-cased.
/// The first spelling of each id is kept, in input order.
pub fn dedup_station_ids<I, S>(station_ids: I) -> Vec<String>
where
    I: IntoIterator<Item = S>,
    S: Into<String>,
{
    let mut seen = HashSet::new();
    station_ids
        .into_iter()
        .map(Into::into)
        .filter(|id: &String| seen.insert(id.trim().to_ascii_uppercase()))
        .collect()
}

/// Acquire every station in `station_ids`.
///
/// Runs `min(concurrency_limit, station_ids.len())` workers, each with its
/// own [`Session`]. Only the ingestor's registry and fetcher are shared.
pub fn run_sweep<F: Fetcher>(
    ingestor: &Ingestor<F>,
    station_ids: &[String],
    options: &SweepOptions,
) -> SweepReport {
    let started_at = Utc::now();
    let workers = options.concurrency_limit.max(1).min(station_ids.len());
    let next = AtomicUsize::new(0);
    let (tx, rx) = mpsc::channel();

    info!(stations = station_ids.len(), workers, "Starting sweep");

    thread::scope(|scope| {
        for _ in 0..workers {
            let tx = tx.clone();
            let next = &next;
            scope.spawn(move || {
                let mut session = Session::with_cancel(options.cancel.clone());
                loop {
                    let index = next.fetch_add(1, Ordering::SeqCst);
                    let Some(station_id) = station_ids.get(index) else {
                        break;
                    };

                    let report = if options.cancel.is_cancelled() {
                        not_started_report(station_id)
                    } else {
                        station_report(station_id, ingestor.acquire(station_id, &mut session))
                    };
                    info!(station = %station_id, status = ?report.status, "Station done");

                    if tx.send((index, report)).is_err() {
                        break;
                    }
                }

                if !session.demotions().is_empty() {
                    let demoted: Vec<&str> = session.demotions().iter().collect();
                    debug!(?demoted, "Worker finished with demoted sources");
                }
            });
        }
    });
    drop(tx);

    let mut indexed: Vec<(usize, StationReport)> = rx.into_iter().collect();
    indexed.sort_by_key(|(index, _)| *index);
    let stations: Vec<StationReport> = indexed.into_iter().map(|(_, report)| report).collect();
    let summary = SweepSummary::from_reports(&stations);

    SweepReport {
        started_at,
        finished_at: Utc::now(),
        stations,
        summary,
    }
}

pub fn print_summary(report: &SweepReport) {
    let rule = "═".repeat(60);
    println!("\n{}", rule);
    println!("SWEEP SUMMARY");
    println!("{}", rule);
    println!();

    for station in &report.stations {
        match station.status {
            SweepStatus::Succeeded => println!(
                "  ✓ {:<10} {}",
                station.station_id,
                station.source.as_deref().unwrap_or("-")
            ),
            SweepStatus::NotFound => println!("  - {:<10} not found", station.station_id),
            _ => println!(
                "  ✗ {:<10} {}",
                station.station_id,
                station.error.as_deref().unwrap_or("Unknown")
            ),
        }
    }
    println!();

    let s = &report.summary;
    println!("Succeeded:  {}/{}", s.succeeded, s.total);
    println!("Not found:  {}", s.not_found);
    println!("Exhausted:  {}", s.exhausted);
    println!("Failed:     {}", s.failed);
    println!("Cancelled:  {}", s.cancelled);
    println!();
    println!(
        "Overall Success Rate: {:.1}% ({}/{})",
        s.success_rate(),
        s.succeeded,
        s.total
    );
    println!(
        "Elapsed: {:.1}s",
        (report.finished_at - report.started_at).num_milliseconds() as f64 / 1000.0
    );
    println!("{}", rule);
}
