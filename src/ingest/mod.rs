//! Station acquisition pipeline.
//!
//! [`Ingestor::acquire`] walks the source registry for one station, fetching
//! each candidate until one yields a normalizable body. Every attempt is
//! recorded, so a caller can always see which sources were tried and why
//! each one failed.

pub mod fetch;
pub mod geomet;
pub mod normalize;
pub mod wateroffice;

use std::fmt;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use serde::Serialize;
use thiserror::Error;

use crate::config::ConfigError;
use crate::logging;
use crate::model::{NormalizationError, StationRecord};
use crate::sources::{Demotions, SourceRegistry};
use fetch::{FetchOutcome, Fetcher, TransportCause};
use normalize::normalize_for_station;

// ---------------------------------------------------------------------------
// Attempt trail
// ---------------------------------------------------------------------------

/// How a single source attempt ended.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "kind", content = "detail", rename_all = "snake_case")]
pub enum AttemptOutcome {
    Success,
    NotFound,
    Rejected(u16),
    TransportError(TransportCause),
    /// The source answered, but its body could not be normalized.
    Malformed(NormalizationError),
}

impl fmt::Display for AttemptOutcome {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            AttemptOutcome::Success => write!(f, "success"),
            AttemptOutcome::NotFound => write!(f, "station not found"),
            AttemptOutcome::Rejected(status) => write!(f, "rejected with HTTP {}", status),
            AttemptOutcome::TransportError(cause) => write!(f, "transport error ({})", cause),
            AttemptOutcome::Malformed(err) => write!(f, "malformed body ({})", err),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Attempt {
    pub source: String,
    pub url: String,
    pub outcome: AttemptOutcome,
}

/// A station record together with where it came from.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Acquisition {
    pub record: StationRecord,
    pub source: String,
    /// Every attempt made, the successful one last.
    pub attempts: Vec<Attempt>,
}

// ---------------------------------------------------------------------------
// Errors
// ---------------------------------------------------------------------------

#[derive(Debug, Error)]
pub enum IngestError {
    #[error("configuration error: {0}")]
    Configuration(#[from] ConfigError),

    #[error("invalid station id {0:?}")]
    InvalidStationId(String),

    /// A reachable source returned data that could not be normalized.
    #[error("source {source_name} returned an unusable body: {error}")]
    Normalization {
        source_name: String,
        #[source]
        error: NormalizationError,
        attempts: Vec<Attempt>,
    },

    #[error("all sources exhausted after {} attempts", .attempts.len())]
    AllSourcesExhausted { attempts: Vec<Attempt> },

    #[error("station {station_id} not found")]
    StationNotFound {
        station_id: String,
        attempts: Vec<Attempt>,
    },

    #[error("cancelled after {} attempts", .attempts.len())]
    Cancelled { attempts: Vec<Attempt> },
}

impl IngestError {
    /// Attempts made before the error; empty for errors raised up front.
    pub fn attempts(&self) -> &[Attempt] {
        match self {
            IngestError::Configuration(_) | IngestError::InvalidStationId(_) => &[],
            IngestError::Normalization { attempts, .. }
            | IngestError::AllSourcesExhausted { attempts }
            | IngestError::StationNotFound { attempts, .. }
            | IngestError::Cancelled { attempts } => attempts,
        }
    }
}

// ---------------------------------------------------------------------------
// Policy, cancellation, session
// ---------------------------------------------------------------------------

/// Knobs for the fallback loop.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct FallbackPolicy {
    /// Record a malformed body and move on instead of surfacing it.
    pub fall_back_on_malformed: bool,
    /// End on the first `NotFound` instead of trying the remaining sources.
    pub stop_on_not_found: bool,
}

/// Cooperative cancellation, checked before each attempt.
#[derive(Debug, Clone, Default)]
pub struct CancellationToken {
    cancelled: Arc<AtomicBool>,
}

impl CancellationToken {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn cancel(&self) {
        self.cancelled.store(true, Ordering::SeqCst);
    }

    pub fn is_cancelled(&self) -> bool {
        self.cancelled.load(Ordering::SeqCst)
    }
}

/// Per-caller state carried across requests: demoted sources and the
/// cancellation token. Never shared between concurrent callers.
#[derive(Debug, Clone, Default)]
pub struct Session {
    demotions: Demotions,
    cancel: CancellationToken,
}

impl Session {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_cancel(cancel: CancellationToken) -> Self {
        Self {
            demotions: Demotions::new(),
            cancel,
        }
    }

    pub fn demotions(&self) -> &Demotions {
        &self.demotions
    }

    pub fn cancel_token(&self) -> &CancellationToken {
        &self.cancel
    }
}

// ---------------------------------------------------------------------------
// Ingestor
// ---------------------------------------------------------------------------

/// Trims and upper-cases a station id; rejects blanks and non-alphanumerics.
pub fn validate_station_id(station_id: &str) -> Result<String, IngestError> {
    let trimmed = station_id.trim();
    if trimmed.is_empty() || !trimmed.chars().all(|c| c.is_ascii_alphanumeric()) {
        return Err(IngestError::InvalidStationId(station_id.to_string()));
    }
    Ok(trimmed.to_ascii_uppercase())
}

pub struct Ingestor<F> {
    registry: SourceRegistry,
    fetcher: F,
    policy: FallbackPolicy,
}

impl<F: Fetcher> Ingestor<F> {
    pub fn new(registry: SourceRegistry, fetcher: F, policy: FallbackPolicy) -> Self {
        Self {
            registry,
            fetcher,
            policy,
        }
    }

    pub fn registry(&self) -> &SourceRegistry {
        &self.registry
    }

    pub fn fetcher(&self) -> &F {
        &self.fetcher
    }

    /// Acquire the latest record for one station.
    ///
    /// Sources are tried in registry order (demoted ones last). The first
    /// body that normalizes wins. A `Rejected` source is demoted in
    /// `session` for the rest of the session.
    pub fn acquire(
        &self,
        station_id: &str,
        session: &mut Session,
    ) -> Result<Acquisition, IngestError> {
        if self.registry.is_empty() {
            return Err(ConfigError::EmptyRegistry.into());
        }
        let station_id = validate_station_id(station_id)?;

        // Order is fixed for this request; demotions made now apply to the next.
        let demotions = session.demotions.clone();
        let mut attempts = Vec::new();

        for candidate in self.registry.candidates(&station_id, &demotions) {
            if session.cancel.is_cancelled() {
                return Err(IngestError::Cancelled { attempts });
            }

            let descriptor = candidate.descriptor;
            let source = descriptor.name.clone();

            let outcome = match self.fetcher.fetch(descriptor, &station_id) {
                FetchOutcome::Success { body, .. } => {
                    match normalize_for_station(descriptor.shape, &body, &station_id) {
                        Ok(record) => {
                            let outcome = AttemptOutcome::Success;
                            logging::log_attempt(&station_id, &source, &candidate.url, &outcome);
                            attempts.push(Attempt {
                                source: source.clone(),
                                url: candidate.url,
                                outcome,
                            });
                            return Ok(Acquisition {
                                record,
                                source,
                                attempts,
                            });
                        }
                        Err(error) => {
                            let outcome = AttemptOutcome::Malformed(error.clone());
                            logging::log_attempt(&station_id, &source, &candidate.url, &outcome);
                            attempts.push(Attempt {
                                source: source.clone(),
                                url: candidate.url,
                                outcome,
                            });
                            if self.policy.fall_back_on_malformed {
                                continue;
                            }
                            return Err(IngestError::Normalization {
                                source_name: source,
                                error,
                                attempts,
                            });
                        }
                    }
                }
                FetchOutcome::NotFound => AttemptOutcome::NotFound,
                FetchOutcome::Rejected(status) => {
                    session.demotions.demote(&source);
                    AttemptOutcome::Rejected(status)
                }
                FetchOutcome::TransportError(cause) => AttemptOutcome::TransportError(cause),
            };

            logging::log_attempt(&station_id, &source, &candidate.url, &outcome);
            let not_found = outcome == AttemptOutcome::NotFound;
            attempts.push(Attempt {
                source,
                url: candidate.url,
                outcome,
            });

            if not_found && self.policy.stop_on_not_found {
                return Err(IngestError::StationNotFound {
                    station_id: station_id.clone(),
                    attempts,
                });
            }
        }

        Err(IngestError::AllSourcesExhausted { attempts })
    }
}
