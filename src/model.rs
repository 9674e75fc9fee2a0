//! Core data types for the station ingestion service.
//!
//! This module defines the canonical station record shared by the normalizer,
//! the sweep runner and the document store, plus the normalization error
//! taxonomy. It contains no I/O.

use serde::{Deserialize, Serialize};
use thiserror::Error;

// ---------------------------------------------------------------------------
// Station status
// ---------------------------------------------------------------------------

/// Operational status reported by the upstream station inventory.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum StationStatus {
    Active,
    Inactive,
    #[default]
    Unknown,
}

impl StationStatus {
    /// Maps the status text used by the Water Survey inventories.
    ///
    /// `HYD_STATUS` uses single letters ("A", "D"); `STATUS_EN` spells them out.
    pub fn from_source_text(text: &str) -> Self {
        match text.trim() {
            "Active" | "A" => StationStatus::Active,
            "Discontinued" | "Inactive" | "D" => StationStatus::Inactive,
            _ => StationStatus::Unknown,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            StationStatus::Active => "active",
            StationStatus::Inactive => "inactive",
            StationStatus::Unknown => "unknown",
        }
    }
}

impl std::fmt::Display for StationStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

// ---------------------------------------------------------------------------
// Canonical record
// ---------------------------------------------------------------------------

/// WGS84 position of a station. Only constructed when both halves are known.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Coordinates {
    pub latitude: f64,
    pub longitude: f64,
}

/// The normalized, source-independent view of one monitoring station's
/// latest known data.
///
/// `station_id` is always present and non-empty; every other field is
/// independently optional. A record holding only an identifier is valid.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StationRecord {
    #[serde(rename = "id")]
    pub station_id: String,
    pub name: Option<String>,
    pub province: Option<String>,
    pub location: Option<Coordinates>,
    pub drainage_area_km2: Option<f64>,
    pub discharge_cms: Option<f64>,
    pub level_m: Option<f64>,
    pub observed_at: Option<String>, // ISO 8601, UTC when the source offset was parseable
    pub status: StationStatus,
}

impl StationRecord {
    /// A record carrying only its identifier.
    pub fn bare(station_id: impl Into<String>) -> Self {
        Self {
            station_id: station_id.into(),
            name: None,
            province: None,
            location: None,
            drainage_area_km2: None,
            discharge_cms: None,
            level_m: None,
            observed_at: None,
            status: StationStatus::Unknown,
        }
    }

    /// True when the record has at least one current reading.
    pub fn has_readings(&self) -> bool {
        self.discharge_cms.is_some() || self.level_m.is_some()
    }
}

// ---------------------------------------------------------------------------
// Error types
// ---------------------------------------------------------------------------

/// Errors that can arise when mapping a fetched body to a `StationRecord`.
///
/// These are data problems with a reachable source; the ingest pipeline
/// surfaces them instead of silently falling through to the next source.
#[derive(Debug, Clone, PartialEq, Eq, Error, Serialize)]
#[serde(tag = "kind", content = "detail", rename_all = "snake_case")]
pub enum NormalizationError {
    /// A record in the body lacks the identifier field, or it is blank.
    #[error("missing required field {0}")]
    MissingRequiredField(String),
    /// The body does not have the structure its shape tag declares.
    #[error("unparseable body: {0}")]
    UnparseableBody(String),
    /// No field-mapping table exists for this shape tag.
    #[error("unknown shape tag {0:?}")]
    UnknownShapeTag(String),
    /// The body parsed but held no record for the requested station.
    #[error("no record for station {0} in body")]
    StationNotInBody(String),
}
