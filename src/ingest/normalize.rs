//! Shape-tagged normalization of fetched bodies into `StationRecord`s.
//!
//! Every shape tag owns a pinned field-mapping table. Field names are matched
//! case-sensitively: `STATION_NUMBER` and `station_number` are different keys,
//! and a table only ever lists the names one version of the upstream service
//! actually emits. Nothing here inspects a body to guess at field names.

use std::collections::BTreeMap;
use std::str::FromStr;

use chrono::{DateTime, SecondsFormat, Utc};
use serde::{Deserialize, Serialize};

use crate::ingest::{geomet, wateroffice};
use crate::model::{Coordinates, NormalizationError, StationRecord, StationStatus};

// ---------------------------------------------------------------------------
// Shape tags
// ---------------------------------------------------------------------------

/// Identifier for a known response body structure.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum ShapeTag {
    /// OGC API / GeoJSON feature collection (api.weather.gc.ca).
    JsonFeatureCollection,
    /// Deprecated Water Office real-time CSV, one row per parameter reading.
    CsvLegacy,
}

impl ShapeTag {
    pub fn as_str(&self) -> &'static str {
        match self {
            ShapeTag::JsonFeatureCollection => "json-feature-collection",
            ShapeTag::CsvLegacy => "csv-legacy",
        }
    }

    /// The version-pinned field table for this shape.
    pub fn field_table(&self) -> &'static [FieldMapping] {
        match self {
            ShapeTag::JsonFeatureCollection => geomet::FIELD_TABLE,
            ShapeTag::CsvLegacy => wateroffice::FIELD_TABLE,
        }
    }

    /// `Accept` header sent when fetching a body of this shape.
    pub fn accept_header(&self) -> &'static str {
        match self {
            ShapeTag::JsonFeatureCollection => "application/geo+json, application/json",
            ShapeTag::CsvLegacy => "text/csv, text/plain",
        }
    }

    /// True when a successfully fetched body unambiguously says the station
    /// does not exist at this source (empty feature list, header-only CSV).
    ///
    /// Bodies that fail to parse return `false`; reporting them is the
    /// normalizer's job, not the fetcher's.
    pub fn signals_no_station(&self, body: &[u8]) -> bool {
        match self {
            ShapeTag::JsonFeatureCollection => geomet::is_empty_collection(body),
            ShapeTag::CsvLegacy => wateroffice::has_no_rows(body),
        }
    }

    fn parse_rows(&self, text: &str) -> Result<Vec<SourceRow>, NormalizationError> {
        match self {
            ShapeTag::JsonFeatureCollection => geomet::parse_rows(text),
            ShapeTag::CsvLegacy => wateroffice::parse_rows(text),
        }
    }
}

impl std::fmt::Display for ShapeTag {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ShapeTag {
    type Err = NormalizationError;

    fn from_str(tag: &str) -> Result<Self, Self::Err> {
        match tag {
            "json-feature-collection" => Ok(ShapeTag::JsonFeatureCollection),
            "csv-legacy" => Ok(ShapeTag::CsvLegacy),
            other => Err(NormalizationError::UnknownShapeTag(other.to_string())),
        }
    }
}

// ---------------------------------------------------------------------------
// Field tables
// ---------------------------------------------------------------------------

/// Canonical fields a source field can be mapped onto.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CanonicalField {
    StationId,
    Name,
    Province,
    Latitude,
    Longitude,
    DrainageArea,
    Discharge,
    Level,
    ObservedAt,
    Status,
}

/// One entry of a field table: a source field name and where it lands.
///
/// When several entries target the same canonical field, the first one
/// present in a row wins.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FieldMapping {
    pub source: &'static str,
    pub field: CanonicalField,
}

/// Raw value of a source field before canonical typing.
#[derive(Debug, Clone, PartialEq)]
pub(crate) enum FieldValue {
    Text(String),
    Number(f64),
}

impl FieldValue {
    fn as_text(&self) -> Option<String> {
        match self {
            FieldValue::Text(s) => {
                let trimmed = s.trim();
                (!trimmed.is_empty()).then(|| trimmed.to_string())
            }
            FieldValue::Number(n) => Some(n.to_string()),
        }
    }

    fn as_number(&self) -> Option<f64> {
        let n = match self {
            FieldValue::Number(n) => *n,
            FieldValue::Text(s) => s.trim().parse::<f64>().ok()?,
        };
        n.is_finite().then_some(n)
    }
}

/// A flat record from a parsed body, keyed by source field name.
pub(crate) type SourceRow = BTreeMap<String, FieldValue>;

fn lookup<'r>(
    table: &[FieldMapping],
    row: &'r SourceRow,
    field: CanonicalField,
) -> impl Iterator<Item = &'r FieldValue> {
    table
        .iter()
        .filter(move |m| m.field == field)
        .filter_map(move |m| row.get(m.source))
}

fn text_field(table: &[FieldMapping], row: &SourceRow, field: CanonicalField) -> Option<String> {
    lookup(table, row, field).find_map(FieldValue::as_text)
}

fn number_field(table: &[FieldMapping], row: &SourceRow, field: CanonicalField) -> Option<f64> {
    lookup(table, row, field).find_map(FieldValue::as_number)
}

/// Maps one row through a field table.
pub(crate) fn map_row(
    table: &[FieldMapping],
    row: &SourceRow,
) -> Result<StationRecord, NormalizationError> {
    let station_id = text_field(table, row, CanonicalField::StationId)
        .map(|id| id.to_ascii_uppercase())
        .ok_or_else(|| NormalizationError::MissingRequiredField(required_source_field(table)))?;

    let location = match (
        number_field(table, row, CanonicalField::Latitude),
        number_field(table, row, CanonicalField::Longitude),
    ) {
        (Some(latitude), Some(longitude)) => Some(Coordinates { latitude, longitude }),
        _ => None,
    };

    Ok(StationRecord {
        station_id,
        name: text_field(table, row, CanonicalField::Name),
        province: text_field(table, row, CanonicalField::Province),
        location,
        drainage_area_km2: number_field(table, row, CanonicalField::DrainageArea),
        discharge_cms: number_field(table, row, CanonicalField::Discharge),
        level_m: number_field(table, row, CanonicalField::Level),
        observed_at: text_field(table, row, CanonicalField::ObservedAt)
            .map(|raw| normalize_timestamp(&raw)),
        status: text_field(table, row, CanonicalField::Status)
            .map(|s| StationStatus::from_source_text(&s))
            .unwrap_or_default(),
    })
}

fn required_source_field(table: &[FieldMapping]) -> String {
    table
        .iter()
        .find(|m| m.field == CanonicalField::StationId)
        .map(|m| m.source.to_string())
        .unwrap_or_else(|| "station id".to_string())
}

// ---------------------------------------------------------------------------
// Timestamps
// ---------------------------------------------------------------------------

/// Rewrites an RFC 3339 timestamp in UTC; other text is kept as-is (trimmed).
pub(crate) fn normalize_timestamp(raw: &str) -> String {
    match parse_timestamp(raw) {
        Some(ts) => ts.to_rfc3339_opts(SecondsFormat::AutoSi, true),
        None => raw.trim().to_string(),
    }
}

fn parse_timestamp(raw: &str) -> Option<DateTime<Utc>> {
    DateTime::parse_from_rfc3339(raw.trim())
        .ok()
        .map(|ts| ts.with_timezone(&Utc))
}

// ---------------------------------------------------------------------------
// Record selection
// ---------------------------------------------------------------------------

/// Picks the most recent record, optionally restricted to one station.
///
/// Records with a parseable timestamp outrank those without; ties keep the
/// record that appeared first in the body.
fn select_record(
    records: Vec<StationRecord>,
    station_id: Option<&str>,
) -> Result<StationRecord, NormalizationError> {
    let wanted = station_id.map(|id| id.trim().to_ascii_uppercase());

    let mut best: Option<(Option<DateTime<Utc>>, StationRecord)> = None;
    for record in records {
        if let Some(wanted) = &wanted {
            if &record.station_id != wanted {
                continue;
            }
        }
        let key = record.observed_at.as_deref().and_then(parse_timestamp);
        let replace = match &best {
            None => true,
            Some((best_key, _)) => key > *best_key,
        };
        if replace {
            best = Some((key, record));
        }
    }

    best.map(|(_, record)| record).ok_or_else(|| match wanted {
        Some(id) => NormalizationError::StationNotInBody(id),
        None => NormalizationError::UnparseableBody("body holds no station records".to_string()),
    })
}

// ---------------------------------------------------------------------------
// Entry points
// ---------------------------------------------------------------------------

pub(crate) fn body_text(body: &[u8]) -> Result<&str, NormalizationError> {
    let text = std::str::from_utf8(body)
        .map_err(|_| NormalizationError::UnparseableBody("body is not valid UTF-8".to_string()))?;
    Ok(text.trim_start_matches('\u{feff}'))
}

fn normalize_inner(
    shape: ShapeTag,
    body: &[u8],
    station_id: Option<&str>,
) -> Result<StationRecord, NormalizationError> {
    let text = body_text(body)?;
    let table = shape.field_table();
    let records = shape
        .parse_rows(text)?
        .iter()
        .map(|row| map_row(table, row))
        .collect::<Result<Vec<_>, _>>()?;
    select_record(records, station_id)
}

/// Normalizes a body to its most recent record.
pub fn normalize(shape: ShapeTag, body: &[u8]) -> Result<StationRecord, NormalizationError> {
    normalize_inner(shape, body, None)
}

/// Like [`normalize`], resolving the shape from its tag first.
pub fn normalize_tagged(tag: &str, body: &[u8]) -> Result<StationRecord, NormalizationError> {
    normalize(tag.parse()?, body)
}

/// Normalizes a body to the most recent record for `station_id`.
pub fn normalize_for_station(
    shape: ShapeTag,
    body: &[u8],
    station_id: &str,
) -> Result<StationRecord, NormalizationError> {
    normalize_inner(shape, body, Some(station_id))
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
