//! Official hydrometric station inventory.
//!
//! Environment Canada publishes every station it reports real-time data for
//! as one CSV on the MSC Datamart:
//!
//! ```text
//! ID,Name / Nom,Latitude,Longitude,Prov/Terr,Timezone / Fuseau horaire
//! 05BH004,"BOW RIVER AT CALGARY",51.05,-114.05,AB,UTC-07:00
//! ```
//!
//! A discovery sweep reads this list for its station ids instead of the
//! curated reference stations.

use std::collections::HashSet;

use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::{debug, info};

use crate::config::ConfigError;
use crate::ingest::fetch::{HttpFetcher, TransportCause};
use crate::ingest::normalize::body_text;
use crate::ingest::validate_station_id;
use crate::ingest::wateroffice::split_csv_line;
use crate::model::{Coordinates, NormalizationError};

pub const DEFAULT_INVENTORY_URL: &str =
    "https://dd.weather.gc.ca/hydrometric/doc/hydrometric_StationList.csv";

const INVENTORY_ACCEPT: &str = "text/csv";

pub const COLUMN_ID: &str = "ID";
pub const COLUMN_NAME: &str = "Name";
pub const COLUMN_LATITUDE: &str = "Latitude";
pub const COLUMN_LONGITUDE: &str = "Longitude";
pub const COLUMN_PROVINCE: &str = "Prov/Terr";

// ---------------------------------------------------------------------------
// Source
// ---------------------------------------------------------------------------

/// Where the inventory is downloaded from.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct InventorySource {
    pub name: String,
    pub url: String,
}

impl Default for InventorySource {
    fn default() -> Self {
        Self {
            name: "msc-station-list".to_string(),
            url: DEFAULT_INVENTORY_URL.to_string(),
        }
    }
}

impl InventorySource {
    pub fn validate(&self) -> Result<(), ConfigError> {
        reqwest::Url::parse(&self.url).map_err(|e| ConfigError::InvalidUrl {
            name: self.name.clone(),
            reason: e.to_string(),
        })?;
        Ok(())
    }
}

#[derive(Debug, Error)]
pub enum InventoryError {
    #[error("station inventory request failed: {0}")]
    Transport(TransportCause),

    #[error("station inventory answered HTTP {0}")]
    Status(u16),

    #[error("station inventory is unusable: {0}")]
    Body(#[from] NormalizationError),
}

// ---------------------------------------------------------------------------
// Entries
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct InventoryEntry {
    pub station_id: String,
    pub name: Option<String>,
    /// Province or territory code, or the drainage region named by the id
    /// prefix when the column is blank.
    pub province: String,
    pub location: Option<Coordinates>,
}

/// Drainage region for a WSC station number, from its two-digit prefix.
pub fn region_for_station_id(station_id: &str) -> &'static str {
    match station_id.get(..2) {
        None => "Unknown",
        Some("01") => "Atlantic Canada",
        Some("02" | "03" | "04") => "Ontario/Quebec",
        Some("05" | "06" | "07") => "Prairie Provinces",
        Some("08") => "British Columbia",
        Some("09" | "10") => "Northern Canada",
        Some(_) => "Canada",
    }
}

struct Columns {
    id: usize,
    name: Option<usize>,
    latitude: Option<usize>,
    longitude: Option<usize>,
    province: Option<usize>,
}

impl Columns {
    /// Header cells are bilingual (`Name / Nom`); the English half is matched.
    fn locate(header: &[String]) -> Result<Self, NormalizationError> {
        let find = |name: &str| {
            header
                .iter()
                .position(|h| h.split(" / ").next().map(str::trim) == Some(name))
        };
        Ok(Columns {
            id: find(COLUMN_ID)
                .ok_or_else(|| NormalizationError::MissingRequiredField(COLUMN_ID.to_string()))?,
            name: find(COLUMN_NAME),
            latitude: find(COLUMN_LATITUDE),
            longitude: find(COLUMN_LONGITUDE),
            province: find(COLUMN_PROVINCE),
        })
    }
}

fn cell(fields: &[String], column: Option<usize>) -> Option<&str> {
    column
        .and_then(|i| fields.get(i))
        .map(String::as_str)
        .filter(|v| !v.is_empty())
}

/// Parses the station list. Rows with an unusable id are skipped; a
/// repeated id keeps its first row.
pub fn parse_inventory(text: &str) -> Result<Vec<InventoryEntry>, NormalizationError> {
    let mut lines = text
        .trim_start_matches('\u{feff}')
        .lines()
        .filter(|line| !line.trim().is_empty());
    let header = lines
        .next()
        .map(split_csv_line)
        .ok_or_else(|| NormalizationError::UnparseableBody("empty station list".to_string()))?;
    let columns = Columns::locate(&header)?;

    let mut seen = HashSet::new();
    let mut entries = Vec::new();
    let mut skipped = 0;
    let mut duplicates = 0;

    for line in lines {
        let fields = split_csv_line(line);
        let Some(station_id) = fields
            .get(columns.id)
            .and_then(|raw| validate_station_id(raw).ok())
        else {
            skipped += 1;
            continue;
        };
        if !seen.insert(station_id.clone()) {
            duplicates += 1;
            continue;
        }

        let coordinate = |column| cell(&fields, column).and_then(|v| v.parse::<f64>().ok());
        let location = match (coordinate(columns.latitude), coordinate(columns.longitude)) {
            (Some(latitude), Some(longitude)) => Some(Coordinates { latitude, longitude }),
            _ => None,
        };
        let province = cell(&fields, columns.province)
            .map(str::to_string)
            .unwrap_or_else(|| region_for_station_id(&station_id).to_string());

        entries.push(InventoryEntry {
            name: cell(&fields, columns.name).map(str::to_string),
            province,
            location,
            station_id,
        });
    }

    if skipped > 0 || duplicates > 0 {
        debug!(skipped, duplicates, "Station list rows dropped");
    }
    Ok(entries)
}

/// Downloads and parses the inventory.
pub fn load_inventory(
    fetcher: &HttpFetcher,
    source: &InventorySource,
) -> Result<Vec<InventoryEntry>, InventoryError> {
    let response = fetcher
        .get(&source.url, INVENTORY_ACCEPT)
        .map_err(InventoryError::Transport)?;
    if !(200..300).contains(&response.status) {
        return Err(InventoryError::Status(response.status));
    }

    let entries = parse_inventory(body_text(&response.body)?)?;
    info!(source = %source.name, stations = entries.len(), "Loaded station inventory");
    Ok(entries)
}

/// Entries in `province` (case-insensitive), or all of them.
pub fn select<'e>(
    entries: &'e [InventoryEntry],
    province: Option<&str>,
) -> impl Iterator<Item = &'e InventoryEntry> + 'e {
    let wanted = province.map(|p| p.trim().to_string());
    entries.iter().filter(move |entry| {
        wanted
            .as_deref()
            .is_none_or(|p| entry.province.eq_ignore_ascii_case(p))
    })
}
