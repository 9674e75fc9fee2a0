/// Document store for acquired station records.
///
/// Records are stored whole, keyed by station id, alongside the time they
/// were last synced. A `put` replaces whatever was stored before; nothing is
/// merged.

use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use postgres::{Client, NoTls};
use serde::Serialize;
use thiserror::Error;

use crate::model::{StationRecord, StationStatus};

#[derive(Debug, Error)]
pub enum StoreError {
    #[error("database error: {0}")]
    Database(#[from] postgres::Error),
    #[error("document serialization failed: {0}")]
    Serialization(#[from] serde_json::Error),
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct StoredStation {
    pub record: StationRecord,
    pub last_synced: DateTime<Utc>,
}

/// Equality filters; `None` matches everything.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct StationQuery {
    pub province: Option<String>,
    pub status: Option<StationStatus>,
}

impl StationQuery {
    pub fn matches(&self, record: &StationRecord) -> bool {
        self.province
            .as_ref()
            .is_none_or(|p| record.province.as_ref() == Some(p))
            && self.status.is_none_or(|s| record.status == s)
    }
}

pub trait StationStore {
    fn get(&mut self, station_id: &str) -> Result<Option<StoredStation>, StoreError>;

    fn put(&mut self, record: &StationRecord, synced_at: DateTime<Utc>) -> Result<(), StoreError>;

    /// Matching stations ordered by station id.
    fn query(&mut self, query: &StationQuery) -> Result<Vec<StoredStation>, StoreError>;
}

// ---------------------------------------------------------------------------
// In-memory store
// ---------------------------------------------------------------------------

#[derive(Debug, Default)]
pub struct MemoryStore {
    stations: BTreeMap<String, StoredStation>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.stations.len()
    }

    pub fn is_empty(&self) -> bool {
        self.stations.is_empty()
    }
}

impl StationStore for MemoryStore {
    fn get(&mut self, station_id: &str) -> Result<Option<StoredStation>, StoreError> {
        Ok(self.stations.get(station_id).cloned())
    }

    fn put(&mut self, record: &StationRecord, synced_at: DateTime<Utc>) -> Result<(), StoreError> {
        self.stations.insert(
            record.station_id.clone(),
            StoredStation {
                record: record.clone(),
                last_synced: synced_at,
            },
        );
        Ok(())
    }

    fn query(&mut self, query: &StationQuery) -> Result<Vec<StoredStation>, StoreError> {
        Ok(self
            .stations
            .values()
            .filter(|s| query.matches(&s.record))
            .cloned()
            .collect())
    }
}

// ---------------------------------------------------------------------------
// PostgreSQL store
// ---------------------------------------------------------------------------

const SCHEMA: &str = "
    CREATE TABLE IF NOT EXISTS water_stations (
        station_id  TEXT PRIMARY KEY,
        document    JSONB NOT NULL,
        last_synced TIMESTAMPTZ NOT NULL
    );
    CREATE INDEX IF NOT EXISTS water_stations_province_idx
        ON water_stations ((document->>'province'));
";

/// `water_stations` table, one JSONB document per station.
pub struct PgStore {
    client: Client,
}

impl PgStore {
    pub fn connect(database_url: &str) -> Result<Self, StoreError> {
        let client = Client::connect(database_url, NoTls)?;
        Ok(Self { client })
    }

    pub fn ensure_schema(&mut self) -> Result<(), StoreError> {
        self.client.batch_execute(SCHEMA)?;
        Ok(())
    }

    fn stored_from_row(row: &postgres::Row) -> Result<StoredStation, StoreError> {
        let document: serde_json::Value = row.get(0);
        Ok(StoredStation {
            record: serde_json::from_value(document)?,
            last_synced: row.get(1),
        })
    }
}

impl StationStore for PgStore {
    fn get(&mut self, station_id: &str) -> Result<Option<StoredStation>, StoreError> {
        let row = self.client.query_opt(
            "SELECT document, last_synced FROM water_stations WHERE station_id = $1",
            &[&station_id],
        )?;
        row.as_ref().map(Self::stored_from_row).transpose()
    }

    fn put(&mut self, record: &StationRecord, synced_at: DateTime<Utc>) -> Result<(), StoreError> {
        let document = serde_json::to_value(record)?;
        self.client.execute(
            "INSERT INTO water_stations (station_id, document, last_synced)
             VALUES ($1, $2, $3)
             ON CONFLICT (station_id)
             DO UPDATE SET document = EXCLUDED.document, last_synced = EXCLUDED.last_synced",
            &[&record.station_id, &document, &synced_at],
        )?;
        Ok(())
    }

    fn query(&mut self, query: &StationQuery) -> Result<Vec<StoredStation>, StoreError> {
        let status = query.status.map(|s| s.as_str().to_string());
        let rows = self.client.query(
            "SELECT document, last_synced FROM water_stations
             WHERE ($1::TEXT IS NULL OR document->>'province' = $1)
               AND ($2::TEXT IS NULL OR document->>'status' = $2)
             ORDER BY station_id",
            &[&query.province, &status],
        )?;
        rows.iter().map(Self::stored_from_row).collect()
    }
}
