//! GeoMet OGC API (api.weather.gc.ca) feature-collection bodies.
//!
//! Covers the `hydrometric-realtime` and `hydrometric-stations` collections.
//! Both return GeoJSON; station attributes live under each feature's
//! `properties` with upper-case names, and the point geometry carries
//! `[longitude, latitude]`.
//!
//! API Documentation: https://api.weather.gc.ca/openapi

use serde::Deserialize;
use serde_json::Value;

use crate::ingest::normalize::{CanonicalField, FieldMapping, FieldValue, SourceRow};
use crate::model::NormalizationError;

/// Pseudo field names for the GeoJSON point geometry.
pub const GEOMETRY_LONGITUDE: &str = "geometry.coordinates[0]";
pub const GEOMETRY_LATITUDE: &str = "geometry.coordinates[1]";

/// Field table for the current (upper-case) GeoMet property names.
///
/// Lower-case names from the retired service (`station_number`, ...) are not
/// listed and therefore never matched.
pub static FIELD_TABLE: &[FieldMapping] = &[
    FieldMapping { source: "STATION_NUMBER", field: CanonicalField::StationId },
    FieldMapping { source: "STATION_NAME", field: CanonicalField::Name },
    FieldMapping { source: "PROV_TERR_STATE_LOC", field: CanonicalField::Province },
    FieldMapping { source: "LATITUDE", field: CanonicalField::Latitude },
    FieldMapping { source: GEOMETRY_LATITUDE, field: CanonicalField::Latitude },
    FieldMapping { source: "LONGITUDE", field: CanonicalField::Longitude },
    FieldMapping { source: GEOMETRY_LONGITUDE, field: CanonicalField::Longitude },
    FieldMapping { source: "DRAINAGE_AREA_GROSS", field: CanonicalField::DrainageArea },
    FieldMapping { source: "DISCHARGE", field: CanonicalField::Discharge },
    FieldMapping { source: "LEVEL", field: CanonicalField::Level },
    FieldMapping { source: "DATETIME", field: CanonicalField::ObservedAt },
    FieldMapping { source: "STATUS_EN", field: CanonicalField::Status },
];

// ============================================================================
// Response Structures
// ============================================================================

#[derive(Debug, Deserialize)]
struct FeatureCollection {
    features: Vec<Feature>,
}

#[derive(Debug, Deserialize)]
struct Feature {
    #[serde(default)]
    properties: Option<serde_json::Map<String, Value>>,
    #[serde(default)]
    geometry: Option<Geometry>,
}

#[derive(Debug, Deserialize)]
struct Geometry {
    #[serde(default)]
    coordinates: Option<Value>,
}

// ============================================================================
// Parsing
// ============================================================================

/// Flattens each feature into a row of its properties plus point geometry.
pub(crate) fn parse_rows(text: &str) -> Result<Vec<SourceRow>, NormalizationError> {
    let collection: FeatureCollection = serde_json::from_str(text)
        .map_err(|e| NormalizationError::UnparseableBody(format!("feature collection: {}", e)))?;

    collection
        .features
        .into_iter()
        .enumerate()
        .map(|(i, feature)| feature_row(i, feature))
        .collect()
}

fn feature_row(index: usize, feature: Feature) -> Result<SourceRow, NormalizationError> {
    let properties = feature.properties.ok_or_else(|| {
        NormalizationError::UnparseableBody(format!("feature {} has no properties object", index))
    })?;

    let mut row: SourceRow = properties
        .into_iter()
        .filter_map(|(key, value)| match value {
            Value::String(s) => Some((key, FieldValue::Text(s))),
            Value::Number(n) => n.as_f64().map(|n| (key, FieldValue::Number(n))),
            _ => None,
        })
        .collect();

    if let Some((lon, lat)) = feature
        .geometry
        .and_then(|g| g.coordinates)
        .as_ref()
        .and_then(point_coordinates)
    {
        row.insert(GEOMETRY_LONGITUDE.to_string(), FieldValue::Number(lon));
        row.insert(GEOMETRY_LATITUDE.to_string(), FieldValue::Number(lat));
    }

    Ok(row)
}

/// `[lon, lat]` (optionally with elevation); anything else is ignored.
fn point_coordinates(value: &Value) -> Option<(f64, f64)> {
    let coords = value.as_array()?;
    let lon = coords.first()?.as_f64()?;
    let lat = coords.get(1)?.as_f64()?;
    Some((lon, lat))
}

/// True for a well-formed collection whose `features` array is empty.
pub(crate) fn is_empty_collection(body: &[u8]) -> bool {
    serde_json::from_slice::<Value>(body)
        .ok()
        .and_then(|json| json.get("features").and_then(|f| f.as_array()).map(|f| f.is_empty()))
        .unwrap_or(false)
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ingest::normalize::{normalize, normalize_for_station, ShapeTag};
    use crate::model::{Coordinates, StationStatus};

    const REALTIME_BODY: &str = r#"{
        "type": "FeatureCollection",
        "numberMatched": 2,
        "numberReturned": 2,
        "features": [
            {
                "type": "Feature",
                "id": "05BH004.2025-10-14 17:00:00",
                "geometry": {"type": "Point", "coordinates": [-114.0511, 51.05]},
                "properties": {
                    "STATION_NUMBER": "05BH004",
                    "STATION_NAME": "BOW RIVER AT CALGARY",
                    "PROV_TERR_STATE_LOC": "AB",
                    "DATETIME": "2025-10-14T17:00:00Z",
                    "DISCHARGE": 66.1,
                    "LEVEL": 1.041
                }
            },
            {
                "type": "Feature",
                "id": "05BH004.2025-10-14 18:00:00",
                "geometry": {"type": "Point", "coordinates": [-114.0511, 51.05]},
                "properties": {
                    "STATION_NUMBER": "05BH004",
                    "STATION_NAME": "BOW RIVER AT CALGARY",
                    "PROV_TERR_STATE_LOC": "AB",
                    "DATETIME": "2025-10-14T18:00:00Z",
                    "DISCHARGE": 67.7,
                    "LEVEL": 1.045
                }
            }
        ]
    }"#;

    const STATIONS_BODY: &str = r#"{
        "type": "FeatureCollection",
        "features": [{
            "type": "Feature",
            "geometry": {"type": "Point", "coordinates": [-116.9633, 51.2967]},
            "properties": {
                "STATION_NUMBER": "05AD007",
                "STATION_NAME": "KICKING HORSE RIVER AT GOLDEN",
                "PROV_TERR_STATE_LOC": "BC",
                "LATITUDE": 51.2967,
                "LONGITUDE": -116.9633,
                "DRAINAGE_AREA_GROSS": "1850",
                "STATUS_EN": "Active",
                "REAL_TIME": 1
            }
        }]
    }"#;

    #[test]
    fn test_realtime_body_picks_most_recent_feature() {
        let record = normalize(ShapeTag::JsonFeatureCollection, REALTIME_BODY.as_bytes()).unwrap();
        assert_eq!(record.station_id, "05BH004");
        assert_eq!(record.discharge_cms, Some(67.7));
        assert_eq!(record.level_m, Some(1.045));
        assert_eq!(record.observed_at.as_deref(), Some("2025-10-14T18:00:00Z"));
        assert_eq!(record.province.as_deref(), Some("AB"));
        assert_eq!(record.status, StationStatus::Unknown);
    }

    #[test]
    fn test_geometry_supplies_location_when_properties_lack_it() {
        let record = normalize(ShapeTag::JsonFeatureCollection, REALTIME_BODY.as_bytes()).unwrap();
        assert_eq!(
            record.location,
            Some(Coordinates { latitude: 51.05, longitude: -114.0511 })
        );
    }

    #[test]
    fn test_station_metadata_body() {
        let record = normalize(ShapeTag::JsonFeatureCollection, STATIONS_BODY.as_bytes()).unwrap();
        assert_eq!(record.name.as_deref(), Some("KICKING HORSE RIVER AT GOLDEN"));
        assert_eq!(record.drainage_area_km2, Some(1850.0));
        assert_eq!(record.status, StationStatus::Active);
        assert!(!record.has_readings());
    }

    #[test]
    fn test_lowercase_field_names_are_not_matched() {
        let body = r#"{"features": [{"properties": {
            "STATION_NUMBER": "05BH004",
            "discharge": 67.7,
            "level": 1.045
        }}]}"#;
        let record = normalize(ShapeTag::JsonFeatureCollection, body.as_bytes()).unwrap();
        assert_eq!(record.discharge_cms, None);
        assert_eq!(record.level_m, None);
    }

    #[test]
    fn test_lowercase_station_number_is_a_missing_required_field() {
        let body = r#"{"features": [{"properties": {"station_number": "05BH004"}}]}"#;
        assert_eq!(
            normalize(ShapeTag::JsonFeatureCollection, body.as_bytes()),
            Err(NormalizationError::MissingRequiredField("STATION_NUMBER".to_string()))
        );
    }

    #[test]
    fn test_null_readings_are_absent() {
        let body = r#"{"features": [{"properties": {
            "STATION_NUMBER": "08NA011", "DISCHARGE": null, "LEVEL": 0.88
        }}]}"#;
        let record = normalize(ShapeTag::JsonFeatureCollection, body.as_bytes()).unwrap();
        assert_eq!(record.discharge_cms, None);
        assert_eq!(record.level_m, Some(0.88));
    }

    #[test]
    fn test_other_station_in_body_is_not_returned() {
        let err = normalize_for_station(
            ShapeTag::JsonFeatureCollection,
            STATIONS_BODY.as_bytes(),
            "05BH004",
        )
        .unwrap_err();
        assert_eq!(err, NormalizationError::StationNotInBody("05BH004".to_string()));
    }

    #[test]
    fn test_feature_without_properties_is_unparseable() {
        let body = r#"{"features": [{"type": "Feature", "geometry": null}]}"#;
        assert!(matches!(
            normalize(ShapeTag::JsonFeatureCollection, body.as_bytes()),
            Err(NormalizationError::UnparseableBody(_))
        ));
    }

    #[test]
    fn test_malformed_bodies_never_panic() {
        let bodies: &[&str] = &[
            "",
            "{",
            "null",
            "[]",
            "42",
            r#"{"features": 5}"#,
            r#"{"features": [1, 2]}"#,
            r#"{"features": [{"properties": []}]}"#,
            r#"{"features": [{"properties": {"STATION_NUMBER": 5}, "geometry": {"coordinates": "x"}}]}"#,
            r#"{"features": [{"properties": {"STATION_NUMBER": {}}}]}"#,
            "STATION_NUMBER,DISCHARGE\n05BH004,67.7",
        ];
        for body in bodies {
            // Any variant is acceptable as long as it is an error value, not a panic.
            let _ = normalize(ShapeTag::JsonFeatureCollection, body.as_bytes());
        }
        assert!(normalize(ShapeTag::JsonFeatureCollection, b"{").is_err());
        assert!(normalize(ShapeTag::JsonFeatureCollection, br#"{"features": 5}"#).is_err());
    }

    #[test]
    fn test_empty_collection_detection() {
        assert!(is_empty_collection(br#"{"type":"FeatureCollection","features":[]}"#));
        assert!(!is_empty_collection(REALTIME_BODY.as_bytes()));
        assert!(!is_empty_collection(b"not json"));
        assert!(!is_empty_collection(br#"{"type":"FeatureCollection"}"#));
    }

    #[test]
    fn test_normalizing_twice_is_byte_identical() {
        let first = normalize(ShapeTag::JsonFeatureCollection, REALTIME_BODY.as_bytes()).unwrap();
        let second = normalize(ShapeTag::JsonFeatureCollection, REALTIME_BODY.as_bytes()).unwrap();
        assert_eq!(
            serde_json::to_vec(&first).unwrap(),
            serde_json::to_vec(&second).unwrap()
        );
    }
}
