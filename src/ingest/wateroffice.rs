/// Water Office real-time CSV bodies (legacy).
///
/// The `wateroffice.ec.gc.ca/services/real_time_data/csv/inline` endpoint
/// returned one row per (station, timestamp, parameter) reading:
///
/// ```text
///  ID,Date,Parameter/Paramètre,Value/Valeur,Qualifier/Qualificatif,...
/// 05BH004,2025-10-14T12:00:00-06:00,46,1.045,,,...
/// 05BH004,2025-10-14T12:00:00-06:00,47,67.7,,,...
/// ```
///
/// The service now answers every request with HTTP 422. It stays in the
/// registry as a documented failure case, and the parser is kept so a cached
/// or mirrored body can still be normalized.

use std::collections::HashMap;

use crate::ingest::normalize::{CanonicalField, FieldMapping, FieldValue, SourceRow};
use crate::model::NormalizationError;

pub const COLUMN_ID: &str = "ID";
pub const COLUMN_DATE: &str = "Date";
pub const COLUMN_PARAMETER: &str = "Parameter/Paramètre";
pub const COLUMN_VALUE: &str = "Value/Valeur";

/// Water Office parameter code for water level, in metres.
pub const PARAM_LEVEL: &str = "46";

/// Water Office parameter code for discharge, in cubic metres per second.
pub const PARAM_DISCHARGE: &str = "47";

/// Rows are pivoted so each parameter code becomes its own field.
pub static FIELD_TABLE: &[FieldMapping] = &[
    FieldMapping { source: COLUMN_ID, field: CanonicalField::StationId },
    FieldMapping { source: COLUMN_DATE, field: CanonicalField::ObservedAt },
    FieldMapping { source: PARAM_DISCHARGE, field: CanonicalField::Discharge },
    FieldMapping { source: PARAM_LEVEL, field: CanonicalField::Level },
];

// ---------------------------------------------------------------------------
// CSV splitting
// ---------------------------------------------------------------------------

/// Splits one CSV line, honouring double-quoted fields and `""` escapes.
pub(crate) fn split_csv_line(line: &str) -> Vec<String> {
    let mut fields = Vec::new();
    let mut current = String::new();
    let mut in_quotes = false;
    let mut chars = line.chars().peekable();

    while let Some(c) = chars.next() {
        match c {
            '"' if in_quotes && chars.peek() == Some(&'"') => {
                current.push('"');
                chars.next();
            }
            '"' => in_quotes = !in_quotes,
            ',' if !in_quotes => fields.push(std::mem::take(&mut current)),
            _ => current.push(c),
        }
    }
    fields.push(current);

    fields.into_iter().map(|f| f.trim().to_string()).collect()
}

fn data_lines(text: &str) -> impl Iterator<Item = &str> {
    text.lines().filter(|line| !line.trim().is_empty())
}

// ---------------------------------------------------------------------------
// Parsing
// ---------------------------------------------------------------------------

struct Columns {
    id: usize,
    date: usize,
    parameter: usize,
    value: usize,
}

impl Columns {
    fn locate(header: &[String]) -> Result<Self, NormalizationError> {
        let find = |name: &str| header.iter().position(|h| h == name);
        let structural = |name: &str| {
            find(name).ok_or_else(|| {
                NormalizationError::UnparseableBody(format!("CSV header lacks column {}", name))
            })
        };

        Ok(Columns {
            id: find(COLUMN_ID)
                .ok_or_else(|| NormalizationError::MissingRequiredField(COLUMN_ID.to_string()))?,
            date: structural(COLUMN_DATE)?,
            parameter: structural(COLUMN_PARAMETER)?,
            value: structural(COLUMN_VALUE)?,
        })
    }

    fn widest(&self) -> usize {
        self.id.max(self.date).max(self.parameter).max(self.value)
    }
}

/// Parses the body and pivots readings into one row per (ID, Date).
pub(crate) fn parse_rows(text: &str) -> Result<Vec<SourceRow>, NormalizationError> {
    let mut lines = data_lines(text);
    let header = lines
        .next()
        .map(split_csv_line)
        .ok_or_else(|| NormalizationError::UnparseableBody("empty CSV body".to_string()))?;
    let columns = Columns::locate(&header)?;

    let mut rows: Vec<SourceRow> = Vec::new();
    let mut index: HashMap<(String, String), usize> = HashMap::new();

    for (line_no, line) in lines.enumerate() {
        let fields = split_csv_line(line);
        if fields.len() <= columns.widest() {
            return Err(NormalizationError::UnparseableBody(format!(
                "CSV row {} has {} columns, header declares {}",
                line_no + 2,
                fields.len(),
                header.len()
            )));
        }

        let id = fields[columns.id].clone();
        let date = fields[columns.date].clone();
        let slot = *index.entry((id.clone(), date.clone())).or_insert_with(|| {
            let mut row = SourceRow::new();
            row.insert(COLUMN_ID.to_string(), FieldValue::Text(id));
            row.insert(COLUMN_DATE.to_string(), FieldValue::Text(date));
            rows.push(row);
            rows.len() - 1
        });

        let parameter = &fields[columns.parameter];
        let value = &fields[columns.value];
        if !parameter.is_empty() && !value.is_empty() {
            rows[slot].insert(parameter.clone(), FieldValue::Text(value.clone()));
        }
    }

    Ok(rows)
}

/// True when the body is a complete Water Office header with no data rows.
///
/// A lone line that is not that header (an HTML page, a JSON error, a
/// truncated header) is left for the parser to report.
pub(crate) fn has_no_rows(body: &[u8]) -> bool {
    let Ok(text) = std::str::from_utf8(body) else {
        return false;
    };
    let mut lines = data_lines(text);
    match (lines.next(), lines.next()) {
        (Some(header), None) => Columns::locate(&split_csv_line(header)).is_ok(),
        _ => false,
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ingest::normalize::{normalize, normalize_for_station, ShapeTag};

    const HEADER: &str = " ID,Date,Parameter/Paramètre,Value/Valeur,Qualifier/Qualificatif,Symbol/Symbole,Approval/Approbation";

    fn body(rows: &[&str]) -> String {
        let mut text = String::from(HEADER);
        for row in rows {
            text.push('\n');
            text.push_str(row);
        }
        text
    }

    #[test]
    fn test_split_csv_line_handles_quotes() {
        assert_eq!(
            split_csv_line(r#"05BH004,"BOW RIVER, AT CALGARY","say ""hi""",1.0"#),
            vec!["05BH004", "BOW RIVER, AT CALGARY", r#"say "hi""#, "1.0"]
        );
        assert_eq!(split_csv_line("a,,b"), vec!["a", "", "b"]);
    }

    #[test]
    fn test_parameters_pivot_into_one_record() {
        let text = body(&[
            "05BH004,2025-10-14T12:00:00-06:00,46,1.045,,,P",
            "05BH004,2025-10-14T12:00:00-06:00,47,67.7,,,P",
        ]);
        let record = normalize(ShapeTag::CsvLegacy, text.as_bytes()).unwrap();
        assert_eq!(record.station_id, "05BH004");
        assert_eq!(record.level_m, Some(1.045));
        assert_eq!(record.discharge_cms, Some(67.7));
        assert_eq!(record.observed_at.as_deref(), Some("2025-10-14T18:00:00Z"));
    }

    #[test]
    fn test_latest_timestamp_wins() {
        let text = body(&[
            "05BH004,2025-10-14T13:00:00-06:00,47,70.1,,,P",
            "05BH004,2025-10-14T12:00:00-06:00,47,67.7,,,P",
        ]);
        let record = normalize(ShapeTag::CsvLegacy, text.as_bytes()).unwrap();
        assert_eq!(record.discharge_cms, Some(70.1));
    }

    #[test]
    fn test_unknown_parameter_codes_are_ignored() {
        let text = body(&["08NA011,2025-10-14T12:00:00Z,5,12.0,,,P"]);
        let record = normalize(ShapeTag::CsvLegacy, text.as_bytes()).unwrap();
        assert_eq!(record.discharge_cms, None);
        assert_eq!(record.level_m, None);
    }

    #[test]
    fn test_rows_for_other_stations_are_skipped() {
        let text = body(&[
            "05BH004,2025-10-14T12:00:00Z,47,67.7,,,P",
            "05BJ004,2025-10-14T13:00:00Z,47,9.2,,,P",
        ]);
        let record = normalize_for_station(ShapeTag::CsvLegacy, text.as_bytes(), "05BH004").unwrap();
        assert_eq!(record.discharge_cms, Some(67.7));
    }

    #[test]
    fn test_missing_id_column_is_missing_required_field() {
        let text = "Date,Parameter/Paramètre,Value/Valeur\n2025-10-14T12:00:00Z,47,67.7";
        assert_eq!(
            normalize(ShapeTag::CsvLegacy, text.as_bytes()),
            Err(NormalizationError::MissingRequiredField("ID".to_string()))
        );
    }

    #[test]
    fn test_lowercase_header_is_not_matched() {
        let text = "id,date,parameter,value\n05BH004,2025-10-14T12:00:00Z,47,67.7";
        assert_eq!(
            normalize(ShapeTag::CsvLegacy, text.as_bytes()),
            Err(NormalizationError::MissingRequiredField("ID".to_string()))
        );
    }

    #[test]
    fn test_blank_id_cell_is_missing_required_field() {
        let text = body(&[",2025-10-14T12:00:00Z,47,67.7,,,P"]);
        assert_eq!(
            normalize(ShapeTag::CsvLegacy, text.as_bytes()),
            Err(NormalizationError::MissingRequiredField("ID".to_string()))
        );
    }

    #[test]
    fn test_short_row_is_unparseable() {
        let text = body(&["05BH004,2025-10-14T12:00:00Z"]);
        assert!(matches!(
            normalize(ShapeTag::CsvLegacy, text.as_bytes()),
            Err(NormalizationError::UnparseableBody(_))
        ));
    }

    #[test]
    fn test_malformed_bodies_never_panic() {
        let bodies: &[&str] = &[
            "",
            "\n\n",
            "ID",
            "ID\n05BH004",
            "\"ID,Date",
            "{\"features\": []}",
            "ID,Date,Parameter/Paramètre,Value/Valeur\n,,,\n\"",
        ];
        for b in bodies {
            let _ = normalize(ShapeTag::CsvLegacy, b.as_bytes());
        }
        assert!(normalize(ShapeTag::CsvLegacy, b"").is_err());
    }

    #[test]
    fn test_header_only_body_has_no_rows() {
        assert!(has_no_rows(HEADER.as_bytes()));
        assert!(has_no_rows(format!("{}\n\n", HEADER).as_bytes()));
        assert!(!has_no_rows(body(&["05BH004,2025-10-14T12:00:00Z,47,67.7,,,P"]).as_bytes()));
    }

    #[test]
    fn test_single_line_that_is_not_the_header_has_rows() {
        assert!(!has_no_rows(b"<html><body>Service moved</body></html>"));
        assert!(!has_no_rows(br#"{"error":"bad request"}"#));
        assert!(!has_no_rows(b"ID,Date"));
        assert!(!has_no_rows(b""));
    }

    #[test]
    fn test_single_line_garbage_is_reported_by_the_parser() {
        assert_eq!(
            normalize(ShapeTag::CsvLegacy, b"<html><body>Service moved</body></html>"),
            Err(NormalizationError::MissingRequiredField("ID".to_string()))
        );
        assert_eq!(
            normalize(ShapeTag::CsvLegacy, br#"{"error":"bad request"}"#),
            Err(NormalizationError::MissingRequiredField("ID".to_string()))
        );
        assert!(matches!(
            normalize(ShapeTag::CsvLegacy, b"ID,Date"),
            Err(NormalizationError::UnparseableBody(_))
        ));
    }
}
