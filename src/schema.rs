//! Raw NADP CSV tables and their normalization into typed columns.
//!
//! Networks publish different column sets for the same concepts. Columns are
//! classified by name, in this order:
//! - date-like names (see [`DATE_PATTERNS`]) become timestamps
//! - names containing `flag` become booleans (`" "` is the only "no flag")
//! - declared string fields stay text, with `nan` rewritten to `""`
//! - declared numeric fields are parsed, failures reported
//! - everything else is numeric when every non-empty cell parses, text otherwise

use std::collections::{BTreeMap, HashMap};
use std::fs;
use std::io::Read;
use std::path::Path;

use chrono::{NaiveDate, NaiveDateTime};
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::{debug, info, warn};

use crate::diagnostics::Diagnostic;

pub const SITE_ID_FIELD: &str = "siteID";
pub const DATEON_FIELD: &str = "dateon";
pub const DATEOFF_FIELD: &str = "dateoff";

/// Value NADP writes in place of a failed or absent measurement.
pub const NADP_ERROR_SENTINEL: f64 = -9.0;

pub const DECLARED_STRING_FIELDS: [&str; 9] = [
    "siteID",
    "siteName",
    "county",
    "state",
    "labno",
    "network",
    "valcode",
    "invalcode",
    "status",
];

const DEFAULT_NUMERIC_FIELDS: [&str; 14] = [
    "ph", "Conduc", "Ca", "Mg", "K", "Na", "NH4", "NO3", "Cl", "SO4", "Br", "ppt", "subppt",
    "svol",
];

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TimestampFormat {
    DateTime(&'static str),
    /// `%Y%m`; the first day of the month is assumed.
    YearMonth,
}

impl TimestampFormat {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::DateTime(fmt) => fmt,
            Self::YearMonth => "%Y%m",
        }
    }

    pub fn parse(self, raw: &str) -> Option<NaiveDateTime> {
        match self {
            Self::DateTime(fmt) => NaiveDateTime::parse_from_str(raw, fmt).ok(),
            Self::YearMonth => {
                if raw.len() != 6 || !raw.bytes().all(|b| b.is_ascii_digit()) {
                    return None;
                }
                NaiveDate::parse_from_str(&format!("{raw}01"), "%Y%m%d")
                    .ok()
                    .and_then(|date| date.and_hms_opt(0, 0, 0))
            }
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DatePattern {
    pub pattern: &'static str,
    pub format: TimestampFormat,
}

/// Checked in order; the first pattern contained in a column name decides
/// its format, so the specific names come before the bare `date`.
pub const DATE_PATTERNS: [DatePattern; 10] = [
    DatePattern {
        pattern: "dateon",
        format: TimestampFormat::DateTime("%Y-%m-%d %H:%M:%S"),
    },
    DatePattern {
        pattern: "dateoff",
        format: TimestampFormat::DateTime("%Y-%m-%d %H:%M:%S"),
    },
    DatePattern {
        pattern: "startdate",
        format: TimestampFormat::DateTime("%Y-%m-%d %H:%M:%S"),
    },
    DatePattern {
        pattern: "stopdate",
        format: TimestampFormat::DateTime("%Y-%m-%d %H:%M:%S"),
    },
    DatePattern {
        pattern: "CollStart",
        format: TimestampFormat::DateTime("%Y-%m-%d %H:%M"),
    },
    DatePattern {
        pattern: "CollEnd",
        format: TimestampFormat::DateTime("%Y-%m-%d %H:%M"),
    },
    DatePattern {
        pattern: "modifiedOn",
        format: TimestampFormat::DateTime("%m/%d/%Y %I:%M:%S %p"),
    },
    DatePattern {
        pattern: "yrmonth",
        format: TimestampFormat::YearMonth,
    },
    DatePattern {
        pattern: "DATE",
        format: TimestampFormat::DateTime("%Y-%m-%d %H:%M"),
    },
    DatePattern {
        pattern: "date",
        format: TimestampFormat::DateTime("%Y-%m-%d %H:%M"),
    },
];

pub fn date_pattern_for(column: &str) -> Option<&'static DatePattern> {
    DATE_PATTERNS.iter().find(|p| column.contains(p.pattern))
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum VariableType {
    Numeric,
    Text,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ColumnKind {
    Timestamp,
    Flag,
    Text,
    Numeric,
}

impl ColumnKind {
    /// Flags are carried as 1.0 / 0.0; timestamps have no payload type.
    pub fn variable_type(self) -> Option<VariableType> {
        match self {
            Self::Numeric | Self::Flag => Some(VariableType::Numeric),
            Self::Text => Some(VariableType::Text),
            Self::Timestamp => None,
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum FieldValue {
    Timestamp(NaiveDateTime),
    Flag(bool),
    Number(f64),
    Text(String),
    Missing,
}

impl FieldValue {
    pub fn as_timestamp(&self) -> Option<NaiveDateTime> {
        match self {
            Self::Timestamp(ts) => Some(*ts),
            _ => None,
        }
    }

    pub fn as_number(&self) -> Option<f64> {
        match self {
            Self::Number(v) => Some(*v),
            Self::Flag(flag) => Some(if *flag { 1.0 } else { 0.0 }),
            _ => None,
        }
    }

    pub fn as_text(&self) -> Option<&str> {
        match self {
            Self::Text(text) => Some(text),
            _ => None,
        }
    }
}

#[derive(Debug, Error)]
pub enum SchemaError {
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
    #[error("CSV error: {0}")]
    Csv(#[from] csv::Error),
    #[error("table has no column named {0}")]
    MissingColumn(String),
}

/// CSV contents as read, with cells untouched.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RawTable {
    pub headers: Vec<String>,
    pub rows: Vec<Vec<String>>,
}

impl RawTable {
    pub fn column_index(&self, name: &str) -> Option<usize> {
        self.headers.iter().position(|h| h == name)
    }

    pub fn len(&self) -> usize {
        self.rows.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }
}

pub fn read_raw_table<R: Read>(reader: R) -> Result<RawTable, SchemaError> {
    let mut reader = csv::ReaderBuilder::new()
        .has_headers(true)
        .trim(csv::Trim::None)
        .from_reader(reader);

    let headers = reader.headers()?.iter().map(str::to_string).collect();
    let mut rows = Vec::new();
    for record in reader.records() {
        let record = record?;
        rows.push(record.iter().map(str::to_string).collect());
    }

    Ok(RawTable { headers, rows })
}

pub fn read_raw_table_from_path(path: &Path) -> Result<RawTable, SchemaError> {
    let file = fs::File::open(path)?;
    let table = read_raw_table(file)?;
    debug!(
        component = "schema",
        event = "schema.read.finish",
        path = %path.display(),
        columns = table.headers.len(),
        rows = table.rows.len()
    );
    Ok(table)
}

/// Left-joins site list attributes onto data rows by site id.
///
/// The site list may spell its key `siteid`. Site columns already present in
/// `data` are not repeated; the first site list row for an id wins and rows
/// without a match get empty cells.
pub fn merge_site_info(data: &RawTable, sites: &RawTable) -> Result<RawTable, SchemaError> {
    let data_key = data
        .column_index(SITE_ID_FIELD)
        .ok_or_else(|| SchemaError::MissingColumn(SITE_ID_FIELD.to_string()))?;
    let site_key = sites
        .headers
        .iter()
        .position(|h| h.eq_ignore_ascii_case(SITE_ID_FIELD))
        .ok_or_else(|| SchemaError::MissingColumn(SITE_ID_FIELD.to_string()))?;

    let extra: Vec<usize> = sites
        .headers
        .iter()
        .enumerate()
        .filter(|(idx, name)| *idx != site_key && data.column_index(name).is_none())
        .map(|(idx, _)| idx)
        .collect();

    let mut by_site: HashMap<&str, &Vec<String>> = HashMap::new();
    for row in &sites.rows {
        if let Some(id) = row.get(site_key) {
            by_site.entry(id.as_str()).or_insert(row);
        }
    }

    let mut headers = data.headers.clone();
    headers.extend(extra.iter().map(|idx| sites.headers[*idx].clone()));

    let mut unmatched = 0u64;
    let rows = data
        .rows
        .iter()
        .map(|row| {
            let mut merged = row.clone();
            let site = row.get(data_key).map(String::as_str).unwrap_or_default();
            match by_site.get(site) {
                Some(site_row) => merged.extend(
                    extra
                        .iter()
                        .map(|idx| site_row.get(*idx).cloned().unwrap_or_default()),
                ),
                None => {
                    unmatched += 1;
                    merged.extend(extra.iter().map(|_| String::new()));
                }
            }
            merged
        })
        .collect();

    info!(
        component = "schema",
        event = "schema.merge_sites.finish",
        rows = data.rows.len(),
        added_columns = extra.len(),
        unmatched_rows = unmatched
    );

    Ok(RawTable { headers, rows })
}

#[derive(Debug, Clone, PartialEq)]
pub struct NormalizeConfig {
    pub string_fields: Vec<String>,
    pub numeric_fields: Vec<String>,
    pub error_sentinel: Option<f64>,
}

impl Default for NormalizeConfig {
    fn default() -> Self {
        Self {
            string_fields: DECLARED_STRING_FIELDS.iter().map(|s| s.to_string()).collect(),
            numeric_fields: DEFAULT_NUMERIC_FIELDS.iter().map(|s| s.to_string()).collect(),
            error_sentinel: Some(NADP_ERROR_SENTINEL),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NormalizedColumn {
    pub name: String,
    pub kind: ColumnKind,
}

#[derive(Debug, Clone, PartialEq)]
pub struct NormalizedTable {
    pub columns: Vec<NormalizedColumn>,
    pub rows: Vec<Vec<FieldValue>>,
}

impl NormalizedTable {
    pub fn column_index(&self, name: &str) -> Option<usize> {
        self.columns.iter().position(|c| c.name == name)
    }

    pub fn kind(&self, name: &str) -> Option<ColumnKind> {
        self.columns.iter().find(|c| c.name == name).map(|c| c.kind)
    }

    pub fn len(&self) -> usize {
        self.rows.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    /// Type tag per column that can carry a payload.
    pub fn variable_types(&self) -> BTreeMap<String, VariableType> {
        self.columns
            .iter()
            .filter_map(|c| c.kind.variable_type().map(|t| (c.name.clone(), t)))
            .collect()
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct NormalizeReport {
    pub rows: u64,
    pub timestamp_columns: Vec<String>,
    pub flag_columns: Vec<String>,
    pub text_columns: Vec<String>,
    pub numeric_columns: Vec<String>,
    pub sentinel_values_replaced: u64,
    pub diagnostics: Vec<Diagnostic>,
}

pub fn normalize(raw: &RawTable, cfg: &NormalizeConfig) -> (NormalizedTable, NormalizeReport) {
    let row_count = raw.rows.len();
    let mut report = NormalizeReport {
        rows: row_count as u64,
        ..NormalizeReport::default()
    };
    let mut columns = Vec::with_capacity(raw.headers.len());
    let mut rows: Vec<Vec<FieldValue>> = (0..row_count)
        .map(|_| Vec::with_capacity(raw.headers.len()))
        .collect();

    for (col, name) in raw.headers.iter().enumerate() {
        let cells: Vec<&str> = raw
            .rows
            .iter()
            .map(|row| row.get(col).map(String::as_str).unwrap_or_default())
            .collect();

        let (kind, values) = if let Some(pattern) = date_pattern_for(name) {
            (
                ColumnKind::Timestamp,
                parse_timestamp_column(name, &cells, pattern.format, &mut report),
            )
        } else if name.contains("flag") {
            (ColumnKind::Flag, cells.iter().map(|c| parse_flag(c)).collect())
        } else if cfg.string_fields.iter().any(|f| f == name) {
            (
                ColumnKind::Text,
                cells
                    .iter()
                    .map(|c| FieldValue::Text(declared_string(c)))
                    .collect(),
            )
        } else if cfg.numeric_fields.iter().any(|f| f == name) {
            (
                ColumnKind::Numeric,
                parse_numeric_column(name, &cells, cfg, &mut report),
            )
        } else if cells
            .iter()
            .all(|c| c.trim().is_empty() || c.trim().parse::<f64>().is_ok())
        {
            (
                ColumnKind::Numeric,
                parse_numeric_column(name, &cells, cfg, &mut report),
            )
        } else {
            (
                ColumnKind::Text,
                cells
                    .iter()
                    .map(|c| FieldValue::Text(c.to_string()))
                    .collect(),
            )
        };

        debug!(
            component = "schema",
            event = "schema.column.classified",
            column = %name,
            kind = ?kind
        );
        match kind {
            ColumnKind::Timestamp => report.timestamp_columns.push(name.clone()),
            ColumnKind::Flag => report.flag_columns.push(name.clone()),
            ColumnKind::Text => report.text_columns.push(name.clone()),
            ColumnKind::Numeric => report.numeric_columns.push(name.clone()),
        }

        for (row, value) in rows.iter_mut().zip(values) {
            row.push(value);
        }
        columns.push(NormalizedColumn {
            name: name.clone(),
            kind,
        });
    }

    let table = NormalizedTable { columns, rows };
    check_date_order(&table, &mut report);

    if !report.diagnostics.is_empty() {
        warn!(
            component = "schema",
            event = "schema.normalize.diagnostics",
            count = report.diagnostics.len(),
            first = %report.diagnostics[0]
        );
    }
    info!(
        component = "schema",
        event = "schema.normalize.finish",
        rows = report.rows,
        timestamp_columns = report.timestamp_columns.len(),
        flag_columns = report.flag_columns.len(),
        text_columns = report.text_columns.len(),
        numeric_columns = report.numeric_columns.len(),
        sentinel_values_replaced = report.sentinel_values_replaced
    );

    (table, report)
}

/// A single space is the only "no flag" value; anything else, empty
/// included, means a flag is present.
pub fn parse_flag(raw: &str) -> FieldValue {
    FieldValue::Flag(raw != " ")
}

fn declared_string(raw: &str) -> String {
    if raw == "nan" {
        String::new()
    } else {
        raw.to_string()
    }
}

fn parse_timestamp_column(
    name: &str,
    cells: &[&str],
    format: TimestampFormat,
    report: &mut NormalizeReport,
) -> Vec<FieldValue> {
    cells
        .iter()
        .enumerate()
        .map(|(row, raw)| {
            if raw.is_empty() {
                return FieldValue::Missing;
            }
            match format.parse(raw) {
                Some(ts) => FieldValue::Timestamp(ts),
                None => {
                    report.diagnostics.push(Diagnostic::ParseError {
                        row,
                        column: name.to_string(),
                        value: raw.to_string(),
                        format: format.as_str().to_string(),
                    });
                    FieldValue::Missing
                }
            }
        })
        .collect()
}

fn parse_numeric_column(
    name: &str,
    cells: &[&str],
    cfg: &NormalizeConfig,
    report: &mut NormalizeReport,
) -> Vec<FieldValue> {
    cells
        .iter()
        .enumerate()
        .map(|(row, raw)| {
            let trimmed = raw.trim();
            if trimmed.is_empty() {
                return FieldValue::Number(f64::NAN);
            }
            match trimmed.parse::<f64>() {
                Ok(value) if cfg.error_sentinel == Some(value) => {
                    report.sentinel_values_replaced += 1;
                    FieldValue::Number(f64::NAN)
                }
                Ok(value) => FieldValue::Number(value),
                Err(_) => {
                    report.diagnostics.push(Diagnostic::ParseError {
                        row,
                        column: name.to_string(),
                        value: raw.to_string(),
                        format: "f64".to_string(),
                    });
                    FieldValue::Number(f64::NAN)
                }
            }
        })
        .collect()
}

fn check_date_order(table: &NormalizedTable, report: &mut NormalizeReport) {
    let (Some(on_idx), Some(off_idx)) = (
        table.column_index(DATEON_FIELD),
        table.column_index(DATEOFF_FIELD),
    ) else {
        return;
    };

    for (row, values) in table.rows.iter().enumerate() {
        if let (Some(dateon), Some(dateoff)) =
            (values[on_idx].as_timestamp(), values[off_idx].as_timestamp())
        {
            if dateoff < dateon {
                report.diagnostics.push(Diagnostic::DateOrder {
                    row,
                    dateon,
                    dateoff,
                });
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn raw(headers: &[&str], rows: &[&[&str]]) -> RawTable {
        RawTable {
            headers: headers.iter().map(|h| h.to_string()).collect(),
            rows: rows
                .iter()
                .map(|r| r.iter().map(|c| c.to_string()).collect())
                .collect(),
        }
    }

    fn ts(y: i32, m: u32, d: u32, h: u32, min: u32) -> NaiveDateTime {
        NaiveDate::from_ymd_opt(y, m, d)
            .unwrap()
            .and_hms_opt(h, min, 0)
            .unwrap()
    }

    #[test]
    fn flag_space_is_the_only_false_value() {
        let table = raw(
            &["flagCa"],
            &[&[" "], &["<"], &[" "], &["X"], &[""]],
        );
        let (normalized, report) = normalize(&table, &NormalizeConfig::default());

        let flags: Vec<FieldValue> = normalized.rows.iter().map(|r| r[0].clone()).collect();
        assert_eq!(
            flags,
            vec![
                FieldValue::Flag(false),
                FieldValue::Flag(true),
                FieldValue::Flag(false),
                FieldValue::Flag(true),
                FieldValue::Flag(true),
            ]
        );
        assert_eq!(report.flag_columns, vec!["flagCa".to_string()]);
    }

    #[test]
    fn csv_reader_keeps_single_space_cells() {
        let body = "siteID,flagNO3\nIL11, \nIL11,<\n";
        let table = read_raw_table(body.as_bytes()).unwrap();
        assert_eq!(table.rows[0][1], " ");
        assert_eq!(table.rows[1][1], "<");
    }

    #[test]
    fn first_matching_pattern_decides_the_format() {
        assert_eq!(date_pattern_for("dateon").unwrap().pattern, "dateon");
        assert_eq!(date_pattern_for("dateoff").unwrap().pattern, "dateoff");
        assert_eq!(date_pattern_for("sampledate").unwrap().pattern, "date");
        assert_eq!(date_pattern_for("SAMPLE_DATE").unwrap().pattern, "DATE");
        assert_eq!(date_pattern_for("modifiedOn").unwrap().pattern, "modifiedOn");
        assert!(date_pattern_for("ph").is_none());
        assert!(date_pattern_for("Dateon").is_none());
    }

    #[test]
    fn date_columns_parse_with_their_formats() {
        let table = raw(
            &["dateon", "CollEnd", "modifiedOn", "yrmonth"],
            &[&[
                "1978-07-11 09:00:00",
                "1978-07-18 09:30",
                "1/5/2021 2:30:00 PM",
                "197807",
            ]],
        );
        let (normalized, report) = normalize(&table, &NormalizeConfig::default());

        assert!(report.diagnostics.is_empty(), "{:?}", report.diagnostics);
        let row = &normalized.rows[0];
        assert_eq!(row[0], FieldValue::Timestamp(ts(1978, 7, 11, 9, 0)));
        assert_eq!(row[1], FieldValue::Timestamp(ts(1978, 7, 18, 9, 30)));
        assert_eq!(row[2], FieldValue::Timestamp(ts(2021, 1, 5, 14, 30)));
        assert_eq!(row[3], FieldValue::Timestamp(ts(1978, 7, 1, 0, 0)));
    }

    #[test]
    fn unparseable_date_is_reported_and_empty_date_is_missing() {
        let table = raw(
            &["dateoff"],
            &[&["1978-07-18 09:00:00"], &["18/07/1978"], &[""]],
        );
        let (normalized, report) = normalize(&table, &NormalizeConfig::default());

        assert_eq!(normalized.rows[1][0], FieldValue::Missing);
        assert_eq!(normalized.rows[2][0], FieldValue::Missing);
        assert_eq!(
            report.diagnostics,
            vec![Diagnostic::ParseError {
                row: 1,
                column: "dateoff".to_string(),
                value: "18/07/1978".to_string(),
                format: "%Y-%m-%d %H:%M:%S".to_string(),
            }]
        );
    }

    #[test]
    fn declared_strings_rewrite_nan_to_empty() {
        let table = raw(
            &["siteID", "county", "labno"],
            &[&["IL11", "nan", "0001"], &["WY99", "", "nan"]],
        );
        let (normalized, _) = normalize(&table, &NormalizeConfig::default());

        assert_eq!(normalized.kind("labno"), Some(ColumnKind::Text));
        assert_eq!(normalized.rows[0][1], FieldValue::Text(String::new()));
        assert_eq!(normalized.rows[0][2], FieldValue::Text("0001".to_string()));
        assert_eq!(normalized.rows[1][2], FieldValue::Text(String::new()));
    }

    #[test]
    fn numeric_columns_replace_sentinel_and_report_bad_cells() {
        let table = raw(
            &["NO3", "lat", "qrCode"],
            &[&["1.25", "40.05", "A"], &["-9", "", "C"], &["oops", "41.0", ""]],
        );
        let (normalized, report) = normalize(&table, &NormalizeConfig::default());

        assert_eq!(normalized.kind("NO3"), Some(ColumnKind::Numeric));
        assert_eq!(normalized.kind("lat"), Some(ColumnKind::Numeric));
        assert_eq!(normalized.kind("qrCode"), Some(ColumnKind::Text));
        assert_eq!(normalized.rows[0][0], FieldValue::Number(1.25));
        assert!(normalized.rows[1][0].as_number().unwrap().is_nan());
        assert!(normalized.rows[1][1].as_number().unwrap().is_nan());
        assert_eq!(report.sentinel_values_replaced, 1);
        assert_eq!(report.diagnostics.len(), 1);
        assert!(matches!(
            &report.diagnostics[0],
            Diagnostic::ParseError { row: 2, column, .. } if column == "NO3"
        ));
    }

    #[test]
    fn padded_cells_still_infer_numeric() {
        let table = raw(
            &["lat", "NO3"],
            &[&[" 40.05", " 1.5"], &["41.0 ", "2.0"], &[" ", "  "]],
        );
        let (normalized, report) = normalize(&table, &NormalizeConfig::default());

        assert_eq!(normalized.kind("lat"), Some(ColumnKind::Numeric));
        assert_eq!(normalized.kind("NO3"), Some(ColumnKind::Numeric));
        assert_eq!(normalized.rows[0][0], FieldValue::Number(40.05));
        assert_eq!(normalized.rows[1][0], FieldValue::Number(41.0));
        assert!(normalized.rows[2][0].as_number().unwrap().is_nan());
        assert!(normalized.rows[2][1].as_number().unwrap().is_nan());
        assert!(report.diagnostics.is_empty());
    }

    #[test]
    fn dateoff_before_dateon_is_reported() {
        let table = raw(
            &["dateon", "dateoff"],
            &[&["1978-07-18 09:00:00", "1978-07-11 09:00:00"]],
        );
        let (_, report) = normalize(&table, &NormalizeConfig::default());
        assert!(matches!(report.diagnostics[0], Diagnostic::DateOrder { row: 0, .. }));
    }

    #[test]
    fn normalize_leaves_input_untouched() {
        let table = raw(&["flagCa", "siteID"], &[&[" ", "nan"]]);
        let before = table.clone();
        let _ = normalize(&table, &NormalizeConfig::default());
        assert_eq!(table, before);
    }

    #[test]
    fn merge_site_info_left_joins_on_site_id() {
        let data = raw(
            &["siteID", "NO3", "state"],
            &[&["IL11", "1.0", "IL"], &["ZZ00", "2.0", ""]],
        );
        let sites = raw(
            &["siteid", "siteName", "state", "latitude"],
            &[&["IL11", "Bondville", "IL", "40.05"], &["IL11", "dup", "IL", "0"]],
        );

        let merged = merge_site_info(&data, &sites).unwrap();
        assert_eq!(merged.headers, vec!["siteID", "NO3", "state", "siteName", "latitude"]);
        assert_eq!(merged.rows[0], vec!["IL11", "1.0", "IL", "Bondville", "40.05"]);
        assert_eq!(merged.rows[1], vec!["ZZ00", "2.0", "", "", ""]);
    }

    #[test]
    fn merge_site_info_requires_site_key() {
        let data = raw(&["NO3"], &[]);
        let sites = raw(&["siteid"], &[]);
        assert!(matches!(
            merge_site_info(&data, &sites).unwrap_err(),
            SchemaError::MissingColumn(_)
        ));
    }

    #[test]
    fn variable_types_skip_timestamps_and_map_flags_to_numeric() {
        let table = raw(
            &["siteID", "dateoff", "flagCa", "Ca"],
            &[&["IL11", "1978-07-11 09:00:00", " ", "0.1"]],
        );
        let (normalized, _) = normalize(&table, &NormalizeConfig::default());
        let types = normalized.variable_types();

        assert_eq!(types.get("siteID"), Some(&VariableType::Text));
        assert_eq!(types.get("flagCa"), Some(&VariableType::Numeric));
        assert_eq!(types.get("Ca"), Some(&VariableType::Numeric));
        assert!(!types.contains_key("dateoff"));
    }
}
