//! Per-variable, per-site alignment of a normalized table onto the calendar.

use std::collections::{BTreeMap, BTreeSet, HashSet};
use std::env;

use chrono::{Days, NaiveDate, Weekday};
use ndarray::Array2;
use serde::Serialize;
use thiserror::Error;
use tracing::{debug, info, warn};

use crate::calendar::{
    generate_calendar_bounded, CalendarError, DEFAULT_ANCHOR_WEEKDAY, DEFAULT_MAX_CALENDAR_LEN,
};
use crate::dataset::{AlignedDataset, DatasetBuilder, DatasetError, VariableData, VariableMetadata};
use crate::diagnostics::Diagnostic;
use crate::resample::{resample_counted, MissingMarker, SiteSeries, DEFAULT_MAX_GAP_DAYS};
use crate::schema::{
    FieldValue, NormalizedTable, VariableType, DATEOFF_FIELD, DATEON_FIELD, SITE_ID_FIELD,
};

/// Axis and bookkeeping fields that are never payload variables.
/// Compared case-insensitively, alongside the configured site and date fields.
pub const EXCLUDED_FIELDS: [&str; 3] = [DATEON_FIELD, DATEOFF_FIELD, "modifiedon"];

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AlignmentConfig {
    pub start_month: u32,
    pub start_year: i32,
    pub end_month: u32,
    pub end_year: i32,
    pub anchor_weekday: Weekday,
    pub max_gap_days: i64,
    pub max_calendar_len: usize,
    pub site_field: String,
    pub date_field: String,
}

impl Default for AlignmentConfig {
    fn default() -> Self {
        Self {
            start_month: 7,
            start_year: 1978,
            end_month: 1,
            end_year: 2021,
            anchor_weekday: DEFAULT_ANCHOR_WEEKDAY,
            max_gap_days: DEFAULT_MAX_GAP_DAYS,
            max_calendar_len: DEFAULT_MAX_CALENDAR_LEN,
            site_field: SITE_ID_FIELD.to_string(),
            date_field: DATEOFF_FIELD.to_string(),
        }
    }
}

impl AlignmentConfig {
    pub fn is_excluded(&self, variable: &str) -> bool {
        variable.eq_ignore_ascii_case(&self.site_field)
            || variable.eq_ignore_ascii_case(&self.date_field)
            || EXCLUDED_FIELDS
                .iter()
                .any(|f| variable.eq_ignore_ascii_case(f))
    }
}

/// Reads `NADP_ALIGN_START` / `NADP_ALIGN_END` (`YYYY-MM`),
/// `NADP_ANCHOR_WEEKDAY` and `NADP_MAX_GAP_DAYS`; unparseable values keep
/// the defaults.
pub fn alignment_config_from_env() -> AlignmentConfig {
    let mut config = AlignmentConfig::default();

    if let Some((year, month)) = env::var("NADP_ALIGN_START")
        .ok()
        .and_then(|raw| parse_year_month(&raw))
    {
        config.start_year = year;
        config.start_month = month;
    }

    if let Some((year, month)) = env::var("NADP_ALIGN_END")
        .ok()
        .and_then(|raw| parse_year_month(&raw))
    {
        config.end_year = year;
        config.end_month = month;
    }

    if let Ok(raw) = env::var("NADP_ANCHOR_WEEKDAY") {
        if let Ok(weekday) = raw.trim().parse::<Weekday>() {
            config.anchor_weekday = weekday;
        }
    }

    if let Ok(raw) = env::var("NADP_MAX_GAP_DAYS") {
        if let Ok(days) = raw.trim().parse::<i64>() {
            if days >= 0 {
                config.max_gap_days = days;
            }
        }
    }

    config
}

fn parse_year_month(raw: &str) -> Option<(i32, u32)> {
    let (year, month) = raw.trim().split_once('-')?;
    let year = year.parse::<i32>().ok()?;
    let month = month.parse::<u32>().ok()?;
    (1..=12).contains(&month).then_some((year, month))
}

#[derive(Debug, Error)]
pub enum AlignError {
    #[error("invalid alignment config: {0}")]
    InvalidConfig(String),
    #[error("calendar error: {0}")]
    Calendar(#[from] CalendarError),
    #[error("invalid alignment range: {0}")]
    InvalidRange(String),
    #[error("table has no column named {0}")]
    MissingColumn(String),
    #[error("dataset error: {0}")]
    Dataset(#[from] DatasetError),
}

#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct AssemblyReport {
    pub calendar_len: usize,
    pub site_count: usize,
    pub variable_count: usize,
    pub rows_used: u64,
    pub rows_skipped: u64,
    pub duplicate_keys_collapsed: u64,
    pub matched_cells: u64,
    pub missing_cells: u64,
    pub empty_sites: Vec<String>,
    pub failed_variables: Vec<String>,
    pub diagnostics: Vec<Diagnostic>,
}

/// Row indices and sample dates for each requested site, in row order.
struct SiteRows {
    by_site: Vec<Vec<(usize, NaiveDate)>>,
}

/// Calendar, sites and variables come from the caller and are iterated in
/// the order given; slices for failing variables are left all-missing and
/// the failure lands in the report.
pub fn assemble(
    table: &NormalizedTable,
    calendar: &[NaiveDate],
    sites: &[String],
    variables: &[String],
    types: &BTreeMap<String, VariableType>,
    cfg: &AlignmentConfig,
) -> Result<(AlignedDataset, AssemblyReport), AlignError> {
    let (builder, report) = assemble_into_builder(table, calendar, sites, variables, types, cfg)?;
    Ok((builder.build(), report))
}

/// Derives the calendar from `cfg`, the sites and variables from the table
/// (both sorted), then assembles and attaches `metadata`. Only columns with a
/// numeric or text payload become variables.
pub fn align(
    table: &NormalizedTable,
    cfg: &AlignmentConfig,
    metadata: &[VariableMetadata],
) -> Result<(AlignedDataset, AssemblyReport), AlignError> {
    validate_config(cfg)?;
    let calendar = generate_calendar_bounded(
        cfg.start_month,
        cfg.start_year,
        cfg.end_month,
        cfg.end_year,
        cfg.anchor_weekday,
        cfg.max_calendar_len,
    )?;
    let site_col = required_column(table, &cfg.site_field)?;
    let date_col = required_column(table, &cfg.date_field)?;

    ensure_data_in_window(table, date_col, &calendar, cfg.max_gap_days)?;

    let sites: Vec<String> = table
        .rows
        .iter()
        .filter_map(|row| row[site_col].as_text())
        .filter(|site| !site.is_empty())
        .collect::<BTreeSet<&str>>()
        .into_iter()
        .map(str::to_string)
        .collect();

    // Timestamp columns such as `yrmonth` describe the sample, not a payload.
    let variables: Vec<String> = table
        .columns
        .iter()
        .filter(|c| !cfg.is_excluded(&c.name))
        .filter(|c| {
            let payload = c.kind.variable_type().is_some();
            if !payload {
                debug!(
                    component = "assemble",
                    event = "align.variable.skipped",
                    variable = %c.name,
                    kind = ?c.kind
                );
            }
            payload
        })
        .map(|c| c.name.clone())
        .collect::<BTreeSet<String>>()
        .into_iter()
        .collect();
    let types = table.variable_types();

    let (mut builder, mut report) =
        assemble_into_builder(table, &calendar, &sites, &variables, &types, cfg)?;

    if !metadata.is_empty() {
        for variable in builder.attach_metadata(metadata) {
            report
                .diagnostics
                .push(Diagnostic::UnmatchedMetadata { variable });
        }
    }

    Ok((builder.build(), report))
}

fn assemble_into_builder(
    table: &NormalizedTable,
    calendar: &[NaiveDate],
    sites: &[String],
    variables: &[String],
    types: &BTreeMap<String, VariableType>,
    cfg: &AlignmentConfig,
) -> Result<(DatasetBuilder, AssemblyReport), AlignError> {
    validate_axes(sites, variables)?;
    let site_col = required_column(table, &cfg.site_field)?;
    let date_col = required_column(table, &cfg.date_field)?;

    info!(
        component = "assemble",
        event = "align.start",
        calendar_len = calendar.len(),
        site_count = sites.len(),
        variable_count = variables.len(),
        rows = table.rows.len(),
        max_gap_days = cfg.max_gap_days
    );

    let mut report = AssemblyReport {
        calendar_len: calendar.len(),
        site_count: sites.len(),
        ..AssemblyReport::default()
    };

    let site_rows = index_rows(table, site_col, date_col, sites, &mut report);
    for (site, rows) in sites.iter().zip(&site_rows.by_site) {
        if rows.is_empty() {
            report.empty_sites.push(site.clone());
        }
    }

    let mut builder = DatasetBuilder::new(calendar.to_vec(), sites.to_vec());
    for variable in variables {
        if cfg.is_excluded(variable) {
            debug!(
                component = "assemble",
                event = "align.variable.excluded",
                variable = %variable
            );
            continue;
        }

        let outcome = match (table.column_index(variable), types.get(variable)) {
            (None, _) => Err((
                Diagnostic::UnknownVariable {
                    variable: variable.clone(),
                },
                types.get(variable).copied().unwrap_or(VariableType::Numeric),
            )),
            (Some(_), None) => Err((
                Diagnostic::UnknownVariableType {
                    variable: variable.clone(),
                },
                VariableType::Numeric,
            )),
            (Some(col), Some(VariableType::Numeric)) => resample_variable(
                table,
                col,
                variable,
                calendar,
                &site_rows,
                cfg.max_gap_days,
                VariableType::Numeric,
                FieldValue::as_number,
            )
            .map(|(values, matched)| (VariableData::Numeric(values), matched))
            .map_err(|diag| (diag, VariableType::Numeric)),
            (Some(col), Some(VariableType::Text)) => resample_variable(
                table,
                col,
                variable,
                calendar,
                &site_rows,
                cfg.max_gap_days,
                VariableType::Text,
                |value| value.as_text().map(str::to_string),
            )
            .map(|(values, matched)| (VariableData::Text(values), matched))
            .map_err(|diag| (diag, VariableType::Text)),
        };

        match outcome {
            Ok((data, matched)) => {
                report.matched_cells += matched as u64;
                report.missing_cells += data.missing_cells() as u64;
                builder.insert(variable, data)?;
            }
            Err((diagnostic, fallback_type)) => {
                warn!(
                    component = "assemble",
                    event = "align.variable.failed",
                    variable = %variable,
                    reason = %diagnostic
                );
                report.failed_variables.push(variable.clone());
                report.diagnostics.push(diagnostic);
                builder.insert_missing(variable, fallback_type)?;
                report.missing_cells += (calendar.len() * sites.len()) as u64;
            }
        }
        report.variable_count += 1;
    }

    info!(
        component = "assemble",
        event = "align.finish",
        calendar_len = report.calendar_len,
        site_count = report.site_count,
        variable_count = report.variable_count,
        rows_used = report.rows_used,
        rows_skipped = report.rows_skipped,
        duplicate_keys_collapsed = report.duplicate_keys_collapsed,
        matched_cells = report.matched_cells,
        missing_cells = report.missing_cells,
        empty_sites = report.empty_sites.len(),
        failed_variables = report.failed_variables.len()
    );

    Ok((builder, report))
}

fn index_rows(
    table: &NormalizedTable,
    site_col: usize,
    date_col: usize,
    sites: &[String],
    report: &mut AssemblyReport,
) -> SiteRows {
    let positions: BTreeMap<&str, usize> = sites
        .iter()
        .enumerate()
        .map(|(idx, site)| (site.as_str(), idx))
        .collect();
    let mut by_site = vec![Vec::new(); sites.len()];
    let mut seen_keys: HashSet<(usize, NaiveDate)> = HashSet::new();

    for (row, values) in table.rows.iter().enumerate() {
        let site = values[site_col].as_text().unwrap_or_default();
        if site.is_empty() {
            report.diagnostics.push(Diagnostic::MissingSiteId { row });
            report.rows_skipped += 1;
            continue;
        }
        let Some(&site_idx) = positions.get(site) else {
            report.rows_skipped += 1;
            continue;
        };
        let Some(sample_date) = values[date_col].as_timestamp().map(|ts| ts.date()) else {
            report.diagnostics.push(Diagnostic::MissingSampleDate {
                row,
                field: table.columns[date_col].name.clone(),
            });
            report.rows_skipped += 1;
            continue;
        };

        if !seen_keys.insert((site_idx, sample_date)) {
            report.duplicate_keys_collapsed += 1;
        }
        by_site[site_idx].push((row, sample_date));
        report.rows_used += 1;
    }

    SiteRows { by_site }
}

#[allow(clippy::too_many_arguments)]
fn resample_variable<T: MissingMarker>(
    table: &NormalizedTable,
    col: usize,
    variable: &str,
    calendar: &[NaiveDate],
    site_rows: &SiteRows,
    max_gap_days: i64,
    expected: VariableType,
    extract: impl Fn(&FieldValue) -> Option<T>,
) -> Result<(Array2<T>, usize), Diagnostic> {
    let mut out = Array2::from_elem((calendar.len(), site_rows.by_site.len()), T::missing());
    let mut matched = 0usize;

    for (site_idx, rows) in site_rows.by_site.iter().enumerate() {
        let mut series = SiteSeries::new(variable);
        for (row, sample_date) in rows {
            let value = extract(&table.rows[*row][col]).ok_or_else(|| Diagnostic::TypeMismatch {
                variable: variable.to_string(),
                row: *row,
                expected,
            })?;
            series.insert(*sample_date, value);
        }

        let (values, site_matched) = resample_counted(&series, calendar, max_gap_days);
        matched += site_matched;
        for (anchor_idx, value) in values.into_iter().enumerate() {
            out[[anchor_idx, site_idx]] = value;
        }
    }

    Ok((out, matched))
}

fn validate_config(cfg: &AlignmentConfig) -> Result<(), AlignError> {
    if cfg.max_gap_days < 0 {
        return Err(AlignError::InvalidConfig(
            "max_gap_days must be >= 0".to_string(),
        ));
    }
    if cfg.max_calendar_len == 0 {
        return Err(AlignError::InvalidConfig(
            "max_calendar_len must be > 0".to_string(),
        ));
    }
    if cfg.site_field.is_empty() || cfg.date_field.is_empty() {
        return Err(AlignError::InvalidConfig(
            "site_field and date_field must be set".to_string(),
        ));
    }
    Ok(())
}

fn validate_axes(sites: &[String], variables: &[String]) -> Result<(), AlignError> {
    let mut seen = HashSet::new();
    for site in sites {
        if site.is_empty() {
            return Err(AlignError::InvalidConfig(
                "site identifiers must be non-empty".to_string(),
            ));
        }
        if !seen.insert(site.as_str()) {
            return Err(AlignError::InvalidConfig(format!(
                "site {site} listed more than once"
            )));
        }
    }

    let mut seen = HashSet::new();
    for variable in variables {
        if !seen.insert(variable.as_str()) {
            return Err(AlignError::InvalidConfig(format!(
                "variable {variable} listed more than once"
            )));
        }
    }
    Ok(())
}

fn required_column(table: &NormalizedTable, name: &str) -> Result<usize, AlignError> {
    table
        .column_index(name)
        .ok_or_else(|| AlignError::MissingColumn(name.to_string()))
}

fn ensure_data_in_window(
    table: &NormalizedTable,
    date_col: usize,
    calendar: &[NaiveDate],
    max_gap_days: i64,
) -> Result<(), AlignError> {
    let (Some(first), Some(last)) = (calendar.first(), calendar.last()) else {
        return Err(AlignError::InvalidRange("calendar is empty".to_string()));
    };
    let gap = Days::new(max_gap_days.unsigned_abs());
    let lower = first.checked_sub_days(gap).unwrap_or(*first);
    let upper = last.checked_add_days(gap).unwrap_or(*last);

    let in_window = table
        .rows
        .iter()
        .filter_map(|row| row[date_col].as_timestamp())
        .any(|ts| (lower..=upper).contains(&ts.date()));

    if in_window {
        Ok(())
    } else {
        Err(AlignError::InvalidRange(format!(
            "no observations between {lower} and {upper}"
        )))
    }
}
