//! Week-of-year averages and period-to-period comparisons.
//!
//! Weeks are counted from the day of year: week `i` (1..=51) covers days
//! `((i - 1) * 7, i * 7]`, so the last days of December fall outside every
//! week.

use std::collections::BTreeMap;

use chrono::{Datelike, NaiveDate, NaiveTime};
use serde::Serialize;
use thiserror::Error;
use tracing::info;

use crate::schema::{NormalizedTable, DATEON_FIELD, SITE_ID_FIELD};

pub const WEEKS_PER_YEAR: u32 = 51;

#[derive(Debug, Error, PartialEq, Eq)]
pub enum ClimatologyError {
    #[error("table has no column named {0}")]
    MissingColumn(String),
    #[error("invalid range: {0}")]
    InvalidRange(String),
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct SiteValidCount {
    pub site: String,
    pub count: usize,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct WeeklyClimatology {
    pub column: String,
    pub start_year: i32,
    pub end_year_exclusive: i32,
    /// Indexed by `week - 1`.
    pub mean: Vec<f64>,
    pub std: Vec<f64>,
    pub samples: Vec<usize>,
}

impl WeeklyClimatology {
    pub fn week(&self, week: u32) -> Option<(f64, f64)> {
        let idx = week.checked_sub(1)? as usize;
        Some((*self.mean.get(idx)?, *self.std.get(idx)?))
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct NormalizedDifference {
    pub weeks: Vec<u32>,
    pub difference: Vec<f64>,
    pub normalized: Vec<f64>,
    pub percent: Vec<f64>,
    pub median_normalized: f64,
    pub median_percent: f64,
}

/// Non-NaN values of `column` per site among rows with `dateon` strictly
/// after midnight of `since`. Every site in the table is listed, with zero
/// when it has no valid value. Sorted by count descending, then site.
pub fn count_valids_since(
    table: &NormalizedTable,
    column: &str,
    since: NaiveDate,
) -> Result<Vec<SiteValidCount>, ClimatologyError> {
    let site_col = column_index(table, SITE_ID_FIELD)?;
    let date_col = column_index(table, DATEON_FIELD)?;
    let value_col = column_index(table, column)?;

    let cutoff = since.and_time(NaiveTime::MIN);
    let mut counts: BTreeMap<&str, usize> = BTreeMap::new();
    for row in &table.rows {
        let Some(site) = row[site_col].as_text().filter(|s| !s.is_empty()) else {
            continue;
        };
        let count = counts.entry(site).or_default();
        let Some(dateon) = row[date_col].as_timestamp() else {
            continue;
        };
        if dateon > cutoff && row[value_col].as_number().is_some_and(|v| !v.is_nan()) {
            *count += 1;
        }
    }

    let mut out: Vec<SiteValidCount> = counts
        .into_iter()
        .map(|(site, count)| SiteValidCount {
            site: site.to_string(),
            count,
        })
        .collect();
    out.sort_by(|a, b| b.count.cmp(&a.count).then_with(|| a.site.cmp(&b.site)));
    Ok(out)
}

/// Mean and population standard deviation of `column` per week of year over
/// rows with `dateon` in `[start_year-01-01, end_year_exclusive-01-01)`.
pub fn weekly_climatology(
    table: &NormalizedTable,
    column: &str,
    start_year: i32,
    end_year_exclusive: i32,
) -> Result<WeeklyClimatology, ClimatologyError> {
    if end_year_exclusive <= start_year {
        return Err(ClimatologyError::InvalidRange(format!(
            "end year {end_year_exclusive} must be after start year {start_year}"
        )));
    }
    let date_col = column_index(table, DATEON_FIELD)?;
    let value_col = column_index(table, column)?;

    let mut buckets: Vec<Vec<f64>> = vec![Vec::new(); WEEKS_PER_YEAR as usize];
    for row in &table.rows {
        let Some(dateon) = row[date_col].as_timestamp() else {
            continue;
        };
        if !(start_year..end_year_exclusive).contains(&dateon.year()) {
            continue;
        }
        let Some(value) = row[value_col].as_number() else {
            continue;
        };
        if let Some(week) = week_of_year(dateon.date()) {
            buckets[week as usize - 1].push(value);
        }
    }

    let mean: Vec<f64> = buckets.iter().map(|b| nanmean(b)).collect();
    let std: Vec<f64> = buckets.iter().map(|b| nanstd(b)).collect();
    let samples: Vec<usize> = buckets
        .iter()
        .map(|b| b.iter().filter(|v| !v.is_nan()).count())
        .collect();

    info!(
        component = "climatology",
        event = "climatology.weekly.finish",
        column = %column,
        start_year,
        end_year_exclusive,
        weeks_with_data = samples.iter().filter(|n| **n > 0).count()
    );

    Ok(WeeklyClimatology {
        column: column.to_string(),
        start_year,
        end_year_exclusive,
        mean,
        std,
        samples,
    })
}

/// Week-by-week change from `baseline` to `comparison` over
/// `[week_start, week_end_exclusive)`. The normalizing deviation is the mean
/// baseline deviation across all weeks.
pub fn normalized_difference(
    baseline: &WeeklyClimatology,
    comparison: &WeeklyClimatology,
    week_start: u32,
    week_end_exclusive: u32,
) -> Result<NormalizedDifference, ClimatologyError> {
    if week_start < 1 || week_end_exclusive > WEEKS_PER_YEAR + 1 || week_start >= week_end_exclusive
    {
        return Err(ClimatologyError::InvalidRange(format!(
            "weeks [{week_start}, {week_end_exclusive}) outside 1..={WEEKS_PER_YEAR}"
        )));
    }

    let baseline_std = nanmean(&baseline.std);
    let mut out = NormalizedDifference {
        weeks: Vec::new(),
        difference: Vec::new(),
        normalized: Vec::new(),
        percent: Vec::new(),
        median_normalized: f64::NAN,
        median_percent: f64::NAN,
    };

    for week in week_start..week_end_exclusive {
        let (Some((base, _)), Some((comp, _))) = (baseline.week(week), comparison.week(week))
        else {
            continue;
        };
        let diff = comp - base;
        out.weeks.push(week);
        out.difference.push(diff);
        out.normalized.push(diff / baseline_std);
        out.percent.push(diff / base * 100.0);
    }

    out.median_normalized = nanmedian(&out.normalized);
    out.median_percent = nanmedian(&out.percent);
    Ok(out)
}

pub fn week_of_year(date: NaiveDate) -> Option<u32> {
    let week = (date.ordinal() + 6) / 7;
    (week <= WEEKS_PER_YEAR).then_some(week)
}

fn column_index(table: &NormalizedTable, name: &str) -> Result<usize, ClimatologyError> {
    table
        .column_index(name)
        .ok_or_else(|| ClimatologyError::MissingColumn(name.to_string()))
}

fn finite(values: &[f64]) -> impl Iterator<Item = f64> + '_ {
    values.iter().copied().filter(|v| !v.is_nan())
}

fn nanmean(values: &[f64]) -> f64 {
    let (sum, n) = finite(values).fold((0.0, 0usize), |(s, n), v| (s + v, n + 1));
    if n == 0 {
        f64::NAN
    } else {
        sum / n as f64
    }
}

fn nanstd(values: &[f64]) -> f64 {
    let mean = nanmean(values);
    if mean.is_nan() {
        return f64::NAN;
    }
    let (sq, n) = finite(values).fold((0.0, 0usize), |(s, n), v| (s + (v - mean).powi(2), n + 1));
    (sq / n as f64).sqrt()
}

fn nanmedian(values: &[f64]) -> f64 {
    let mut sorted: Vec<f64> = finite(values).collect();
    if sorted.is_empty() {
        return f64::NAN;
    }
    sorted.sort_by(f64::total_cmp);
    let mid = sorted.len() / 2;
    if sorted.len() % 2 == 0 {
        (sorted[mid - 1] + sorted[mid]) / 2.0
    } else {
        sorted[mid]
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::schema::{normalize, NormalizeConfig, RawTable};

    fn table(rows: &[(&str, &str, &str)]) -> NormalizedTable {
        let raw = RawTable {
            headers: vec!["siteID".to_string(), "dateon".to_string(), "NO3".to_string()],
            rows: rows
                .iter()
                .map(|(s, d, v)| vec![s.to_string(), d.to_string(), v.to_string()])
                .collect(),
        };
        normalize(&raw, &NormalizeConfig::default()).0
    }

    fn d(y: i32, m: u32, day: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(y, m, day).unwrap()
    }

    #[test]
    fn week_boundaries_follow_day_of_year() {
        assert_eq!(week_of_year(d(2019, 1, 1)), Some(1));
        assert_eq!(week_of_year(d(2019, 1, 7)), Some(1));
        assert_eq!(week_of_year(d(2019, 1, 8)), Some(2));
        assert_eq!(week_of_year(d(2019, 12, 23)), Some(51));
        assert_eq!(week_of_year(d(2019, 12, 24)), None);
    }

    #[test]
    fn valid_counts_sort_by_count_then_site() {
        let t = table(&[
            ("WY99", "2020-01-07 09:00:00", "1.0"),
            ("WY99", "2020-01-14 09:00:00", "-9"),
            ("IL11", "2020-01-07 09:00:00", "1.0"),
            ("NY10", "2020-01-07 09:00:00", "2.0"),
            ("NY10", "2020-01-14 09:00:00", "2.5"),
            ("NY10", "2019-12-31 09:00:00", "2.5"),
            ("CA45", "2020-01-01 09:00:00", "2.5"),
            ("CA45", "2019-12-31 23:00:00", "2.5"),
            ("", "2020-01-07 09:00:00", "2.5"),
        ]);
        let counts = count_valids_since(&t, "NO3", d(2020, 1, 1)).unwrap();
        let summary: Vec<(&str, usize)> = counts
            .iter()
            .map(|c| (c.site.as_str(), c.count))
            .collect();
        assert_eq!(
            summary,
            vec![("NY10", 2), ("CA45", 1), ("IL11", 1), ("WY99", 1)]
        );
    }

    #[test]
    fn sites_without_valid_values_are_listed_with_zero() {
        let t = table(&[
            ("IL11", "2020-01-07 09:00:00", "1.0"),
            ("WY99", "2020-01-07 09:00:00", "-9"),
            ("NY10", "2019-06-04 09:00:00", "3.0"),
        ]);
        let counts = count_valids_since(&t, "NO3", d(2020, 1, 1)).unwrap();
        assert_eq!(
            counts,
            vec![
                SiteValidCount {
                    site: "IL11".to_string(),
                    count: 1
                },
                SiteValidCount {
                    site: "NY10".to_string(),
                    count: 0
                },
                SiteValidCount {
                    site: "WY99".to_string(),
                    count: 0
                },
            ]
        );
    }

    #[test]
    fn weekly_climatology_ignores_nan_and_other_years() {
        let t = table(&[
            ("IL11", "2016-01-02 09:00:00", "1.0"),
            ("IL11", "2017-01-03 09:00:00", "3.0"),
            ("IL11", "2018-01-04 09:00:00", "-9"),
            ("IL11", "2020-01-02 09:00:00", "100.0"),
            ("IL11", "2016-01-09 09:00:00", "5.0"),
        ]);
        let clim = weekly_climatology(&t, "NO3", 2016, 2020).unwrap();

        assert_eq!(clim.mean.len(), 51);
        assert_eq!(clim.week(1), Some((2.0, 1.0)));
        assert_eq!(clim.samples[0], 2);
        assert_eq!(clim.week(2), Some((5.0, 0.0)));
        assert!(clim.mean[2].is_nan());
        assert!(clim.std[2].is_nan());
    }

    #[test]
    fn normalized_difference_uses_mean_baseline_std() {
        let t = table(&[
            ("IL11", "2016-01-02 09:00:00", "1.0"),
            ("IL11", "2017-01-02 09:00:00", "3.0"),
            ("IL11", "2016-01-09 09:00:00", "4.0"),
            ("IL11", "2017-01-09 09:00:00", "4.0"),
            ("IL11", "2020-01-02 09:00:00", "3.0"),
            ("IL11", "2020-01-09 09:00:00", "2.0"),
        ]);
        let base = weekly_climatology(&t, "NO3", 2016, 2020).unwrap();
        let comp = weekly_climatology(&t, "NO3", 2020, 2021).unwrap();
        let out = normalized_difference(&base, &comp, 1, 4).unwrap();

        assert_eq!(out.weeks, vec![1, 2, 3]);
        assert_eq!(out.difference[0], 1.0);
        assert_eq!(out.difference[1], -2.0);
        assert!(out.difference[2].is_nan());
        // baseline std: week 1 = 1.0, week 2 = 0.0 -> mean 0.5
        assert_eq!(out.normalized[0], 2.0);
        assert_eq!(out.normalized[1], -4.0);
        assert_eq!(out.percent[0], 50.0);
        assert_eq!(out.percent[1], -50.0);
        assert_eq!(out.median_normalized, -1.0);
        assert_eq!(out.median_percent, 0.0);
    }

    #[test]
    fn bad_ranges_are_rejected() {
        let t = table(&[]);
        assert!(matches!(
            weekly_climatology(&t, "NO3", 2020, 2020),
            Err(ClimatologyError::InvalidRange(_))
        ));
        assert_eq!(
            weekly_climatology(&t, "SO4", 2016, 2020).unwrap_err(),
            ClimatologyError::MissingColumn("SO4".to_string())
        );

        let clim = weekly_climatology(&t, "NO3", 2016, 2020).unwrap();
        assert!(normalized_difference(&clim, &clim, 0, 3).is_err());
        assert!(normalized_difference(&clim, &clim, 5, 5).is_err());
        assert!(normalized_difference(&clim, &clim, 1, 53).is_err());
    }
}
