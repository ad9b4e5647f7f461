//! Nearest-neighbour resampling of one site's series onto the calendar.

use std::collections::BTreeMap;
use std::ops::Bound::{Excluded, Unbounded};

use chrono::NaiveDate;

/// One sample period's worth of slack either side of an anchor.
pub const DEFAULT_MAX_GAP_DAYS: i64 = 1;

/// Per-type "no data" cell value.
pub trait MissingMarker: Clone {
    fn missing() -> Self;
    fn is_missing(&self) -> bool;
}

impl MissingMarker for f64 {
    fn missing() -> Self {
        f64::NAN
    }

    fn is_missing(&self) -> bool {
        self.is_nan()
    }
}

impl MissingMarker for String {
    fn missing() -> Self {
        String::new()
    }

    fn is_missing(&self) -> bool {
        self.is_empty()
    }
}

/// Values of one variable at one site keyed by sample (dateoff) date.
///
/// Repeated keys keep the last value inserted, so building from rows in
/// their original order makes the last occurrence win.
#[derive(Debug, Clone, PartialEq)]
pub struct SiteSeries<T> {
    site: String,
    observations: BTreeMap<NaiveDate, T>,
    duplicates_collapsed: u64,
}

impl<T> SiteSeries<T> {
    pub fn new(site: impl Into<String>) -> Self {
        Self {
            site: site.into(),
            observations: BTreeMap::new(),
            duplicates_collapsed: 0,
        }
    }

    pub fn from_observations(
        site: impl Into<String>,
        observations: impl IntoIterator<Item = (NaiveDate, T)>,
    ) -> Self {
        let mut series = Self::new(site);
        for (date, value) in observations {
            series.insert(date, value);
        }
        series
    }

    /// Returns true when an earlier value for `date` was replaced.
    pub fn insert(&mut self, date: NaiveDate, value: T) -> bool {
        let replaced = self.observations.insert(date, value).is_some();
        if replaced {
            self.duplicates_collapsed += 1;
        }
        replaced
    }

    pub fn site(&self) -> &str {
        &self.site
    }

    pub fn len(&self) -> usize {
        self.observations.len()
    }

    pub fn is_empty(&self) -> bool {
        self.observations.is_empty()
    }

    pub fn duplicates_collapsed(&self) -> u64 {
        self.duplicates_collapsed
    }

    pub fn get(&self, date: NaiveDate) -> Option<&T> {
        self.observations.get(&date)
    }

    pub fn iter(&self) -> impl Iterator<Item = (&NaiveDate, &T)> {
        self.observations.iter()
    }

    /// Closest observation to `anchor` within `max_gap_days`; ties go to the
    /// earlier observation.
    pub fn nearest(&self, anchor: NaiveDate, max_gap_days: i64) -> Option<&T> {
        let before = self.observations.range(..=anchor).next_back();
        let after = self
            .observations
            .range((Excluded(anchor), Unbounded))
            .next();

        let (date, value) = match (before, after) {
            (Some(b), Some(a)) => {
                if days_between(*b.0, anchor) <= days_between(*a.0, anchor) {
                    b
                } else {
                    a
                }
            }
            (Some(b), None) => b,
            (None, Some(a)) => a,
            (None, None) => return None,
        };

        (days_between(*date, anchor) <= max_gap_days).then_some(value)
    }
}

pub fn resample<T: MissingMarker>(
    series: &SiteSeries<T>,
    calendar: &[NaiveDate],
    max_gap_days: i64,
) -> Vec<T> {
    resample_counted(series, calendar, max_gap_days).0
}

/// Like [`resample`], also returning how many anchors found an observation.
pub fn resample_counted<T: MissingMarker>(
    series: &SiteSeries<T>,
    calendar: &[NaiveDate],
    max_gap_days: i64,
) -> (Vec<T>, usize) {
    let mut matched = 0usize;
    let values = calendar
        .iter()
        .map(|anchor| match series.nearest(*anchor, max_gap_days) {
            Some(value) => {
                matched += 1;
                value.clone()
            }
            None => T::missing(),
        })
        .collect();
    (values, matched)
}

fn days_between(a: NaiveDate, b: NaiveDate) -> i64 {
    (a - b).num_days().abs()
}
