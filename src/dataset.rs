//! Dense (calendar date, site) slices, one per variable.

use std::collections::BTreeMap;
use std::io::Read;

use chrono::NaiveDate;
use ndarray::Array2;
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use thiserror::Error;
use tracing::debug;

use crate::resample::MissingMarker;
use crate::schema::VariableType;

#[derive(Debug, Error)]
pub enum DatasetError {
    #[error("variable {0} was already written")]
    DuplicateVariable(String),
    #[error("variable {variable} has shape {actual:?}, expected {expected:?}")]
    ShapeMismatch {
        variable: String,
        expected: (usize, usize),
        actual: (usize, usize),
    },
    #[error("CSV error: {0}")]
    Csv(#[from] csv::Error),
}

/// Slice of one variable, shaped `[calendar_len, site_count]`.
#[derive(Debug, Clone, PartialEq)]
pub enum VariableData {
    Numeric(Array2<f64>),
    Text(Array2<String>),
}

impl VariableData {
    pub fn missing(variable_type: VariableType, shape: (usize, usize)) -> Self {
        match variable_type {
            VariableType::Numeric => Self::Numeric(Array2::from_elem(shape, f64::missing())),
            VariableType::Text => Self::Text(Array2::from_elem(shape, String::missing())),
        }
    }

    pub fn variable_type(&self) -> VariableType {
        match self {
            Self::Numeric(_) => VariableType::Numeric,
            Self::Text(_) => VariableType::Text,
        }
    }

    pub fn shape(&self) -> (usize, usize) {
        match self {
            Self::Numeric(values) => values.dim(),
            Self::Text(values) => values.dim(),
        }
    }

    pub fn missing_cells(&self) -> usize {
        match self {
            Self::Numeric(values) => values.iter().filter(|v| v.is_missing()).count(),
            Self::Text(values) => values.iter().filter(|v| v.is_missing()).count(),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub enum CellValue<'a> {
    Number(f64),
    Text(&'a str),
}

impl CellValue<'_> {
    pub fn is_missing(&self) -> bool {
        match self {
            Self::Number(v) => v.is_nan(),
            Self::Text(s) => s.is_empty(),
        }
    }
}

/// One row of a metadata CSV (`name,units,description`).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct VariableMetadata {
    pub name: String,
    #[serde(default)]
    pub units: String,
    #[serde(default)]
    pub description: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct VariableAttributes {
    pub units: String,
    pub description: String,
}

pub fn read_variable_metadata<R: Read>(reader: R) -> Result<Vec<VariableMetadata>, DatasetError> {
    let mut reader = csv::ReaderBuilder::new()
        .has_headers(true)
        .trim(csv::Trim::All)
        .from_reader(reader);
    let mut out = Vec::new();
    for record in reader.deserialize::<VariableMetadata>() {
        out.push(record?);
    }
    Ok(out)
}

/// Long-form view of a single cell, for writing out.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct LongRecord<'a> {
    pub date: NaiveDate,
    pub site: &'a str,
    pub variable: &'a str,
    pub value: String,
}

#[derive(Debug, Clone, PartialEq)]
pub struct AlignedDataset {
    calendar: Vec<NaiveDate>,
    sites: Vec<String>,
    variables: BTreeMap<String, VariableData>,
    attributes: BTreeMap<String, VariableAttributes>,
}

impl AlignedDataset {
    pub fn calendar(&self) -> &[NaiveDate] {
        &self.calendar
    }

    pub fn sites(&self) -> &[String] {
        &self.sites
    }

    pub fn variable_names(&self) -> impl Iterator<Item = &str> {
        self.variables.keys().map(String::as_str)
    }

    pub fn variable_count(&self) -> usize {
        self.variables.len()
    }

    pub fn variable(&self, name: &str) -> Option<&VariableData> {
        self.variables.get(name)
    }

    pub fn numeric(&self, name: &str) -> Option<&Array2<f64>> {
        match self.variables.get(name)? {
            VariableData::Numeric(values) => Some(values),
            VariableData::Text(_) => None,
        }
    }

    pub fn text(&self, name: &str) -> Option<&Array2<String>> {
        match self.variables.get(name)? {
            VariableData::Text(values) => Some(values),
            VariableData::Numeric(_) => None,
        }
    }

    pub fn attributes(&self, name: &str) -> Option<&VariableAttributes> {
        self.attributes.get(name)
    }

    pub fn date_index(&self, date: NaiveDate) -> Option<usize> {
        self.calendar.binary_search(&date).ok()
    }

    pub fn site_index(&self, site: &str) -> Option<usize> {
        self.sites.iter().position(|s| s == site)
    }

    pub fn cell(&self, variable: &str, date: NaiveDate, site: &str) -> Option<CellValue<'_>> {
        let row = self.date_index(date)?;
        let col = self.site_index(site)?;
        match self.variables.get(variable)? {
            VariableData::Numeric(values) => Some(CellValue::Number(values[[row, col]])),
            VariableData::Text(values) => Some(CellValue::Text(&values[[row, col]])),
        }
    }

    /// Every cell ordered by variable, date, then site.
    pub fn long_records(&self) -> impl Iterator<Item = LongRecord<'_>> {
        self.variables.iter().flat_map(move |(name, data)| {
            self.calendar
                .iter()
                .enumerate()
                .flat_map(move |(row, date)| {
                    self.sites.iter().enumerate().map(move |(col, site)| LongRecord {
                        date: *date,
                        site,
                        variable: name,
                        value: match data {
                            VariableData::Numeric(values) if values[[row, col]].is_nan() => {
                                String::new()
                            }
                            VariableData::Numeric(values) => values[[row, col]].to_string(),
                            VariableData::Text(values) => values[[row, col]].clone(),
                        },
                    })
                })
        })
    }

    /// SHA-256 over axes, variable names, types and cell contents.
    pub fn fingerprint(&self) -> String {
        let mut hasher = Sha256::new();
        hasher.update("calendar:");
        for date in &self.calendar {
            hasher.update(format!("{date},"));
        }
        hasher.update(";sites:");
        for site in &self.sites {
            hasher.update(format!("{site},"));
        }
        for (name, data) in &self.variables {
            hasher.update(format!(";variable:{name}:{:?}:", data.variable_type()));
            match data {
                VariableData::Numeric(values) => {
                    for v in values.iter() {
                        if v.is_nan() {
                            hasher.update("nan,");
                        } else {
                            hasher.update(format!("{:016x},", v.to_bits()));
                        }
                    }
                }
                VariableData::Text(values) => {
                    for v in values.iter() {
                        hasher.update(format!("{}:{v},", v.len()));
                    }
                }
            }
        }
        hex::encode(hasher.finalize())
    }
}

/// Collects variable slices; a variable can be written once.
#[derive(Debug, Clone)]
pub struct DatasetBuilder {
    calendar: Vec<NaiveDate>,
    sites: Vec<String>,
    variables: BTreeMap<String, VariableData>,
    attributes: BTreeMap<String, VariableAttributes>,
}

impl DatasetBuilder {
    pub fn new(calendar: Vec<NaiveDate>, sites: Vec<String>) -> Self {
        Self {
            calendar,
            sites,
            variables: BTreeMap::new(),
            attributes: BTreeMap::new(),
        }
    }

    pub fn shape(&self) -> (usize, usize) {
        (self.calendar.len(), self.sites.len())
    }

    pub fn calendar(&self) -> &[NaiveDate] {
        &self.calendar
    }

    pub fn sites(&self) -> &[String] {
        &self.sites
    }

    pub fn contains(&self, name: &str) -> bool {
        self.variables.contains_key(name)
    }

    pub fn insert(&mut self, name: &str, data: VariableData) -> Result<(), DatasetError> {
        if self.variables.contains_key(name) {
            return Err(DatasetError::DuplicateVariable(name.to_string()));
        }
        if data.shape() != self.shape() {
            return Err(DatasetError::ShapeMismatch {
                variable: name.to_string(),
                expected: self.shape(),
                actual: data.shape(),
            });
        }
        debug!(
            component = "dataset",
            event = "dataset.variable.inserted",
            variable = name,
            variable_type = ?data.variable_type()
        );
        self.variables.insert(name.to_string(), data);
        Ok(())
    }

    pub fn insert_missing(
        &mut self,
        name: &str,
        variable_type: VariableType,
    ) -> Result<(), DatasetError> {
        let shape = self.shape();
        self.insert(name, VariableData::missing(variable_type, shape))
    }

    /// Attaches attributes by case-insensitive name; returns the written
    /// variables that had no metadata entry.
    pub fn attach_metadata(&mut self, metadata: &[VariableMetadata]) -> Vec<String> {
        let by_name: BTreeMap<String, &VariableMetadata> = metadata
            .iter()
            .map(|m| (m.name.to_lowercase(), m))
            .collect();

        let mut unmatched = Vec::new();
        for name in self.variables.keys() {
            match by_name.get(&name.to_lowercase()) {
                Some(meta) => {
                    self.attributes.insert(
                        name.clone(),
                        VariableAttributes {
                            units: meta.units.clone(),
                            description: meta.description.clone(),
                        },
                    );
                }
                None => unmatched.push(name.clone()),
            }
        }
        unmatched
    }

    pub fn build(self) -> AlignedDataset {
        AlignedDataset {
            calendar: self.calendar,
            sites: self.sites,
            variables: self.variables,
            attributes: self.attributes,
        }
    }
}
