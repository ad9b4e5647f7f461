//! Non-fatal problems collected while normalizing and aligning.

use chrono::NaiveDateTime;
use serde::Serialize;
use thiserror::Error;

use crate::schema::VariableType;

#[derive(Debug, Clone, PartialEq, Error, Serialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum Diagnostic {
    #[error("row {row}: column {column} value '{value}' does not match format {format}")]
    ParseError {
        row: usize,
        column: String,
        value: String,
        format: String,
    },
    #[error("row {row}: dateoff {dateoff} precedes dateon {dateon}")]
    DateOrder {
        row: usize,
        dateon: NaiveDateTime,
        dateoff: NaiveDateTime,
    },
    #[error("row {row}: empty site identifier")]
    MissingSiteId { row: usize },
    #[error("row {row}: missing {field} timestamp")]
    MissingSampleDate { row: usize, field: String },
    #[error("variable {variable} has no numeric or text type")]
    UnknownVariableType { variable: String },
    #[error("variable {variable} is not a column of the table")]
    UnknownVariable { variable: String },
    #[error("variable {variable}: row {row} does not hold a {expected:?} value")]
    TypeMismatch {
        variable: String,
        row: usize,
        expected: VariableType,
    },
    #[error("variable {variable} has no metadata entry")]
    UnmatchedMetadata { variable: String },
}

impl Diagnostic {
    /// Variable the diagnostic is scoped to, if any.
    pub fn variable(&self) -> Option<&str> {
        match self {
            Self::UnknownVariableType { variable }
            | Self::UnknownVariable { variable }
            | Self::TypeMismatch { variable, .. }
            | Self::UnmatchedMetadata { variable } => Some(variable),
            _ => None,
        }
    }
}
