//! NADP precipitation-chemistry alignment crate.
//!
//! Current implemented scope:
//! - schema normalization of heterogeneous NADP CSV exports
//! - weekly anchor calendar generation
//! - nearest-neighbour resampling of per-site series onto the calendar
//! - multi-variable assembly into dense (date, site) slices
//! - week-of-year climatology and period comparisons

mod assemble;
mod calendar;
mod climatology;
mod dataset;
mod diagnostics;
mod observability;
mod resample;
mod schema;

pub use assemble::{
    align, alignment_config_from_env, assemble, AlignError, AlignmentConfig, AssemblyReport,
    EXCLUDED_FIELDS,
};
pub use calendar::{
    anchors_in_month, generate_calendar, generate_calendar_bounded, CalendarError,
    DEFAULT_ANCHOR_WEEKDAY, DEFAULT_MAX_CALENDAR_LEN,
};
pub use climatology::{
    count_valids_since, normalized_difference, week_of_year, weekly_climatology,
    ClimatologyError, NormalizedDifference, SiteValidCount, WeeklyClimatology, WEEKS_PER_YEAR,
};
pub use dataset::{
    read_variable_metadata, AlignedDataset, CellValue, DatasetBuilder, DatasetError, LongRecord,
    VariableAttributes, VariableData, VariableMetadata,
};
pub use diagnostics::Diagnostic;
pub use observability::{
    init_logging, log_inputs_selected, log_output_written, log_run_finish, log_run_start,
    logging_config_from_env, LogFormat, LoggingConfig, LoggingInitError,
};
pub use resample::{resample, resample_counted, MissingMarker, SiteSeries, DEFAULT_MAX_GAP_DAYS};
pub use schema::{
    date_pattern_for, merge_site_info, normalize, parse_flag, read_raw_table,
    read_raw_table_from_path, ColumnKind, DatePattern, FieldValue, NormalizeConfig,
    NormalizeReport, NormalizedColumn, NormalizedTable, RawTable, SchemaError, TimestampFormat,
    VariableType, DATEOFF_FIELD, DATEON_FIELD, DATE_PATTERNS, DECLARED_STRING_FIELDS,
    NADP_ERROR_SENTINEL, SITE_ID_FIELD,
};
