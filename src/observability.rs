//! Logging setup and run-level events for the alignment binary.

use std::env;
use std::io::IsTerminal;
use std::path::Path;

use thiserror::Error;
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LogFormat {
    Json,
    Pretty,
    /// One line per event; suits batch runs that log next to a report.
    Compact,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LoggingConfig {
    pub level: String,
    pub format: LogFormat,
    pub include_target: bool,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
            format: LogFormat::Compact,
            include_target: false,
        }
    }
}

#[derive(Debug, Error)]
pub enum LoggingInitError {
    #[error("logging already initialized: {0}")]
    AlreadyInitialized(#[from] tracing::subscriber::SetGlobalDefaultError),
}

/// `NADP_LOG_LEVEL` takes any `EnvFilter` directive, e.g.
/// `info,nadp_align::assemble=debug`.
pub fn logging_config_from_env() -> LoggingConfig {
    let mut config = LoggingConfig::default();

    if let Some(level) = env::var("NADP_LOG_LEVEL")
        .ok()
        .map(|raw| raw.trim().to_string())
        .filter(|raw| !raw.is_empty())
    {
        config.level = level;
    }
    if let Some(format) = env::var("NADP_LOG_FORMAT")
        .ok()
        .and_then(|raw| parse_log_format(&raw))
    {
        config.format = format;
    }
    if let Some(include_target) = env::var("NADP_LOG_TARGET")
        .ok()
        .and_then(|raw| parse_bool(&raw))
    {
        config.include_target = include_target;
    }

    config
}

/// Installs the global subscriber. Events go to stderr; stdout is reserved
/// for the aligned CSV.
pub fn init_logging(config: &LoggingConfig) -> Result<(), LoggingInitError> {
    let env_filter =
        EnvFilter::try_new(&config.level).unwrap_or_else(|_| EnvFilter::new("info"));
    let builder = tracing_subscriber::fmt()
        .with_env_filter(env_filter)
        .with_target(config.include_target)
        .with_writer(std::io::stderr)
        .with_ansi(config.format != LogFormat::Json && std::io::stderr().is_terminal());

    match config.format {
        LogFormat::Json => tracing::subscriber::set_global_default(builder.json().finish())?,
        LogFormat::Pretty => tracing::subscriber::set_global_default(builder.pretty().finish())?,
        LogFormat::Compact => {
            tracing::subscriber::set_global_default(builder.compact().finish())?
        }
    }

    Ok(())
}

pub fn log_run_start(config: &LoggingConfig) {
    info!(
        component = "nadp_align",
        event = "app.start",
        version = env!("CARGO_PKG_VERSION"),
        log_level = %config.level,
        log_format = ?config.format
    );
}

pub fn log_inputs_selected(data: &Path, sites: Option<&Path>, metadata: Option<&Path>) {
    info!(
        component = "nadp_align",
        event = "inputs.selected",
        data = %data.display(),
        sites = %display_or(sites, "none"),
        metadata = %display_or(metadata, "none")
    );
}

/// `destination` of `None` means stdout.
pub fn log_output_written(destination: Option<&Path>, records: u64) {
    info!(
        component = "nadp_align",
        event = "output.written",
        destination = %display_or(destination, "stdout"),
        records
    );
}

pub fn log_run_finish(fingerprint: &str, failed_variables: usize, diagnostics: usize) {
    if failed_variables > 0 {
        warn!(
            component = "nadp_align",
            event = "app.finish",
            fingerprint,
            failed_variables,
            diagnostics
        );
    } else {
        info!(
            component = "nadp_align",
            event = "app.finish",
            fingerprint,
            failed_variables,
            diagnostics
        );
    }
}

fn display_or(path: Option<&Path>, fallback: &str) -> String {
    path.map_or_else(|| fallback.to_string(), |p| p.display().to_string())
}

pub(crate) fn parse_bool(raw: &str) -> Option<bool> {
    match raw.trim().to_ascii_lowercase().as_str() {
        "1" | "true" | "yes" | "on" => Some(true),
        "0" | "false" | "no" | "off" => Some(false),
        _ => None,
    }
}

fn parse_log_format(raw: &str) -> Option<LogFormat> {
    match raw.trim().to_ascii_lowercase().as_str() {
        "json" => Some(LogFormat::Json),
        "pretty" => Some(LogFormat::Pretty),
        "compact" | "text" => Some(LogFormat::Compact),
        _ => None,
    }
}

#[cfg(test)]
pub(crate) mod test_env {
    use std::env;
    use std::sync::{Mutex, OnceLock};

    fn env_lock() -> &'static Mutex<()> {
        static ENV_LOCK: OnceLock<Mutex<()>> = OnceLock::new();
        ENV_LOCK.get_or_init(|| Mutex::new(()))
    }

    pub(crate) fn with_env_vars<R>(vars: &[(&str, Option<&str>)], f: impl FnOnce() -> R) -> R {
        let _guard = env_lock()
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner());
        let previous: Vec<(String, Option<String>)> = vars
            .iter()
            .map(|(key, _)| ((*key).to_string(), env::var(key).ok()))
            .collect();

        for (key, value) in vars {
            match value {
                Some(v) => env::set_var(key, v),
                None => env::remove_var(key),
            }
        }

        let output = f();

        for (key, value) in previous {
            match value {
                Some(v) => env::set_var(key, v),
                None => env::remove_var(key),
            }
        }

        output
    }
}

#[cfg(test)]
mod tests {
    use super::test_env::with_env_vars;
    use super::*;

    #[test]
    fn defaults_when_env_missing() {
        let cfg = with_env_vars(
            &[
                ("NADP_LOG_LEVEL", None),
                ("NADP_LOG_FORMAT", None),
                ("NADP_LOG_TARGET", None),
            ],
            logging_config_from_env,
        );

        assert_eq!(cfg, LoggingConfig::default());
    }

    #[test]
    fn parses_json_and_level_and_target_from_env() {
        let cfg = with_env_vars(
            &[
                ("NADP_LOG_LEVEL", Some("debug")),
                ("NADP_LOG_FORMAT", Some("json")),
                ("NADP_LOG_TARGET", Some("false")),
            ],
            logging_config_from_env,
        );

        assert_eq!(cfg.level, "debug");
        assert_eq!(cfg.format, LogFormat::Json);
        assert!(!cfg.include_target);
    }

    #[test]
    fn compact_format_and_filter_directives_are_accepted() {
        let cfg = with_env_vars(
            &[
                ("NADP_LOG_LEVEL", Some(" info,nadp_align::assemble=debug ")),
                ("NADP_LOG_FORMAT", Some("Text")),
                ("NADP_LOG_TARGET", Some("yes")),
            ],
            logging_config_from_env,
        );

        assert_eq!(cfg.level, "info,nadp_align::assemble=debug");
        assert_eq!(cfg.format, LogFormat::Compact);
        assert!(cfg.include_target);
    }

    #[test]
    fn missing_paths_fall_back_to_a_label() {
        assert_eq!(display_or(None, "stdout"), "stdout");
        assert_eq!(
            display_or(Some(Path::new("data/NTNsites.csv")), "none"),
            "data/NTNsites.csv"
        );
    }

    #[test]
    fn invalid_format_or_target_falls_back_to_defaults() {
        let cfg = with_env_vars(
            &[
                ("NADP_LOG_LEVEL", Some("  ")),
                ("NADP_LOG_FORMAT", Some("yaml")),
                ("NADP_LOG_TARGET", Some("maybe")),
            ],
            logging_config_from_env,
        );

        assert_eq!(cfg, LoggingConfig::default());
    }
}
