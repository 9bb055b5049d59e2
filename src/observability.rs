//! Shared logging configuration and initialization.

use std::env;
use std::net::SocketAddr;

use thiserror::Error;
use tracing::info;
use tracing_subscriber::EnvFilter;

use crate::config::PipelineConfig;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LogFormat {
    Json,
    Pretty,
}

/// Logging settings for one binary. `component` tags lifecycle events and
/// selects the per-binary level override.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LoggingConfig {
    pub component: &'static str,
    pub level: String,
    pub format: LogFormat,
    pub include_target: bool,
}

impl LoggingConfig {
    pub fn for_component(component: &'static str) -> Self {
        Self {
            component,
            level: "info".to_string(),
            format: LogFormat::Pretty,
            include_target: true,
        }
    }

    /// `FORECAST_<COMPONENT>_LOG_LEVEL`, e.g. `FORECAST_CHECK_DRIFT_LOG_LEVEL`.
    pub fn level_override_var(&self) -> String {
        format!(
            "FORECAST_{}_LOG_LEVEL",
            self.component.to_ascii_uppercase().replace('-', "_")
        )
    }
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self::for_component("traffic_forecast")
    }
}

#[derive(Debug, Error)]
pub enum LoggingInitError {
    #[error("logging already initialized: {0}")]
    AlreadyInitialized(#[from] tracing::subscriber::SetGlobalDefaultError),
}

/// Shared `FORECAST_LOG_*` settings, with the component's own level taking
/// precedence over `FORECAST_LOG_LEVEL`.
pub fn logging_config_from_env(component: &'static str) -> LoggingConfig {
    let mut config = LoggingConfig::for_component(component);

    for var in ["FORECAST_LOG_LEVEL".to_string(), config.level_override_var()] {
        if let Some(level) = env::var(&var).ok().map(|raw| raw.trim().to_string()) {
            if !level.is_empty() {
                config.level = level;
            }
        }
    }

    if let Ok(format) = env::var("FORECAST_LOG_FORMAT") {
        if let Some(parsed) = parse_log_format(&format) {
            config.format = parsed;
        }
    }

    if let Ok(include_target) = env::var("FORECAST_LOG_TARGET") {
        if let Some(parsed) = parse_bool(&include_target) {
            config.include_target = parsed;
        }
    }

    config
}

pub fn init_logging(config: &LoggingConfig) -> Result<(), LoggingInitError> {
    let env_filter = EnvFilter::try_new(&config.level).unwrap_or_else(|_| EnvFilter::new("info"));
    let builder = tracing_subscriber::fmt()
        .with_env_filter(env_filter)
        .with_target(config.include_target)
        .with_ansi(matches!(config.format, LogFormat::Pretty));

    match config.format {
        LogFormat::Json => tracing::subscriber::set_global_default(builder.json().finish())?,
        LogFormat::Pretty => tracing::subscriber::set_global_default(builder.pretty().finish())?,
    }

    Ok(())
}

pub fn log_app_start(config: &LoggingConfig) {
    info!(
        component = config.component,
        event = "app.start",
        log_level = %config.level,
        log_format = ?config.format,
        include_target = config.include_target
    );
}

pub fn log_app_bind(bound_addr: SocketAddr) {
    info!(
        component = "forecast_server",
        event = "app.bind",
        bind_addr = %bound_addr,
        routes = "/health,/predict,/report,/drift"
    );
}

pub fn log_paths_selected(component: &'static str, config: &PipelineConfig) {
    info!(
        component,
        event = "paths.selected",
        observations_path = %config.observations_path.display(),
        quarantine_path = %config.quarantine_path.display(),
        model_path = %config.model_path.display(),
        drift_report_path = %config.drift_report_path.display(),
        drift_window = config.drift.window
    );
}

fn parse_log_format(raw: &str) -> Option<LogFormat> {
    match raw.trim().to_ascii_lowercase().as_str() {
        "json" => Some(LogFormat::Json),
        "pretty" => Some(LogFormat::Pretty),
        _ => None,
    }
}

fn parse_bool(raw: &str) -> Option<bool> {
    match raw.trim().to_ascii_lowercase().as_str() {
        "1" | "true" | "yes" | "on" => Some(true),
        "0" | "false" | "no" | "off" => Some(false),
        _ => None,
    }
}
