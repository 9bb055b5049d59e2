//! Filesystem layout and drift settings, overridable from the environment.

use std::env;
use std::net::SocketAddr;
use std::path::PathBuf;

use thiserror::Error;

use crate::drift::{DriftConfig, DriftThresholds};

const DEFAULT_SERVER_ADDR: &str = "127.0.0.1:8000";

#[derive(Debug, Clone, PartialEq)]
pub struct PipelineConfig {
    pub observations_path: PathBuf,
    pub quarantine_path: PathBuf,
    pub model_path: PathBuf,
    pub drift_report_path: PathBuf,
    pub drift: DriftConfig,
}

impl PipelineConfig {
    /// Standard layout rooted at `root`: `data/` for observations and
    /// reports, `models/` for the artifact.
    pub fn rooted_at(root: impl Into<PathBuf>) -> Self {
        let root = root.into();
        let data_dir = root.join("data");
        Self {
            observations_path: data_dir.join("traffic.csv"),
            quarantine_path: data_dir.join("bad_timestamp_rows.csv"),
            drift_report_path: data_dir.join("drift_metrics.json"),
            model_path: root.join("models").join("traffic_model.json"),
            drift: DriftConfig::default(),
        }
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.drift.window == 0 {
            return Err(ConfigError::Invalid(
                "drift window must be > 0".to_string(),
            ));
        }
        let t = &self.drift.thresholds;
        if !(t.mild_mae.is_finite() && t.severe_mae.is_finite())
            || t.mild_mae < 0.0
            || t.mild_mae > t.severe_mae
        {
            return Err(ConfigError::Invalid(format!(
                "drift thresholds must satisfy 0 <= mild ({}) <= severe ({})",
                t.mild_mae, t.severe_mae
            )));
        }
        Ok(())
    }
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self::rooted_at(".")
    }
}

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("environment variable {name} has invalid value '{value}'")]
    InvalidVar { name: &'static str, value: String },
    #[error("invalid configuration: {0}")]
    Invalid(String),
}

pub fn pipeline_config_from_env() -> Result<PipelineConfig, ConfigError> {
    let mut config = match non_empty_var("FORECAST_DATA_DIR") {
        Some(root) => PipelineConfig::rooted_at(root),
        None => PipelineConfig::default(),
    };

    if let Some(model_path) = non_empty_var("FORECAST_MODEL_PATH") {
        config.model_path = PathBuf::from(model_path);
    }

    let defaults = DriftThresholds::default();
    config.drift.window = parse_var("FORECAST_DRIFT_WINDOW")?.unwrap_or(config.drift.window);
    config.drift.thresholds = DriftThresholds {
        mild_mae: parse_var("FORECAST_DRIFT_MILD_MAE")?.unwrap_or(defaults.mild_mae),
        severe_mae: parse_var("FORECAST_DRIFT_SEVERE_MAE")?.unwrap_or(defaults.severe_mae),
    };

    config.validate()?;
    Ok(config)
}

pub fn server_addr_from_env() -> Result<SocketAddr, ConfigError> {
    let raw = non_empty_var("FORECAST_SERVER_ADDR")
        .unwrap_or_else(|| DEFAULT_SERVER_ADDR.to_string());
    raw.parse().map_err(|_| ConfigError::InvalidVar {
        name: "FORECAST_SERVER_ADDR",
        value: raw,
    })
}

fn non_empty_var(name: &str) -> Option<String> {
    env::var(name)
        .ok()
        .map(|raw| raw.trim().to_string())
        .filter(|raw| !raw.is_empty())
}

fn parse_var<T: std::str::FromStr>(name: &'static str) -> Result<Option<T>, ConfigError> {
    match non_empty_var(name) {
        None => Ok(None),
        Some(raw) => raw
            .parse::<T>()
            .map(Some)
            .map_err(|_| ConfigError::InvalidVar { name, value: raw }),
    }
}
