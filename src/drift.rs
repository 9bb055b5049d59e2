//! Prediction-error and feature-shift drift evaluation.

use std::collections::BTreeMap;
use std::fs;
use std::path::{Path, PathBuf};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::{info, warn};

use crate::features::{FeatureError, FeatureVector, FEATURE_COLUMNS};
use crate::history::LabeledFeatureRow;
use crate::model::{ModelError, Regressor};
use crate::schema::enforce_feature_vectors;
use crate::store::write_atomic;

pub const DEFAULT_DRIFT_WINDOW: usize = 20;
pub const DEFAULT_MILD_DRIFT_MAE: f64 = 50.0;
pub const DEFAULT_SEVERE_DRIFT_MAE: f64 = 120.0;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum DriftDecision {
    NoDrift,
    MildDrift,
    SevereDrift,
}

impl DriftDecision {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::NoDrift => "NO_DRIFT",
            Self::MildDrift => "MILD_DRIFT",
            Self::SevereDrift => "SEVERE_DRIFT",
        }
    }
}

/// MAE decision boundaries; each lower bound is inclusive.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct DriftThresholds {
    pub mild_mae: f64,
    pub severe_mae: f64,
}

impl Default for DriftThresholds {
    fn default() -> Self {
        Self {
            mild_mae: DEFAULT_MILD_DRIFT_MAE,
            severe_mae: DEFAULT_SEVERE_DRIFT_MAE,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct DriftConfig {
    pub window: usize,
    pub thresholds: DriftThresholds,
}

impl Default for DriftConfig {
    fn default() -> Self {
        Self {
            window: DEFAULT_DRIFT_WINDOW,
            thresholds: DriftThresholds::default(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DriftReport {
    pub generated_at: DateTime<Utc>,
    pub mae: f64,
    pub drift_scores: BTreeMap<String, f64>,
    pub decision: DriftDecision,
}

#[derive(Debug, Error)]
pub enum DriftError {
    #[error("drift window is empty")]
    EmptyWindow,
    #[error("model returned {predictions} predictions for {rows} rows")]
    PredictionCountMismatch { rows: usize, predictions: usize },
    #[error("no drift report at {path}")]
    ReportNotFound { path: PathBuf },
    #[error(transparent)]
    Feature(#[from] FeatureError),
    #[error(transparent)]
    Model(#[from] ModelError),
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
    #[error("report JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

/// Destination for the latest drift report; each publish replaces the last.
pub trait ReportSink: Send + Sync + 'static {
    fn publish(&self, report: &DriftReport) -> Result<(), DriftError>;

    fn latest(&self) -> Result<DriftReport, DriftError>;
}

pub struct FsReportSink {
    path: PathBuf,
}

impl FsReportSink {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

impl ReportSink for FsReportSink {
    fn publish(&self, report: &DriftReport) -> Result<(), DriftError> {
        if let Some(parent) = self.path.parent() {
            fs::create_dir_all(parent)?;
        }
        let bytes = serde_json::to_vec_pretty(report)?;
        write_atomic(&self.path, &bytes)?;
        Ok(())
    }

    fn latest(&self) -> Result<DriftReport, DriftError> {
        let bytes = match fs::read(&self.path) {
            Ok(bytes) => bytes,
            Err(err) if err.kind() == std::io::ErrorKind::NotFound => {
                return Err(DriftError::ReportNotFound {
                    path: self.path.clone(),
                })
            }
            Err(err) => return Err(err.into()),
        };
        Ok(serde_json::from_slice(&bytes)?)
    }
}

pub fn classify_drift(mae: f64, thresholds: &DriftThresholds) -> DriftDecision {
    if mae < thresholds.mild_mae {
        DriftDecision::NoDrift
    } else if mae < thresholds.severe_mae {
        DriftDecision::MildDrift
    } else {
        DriftDecision::SevereDrift
    }
}

/// Per column: |window mean - value in the window's first row|.
///
/// A cheap shift proxy, not a statistical test.
pub fn feature_drift_scores(window: &[FeatureVector]) -> Result<BTreeMap<String, f64>, DriftError> {
    let matrix = enforce_feature_vectors(window)?;
    let first = *matrix.rows().first().ok_or(DriftError::EmptyWindow)?;

    let mut scores = BTreeMap::new();
    for (idx, name) in FEATURE_COLUMNS.iter().enumerate() {
        let mean = matrix.column(idx).sum::<f64>() / matrix.len() as f64;
        scores.insert((*name).to_string(), (mean - first[idx]).abs());
    }
    Ok(scores)
}

/// Scores `model` on `window` without publishing.
pub fn compute_drift_report(
    model: &dyn Regressor,
    window: &[LabeledFeatureRow],
    thresholds: &DriftThresholds,
    generated_at: DateTime<Utc>,
) -> Result<DriftReport, DriftError> {
    if window.is_empty() {
        return Err(DriftError::EmptyWindow);
    }

    let vectors: Vec<FeatureVector> = window.iter().map(|row| row.features).collect();
    let x = enforce_feature_vectors(&vectors)?;
    let predictions = model.predict(&x)?;
    if predictions.len() != window.len() {
        return Err(DriftError::PredictionCountMismatch {
            rows: window.len(),
            predictions: predictions.len(),
        });
    }

    let mae = predictions
        .iter()
        .zip(window)
        .map(|(pred, row)| (pred - row.page_views as f64).abs())
        .sum::<f64>()
        / window.len() as f64;

    Ok(DriftReport {
        generated_at,
        mae,
        drift_scores: feature_drift_scores(&vectors)?,
        decision: classify_drift(mae, thresholds),
    })
}

/// Scores `model` on `window` and replaces the sink's latest report.
pub fn evaluate_drift(
    model: &dyn Regressor,
    window: &[LabeledFeatureRow],
    thresholds: &DriftThresholds,
    sink: &dyn ReportSink,
) -> Result<DriftReport, DriftError> {
    let report = compute_drift_report(model, window, thresholds, Utc::now())?;
    sink.publish(&report)?;

    match report.decision {
        DriftDecision::NoDrift => info!(
            component = "drift",
            event = "drift.evaluate.finish",
            window_rows = window.len(),
            mae = report.mae,
            decision = report.decision.as_str()
        ),
        DriftDecision::MildDrift | DriftDecision::SevereDrift => warn!(
            component = "drift",
            event = "drift.evaluate.finish",
            window_rows = window.len(),
            mae = report.mae,
            decision = report.decision.as_str(),
            mild_mae = thresholds.mild_mae,
            severe_mae = thresholds.severe_mae
        ),
    }

    Ok(report)
}
