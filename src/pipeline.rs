//! Serving, reporting, retraining and drift-check flows over injected stores.

use std::sync::Arc;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::info;

use crate::config::PipelineConfig;
use crate::drift::{evaluate_drift, DriftConfig, DriftError, DriftReport, FsReportSink, ReportSink};
use crate::features::{build_feature_vector, FeatureError, FeatureVector};
use crate::history::{derive_history_features, drift_min_observations, training_min_observations};
use crate::model::{
    FsModelStore, LinearRegressor, ModelArtifact, ModelError, ModelStore, Regressor,
};
use crate::schema::enforce_feature_vectors;
use crate::store::{CsvObservationStore, Observation, ObservationStore, StoreError};
use crate::timestamp::normalize_timestamp;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PredictRequest {
    pub timestamp: String,
    #[serde(default)]
    pub lag_1: Option<f64>,
    #[serde(default)]
    pub lag_2: Option<f64>,
    #[serde(default)]
    pub is_festival: Option<i64>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PredictResponse {
    pub prediction: f64,
    pub input: FeatureVector,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReportRequest {
    pub timestamp: String,
    pub actual_page_views: i64,
    #[serde(default)]
    pub is_festival: Option<i64>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReportAck {
    pub status: String,
    pub message: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TrainingSummary {
    pub training_rows: usize,
    pub quarantined_rows: usize,
    pub trained_at: DateTime<Utc>,
}

#[derive(Debug, Error)]
pub enum PipelineError {
    #[error("invalid input: {0}")]
    InvalidInput(String),
    #[error(transparent)]
    Feature(#[from] FeatureError),
    #[error(transparent)]
    Model(#[from] ModelError),
    #[error(transparent)]
    Store(#[from] StoreError),
    #[error(transparent)]
    Drift(#[from] DriftError),
}

impl PipelineError {
    /// True when the caller supplied bad input rather than the system failing.
    pub fn is_client_error(&self) -> bool {
        matches!(
            self,
            Self::InvalidInput(_) | Self::Feature(FeatureError::InvalidTimestamp(_))
        )
    }

    /// True when a precondition (trained model, recorded data) is unmet.
    pub fn is_unavailable(&self) -> bool {
        matches!(
            self,
            Self::Model(ModelError::NotFound { .. })
                | Self::Store(StoreError::NotFound { .. })
                | Self::Drift(DriftError::Model(ModelError::NotFound { .. }))
        )
    }

    pub fn is_insufficient_history(&self) -> bool {
        matches!(
            self,
            Self::Feature(FeatureError::InsufficientHistory { .. })
                | Self::Drift(DriftError::Feature(FeatureError::InsufficientHistory { .. }))
        )
    }
}

pub struct ForecastPipeline {
    observations: Arc<dyn ObservationStore>,
    models: Arc<dyn ModelStore>,
    reports: Arc<dyn ReportSink>,
    drift: DriftConfig,
}

impl ForecastPipeline {
    pub fn new(
        observations: Arc<dyn ObservationStore>,
        models: Arc<dyn ModelStore>,
        reports: Arc<dyn ReportSink>,
        drift: DriftConfig,
    ) -> Self {
        Self {
            observations,
            models,
            reports,
            drift,
        }
    }

    pub fn from_config(config: &PipelineConfig) -> Self {
        Self::new(
            Arc::new(CsvObservationStore::new(
                config.observations_path.clone(),
                config.quarantine_path.clone(),
            )),
            Arc::new(FsModelStore::new(config.model_path.clone())),
            Arc::new(FsReportSink::new(config.drift_report_path.clone())),
            config.drift,
        )
    }

    pub fn drift_config(&self) -> &DriftConfig {
        &self.drift
    }

    /// Serving path: normalize, build, enforce, predict. Each call works on
    /// its own single-row batch and reads the current artifact.
    pub fn predict(&self, req: &PredictRequest) -> Result<PredictResponse, PipelineError> {
        let timestamp = normalize_timestamp(&req.timestamp)?;
        let is_festival = festival_flag(req.is_festival)?;
        let input = build_feature_vector(&timestamp, req.lag_1, req.lag_2, Some(is_festival));

        let x = enforce_feature_vectors(std::slice::from_ref(&input))?;
        let model = self.models.load()?;
        let prediction = model
            .predict(&x)?
            .first()
            .copied()
            .ok_or(ModelError::EmptyPrediction)?;

        info!(
            component = "pipeline",
            event = "pipeline.predict.finish",
            timestamp = %timestamp,
            lag_1_present = req.lag_1.is_some(),
            lag_2_present = req.lag_2.is_some(),
            prediction
        );

        Ok(PredictResponse { prediction, input })
    }

    pub fn report(&self, req: &ReportRequest) -> Result<ReportAck, PipelineError> {
        let timestamp = normalize_timestamp(&req.timestamp)?;
        let is_festival = festival_flag(req.is_festival)?;
        if req.actual_page_views < 0 {
            return Err(PipelineError::InvalidInput(format!(
                "actual_page_views must be >= 0, got {}",
                req.actual_page_views
            )));
        }

        self.observations.append(&Observation {
            timestamp,
            page_views: req.actual_page_views,
            is_festival,
        })?;

        Ok(ReportAck {
            status: "ok".to_string(),
            message: "Appended observation".to_string(),
        })
    }

    /// Fits a fresh model on the full history and replaces the artifact.
    pub fn retrain(&self) -> Result<TrainingSummary, PipelineError> {
        let load = self.observations.load_all()?;
        let quarantined_rows = load.quarantined_rows;
        let history = load.into_chronological();

        let features = derive_history_features(&history, training_min_observations())?;
        let (x, y) = features.training_set()?;

        let mut regressor = LinearRegressor::default();
        regressor.fit(&x, &y)?;
        let trained_at = Utc::now();
        let artifact = ModelArtifact::new(regressor, y.len(), trained_at);
        self.models.save(&artifact)?;

        info!(
            component = "pipeline",
            event = "pipeline.retrain.finish",
            training_rows = y.len(),
            quarantined_rows
        );

        Ok(TrainingSummary {
            training_rows: y.len(),
            quarantined_rows,
            trained_at,
        })
    }

    /// Scores the current model on the most recent `window` featured rows
    /// and publishes the report.
    pub fn check_drift(&self) -> Result<DriftReport, PipelineError> {
        let window = self.drift.window;
        let load = self.observations.load_all()?;
        let history = load.into_chronological();

        let features = derive_history_features(&history, drift_min_observations(window))?;
        let recent = features.recent_window(window);
        let model = self.models.load()?;

        Ok(evaluate_drift(
            &model,
            recent,
            &self.drift.thresholds,
            self.reports.as_ref(),
        )?)
    }

    pub fn latest_drift_report(&self) -> Result<DriftReport, PipelineError> {
        Ok(self.reports.latest()?)
    }
}

fn festival_flag(raw: Option<i64>) -> Result<u8, PipelineError> {
    match raw.unwrap_or(0) {
        0 => Ok(0),
        1 => Ok(1),
        other => Err(PipelineError::InvalidInput(format!(
            "is_festival must be 0 or 1, got {other}"
        ))),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::drift::DriftDecision;
    use tempfile::tempdir;

    fn pipeline_in(dir: &std::path::Path, window: usize) -> ForecastPipeline {
        let mut config = PipelineConfig::rooted_at(dir);
        config.drift.window = window;
        ForecastPipeline::from_config(&config)
    }

    fn report(pipeline: &ForecastPipeline, hour: u32, page_views: i64) {
        pipeline
            .report(&ReportRequest {
                timestamp: format!("2025-12-01T{hour:02}:00:00"),
                actual_page_views: page_views,
                is_festival: None,
            })
            .expect("report succeeds");
    }

    #[test]
    fn predict_without_model_is_unavailable() {
        let dir = tempdir().expect("temp dir");
        let pipeline = pipeline_in(dir.path(), 3);

        let err = pipeline
            .predict(&PredictRequest {
                timestamp: "2025-12-07T15:00:00".to_string(),
                lag_1: None,
                lag_2: None,
                is_festival: None,
            })
            .expect_err("must fail");
        assert!(err.is_unavailable());
    }

    #[test]
    fn invalid_inputs_are_client_errors() {
        let dir = tempdir().expect("temp dir");
        let pipeline = pipeline_in(dir.path(), 3);

        let bad_ts = pipeline
            .report(&ReportRequest {
                timestamp: "yesterday-ish".to_string(),
                actual_page_views: 1,
                is_festival: None,
            })
            .expect_err("must fail");
        assert!(bad_ts.is_client_error());

        let bad_flag = pipeline
            .report(&ReportRequest {
                timestamp: "2025-12-07 15:00".to_string(),
                actual_page_views: 1,
                is_festival: Some(3),
            })
            .expect_err("must fail");
        assert!(bad_flag.is_client_error());

        let negative = pipeline
            .report(&ReportRequest {
                timestamp: "2025-12-07 15:00".to_string(),
                actual_page_views: -5,
                is_festival: None,
            })
            .expect_err("must fail");
        assert!(negative.is_client_error());
    }

    #[test]
    fn report_retrain_predict_and_drift_flow() {
        let dir = tempdir().expect("temp dir");
        let pipeline = pipeline_in(dir.path(), 3);

        for hour in 0..8 {
            report(&pipeline, hour, 100 + i64::from(hour) * 10);
        }

        let summary = pipeline.retrain().expect("retrain succeeds");
        assert_eq!(summary.training_rows, 6);
        assert_eq!(summary.quarantined_rows, 0);

        let req = PredictRequest {
            timestamp: "2025-12-01 08:00:00".to_string(),
            lag_1: Some(170.0),
            lag_2: Some(160.0),
            is_festival: Some(0),
        };
        let first = pipeline.predict(&req).expect("predict succeeds");
        let second = pipeline.predict(&req).expect("predict succeeds");
        assert_eq!(first.prediction, second.prediction);
        assert_eq!(first.input.hour, 8);

        let drift = pipeline.check_drift().expect("drift succeeds");
        assert_eq!(drift.decision, DriftDecision::NoDrift);
        let latest = pipeline.latest_drift_report().expect("latest readable");
        assert_eq!(latest.decision, drift.decision);
        assert_eq!(latest.generated_at, drift.generated_at);
        assert!((latest.mae - drift.mae).abs() < 1e-9);
    }

    #[test]
    fn drift_needs_window_plus_lag_observations() {
        let dir = tempdir().expect("temp dir");
        let pipeline = pipeline_in(dir.path(), 20);
        for hour in 0..21 {
            report(&pipeline, hour, 100);
        }

        let err = pipeline.check_drift().expect_err("must fail");
        assert!(err.is_insufficient_history());
        assert!(matches!(
            err,
            PipelineError::Feature(FeatureError::InsufficientHistory {
                required: 22,
                available: 21
            })
        ));
    }
}
