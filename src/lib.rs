//! Page-view forecasting core.
//!
//! Serving path: timestamp normalization, feature vector build, schema
//! enforcement, prediction. Training/drift path: observation store,
//! historical feature derivation, then fitting or drift evaluation.

mod config;
mod drift;
mod features;
mod history;
mod http;
mod model;
mod observability;
mod pipeline;
mod schema;
mod store;
mod timestamp;

pub use config::{pipeline_config_from_env, server_addr_from_env, ConfigError, PipelineConfig};
pub use drift::{
    classify_drift, compute_drift_report, evaluate_drift, feature_drift_scores, DriftConfig,
    DriftDecision, DriftError, DriftReport, DriftThresholds, FsReportSink, ReportSink,
    DEFAULT_DRIFT_WINDOW, DEFAULT_MILD_DRIFT_MAE, DEFAULT_SEVERE_DRIFT_MAE,
};
pub use features::{
    assert_schema_compatible, build_feature_schema, build_feature_vector, FeatureColumn,
    FeatureDType, FeatureError, FeatureSchema, FeatureVector, FEATURE_COLUMNS, FEATURE_COUNT,
    FEATURE_SCHEMA_VERSION, LAG_COLUMNS, MAX_LAG,
};
pub use history::{
    derive_history_features, drift_min_observations, training_min_observations, training_set,
    DerivationReport, HistoryFeatures, LabeledFeatureRow,
};
pub use http::{forecast_router, status_for};
pub use model::{FsModelStore, LinearRegressor, ModelArtifact, ModelError, ModelStore, Regressor};
pub use observability::{
    init_logging, log_app_bind, log_app_start, log_paths_selected, logging_config_from_env,
    LogFormat, LoggingConfig, LoggingInitError,
};
pub use pipeline::{
    ForecastPipeline, PipelineError, PredictRequest, PredictResponse, ReportAck, ReportRequest,
    TrainingSummary,
};
pub use schema::{enforce_feature_vectors, enforce_schema, FeatureMatrix, RawFrame};
pub use store::{
    CsvObservationStore, Observation, ObservationLoad, ObservationStore, StoreError,
    OBSERVATION_HEADERS,
};
pub use timestamp::{normalize_timestamp, CanonicalTimestamp, CANONICAL_TIMESTAMP_FORMAT};
