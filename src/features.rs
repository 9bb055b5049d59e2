//! Canonical feature schema and serving-time feature vectors.

use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use thiserror::Error;
use tracing::debug;

use crate::timestamp::CanonicalTimestamp;

pub const FEATURE_SCHEMA_VERSION: u32 = 1;

pub const FEATURE_COUNT: usize = 7;

/// Column order consumed by every model; training and serving must agree on it.
pub const FEATURE_COLUMNS: [&str; FEATURE_COUNT] = [
    "lag_1",
    "lag_2",
    "hour",
    "day_of_week",
    "month",
    "is_weekend",
    "is_festival",
];

pub const LAG_COLUMNS: [&str; 2] = ["lag_1", "lag_2"];

/// Number of earlier observations needed before a row has every lag.
pub const MAX_LAG: usize = LAG_COLUMNS.len();

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum FeatureDType {
    NullableF64,
    Int,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FeatureColumn {
    pub name: String,
    pub dtype: FeatureDType,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FeatureSchema {
    pub version: u32,
    pub fingerprint: String,
    pub columns: Vec<FeatureColumn>,
}

#[derive(Debug, Error)]
pub enum FeatureError {
    #[error("invalid timestamp: '{0}'")]
    InvalidTimestamp(String),
    #[error("row {row} has {found} values but the table declares {expected} columns")]
    RaggedRow {
        row: usize,
        expected: usize,
        found: usize,
    },
    #[error("column {column} row {row} holds invalid value {value}")]
    InvalidColumnValue {
        column: &'static str,
        row: usize,
        value: f64,
    },
    #[error("history is not sorted ascending by timestamp at index {index}")]
    UnsortedHistory { index: usize },
    #[error("insufficient history: need {required} valid rows, got {available}")]
    InsufficientHistory { required: usize, available: usize },
    #[error("schema version mismatch: expected {expected}, got {actual}")]
    SchemaVersionMismatch { expected: u32, actual: u32 },
    #[error("schema violation: expected fingerprint {expected}, got {actual}")]
    SchemaViolation { expected: String, actual: String },
}

/// One model input, fields in [`FEATURE_COLUMNS`] order.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct FeatureVector {
    pub lag_1: Option<f64>,
    pub lag_2: Option<f64>,
    pub hour: u32,
    pub day_of_week: u32,
    pub month: u32,
    pub is_weekend: u8,
    pub is_festival: u8,
}

impl FeatureVector {
    /// Values in schema order; lags stay `None` until imputation.
    pub fn to_values(&self) -> [Option<f64>; FEATURE_COUNT] {
        [
            self.lag_1,
            self.lag_2,
            Some(f64::from(self.hour)),
            Some(f64::from(self.day_of_week)),
            Some(f64::from(self.month)),
            Some(f64::from(self.is_weekend)),
            Some(f64::from(self.is_festival)),
        ]
    }
}

pub fn build_feature_schema() -> FeatureSchema {
    let columns: Vec<FeatureColumn> = FEATURE_COLUMNS
        .iter()
        .map(|name| FeatureColumn {
            name: (*name).to_string(),
            dtype: if LAG_COLUMNS.contains(name) {
                FeatureDType::NullableF64
            } else {
                FeatureDType::Int
            },
        })
        .collect();

    let fingerprint = schema_fingerprint(FEATURE_SCHEMA_VERSION, &columns);

    debug!(
        component = "features",
        event = "features.schema.built",
        version = FEATURE_SCHEMA_VERSION,
        column_count = columns.len(),
        fingerprint = fingerprint
    );

    FeatureSchema {
        version: FEATURE_SCHEMA_VERSION,
        fingerprint,
        columns,
    }
}

/// Builds the serving-time vector. Lags are left null for the schema
/// enforcer to impute so both paths share one missing-data policy.
pub fn build_feature_vector(
    timestamp: &CanonicalTimestamp,
    lag_1: Option<f64>,
    lag_2: Option<f64>,
    is_festival: Option<u8>,
) -> FeatureVector {
    FeatureVector {
        lag_1,
        lag_2,
        hour: timestamp.hour(),
        day_of_week: timestamp.day_of_week(),
        month: timestamp.month(),
        is_weekend: u8::from(timestamp.is_weekend()),
        is_festival: is_festival.unwrap_or(0),
    }
}

pub fn assert_schema_compatible(
    expected_version: u32,
    expected_fingerprint: &str,
    actual: &FeatureSchema,
) -> Result<(), FeatureError> {
    if expected_version != actual.version {
        return Err(FeatureError::SchemaVersionMismatch {
            expected: expected_version,
            actual: actual.version,
        });
    }

    if expected_fingerprint != actual.fingerprint {
        return Err(FeatureError::SchemaViolation {
            expected: expected_fingerprint.to_string(),
            actual: actual.fingerprint.clone(),
        });
    }

    Ok(())
}

fn schema_fingerprint(version: u32, columns: &[FeatureColumn]) -> String {
    let mut hasher = Sha256::new();
    hasher.update(format!("version:{version};"));
    hasher.update("columns:");
    for column in columns {
        hasher.update(column.name.as_bytes());
        match column.dtype {
            FeatureDType::NullableF64 => hasher.update(":f64?;"),
            FeatureDType::Int => hasher.update(":int;"),
        }
    }
    hex::encode(hasher.finalize())
}
