//! Regressor capability and the persisted model artifact.

use std::fs;
use std::path::{Path, PathBuf};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::info;

use crate::features::{
    assert_schema_compatible, build_feature_schema, FeatureError, FeatureSchema, FEATURE_COUNT,
};
use crate::schema::FeatureMatrix;
use crate::store::write_atomic;

/// Diagonal load added to the normal equations; keeps collinear calendar
/// columns (e.g. a constant month) solvable.
const DEFAULT_RIDGE_PENALTY: f64 = 1e-3;
const PIVOT_EPSILON: f64 = 1e-12;

#[derive(Debug, Error)]
pub enum ModelError {
    #[error("no model artifact at {path}; run training first")]
    NotFound { path: PathBuf },
    #[error("cannot fit on an empty training set")]
    EmptyTrainingSet,
    #[error("training set has {rows} rows but {targets} targets")]
    LengthMismatch { rows: usize, targets: usize },
    #[error("normal equations are singular")]
    Singular,
    #[error("model has not been fitted")]
    NotFitted,
    #[error("model returned no prediction")]
    EmptyPrediction,
    #[error(transparent)]
    Schema(#[from] FeatureError),
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
    #[error("artifact JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

/// Anything that can be fitted on and predict from the canonical matrix.
pub trait Regressor: Send + Sync {
    fn fit(&mut self, x: &FeatureMatrix, y: &[f64]) -> Result<(), ModelError>;

    fn predict(&self, x: &FeatureMatrix) -> Result<Vec<f64>, ModelError>;
}

/// Ordinary least squares with a small ridge penalty on the slopes.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LinearRegressor {
    pub intercept: f64,
    pub coefficients: Vec<f64>,
    pub ridge_penalty: f64,
}

impl Default for LinearRegressor {
    fn default() -> Self {
        Self {
            intercept: 0.0,
            coefficients: Vec::new(),
            ridge_penalty: DEFAULT_RIDGE_PENALTY,
        }
    }
}

impl LinearRegressor {
    pub fn is_fitted(&self) -> bool {
        self.coefficients.len() == FEATURE_COUNT
    }
}

impl Regressor for LinearRegressor {
    fn fit(&mut self, x: &FeatureMatrix, y: &[f64]) -> Result<(), ModelError> {
        if x.is_empty() {
            return Err(ModelError::EmptyTrainingSet);
        }
        if x.len() != y.len() {
            return Err(ModelError::LengthMismatch {
                rows: x.len(),
                targets: y.len(),
            });
        }

        // Augmented system over [1, x_0 .. x_6].
        const DIM: usize = FEATURE_COUNT + 1;
        let mut gram = [[0.0_f64; DIM]; DIM];
        let mut rhs = [0.0_f64; DIM];

        for (row, target) in x.rows().iter().zip(y) {
            let mut augmented = [1.0_f64; DIM];
            augmented[1..].copy_from_slice(row);
            for i in 0..DIM {
                rhs[i] += augmented[i] * target;
                for j in 0..DIM {
                    gram[i][j] += augmented[i] * augmented[j];
                }
            }
        }
        for (i, gram_row) in gram.iter_mut().enumerate().skip(1) {
            gram_row[i] += self.ridge_penalty * x.len() as f64;
        }

        let solution = solve_linear_system(gram, rhs)?;
        self.intercept = solution[0];
        self.coefficients = solution[1..].to_vec();
        Ok(())
    }

    fn predict(&self, x: &FeatureMatrix) -> Result<Vec<f64>, ModelError> {
        if !self.is_fitted() {
            return Err(ModelError::NotFitted);
        }

        Ok(x
            .rows()
            .iter()
            .map(|row| {
                self.intercept
                    + row
                        .iter()
                        .zip(&self.coefficients)
                        .map(|(value, weight)| value * weight)
                        .sum::<f64>()
            })
            .collect())
    }
}

/// Gaussian elimination with partial pivoting.
fn solve_linear_system<const N: usize>(
    mut a: [[f64; N]; N],
    mut b: [f64; N],
) -> Result<[f64; N], ModelError> {
    for col in 0..N {
        let pivot = (col..N)
            .max_by(|&i, &j| a[i][col].abs().total_cmp(&a[j][col].abs()))
            .ok_or(ModelError::Singular)?;
        if a[pivot][col].abs() < PIVOT_EPSILON {
            return Err(ModelError::Singular);
        }
        a.swap(col, pivot);
        b.swap(col, pivot);

        for row in (col + 1)..N {
            let factor = a[row][col] / a[col][col];
            if factor == 0.0 {
                continue;
            }
            for k in col..N {
                a[row][k] -= factor * a[col][k];
            }
            b[row] -= factor * b[col];
        }
    }

    let mut out = [0.0_f64; N];
    for row in (0..N).rev() {
        let tail: f64 = ((row + 1)..N).map(|k| a[row][k] * out[k]).sum();
        out[row] = (b[row] - tail) / a[row][row];
    }
    Ok(out)
}

/// The persisted model together with the schema it was trained against.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ModelArtifact {
    pub schema: FeatureSchema,
    pub trained_at: DateTime<Utc>,
    pub training_rows: usize,
    pub regressor: LinearRegressor,
}

impl ModelArtifact {
    pub fn new(
        regressor: LinearRegressor,
        training_rows: usize,
        trained_at: DateTime<Utc>,
    ) -> Self {
        Self {
            schema: build_feature_schema(),
            trained_at,
            training_rows,
            regressor,
        }
    }

    /// Fails when the artifact was trained on a different column layout.
    pub fn check_schema(&self) -> Result<(), FeatureError> {
        let current = build_feature_schema();
        assert_schema_compatible(current.version, &current.fingerprint, &self.schema)
    }
}

impl Regressor for ModelArtifact {
    fn fit(&mut self, x: &FeatureMatrix, y: &[f64]) -> Result<(), ModelError> {
        self.regressor.fit(x, y)?;
        self.training_rows = y.len();
        self.trained_at = Utc::now();
        Ok(())
    }

    fn predict(&self, x: &FeatureMatrix) -> Result<Vec<f64>, ModelError> {
        self.regressor.predict(x)
    }
}

pub trait ModelStore: Send + Sync + 'static {
    fn load(&self) -> Result<ModelArtifact, ModelError>;

    fn save(&self, artifact: &ModelArtifact) -> Result<(), ModelError>;
}

/// Single JSON artifact, replaced by atomic rename on save.
pub struct FsModelStore {
    path: PathBuf,
}

impl FsModelStore {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

impl ModelStore for FsModelStore {
    fn load(&self) -> Result<ModelArtifact, ModelError> {
        let bytes = match fs::read(&self.path) {
            Ok(bytes) => bytes,
            Err(err) if err.kind() == std::io::ErrorKind::NotFound => {
                return Err(ModelError::NotFound {
                    path: self.path.clone(),
                })
            }
            Err(err) => return Err(err.into()),
        };
        let artifact: ModelArtifact = serde_json::from_slice(&bytes)?;
        artifact.check_schema()?;

        info!(
            component = "model",
            event = "model.load.finish",
            path = %self.path.display(),
            training_rows = artifact.training_rows,
            trained_at = %artifact.trained_at.to_rfc3339()
        );

        Ok(artifact)
    }

    fn save(&self, artifact: &ModelArtifact) -> Result<(), ModelError> {
        if let Some(parent) = self.path.parent() {
            fs::create_dir_all(parent)?;
        }
        let bytes = serde_json::to_vec_pretty(artifact)?;
        write_atomic(&self.path, &bytes)?;

        info!(
            component = "model",
            event = "model.save.finish",
            path = %self.path.display(),
            training_rows = artifact.training_rows,
            fingerprint = artifact.schema.fingerprint.as_str()
        );

        Ok(())
    }
}
