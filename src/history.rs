//! Training-time features derived from an observation history.

use serde::{Deserialize, Serialize};
use tracing::info;

use crate::features::{build_feature_vector, FeatureError, FeatureVector, MAX_LAG};
use crate::schema::{enforce_feature_vectors, FeatureMatrix};
use crate::store::Observation;
use crate::timestamp::CanonicalTimestamp;

/// A fully featured historical row together with its target.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct LabeledFeatureRow {
    pub timestamp: CanonicalTimestamp,
    pub features: FeatureVector,
    pub page_views: i64,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DerivationReport {
    pub input_rows: usize,
    pub output_rows: usize,
    pub dropped_rows: usize,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct HistoryFeatures {
    pub rows: Vec<LabeledFeatureRow>,
    pub report: DerivationReport,
}

impl HistoryFeatures {
    /// Model inputs and targets for fitting, passed through the same schema
    /// enforcement as serving.
    pub fn training_set(&self) -> Result<(FeatureMatrix, Vec<f64>), FeatureError> {
        training_set(&self.rows)
    }

    /// The last `window` rows, or all of them when fewer exist.
    pub fn recent_window(&self, window: usize) -> &[LabeledFeatureRow] {
        let start = self.rows.len().saturating_sub(window);
        &self.rows[start..]
    }
}

/// Fewest valid observations that yield one fully featured row.
pub fn training_min_observations() -> usize {
    1 + MAX_LAG
}

/// Fewest valid observations a drift check over `window` rows needs.
pub fn drift_min_observations(window: usize) -> usize {
    window + MAX_LAG
}

/// Derives lag and calendar features for every observation.
///
/// `history` must already be sorted ascending by timestamp. Row `i` gets
/// `lag_1 = page_views[i-1]` and `lag_2 = page_views[i-2]`; the leading rows
/// without a full lag window are dropped.
///
/// `min_observations` counts valid observations before that drop. A history
/// that passes the check but leaves no featured row still fails with
/// [`FeatureError::InsufficientHistory`], naming [`training_min_observations`].
pub fn derive_history_features(
    history: &[Observation],
    min_observations: usize,
) -> Result<HistoryFeatures, FeatureError> {
    if history.len() < min_observations {
        return Err(FeatureError::InsufficientHistory {
            required: min_observations,
            available: history.len(),
        });
    }

    if let Some(index) = history
        .windows(2)
        .position(|pair| pair[1].timestamp < pair[0].timestamp)
    {
        return Err(FeatureError::UnsortedHistory { index: index + 1 });
    }

    let mut rows = Vec::with_capacity(history.len().saturating_sub(MAX_LAG));
    for (idx, obs) in history.iter().enumerate() {
        let lag_1 = lag_value(history, idx, 1);
        let lag_2 = lag_value(history, idx, 2);
        if lag_1.is_none() || lag_2.is_none() {
            continue;
        }

        rows.push(LabeledFeatureRow {
            timestamp: obs.timestamp,
            features: build_feature_vector(&obs.timestamp, lag_1, lag_2, Some(obs.is_festival)),
            page_views: obs.page_views,
        });
    }

    if rows.is_empty() {
        return Err(FeatureError::InsufficientHistory {
            required: min_observations.max(training_min_observations()),
            available: history.len(),
        });
    }

    let report = DerivationReport {
        input_rows: history.len(),
        output_rows: rows.len(),
        dropped_rows: history.len() - rows.len(),
    };

    info!(
        component = "history",
        event = "history.derive.finish",
        input_rows = report.input_rows,
        output_rows = report.output_rows,
        dropped_rows = report.dropped_rows
    );

    Ok(HistoryFeatures { rows, report })
}

pub fn training_set(rows: &[LabeledFeatureRow]) -> Result<(FeatureMatrix, Vec<f64>), FeatureError> {
    let vectors: Vec<FeatureVector> = rows.iter().map(|row| row.features).collect();
    let matrix = enforce_feature_vectors(&vectors)?;
    let targets = rows.iter().map(|row| row.page_views as f64).collect();
    Ok((matrix, targets))
}

fn lag_value(history: &[Observation], idx: usize, lag: usize) -> Option<f64> {
    idx.checked_sub(lag)
        .and_then(|prev| history.get(prev))
        .map(|obs| obs.page_views as f64)
}
