//! Conformance of arbitrary tables to the canonical feature schema.

use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::features::{FeatureError, FeatureVector, FEATURE_COLUMNS, FEATURE_COUNT, LAG_COLUMNS};

/// A loosely-shaped table as presented by a caller: named columns in any
/// order, possibly missing some canonical columns or carrying extra ones.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct RawFrame {
    pub columns: Vec<String>,
    pub rows: Vec<Vec<Option<f64>>>,
}

impl RawFrame {
    pub fn new(columns: Vec<String>) -> Self {
        Self {
            columns,
            rows: Vec::new(),
        }
    }

    pub fn push_row(&mut self, row: Vec<Option<f64>>) {
        self.rows.push(row);
    }

    pub fn from_feature_vectors(vectors: &[FeatureVector]) -> Self {
        Self {
            columns: FEATURE_COLUMNS.iter().map(|c| (*c).to_string()).collect(),
            rows: vectors.iter().map(|fv| fv.to_values().to_vec()).collect(),
        }
    }

    fn column_index(&self, name: &str) -> Option<usize> {
        self.columns.iter().position(|c| c == name)
    }
}

/// Fully imputed model input, every row in [`FEATURE_COLUMNS`] order.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct FeatureMatrix {
    rows: Vec<[f64; FEATURE_COUNT]>,
}

impl FeatureMatrix {
    pub fn column_names(&self) -> [&'static str; FEATURE_COUNT] {
        FEATURE_COLUMNS
    }

    pub fn rows(&self) -> &[[f64; FEATURE_COUNT]] {
        &self.rows
    }

    pub fn len(&self) -> usize {
        self.rows.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    pub fn column(&self, index: usize) -> impl Iterator<Item = f64> + '_ {
        self.rows.iter().map(move |row| row[index])
    }
}

pub fn enforce_feature_vectors(vectors: &[FeatureVector]) -> Result<FeatureMatrix, FeatureError> {
    enforce_schema(&RawFrame::from_feature_vectors(vectors))
}

/// Projects `frame` onto the canonical columns and imputes lags.
///
/// Absent calendar/flag columns become 0, absent lags become null. Each lag
/// column is then imputed over this batch only: the mean of its non-null
/// entries, or 0.0 when the whole column is null.
pub fn enforce_schema(frame: &RawFrame) -> Result<FeatureMatrix, FeatureError> {
    let mut projected: Vec<[Option<f64>; FEATURE_COUNT]> = Vec::with_capacity(frame.rows.len());
    let source_index: Vec<Option<usize>> = FEATURE_COLUMNS
        .iter()
        .map(|name| frame.column_index(name))
        .collect();

    for (row_idx, row) in frame.rows.iter().enumerate() {
        if row.len() != frame.columns.len() {
            return Err(FeatureError::RaggedRow {
                row: row_idx,
                expected: frame.columns.len(),
                found: row.len(),
            });
        }

        let mut out = [None; FEATURE_COUNT];
        for (col_idx, &name) in FEATURE_COLUMNS.iter().enumerate() {
            let value = source_index[col_idx].and_then(|src| row[src]);
            out[col_idx] = if is_lag(name) {
                value
            } else {
                let value = value.unwrap_or(0.0);
                validate_discrete(name, row_idx, value)?;
                Some(value)
            };
        }
        projected.push(out);
    }

    let mut imputed_cells = 0usize;
    for (col_idx, &name) in FEATURE_COLUMNS.iter().enumerate() {
        if !is_lag(name) {
            continue;
        }
        let fill = batch_mean(projected.iter().filter_map(|row| row[col_idx])).unwrap_or(0.0);
        for row in &mut projected {
            if row[col_idx].is_none() {
                row[col_idx] = Some(fill);
                imputed_cells += 1;
            }
        }
    }

    let rows = projected
        .into_iter()
        .map(|row| row.map(|cell| cell.unwrap_or(0.0)))
        .collect::<Vec<_>>();

    debug!(
        component = "schema",
        event = "schema.enforce.finish",
        rows = rows.len(),
        dropped_columns = frame
            .columns
            .iter()
            .filter(|c| !FEATURE_COLUMNS.contains(&c.as_str()))
            .count(),
        imputed_cells
    );

    Ok(FeatureMatrix { rows })
}

fn is_lag(name: &str) -> bool {
    LAG_COLUMNS.contains(&name)
}

fn batch_mean(values: impl Iterator<Item = f64>) -> Option<f64> {
    let (sum, count) = values.fold((0.0, 0usize), |(sum, count), v| (sum + v, count + 1));
    if count == 0 {
        None
    } else {
        Some(sum / count as f64)
    }
}

fn validate_discrete(column: &'static str, row: usize, value: f64) -> Result<(), FeatureError> {
    let (min, max) = match column {
        "hour" => (0.0, 23.0),
        "day_of_week" => (0.0, 6.0),
        // 0 is the fill value for an absent month column.
        "month" => (0.0, 12.0),
        _ => (0.0, 1.0),
    };

    if !value.is_finite() || value.fract() != 0.0 || value < min || value > max {
        return Err(FeatureError::InvalidColumnValue { column, row, value });
    }
    Ok(())
}
