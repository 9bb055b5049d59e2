//! Append-only CSV observation store with quarantine of malformed rows.

use std::fs::{self, OpenOptions};
use std::io::Write;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Mutex;

use csv::{ByteRecord, StringRecord};
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::{info, warn};

use crate::timestamp::{normalize_timestamp, CanonicalTimestamp};

/// Distinguishes temp files of concurrent writers within one process.
static TMP_SEQ: AtomicU64 = AtomicU64::new(0);

pub const OBSERVATION_HEADERS: [&str; 3] = ["timestamp", "page_views", "is_festival"];

/// A reported ground-truth count for one instant.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Observation {
    pub timestamp: CanonicalTimestamp,
    pub page_views: i64,
    pub is_festival: u8,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ObservationLoad {
    /// Valid rows in storage (insertion) order.
    pub observations: Vec<Observation>,
    pub quarantined_rows: usize,
    pub quarantine_path: Option<PathBuf>,
}

impl ObservationLoad {
    /// Valid rows sorted ascending by timestamp; ties keep insertion order.
    pub fn into_chronological(self) -> Vec<Observation> {
        let mut observations = self.observations;
        observations.sort_by_key(|obs| obs.timestamp);
        observations
    }
}

#[derive(Debug, Error)]
pub enum StoreError {
    #[error("no observations recorded yet at {path}; submit reports first")]
    NotFound { path: PathBuf },
    #[error("failed to append observation to {path}: {source}")]
    WriteFailure {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("observation store is missing required column '{column}'")]
    MissingColumn { column: &'static str },
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
    #[error("CSV error: {0}")]
    Csv(#[from] csv::Error),
}

pub trait ObservationStore: Send + Sync + 'static {
    /// Appends one row, writing the header first when the store is new. A
    /// failed append leaves the store as it was.
    fn append(&self, observation: &Observation) -> Result<(), StoreError>;

    /// Loads every parseable row; the rest are quarantined and counted.
    fn load_all(&self) -> Result<ObservationLoad, StoreError>;
}

pub struct CsvObservationStore {
    path: PathBuf,
    quarantine_path: PathBuf,
    append_lock: Mutex<()>,
}

impl CsvObservationStore {
    pub fn new(path: impl Into<PathBuf>, quarantine_path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            quarantine_path: quarantine_path.into(),
            append_lock: Mutex::new(()),
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn quarantine_path(&self) -> &Path {
        &self.quarantine_path
    }

    fn write_failure(&self, source: std::io::Error) -> StoreError {
        StoreError::WriteFailure {
            path: self.path.clone(),
            source,
        }
    }
}

impl ObservationStore for CsvObservationStore {
    fn append(&self, observation: &Observation) -> Result<(), StoreError> {
        let _guard = self
            .append_lock
            .lock()
            .expect("append lock should not be poisoned");

        if let Some(parent) = self.path.parent() {
            fs::create_dir_all(parent).map_err(|err| self.write_failure(err))?;
        }

        let mut file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(&self.path)
            .map_err(|err| self.write_failure(err))?;
        let prior_len = file
            .metadata()
            .map_err(|err| self.write_failure(err))?
            .len();

        let bytes =
            encode_row(observation, prior_len == 0).map_err(|err| self.write_failure(err))?;

        // One write of a fully encoded row; on failure roll back to the
        // prior length so no partial row survives.
        if let Err(err) = file.write_all(&bytes).and_then(|_| file.sync_data()) {
            if let Err(rollback_err) = file.set_len(prior_len) {
                warn!(
                    component = "store",
                    event = "store.append.rollback_failed",
                    path = %self.path.display(),
                    error = %rollback_err
                );
            }
            return Err(self.write_failure(err));
        }

        info!(
            component = "store",
            event = "store.append.finish",
            path = %self.path.display(),
            timestamp = %observation.timestamp,
            page_views = observation.page_views,
            is_festival = observation.is_festival,
            created = prior_len == 0
        );

        Ok(())
    }

    fn load_all(&self) -> Result<ObservationLoad, StoreError> {
        if !self.path.exists() {
            return Err(StoreError::NotFound {
                path: self.path.clone(),
            });
        }

        let mut reader = csv::ReaderBuilder::new()
            .has_headers(true)
            .flexible(true)
            .from_path(&self.path)?;
        // A broken header or I/O failure is fatal; a broken row is not.
        let headers = reader.headers()?.clone();
        let layout = ColumnLayout::from_headers(&headers)?;

        let mut observations = Vec::new();
        let mut quarantined: Vec<(StringRecord, String)> = Vec::new();
        for record in reader.byte_records() {
            let record = match record {
                Ok(record) => record,
                Err(err) if matches!(err.kind(), csv::ErrorKind::Io(_)) => return Err(err.into()),
                Err(err) => {
                    quarantined.push((StringRecord::new(), err.to_string()));
                    continue;
                }
            };
            let record = match StringRecord::from_byte_record(record) {
                Ok(record) => record,
                Err(err) => {
                    let reason = format!("invalid utf-8 in field {}", err.utf8_error().field());
                    quarantined.push((lossy_record(&err.into_byte_record()), reason));
                    continue;
                }
            };
            match parse_observation(&record, &layout) {
                Ok(obs) => observations.push(obs),
                Err(reason) => quarantined.push((record, reason)),
            }
        }

        let quarantine_path = if quarantined.is_empty() {
            None
        } else {
            write_quarantine(&self.quarantine_path, &headers, &quarantined)?;
            warn!(
                component = "store",
                event = "store.load.quarantined",
                path = %self.path.display(),
                quarantined_rows = quarantined.len(),
                quarantine_path = %self.quarantine_path.display(),
                first_reason = quarantined[0].1.as_str()
            );
            Some(self.quarantine_path.clone())
        };

        info!(
            component = "store",
            event = "store.load.finish",
            path = %self.path.display(),
            valid_rows = observations.len(),
            quarantined_rows = quarantined.len()
        );

        Ok(ObservationLoad {
            observations,
            quarantined_rows: quarantined.len(),
            quarantine_path,
        })
    }
}

#[derive(Debug, Clone, Copy)]
struct ColumnLayout {
    timestamp: usize,
    page_views: usize,
    is_festival: Option<usize>,
}

impl ColumnLayout {
    fn from_headers(headers: &StringRecord) -> Result<Self, StoreError> {
        let find = |name: &str| headers.iter().position(|h| h.trim() == name);
        Ok(Self {
            timestamp: find("timestamp").ok_or(StoreError::MissingColumn {
                column: "timestamp",
            })?,
            page_views: find("page_views").ok_or(StoreError::MissingColumn {
                column: "page_views",
            })?,
            is_festival: find("is_festival"),
        })
    }
}

fn parse_observation(record: &StringRecord, layout: &ColumnLayout) -> Result<Observation, String> {
    let raw_ts = record.get(layout.timestamp).unwrap_or_default();
    let timestamp = normalize_timestamp(raw_ts).map_err(|err| err.to_string())?;

    let raw_views = record.get(layout.page_views).unwrap_or_default().trim();
    let page_views = raw_views
        .parse::<i64>()
        .ok()
        .filter(|v| *v >= 0)
        .ok_or_else(|| format!("invalid page_views '{raw_views}'"))?;

    let is_festival = match layout.is_festival {
        None => 0,
        Some(idx) => {
            let raw = record.get(idx).unwrap_or_default().trim();
            match raw {
                "" | "0" => 0,
                "1" => 1,
                other => return Err(format!("invalid is_festival '{other}'")),
            }
        }
    };

    Ok(Observation {
        timestamp,
        page_views,
        is_festival,
    })
}

fn lossy_record(record: &ByteRecord) -> StringRecord {
    record
        .iter()
        .map(String::from_utf8_lossy)
        .collect()
}

fn encode_row(observation: &Observation, with_header: bool) -> std::io::Result<Vec<u8>> {
    let mut writer = csv::WriterBuilder::new()
        .has_headers(false)
        .from_writer(Vec::new());
    if with_header {
        writer.write_record(OBSERVATION_HEADERS)?;
    }
    writer.write_record([
        observation.timestamp.to_canonical_string(),
        observation.page_views.to_string(),
        observation.is_festival.to_string(),
    ])?;
    writer.into_inner().map_err(|err| err.into_error())
}

fn write_quarantine(
    path: &Path,
    headers: &StringRecord,
    rows: &[(StringRecord, String)],
) -> Result<(), StoreError> {
    let mut writer = csv::WriterBuilder::new()
        .flexible(true)
        .from_writer(Vec::new());
    let mut header = headers.clone();
    header.push_field("reason");
    writer.write_record(&header)?;
    for (record, reason) in rows {
        let mut out = record.clone();
        out.push_field(reason);
        writer.write_record(&out)?;
    }
    let bytes = writer
        .into_inner()
        .map_err(|err| StoreError::Io(err.into_error()))?;

    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent)?;
    }
    write_atomic(path, &bytes)?;
    Ok(())
}

/// Writes to a sibling temp file and renames it over `path`, so readers see
/// either the previous content or the complete new content.
pub(crate) fn write_atomic(path: &Path, bytes: &[u8]) -> std::io::Result<()> {
    let file_name = path
        .file_name()
        .map(|name| name.to_string_lossy().to_string())
        .ok_or_else(|| {
            std::io::Error::new(
                std::io::ErrorKind::InvalidInput,
                format!("invalid output path: {}", path.display()),
            )
        })?;
    let seq = TMP_SEQ.fetch_add(1, Ordering::Relaxed);
    let tmp_path = path.with_file_name(format!("{file_name}.{}.{seq}.tmp", std::process::id()));

    let written = fs::File::create(&tmp_path).and_then(|mut file| {
        file.write_all(bytes)?;
        file.sync_all()
    });
    let result = written.and_then(|_| fs::rename(&tmp_path, path));
    if result.is_err() {
        let _ = fs::remove_file(&tmp_path);
    }
    result
}
