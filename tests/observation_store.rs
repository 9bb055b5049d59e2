use std::fs;

use tempfile::tempdir;
use traffic_forecast::{
    normalize_timestamp, CsvObservationStore, Observation, ObservationStore, StoreError,
};

fn obs(ts: &str, page_views: i64) -> Observation {
    Observation {
        timestamp: normalize_timestamp(ts).expect("fixture timestamp parses"),
        page_views,
        is_festival: 0,
    }
}

#[test]
fn appended_rows_read_back_in_canonical_form() {
    let dir = tempdir().expect("temp dir");
    let store = CsvObservationStore::new(
        dir.path().join("data").join("traffic.csv"),
        dir.path().join("data").join("bad_timestamp_rows.csv"),
    );

    store
        .append(&obs("2025-12-07T15:00:00", 120))
        .expect("first append");
    store
        .append(&obs("2025-12-07 16:00", 135))
        .expect("second append");

    let text = fs::read_to_string(store.path()).expect("store readable");
    assert_eq!(
        text,
        "timestamp,page_views,is_festival\n\
         2025-12-07 15:00:00,120,0\n\
         2025-12-07 16:00:00,135,0\n"
    );

    let load = store.load_all().expect("load succeeds");
    assert_eq!(load.quarantined_rows, 0);
    assert!(load.quarantine_path.is_none());
    assert_eq!(load.observations.len(), 2);
    assert_eq!(load.observations[1].page_views, 135);
}

#[test]
fn one_bad_timestamp_among_valid_rows_is_quarantined() {
    let dir = tempdir().expect("temp dir");
    let path = dir.path().join("traffic.csv");
    let quarantine = dir.path().join("bad_timestamp_rows.csv");
    fs::write(
        &path,
        "timestamp,page_views,is_festival\n\
         2025-12-01 00:00:00,100,0\n\
         2025-12-01 01:00:00,110,1\n\
         not-a-time,999,0\n\
         2025-12-01 02:00:00,120,\n\
         2025-12-01 03:00:00,130,0\n",
    )
    .expect("fixture written");

    let store = CsvObservationStore::new(&path, &quarantine);
    let load = store.load_all().expect("load succeeds");

    assert_eq!(load.observations.len(), 4);
    assert_eq!(load.quarantined_rows, 1);
    assert_eq!(load.quarantine_path.as_deref(), Some(quarantine.as_path()));
    assert_eq!(load.observations[1].is_festival, 1);
    assert_eq!(load.observations[2].is_festival, 0);

    let bad = fs::read_to_string(&quarantine).expect("quarantine readable");
    let mut lines = bad.lines();
    assert_eq!(lines.next(), Some("timestamp,page_views,is_festival,reason"));
    let row = lines.next().expect("quarantined row present");
    assert!(row.starts_with("not-a-time,999,0,"));
    assert!(lines.next().is_none());
}

#[test]
fn legacy_store_without_festival_column_defaults_to_zero() {
    let dir = tempdir().expect("temp dir");
    let path = dir.path().join("traffic.csv");
    fs::write(
        &path,
        "timestamp,page_views\n2025-12-01 00:00:00,100\n2025-12-01 01:00:00,110\n",
    )
    .expect("fixture written");

    let store = CsvObservationStore::new(&path, dir.path().join("bad.csv"));
    let load = store.load_all().expect("load succeeds");

    assert_eq!(load.observations.len(), 2);
    assert!(load.observations.iter().all(|o| o.is_festival == 0));
}

#[test]
fn out_of_order_appends_are_sorted_for_derivation() {
    let dir = tempdir().expect("temp dir");
    let store =
        CsvObservationStore::new(dir.path().join("traffic.csv"), dir.path().join("bad.csv"));

    store.append(&obs("2025-12-01 02:00:00", 120)).expect("append");
    store.append(&obs("2025-12-01 00:00:00", 100)).expect("append");
    store.append(&obs("2025-12-01 01:00:00", 110)).expect("append");

    let sorted = store.load_all().expect("load succeeds").into_chronological();
    let views: Vec<i64> = sorted.iter().map(|o| o.page_views).collect();
    assert_eq!(views, [100, 110, 120]);
}

#[test]
fn loading_before_any_report_is_not_found() {
    let dir = tempdir().expect("temp dir");
    let store =
        CsvObservationStore::new(dir.path().join("traffic.csv"), dir.path().join("bad.csv"));

    let err = store.load_all().expect_err("must fail");
    assert!(matches!(err, StoreError::NotFound { .. }));
}

#[test]
fn failed_append_is_a_write_failure_and_leaves_existing_store_intact() {
    let dir = tempdir().expect("temp dir");
    let existing = CsvObservationStore::new(
        dir.path().join("traffic.csv"),
        dir.path().join("bad.csv"),
    );
    existing
        .append(&obs("2025-12-01 00:00:00", 100))
        .expect("seed append");
    let before = fs::read(existing.path()).expect("store readable");

    // The existing store file sits where the directory would have to be.
    let blocked = CsvObservationStore::new(
        existing.path().join("nested.csv"),
        dir.path().join("bad.csv"),
    );
    let err = blocked
        .append(&obs("2025-12-01 01:00:00", 110))
        .expect_err("append must fail");
    assert!(matches!(err, StoreError::WriteFailure { .. }), "{err:?}");

    assert_eq!(fs::read(existing.path()).expect("store readable"), before);
    let load = existing.load_all().expect("load succeeds");
    assert_eq!(load.observations.len(), 1);
}

#[cfg(target_os = "linux")]
#[test]
fn device_full_surfaces_write_failure() {
    let full = std::path::Path::new("/dev/full");
    if !full.exists() {
        return;
    }

    let store = CsvObservationStore::new(full, std::env::temp_dir().join("unused-bad.csv"));
    let err = store
        .append(&obs("2025-12-01 00:00:00", 100))
        .expect_err("append must fail");
    assert!(matches!(err, StoreError::WriteFailure { .. }), "{err:?}");
}
