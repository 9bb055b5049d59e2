use traffic_forecast::{
    assert_schema_compatible, build_feature_schema, build_feature_vector,
    derive_history_features, enforce_feature_vectors, enforce_schema, normalize_timestamp,
    training_min_observations, FeatureDType, FeatureError, Observation, RawFrame,
    FEATURE_COLUMNS, FEATURE_SCHEMA_VERSION,
};

fn obs(ts: &str, page_views: i64, is_festival: u8) -> Observation {
    Observation {
        timestamp: normalize_timestamp(ts).expect("fixture timestamp parses"),
        page_views,
        is_festival,
    }
}

#[test]
fn schema_order_and_fingerprint_are_deterministic() {
    let schema_a = build_feature_schema();
    let schema_b = build_feature_schema();

    assert_eq!(schema_a.version, FEATURE_SCHEMA_VERSION);
    let names: Vec<&str> = schema_a.columns.iter().map(|c| c.name.as_str()).collect();
    assert_eq!(
        names,
        [
            "lag_1",
            "lag_2",
            "hour",
            "day_of_week",
            "month",
            "is_weekend",
            "is_festival"
        ]
    );
    assert_eq!(schema_a.columns[0].dtype, FeatureDType::NullableF64);
    assert_eq!(schema_a.columns[2].dtype, FeatureDType::Int);
    assert_eq!(schema_a.fingerprint.len(), 64);
    assert_eq!(schema_a, schema_b);
}

#[test]
fn schema_compatibility_rejects_version_and_fingerprint_drift() {
    let schema = build_feature_schema();
    assert_schema_compatible(FEATURE_SCHEMA_VERSION, &schema.fingerprint, &schema)
        .expect("identical schema is compatible");

    let version_err =
        assert_schema_compatible(FEATURE_SCHEMA_VERSION + 1, &schema.fingerprint, &schema)
            .expect_err("version mismatch must fail");
    assert!(matches!(
        version_err,
        FeatureError::SchemaVersionMismatch { .. }
    ));

    let fp_err = assert_schema_compatible(FEATURE_SCHEMA_VERSION, "deadbeef", &schema)
        .expect_err("fingerprint mismatch must fail");
    assert!(matches!(fp_err, FeatureError::SchemaViolation { .. }));
}

#[test]
fn serving_vector_for_sunday_afternoon() {
    let ts = normalize_timestamp("2025-12-07T15:00:00").expect("parses");
    let vector = build_feature_vector(&ts, None, None, None);

    assert_eq!(vector.lag_1, None);
    assert_eq!(vector.lag_2, None);
    assert_eq!(vector.hour, 15);
    assert_eq!(vector.day_of_week, 6);
    assert_eq!(vector.month, 12);
    assert_eq!(vector.is_weekend, 1);
    assert_eq!(vector.is_festival, 0);
}

#[test]
fn equivalent_timestamp_texts_build_identical_vectors() {
    let texts = [
        "2025-12-07T15:00:00",
        "2025-12-07 15:00:00",
        "2025-12-07 15:00",
        "2025-12-07T15:00:00Z",
        "2025-12-07T16:00:00+01:00",
    ];
    let vectors: Vec<_> = texts
        .iter()
        .map(|raw| {
            let ts = normalize_timestamp(raw).expect("parses");
            build_feature_vector(&ts, Some(120.0), Some(110.0), Some(1))
        })
        .collect();

    for vector in &vectors[1..] {
        assert_eq!(vector, &vectors[0]);
    }
}

#[test]
fn single_request_without_lags_predicts_on_zeros() {
    let ts = normalize_timestamp("2025-03-03 09:00:00").expect("parses");
    let x = enforce_feature_vectors(&[build_feature_vector(&ts, None, None, None)])
        .expect("enforces");

    assert_eq!(x.len(), 1);
    assert_eq!(x.rows()[0], [0.0, 0.0, 9.0, 0.0, 3.0, 0.0, 0.0]);
}

#[test]
fn enforcement_is_insensitive_to_input_column_order() {
    let mut ordered = RawFrame::new(FEATURE_COLUMNS.iter().map(|c| c.to_string()).collect());
    ordered.push_row(vec![
        Some(100.0),
        None,
        Some(15.0),
        Some(6.0),
        Some(12.0),
        Some(1.0),
        Some(0.0),
    ]);

    let mut shuffled_columns: Vec<String> =
        FEATURE_COLUMNS.iter().rev().map(|c| c.to_string()).collect();
    shuffled_columns.push("referrer_count".to_string());
    let mut shuffled = RawFrame::new(shuffled_columns);
    shuffled.push_row(vec![
        Some(0.0),
        Some(1.0),
        Some(12.0),
        Some(6.0),
        Some(15.0),
        None,
        Some(100.0),
        Some(42.0),
    ]);

    let a = enforce_schema(&ordered).expect("ordered enforces");
    let b = enforce_schema(&shuffled).expect("shuffled enforces");
    assert_eq!(a, b);
    assert_eq!(a.rows()[0], [100.0, 0.0, 15.0, 6.0, 12.0, 1.0, 0.0]);
}

#[test]
fn invalid_timestamp_never_reaches_feature_building() {
    let err = normalize_timestamp("next tuesday").expect_err("must reject");
    assert!(matches!(err, FeatureError::InvalidTimestamp(_)));
}

#[test]
fn history_derivation_shifts_lags_and_trains_on_enforced_rows() {
    let history = vec![
        obs("2025-12-01 00:00:00", 100, 0),
        obs("2025-12-01 01:00:00", 110, 0),
        obs("2025-12-01 02:00:00", 120, 1),
        obs("2025-12-01 03:00:00", 130, 0),
        obs("2025-12-01 04:00:00", 140, 0),
    ];

    let derived =
        derive_history_features(&history, training_min_observations()).expect("derives");
    assert_eq!(derived.report.input_rows, 5);
    assert_eq!(derived.report.output_rows, 3);
    assert_eq!(derived.report.dropped_rows, 2);

    let lags: Vec<(Option<f64>, Option<f64>)> = derived
        .rows
        .iter()
        .map(|row| (row.features.lag_1, row.features.lag_2))
        .collect();
    assert_eq!(
        lags,
        [
            (Some(110.0), Some(100.0)),
            (Some(120.0), Some(110.0)),
            (Some(130.0), Some(120.0)),
        ]
    );
    assert_eq!(derived.rows[0].features.is_festival, 1);

    let (x, y) = derived.training_set().expect("training set");
    assert_eq!(x.len(), 3);
    assert_eq!(y, [120.0, 130.0, 140.0]);
    assert_eq!(x.rows()[2][0..2], [130.0, 120.0]);
}

#[test]
fn history_shorter_than_lag_window_is_insufficient() {
    let history = vec![
        obs("2025-12-01 00:00:00", 100, 0),
        obs("2025-12-01 01:00:00", 110, 0),
    ];

    let err = derive_history_features(&history, training_min_observations())
        .expect_err("must fail");
    assert!(matches!(
        err,
        FeatureError::InsufficientHistory {
            required: 3,
            available: 2
        }
    ));
}
