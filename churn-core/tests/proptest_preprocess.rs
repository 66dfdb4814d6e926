//! Property-based tests for the preprocessing stages using proptest.

use chrono::NaiveDate;
use proptest::prelude::*;

use churn_core::data::columnar::{decode_parquet, encode_parquet};
use churn_core::data::transform::{REFERENCE_DATE, TransformStep, account_age_months};
use churn_core::data::{Column, ColumnData, Dataset, TransformPipeline};

fn impute(values: Vec<Option<i64>>) -> Option<Vec<Option<f64>>> {
    let ds = Dataset::new(vec![Column::new("balance", ColumnData::Int64(values))]).unwrap();
    let out = TransformPipeline::new()
        .add_step(TransformStep::ImputeMean {
            columns: vec!["balance".into()],
        })
        .apply(ds)
        .ok()?;
    match &out.column("balance").unwrap().data {
        ColumnData::Float64(v) => Some(v.clone()),
        other => panic!("expected float column, got {other:?}"),
    }
}

// --- Imputation properties ---

proptest! {
    #[test]
    fn imputation_fills_with_mean_of_present(
        values in prop::collection::vec(prop::option::of(-10_000i64..10_000), 1..60)
    ) {
        let present: Vec<f64> = values.iter().flatten().map(|v| *v as f64).collect();
        let out = impute(values.clone());
        if present.is_empty() {
            prop_assert!(out.is_none());
        } else {
            let out = out.unwrap();
            prop_assert_eq!(out.len(), values.len());
            let mean = present.iter().sum::<f64>() / present.len() as f64;
            for (before, after) in values.iter().zip(&out) {
                match before {
                    Some(v) => prop_assert_eq!(*after, Some(*v as f64)),
                    None => {
                        let filled = after.unwrap();
                        prop_assert!((filled - mean).abs() <= 1e-9 * mean.abs().max(1.0));
                    }
                }
            }
        }
    }
}

// --- Account age properties ---

proptest! {
    #[test]
    fn account_age_is_floor_of_days_over_thirty(days_before in 0i64..40_000) {
        let created = REFERENCE_DATE - chrono::TimeDelta::days(days_before);
        let months = account_age_months(created, REFERENCE_DATE);
        prop_assert!(months >= 0);
        prop_assert_eq!(months, days_before.div_euclid(30));
    }

    #[test]
    fn account_age_is_monotone(a in 0i64..20_000, b in 0i64..20_000) {
        let (older, newer) = if a >= b { (a, b) } else { (b, a) };
        let m_old = account_age_months(REFERENCE_DATE - chrono::TimeDelta::days(older), REFERENCE_DATE);
        let m_new = account_age_months(REFERENCE_DATE - chrono::TimeDelta::days(newer), REFERENCE_DATE);
        prop_assert!(m_old >= m_new);
    }
}

// --- Columnar round trip ---

proptest! {
    #[test]
    fn parquet_roundtrip_preserves_rows(
        rows in prop::collection::vec(
            (
                any::<i64>(),
                prop::option::of(-1e6f64..1e6),
                prop::option::of("[A-Z]{1,3}"),
                prop::option::of(0i32..30_000),
            ),
            0..40,
        )
    ) {
        let epoch = NaiveDate::from_ymd_opt(1970, 1, 1).unwrap();
        let ds = Dataset::new(vec![
            Column::new("id", ColumnData::Int64(rows.iter().map(|r| Some(r.0)).collect())),
            Column::new("x", ColumnData::Float64(rows.iter().map(|r| r.1).collect())),
            Column::new("s", ColumnData::Utf8(rows.iter().map(|r| r.2.clone()).collect())),
            Column::new(
                "d",
                ColumnData::Date(
                    rows.iter()
                        .map(|r| r.3.map(|d| epoch + chrono::TimeDelta::days(i64::from(d))))
                        .collect(),
                ),
            ),
        ])
        .unwrap();
        let back = decode_parquet(encode_parquet(&ds).unwrap()).unwrap();
        prop_assert_eq!(back, ds);
    }
}
