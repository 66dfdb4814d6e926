//! End-to-end tests: raw accounts through preprocessing, then training and
//! reporting.

use std::sync::Arc;

use chrono::NaiveDate;
use churn_core::config::{ChurnConfig, InputSource};
use churn_core::data::columnar::encode_parquet;
use churn_core::data::{AccountRecord, Dataset};
use churn_core::storage::{InMemoryObjectStore, ObjectStore};
use churn_core::{ChurnError, PipelineContext, run_preprocess};
use churn_ml::{ModelFamily, run_training};

/// Churners make almost no transactions; everyone else is active.
fn raw_accounts(n: usize) -> Vec<AccountRecord> {
    (0..n)
        .map(|i| {
            let churn = i % 2 == 0;
            AccountRecord {
                account_id: i as i64 + 1,
                age: (i % 11 != 0).then_some(20 + (i * 13 % 40) as i64),
                gender: Some(if i % 3 == 0 { "F" } else { "M" }.to_string()),
                balance: Some(500.0 + (i * 37 % 900) as f64),
                transactions_last_month: Some(if churn {
                    (i % 3) as i64
                } else {
                    15 + (i % 6) as i64
                }),
                account_created_at: NaiveDate::from_ymd_opt(
                    2019 + (i % 4) as i32,
                    1 + (i % 12) as u32,
                    10,
                ),
                will_churn: i64::from(churn),
            }
        })
        .collect()
}

async fn context_with_raw(config: ChurnConfig, records: &[AccountRecord]) -> PipelineContext {
    let store = Arc::new(InMemoryObjectStore::with_buckets(["churn-data"]));
    store
        .put(
            "churn-data",
            "raw/accounts/part-0.parquet",
            encode_parquet(&Dataset::from_records(records)).unwrap(),
        )
        .await
        .unwrap();
    PipelineContext::with_store(config, store)
}

fn config(figure: &std::path::Path) -> ChurnConfig {
    let mut config = ChurnConfig::default();
    config.preprocess.source = InputSource::ObjectStore;
    config.training.families = vec![
        "naive_bayes".into(),
        "logistic_regression".into(),
        "decision_tree".into(),
    ];
    config.training.max_parallel_fits = 4;
    config.report.roc_curve_path = figure.to_path_buf();
    config
}

#[tokio::test]
async fn test_preprocess_then_train() {
    let dir = tempfile::tempdir().unwrap();
    let figure = dir.path().join("roc_curves.svg");
    let ctx = context_with_raw(config(&figure), &raw_accounts(60)).await;

    run_preprocess(&ctx).await.unwrap();
    let mut out = Vec::<u8>::new();
    let results = run_training(&ctx, &mut out).await.unwrap();

    let families: Vec<ModelFamily> = results.iter().map(|r| r.family).collect();
    assert_eq!(
        families,
        vec![
            ModelFamily::NaiveBayes,
            ModelFamily::LogisticRegression,
            ModelFamily::DecisionTree,
        ]
    );
    assert!(results.iter().any(|r| r.accuracy == 1.0));
    for result in &results {
        assert_eq!(result.confusion_matrix.total(), 12);
        assert_eq!(result.cv_scores.len(), 5);
        assert!(result.roc_auc.is_some());
    }

    let text = String::from_utf8(out).unwrap();
    assert!(text.starts_with("Model: Naive Bayes\nAccuracy: "));
    assert!(text.contains("Model: Logistic Regression\n"));
    assert!(text.contains("Cross Validation Scores: ["));
    assert_eq!(text.matches(&"-".repeat(60)).count(), 3);

    let svg = std::fs::read_to_string(&figure).unwrap();
    assert!(svg.contains("ROC Curves"));
    assert!(svg.contains("Decision Tree (AUC = "));
    ctx.close();
}

#[tokio::test]
async fn test_show_plot_disabled_skips_figure() {
    let dir = tempfile::tempdir().unwrap();
    let figure = dir.path().join("roc_curves.svg");
    let mut config = config(&figure);
    config.training.families = vec!["decision_tree".into()];
    config.report.show_plot = false;
    let ctx = context_with_raw(config, &raw_accounts(40)).await;

    run_preprocess(&ctx).await.unwrap();
    let mut out = Vec::<u8>::new();
    let results = run_training(&ctx, &mut out).await.unwrap();
    assert_eq!(results.len(), 1);
    assert!(!figure.exists());
    assert!(!out.is_empty());
}

#[tokio::test]
async fn test_missing_training_data() {
    let dir = tempfile::tempdir().unwrap();
    let ctx = PipelineContext::with_store(
        config(&dir.path().join("roc.svg")),
        Arc::new(InMemoryObjectStore::with_buckets(["churn-data"])),
    );
    let mut out = Vec::<u8>::new();
    let err = run_training(&ctx, &mut out).await.unwrap_err();
    assert!(matches!(err, ChurnError::StorageAccess(_)));
    assert!(out.is_empty());
}

#[tokio::test]
async fn test_unknown_family_is_config_error() {
    let dir = tempfile::tempdir().unwrap();
    let mut config = config(&dir.path().join("roc.svg"));
    config.training.families = vec!["random_forest".into()];
    let ctx = context_with_raw(config, &raw_accounts(40)).await;
    run_preprocess(&ctx).await.unwrap();

    let err = run_training(&ctx, &mut Vec::<u8>::new()).await.unwrap_err();
    assert!(matches!(err, ChurnError::Config(_)));
}
