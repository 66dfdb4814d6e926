//! Column-level transformation pipeline.

use crate::data::dataset::{Column, ColumnData, Dataset};
use crate::error::ChurnError;
use chrono::NaiveDate;
use serde::{Deserialize, Serialize};

/// Fixed date account age is measured against. Not derived from the clock, so
/// reruns over the same input always produce the same output.
pub const REFERENCE_DATE: NaiveDate = match NaiveDate::from_ymd_opt(2024, 6, 22) {
    Some(date) => date,
    None => panic!("invalid reference date"),
};

/// Days per month used by the account-age derivation.
pub const DAYS_PER_MONTH: i64 = 30;

/// A transformation step.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum TransformStep {
    /// Fill nulls in numeric columns with the mean of present values. Output
    /// columns are float so the fill is exactly the mean.
    ImputeMean { columns: Vec<String> },
    /// Fill nulls with the column's first value (row 0); a null row 0 is a
    /// schema error.
    ImputeFirst { column: String },
    /// `zero_value` maps to 0; every other value, null included, maps to 1.
    EncodeBinary { column: String, zero_value: String },
    /// Whole 30-day months between `source` and `reference`, truncated toward
    /// zero, appended as `target`.
    AccountAgeMonths {
        source: String,
        target: String,
        reference: NaiveDate,
    },
    DropColumn { column: String },
}

impl TransformStep {
    pub fn name(&self) -> &'static str {
        match self {
            Self::ImputeMean { .. } => "impute_mean",
            Self::ImputeFirst { .. } => "impute_first",
            Self::EncodeBinary { .. } => "encode_binary",
            Self::AccountAgeMonths { .. } => "account_age_months",
            Self::DropColumn { .. } => "drop_column",
        }
    }
}

/// A pipeline of transformation steps, applied in order.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct TransformPipeline {
    pub steps: Vec<TransformStep>,
}

impl TransformPipeline {
    pub fn new() -> Self {
        Self { steps: Vec::new() }
    }

    pub fn add_step(mut self, step: TransformStep) -> Self {
        self.steps.push(step);
        self
    }

    /// Imputation, gender encoding, account age, then source-column removal.
    pub fn churn_default() -> Self {
        Self::new()
            .add_step(TransformStep::ImputeMean {
                columns: vec![
                    "age".into(),
                    "balance".into(),
                    "transactions_last_month".into(),
                ],
            })
            .add_step(TransformStep::ImputeFirst {
                column: "gender".into(),
            })
            .add_step(TransformStep::EncodeBinary {
                column: "gender".into(),
                zero_value: "M".into(),
            })
            .add_step(TransformStep::AccountAgeMonths {
                source: "account_created_at".into(),
                target: "account_age_months".into(),
                reference: REFERENCE_DATE,
            })
            .add_step(TransformStep::DropColumn {
                column: "account_created_at".into(),
            })
    }

    /// Apply the pipeline to a dataset.
    pub fn apply(&self, mut dataset: Dataset) -> Result<Dataset, ChurnError> {
        for step in &self.steps {
            let nulls_before = dataset.null_count();
            dataset = apply_step(dataset, step)?;
            tracing::debug!(
                step = step.name(),
                columns = dataset.column_count(),
                nulls_before,
                nulls_after = dataset.null_count(),
                "Applied transform"
            );
        }
        Ok(dataset)
    }
}

fn apply_step(mut dataset: Dataset, step: &TransformStep) -> Result<Dataset, ChurnError> {
    match step {
        TransformStep::ImputeMean { columns } => {
            for name in columns {
                let data = &dataset.require_column(name)?.data;
                let imputed = impute_mean(name, data)?;
                dataset.replace_column(name, imputed)?;
            }
        }
        TransformStep::ImputeFirst { column } => {
            let mut data = dataset.require_column(column)?.data.clone();
            let filled = match &mut data {
                ColumnData::Int64(v) => fill_with_first(v),
                ColumnData::Float64(v) => fill_with_first(v),
                ColumnData::Utf8(v) => fill_with_first(v),
                ColumnData::Date(v) => fill_with_first(v),
            };
            if !filled {
                return Err(ChurnError::schema(format!(
                    "column '{column}' has a null first value; there is nothing to fill with"
                )));
            }
            dataset.replace_column(column, data)?;
        }
        TransformStep::EncodeBinary { column, zero_value } => {
            let encoded = match &dataset.require_column(column)?.data {
                ColumnData::Utf8(v) => ColumnData::Int64(
                    v.iter()
                        .map(|value| match value.as_deref() {
                            Some(s) if s == zero_value => Some(0),
                            _ => Some(1),
                        })
                        .collect(),
                ),
                other => {
                    return Err(ChurnError::schema(format!(
                        "column '{column}' must be a string column to encode, found {}",
                        other.column_type()
                    )));
                }
            };
            dataset.replace_column(column, encoded)?;
        }
        TransformStep::AccountAgeMonths {
            source,
            target,
            reference,
        } => {
            let dates = parse_dates(source, &dataset.require_column(source)?.data)?;
            let months = dates
                .iter()
                .map(|d| d.map(|d| account_age_months(d, *reference)))
                .collect();
            dataset.push_column(Column::new(target.clone(), ColumnData::Int64(months)))?;
        }
        TransformStep::DropColumn { column } => {
            dataset.drop_column(column);
        }
    }
    Ok(dataset)
}

fn impute_mean(name: &str, data: &ColumnData) -> Result<ColumnData, ChurnError> {
    if !data.column_type().is_numeric() {
        return Err(ChurnError::schema(format!(
            "cannot mean-impute {} column '{name}'",
            data.column_type()
        )));
    }
    let mean = data.mean();
    if mean.is_none() && !data.is_empty() {
        return Err(ChurnError::schema(format!(
            "column '{name}' has no present values to average"
        )));
    }
    let filled = (0..data.len())
        .map(|i| data.f64_at(i).or(mean))
        .collect();
    Ok(ColumnData::Float64(filled))
}

/// False when there is a row 0 but it is null.
fn fill_with_first<T: Clone>(values: &mut [Option<T>]) -> bool {
    let first = match values.first() {
        None => return true,
        Some(None) => return false,
        Some(Some(first)) => first.clone(),
    };
    for value in values.iter_mut().filter(|v| v.is_none()) {
        *value = Some(first.clone());
    }
    true
}

fn parse_dates(name: &str, data: &ColumnData) -> Result<Vec<Option<NaiveDate>>, ChurnError> {
    match data {
        ColumnData::Date(v) => Ok(v.clone()),
        ColumnData::Utf8(v) => {
            let parsed: Vec<Option<NaiveDate>> = v
                .iter()
                .map(|s| {
                    s.as_deref()
                        .and_then(|s| NaiveDate::parse_from_str(s.trim(), "%Y-%m-%d").ok())
                })
                .collect();
            let unparsable = v
                .iter()
                .zip(&parsed)
                .filter(|(raw, date)| raw.is_some() && date.is_none())
                .count();
            if unparsable > 0 {
                tracing::warn!(column = name, unparsable, "Unparsable dates become null");
            }
            Ok(parsed)
        }
        other => Err(ChurnError::schema(format!(
            "column '{name}' must hold dates, found {}",
            other.column_type()
        ))),
    }
}

/// `(reference - created)` in days divided by 30, truncated toward zero.
pub fn account_age_months(created: NaiveDate, reference: NaiveDate) -> i64 {
    reference.signed_duration_since(created).num_days() / DAYS_PER_MONTH
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::data::dataset::reference_records;
    use pretty_assertions::assert_eq;

    fn date(y: i32, m: u32, d: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(y, m, d).unwrap()
    }

    #[test]
    fn test_reference_date() {
        assert_eq!(REFERENCE_DATE, date(2024, 6, 22));
    }

    #[test]
    fn test_account_age_months_truncates() {
        assert_eq!(account_age_months(date(2024, 6, 22), REFERENCE_DATE), 0);
        assert_eq!(account_age_months(date(2024, 5, 24), REFERENCE_DATE), 0); // 29 days
        assert_eq!(account_age_months(date(2024, 5, 23), REFERENCE_DATE), 1); // 30 days
        // 45 days in the future: -1.5 truncates toward zero.
        assert_eq!(account_age_months(date(2024, 8, 6), REFERENCE_DATE), -1);
    }

    #[test]
    fn test_impute_mean_fills_exact_mean() {
        let ds = Dataset::new(vec![Column::new(
            "age",
            ColumnData::Int64(vec![Some(20), None, Some(25)]),
        )])
        .unwrap();
        let out = TransformPipeline::new()
            .add_step(TransformStep::ImputeMean {
                columns: vec!["age".into()],
            })
            .apply(ds)
            .unwrap();
        assert_eq!(
            out.column("age").unwrap().data,
            ColumnData::Float64(vec![Some(20.0), Some(22.5), Some(25.0)])
        );
    }

    #[test]
    fn test_impute_mean_all_null_is_schema_error() {
        let ds = Dataset::new(vec![Column::new("x", ColumnData::Float64(vec![None, None]))])
            .unwrap();
        let err = TransformPipeline::new()
            .add_step(TransformStep::ImputeMean {
                columns: vec!["x".into()],
            })
            .apply(ds)
            .unwrap_err();
        assert!(matches!(err, ChurnError::Schema(_)));
    }

    #[test]
    fn test_impute_mean_rejects_strings() {
        let ds = Dataset::new(vec![Column::new(
            "gender",
            ColumnData::Utf8(vec![Some("M".into())]),
        )])
        .unwrap();
        let err = TransformPipeline::new()
            .add_step(TransformStep::ImputeMean {
                columns: vec!["gender".into()],
            })
            .apply(ds)
            .unwrap_err();
        assert!(matches!(err, ChurnError::Schema(_)));
    }

    #[test]
    fn test_missing_column_is_schema_error() {
        let err = TransformPipeline::churn_default()
            .apply(Dataset::empty())
            .unwrap_err();
        assert!(matches!(err, ChurnError::Schema(_)));
    }

    #[test]
    fn test_impute_first_uses_row_zero() {
        let ds = Dataset::new(vec![Column::new(
            "gender",
            ColumnData::Utf8(vec![Some("F".into()), None, Some("M".into()), None]),
        )])
        .unwrap();
        let out = TransformPipeline::new()
            .add_step(TransformStep::ImputeFirst {
                column: "gender".into(),
            })
            .apply(ds)
            .unwrap();
        assert_eq!(
            out.column("gender").unwrap().data,
            ColumnData::Utf8(vec![
                Some("F".into()),
                Some("F".into()),
                Some("M".into()),
                Some("F".into())
            ])
        );
    }

    #[test]
    fn test_impute_first_null_first_value_is_schema_error() {
        let ds = Dataset::new(vec![Column::new(
            "gender",
            ColumnData::Utf8(vec![None, Some("M".into()), None]),
        )])
        .unwrap();
        let err = TransformPipeline::new()
            .add_step(TransformStep::ImputeFirst {
                column: "gender".into(),
            })
            .apply(ds)
            .unwrap_err();
        assert!(matches!(err, ChurnError::Schema(_)));
    }

    #[test]
    fn test_encode_binary_known_values() {
        let ds = Dataset::new(vec![Column::new(
            "gender",
            ColumnData::Utf8(vec![Some("M".into()), Some("F".into())]),
        )])
        .unwrap();
        let out = TransformPipeline::new()
            .add_step(TransformStep::EncodeBinary {
                column: "gender".into(),
                zero_value: "M".into(),
            })
            .apply(ds)
            .unwrap();
        assert_eq!(
            out.column("gender").unwrap().data,
            ColumnData::Int64(vec![Some(0), Some(1)])
        );
    }

    #[test]
    fn test_encode_binary_unseen_value_falls_to_one() {
        // Only "M" is special; an unseen value and a null both take the
        // otherwise-branch.
        let ds = Dataset::new(vec![Column::new(
            "gender",
            ColumnData::Utf8(vec![Some("X".into()), Some("m".into()), None]),
        )])
        .unwrap();
        let out = TransformPipeline::new()
            .add_step(TransformStep::EncodeBinary {
                column: "gender".into(),
                zero_value: "M".into(),
            })
            .apply(ds)
            .unwrap();
        assert_eq!(
            out.column("gender").unwrap().data,
            ColumnData::Int64(vec![Some(1), Some(1), Some(1)])
        );
    }

    #[test]
    fn test_account_age_from_strings() {
        let ds = Dataset::new(vec![Column::new(
            "account_created_at",
            ColumnData::Utf8(vec![Some("2021-01-01".into()), Some("garbage".into()), None]),
        )])
        .unwrap();
        let out = TransformPipeline::new()
            .add_step(TransformStep::AccountAgeMonths {
                source: "account_created_at".into(),
                target: "account_age_months".into(),
                reference: REFERENCE_DATE,
            })
            .apply(ds)
            .unwrap();
        // 2021-01-01 .. 2024-06-22 is 1268 days.
        assert_eq!(
            out.column("account_age_months").unwrap().data,
            ColumnData::Int64(vec![Some(42), None, None])
        );
    }

    #[test]
    fn test_churn_default_on_reference_records() {
        let ds = Dataset::from_records(&reference_records());
        let out = TransformPipeline::churn_default().apply(ds).unwrap();
        assert_eq!(
            out.column_names(),
            vec![
                "account_id",
                "age",
                "gender",
                "balance",
                "transactions_last_month",
                "will_churn",
                "account_age_months"
            ]
        );
        assert_eq!(out.row_count(), 5);
        assert_eq!(out.null_count(), 0);
        assert_eq!(
            out.column("gender").unwrap().data,
            ColumnData::Int64(vec![Some(0), Some(1), Some(0), Some(1), Some(0)])
        );
        assert_eq!(
            out.column("account_age_months").unwrap().data,
            ColumnData::Int64(vec![Some(42), Some(48), Some(55), Some(40), Some(43)])
        );
    }

    #[test]
    fn test_pipeline_serde() {
        let json = serde_json::to_string(&TransformPipeline::churn_default()).unwrap();
        assert!(json.contains("account_age_months"));
        let parsed: TransformPipeline = serde_json::from_str(&json).unwrap();
        assert_eq!(parsed, TransformPipeline::churn_default());
    }
}
