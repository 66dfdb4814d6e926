//! Dense feature matrix built from a preprocessed dataset.

use churn_core::ChurnError;
use churn_core::data::{ColumnData, Dataset};
use ndarray::{Array1, Array2, Axis};

pub const LABEL_COLUMN: &str = "will_churn";
pub const ID_COLUMN: &str = "account_id";

/// Features `x`, binary labels `y`, and the feature column names in order.
#[derive(Debug, Clone, PartialEq)]
pub struct FeatureMatrix {
    pub x: Array2<f64>,
    pub y: Array1<u8>,
    pub feature_names: Vec<String>,
}

impl FeatureMatrix {
    /// Every column except the label and the identifier becomes a feature.
    /// Nulls, non-numeric features, and labels other than 0/1 are
    /// [`ChurnError::Schema`] errors.
    pub fn from_dataset(dataset: &Dataset) -> Result<Self, ChurnError> {
        let labels = dataset.require_column(LABEL_COLUMN)?;
        let y = labels_of(&labels.data)?;

        let features: Vec<_> = dataset
            .columns()
            .iter()
            .filter(|c| c.name != LABEL_COLUMN && c.name != ID_COLUMN)
            .collect();
        if features.is_empty() {
            return Err(ChurnError::schema("dataset has no feature columns"));
        }

        let n = dataset.row_count();
        let mut x = Array2::<f64>::zeros((n, features.len()));
        for (j, column) in features.iter().enumerate() {
            if !column.data.column_type().is_numeric() {
                return Err(ChurnError::schema(format!(
                    "feature '{}' is {}, expected a numeric column",
                    column.name,
                    column.data.column_type()
                )));
            }
            for i in 0..n {
                x[[i, j]] = column.data.f64_at(i).ok_or_else(|| {
                    ChurnError::schema(format!("feature '{}' is null at row {i}", column.name))
                })?;
            }
        }

        Ok(Self {
            x,
            y,
            feature_names: features.iter().map(|c| c.name.clone()).collect(),
        })
    }

    pub fn n_samples(&self) -> usize {
        self.x.nrows()
    }

    pub fn n_features(&self) -> usize {
        self.x.ncols()
    }

    /// Rows at `indices`, in that order.
    pub fn select(&self, indices: &[usize]) -> Self {
        Self {
            x: self.x.select(Axis(0), indices),
            y: self.y.select(Axis(0), indices),
            feature_names: self.feature_names.clone(),
        }
    }

    pub fn labels(&self) -> Vec<u8> {
        self.y.to_vec()
    }
}

fn labels_of(data: &ColumnData) -> Result<Array1<u8>, ChurnError> {
    (0..data.len())
        .map(|i| match data.f64_at(i) {
            Some(v) if v == 0.0 => Ok(0),
            Some(v) if v == 1.0 => Ok(1),
            Some(v) => Err(ChurnError::schema(format!(
                "label '{LABEL_COLUMN}' must be 0 or 1, got {v} at row {i}"
            ))),
            None => Err(ChurnError::schema(format!(
                "label '{LABEL_COLUMN}' is null at row {i}"
            ))),
        })
        .collect()
}
