//! Classifier families.
//!
//! Each family pairs a [`Classifier`] implementation with the grid of
//! [`ModelParams`] searched for it. The training loop only sees the trait and
//! the grid, so a new family is one more variant here and nothing else.

pub mod linalg;
pub mod logistic;
pub mod naive_bayes;
pub mod neural;
pub mod svm;
pub mod tree;

pub use logistic::LogisticRegression;
pub use naive_bayes::GaussianNaiveBayes;
pub use neural::MlpClassifier;
pub use svm::SupportVectorClassifier;
pub use tree::DecisionTreeClassifier;

use churn_core::ChurnError;
use ndarray::{Array1, ArrayView1, ArrayView2};
use serde::{Deserialize, Serialize};
use std::fmt;

/// Binary classifier over dense `f64` features and `{0, 1}` labels.
pub trait Classifier: Send {
    fn fit(&mut self, x: ArrayView2<'_, f64>, y: ArrayView1<'_, u8>) -> Result<(), ChurnError>;

    /// Hard `{0, 1}` predictions.
    fn predict(&self, x: ArrayView2<'_, f64>) -> Result<Array1<u8>, ChurnError>;

    /// Probability of class 1, when the family can produce one.
    fn predict_proba(&self, x: ArrayView2<'_, f64>) -> Result<Option<Array1<f64>>, ChurnError> {
        let _ = x;
        Ok(None)
    }

    /// Signed confidence for class 1, when the family has a margin.
    fn decision_function(
        &self,
        x: ArrayView2<'_, f64>,
    ) -> Result<Option<Array1<f64>>, ChurnError> {
        let _ = x;
        Ok(None)
    }
}

/// Continuous scores for ranking metrics: the decision function when there is
/// one, otherwise the class-1 probability, otherwise the hard predictions.
pub fn ranking_scores(
    model: &dyn Classifier,
    x: ArrayView2<'_, f64>,
) -> Result<Array1<f64>, ChurnError> {
    if let Some(scores) = model.decision_function(x)? {
        return Ok(scores);
    }
    if let Some(proba) = model.predict_proba(x)? {
        return Ok(proba);
    }
    Ok(model.predict(x)?.mapv(f64::from))
}

/// Class counts `(negatives, positives)`; fails unless both classes occur and
/// every label is 0 or 1.
pub(crate) fn class_counts(
    x: ArrayView2<'_, f64>,
    y: ArrayView1<'_, u8>,
) -> Result<(usize, usize), ChurnError> {
    if x.nrows() != y.len() {
        return Err(ChurnError::fit(format!(
            "{} feature rows but {} labels",
            x.nrows(),
            y.len()
        )));
    }
    if x.ncols() == 0 {
        return Err(ChurnError::fit("no feature columns"));
    }
    let mut counts = (0, 0);
    for &label in y {
        match label {
            0 => counts.0 += 1,
            1 => counts.1 += 1,
            other => return Err(ChurnError::fit(format!("label {other} is not binary"))),
        }
    }
    if counts.0 == 0 || counts.1 == 0 {
        return Err(ChurnError::fit(
            "training data needs samples of both classes",
        ));
    }
    Ok(counts)
}

pub(crate) fn not_fitted(name: &str) -> ChurnError {
    ChurnError::fit(format!("{name} used before fit"))
}

pub(crate) fn check_width(expected: usize, x: ArrayView2<'_, f64>) -> Result<(), ChurnError> {
    if x.ncols() != expected {
        return Err(ChurnError::invalid_input(format!(
            "model was fitted on {expected} features, got {}",
            x.ncols()
        )));
    }
    Ok(())
}

/// Numerically stable logistic function.
pub(crate) fn sigmoid(z: f64) -> f64 {
    if z >= 0.0 {
        1.0 / (1.0 + (-z).exp())
    } else {
        let e = z.exp();
        e / (1.0 + e)
    }
}

/// The classifier families trained by the pipeline.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ModelFamily {
    NaiveBayes,
    NeuralNetwork,
    LogisticRegression,
    Svm,
    DecisionTree,
}

impl ModelFamily {
    pub const ALL: [ModelFamily; 5] = [
        Self::NaiveBayes,
        Self::NeuralNetwork,
        Self::LogisticRegression,
        Self::Svm,
        Self::DecisionTree,
    ];

    /// Configuration key, e.g. `logistic_regression`.
    pub fn key(&self) -> &'static str {
        match self {
            Self::NaiveBayes => "naive_bayes",
            Self::NeuralNetwork => "neural_network",
            Self::LogisticRegression => "logistic_regression",
            Self::Svm => "svm",
            Self::DecisionTree => "decision_tree",
        }
    }

    /// Name used in the console report and figure legend.
    pub fn display_name(&self) -> &'static str {
        match self {
            Self::NaiveBayes => "Naive Bayes",
            Self::NeuralNetwork => "ANN",
            Self::LogisticRegression => "Logistic Regression",
            Self::Svm => "SVM",
            Self::DecisionTree => "Decision Tree",
        }
    }

    pub fn from_key(key: &str) -> Result<Self, ChurnError> {
        Self::ALL
            .into_iter()
            .find(|f| f.key() == key)
            .ok_or_else(|| {
                ChurnError::config(format!(
                    "unknown model family '{key}' (expected one of: {})",
                    Self::ALL.map(|f| f.key()).join(", ")
                ))
            })
    }

    /// Hyperparameter grid, in search order.
    pub fn search_space(&self) -> Vec<ModelParams> {
        match self {
            Self::NaiveBayes => vec![ModelParams::NaiveBayes {
                var_smoothing: naive_bayes::DEFAULT_VAR_SMOOTHING,
            }],
            Self::NeuralNetwork => [vec![50, 50, 50], vec![50, 100, 50], vec![100]]
                .into_iter()
                .map(|hidden_layer_sizes| ModelParams::NeuralNetwork { hidden_layer_sizes })
                .collect(),
            Self::LogisticRegression => [0.1, 1.0, 10.0]
                .into_iter()
                .map(|c| ModelParams::LogisticRegression { c })
                .collect(),
            Self::Svm => [0.1, 1.0, 10.0]
                .into_iter()
                .map(|c| ModelParams::Svm { c })
                .collect(),
            Self::DecisionTree => [None, Some(10), Some(20), Some(30)]
                .into_iter()
                .map(|max_depth| ModelParams::DecisionTree { max_depth })
                .collect(),
        }
    }
}

impl fmt::Display for ModelFamily {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.display_name())
    }
}

/// One point of a family's search space.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "family", rename_all = "snake_case")]
pub enum ModelParams {
    NaiveBayes { var_smoothing: f64 },
    NeuralNetwork { hidden_layer_sizes: Vec<usize> },
    LogisticRegression { c: f64 },
    Svm { c: f64 },
    DecisionTree { max_depth: Option<usize> },
}

impl ModelParams {
    pub fn family(&self) -> ModelFamily {
        match self {
            Self::NaiveBayes { .. } => ModelFamily::NaiveBayes,
            Self::NeuralNetwork { .. } => ModelFamily::NeuralNetwork,
            Self::LogisticRegression { .. } => ModelFamily::LogisticRegression,
            Self::Svm { .. } => ModelFamily::Svm,
            Self::DecisionTree { .. } => ModelFamily::DecisionTree,
        }
    }

    /// Unfitted classifier for these parameters. `seed` drives every random
    /// choice the family makes.
    pub fn build(&self, seed: u64) -> Box<dyn Classifier> {
        match self {
            Self::NaiveBayes { var_smoothing } => {
                Box::new(GaussianNaiveBayes::new(*var_smoothing))
            }
            Self::NeuralNetwork { hidden_layer_sizes } => {
                Box::new(MlpClassifier::new(hidden_layer_sizes.clone(), seed))
            }
            Self::LogisticRegression { c } => Box::new(LogisticRegression::new(*c)),
            Self::Svm { c } => Box::new(SupportVectorClassifier::new(*c)),
            Self::DecisionTree { max_depth } => Box::new(DecisionTreeClassifier::new(*max_depth)),
        }
    }
}

/// The searched parameters only, in the `{'name': value}` form used in logs.
impl fmt::Display for ModelParams {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::NaiveBayes { .. } => write!(f, "{{}}"),
            Self::NeuralNetwork { hidden_layer_sizes } => {
                let sizes: Vec<String> = hidden_layer_sizes.iter().map(|s| s.to_string()).collect();
                if sizes.len() == 1 {
                    write!(f, "{{'hidden_layer_sizes': ({},)}}", sizes[0])
                } else {
                    write!(f, "{{'hidden_layer_sizes': ({})}}", sizes.join(", "))
                }
            }
            Self::LogisticRegression { c } | Self::Svm { c } => write!(f, "{{'C': {c:?}}}"),
            Self::DecisionTree { max_depth } => match max_depth {
                Some(d) => write!(f, "{{'max_depth': {d}}}"),
                None => write!(f, "{{'max_depth': None}}"),
            },
        }
    }
}
