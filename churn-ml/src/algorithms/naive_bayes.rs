//! Gaussian naive Bayes.

use super::{Classifier, check_width, class_counts, not_fitted};
use churn_core::ChurnError;
use ndarray::{Array1, Array2, ArrayView1, ArrayView2, Axis};

/// Fraction of the largest feature variance added to every variance.
pub const DEFAULT_VAR_SMOOTHING: f64 = 1e-9;

#[derive(Debug, Clone)]
struct Fitted {
    /// Per-class feature means, `[class, feature]`.
    theta: Array2<f64>,
    /// Per-class smoothed feature variances.
    var: Array2<f64>,
    log_prior: [f64; 2],
}

/// Gaussian naive Bayes with per-class, per-feature normal likelihoods.
#[derive(Debug, Clone)]
pub struct GaussianNaiveBayes {
    var_smoothing: f64,
    fitted: Option<Fitted>,
}

impl GaussianNaiveBayes {
    pub fn new(var_smoothing: f64) -> Self {
        Self {
            var_smoothing,
            fitted: None,
        }
    }

    /// Joint log-likelihood `[row, class]`.
    fn joint_log_likelihood(&self, x: ArrayView2<'_, f64>) -> Result<Array2<f64>, ChurnError> {
        let fitted = self.fitted.as_ref().ok_or_else(|| not_fitted("naive Bayes"))?;
        check_width(fitted.theta.ncols(), x)?;
        let mut jll = Array2::<f64>::zeros((x.nrows(), 2));
        for class in 0..2 {
            let theta = fitted.theta.row(class);
            let var = fitted.var.row(class);
            let norm: f64 = var
                .iter()
                .map(|v| -0.5 * (2.0 * std::f64::consts::PI * v).ln())
                .sum();
            for (i, row) in x.outer_iter().enumerate() {
                let quad: f64 = row
                    .iter()
                    .zip(theta.iter().zip(var.iter()))
                    .map(|(xv, (m, v))| (xv - m).powi(2) / v)
                    .sum();
                jll[[i, class]] = fitted.log_prior[class] + norm - 0.5 * quad;
            }
        }
        Ok(jll)
    }
}

impl Classifier for GaussianNaiveBayes {
    fn fit(&mut self, x: ArrayView2<'_, f64>, y: ArrayView1<'_, u8>) -> Result<(), ChurnError> {
        let (n0, n1) = class_counts(x, y)?;
        let n = (n0 + n1) as f64;

        let max_var = x
            .var_axis(Axis(0), 0.0)
            .iter()
            .copied()
            .fold(0.0, f64::max);
        // A constant design would otherwise give zero variances.
        let epsilon = if max_var > 0.0 {
            self.var_smoothing * max_var
        } else {
            self.var_smoothing
        };

        let mut theta = Array2::<f64>::zeros((2, x.ncols()));
        let mut var = Array2::<f64>::zeros((2, x.ncols()));
        for class in 0..2u8 {
            let rows: Vec<usize> = (0..y.len()).filter(|&i| y[i] == class).collect();
            let subset = x.select(Axis(0), &rows);
            let c = usize::from(class);
            theta.row_mut(c).assign(&subset.mean_axis(Axis(0)).unwrap_or_default());
            var.row_mut(c)
                .assign(&(subset.var_axis(Axis(0), 0.0) + epsilon));
        }

        self.fitted = Some(Fitted {
            theta,
            var,
            log_prior: [(n0 as f64 / n).ln(), (n1 as f64 / n).ln()],
        });
        Ok(())
    }

    fn predict(&self, x: ArrayView2<'_, f64>) -> Result<Array1<u8>, ChurnError> {
        let jll = self.joint_log_likelihood(x)?;
        Ok(jll
            .outer_iter()
            .map(|row| u8::from(row[1] > row[0]))
            .collect())
    }

    fn predict_proba(&self, x: ArrayView2<'_, f64>) -> Result<Option<Array1<f64>>, ChurnError> {
        let jll = self.joint_log_likelihood(x)?;
        let proba = jll
            .outer_iter()
            .map(|row| {
                // log-sum-exp over the two classes
                let max = row[0].max(row[1]);
                let lse = max + ((row[0] - max).exp() + (row[1] - max).exp()).ln();
                (row[1] - lse).exp()
            })
            .collect();
        Ok(Some(proba))
    }
}
