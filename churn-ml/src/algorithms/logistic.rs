//! L2-regularized logistic regression fitted with Newton's method.

use super::linalg::cholesky_solve;
use super::{Classifier, check_width, class_counts, not_fitted, sigmoid};
use churn_core::ChurnError;
use ndarray::{Array1, Array2, ArrayView1, ArrayView2, Axis, s};

pub const DEFAULT_MAX_ITER: usize = 300;
const TOLERANCE: f64 = 1e-8;

/// Binary logistic regression.
///
/// Minimizes `C · Σ logloss + ½‖w‖²`; the intercept is not penalized.
#[derive(Debug, Clone)]
pub struct LogisticRegression {
    c: f64,
    max_iter: usize,
    coefficients: Option<Array1<f64>>,
    intercept: f64,
    /// Newton iterations used by the last fit.
    pub n_iter: usize,
}

impl LogisticRegression {
    pub fn new(c: f64) -> Self {
        Self {
            c,
            max_iter: DEFAULT_MAX_ITER,
            coefficients: None,
            intercept: 0.0,
            n_iter: 0,
        }
    }

    pub fn with_max_iter(mut self, max_iter: usize) -> Self {
        self.max_iter = max_iter;
        self
    }

    pub fn coefficients(&self) -> Option<&Array1<f64>> {
        self.coefficients.as_ref()
    }

    pub fn intercept(&self) -> f64 {
        self.intercept
    }

    /// Objective at `beta` (coefficients followed by the intercept).
    fn objective(&self, design: &Array2<f64>, y: &Array1<f64>, beta: &Array1<f64>) -> f64 {
        let z = design.dot(beta);
        let loss: f64 = z
            .iter()
            .zip(y.iter())
            .map(|(&z, &t)| {
                // log(1 + e^z) - t·z, computed without overflow
                let softplus = if z > 0.0 {
                    z + (-z).exp().ln_1p()
                } else {
                    z.exp().ln_1p()
                };
                softplus - t * z
            })
            .sum();
        let n_coef = beta.len() - 1;
        let penalty = 0.5 * beta.slice(s![..n_coef]).mapv(|w| w * w).sum();
        self.c * loss + penalty
    }
}

fn with_intercept_column(x: ArrayView2<'_, f64>) -> Array2<f64> {
    let mut design = Array2::<f64>::ones((x.nrows(), x.ncols() + 1));
    design.slice_mut(s![.., ..x.ncols()]).assign(&x);
    design
}

impl Classifier for LogisticRegression {
    fn fit(&mut self, x: ArrayView2<'_, f64>, y: ArrayView1<'_, u8>) -> Result<(), ChurnError> {
        class_counts(x, y)?;
        if !(self.c > 0.0) {
            return Err(ChurnError::fit(format!("C must be positive, got {}", self.c)));
        }
        let design = with_intercept_column(x);
        let target = y.mapv(f64::from);
        let dim = design.ncols();
        let n_coef = dim - 1;

        let mut beta = Array1::<f64>::zeros(dim);
        let mut current = self.objective(&design, &target, &beta);
        let mut converged = false;
        self.n_iter = 0;

        for _ in 0..self.max_iter {
            self.n_iter += 1;
            let p = design.dot(&beta).mapv(sigmoid);

            let mut gradient = design.t().dot(&(&p - &target)) * self.c;
            gradient
                .slice_mut(s![..n_coef])
                .scaled_add(1.0, &beta.slice(s![..n_coef]));

            let weights = p.mapv(|p| p * (1.0 - p) * self.c);
            let weighted = &design * &weights.view().insert_axis(Axis(1));
            let mut hessian = design.t().dot(&weighted);
            for i in 0..n_coef {
                hessian[[i, i]] += 1.0;
            }
            // Keeps the unpenalized intercept direction invertible.
            hessian[[n_coef, n_coef]] += 1e-10;

            let step = cholesky_solve(&hessian, &gradient)
                .ok_or_else(|| ChurnError::fit("logistic regression Hessian is singular"))?;

            // Backtracking keeps every accepted step a descent step.
            let mut scale = 1.0;
            let mut accepted = false;
            while scale > 1e-10 {
                let candidate = &beta - &(&step * scale);
                let value = self.objective(&design, &target, &candidate);
                if value <= current {
                    beta = candidate;
                    current = value;
                    accepted = true;
                    break;
                }
                scale *= 0.5;
            }

            let step_size = step.iter().fold(0.0f64, |m, v| m.max(v.abs())) * scale;
            if !accepted || step_size < TOLERANCE {
                converged = true;
                break;
            }
        }

        if !converged {
            tracing::warn!(
                max_iter = self.max_iter,
                c = self.c,
                "Logistic regression did not converge"
            );
        }
        if beta.iter().any(|v| !v.is_finite()) {
            return Err(ChurnError::fit("logistic regression diverged"));
        }
        self.intercept = beta[n_coef];
        self.coefficients = Some(beta.slice(s![..n_coef]).to_owned());
        Ok(())
    }

    fn predict(&self, x: ArrayView2<'_, f64>) -> Result<Array1<u8>, ChurnError> {
        let scores = self
            .decision_function(x)?
            .ok_or_else(|| not_fitted("logistic regression"))?;
        Ok(scores.mapv(|z| u8::from(z > 0.0)))
    }

    fn predict_proba(&self, x: ArrayView2<'_, f64>) -> Result<Option<Array1<f64>>, ChurnError> {
        Ok(self.decision_function(x)?.map(|z| z.mapv(sigmoid)))
    }

    fn decision_function(
        &self,
        x: ArrayView2<'_, f64>,
    ) -> Result<Option<Array1<f64>>, ChurnError> {
        let w = self
            .coefficients
            .as_ref()
            .ok_or_else(|| not_fitted("logistic regression"))?;
        check_width(w.len(), x)?;
        Ok(Some(x.dot(w) + self.intercept))
    }
}
