//! RBF-kernel support vector classifier.
//!
//! The dual problem is solved with SMO using the maximal violating pair as the
//! working set. Probabilities come from a Platt sigmoid fitted to the decision
//! values of the training data.

use super::linalg::total_variance;
use super::{Classifier, check_width, class_counts, not_fitted};
use churn_core::ChurnError;
use ndarray::{Array1, Array2, ArrayView1, ArrayView2};

const KKT_TOLERANCE: f64 = 1e-3;
const TAU: f64 = 1e-12;
const MAX_SMO_ITER: usize = 1_000_000;

#[derive(Debug, Clone)]
struct Fitted {
    support_vectors: Array2<f64>,
    /// `αᵢ · yᵢ` for each support vector.
    dual_coef: Array1<f64>,
    rho: f64,
    gamma: f64,
    platt_a: f64,
    platt_b: f64,
}

impl Fitted {
    fn decision(&self, x: ArrayView2<'_, f64>) -> Array1<f64> {
        x.outer_iter()
            .map(|row| {
                self.support_vectors
                    .outer_iter()
                    .zip(self.dual_coef.iter())
                    .map(|(sv, coef)| coef * rbf(sv, row, self.gamma))
                    .sum::<f64>()
                    - self.rho
            })
            .collect()
    }
}

fn rbf(a: ArrayView1<'_, f64>, b: ArrayView1<'_, f64>, gamma: f64) -> f64 {
    let dist: f64 = a.iter().zip(b.iter()).map(|(x, y)| (x - y).powi(2)).sum();
    (-gamma * dist).exp()
}

/// C-SVC with an RBF kernel and `gamma = 1 / (n_features · Var(X))`.
#[derive(Debug, Clone)]
pub struct SupportVectorClassifier {
    c: f64,
    fitted: Option<Fitted>,
}

impl SupportVectorClassifier {
    pub fn new(c: f64) -> Self {
        Self { c, fitted: None }
    }

    pub fn n_support(&self) -> usize {
        self.fitted
            .as_ref()
            .map_or(0, |f| f.support_vectors.nrows())
    }

    fn fitted(&self) -> Result<&Fitted, ChurnError> {
        self.fitted.as_ref().ok_or_else(|| not_fitted("SVM"))
    }
}

/// Working state of the SMO solver over `Q = yᵢ yⱼ K(xᵢ, xⱼ)`.
struct Smo<'a> {
    kernel: &'a Array2<f64>,
    y: Vec<f64>,
    c: f64,
    alpha: Vec<f64>,
    gradient: Vec<f64>,
}

impl Smo<'_> {
    fn q(&self, i: usize, j: usize) -> f64 {
        self.y[i] * self.y[j] * self.kernel[[i, j]]
    }

    fn in_up(&self, t: usize) -> bool {
        (self.y[t] > 0.0 && self.alpha[t] < self.c) || (self.y[t] < 0.0 && self.alpha[t] > 0.0)
    }

    fn in_low(&self, t: usize) -> bool {
        (self.y[t] > 0.0 && self.alpha[t] > 0.0) || (self.y[t] < 0.0 && self.alpha[t] < self.c)
    }

    /// Maximal violating pair, or `None` once the KKT gap is within tolerance.
    fn select_pair(&self) -> Option<(usize, usize)> {
        let mut i = None;
        let mut g_max = f64::NEG_INFINITY;
        let mut j = None;
        let mut g_min = f64::INFINITY;
        for t in 0..self.y.len() {
            let value = -self.y[t] * self.gradient[t];
            if self.in_up(t) && value > g_max {
                g_max = value;
                i = Some(t);
            }
            if self.in_low(t) && value < g_min {
                g_min = value;
                j = Some(t);
            }
        }
        match (i, j) {
            (Some(i), Some(j)) if g_max - g_min > KKT_TOLERANCE => Some((i, j)),
            _ => None,
        }
    }

    fn update_pair(&mut self, i: usize, j: usize) {
        let c = self.c;
        let (old_i, old_j) = (self.alpha[i], self.alpha[j]);
        let (mut ai, mut aj) = (old_i, old_j);

        if self.y[i] != self.y[j] {
            let quad = (self.q(i, i) + self.q(j, j) + 2.0 * self.q(i, j)).max(TAU);
            let delta = (-self.gradient[i] - self.gradient[j]) / quad;
            let diff = ai - aj;
            ai += delta;
            aj += delta;
            if diff > 0.0 {
                if aj < 0.0 {
                    aj = 0.0;
                    ai = diff;
                }
            } else if ai < 0.0 {
                ai = 0.0;
                aj = -diff;
            }
            if diff > 0.0 {
                if ai > c {
                    ai = c;
                    aj = c - diff;
                }
            } else if aj > c {
                aj = c;
                ai = c + diff;
            }
        } else {
            let quad = (self.q(i, i) + self.q(j, j) - 2.0 * self.q(i, j)).max(TAU);
            let delta = (self.gradient[i] - self.gradient[j]) / quad;
            let sum = ai + aj;
            ai -= delta;
            aj += delta;
            if sum > c {
                if ai > c {
                    ai = c;
                    aj = sum - c;
                }
            } else if aj < 0.0 {
                aj = 0.0;
                ai = sum;
            }
            if sum > c {
                if aj > c {
                    aj = c;
                    ai = sum - c;
                }
            } else if ai < 0.0 {
                ai = 0.0;
                aj = sum;
            }
        }

        let (d_i, d_j) = (ai - old_i, aj - old_j);
        self.alpha[i] = ai;
        self.alpha[j] = aj;
        for t in 0..self.y.len() {
            self.gradient[t] += self.q(t, i) * d_i + self.q(t, j) * d_j;
        }
    }

    /// Offset `ρ` of the decision function `Σ αᵢ yᵢ K(xᵢ, x) − ρ`.
    fn rho(&self) -> f64 {
        let (mut ub, mut lb) = (f64::INFINITY, f64::NEG_INFINITY);
        let (mut free, mut free_sum) = (0usize, 0.0);
        for t in 0..self.y.len() {
            let yg = self.y[t] * self.gradient[t];
            if self.alpha[t] >= self.c {
                if self.y[t] < 0.0 {
                    ub = ub.min(yg);
                } else {
                    lb = lb.max(yg);
                }
            } else if self.alpha[t] <= 0.0 {
                if self.y[t] > 0.0 {
                    ub = ub.min(yg);
                } else {
                    lb = lb.max(yg);
                }
            } else {
                free += 1;
                free_sum += yg;
            }
        }
        if free > 0 {
            free_sum / free as f64
        } else {
            (ub + lb) / 2.0
        }
    }
}

/// Fit `P(y = 1 | f) = 1 / (1 + exp(A·f + B))` by regularized maximum
/// likelihood (Newton with backtracking).
pub fn platt_scaling(decision: &[f64], labels: &[u8]) -> (f64, f64) {
    let prior1 = labels.iter().filter(|&&l| l == 1).count() as f64;
    let prior0 = labels.len() as f64 - prior1;
    let hi = (prior1 + 1.0) / (prior1 + 2.0);
    let lo = 1.0 / (prior0 + 2.0);
    let targets: Vec<f64> = labels.iter().map(|&l| if l == 1 { hi } else { lo }).collect();

    let objective = |a: f64, b: f64| -> f64 {
        decision
            .iter()
            .zip(&targets)
            .map(|(f, t)| {
                let z = f * a + b;
                if z >= 0.0 {
                    t * z + (-z).exp().ln_1p()
                } else {
                    (t - 1.0) * z + z.exp().ln_1p()
                }
            })
            .sum()
    };

    let mut a = 0.0;
    let mut b = ((prior0 + 1.0) / (prior1 + 1.0)).ln();
    let mut fval = objective(a, b);
    for _ in 0..100 {
        let (mut h11, mut h22, mut h21, mut g1, mut g2) = (1e-12, 1e-12, 0.0, 0.0, 0.0);
        for (f, t) in decision.iter().zip(&targets) {
            let z = f * a + b;
            let (p, q) = if z >= 0.0 {
                let e = (-z).exp();
                (e / (1.0 + e), 1.0 / (1.0 + e))
            } else {
                let e = z.exp();
                (1.0 / (1.0 + e), e / (1.0 + e))
            };
            let d2 = p * q;
            h11 += f * f * d2;
            h22 += d2;
            h21 += f * d2;
            let d1 = t - p;
            g1 += f * d1;
            g2 += d1;
        }
        if g1.abs() < 1e-5 && g2.abs() < 1e-5 {
            break;
        }
        let det = h11 * h22 - h21 * h21;
        let da = -(h22 * g1 - h21 * g2) / det;
        let db = -(-h21 * g1 + h11 * g2) / det;
        let gd = g1 * da + g2 * db;

        let mut step = 1.0;
        while step >= 1e-10 {
            let (na, nb) = (a + step * da, b + step * db);
            let nf = objective(na, nb);
            if nf < fval + 1e-4 * step * gd {
                a = na;
                b = nb;
                fval = nf;
                break;
            }
            step /= 2.0;
        }
        if step < 1e-10 {
            tracing::debug!("Platt scaling line search stalled");
            break;
        }
    }
    (a, b)
}

fn platt_probability(f: f64, a: f64, b: f64) -> f64 {
    let z = f * a + b;
    if z >= 0.0 {
        let e = (-z).exp();
        e / (1.0 + e)
    } else {
        1.0 / (1.0 + z.exp())
    }
}

impl Classifier for SupportVectorClassifier {
    fn fit(&mut self, x: ArrayView2<'_, f64>, y: ArrayView1<'_, u8>) -> Result<(), ChurnError> {
        class_counts(x, y)?;
        if !(self.c > 0.0) {
            return Err(ChurnError::fit(format!("C must be positive, got {}", self.c)));
        }
        let n = x.nrows();
        let variance = total_variance(x.iter().copied());
        let gamma = if variance > 0.0 {
            1.0 / (x.ncols() as f64 * variance)
        } else {
            1.0
        };

        let mut kernel = Array2::<f64>::zeros((n, n));
        for i in 0..n {
            for j in 0..=i {
                let k = rbf(x.row(i), x.row(j), gamma);
                kernel[[i, j]] = k;
                kernel[[j, i]] = k;
            }
        }

        let mut smo = Smo {
            kernel: &kernel,
            y: y.iter().map(|&l| if l == 1 { 1.0 } else { -1.0 }).collect(),
            c: self.c,
            alpha: vec![0.0; n],
            gradient: vec![-1.0; n],
        };
        let mut iterations = 0;
        while let Some((i, j)) = smo.select_pair() {
            smo.update_pair(i, j);
            iterations += 1;
            if iterations >= MAX_SMO_ITER {
                tracing::warn!(iterations, c = self.c, "SVM solver hit the iteration cap");
                break;
            }
        }
        let rho = smo.rho();

        let support: Vec<usize> = (0..n).filter(|&t| smo.alpha[t] > 0.0).collect();
        let dual_coef: Array1<f64> = support.iter().map(|&t| smo.alpha[t] * smo.y[t]).collect();
        let mut fitted = Fitted {
            support_vectors: x.select(ndarray::Axis(0), &support),
            dual_coef,
            rho,
            gamma,
            platt_a: 0.0,
            platt_b: 0.0,
        };

        let decision = fitted.decision(x).to_vec();
        let (a, b) = platt_scaling(&decision, &y.to_vec());
        fitted.platt_a = a;
        fitted.platt_b = b;

        tracing::debug!(
            c = self.c,
            gamma,
            iterations,
            n_support = support.len(),
            "SVM fitted"
        );
        self.fitted = Some(fitted);
        Ok(())
    }

    fn predict(&self, x: ArrayView2<'_, f64>) -> Result<Array1<u8>, ChurnError> {
        let fitted = self.fitted()?;
        check_width(fitted.support_vectors.ncols(), x)?;
        Ok(fitted.decision(x).mapv(|f| u8::from(f > 0.0)))
    }

    fn predict_proba(&self, x: ArrayView2<'_, f64>) -> Result<Option<Array1<f64>>, ChurnError> {
        let fitted = self.fitted()?;
        check_width(fitted.support_vectors.ncols(), x)?;
        Ok(Some(
            fitted
                .decision(x)
                .mapv(|f| platt_probability(f, fitted.platt_a, fitted.platt_b)),
        ))
    }

    fn decision_function(
        &self,
        x: ArrayView2<'_, f64>,
    ) -> Result<Option<Array1<f64>>, ChurnError> {
        let fitted = self.fitted()?;
        check_width(fitted.support_vectors.ncols(), x)?;
        Ok(Some(fitted.decision(x)))
    }
}
