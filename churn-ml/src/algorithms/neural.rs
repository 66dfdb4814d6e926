//! Multi-layer perceptron classifier.

use super::{Classifier, check_width, class_counts, not_fitted, sigmoid};
use churn_core::ChurnError;
use ndarray::{Array1, Array2, ArrayView1, ArrayView2, Axis};
use rand::seq::SliceRandom;
use rand::{Rng, SeedableRng};
use rand_chacha::ChaCha8Rng;

/// Training hyperparameters other than the layer sizes.
#[derive(Debug, Clone)]
pub struct MlpConfig {
    pub learning_rate: f64,
    /// L2 penalty on the weights.
    pub alpha: f64,
    pub max_batch_size: usize,
    pub max_epochs: usize,
    pub tol: f64,
    pub n_iter_no_change: usize,
    pub beta1: f64,
    pub beta2: f64,
    pub epsilon: f64,
}

impl Default for MlpConfig {
    fn default() -> Self {
        Self {
            learning_rate: 1e-3,
            alpha: 1e-4,
            max_batch_size: 200,
            max_epochs: 1000,
            tol: 1e-4,
            n_iter_no_change: 10,
            beta1: 0.9,
            beta2: 0.999,
            epsilon: 1e-8,
        }
    }
}

#[derive(Debug, Clone)]
struct Layer {
    weights: Array2<f64>,
    bias: Array1<f64>,
}

/// Adam moment estimates, one pair per parameter tensor.
#[derive(Debug, Clone)]
struct Adam {
    m_w: Vec<Array2<f64>>,
    v_w: Vec<Array2<f64>>,
    m_b: Vec<Array1<f64>>,
    v_b: Vec<Array1<f64>>,
    t: i32,
}

impl Adam {
    fn new(layers: &[Layer]) -> Self {
        Self {
            m_w: layers.iter().map(|l| Array2::zeros(l.weights.raw_dim())).collect(),
            v_w: layers.iter().map(|l| Array2::zeros(l.weights.raw_dim())).collect(),
            m_b: layers.iter().map(|l| Array1::zeros(l.bias.raw_dim())).collect(),
            v_b: layers.iter().map(|l| Array1::zeros(l.bias.raw_dim())).collect(),
            t: 0,
        }
    }
}

/// Fully connected ReLU network with a single logistic output unit, trained
/// by minibatch Adam on log loss.
#[derive(Debug, Clone)]
pub struct MlpClassifier {
    hidden_layer_sizes: Vec<usize>,
    config: MlpConfig,
    seed: u64,
    layers: Vec<Layer>,
    /// Mean training loss per epoch of the last fit.
    pub loss_curve: Vec<f64>,
}

impl MlpClassifier {
    pub fn new(hidden_layer_sizes: Vec<usize>, seed: u64) -> Self {
        Self::with_config(hidden_layer_sizes, MlpConfig::default(), seed)
    }

    pub fn with_config(hidden_layer_sizes: Vec<usize>, config: MlpConfig, seed: u64) -> Self {
        Self {
            hidden_layer_sizes,
            config,
            seed,
            layers: Vec::new(),
            loss_curve: Vec::new(),
        }
    }

    pub fn n_epochs(&self) -> usize {
        self.loss_curve.len()
    }

    /// Glorot-uniform initialization; the logistic output layer uses the
    /// narrower sigmoid bound.
    fn init_layers(&self, n_features: usize, rng: &mut ChaCha8Rng) -> Vec<Layer> {
        let mut sizes = vec![n_features];
        sizes.extend(&self.hidden_layer_sizes);
        sizes.push(1);
        let last = sizes.len() - 2;
        sizes
            .windows(2)
            .enumerate()
            .map(|(idx, pair)| {
                let (fan_in, fan_out) = (pair[0], pair[1]);
                let factor = if idx == last { 2.0 } else { 6.0 };
                let bound = (factor / (fan_in + fan_out) as f64).sqrt();
                Layer {
                    weights: Array2::from_shape_simple_fn((fan_in, fan_out), || {
                        rng.gen_range(-bound..bound)
                    }),
                    bias: Array1::from_shape_simple_fn(fan_out, || rng.gen_range(-bound..bound)),
                }
            })
            .collect()
    }

    /// Activations of every layer, input first. The last entry holds the
    /// output probabilities as an `n × 1` matrix.
    fn forward(&self, x: ArrayView2<'_, f64>) -> Vec<Array2<f64>> {
        let mut activations = vec![x.to_owned()];
        for (idx, layer) in self.layers.iter().enumerate() {
            let mut z = activations[idx].dot(&layer.weights) + &layer.bias;
            if idx + 1 == self.layers.len() {
                z.mapv_inplace(sigmoid);
            } else {
                z.mapv_inplace(|v| v.max(0.0));
            }
            activations.push(z);
        }
        activations
    }

    /// One Adam step on a minibatch; returns the batch loss.
    fn train_batch(
        &mut self,
        x: ArrayView2<'_, f64>,
        y: ArrayView1<'_, f64>,
        adam: &mut Adam,
    ) -> f64 {
        let n = x.nrows() as f64;
        let activations = self.forward(x);
        let output = activations[self.layers.len()].column(0).to_owned();

        let eps = 1e-15;
        let log_loss = -output
            .iter()
            .zip(y.iter())
            .map(|(&p, &t)| {
                let p = p.clamp(eps, 1.0 - eps);
                t * p.ln() + (1.0 - t) * (1.0 - p).ln()
            })
            .sum::<f64>()
            / n;
        let penalty: f64 = self
            .layers
            .iter()
            .map(|l| l.weights.mapv(|w| w * w).sum())
            .sum::<f64>()
            * 0.5
            * self.config.alpha
            / n;

        // Output delta for sigmoid + log loss is simply p - y.
        let mut delta = (&output - &y).insert_axis(Axis(1));
        let mut grads_w = Vec::with_capacity(self.layers.len());
        let mut grads_b = Vec::with_capacity(self.layers.len());
        for idx in (0..self.layers.len()).rev() {
            let grad_w = (activations[idx].t().dot(&delta)
                + &self.layers[idx].weights * self.config.alpha)
                / n;
            let grad_b = delta.mean_axis(Axis(0)).unwrap_or_default();
            if idx > 0 {
                let mut back = delta.dot(&self.layers[idx].weights.t());
                back.zip_mut_with(&activations[idx], |d, &a| {
                    if a <= 0.0 {
                        *d = 0.0;
                    }
                });
                delta = back;
            }
            grads_w.push(grad_w);
            grads_b.push(grad_b);
        }
        grads_w.reverse();
        grads_b.reverse();

        let cfg = &self.config;
        adam.t += 1;
        let lr = cfg.learning_rate * (1.0 - cfg.beta2.powi(adam.t)).sqrt()
            / (1.0 - cfg.beta1.powi(adam.t));
        for (idx, layer) in self.layers.iter_mut().enumerate() {
            adam.m_w[idx] = &adam.m_w[idx] * cfg.beta1 + &grads_w[idx] * (1.0 - cfg.beta1);
            adam.v_w[idx] =
                &adam.v_w[idx] * cfg.beta2 + grads_w[idx].mapv(|g| g * g) * (1.0 - cfg.beta2);
            let update_w = &adam.m_w[idx] / &adam.v_w[idx].mapv(|v| v.sqrt() + cfg.epsilon);
            layer.weights.scaled_add(-lr, &update_w);

            adam.m_b[idx] = &adam.m_b[idx] * cfg.beta1 + &grads_b[idx] * (1.0 - cfg.beta1);
            adam.v_b[idx] =
                &adam.v_b[idx] * cfg.beta2 + grads_b[idx].mapv(|g| g * g) * (1.0 - cfg.beta2);
            let update_b = &adam.m_b[idx] / &adam.v_b[idx].mapv(|v| v.sqrt() + cfg.epsilon);
            layer.bias.scaled_add(-lr, &update_b);
        }

        log_loss + penalty
    }

    fn probabilities(&self, x: ArrayView2<'_, f64>) -> Result<Array1<f64>, ChurnError> {
        let first = self.layers.first().ok_or_else(|| not_fitted("MLP"))?;
        check_width(first.weights.nrows(), x)?;
        let activations = self.forward(x);
        Ok(activations[self.layers.len()].column(0).to_owned())
    }
}

impl Classifier for MlpClassifier {
    fn fit(&mut self, x: ArrayView2<'_, f64>, y: ArrayView1<'_, u8>) -> Result<(), ChurnError> {
        class_counts(x, y)?;
        if self.hidden_layer_sizes.iter().any(|&s| s == 0) {
            return Err(ChurnError::fit("hidden layer sizes must be positive"));
        }
        let mut rng = ChaCha8Rng::seed_from_u64(self.seed);
        self.layers = self.init_layers(x.ncols(), &mut rng);
        self.loss_curve.clear();

        let target = y.mapv(f64::from);
        let n = x.nrows();
        let batch_size = self.config.max_batch_size.clamp(1, n);
        let mut adam = Adam::new(&self.layers);
        let mut order: Vec<usize> = (0..n).collect();
        let mut best_loss = f64::INFINITY;
        let mut no_improvement = 0;
        let mut converged = false;

        for epoch in 0..self.config.max_epochs {
            order.shuffle(&mut rng);
            let mut accumulated = 0.0;
            for batch in order.chunks(batch_size) {
                let xb = x.select(Axis(0), batch);
                let yb = target.select(Axis(0), batch);
                let batch_loss = self.train_batch(xb.view(), yb.view(), &mut adam);
                accumulated += batch_loss * batch.len() as f64;
            }
            let loss = accumulated / n as f64;
            if !loss.is_finite() {
                return Err(ChurnError::fit(format!("MLP loss diverged at epoch {epoch}")));
            }
            self.loss_curve.push(loss);

            if loss > best_loss - self.config.tol {
                no_improvement += 1;
            } else {
                no_improvement = 0;
            }
            if loss < best_loss {
                best_loss = loss;
            }
            if no_improvement > self.config.n_iter_no_change {
                converged = true;
                break;
            }
        }

        if !converged {
            tracing::warn!(
                max_epochs = self.config.max_epochs,
                layers = ?self.hidden_layer_sizes,
                "MLP reached the epoch limit before converging"
            );
        }
        Ok(())
    }

    fn predict(&self, x: ArrayView2<'_, f64>) -> Result<Array1<u8>, ChurnError> {
        Ok(self.probabilities(x)?.mapv(|p| u8::from(p > 0.5)))
    }

    fn predict_proba(&self, x: ArrayView2<'_, f64>) -> Result<Option<Array1<f64>>, ChurnError> {
        self.probabilities(x).map(Some)
    }
}
