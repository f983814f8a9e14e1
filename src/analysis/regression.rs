//! Standardised logistic regression.
//!
//! Features are centred and scaled to unit variance, then an L2-regularised
//! logistic model is fit by batch gradient descent. The intercept is not
//! penalised. `c` is the inverse regularisation strength.

use thiserror::Error;
use tracing::debug;

/// Why a model could not be fit.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum FitError {
    #[error("no training samples")]
    Empty,

    #[error("training labels contain a single class")]
    SingleClass,

    #[error("expected {expected} features, found {found}")]
    DimensionMismatch { expected: usize, found: usize },
}

/// Per-column mean and standard deviation.
#[derive(Debug, Clone)]
pub struct StandardScaler {
    mean: Vec<f64>,
    scale: Vec<f64>,
}

impl StandardScaler {
    /// Fit on the rows of a feature matrix.
    ///
    /// Uses the population standard deviation; constant columns get scale 1.
    pub fn fit(rows: &[Vec<f64>]) -> Result<Self, FitError> {
        let first = rows.first().ok_or(FitError::Empty)?;
        let width = first.len();
        let n = rows.len() as f64;

        let mut mean = vec![0.0; width];
        for row in rows {
            if row.len() != width {
                return Err(FitError::DimensionMismatch {
                    expected: width,
                    found: row.len(),
                });
            }
            for (m, v) in mean.iter_mut().zip(row) {
                *m += v;
            }
        }
        mean.iter_mut().for_each(|m| *m /= n);

        let mut var = vec![0.0; width];
        for row in rows {
            for ((acc, v), m) in var.iter_mut().zip(row).zip(&mean) {
                *acc += (v - m) * (v - m);
            }
        }
        let scale = var
            .into_iter()
            .map(|v| {
                let sd = (v / n).sqrt();
                if sd < 1e-12 {
                    1.0
                } else {
                    sd
                }
            })
            .collect();

        Ok(Self { mean, scale })
    }

    pub fn transform(&self, row: &[f64]) -> Vec<f64> {
        row.iter()
            .zip(&self.mean)
            .zip(&self.scale)
            .map(|((v, m), s)| (v - m) / s)
            .collect()
    }
}

/// Solver settings.
#[derive(Debug, Clone, Copy)]
pub struct FitOptions {
    pub c: f64,
    pub max_iter: usize,
    pub learning_rate: f64,
    pub tolerance: f64,
}

impl Default for FitOptions {
    fn default() -> Self {
        Self {
            c: 1.0,
            max_iter: 1000,
            learning_rate: 0.5,
            tolerance: 1e-6,
        }
    }
}

fn sigmoid(z: f64) -> f64 {
    if z >= 0.0 {
        1.0 / (1.0 + (-z).exp())
    } else {
        let e = z.exp();
        e / (1.0 + e)
    }
}

/// Binary logistic regression on already-scaled features.
#[derive(Debug, Clone)]
pub struct LogisticRegression {
    pub weights: Vec<f64>,
    pub intercept: f64,
}

impl LogisticRegression {
    /// Fit on rows `x` with labels `y` in {0, 1}.
    pub fn fit(x: &[Vec<f64>], y: &[f64], opts: &FitOptions) -> Result<Self, FitError> {
        if x.is_empty() {
            return Err(FitError::Empty);
        }
        if x.len() != y.len() {
            return Err(FitError::DimensionMismatch {
                expected: x.len(),
                found: y.len(),
            });
        }
        let positives = y.iter().filter(|v| **v > 0.5).count();
        if positives == 0 || positives == y.len() {
            return Err(FitError::SingleClass);
        }

        let width = x[0].len();
        let n = x.len() as f64;
        let penalty = 1.0 / (opts.c * n);
        let mut weights = vec![0.0; width];
        let mut intercept = 0.0;
        let mut iterations = 0;

        for _ in 0..opts.max_iter {
            iterations += 1;
            let mut grad_w = vec![0.0; width];
            let mut grad_b = 0.0;

            for (row, label) in x.iter().zip(y) {
                let z = intercept + row.iter().zip(&weights).map(|(a, w)| a * w).sum::<f64>();
                let err = sigmoid(z) - label;
                grad_b += err;
                for (g, a) in grad_w.iter_mut().zip(row) {
                    *g += err * a;
                }
            }

            let mut norm = (grad_b / n).powi(2);
            for (g, w) in grad_w.iter_mut().zip(&weights) {
                *g = *g / n + penalty * w;
                norm += *g * *g;
            }

            intercept -= opts.learning_rate * grad_b / n;
            for (w, g) in weights.iter_mut().zip(&grad_w) {
                *w -= opts.learning_rate * g;
            }

            if norm.sqrt() < opts.tolerance {
                break;
            }
        }

        debug!(
            "Logistic regression converged after {} iterations on {} samples",
            iterations,
            x.len()
        );
        Ok(Self { weights, intercept })
    }

    /// Probability of the positive class.
    pub fn predict_proba(&self, row: &[f64]) -> f64 {
        let z = self.intercept
            + row
                .iter()
                .zip(&self.weights)
                .map(|(a, w)| a * w)
                .sum::<f64>();
        sigmoid(z)
    }
}

/// Scaler and regression fit together on raw features.
#[derive(Debug, Clone)]
pub struct ScaledModel {
    scaler: StandardScaler,
    model: LogisticRegression,
}

impl ScaledModel {
    pub fn train(x: &[Vec<f64>], y: &[f64], opts: &FitOptions) -> Result<Self, FitError> {
        let scaler = StandardScaler::fit(x)?;
        let scaled: Vec<Vec<f64>> = x.iter().map(|row| scaler.transform(row)).collect();
        let model = LogisticRegression::fit(&scaled, y, opts)?;
        Ok(Self { scaler, model })
    }

    pub fn predict_proba(&self, row: &[f64]) -> f64 {
        self.model.predict_proba(&self.scaler.transform(row))
    }
}
