use crate::domain::errors::TrainingError;
use serde::{Deserialize, Serialize};

const CLASS_COUNT: usize = 3;

/// A single multinomial logistic-regression classifier over a fixed-width
/// feature row, producing a 3-way softmax distribution.
///
/// Fitting is full-batch gradient descent from zero-initialized weights with
/// a fixed epoch count, so identical training data always produces identical
/// coefficients, and identical input always produces a bit-identical
/// distribution. That determinism underlies the result cache's correctness.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SoftmaxClassifier {
    /// Per-class weight rows, `weights[class][dim]`.
    weights: Vec<Vec<f64>>,
    bias: [f64; CLASS_COUNT],
    /// Standardization parameters captured from the training data.
    means: Vec<f64>,
    stds: Vec<f64>,
}

/// Fit hyperparameters. Deterministic: no randomness anywhere.
#[derive(Debug, Clone, Copy)]
pub struct FitParams {
    pub epochs: usize,
    pub learning_rate: f64,
}

impl Default for FitParams {
    fn default() -> Self {
        Self {
            epochs: 300,
            learning_rate: 0.1,
        }
    }
}

impl SoftmaxClassifier {
    /// A classifier with all-zero coefficients: every input maps to the
    /// uniform distribution. Used as the version-0 bootstrap model.
    pub fn uniform(dims: usize) -> Self {
        Self {
            weights: vec![vec![0.0; dims]; CLASS_COUNT],
            bias: [0.0; CLASS_COUNT],
            means: vec![0.0; dims],
            stds: vec![1.0; dims],
        }
    }

    pub fn dims(&self) -> usize {
        self.means.len()
    }

    /// Fits on feature rows `x` and labels `y` (0=Away, 1=Draw, 2=Home).
    /// All three classes must be present; a one- or two-class label set is a
    /// degenerate distribution the optimizer cannot produce a usable
    /// three-way model from.
    pub fn fit(x: &[Vec<f64>], y: &[usize], params: FitParams) -> Result<Self, TrainingError> {
        if x.is_empty() || x.len() != y.len() {
            return Err(TrainingError::Fit {
                reason: format!("shape mismatch: {} rows, {} labels", x.len(), y.len()),
            });
        }
        let dims = x[0].len();
        if dims == 0 || x.iter().any(|row| row.len() != dims) {
            return Err(TrainingError::Fit {
                reason: "ragged feature rows".to_string(),
            });
        }
        if y.iter().any(|label| *label >= CLASS_COUNT) {
            return Err(TrainingError::Fit {
                reason: "label out of range".to_string(),
            });
        }

        let classes_present = (0..CLASS_COUNT)
            .filter(|c| y.contains(c))
            .count();
        if classes_present < CLASS_COUNT {
            return Err(TrainingError::DegenerateLabels { classes_present });
        }

        let (means, stds) = standardization(x, dims);
        let z: Vec<Vec<f64>> = x
            .iter()
            .map(|row| {
                row.iter()
                    .enumerate()
                    .map(|(j, v)| (v - means[j]) / stds[j])
                    .collect()
            })
            .collect();

        let n = z.len() as f64;
        let mut weights = vec![vec![0.0; dims]; CLASS_COUNT];
        let mut bias = [0.0; CLASS_COUNT];

        for _ in 0..params.epochs {
            let mut grad_w = vec![vec![0.0; dims]; CLASS_COUNT];
            let mut grad_b = [0.0; CLASS_COUNT];

            for (row, label) in z.iter().zip(y.iter()) {
                let p = softmax(&logits(&weights, &bias, row));
                for c in 0..CLASS_COUNT {
                    let err = p[c] - if c == *label { 1.0 } else { 0.0 };
                    grad_b[c] += err;
                    for (j, v) in row.iter().enumerate() {
                        grad_w[c][j] += err * v;
                    }
                }
            }

            for c in 0..CLASS_COUNT {
                bias[c] -= params.learning_rate * grad_b[c] / n;
                for j in 0..dims {
                    weights[c][j] -= params.learning_rate * grad_w[c][j] / n;
                }
            }
        }

        Ok(Self {
            weights,
            bias,
            means,
            stds,
        })
    }

    /// Probability distribution over [away, draw, home] for one feature row.
    /// The row width must match the width the classifier was fitted on.
    pub fn predict_proba(&self, features: &[f64]) -> [f64; CLASS_COUNT] {
        debug_assert_eq!(features.len(), self.dims());
        let z: Vec<f64> = features
            .iter()
            .zip(self.means.iter().zip(self.stds.iter()))
            .map(|(v, (m, s))| (v - m) / s)
            .collect();
        softmax(&logits(&self.weights, &self.bias, &z))
    }

    /// Index of the most probable class plus its probability.
    pub fn predict(&self, features: &[f64]) -> (usize, f64) {
        let p = self.predict_proba(features);
        argmax(&p)
    }

    /// Fraction of rows whose most probable class matches the label.
    pub fn accuracy(&self, x: &[Vec<f64>], y: &[usize]) -> f64 {
        if x.is_empty() {
            return 0.0;
        }
        let correct = x
            .iter()
            .zip(y.iter())
            .filter(|(row, label)| self.predict(row).0 == **label)
            .count();
        correct as f64 / x.len() as f64
    }
}

fn logits(weights: &[Vec<f64>], bias: &[f64; CLASS_COUNT], row: &[f64]) -> [f64; CLASS_COUNT] {
    let mut out = [0.0; CLASS_COUNT];
    for c in 0..CLASS_COUNT {
        out[c] = bias[c]
            + weights[c]
                .iter()
                .zip(row.iter())
                .map(|(w, v)| w * v)
                .sum::<f64>();
    }
    out
}

/// Numerically stable softmax: shifts by the max logit before exponentiating.
fn softmax(logits: &[f64; CLASS_COUNT]) -> [f64; CLASS_COUNT] {
    let max = logits.iter().copied().fold(f64::NEG_INFINITY, f64::max);
    let mut out = [0.0; CLASS_COUNT];
    let mut sum = 0.0;
    for (i, l) in logits.iter().enumerate() {
        out[i] = (l - max).exp();
        sum += out[i];
    }
    for v in &mut out {
        *v /= sum;
    }
    out
}

pub fn argmax(probabilities: &[f64; CLASS_COUNT]) -> (usize, f64) {
    let mut best = 0;
    for i in 1..CLASS_COUNT {
        if probabilities[i] > probabilities[best] {
            best = i;
        }
    }
    (best, probabilities[best])
}

fn standardization(x: &[Vec<f64>], dims: usize) -> (Vec<f64>, Vec<f64>) {
    let n = x.len() as f64;
    let mut means = vec![0.0; dims];
    for row in x {
        for (j, v) in row.iter().enumerate() {
            means[j] += v;
        }
    }
    for m in &mut means {
        *m /= n;
    }
    let mut stds = vec![0.0; dims];
    for row in x {
        for (j, v) in row.iter().enumerate() {
            stds[j] += (v - means[j]).powi(2);
        }
    }
    for s in &mut stds {
        *s = (*s / n).sqrt();
        // Constant columns (e.g. home advantage) pass through unscaled.
        if *s == 0.0 {
            *s = 1.0;
        }
    }
    (means, stds)
}
