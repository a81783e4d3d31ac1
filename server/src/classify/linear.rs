use serde::{Deserialize, Serialize};

/// One-vs-rest logistic regression over sparse rows, trained with full-batch
/// gradient descent and balanced class weights.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LogisticRegression {
    pub weights: Vec<Vec<f64>>,
    pub bias: Vec<f64>,
    pub n_features: usize,
}

pub struct FitConfig {
    pub epochs: usize,
    pub learning_rate: f64,
    pub l2: f64,
}

impl Default for FitConfig {
    fn default() -> Self {
        Self {
            epochs: 300,
            learning_rate: 0.5,
            l2: 1e-4,
        }
    }
}

fn sigmoid(z: f64) -> f64 {
    1.0 / (1.0 + (-z).exp())
}

impl LogisticRegression {
    pub fn fit(
        rows: &[Vec<(usize, f64)>],
        targets: &[usize],
        n_classes: usize,
        n_features: usize,
        config: FitConfig,
    ) -> Self {
        let n_samples = rows.len();

        // Balanced class weights: n_samples / (n_classes * bincount).
        let mut bincount = vec![0usize; n_classes];
        for &t in targets {
            bincount[t] += 1;
        }
        let class_weight: Vec<f64> = bincount
            .iter()
            .map(|&count| {
                if count == 0 {
                    0.0
                } else {
                    n_samples as f64 / (n_classes as f64 * count as f64)
                }
            })
            .collect();

        let mut weights = vec![vec![0.0; n_features]; n_classes];
        let mut bias = vec![0.0; n_classes];

        for _ in 0..config.epochs {
            for class in 0..n_classes {
                let mut grad_w = vec![0.0; n_features];
                let mut grad_b = 0.0;

                for (row, &target) in rows.iter().zip(targets) {
                    let z = bias[class]
                        + row
                            .iter()
                            .map(|(index, value)| weights[class][*index] * value)
                            .sum::<f64>();
                    let label = if target == class { 1.0 } else { 0.0 };
                    let err = (sigmoid(z) - label) * class_weight[target];

                    for (index, value) in row {
                        grad_w[*index] += err * value;
                    }
                    grad_b += err;
                }

                let scale = config.learning_rate / n_samples as f64;
                for index in 0..n_features {
                    weights[class][index] -=
                        scale * (grad_w[index] + config.l2 * weights[class][index]);
                }
                bias[class] -= scale * grad_b;
            }
        }

        Self {
            weights,
            bias,
            n_features,
        }
    }

    /// Per-class probabilities, normalized across the one-vs-rest scores.
    pub fn predict_proba(&self, row: &[(usize, f64)]) -> Vec<f64> {
        let mut probs: Vec<f64> = self
            .weights
            .iter()
            .zip(&self.bias)
            .map(|(w, b)| {
                let z = b + row
                    .iter()
                    .filter(|(index, _)| *index < self.n_features)
                    .map(|(index, value)| w[*index] * value)
                    .sum::<f64>();
                sigmoid(z)
            })
            .collect();

        let total: f64 = probs.iter().sum();
        if total > 0.0 {
            for p in probs.iter_mut() {
                *p /= total;
            }
        }
        probs
    }

    pub fn predict(&self, row: &[(usize, f64)]) -> (usize, f64) {
        let probs = self.predict_proba(row);
        probs
            .iter()
            .enumerate()
            .max_by(|a, b| a.1.partial_cmp(b.1).unwrap_or(std::cmp::Ordering::Equal))
            .map(|(index, &p)| (index, p))
            .unwrap_or((0, 0.0))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_learns_linearly_separable_classes() {
        // Feature 0 marks class 0, feature 1 marks class 1.
        let rows = vec![
            vec![(0usize, 1.0)],
            vec![(0, 1.0)],
            vec![(0, 1.0)],
            vec![(1, 1.0)],
            vec![(1, 1.0)],
            vec![(1, 1.0)],
        ];
        let targets = vec![0, 0, 0, 1, 1, 1];

        let model = LogisticRegression::fit(&rows, &targets, 2, 2, FitConfig::default());

        let (class, confidence) = model.predict(&[(0, 1.0)]);
        assert_eq!(class, 0);
        assert!(confidence > 0.5);

        let (class, _) = model.predict(&[(1, 1.0)]);
        assert_eq!(class, 1);
    }

    #[test]
    fn test_probabilities_normalize() {
        let rows = vec![vec![(0usize, 1.0)], vec![(1, 1.0)]];
        let model = LogisticRegression::fit(&rows, &[0, 1], 2, 2, FitConfig::default());

        let probs = model.predict_proba(&[(0, 1.0)]);
        let total: f64 = probs.iter().sum();
        assert!((total - 1.0).abs() < 1e-9);
        assert!(probs.iter().all(|p| (0.0..=1.0).contains(p)));
    }

    #[test]
    fn test_balanced_weights_handle_skewed_classes() {
        // 8:2 imbalance; the minority class must still win on its feature.
        let mut rows = vec![vec![(0usize, 1.0)]; 8];
        rows.extend(vec![vec![(1usize, 1.0)]; 2]);
        let mut targets = vec![0usize; 8];
        targets.extend(vec![1usize; 2]);

        let model = LogisticRegression::fit(&rows, &targets, 2, 2, FitConfig::default());
        let (class, _) = model.predict(&[(1, 1.0)]);
        assert_eq!(class, 1);
    }
}
