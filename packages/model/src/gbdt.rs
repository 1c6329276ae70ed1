//! Multiclass gradient-boosted decision trees.
//!
//! Softmax objective: every round fits one regression tree per class to
//! the first and second derivatives of the multiclass log loss, and the
//! class scores are the sum of the tree outputs on top of the log class
//! priors.

use ndarray::{Array1, Array2, ArrayView1, ArrayView2, Axis};
use serde::{Deserialize, Serialize};

use crate::tree::{BinnedMatrix, RegressionTree, SplitStats, TreeParams};
use crate::{Classifier, ModelError};

/// Boosting hyperparameters. Defaults mirror `XGBoost`'s.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct BoostingConfig {
    /// Number of boosting rounds.
    pub n_rounds: usize,
    /// Shrinkage applied to every leaf.
    pub learning_rate: f64,
    /// Maximum tree depth.
    pub max_depth: usize,
    /// Minimum hessian sum per child.
    pub min_child_weight: f64,
    /// L2 regularization on leaf weights.
    pub lambda: f64,
    /// Minimum gain required to split.
    pub gamma: f64,
}

impl Default for BoostingConfig {
    fn default() -> Self {
        Self {
            n_rounds: 100,
            learning_rate: 0.3,
            max_depth: 6,
            min_child_weight: 1.0,
            lambda: 1.0,
            gamma: 0.0,
        }
    }
}

impl BoostingConfig {
    const fn tree_params(&self) -> TreeParams {
        TreeParams {
            max_depth: self.max_depth,
            min_child_weight: self.min_child_weight,
            lambda: self.lambda,
            gamma: self.gamma,
            learning_rate: self.learning_rate,
        }
    }
}

/// Gradient-boosted multiclass classifier.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GradientBoostedClassifier {
    config: BoostingConfig,
    n_features: usize,
    base_scores: Vec<f64>,
    /// `rounds[r][class]`
    rounds: Vec<Vec<RegressionTree>>,
    importances: Vec<f64>,
}

impl Default for GradientBoostedClassifier {
    fn default() -> Self {
        Self::new(BoostingConfig::default())
    }
}

impl GradientBoostedClassifier {
    /// Creates an unfitted classifier.
    #[must_use]
    pub const fn new(config: BoostingConfig) -> Self {
        Self {
            config,
            n_features: 0,
            base_scores: Vec::new(),
            rounds: Vec::new(),
            importances: Vec::new(),
        }
    }

    /// The hyperparameters this classifier was built with.
    #[must_use]
    pub const fn config(&self) -> &BoostingConfig {
        &self.config
    }

    /// Number of classes seen during fit.
    #[must_use]
    pub fn n_classes(&self) -> usize {
        self.base_scores.len()
    }

    /// Number of boosting rounds actually fitted.
    #[must_use]
    pub fn n_rounds(&self) -> usize {
        self.rounds.len()
    }

    fn raw_scores(&self, row: ArrayView1<'_, f64>) -> Array1<f64> {
        let mut scores = Array1::from(self.base_scores.clone());
        for trees in &self.rounds {
            for (score, tree) in scores.iter_mut().zip(trees) {
                *score += tree.predict(row);
            }
        }
        scores
    }
}

impl Classifier for GradientBoostedClassifier {
    #[allow(clippy::cast_precision_loss)]
    fn fit(
        &mut self,
        x: ArrayView2<'_, f64>,
        y: &[usize],
        n_classes: usize,
    ) -> Result<(), ModelError> {
        if x.nrows() == 0 {
            return Err(ModelError::NoData);
        }
        if x.nrows() != y.len() {
            return Err(ModelError::Shape {
                message: format!("{} rows but {} labels", x.nrows(), y.len()),
            });
        }
        if let Some(&bad) = y.iter().find(|&&c| c >= n_classes) {
            return Err(ModelError::Shape {
                message: format!("label {bad} out of range for {n_classes} classes"),
            });
        }

        let n = x.nrows();
        let k = n_classes;

        let mut counts = vec![0usize; k];
        for &c in y {
            counts[c] += 1;
        }
        self.base_scores = counts
            .iter()
            .map(|&c| ((c as f64) / (n as f64)).max(1e-12).ln())
            .collect();
        self.n_features = x.ncols();
        self.rounds = Vec::with_capacity(self.config.n_rounds);

        let mut stats = SplitStats::new(x.ncols());

        // A single class has nothing to separate.
        if k > 1 {
            let data = BinnedMatrix::new(x);
            let params = self.config.tree_params();
            let base = ArrayView1::from(self.base_scores.as_slice());
            let mut scores: Array2<f64> = Array2::zeros((n, k));
            scores.rows_mut().into_iter().for_each(|mut row| row.assign(&base));
            let mut grad = vec![0.0; n];
            let mut hess = vec![0.0; n];

            for round in 0..self.config.n_rounds {
                let probs = softmax_rows(scores.view());
                let mut trees = Vec::with_capacity(k);

                for class in 0..k {
                    for i in 0..n {
                        let p = probs[[i, class]];
                        let target = if y[i] == class { 1.0 } else { 0.0 };
                        grad[i] = p - target;
                        hess[i] = (2.0 * p * (1.0 - p)).max(1e-16);
                    }
                    trees.push(RegressionTree::fit(&data, &grad, &hess, &params, &mut stats));
                }

                for (row, mut score) in x.rows().into_iter().zip(scores.rows_mut()) {
                    for (s, tree) in score.iter_mut().zip(&trees) {
                        *s += tree.predict(row);
                    }
                }
                self.rounds.push(trees);

                if (round + 1) % 10 == 0 {
                    log::debug!(
                        "Boosting round {}/{}: log loss {:.5}",
                        round + 1,
                        self.config.n_rounds,
                        log_loss(scores.view(), y)
                    );
                }
            }
        }

        self.importances = stats.importances();

        Ok(())
    }

    fn predict_proba(&self, row: ArrayView1<'_, f64>) -> Array1<f64> {
        softmax(self.raw_scores(row).view())
    }

    fn feature_importances(&self) -> Array1<f64> {
        Array1::from(self.importances.clone())
    }
}

fn softmax(scores: ArrayView1<'_, f64>) -> Array1<f64> {
    let max = scores.iter().copied().fold(f64::NEG_INFINITY, f64::max);
    let exp = scores.mapv(|s| (s - max).exp());
    let sum = exp.sum();
    exp / sum
}

fn softmax_rows(scores: ArrayView2<'_, f64>) -> Array2<f64> {
    let mut probs = scores.to_owned();
    for mut row in probs.axis_iter_mut(Axis(0)) {
        let p = softmax(row.view());
        row.assign(&p);
    }
    probs
}

#[allow(clippy::cast_precision_loss)]
fn log_loss(scores: ArrayView2<'_, f64>, y: &[usize]) -> f64 {
    let total: f64 = scores
        .rows()
        .into_iter()
        .zip(y)
        .map(|(s, &c)| -softmax(s)[c].max(1e-15).ln())
        .sum();
    total / y.len() as f64
}

#[cfg(test)]
mod tests {
    use super::*;
    use ndarray::array;

    /// Class is determined by which indicator is set; hour is noise.
    fn separable() -> (Array2<f64>, Vec<usize>) {
        let mut x = Array2::zeros((30, 4));
        let mut y = Vec::new();
        for i in 0..30u32 {
            let class = (i % 3) as usize;
            let row = i as usize;
            x[[row, class]] = 1.0;
            x[[row, 3]] = f64::from(i % 24 + 1);
            y.push(class);
        }
        (x, y)
    }

    fn fitted() -> GradientBoostedClassifier {
        let (x, y) = separable();
        let mut model = GradientBoostedClassifier::new(BoostingConfig {
            n_rounds: 20,
            ..BoostingConfig::default()
        });
        model.fit(x.view(), &y, 3).unwrap();
        model
    }

    #[test]
    fn learns_separable_classes() {
        let model = fitted();
        assert_eq!(model.n_rounds(), 20);
        assert_eq!(model.predict(array![1.0, 0.0, 0.0, 5.0].view()), 0);
        assert_eq!(model.predict(array![0.0, 1.0, 0.0, 5.0].view()), 1);
        assert_eq!(model.predict(array![0.0, 0.0, 1.0, 5.0].view()), 2);
    }

    #[test]
    fn probabilities_sum_to_one() {
        let model = fitted();
        for row in [
            array![1.0, 0.0, 0.0, 0.0],
            array![0.0, 0.0, 0.0, 0.0],
            array![0.0, 0.0, 1.0, 23.0],
        ] {
            let probs = model.predict_proba(row.view());
            assert_eq!(probs.len(), 3);
            assert!((probs.sum() - 1.0).abs() < 1e-9);
            assert!(probs.iter().all(|p| (0.0..=1.0).contains(p)));
        }
    }

    #[test]
    fn importances_favor_indicators() {
        let importances = fitted().feature_importances();
        assert_eq!(importances.len(), 4);
        assert!((importances.sum() - 1.0).abs() < 1e-9);
        let indicator_share: f64 = importances.iter().take(3).sum();
        assert!(indicator_share > importances[3]);
    }

    #[test]
    fn single_class_is_certain() {
        let x = array![[1.0], [0.0]];
        let mut model = GradientBoostedClassifier::default();
        model.fit(x.view(), &[0, 0], 1).unwrap();
        assert_eq!(model.predict_proba(array![0.0].view()), array![1.0]);
        assert_eq!(model.feature_importances(), array![0.0]);
    }

    #[test]
    fn rejects_mismatched_labels() {
        let (x, _) = separable();
        let mut model = GradientBoostedClassifier::default();
        assert!(matches!(
            model.fit(x.view(), &[0, 1], 3),
            Err(ModelError::Shape { .. })
        ));
        assert!(matches!(
            model.fit(Array2::<f64>::zeros((0, 4)).view(), &[], 3),
            Err(ModelError::NoData)
        ));
    }
}
