//! Isolation forest (Liu et al. 2008) over standardized vectors.
//!
//! Each tree isolates a random subsample by axis-aligned random splits; points
//! that are isolated in few splits are anomalous. With the classic anomaly score
//! `s(x) = 2^(-E[h(x)] / c(psi))`, `score_samples` reports `1 - 2 s(x)`: zero where
//! `s = 0.5`, positive for normal points, approaching -1 for clear outliers.
//! The internal boundary (`offset`) is the `contamination` percentile of the
//! training scores.

use super::{AnomalyModel, Label};
use crate::error::TrainError;
use ndarray::ArrayView2;
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use serde::{Deserialize, Serialize};

const EULER_GAMMA: f64 = 0.577_215_664_901_532_9;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct IsolationForestParams {
    pub n_estimators: usize,
    pub max_samples: usize,
    pub contamination: f64,
    pub seed: u64,
}

impl Default for IsolationForestParams {
    fn default() -> Self {
        Self {
            n_estimators: 100,
            max_samples: 256,
            contamination: 0.1,
            seed: 42,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
enum Node {
    Leaf {
        size: usize,
    },
    Split {
        feature: usize,
        threshold: f64,
        left: Box<Node>,
        right: Box<Node>,
    },
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct IsolationForest {
    params: IsolationForestParams,
    trees: Vec<Node>,
    /// Subsample size actually used per tree
    sample_size: usize,
    n_features: usize,
    offset: f64,
}

/// Average path length of an unsuccessful BST search over `n` points.
fn average_path_length(n: usize) -> f64 {
    match n {
        0 | 1 => 0.0,
        2 => 1.0,
        _ => {
            let n = n as f64;
            2.0 * ((n - 1.0).ln() + EULER_GAMMA) - 2.0 * (n - 1.0) / n
        }
    }
}

/// Linear-interpolated percentile, `q` in [0, 1].
fn percentile(sorted: &[f64], q: f64) -> f64 {
    if sorted.is_empty() {
        return 0.0;
    }
    let pos = q.clamp(0.0, 1.0) * (sorted.len() - 1) as f64;
    let lo = pos.floor() as usize;
    let hi = pos.ceil() as usize;
    sorted[lo] + (sorted[hi] - sorted[lo]) * (pos - lo as f64)
}

impl IsolationForest {
    pub fn new(params: IsolationForestParams) -> Self {
        Self {
            params,
            trees: Vec::new(),
            sample_size: 0,
            n_features: 0,
            offset: 0.0,
        }
    }

    pub fn params(&self) -> &IsolationForestParams {
        &self.params
    }

    pub fn offset(&self) -> f64 {
        self.offset
    }

    pub fn is_fitted(&self) -> bool {
        !self.trees.is_empty()
    }

    fn build_tree(
        x: &ArrayView2<'_, f64>,
        idx: Vec<usize>,
        depth: usize,
        height_limit: usize,
        rng: &mut StdRng,
    ) -> Node {
        let size = idx.len();
        if size <= 1 || depth >= height_limit {
            return Node::Leaf { size };
        }

        // Only features that still vary within this node can split it.
        let candidates: Vec<(usize, f64, f64)> = (0..x.ncols())
            .filter_map(|f| {
                let (lo, hi) = idx.iter().fold((f64::INFINITY, f64::NEG_INFINITY), |(lo, hi), &i| {
                    let v = x[[i, f]];
                    (lo.min(v), hi.max(v))
                });
                (hi > lo).then_some((f, lo, hi))
            })
            .collect();
        if candidates.is_empty() {
            return Node::Leaf { size };
        }

        let (feature, lo, hi) = candidates[rng.gen_range(0..candidates.len())];
        let threshold = lo + rng.gen::<f64>() * (hi - lo);
        let (left, right): (Vec<usize>, Vec<usize>) =
            idx.into_iter().partition(|&i| x[[i, feature]] <= threshold);
        if left.is_empty() || right.is_empty() {
            return Node::Leaf { size };
        }

        Node::Split {
            feature,
            threshold,
            left: Box::new(Self::build_tree(x, left, depth + 1, height_limit, rng)),
            right: Box::new(Self::build_tree(x, right, depth + 1, height_limit, rng)),
        }
    }

    fn path_length(tree: &Node, x: &[f64]) -> f64 {
        let mut node = tree;
        let mut depth = 0.0;
        loop {
            match node {
                Node::Leaf { size } => return depth + average_path_length(*size),
                Node::Split {
                    feature,
                    threshold,
                    left,
                    right,
                } => {
                    node = if x[*feature] <= *threshold { left.as_ref() } else { right.as_ref() };
                    depth += 1.0;
                }
            }
        }
    }

    /// Liu et al. anomaly score in (0, 1]; near 1 is anomalous.
    fn anomaly_score(&self, x: &[f64]) -> f64 {
        let mean_path =
            self.trees.iter().map(|t| Self::path_length(t, x)).sum::<f64>() / self.trees.len() as f64;
        let c = average_path_length(self.sample_size);
        2f64.powf(-mean_path / c)
    }
}

impl Default for IsolationForest {
    fn default() -> Self {
        Self::new(IsolationForestParams::default())
    }
}

impl AnomalyModel for IsolationForest {
    fn fit(&mut self, x: ArrayView2<'_, f64>) -> Result<(), TrainError> {
        let (n, d) = x.dim();
        if n < 2 || d == 0 {
            return Err(TrainError::Fit(format!(
                "isolation forest needs at least 2 rows and 1 column, got {}x{}",
                n, d
            )));
        }
        if x.iter().any(|v| !v.is_finite()) {
            return Err(TrainError::Fit("training matrix contains non-finite values".to_string()));
        }
        if self.params.n_estimators == 0 {
            return Err(TrainError::Fit("n_estimators must be positive".to_string()));
        }

        let sample_size = self.params.max_samples.clamp(2, n);
        let height_limit = (sample_size as f64).log2().ceil() as usize;
        let mut rng = StdRng::seed_from_u64(self.params.seed);

        let trees = (0..self.params.n_estimators)
            .map(|_| {
                let idx = rand::seq::index::sample(&mut rng, n, sample_size).into_vec();
                Self::build_tree(&x, idx, 0, height_limit, &mut rng)
            })
            .collect();

        self.trees = trees;
        self.sample_size = sample_size;
        self.n_features = d;

        let mut scores: Vec<f64> = x
            .rows()
            .into_iter()
            .map(|row| match row.as_slice() {
                Some(s) => self.score_samples(s),
                None => self.score_samples(&row.to_vec()),
            })
            .collect();
        scores.sort_by(f64::total_cmp);
        self.offset = percentile(&scores, self.params.contamination);
        Ok(())
    }

    /// `1 - 2 s(x)`. How low a far outlier can go is bounded by the training
    /// batch: it lands in the same leaves as the batch's extreme rows, so on
    /// low-diversity or discretised batches (few distinct values per feature)
    /// clear outliers bottom out near -0.25 instead of -0.4. A fixed
    /// `anomaly_threshold` below that never fires there and `predict` carries
    /// the decision alone.
    fn score_samples(&self, x: &[f64]) -> f64 {
        if self.trees.is_empty() {
            return 0.0;
        }
        1.0 - 2.0 * self.anomaly_score(x)
    }

    fn predict(&self, x: &[f64]) -> Label {
        if self.score_samples(x) < self.offset {
            Label::Outlier
        } else {
            Label::Normal
        }
    }

    fn n_features(&self) -> usize {
        self.n_features
    }

    fn name(&self) -> &str {
        "isolation_forest"
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use ndarray::Array2;
    use rand::Rng;

    fn cluster(n: usize, d: usize, seed: u64) -> Array2<f64> {
        let mut rng = StdRng::seed_from_u64(seed);
        Array2::from_shape_fn((n, d), |_| rng.gen_range(-1.0..1.0))
    }

    #[test]
    fn average_path_length_matches_reference_values() {
        assert_eq!(average_path_length(1), 0.0);
        assert_eq!(average_path_length(2), 1.0);
        assert!((average_path_length(256) - 10.244_770_920_119_917).abs() < 1e-9);
    }

    #[test]
    fn percentile_interpolates() {
        let s = [1.0, 2.0, 3.0, 4.0, 5.0];
        assert_eq!(percentile(&s, 0.0), 1.0);
        assert_eq!(percentile(&s, 0.5), 3.0);
        assert!((percentile(&s, 0.1) - 1.4).abs() < 1e-12);
    }

    #[test]
    fn outlier_scores_below_inlier() {
        let x = cluster(200, 4, 1);
        let mut forest = IsolationForest::default();
        forest.fit(x.view()).unwrap();
        let inlier = forest.score_samples(&[0.0, 0.0, 0.0, 0.0]);
        let outlier = forest.score_samples(&[8.0, 8.0, 8.0, 8.0]);
        assert!(outlier < inlier);
        assert_eq!(forest.predict(&[8.0, 8.0, 8.0, 8.0]), Label::Outlier);
        assert_eq!(forest.predict(&[0.0, 0.0, 0.0, 0.0]), Label::Normal);
    }

    #[test]
    fn contamination_sets_training_outlier_fraction() {
        let x = cluster(100, 3, 2);
        let mut forest = IsolationForest::default();
        forest.fit(x.view()).unwrap();
        let flagged = x
            .rows()
            .into_iter()
            .filter(|r| forest.predict(&r.to_vec()) == Label::Outlier)
            .count();
        // strict `<` against an interpolated percentile: at most ~10% of rows
        assert!(flagged <= 10, "flagged {}", flagged);
        assert!(flagged >= 5, "flagged {}", flagged);
    }

    #[test]
    fn same_seed_is_reproducible() {
        let x = cluster(100, 5, 3);
        let mut a = IsolationForest::default();
        let mut b = IsolationForest::default();
        a.fit(x.view()).unwrap();
        b.fit(x.view()).unwrap();
        assert_eq!(a, b);
        let query = [0.3, -0.2, 0.9, 0.0, 0.1];
        assert_eq!(a.score_samples(&query).to_bits(), b.score_samples(&query).to_bits());
    }

    #[test]
    fn constant_matrix_fits_without_splits() {
        let x = Array2::from_elem((10, 3), 1.0);
        let mut forest = IsolationForest::default();
        forest.fit(x.view()).unwrap();
        let score = forest.score_samples(&[1.0, 1.0, 1.0]);
        assert!(score.is_finite());
    }

    #[test]
    fn rejects_degenerate_input() {
        let mut forest = IsolationForest::default();
        assert!(forest.fit(Array2::<f64>::zeros((1, 3)).view()).is_err());
        let mut bad = cluster(10, 2, 4);
        bad[[3, 1]] = f64::NAN;
        assert!(forest.fit(bad.view()).is_err());
        assert!(!forest.is_fitted());
    }
}
