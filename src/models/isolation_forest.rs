//! Isolation Forest implementation
//!
//! Anomalies are easier to isolate with random axis-aligned splits, so they
//! end up with shorter average path lengths across the ensemble.

use rand::rngs::StdRng;
use rand::seq::index;
use rand::{Rng, SeedableRng};

use crate::feature_extractor::FeatureMatrix;

/// Euler-Mascheroni constant
const EULER_GAMMA: f64 = 0.577_215_664_901_532_9;

/// Forest hyper-parameters
#[derive(Debug, Clone)]
pub struct ForestParams {
    /// Number of trees in the ensemble
    pub n_trees: usize,
    /// Upper bound on rows drawn per tree
    pub max_samples: usize,
    /// RNG seed; the same seed and data always yield the same forest
    pub seed: u64,
}

impl Default for ForestParams {
    fn default() -> Self {
        Self {
            n_trees: 200,
            max_samples: 256,
            seed: 42,
        }
    }
}

/// A fitted isolation forest. Immutable once built.
#[derive(Debug, Clone)]
pub struct IsolationForest {
    trees: Vec<IsolationTree>,
    /// Rows drawn per tree
    sample_size: usize,
    /// c(sample_size), the path-length normalizer
    avg_path_length: f64,
    n_features: usize,
}

impl IsolationForest {
    /// Fit a forest on every row of `data`
    pub fn fit(data: &FeatureMatrix, params: &ForestParams) -> Self {
        let n_rows = data.n_rows();
        let sample_size = params.max_samples.max(1).min(n_rows);
        let max_depth = if sample_size > 1 {
            (sample_size as f64).log2().ceil() as usize
        } else {
            0
        };

        let mut rng = StdRng::seed_from_u64(params.seed);
        let mut trees = Vec::with_capacity(params.n_trees);

        if n_rows > 0 {
            for _ in 0..params.n_trees {
                let sample = index::sample(&mut rng, n_rows, sample_size).into_vec();
                trees.push(IsolationTree::build(data, sample, max_depth, &mut rng));
            }
        }

        Self {
            trees,
            sample_size,
            avg_path_length: average_path_length(sample_size),
            n_features: data.n_cols(),
        }
    }

    /// Anomaly score of one row: `2^(-E[h(x)] / c(ψ))`, higher is more anomalous
    pub fn score_sample(&self, sample: &[f64]) -> f64 {
        if self.trees.is_empty() || self.avg_path_length == 0.0 {
            return 0.5;
        }

        let total_path_length: f64 = self
            .trees
            .iter()
            .map(|tree| tree.path_length(sample))
            .sum();
        let avg_path = total_path_length / self.trees.len() as f64;

        2.0_f64.powf(-avg_path / self.avg_path_length)
    }

    /// Score every row of a matrix
    pub fn score(&self, data: &FeatureMatrix) -> Vec<f64> {
        data.rows().iter().map(|row| self.score_sample(row)).collect()
    }

    pub fn n_trees(&self) -> usize {
        self.trees.len()
    }

    pub fn n_features(&self) -> usize {
        self.n_features
    }

    pub fn sample_size(&self) -> usize {
        self.sample_size
    }
}

/// Expected path length of an unsuccessful BST search over `n` points, c(n)
pub(crate) fn average_path_length(n: usize) -> f64 {
    match n {
        0 | 1 => 0.0,
        2 => 1.0,
        _ => {
            let n = n as f64;
            2.0 * ((n - 1.0).ln() + EULER_GAMMA) - 2.0 * (n - 1.0) / n
        }
    }
}

/// A single isolation tree
#[derive(Debug, Clone)]
struct IsolationTree {
    root: IsolationNode,
}

/// Node in an isolation tree
#[derive(Debug, Clone)]
enum IsolationNode {
    Internal {
        feature_idx: usize,
        split_value: f64,
        left: Box<IsolationNode>,
        right: Box<IsolationNode>,
    },
    Leaf {
        size: usize,
    },
}

impl IsolationTree {
    fn build(data: &FeatureMatrix, sample: Vec<usize>, max_depth: usize, rng: &mut StdRng) -> Self {
        Self {
            root: Self::build_node(data, sample, 0, max_depth, rng),
        }
    }

    fn build_node(
        data: &FeatureMatrix,
        sample: Vec<usize>,
        depth: usize,
        max_depth: usize,
        rng: &mut StdRng,
    ) -> IsolationNode {
        if depth >= max_depth || sample.len() <= 1 {
            return IsolationNode::Leaf { size: sample.len() };
        }

        // Only features that still vary inside this node can split it
        let candidates: Vec<(usize, f64, f64)> = (0..data.n_cols())
            .filter_map(|feature_idx| {
                let (min, max) = sample.iter().fold((f64::MAX, f64::MIN), |(lo, hi), &row| {
                    let v = data.row(row)[feature_idx];
                    (lo.min(v), hi.max(v))
                });
                (max > min).then_some((feature_idx, min, max))
            })
            .collect();

        if candidates.is_empty() {
            return IsolationNode::Leaf { size: sample.len() };
        }

        let (feature_idx, min, max) = candidates[rng.gen_range(0..candidates.len())];
        let split_value = rng.gen_range(min..max);

        let (left, right): (Vec<usize>, Vec<usize>) = sample
            .into_iter()
            .partition(|&row| data.row(row)[feature_idx] < split_value);

        IsolationNode::Internal {
            feature_idx,
            split_value,
            left: Box::new(Self::build_node(data, left, depth + 1, max_depth, rng)),
            right: Box::new(Self::build_node(data, right, depth + 1, max_depth, rng)),
        }
    }

    /// Depth at which `sample` lands, plus c(leaf size) for unsplit leaves
    fn path_length(&self, sample: &[f64]) -> f64 {
        let mut node = &self.root;
        let mut depth = 0usize;
        loop {
            match node {
                IsolationNode::Leaf { size } => {
                    return depth as f64 + average_path_length(*size);
                }
                IsolationNode::Internal {
                    feature_idx,
                    split_value,
                    left,
                    right,
                } => {
                    let val = sample.get(*feature_idx).copied().unwrap_or(0.0);
                    node = if val < *split_value { left } else { right };
                    depth += 1;
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn matrix(rows: Vec<Vec<f64>>) -> FeatureMatrix {
        let n_cols = rows.first().map(|r| r.len()).unwrap_or(0);
        FeatureMatrix::new(rows, n_cols)
    }

    fn small_params() -> ForestParams {
        ForestParams {
            n_trees: 50,
            max_samples: 64,
            seed: 7,
        }
    }

    #[test]
    fn test_average_path_length() {
        assert_eq!(average_path_length(0), 0.0);
        assert_eq!(average_path_length(1), 0.0);
        assert_eq!(average_path_length(2), 1.0);

        let c_10 = average_path_length(10);
        let c_100 = average_path_length(100);
        assert!(c_100 > c_10, "c(100)={} should be > c(10)={}", c_100, c_10);
    }

    #[test]
    fn test_forest_training() {
        let data = matrix((0..100).map(|i| vec![50.0 + (i % 10) as f64, 3.0]).collect());
        let forest = IsolationForest::fit(&data, &small_params());

        assert_eq!(forest.n_trees(), 50);
        assert_eq!(forest.sample_size(), 64);
        assert_eq!(forest.n_features(), 2);
    }

    #[test]
    fn test_outlier_scores_higher() {
        let mut rows: Vec<Vec<f64>> = (0..200)
            .map(|i| vec![50.0 + (i % 21) as f64 - 10.0, (i % 5) as f64])
            .collect();
        rows.push(vec![5000.0, 2.0]);
        let data = matrix(rows);

        let params = ForestParams {
            max_samples: 256,
            ..small_params()
        };
        let forest = IsolationForest::fit(&data, &params);
        let scores = forest.score(&data);

        let outlier = scores[200];
        let max_inlier = scores[..200].iter().cloned().fold(f64::MIN, f64::max);
        assert!(outlier > max_inlier, "outlier {} <= inlier {}", outlier, max_inlier);
        assert!(scores.iter().all(|s| (0.0..=1.0).contains(s)));
    }

    #[test]
    fn test_fixed_seed_is_reproducible() {
        let data = matrix((0..80).map(|i| vec![(i * 7 % 13) as f64, (i % 3) as f64]).collect());

        let a = IsolationForest::fit(&data, &small_params()).score(&data);
        let b = IsolationForest::fit(&data, &small_params()).score(&data);

        assert_eq!(a, b);
    }

    #[test]
    fn test_single_row_scores_neutral() {
        let data = matrix(vec![vec![10.0, 1.0]]);
        let forest = IsolationForest::fit(&data, &ForestParams::default());

        assert_eq!(forest.score_sample(&[10.0, 1.0]), 0.5);
    }

    #[test]
    fn test_constant_data_does_not_split() {
        let data = matrix(vec![vec![1.0, 1.0]; 20]);
        let forest = IsolationForest::fit(&data, &small_params());
        let scores = forest.score(&data);

        // every tree is a single leaf holding all rows: 2^(-c(n)/c(n))
        assert!(scores.iter().all(|s| (s - 0.5).abs() < 1e-12));
    }
}
