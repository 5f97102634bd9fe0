//! Isolation forest.
//!
//! Anomalies are isolated by fewer random axis-aligned splits than normal
//! points, so their average path length across the forest is short.

use super::{AnomalyError, AnomalyResult, MultivariateDetector};
use ndarray::{Array1, Array2, ArrayView1};
use rand::prelude::*;

/// Scores above this are anomalous.
pub const SCORE_THRESHOLD: f64 = 0.5;

const EULER_GAMMA: f64 = 0.577_215_664_9;

#[derive(Debug, Clone)]
enum IsolationNode {
    Internal {
        feature: usize,
        threshold: f64,
        left: Box<IsolationNode>,
        right: Box<IsolationNode>,
    },
    Leaf {
        size: usize,
    },
}

#[derive(Debug, Clone)]
struct IsolationTree {
    root: IsolationNode,
}

impl IsolationTree {
    fn build(data: &Array2<f64>, max_depth: usize, rng: &mut impl Rng) -> Self {
        Self {
            root: Self::build_node(data, 0, max_depth, rng),
        }
    }

    fn build_node(
        data: &Array2<f64>,
        depth: usize,
        max_depth: usize,
        rng: &mut impl Rng,
    ) -> IsolationNode {
        let n_samples = data.nrows();
        let n_features = data.ncols();

        if depth >= max_depth || n_samples <= 1 {
            return IsolationNode::Leaf { size: n_samples };
        }

        let feature = rng.gen_range(0..n_features);
        let col = data.column(feature);
        let min_val = col.iter().cloned().fold(f64::INFINITY, f64::min);
        let max_val = col.iter().cloned().fold(f64::NEG_INFINITY, f64::max);

        if (max_val - min_val).abs() < 1e-10 {
            return IsolationNode::Leaf { size: n_samples };
        }

        let threshold = rng.gen_range(min_val..max_val);
        let (left_idx, right_idx): (Vec<usize>, Vec<usize>) =
            (0..n_samples).partition(|&i| data[[i, feature]] < threshold);

        if left_idx.is_empty() || right_idx.is_empty() {
            return IsolationNode::Leaf { size: n_samples };
        }

        let left = Self::build_node(&select_rows(data, &left_idx), depth + 1, max_depth, rng);
        let right = Self::build_node(&select_rows(data, &right_idx), depth + 1, max_depth, rng);

        IsolationNode::Internal {
            feature,
            threshold,
            left: Box::new(left),
            right: Box::new(right),
        }
    }

    fn path_length(&self, sample: ArrayView1<f64>) -> f64 {
        let mut node = &self.root;
        let mut depth = 0usize;
        loop {
            match node {
                IsolationNode::Leaf { size } => return depth as f64 + average_path_length(*size),
                IsolationNode::Internal {
                    feature,
                    threshold,
                    left,
                    right,
                } => {
                    node = if sample[*feature] < *threshold { left } else { right };
                    depth += 1;
                }
            }
        }
    }
}

fn select_rows(data: &Array2<f64>, rows: &[usize]) -> Array2<f64> {
    Array2::from_shape_fn((rows.len(), data.ncols()), |(i, j)| data[[rows[i], j]])
}

/// Average path length of an unsuccessful BST search over `n` points.
pub fn average_path_length(n: usize) -> f64 {
    match n {
        0 | 1 => 0.0,
        2 => 1.0,
        _ => {
            let n = n as f64;
            2.0 * ((n - 1.0).ln() + EULER_GAMMA) - 2.0 * (n - 1.0) / n
        }
    }
}

#[derive(Debug, Clone)]
pub struct IsolationForest {
    pub n_estimators: usize,
    pub max_samples: usize,
    pub seed: u64,
    sample_size: usize,
    n_features: usize,
    trees: Vec<IsolationTree>,
}

impl IsolationForest {
    pub fn new(n_estimators: usize, seed: u64) -> Self {
        Self {
            n_estimators,
            max_samples: 256,
            seed,
            sample_size: 0,
            n_features: 0,
            trees: Vec::new(),
        }
    }

    /// Sub-sample size used by the last fit.
    pub fn sample_size(&self) -> usize {
        self.sample_size
    }

    /// `2^(-E[h(x)] / c(ψ))` for every row; higher is more anomalous.
    pub fn score_samples(&self, data: &Array2<f64>) -> Result<Array1<f64>, AnomalyError> {
        if self.trees.is_empty() {
            return Err(AnomalyError::NotFitted);
        }
        if data.ncols() != self.n_features {
            return Err(AnomalyError::DimensionMismatch {
                expected: self.n_features,
                actual: data.ncols(),
            });
        }

        let c = average_path_length(self.sample_size);
        let scores = data
            .rows()
            .into_iter()
            .map(|row| {
                if c <= 0.0 {
                    return SCORE_THRESHOLD;
                }
                let mean_path = self.trees.iter().map(|t| t.path_length(row)).sum::<f64>()
                    / self.trees.len() as f64;
                2f64.powf(-mean_path / c)
            })
            .collect();
        Ok(scores)
    }
}

impl MultivariateDetector for IsolationForest {
    fn fit(&mut self, data: &Array2<f64>) -> Result<(), AnomalyError> {
        let n_samples = data.nrows();
        if n_samples == 0 || data.ncols() == 0 {
            return Err(AnomalyError::EmptyData);
        }

        let sample_size = self.max_samples.min(n_samples);
        let max_depth = (sample_size as f64).log2().ceil() as usize;
        let mut rng = StdRng::seed_from_u64(self.seed);

        self.trees = (0..self.n_estimators)
            .map(|_| {
                let indices = (0..n_samples).choose_multiple(&mut rng, sample_size);
                IsolationTree::build(&select_rows(data, &indices), max_depth, &mut rng)
            })
            .collect();
        self.sample_size = sample_size;
        self.n_features = data.ncols();
        Ok(())
    }

    fn detect(&self, data: &Array2<f64>) -> Result<AnomalyResult, AnomalyError> {
        let scores = self.score_samples(data)?;
        let is_anomaly = scores.iter().map(|&s| s > SCORE_THRESHOLD).collect();
        Ok(AnomalyResult::new(is_anomaly, scores.to_vec()))
    }

    fn name(&self) -> &str {
        "IsolationForest"
    }
}
