//! One-class SVM with an RBF kernel, solved by sequential minimal
//! optimization.
//!
//! The dual problem is
//!
//! ```text
//! min ½ αᵀKα   s.t.  0 ≤ αᵢ ≤ 1/(νn),  Σαᵢ = 1
//! ```
//!
//! and the decision value of `x` is `Σ αᵢ K(xᵢ, x) − ρ`. Only points with a
//! positive decision value are inside the learned support; a point exactly
//! on the boundary is an outlier, as in libsvm.

use super::{AnomalyError, AnomalyResult, MultivariateDetector};
use ndarray::{Array2, ArrayView1};

pub const DEFAULT_MAX_ITERATIONS: usize = 100_000;
pub const DEFAULT_TOLERANCE: f64 = 1e-6;

const MIN_CURVATURE: f64 = 1e-12;

fn rbf(a: ArrayView1<f64>, b: ArrayView1<f64>, gamma: f64) -> f64 {
    let dist2: f64 = a.iter().zip(b.iter()).map(|(x, y)| (x - y).powi(2)).sum();
    (-gamma * dist2).exp()
}

/// `1 / (d · Var(X))` over every element of the matrix; 1.0 for a constant
/// matrix.
pub fn scale_gamma(data: &Array2<f64>) -> f64 {
    let n = data.len() as f64;
    let mean = data.sum() / n;
    let var = data.iter().map(|x| (x - mean).powi(2)).sum::<f64>() / n;
    if var > 0.0 && var.is_finite() {
        1.0 / (data.ncols() as f64 * var)
    } else {
        1.0
    }
}

#[derive(Debug, Clone)]
struct SvmModel {
    support: Array2<f64>,
    alpha: Vec<f64>,
    rho: f64,
    gamma: f64,
}

impl SvmModel {
    fn decision(&self, x: ArrayView1<f64>) -> f64 {
        self.support
            .rows()
            .into_iter()
            .zip(&self.alpha)
            .filter(|(_, a)| **a > 0.0)
            .map(|(sv, a)| a * rbf(sv, x, self.gamma))
            .sum::<f64>()
            - self.rho
    }
}

#[derive(Debug, Clone)]
pub struct OneClassSvm {
    pub nu: f64,
    pub max_iterations: usize,
    pub tolerance: f64,
    model: Option<SvmModel>,
    iterations: usize,
}

impl OneClassSvm {
    pub fn new(nu: f64) -> Self {
        Self {
            nu,
            max_iterations: DEFAULT_MAX_ITERATIONS,
            tolerance: DEFAULT_TOLERANCE,
            model: None,
            iterations: 0,
        }
    }

    pub fn with_max_iterations(mut self, max_iterations: usize) -> Self {
        self.max_iterations = max_iterations;
        self
    }

    /// SMO steps taken by the last fit.
    pub fn iterations(&self) -> usize {
        self.iterations
    }

    pub fn rho(&self) -> Option<f64> {
        self.model.as_ref().map(|m| m.rho)
    }

    pub fn decision_function(&self, data: &Array2<f64>) -> Result<Vec<f64>, AnomalyError> {
        let model = self.model.as_ref().ok_or(AnomalyError::NotFitted)?;
        if data.ncols() != model.support.ncols() {
            return Err(AnomalyError::DimensionMismatch {
                expected: model.support.ncols(),
                actual: data.ncols(),
            });
        }
        Ok(data.rows().into_iter().map(|x| model.decision(x)).collect())
    }

    fn solve(&self, kernel: &Array2<f64>) -> Result<(Vec<f64>, f64, usize), AnomalyError> {
        let n = kernel.nrows();
        let upper = 1.0 / (self.nu * n as f64);

        // Feasible start: the first floor(νn) multipliers at the bound, the
        // remainder on the next one.
        let mut alpha = vec![0.0; n];
        let at_bound = ((self.nu * n as f64).floor() as usize).min(n);
        for a in alpha.iter_mut().take(at_bound) {
            *a = upper;
        }
        if at_bound < n {
            alpha[at_bound] = (1.0 - at_bound as f64 * upper).max(0.0);
        }

        let mut grad: Vec<f64> = (0..n)
            .map(|t| (0..n).map(|s| kernel[[t, s]] * alpha[s]).sum())
            .collect();

        let mut iterations = 0;
        loop {
            let up = (0..n)
                .filter(|&t| alpha[t] < upper)
                .min_by(|&a, &b| grad[a].total_cmp(&grad[b]));
            let down = (0..n)
                .filter(|&t| alpha[t] > 0.0)
                .max_by(|&a, &b| grad[a].total_cmp(&grad[b]));

            let (i, j) = match (up, down) {
                (Some(i), Some(j)) if grad[j] - grad[i] >= self.tolerance => (i, j),
                _ => break,
            };

            if iterations >= self.max_iterations {
                return Err(AnomalyError::ConvergenceFailed(iterations));
            }
            iterations += 1;

            let curvature =
                (kernel[[i, i]] + kernel[[j, j]] - 2.0 * kernel[[i, j]]).max(MIN_CURVATURE);
            let delta = ((grad[j] - grad[i]) / curvature)
                .min(upper - alpha[i])
                .min(alpha[j]);

            alpha[i] += delta;
            alpha[j] -= delta;
            // Snap to the box so the bound checks above stay exact.
            if upper - alpha[i] < 1e-15 {
                alpha[i] = upper;
            }
            if alpha[j] < 1e-15 {
                alpha[j] = 0.0;
            }

            for (t, g) in grad.iter_mut().enumerate() {
                *g += delta * (kernel[[t, i]] - kernel[[t, j]]);
            }
        }

        Ok((alpha.clone(), Self::offset(&alpha, &grad, upper), iterations))
    }

    /// ρ from the KKT conditions: the mean gradient over free multipliers,
    /// else the midpoint of the feasible interval.
    fn offset(alpha: &[f64], grad: &[f64], upper: f64) -> f64 {
        let free: Vec<f64> = alpha
            .iter()
            .zip(grad)
            .filter(|(a, _)| **a > 0.0 && **a < upper)
            .map(|(_, g)| *g)
            .collect();
        if !free.is_empty() {
            return free.iter().sum::<f64>() / free.len() as f64;
        }

        // α = C needs G ≤ ρ, α = 0 needs G ≥ ρ.
        let lower = alpha
            .iter()
            .zip(grad)
            .filter(|(a, _)| **a >= upper)
            .map(|(_, g)| *g)
            .fold(f64::NEG_INFINITY, f64::max);
        let high = alpha
            .iter()
            .zip(grad)
            .filter(|(a, _)| **a <= 0.0)
            .map(|(_, g)| *g)
            .fold(f64::INFINITY, f64::min);
        match (lower.is_finite(), high.is_finite()) {
            (true, true) => (lower + high) / 2.0,
            (true, false) => lower,
            (false, true) => high,
            (false, false) => 0.0,
        }
    }
}

impl MultivariateDetector for OneClassSvm {
    fn fit(&mut self, data: &Array2<f64>) -> Result<(), AnomalyError> {
        let n = data.nrows();
        if n == 0 || data.ncols() == 0 {
            return Err(AnomalyError::EmptyData);
        }
        if !(self.nu > 0.0 && self.nu <= 1.0) {
            return Err(AnomalyError::InvalidParameter(format!("nu = {}", self.nu)));
        }

        let gamma = scale_gamma(data);
        let kernel = Array2::from_shape_fn((n, n), |(i, j)| rbf(data.row(i), data.row(j), gamma));
        let (alpha, rho, iterations) = self.solve(&kernel)?;

        self.iterations = iterations;
        self.model = Some(SvmModel {
            support: data.clone(),
            alpha,
            rho,
            gamma,
        });
        Ok(())
    }

    fn detect(&self, data: &Array2<f64>) -> Result<AnomalyResult, AnomalyError> {
        let decision = self.decision_function(data)?;
        let is_anomaly = decision.iter().map(|&d| d <= 0.0).collect();
        Ok(AnomalyResult::new(is_anomaly, decision))
    }

    fn name(&self) -> &str {
        "OneClassSVM"
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use ndarray::array;
    use rand::prelude::*;

    fn cluster_with_outlier() -> Array2<f64> {
        let mut rng = StdRng::seed_from_u64(3);
        let n = 20;
        let mut data = Array2::zeros((n + 1, 2));
        for i in 0..n {
            data[[i, 0]] = rng.gen_range(-0.1..0.1);
            data[[i, 1]] = rng.gen_range(-0.1..0.1);
        }
        data[[n, 0]] = 10.0;
        data[[n, 1]] = 10.0;
        data
    }

    #[test]
    fn test_far_point_is_outside_support() {
        let data = cluster_with_outlier();
        let mut svm = OneClassSvm::new(0.1);
        svm.fit(&data).unwrap();
        let result = svm.detect(&data).unwrap();

        assert!(result.is_anomaly[20]);
        assert!(result.scores[20] < 0.0);
        assert!(result.anomaly_count() < 10);
    }

    #[test]
    fn test_points_on_boundary_are_outliers() {
        // Identical rows: K = 1 everywhere, ρ = 1, so every decision is 0.
        let data = Array2::from_elem((10, 3), 0.5);
        let mut svm = OneClassSvm::new(0.1);
        svm.fit(&data).unwrap();
        assert_eq!(svm.iterations(), 0);

        let result = svm.detect(&data).unwrap();
        assert!(result.scores.iter().all(|&d| d == 0.0));
        assert_eq!(result.anomaly_count(), 10);
    }

    #[test]
    fn test_iteration_cap_is_reported() {
        let data = cluster_with_outlier();
        let mut svm = OneClassSvm::new(0.1).with_max_iterations(0);
        assert!(matches!(svm.fit(&data), Err(AnomalyError::ConvergenceFailed(0))));
        assert!(svm.rho().is_none());
    }

    #[test]
    fn test_invalid_nu_rejected() {
        let mut svm = OneClassSvm::new(0.0);
        assert!(matches!(
            svm.fit(&array![[1.0, 2.0], [3.0, 4.0]]),
            Err(AnomalyError::InvalidParameter(_))
        ));
    }

    #[test]
    fn test_scale_gamma() {
        let data = array![[0.0, 2.0], [2.0, 0.0]];
        // population variance of {0, 2, 2, 0} is 1
        assert!((scale_gamma(&data) - 0.5).abs() < 1e-12);
        assert_eq!(scale_gamma(&Array2::from_elem((3, 3), 1.0)), 1.0);
    }
}
