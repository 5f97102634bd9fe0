//! Descriptive statistics shared by the threshold models.
//!
//! All functions return `None` instead of NaN when the statistic is not
//! defined for the input, so callers cannot mistake a missing value for a
//! number.

use statrs::statistics::Statistics;

/// Arithmetic mean.
pub fn mean(values: &[f64]) -> Option<f64> {
    if values.is_empty() {
        return None;
    }
    finite(values.iter().mean())
}

/// Sample standard deviation (n − 1 denominator).
pub fn sample_std(values: &[f64]) -> Option<f64> {
    if values.len() < 2 {
        return None;
    }
    finite(values.iter().std_dev())
}

/// Sample variance (n − 1 denominator).
pub fn sample_variance(values: &[f64]) -> Option<f64> {
    if values.len() < 2 {
        return None;
    }
    finite(values.iter().variance())
}

/// Percentile `p` in [0, 100] with linear interpolation between order
/// statistics: position `h = (n − 1) · p / 100`.
///
/// # Examples
///
/// ```
/// use fx_threshold_engine::volatility::stats::percentile;
///
/// let v = [1.0, 2.0, 3.0, 4.0, 5.0];
/// assert_eq!(percentile(&v, 50.0), Some(3.0));
/// assert!((percentile(&v, 95.0).unwrap() - 4.8).abs() < 1e-12);
/// ```
pub fn percentile(values: &[f64], p: f64) -> Option<f64> {
    if values.is_empty() || !(0.0..=100.0).contains(&p) {
        return None;
    }
    let mut sorted = values.to_vec();
    sorted.sort_by(|a, b| a.total_cmp(b));

    let h = (sorted.len() - 1) as f64 * p / 100.0;
    let lo = h.floor() as usize;
    let hi = (lo + 1).min(sorted.len() - 1);
    let frac = h - lo as f64;
    finite(sorted[lo] + frac * (sorted[hi] - sorted[lo]))
}

/// Biased Fisher-Pearson skewness coefficient g1 = m3 / m2^1.5.
pub fn skewness(values: &[f64]) -> Option<f64> {
    let (m2, m3, _) = central_moments(values)?;
    finite(m3 / m2.powf(1.5))
}

/// Biased excess kurtosis g2 = m4 / m2² − 3 (zero for a normal sample).
pub fn excess_kurtosis(values: &[f64]) -> Option<f64> {
    let (m2, _, m4) = central_moments(values)?;
    finite(m4 / (m2 * m2) - 3.0)
}

/// Population central moments (m2, m3, m4); `None` when m2 is zero.
fn central_moments(values: &[f64]) -> Option<(f64, f64, f64)> {
    let mu = mean(values)?;
    let n = values.len() as f64;
    let (mut m2, mut m3, mut m4) = (0.0, 0.0, 0.0);
    for v in values {
        let d = v - mu;
        let d2 = d * d;
        m2 += d2;
        m3 += d2 * d;
        m4 += d2 * d2;
    }
    let (m2, m3, m4) = (m2 / n, m3 / n, m4 / n);
    if m2 == 0.0 || m2.sqrt() <= 1e-12 * mu.abs() {
        return None;
    }
    Some((m2, m3, m4))
}

fn finite(x: f64) -> Option<f64> {
    x.is_finite().then_some(x)
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    #[test]
    fn test_mean_and_std() {
        let v = [2.0, 4.0, 4.0, 4.0, 5.0, 5.0, 7.0, 9.0];
        assert_relative_eq!(mean(&v).unwrap(), 5.0);
        // sample variance = 32 / 7
        assert_relative_eq!(sample_variance(&v).unwrap(), 32.0 / 7.0, epsilon = 1e-12);
        assert_relative_eq!(sample_std(&v).unwrap(), (32.0f64 / 7.0).sqrt(), epsilon = 1e-12);
    }

    #[test]
    fn test_undefined_inputs() {
        assert_eq!(mean(&[]), None);
        assert_eq!(sample_std(&[1.0]), None);
        assert_eq!(percentile(&[], 50.0), None);
        assert_eq!(percentile(&[1.0], 101.0), None);
        assert_eq!(skewness(&[3.0, 3.0, 3.0]), None);
    }

    #[test]
    fn test_percentile_interpolates() {
        let v = [10.0, 0.0, 5.0];
        assert_eq!(percentile(&v, 0.0), Some(0.0));
        assert_eq!(percentile(&v, 100.0), Some(10.0));
        assert_relative_eq!(percentile(&v, 75.0).unwrap(), 7.5);
        assert_eq!(percentile(&[4.2], 95.0), Some(4.2));
    }

    #[test]
    fn test_skew_and_kurtosis_of_symmetric_sample() {
        let v = [-2.0, -1.0, 0.0, 1.0, 2.0];
        assert_relative_eq!(skewness(&v).unwrap(), 0.0, epsilon = 1e-12);
        // m2 = 2, m4 = 6.8 → 6.8 / 4 − 3 = −1.3
        assert_relative_eq!(excess_kurtosis(&v).unwrap(), -1.3, epsilon = 1e-12);
    }

    #[test]
    fn test_right_skewed_sample() {
        let v = [0.0, 0.0, 0.0, 0.0, 10.0];
        assert!(skewness(&v).unwrap() > 1.0);
    }
}
