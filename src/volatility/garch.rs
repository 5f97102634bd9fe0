//! GARCH(1,1) estimation and one-step volatility forecasting.
//!
//! The model is
//!
//! ```text
//! r_t      = mu + e_t,   e_t ~ N(0, s2_t)
//! s2_t     = omega + alpha * e_{t-1}^2 + beta * s2_{t-1}
//! ```
//!
//! with `mu` the sample mean. `(omega, alpha, beta)` are estimated by
//! Gaussian maximum likelihood using a Nelder-Mead search over an
//! unconstrained reparametrization that keeps `omega > 0`, `alpha, beta >= 0`
//! and `alpha + beta < 1` for every candidate.

use crate::config::AnalysisConfig;
use crate::core::currency::CurrencyCode;
use crate::core::observation::ObservationSet;
use crate::core::outcome::{ModelOutput, SkipReason};
use crate::volatility::rolling::RollingSeries;
use crate::volatility::stats::{mean, sample_variance};
use log::{debug, info};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use thiserror::Error;

const MAX_PERSISTENCE: f64 = 0.999;
const LN_2PI: f64 = 1.837_877_066_409_345_5;

#[derive(Debug, Clone, PartialEq, Error)]
pub enum GarchError {
    #[error("insufficient data points: {0} < {1}")]
    InsufficientData(usize, usize),
    #[error("return series has zero or non-finite variance")]
    DegenerateVariance,
    #[error("likelihood did not converge after {0} iterations")]
    ConvergenceFailed(usize),
    #[error("numerical instability in likelihood")]
    NumericalInstability,
}

impl From<GarchError> for SkipReason {
    fn from(err: GarchError) -> Self {
        match err {
            GarchError::InsufficientData(available, required) => {
                SkipReason::InsufficientData { required, available }
            }
            GarchError::DegenerateVariance => SkipReason::DegenerateVariance,
            other => SkipReason::FitFailed {
                reason: other.to_string(),
            },
        }
    }
}

/// Estimated GARCH(1,1) parameters and the end state of the filter.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GarchFit {
    pub mu: f64,
    pub omega: f64,
    pub alpha: f64,
    pub beta: f64,
    pub log_likelihood: f64,
    pub iterations: usize,
    /// Conditional variance at the last observation.
    pub last_variance: f64,
    /// Residual at the last observation.
    pub last_residual: f64,
}

impl GarchFit {
    pub fn persistence(&self) -> f64 {
        self.alpha + self.beta
    }

    /// One-step-ahead conditional variance.
    pub fn forecast_variance(&self) -> f64 {
        self.omega
            + self.alpha * self.last_residual * self.last_residual
            + self.beta * self.last_variance
    }
}

/// GARCH(1,1) estimator.
#[derive(Debug, Clone, Copy)]
pub struct Garch11 {
    pub min_observations: usize,
    pub max_iterations: usize,
    pub tolerance: f64,
}

impl Default for Garch11 {
    fn default() -> Self {
        Self {
            min_observations: 100,
            max_iterations: 5_000,
            tolerance: 1e-10,
        }
    }
}

impl Garch11 {
    /// Fit the model to a chronologically ordered return series.
    pub fn fit(&self, returns: &[f64]) -> Result<GarchFit, GarchError> {
        if returns.len() < self.min_observations {
            return Err(GarchError::InsufficientData(
                returns.len(),
                self.min_observations,
            ));
        }
        if returns.iter().any(|r| !r.is_finite()) {
            return Err(GarchError::NumericalInstability);
        }
        let mu = mean(returns).ok_or(GarchError::NumericalInstability)?;
        let variance = match sample_variance(returns) {
            Some(v) if v > 0.0 => v,
            _ => return Err(GarchError::DegenerateVariance),
        };
        let residuals: Vec<f64> = returns.iter().map(|r| r - mu).collect();

        let objective = |theta: &[f64; 3]| {
            let (omega, alpha, beta) = transform(theta, variance);
            let nll = -log_likelihood(&residuals, omega, alpha, beta, variance).0;
            if nll.is_finite() {
                nll
            } else {
                f64::INFINITY
            }
        };

        let start = [
            (0.05f64).ln(),
            logit(0.95 / MAX_PERSISTENCE),
            logit(0.1 / 0.95),
        ];
        let (theta, best, iterations) =
            nelder_mead(objective, start, self.max_iterations, self.tolerance)
                .ok_or(GarchError::ConvergenceFailed(self.max_iterations))?;
        if !best.is_finite() {
            return Err(GarchError::NumericalInstability);
        }

        let (omega, alpha, beta) = transform(&theta, variance);
        let (ll, last_variance) = log_likelihood(&residuals, omega, alpha, beta, variance);
        if !ll.is_finite() || !last_variance.is_finite() {
            return Err(GarchError::NumericalInstability);
        }

        Ok(GarchFit {
            mu,
            omega,
            alpha,
            beta,
            log_likelihood: ll,
            iterations,
            last_variance,
            last_residual: residuals[residuals.len() - 1],
        })
    }
}

fn logistic(x: f64) -> f64 {
    1.0 / (1.0 + (-x).exp())
}

fn logit(p: f64) -> f64 {
    (p / (1.0 - p)).ln()
}

/// Map unconstrained search coordinates to valid `(omega, alpha, beta)`.
fn transform(theta: &[f64; 3], variance: f64) -> (f64, f64, f64) {
    let omega = variance * theta[0].exp();
    let persistence = MAX_PERSISTENCE * logistic(theta[1]);
    let alpha = persistence * logistic(theta[2]);
    (omega, alpha, persistence - alpha)
}

/// Gaussian log-likelihood and the final conditional variance.
///
/// The recursion is started from the sample variance.
fn log_likelihood(residuals: &[f64], omega: f64, alpha: f64, beta: f64, backcast: f64) -> (f64, f64) {
    let mut sigma2 = backcast;
    let mut ll = 0.0;
    for (t, e) in residuals.iter().enumerate() {
        if t > 0 {
            let prev = residuals[t - 1];
            sigma2 = omega + alpha * prev * prev + beta * sigma2;
        }
        if !(sigma2 > 0.0) {
            return (f64::NEG_INFINITY, sigma2);
        }
        ll -= 0.5 * (LN_2PI + sigma2.ln() + e * e / sigma2);
    }
    (ll, sigma2)
}

/// Minimize `f` with the Nelder-Mead simplex method.
///
/// Returns the best point, its value and the iterations used, or `None` if
/// the simplex values have not converged within `max_iterations`.
fn nelder_mead<F>(f: F, start: [f64; 3], max_iterations: usize, tolerance: f64) -> Option<([f64; 3], f64, usize)>
where
    F: Fn(&[f64; 3]) -> f64,
{
    const N: usize = 3;
    const STEP: f64 = 0.5;

    let mut simplex: Vec<([f64; 3], f64)> = Vec::with_capacity(N + 1);
    simplex.push((start, f(&start)));
    for i in 0..N {
        let mut p = start;
        p[i] += STEP;
        simplex.push((p, f(&p)));
    }

    for iteration in 0..max_iterations {
        simplex.sort_by(|a, b| a.1.total_cmp(&b.1));
        let best = simplex[0].1;
        let worst = simplex[N].1;
        if worst.is_finite()
            && 2.0 * (worst - best).abs() <= tolerance * (worst.abs() + best.abs()) + 1e-30
        {
            return Some((simplex[0].0, best, iteration));
        }

        let mut centroid = [0.0; N];
        for (p, _) in &simplex[..N] {
            for k in 0..N {
                centroid[k] += p[k] / N as f64;
            }
        }
        let along = |t: f64| {
            let mut p = [0.0; N];
            for k in 0..N {
                p[k] = centroid[k] + t * (simplex[N].0[k] - centroid[k]);
            }
            p
        };

        let reflected = along(-1.0);
        let fr = f(&reflected);
        if fr < simplex[0].1 {
            let expanded = along(-2.0);
            let fe = f(&expanded);
            simplex[N] = if fe < fr { (expanded, fe) } else { (reflected, fr) };
            continue;
        }
        if fr < simplex[N - 1].1 {
            simplex[N] = (reflected, fr);
            continue;
        }

        let contracted = if fr < simplex[N].1 {
            along(-0.5)
        } else {
            along(0.5)
        };
        let fc = f(&contracted);
        if fc < simplex[N].1.min(fr) {
            simplex[N] = (contracted, fc);
            continue;
        }

        // shrink towards the best vertex
        let best_point = simplex[0].0;
        for (p, fp) in simplex.iter_mut().skip(1) {
            for k in 0..N {
                p[k] = best_point[k] + 0.5 * (p[k] - best_point[k]);
            }
            *fp = f(&*p);
        }
    }

    None
}

/// One row of the GARCH view.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GarchRow {
    pub currency: CurrencyCode,
    /// Annualized one-step volatility forecast.
    pub garch_forecast: f64,
    /// Latest defined rolling volatility over the full series.
    pub current_vol: f64,
    pub flag_garch: bool,
    pub fit: GarchFit,
}

/// Fits GARCH(1,1) per currency and flags currencies whose current
/// volatility materially exceeds the forecast.
#[derive(Debug, Clone, Copy)]
pub struct GarchForecaster {
    estimator: Garch11,
    slack: f64,
    annualization: f64,
}

impl GarchForecaster {
    pub fn new(estimator: Garch11, slack: f64, annualization: f64) -> Self {
        Self {
            estimator,
            slack,
            annualization,
        }
    }

    pub fn from_config(config: &AnalysisConfig) -> Self {
        let estimator = Garch11 {
            min_observations: config.garch_min_observations,
            ..Garch11::default()
        };
        Self::new(estimator, config.garch_slack, config.annualization())
    }

    /// Forecast one currency from its historical returns and full rolling
    /// volatility series.
    pub fn forecast_currency(
        &self,
        currency: &CurrencyCode,
        historical_returns: &[f64],
        rolling: Option<&RollingSeries>,
    ) -> Result<GarchRow, SkipReason> {
        let fit = self.estimator.fit(historical_returns)?;
        debug!(
            "{}: garch fit alpha={:.4} beta={:.4} persistence={:.4}",
            currency,
            fit.alpha,
            fit.beta,
            fit.persistence()
        );
        let variance = fit.forecast_variance();
        if !(variance > 0.0) || !variance.is_finite() {
            return Err(GarchError::NumericalInstability.into());
        }
        let garch_forecast = variance.sqrt() * self.annualization;
        let current_vol = rolling
            .and_then(|r| r.latest())
            .ok_or(SkipReason::NoDefinedVolatility)?;

        Ok(GarchRow {
            currency: currency.clone(),
            garch_forecast,
            current_vol,
            flag_garch: current_vol > self.slack * garch_forecast,
            fit,
        })
    }

    /// Forecast every currency in the full set.
    ///
    /// `historical` supplies the fitting returns, `rolling` the full-series
    /// rolling volatility used as the current level.
    pub fn forecast(
        &self,
        full: &ObservationSet,
        historical: &ObservationSet,
        rolling: &BTreeMap<CurrencyCode, RollingSeries>,
    ) -> ModelOutput<GarchRow> {
        let returns = historical.returns_by_currency();
        let empty = Vec::new();
        let output: ModelOutput<GarchRow> = full
            .currencies()
            .into_iter()
            .map(|currency| {
                let series = returns.get(&currency).unwrap_or(&empty);
                let outcome = self.forecast_currency(&currency, series, rolling.get(&currency));
                (currency, outcome)
            })
            .collect();
        info!(
            "garch: {} currencies forecast, {} skipped",
            output.len(),
            output.skipped().len()
        );
        output
    }
}
