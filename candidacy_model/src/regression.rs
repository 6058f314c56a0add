use std::fmt::Display;

use log::{debug, info, warn};
use ndarray::{Array1, Array2, Axis};
use statrs::function::erf::erfc;

use crate::config::*;
use crate::encode::EncodedCandidate;
use crate::linalg::{cholesky, cholesky_inverse, cholesky_solve};
use crate::matrix::{regression_features, FeatureMatrix};

pub const INTERCEPT: &str = "const";

/// Why a year could not be fitted.
#[derive(PartialEq, Debug, Clone, Copy)]
pub enum FitFailure {
    NoObservations,
    /// Every complete case has the same outcome.
    NoOutcomeVariation,
    /// Some covariates are linear combinations of the others (or constant).
    RankDeficient,
    /// The covariates predict the outcome exactly: the estimates diverge.
    PerfectSeparation,
    NonConvergence { iterations: u32 },
}

impl Display for FitFailure {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            FitFailure::NoObservations => write!(f, "no complete observation"),
            FitFailure::NoOutcomeVariation => write!(f, "outcome does not vary"),
            FitFailure::RankDeficient => write!(f, "design matrix is rank deficient"),
            FitFailure::PerfectSeparation => write!(f, "perfect separation of the outcome"),
            FitFailure::NonConvergence { iterations } => {
                write!(f, "no convergence after {} iterations", iterations)
            }
        }
    }
}

/// Raw output of a logistic fit, in design column order.
#[derive(PartialEq, Debug, Clone)]
pub struct LogitFit {
    pub params: Array1<f64>,
    pub std_errors: Array1<f64>,
    pub log_likelihood: f64,
    pub null_log_likelihood: f64,
    pub iterations: u32,
}

#[derive(PartialEq, Debug, Clone)]
pub struct Coefficient {
    pub name: String,
    pub estimate: f64,
    pub std_error: f64,
    pub z_value: f64,
    /// Two-sided, under the normal approximation.
    pub p_value: f64,
}

#[derive(PartialEq, Debug, Clone)]
pub struct YearFit {
    pub year: i32,
    pub n_obs: usize,
    pub coefficients: Vec<Coefficient>,
    /// McFadden's pseudo R squared.
    pub pseudo_r2: f64,
    pub log_likelihood: f64,
    pub null_log_likelihood: f64,
    pub iterations: u32,
}

impl YearFit {
    pub fn coefficient(&self, name: &str) -> Option<&Coefficient> {
        self.coefficients.iter().find(|c| c.name == name)
    }
}

#[derive(PartialEq, Debug, Clone)]
pub struct SkippedYear {
    pub year: i32,
    pub reason: FitFailure,
}

#[derive(PartialEq, Debug, Clone, Default)]
pub struct YearwiseReport {
    pub fits: Vec<YearFit>,
    pub skipped: Vec<SkippedYear>,
}

impl YearwiseReport {
    pub fn fit_for(&self, year: i32) -> Option<&YearFit> {
        self.fits.iter().find(|f| f.year == year)
    }
}

/// Fits one logistic regression per election year, on complete cases only.
pub struct YearwiseRegressionEstimator {
    params: RegressionParams,
}

impl YearwiseRegressionEstimator {
    pub fn new(params: &RegressionParams) -> YearwiseRegressionEstimator {
        YearwiseRegressionEstimator { params: *params }
    }

    /// A year that cannot be fitted is recorded as skipped; the others are
    /// still fitted.
    pub fn estimate(&self, rows: &[EncodedCandidate], years: &[i32]) -> YearwiseReport {
        let mut report = YearwiseReport::default();
        for &year in years.iter() {
            let design = regression_features(rows.iter().filter(|c| c.key.election_year == year));
            let complete = design.complete_cases();
            info!(
                "Year {}: {} candidacies, {} complete cases",
                year,
                design.n_rows(),
                complete.n_rows()
            );
            match self.fit_matrix(&complete) {
                Ok(fit) => {
                    let year_fit = to_year_fit(year, &complete, fit);
                    debug!("Year {}: fit {:?}", year, year_fit);
                    report.fits.push(year_fit);
                }
                Err(reason) => {
                    warn!("Year {}: regression skipped: {}", year, reason);
                    report.skipped.push(SkippedYear { year, reason });
                }
            }
        }
        report
    }

    fn fit_matrix(&self, m: &FeatureMatrix) -> Result<LogitFit, FitFailure> {
        let (x, y) = design_arrays(m);
        fit_logit(&x, &y, &self.params)
    }
}

/// Dense design with a leading intercept column, and the 0/1 outcome.
/// Unknown cells become NaN, which the fit rejects.
fn design_arrays(m: &FeatureMatrix) -> (Array2<f64>, Array1<f64>) {
    let n = m.n_rows();
    let p = m.columns.len() + 1;
    let mut x: Array2<f64> = Array2::ones((n, p));
    for (i, row) in m.rows.iter().enumerate() {
        for (j, v) in row.iter().enumerate() {
            x[[i, j + 1]] = v.unwrap_or(f64::NAN);
        }
    }
    let y: Array1<f64> = m
        .labels
        .iter()
        .map(|l| if *l == Some(true) { 1.0 } else { 0.0 })
        .collect();
    (x, y)
}

fn to_year_fit(year: i32, m: &FeatureMatrix, fit: LogitFit) -> YearFit {
    let names = std::iter::once(INTERCEPT.to_string()).chain(m.columns.iter().cloned());
    let coefficients = names
        .zip(fit.params.iter().zip(fit.std_errors.iter()))
        .map(|(name, (&estimate, &std_error))| {
            let z_value = estimate / std_error;
            Coefficient {
                name,
                estimate,
                std_error,
                z_value,
                p_value: erfc(z_value.abs() / std::f64::consts::SQRT_2),
            }
        })
        .collect();
    YearFit {
        year,
        n_obs: m.n_rows(),
        coefficients,
        pseudo_r2: 1.0 - fit.log_likelihood / fit.null_log_likelihood,
        log_likelihood: fit.log_likelihood,
        null_log_likelihood: fit.null_log_likelihood,
        iterations: fit.iterations,
    }
}

fn sigmoid(eta: f64) -> f64 {
    if eta >= 0.0 {
        1.0 / (1.0 + (-eta).exp())
    } else {
        let e = eta.exp();
        e / (1.0 + e)
    }
}

/// log(1 + exp(eta)) without overflow.
fn softplus(eta: f64) -> f64 {
    if eta > 0.0 {
        eta + (-eta).exp().ln_1p()
    } else {
        eta.exp().ln_1p()
    }
}

fn log_likelihood(eta: &Array1<f64>, y: &Array1<f64>) -> f64 {
    eta.iter()
        .zip(y.iter())
        .map(|(&e, &yi)| yi * e - softplus(e))
        .sum()
}

/// Maximum likelihood logistic regression by Newton-Raphson.
///
/// `x` must already contain the intercept column.
pub fn fit_logit(
    x: &Array2<f64>,
    y: &Array1<f64>,
    params: &RegressionParams,
) -> Result<LogitFit, FitFailure> {
    let (n, p) = x.dim();
    if n == 0 {
        return Err(FitFailure::NoObservations);
    }
    let y_mean = y.sum() / n as f64;
    if y_mean <= 0.0 || y_mean >= 1.0 {
        return Err(FitFailure::NoOutcomeVariation);
    }
    if n < p || x.iter().any(|v| !v.is_finite()) {
        return Err(FitFailure::RankDeficient);
    }
    let xtx = x.t().dot(x);
    if cholesky(&xtx, params.pivot_tolerance).is_none() {
        return Err(FitFailure::RankDeficient);
    }

    let mut beta: Array1<f64> = Array1::zeros(p);
    let mut converged = false;
    let mut iterations = 0;
    while iterations < params.max_iterations {
        iterations += 1;
        let mu = x.dot(&beta).mapv(sigmoid);
        if mu.iter().zip(y.iter()).all(|(m, yi)| (m - yi).abs() < 1e-10) {
            return Err(FitFailure::PerfectSeparation);
        }
        let hessian = weighted_gram(x, &mu);
        let l = cholesky(&hessian, params.pivot_tolerance)
            .ok_or(FitFailure::NonConvergence { iterations })?;
        let gradient = x.t().dot(&(y - &mu));
        let step = cholesky_solve(&l, &gradient);
        if step.iter().any(|s| !s.is_finite()) {
            return Err(FitFailure::NonConvergence { iterations });
        }
        beta += &step;
        let max_step = step.iter().fold(0.0_f64, |acc, s| acc.max(s.abs()));
        debug!("fit_logit: iteration {} max step {:e}", iterations, max_step);
        if max_step < params.tolerance {
            converged = true;
            break;
        }
    }
    if !converged {
        return Err(FitFailure::NonConvergence { iterations });
    }

    let eta = x.dot(&beta);
    let mu = eta.mapv(sigmoid);
    if mu.iter().zip(y.iter()).all(|(m, yi)| (m - yi).abs() < 1e-10) {
        return Err(FitFailure::PerfectSeparation);
    }
    let l = cholesky(&weighted_gram(x, &mu), params.pivot_tolerance)
        .ok_or(FitFailure::NonConvergence { iterations })?;
    let covariance = cholesky_inverse(&l);
    let std_errors = covariance.diag().mapv(f64::sqrt);

    let null_log_likelihood =
        n as f64 * (y_mean * y_mean.ln() + (1.0 - y_mean) * (1.0 - y_mean).ln());
    Ok(LogitFit {
        params: beta,
        std_errors,
        log_likelihood: log_likelihood(&eta, y),
        null_log_likelihood,
        iterations,
    })
}

/// X^T diag(mu (1 - mu)) X
fn weighted_gram(x: &Array2<f64>, mu: &Array1<f64>) -> Array2<f64> {
    let w = mu.mapv(|m| m * (1.0 - m));
    let xw = x * &w.insert_axis(Axis(1));
    x.t().dot(&xw)
}
