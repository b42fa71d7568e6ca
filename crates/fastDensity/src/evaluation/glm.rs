//! Built-in penalized binomial GLM backend.
//!
//! ## Purpose
//!
//! This module provides a self-contained [`ModelFitter`] for binary outcomes
//! observed over unequal intervals: binomial family, complementary log-log
//! link and a `log(exposure)` offset. Each smooth term is represented by a
//! scaled truncated-power cubic spline and fitted by penalized IRLS.
//!
//! ## Design notes
//!
//! * **Basis**: `k - 1` columns per smooth (one linear column plus up to
//!   `k - 2` interior knots at quantiles of the distinct covariate values).
//! * **Penalty**: Ridge penalty on knot columns only; intercept and linear
//!   columns are unpenalized.
//! * **Solver**: `faer` Cholesky (LLT) of `X'WX + S` with an LDLT fallback;
//!   a system neither can factor is reported as a rank-deficient design.
//! * **Step control**: A step whose deviance is not finite is halved back
//!   toward the previous iterate.
//! * **Separation**: Under complete separation the coefficients diverge and
//!   the likelihood approaches its supremum. Iteration continues while any
//!   probability lies past the working clamp and stops, converged, once every
//!   response is reproduced to machine precision. The separation check then
//!   sees the saturated fit.
//! * **Stability**: `ln(1 - mu) = -exp(eta)` and `ln(mu) = ln(-expm1(-exp(eta)))`
//!   keep the log-likelihood finite near the boundaries.
//!
//! ## Invariants
//!
//! * The response is 0/1; exposures are finite and positive.
//! * Leverage values are `w_i x_i' (X'WX + S)^-1 x_i`.
//!
//! ## Non-goals
//!
//! * Smoothing-parameter selection (the penalty is fixed per backend).
//! * Families other than binomial.

// External dependencies
use faer::linalg::solvers::{Ldlt, Llt, Solve};
use faer::{Mat, Side};
use ndarray::{Array1, Array2};

// Internal dependencies
use crate::evaluation::fitting::{FitControl, FitData, FitError, FitResult, ModelFitter, ModelSpec};
use crate::evaluation::separation::flagged_observations;
use crate::primitives::config::PipelineConfig;

const MIN_PROB: f64 = 1e-10;
const MIN_DERIV: f64 = 1e-12;
const MAX_STEP_HALVINGS: usize = 30;
const JITTER: f64 = 1e-8;

// ============================================================================
// Backend
// ============================================================================

/// Penalized IRLS fitter for `cloglog` binomial models with smooth terms.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct PenalizedGlm {
    /// Ridge penalty on spline knot coefficients.
    pub ridge_penalty: f64,
    /// Iteration cap.
    pub max_iterations: usize,
    /// Relative deviance change accepted as convergence.
    pub tolerance: f64,
}

impl Default for PenalizedGlm {
    fn default() -> Self {
        Self {
            ridge_penalty: 1e-3,
            max_iterations: 100,
            tolerance: 1e-8,
        }
    }
}

impl PenalizedGlm {
    /// Backend settings taken from a pipeline configuration.
    pub fn from_config(config: &PipelineConfig) -> Self {
        Self {
            ridge_penalty: config.ridge_penalty,
            max_iterations: config.max_iterations,
            tolerance: config.tolerance,
        }
    }
}

impl ModelFitter for PenalizedGlm {
    fn fit(
        &self,
        spec: &ModelSpec,
        data: &FitData,
        control: &FitControl,
    ) -> Result<FitResult, FitError> {
        validate_data(spec, data)?;

        let n = data.n_obs();
        let (x, penalized) = build_design(spec, data);
        let p = x.ncols();
        if n <= p {
            return Err(FitError::InsufficientData {
                n_obs: n,
                n_params: p,
            });
        }

        let y = Array1::from_vec(data.response.clone());
        let offset: Array1<f64> = data.exposure.iter().map(|e| e.ln()).collect();
        let mut penalty = Array1::<f64>::zeros(p);
        for &j in &penalized {
            penalty[j] = self.ridge_penalty;
        }

        // Standard binomial start: mu = (y + 0.5) / 2.
        let mut eta: Array1<f64> = y
            .iter()
            .map(|&yi| {
                let mu: f64 = (yi + 0.5) / 2.0;
                (-(1.0 - mu).ln()).ln()
            })
            .collect();
        let mut beta = Array1::<f64>::zeros(p);
        let mut deviance = f64::INFINITY;
        let mut converged = false;
        let mut iterations = 0;

        while iterations < self.max_iterations {
            if control.expired() {
                return Err(FitError::TimedOut);
            }
            iterations += 1;
            let has_iterate = iterations > 1;

            let (w, z) = working_response(&y, &eta, &offset);
            let (xtwx, xtwz) = weighted_cross_products(&x, &w, &z, &penalty);
            let Some(mut candidate) = Factor::new(&xtwx).and_then(|f| f.solve(&xtwz)) else {
                // Weights collapse once a separated fit saturates; keep the last iterate.
                if has_iterate && !flagged_observations(&fitted_probabilities(&eta)).is_empty() {
                    converged = true;
                    break;
                }
                return Err(FitError::RankDeficient);
            };

            let mut next_eta = x.dot(&candidate) + &offset;
            let mut next_deviance = -2.0 * log_likelihood(&y, &next_eta);
            let mut halvings = 0;
            while !next_deviance.is_finite() && has_iterate && halvings < MAX_STEP_HALVINGS {
                candidate = (&candidate + &beta) * 0.5;
                next_eta = x.dot(&candidate) + &offset;
                next_deviance = -2.0 * log_likelihood(&y, &next_eta);
                halvings += 1;
            }
            if !next_deviance.is_finite() {
                break;
            }
            beta = candidate;
            eta = next_eta;

            // Every response reproduced to machine precision: the likelihood
            // sits at its supremum even though the coefficients diverge.
            if next_deviance <= 2.0 * f64::EPSILON {
                converged = true;
                break;
            }
            let settled =
                (next_deviance - deviance).abs() / (next_deviance.abs() + 0.1) < self.tolerance;
            deviance = next_deviance;
            // Probabilities past the working clamp are still moving toward 0 or 1.
            if settled && !beyond_working_clamp(&eta) {
                converged = true;
                break;
            }
        }

        let (w, z) = working_response(&y, &eta, &offset);
        let (xtwx, _) = weighted_cross_products(&x, &w, &z, &penalty);
        let (inverse, exact) = match Factor::new(&xtwx) {
            Some(factor) => (factor.inverse(p), true),
            None => {
                // Leverage only; a jittered system yields no covariance.
                let jitter = JITTER * diagonal_scale(&xtwx);
                let mut jittered = xtwx;
                for j in 0..p {
                    jittered[[j, j]] += jitter;
                }
                let factor = Factor::new(&jittered).ok_or(FitError::RankDeficient)?;
                (factor.inverse(p), false)
            }
        };

        let leverage: Vec<f64> = (0..n)
            .map(|i| {
                let row = x.row(i);
                w[i] * row.dot(&inverse.dot(&row))
            })
            .collect();
        let fitted = fitted_probabilities(&eta);

        let usable = exact
            && (0..p).all(|j| inverse[[j, j]].is_finite() && inverse[[j, j]] > 0.0)
            && inverse.iter().all(|v| v.is_finite());

        Ok(FitResult {
            converged,
            log_likelihood: log_likelihood(&y, &eta),
            fitted,
            leverage,
            coefficients: beta.to_vec(),
            iterations,
            covariance: usable.then_some(inverse),
        })
    }
}

// ============================================================================
// Design Matrix
// ============================================================================

fn validate_data(spec: &ModelSpec, data: &FitData) -> Result<(), FitError> {
    let n = data.n_obs();
    if data.covariates.len() != spec.smooths.len() {
        return Err(FitError::Backend(format!(
            "{} covariate columns for {} smooth terms",
            data.covariates.len(),
            spec.smooths.len()
        )));
    }
    if data.exposure.len() != n || data.covariates.iter().any(|c| c.len() != n) {
        return Err(FitError::Backend("column lengths differ".to_string()));
    }
    if data.response.iter().any(|&y| y != 0.0 && y != 1.0) {
        return Err(FitError::NonFiniteInput(
            "response must be 0 or 1".to_string(),
        ));
    }
    if data
        .covariates
        .iter()
        .flatten()
        .any(|v| !v.is_finite())
    {
        return Err(FitError::NonFiniteInput("covariate".to_string()));
    }
    if data.exposure.iter().any(|&e| !e.is_finite() || e <= 0.0) {
        return Err(FitError::NonFiniteInput("exposure".to_string()));
    }
    Ok(())
}

/// Build the design matrix; returns it with the indices of penalized columns.
fn build_design(spec: &ModelSpec, data: &FitData) -> (Array2<f64>, Vec<usize>) {
    let n = data.n_obs();
    let mut columns: Vec<Vec<f64>> = vec![vec![1.0; n]];
    let mut penalized = Vec::new();

    for (term, values) in spec.smooths.iter().zip(data.covariates.iter()) {
        let (lo, hi) = values
            .iter()
            .fold((f64::INFINITY, f64::NEG_INFINITY), |(lo, hi), &v| {
                (lo.min(v), hi.max(v))
            });
        let range = hi - lo;
        let scaled: Vec<f64> = if range > 0.0 {
            values.iter().map(|&v| (v - lo) / range).collect()
        } else {
            vec![0.0; n]
        };

        columns.push(scaled.clone());
        for knot in interior_knots(&scaled, term.k.saturating_sub(2)) {
            penalized.push(columns.len());
            columns.push(
                scaled
                    .iter()
                    .map(|&u| {
                        let t = (u - knot).max(0.0);
                        t * t * t
                    })
                    .collect(),
            );
        }
    }

    let p = columns.len();
    let mut x = Array2::<f64>::zeros((n, p));
    for (j, col) in columns.iter().enumerate() {
        for (i, &v) in col.iter().enumerate() {
            x[[i, j]] = v;
        }
    }
    (x, penalized)
}

/// Up to `count` knots at quantiles of the distinct values, endpoints excluded.
fn interior_knots(values: &[f64], count: usize) -> Vec<f64> {
    let mut distinct = values.to_vec();
    distinct.sort_by(f64::total_cmp);
    distinct.dedup();
    let d = distinct.len();
    let m = count.min(d.saturating_sub(2));
    let mut knots: Vec<f64> = (1..=m)
        .map(|q| {
            let pos = (q as f64 * (d - 1) as f64 / (m + 1) as f64).round() as usize;
            distinct[pos.clamp(1, d - 2)]
        })
        .collect();
    knots.dedup();
    knots
}

// ============================================================================
// IRLS Helpers
// ============================================================================

#[inline]
fn inverse_cloglog(eta: f64) -> f64 {
    -(-eta.exp()).exp_m1()
}

fn fitted_probabilities(eta: &Array1<f64>) -> Vec<f64> {
    eta.iter().map(|&e| inverse_cloglog(e)).collect()
}

fn beyond_working_clamp(eta: &Array1<f64>) -> bool {
    eta.iter().any(|&e| {
        let mu = inverse_cloglog(e);
        mu < MIN_PROB || mu > 1.0 - MIN_PROB
    })
}

fn working_response(
    y: &Array1<f64>,
    eta: &Array1<f64>,
    offset: &Array1<f64>,
) -> (Array1<f64>, Array1<f64>) {
    let n = y.len();
    let mut w = Array1::<f64>::zeros(n);
    let mut z = Array1::<f64>::zeros(n);
    for i in 0..n {
        let e = eta[i];
        let mu = inverse_cloglog(e).clamp(MIN_PROB, 1.0 - MIN_PROB);
        let dmu = (e - e.exp()).exp().max(MIN_DERIV);
        w[i] = dmu * dmu / (mu * (1.0 - mu));
        z[i] = (e - offset[i]) + (y[i] - mu) / dmu;
    }
    (w, z)
}

fn weighted_cross_products(
    x: &Array2<f64>,
    w: &Array1<f64>,
    z: &Array1<f64>,
    penalty: &Array1<f64>,
) -> (Array2<f64>, Array1<f64>) {
    let mut xw = x.clone();
    for (mut row, &wi) in xw.rows_mut().into_iter().zip(w.iter()) {
        row *= wi;
    }
    let mut xtwx = xw.t().dot(x);
    for (j, &s) in penalty.iter().enumerate() {
        xtwx[[j, j]] += s;
    }
    let xtwz = xw.t().dot(z);
    (xtwx, xtwz)
}

fn log_likelihood(y: &Array1<f64>, eta: &Array1<f64>) -> f64 {
    y.iter()
        .zip(eta.iter())
        .map(|(&yi, &e)| {
            let h = e.exp();
            if yi > 0.5 {
                (-(-h).exp_m1()).max(f64::MIN_POSITIVE).ln()
            } else {
                -h
            }
        })
        .sum()
}

// ============================================================================
// Linear Algebra
// ============================================================================

/// Factorization of the symmetric penalized system `X'WX + S`.
enum Factor {
    Llt(Llt<f64>),
    Ldlt(Ldlt<f64>),
}

impl Factor {
    /// Cholesky first, LDLT when the system is only semi-definite.
    fn new(a: &Array2<f64>) -> Option<Self> {
        if a.iter().any(|v| !v.is_finite()) {
            return None;
        }
        let (rows, cols) = a.dim();
        let m = Mat::from_fn(rows, cols, |i, j| a[[i, j]]);
        if let Ok(llt) = Llt::new(m.as_ref(), Side::Lower) {
            Some(Self::Llt(llt))
        } else {
            Ldlt::new(m.as_ref(), Side::Lower).ok().map(Self::Ldlt)
        }
    }

    fn solve_in_place(&self, rhs: &mut Mat<f64>) {
        match self {
            Self::Llt(f) => f.solve_in_place(rhs.as_mut()),
            Self::Ldlt(f) => f.solve_in_place(rhs.as_mut()),
        }
    }

    /// Solution of `A x = b`, or `None` if it is not finite.
    fn solve(&self, b: &Array1<f64>) -> Option<Array1<f64>> {
        let mut rhs = Mat::from_fn(b.len(), 1, |i, _| b[i]);
        self.solve_in_place(&mut rhs);
        let x: Array1<f64> = (0..b.len()).map(|i| rhs[(i, 0)]).collect();
        x.iter().all(|v| v.is_finite()).then_some(x)
    }

    fn inverse(&self, p: usize) -> Array2<f64> {
        let mut rhs = Mat::<f64>::identity(p, p);
        self.solve_in_place(&mut rhs);
        Array2::from_shape_fn((p, p), |(i, j)| rhs[(i, j)])
    }
}

fn diagonal_scale(a: &Array2<f64>) -> f64 {
    a.diag().iter().fold(0.0_f64, |m, v| m.max(v.abs())).max(1.0)
}
