//! Contract between the sweep and a statistical model backend.
//!
//! ## Purpose
//!
//! The sweep never fits models itself. It builds a [`ModelSpec`] and a
//! [`FitData`] subset per run and hands them to a [`ModelFitter`]. Any
//! generalized additive or generalized linear modeling library can sit
//! behind this trait; [`crate::evaluation::glm::PenalizedGlm`] is the
//! built-in implementation.
//!
//! ## Key concepts
//!
//! * **FitResult**: convergence flag, log-likelihood, per-observation fitted
//!   probabilities and leverage, and an optional covariance estimate.
//! * **FitError**: expected, frequent failures. The orchestrator records
//!   them as rejections and never propagates them.

// External dependencies
use ndarray::Array2;
use serde::Serialize;
use std::fmt;
use std::time::Instant;
use thiserror::Error;

// ============================================================================
// Model Specification
// ============================================================================

/// One smooth (non-linear) term of the model.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct SmoothTerm {
    /// Covariate name.
    pub name: String,
    /// Flexibility (basis dimension).
    pub k: usize,
}

/// Model specification for one run.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ModelSpec {
    /// Focal group the data is restricted to.
    pub group: String,
    /// Response column name.
    pub response: String,
    /// Smooth terms in design order: baseline size, own-group density, total density.
    pub smooths: Vec<SmoothTerm>,
    /// Exposure column entering as `offset(log(exposure))`.
    pub exposure: String,
}

impl fmt::Display for ModelSpec {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} ~ ", self.response)?;
        for term in &self.smooths {
            write!(f, "s({}, k = {}) + ", term.name, term.k)?;
        }
        write!(f, "offset(log({}))", self.exposure)
    }
}

/// Column-major data subset for one run.
#[derive(Debug, Clone, PartialEq)]
pub struct FitData {
    /// Binary response (0 or 1).
    pub response: Vec<f64>,
    /// One column per smooth term, same order as `ModelSpec::smooths`.
    pub covariates: Vec<Vec<f64>>,
    /// Exposure (interval length); the backend applies the log.
    pub exposure: Vec<f64>,
}

impl FitData {
    /// Number of observations.
    pub fn n_obs(&self) -> usize {
        self.response.len()
    }
}

/// Per-run execution limits passed to the backend.
#[derive(Debug, Clone, Copy, Default)]
pub struct FitControl {
    /// Wall-clock deadline; the backend should stop and return
    /// [`FitError::TimedOut`] once it has passed.
    pub deadline: Option<Instant>,
}

impl FitControl {
    /// Whether the deadline has passed.
    pub fn expired(&self) -> bool {
        self.deadline.is_some_and(|d| Instant::now() >= d)
    }
}

// ============================================================================
// Fit Result
// ============================================================================

/// Fitted model artifact returned by a backend.
#[derive(Debug, Clone, Serialize)]
pub struct FitResult {
    /// Whether the fitting iteration converged.
    pub converged: bool,
    /// Log-likelihood at the final estimate.
    pub log_likelihood: f64,
    /// Fitted probability per observation.
    pub fitted: Vec<f64>,
    /// Leverage (hat-matrix diagonal) per observation.
    pub leverage: Vec<f64>,
    /// Coefficient estimates.
    pub coefficients: Vec<f64>,
    /// Iterations performed.
    pub iterations: usize,
    /// Coefficient covariance, when usable.
    #[serde(skip)]
    pub covariance: Option<Array2<f64>>,
}

impl FitResult {
    /// Whether a usable covariance estimate is available.
    pub fn has_covariance(&self) -> bool {
        self.covariance.is_some()
    }
}

/// Errors raised by a model backend.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum FitError {
    /// Fewer observations than parameters.
    #[error("insufficient data: {n_obs} observations for {n_params} parameters")]
    InsufficientData {
        /// Observations available.
        n_obs: usize,
        /// Parameters requested.
        n_params: usize,
    },

    /// The penalized design is not positive definite.
    #[error("rank-deficient design")]
    RankDeficient,

    /// Response, covariate or exposure contained an unusable value.
    #[error("non-finite or out-of-range input: {0}")]
    NonFiniteInput(String),

    /// The run passed its wall-clock deadline.
    #[error("fit exceeded its time limit")]
    TimedOut,

    /// Backend-specific failure.
    #[error("backend error: {0}")]
    Backend(String),
}

// ============================================================================
// Backend Trait
// ============================================================================

/// Pluggable statistical model backend.
pub trait ModelFitter: Send + Sync {
    /// Fit `spec` to `data`.
    fn fit(
        &self,
        spec: &ModelSpec,
        data: &FitData,
        control: &FitControl,
    ) -> Result<FitResult, FitError>;
}

impl<F> ModelFitter for F
where
    F: Fn(&ModelSpec, &FitData, &FitControl) -> Result<FitResult, FitError> + Send + Sync,
{
    fn fit(
        &self,
        spec: &ModelSpec,
        data: &FitData,
        control: &FitControl,
    ) -> Result<FitResult, FitError> {
        self(spec, data, control)
    }
}
