//! Error types for density computation and validation.
//!
//! ## Purpose
//!
//! This module defines the validation error taxonomy for the crate. Every
//! constructor and validator returns `Result<_, DensityError>`; malformed
//! input is rejected immediately and never coerced into a default value.
//!
//! ## Non-goals
//!
//! * Model fitting failures are not represented here. They are expected,
//!   frequent, and handled per run (see `evaluation::fitting::FitError`).

use thiserror::Error;

/// Validation errors raised while building or running the pipeline.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum DensityError {
    /// Neighbor radius was negative or non-finite.
    #[error("neighbor radius must be finite and non-negative, got {0}")]
    InvalidRadius(f64),

    /// Edge margin was negative or non-finite.
    #[error("edge margin must be finite and non-negative, got {0}")]
    InvalidMargin(f64),

    /// Plot window bounds were inverted or non-finite.
    #[error("invalid plot window: {0}")]
    InvalidWindow(String),

    /// An individual carried a NaN or infinite coordinate.
    #[error("individual '{id}' has a non-finite coordinate")]
    NonFiniteCoordinate {
        /// Identity of the offending individual.
        id: String,
    },

    /// An individual carried a negative size measure.
    #[error("individual '{id}' has negative size {size}")]
    NegativeSize {
        /// Identity of the offending individual.
        id: String,
        /// The rejected size value.
        size: f64,
    },

    /// An individual carried a NaN or infinite size measure.
    #[error("individual '{id}' has a non-finite size")]
    NonFiniteSize {
        /// Identity of the offending individual.
        id: String,
    },

    /// Census interval length must be finite and strictly positive.
    #[error("individual '{id}' has invalid census interval {interval}")]
    InvalidInterval {
        /// Identity of the offending individual.
        id: String,
        /// The rejected interval length.
        interval: f64,
    },

    /// The same identity appeared twice within one census interval.
    #[error("identity '{0}' appears more than once in the census")]
    DuplicateIdentity(String),

    /// A decay shape value was zero, negative or non-finite.
    #[error("decay shape must be finite and strictly positive, got {0}")]
    InvalidDecayShape(f64),

    /// No decay shape values were configured.
    #[error("at least one decay shape value is required")]
    EmptyShapeSet,

    /// The smoothness ceiling is too small to build a smooth term.
    #[error("smooth ceiling must be at least 3, got {0}")]
    InvalidSmoothCeiling(usize),

    /// The per-run wall-clock guard was zero or non-finite.
    #[error("run timeout must be finite and positive, got {0}")]
    InvalidTimeout(f64),

    /// Generic malformed input (shape or layout problems).
    #[error("invalid input: {0}")]
    InvalidInput(String),

    /// The configured decay kernel name is not recognised.
    #[error("unknown decay kernel '{0}' (expected one of: exponential, gaussian)")]
    UnknownDecayKernel(String),

    /// Configuration file could not be read or parsed.
    #[error("configuration error: {0}")]
    Config(String),
}
