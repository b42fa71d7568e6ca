//! # fastDensity
//!
//! Decay-weighted neighborhood density metrics for mapped plots, with a
//! likelihood-based sweep that selects the best decay shapes.
//!
//! ## Overview
//!
//! Given one census interval of mapped individuals (position, group, size,
//! binary outcome, elapsed interval), the pipeline:
//!
//! 1. Flags individuals within the edge margin of the plot window.
//! 2. Finds every neighbor pair within the search radius.
//! 3. Summarizes decay-weighted neighborhood density per interior focal
//!    individual, split into own-group, other-group and combined classes and
//!    weighted by count or by size.
//! 4. Fits one binary-outcome model per (group, own shape, total shape,
//!    basis), rejecting unreliable fits.
//! 5. Selects the optimum decay combination globally and per group.
//!
//! ## Quick start
//!
//! ```rust,no_run
//! use fastDensity::prelude::*;
//!
//! # fn main() -> Result<(), DensityError> {
//! let census = Census::new(vec![
//!     Individual::new("a", "oak", 50.0, 50.0, 12.0, true, 5.0),
//!     Individual::new("b", "oak", 55.0, 50.0, 20.0, false, 5.0),
//!     Individual::new("c", "ash", 50.0, 58.0, 8.0, false, 5.0),
//! ])?;
//!
//! let pipeline = Density::new()
//!     .radius(20.0)
//!     .window(PlotWindow::new(0.0, 100.0, 0.0, 100.0))
//!     .decay_shapes(vec![2.5, 5.0, 10.0])
//!     .build()?;
//!
//! let table = pipeline.features(&census)?;
//! let report = pipeline.sweep(&table, &PenalizedGlm::default());
//! println!("{} accepted", report.summary.accepted);
//! # Ok(())
//! # }
//! ```
//!
//! ## Layers
//!
//! * `primitives`: census, configuration, errors
//! * `math`: decay kernels, plot boundary, proximity search
//! * `engine`: neighborhood aggregation and the feature table
//! * `evaluation`: model fitting, sweep execution, separation check, selection
//! * `adapters`: the batch pipeline
//! * `api`: the fluent builder
//!
//! ## Features
//!
//! * `cpu` (default): rayon-backed parallel passes.
//! * `dev`: exposes the internal layers under [`internals`](crate::internals).

#![allow(non_snake_case)]

// Layer 1: Primitives
mod primitives;

// Layer 2: Math
mod math;

// Layer 3: Engine
mod engine;

// Layer 4: Evaluation
mod evaluation;

// Layer 5: Adapters
mod adapters;

// Layer 6: API
pub mod api;

/// Coordinate input abstraction.
pub mod input;

/// Standard imports.
pub mod prelude {
    pub use crate::api::{
        DensityBuilder as Density, DensityBuilder, DensityPipeline, PipelineReport, SweepReport,
    };
    pub use crate::engine::output::{Basis, ComparisonClass, FeatureRow, FeatureTable};
    pub use crate::evaluation::fitting::{
        FitControl, FitData, FitError, FitResult, ModelFitter, ModelSpec, SmoothTerm,
    };
    pub use crate::evaluation::glm::PenalizedGlm;
    pub use crate::evaluation::selection::{ExclusionReason, SelectionRecord, SelectionReport};
    pub use crate::evaluation::sweep::{CancelToken, RejectReason, RunKey, RunState};
    pub use crate::input::PointInput;
    pub use crate::math::boundary::PlotWindow;
    pub use crate::math::kernel::DecayKernel;
    pub use crate::primitives::census::{Census, Individual};
    pub use crate::primitives::config::PipelineConfig;
    pub use crate::primitives::errors::DensityError;
}

/// Internal layers, exposed for integration tests and benchmarks.
#[cfg(feature = "dev")]
pub mod internals {
    /// Census, configuration and errors.
    pub mod primitives {
        pub use crate::primitives::*;
    }
    /// Decay kernels, plot boundary and proximity search.
    pub mod math {
        pub use crate::math::*;
    }
    /// Neighborhood aggregation and the feature table.
    pub mod engine {
        pub use crate::engine::*;
    }
    /// Model fitting, sweep execution and selection.
    pub mod evaluation {
        pub use crate::evaluation::*;
    }
    /// Batch pipeline.
    pub mod adapters {
        pub use crate::adapters::*;
    }
}
