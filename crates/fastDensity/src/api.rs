//! High-level API for the neighborhood density pipeline.
//!
//! ## Purpose
//!
//! This module provides the primary user-facing entry point. It implements a
//! fluent builder for the pipeline parameters and validates them once when
//! the pipeline is built.
//!
//! ## Design notes
//!
//! * **Ergonomic**: Fluent builder with sensible defaults for all parameters.
//! * **Validated**: Every parameter is checked in `.build()`, before any data is seen.
//! * **Type-Safe**: Generic over `Float` types for flexible precision.
//!
//! ## Key concepts
//!
//! ### Configuration Flow
//!
//! 1. Create a [`DensityBuilder`] via `Density::new()` or [`DensityBuilder::from_config`].
//! 2. Chain configuration methods (`.radius()`, `.decay_shapes()`, etc.).
//! 3. Call `.build()` to obtain a [`DensityPipeline`].
//!
//! ### Defaults
//!
//! * radius: 20 map units; edge margin: the radius
//! * window: bounding box of the census
//! * decay: exponential, shapes 1..=25 plus "no decay"
//! * smooth ceiling: 10; no run timeout; parallel execution

// External dependencies
use num_traits::Float;
use std::time::{Duration, Instant};

// Internal dependencies
use crate::evaluation::sweep::SweepOptions;
use crate::math::boundary::PlotWindow;
use crate::math::kernel::{DecayFamily, DecayKernel};
use crate::primitives::config::{PipelineConfig, DEFAULT_RADIUS, DEFAULT_SMOOTH_CEILING};
use crate::primitives::errors::DensityError;

// Publicly re-exported types
pub use crate::adapters::batch::{DensityPipeline, PipelineReport, SweepReport};

/// Smallest smooth ceiling that leaves a usable basis after the `- 2` reduction.
const MIN_SMOOTH_CEILING: usize = 3;

// ============================================================================
// Builder
// ============================================================================

/// Fluent builder for [`DensityPipeline`].
#[derive(Debug, Clone)]
pub struct DensityBuilder<T> {
    radius: Option<T>,
    edge_margin: Option<T>,
    window: Option<PlotWindow<T>>,
    decay_kernel: DecayKernel,
    decay_shapes: Option<Vec<T>>,
    smooth_ceiling: usize,
    run_timeout: Option<Duration>,
    parallel: bool,
    focal_groups: Option<Vec<String>>,
}

impl<T: Float + Send + Sync> Default for DensityBuilder<T> {
    fn default() -> Self {
        Self::new()
    }
}

impl<T: Float + Send + Sync> DensityBuilder<T> {
    /// Create a builder with default parameters.
    pub fn new() -> Self {
        Self {
            radius: None,
            edge_margin: None,
            window: None,
            decay_kernel: DecayKernel::default(),
            decay_shapes: None,
            smooth_ceiling: DEFAULT_SMOOTH_CEILING,
            run_timeout: None,
            parallel: true,
            focal_groups: None,
        }
    }

    /// Create a builder from a parsed configuration.
    pub fn from_config(config: &PipelineConfig) -> Result<Self, DensityError> {
        config.validate()?;
        let radius = cast(config.radius, DensityError::InvalidRadius(config.radius))?;
        let margin = cast(config.margin(), DensityError::InvalidMargin(config.margin()))?;
        let window = config.window.cast::<T>().ok_or_else(|| {
            DensityError::InvalidWindow("window does not fit the target float type".to_string())
        })?;
        let shapes = config
            .decay_shapes
            .iter()
            .map(|&s| cast(s, DensityError::InvalidDecayShape(s)))
            .collect::<Result<Vec<T>, _>>()?;

        let mut builder = Self::new()
            .radius(radius)
            .edge_margin(margin)
            .window(window)
            .decay_kernel(DecayKernel::from_name(&config.decay_kernel)?)
            .decay_shapes(shapes)
            .smooth_ceiling(config.smooth_ceiling)
            .parallel(config.parallel);
        if let Some(timeout) = config.run_timeout()? {
            builder = builder.run_timeout(timeout);
        }
        if let Some(groups) = &config.focal_groups {
            builder = builder.focal_groups(groups.iter().cloned());
        }
        Ok(builder)
    }

    // ========================================================================
    // Setters
    // ========================================================================

    /// Set the neighbor search radius.
    pub fn radius(mut self, radius: T) -> Self {
        self.radius = Some(radius);
        self
    }

    /// Set the boundary margin (defaults to the radius).
    pub fn edge_margin(mut self, margin: T) -> Self {
        self.edge_margin = Some(margin);
        self
    }

    /// Set the plot window (defaults to the census bounding box).
    pub fn window(mut self, window: PlotWindow<T>) -> Self {
        self.window = Some(window);
        self
    }

    /// Set the decay kernel family.
    pub fn decay_kernel(mut self, kernel: DecayKernel) -> Self {
        self.decay_kernel = kernel;
        self
    }

    /// Set the swept decay shapes. "No decay" is always added.
    pub fn decay_shapes(mut self, shapes: impl Into<Vec<T>>) -> Self {
        self.decay_shapes = Some(shapes.into());
        self
    }

    /// Set the smoothness ceiling per smooth term.
    pub fn smooth_ceiling(mut self, ceiling: usize) -> Self {
        self.smooth_ceiling = ceiling;
        self
    }

    /// Set a wall-clock guard per model fit.
    pub fn run_timeout(mut self, timeout: Duration) -> Self {
        self.run_timeout = Some(timeout);
        self
    }

    /// Set parallel execution mode.
    pub fn parallel(mut self, parallel: bool) -> Self {
        self.parallel = parallel;
        self
    }

    /// Restrict the sweep to the named focal groups.
    pub fn focal_groups<I, S>(mut self, groups: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.focal_groups = Some(groups.into_iter().map(Into::into).collect());
        self
    }

    // ========================================================================
    // Build
    // ========================================================================

    /// Validate the configuration and build the pipeline.
    pub fn build(self) -> Result<DensityPipeline<T>, DensityError> {
        let radius = match self.radius {
            Some(r) => r,
            None => cast(DEFAULT_RADIUS, DensityError::InvalidRadius(DEFAULT_RADIUS))?,
        };
        if !radius.is_finite() || radius < T::zero() {
            return Err(DensityError::InvalidRadius(to_f64(radius)));
        }

        let margin = self.edge_margin.unwrap_or(radius);
        if !margin.is_finite() || margin < T::zero() {
            return Err(DensityError::InvalidMargin(to_f64(margin)));
        }

        if let Some(window) = &self.window {
            window.validate()?;
        }

        let shapes = match self.decay_shapes {
            Some(shapes) => shapes,
            None => (1..=25).filter_map(T::from).collect(),
        };
        let family = DecayFamily::new(self.decay_kernel, &shapes)?;

        if self.smooth_ceiling < MIN_SMOOTH_CEILING {
            return Err(DensityError::InvalidSmoothCeiling(self.smooth_ceiling));
        }

        if let Some(timeout) = self.run_timeout {
            // Every run derives its deadline from `Instant::now()`.
            if timeout.is_zero() || Instant::now().checked_add(timeout).is_none() {
                return Err(DensityError::InvalidTimeout(timeout.as_secs_f64()));
            }
        }

        Ok(DensityPipeline {
            radius,
            margin,
            window: self.window,
            family,
            options: SweepOptions {
                smooth_ceiling: self.smooth_ceiling,
                timeout: self.run_timeout,
                parallel: self.parallel,
            },
            focal_groups: self.focal_groups,
        })
    }
}

fn cast<T: Float>(value: f64, err: DensityError) -> Result<T, DensityError> {
    T::from(value).ok_or(err)
}

fn to_f64<T: Float>(value: T) -> f64 {
    value.to_f64().unwrap_or(f64::NAN)
}
