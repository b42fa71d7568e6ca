//! Pipeline configuration.
//!
//! ## Purpose
//!
//! The pipeline is driven by a small set of scalar parameters: neighbor
//! radius, edge margin, decay shapes, smoothness ceiling and plot window.
//! This module gives them a serde representation so they can be read from a
//! TOML file as well as set through the fluent builder.
//!
//! ## Example
//!
//! ```toml
//! radius = 20.0
//! edge_margin = 20.0
//! decay_kernel = "exponential"
//! decay_shapes = [2.5, 5.0, 10.0]
//! smooth_ceiling = 10
//!
//! [window]
//! x_min = 0.0
//! x_max = 1000.0
//! y_min = 0.0
//! y_max = 500.0
//! ```

// External dependencies
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::Path;
use std::time::Duration;

// Internal dependencies
use crate::math::boundary::PlotWindow;
use crate::math::kernel::DecayKernel;
use crate::primitives::errors::DensityError;

/// Default neighbor radius (map units).
pub const DEFAULT_RADIUS: f64 = 20.0;

/// Default smoothness ceiling per smooth term.
pub const DEFAULT_SMOOTH_CEILING: usize = 10;

/// Serializable pipeline configuration.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PipelineConfig {
    /// Neighbor search radius.
    pub radius: f64,
    /// Boundary margin; `None` uses the radius.
    pub edge_margin: Option<f64>,
    /// Plot bounding window.
    pub window: PlotWindow<f64>,
    /// Decay kernel family name.
    pub decay_kernel: String,
    /// Decay shape values swept alongside the "no decay" sentinel.
    pub decay_shapes: Vec<f64>,
    /// Ceiling for the flexibility of each smooth term.
    pub smooth_ceiling: usize,
    /// Optional per-run wall-clock guard in seconds.
    pub run_timeout_secs: Option<f64>,
    /// Run the parallel passes when the `cpu` feature is available.
    pub parallel: bool,
    /// Restrict the sweep to these focal groups.
    pub focal_groups: Option<Vec<String>>,
    /// Ridge penalty on spline knot coefficients (built-in backend).
    pub ridge_penalty: f64,
    /// IRLS iteration cap (built-in backend).
    pub max_iterations: usize,
    /// IRLS relative deviance tolerance (built-in backend).
    pub tolerance: f64,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            radius: DEFAULT_RADIUS,
            edge_margin: None,
            window: PlotWindow::new(0.0, 1000.0, 0.0, 500.0),
            decay_kernel: "exponential".to_string(),
            decay_shapes: (1..=25).map(f64::from).collect(),
            smooth_ceiling: DEFAULT_SMOOTH_CEILING,
            run_timeout_secs: None,
            parallel: true,
            focal_groups: None,
            ridge_penalty: 1e-3,
            max_iterations: 100,
            tolerance: 1e-8,
        }
    }
}

impl PipelineConfig {
    /// Parse and validate a TOML document.
    pub fn from_toml_str(text: &str) -> Result<Self, DensityError> {
        let config: Self = toml::from_str(text).map_err(|e| DensityError::Config(e.to_string()))?;
        config.validate()?;
        Ok(config)
    }

    /// Read, parse and validate a TOML file.
    pub fn from_toml_file(path: impl AsRef<Path>) -> Result<Self, DensityError> {
        let path = path.as_ref();
        let text = fs::read_to_string(path)
            .map_err(|e| DensityError::Config(format!("{}: {e}", path.display())))?;
        Self::from_toml_str(&text)
    }

    /// Serialize back to TOML.
    pub fn to_toml_string(&self) -> Result<String, DensityError> {
        toml::to_string(self).map_err(|e| DensityError::Config(e.to_string()))
    }

    /// Per-run wall-clock guard as a [`Duration`].
    pub fn run_timeout(&self) -> Result<Option<Duration>, DensityError> {
        self.run_timeout_secs
            .map(|t| Duration::try_from_secs_f64(t).map_err(|_| DensityError::InvalidTimeout(t)))
            .transpose()
    }

    /// Effective edge margin.
    pub fn margin(&self) -> f64 {
        self.edge_margin.unwrap_or(self.radius)
    }

    /// Check every scalar parameter.
    pub fn validate(&self) -> Result<(), DensityError> {
        if !self.radius.is_finite() || self.radius < 0.0 {
            return Err(DensityError::InvalidRadius(self.radius));
        }
        let margin = self.margin();
        if !margin.is_finite() || margin < 0.0 {
            return Err(DensityError::InvalidMargin(margin));
        }
        self.window.validate()?;
        DecayKernel::from_name(&self.decay_kernel)?;
        if self.decay_shapes.is_empty() {
            return Err(DensityError::EmptyShapeSet);
        }
        if let Some(&bad) = self
            .decay_shapes
            .iter()
            .find(|s| !s.is_finite() || **s <= 0.0)
        {
            return Err(DensityError::InvalidDecayShape(bad));
        }
        if self.smooth_ceiling < 3 {
            return Err(DensityError::InvalidSmoothCeiling(self.smooth_ceiling));
        }
        if let Some(t) = self.run_timeout_secs {
            if !t.is_finite() || t <= 0.0 || Duration::try_from_secs_f64(t).is_err() {
                return Err(DensityError::InvalidTimeout(t));
            }
        }
        if !self.ridge_penalty.is_finite() || self.ridge_penalty < 0.0 {
            return Err(DensityError::Config(format!(
                "ridge_penalty must be finite and non-negative, got {}",
                self.ridge_penalty
            )));
        }
        if self.max_iterations == 0 {
            return Err(DensityError::Config(
                "max_iterations must be at least 1".to_string(),
            ));
        }
        if !self.tolerance.is_finite() || self.tolerance <= 0.0 {
            return Err(DensityError::Config(format!(
                "tolerance must be finite and positive, got {}",
                self.tolerance
            )));
        }
        Ok(())
    }
}
