//! Plot window and edge classification.
//!
//! Individuals closer to the plot boundary than a margin have incompletely
//! observed neighborhoods; they are flagged here and later excluded as focal
//! rows (they remain valid neighbors).

// External dependencies
use num_traits::Float;
use serde::{Deserialize, Serialize};

// Internal dependencies
use crate::input::PointInput;
use crate::primitives::errors::DensityError;

/// Axis-aligned plot bounding window.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct PlotWindow<T> {
    /// Minimum x.
    pub x_min: T,
    /// Maximum x.
    pub x_max: T,
    /// Minimum y.
    pub y_min: T,
    /// Maximum y.
    pub y_max: T,
}

impl<T: Float> PlotWindow<T> {
    /// Create a window from its bounds.
    pub fn new(x_min: T, x_max: T, y_min: T, y_max: T) -> Self {
        Self {
            x_min,
            x_max,
            y_min,
            y_max,
        }
    }

    /// Bounds must be finite and non-inverted.
    pub fn validate(&self) -> Result<(), DensityError> {
        let bounds = [self.x_min, self.x_max, self.y_min, self.y_max];
        if bounds.iter().any(|b| !b.is_finite()) {
            return Err(DensityError::InvalidWindow(
                "bounds must be finite".to_string(),
            ));
        }
        if self.x_min > self.x_max || self.y_min > self.y_max {
            return Err(DensityError::InvalidWindow(
                "minimum bound exceeds maximum bound".to_string(),
            ));
        }
        Ok(())
    }

    /// Whether `(x, y)` lies within `margin` of any of the four edges.
    #[inline]
    pub fn is_edge(&self, x: T, y: T, margin: T) -> bool {
        x - self.x_min < margin
            || self.x_max - x < margin
            || y - self.y_min < margin
            || self.y_max - y < margin
    }

    /// Convert the bounds to another float type.
    pub fn cast<U: Float>(&self) -> Option<PlotWindow<U>> {
        Some(PlotWindow {
            x_min: U::from(self.x_min)?,
            x_max: U::from(self.x_max)?,
            y_min: U::from(self.y_min)?,
            y_max: U::from(self.y_max)?,
        })
    }
}

/// Flag every point (interleaved `x, y`) lying within `margin` of the window edge.
pub fn classify_edges<T, I>(
    points: &I,
    window: &PlotWindow<T>,
    margin: T,
) -> Result<Vec<bool>, DensityError>
where
    T: Float,
    I: PointInput<T> + ?Sized,
{
    let points = points.as_point_slice()?;
    window.validate()?;
    if !margin.is_finite() || margin < T::zero() {
        return Err(DensityError::InvalidMargin(
            margin.to_f64().unwrap_or(f64::NAN),
        ));
    }
    Ok(points
        .chunks_exact(2)
        .map(|p| window.is_edge(p[0], p[1], margin))
        .collect())
}
