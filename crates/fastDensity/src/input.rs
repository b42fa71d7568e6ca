//! Input abstractions for point coordinates.
//!
//! ## Purpose
//!
//! This module provides a unified abstraction for coordinate inputs, so the
//! proximity and edge passes accept slices, vectors and `ndarray` matrices
//! through a single interface.
//!
//! ## Design notes
//!
//! * **Zero-copy where possible**: Provides direct slice access to underlying data buffers.
//! * **Interoperability**: Bridges standard Rust collections with `ndarray`.
//! * **Fail-fast validation**: Rejects non-contiguous or wrongly shaped matrices.
//!
//! ## Invariants
//!
//! * Returned slices hold interleaved `x, y` coordinates (row-major `n x 2`).
//!
//! ## Non-goals
//!
//! * This module does not perform data cleaning or imputation.

// External dependencies
use ndarray::{ArrayBase, Data, Ix2};
use num_traits::Float;

// Internal dependencies
use crate::primitives::errors::DensityError;

/// Trait for types that can supply interleaved `x, y` coordinates.
pub trait PointInput<T: Float> {
    /// Convert the input to a contiguous interleaved slice.
    fn as_point_slice(&self) -> Result<&[T], DensityError>;
}

impl<T: Float> PointInput<T> for [T] {
    fn as_point_slice(&self) -> Result<&[T], DensityError> {
        check_interleaved(self)
    }
}

impl<T: Float> PointInput<T> for Vec<T> {
    fn as_point_slice(&self) -> Result<&[T], DensityError> {
        check_interleaved(self.as_slice())
    }
}

impl<T: Float, S> PointInput<T> for ArrayBase<S, Ix2>
where
    S: Data<Elem = T>,
{
    fn as_point_slice(&self) -> Result<&[T], DensityError> {
        if self.ncols() != 2 {
            return Err(DensityError::InvalidInput(format!(
                "coordinate matrix must have 2 columns, got {}",
                self.ncols()
            )));
        }
        self.as_slice().ok_or_else(|| {
            DensityError::InvalidInput(
                "coordinate matrix must be contiguous in row-major order".to_string(),
            )
        })
    }
}

fn check_interleaved<T>(slice: &[T]) -> Result<&[T], DensityError> {
    if slice.len() % 2 != 0 {
        return Err(DensityError::InvalidInput(
            "point buffer must hold interleaved x, y pairs".to_string(),
        ));
    }
    Ok(slice)
}
