//! Decay functions for distance-based neighbor weighting.
//!
//! ## Purpose
//!
//! This module provides the family of decay functions used to weight
//! neighbors by distance. Each member is indexed by a positive shape value;
//! a sentinel member ("no decay") weights every neighbor by one.
//!
//! ## Design notes
//!
//! * **Pure**: Weight evaluation is deterministic, O(1) and allocation-free.
//! * **Ordered**: The shape set is sorted once (`NoDecay` first, then
//!   ascending shape values) so output columns are reproducible.
//! * **Generics**: Generic over `Float` types.
//!
//! ## Invariants
//!
//! * `weight(shape, 0) == 1` for every shape.
//! * Weights lie in `[0, 1]` and are non-increasing in distance.
//! * Shape values are finite and strictly positive.

// External dependencies
use core::cmp::Ordering;
use num_traits::Float;
use serde::{Deserialize, Serialize};

// Internal dependencies
use crate::primitives::errors::DensityError;

// ============================================================================
// Decay Kernel
// ============================================================================

/// Functional form of the decay.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DecayKernel {
    /// `exp(-d / shape)`.
    #[default]
    Exponential,
    /// `exp(-(d / shape)^2)`.
    Gaussian,
}

impl DecayKernel {
    /// Parse a kernel name.
    pub fn from_name(name: &str) -> Result<Self, DensityError> {
        match name.trim().to_lowercase().as_str() {
            "exponential" | "exp" => Ok(DecayKernel::Exponential),
            "gaussian" | "gauss" | "normal" => Ok(DecayKernel::Gaussian),
            _ => Err(DensityError::UnknownDecayKernel(name.to_string())),
        }
    }

    /// Short prefix used in metric labels.
    pub fn prefix(self) -> &'static str {
        match self {
            DecayKernel::Exponential => "exp",
            DecayKernel::Gaussian => "gauss",
        }
    }

    /// Weight of a neighbor at `distance` under `shape`.
    #[inline]
    pub fn weight<T: Float>(self, shape: DecayShape<T>, distance: T) -> T {
        match shape {
            DecayShape::NoDecay => T::one(),
            DecayShape::Shape(s) => {
                let scaled = distance / s;
                match self {
                    DecayKernel::Exponential => (-scaled).exp(),
                    DecayKernel::Gaussian => (-(scaled * scaled)).exp(),
                }
            }
        }
    }
}

// ============================================================================
// Decay Shape
// ============================================================================

/// One member of the decay family.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum DecayShape<T> {
    /// Sentinel: every neighbor weighs one.
    NoDecay,
    /// Shape-parameterized decay.
    Shape(T),
}

impl<T: Float> DecayShape<T> {
    /// Shape value, or `None` for the sentinel.
    pub fn value(self) -> Option<T> {
        match self {
            DecayShape::NoDecay => None,
            DecayShape::Shape(s) => Some(s),
        }
    }

}

// ============================================================================
// Decay Family
// ============================================================================

/// Ordered, validated set of decay shapes sharing one kernel.
#[derive(Debug, Clone)]
pub struct DecayFamily<T> {
    kernel: DecayKernel,
    shapes: Vec<DecayShape<T>>,
    labels: Vec<String>,
}

impl<T: Float> DecayFamily<T> {
    /// Build the family from raw shape values.
    ///
    /// The "no decay" sentinel is always included at index 0. Duplicate
    /// values are collapsed.
    pub fn new(kernel: DecayKernel, values: &[T]) -> Result<Self, DensityError> {
        if values.is_empty() {
            return Err(DensityError::EmptyShapeSet);
        }
        let mut sorted = Vec::with_capacity(values.len());
        for &v in values {
            if !v.is_finite() || v <= T::zero() {
                return Err(DensityError::InvalidDecayShape(
                    v.to_f64().unwrap_or(f64::NAN),
                ));
            }
            sorted.push(v);
        }
        sorted.sort_by(|a, b| a.partial_cmp(b).unwrap_or(Ordering::Equal));
        sorted.dedup();

        let mut shapes = Vec::with_capacity(sorted.len() + 1);
        shapes.push(DecayShape::NoDecay);
        shapes.extend(sorted.into_iter().map(DecayShape::Shape));

        let labels = shapes
            .iter()
            .map(|shape| match shape.value() {
                None => "none".to_string(),
                Some(v) => format!("{}_{}", kernel.prefix(), v.to_f64().unwrap_or(f64::NAN)),
            })
            .collect();

        Ok(Self {
            kernel,
            shapes,
            labels,
        })
    }

    /// Kernel shared by all members.
    pub fn kernel(&self) -> DecayKernel {
        self.kernel
    }

    /// Members in stable order, sentinel first.
    pub fn shapes(&self) -> &[DecayShape<T>] {
        &self.shapes
    }

    /// Number of members including the sentinel.
    pub fn len(&self) -> usize {
        self.shapes.len()
    }

    /// Always false: the sentinel is always present.
    pub fn is_empty(&self) -> bool {
        self.shapes.is_empty()
    }

    /// Label of the member at `index`.
    pub fn label(&self, index: usize) -> &str {
        &self.labels[index]
    }

    /// Weight of member `index` at `distance`.
    #[inline]
    pub fn weight(&self, index: usize, distance: T) -> T {
        self.kernel.weight(self.shapes[index], distance)
    }

    /// Fill `out` with one weight per member.
    #[inline]
    pub fn evaluate_into(&self, distance: T, out: &mut [T]) {
        for (w, &shape) in out.iter_mut().zip(self.shapes.iter()) {
            *w = self.kernel.weight(shape, distance);
        }
    }
}
