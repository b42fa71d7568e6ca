//! Census records for a single census interval.
//!
//! ## Purpose
//!
//! This module holds the canonical per-individual table consumed by the
//! pipeline: one row per individual alive at the start of the interval.
//!
//! ## Invariants
//!
//! * Coordinates and sizes are finite; sizes are non-negative.
//! * Interval lengths are finite and strictly positive.
//! * Identities are unique within a census.
//!
//! ## Non-goals
//!
//! * This module does not load or clean raw census files.
//! * This module does not track individuals across censuses.

// External dependencies
use num_traits::Float;
use serde::{Deserialize, Serialize};
use std::collections::HashSet;

// Internal dependencies
use crate::primitives::errors::DensityError;

/// One mapped individual (e.g. a stem) at the start of a census interval.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Individual<T> {
    /// Unique identity within the census.
    pub id: String,
    /// Group label (e.g. species code).
    pub group: String,
    /// Easting.
    pub x: T,
    /// Northing.
    pub y: T,
    /// Size measure (e.g. stem diameter).
    pub size: T,
    /// Outcome at interval end; `true` is the positive case (death).
    pub outcome: bool,
    /// Census interval length, used as the exposure term.
    pub interval: T,
    /// Upstream boundary flag. `None` means derive it from the plot window.
    #[serde(default)]
    pub edge: Option<bool>,
}

impl<T: Float> Individual<T> {
    /// Create an individual without an upstream boundary flag.
    pub fn new(
        id: impl Into<String>,
        group: impl Into<String>,
        x: T,
        y: T,
        size: T,
        outcome: bool,
        interval: T,
    ) -> Self {
        Self {
            id: id.into(),
            group: group.into(),
            x,
            y,
            size,
            outcome,
            interval,
            edge: None,
        }
    }

    /// Attach an upstream boundary flag.
    pub fn with_edge(mut self, edge: bool) -> Self {
        self.edge = Some(edge);
        self
    }

    fn validate(&self) -> Result<(), DensityError> {
        if !self.x.is_finite() || !self.y.is_finite() {
            return Err(DensityError::NonFiniteCoordinate {
                id: self.id.clone(),
            });
        }
        if !self.size.is_finite() {
            return Err(DensityError::NonFiniteSize {
                id: self.id.clone(),
            });
        }
        if self.size < T::zero() {
            return Err(DensityError::NegativeSize {
                id: self.id.clone(),
                size: self.size.to_f64().unwrap_or(f64::NAN),
            });
        }
        if !self.interval.is_finite() || self.interval <= T::zero() {
            return Err(DensityError::InvalidInterval {
                id: self.id.clone(),
                interval: self.interval.to_f64().unwrap_or(f64::NAN),
            });
        }
        Ok(())
    }
}

/// Validated census table for one interval.
#[derive(Debug, Clone)]
pub struct Census<T> {
    individuals: Vec<Individual<T>>,
}

impl<T: Float> Census<T> {
    /// Validate and wrap a set of individuals.
    pub fn new(individuals: Vec<Individual<T>>) -> Result<Self, DensityError> {
        let mut seen = HashSet::with_capacity(individuals.len());
        for ind in &individuals {
            ind.validate()?;
            if !seen.insert(ind.id.as_str()) {
                return Err(DensityError::DuplicateIdentity(ind.id.clone()));
            }
        }
        Ok(Self { individuals })
    }

    /// Number of individuals.
    pub fn len(&self) -> usize {
        self.individuals.len()
    }

    /// Whether the census is empty.
    pub fn is_empty(&self) -> bool {
        self.individuals.is_empty()
    }

    /// Borrow the rows in input order.
    pub fn individuals(&self) -> &[Individual<T>] {
        &self.individuals
    }

    /// Interleaved `x, y` coordinates in input order.
    pub fn coordinates(&self) -> Vec<T> {
        let mut coords = Vec::with_capacity(self.individuals.len() * 2);
        for ind in &self.individuals {
            coords.push(ind.x);
            coords.push(ind.y);
        }
        coords
    }
}
