//! Layer 2: Math
//!
//! ## Purpose
//!
//! This layer provides the pure spatial and weighting building blocks:
//! decay functions, the fixed-radius proximity index and edge
//! classification.
//!
//! ## Architecture
//!
//! ```text
//! Layer 6: API
//!   ↓
//! Layer 5: Adapters
//!   ↓
//! Layer 4: Evaluation
//!   ↓
//! Layer 3: Engine
//!   ↓
//! Layer 2: Math ← You are here
//!   ↓
//! Layer 1: Primitives
//! ```

/// Plot window and edge classification.
pub mod boundary;

/// Decay (weight) functions for distance-based weighting.
pub mod kernel;

/// Fixed-radius proximity index (grid bucketing).
pub mod neighborhood;
