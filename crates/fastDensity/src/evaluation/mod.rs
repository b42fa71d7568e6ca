//! Layer 4: Evaluation
//!
//! ## Purpose
//!
//! This layer fits models over the feature table and selects the decay
//! combination that best explains the outcome: the backend contract, the
//! built-in backend, the separation heuristic, the parallel sweep and the
//! selection reducer.
//!
//! ## Architecture
//!
//! ```text
//! Layer 6: API
//!   ↓
//! Layer 5: Adapters
//!   ↓
//! Layer 4: Evaluation ← You are here
//!   ↓
//! Layer 3: Engine
//!   ↓
//! Layer 2: Math
//!   ↓
//! Layer 1: Primitives
//! ```

/// Model backend contract.
pub mod fitting;

/// Built-in penalized binomial GLM backend.
pub mod glm;

/// Likelihood-based selection reducer.
pub mod selection;

/// Complete-separation heuristic.
pub mod separation;

/// Parallel decay sweep.
pub mod sweep;
