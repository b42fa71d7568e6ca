//! Layer 3: Engine
//!
//! ## Purpose
//!
//! This layer runs the neighborhood aggregation pass and owns the joined
//! feature table handed to the model sweep.
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
//! Layer 3: Engine ← You are here
//!   ↓
//! Layer 2: Math
//!   ↓
//! Layer 1: Primitives
//! ```

/// Parallel neighborhood aggregation pass.
pub mod executor;

/// Metric layout and joined feature table.
pub mod output;
