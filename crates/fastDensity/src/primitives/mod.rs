//! Layer 1: Primitives
//!
//! ## Purpose
//!
//! This layer provides the data structures every other layer builds on:
//! the validated census table, the error taxonomy and the configuration.
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
//! Layer 2: Math
//!   ↓
//! Layer 1: Primitives ← You are here
//! ```

/// Census individuals and validation.
pub mod census;

/// Serializable pipeline configuration.
pub mod config;

/// Validation error taxonomy.
pub mod errors;
