//! Layer 5: Adapters
//!
//! ## Purpose
//!
//! This layer wires the lower layers into an executable pipeline. The batch
//! adapter processes one complete census interval in memory.
//!
//! ## Architecture
//!
//! ```text
//! Layer 6: API
//!   ↓
//! Layer 5: Adapters ← You are here
//!   ↓
//! Layer 4: Evaluation
//!   ↓
//! Layer 3: Engine
//!   ↓
//! Layer 2: Math
//!   ↓
//! Layer 1: Primitives
//! ```

/// In-memory batch pipeline.
pub mod batch;
