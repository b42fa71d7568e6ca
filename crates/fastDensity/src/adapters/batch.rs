//! Batch adapter for the density pipeline.
//!
//! ## Purpose
//!
//! This module provides the end-to-end batch execution of the pipeline over
//! one in-memory census interval: edge classification and proximity search,
//! neighborhood aggregation, the decay sweep, and selection.
//!
//! ## Design notes
//!
//! * **Processing**: Processes the entire census in a single pass per stage.
//! * **Delegation**: Delegates computation to the math, engine and evaluation layers.
//! * **Staged**: `features` and `sweep` can be called separately so a feature
//!   table can be reused across backends.
//!
//! ## Invariants
//!
//! * Output order matches input order.
//! * The pipeline always completes once validation passes; individual run
//!   failures are reported, never raised.
//!
//! ## Non-goals
//!
//! * This adapter does not stream censuses or handle several intervals at once.

// External dependencies
use num_traits::Float;
use serde::Serialize;
use tracing::info;

// Internal dependencies
use crate::engine::executor::aggregate_pass;
use crate::engine::output::FeatureTable;
use crate::evaluation::fitting::ModelFitter;
use crate::evaluation::selection::{select, SelectionReport};
use crate::evaluation::sweep::{
    run_sweep, AcceptedRun, CancelToken, RejectedRun, RunStore, SweepOptions, SweepPlan,
    SweepSummary,
};
use crate::math::boundary::{classify_edges, PlotWindow};
use crate::math::kernel::DecayFamily;
use crate::math::neighborhood::{PairSet, ProximityIndex};
use crate::primitives::census::Census;
use crate::primitives::errors::DensityError;

// ============================================================================
// Reports
// ============================================================================

/// Output of the sweep and selection stages.
#[derive(Debug, Clone, Serialize)]
pub struct SweepReport {
    /// Enumerated runs.
    pub plan: SweepPlan,
    /// Accepted runs in key order.
    pub accepted: Vec<AcceptedRun>,
    /// Rejected runs in key order.
    pub rejected: Vec<RejectedRun>,
    /// Accepted/rejected/discarded counts.
    pub summary: SweepSummary,
    /// Selection tables and optima.
    pub selection: SelectionReport,
}

/// Output of a full pipeline run.
#[derive(Debug, Clone, Serialize)]
pub struct PipelineReport<T> {
    /// Joined feature table.
    pub features: FeatureTable<T>,
    /// Sweep and selection output.
    pub sweep: SweepReport,
}

// ============================================================================
// Batch Pipeline
// ============================================================================

/// Validated batch pipeline. Built by [`crate::api::DensityBuilder`].
#[derive(Debug, Clone)]
pub struct DensityPipeline<T> {
    pub(crate) radius: T,
    pub(crate) margin: T,
    pub(crate) window: Option<PlotWindow<T>>,
    pub(crate) family: DecayFamily<T>,
    pub(crate) options: SweepOptions,
    pub(crate) focal_groups: Option<Vec<String>>,
}

impl<T: Float + Send + Sync> DensityPipeline<T> {
    /// Decay family in use.
    pub fn family(&self) -> &DecayFamily<T> {
        &self.family
    }

    /// Sweep execution settings.
    pub fn options(&self) -> &SweepOptions {
        &self.options
    }

    /// Configured window, or the bounding box of the census.
    pub fn resolve_window(&self, census: &Census<T>) -> Result<PlotWindow<T>, DensityError> {
        if let Some(window) = self.window {
            return Ok(window);
        }
        let mut rows = census.individuals().iter();
        let first = rows.next().ok_or_else(|| {
            DensityError::InvalidWindow("no window configured and the census is empty".to_string())
        })?;
        let mut w = PlotWindow::new(first.x, first.x, first.y, first.y);
        for ind in rows {
            w.x_min = w.x_min.min(ind.x);
            w.x_max = w.x_max.max(ind.x);
            w.y_min = w.y_min.min(ind.y);
            w.y_max = w.y_max.max(ind.y);
        }
        Ok(w)
    }

    /// Resolved edge flag per individual; upstream flags take precedence.
    pub fn edge_flags(&self, census: &Census<T>) -> Result<Vec<bool>, DensityError> {
        let window = self.resolve_window(census)?;
        let derived = classify_edges(&census.coordinates(), &window, self.margin)?;
        Ok(census
            .individuals()
            .iter()
            .zip(derived)
            .map(|(ind, d)| ind.edge.unwrap_or(d))
            .collect())
    }

    /// All ordered pairs within the radius.
    pub fn pairs(&self, census: &Census<T>) -> Result<PairSet<T>, DensityError> {
        let window = self.resolve_window(census)?;
        let coords = census.coordinates();
        let index = ProximityIndex::build(&coords, &window, self.radius)?;
        Ok(index.pairs(self.options.parallel))
    }

    /// Stage one: density summaries for every interior focal individual.
    pub fn features(&self, census: &Census<T>) -> Result<FeatureTable<T>, DensityError> {
        let edge = self.edge_flags(census)?;
        let pairs = self.pairs(census)?;
        info!(
            individuals = census.len(),
            edge_affected = edge.iter().filter(|&&e| e).count(),
            pairs = pairs.len(),
            shapes = self.family.len(),
            "proximity search complete"
        );

        let table = aggregate_pass(
            census.individuals(),
            &edge,
            &pairs,
            &self.family,
            self.options.parallel,
        );
        info!(rows = table.len(), "feature table built");
        Ok(table)
    }

    /// Enumerate the sweep for `table`.
    pub fn plan(&self, table: &FeatureTable<T>) -> SweepPlan {
        SweepPlan::new(table, self.focal_groups.as_deref())
    }

    /// Stage two: fit every run and select the optimum combinations.
    pub fn sweep<F>(&self, table: &FeatureTable<T>, fitter: &F) -> SweepReport
    where
        F: ModelFitter + ?Sized,
    {
        self.sweep_with_cancel(table, fitter, &CancelToken::new())
    }

    /// Stage two with an external cancellation token.
    pub fn sweep_with_cancel<F>(
        &self,
        table: &FeatureTable<T>,
        fitter: &F,
        cancel: &CancelToken,
    ) -> SweepReport
    where
        F: ModelFitter + ?Sized,
    {
        let plan = self.plan(table);
        let store = RunStore::new();
        let summary = run_sweep(table, &plan, fitter, &self.options, &store, cancel);
        let (accepted, rejected) = store.into_parts();
        let selection = select(table, &plan, &accepted);
        SweepReport {
            plan,
            accepted,
            rejected,
            summary,
            selection,
        }
    }

    /// Run both stages.
    pub fn run<F>(&self, census: &Census<T>, fitter: &F) -> Result<PipelineReport<T>, DensityError>
    where
        F: ModelFitter + ?Sized,
    {
        let features = self.features(census)?;
        let sweep = self.sweep(&features, fitter);
        Ok(PipelineReport { features, sweep })
    }
}
