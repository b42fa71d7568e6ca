//! Parallel parameter sweep over decay-shape combinations.
//!
//! ## Purpose
//!
//! This module fits one model per combination of (focal group, own-group
//! decay shape, total decay shape, weighting basis) and keeps the fits that
//! pass every acceptance check. Each run is independent, which makes the
//! sweep an ideal candidate for parallelization.
//!
//! ## Design notes
//!
//! * **Parallelism**: Uses `rayon` to evaluate runs in parallel.
//! * **State Machine**: Each run moves `Pending -> Fitting -> {Accepted, Rejected}`
//!   with a named rejection reason.
//! * **Result Store**: Accepted and rejected runs are merged through a keyed,
//!   append-only store, so completion order never matters.
//! * **Cancellation**: A shared token discards runs that have not completed;
//!   runs already accepted remain valid.
//!
//! ## Key concepts
//!
//! * **Acceptance precedence**: fit-failed, no-convergence, separation,
//!   no-covariance. The first failing check names the rejection.
//! * **Adaptive flexibility**: Each smooth term uses the ceiling, or
//!   `ceiling - 2` when its covariate has fewer distinct values than the
//!   ceiling within the focal group.
//!
//! ## Invariants
//!
//! * Enumeration order is group, own shape, total shape, basis; the position
//!   in that order is the run identifier.
//! * No run's acceptance depends on another run.
//!
//! ## Non-goals
//!
//! * This module does not rank runs (handled by `selection`).
//! * This module does not implement a statistical model (handled by the backend).

// Feature-gated imports
#[cfg(feature = "cpu")]
use rayon::prelude::*;

// External dependencies
use num_traits::Float;
use parking_lot::Mutex;
use serde::Serialize;
use std::collections::BTreeMap;
use std::fmt;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tracing::{debug, info, warn};

// Internal dependencies
use crate::engine::output::{Basis, ComparisonClass, FeatureTable};
use crate::evaluation::fitting::{
    FitControl, FitData, FitError, FitResult, ModelFitter, ModelSpec, SmoothTerm,
};
use crate::evaluation::separation::{detect_separation, SEPARATION_INFLUENCE_FRACTION};

// ============================================================================
// Run Identity and State
// ============================================================================

/// Decay-shape combination shared by all focal groups.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize)]
pub struct Combination {
    /// Shape index used for own-group density.
    pub own_shape: usize,
    /// Shape index used for total density.
    pub total_shape: usize,
    /// Weighting basis.
    pub basis: Basis,
}

/// Identity of one run.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize)]
pub struct RunKey {
    /// Focal group.
    pub group: String,
    /// Shape index used for own-group density.
    pub own_shape: usize,
    /// Shape index used for total density.
    pub total_shape: usize,
    /// Weighting basis.
    pub basis: Basis,
}

impl RunKey {
    /// The group-independent part of the key.
    pub fn combination(&self) -> Combination {
        Combination {
            own_shape: self.own_shape,
            total_shape: self.total_shape,
            basis: self.basis,
        }
    }
}

/// Why a run was rejected.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize)]
#[serde(rename_all = "kebab-case")]
pub enum RejectReason {
    /// The backend raised an error, timed out, or returned an unusable likelihood.
    FitFailed,
    /// The backend did not converge.
    NoConvergence,
    /// Complete separation is suspected.
    Separation,
    /// No usable covariance estimate.
    NoCovariance,
}

impl RejectReason {
    /// Stable reason label.
    pub fn as_str(self) -> &'static str {
        match self {
            RejectReason::FitFailed => "fit-failed",
            RejectReason::NoConvergence => "no-convergence",
            RejectReason::Separation => "separation",
            RejectReason::NoCovariance => "no-covariance",
        }
    }
}

impl fmt::Display for RejectReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Lifecycle of a run.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RunState {
    /// Enumerated, not started.
    Pending,
    /// Handed to the backend.
    Fitting,
    /// Passed every acceptance check.
    Accepted,
    /// Failed an acceptance check.
    Rejected(RejectReason),
}

impl RunState {
    /// `Pending -> Fitting`; any other state is left unchanged.
    pub fn begin(self) -> Self {
        match self {
            RunState::Pending => RunState::Fitting,
            other => other,
        }
    }

    /// `Fitting -> {Accepted, Rejected}`; any other state is left unchanged.
    pub fn complete(self, verdict: Result<(), RejectReason>) -> Self {
        match (self, verdict) {
            (RunState::Fitting, Ok(())) => RunState::Accepted,
            (RunState::Fitting, Err(reason)) => RunState::Rejected(reason),
            (other, _) => other,
        }
    }

    /// Whether the run reached a terminal state.
    pub fn is_terminal(self) -> bool {
        matches!(self, RunState::Accepted | RunState::Rejected(_))
    }
}

// ============================================================================
// Acceptance Checks
// ============================================================================

/// Apply the acceptance checks in their fixed precedence.
///
/// `overran` marks a fit that completed after its wall-clock deadline; it is
/// treated like a backend error.
pub fn acceptance_check(
    outcome: Result<FitResult, FitError>,
    overran: bool,
) -> Result<FitResult, RejectReason> {
    let result = outcome.map_err(|_| RejectReason::FitFailed)?;
    if overran || !result.log_likelihood.is_finite() {
        return Err(RejectReason::FitFailed);
    }
    if !result.converged {
        return Err(RejectReason::NoConvergence);
    }
    if detect_separation(
        &result.fitted,
        &result.leverage,
        SEPARATION_INFLUENCE_FRACTION,
    ) {
        return Err(RejectReason::Separation);
    }
    if !result.has_covariance() {
        return Err(RejectReason::NoCovariance);
    }
    Ok(result)
}

/// Flexibility for one smooth term given its distinct covariate values.
pub fn smooth_dimension(distinct: usize, ceiling: usize) -> usize {
    if distinct < ceiling {
        ceiling.saturating_sub(2)
    } else {
        ceiling
    }
}

fn count_distinct(values: &[f64]) -> usize {
    let mut sorted = values.to_vec();
    sorted.sort_by(f64::total_cmp);
    sorted.dedup();
    sorted.len()
}

// ============================================================================
// Result Store
// ============================================================================

/// An accepted run and its fitted artifact.
#[derive(Debug, Clone, Serialize)]
pub struct AcceptedRun {
    /// Enumeration index.
    pub id: usize,
    /// Run identity.
    pub key: RunKey,
    /// Rendered model formula.
    pub formula: String,
    /// Smooth terms with their flexibility.
    pub smooths: Vec<SmoothTerm>,
    /// Observations in the focal group.
    pub n_obs: usize,
    /// Log-likelihood of the fit.
    pub log_likelihood: f64,
    /// Fitted artifact.
    pub result: FitResult,
}

/// A rejected run.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct RejectedRun {
    /// Enumeration index.
    pub id: usize,
    /// Run identity.
    pub key: RunKey,
    /// Rejection reason.
    pub reason: RejectReason,
}

/// Thread-safe, append-only store of run outcomes keyed by run identity.
///
/// The first outcome recorded for a key wins; re-recording is a no-op.
#[derive(Debug, Default)]
pub struct RunStore {
    accepted: Mutex<BTreeMap<RunKey, AcceptedRun>>,
    rejected: Mutex<BTreeMap<RunKey, RejectedRun>>,
}

impl RunStore {
    /// Empty store.
    pub fn new() -> Self {
        Self::default()
    }

    /// Record an accepted run.
    pub fn record_accepted(&self, run: AcceptedRun) {
        self.accepted.lock().entry(run.key.clone()).or_insert(run);
    }

    /// Record a rejected run.
    pub fn record_rejected(&self, run: RejectedRun) {
        self.rejected.lock().entry(run.key.clone()).or_insert(run);
    }

    /// Number of accepted runs.
    pub fn accepted_len(&self) -> usize {
        self.accepted.lock().len()
    }

    /// Number of rejected runs.
    pub fn rejected_len(&self) -> usize {
        self.rejected.lock().len()
    }

    /// Whether `key` was accepted.
    pub fn is_accepted(&self, key: &RunKey) -> bool {
        self.accepted.lock().contains_key(key)
    }

    /// Drain into key-ordered vectors.
    pub fn into_parts(self) -> (Vec<AcceptedRun>, Vec<RejectedRun>) {
        (
            self.accepted.into_inner().into_values().collect(),
            self.rejected.into_inner().into_values().collect(),
        )
    }
}

/// Cooperative cancellation flag shared with the sweep workers.
#[derive(Debug, Clone, Default)]
pub struct CancelToken(Arc<AtomicBool>);

impl CancelToken {
    /// Fresh, uncancelled token.
    pub fn new() -> Self {
        Self::default()
    }

    /// Request cancellation.
    pub fn cancel(&self) {
        self.0.store(true, Ordering::SeqCst);
    }

    /// Whether cancellation was requested.
    pub fn is_cancelled(&self) -> bool {
        self.0.load(Ordering::SeqCst)
    }
}

// ============================================================================
// Sweep Plan
// ============================================================================

/// Deterministic enumeration of every run.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SweepPlan {
    groups: Vec<String>,
    unmatched_groups: Vec<String>,
    combinations: Vec<Combination>,
    runs: Vec<RunKey>,
}

impl SweepPlan {
    /// Enumerate runs for every group of `table`, or only for `focal_groups`.
    pub fn new<T: Float>(table: &FeatureTable<T>, focal_groups: Option<&[String]>) -> Self {
        let available = table.groups();
        let groups: Vec<String> = available
            .iter()
            .filter(|g| focal_groups.map_or(true, |allowed| allowed.iter().any(|a| a == *g)))
            .map(|g| g.to_string())
            .collect();

        let mut unmatched_groups: Vec<String> = focal_groups
            .unwrap_or_default()
            .iter()
            .filter(|a| !available.contains(&a.as_str()))
            .cloned()
            .collect();
        unmatched_groups.sort();
        unmatched_groups.dedup();
        for group in &unmatched_groups {
            warn!(group = %group, "requested focal group has no interior individuals");
        }

        let n_shapes = table.layout().n_shapes();
        let mut combinations = Vec::with_capacity(n_shapes * n_shapes * Basis::ALL.len());
        for own_shape in 0..n_shapes {
            for total_shape in 0..n_shapes {
                for basis in Basis::ALL {
                    combinations.push(Combination {
                        own_shape,
                        total_shape,
                        basis,
                    });
                }
            }
        }

        let runs = groups
            .iter()
            .flat_map(|group| {
                combinations.iter().map(move |c| RunKey {
                    group: group.clone(),
                    own_shape: c.own_shape,
                    total_shape: c.total_shape,
                    basis: c.basis,
                })
            })
            .collect();

        Self {
            groups,
            unmatched_groups,
            combinations,
            runs,
        }
    }

    /// Swept focal groups, sorted.
    pub fn groups(&self) -> &[String] {
        &self.groups
    }

    /// Requested focal groups absent from the feature table, sorted.
    pub fn unmatched_groups(&self) -> &[String] {
        &self.unmatched_groups
    }

    /// Combinations in enumeration order.
    pub fn combinations(&self) -> &[Combination] {
        &self.combinations
    }

    /// Every run in enumeration order.
    pub fn runs(&self) -> &[RunKey] {
        &self.runs
    }

    /// Total number of runs.
    pub fn len(&self) -> usize {
        self.runs.len()
    }

    /// Whether there is nothing to fit.
    pub fn is_empty(&self) -> bool {
        self.runs.is_empty()
    }
}

// ============================================================================
// Sweep Execution
// ============================================================================

/// Execution settings for the sweep.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct SweepOptions {
    /// Ceiling for smooth-term flexibility.
    pub smooth_ceiling: usize,
    /// Per-run wall-clock guard.
    pub timeout: Option<Duration>,
    /// Fit runs in parallel when the `cpu` feature is available.
    pub parallel: bool,
}

impl Default for SweepOptions {
    fn default() -> Self {
        Self {
            smooth_ceiling: 10,
            timeout: None,
            parallel: true,
        }
    }
}

/// Counts reported when the sweep completes.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct SweepSummary {
    /// Runs enumerated.
    pub total: usize,
    /// Runs accepted.
    pub accepted: usize,
    /// Rejections per reason label.
    pub rejected: BTreeMap<String, usize>,
    /// Runs dropped because the sweep was cancelled.
    pub discarded: usize,
    /// Whether cancellation was requested.
    pub cancelled: bool,
}

impl SweepSummary {
    /// Total rejected runs.
    pub fn rejected_total(&self) -> usize {
        self.rejected.values().sum()
    }
}

enum Disposition {
    Accepted,
    Rejected(RejectReason),
    Discarded,
}

/// Build the model specification and data subset for one run.
pub fn build_run<T: Float>(
    table: &FeatureTable<T>,
    rows: &[usize],
    key: &RunKey,
    smooth_ceiling: usize,
) -> (ModelSpec, FitData) {
    let layout = table.layout();
    let to_f64 = |v: T| v.to_f64().unwrap_or(f64::NAN);
    let all = table.rows();

    let size: Vec<f64> = rows.iter().map(|&r| to_f64(all[r].size)).collect();
    let own: Vec<f64> = rows
        .iter()
        .map(|&r| to_f64(table.metric(r, ComparisonClass::Own, key.own_shape, key.basis)))
        .collect();
    let total: Vec<f64> = rows
        .iter()
        .map(|&r| {
            to_f64(table.metric(
                r,
                ComparisonClass::Combined,
                key.total_shape,
                key.basis,
            ))
        })
        .collect();

    let names = [
        "size".to_string(),
        layout.column_name(ComparisonClass::Own, key.own_shape, key.basis),
        layout.column_name(ComparisonClass::Combined, key.total_shape, key.basis),
    ];
    let covariates = vec![size, own, total];
    let smooths = names
        .into_iter()
        .zip(covariates.iter())
        .map(|(name, values)| SmoothTerm {
            name,
            k: smooth_dimension(count_distinct(values), smooth_ceiling),
        })
        .collect();

    let spec = ModelSpec {
        group: key.group.clone(),
        response: "outcome".to_string(),
        smooths,
        exposure: "interval".to_string(),
    };
    let data = FitData {
        response: rows
            .iter()
            .map(|&r| if all[r].outcome { 1.0 } else { 0.0 })
            .collect(),
        covariates,
        exposure: rows.iter().map(|&r| to_f64(all[r].interval)).collect(),
    };
    (spec, data)
}

/// Fit every run of `plan`, recording outcomes into `store`.
pub fn run_sweep<T, F>(
    table: &FeatureTable<T>,
    plan: &SweepPlan,
    fitter: &F,
    options: &SweepOptions,
    store: &RunStore,
    cancel: &CancelToken,
) -> SweepSummary
where
    T: Float + Send + Sync,
    F: ModelFitter + ?Sized,
{
    let mut group_rows: BTreeMap<&str, Vec<usize>> = BTreeMap::new();
    for (i, row) in table.rows().iter().enumerate() {
        group_rows.entry(row.group.as_str()).or_default().push(i);
    }

    info!(
        runs = plan.len(),
        groups = plan.groups().len(),
        combinations = plan.combinations().len(),
        "starting decay sweep"
    );

    let execute = |(id, key): (usize, &RunKey)| {
        let rows = group_rows
            .get(key.group.as_str())
            .map(Vec::as_slice)
            .unwrap_or(&[]);
        execute_run(id, key, table, rows, fitter, options, store, cancel)
    };

    #[cfg(feature = "cpu")]
    let dispositions: Vec<Disposition> = if options.parallel {
        plan.runs().par_iter().enumerate().map(execute).collect()
    } else {
        plan.runs().iter().enumerate().map(execute).collect()
    };

    #[cfg(not(feature = "cpu"))]
    let dispositions: Vec<Disposition> = plan.runs().iter().enumerate().map(execute).collect();

    let mut summary = SweepSummary {
        total: plan.len(),
        cancelled: cancel.is_cancelled(),
        ..SweepSummary::default()
    };
    for d in dispositions {
        match d {
            Disposition::Accepted => summary.accepted += 1,
            Disposition::Rejected(reason) => {
                *summary.rejected.entry(reason.to_string()).or_insert(0) += 1
            }
            Disposition::Discarded => summary.discarded += 1,
        }
    }

    if summary.cancelled {
        warn!(
            discarded = summary.discarded,
            accepted = summary.accepted,
            "decay sweep cancelled"
        );
    }
    info!(
        accepted = summary.accepted,
        rejected = summary.rejected_total(),
        discarded = summary.discarded,
        "decay sweep finished"
    );
    summary
}

#[allow(clippy::too_many_arguments)]
fn execute_run<T, F>(
    id: usize,
    key: &RunKey,
    table: &FeatureTable<T>,
    rows: &[usize],
    fitter: &F,
    options: &SweepOptions,
    store: &RunStore,
    cancel: &CancelToken,
) -> Disposition
where
    T: Float,
    F: ModelFitter + ?Sized,
{
    if cancel.is_cancelled() {
        return Disposition::Discarded;
    }

    let mut state = RunState::Pending;
    let (spec, data) = build_run(table, rows, key, options.smooth_ceiling);

    state = state.begin();
    let deadline = options.timeout.and_then(|t| Instant::now().checked_add(t));
    let control = FitControl { deadline };
    let outcome = fitter.fit(&spec, &data, &control);
    let overran = deadline.is_some_and(|d| Instant::now() > d);

    if cancel.is_cancelled() {
        debug!(run = id, group = %key.group, "run discarded after cancellation");
        return Disposition::Discarded;
    }

    if let Err(ref e) = outcome {
        debug!(run = id, group = %key.group, error = %e, "backend error");
    }
    let verdict = acceptance_check(outcome, overran);
    state = state.complete(verdict.as_ref().map(|_| ()).map_err(|r| *r));

    match (state, verdict) {
        (RunState::Accepted, Ok(result)) => {
            debug!(run = id, group = %key.group, loglik = result.log_likelihood, "run accepted");
            store.record_accepted(AcceptedRun {
                id,
                key: key.clone(),
                formula: spec.to_string(),
                smooths: spec.smooths,
                n_obs: data.n_obs(),
                log_likelihood: result.log_likelihood,
                result,
            });
            Disposition::Accepted
        }
        (_, verdict) => {
            let reason = verdict.err().unwrap_or(RejectReason::FitFailed);
            debug!(run = id, group = %key.group, reason = %reason, "run rejected");
            store.record_rejected(RejectedRun {
                id,
                key: key.clone(),
                reason,
            });
            Disposition::Rejected(reason)
        }
    }
}
