//! Likelihood-based selection of the best decay combination.
//!
//! ## Purpose
//!
//! This module reduces accepted runs to selection records and picks the
//! optimum decay-shape combination under two policies:
//!
//! * **Global**: log-likelihood summed over every included group, optimum
//!   chosen independently per weighting basis.
//! * **Per group**: optimum per (group, basis) from that group's runs alone.
//!
//! ## Key concepts
//!
//! * **Exclusion**: A group with no positive or no negative outcomes, or
//!   without an accepted run for every combination, contributes to neither
//!   policy. Exclusions are reported, not swallowed.
//! * **Ties**: The earliest combination in enumeration order wins (own
//!   shape, then total shape).
//!
//! ## Invariants
//!
//! * Records are never mutated after construction.
//! * Identical inputs yield identical selections.

// External dependencies
use num_traits::Float;
use serde::Serialize;
use std::collections::{BTreeMap, HashMap};
use std::fmt;
use tracing::{info, warn};

// Internal dependencies
use crate::engine::output::{Basis, FeatureTable};
use crate::evaluation::sweep::{AcceptedRun, Combination, SweepPlan};

// ============================================================================
// Records
// ============================================================================

/// Why a group was left out of selection.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "kebab-case", tag = "reason")]
pub enum ExclusionReason {
    /// No individual had the positive outcome.
    NoPositiveOutcomes,
    /// Every individual had the positive outcome.
    NoNegativeOutcomes,
    /// Some combinations have no accepted run.
    Incomplete {
        /// Accepted runs found.
        accepted: usize,
        /// Runs required.
        expected: usize,
    },
}

impl fmt::Display for ExclusionReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::NoPositiveOutcomes => f.write_str("no positive outcomes"),
            Self::NoNegativeOutcomes => f.write_str("no negative outcomes"),
            Self::Incomplete { accepted, expected } => {
                write!(f, "incomplete ({accepted} of {expected} combinations accepted)")
            }
        }
    }
}

/// Aggregated score of one decay combination.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SelectionRecord {
    /// Group, for per-group records.
    pub group: Option<String>,
    /// Shape index for own-group density.
    pub own_shape: usize,
    /// Shape index for total density.
    pub total_shape: usize,
    /// Label of the own-group shape.
    pub own_label: String,
    /// Label of the total shape.
    pub total_label: String,
    /// Weighting basis.
    pub basis: Basis,
    /// Runs contributing.
    pub runs: usize,
    /// Summed log-likelihood.
    pub sum_log_likelihood: f64,
    /// Mean log-likelihood per run.
    pub mean_log_likelihood: f64,
}

impl SelectionRecord {
    /// The combination this record scores.
    pub fn combination(&self) -> Combination {
        Combination {
            own_shape: self.own_shape,
            total_shape: self.total_shape,
            basis: self.basis,
        }
    }
}

/// Selection tables and optima.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct SelectionReport {
    /// Groups entering selection.
    pub included: Vec<String>,
    /// Excluded groups and why.
    pub excluded: BTreeMap<String, ExclusionReason>,
    /// One record per combination, summed over included groups.
    pub global_records: Vec<SelectionRecord>,
    /// Global optimum per basis.
    pub global_optima: Vec<SelectionRecord>,
    /// One record per (included group, combination).
    pub group_records: Vec<SelectionRecord>,
    /// Per-group optimum per (group, basis).
    pub group_optima: Vec<SelectionRecord>,
}

impl SelectionReport {
    /// Global optimum for `basis`.
    pub fn global_optimum(&self, basis: Basis) -> Option<&SelectionRecord> {
        self.global_optima.iter().find(|r| r.basis == basis)
    }

    /// Per-group optimum for `group` and `basis`.
    pub fn group_optimum(&self, group: &str, basis: Basis) -> Option<&SelectionRecord> {
        self.group_optima
            .iter()
            .find(|r| r.basis == basis && r.group.as_deref() == Some(group))
    }
}

// ============================================================================
// Reduction
// ============================================================================

/// Reduce accepted runs to selection tables.
pub fn select<T: Float>(
    table: &FeatureTable<T>,
    plan: &SweepPlan,
    accepted: &[AcceptedRun],
) -> SelectionReport {
    let layout = table.layout();
    let expected = plan.combinations().len();

    let mut by_group: HashMap<&str, HashMap<Combination, f64>> = HashMap::new();
    for run in accepted {
        by_group
            .entry(run.key.group.as_str())
            .or_default()
            .insert(run.key.combination(), run.log_likelihood);
    }

    let mut report = SelectionReport::default();
    for group in plan.groups() {
        let (mut positive, mut negative) = (0usize, 0usize);
        for row in table.rows_for_group(group) {
            if row.outcome {
                positive += 1;
            } else {
                negative += 1;
            }
        }
        let found = by_group
            .get(group.as_str())
            .map_or(0, |runs| {
                plan.combinations()
                    .iter()
                    .filter(|c| runs.contains_key(*c))
                    .count()
            });

        let exclusion = if positive == 0 {
            Some(ExclusionReason::NoPositiveOutcomes)
        } else if negative == 0 {
            Some(ExclusionReason::NoNegativeOutcomes)
        } else if found < expected {
            Some(ExclusionReason::Incomplete {
                accepted: found,
                expected,
            })
        } else {
            None
        };

        match exclusion {
            Some(reason) => {
                warn!(group = %group, reason = ?reason, "group excluded from selection");
                report.excluded.insert(group.clone(), reason);
            }
            None => report.included.push(group.clone()),
        }
    }

    let record = |group: Option<&str>, c: &Combination, runs: usize, sum: f64| SelectionRecord {
        group: group.map(str::to_string),
        own_shape: c.own_shape,
        total_shape: c.total_shape,
        own_label: layout.shape_label(c.own_shape).to_string(),
        total_label: layout.shape_label(c.total_shape).to_string(),
        basis: c.basis,
        runs,
        sum_log_likelihood: sum,
        mean_log_likelihood: if runs > 0 { sum / runs as f64 } else { f64::NAN },
    };

    // Included groups are complete, so every lookup below succeeds.
    if !report.included.is_empty() {
        for c in plan.combinations() {
            let mut sum = 0.0;
            let mut runs = 0;
            for group in &report.included {
                if let Some(ll) = by_group.get(group.as_str()).and_then(|m| m.get(c)) {
                    sum += ll;
                    runs += 1;
                }
            }
            report.global_records.push(record(None, c, runs, sum));
        }
        report.global_optima = optima(&report.global_records);
    }

    for group in &report.included {
        let runs = &by_group[group.as_str()];
        let records: Vec<SelectionRecord> = plan
            .combinations()
            .iter()
            .filter_map(|c| runs.get(c).map(|&ll| record(Some(group.as_str()), c, 1, ll)))
            .collect();
        report.group_optima.extend(optima(&records));
        report.group_records.extend(records);
    }

    for best in &report.global_optima {
        info!(
            basis = best.basis.label(),
            own = %best.own_label,
            total = %best.total_label,
            loglik = best.sum_log_likelihood,
            "global optimum"
        );
    }
    report
}

/// Maximum summed log-likelihood per basis; first record wins ties.
fn optima(records: &[SelectionRecord]) -> Vec<SelectionRecord> {
    Basis::ALL
        .iter()
        .filter_map(|&basis| {
            let mut best: Option<&SelectionRecord> = None;
            for r in records.iter().filter(|r| r.basis == basis) {
                if !r.sum_log_likelihood.is_finite() {
                    continue;
                }
                if best.map_or(true, |b| r.sum_log_likelihood > b.sum_log_likelihood) {
                    best = Some(r);
                }
            }
            best.cloned()
        })
        .collect()
}
