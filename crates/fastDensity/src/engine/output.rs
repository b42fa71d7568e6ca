//! Joined feature table produced by the aggregation pass.
//!
//! ## Purpose
//!
//! Density summaries are stored as dense vectors addressed through a
//! [`MetricLayout`] keyed by (comparison class, decay shape, basis) rather than
//! as literal named columns. The decay-shape set is therefore a runtime
//! parameter, and flattened column names are only produced on demand for
//! reporting.
//!
//! ## Invariants
//!
//! * Every row holds one value per metric for every comparison class.
//! * `combined[m] == own[m] + other[m]` for every metric `m`.
//! * Rows keep census input order.

// External dependencies
use num_traits::Float;
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;

// Internal dependencies
use crate::math::kernel::DecayFamily;

// ============================================================================
// Metric Keys
// ============================================================================

/// What each neighbor contributes to a density summary.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Basis {
    /// Neighbor count.
    Count,
    /// Sum of neighbor sizes.
    Size,
}

impl Basis {
    /// Both bases in enumeration order.
    pub const ALL: [Basis; 2] = [Basis::Count, Basis::Size];

    /// Position within a shape's metric block.
    #[inline]
    pub fn index(self) -> usize {
        match self {
            Basis::Count => 0,
            Basis::Size => 1,
        }
    }

    /// Label used in column names.
    pub fn label(self) -> &'static str {
        match self {
            Basis::Count => "count",
            Basis::Size => "size",
        }
    }
}

/// Which neighbors a density summary is taken over.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ComparisonClass {
    /// Neighbors sharing the focal group label.
    Own,
    /// Neighbors with a different group label.
    Other,
    /// All neighbors (`own + other`).
    Combined,
}

impl ComparisonClass {
    /// All classes in reporting order.
    pub const ALL: [ComparisonClass; 3] = [
        ComparisonClass::Own,
        ComparisonClass::Other,
        ComparisonClass::Combined,
    ];

    /// Label used in column names.
    pub fn label(self) -> &'static str {
        match self {
            ComparisonClass::Own => "own",
            ComparisonClass::Other => "other",
            ComparisonClass::Combined => "combined",
        }
    }
}

/// Maps (shape index, basis) to a position in a metric vector.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MetricLayout {
    shape_labels: Vec<String>,
}

impl MetricLayout {
    /// Layout for every member of `family`.
    pub fn from_family<T: Float>(family: &DecayFamily<T>) -> Self {
        Self {
            shape_labels: (0..family.len())
                .map(|i| family.label(i).to_string())
                .collect(),
        }
    }

    /// Number of decay shapes, sentinel included.
    pub fn n_shapes(&self) -> usize {
        self.shape_labels.len()
    }

    /// Metrics per comparison class.
    pub fn n_metrics(&self) -> usize {
        self.shape_labels.len() * Basis::ALL.len()
    }

    /// Position of (shape, basis) in a metric vector.
    #[inline]
    pub fn index(&self, shape: usize, basis: Basis) -> usize {
        shape * Basis::ALL.len() + basis.index()
    }

    /// Label of a decay shape.
    pub fn shape_label(&self, shape: usize) -> &str {
        &self.shape_labels[shape]
    }

    /// Flattened column name, e.g. `own.count.exp_5`.
    pub fn column_name(&self, class: ComparisonClass, shape: usize, basis: Basis) -> String {
        format!(
            "{}.{}.{}",
            class.label(),
            basis.label(),
            self.shape_labels[shape]
        )
    }
}

// ============================================================================
// Feature Table
// ============================================================================

/// Density summaries of one interior focal individual.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FeatureRow<T> {
    /// Position of the individual in the census.
    pub index: usize,
    /// Identity.
    pub id: String,
    /// Group label.
    pub group: String,
    /// Baseline size.
    pub size: T,
    /// Outcome at interval end.
    pub outcome: bool,
    /// Interval length (exposure).
    pub interval: T,
    /// Neighbors found within the radius.
    pub neighbors: usize,
    /// Own-group metrics.
    pub own: Vec<T>,
    /// Other-group metrics.
    pub other: Vec<T>,
    /// Element-wise `own + other`.
    pub combined: Vec<T>,
}

impl<T: Float> FeatureRow<T> {
    /// Metric vector of a comparison class.
    #[inline]
    pub fn class(&self, class: ComparisonClass) -> &[T] {
        match class {
            ComparisonClass::Own => &self.own,
            ComparisonClass::Other => &self.other,
            ComparisonClass::Combined => &self.combined,
        }
    }
}

/// Immutable joined feature table handed to the sweep.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FeatureTable<T> {
    layout: MetricLayout,
    rows: Vec<FeatureRow<T>>,
}

impl<T: Float> FeatureTable<T> {
    pub(crate) fn new(layout: MetricLayout, rows: Vec<FeatureRow<T>>) -> Self {
        Self { layout, rows }
    }

    /// Metric layout shared by every row.
    pub fn layout(&self) -> &MetricLayout {
        &self.layout
    }

    /// Rows in census order.
    pub fn rows(&self) -> &[FeatureRow<T>] {
        &self.rows
    }

    /// Number of focal rows.
    pub fn len(&self) -> usize {
        self.rows.len()
    }

    /// Whether no focal row survived edge exclusion.
    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    /// Row for an identity, if it is a focal row.
    pub fn row(&self, id: &str) -> Option<&FeatureRow<T>> {
        self.rows.iter().find(|r| r.id == id)
    }

    /// Keyed metric accessor.
    #[inline]
    pub fn metric(
        &self,
        row: usize,
        class: ComparisonClass,
        shape: usize,
        basis: Basis,
    ) -> T {
        self.rows[row].class(class)[self.layout.index(shape, basis)]
    }

    /// Distinct group labels, sorted.
    pub fn groups(&self) -> BTreeSet<&str> {
        self.rows.iter().map(|r| r.group.as_str()).collect()
    }

    /// Rows belonging to `group`.
    pub fn rows_for_group<'s>(&'s self, group: &'s str) -> impl Iterator<Item = &'s FeatureRow<T>> {
        self.rows.iter().filter(move |r| r.group == group)
    }

    /// Flattened column names in the order of [`Self::flattened_row`].
    pub fn column_names(&self) -> Vec<String> {
        let mut names = Vec::with_capacity(3 * self.layout.n_metrics());
        for class in ComparisonClass::ALL {
            for shape in 0..self.layout.n_shapes() {
                for basis in Basis::ALL {
                    names.push(self.layout.column_name(class, shape, basis));
                }
            }
        }
        names
    }

    /// All metrics of one row, class-major, for downstream reporting.
    pub fn flattened_row(&self, row: usize) -> Vec<T> {
        let r = &self.rows[row];
        let mut values = Vec::with_capacity(3 * self.layout.n_metrics());
        for class in ComparisonClass::ALL {
            values.extend_from_slice(r.class(class));
        }
        values
    }
}
