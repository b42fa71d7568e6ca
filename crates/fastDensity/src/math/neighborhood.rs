//! Fixed-radius proximity index using uniform grid bucketing.
//!
//! ## Purpose
//!
//! This module finds every ordered pair of individuals lying within a fixed
//! radius of each other. Points are bucketed into a uniform grid whose cells
//! are at least one radius wide, so each query only inspects the 3x3 block of
//! cells around the focal point.
//!
//! ## Design notes
//!
//! * **CSR Buckets**: Cell offsets plus a permuted index array; one
//!   allocation for the whole grid, built with a counting sort.
//! * **Bounded Grid**: The cell size grows (doubling) when the radius is
//!   tiny relative to the extent, keeping the cell count O(N).
//! * **Parallel Queries**: Pair generation uses `rayon::map_init` with
//!   thread-local scratch buffers.
//!
//! ## Key concepts
//!
//! * **Ordered Pairs**: Both `(i, j)` and `(j, i)` are produced; distance is
//!   symmetric but the focal role is not.
//! * **Brute Force**: `brute_force_pairs` is the O(N^2) reference scan kept
//!   for tiny inputs and cross-checking.
//!
//! ## Invariants
//!
//! * `0 <= distance <= radius` and `focal != neighbor` for every pair.
//! * `(i, j, d)` is present iff `(j, i, d)` is present, with bit-identical `d`.
//! * Coincident points are kept (distance 0) whenever the radius is positive.
//! * A radius of zero yields no pairs.
//!
//! ## Non-goals
//!
//! * This module does not support incremental updates.
//! * This module does not implement k-nearest queries.

// Feature-gated imports
#[cfg(feature = "cpu")]
use rayon::prelude::*;

// External dependencies
use num_traits::Float;

// Internal dependencies
use crate::input::PointInput;
use crate::math::boundary::PlotWindow;
use crate::primitives::errors::DensityError;

// ============================================================================
// Pair Set
// ============================================================================

/// One ordered (focal, neighbor) pair.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct NeighborPair<T> {
    /// Index of the focal individual.
    pub focal: usize,
    /// Index of the neighbor.
    pub neighbor: usize,
    /// Euclidean distance between them.
    pub distance: T,
}

/// All pairs within the radius, grouped by focal index.
///
/// Neighbors of each focal index are sorted by neighbor index.
#[derive(Debug, Clone, PartialEq)]
pub struct PairSet<T> {
    offsets: Vec<usize>,
    neighbors: Vec<usize>,
    distances: Vec<T>,
}

impl<T: Float> PairSet<T> {
    fn from_lists(lists: Vec<Vec<(usize, T)>>) -> Self {
        let total: usize = lists.iter().map(Vec::len).sum();
        let mut offsets = Vec::with_capacity(lists.len() + 1);
        let mut neighbors = Vec::with_capacity(total);
        let mut distances = Vec::with_capacity(total);
        offsets.push(0);
        for list in lists {
            for (j, d) in list {
                neighbors.push(j);
                distances.push(d);
            }
            offsets.push(neighbors.len());
        }
        Self {
            offsets,
            neighbors,
            distances,
        }
    }

    /// Number of ordered pairs.
    pub fn len(&self) -> usize {
        self.neighbors.len()
    }

    /// Whether no pair was found.
    pub fn is_empty(&self) -> bool {
        self.neighbors.is_empty()
    }

    /// Number of points the set was built over.
    pub fn n_points(&self) -> usize {
        self.offsets.len().saturating_sub(1)
    }

    /// Neighbor indices and distances incident to `focal`.
    pub fn incident(&self, focal: usize) -> (&[usize], &[T]) {
        let start = self.offsets[focal];
        let end = self.offsets[focal + 1];
        (&self.neighbors[start..end], &self.distances[start..end])
    }

    /// Iterate over all ordered pairs, focal-major.
    pub fn iter(&self) -> impl Iterator<Item = NeighborPair<T>> + '_ {
        (0..self.n_points()).flat_map(move |focal| {
            let (nbrs, dists) = self.incident(focal);
            nbrs.iter()
                .zip(dists.iter())
                .map(move |(&neighbor, &distance)| NeighborPair {
                    focal,
                    neighbor,
                    distance,
                })
        })
    }
}

// ============================================================================
// Grid Index
// ============================================================================

/// Uniform-grid proximity index over interleaved `x, y` coordinates.
#[derive(Debug, Clone)]
pub struct ProximityIndex<'a, T> {
    points: &'a [T],
    radius: T,
    x0: T,
    y0: T,
    cell: T,
    cols: usize,
    rows: usize,
    cell_start: Vec<usize>,
    cell_points: Vec<usize>,
}

impl<'a, T: Float + Send + Sync> ProximityIndex<'a, T> {
    /// Bucket `points` for queries of radius `radius`.
    ///
    /// The grid covers the union of `window` and the bounding box of the
    /// points, so points outside the window are still indexed correctly.
    pub fn build<I>(points: &'a I, window: &PlotWindow<T>, radius: T) -> Result<Self, DensityError>
    where
        I: PointInput<T> + ?Sized,
    {
        let points = points.as_point_slice()?;
        if !radius.is_finite() || radius < T::zero() {
            return Err(DensityError::InvalidRadius(
                radius.to_f64().unwrap_or(f64::NAN),
            ));
        }
        window.validate()?;
        validate_points(points)?;

        let n = points.len() / 2;
        let (mut x0, mut x1, mut y0, mut y1) =
            (window.x_min, window.x_max, window.y_min, window.y_max);
        for p in points.chunks_exact(2) {
            x0 = x0.min(p[0]);
            x1 = x1.max(p[0]);
            y0 = y0.min(p[1]);
            y1 = y1.max(p[1]);
        }
        let width = x1 - x0;
        let height = y1 - y0;
        if !width.is_finite() || !height.is_finite() {
            return Err(DensityError::InvalidInput(
                "coordinate extent overflows the float range".to_string(),
            ));
        }

        // Cells must be at least one radius wide; grow them until the grid
        // holds O(N) cells.
        let max_cells = T::from(4 * n + 16).unwrap_or_else(T::max_value);
        let mut cell = if radius > T::zero() {
            radius
        } else {
            (width.max(height)).max(T::one())
        };
        let two = T::one() + T::one();
        loop {
            if !cell.is_finite() {
                return Err(DensityError::InvalidInput(
                    "grid cell size overflows the float range".to_string(),
                ));
            }
            let c = (width / cell).floor() + T::one();
            let r = (height / cell).floor() + T::one();
            if c * r <= max_cells {
                break;
            }
            cell = cell * two;
        }
        let cols = ((width / cell).floor().to_usize().unwrap_or(0) + 1).max(1);
        let rows = ((height / cell).floor().to_usize().unwrap_or(0) + 1).max(1);

        // Counting sort of point indices into cells.
        let n_cells = cols * rows;
        let mut cell_of_point = Vec::with_capacity(n);
        let mut counts = vec![0usize; n_cells + 1];
        for p in points.chunks_exact(2) {
            let cx = grid_coord(p[0], x0, cell, cols);
            let cy = grid_coord(p[1], y0, cell, rows);
            let c = cy * cols + cx;
            cell_of_point.push(c);
            counts[c + 1] += 1;
        }
        for c in 0..n_cells {
            counts[c + 1] += counts[c];
        }
        let cell_start = counts.clone();
        let mut cursor = counts;
        let mut cell_points = vec![0usize; n];
        for (i, &c) in cell_of_point.iter().enumerate() {
            cell_points[cursor[c]] = i;
            cursor[c] += 1;
        }

        Ok(Self {
            points,
            radius,
            x0,
            y0,
            cell,
            cols,
            rows,
            cell_start,
            cell_points,
        })
    }

    /// Number of indexed points.
    pub fn len(&self) -> usize {
        self.points.len() / 2
    }

    /// Whether the index is empty.
    pub fn is_empty(&self) -> bool {
        self.points.is_empty()
    }

    /// Query radius.
    pub fn radius(&self) -> T {
        self.radius
    }

    /// Width of one grid cell (never below the radius).
    pub fn cell_size(&self) -> T {
        self.cell
    }

    /// Collect `(neighbor, distance)` for `focal` into `out`, sorted by neighbor.
    pub fn neighbors_into(&self, focal: usize, out: &mut Vec<(usize, T)>) {
        out.clear();
        if self.radius <= T::zero() {
            return;
        }
        let qx = self.points[2 * focal];
        let qy = self.points[2 * focal + 1];
        let r2 = self.radius * self.radius;
        let cx = grid_coord(qx, self.x0, self.cell, self.cols);
        let cy = grid_coord(qy, self.y0, self.cell, self.rows);

        for gy in cy.saturating_sub(1)..=(cy + 1).min(self.rows - 1) {
            for gx in cx.saturating_sub(1)..=(cx + 1).min(self.cols - 1) {
                let c = gy * self.cols + gx;
                for &j in &self.cell_points[self.cell_start[c]..self.cell_start[c + 1]] {
                    if j == focal {
                        continue;
                    }
                    let dx = self.points[2 * j] - qx;
                    let dy = self.points[2 * j + 1] - qy;
                    let d2 = dx * dx + dy * dy;
                    if d2 <= r2 {
                        out.push((j, d2.sqrt()));
                    }
                }
            }
        }
        out.sort_unstable_by_key(|&(j, _)| j);
    }

    /// Generate every ordered pair within the radius.
    pub fn pairs(&self, parallel: bool) -> PairSet<T> {
        let n = self.len();
        #[cfg(feature = "cpu")]
        {
            if parallel {
                let lists: Vec<Vec<(usize, T)>> = (0..n)
                    .into_par_iter()
                    .map_init(Vec::new, |buffer, i| {
                        self.neighbors_into(i, buffer);
                        buffer.clone()
                    })
                    .collect();
                return PairSet::from_lists(lists);
            }
        }
        #[cfg(not(feature = "cpu"))]
        let _ = parallel;

        let mut buffer = Vec::new();
        let lists = (0..n)
            .map(|i| {
                self.neighbors_into(i, &mut buffer);
                buffer.clone()
            })
            .collect();
        PairSet::from_lists(lists)
    }
}

/// O(N^2) reference scan over interleaved `x, y` coordinates.
///
/// Produces exactly the same `PairSet` as the grid index. Intended for tiny
/// inputs and verification only.
pub fn brute_force_pairs<T, I>(points: &I, radius: T) -> Result<PairSet<T>, DensityError>
where
    T: Float,
    I: PointInput<T> + ?Sized,
{
    let points = points.as_point_slice()?;
    if !radius.is_finite() || radius < T::zero() {
        return Err(DensityError::InvalidRadius(
            radius.to_f64().unwrap_or(f64::NAN),
        ));
    }
    validate_points(points)?;
    let n = points.len() / 2;
    let r2 = radius * radius;
    let mut lists = Vec::with_capacity(n);
    for i in 0..n {
        let mut list = Vec::new();
        if radius > T::zero() {
            for j in 0..n {
                if i == j {
                    continue;
                }
                let dx = points[2 * j] - points[2 * i];
                let dy = points[2 * j + 1] - points[2 * i + 1];
                let d2 = dx * dx + dy * dy;
                if d2 <= r2 {
                    list.push((j, d2.sqrt()));
                }
            }
        }
        lists.push(list);
    }
    Ok(PairSet::from_lists(lists))
}

#[inline]
fn grid_coord<T: Float>(v: T, origin: T, cell: T, extent: usize) -> usize {
    ((v - origin) / cell)
        .floor()
        .to_usize()
        .unwrap_or(0)
        .min(extent - 1)
}

fn validate_points<T: Float>(points: &[T]) -> Result<(), DensityError> {
    if points.len() % 2 != 0 {
        return Err(DensityError::InvalidInput(
            "point buffer must hold interleaved x, y pairs".to_string(),
        ));
    }
    if let Some(i) = points.iter().position(|v| !v.is_finite()) {
        return Err(DensityError::NonFiniteCoordinate {
            id: format!("#{}", i / 2),
        });
    }
    Ok(())
}
