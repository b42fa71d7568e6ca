//! Post-fit complete-separation heuristic.
//!
//! A binary-outcome fit is suspected of complete separation when an
//! observation whose fitted probability is numerically 0 or 1 is also among
//! the most influential observations. The check is a pure function of the
//! fitted probabilities and leverage values.

use core::cmp::Ordering;

/// Share of observations, ranked by leverage, inspected for flagged fits.
pub const SEPARATION_INFLUENCE_FRACTION: f64 = 0.10;

/// Indices whose fitted probability lies within machine epsilon of 0 or 1.
pub fn flagged_observations(fitted: &[f64]) -> Vec<usize> {
    fitted
        .iter()
        .enumerate()
        .filter(|&(_, &p)| p <= f64::EPSILON || p >= 1.0 - f64::EPSILON)
        .map(|(i, _)| i)
        .collect()
}

/// Whether any flagged observation ranks within the top `fraction` by leverage.
///
/// The top set holds `ceil(n * fraction)` observations. Leverage ties keep
/// the lower index first; non-finite leverage ranks last.
pub fn detect_separation(fitted: &[f64], leverage: &[f64], fraction: f64) -> bool {
    let n = fitted.len().min(leverage.len());
    if n == 0 || fraction <= 0.0 {
        return false;
    }
    let flagged = flagged_observations(&fitted[..n]);
    if flagged.is_empty() {
        return false;
    }

    let mut order: Vec<usize> = (0..n).collect();
    order.sort_by(|&a, &b| {
        let (la, lb) = (leverage[a], leverage[b]);
        match (la.is_finite(), lb.is_finite()) {
            (true, true) => lb.partial_cmp(&la).unwrap_or(Ordering::Equal),
            (true, false) => Ordering::Less,
            (false, true) => Ordering::Greater,
            (false, false) => Ordering::Equal,
        }
        .then(a.cmp(&b))
    });

    let top = ((n as f64 * fraction).ceil() as usize).min(n);
    order[..top].iter().any(|i| flagged.binary_search(i).is_ok())
}
