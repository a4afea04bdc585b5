//! Uncertainty propagation for aggregated values.
//!
//! Every numeric reducer combines its children's coverage figures (`cov`, a
//! coefficient of variation) into one figure for the parent via [`estimate`].
//! Source- and property-level priors live in [`prior`].

pub mod prior;

use crate::alist::{Alist, Attr};

/// Ops whose result is an average of their inputs; their combined
/// uncertainty shrinks with the number of children.
const AVERAGING_OPS: &[&str] = &["value", "mean", "avg", "regress", "product"];

/// Combine the children's uncertainty into one coefficient of variation.
///
/// Each child contributes a variance of `(cov * v)^2` when `all_numeric` is
/// set and its resolved object is the number `v`, and `cov^2` otherwise. The
/// base figure is `sqrt(mean variance) / |mean value|`, further divided by the
/// child count for averaging ops. It is then inflated by the miss ratio
/// `1 - children / expected_child_count`, clamped to `[0, 1]`. Non-finite
/// results are reported as 0.
pub fn estimate(children: &[Alist], all_numeric: bool, op: &str, expected_child_count: usize) -> f64 {
    if children.is_empty() {
        return 0.0;
    }
    let n = children.len() as f64;
    let mut sum_variance = 0.0;
    let mut sum_mean = 0.0;
    for child in children {
        let value = all_numeric
            .then(|| child.instantiation_value(&Attr::Object).and_then(|v| v.as_number()))
            .flatten();
        match value {
            Some(v) => {
                sum_variance += (child.cov * v).powi(2);
                sum_mean += v;
            }
            None => {
                sum_variance += child.cov.powi(2);
                sum_mean += 1.0;
            }
        }
    }

    let mut confidence = (sum_variance / n).sqrt() / (sum_mean / n).abs();
    if AVERAGING_OPS.contains(&op) {
        confidence /= n;
    }
    if !confidence.is_finite() {
        return 0.0;
    }
    inflate(confidence, children.len(), expected_child_count)
}

/// Inflate an uncertainty figure by the share of expected children that
/// have not arrived yet.
pub fn inflate(confidence: f64, received: usize, expected: usize) -> f64 {
    let value = confidence * (1.0 + miss_ratio(received, expected));
    if value.is_finite() { value } else { 0.0 }
}

/// `1 - received / expected`, clamped to `[0, 1]`; 0 when nothing is expected.
pub fn miss_ratio(received: usize, expected: usize) -> f64 {
    if expected == 0 {
        return 0.0;
    }
    (1.0 - received as f64 / expected as f64).clamp(0.0, 1.0)
}
