//! Ordinary least-squares extrapolation over (time, value) pairs.

use serde_json::json;

use super::{ReduceScope, bind_opvar};
use crate::alist::{Alist, Attr, Value};
use crate::uncertainty;

/// A fitted line `y = intercept + slope * x`.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct LinearFit {
    pub intercept: f64,
    pub slope: f64,
}

impl LinearFit {
    /// Least-squares fit; a single point (or constant `x`) gives a flat line
    /// through the mean.
    pub fn fit(points: &[(f64, f64)]) -> Option<Self> {
        if points.is_empty() {
            return None;
        }
        let n = points.len() as f64;
        let mean_x = points.iter().map(|(x, _)| x).sum::<f64>() / n;
        let mean_y = points.iter().map(|(_, y)| y).sum::<f64>() / n;
        let sxx: f64 = points.iter().map(|(x, _)| (x - mean_x).powi(2)).sum();
        let sxy: f64 = points
            .iter()
            .map(|(x, y)| (x - mean_x) * (y - mean_y))
            .sum();
        let slope = if sxx > 0.0 { sxy / sxx } else { 0.0 };
        Some(Self {
            intercept: mean_y - slope * mean_x,
            slope,
        })
    }

    pub fn predict(&self, x: f64) -> f64 {
        self.intercept + self.slope * x
    }
}

/// Numeric (time, value) pairs from children that bound both.
pub(crate) fn time_series(children: &[Alist]) -> Vec<(f64, f64)> {
    children
        .iter()
        .filter_map(|c| {
            let x = c.instantiation_value(&Attr::Time).and_then(Value::as_number)?;
            let y = c.opvar_value().and_then(Value::as_number)?;
            Some((x, y))
        })
        .collect()
}

/// Fit a line through the children and extrapolate to the parent's time.
pub fn reduce_regress(parent: &mut Alist, children: &[Alist], scope: &mut ReduceScope<'_>) -> bool {
    let Some(x_predict) = parent.instantiation_value(&Attr::Time).and_then(Value::as_number) else {
        return false;
    };
    let points = time_series(children);
    let Some(fit) = LinearFit::fit(&points) else {
        return false;
    };
    let y_predict = fit.predict(x_predict);
    if !y_predict.is_finite() || !bind_opvar(parent, y_predict) {
        return false;
    }
    parent.fnplot = Some(json!({
        "function": [fit.intercept, fit.slope],
        "data": points.iter().map(|(x, y)| [*x, *y]).collect::<Vec<_>>(),
        "prediction": [x_predict, y_predict],
    }));
    let all_numeric = points.len() == children.len();
    parent.cov = uncertainty::estimate(children, all_numeric, &parent.op, scope.expected_children);
    tracing::debug!(node = %parent.id, slope = fit.slope, y_predict, "linear extrapolation");
    true
}
