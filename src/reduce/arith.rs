//! Numeric folds: sum, product, extremes and counting.

use super::{ReduceScope, bind_opvar, number_of, propagate_projections, value_of};
use crate::alist::Alist;
use crate::uncertainty;

/// Fold the children's values of the parent's operation variable, treating
/// non-numeric values as `identity`.
fn fold(parent: &mut Alist, children: &[Alist], scope: &ReduceScope<'_>, identity: f64, f: fn(f64, f64) -> f64) -> bool {
    if children.is_empty() {
        return false;
    }
    let var = parent.first_opvar().cloned();
    let total = children
        .iter()
        .map(|c| number_of(c, var.as_ref()).unwrap_or(identity))
        .fold(identity, f);
    if !bind_opvar(parent, total) {
        return false;
    }
    parent.cov = uncertainty::estimate(children, true, &parent.op, scope.expected_children);
    true
}

pub fn reduce_sum(parent: &mut Alist, children: &[Alist], scope: &mut ReduceScope<'_>) -> bool {
    fold(parent, children, scope, 0.0, |a, b| a + b)
}

pub fn reduce_product(parent: &mut Alist, children: &[Alist], scope: &mut ReduceScope<'_>) -> bool {
    fold(parent, children, scope, 1.0, |a, b| a * b)
}

/// Pick the child whose value wins under `better`; first winner on ties.
fn extreme(parent: &mut Alist, children: &[Alist], scope: &ReduceScope<'_>, better: fn(f64, f64) -> bool) -> bool {
    let var = parent.first_opvar().cloned();
    let mut winner: Option<(&Alist, f64)> = None;
    for child in children {
        let Some(value) = number_of(child, var.as_ref()) else {
            continue;
        };
        if winner.is_none_or(|(_, best)| better(value, best)) {
            winner = Some((child, value));
        }
    }
    let Some((child, value)) = winner else {
        return false;
    };
    if !bind_opvar(parent, value) {
        return false;
    }
    propagate_projections(parent, child);
    parent.cov = uncertainty::estimate(children, true, &parent.op, scope.expected_children);
    true
}

pub fn reduce_max(parent: &mut Alist, children: &[Alist], scope: &mut ReduceScope<'_>) -> bool {
    extreme(parent, children, scope, |candidate, best| candidate > best)
}

pub fn reduce_min(parent: &mut Alist, children: &[Alist], scope: &mut ReduceScope<'_>) -> bool {
    extreme(parent, children, scope, |candidate, best| candidate < best)
}

/// Number of children that actually bound the parent's operation variable.
pub fn reduce_count(parent: &mut Alist, children: &[Alist], scope: &mut ReduceScope<'_>) -> bool {
    let var = parent.first_opvar().cloned();
    let count = children
        .iter()
        .filter(|c| value_of(c, var.as_ref()).is_some_and(|v| v.is_concrete()))
        .count();
    if !bind_opvar(parent, count as f64) {
        return false;
    }
    parent.cov = uncertainty::estimate(children, false, &parent.op, scope.expected_children);
    true
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::alist::{Attr, Value, VarRef};
    use crate::graph::InferenceGraph;
    use crate::reduce::ReduceFn;
    use crate::reduce::fixtures::{child, parent, series};

    fn run(reducer: ReduceFn, op: &str, children: &[Alist]) -> Option<Alist> {
        let mut graph = InferenceGraph::new();
        let mut scope = ReduceScope {
            graph: &mut graph,
            expected_children: children.len(),
        };
        let mut p = parent(op);
        reducer(&mut p, children, &mut scope).then_some(p)
    }

    fn answer(alist: &Alist) -> Option<f64> {
        alist.instantiation_value(&Attr::Object).and_then(Value::as_number)
    }

    #[test]
    fn sum_fixture() {
        let p = run(reduce_sum, "sum", &series()).unwrap();
        assert_eq!(answer(&p), Some(876.0));
    }

    #[test]
    fn product_fixture() {
        let p = run(reduce_product, "product", &series()).unwrap();
        assert_eq!(answer(&p), Some(479_724_456_960_000.0));
    }

    #[test]
    fn sum_coerces_non_numeric_to_zero() {
        let mut children = series();
        children.push(child(2017, "unknown"));
        let p = run(reduce_sum, "sum", &children).unwrap();
        assert_eq!(answer(&p), Some(876.0));
    }

    #[test]
    fn max_fixture_copies_projections() {
        let children: Vec<Alist> = series()
            .into_iter()
            .enumerate()
            .map(|(i, c)| c.with(VarRef::projection("year"), format!("{}", 2010 + i)))
            .collect();
        let p = run(reduce_max, "max", &children).unwrap();
        assert_eq!(answer(&p), Some(129.0));
        assert_eq!(
            p.get(&Attr::Var(VarRef::projection("year"))),
            Some(&Value::from("2016"))
        );
    }

    #[test]
    fn min_fixture() {
        let p = run(reduce_min, "min", &series()).unwrap();
        assert_eq!(answer(&p), Some(120.0));
    }

    #[test]
    fn extremes_need_a_number() {
        assert!(run(reduce_max, "max", &[child(2010, "n/a")]).is_none());
    }

    #[test]
    fn count_fixture() {
        let p = run(reduce_count, "count", &series()).unwrap();
        assert_eq!(answer(&p), Some(7.0));
    }

    #[test]
    fn count_skips_placeholders() {
        let mut children = series();
        children.push(Alist::new().with_opvar("?x"));
        let p = run(reduce_count, "count", &children).unwrap();
        assert_eq!(answer(&p), Some(7.0));
    }
}
