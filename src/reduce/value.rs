//! Default value, multi-value, mean and mode reducers.

use super::{ReduceScope, bind_opvar, value_of};
use crate::alist::{Alist, Attr, Value};
use crate::uncertainty;
use crate::util;

/// Separator between alternative values inside one binding.
pub const VALUE_DELIMITER: &str = ";;";

/// Default reducer: numeric children average, otherwise the modal value.
///
/// Each child's first operation variable may carry several alternatives
/// separated by `;;`. Ties for the modal value are joined with `;; `.
pub fn reduce_value(parent: &mut Alist, children: &[Alist], scope: &mut ReduceScope<'_>) -> bool {
    let mut numbers = Vec::new();
    let mut texts: Vec<String> = Vec::new();
    for child in children {
        let Some(value) = child.opvar_value().filter(|v| v.is_concrete()) else {
            continue;
        };
        match value {
            Value::Number(n) => numbers.push(*n),
            other => {
                for part in other.to_text().split(VALUE_DELIMITER) {
                    let part = part.trim();
                    if part.is_empty() {
                        continue;
                    }
                    match util::parse_number(part) {
                        Some(n) => numbers.push(n),
                        None => texts.push(part.to_string()),
                    }
                }
            }
        }
    }
    if numbers.is_empty() && texts.is_empty() {
        return false;
    }

    let result = if numbers.len() >= texts.len() {
        let mean = numbers.iter().sum::<f64>() / numbers.len() as f64;
        if asks_for_time(parent) {
            Value::Text((mean.trunc() as i64).to_string())
        } else {
            Value::Number(mean)
        }
    } else {
        Value::Text(modal_values(&texts).join(&format!("{VALUE_DELIMITER} ")))
    };
    if !bind_opvar(parent, result) {
        return false;
    }
    let all_numeric = numbers.len() == children.len();
    parent.cov = uncertainty::estimate(children, all_numeric, &parent.op, scope.expected_children);
    true
}

/// Comma-joined values of the parent's operation variable, no aggregation.
pub fn reduce_values(parent: &mut Alist, children: &[Alist], scope: &mut ReduceScope<'_>) -> bool {
    let var = parent.first_opvar().cloned();
    let data: Vec<String> = children
        .iter()
        .filter_map(|c| value_of(c, var.as_ref()))
        .filter(|v| v.is_concrete())
        .map(Value::to_text)
        .collect();
    if data.is_empty() || !bind_opvar(parent, data.join(",").as_str()) {
        return false;
    }
    parent.cov = uncertainty::estimate(children, false, &parent.op, scope.expected_children);
    true
}

/// Arithmetic mean of the numeric children.
pub fn reduce_mean(parent: &mut Alist, children: &[Alist], scope: &mut ReduceScope<'_>) -> bool {
    let var = parent.first_opvar().cloned();
    let numbers: Vec<f64> = children
        .iter()
        .filter_map(|c| super::number_of(c, var.as_ref()))
        .collect();
    if numbers.is_empty() {
        return false;
    }
    for child in children {
        back_propagate(parent, child);
    }
    let mean = numbers.iter().sum::<f64>() / numbers.len() as f64;
    if !bind_opvar(parent, mean) {
        return false;
    }
    let all_numeric = numbers.len() == children.len();
    parent.cov = uncertainty::estimate(children, all_numeric, &parent.op, scope.expected_children);
    true
}

/// Most frequent value; ties go to the value seen first.
pub fn reduce_mode(parent: &mut Alist, children: &[Alist], scope: &mut ReduceScope<'_>) -> bool {
    let var = parent.first_opvar().cloned();
    let values: Vec<String> = children
        .iter()
        .filter_map(|c| value_of(c, var.as_ref()))
        .filter(|v| v.is_concrete())
        .map(Value::to_text)
        .collect();
    let Some(mode) = modal_values(&values).into_iter().next() else {
        return false;
    };
    for child in children {
        back_propagate(parent, child);
    }
    if !bind_opvar(parent, mode.as_str()) {
        return false;
    }
    let all_numeric = values.iter().all(|v| util::is_numeric(v));
    parent.cov = uncertainty::estimate(children, all_numeric, "value", scope.expected_children);
    true
}

/// Whether the parent's operation variable is the one its time slot names.
fn asks_for_time(parent: &Alist) -> bool {
    match (parent.first_opvar(), parent.get(&Attr::Time).and_then(Value::as_var)) {
        (Some(opvar), Some(time_var)) => opvar == time_var,
        _ => false,
    }
}

/// Values with the highest count, in first-seen order.
fn modal_values(values: &[String]) -> Vec<String> {
    let mut counts: Vec<(&String, usize)> = Vec::new();
    for value in values {
        match counts.iter_mut().find(|(v, _)| *v == value) {
            Some((_, n)) => *n += 1,
            None => counts.push((value, 1)),
        }
    }
    let Some(max) = counts.iter().map(|(_, n)| *n).max() else {
        return Vec::new();
    };
    counts
        .into_iter()
        .filter(|(_, n)| *n == max)
        .map(|(v, _)| v.clone())
        .collect()
}

/// Fill the parent's unbound attributes from a child that has them bound.
///
/// Slots holding a variable reference are left alone; they resolve once the
/// variable itself is bound.
fn back_propagate(parent: &mut Alist, child: &Alist) {
    for (attr, value) in child.instantiated_attributes() {
        if !parent.contains(&attr) || parent.is_instantiated(&attr) {
            continue;
        }
        match &attr {
            Attr::Var(var) => parent.instantiate_variable(var, value, false),
            _ if parent.get(&attr).is_some_and(Value::is_empty) => parent.set(attr, value),
            _ => {}
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::alist::VarRef;
    use crate::graph::InferenceGraph;
    use crate::reduce::fixtures::{child, parent, series};

    fn run(reducer: super::super::ReduceFn, parent: &mut Alist, children: &[Alist]) -> bool {
        let mut graph = InferenceGraph::new();
        let mut scope = ReduceScope {
            graph: &mut graph,
            expected_children: children.len(),
        };
        reducer(parent, children, &mut scope)
    }

    fn x(alist: &Alist) -> Option<f64> {
        alist.instantiation_value(&Attr::Object).and_then(Value::as_number)
    }

    #[test]
    fn value_averages_numeric_children() {
        let mut p = parent("value");
        assert!(run(reduce_value, &mut p, &series()));
        let mean = x(&p).unwrap();
        assert!((mean - 125.142857).abs() < 1e-5, "{mean}");
        assert!(p.cov > 0.0);
    }

    #[test]
    fn value_picks_mode_for_text() {
        let children = vec![
            child(2010, "Accra"),
            child(2011, "Kumasi"),
            child(2012, "Accra"),
        ];
        let mut p = parent("value");
        assert!(run(reduce_value, &mut p, &children));
        assert_eq!(p.instantiation_value(&Attr::Object), Some(&Value::from("Accra")));
    }

    #[test]
    fn value_joins_modal_ties() {
        let children = vec![child(2010, "Accra;;Kumasi"), child(2011, "Tamale")];
        let mut p = parent("value");
        assert!(run(reduce_value, &mut p, &children));
        assert_eq!(
            p.instantiation_value(&Attr::Object).map(Value::to_text),
            Some("Accra;; Kumasi;; Tamale".to_string())
        );
    }

    #[test]
    fn value_renders_time_answers_as_years() {
        let mut p = parent("value").with(Attr::Time, "?t").with_opvar("?t");
        let children: Vec<Alist> = ["2011", "2012"]
            .iter()
            .map(|y| child(0, "1").with(Attr::Time, "?t").with(VarRef::projection("t"), *y).with_opvar("?t"))
            .collect();
        assert!(run(reduce_value, &mut p, &children));
        assert_eq!(p.instantiation_value(&Attr::Time), Some(&Value::from("2011")));
    }

    #[test]
    fn value_without_bindings_fails() {
        let mut p = parent("value");
        let unbound = vec![Alist::new().with_opvar("?x")];
        assert!(!run(reduce_value, &mut p, &unbound));
        assert!(!p.is_instantiated(&Attr::Object));
    }

    #[test]
    fn values_concatenates() {
        let mut p = parent("values");
        assert!(run(reduce_values, &mut p, &series()));
        assert_eq!(
            p.instantiation_value(&Attr::Object).map(Value::to_text),
            Some("120,122,126,125,126,128,129".to_string())
        );
    }

    #[test]
    fn mean_fixture() {
        let mut p = parent("mean");
        assert!(run(reduce_mean, &mut p, &series()));
        assert!((x(&p).unwrap() - 125.142857).abs() < 1e-5);
    }

    #[test]
    fn mean_back_propagates_unbound_attributes() {
        let mut p = parent("mean").with(Attr::Subject, "$country");
        p.set(VarRef::auxiliary("country"), "");
        let children: Vec<Alist> = series()
            .into_iter()
            .map(|c| c.with(VarRef::auxiliary("country"), "Ghana"))
            .collect();
        assert!(run(reduce_mean, &mut p, &children));
        assert_eq!(p.instantiation_value(&Attr::Subject), Some(&Value::from("Ghana")));
        assert_eq!(p.get(&Attr::Time), Some(&Value::from("2020")));
    }

    #[test]
    fn mode_fixture() {
        let mut p = parent("mode");
        assert!(run(reduce_mode, &mut p, &series()));
        assert_eq!(p.instantiation_value(&Attr::Object), Some(&Value::from("126")));
    }
}
