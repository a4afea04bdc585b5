//! Comparison reducers: eq, gt, gte, lt, lte.
//!
//! The operands are the parent's operation variables. The outcome is bound as
//! `"true"` / `"false"` to the response variable `?_<op>_`.

use std::cmp::Ordering;

use super::{ReduceOp, ReduceScope, propagate_projections, value_of};
use crate::alist::{Alist, Attr, Value, VarRef};

/// The variable a comparison binds its outcome to.
pub fn response_var(op: ReduceOp) -> VarRef {
    VarRef::projection(format!("_{}_", op.code()))
}

fn equal(a: &Value, b: &Value) -> bool {
    match (a.as_number(), b.as_number()) {
        (Some(x), Some(y)) => x == y,
        _ => a.to_text() == b.to_text(),
    }
}

/// Resolve every operand in the parent, pulling still-unbound ones from the
/// child that was asked for them. `None` while any operand is unresolved.
fn operands(parent: &mut Alist, children: &[Alist]) -> Option<Vec<Value>> {
    for child in children {
        propagate_projections(parent, child);
    }
    let vars = parent.opvar.clone();
    for var in &vars {
        if parent.is_instantiated(&Attr::Var(var.clone())) {
            continue;
        }
        let found = children
            .iter()
            .filter(|c| c.is_opvar(var))
            .find_map(|c| value_of(c, Some(var)).filter(|v| v.is_concrete()).cloned());
        if let Some(value) = found {
            parent.instantiate_variable(var, value, true);
        }
    }
    vars.iter()
        .map(|var| {
            parent
                .instantiation_value(&Attr::Var(var.clone()))
                .filter(|v| v.is_concrete())
                .cloned()
        })
        .collect()
}

fn compare(parent: &mut Alist, children: &[Alist], op: ReduceOp, holds: fn(Ordering) -> bool) -> bool {
    let outcome = if parent.opvar.is_empty() {
        false
    } else {
        let Some(values) = operands(parent, children) else {
            return false;
        };
        let Some((first, rest)) = values.split_first() else {
            return false;
        };
        match op {
            ReduceOp::Eq => rest.iter().all(|v| equal(first, v)),
            _ => match first.as_number() {
                Some(lhs) => rest.iter().all(|v| {
                    v.as_number()
                        .and_then(|rhs| lhs.partial_cmp(&rhs))
                        .is_some_and(holds)
                }),
                None => false,
            },
        }
    };
    parent.instantiate_variable(&response_var(op), outcome.to_string().as_str(), true);
    tracing::debug!(node = %parent.id, %op, outcome, "comparison");
    true
}

pub fn reduce_eq(parent: &mut Alist, children: &[Alist], _scope: &mut ReduceScope<'_>) -> bool {
    compare(parent, children, ReduceOp::Eq, Ordering::is_eq)
}

pub fn reduce_gt(parent: &mut Alist, children: &[Alist], _scope: &mut ReduceScope<'_>) -> bool {
    compare(parent, children, ReduceOp::Gt, Ordering::is_gt)
}

pub fn reduce_gte(parent: &mut Alist, children: &[Alist], _scope: &mut ReduceScope<'_>) -> bool {
    compare(parent, children, ReduceOp::Gte, Ordering::is_ge)
}

pub fn reduce_lt(parent: &mut Alist, children: &[Alist], _scope: &mut ReduceScope<'_>) -> bool {
    compare(parent, children, ReduceOp::Lt, Ordering::is_lt)
}

pub fn reduce_lte(parent: &mut Alist, children: &[Alist], _scope: &mut ReduceScope<'_>) -> bool {
    compare(parent, children, ReduceOp::Lte, Ordering::is_le)
}
