//! Reduce registry: aggregation of resolved children into their parent.
//!
//! Op codes are parsed into the closed [`ReduceOp`] enumeration; the
//! [`ReduceRegistry`] maps each op to a plain function. A reducer receives the
//! parent (mutated in place) and its reducible children and reports whether
//! it produced a value. Failure is not an error: the engine simply retries
//! once more children have resolved.

pub mod arith;
pub mod comp;
pub mod compare;
pub mod gp;
pub mod regress;
pub mod value;

use std::collections::HashMap;
use std::fmt;

use crate::alist::{Alist, Attr, Value, VarRef};
use crate::graph::InferenceGraph;

/// Result type for reduce dispatch.
pub type ReduceResult<T> = std::result::Result<T, crate::error::ReduceError>;

/// Everything a reducer may touch besides the parent and its children.
pub struct ReduceScope<'a> {
    /// The session graph; only set comprehension rewires it.
    pub graph: &'a mut InferenceGraph,
    /// Number of children the parent will eventually have.
    pub expected_children: usize,
}

/// A reducer: mutates the parent from its reducible children.
pub type ReduceFn = fn(&mut Alist, &[Alist], &mut ReduceScope<'_>) -> bool;

/// Known aggregation operations.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ReduceOp {
    Value,
    Values,
    Sum,
    Product,
    Mean,
    Mode,
    Min,
    Max,
    Count,
    Regress,
    GpRegress,
    Comp,
    Eq,
    Gt,
    Gte,
    Lt,
    Lte,
}

impl ReduceOp {
    pub const ALL: [ReduceOp; 17] = [
        Self::Value,
        Self::Values,
        Self::Sum,
        Self::Product,
        Self::Mean,
        Self::Mode,
        Self::Min,
        Self::Max,
        Self::Count,
        Self::Regress,
        Self::GpRegress,
        Self::Comp,
        Self::Eq,
        Self::Gt,
        Self::Gte,
        Self::Lt,
        Self::Lte,
    ];

    /// Parse an op code. `avg` is accepted as an alias of `mean`.
    pub fn from_code(code: &str) -> Option<Self> {
        let op = match code.trim().to_ascii_lowercase().as_str() {
            "value" => Self::Value,
            "values" => Self::Values,
            "sum" => Self::Sum,
            "product" => Self::Product,
            "mean" | "avg" => Self::Mean,
            "mode" => Self::Mode,
            "min" => Self::Min,
            "max" => Self::Max,
            "count" => Self::Count,
            "regress" => Self::Regress,
            "gpregress" => Self::GpRegress,
            "comp" => Self::Comp,
            "eq" => Self::Eq,
            "gt" => Self::Gt,
            "gte" => Self::Gte,
            "lt" => Self::Lt,
            "lte" => Self::Lte,
            _ => return None,
        };
        Some(op)
    }

    pub fn code(self) -> &'static str {
        match self {
            Self::Value => "value",
            Self::Values => "values",
            Self::Sum => "sum",
            Self::Product => "product",
            Self::Mean => "mean",
            Self::Mode => "mode",
            Self::Min => "min",
            Self::Max => "max",
            Self::Count => "count",
            Self::Regress => "regress",
            Self::GpRegress => "gpregress",
            Self::Comp => "comp",
            Self::Eq => "eq",
            Self::Gt => "gt",
            Self::Gte => "gte",
            Self::Lt => "lt",
            Self::Lte => "lte",
        }
    }

    /// eq / gt / gte / lt / lte.
    pub fn is_comparison(self) -> bool {
        matches!(self, Self::Eq | Self::Gt | Self::Gte | Self::Lt | Self::Lte)
    }
}

impl fmt::Display for ReduceOp {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.code())
    }
}

/// Op → reducer table, fixed at start-up.
#[derive(Debug, Clone)]
pub struct ReduceRegistry {
    table: HashMap<ReduceOp, ReduceFn>,
}

impl Default for ReduceRegistry {
    fn default() -> Self {
        Self::builtin()
    }
}

impl ReduceRegistry {
    /// An empty registry.
    pub fn empty() -> Self {
        Self {
            table: HashMap::new(),
        }
    }

    /// The registry with every built-in reducer.
    pub fn builtin() -> Self {
        let mut registry = Self::empty();
        registry
            .register(ReduceOp::Value, value::reduce_value)
            .register(ReduceOp::Values, value::reduce_values)
            .register(ReduceOp::Mean, value::reduce_mean)
            .register(ReduceOp::Mode, value::reduce_mode)
            .register(ReduceOp::Sum, arith::reduce_sum)
            .register(ReduceOp::Product, arith::reduce_product)
            .register(ReduceOp::Min, arith::reduce_min)
            .register(ReduceOp::Max, arith::reduce_max)
            .register(ReduceOp::Count, arith::reduce_count)
            .register(ReduceOp::Regress, regress::reduce_regress)
            .register(ReduceOp::GpRegress, gp::reduce_gpregress)
            .register(ReduceOp::Comp, comp::reduce_comp)
            .register(ReduceOp::Eq, compare::reduce_eq)
            .register(ReduceOp::Gt, compare::reduce_gt)
            .register(ReduceOp::Gte, compare::reduce_gte)
            .register(ReduceOp::Lt, compare::reduce_lt)
            .register(ReduceOp::Lte, compare::reduce_lte);
        registry
    }

    pub fn register(&mut self, op: ReduceOp, reducer: ReduceFn) -> &mut Self {
        self.table.insert(op, reducer);
        self
    }

    pub fn get(&self, op: ReduceOp) -> Option<ReduceFn> {
        self.table.get(&op).copied()
    }
}

// ---------------------------------------------------------------------------
// Shared helpers
// ---------------------------------------------------------------------------

/// Resolved value of `var` in `child`.
pub(crate) fn value_of<'a>(child: &'a Alist, var: Option<&VarRef>) -> Option<&'a Value> {
    child.instantiation_value(&Attr::Var(var?.clone()))
}

/// Numeric value of `var` in `child`.
pub(crate) fn number_of(child: &Alist, var: Option<&VarRef>) -> Option<f64> {
    value_of(child, var).and_then(Value::as_number)
}

/// Bind the parent's first operation variable.
pub(crate) fn bind_opvar(parent: &mut Alist, value: impl Into<Value>) -> bool {
    match parent.first_opvar().cloned() {
        Some(var) => {
            parent.instantiate_variable(&var, value, true);
            true
        }
        None => false,
    }
}

/// Copy every projection variable of `child` into `parent`.
pub(crate) fn propagate_projections(parent: &mut Alist, child: &Alist) {
    for (var, _) in child.projection_variables() {
        if let Some(value) = child.instantiation_value(&Attr::Var(var.clone())) {
            if value.is_concrete() {
                parent.instantiate_variable(&var, value.clone(), true);
            }
        }
    }
}


#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn every_op_round_trips_and_is_registered() {
        let registry = ReduceRegistry::builtin();
        for op in ReduceOp::ALL {
            assert_eq!(ReduceOp::from_code(op.code()), Some(op));
            assert!(registry.get(op).is_some(), "{op} unregistered");
        }
    }

    #[test]
    fn unknown_codes_are_rejected() {
        assert_eq!(ReduceOp::from_code("median"), None);
        assert_eq!(ReduceOp::from_code(""), None);
        assert_eq!(ReduceOp::from_code("AVG"), Some(ReduceOp::Mean));
    }

    #[test]
    fn empty_registry_has_nothing() {
        assert!(ReduceRegistry::empty().get(ReduceOp::Sum).is_none());
    }
}
