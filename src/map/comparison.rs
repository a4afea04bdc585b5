//! Comparison decomposition: resolve each operand on its own.

use super::{MapContext, header, subquery};
use crate::alist::{Alist, Attr, Branching, Value};
use crate::graph::InferenceGraph;
use crate::reduce::ReduceOp;

pub fn decompose(alist: &mut Alist, graph: &mut InferenceGraph, _ctx: &MapContext<'_>) -> Option<String> {
    let op = ReduceOp::from_code(&alist.op)?;
    if !op.is_comparison() || alist.opvar.len() < 2 {
        return None;
    }
    let mut h = header(alist, &alist.op, 1.0, Branching::Or);
    let header_id = graph.link(alist, &mut h, "comparison", true);
    for var in &alist.opvar {
        let binding = alist.get(&Attr::Var(var.clone())).cloned().unwrap_or_else(Value::empty);
        let operand = Alist::new().with_opvar(&var.to_string()).with(var.clone(), binding);
        let mut child = subquery(operand, &h, "value");
        graph.link(&h, &mut child, "comparison", true);
    }
    tracing::debug!(node = %alist.id, header = %header_id, %op, operands = alist.opvar.len(), "comparison decomposition");
    Some(header_id)
}
