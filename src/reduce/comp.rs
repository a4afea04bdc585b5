//! Set comprehension.
//!
//! A `comp` header sits under the node that asked for a set-valued variable
//! (`$filter`, `$in`, `$is`). Once its clause children have resolved, the
//! header intersects the values each clause produced, supersedes its own
//! branch and re-plans the original query once per common value:
//!
//! ```text
//!   P ──normalize──▶ H(comp) ──▶ clause children ...
//!   P ──comp──────▶ P' (HNODE) ──comp_lookup──▶ P with var = value_1
//!   H ──set-comp──▶ P'                       ──▶ P with var = value_2
//! ```

use super::ReduceScope;
use crate::alist::{Alist, Attr, NodeType, State, Value, VarKind};

const COMP_OP: &str = "comp";

/// Values a resolved node offers to a comprehension: its nesting or auxiliary
/// operation variable when it has one, otherwise its projection variables.
fn projected_values(node: &Alist) -> Vec<String> {
    let mut values = Vec::new();
    match node.first_opvar() {
        Some(var) if var.kind() != VarKind::Projection => {
            if let Some(v) = node.instantiation_value(&Attr::Var(var.clone())) {
                values.push(v.clone());
            }
        }
        _ => {
            for (var, _) in node.projection_variables() {
                if let Some(v) = node.instantiation_value(&Attr::Var(var)) {
                    values.push(v.clone());
                }
            }
        }
    }
    values
        .into_iter()
        .filter(Value::is_concrete)
        .map(|v| v.to_text())
        .collect()
}

fn push_unique(items: &mut Vec<String>, item: String) {
    if !items.contains(&item) {
        items.push(item);
    }
}

/// Common values across the clause children, in first-seen order.
///
/// When any clause has children of its own, each clause contributes its
/// children's values and the clauses are intersected. When none has, the
/// clauses are alternatives (`$in`) and their own values are united.
fn common_values(children: &[Alist], scope: &ReduceScope<'_>) -> Vec<String> {
    let per_clause: Vec<Vec<Alist>> = children
        .iter()
        .map(|c| {
            scope
                .graph
                .child_alists(&c.id)
                .into_iter()
                .filter(|gc| gc.op != COMP_OP)
                .collect()
        })
        .collect();

    if per_clause.iter().all(Vec::is_empty) {
        let mut union = Vec::new();
        for child in children {
            for value in projected_values(child) {
                push_unique(&mut union, value);
            }
        }
        return union;
    }

    let clause_values = |grandchildren: &Vec<Alist>| {
        let mut values = Vec::new();
        for gc in grandchildren {
            for value in projected_values(gc) {
                push_unique(&mut values, value);
            }
        }
        values
    };
    let mut clauses = per_clause.iter();
    let Some(head) = clauses.next() else {
        return Vec::new();
    };
    let mut common = clause_values(head);
    for clause in clauses {
        let values = clause_values(clause);
        common.retain(|v| values.contains(v));
    }
    common
}

/// Intersect the clause values and re-plan the enclosing query per value.
///
/// Waits until every clause child has resolved. Fails when the header has no
/// parent or when the clauses have nothing in common. On success the header
/// is marked `IGNORE` and its siblings are pruned.
pub fn reduce_comp(header: &mut Alist, children: &[Alist], scope: &mut ReduceScope<'_>) -> bool {
    if children.is_empty() || children.len() < scope.expected_children {
        return false;
    }
    let Some(var) = header.first_opvar().cloned() else {
        return false;
    };
    let common = common_values(children, scope);
    if common.is_empty() {
        return false;
    }
    let Some(parent) = scope.graph.parent_alists(&header.id).into_iter().next() else {
        return false;
    };

    for sibling in scope.graph.child_ids(&parent.id) {
        if sibling != header.id {
            scope.graph.prune(&sibling);
        }
    }

    let mut planner = parent.copy();
    planner.set(var.clone(), Value::empty());
    for answer_var in &parent.opvar {
        planner.set(answer_var.clone(), Value::empty());
    }
    planner.op = parent.op.clone();
    planner.opvar = parent.opvar.clone();
    planner.cost = header.cost;
    planner.state = State::Explored;
    planner.node_type = NodeType::Hnode;
    scope.graph.link(&parent, &mut planner, "comp", true);
    scope.graph.link(header, &mut planner, "set-comp", false);
    tracing::debug!(node = %header.id, planner = %planner.id, values = common.len(), "set comprehension");

    for item in common {
        let value = Value::parse(&item);
        let mut lookup = planner.copy();
        lookup.op = "value".to_string();
        lookup.opvar = parent.opvar.clone();
        lookup.set(var.clone(), value.clone());
        lookup.instantiate_variable(&var, value.clone(), true);
        for reference in lookup.variable_references(&var) {
            lookup.set(reference, value.clone());
        }
        lookup.cost = planner.cost + 1.0;
        lookup.node_type = NodeType::Znode;
        scope.graph.link(&planner, &mut lookup, "comp_lookup", true);
    }

    header.state = State::Ignore;
    true
}
