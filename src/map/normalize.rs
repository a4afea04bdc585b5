//! Normalisation of nested directives into plain sub-queries.
//!
//! A variable bound to an object is a directive: `$filter` (conjunctive
//! clauses), `$in` (an explicit list), `$is` (a single value), or a nested
//! query with its own op code. Each becomes a set-comprehension header whose
//! children enumerate the candidate values.

use serde_json::{Map, Value as Json};

use super::{MapContext, header, subquery};
use crate::alist::context::inject_query_context;
use crate::alist::{Alist, Attr, Branching, State, Value, VarKind, VarRef};
use crate::graph::InferenceGraph;

const FILTER: &str = "$filter";
const IN: &str = "$in";
const IS: &str = "$is";
const NESTED_OP: &str = "h";

/// First name minted for values nested inside a nested query.
const NESTED_VAR_START: usize = 200;

const LABEL: &str = "normalize";

pub fn decompose(alist: &mut Alist, graph: &mut InferenceGraph, _ctx: &MapContext<'_>) -> Option<String> {
    for (var, directive) in alist.uninstantiated_nesting_variables() {
        let header_id = if let Some(clauses) = directive.get(FILTER) {
            filter(alist, graph, &var, clauses)
        } else if let Some(items) = directive.get(IN) {
            listed(alist, graph, &var, items)
        } else if let Some(value) = directive.get(IS) {
            pinned(alist, graph, &var, value)
        } else if directive.contains_key(NESTED_OP) {
            nested_query(alist, graph, &var, &directive)
        } else {
            continue;
        };
        tracing::debug!(node = %alist.id, header = %header_id, var = %var, "normalized directive");
        return Some(header_id);
    }
    None
}

/// The comp header over `var`, linked under `alist`.
fn comp_header(alist: &Alist, graph: &mut InferenceGraph, var: &VarRef) -> Alist {
    let mut h = header(alist, "comp", 1.0, Branching::And);
    h.opvar = vec![var.clone()];
    h.remove(&Attr::Var(var.clone()));
    graph.link(alist, &mut h, LABEL, true);
    h
}

fn link_child(graph: &mut InferenceGraph, parent: &Alist, child: Alist, op: &str, label: &str) -> Alist {
    let mut child = subquery(child, parent, op);
    inject_query_context(&mut child);
    graph.link(parent, &mut child, label, true);
    child
}

fn json_text(json: &Json) -> String {
    match json {
        Json::String(s) => s.trim().to_string(),
        other => other.to_string(),
    }
}

fn filter(alist: &Alist, graph: &mut InferenceGraph, var: &VarRef, clauses: &Json) -> String {
    let h = comp_header(alist, graph, var);
    let clauses: Vec<&Map<String, Json>> = clauses
        .as_array()
        .map(|items| items.iter().filter_map(Json::as_object).collect())
        .or_else(|| clauses.as_object().map(|c| vec![c]))
        .unwrap_or_default();

    let mut geopolitical = None;
    let mut location = None;
    for clause in &clauses {
        let property = clause.get("p").map(json_text).unwrap_or_default();
        let object = clause.get("o").map(json_text).unwrap_or_default();
        match property.as_str() {
            "type" if object == "country" || object == "continent" => geopolitical = Some(object),
            "location" => location = Some(object),
            _ => {}
        }
    }

    let base = || {
        Alist::new()
            .with_opvar(&var.to_string())
            .with(Attr::Subject, var.clone())
    };
    if let (Some(class), Some(place)) = (geopolitical, location) {
        let child = base()
            .with(Attr::Property, format!("__geopolitical:{class}"))
            .with(Attr::Object, Value::Text(place));
        link_child(graph, &h, child, "values", LABEL);
    } else {
        for clause in clauses {
            let mut child = base();
            for (key, value) in clause {
                child.set(Attr::parse(key), Value::from_json(value));
            }
            link_child(graph, &h, child, "values", LABEL);
        }
    }
    h.id
}

fn listed(alist: &Alist, graph: &mut InferenceGraph, var: &VarRef, items: &Json) -> String {
    let h = comp_header(alist, graph, var);
    let items: Vec<String> = match items {
        Json::Array(list) => list.iter().map(json_text).collect(),
        Json::String(s) => s.split(';').map(|x| x.trim().to_string()).collect(),
        other => vec![json_text(other)],
    };
    for item in items.into_iter().filter(|i| !i.is_empty()) {
        let child = Alist::new()
            .with_opvar(&var.to_string())
            .with(var.clone(), Value::Text(item));
        link_child(graph, &h, child, "value", LABEL);
    }
    h.id
}

fn pinned(alist: &Alist, graph: &mut InferenceGraph, var: &VarRef, value: &Json) -> String {
    let h = comp_header(alist, graph, var);
    let value = Value::from_json(value);
    let fresh = VarRef::projection(format!("_x{}", h.attribute_count()));

    let base = Alist::new()
        .with_opvar(&fresh.to_string())
        .with(fresh.clone(), value.clone());
    let mut child = subquery(base.clone(), &h, "value");
    child.state = State::Reducible;
    inject_query_context(&mut child);
    graph.link(&h, &mut child, LABEL, true);

    if !value.is_var() {
        let mut leaf = subquery(base, &h, "value");
        leaf.state = State::Reducible;
        inject_query_context(&mut leaf);
        graph.link(&child, &mut leaf, "is", true);
    }
    h.id
}

fn nested_query(alist: &Alist, graph: &mut InferenceGraph, var: &VarRef, query: &Map<String, Json>) -> String {
    let mut h = header(alist, "comp", 1.0, Branching::And);
    h.opvar = vec![var.clone()];
    h.set(var.clone(), Value::empty());
    graph.link(alist, &mut h, LABEL, true);

    let mut flat = Map::new();
    let mut next = NESTED_VAR_START;
    for (key, value) in query {
        match value {
            Json::Object(_) | Json::Array(_) if key != "cx" => {
                let minted = VarRef::new(VarKind::Nesting, next.to_string()).to_string();
                next += 1;
                flat.insert(key.clone(), Json::String(minted.clone()));
                flat.insert(minted, value.clone());
            }
            Json::String(s) => {
                flat.insert(key.clone(), Json::String(s.trim().to_string()));
            }
            other => {
                flat.insert(key.clone(), other.clone());
            }
        }
    }
    match Alist::from_json(Json::Object(flat)) {
        Ok(child) => {
            let op = child.op.clone();
            link_child(graph, &h, child, &op, LABEL);
        }
        Err(e) => tracing::warn!(node = %alist.id, error = %e, "malformed nested query"),
    }
    h.id
}
