//! Geospatial decomposition: sum a quantity over a place's constituents.

use super::{MapContext, header, subquery};
use crate::alist::{Alist, Attr, Branching, Value};
use crate::graph::InferenceGraph;

/// Data source credited for containment lookups.
pub const GAZETTEER_SOURCE: &str = "geonames";

pub fn decompose(alist: &mut Alist, graph: &mut InferenceGraph, ctx: &MapContext<'_>) -> Option<String> {
    let gazetteer = ctx.gazetteer?;
    if !alist.is_instantiated(&Attr::Subject) {
        return None;
    }
    let place = alist.instantiation_value(&Attr::Subject)?.to_text();
    let subs = match gazetteer.find_sub_locations(place.trim()) {
        Ok(subs) => subs,
        Err(e) => {
            tracing::warn!(node = %alist.id, place = %place, error = %e, "gazetteer lookup failed");
            return None;
        }
    };
    if subs.is_empty() {
        return None;
    }

    alist.data_sources.insert(GAZETTEER_SOURCE.to_string());
    let mut h = header(alist, "sum", 4.0, Branching::And);
    let header_id = graph.link(alist, &mut h, "geospatial", true);
    for sub in &subs {
        let mut child = subquery(alist.copy(), &h, "value").with(Attr::Subject, Value::Text(sub.clone()));
        graph.link(&h, &mut child, "geospatial", true);
    }
    tracing::debug!(node = %alist.id, header = %header_id, place = %place, parts = subs.len(), "geospatial decomposition");
    Some(header_id)
}
