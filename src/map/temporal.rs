//! Temporal decomposition: estimate a value at one year from nearby years.

use super::{MapContext, header, subquery};
use crate::alist::context::flush;
use crate::alist::{Alist, Attr, Branching};
use crate::graph::InferenceGraph;

/// Branching factor used under a high-accuracy context.
const HIGH_ACCURACY_BRANCHING: usize = 20;

/// The requested year, when the time slot is a concrete four-digit year.
fn requested_year(alist: &Alist) -> Option<i32> {
    let text = alist.instantiation_value(&Attr::Time)?.to_text();
    let text = text.trim();
    if text.len() != 4 || !text.bytes().all(|b| b.is_ascii_digit()) {
        return None;
    }
    text.parse().ok()
}

/// Years to sample for a query about `year` when it is now `now`.
///
/// Far from the present the samples straddle the year; at or past the
/// present they fall back to the most recent past years. Remaining slots go
/// to years further back.
pub fn sample_years(year: i32, now: i32, branching: usize) -> Vec<i32> {
    let bf = branching as i32;
    let mut years = Vec::new();
    if f64::from(now - year) > f64::from(bf) / 2.0 {
        let half = (f64::from(bf) / 2.0).ceil() as i32;
        for i in 1..half {
            years.push(year + i);
            years.push(year - i);
        }
    } else if year >= now {
        for i in 1..bf {
            years.push(now - i);
        }
    }
    let count = years.len() as i32;
    for i in 1..(bf - count) {
        years.push(year - (count + i));
    }
    years
}

pub fn decompose(alist: &mut Alist, graph: &mut InferenceGraph, ctx: &MapContext<'_>) -> Option<String> {
    let year = requested_year(alist)?;
    let now = alist.context.current_year().unwrap_or(ctx.current_year);

    let mut branching = ctx.config.temporal_branching_factor;
    let op = if alist.context.is_high_accuracy() {
        if branching <= 10 {
            branching = HIGH_ACCURACY_BRANCHING;
        }
        "gpregress"
    } else {
        "regress"
    };

    let mut h = header(alist, op, 2.0, Branching::And);
    flush(&mut h, &[Attr::Time]);
    let header_id = graph.link(alist, &mut h, "temporal", true);

    let years = sample_years(year, now, branching);
    for y in &years {
        let mut child = subquery(alist.copy(), &h, "value").with(Attr::Time, y.to_string());
        flush(&mut child, &[Attr::Time]);
        graph.link(&h, &mut child, "value", true);
    }
    tracing::debug!(node = %alist.id, header = %header_id, op, samples = years.len(), "temporal decomposition");
    Some(header_id)
}
