//! The inference engine: decompose, search, reduce, propagate.
//!
//! An [`Engine`] is shared and stateless between queries; everything one
//! query mutates lives in its [`Session`]. The scheduler drives a session by
//! handing frontier nodes to [`Engine::run_node`] until the root's answer
//! stops changing.

pub mod engine;
mod search;

use std::sync::atomic::{AtomicU64, Ordering};
use std::time::{Duration, Instant};

use rand::SeedableRng;
use rand::rngs::StdRng;
use serde::Serialize;

use crate::alist::{Alist, Value};
use crate::graph::InferenceGraph;

pub use engine::Engine;

static NEXT_SESSION: AtomicU64 = AtomicU64::new(1);

/// A subtree abandoned because its query was malformed.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Rejection {
    pub node: String,
    pub reason: String,
}

/// Per-query state: one inference graph and what it has produced so far.
#[derive(Debug)]
pub struct Session {
    pub id: String,
    pub graph: InferenceGraph,
    pub root_id: String,
    /// Root snapshots taken each time an answer reached the root.
    pub propagated: Vec<Alist>,
    pub rejections: Vec<Rejection>,
    last_heartbeat: Instant,
    pub(crate) rng: StdRng,
}

impl Session {
    pub(crate) fn new(root_id: String, graph: InferenceGraph, seed: Option<u64>) -> Self {
        let n = NEXT_SESSION.fetch_add(1, Ordering::Relaxed);
        Self {
            id: format!("s{n}"),
            graph,
            root_id,
            propagated: Vec::new(),
            rejections: Vec::new(),
            last_heartbeat: Instant::now(),
            rng: seed.map_or_else(StdRng::from_entropy, StdRng::seed_from_u64),
        }
    }

    /// Note that the session made progress.
    pub fn heartbeat(&mut self) {
        self.last_heartbeat = Instant::now();
    }

    pub fn since_heartbeat(&self) -> Duration {
        self.last_heartbeat.elapsed()
    }

    pub fn root(&self) -> Option<&Alist> {
        self.graph.alist(&self.root_id)
    }

    /// The most recent root snapshot that carried an answer.
    pub fn latest_answer(&self) -> Option<&Alist> {
        self.propagated.last()
    }

    /// Snapshot the root as the current best answer.
    pub(crate) fn record_answer(&mut self) {
        if let Some(root) = self.graph.alist(&self.root_id).cloned() {
            let answer = root.opvar_value().map(Value::to_text).unwrap_or_default();
            tracing::info!(session = %self.id, %answer, root = %root, "intermediate answer");
            self.propagated.push(root);
        }
    }

    pub(crate) fn reject(&mut self, node: &str, reason: impl Into<String>) {
        self.rejections.push(Rejection {
            node: node.to_string(),
            reason: reason.into(),
        });
    }
}
