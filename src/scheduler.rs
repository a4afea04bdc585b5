//! Frontier scheduler: drives one session until its answer settles.
//!
//! Each step hands a single leaf to [`Engine::run_node`]: the cheapest
//! reducible leaf first, otherwise the cheapest unexplored one. The loop
//! ends when nothing is left to explore, when exploration wanders too far
//! below the last successful propagation, when the step budget runs out, or
//! when the watchdog sees no heartbeat within the timeout. Whatever reached
//! the root last is the answer.

use std::time::Instant;

use rayon::prelude::*;
use serde::Serialize;
use serde_json::Value as Json;

use crate::alist::{Alist, Attr, State, Value};
use crate::config::SchedulerConfig;
use crate::error::FrankError;
use crate::infer::{Engine, Rejection, Session};
use crate::reduce::ReduceOp;
use crate::reduce::compare::response_var;
use crate::util::{format_number, round_sig};

/// Reported when nothing ever reached the root.
pub const NO_ANSWER: &str = "No answer found";

/// The finalised result of a session.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Answer {
    pub answer: String,
    pub error_bar: String,
    /// Comma-separated contributing sources.
    pub sources: String,
    pub elapsed_secs: f64,
    /// The root alist the answer was read from.
    pub alist: Option<Json>,
    pub rejections: Vec<Rejection>,
}

impl Answer {
    pub fn is_found(&self) -> bool {
        self.alist.is_some()
    }
}

pub struct Scheduler<'e> {
    engine: &'e Engine,
    config: SchedulerConfig,
}

impl<'e> Scheduler<'e> {
    pub fn new(engine: &'e Engine, config: SchedulerConfig) -> Self {
        Self { engine, config }
    }

    pub fn config(&self) -> &SchedulerConfig {
        &self.config
    }

    /// Answer one query.
    pub fn run(&self, root: Alist) -> Answer {
        self.run_session(root).0
    }

    /// Answer one query and hand back the session for inspection.
    pub fn run_session(&self, root: Alist) -> (Answer, Session) {
        let started = Instant::now();
        let mut session = self.engine.start_session(root);
        let steps = self.drive(&mut session);
        let answer = self.finalize(&session, started);
        tracing::info!(
            session = %session.id,
            steps,
            nodes = session.graph.len(),
            answer = %answer.answer,
            elapsed_secs = answer.elapsed_secs,
            "session finished"
        );
        (answer, session)
    }

    /// Answer independent queries concurrently. They share the engine's
    /// property cache and priors.
    pub fn run_many(&self, roots: Vec<Alist>) -> Vec<Answer> {
        roots.into_par_iter().map(|root| self.run(root)).collect()
    }

    /// The exploration loop. Returns the number of steps taken.
    pub fn drive(&self, session: &mut Session) -> usize {
        let mut last_prop_depth: Option<usize> = None;
        let mut steps = 0;
        loop {
            if session.since_heartbeat() > self.config.timeout() {
                tracing::warn!(session = %session.id, timeout_secs = self.config.timeout_secs, "watchdog expired");
                break;
            }
            if steps >= self.config.max_steps {
                tracing::warn!(session = %session.id, steps, "step budget exhausted");
                break;
            }

            let mut propagated = false;
            if let Some(node) = session.graph.frontier(1, false, State::Reducible).into_iter().next() {
                steps += 1;
                propagated = self.step(session, &node.id);
            }

            if !propagated {
                if let Some(node) = session.graph.frontier(1, false, State::Unexplored).into_iter().next() {
                    if let Some(depth) = last_prop_depth {
                        if node.depth > depth + self.config.max_prop_depth_diff {
                            tracing::debug!(session = %session.id, node = %node.id, depth = node.depth, last_prop_depth = depth, "exploration too deep, stopping");
                            break;
                        }
                    }
                    session.graph.set_state(&node.id, State::Exploring);
                    steps += 1;
                    if self.step(session, &node.id) {
                        last_prop_depth = Some(node.depth);
                        propagated = true;
                    }
                }
            }

            if !propagated {
                if !session.graph.has_leaf_in(State::Unexplored) {
                    break;
                }
                if session.since_heartbeat() <= self.config.timeout() {
                    std::thread::sleep(self.config.retry_backoff());
                }
            }
        }
        steps
    }

    /// Run one node. Errors never escape: a malformed node is ignored and
    /// its subtree recorded as rejected.
    fn step(&self, session: &mut Session, id: &str) -> bool {
        match self.engine.run_node(session, id) {
            Ok(propagated) => propagated,
            Err(e) => {
                let node = e.node_id().unwrap_or(id).to_string();
                tracing::error!(session = %session.id, %node, error = %e, "rejected subtree");
                if matches!(e, FrankError::Reduce(_)) {
                    session.graph.set_state(&node, State::Ignore);
                    session.reject(&node, e.to_string());
                }
                false
            }
        }
    }

    fn finalize(&self, session: &Session, started: Instant) -> Answer {
        let elapsed_secs = started.elapsed().as_secs_f64();
        let rejections = session.rejections.clone();
        let Some(root) = session.latest_answer() else {
            return Answer {
                answer: NO_ANSWER.to_string(),
                error_bar: "0".to_string(),
                sources: String::new(),
                elapsed_secs,
                alist: None,
                rejections,
            };
        };

        let value = answer_value(root);
        let (answer, error_bar) = match value.as_ref().and_then(Value::as_number) {
            Some(n) => {
                let error = round_sig(root.cov * n, self.config.errorbar_sigdig);
                (
                    format_number(round_sig(n, self.config.answer_sigdig)),
                    format_number(error),
                )
            }
            None => (value.map(|v| v.to_text()).unwrap_or_default(), "0".to_string()),
        };
        Answer {
            answer,
            error_bar,
            sources: root.data_sources.iter().cloned().collect::<Vec<_>>().join(","),
            elapsed_secs,
            alist: Some(root.to_json()),
            rejections,
        }
    }
}

/// The value a root snapshot answers with: a comparison's response, else its
/// first bound projection variable, else its operation variable.
fn answer_value(root: &Alist) -> Option<Value> {
    if let Some(op) = ReduceOp::from_code(&root.op).filter(|op| op.is_comparison()) {
        if let Some(v) = root.instantiation_value(&Attr::Var(response_var(op))) {
            return Some(v.clone());
        }
    }
    root.projection_variables()
        .iter()
        .filter_map(|(var, _)| root.instantiation_value(&Attr::Var(var.clone())))
        .find(|v| v.is_concrete())
        .or_else(|| root.opvar_value())
        .cloned()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::alist::VarRef;
    use crate::config::EngineConfig;
    use crate::graph::ROOT_ID;

    fn engine(max_depth: usize) -> Engine {
        Engine::new(EngineConfig {
            max_depth,
            seed: Some(11),
            ..EngineConfig::default()
        })
    }

    fn quick() -> SchedulerConfig {
        SchedulerConfig {
            retry_backoff_ms: 0,
            ..SchedulerConfig::default()
        }
    }

    #[test]
    fn terminates_without_sources() {
        let engine = engine(3);
        let scheduler = Scheduler::new(&engine, quick());
        let root = Alist::new()
            .with(Attr::Subject, "Ghana")
            .with(Attr::Property, "population")
            .with(Attr::Object, "?x")
            .with(Attr::Time, "2010")
            .with_opvar("?x");
        let (answer, session) = scheduler.run_session(root);
        assert_eq!(answer.answer, NO_ANSWER);
        assert_eq!(answer.error_bar, "0");
        assert!(answer.alist.is_none());
        assert!(!session.graph.has_leaf_in(State::Unexplored));
        assert!(session.graph.len() < 200);
    }

    #[test]
    fn step_budget_bounds_the_loop() {
        let engine = engine(20);
        let scheduler = Scheduler::new(
            &engine,
            SchedulerConfig {
                max_steps: 5,
                ..quick()
            },
        );
        let root = Alist::new()
            .with(Attr::Subject, "Ghana")
            .with(Attr::Property, "population")
            .with(Attr::Object, "?x")
            .with(Attr::Time, "2010")
            .with_opvar("?x");
        let mut session = engine.start_session(root);
        assert_eq!(scheduler.drive(&mut session), 5);
    }

    #[test]
    fn bound_root_answers_itself() {
        let engine = engine(20);
        let scheduler = Scheduler::new(&engine, quick());
        let root = Alist::new()
            .with_opvar("?x")
            .with(VarRef::projection("x"), "125.142857")
            .with_cov(0.02);
        let answer = scheduler.run(root);
        assert_eq!(answer.answer, "125.1");
        assert_eq!(answer.error_bar, "2.5");
        assert!(answer.is_found());
    }

    #[test]
    fn comparison_answer_prefers_the_response() {
        let root = Alist::new()
            .with_op("gt")
            .with_opvar("$a $b")
            .with(VarRef::projection("y"), "20")
            .with(response_var(ReduceOp::Gt), "true");
        assert_eq!(answer_value(&root), Some(Value::from("true")));
    }

    #[test]
    fn unknown_operation_is_rejected_not_raised() {
        let engine = engine(20);
        let scheduler = Scheduler::new(&engine, quick());
        let mut session = engine.start_session(Alist::new().with_op("median").with_opvar("?x"));
        let root = session.root().cloned().unwrap();
        let mut fact = Alist::new().with_opvar("?x").with(VarRef::projection("x"), "3");
        fact.state = State::Reducible;
        session.graph.link(&root, &mut fact, "Lookup", true);

        scheduler.drive(&mut session);
        assert_eq!(session.rejections.len(), 1);
        assert_eq!(session.rejections[0].node, ROOT_ID);
        assert_eq!(session.root().unwrap().state, State::Ignore);
    }
}
