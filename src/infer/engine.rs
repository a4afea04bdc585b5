//! Engine: the per-node state machine and bottom-up aggregation.

use std::sync::Arc;

use chrono::Datelike;
use rand::rngs::StdRng;
use rand::seq::SliceRandom;

use super::Session;
use crate::alist::context::inject_query_context;
use crate::alist::{Alist, State};
use crate::config::EngineConfig;
use crate::error::{FrankResult, ReduceError};
use crate::graph::{InferenceGraph, ROOT_ID};
use crate::kb::{Gazetteer, KnowledgeSource, SessionCache};
use crate::map::{MapContext, MapRegistry, MapRule};
use crate::reduce::{ReduceOp, ReduceRegistry, ReduceScope};
use crate::uncertainty::prior::{MemoryPriorStore, PriorStore};

/// Op code of set-comprehension headers; never fed to their parent's reducer.
const COMP_OP: &str = "comp";

/// Shared inference machinery. Per-query state lives in [`Session`].
pub struct Engine {
    pub(super) config: EngineConfig,
    pub(super) sources: Vec<Arc<dyn KnowledgeSource>>,
    gazetteer: Option<Arc<dyn Gazetteer>>,
    pub(super) priors: Arc<dyn PriorStore>,
    pub(super) cache: Arc<SessionCache>,
    maps: MapRegistry,
    reducers: ReduceRegistry,
}

impl Engine {
    /// An engine with the built-in rules and reducers and no sources.
    pub fn new(config: EngineConfig) -> Self {
        tracing::info!(
            max_depth = config.max_depth,
            rules = ?config.base_decompositions,
            "inference engine initialized"
        );
        Self {
            config,
            sources: Vec::new(),
            gazetteer: None,
            priors: Arc::new(MemoryPriorStore::new()),
            cache: Arc::new(SessionCache::new()),
            maps: MapRegistry::builtin(),
            reducers: ReduceRegistry::builtin(),
        }
    }

    pub fn with_source(mut self, source: Arc<dyn KnowledgeSource>) -> Self {
        self.sources.push(source);
        self
    }

    pub fn with_gazetteer(mut self, gazetteer: Arc<dyn Gazetteer>) -> Self {
        self.gazetteer = Some(gazetteer);
        self
    }

    pub fn with_priors(mut self, priors: Arc<dyn PriorStore>) -> Self {
        self.priors = priors;
        self
    }

    pub fn with_cache(mut self, cache: Arc<SessionCache>) -> Self {
        self.cache = cache;
        self
    }

    pub fn with_maps(mut self, maps: MapRegistry) -> Self {
        self.maps = maps;
        self
    }

    pub fn with_reducers(mut self, reducers: ReduceRegistry) -> Self {
        self.reducers = reducers;
        self
    }

    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    pub fn cache(&self) -> &SessionCache {
        &self.cache
    }

    pub fn priors(&self) -> &dyn PriorStore {
        self.priors.as_ref()
    }

    // -----------------------------------------------------------------------
    // Sessions
    // -----------------------------------------------------------------------

    /// Open a session with `root` queued as the only node.
    pub fn start_session(&self, mut root: Alist) -> Session {
        root.id = ROOT_ID.to_string();
        root.depth = 0;
        root.state = State::Unexplored;
        inject_query_context(&mut root);
        self.disambiguate(&mut root);

        let mut graph = InferenceGraph::new();
        graph.add_alist(root);
        let session = Session::new(ROOT_ID.to_string(), graph, self.config.seed);
        tracing::info!(session = %session.id, root = ?session.root().map(ToString::to_string), "session started");
        session
    }

    /// Resolve one node: mark it reducible, search for it, or decompose it,
    /// then try to aggregate upwards. Returns whether the root was reached.
    pub fn run_node(&self, session: &mut Session, id: &str) -> FrankResult<bool> {
        session.heartbeat();
        let mut alist = session.graph.require(id)?.clone();
        if matches!(alist.state, State::Pruned | State::Ignore | State::Reduced) {
            tracing::debug!(node = %id, state = %alist.state, "skipping node");
            return Ok(false);
        }
        tracing::debug!(session = %session.id, node = %alist, "run node");

        let aggregated = alist.opvar_instantiated();
        let projected = alist.projection_instantiated();
        let resolved = if aggregated {
            alist.state = State::Reducible;
            session.graph.add_alist(alist.clone());
            true
        } else {
            self.search_kb(session, &alist)
        };

        if resolved {
            if alist.state != State::Reducible {
                alist.state = State::Explored;
            }
            if aggregated && projected {
                alist.state = State::Reducible;
            }
            session.graph.add_alist(alist.clone());
        } else {
            alist.state = State::Explored;
            session.graph.add_alist(alist.clone());
            self.decompose(session, &mut alist);
        }

        let first_child = session.graph.child_ids(&alist.id).into_iter().next();
        let parent = session.graph.parent_ids(&alist.id).into_iter().next();
        let start = match (first_child, &parent) {
            (Some(child), _) => child,
            (None, Some(parent)) => match session.graph.child_ids(parent).into_iter().next() {
                Some(sibling) => sibling,
                None => return Ok(false),
            },
            (None, None) => return Ok(self.settle_lone_root(session, &alist.id)),
        };

        let propagated = self.propagate(session, &start)?;
        if propagated {
            session.record_answer();
        }
        Ok(propagated)
    }

    /// A root without parent or children is its own answer once reducible.
    fn settle_lone_root(&self, session: &mut Session, id: &str) -> bool {
        let reducible = session
            .graph
            .alist(id)
            .is_some_and(|a| a.state == State::Reducible);
        if !reducible {
            return false;
        }
        session.record_answer();
        session.graph.set_state(id, State::Reduced);
        true
    }

    // -----------------------------------------------------------------------
    // Decomposition
    // -----------------------------------------------------------------------

    /// Rules to try for `alist`, in order.
    ///
    /// Comparisons and unresolved directives each have exactly one
    /// applicable rule; otherwise the configured base rules are shuffled.
    pub fn map_strategy(&self, alist: &Alist, rng: &mut StdRng) -> Vec<MapRule> {
        if ReduceOp::from_code(&alist.op).is_some_and(ReduceOp::is_comparison) {
            return vec![MapRule::Comparison];
        }
        if !alist.uninstantiated_nesting_variables().is_empty() {
            return vec![MapRule::Normalize];
        }
        let mut rules = self.config.base_decompositions.clone();
        rules.shuffle(rng);
        rules
    }

    /// Apply the first rule that accepts `alist`. Returns the new header id.
    pub fn decompose(&self, session: &mut Session, alist: &mut Alist) -> Option<String> {
        session.heartbeat();
        if alist.depth + 1 > self.config.max_depth {
            tracing::warn!(node = %alist.id, depth = alist.depth, max_depth = self.config.max_depth, "max depth reached");
            alist.state = State::Ignore;
            session.graph.add_alist(alist.clone());
            return None;
        }

        let ctx = MapContext {
            config: &self.config,
            gazetteer: self.gazetteer.as_deref(),
            current_year: chrono::Local::now().year(),
        };
        for rule in self.map_strategy(alist, &mut session.rng) {
            let Some(map) = self.maps.get(rule) else {
                tracing::debug!(%rule, "rule not registered");
                continue;
            };
            if let Some(header) = map(alist, &mut session.graph, &ctx) {
                session.graph.add_alist(alist.clone());
                tracing::debug!(node = %alist.id, %rule, %header, "decomposed");
                return Some(header);
            }
        }
        tracing::debug!(node = %alist.id, "no rule applies");
        None
    }

    // -----------------------------------------------------------------------
    // Aggregation
    // -----------------------------------------------------------------------

    /// Reduce the resolved children of `id` into it.
    ///
    /// Returns `Ok(false)` when there is nothing to reduce yet or the reducer
    /// declined; the node stays eligible for a later pass. An op code with no
    /// reducer is an error.
    pub fn aggregate(&self, session: &mut Session, id: &str) -> FrankResult<bool> {
        session.heartbeat();
        let mut parent = session.graph.require(id)?.clone();
        if matches!(parent.state, State::Ignore | State::Pruned) {
            return Ok(false);
        }
        let op = ReduceOp::from_code(&parent.op).ok_or_else(|| ReduceError::UnknownOperation {
            node: id.to_string(),
            op: parent.op.clone(),
        })?;
        let reducer = self.reducers.get(op).ok_or_else(|| ReduceError::Unregistered {
            node: id.to_string(),
            op: op.to_string(),
        })?;

        let children = session.graph.child_alists(id);
        let reducibles: Vec<Alist> = children
            .iter()
            .filter(|c| matches!(c.state, State::Reducible | State::Reduced) && c.op != COMP_OP)
            .cloned()
            .collect();
        let unexplored = children.iter().filter(|c| c.state == State::Unexplored).count();
        if reducibles.is_empty() || unexplored == children.len() {
            return Ok(false);
        }
        let expected = children.iter().filter(|c| c.op != COMP_OP).count();

        let before = parent.state;
        let mut scope = ReduceScope {
            graph: &mut session.graph,
            expected_children: expected,
        };
        if !reducer(&mut parent, &reducibles, &mut scope) {
            tracing::debug!(node = %id, %op, children = reducibles.len(), "reduce failed");
            return Ok(false);
        }

        for child in &children {
            parent.data_sources.extend(child.data_sources.iter().cloned());
        }
        for child in &reducibles {
            session.graph.set_state(&child.id, State::Reduced);
        }
        if before != State::Reduced && parent.state != State::Ignore {
            parent.state = State::Reducible;
        } else if before == State::Reduced {
            parent.state = State::Reduced;
        }
        tracing::debug!(node = %id, %op, children = reducibles.len(), expected, result = %parent.opvar_text(), "reduced");
        session.graph.add_alist(parent);
        Ok(true)
    }

    /// Aggregate upwards from `id` along earliest parents. Returns whether
    /// the walk reached a parentless root; stops at the first failure.
    pub fn propagate(&self, session: &mut Session, id: &str) -> FrankResult<bool> {
        session.heartbeat();
        let mut current = id.to_string();
        for _ in 0..=session.graph.len() {
            let Some(parent) = session.graph.parent_ids(&current).into_iter().next() else {
                return Ok(true);
            };
            if !self.aggregate(session, &parent)? {
                return Ok(false);
            }
            current = parent;
        }
        tracing::warn!(node = %id, "propagation did not terminate");
        Ok(false)
    }
}
