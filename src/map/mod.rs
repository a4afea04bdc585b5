//! Map registry: decomposition of an unresolved alist into sub-queries.
//!
//! A rule either declines (`None`) or links an aggregation header (HNODE)
//! under the node, with unresolved sub-queries (ZNODEs) beneath it, and
//! returns the header id. The header's op code names the reducer that will
//! later recombine the sub-queries.

pub mod comparison;
pub mod geospatial;
pub mod normalize;
pub mod temporal;

use std::collections::HashMap;
use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::alist::{Alist, Branching, NodeType, State};
use crate::config::EngineConfig;
use crate::error::MapError;
use crate::graph::InferenceGraph;
use crate::kb::Gazetteer;

/// Known decomposition rules.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub enum MapRule {
    Temporal,
    Geospatial,
    Normalize,
    Comparison,
}

impl MapRule {
    pub const ALL: [MapRule; 4] = [Self::Temporal, Self::Geospatial, Self::Normalize, Self::Comparison];

    pub fn name(self) -> &'static str {
        match self {
            Self::Temporal => "temporal",
            Self::Geospatial => "geospatial",
            Self::Normalize => "normalize",
            Self::Comparison => "comparison",
        }
    }
}

impl FromStr for MapRule {
    type Err = MapError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::ALL
            .into_iter()
            .find(|rule| rule.name().eq_ignore_ascii_case(s.trim()))
            .ok_or_else(|| MapError::UnknownRule { name: s.to_string() })
    }
}

impl TryFrom<String> for MapRule {
    type Error = MapError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        value.parse()
    }
}

impl From<MapRule> for String {
    fn from(rule: MapRule) -> Self {
        rule.name().to_string()
    }
}

impl fmt::Display for MapRule {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// What a rule may consult besides the node and the graph.
pub struct MapContext<'a> {
    pub config: &'a EngineConfig,
    pub gazetteer: Option<&'a dyn Gazetteer>,
    /// Wall-clock year, used when the query carries no `env.datetime`.
    pub current_year: i32,
}

/// A decomposition rule: links a header under the node and returns its id.
pub type MapFn = fn(&mut Alist, &mut InferenceGraph, &MapContext<'_>) -> Option<String>;

/// Rule → implementation table.
#[derive(Debug, Clone)]
pub struct MapRegistry {
    table: HashMap<MapRule, MapFn>,
}

impl Default for MapRegistry {
    fn default() -> Self {
        Self::builtin()
    }
}

impl MapRegistry {
    pub fn empty() -> Self {
        Self {
            table: HashMap::new(),
        }
    }

    pub fn builtin() -> Self {
        let mut registry = Self::empty();
        registry
            .register(MapRule::Temporal, temporal::decompose)
            .register(MapRule::Geospatial, geospatial::decompose)
            .register(MapRule::Normalize, normalize::decompose)
            .register(MapRule::Comparison, comparison::decompose);
        registry
    }

    pub fn register(&mut self, rule: MapRule, f: MapFn) -> &mut Self {
        self.table.insert(rule, f);
        self
    }

    pub fn get(&self, rule: MapRule) -> Option<MapFn> {
        self.table.get(&rule).copied()
    }
}

// ---------------------------------------------------------------------------
// Node construction shared by the rules
// ---------------------------------------------------------------------------

/// A header copied from `alist`: explored, one step more expensive.
pub(crate) fn header(alist: &Alist, op: &str, cost: f64, branch: Branching) -> Alist {
    let mut h = alist.copy().with_op(op);
    h.cost = alist.cost + cost;
    h.branch_type = branch;
    h.state = State::Explored;
    h.node_type = NodeType::Hnode;
    h
}

/// Prepare a sub-query under `header`.
pub(crate) fn subquery(mut child: Alist, header: &Alist, op: &str) -> Alist {
    child.op = op.to_string();
    child.cost = header.cost + 1.0;
    child.state = State::Unexplored;
    child.node_type = NodeType::Znode;
    child.context = header.context.clone();
    child
}
