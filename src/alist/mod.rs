//! Alists: the frame representation of one unit of inference work.
//!
//! An alist is a partially bound query (subject, property, object, time plus
//! any number of variables) together with the metadata the engine uses to
//! schedule and aggregate it. On the wire an alist is a flat JSON object with
//! short keys (`h` op, `s`/`p`/`o`/`t` slots, `v` operation variables, `u`
//! coverage, `cx` context, `meta` metadata).

pub mod context;
pub mod value;

use std::collections::{BTreeMap, BTreeSet};
use std::fmt;

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value as Json};

use crate::error::AlistError;

pub use context::{Context, ContextValue};
pub use value::{Attr, Value, VarKind, VarRef};

/// Result type for alist parsing.
pub type AlistResult<T> = std::result::Result<T, AlistError>;

/// Default operation code.
pub const DEFAULT_OP: &str = "value";

/// Lifecycle state of an alist in the inference graph.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum State {
    /// Max depth exceeded, or superseded.
    Ignore,
    #[default]
    Unexplored,
    /// Claimed by the scheduler, not yet run.
    Exploring,
    /// Search attempted or decomposed.
    Explored,
    /// Operation variables instantiated.
    Reducible,
    /// Consumed by a successful parent aggregation.
    Reduced,
    /// Excluded together with its subtree.
    Pruned,
}

impl fmt::Display for State {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::Ignore => "ignore",
            Self::Unexplored => "unexplored",
            Self::Exploring => "exploring",
            Self::Explored => "explored",
            Self::Reducible => "reducible",
            Self::Reduced => "reduced",
            Self::Pruned => "pruned",
        };
        f.write_str(name)
    }
}

/// Role of a node in the inference graph.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum NodeType {
    /// Unresolved leaf query.
    #[default]
    Znode,
    /// Aggregation header.
    Hnode,
    /// Concretely retrieved fact.
    Fact,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Branching {
    #[default]
    Or,
    And,
}

/// Scheduling metadata, serialised under `meta`.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
struct Meta {
    #[serde(default)]
    cost: f64,
    #[serde(default)]
    depth: usize,
    #[serde(default)]
    state: State,
    #[serde(default)]
    data_sources: BTreeSet<String>,
    #[serde(default)]
    branch_type: Branching,
    #[serde(default)]
    node_type: NodeType,
}

/// A frame: semantic slots, variable bindings and scheduling metadata.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(try_from = "Map<String, Json>", into = "Map<String, Json>")]
pub struct Alist {
    pub id: String,
    /// Operation code naming the reducer (`h`).
    pub op: String,
    /// Variables that must be instantiated before aggregation (`v`).
    pub opvar: Vec<VarRef>,
    /// Coefficient-of-variation-like uncertainty of the node's value (`u`).
    pub cov: f64,
    /// Explanation text (`xp`).
    pub explain: String,
    /// Regression artifact (`fp`).
    pub fnplot: Option<Json>,
    /// Context block (`cx`).
    pub context: Context,
    attributes: BTreeMap<Attr, Value>,

    /// Frontier priority, ascending.
    pub cost: f64,
    /// Distance from the root.
    pub depth: usize,
    pub state: State,
    /// Ids of the sources that contributed to this node's value.
    pub data_sources: BTreeSet<String>,
    pub branch_type: Branching,
    pub node_type: NodeType,
}

impl Default for Alist {
    fn default() -> Self {
        Self::new()
    }
}

impl Alist {
    /// An empty alist: id `0`, op `value`, all four slots present and empty.
    pub fn new() -> Self {
        Self {
            id: "0".to_string(),
            op: DEFAULT_OP.to_string(),
            opvar: Vec::new(),
            cov: 0.0,
            explain: String::new(),
            fnplot: None,
            context: Context::default(),
            attributes: Attr::SLOTS.iter().map(|a| (a.clone(), Value::empty())).collect(),
            cost: 0.0,
            depth: 0,
            state: State::Unexplored,
            data_sources: BTreeSet::new(),
            branch_type: Branching::Or,
            node_type: NodeType::Znode,
        }
    }

    /// Parse an alist from JSON text.
    pub fn from_json_str(text: &str) -> AlistResult<Self> {
        let json: Json = serde_json::from_str(text).map_err(|e| AlistError::Parse {
            message: e.to_string(),
        })?;
        Self::from_json(json)
    }

    pub fn from_json(json: Json) -> AlistResult<Self> {
        match json {
            Json::Object(map) => Self::try_from(map),
            other => Err(AlistError::NotAnObject {
                found: other.to_string(),
            }),
        }
    }

    pub fn to_json(&self) -> Json {
        Json::Object(self.clone().into())
    }

    // -----------------------------------------------------------------------
    // Builders
    // -----------------------------------------------------------------------

    pub fn with(mut self, attr: impl Into<Attr>, value: impl Into<Value>) -> Self {
        self.set(attr, value);
        self
    }

    pub fn with_op(mut self, op: impl Into<String>) -> Self {
        self.op = op.into();
        self
    }

    /// Set operation variables from a space-separated list; tokens without a
    /// variable sigil are dropped.
    pub fn with_opvar(mut self, opvar: &str) -> Self {
        self.opvar = parse_opvar(opvar);
        self
    }

    pub fn with_cov(mut self, cov: f64) -> Self {
        self.cov = cov;
        self
    }

    pub fn with_id(mut self, id: impl Into<String>) -> Self {
        self.id = id.into();
        self
    }

    // -----------------------------------------------------------------------
    // Raw access
    // -----------------------------------------------------------------------

    /// The raw, unresolved value of an attribute.
    pub fn get(&self, attr: &Attr) -> Option<&Value> {
        self.attributes.get(attr)
    }

    pub fn set(&mut self, attr: impl Into<Attr>, value: impl Into<Value>) {
        self.attributes.insert(attr.into(), value.into());
    }

    /// Remove an attribute. The four slots are never removed, only emptied.
    pub fn remove(&mut self, attr: &Attr) -> Option<Value> {
        if attr.is_slot() {
            self.attributes
                .insert(attr.clone(), Value::empty())
                .filter(|v| !v.is_empty())
        } else {
            self.attributes.remove(attr)
        }
    }

    pub fn contains(&self, attr: &Attr) -> bool {
        self.attributes.contains_key(attr)
    }

    pub fn attributes(&self) -> impl Iterator<Item = (&Attr, &Value)> {
        self.attributes.iter()
    }

    pub fn attribute_count(&self) -> usize {
        self.attributes.len()
    }

    /// Raw text of an attribute, empty when unset.
    pub fn text(&self, attr: &Attr) -> String {
        self.get(attr).map(Value::to_text).unwrap_or_default()
    }

    // -----------------------------------------------------------------------
    // Resolution
    // -----------------------------------------------------------------------

    /// Whether the attribute is bound to a concrete value.
    ///
    /// For the four slots a variable reference is followed one hop: `o: ?x`
    /// counts as instantiated once `?x` is bound to a literal.
    pub fn is_instantiated(&self, attr: &Attr) -> bool {
        match self.attributes.get(attr) {
            None => false,
            Some(Value::Var(var)) if attr.is_slot() => self
                .attributes
                .get(&Attr::Var(var.clone()))
                .is_some_and(Value::is_concrete),
            Some(value) => value.is_concrete(),
        }
    }

    /// Follow variable references to the value they ultimately denote.
    ///
    /// Returns `None` for a missing attribute, a dangling reference or a
    /// reference cycle.
    pub fn instantiation_value(&self, attr: &Attr) -> Option<&Value> {
        let mut current = self.attributes.get(attr)?;
        let mut hops = 0;
        while let Value::Var(var) = current {
            hops += 1;
            if hops > self.attributes.len() {
                return None;
            }
            current = self.attributes.get(&Attr::Var(var.clone()))?;
        }
        Some(current)
    }

    /// Bind `var` to `value` and rewrite co-referencing variables.
    ///
    /// `var` itself is bound when `insert_missing` is set, when it already
    /// exists, or when any attribute references it. Every variable-keyed
    /// attribute whose raw value is `var` is rewritten to `value`; slots keep
    /// their reference so they keep resolving through the chain.
    pub fn instantiate_variable(&mut self, var: &VarRef, value: impl Into<Value>, insert_missing: bool) {
        let value = value.into();
        if value.as_var() == Some(var) {
            return;
        }
        let key = Attr::Var(var.clone());
        let referenced = self.attributes.values().any(|v| v.as_var() == Some(var));
        if insert_missing || referenced || self.attributes.contains_key(&key) {
            self.attributes.insert(key, value.clone());
        }
        for (k, v) in self.attributes.iter_mut() {
            if matches!(k, Attr::Var(_)) && v.as_var() == Some(var) {
                *v = value.clone();
            }
        }
    }

    // -----------------------------------------------------------------------
    // Classification
    // -----------------------------------------------------------------------

    /// Attributes that are variables or reference one.
    pub fn variables(&self) -> Vec<Attr> {
        self.attributes
            .iter()
            .filter(|(k, v)| matches!(k, Attr::Var(_)) || v.is_var())
            .map(|(k, _)| k.clone())
            .collect()
    }

    /// Instantiated attributes together with their resolved values.
    pub fn instantiated_attributes(&self) -> Vec<(Attr, Value)> {
        self.attributes
            .keys()
            .filter(|k| self.is_instantiated(k))
            .filter_map(|k| self.instantiation_value(k).map(|v| (k.clone(), v.clone())))
            .collect()
    }

    pub fn uninstantiated_attributes(&self) -> Vec<Attr> {
        self.variables()
            .into_iter()
            .filter(|k| !self.is_instantiated(k))
            .collect()
    }

    pub fn projection_variables(&self) -> Vec<(VarRef, Value)> {
        self.attributes
            .iter()
            .filter_map(|(k, v)| match k {
                Attr::Var(var) if var.is_projection() => Some((var.clone(), v.clone())),
                _ => None,
            })
            .collect()
    }

    /// Whether every projection variable (if any) is instantiated.
    pub fn projection_instantiated(&self) -> bool {
        self.projection_variables()
            .iter()
            .all(|(var, _)| self.is_instantiated(&Attr::Var(var.clone())))
    }

    /// `#`-keyed attributes and any attribute bound to a nested object.
    pub fn nesting_variables(&self) -> Vec<(Attr, Value)> {
        self.attributes
            .iter()
            .filter(|(k, v)| {
                matches!(k, Attr::Var(var) if var.kind() == VarKind::Nesting)
                    || matches!(v, Value::Nested(_))
            })
            .map(|(k, v)| (k.clone(), v.clone()))
            .collect()
    }

    /// Variables still bound to a nested directive.
    pub fn uninstantiated_nesting_variables(&self) -> Vec<(VarRef, Map<String, Json>)> {
        self.attributes
            .iter()
            .filter_map(|(k, v)| match (k, v) {
                (Attr::Var(var), Value::Nested(map)) => Some((var.clone(), map.clone())),
                _ => None,
            })
            .collect()
    }

    /// Attributes whose raw value is a reference to `var`.
    pub fn variable_references(&self, var: &VarRef) -> Vec<Attr> {
        self.attributes
            .iter()
            .filter(|(_, v)| v.as_var() == Some(var))
            .map(|(k, _)| k.clone())
            .collect()
    }

    // -----------------------------------------------------------------------
    // Operation variables
    // -----------------------------------------------------------------------

    pub fn first_opvar(&self) -> Option<&VarRef> {
        self.opvar.first()
    }

    /// Whether the node has operation variables and all are instantiated.
    pub fn opvar_instantiated(&self) -> bool {
        !self.opvar.is_empty()
            && self
                .opvar
                .iter()
                .all(|v| self.is_instantiated(&Attr::Var(v.clone())))
    }

    /// Resolved value of the first operation variable.
    pub fn opvar_value(&self) -> Option<&Value> {
        self.instantiation_value(&Attr::Var(self.first_opvar()?.clone()))
    }

    pub fn opvar_text(&self) -> String {
        self.opvar
            .iter()
            .map(VarRef::to_string)
            .collect::<Vec<_>>()
            .join(" ")
    }

    /// Whether `var` is one of this node's operation variables.
    pub fn is_opvar(&self, var: &VarRef) -> bool {
        self.opvar.contains(var)
    }

    // -----------------------------------------------------------------------
    // Branching
    // -----------------------------------------------------------------------

    /// Deep copy for spawning a sibling or child: bindings and data sources
    /// are kept, id/cost/depth/state are reset.
    pub fn copy(&self) -> Self {
        let mut copy = self.clone();
        copy.id = "0".to_string();
        copy.cost = 0.0;
        copy.depth = 0;
        copy.state = State::Unexplored;
        copy
    }
}

fn parse_opvar(text: &str) -> Vec<VarRef> {
    text.split_whitespace().filter_map(VarRef::parse).collect()
}

impl fmt::Display for Alist {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "[{}] {}({}) s={} p={} o={} t={}",
            self.id,
            self.op,
            self.opvar_text(),
            self.text(&Attr::Subject),
            self.text(&Attr::Property),
            self.text(&Attr::Object),
            self.text(&Attr::Time),
        )
    }
}

// ---------------------------------------------------------------------------
// Wire form
// ---------------------------------------------------------------------------

impl TryFrom<Map<String, Json>> for Alist {
    type Error = AlistError;

    fn try_from(map: Map<String, Json>) -> AlistResult<Self> {
        let mut alist = Alist::new();
        let mut cost_override = None;
        for (key, json) in map {
            match key.as_str() {
                "id" => alist.id = text_of(&json),
                "h" => {
                    let op = text_of(&json);
                    alist.op = if op.is_empty() { DEFAULT_OP.to_string() } else { op };
                }
                "v" => alist.opvar = parse_opvar(&text_of(&json)),
                "u" => {
                    alist.cov = number_of(&json).ok_or_else(|| AlistError::InvalidAttribute {
                        key: key.clone(),
                        message: format!("expected a number, got {json}"),
                    })?;
                }
                "xp" => alist.explain = text_of(&json),
                "fp" => {
                    alist.fnplot = match json {
                        Json::Null => None,
                        Json::String(ref s) if s.is_empty() => None,
                        other => Some(other),
                    }
                }
                "cx" => {
                    alist.context = Context::from_json(&json).ok_or_else(|| AlistError::InvalidAttribute {
                        key: key.clone(),
                        message: "expected an object or a [user, env, query] array".to_string(),
                    })?;
                }
                "l" => cost_override = number_of(&json),
                "meta" => {
                    let meta: Meta = serde_json::from_value(json).map_err(|e| AlistError::InvalidAttribute {
                        key: key.clone(),
                        message: e.to_string(),
                    })?;
                    alist.cost = meta.cost;
                    alist.depth = meta.depth;
                    alist.state = meta.state;
                    alist.data_sources = meta.data_sources;
                    alist.branch_type = meta.branch_type;
                    alist.node_type = meta.node_type;
                }
                other => alist.set(Attr::parse(other), Value::from_json(&json)),
            }
        }
        if let Some(cost) = cost_override {
            alist.cost = cost;
        }
        Ok(alist)
    }
}

impl From<Alist> for Map<String, Json> {
    fn from(alist: Alist) -> Self {
        let mut map = Map::new();
        map.insert("id".into(), Json::String(alist.id.clone()));
        map.insert("h".into(), Json::String(alist.op.clone()));
        map.insert("v".into(), Json::String(alist.opvar_text()));
        map.insert(
            "u".into(),
            serde_json::Number::from_f64(alist.cov)
                .map(Json::Number)
                .unwrap_or(Json::Null),
        );
        map.insert("xp".into(), Json::String(alist.explain.clone()));
        if let Some(fp) = &alist.fnplot {
            map.insert("fp".into(), fp.clone());
        }
        if !alist.context.is_empty() {
            map.insert(
                "cx".into(),
                serde_json::to_value(&alist.context).unwrap_or(Json::Null),
            );
        }
        for (attr, value) in &alist.attributes {
            map.insert(attr.to_string(), value.to_json());
        }
        let meta = Meta {
            cost: alist.cost,
            depth: alist.depth,
            state: alist.state,
            data_sources: alist.data_sources,
            branch_type: alist.branch_type,
            node_type: alist.node_type,
        };
        map.insert("meta".into(), serde_json::to_value(meta).unwrap_or(Json::Null));
        map
    }
}

fn text_of(json: &Json) -> String {
    match json {
        Json::String(s) => s.clone(),
        Json::Null => String::new(),
        other => other.to_string(),
    }
}

fn number_of(json: &Json) -> Option<f64> {
    match json {
        Json::Number(n) => n.as_f64(),
        Json::String(s) => crate::util::parse_number(s),
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn var(text: &str) -> VarRef {
        VarRef::parse(text).unwrap()
    }

    fn population_query() -> Alist {
        Alist::new()
            .with(Attr::Subject, "Ghana")
            .with(Attr::Property, "P1082")
            .with(Attr::Object, "?x")
            .with(Attr::Time, "2010")
            .with_opvar("?x")
    }

    #[test]
    fn defaults_match_wire_defaults() {
        let alist = Alist::new();
        assert_eq!(alist.id, "0");
        assert_eq!(alist.op, "value");
        assert_eq!(alist.state, State::Unexplored);
        assert_eq!(alist.node_type, NodeType::Znode);
        for slot in &Attr::SLOTS {
            assert_eq!(alist.get(slot), Some(&Value::empty()));
        }
    }

    #[test]
    fn slot_instantiation_follows_one_alias() {
        let mut alist = population_query();
        assert!(alist.is_instantiated(&Attr::Subject));
        assert!(!alist.is_instantiated(&Attr::Object));
        alist.instantiate_variable(&var("?x"), "31000000", true);
        assert!(alist.is_instantiated(&Attr::Object));
        assert_eq!(alist.get(&Attr::Object), Some(&Value::from("?x")));
    }

    #[test]
    fn nesting_bound_value_counts_as_instantiated_when_literal() {
        let alist = Alist::new()
            .with(Attr::Subject, "Africa")
            .with(Attr::Object, "?x")
            .with(var("#d"), 34.0);
        assert!(alist.is_instantiated(&Attr::Subject));
        assert!(!alist.is_instantiated(&Attr::Object));
        assert!(alist.is_instantiated(&Attr::Var(var("#d"))));
    }

    #[test]
    fn instantiation_value_follows_chains() {
        let mut alist = population_query().with(var("?x"), "#d");
        assert_eq!(alist.instantiation_value(&Attr::Object), None);
        alist.instantiate_variable(&var("#d"), 99.0, true);
        assert_eq!(alist.instantiation_value(&Attr::Object), Some(&Value::Number(99.0)));
        assert_eq!(alist.get(&Attr::Var(var("?x"))), Some(&Value::Number(99.0)));
    }

    #[test]
    fn cyclic_aliases_resolve_to_none() {
        let alist = Alist::new().with(var("?a"), "?b").with(var("?b"), "?a");
        assert_eq!(alist.instantiation_value(&Attr::Var(var("?a"))), None);
    }

    #[test]
    fn instantiate_without_insert_only_touches_known_variables() {
        let mut alist = population_query();
        alist.instantiate_variable(&var("?unknown"), "1", false);
        assert!(!alist.contains(&Attr::Var(var("?unknown"))));
        alist.instantiate_variable(&var("?x"), "1", false);
        assert_eq!(alist.get(&Attr::Var(var("?x"))), Some(&Value::from("1")));
    }

    #[test]
    fn classification_queries() {
        let alist = population_query()
            .with(var("$y"), serde_json::json!({"$is": "Ghana"}).as_object().cloned().unwrap())
            .with(var("#d"), "12");
        let projections = alist.projection_variables();
        assert!(projections.is_empty());
        let nested = alist.uninstantiated_nesting_variables();
        assert_eq!(nested.len(), 1);
        assert_eq!(nested[0].0, var("$y"));
        assert_eq!(alist.nesting_variables().len(), 2);
        assert_eq!(alist.variable_references(&var("?x")), vec![Attr::Object]);
        assert!(alist.uninstantiated_attributes().contains(&Attr::Object));
    }

    #[test]
    fn empty_opvar_is_not_instantiated() {
        let alist = Alist::new();
        assert!(!alist.opvar_instantiated());
    }

    #[test]
    fn copy_resets_metadata_but_keeps_bindings() {
        let mut alist = population_query().with_id("101");
        alist.cost = 4.0;
        alist.depth = 2;
        alist.state = State::Reducible;
        alist.data_sources.insert("wikidata".into());
        let copy = alist.copy();
        assert_eq!(copy.id, "0");
        assert_eq!(copy.cost, 0.0);
        assert_eq!(copy.depth, 0);
        assert_eq!(copy.state, State::Unexplored);
        assert!(copy.data_sources.contains("wikidata"));
        assert_eq!(copy.get(&Attr::Subject), alist.get(&Attr::Subject));
    }

    #[test]
    fn wire_form_round_trips() {
        let json = serde_json::json!({
            "h": "value", "s": "Ghana", "p": "population", "o": "?x", "t": 2020,
            "v": "?x", "u": 0.1, "cx": [{"device": "phone"}, {}, {}],
            "$y": {"$is": "Ghana"}
        });
        let alist = Alist::from_json(json).unwrap();
        assert_eq!(alist.opvar, vec![var("?x")]);
        assert_eq!(alist.get(&Attr::Time).and_then(Value::as_number), Some(2020.0));
        assert_eq!(alist.context.user.get("device").map(String::as_str), Some("phone"));

        let back = Alist::from_json(alist.to_json()).unwrap();
        assert_eq!(back, alist);
    }

    #[test]
    fn non_object_json_is_rejected() {
        assert!(matches!(
            Alist::from_json(serde_json::json!([1, 2])),
            Err(AlistError::NotAnObject { .. })
        ));
        assert!(Alist::from_json_str("{not json").is_err());
    }
}
