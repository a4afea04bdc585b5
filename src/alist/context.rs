//! The three-slot context block carried by every alist.
//!
//! `user` and `env` describe who is asking and where from; `query` holds
//! attribute overrides scoped to one query, optionally keyed per source.

use std::collections::BTreeMap;

use chrono::{Datelike, NaiveDateTime};
use serde::{Deserialize, Serialize};
use serde_json::Value as Json;

use super::{Alist, Attr, Value};

/// Date-time layout of the `env.datetime` entry.
pub const DATETIME_FORMAT: &str = "%Y-%m-%d %H:%M:%S";

/// A query-scoped override: either one value, or one value per source.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum ContextValue {
    Text(String),
    PerSource(BTreeMap<String, String>),
}

impl ContextValue {
    /// The override applicable to `source`, if any.
    pub fn for_source(&self, source: &str) -> Option<&str> {
        match self {
            Self::Text(t) => Some(t),
            Self::PerSource(map) => map.get(source).map(String::as_str),
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Context {
    #[serde(default)]
    pub user: BTreeMap<String, String>,
    #[serde(default)]
    pub env: BTreeMap<String, String>,
    #[serde(default)]
    pub query: BTreeMap<String, ContextValue>,
}

impl Context {
    pub fn is_empty(&self) -> bool {
        self.user.is_empty() && self.env.is_empty() && self.query.is_empty()
    }

    /// Read a context block from its wire form.
    ///
    /// Accepts `{"user": .., "env": .., "query": ..}` or the positional
    /// `[user, env, query]` array. Scalar entries are stringified.
    pub fn from_json(json: &Json) -> Option<Self> {
        let (user, env, query) = match json {
            Json::Null => return Some(Self::default()),
            Json::String(s) if s.is_empty() => return Some(Self::default()),
            Json::Object(map) => (map.get("user"), map.get("env"), map.get("query")),
            Json::Array(items) => (items.first(), items.get(1), items.get(2)),
            _ => return None,
        };
        Some(Self {
            user: string_map(user),
            env: string_map(env),
            query: query
                .and_then(Json::as_object)
                .map(|map| {
                    map.iter()
                        .map(|(k, v)| {
                            let value = match v {
                                Json::Object(per_source) => ContextValue::PerSource(
                                    per_source.iter().map(|(s, x)| (s.clone(), scalar_text(x))).collect(),
                                ),
                                other => ContextValue::Text(scalar_text(other)),
                            };
                            (k.clone(), value)
                        })
                        .collect()
                })
                .unwrap_or_default(),
        })
    }

    /// All three slots merged; query overrides env, env overrides user.
    pub fn merged(&self) -> BTreeMap<String, ContextValue> {
        let mut merged: BTreeMap<String, ContextValue> = self
            .user
            .iter()
            .chain(self.env.iter())
            .map(|(k, v)| (k.clone(), ContextValue::Text(v.clone())))
            .collect();
        merged.extend(self.query.iter().map(|(k, v)| (k.clone(), v.clone())));
        merged
    }

    pub fn accuracy(&self) -> Option<&str> {
        self.user.get("accuracy").map(String::as_str)
    }

    pub fn is_high_accuracy(&self) -> bool {
        self.accuracy().is_some_and(|a| a.eq_ignore_ascii_case("high"))
    }

    /// Whether only high-trust sources may be consulted.
    pub fn requires_high_trust(&self) -> bool {
        self.merged()
            .get("trust")
            .and_then(|v| v.for_source(""))
            .is_some_and(|t| t.eq_ignore_ascii_case("high"))
    }

    /// Year of the `env.datetime` entry, if present and well formed.
    pub fn current_year(&self) -> Option<i32> {
        let datetime = self.env.get("datetime")?;
        NaiveDateTime::parse_from_str(datetime, DATETIME_FORMAT)
            .ok()
            .map(|dt| dt.year())
    }

    pub fn place(&self) -> Option<&str> {
        self.env.get("place").map(String::as_str)
    }
}

fn scalar_text(json: &Json) -> String {
    match json {
        Json::String(s) => s.clone(),
        other => other.to_string(),
    }
}

fn string_map(json: Option<&Json>) -> BTreeMap<String, String> {
    json.and_then(Json::as_object)
        .map(|map| map.iter().map(|(k, v)| (k.clone(), scalar_text(v))).collect())
        .unwrap_or_default()
}

// ---------------------------------------------------------------------------
// Injection and flushing
// ---------------------------------------------------------------------------

/// Derive query-level context before a root is queued.
///
/// A device hint sets `user.accuracy` unless the user already chose one; an
/// empty time slot is filled from `env.datetime` and pinned as a query override.
pub fn inject_query_context(alist: &mut Alist) {
    let device = alist.context.user.get("device").map(|d| d.to_ascii_lowercase());
    if alist.context.accuracy().is_none() {
        let accuracy = match device.as_deref() {
            Some("phone" | "mobile") => Some("low"),
            Some("computer" | "desktop" | "laptop") => Some("high"),
            _ => None,
        };
        if let Some(accuracy) = accuracy {
            alist
                .context
                .user
                .insert("accuracy".to_string(), accuracy.to_string());
        }
    }

    let time_unset = alist.get(&Attr::Time).is_none_or(|t| t.is_empty() && !t.is_var());
    if !time_unset {
        return;
    }
    if let Some(year) = alist.context.current_year() {
        let year = year.to_string();
        alist.set(Attr::Time, year.as_str());
        alist
            .context
            .query
            .insert(Attr::Time.to_string(), ContextValue::Text(year));
    }
}

/// Apply context overrides to the attributes a search against `source` sees.
pub fn inject_retrieval_context(alist: &mut Alist, source: &str) {
    for (key, value) in alist.context.merged() {
        let attr = Attr::parse(&key);
        if !alist.contains(&attr) {
            continue;
        }
        if let Some(text) = value.for_source(source) {
            alist.set(attr, Value::parse(text));
        }
    }
}

/// Drop query overrides for `attrs` that no longer match the alist.
pub fn flush(alist: &mut Alist, attrs: &[Attr]) {
    for attr in attrs {
        let key = attr.to_string();
        let Some(value) = alist.context.query.get(&key) else {
            continue;
        };
        let current = alist.get(attr).map(Value::to_text).unwrap_or_default();
        let diverged = match value {
            ContextValue::Text(t) => *t != current,
            ContextValue::PerSource(map) => !map.values().any(|v| *v == current),
        };
        if diverged {
            alist.context.query.remove(&key);
        }
    }
}
