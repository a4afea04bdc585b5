//! Attribute keys, attribute values and typed variable references.
//!
//! Variables are classified by a one-character sigil: `?` projection,
//! `$` auxiliary, `#` nesting. The sigil is parsed once at the boundary and
//! carried as a [`VarKind`] afterwards.

use std::fmt;

use serde::{Deserialize, Deserializer, Serialize, Serializer};
use serde_json::{Map, Value as Json};

use crate::util;

/// Classification of a variable reference.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum VarKind {
    /// `?x`: surfaces to the parent as the node's answer.
    Projection,
    /// `$x`: locally scoped intermediate.
    Auxiliary,
    /// `#x`: bound to a nested sub-query or directive.
    Nesting,
}

impl VarKind {
    pub fn sigil(self) -> char {
        match self {
            Self::Projection => '?',
            Self::Auxiliary => '$',
            Self::Nesting => '#',
        }
    }

    pub fn from_sigil(c: char) -> Option<Self> {
        match c {
            '?' => Some(Self::Projection),
            '$' => Some(Self::Auxiliary),
            '#' => Some(Self::Nesting),
            _ => None,
        }
    }
}

/// A reference to a named variable.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct VarRef {
    kind: VarKind,
    name: String,
}

impl VarRef {
    pub fn new(kind: VarKind, name: impl Into<String>) -> Self {
        Self {
            kind,
            name: name.into(),
        }
    }

    pub fn projection(name: impl Into<String>) -> Self {
        Self::new(VarKind::Projection, name)
    }

    pub fn auxiliary(name: impl Into<String>) -> Self {
        Self::new(VarKind::Auxiliary, name)
    }

    pub fn nesting(name: impl Into<String>) -> Self {
        Self::new(VarKind::Nesting, name)
    }

    /// Parse `?x`, `$x` or `#x`. Returns `None` for anything without a sigil.
    pub fn parse(text: &str) -> Option<Self> {
        let mut chars = text.chars();
        let kind = VarKind::from_sigil(chars.next()?)?;
        Some(Self::new(kind, chars.as_str()))
    }

    pub fn kind(&self) -> VarKind {
        self.kind
    }

    /// The name without its sigil.
    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn is_projection(&self) -> bool {
        self.kind == VarKind::Projection
    }
}

impl fmt::Display for VarRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}{}", self.kind.sigil(), self.name)
    }
}

impl Serialize for VarRef {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.collect_str(self)
    }
}

impl<'de> Deserialize<'de> for VarRef {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let text = String::deserialize(deserializer)?;
        Self::parse(&text).ok_or_else(|| {
            serde::de::Error::custom(format!("\"{text}\" is not a variable (expected ?, $ or # prefix)"))
        })
    }
}

// ---------------------------------------------------------------------------
// Attribute keys
// ---------------------------------------------------------------------------

/// Key of a semantic attribute in an [`Alist`](super::Alist).
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum Attr {
    Subject,
    Property,
    Object,
    Time,
    Var(VarRef),
    /// Any other key carried through from the input.
    Extra(String),
}

impl Attr {
    /// The four fixed semantic slots, in wire order.
    pub const SLOTS: [Attr; 4] = [Attr::Subject, Attr::Property, Attr::Object, Attr::Time];

    /// Parse a wire key (`s`, `p`, `o`, `t`, a variable name, or anything else).
    pub fn parse(key: &str) -> Self {
        match key {
            "s" => Self::Subject,
            "p" => Self::Property,
            "o" => Self::Object,
            "t" => Self::Time,
            other => match VarRef::parse(other) {
                Some(var) => Self::Var(var),
                None => Self::Extra(other.to_string()),
            },
        }
    }

    pub fn is_slot(&self) -> bool {
        matches!(self, Self::Subject | Self::Property | Self::Object | Self::Time)
    }

    pub fn as_var(&self) -> Option<&VarRef> {
        match self {
            Self::Var(v) => Some(v),
            _ => None,
        }
    }
}

impl fmt::Display for Attr {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Subject => f.write_str("s"),
            Self::Property => f.write_str("p"),
            Self::Object => f.write_str("o"),
            Self::Time => f.write_str("t"),
            Self::Var(v) => write!(f, "{v}"),
            Self::Extra(k) => f.write_str(k),
        }
    }
}

impl From<VarRef> for Attr {
    fn from(var: VarRef) -> Self {
        Self::Var(var)
    }
}

impl From<&VarRef> for Attr {
    fn from(var: &VarRef) -> Self {
        Self::Var(var.clone())
    }
}

// ---------------------------------------------------------------------------
// Values
// ---------------------------------------------------------------------------

/// The value bound to an attribute.
#[derive(Debug, Clone, PartialEq)]
pub enum Value {
    Text(String),
    Number(f64),
    Var(VarRef),
    /// A nested sub-query or directive object (`{"$is": ...}`, `{"h": ...}`).
    Nested(Map<String, Json>),
}

impl Default for Value {
    fn default() -> Self {
        Self::empty()
    }
}

impl Value {
    pub fn empty() -> Self {
        Self::Text(String::new())
    }

    /// Parse a bare string: sigil-prefixed text becomes a variable reference.
    pub fn parse(text: &str) -> Self {
        match VarRef::parse(text) {
            Some(var) => Self::Var(var),
            None => Self::Text(text.to_string()),
        }
    }

    pub fn from_json(json: &Json) -> Self {
        match json {
            Json::String(s) => Self::parse(s),
            Json::Number(n) => n
                .as_f64()
                .map(Self::Number)
                .unwrap_or_else(|| Self::Text(n.to_string())),
            Json::Object(map) => Self::Nested(map.clone()),
            Json::Null => Self::empty(),
            Json::Bool(b) => Self::Text(b.to_string()),
            Json::Array(_) => Self::Text(json.to_string()),
        }
    }

    pub fn to_json(&self) -> Json {
        match self {
            Self::Text(s) => Json::String(s.clone()),
            Self::Number(n) => serde_json::Number::from_f64(*n)
                .map(Json::Number)
                .unwrap_or(Json::Null),
            Self::Var(v) => Json::String(v.to_string()),
            Self::Nested(map) => Json::Object(map.clone()),
        }
    }

    pub fn is_empty(&self) -> bool {
        match self {
            Self::Text(s) => s.trim().is_empty(),
            Self::Nested(map) => map.is_empty(),
            _ => false,
        }
    }

    pub fn as_var(&self) -> Option<&VarRef> {
        match self {
            Self::Var(v) => Some(v),
            _ => None,
        }
    }

    pub fn as_nested(&self) -> Option<&Map<String, Json>> {
        match self {
            Self::Nested(map) => Some(map),
            _ => None,
        }
    }

    pub fn is_var(&self) -> bool {
        matches!(self, Self::Var(_))
    }

    /// A literal that needs no further resolution: non-empty, not a variable,
    /// not a nested directive.
    pub fn is_concrete(&self) -> bool {
        match self {
            Self::Text(s) => !s.trim().is_empty(),
            Self::Number(n) => n.is_finite(),
            Self::Var(_) | Self::Nested(_) => false,
        }
    }

    pub fn as_number(&self) -> Option<f64> {
        match self {
            Self::Number(n) if n.is_finite() => Some(*n),
            Self::Text(s) => util::parse_number(s),
            _ => None,
        }
    }

    pub fn is_numeric(&self) -> bool {
        self.as_number().is_some()
    }

    /// Textual rendering used for comparison, joining and reporting.
    pub fn to_text(&self) -> String {
        match self {
            Self::Text(s) => s.clone(),
            Self::Number(n) => util::format_number(*n),
            Self::Var(v) => v.to_string(),
            Self::Nested(map) => Json::Object(map.clone()).to_string(),
        }
    }
}

impl fmt::Display for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.to_text())
    }
}

impl From<&str> for Value {
    fn from(text: &str) -> Self {
        Self::parse(text)
    }
}

impl From<String> for Value {
    fn from(text: String) -> Self {
        Self::parse(&text)
    }
}

impl From<&String> for Value {
    fn from(text: &String) -> Self {
        Self::parse(text)
    }
}

impl From<f64> for Value {
    fn from(n: f64) -> Self {
        Self::Number(n)
    }
}

impl From<i64> for Value {
    fn from(n: i64) -> Self {
        Self::Number(n as f64)
    }
}

impl From<VarRef> for Value {
    fn from(var: VarRef) -> Self {
        Self::Var(var)
    }
}

impl From<&VarRef> for Value {
    fn from(var: &VarRef) -> Self {
        Self::Var(var.clone())
    }
}

impl From<Map<String, Json>> for Value {
    fn from(map: Map<String, Json>) -> Self {
        Self::Nested(map)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn sigils_classify_variables() {
        assert_eq!(VarRef::parse("?x").map(|v| v.kind()), Some(VarKind::Projection));
        assert_eq!(VarRef::parse("$y").map(|v| v.kind()), Some(VarKind::Auxiliary));
        assert_eq!(VarRef::parse("#d").map(|v| v.kind()), Some(VarKind::Nesting));
        assert_eq!(VarRef::parse("Ghana"), None);
        assert_eq!(VarRef::parse(""), None);
        assert_eq!(VarRef::projection("x").to_string(), "?x");
    }

    #[test]
    fn attr_keys_round_trip_through_display() {
        for key in ["s", "p", "o", "t", "?x", "$y", "#200", "kb"] {
            assert_eq!(Attr::parse(key).to_string(), key);
        }
        assert!(Attr::parse("t").is_slot());
        assert!(!Attr::parse("?t").is_slot());
    }

    #[test]
    fn json_values_map_to_variants() {
        assert_eq!(Value::from_json(&serde_json::json!("?x")), Value::Var(VarRef::projection("x")));
        assert_eq!(Value::from_json(&serde_json::json!(20)), Value::Number(20.0));
        assert!(matches!(Value::from_json(&serde_json::json!({"$is": "Ghana"})), Value::Nested(_)));
        assert_eq!(Value::from_json(&serde_json::Value::Null), Value::empty());
    }

    #[test]
    fn concreteness() {
        assert!(Value::from("Ghana").is_concrete());
        assert!(Value::from(3.0).is_concrete());
        assert!(!Value::from("").is_concrete());
        assert!(!Value::from("?x").is_concrete());
        assert!(!Value::from_json(&serde_json::json!({"$is": "Ghana"})).is_concrete());
    }

    #[test]
    fn numbers_render_without_spurious_fraction() {
        assert_eq!(Value::Number(120.0).to_text(), "120");
        assert_eq!(Value::from("120").as_number(), Some(120.0));
    }
}
