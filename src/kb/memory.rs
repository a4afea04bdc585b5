//! In-memory knowledge source and gazetteer, loaded from JSON.
//!
//! Facts file: `[{"s": "Ghana", "p": "population", "o": 27000000, "t": 2015}, ...]`.
//! Places file: `{"Africa": ["Ghana", "Togo"], ...}`.

use std::collections::BTreeMap;
use std::path::Path;

use serde::{Deserialize, Deserializer, Serialize};
use serde_json::Value as Json;

use super::{EntityLocation, Gazetteer, KbResult, KnowledgeSource, PropertyRef, Trust};
use crate::alist::{Alist, Attr, Value};
use crate::error::KbError;

/// Property under which entity locations are stored. A qualified subject
/// such as `Paris (Texas)` is one of the entities named `Paris`.
pub const LOCATION_PROPERTY: &str = "__location";

/// One subject–property–object triple, optionally timestamped.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Fact {
    #[serde(deserialize_with = "scalar")]
    pub s: String,
    #[serde(deserialize_with = "scalar")]
    pub p: String,
    #[serde(deserialize_with = "scalar")]
    pub o: String,
    #[serde(default, deserialize_with = "scalar")]
    pub t: String,
}

impl Fact {
    pub fn new(s: &str, p: &str, o: &str, t: &str) -> Self {
        Self {
            s: s.to_string(),
            p: p.to_string(),
            o: o.to_string(),
            t: t.to_string(),
        }
    }

    fn slot(&self, attr: &Attr) -> Option<&str> {
        match attr {
            Attr::Subject => Some(&self.s),
            Attr::Property => Some(&self.p),
            Attr::Object => Some(&self.o),
            Attr::Time => Some(&self.t),
            _ => None,
        }
    }
}

fn scalar<'de, D: Deserializer<'de>>(deserializer: D) -> Result<String, D::Error> {
    Ok(match Json::deserialize(deserializer)? {
        Json::String(s) => s,
        Json::Null => String::new(),
        other => other.to_string(),
    })
}

fn read(path: &Path) -> KbResult<String> {
    std::fs::read_to_string(path).map_err(|e| KbError::Load {
        path: path.display().to_string(),
        message: e.to_string(),
    })
}

fn same(a: &str, b: &str) -> bool {
    a.trim().eq_ignore_ascii_case(b.trim())
}

/// A fact table answering lookups in memory.
#[derive(Debug, Clone)]
pub struct MemorySource {
    name: String,
    trust: Trust,
    facts: Vec<Fact>,
}

impl MemorySource {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            trust: Trust::High,
            facts: Vec::new(),
        }
    }

    pub fn with_trust(mut self, trust: Trust) -> Self {
        self.trust = trust;
        self
    }

    pub fn with_fact(mut self, fact: Fact) -> Self {
        self.facts.push(fact);
        self
    }

    pub fn with_facts(mut self, facts: impl IntoIterator<Item = Fact>) -> Self {
        self.facts.extend(facts);
        self
    }

    pub fn from_json_str(name: impl Into<String>, text: &str) -> KbResult<Self> {
        let facts: Vec<Fact> = serde_json::from_str(text).map_err(|e| KbError::Load {
            path: "<inline>".to_string(),
            message: e.to_string(),
        })?;
        Ok(Self::new(name).with_facts(facts))
    }

    pub fn load(name: impl Into<String>, path: &Path) -> KbResult<Self> {
        let text = read(path)?;
        let facts: Vec<Fact> = serde_json::from_str(&text).map_err(|e| KbError::Load {
            path: path.display().to_string(),
            message: e.to_string(),
        })?;
        Ok(Self::new(name).with_facts(facts))
    }

    pub fn facts(&self) -> &[Fact] {
        &self.facts
    }

    fn matches(&self, fact: &Fact, alist: &Alist, unknown: &Attr) -> bool {
        Attr::SLOTS.iter().filter(|attr| *attr != unknown).all(|attr| {
            if !alist.is_instantiated(attr) {
                return true;
            }
            let wanted = alist
                .instantiation_value(attr)
                .map(Value::to_text)
                .unwrap_or_default();
            fact.slot(attr).is_some_and(|have| same(have, &wanted))
        })
    }
}

impl KnowledgeSource for MemorySource {
    fn name(&self) -> &str {
        &self.name
    }

    fn trust(&self) -> Trust {
        self.trust
    }

    fn search_properties(&self, text: &str) -> KbResult<Vec<PropertyRef>> {
        let needle = text.trim().to_lowercase();
        if needle.is_empty() {
            return Ok(Vec::new());
        }
        let mut refs: Vec<PropertyRef> = Vec::new();
        for fact in &self.facts {
            if refs.iter().any(|r| r.id == fact.p) {
                continue;
            }
            let label = fact.p.to_lowercase();
            let score = if label == needle {
                1.0
            } else if label.contains(&needle) || needle.contains(&label) {
                0.5
            } else {
                continue;
            };
            refs.push(PropertyRef {
                id: fact.p.clone(),
                label: fact.p.clone(),
                score,
            });
        }
        refs.sort_by(|a, b| b.score.total_cmp(&a.score));
        Ok(refs)
    }

    fn find_property_values(&self, alist: &Alist, slot: &Attr) -> KbResult<Vec<Alist>> {
        let found = self
            .facts
            .iter()
            .filter(|fact| self.matches(fact, alist, slot))
            .map(|fact| {
                let mut result = Alist::new()
                    .with(Attr::Subject, Value::Text(fact.s.clone()))
                    .with(Attr::Property, Value::Text(fact.p.clone()))
                    .with(Attr::Object, Value::Text(fact.o.clone()))
                    .with(Attr::Time, Value::Text(fact.t.clone()));
                result.data_sources.insert(self.name.clone());
                result
            })
            .collect();
        Ok(found)
    }

    fn find_locations_of_entity(&self, entity: &str) -> KbResult<Vec<EntityLocation>> {
        let entity = entity.trim();
        let qualified = format!("{} (", entity.to_lowercase());
        Ok(self
            .facts
            .iter()
            .filter(|f| f.p == LOCATION_PROPERTY)
            .filter(|f| same(&f.s, entity) || f.s.to_lowercase().starts_with(&qualified))
            .map(|f| EntityLocation {
                entity: f.s.clone(),
                location: f.o.clone(),
            })
            .collect())
    }
}

/// Place containment held in memory.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(transparent)]
pub struct MemoryGazetteer {
    places: BTreeMap<String, Vec<String>>,
}

impl MemoryGazetteer {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_place(mut self, place: &str, subs: &[&str]) -> Self {
        self.places
            .insert(place.to_string(), subs.iter().map(|s| s.to_string()).collect());
        self
    }

    pub fn from_json_str(text: &str) -> KbResult<Self> {
        serde_json::from_str(text).map_err(|e| KbError::Load {
            path: "<inline>".to_string(),
            message: e.to_string(),
        })
    }

    pub fn load(path: &Path) -> KbResult<Self> {
        let text = read(path)?;
        serde_json::from_str(&text).map_err(|e| KbError::Load {
            path: path.display().to_string(),
            message: e.to_string(),
        })
    }
}

impl Gazetteer for MemoryGazetteer {
    fn find_sub_locations(&self, place: &str) -> KbResult<Vec<String>> {
        let subs = self.places.get(place).or_else(|| {
            self.places
                .iter()
                .find(|(k, _)| same(k, place))
                .map(|(_, v)| v)
        });
        Ok(subs.cloned().unwrap_or_default())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    fn source() -> MemorySource {
        MemorySource::from_json_str(
            "worldbank",
            r#"[
                {"s": "Ghana", "p": "population", "o": 24000000, "t": 2010},
                {"s": "Ghana", "p": "population", "o": 24600000, "t": 2011},
                {"s": "Togo", "p": "population", "o": 6400000, "t": 2010},
                {"s": "Ghana", "p": "capital", "o": "Accra"},
                {"s": "Accra", "p": "__location", "o": "Ghana"},
                {"s": "Paris", "p": "__location", "o": "France"},
                {"s": "Paris (Texas)", "p": "__location", "o": "United States"}
            ]"#,
        )
        .unwrap()
    }

    fn query(time: &str) -> Alist {
        Alist::new()
            .with(Attr::Subject, "Ghana")
            .with(Attr::Property, "population")
            .with(Attr::Object, "?x")
            .with(Attr::Time, time)
            .with_opvar("?x")
    }

    #[test]
    fn numeric_json_fields_are_text() {
        assert_eq!(source().facts()[0].o, "24000000");
        assert_eq!(source().facts()[3].t, "");
    }

    #[test]
    fn property_search_scores() {
        let refs = source().search_properties("Population").unwrap();
        assert_eq!(refs[0].id, "population");
        assert_eq!(refs[0].score, 1.0);
        let partial = source().search_properties("capital city").unwrap();
        assert_eq!(partial.len(), 1);
        assert_eq!(partial[0].score, 0.5);
        assert!(source().search_properties("gdp").unwrap().is_empty());
    }

    #[test]
    fn lookup_respects_time() {
        let facts = source().find_property_values(&query("2011"), &Attr::Object).unwrap();
        assert_eq!(facts.len(), 1);
        assert_eq!(facts[0].text(&Attr::Object), "24600000");
        assert!(facts[0].data_sources.contains("worldbank"));

        let any_time = source().find_property_values(&query(""), &Attr::Object).unwrap();
        assert_eq!(any_time.len(), 2);
    }

    #[test]
    fn subject_lookup() {
        let q = Alist::new()
            .with(Attr::Subject, "?s")
            .with(Attr::Property, "capital")
            .with(Attr::Object, "Accra")
            .with_opvar("?s");
        let facts = source().find_property_values(&q, &Attr::Subject).unwrap();
        assert_eq!(facts.len(), 1);
        assert_eq!(facts[0].text(&Attr::Subject), "Ghana");
    }

    #[test]
    fn entity_locations() {
        let accra = source().find_locations_of_entity("accra").unwrap();
        assert_eq!(accra.len(), 1);
        assert_eq!(accra[0].location, "Ghana");
        assert!(source().find_locations_of_entity("Lome").unwrap().is_empty());

        let paris: Vec<String> = source()
            .find_locations_of_entity("Paris")
            .unwrap()
            .into_iter()
            .map(|l| l.entity)
            .collect();
        assert_eq!(paris, vec!["Paris", "Paris (Texas)"]);
    }

    #[test]
    fn gazetteer_lookup_and_load() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        write!(file, r#"{{"West Africa": ["Ghana", "Togo", "Benin"]}}"#).unwrap();
        let gazetteer = MemoryGazetteer::load(file.path()).unwrap();
        assert_eq!(
            gazetteer.find_sub_locations("west africa").unwrap(),
            vec!["Ghana", "Togo", "Benin"]
        );
        assert!(gazetteer.find_sub_locations("Europe").unwrap().is_empty());
    }

    #[test]
    fn malformed_facts_fail_to_load() {
        let err = MemorySource::from_json_str("x", "{\"s\": 1}").unwrap_err();
        assert!(matches!(err, KbError::Load { .. }));
    }
}
