//! Knowledge-base search and subject disambiguation.

use std::collections::BTreeMap;
use std::sync::Arc;

use super::Session;
use super::engine::Engine;
use crate::alist::context::inject_retrieval_context;
use crate::alist::{Alist, Attr, ContextValue, NodeType, State, Value};
use crate::kb::{KnowledgeSource, call_with_timeout, trusted_sources};

/// Properties with this prefix are source-internal and skip property search.
const INTERNAL_PROPERTY: &str = "__";

const LOOKUP_LABEL: &str = "Lookup";

impl Engine {
    /// Search every permitted source for facts instantiating `alist`.
    ///
    /// Each fact is linked under `alist` as a reducible `FACT` child.
    /// Source failures are logged and count as no facts. Returns whether
    /// anything was found.
    pub fn search_kb(&self, session: &mut Session, alist: &Alist) -> bool {
        session.heartbeat();
        if !alist.is_instantiated(&Attr::Property) || !alist.uninstantiated_nesting_variables().is_empty() {
            return false;
        }
        let property = alist
            .instantiation_value(&Attr::Property)
            .map(Value::to_text)
            .unwrap_or_default();
        let slot = if alist.is_instantiated(&Attr::Subject) {
            Attr::Object
        } else {
            Attr::Subject
        };
        tracing::debug!(node = %alist.id, %property, %slot, "search");

        let mut found = 0;
        for source in trusted_sources(&self.sources, alist.context.requires_high_trust()) {
            let name = source.name().to_string();
            let Some(property_id) = self.property_id(&source, &property) else {
                continue;
            };
            let mut search = alist.clone();
            inject_retrieval_context(&mut search, &name);
            search.set(Attr::Property, property_id.as_str());

            let facts = {
                let source = Arc::clone(&source);
                let (search, slot) = (search.clone(), slot.clone());
                call_with_timeout(&name, self.config.kb_timeout(), move || {
                    source.find_property_values(&search, &slot)
                })
            };
            let facts = match facts {
                Ok(facts) => facts,
                Err(e) => {
                    tracing::warn!(node = %alist.id, source = %name, error = %e, "source search failed");
                    continue;
                }
            };

            let original = self
                .cache
                .original_property(&name, &property_id)
                .unwrap_or_else(|| property.clone());
            let mut observed = Vec::new();
            for fact in &facts {
                session.heartbeat();
                let mut child = self.fact_child(&search, fact, &slot, &name);
                child.set(Attr::Property, original.as_str());
                if let Some(n) = fact.instantiation_value(&slot).and_then(Value::as_number) {
                    observed.push(n);
                }
                let id = session.graph.link(alist, &mut child, LOOKUP_LABEL, true);
                tracing::debug!(node = %alist.id, fact = %id, source = %name, value = %child.opvar_text(), "found");
            }
            found += facts.len();

            if self.config.update_priors && !observed.is_empty() {
                self.priors.update_posterior(&name, &original, &observed);
            }
        }
        found > 0
    }

    /// The source's id for the user's property text, searched once and
    /// memoised in the shared cache.
    fn property_id(&self, source: &Arc<dyn KnowledgeSource>, property: &str) -> Option<String> {
        if property.starts_with(INTERNAL_PROPERTY) {
            return Some(property.to_string());
        }
        let name = source.name().to_string();
        let refs = match self.cache.property_refs(&name, property) {
            Some(refs) => refs,
            None => {
                let searched = {
                    let source = Arc::clone(source);
                    let text = property.to_string();
                    call_with_timeout(&name, self.config.kb_timeout(), move || source.search_properties(&text))
                };
                match searched {
                    Ok(refs) => self.cache.store_property_refs(&name, property, refs),
                    Err(e) => {
                        tracing::warn!(source = %name, %property, error = %e, "property search failed");
                        return None;
                    }
                }
            }
        };
        refs.into_iter().next().map(|r| r.id)
    }

    /// A `FACT` child: the searched node with its unknown slots filled from
    /// `fact` and its operation variable bound.
    fn fact_child(&self, search: &Alist, fact: &Alist, slot: &Attr, source: &str) -> Alist {
        let mut child = search.copy();
        for attr in &Attr::SLOTS {
            if *attr == Attr::Property || child.is_instantiated(attr) {
                continue;
            }
            let Some(value) = fact.instantiation_value(attr).filter(|v| v.is_concrete()).cloned() else {
                continue;
            };
            match child.get(attr).and_then(Value::as_var).cloned() {
                Some(var) => child.instantiate_variable(&var, value, true),
                None => child.set(attr.clone(), value),
            }
        }
        if !child.opvar_instantiated() {
            if let (Some(var), Some(value)) = (child.first_opvar().cloned(), fact.instantiation_value(slot).cloned()) {
                child.instantiate_variable(&var, value, true);
            }
        }

        child.data_sources.extend(fact.data_sources.iter().cloned());
        let prior_source = fact.data_sources.iter().next().map_or(source, String::as_str);
        child.cov = self.priors.get_prior(prior_source).cov;
        child.explain.clear();
        child.state = State::Reducible;
        child.node_type = NodeType::Fact;
        child
    }

    /// Pin the subject to the entity located at the user's place, per source.
    pub(super) fn disambiguate(&self, root: &mut Alist) {
        let Some(place) = root.context.place().map(str::to_string) else {
            return;
        };
        if !root.is_instantiated(&Attr::Subject) {
            return;
        }
        let subject = root
            .instantiation_value(&Attr::Subject)
            .map(Value::to_text)
            .unwrap_or_default();

        let mut overrides = BTreeMap::new();
        for source in &self.sources {
            let name = source.name().to_string();
            let located = {
                let source = Arc::clone(source);
                let entity = subject.clone();
                call_with_timeout(&name, self.config.kb_timeout(), move || {
                    source.find_locations_of_entity(&entity)
                })
            };
            match located {
                Ok(locations) => {
                    if let Some(hit) = locations.iter().find(|l| l.location.eq_ignore_ascii_case(&place)) {
                        overrides.insert(name, hit.entity.clone());
                    }
                }
                Err(e) => tracing::warn!(source = %name, entity = %subject, error = %e, "entity location lookup failed"),
            }
        }
        if !overrides.is_empty() {
            tracing::debug!(entity = %subject, %place, ?overrides, "disambiguated subject");
            root.context
                .query
                .insert(Attr::Subject.to_string(), ContextValue::PerSource(overrides));
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::EngineConfig;
    use crate::error::KbError;
    use crate::graph::ROOT_ID;
    use crate::kb::memory::Fact;
    use crate::kb::{KbResult, MemorySource, PropertyRef, Trust};
    use crate::uncertainty::prior::{MemoryPriorStore, PriorStore, SourcePrior};

    struct Failing;

    impl KnowledgeSource for Failing {
        fn name(&self) -> &str {
            "failing"
        }

        fn search_properties(&self, _text: &str) -> KbResult<Vec<PropertyRef>> {
            Ok(vec![PropertyRef {
                id: "P1082".into(),
                label: "population".into(),
                score: 1.0,
            }])
        }

        fn find_property_values(&self, _alist: &Alist, _slot: &Attr) -> KbResult<Vec<Alist>> {
            Err(KbError::SourceFailed {
                source_name: "failing".into(),
                message: "503".into(),
            })
        }
    }

    fn worldbank() -> MemorySource {
        MemorySource::new("worldbank").with_facts([
            Fact::new("Ghana", "population", "24000000", "2010"),
            Fact::new("Ghana", "population", "24600000", "2011"),
            Fact::new("Ghana", "capital", "Accra", ""),
        ])
    }

    fn query(time: &str) -> Alist {
        Alist::new()
            .with(Attr::Subject, "Ghana")
            .with(Attr::Property, "Population")
            .with(Attr::Object, "?x")
            .with(Attr::Time, time)
            .with_opvar("?x")
    }

    fn search(engine: &Engine, alist: Alist) -> (Session, bool) {
        let mut session = engine.start_session(alist);
        let root = session.root().cloned().unwrap();
        let found = engine.search_kb(&mut session, &root);
        (session, found)
    }

    #[test]
    fn facts_become_reducible_children() {
        let priors = MemoryPriorStore::new().with_prior(SourcePrior {
            cov: 0.05,
            ..SourcePrior::new("worldbank")
        });
        let engine = Engine::new(EngineConfig::default())
            .with_source(Arc::new(worldbank()))
            .with_priors(Arc::new(priors));
        let (session, found) = search(&engine, query("2011"));
        assert!(found);

        let facts = session.graph.child_alists(ROOT_ID);
        assert_eq!(facts.len(), 1);
        let fact = &facts[0];
        assert_eq!(fact.state, State::Reducible);
        assert_eq!(fact.node_type, NodeType::Fact);
        assert_eq!(fact.cov, 0.05);
        assert_eq!(fact.opvar_value().unwrap().to_text(), "24600000");
        // the user's wording of the property is kept
        assert_eq!(fact.text(&Attr::Property), "Population");
        assert!(fact.data_sources.contains("worldbank"));
        assert_eq!(engine.cache().property_refs("worldbank", "Population").unwrap()[0].id, "population");
    }

    #[test]
    fn open_time_returns_every_year() {
        let engine = Engine::new(EngineConfig::default()).with_source(Arc::new(worldbank()));
        let (session, _) = search(&engine, query(""));
        let times: Vec<String> = session
            .graph
            .child_alists(ROOT_ID)
            .iter()
            .map(|f| f.text(&Attr::Time))
            .collect();
        assert_eq!(times, vec!["2010", "2011"]);
    }

    #[test]
    fn unknown_subject_is_searched() {
        let engine = Engine::new(EngineConfig::default()).with_source(Arc::new(worldbank()));
        let q = Alist::new()
            .with(Attr::Subject, "$c")
            .with(Attr::Property, "capital")
            .with(Attr::Object, "Accra")
            .with_opvar("$c");
        let (session, found) = search(&engine, q);
        assert!(found);
        let fact = &session.graph.child_alists(ROOT_ID)[0];
        assert_eq!(fact.opvar_value().unwrap().to_text(), "Ghana");
        assert_eq!(fact.instantiation_value(&Attr::Subject), Some(&Value::from("Ghana")));
    }

    #[test]
    fn failing_source_is_skipped() {
        let engine = Engine::new(EngineConfig::default())
            .with_source(Arc::new(Failing))
            .with_source(Arc::new(worldbank()));
        let (session, found) = search(&engine, query("2010"));
        assert!(found);
        assert_eq!(session.graph.child_ids(ROOT_ID).len(), 1);
    }

    #[test]
    fn high_trust_context_skips_low_trust_sources() {
        let engine = Engine::new(EngineConfig::default())
            .with_source(Arc::new(worldbank().with_trust(Trust::Low)));
        let mut q = query("2010");
        q.context.user.insert("trust".into(), "high".into());
        let (_, found) = search(&engine, q);
        assert!(!found);
    }

    #[test]
    fn nothing_to_search_without_a_property() {
        let engine = Engine::new(EngineConfig::default()).with_source(Arc::new(worldbank()));
        let (_, found) = search(&engine, query("2010").with(Attr::Property, "?p"));
        assert!(!found);
    }

    #[test]
    fn observations_update_priors() {
        let priors = Arc::new(MemoryPriorStore::new());
        let engine = Engine::new(EngineConfig {
            update_priors: true,
            ..EngineConfig::default()
        })
        .with_source(Arc::new(worldbank()))
        .with_priors(priors.clone());
        search(&engine, query(""));
        assert!(priors.get_prior("worldbank").param_a > 1.0);
    }

    #[test]
    fn place_context_pins_the_subject() {
        let source = MemorySource::new("geo").with_facts([
            Fact::new("Paris", "__location", "France", ""),
            Fact::new("Paris (Texas)", "__location", "United States", ""),
        ]);
        let engine = Engine::new(EngineConfig::default()).with_source(Arc::new(source));
        let mut q = query("2010").with(Attr::Subject, "Paris");
        q.context.env.insert("place".into(), "United States".into());
        let session = engine.start_session(q);
        let root = session.root().unwrap();
        assert_eq!(
            root.context.query.get("s"),
            Some(&ContextValue::PerSource(BTreeMap::from([(
                "geo".to_string(),
                "Paris (Texas)".to_string()
            )])))
        );
    }
}
