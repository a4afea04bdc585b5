//! Knowledge-source and gazetteer collaborators.
//!
//! The engine talks to external knowledge through two traits:
//! [`KnowledgeSource`] (property search and fact retrieval) and
//! [`Gazetteer`] (sub-location lookup). Connectors are plugged in as
//! `Arc<dyn KnowledgeSource>` so one engine serves many concurrent sessions.
//! [`memory`] provides in-process implementations backed by JSON data.

pub mod memory;

use std::sync::Arc;
use std::sync::mpsc;
use std::time::Duration;

use dashmap::DashMap;
use serde::{Deserialize, Serialize};

use crate::alist::{Alist, Attr};
use crate::error::KbError;

pub use memory::{MemoryGazetteer, MemorySource};

/// Result type for knowledge-base calls.
pub type KbResult<T> = std::result::Result<T, KbError>;

/// How far a source's facts are trusted.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Trust {
    Low,
    #[default]
    High,
}

/// A property candidate returned by [`KnowledgeSource::search_properties`].
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PropertyRef {
    /// Source-specific property identifier.
    pub id: String,
    pub label: String,
    pub score: f64,
}

/// One place a source knows an entity under.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EntityLocation {
    /// The source's own identifier for the entity.
    pub entity: String,
    pub location: String,
}

/// A named source of facts.
pub trait KnowledgeSource: Send + Sync {
    fn name(&self) -> &str;

    fn trust(&self) -> Trust {
        Trust::High
    }

    /// Candidate properties for free text, best first.
    fn search_properties(&self, text: &str) -> KbResult<Vec<PropertyRef>>;

    /// Facts matching `alist`, with `slot` (the unknown) filled in.
    ///
    /// The alist's property slot already holds a property id of this source.
    /// Returned facts carry this source in their `data_sources`.
    fn find_property_values(&self, alist: &Alist, slot: &Attr) -> KbResult<Vec<Alist>>;

    /// Entities matching a name, with where each is located; used to
    /// disambiguate subjects against the user's place.
    fn find_locations_of_entity(&self, _entity: &str) -> KbResult<Vec<EntityLocation>> {
        Ok(Vec::new())
    }
}

/// Geographic containment lookups.
pub trait Gazetteer: Send + Sync {
    /// Constituent places of `place`, in a stable order.
    fn find_sub_locations(&self, place: &str) -> KbResult<Vec<String>>;
}

// ---------------------------------------------------------------------------
// Shared property-reference cache
// ---------------------------------------------------------------------------

/// Property references memoised across sessions.
///
/// Entries are only ever inserted. Two sessions racing on the same key both
/// call the source and one insert wins; both results are equivalent.
#[derive(Debug, Default)]
pub struct SessionCache {
    /// (source, property text) → best-scoring property ids.
    property_refs: DashMap<(String, String), Vec<PropertyRef>>,
    /// (source, property id) → the text the user asked for.
    reverse_refs: DashMap<(String, String), String>,
}

impl SessionCache {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn property_refs(&self, source: &str, text: &str) -> Option<Vec<PropertyRef>> {
        self.property_refs
            .get(&(source.to_string(), text.to_string()))
            .map(|r| r.value().clone())
    }

    /// Record the references found for `text`, keeping only the top-scoring
    /// ties. Returns what was stored.
    pub fn store_property_refs(&self, source: &str, text: &str, mut refs: Vec<PropertyRef>) -> Vec<PropertyRef> {
        refs.sort_by(|a, b| b.score.total_cmp(&a.score));
        if let Some(best) = refs.first().map(|r| r.score) {
            refs.retain(|r| r.score == best);
        }
        for r in &refs {
            self.reverse_refs
                .insert((source.to_string(), r.id.clone()), text.to_string());
        }
        self.property_refs
            .insert((source.to_string(), text.to_string()), refs.clone());
        refs
    }

    /// The user's text for a source property id.
    pub fn original_property(&self, source: &str, id: &str) -> Option<String> {
        self.reverse_refs
            .get(&(source.to_string(), id.to_string()))
            .map(|r| r.value().clone())
    }

    pub fn len(&self) -> usize {
        self.property_refs.len()
    }

    pub fn is_empty(&self) -> bool {
        self.property_refs.is_empty()
    }
}

// ---------------------------------------------------------------------------
// Timeouts
// ---------------------------------------------------------------------------

/// Run a blocking source call on its own thread, giving up after `timeout`.
///
/// A call that times out keeps running in the background; its result is
/// discarded.
pub fn call_with_timeout<T, F>(source_name: &str, timeout: Duration, call: F) -> KbResult<T>
where
    T: Send + 'static,
    F: FnOnce() -> KbResult<T> + Send + 'static,
{
    let (tx, rx) = mpsc::channel();
    std::thread::spawn(move || {
        let _ = tx.send(call());
    });
    match rx.recv_timeout(timeout) {
        Ok(result) => result,
        Err(mpsc::RecvTimeoutError::Timeout) => Err(KbError::Timeout {
            source_name: source_name.to_string(),
            millis: timeout.as_millis() as u64,
        }),
        Err(mpsc::RecvTimeoutError::Disconnected) => Err(KbError::SourceFailed {
            source_name: source_name.to_string(),
            message: "source call panicked".to_string(),
        }),
    }
}

/// Sources allowed under a context that may demand high trust.
pub fn trusted_sources(sources: &[Arc<dyn KnowledgeSource>], high_trust_only: bool) -> Vec<Arc<dyn KnowledgeSource>> {
    sources
        .iter()
        .filter(|s| !high_trust_only || s.trust() == Trust::High)
        .cloned()
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn prop(id: &str, score: f64) -> PropertyRef {
        PropertyRef {
            id: id.into(),
            label: id.into(),
            score,
        }
    }

    #[test]
    fn cache_keeps_top_ties_and_reverse_map() {
        let cache = SessionCache::new();
        let stored = cache.store_property_refs(
            "wiki",
            "population",
            vec![prop("P1", 0.5), prop("P2", 1.0), prop("P3", 1.0)],
        );
        assert_eq!(stored.iter().map(|r| r.id.as_str()).collect::<Vec<_>>(), vec!["P2", "P3"]);
        assert_eq!(cache.property_refs("wiki", "population"), Some(stored));
        assert_eq!(cache.original_property("wiki", "P3").as_deref(), Some("population"));
        assert_eq!(cache.original_property("wiki", "P1"), None);
        assert!(cache.property_refs("other", "population").is_none());
    }

    #[test]
    fn timeout_is_reported() {
        let result: KbResult<()> = call_with_timeout("slow", Duration::from_millis(10), || {
            std::thread::sleep(Duration::from_millis(500));
            Ok(())
        });
        assert!(matches!(result, Err(KbError::Timeout { millis: 10, .. })));
    }

    #[test]
    fn fast_call_passes_through() {
        let result = call_with_timeout("fast", Duration::from_secs(5), || Ok(42));
        assert_eq!(result.unwrap(), 42);
    }

    #[test]
    fn trust_filter() {
        let high: Arc<dyn KnowledgeSource> = Arc::new(MemorySource::new("a"));
        let low: Arc<dyn KnowledgeSource> = Arc::new(MemorySource::new("b").with_trust(Trust::Low));
        let sources = vec![high, low];
        assert_eq!(trusted_sources(&sources, false).len(), 2);
        let only = trusted_sources(&sources, true);
        assert_eq!(only.len(), 1);
        assert_eq!(only[0].name(), "a");
    }
}
