//! Prior uncertainty for knowledge sources and source/property pairs.
//!
//! Each source starts with a deliberately pessimistic coverage figure. As
//! numeric observations arrive, a normal-gamma style update refines the
//! source's precision parameters and the property prior's mean and variance.
//! Stores are shared across sessions and only ever upsert, so concurrent
//! updates at worst lose one refinement.

use dashmap::DashMap;
use serde::{Deserialize, Serialize};

pub const DEFAULT_PARAM_A: f64 = 1.0;
pub const DEFAULT_PARAM_B: f64 = 1.0;
/// High default coverage: an unknown source is assumed unreliable.
pub const DEFAULT_COV: f64 = 0.9;
pub const DEFAULT_PROPERTY_MEAN: f64 = 1e7;
pub const DEFAULT_PROPERTY_VARIANCE: f64 = 1e14;

/// Prior over a source's reliability.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SourcePrior {
    pub source: String,
    pub param_a: f64,
    pub param_b: f64,
    pub cov: f64,
}

impl SourcePrior {
    pub fn new(source: impl Into<String>) -> Self {
        Self {
            source: source.into(),
            param_a: DEFAULT_PARAM_A,
            param_b: DEFAULT_PARAM_B,
            cov: DEFAULT_COV,
        }
    }

    /// Expected precision `a / b`.
    pub fn precision(&self) -> f64 {
        self.param_a / self.param_b
    }

    pub fn variance(&self) -> f64 {
        1.0 / self.precision()
    }

    /// Update with observations against a known mean and variance; the
    /// coverage becomes `sqrt(known_variance) / known_mean`.
    pub fn posterior(&mut self, values: &[f64], known_mean: f64, known_variance: f64) -> (f64, f64) {
        if values.is_empty() {
            return (self.param_a, self.param_b);
        }
        let n = values.len() as f64;
        let mse = values.iter().map(|y| (y - known_mean).powi(2)).sum::<f64>() / n;
        self.param_a += n / 2.0;
        self.param_b += (n / 2.0) * mse;
        let cov = known_variance.sqrt() / known_mean;
        if cov.is_finite() {
            self.cov = cov.abs();
        }
        (self.param_a, self.param_b)
    }
}

/// Prior over the values a property takes in one source.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PropertyPrior {
    pub source: String,
    pub property: String,
    pub mean: f64,
    pub variance: f64,
}

impl PropertyPrior {
    pub fn new(source: impl Into<String>, property: impl Into<String>) -> Self {
        Self {
            source: source.into(),
            property: property.into(),
            mean: DEFAULT_PROPERTY_MEAN,
            variance: DEFAULT_PROPERTY_VARIANCE,
        }
    }

    /// Gaussian update with known observation variance; the posterior mean is
    /// the sample mean.
    pub fn posterior(&mut self, values: &[f64], known_variance: f64) -> (f64, f64) {
        if values.is_empty() {
            return (self.mean, self.variance);
        }
        let n = values.len() as f64;
        let mean = values.iter().sum::<f64>() / n;
        let data_variance = if values.len() >= 2 {
            values.iter().map(|y| (y - mean).powi(2)).sum::<f64>() / (n - 1.0)
        } else {
            0.0
        };
        let variance = 1.0 / ((1.0 / self.variance) + n / (known_variance + data_variance));
        self.mean = mean;
        if variance.is_finite() {
            self.variance = variance;
        }
        (self.mean, self.variance)
    }
}

/// Shared store of source and property priors.
pub trait PriorStore: Send + Sync {
    /// The prior for `source`, defaulted when unknown.
    fn get_prior(&self, source: &str) -> SourcePrior;

    fn get_property_prior(&self, source: &str, property: &str) -> PropertyPrior;

    fn save_prior(&self, prior: SourcePrior);

    fn save_property_prior(&self, prior: PropertyPrior);

    /// Fold numeric observations of `property` from `source` into both
    /// priors. Returns the property posterior `(mean, variance)`.
    fn update_posterior(&self, source: &str, property: &str, values: &[f64]) -> Option<(f64, f64)> {
        if values.is_empty() {
            return None;
        }
        let mut property_prior = self.get_property_prior(source, property);
        let mut source_prior = self.get_prior(source);
        let sample_mean = values.iter().sum::<f64>() / values.len() as f64;
        let assumed_variance = (source_prior.cov * sample_mean).powi(2);

        let (mean, variance) = property_prior.posterior(values, assumed_variance);
        source_prior.posterior(values, mean, variance);
        tracing::debug!(
            source,
            property,
            mean,
            variance,
            cov = source_prior.cov,
            "updated priors"
        );
        self.save_property_prior(property_prior);
        self.save_prior(source_prior);
        Some((mean, variance))
    }
}

/// In-memory prior store.
#[derive(Debug, Default)]
pub struct MemoryPriorStore {
    sources: DashMap<String, SourcePrior>,
    properties: DashMap<(String, String), PropertyPrior>,
}

impl MemoryPriorStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Seed a source prior.
    pub fn with_prior(self, prior: SourcePrior) -> Self {
        self.sources.insert(prior.source.clone(), prior);
        self
    }
}

impl PriorStore for MemoryPriorStore {
    fn get_prior(&self, source: &str) -> SourcePrior {
        self.sources
            .get(source)
            .map(|p| p.value().clone())
            .unwrap_or_else(|| SourcePrior::new(source))
    }

    fn get_property_prior(&self, source: &str, property: &str) -> PropertyPrior {
        self.properties
            .get(&(source.to_string(), property.to_string()))
            .map(|p| p.value().clone())
            .unwrap_or_else(|| PropertyPrior::new(source, property))
    }

    fn save_prior(&self, prior: SourcePrior) {
        self.sources.insert(prior.source.clone(), prior);
    }

    fn save_property_prior(&self, prior: PropertyPrior) {
        self.properties
            .insert((prior.source.clone(), prior.property.clone()), prior);
    }
}
