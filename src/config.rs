//! Engine and scheduler configuration, loaded from TOML.
//!
//! ```toml
//! [engine]
//! max_depth = 20
//! base_decompositions = ["temporal", "geospatial"]
//!
//! [scheduler]
//! timeout_secs = 60
//! ```
//!
//! Every key is optional; unset keys take the defaults below.

use std::path::Path;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::error::ConfigError;
use crate::map::MapRule;

pub type ConfigResult<T> = std::result::Result<T, ConfigError>;

/// Top-level configuration.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct FrankConfig {
    #[serde(default)]
    pub engine: EngineConfig,
    #[serde(default)]
    pub scheduler: SchedulerConfig,
}

impl FrankConfig {
    /// Load from a TOML file.
    pub fn load(path: &Path) -> ConfigResult<Self> {
        let content = std::fs::read_to_string(path).map_err(|e| ConfigError::Io {
            path: path.display().to_string(),
            message: e.to_string(),
        })?;
        Self::from_toml_str(&content)
    }

    pub fn from_toml_str(content: &str) -> ConfigResult<Self> {
        toml::from_str(content).map_err(|e| ConfigError::Parse {
            message: e.to_string(),
        })
    }
}

/// Knobs of the inference engine.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EngineConfig {
    /// Nodes deeper than this are not decomposed further.
    #[serde(default = "default_max_depth")]
    pub max_depth: usize,
    /// Number of years sampled by the temporal rule.
    #[serde(default = "default_temporal_branching_factor")]
    pub temporal_branching_factor: usize,
    /// Rules tried, in shuffled order, when a search comes back empty.
    #[serde(default = "default_base_decompositions")]
    pub base_decompositions: Vec<MapRule>,
    /// Feed retrieved numeric facts into the source priors.
    #[serde(default)]
    pub update_priors: bool,
    /// Per-call timeout for knowledge sources.
    #[serde(default = "default_kb_timeout_ms")]
    pub kb_timeout_ms: u64,
    /// Seed for rule shuffling; entropy when unset.
    #[serde(default)]
    pub seed: Option<u64>,
}

fn default_max_depth() -> usize {
    20
}
fn default_temporal_branching_factor() -> usize {
    10
}
fn default_base_decompositions() -> Vec<MapRule> {
    vec![MapRule::Temporal, MapRule::Geospatial]
}
fn default_kb_timeout_ms() -> u64 {
    30_000
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            max_depth: default_max_depth(),
            temporal_branching_factor: default_temporal_branching_factor(),
            base_decompositions: default_base_decompositions(),
            update_priors: false,
            kb_timeout_ms: default_kb_timeout_ms(),
            seed: None,
        }
    }
}

impl EngineConfig {
    pub fn kb_timeout(&self) -> Duration {
        Duration::from_millis(self.kb_timeout_ms)
    }
}

/// Knobs of the exploration loop.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SchedulerConfig {
    /// Watchdog: seconds without a heartbeat before the session is finalised.
    #[serde(default = "default_timeout_secs")]
    pub timeout_secs: u64,
    /// Sleep between idle passes.
    #[serde(default = "default_retry_backoff_ms")]
    pub retry_backoff_ms: u64,
    /// How much deeper than the last propagation an unexplored pick may be.
    #[serde(default = "default_max_prop_depth_diff")]
    pub max_prop_depth_diff: usize,
    #[serde(default = "default_max_steps")]
    pub max_steps: usize,
    #[serde(default = "default_answer_sigdig")]
    pub answer_sigdig: u32,
    #[serde(default = "default_errorbar_sigdig")]
    pub errorbar_sigdig: u32,
}

fn default_timeout_secs() -> u64 {
    60
}
fn default_retry_backoff_ms() -> u64 {
    50
}
fn default_max_prop_depth_diff() -> usize {
    1
}
fn default_max_steps() -> usize {
    10_000
}
fn default_answer_sigdig() -> u32 {
    4
}
fn default_errorbar_sigdig() -> u32 {
    2
}

impl Default for SchedulerConfig {
    fn default() -> Self {
        Self {
            timeout_secs: default_timeout_secs(),
            retry_backoff_ms: default_retry_backoff_ms(),
            max_prop_depth_diff: default_max_prop_depth_diff(),
            max_steps: default_max_steps(),
            answer_sigdig: default_answer_sigdig(),
            errorbar_sigdig: default_errorbar_sigdig(),
        }
    }
}

impl SchedulerConfig {
    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_secs)
    }

    pub fn retry_backoff(&self) -> Duration {
        Duration::from_millis(self.retry_backoff_ms)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn empty_document_gives_defaults() {
        let config = FrankConfig::from_toml_str("").unwrap();
        assert_eq!(config, FrankConfig::default());
        assert_eq!(config.engine.max_depth, 20);
        assert_eq!(config.scheduler.answer_sigdig, 4);
    }

    #[test]
    fn partial_tables_keep_other_defaults() {
        let config = FrankConfig::from_toml_str(
            "[engine]\nbase_decompositions = [\"temporal\"]\nseed = 7\n\n[scheduler]\ntimeout_secs = 5\n",
        )
        .unwrap();
        assert_eq!(config.engine.base_decompositions, vec![MapRule::Temporal]);
        assert_eq!(config.engine.seed, Some(7));
        assert_eq!(config.engine.kb_timeout_ms, 30_000);
        assert_eq!(config.scheduler.timeout(), Duration::from_secs(5));
        assert_eq!(config.scheduler.max_prop_depth_diff, 1);
    }

    #[test]
    fn unknown_rule_is_rejected() {
        let err = FrankConfig::from_toml_str("[engine]\nbase_decompositions = [\"astrology\"]\n").unwrap_err();
        assert!(matches!(err, ConfigError::Parse { .. }));
        assert!(err.to_string().contains("astrology"));
    }

    #[test]
    fn load_from_file() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(file, "[engine]\nmax_depth = 6").unwrap();
        let config = FrankConfig::load(file.path()).unwrap();
        assert_eq!(config.engine.max_depth, 6);
    }

    #[test]
    fn missing_file_is_an_io_error() {
        let dir = tempfile::tempdir().unwrap();
        let err = FrankConfig::load(&dir.path().join("absent.toml")).unwrap_err();
        assert!(matches!(err, ConfigError::Io { .. }));
    }
}
