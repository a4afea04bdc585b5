// thiserror's #[error("...{field}...")] format strings reference struct fields,
// but the compiler doesn't see through the derive macro and reports false positives.
#![allow(unused_assignments)]

//! # frank
//!
//! An inference engine for factoid and numeric queries that no single lookup
//! can answer. A query is a frame (an [`alist::Alist`]); the engine searches
//! knowledge sources for it, and when that fails decomposes it into
//! sub-queries (over time, over places, over nested directives), then
//! aggregates the partial results back up with a propagated uncertainty.
//!
//! ## Architecture
//!
//! - **Frames** (`alist`): slots, typed variables, context, scheduling metadata
//! - **Inference graph** (`graph`): petgraph arena of alists with labelled edges
//! - **Decomposition** (`map`): temporal, geospatial, normalize, comparison rules
//! - **Aggregation** (`reduce`): value/sum/regress/GP/set comprehension/comparisons
//! - **Uncertainty** (`uncertainty`): coverage estimates and source priors
//! - **Engine** (`infer`): search, decompose, aggregate, propagate
//! - **Scheduler** (`scheduler`): frontier loop, watchdog, final answer
//!
//! ## Library usage
//!
//! ```no_run
//! use std::sync::Arc;
//!
//! use frank::alist::Alist;
//! use frank::config::FrankConfig;
//! use frank::infer::Engine;
//! use frank::kb::MemorySource;
//! use frank::kb::memory::Fact;
//! use frank::scheduler::Scheduler;
//!
//! let config = FrankConfig::default();
//! let source = MemorySource::new("worldbank")
//!     .with_fact(Fact::new("Ghana", "population", "31000000", "2020"));
//! let engine = Engine::new(config.engine).with_source(Arc::new(source));
//!
//! let query = Alist::from_json_str(
//!     r#"{"h": "value", "s": "Ghana", "p": "population", "o": "?x", "t": "2020", "v": "?x"}"#,
//! )
//! .unwrap();
//! let answer = Scheduler::new(&engine, config.scheduler).run(query);
//! println!("{} ± {}", answer.answer, answer.error_bar);
//! ```

pub mod alist;
pub mod config;
pub mod error;
pub mod graph;
pub mod infer;
pub mod kb;
pub mod map;
pub mod reduce;
pub mod scheduler;
pub mod uncertainty;
pub mod util;
