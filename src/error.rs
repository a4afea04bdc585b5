//! Rich diagnostic error types for the frank inference engine.
//!
//! Each subsystem defines its own error type with miette `#[diagnostic]` derives,
//! providing error codes and help text so a malformed query or a misbehaving
//! collaborator is reported with enough context to fix it.

use miette::Diagnostic;
use thiserror::Error;

/// Top-level error type for the frank engine.
///
/// Each variant wraps a subsystem-specific error, preserving the full diagnostic
/// chain (error codes, help text) through to the user.
#[derive(Debug, Error, Diagnostic)]
pub enum FrankError {
    #[error(transparent)]
    #[diagnostic(transparent)]
    Alist(#[from] AlistError),

    #[error(transparent)]
    #[diagnostic(transparent)]
    Graph(#[from] GraphError),

    #[error(transparent)]
    #[diagnostic(transparent)]
    Reduce(#[from] ReduceError),

    #[error(transparent)]
    #[diagnostic(transparent)]
    Map(#[from] MapError),

    #[error(transparent)]
    #[diagnostic(transparent)]
    Kb(#[from] KbError),

    #[error(transparent)]
    #[diagnostic(transparent)]
    Config(#[from] ConfigError),
}

impl FrankError {
    /// The node that caused this error, when the error is tied to one.
    pub fn node_id(&self) -> Option<&str> {
        match self {
            Self::Reduce(ReduceError::UnknownOperation { node, .. })
            | Self::Reduce(ReduceError::Unregistered { node, .. }) => Some(node),
            Self::Graph(GraphError::NodeNotFound { id }) => Some(id),
            _ => None,
        }
    }
}

// ---------------------------------------------------------------------------
// Alist errors
// ---------------------------------------------------------------------------

#[derive(Debug, Error, Diagnostic)]
pub enum AlistError {
    #[error("alist must be a JSON object, got: {found}")]
    #[diagnostic(
        code(frank::alist::not_an_object),
        help(
            "An alist is written as a flat JSON object, e.g. \
             {{\"h\": \"value\", \"s\": \"Ghana\", \"p\": \"population\", \"o\": \"?x\", \"v\": \"?x\"}}."
        )
    )]
    NotAnObject { found: String },

    #[error("invalid value for alist attribute \"{key}\": {message}")]
    #[diagnostic(
        code(frank::alist::invalid_attribute),
        help("Check the type of the attribute: `u` is a number, `cx` and `meta` are objects, the rest are strings.")
    )]
    InvalidAttribute { key: String, message: String },

    #[error("invalid alist JSON: {message}")]
    #[diagnostic(
        code(frank::alist::parse),
        help("The query must be valid JSON. Check quoting and trailing commas.")
    )]
    Parse { message: String },
}

// ---------------------------------------------------------------------------
// Graph errors
// ---------------------------------------------------------------------------

#[derive(Debug, Error, Diagnostic)]
pub enum GraphError {
    #[error("node not found in inference graph: {id}")]
    #[diagnostic(
        code(frank::graph::node_not_found),
        help("The node may have been pruned by a set-comprehension step. Re-read the frontier before acting on an id.")
    )]
    NodeNotFound { id: String },
}

// ---------------------------------------------------------------------------
// Reduce errors
// ---------------------------------------------------------------------------

#[derive(Debug, Error, Diagnostic)]
pub enum ReduceError {
    #[error("unknown operation \"{op}\" on node {node}")]
    #[diagnostic(
        code(frank::reduce::unknown_operation),
        help(
            "Supported operations: value, values, sum, product, mean, mode, min, max, count, \
             regress, gpregress, comp, eq, gt, gte, lt, lte. The subtree under this node is rejected."
        )
    )]
    UnknownOperation { node: String, op: String },

    #[error("no reducer registered for operation \"{op}\" on node {node}")]
    #[diagnostic(
        code(frank::reduce::unregistered),
        help("The operation is known but the reduce registry in use has no implementation. Start from `ReduceRegistry::builtin()`.")
    )]
    Unregistered { node: String, op: String },
}

// ---------------------------------------------------------------------------
// Map errors
// ---------------------------------------------------------------------------

#[derive(Debug, Error, Diagnostic)]
pub enum MapError {
    #[error("unknown decomposition rule: \"{name}\"")]
    #[diagnostic(
        code(frank::map::unknown_rule),
        help("Valid decomposition rules are: temporal, geospatial, normalize, comparison.")
    )]
    UnknownRule { name: String },
}

// ---------------------------------------------------------------------------
// Knowledge-base errors
// ---------------------------------------------------------------------------

#[derive(Debug, Error, Diagnostic)]
pub enum KbError {
    #[error("knowledge source \"{source_name}\" failed: {message}")]
    #[diagnostic(
        code(frank::kb::source_failed),
        help("The source is skipped for this lookup; other sources are still consulted.")
    )]
    SourceFailed { source_name: String, message: String },

    #[error("knowledge source \"{source_name}\" timed out after {millis} ms")]
    #[diagnostic(
        code(frank::kb::timeout),
        help("Raise `engine.kb_timeout_ms` in the configuration, or check the source's connectivity.")
    )]
    Timeout { source_name: String, millis: u64 },

    #[error("gazetteer lookup for \"{place}\" failed: {message}")]
    #[diagnostic(
        code(frank::kb::gazetteer),
        help("Geospatial decomposition declines for this node; other rules are still tried.")
    )]
    Gazetteer { place: String, message: String },

    #[error("failed to load knowledge data from {path}: {message}")]
    #[diagnostic(
        code(frank::kb::load),
        help("Facts are a JSON array of {{\"s\", \"p\", \"o\", \"t\"}} objects; places are a JSON object of place to sub-location list.")
    )]
    Load { path: String, message: String },
}

// ---------------------------------------------------------------------------
// Config errors
// ---------------------------------------------------------------------------

#[derive(Debug, Error, Diagnostic)]
pub enum ConfigError {
    #[error("failed to read config file {path}: {message}")]
    #[diagnostic(
        code(frank::config::io),
        help("Check that the path exists and is readable.")
    )]
    Io { path: String, message: String },

    #[error("invalid configuration: {message}")]
    #[diagnostic(
        code(frank::config::parse),
        help("The configuration is TOML with `[engine]` and `[scheduler]` tables. Unset keys take their defaults.")
    )]
    Parse { message: String },
}

/// Convenience result type for the frank engine.
pub type FrankResult<T> = std::result::Result<T, FrankError>;
