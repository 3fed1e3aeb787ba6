//! Error types for the resource registry.
//!
//! Configuration and data errors are typed so callers can match on them.
//! Hook and factory failures arrive as `anyhow::Error` and are kept as the
//! error source.

use thiserror::Error;

/// Errors returned by [`ResourceRegistry`](crate::registry::ResourceRegistry).
#[derive(Debug, Error)]
pub enum ResourceError {
    #[error("resource type `{0}` is already registered")]
    DuplicateType(String),

    #[error("unknown resource type `{0}`")]
    UnknownType(String),

    #[error("a resource named `{0}` already exists")]
    DuplicateName(String),

    #[error("resource `{0}` does not exist")]
    NotFound(String),

    #[error("resource `{name}` has type {actual}, expected {expected}")]
    TypeMismatch {
        name: String,
        expected: &'static str,
        actual: &'static str,
    },

    /// The handle refers to a resource that has been destroyed.
    #[error("stale resource handle")]
    StaleHandle,

    #[error("failed to create resource `{name}` of type `{kind}`")]
    CreateFailed {
        kind: String,
        name: String,
        #[source]
        source: anyhow::Error,
    },

    #[error("failed to load resource `{name}`")]
    LoadFailed {
        name: String,
        #[source]
        source: anyhow::Error,
    },

    #[error(transparent)]
    Parse(#[from] ParseError),

    #[error("cannot read resource manifest `{path}`")]
    Io {
        path: String,
        #[source]
        source: std::io::Error,
    },
}

/// Syntax error in a declarative resource manifest.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("{source_name}:{line}:{column}: {message}")]
pub struct ParseError {
    pub source_name: String,
    pub line: u32,
    pub column: u32,
    pub message: String,
}
