//! Error types for searchsync

use std::fmt;
use thiserror::Error;

use crate::config::ConfigError;

/// Sync error kinds
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    /// Backend rejected index settings or mapping
    IndexCreation,
    /// Target index does not exist
    IndexNotFound,
    /// Transport/network failure talking to the search backend
    SearchBackend,
    /// Primary store failure
    PrimaryStore,
    /// Schema id not known to the registry
    UnknownSchema,
    /// Query could not be translated
    InvalidQuery,
    /// Serialization/deserialization errors
    Serialization,
    /// Configuration errors
    Config,
}

impl ErrorKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            ErrorKind::IndexCreation => "index_creation",
            ErrorKind::IndexNotFound => "index_not_found",
            ErrorKind::SearchBackend => "search_backend",
            ErrorKind::PrimaryStore => "primary_store",
            ErrorKind::UnknownSchema => "unknown_schema",
            ErrorKind::InvalidQuery => "invalid_query",
            ErrorKind::Serialization => "serialization",
            ErrorKind::Config => "config",
        }
    }
}

impl fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Sync error type
#[derive(Debug, Error)]
#[error("[{kind}] {message}")]
pub struct SyncError {
    #[source]
    pub source: Option<Box<dyn std::error::Error + Send + Sync>>,
    pub kind: ErrorKind,
    pub message: String,
}

impl SyncError {
    pub fn new(kind: ErrorKind, message: impl Into<String>) -> Self {
        Self {
            kind,
            message: message.into(),
            source: None,
        }
    }

    pub fn with_source(mut self, source: impl std::error::Error + Send + Sync + 'static) -> Self {
        self.source = Some(Box::new(source));
        self
    }

    // Convenience constructors
    pub fn index_creation(index: &str, message: impl Into<String>) -> Self {
        Self::new(
            ErrorKind::IndexCreation,
            format!("Failed to create index '{}': {}", index, message.into()),
        )
    }

    pub fn index_not_found(index: impl Into<String>) -> Self {
        Self::new(
            ErrorKind::IndexNotFound,
            format!("Index not found: {}", index.into()),
        )
    }

    pub fn search_backend(message: impl Into<String>) -> Self {
        Self::new(ErrorKind::SearchBackend, message)
    }

    pub fn primary_store(message: impl Into<String>) -> Self {
        Self::new(ErrorKind::PrimaryStore, message)
    }

    pub fn unknown_schema(schema_id: impl Into<String>) -> Self {
        Self::new(
            ErrorKind::UnknownSchema,
            format!("Unknown schema: {}", schema_id.into()),
        )
    }

    pub fn invalid_query(message: impl Into<String>) -> Self {
        Self::new(ErrorKind::InvalidQuery, message)
    }

    pub fn serialization(message: impl Into<String>) -> Self {
        Self::new(ErrorKind::Serialization, message)
    }

    pub fn is_index_not_found(&self) -> bool {
        self.kind == ErrorKind::IndexNotFound
    }
}

// JSON error conversions
impl From<serde_json::Error> for SyncError {
    fn from(err: serde_json::Error) -> Self {
        SyncError::serialization(format!("JSON error: {}", err)).with_source(err)
    }
}

impl From<ConfigError> for SyncError {
    fn from(err: ConfigError) -> Self {
        SyncError::new(ErrorKind::Config, err.to_string()).with_source(err)
    }
}

/// Result type alias
pub type Result<T> = std::result::Result<T, SyncError>;
