//! # Import Error Types
//!
//! Structured error handling for the importer using thiserror.
//!
//! Expected contention outcomes of the claim protocol (version conflict,
//! throttling, duplicate key) are **not** errors — they are typed results on
//! the store traits. Everything in this enum is a genuine fault that aborts
//! the current operation.

use thiserror::Error;

/// Faults surfaced by the importer subsystems.
#[derive(Error, Debug)]
pub enum ImportError {
    #[error("Work-item store error: {operation}: {message}")]
    Store { operation: String, message: String },

    #[error("Bulk sink error: {message}")]
    Sink { message: String },

    #[error("Source error: {location}: {message}")]
    Source { location: String, message: String },

    #[error("Unsupported source: {0}")]
    UnsupportedSource(String),

    #[error("Configuration error: {message}")]
    Configuration { message: String },

    #[error("Serialization error: {message}")]
    Serialization { message: String },
}

impl ImportError {
    /// Create a work-item store error
    pub fn store(operation: impl Into<String>, message: impl Into<String>) -> Self {
        Self::Store {
            operation: operation.into(),
            message: message.into(),
        }
    }

    /// Create a bulk sink error
    pub fn sink(message: impl Into<String>) -> Self {
        Self::Sink {
            message: message.into(),
        }
    }

    /// Create a source error
    pub fn source(location: impl Into<String>, message: impl Into<String>) -> Self {
        Self::Source {
            location: location.into(),
            message: message.into(),
        }
    }

    /// Create a configuration error
    pub fn configuration(message: impl Into<String>) -> Self {
        Self::Configuration {
            message: message.into(),
        }
    }

    /// Create a serialization error
    pub fn serialization(message: impl Into<String>) -> Self {
        Self::Serialization {
            message: message.into(),
        }
    }
}

pub type Result<T> = std::result::Result<T, ImportError>;
