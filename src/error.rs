//! Error types for permweave
//!
//! This module defines the error hierarchy used throughout the crate.
//! Permission checks never produce errors; these types cover configuration,
//! graph mutation and the persistence collaborator.

use thiserror::Error;

/// Top-level application error
#[derive(Error, Debug)]
pub enum AppError {
    #[error("Configuration error: {0}")]
    Config(#[from] ConfigError),

    #[error("Graph error: {0}")]
    Graph(#[from] GraphError),

    #[error("Store error: {0}")]
    Store(#[from] StoreError),
}

/// Configuration-related errors
#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("Failed to load configuration: {0}")]
    Load(String),

    #[error("Invalid configuration: {message}")]
    Invalid { message: String },

    #[error("Missing required configuration: {field}")]
    Missing { field: String },

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

/// Rejected graph mutations
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum GraphError {
    #[error("Group '{0}' does not exist")]
    GroupNotFound(String),

    #[error("Group '{0}' already exists")]
    GroupExists(String),

    #[error("User '{0}' does not exist")]
    UserNotFound(String),

    #[error("Group '{0}' cannot be its own parent")]
    SelfParent(String),

    #[error("Cannot delete the default group '{0}'")]
    DefaultGroupDeletion(String),

    #[error("{field} must not be empty")]
    EmptyIdentifier { field: &'static str },
}

impl GraphError {
    pub fn empty(field: &'static str) -> Self {
        GraphError::EmptyIdentifier { field }
    }
}

/// Persistence collaborator errors
#[derive(Error, Debug)]
pub enum StoreError {
    #[error("IO error on '{path}': {source}")]
    Io {
        path: String,
        #[source]
        source: std::io::Error,
    },

    #[error("Malformed graph data: {0}")]
    Format(#[from] serde_json::Error),

    #[error("Store unavailable: {0}")]
    Unavailable(String),
}

impl StoreError {
    pub fn io(path: impl Into<String>, source: std::io::Error) -> Self {
        StoreError::Io {
            path: path.into(),
            source,
        }
    }
}

/// Result type alias for the application
pub type Result<T> = std::result::Result<T, AppError>;

/// Result type alias for graph mutations
pub type GraphResult<T> = std::result::Result<T, GraphError>;

/// Result type alias for store operations
pub type StoreResult<T> = std::result::Result<T, StoreError>;
