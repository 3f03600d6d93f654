//! Unified error handling for the pipeline core.
//!
//! One error type for the whole crate, with variants split by error
//! class so callers can tell configuration mistakes (recoverable,
//! raised before anything runs) from launch failures (raised after
//! rollback).

use mocap_types::TopicId;
use thiserror::Error;

/// Main error type for pipeline operations.
#[derive(Debug, Error)]
pub enum PipelineError {
    /// I/O related errors
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// Configuration construction or validation errors
    #[error("Configuration error: {0}")]
    Config(String),

    /// A required file, directory, or resource is absent
    #[error("Resource not found: {0}")]
    NotFound(String),

    /// Launch-time failures; the launcher has already rolled back
    #[error("Launch error: {0}")]
    Launch(String),

    /// Node-related errors
    #[error("Node '{node}' error: {message}")]
    Node { node: String, message: String },

    /// Pub/sub layer errors
    #[error("Communication error on topic '{topic}': {message}")]
    Communication { topic: TopicId, message: String },

    /// Invalid input/argument errors (programmer errors included)
    #[error("Invalid input: {0}")]
    InvalidInput(String),

    /// Serialization/deserialization errors
    #[error("Serialization error: {0}")]
    Serialization(String),
}

/// Convenience alias for Results using [`PipelineError`].
pub type Result<T> = std::result::Result<T, PipelineError>;

impl From<serde_json::Error> for PipelineError {
    fn from(err: serde_json::Error) -> Self {
        PipelineError::Serialization(err.to_string())
    }
}

impl PipelineError {
    /// Create a configuration error with a custom message.
    pub fn config<S: Into<String>>(msg: S) -> Self {
        PipelineError::Config(msg.into())
    }

    /// Create a not-found error.
    pub fn not_found<S: Into<String>>(msg: S) -> Self {
        PipelineError::NotFound(msg.into())
    }

    /// Create a launch error.
    pub fn launch<S: Into<String>>(msg: S) -> Self {
        PipelineError::Launch(msg.into())
    }

    /// Create a node error with node id and message.
    pub fn node<S: Into<String>, T: Into<String>>(node: S, message: T) -> Self {
        PipelineError::Node {
            node: node.into(),
            message: message.into(),
        }
    }

    /// Create a communication error for a topic.
    pub fn communication<S: Into<String>>(topic: TopicId, message: S) -> Self {
        PipelineError::Communication {
            topic,
            message: message.into(),
        }
    }

    /// Create an invalid input error.
    pub fn invalid_input<S: Into<String>>(msg: S) -> Self {
        PipelineError::InvalidInput(msg.into())
    }
}
