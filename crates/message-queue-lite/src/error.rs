//! Error types for queue operations.

use crate::message::DeliveryTag;
use thiserror::Error;

/// Comprehensive error type for all queue operations
///
/// Only malformed input, misconfiguration and use of a queue after shutdown
/// are reported as errors. Empty queues, unknown delivery tags and repeated
/// acknowledgements are ordinary states and never produce a `QueueError`.
#[derive(Debug, Error)]
pub enum QueueError {
    #[error("Invalid argument: {0}")]
    InvalidArgument(#[from] ValidationError),

    #[error("Configuration error: {0}")]
    Configuration(#[from] ConfigurationError),

    #[error("Serialization failed: {0}")]
    Serialization(#[from] SerializationError),

    /// A received payload could not be decoded. The message stays leased
    /// under `delivery_tag`, so the caller can still acknowledge it.
    #[error("Failed to decode message {delivery_tag}: {source}")]
    UndecodablePayload {
        delivery_tag: DeliveryTag,
        #[source]
        source: SerializationError,
    },

    #[error("Queue '{queue_name}' has been shut down")]
    QueueClosed { queue_name: String },

    #[error("Queue not found: {queue_name}")]
    QueueNotFound { queue_name: String },

    #[error("Queue already exists: {queue_name}")]
    QueueAlreadyExists { queue_name: String },

    #[error("No Tokio runtime is available to run the lease monitor")]
    RuntimeUnavailable,
}

impl QueueError {
    /// Delivery tag of the message the error refers to, if any
    pub fn delivery_tag(&self) -> Option<DeliveryTag> {
        match self {
            Self::UndecodablePayload { delivery_tag, .. } => Some(*delivery_tag),
            _ => None,
        }
    }

    /// Check if error is transient and the same call may succeed later
    pub fn is_transient(&self) -> bool {
        match self {
            Self::InvalidArgument(_) => false,
            Self::Configuration(_) => false,
            Self::Serialization(_) => false,
            Self::UndecodablePayload { .. } => false,
            Self::QueueClosed { .. } => false,
            Self::QueueNotFound { .. } => false,
            Self::QueueAlreadyExists { .. } => false,
            Self::RuntimeUnavailable => false,
        }
    }
}

/// Validation errors
#[derive(Debug, Error, PartialEq, Eq)]
pub enum ValidationError {
    #[error("Required field missing: {field}")]
    Required { field: String },

    #[error("Invalid format for {field}: {message}")]
    InvalidFormat { field: String, message: String },

    #[error("Value out of range for {field}: {message}")]
    OutOfRange { field: String, message: String },
}

/// Configuration errors
#[derive(Debug, Error)]
pub enum ConfigurationError {
    #[error("Invalid configuration: {message}")]
    Invalid { message: String },

    #[error("Configuration parsing failed: {message}")]
    Parsing { message: String },
}

impl From<config::ConfigError> for ConfigurationError {
    fn from(error: config::ConfigError) -> Self {
        Self::Parsing {
            message: error.to_string(),
        }
    }
}

/// Errors during payload serialization/deserialization
#[derive(Debug, Error)]
pub enum SerializationError {
    #[error("JSON serialization failed: {0}")]
    JsonError(#[from] serde_json::Error),

    #[error("Serialized payload is empty")]
    EmptyPayload,
}

#[cfg(test)]
#[path = "error_tests.rs"]
mod tests;
