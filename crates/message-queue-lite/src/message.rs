//! Message types for queue operations including core domain identifiers.

use crate::error::ValidationError;
use bytes::Bytes;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::str::FromStr;

// ============================================================================
// Core Domain Identifiers
// ============================================================================

/// Validated queue name with length and character restrictions
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct QueueName(String);

impl QueueName {
    /// Create new queue name with validation
    pub fn new(name: String) -> Result<Self, ValidationError> {
        if name.is_empty() || name.len() > 260 {
            return Err(ValidationError::OutOfRange {
                field: "queue_name".to_string(),
                message: "must be 1-260 characters".to_string(),
            });
        }

        if !name
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || c == '-' || c == '_' || c == '.')
        {
            return Err(ValidationError::InvalidFormat {
                field: "queue_name".to_string(),
                message: "only ASCII alphanumeric, hyphens, underscores and dots allowed"
                    .to_string(),
            });
        }

        if name.starts_with('-') || name.ends_with('-') || name.contains("--") {
            return Err(ValidationError::InvalidFormat {
                field: "queue_name".to_string(),
                message: "no leading/trailing hyphens or consecutive hyphens".to_string(),
            });
        }

        Ok(Self(name))
    }

    /// Get queue name as string
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl std::fmt::Display for QueueName {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl FromStr for QueueName {
    type Err = ValidationError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::new(s.to_string())
    }
}

/// Identifier assigned to a message at enqueue time and used to acknowledge it.
///
/// Tags are issued by a queue's sequence generator, strictly increase in issue
/// order and are never reused within the lifetime of that queue.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct DeliveryTag(u64);

impl DeliveryTag {
    /// Wrap a raw tag value
    pub fn new(value: u64) -> Self {
        Self(value)
    }

    /// Get numeric value
    pub fn as_u64(&self) -> u64 {
        self.0
    }
}

impl From<u64> for DeliveryTag {
    fn from(value: u64) -> Self {
        Self(value)
    }
}

impl std::fmt::Display for DeliveryTag {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl FromStr for DeliveryTag {
    type Err = ValidationError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        s.parse::<u64>()
            .map(Self)
            .map_err(|_| ValidationError::InvalidFormat {
                field: "delivery_tag".to_string(),
                message: format!("expected unsigned integer, got '{}'", s),
            })
    }
}

/// Timestamp wrapper for consistent time handling
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct Timestamp(DateTime<Utc>);

impl Timestamp {
    /// Create timestamp for current time
    pub fn now() -> Self {
        Self(Utc::now())
    }

    /// Create timestamp from DateTime
    pub fn from_datetime(dt: DateTime<Utc>) -> Self {
        Self(dt)
    }

    /// Get underlying DateTime
    pub fn as_datetime(&self) -> DateTime<Utc> {
        self.0
    }
}

impl std::fmt::Display for Timestamp {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0.format("%Y-%m-%d %H:%M:%S UTC"))
    }
}

// ============================================================================
// Message Types
// ============================================================================

/// A message handed to a consumer by `dequeue`
///
/// The payload is an immutable `Bytes` handle; nothing a consumer does with it
/// can change the copy the queue keeps for redelivery.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MessageEnvelope {
    pub delivery_tag: DeliveryTag,
    /// Number of times this message's lease expired before this delivery
    pub retry_count: u32,
    pub payload: Bytes,
}

/// Immutable view of a queue entry delivered to event sinks
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EntrySnapshot {
    pub delivery_tag: DeliveryTag,
    pub retry_count: u32,
    pub acknowledged: bool,
    pub payload: Bytes,
    pub original_enqueue_time: Timestamp,
    pub latest_enqueue_time: Timestamp,
    pub dequeue_time: Option<Timestamp>,
}

/// Point-in-time counts for a single queue
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct QueueStatus {
    pub queue_name: String,
    /// Entries waiting for first or repeat delivery
    pub ready_count: usize,
    /// Entries delivered and awaiting acknowledgement or lease expiry
    pub in_flight_count: usize,
}

#[cfg(test)]
#[path = "message_tests.rs"]
mod tests;
