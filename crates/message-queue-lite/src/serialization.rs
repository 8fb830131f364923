//! Payload serialization boundary.
//!
//! The queue engine only moves opaque bytes. This module lets producers and
//! consumers exchange typed messages by encoding them before `enqueue` and
//! decoding them after `dequeue`.

use crate::error::{QueueError, SerializationError};
use crate::message::{DeliveryTag, MessageEnvelope};
use crate::queue::MessageQueue;
use bytes::Bytes;
use serde::de::DeserializeOwned;
use serde::Serialize;
use std::marker::PhantomData;
use std::sync::Arc;

/// Converts typed messages to and from queue payloads
pub trait MessageSerializer: Send + Sync {
    /// Encode a message into a non-empty payload
    fn serialize<T: Serialize>(&self, message: &T) -> Result<Bytes, SerializationError>;

    /// Decode a payload produced by [`MessageSerializer::serialize`]
    fn deserialize<T: DeserializeOwned>(&self, payload: &[u8]) -> Result<T, SerializationError>;
}

/// JSON serializer backed by `serde_json`
#[derive(Debug, Clone, Copy, Default)]
pub struct JsonMessageSerializer;

impl MessageSerializer for JsonMessageSerializer {
    fn serialize<T: Serialize>(&self, message: &T) -> Result<Bytes, SerializationError> {
        let encoded = serde_json::to_vec(message)?;
        if encoded.is_empty() {
            return Err(SerializationError::EmptyPayload);
        }
        Ok(Bytes::from(encoded))
    }

    fn deserialize<T: DeserializeOwned>(&self, payload: &[u8]) -> Result<T, SerializationError> {
        Ok(serde_json::from_slice(payload)?)
    }
}

/// A decoded message handed to a typed consumer
#[derive(Debug, Clone, PartialEq)]
pub struct TypedEnvelope<T> {
    pub delivery_tag: DeliveryTag,
    pub retry_count: u32,
    pub message: T,
}

/// Typed producer/consumer view over a byte-oriented [`MessageQueue`]
pub struct TypedQueue<T, S = JsonMessageSerializer> {
    queue: Arc<MessageQueue>,
    serializer: S,
    _message: PhantomData<fn() -> T>,
}

impl<T> TypedQueue<T, JsonMessageSerializer>
where
    T: Serialize + DeserializeOwned,
{
    /// Wrap a queue using JSON payloads
    pub fn json(queue: Arc<MessageQueue>) -> Self {
        Self::new(queue, JsonMessageSerializer)
    }
}

impl<T, S> TypedQueue<T, S>
where
    T: Serialize + DeserializeOwned,
    S: MessageSerializer,
{
    /// Wrap a queue with a custom serializer
    pub fn new(queue: Arc<MessageQueue>, serializer: S) -> Self {
        Self {
            queue,
            serializer,
            _message: PhantomData,
        }
    }

    /// Underlying byte queue
    pub fn queue(&self) -> &Arc<MessageQueue> {
        &self.queue
    }

    /// Encode and enqueue a message
    pub fn send(&self, message: &T) -> Result<DeliveryTag, QueueError> {
        let payload = self.serializer.serialize(message)?;
        self.queue.enqueue(payload)
    }

    /// Dequeue and decode the next message.
    ///
    /// A payload that fails to decode stays leased and is reported as
    /// [`QueueError::UndecodablePayload`] with its delivery tag. The caller
    /// may acknowledge it to drop it at once; otherwise it is redelivered
    /// when the lease expires and eventually discarded.
    pub fn receive(&self) -> Result<Option<TypedEnvelope<T>>, QueueError> {
        self.queue
            .dequeue()
            .map(|envelope| self.decode(envelope))
            .transpose()
    }

    /// Dequeue and decode up to `max_messages` messages.
    ///
    /// Each message is decoded independently, so one bad payload does not
    /// hide the rest of the batch.
    pub fn receive_batch(&self, max_messages: usize) -> Vec<Result<TypedEnvelope<T>, QueueError>> {
        self.queue
            .dequeue_batch(max_messages)
            .into_iter()
            .map(|envelope| self.decode(envelope))
            .collect()
    }

    fn decode(&self, envelope: MessageEnvelope) -> Result<TypedEnvelope<T>, QueueError> {
        let message = self
            .serializer
            .deserialize(&envelope.payload)
            .map_err(|source| QueueError::UndecodablePayload {
                delivery_tag: envelope.delivery_tag,
                source,
            })?;

        Ok(TypedEnvelope {
            delivery_tag: envelope.delivery_tag,
            retry_count: envelope.retry_count,
            message,
        })
    }

    /// Acknowledge a message received through this view
    pub fn acknowledge(&self, delivery_tag: DeliveryTag) {
        self.queue.acknowledge(delivery_tag);
    }
}

#[cfg(test)]
#[path = "serialization_tests.rs"]
mod tests;
