//! Broker collaborator contract.
//!
//! The relay only assumes a durable pub/sub primitive with at-least-once
//! delivery, per-message delivery-attempt counting, dead-letter escalation
//! after a configured attempt limit, and optional consumer-side flow
//! control. Everything here is backend-agnostic; [`memory`] provides the
//! bundled in-process backend.

pub mod memory;

pub use memory::InMemoryBroker;

use crate::error::BrokerError;
use async_trait::async_trait;
use bytes::Bytes;

/// A message as delivered by the broker.
///
/// The delivery-attempt count is owned by the broker and starts at 1 for
/// the first delivery.
#[derive(Debug, Clone)]
pub struct BrokerMessage {
    pub id: String,
    pub payload: Bytes,
    pub delivery_attempt: u32,
}

/// Terminal outcome for a single delivery.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Decision {
    /// Message is done, remove it.
    Ack,
    /// Message is eligible for redelivery (and eventual dead-letter
    /// escalation once the attempt limit is reached).
    Nack,
}

/// Dead-letter escalation settings for a subscription.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DeadLetterPolicy {
    pub dead_letter_topic: String,
    pub max_delivery_attempts: u32,
}

#[derive(Debug, Clone, Default)]
pub struct SubscribeOptions {
    /// Cap on delivered-but-unacknowledged messages. `None` means the
    /// broker delivers as fast as the consumer polls.
    pub max_outstanding_messages: Option<usize>,
}

/// Backend hook resolving a delivery to its [`Decision`].
pub trait AckResponder: Send {
    fn respond(self: Box<Self>, decision: Decision);
}

/// One delivered message plus its acknowledgment handle.
///
/// Exactly one of [`ack`](Delivery::ack) / [`nack`](Delivery::nack) is
/// expected per delivery. Dropping an unresolved delivery nacks it, so an
/// aborted handler never loses a message.
pub struct Delivery {
    message: BrokerMessage,
    responder: Option<Box<dyn AckResponder>>,
}

impl Delivery {
    pub fn new(message: BrokerMessage, responder: Box<dyn AckResponder>) -> Self {
        Self {
            message,
            responder: Some(responder),
        }
    }

    pub fn message(&self) -> &BrokerMessage {
        &self.message
    }

    pub fn ack(mut self) {
        if let Some(responder) = self.responder.take() {
            responder.respond(Decision::Ack);
        }
    }

    pub fn nack(mut self) {
        if let Some(responder) = self.responder.take() {
            responder.respond(Decision::Nack);
        }
    }
}

impl Drop for Delivery {
    fn drop(&mut self) {
        if let Some(responder) = self.responder.take() {
            responder.respond(Decision::Nack);
        }
    }
}

/// Client half of the broker contract.
#[async_trait]
pub trait BrokerClient: Send + Sync {
    /// Publish a payload to a topic, awaiting durable acceptance.
    /// Returns the broker-assigned message id.
    async fn publish(&self, topic: &str, payload: Bytes) -> Result<String, BrokerError>;

    /// Configure (or reconfigure) dead-letter escalation for a
    /// subscription via the broker's admin surface.
    async fn apply_dead_letter_policy(
        &self,
        subscription: &str,
        policy: &DeadLetterPolicy,
    ) -> Result<(), BrokerError>;

    /// Attach a subscriber to a subscription.
    async fn subscribe(
        &self,
        subscription: &str,
        options: SubscribeOptions,
    ) -> Result<Box<dyn MessageStream>, BrokerError>;
}

/// Stream of deliveries for one attached subscriber.
#[async_trait]
pub trait MessageStream: Send {
    /// Wait for the next delivery. Pends while the subscription is empty
    /// or the flow-control cap is exhausted.
    async fn next(&mut self) -> Delivery;
}
