//! In-process broker backend.
//!
//! Implements the collaborator contract with plain process memory: topics
//! fan out to named subscriptions, a nack requeues the message with its
//! attempt count bumped, and once a subscription's dead-letter policy
//! limit is reached the message is republished to the dead-letter topic
//! instead. Deliveries outstanding past the flow-control cap are held back
//! by a semaphore until earlier ones resolve.

use super::{
    AckResponder, BrokerClient, BrokerMessage, DeadLetterPolicy, Decision, Delivery,
    MessageStream, SubscribeOptions,
};
use crate::error::BrokerError;
use async_trait::async_trait;
use bytes::Bytes;
use dashmap::DashMap;
use std::collections::VecDeque;
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::sync::{Notify, OwnedSemaphorePermit, Semaphore};
use tokio::time::Instant;
use uuid::Uuid;

/// Pause before a nacked message becomes deliverable again, so a cycling
/// message does not spin the consumer. Head-of-line only; fresh messages
/// queued behind a delayed redelivery wait with it.
const DEFAULT_REDELIVERY_DELAY: Duration = Duration::from_millis(200);

#[derive(Debug)]
struct QueuedMessage {
    id: String,
    payload: Bytes,
    /// Completed delivery count; the next delivery is attempt + 1.
    attempts: u32,
    /// Earliest instant the message may be delivered again.
    ready_at: Option<Instant>,
}

struct SubscriptionState {
    name: String,
    topic: String,
    queue: Mutex<VecDeque<QueuedMessage>>,
    notify: Notify,
    dead_letter_policy: Mutex<Option<DeadLetterPolicy>>,
}

struct Inner {
    /// topic name -> subscription names attached to it
    topics: DashMap<String, Vec<String>>,
    subscriptions: DashMap<String, Arc<SubscriptionState>>,
    redelivery_delay: Duration,
}

impl Inner {
    fn fan_out(&self, topic: &str, id: &str, payload: &Bytes) -> Result<(), BrokerError> {
        let sub_names = self
            .topics
            .get(topic)
            .ok_or_else(|| BrokerError::UnknownTopic(topic.to_string()))?;
        for name in sub_names.iter() {
            if let Some(sub) = self.subscriptions.get(name) {
                sub.queue.lock().unwrap().push_back(QueuedMessage {
                    id: id.to_string(),
                    payload: payload.clone(),
                    attempts: 0,
                    ready_at: None,
                });
                sub.notify.notify_one();
            }
        }
        Ok(())
    }
}

/// The bundled broker backend. Cheap to clone; clones share state.
#[derive(Clone)]
pub struct InMemoryBroker {
    inner: Arc<Inner>,
}

impl Default for InMemoryBroker {
    fn default() -> Self {
        Self::new()
    }
}

impl InMemoryBroker {
    pub fn new() -> Self {
        Self::with_redelivery_delay(DEFAULT_REDELIVERY_DELAY)
    }

    pub fn with_redelivery_delay(redelivery_delay: Duration) -> Self {
        Self {
            inner: Arc::new(Inner {
                topics: DashMap::new(),
                subscriptions: DashMap::new(),
                redelivery_delay,
            }),
        }
    }

    /// Admin surface: register a topic. Idempotent.
    pub fn create_topic(&self, topic: &str) {
        self.inner.topics.entry(topic.to_string()).or_default();
    }

    /// Admin surface: attach a named subscription to a topic. Idempotent
    /// for an existing (subscription, topic) pair.
    pub fn create_subscription(&self, subscription: &str, topic: &str) -> Result<(), BrokerError> {
        let mut sub_names = self
            .inner
            .topics
            .get_mut(topic)
            .ok_or_else(|| BrokerError::UnknownTopic(topic.to_string()))?;
        self.inner
            .subscriptions
            .entry(subscription.to_string())
            .or_insert_with(|| {
                Arc::new(SubscriptionState {
                    name: subscription.to_string(),
                    topic: topic.to_string(),
                    queue: Mutex::new(VecDeque::new()),
                    notify: Notify::new(),
                    dead_letter_policy: Mutex::new(None),
                })
            });
        if !sub_names.iter().any(|name| name == subscription) {
            sub_names.push(subscription.to_string());
        }
        Ok(())
    }

    /// Messages currently queued (not delivered) on a subscription.
    pub fn backlog(&self, subscription: &str) -> usize {
        self.inner
            .subscriptions
            .get(subscription)
            .map(|sub| sub.queue.lock().unwrap().len())
            .unwrap_or(0)
    }
}

#[async_trait]
impl BrokerClient for InMemoryBroker {
    async fn publish(&self, topic: &str, payload: Bytes) -> Result<String, BrokerError> {
        let id = Uuid::new_v4().to_string();
        self.inner.fan_out(topic, &id, &payload)?;
        tracing::debug!(topic = %topic, message_id = %id, "Message accepted by broker");
        Ok(id)
    }

    async fn apply_dead_letter_policy(
        &self,
        subscription: &str,
        policy: &DeadLetterPolicy,
    ) -> Result<(), BrokerError> {
        if !self.inner.topics.contains_key(&policy.dead_letter_topic) {
            return Err(BrokerError::DeadLetterPolicy(format!(
                "dead-letter topic {} does not exist",
                policy.dead_letter_topic
            )));
        }
        let sub = self
            .inner
            .subscriptions
            .get(subscription)
            .ok_or_else(|| BrokerError::UnknownSubscription(subscription.to_string()))?;
        *sub.dead_letter_policy.lock().unwrap() = Some(policy.clone());
        Ok(())
    }

    async fn subscribe(
        &self,
        subscription: &str,
        options: SubscribeOptions,
    ) -> Result<Box<dyn MessageStream>, BrokerError> {
        let sub = self
            .inner
            .subscriptions
            .get(subscription)
            .ok_or_else(|| BrokerError::UnknownSubscription(subscription.to_string()))?
            .clone();
        let flow = options
            .max_outstanding_messages
            .map(|cap| Arc::new(Semaphore::new(cap)));
        Ok(Box::new(MemoryStream {
            inner: self.inner.clone(),
            sub,
            flow,
        }))
    }
}

struct MemoryStream {
    inner: Arc<Inner>,
    sub: Arc<SubscriptionState>,
    flow: Option<Arc<Semaphore>>,
}

#[async_trait]
impl MessageStream for MemoryStream {
    async fn next(&mut self) -> Delivery {
        let permit = match &self.flow {
            // The semaphore is never closed, so acquire cannot fail.
            Some(semaphore) => Some(
                semaphore
                    .clone()
                    .acquire_owned()
                    .await
                    .expect("flow-control semaphore closed"),
            ),
            None => None,
        };

        loop {
            // Register interest before checking the queue so a concurrent
            // push cannot slip between the check and the await.
            let notified = self.sub.notify.notified();
            let queued = self.sub.queue.lock().unwrap().pop_front();
            if let Some(queued) = queued {
                // The guard puts the message back if this future is
                // dropped while waiting out the redelivery delay.
                let mut guard = PopGuard {
                    sub: self.sub.clone(),
                    message: Some(queued),
                };
                if let Some(ready_at) = guard.message.as_ref().and_then(|m| m.ready_at) {
                    tokio::time::sleep_until(ready_at).await;
                }
                let queued = guard.take();

                let delivered = QueuedMessage {
                    id: queued.id.clone(),
                    payload: queued.payload.clone(),
                    attempts: queued.attempts + 1,
                    ready_at: None,
                };
                let message = BrokerMessage {
                    id: delivered.id.clone(),
                    payload: delivered.payload.clone(),
                    delivery_attempt: delivered.attempts,
                };
                return Delivery::new(
                    message,
                    Box::new(MemoryResponder {
                        inner: self.inner.clone(),
                        sub: self.sub.clone(),
                        message: delivered,
                        _permit: permit,
                    }),
                );
            }
            notified.await;
        }
    }
}

/// Returns an undelivered message to the front of its queue on drop.
struct PopGuard {
    sub: Arc<SubscriptionState>,
    message: Option<QueuedMessage>,
}

impl PopGuard {
    fn take(&mut self) -> QueuedMessage {
        self.message.take().expect("message already taken")
    }
}

impl Drop for PopGuard {
    fn drop(&mut self) {
        if let Some(message) = self.message.take() {
            self.sub.queue.lock().unwrap().push_front(message);
            self.sub.notify.notify_one();
        }
    }
}

struct MemoryResponder {
    inner: Arc<Inner>,
    sub: Arc<SubscriptionState>,
    message: QueuedMessage,
    /// Released once the delivery resolves, freeing a flow-control slot.
    _permit: Option<OwnedSemaphorePermit>,
}

impl AckResponder for MemoryResponder {
    fn respond(self: Box<Self>, decision: Decision) {
        let MemoryResponder {
            inner,
            sub,
            mut message,
            _permit,
        } = *self;

        match decision {
            Decision::Ack => {}
            Decision::Nack => {
                let policy = sub.dead_letter_policy.lock().unwrap().clone();
                match policy {
                    Some(policy) if message.attempts >= policy.max_delivery_attempts => {
                        tracing::warn!(
                            message_id = %message.id,
                            subscription = %sub.name,
                            attempts = message.attempts,
                            dead_letter_topic = %policy.dead_letter_topic,
                            "Delivery attempt limit reached, escalating to dead-letter topic"
                        );
                        if let Err(e) =
                            inner.fan_out(&policy.dead_letter_topic, &message.id, &message.payload)
                        {
                            // Keep the message cycling rather than lose it.
                            tracing::error!(
                                message_id = %message.id,
                                error = %e,
                                "Dead-letter escalation failed, requeueing"
                            );
                            message.ready_at = Some(Instant::now() + inner.redelivery_delay);
                            sub.queue.lock().unwrap().push_back(message);
                            sub.notify.notify_one();
                        }
                    }
                    _ => {
                        tracing::debug!(
                            message_id = %message.id,
                            topic = %sub.topic,
                            attempts = message.attempts,
                            "Message nacked, queued for redelivery"
                        );
                        message.ready_at = Some(Instant::now() + inner.redelivery_delay);
                        sub.queue.lock().unwrap().push_back(message);
                        sub.notify.notify_one();
                    }
                }
            }
        }
    }
}
