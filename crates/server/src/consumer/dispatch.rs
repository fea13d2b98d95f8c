//! Health-gated dispatch consumer.
//!
//! Drains the email subscription and concludes every delivery in exactly
//! one of ack/nack:
//!
//! - mail service down: nack without parsing or sending, let broker
//!   redelivery (and eventual dead-letter escalation) absorb the outage
//! - malformed payload: ack and log, retrying cannot repair a parse
//!   failure and acking keeps junk out of the dead-letter stream
//! - send succeeded: ack
//! - anything else: nack, biasing toward redelivery over silent loss

use crate::broker::{BrokerClient, BrokerMessage, DeadLetterPolicy, Delivery, SubscribeOptions};
use crate::consumer::lifecycle::{Lifecycle, LifecycleStatus};
use crate::error::{BrokerError, ProcessingError, SendError};
use crate::mail::{EmailRequest, MailHealth, MailSender};
use std::sync::Arc;
use std::time::Duration;

pub struct DispatchConsumer {
    broker: Arc<dyn BrokerClient>,
    mailer: Arc<dyn MailSender>,
    health: Arc<dyn MailHealth>,
    subscription: String,
    dead_letter_policy: Option<DeadLetterPolicy>,
    max_outstanding_messages: Option<usize>,
    lifecycle: Lifecycle,
}

impl DispatchConsumer {
    pub fn new(
        broker: Arc<dyn BrokerClient>,
        mailer: Arc<dyn MailSender>,
        health: Arc<dyn MailHealth>,
        subscription: String,
        dead_letter_policy: Option<DeadLetterPolicy>,
        max_outstanding_messages: Option<usize>,
        stop_timeout: Duration,
    ) -> Self {
        Self {
            broker,
            mailer,
            health,
            subscription,
            dead_letter_policy,
            max_outstanding_messages,
            lifecycle: Lifecycle::new(stop_timeout),
        }
    }

    /// Attach the subscription and begin streaming. Applying the
    /// dead-letter policy is best-effort: a failure there is logged and
    /// the consumer starts without broker-side escalation configured.
    #[tracing::instrument(skip(self), fields(subscription = %self.subscription))]
    pub async fn start(&self) -> Result<LifecycleStatus, BrokerError> {
        let status = self
            .lifecycle
            .start(|cancel, tracker| async move {
                if let Some(policy) = &self.dead_letter_policy {
                    match self
                        .broker
                        .apply_dead_letter_policy(&self.subscription, policy)
                        .await
                    {
                        Ok(()) => tracing::info!(
                            subscription = %self.subscription,
                            dead_letter_topic = %policy.dead_letter_topic,
                            max_delivery_attempts = policy.max_delivery_attempts,
                            "Applied dead-letter policy to subscription"
                        ),
                        Err(e) => tracing::error!(
                            subscription = %self.subscription,
                            error = %e,
                            "Failed to apply dead-letter policy. The consumer will start without it."
                        ),
                    }
                }

                let options = SubscribeOptions {
                    max_outstanding_messages: self.max_outstanding_messages,
                };
                if let Some(cap) = self.max_outstanding_messages {
                    tracing::info!(
                        max_outstanding_messages = cap,
                        "Applying flow control to subscription"
                    );
                }
                let mut stream = self.broker.subscribe(&self.subscription, options).await?;

                let mailer = self.mailer.clone();
                let health = self.health.clone();
                let handler_tracker = tracker.clone();
                tracker.spawn(async move {
                    loop {
                        tokio::select! {
                            _ = cancel.cancelled() => break,
                            delivery = stream.next() => {
                                let mailer = mailer.clone();
                                let health = health.clone();
                                handler_tracker.spawn(async move {
                                    handle_delivery(delivery, health.as_ref(), mailer.as_ref()).await;
                                });
                            }
                        }
                    }
                });
                Ok(())
            })
            .await?;

        match status {
            LifecycleStatus::Started => {
                tracing::info!(subscription = %self.subscription, "Consumer started and listening");
            }
            LifecycleStatus::AlreadyRunning => {
                tracing::warn!("Consumer is already running");
            }
            _ => {}
        }
        Ok(status)
    }

    /// Request graceful shutdown and wait up to the drain timeout for
    /// in-flight messages.
    #[tracing::instrument(skip(self))]
    pub async fn stop(&self) -> LifecycleStatus {
        let status = self.lifecycle.stop().await;
        match status {
            LifecycleStatus::Stopped => tracing::info!("Consumer shut down"),
            LifecycleStatus::NotRunning => tracing::warn!("Consumer is not running"),
            LifecycleStatus::StopTimedOut => {
                tracing::warn!("Timeout waiting for consumer to shut down");
            }
            _ => {}
        }
        status
    }

    pub fn is_running(&self) -> bool {
        self.lifecycle.is_running()
    }
}

/// Resolve one delivery to its ack/nack decision.
async fn handle_delivery(delivery: Delivery, health: &dyn MailHealth, mailer: &dyn MailSender) {
    let message_id = delivery.message().id.clone();
    tracing::info!(message_id = %message_id, "Received message");

    match process_message(delivery.message(), health, mailer).await {
        Ok(()) => {
            tracing::info!(message_id = %message_id, "Message processed and acknowledged");
            delivery.ack();
        }
        Err(e) if e.is_retryable() => {
            tracing::warn!(
                message_id = %message_id,
                error = %e,
                "Nacking message to allow redelivery or dead-letter escalation"
            );
            delivery.nack();
        }
        Err(e) => {
            tracing::error!(
                message_id = %message_id,
                error = %e,
                "Message is malformed and will be acknowledged to prevent retries"
            );
            delivery.ack();
        }
    }
}

/// The per-message decision logic, independent of the broker client so it
/// is testable without a live subscription.
pub(crate) async fn process_message(
    message: &BrokerMessage,
    health: &dyn MailHealth,
    mailer: &dyn MailSender,
) -> Result<(), ProcessingError> {
    // Health is queried per message and never cached across decisions.
    if !health.is_healthy().await {
        return Err(ProcessingError::UnhealthyDownstream);
    }

    let request: EmailRequest = serde_json::from_slice(&message.payload)
        .map_err(|e| ProcessingError::MalformedPayload(e.to_string()))?;

    match mailer.send(&request).await {
        Ok(()) => Ok(()),
        Err(SendError::Transient(e)) => Err(ProcessingError::TransientSend(e)),
        Err(SendError::Unexpected(e)) => Err(ProcessingError::Unexpected(e)),
    }
}
