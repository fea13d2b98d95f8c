//! Dead-letter consumer: terminal sink for messages that exhausted their
//! delivery attempts.
//!
//! Unconditionally and permanently acks every delivery after recording it
//! for manual review. This stream is not a retry path; it never nacks.

use crate::broker::{BrokerClient, SubscribeOptions};
use crate::consumer::lifecycle::{Lifecycle, LifecycleStatus};
use crate::error::BrokerError;
use serde::Serialize;
use std::collections::VecDeque;
use std::sync::{Arc, Mutex};
use std::time::Duration;
use time::OffsetDateTime;
use utoipa::ToSchema;

/// One dead-lettered message, kept for manual review.
#[derive(Debug, Clone, Serialize, ToSchema)]
pub struct DeadLetterRecord {
    pub message_id: String,
    /// Payload rendered as UTF-8 (lossy) for inspection.
    pub payload: String,
    #[serde(with = "time::serde::rfc3339")]
    #[schema(value_type = String, example = "2026-01-01T00:00:00Z")]
    pub received_at: OffsetDateTime,
}

/// Bounded in-memory record of recently dead-lettered messages.
pub struct DeadLetterStore {
    records: Mutex<VecDeque<DeadLetterRecord>>,
    capacity: usize,
}

impl DeadLetterStore {
    pub fn new(capacity: usize) -> Self {
        Self {
            records: Mutex::new(VecDeque::with_capacity(capacity)),
            capacity,
        }
    }

    pub fn record(&self, record: DeadLetterRecord) {
        let mut records = self.records.lock().unwrap();
        if records.len() == self.capacity {
            records.pop_front();
        }
        records.push_back(record);
    }

    /// Most recent records, newest last.
    pub fn recent(&self) -> Vec<DeadLetterRecord> {
        self.records.lock().unwrap().iter().cloned().collect()
    }
}

impl Default for DeadLetterStore {
    fn default() -> Self {
        Self::new(256)
    }
}

pub struct DeadLetterConsumer {
    broker: Arc<dyn BrokerClient>,
    subscription: String,
    store: Arc<DeadLetterStore>,
    lifecycle: Lifecycle,
}

impl DeadLetterConsumer {
    pub fn new(
        broker: Arc<dyn BrokerClient>,
        subscription: String,
        store: Arc<DeadLetterStore>,
        stop_timeout: Duration,
    ) -> Self {
        Self {
            broker,
            subscription,
            store,
            lifecycle: Lifecycle::new(stop_timeout),
        }
    }

    #[tracing::instrument(skip(self), fields(subscription = %self.subscription))]
    pub async fn start(&self) -> Result<LifecycleStatus, BrokerError> {
        let status = self
            .lifecycle
            .start(|cancel, tracker| async move {
                let mut stream = self
                    .broker
                    .subscribe(&self.subscription, SubscribeOptions::default())
                    .await?;
                let store = self.store.clone();
                tracker.spawn(async move {
                    loop {
                        tokio::select! {
                            _ = cancel.cancelled() => break,
                            delivery = stream.next() => {
                                let message = delivery.message();
                                let payload = String::from_utf8_lossy(&message.payload).into_owned();
                                tracing::warn!(
                                    message_id = %message.id,
                                    payload = %payload,
                                    "Received dead-letter message"
                                );
                                store.record(DeadLetterRecord {
                                    message_id: message.id.clone(),
                                    payload,
                                    received_at: OffsetDateTime::now_utc(),
                                });
                                // Terminal sink: remove the message so it is
                                // never redelivered; it is recorded above for
                                // manual review.
                                delivery.ack();
                            }
                        }
                    }
                });
                Ok(())
            })
            .await?;

        match status {
            LifecycleStatus::Started => {
                tracing::info!(subscription = %self.subscription, "DLT consumer started and listening");
            }
            LifecycleStatus::AlreadyRunning => {
                tracing::warn!("DLT consumer is already running");
            }
            _ => {}
        }
        Ok(status)
    }

    #[tracing::instrument(skip(self))]
    pub async fn stop(&self) -> LifecycleStatus {
        let status = self.lifecycle.stop().await;
        match status {
            LifecycleStatus::Stopped => tracing::info!("DLT consumer shut down"),
            LifecycleStatus::NotRunning => tracing::warn!("DLT consumer is not running"),
            LifecycleStatus::StopTimedOut => {
                tracing::warn!("Timeout waiting for DLT consumer to shut down");
            }
            _ => {}
        }
        status
    }

    pub fn is_running(&self) -> bool {
        self.lifecycle.is_running()
    }
}
