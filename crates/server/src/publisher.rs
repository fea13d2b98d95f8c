//! Publishes email requests to the broker's email topic.

use crate::broker::BrokerClient;
use crate::error::PublishError;
use crate::mail::EmailRequest;
use bytes::Bytes;
use std::sync::Arc;

pub struct MessagePublisher {
    broker: Arc<dyn BrokerClient>,
    topic: String,
}

impl MessagePublisher {
    pub fn new(broker: Arc<dyn BrokerClient>, topic: String) -> Self {
        Self { broker, topic }
    }

    /// Serialize the request to its canonical JSON payload and hand it to
    /// the broker, blocking until the broker confirms durable acceptance.
    ///
    /// Failures surface synchronously; retry is entirely the caller's
    /// decision.
    #[tracing::instrument(skip(self, request), fields(to = %request.to))]
    pub async fn publish(&self, request: &EmailRequest) -> Result<String, PublishError> {
        let payload = Bytes::from(serde_json::to_vec(request)?);
        let message_id = self.broker.publish(&self.topic, payload).await?;
        tracing::info!(message_id = %message_id, "Published email request");
        Ok(message_id)
    }
}
