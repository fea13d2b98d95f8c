use thiserror::Error;

#[derive(Debug, Error)]
pub enum PublishError {
    #[error("Failed to serialize email request: {0}")]
    Serialize(#[from] serde_json::Error),
    #[error("Broker rejected publish: {0}")]
    Broker(#[from] BrokerError),
}

#[derive(Debug, Error)]
pub enum BrokerError {
    #[error("Unknown topic: {0}")]
    UnknownTopic(String),
    #[error("Unknown subscription: {0}")]
    UnknownSubscription(String),
    #[error("Broker unavailable: {0}")]
    Unavailable(String),
    #[error("Failed to apply dead-letter policy: {0}")]
    DeadLetterPolicy(String),
}

/// Outcome classification for a single consumed message.
///
/// Everything except a malformed payload is retryable: the broker's
/// redelivery and dead-letter escalation absorb transient failures, while
/// a payload that cannot be parsed will never parse on redelivery.
#[derive(Debug, Error)]
pub enum ProcessingError {
    #[error("Malformed payload: {0}")]
    MalformedPayload(String),
    #[error("Transient send failure: {0}")]
    TransientSend(String),
    #[error("Mail service is unhealthy, send not attempted")]
    UnhealthyDownstream,
    #[error("Unexpected processing error: {0}")]
    Unexpected(String),
}

impl ProcessingError {
    pub fn is_retryable(&self) -> bool {
        !matches!(self, ProcessingError::MalformedPayload(_))
    }
}

/// Error raised by the SMTP mail sender.
///
/// The transport contract only distinguishes transient failures from
/// everything else; both map to a nack, so the split exists for logging.
#[derive(Debug, Error)]
pub enum SendError {
    #[error("Transient SMTP failure: {0}")]
    Transient(String),
    #[error("Unexpected mail transport error: {0}")]
    Unexpected(String),
}
