//! Outbound mail: the request value type, the transport collaborators and
//! their `lettre`-backed SMTP implementations.

use crate::error::SendError;
use async_trait::async_trait;
use lettre::message::Mailbox;
use lettre::message::header::ContentType;
use lettre::{AsyncSmtpTransport, AsyncTransport, Message, Tokio1Executor};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use thiserror::Error;
use utoipa::ToSchema;

/// An email to be sent. Immutable once constructed; validated before
/// publish.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
pub struct EmailRequest {
    /// Recipient address.
    #[schema(example = "recipient@example.com")]
    pub to: String,
    #[schema(example = "Hello from the application!")]
    pub subject: String,
    #[schema(example = "This is the body of the email.")]
    pub body: String,
}

#[derive(Debug, Error)]
pub enum ValidationError {
    #[error("Recipient must be a valid email address")]
    InvalidRecipient,
    #[error("Email subject cannot be empty")]
    EmptySubject,
    #[error("Email body cannot be empty")]
    EmptyBody,
}

impl EmailRequest {
    pub fn validate(&self) -> Result<(), ValidationError> {
        if self.to.parse::<lettre::Address>().is_err() {
            return Err(ValidationError::InvalidRecipient);
        }
        if self.subject.is_empty() {
            return Err(ValidationError::EmptySubject);
        }
        if self.body.is_empty() {
            return Err(ValidationError::EmptyBody);
        }
        Ok(())
    }
}

/// Attempts delivery of one email request.
#[async_trait]
pub trait MailSender: Send + Sync {
    async fn send(&self, request: &EmailRequest) -> Result<(), SendError>;
}

/// Binary health signal for the mail-sending dependency.
///
/// Implementations must fail closed: any internal error reports unhealthy
/// rather than propagating. The signal is recomputed on every call and
/// never cached.
#[async_trait]
pub trait MailHealth: Send + Sync {
    async fn is_healthy(&self) -> bool;
}

/// SMTP sender backed by a pooled `lettre` transport.
pub struct SmtpMailer {
    transport: Arc<AsyncSmtpTransport<Tokio1Executor>>,
    from: Mailbox,
}

impl SmtpMailer {
    pub fn new(transport: Arc<AsyncSmtpTransport<Tokio1Executor>>, from: Mailbox) -> Self {
        Self { transport, from }
    }
}

#[async_trait]
impl MailSender for SmtpMailer {
    #[tracing::instrument(skip(self, request), fields(to = %request.to))]
    async fn send(&self, request: &EmailRequest) -> Result<(), SendError> {
        let to: Mailbox = request
            .to
            .parse()
            .map_err(|e| SendError::Unexpected(format!("invalid recipient address: {e}")))?;

        let message = Message::builder()
            .from(self.from.clone())
            .to(to)
            .subject(request.subject.clone())
            .header(ContentType::TEXT_PLAIN)
            .body(request.body.clone())
            .map_err(|e| SendError::Unexpected(format!("failed to build message: {e}")))?;

        match self.transport.send(message).await {
            Ok(_) => {
                tracing::info!(to = %request.to, "Successfully sent email");
                Ok(())
            }
            Err(e) if e.is_permanent() => {
                tracing::error!(to = %request.to, error = %e, "Permanent SMTP rejection");
                Err(SendError::Unexpected(e.to_string()))
            }
            Err(e) => {
                tracing::warn!(to = %request.to, error = %e, "Transient SMTP failure");
                Err(SendError::Transient(e.to_string()))
            }
        }
    }
}

/// Health oracle probing the SMTP server with a pooled connection check.
pub struct SmtpHealthCheck {
    transport: Arc<AsyncSmtpTransport<Tokio1Executor>>,
}

impl SmtpHealthCheck {
    pub fn new(transport: Arc<AsyncSmtpTransport<Tokio1Executor>>) -> Self {
        Self { transport }
    }
}

#[async_trait]
impl MailHealth for SmtpHealthCheck {
    async fn is_healthy(&self) -> bool {
        match self.transport.test_connection().await {
            Ok(healthy) => healthy,
            Err(e) => {
                // Fail closed: an error probing health counts as down.
                tracing::warn!(error = %e, "Error probing mail server health, assuming down");
                false
            }
        }
    }
}
