//! A service relaying outbound email requests through a durable message
//! broker.
//!
//! Sending is decoupled from the originating HTTP request: `/publish`
//! enqueues a message, the dispatch consumer delivers it over SMTP when
//! the mail server is healthy, and the broker's redelivery and
//! dead-letter escalation absorb outages. A supervisory health monitor
//! pauses and resumes consumption based on live mail-server health.

use std::sync::Arc;

use crate::config::AppConfig;
use crate::consumer::{DeadLetterConsumer, DeadLetterStore, DispatchConsumer};
use crate::publisher::MessagePublisher;

pub mod api;
pub mod broker;
pub mod config;
pub mod consumer;
pub mod error;
pub mod mail;
pub mod monitor;
pub mod publisher;

/// Shared application state handed to the HTTP layer.
#[derive(Clone)]
pub struct AppResources {
    pub publisher: Arc<MessagePublisher>,
    pub consumer: Arc<DispatchConsumer>,
    pub dead_letter_consumer: Arc<DeadLetterConsumer>,
    pub dead_letters: Arc<DeadLetterStore>,
    pub config: Arc<AppConfig>,
}
