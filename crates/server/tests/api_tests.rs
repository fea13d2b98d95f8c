//! HTTP contract tests for the notifications API.

use async_trait::async_trait;
use axum::http::StatusCode;
use axum_test::TestServer;
use mail_relay::AppResources;
use mail_relay::api::build_router;
use mail_relay::broker::{BrokerClient, InMemoryBroker};
use mail_relay::config::{AppConfig, BrokerConfig, ConsumerConfig, SmtpConfig};
use mail_relay::consumer::{DeadLetterConsumer, DeadLetterStore, DispatchConsumer};
use mail_relay::error::SendError;
use mail_relay::mail::{EmailRequest, MailHealth, MailSender};
use mail_relay::publisher::MessagePublisher;
use serde_json::{Value, json};
use std::sync::Arc;
use std::time::Duration;

struct AlwaysHealthy;

#[async_trait]
impl MailHealth for AlwaysHealthy {
    async fn is_healthy(&self) -> bool {
        true
    }
}

struct NullMailer;

#[async_trait]
impl MailSender for NullMailer {
    async fn send(&self, _request: &EmailRequest) -> Result<(), SendError> {
        Ok(())
    }
}

fn test_config() -> AppConfig {
    AppConfig {
        smtp: SmtpConfig {
            server: "smtp.example.com".into(),
            port: 587,
            username: "user".into(),
            password: "secret".into(),
            from: "noreply@example.com".into(),
        },
        broker: BrokerConfig {
            email_topic: "email-requests".into(),
            email_subscription: "email-requests-sub".into(),
            dead_letter_topic: Some("email-requests-dlt".into()),
            dead_letter_subscription: "email-requests-dlt-sub".into(),
            max_delivery_attempts: 5,
            max_outstanding_messages: None,
        },
        consumer: ConsumerConfig::default(),
    }
}

fn server() -> TestServer {
    let config = Arc::new(test_config());

    let broker = InMemoryBroker::with_redelivery_delay(Duration::from_millis(10));
    broker.create_topic(&config.broker.email_topic);
    broker
        .create_subscription(&config.broker.email_subscription, &config.broker.email_topic)
        .unwrap();
    let dead_letter_topic = config.broker.dead_letter_topic.clone().unwrap();
    broker.create_topic(&dead_letter_topic);
    broker
        .create_subscription(&config.broker.dead_letter_subscription, &dead_letter_topic)
        .unwrap();
    let client: Arc<dyn BrokerClient> = Arc::new(broker);

    let publisher = Arc::new(MessagePublisher::new(
        client.clone(),
        config.broker.email_topic.clone(),
    ));
    let consumer = Arc::new(DispatchConsumer::new(
        client.clone(),
        Arc::new(NullMailer),
        Arc::new(AlwaysHealthy),
        config.broker.email_subscription.clone(),
        None,
        None,
        Duration::from_secs(5),
    ));
    let dead_letters = Arc::new(DeadLetterStore::default());
    let dead_letter_consumer = Arc::new(DeadLetterConsumer::new(
        client,
        config.broker.dead_letter_subscription.clone(),
        dead_letters.clone(),
        Duration::from_secs(5),
    ));

    let resources = AppResources {
        publisher,
        consumer,
        dead_letter_consumer,
        dead_letters,
        config,
    };

    TestServer::new(build_router(resources)).unwrap()
}

#[tokio::test]
async fn healthz_returns_ok() {
    let server = server();
    let response = server.get("/healthz").await;
    response.assert_status(StatusCode::OK);
    response.assert_text("ok");
}

#[tokio::test]
async fn publish_returns_message_id() {
    let server = server();
    let response = server
        .post("/api/notifications/publish")
        .json(&json!({"to": "a@b.com", "subject": "S", "body": "B"}))
        .await;
    response.assert_status(StatusCode::ACCEPTED);

    let body: Value = response.json();
    assert!(!body["messageId"].as_str().unwrap().is_empty());
}

#[tokio::test]
async fn publish_rejects_invalid_request() {
    let server = server();
    let response = server
        .post("/api/notifications/publish")
        .json(&json!({"to": "not-an-address", "subject": "S", "body": "B"}))
        .await;
    response.assert_status(StatusCode::BAD_REQUEST);

    let response = server
        .post("/api/notifications/publish")
        .json(&json!({"to": "a@b.com", "subject": "", "body": "B"}))
        .await;
    response.assert_status(StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn consumer_lifecycle_over_http() {
    let server = server();

    let response = server.get("/api/notifications/consumer/status").await;
    response.assert_status(StatusCode::OK);
    response.assert_json(&json!({"status": "stopped"}));

    let response = server.post("/api/notifications/consumer/start").await;
    response.assert_status(StatusCode::OK);
    response.assert_json(&json!({"status": "Consumer started successfully."}));

    let response = server.get("/api/notifications/consumer/status").await;
    response.assert_json(&json!({"status": "running"}));

    let response = server.post("/api/notifications/consumer/start").await;
    response.assert_json(&json!({"status": "Consumer is already running."}));

    let response = server.post("/api/notifications/consumer/stop").await;
    response.assert_json(&json!({"status": "Consumer stopped successfully."}));

    let response = server.get("/api/notifications/consumer/status").await;
    response.assert_json(&json!({"status": "stopped"}));

    let response = server.post("/api/notifications/consumer/stop").await;
    response.assert_json(&json!({"status": "Consumer is not running."}));
}

#[tokio::test]
async fn dlt_consumer_lifecycle_over_http() {
    let server = server();

    let response = server.get("/api/notifications/dlt-consumer/status").await;
    response.assert_json(&json!({"status": "stopped"}));

    let response = server.post("/api/notifications/dlt-consumer/start").await;
    response.assert_json(&json!({"status": "DLT Consumer started successfully."}));

    let response = server.get("/api/notifications/dlt-consumer/status").await;
    response.assert_json(&json!({"status": "running"}));

    let response = server.post("/api/notifications/dlt-consumer/stop").await;
    response.assert_json(&json!({"status": "DLT Consumer stopped successfully."}));
}

#[tokio::test]
async fn dlt_messages_start_empty() {
    let server = server();
    let response = server.get("/api/notifications/dlt-consumer/messages").await;
    response.assert_status(StatusCode::OK);
    response.assert_json(&json!([]));
}
