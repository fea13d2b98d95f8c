//! Tests for the in-process broker backend: at-least-once redelivery,
//! attempt counting, dead-letter escalation and flow control.

use bytes::Bytes;
use mail_relay::broker::{BrokerClient, DeadLetterPolicy, InMemoryBroker, SubscribeOptions};
use std::time::Duration;
use tokio::time::timeout;

const TOPIC: &str = "email-requests";
const SUB: &str = "email-requests-sub";
const DLT_TOPIC: &str = "email-requests-dlt";
const DLT_SUB: &str = "email-requests-dlt-sub";

fn broker() -> InMemoryBroker {
    let broker = InMemoryBroker::with_redelivery_delay(Duration::from_millis(10));
    broker.create_topic(TOPIC);
    broker.create_subscription(SUB, TOPIC).unwrap();
    broker
}

async fn broker_with_dead_letter(max_delivery_attempts: u32) -> InMemoryBroker {
    let broker = broker();
    broker.create_topic(DLT_TOPIC);
    broker.create_subscription(DLT_SUB, DLT_TOPIC).unwrap();
    broker
        .apply_dead_letter_policy(
            SUB,
            &DeadLetterPolicy {
                dead_letter_topic: DLT_TOPIC.to_string(),
                max_delivery_attempts,
            },
        )
        .await
        .unwrap();
    broker
}

#[tokio::test]
async fn publish_to_unknown_topic_is_rejected() {
    let broker = broker();
    assert!(broker.publish("missing", Bytes::from_static(b"x")).await.is_err());
}

#[tokio::test]
async fn subscribe_to_unknown_subscription_is_rejected() {
    let broker = broker();
    assert!(
        broker
            .subscribe("missing", SubscribeOptions::default())
            .await
            .is_err()
    );
}

#[tokio::test]
async fn published_message_reaches_subscriber() {
    let broker = broker();
    let id = broker
        .publish(TOPIC, Bytes::from_static(b"hello"))
        .await
        .unwrap();

    let mut stream = broker
        .subscribe(SUB, SubscribeOptions::default())
        .await
        .unwrap();
    let delivery = stream.next().await;
    assert_eq!(delivery.message().id, id);
    assert_eq!(delivery.message().payload.as_ref(), b"hello");
    assert_eq!(delivery.message().delivery_attempt, 1);
    delivery.ack();
    assert_eq!(broker.backlog(SUB), 0);
}

#[tokio::test]
async fn ack_removes_the_message() {
    let broker = broker();
    broker.publish(TOPIC, Bytes::from_static(b"once")).await.unwrap();

    let mut stream = broker
        .subscribe(SUB, SubscribeOptions::default())
        .await
        .unwrap();
    stream.next().await.ack();

    assert!(
        timeout(Duration::from_millis(50), stream.next()).await.is_err(),
        "acked message must not be redelivered"
    );
}

#[tokio::test]
async fn nack_redelivers_with_incremented_attempt() {
    let broker = broker();
    let id = broker
        .publish(TOPIC, Bytes::from_static(b"retry"))
        .await
        .unwrap();

    let mut stream = broker
        .subscribe(SUB, SubscribeOptions::default())
        .await
        .unwrap();
    let delivery = stream.next().await;
    assert_eq!(delivery.message().delivery_attempt, 1);
    delivery.nack();

    let delivery = stream.next().await;
    assert_eq!(delivery.message().id, id);
    assert_eq!(delivery.message().delivery_attempt, 2);
}

#[tokio::test]
async fn dropped_delivery_is_redelivered() {
    let broker = broker();
    broker.publish(TOPIC, Bytes::from_static(b"dropped")).await.unwrap();

    let mut stream = broker
        .subscribe(SUB, SubscribeOptions::default())
        .await
        .unwrap();
    let delivery = stream.next().await;
    drop(delivery);

    let delivery = stream.next().await;
    assert_eq!(delivery.message().delivery_attempt, 2);
}

#[tokio::test]
async fn escalates_to_dead_letter_topic_after_attempt_limit() {
    let broker = broker_with_dead_letter(3).await;
    let id = broker
        .publish(TOPIC, Bytes::from_static(b"poison"))
        .await
        .unwrap();

    let mut stream = broker
        .subscribe(SUB, SubscribeOptions::default())
        .await
        .unwrap();
    for _ in 0..3 {
        stream.next().await.nack();
    }

    // The third nack exhausted the policy; the message moves streams.
    let mut dlt_stream = broker
        .subscribe(DLT_SUB, SubscribeOptions::default())
        .await
        .unwrap();
    let delivery = dlt_stream.next().await;
    assert_eq!(delivery.message().id, id);
    assert_eq!(delivery.message().delivery_attempt, 1);
    delivery.ack();

    assert_eq!(broker.backlog(SUB), 0);
    assert!(
        timeout(Duration::from_millis(50), stream.next()).await.is_err(),
        "escalated message must leave the primary subscription"
    );
}

#[tokio::test]
async fn without_policy_message_keeps_cycling() {
    let broker = broker();
    broker.publish(TOPIC, Bytes::from_static(b"cycle")).await.unwrap();

    let mut stream = broker
        .subscribe(SUB, SubscribeOptions::default())
        .await
        .unwrap();
    for attempt in 1..=5 {
        let delivery = stream.next().await;
        assert_eq!(delivery.message().delivery_attempt, attempt);
        delivery.nack();
    }
}

#[tokio::test]
async fn flow_control_caps_outstanding_deliveries() {
    let broker = broker();
    broker.publish(TOPIC, Bytes::from_static(b"first")).await.unwrap();
    broker.publish(TOPIC, Bytes::from_static(b"second")).await.unwrap();

    let mut stream = broker
        .subscribe(
            SUB,
            SubscribeOptions {
                max_outstanding_messages: Some(1),
            },
        )
        .await
        .unwrap();

    let first = stream.next().await;
    assert!(
        timeout(Duration::from_millis(50), stream.next()).await.is_err(),
        "second delivery must wait for the first to resolve"
    );

    first.ack();
    let second = stream.next().await;
    assert_eq!(second.message().payload.as_ref(), b"second");
}

#[tokio::test]
async fn topic_fans_out_to_all_subscriptions() {
    let broker = broker();
    broker.create_subscription("audit-sub", TOPIC).unwrap();
    let id = broker
        .publish(TOPIC, Bytes::from_static(b"fan-out"))
        .await
        .unwrap();

    for sub in [SUB, "audit-sub"] {
        let mut stream = broker
            .subscribe(sub, SubscribeOptions::default())
            .await
            .unwrap();
        let delivery = stream.next().await;
        assert_eq!(delivery.message().id, id);
        delivery.ack();
    }
}

#[tokio::test]
async fn dead_letter_policy_requires_existing_topic() {
    let broker = broker();
    let result = broker
        .apply_dead_letter_policy(
            SUB,
            &DeadLetterPolicy {
                dead_letter_topic: "missing-dlt".to_string(),
                max_delivery_attempts: 5,
            },
        )
        .await;
    assert!(result.is_err());
}
