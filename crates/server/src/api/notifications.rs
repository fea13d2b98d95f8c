//! Notification endpoints: publishing email requests and controlling the
//! two consumers.
//!
//! - `/publish` - Queue an email request on the broker
//! - `/consumer/start|stop`, `/consumer/status` - Dispatch consumer lifecycle
//! - `/dlt-consumer/start|stop`, `/dlt-consumer/status` - Dead-letter
//!   consumer lifecycle
//! - `/dlt-consumer/messages` - Recently dead-lettered messages

use crate::AppResources;
use crate::consumer::DeadLetterRecord;
use crate::mail::EmailRequest;
use axum::{Extension, Json, response::IntoResponse};
use hyper::StatusCode;
use serde_json::json;
use utoipa_axum::{router::OpenApiRouter, routes};

/// Tag for OpenAPI documentation.
pub const NOTIFICATIONS_TAG: &str = "Notifications";

/// Creates the notifications API router.
#[tracing::instrument(skip_all)]
pub fn router() -> OpenApiRouter {
    OpenApiRouter::new()
        .routes(routes!(publish))
        .routes(routes!(start_consumer))
        .routes(routes!(stop_consumer))
        .routes(routes!(consumer_status))
        .routes(routes!(start_dlt_consumer))
        .routes(routes!(stop_dlt_consumer))
        .routes(routes!(dlt_consumer_status))
        .routes(routes!(dlt_consumer_messages))
}

#[tracing::instrument(skip(resources, payload), fields(to = %payload.to))]
#[utoipa::path(
    post,
    path = "/publish",
    operation_id = "Publish Email Message",
    tag = NOTIFICATIONS_TAG,
    summary = "Queue an email for asynchronous sending",
    description = "Accepts an email JSON object and publishes it to the broker's email topic for \
                   asynchronous processing by the dispatch consumer.",
    request_body(content = EmailRequest, description = "The email to queue"),
    responses(
        (status = 202, description = "Email queued successfully. The broker-assigned message ID is returned.", content_type = "application/json", example = json!({"messageId": "9b2e58af-6f0e-4c0b-bd01-0ed76aa776f1"})),
        (status = 400, description = "The email request failed validation.", content_type = "application/json"),
        (status = 500, description = "Internal server error while trying to queue the email.", content_type = "application/json")
    )
)]
async fn publish(
    Extension(resources): Extension<AppResources>,
    Json(payload): Json<EmailRequest>,
) -> impl IntoResponse {
    if let Err(e) = payload.validate() {
        return (
            StatusCode::BAD_REQUEST,
            Json(json!({ "error": e.to_string() })),
        );
    }

    match resources.publisher.publish(&payload).await {
        Ok(message_id) => (
            StatusCode::ACCEPTED,
            Json(json!({ "messageId": message_id })),
        ),
        Err(e) => {
            tracing::error!(error = %e, "Failed to publish email message to broker");
            (
                StatusCode::INTERNAL_SERVER_ERROR,
                Json(json!({ "error": "Failed to queue email for sending." })),
            )
        }
    }
}

#[tracing::instrument(skip(resources))]
#[utoipa::path(
    post,
    path = "/consumer/start",
    operation_id = "Start Consumer",
    tag = NOTIFICATIONS_TAG,
    summary = "Starts the email consumer",
    description = "Manually starts the background service that listens for and processes email \
                   messages from the broker subscription. Does nothing if the consumer is already running.",
    responses(
        (status = 200, description = "Provides the status of the start operation.", content_type = "application/json", example = json!({"status": "Consumer started successfully."})),
        (status = 500, description = "The broker rejected the subscription attempt.", content_type = "application/json")
    )
)]
async fn start_consumer(Extension(resources): Extension<AppResources>) -> impl IntoResponse {
    match resources.consumer.start().await {
        Ok(status) => (
            StatusCode::OK,
            Json(json!({ "status": status.describe("Consumer") })),
        ),
        Err(e) => {
            tracing::error!(error = %e, "Failed to start consumer");
            (
                StatusCode::INTERNAL_SERVER_ERROR,
                Json(json!({ "error": e.to_string() })),
            )
        }
    }
}

#[tracing::instrument(skip(resources))]
#[utoipa::path(
    post,
    path = "/consumer/stop",
    operation_id = "Stop Consumer",
    tag = NOTIFICATIONS_TAG,
    summary = "Stops the email consumer",
    description = "Manually stops the background service that listens for email messages, waiting \
                   up to the configured drain timeout for in-flight messages. Does nothing if the \
                   consumer is already stopped.",
    responses(
        (status = 200, description = "Provides the status of the stop operation.", content_type = "application/json", example = json!({"status": "Consumer stopped successfully."}))
    )
)]
async fn stop_consumer(Extension(resources): Extension<AppResources>) -> impl IntoResponse {
    let status = resources.consumer.stop().await;
    (
        StatusCode::OK,
        Json(json!({ "status": status.describe("Consumer") })),
    )
}

#[tracing::instrument(skip(resources))]
#[utoipa::path(
    get,
    path = "/consumer/status",
    operation_id = "Consumer Status",
    tag = NOTIFICATIONS_TAG,
    summary = "Gets the status of the email consumer",
    responses(
        (status = 200, description = "Current status of the consumer.", content_type = "application/json", example = json!({"status": "running"}))
    )
)]
async fn consumer_status(Extension(resources): Extension<AppResources>) -> impl IntoResponse {
    let status = if resources.consumer.is_running() {
        "running"
    } else {
        "stopped"
    };
    (StatusCode::OK, Json(json!({ "status": status })))
}

#[tracing::instrument(skip(resources))]
#[utoipa::path(
    post,
    path = "/dlt-consumer/start",
    operation_id = "Start DLT Consumer",
    tag = NOTIFICATIONS_TAG,
    summary = "Starts the dead-letter email consumer",
    description = "Manually starts the background service that records messages arriving on the \
                   dead-letter subscription.",
    responses(
        (status = 200, description = "Provides the status of the start operation.", content_type = "application/json", example = json!({"status": "DLT Consumer started successfully."})),
        (status = 500, description = "The broker rejected the subscription attempt.", content_type = "application/json")
    )
)]
async fn start_dlt_consumer(Extension(resources): Extension<AppResources>) -> impl IntoResponse {
    match resources.dead_letter_consumer.start().await {
        Ok(status) => (
            StatusCode::OK,
            Json(json!({ "status": status.describe("DLT Consumer") })),
        ),
        Err(e) => {
            tracing::error!(error = %e, "Failed to start DLT consumer");
            (
                StatusCode::INTERNAL_SERVER_ERROR,
                Json(json!({ "error": e.to_string() })),
            )
        }
    }
}

#[tracing::instrument(skip(resources))]
#[utoipa::path(
    post,
    path = "/dlt-consumer/stop",
    operation_id = "Stop DLT Consumer",
    tag = NOTIFICATIONS_TAG,
    summary = "Stops the dead-letter email consumer",
    responses(
        (status = 200, description = "Provides the status of the stop operation.", content_type = "application/json", example = json!({"status": "DLT Consumer stopped successfully."}))
    )
)]
async fn stop_dlt_consumer(Extension(resources): Extension<AppResources>) -> impl IntoResponse {
    let status = resources.dead_letter_consumer.stop().await;
    (
        StatusCode::OK,
        Json(json!({ "status": status.describe("DLT Consumer") })),
    )
}

#[tracing::instrument(skip(resources))]
#[utoipa::path(
    get,
    path = "/dlt-consumer/status",
    operation_id = "DLT Consumer Status",
    tag = NOTIFICATIONS_TAG,
    summary = "Gets the status of the dead-letter email consumer",
    responses(
        (status = 200, description = "Current status of the DLT consumer.", content_type = "application/json", example = json!({"status": "stopped"}))
    )
)]
async fn dlt_consumer_status(Extension(resources): Extension<AppResources>) -> impl IntoResponse {
    let status = if resources.dead_letter_consumer.is_running() {
        "running"
    } else {
        "stopped"
    };
    (StatusCode::OK, Json(json!({ "status": status })))
}

#[tracing::instrument(skip(resources))]
#[utoipa::path(
    get,
    path = "/dlt-consumer/messages",
    operation_id = "List Dead-Letter Messages",
    tag = NOTIFICATIONS_TAG,
    summary = "Lists recently dead-lettered messages",
    description = "Returns the most recent messages recorded by the dead-letter consumer for \
                   manual review, oldest first.",
    responses(
        (status = 200, description = "Recently dead-lettered messages.", body = [DeadLetterRecord], content_type = "application/json")
    )
)]
async fn dlt_consumer_messages(Extension(resources): Extension<AppResources>) -> impl IntoResponse {
    (StatusCode::OK, Json(resources.dead_letters.recent()))
}
