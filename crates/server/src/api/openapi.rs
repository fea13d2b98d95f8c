//! OpenAPI/Utoipa configuration.

use crate::api::{health::MISC_TAG, notifications::NOTIFICATIONS_TAG};
use utoipa::OpenApi;

/// OpenAPI documentation configuration.
#[derive(OpenApi)]
#[openapi(
    info(
        title = "Mail Relay API",
        version = "1.0.0",
        description = "API for queueing outbound emails on a durable message broker and controlling the consumers that process them."
    ),
    tags(
        (name = MISC_TAG, description = "Miscellaneous endpoints"),
        (name = NOTIFICATIONS_TAG, description = "API for sending and processing notifications / emails")
    )
)]
pub struct ApiDoc;
