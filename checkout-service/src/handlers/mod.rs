//! HTTP handlers for the checkout service.

pub mod orders;
pub mod payments;
pub mod webhook;

use axum::{http::StatusCode, response::IntoResponse, Json};
use serde_json::json;

pub async fn health_check() -> impl IntoResponse {
    (StatusCode::OK, Json(json!({ "status": "ok", "service": "checkout-service" })))
}
