//! Processor webhook ingestion.
//!
//! The push-based reconciliation trigger. Once the envelope parses, the
//! endpoint acknowledges receipt no matter what happens internally, so the
//! processor never enters a retry storm over an error only we can fix.

use axum::{
    extract::State,
    http::{HeaderMap, StatusCode},
    response::{IntoResponse, Response},
    Json,
};
use serde_json::json;
use service_core::error::AppError;
use service_core::middleware::REQUEST_ID_HEADER;
use uuid::Uuid;

use crate::error::PaymentError;
use crate::services::mercadopago::WebhookEnvelope;
use crate::AppState;

const SIGNATURE_HEADER: &str = "x-signature";

pub async fn mercadopago_webhook(
    State(state): State<AppState>,
    headers: HeaderMap,
    body: String,
) -> Result<Response, AppError> {
    let envelope: WebhookEnvelope = serde_json::from_str(&body)
        .map_err(|e| AppError::Internal(anyhow::anyhow!("unparseable webhook body: {e}")))?;

    if !envelope.is_payment_event() {
        tracing::debug!(kind = ?envelope.kind, action = ?envelope.action, "ignoring non-payment notification");
        return Ok(ack());
    }

    let Some(payment_id) = envelope.payment_id() else {
        tracing::warn!("payment notification without a payment id");
        return Ok(ack());
    };

    let signature = headers.get(SIGNATURE_HEADER).and_then(|v| v.to_str().ok());
    let request_id = headers.get(REQUEST_ID_HEADER).and_then(|v| v.to_str().ok());
    let verified = match (signature, request_id) {
        (Some(signature), Some(request_id)) => {
            state.webhook_verifier.verify(signature, request_id, &payment_id)
        }
        _ => {
            tracing::warn!("webhook signature headers missing");
            false
        }
    };

    if !verified {
        if state.webhook_verifier.enforce {
            return Err(AppError::Unauthorized(anyhow::anyhow!("invalid webhook signature")));
        }
        // Rollout mode: known-weak policy, kept observable.
        tracing::warn!(payment_id = %payment_id, "webhook signature not verified, processing anyway");
    }

    // The notification only carries the payment id; the processor's own
    // record is the source of truth for status and order binding.
    let payment = match state.gateway.get_payment(&payment_id).await {
        Ok(payment) => payment,
        Err(err) => {
            tracing::error!(payment_id = %payment_id, error = %err, "could not fetch notified payment");
            return Ok(ack());
        }
    };

    let Some(reference) = payment.external_reference.clone() else {
        tracing::warn!(payment_id = %payment_id, "notified payment has no order reference");
        return Ok(ack());
    };

    let order_id = Uuid::parse_str(&reference).map_err(|_| {
        tracing::warn!(payment_id = %payment_id, reference = %reference, "invalid order reference format");
        AppError::BadRequest(anyhow::anyhow!("invalid order reference"))
    })?;

    match state.reconciler.reconcile(order_id, payment.status).await {
        Ok(outcome) if outcome.applied => {
            tracing::info!(
                %order_id,
                payment_status = ?outcome.view.payment_status,
                order_status = ?outcome.view.order_status,
                "webhook reconciled order"
            );
        }
        Ok(_) => {
            tracing::debug!(%order_id, "webhook redelivery, nothing to apply");
        }
        Err(PaymentError::OrderNotFound) => {
            // A webhook referencing an order we do not know (e.g. another
            // environment). Acknowledge so the processor stops retrying.
            tracing::warn!(%order_id, payment_id = %payment_id, "webhook references unknown order");
        }
        Err(err) => {
            tracing::error!(%order_id, error = %err, "webhook reconciliation failed");
        }
    }

    Ok(ack())
}

fn ack() -> Response {
    (StatusCode::OK, Json(json!({ "received": true }))).into_response()
}
