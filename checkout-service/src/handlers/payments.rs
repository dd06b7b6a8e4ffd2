//! Payment creation and status-check endpoints.

use axum::{
    extract::{Path, State},
    http::StatusCode,
    Json,
};
use service_core::error::AppError;
use uuid::Uuid;

use crate::dtos::{CardPaymentRequest, CardPaymentResponse, PixPaymentRequest, PixPaymentResponse};
use crate::services::reconciler::PaymentStatusView;
use crate::AppState;

pub async fn create_pix_payment(
    State(state): State<AppState>,
    Json(payload): Json<PixPaymentRequest>,
) -> Result<(StatusCode, Json<PixPaymentResponse>), AppError> {
    tracing::info!(order_id = %payload.order_id, amount = payload.amount, "creating PIX payment");
    let response = state.intents.create_pix_payment(payload).await?;
    Ok((StatusCode::CREATED, Json(response)))
}

pub async fn create_card_payment(
    State(state): State<AppState>,
    Json(payload): Json<CardPaymentRequest>,
) -> Result<(StatusCode, Json<CardPaymentResponse>), AppError> {
    tracing::info!(
        order_id = %payload.order_id,
        amount = payload.amount,
        installments = payload.installments.unwrap_or(1),
        "creating card payment"
    );
    let response = state.intents.create_card_payment(payload).await?;
    Ok((StatusCode::CREATED, Json(response)))
}

/// Poll target: reconciles against the freshest processor status and
/// returns the status triple, nothing more.
pub async fn payment_status(
    State(state): State<AppState>,
    Path(order_id): Path<Uuid>,
) -> Result<Json<PaymentStatusView>, AppError> {
    let view = state.reconciler.check_status(order_id).await?;
    Ok(Json(view))
}
