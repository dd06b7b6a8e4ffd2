use service_core::error::AppError;
use thiserror::Error;

use crate::services::mercadopago::GatewayError;

/// Domain errors raised by the payment intent builder and the reconciler.
///
/// `AlreadyPaid` and `AmountMismatch` indicate a stale client or a tampering
/// attempt; call sites log them at `warn` with a `fraud_signal` marker so
/// they can be monitored separately from plain validation failures.
#[derive(Debug, Error)]
pub enum PaymentError {
    #[error("order not found")]
    OrderNotFound,

    #[error("this order was already paid")]
    AlreadyPaid,

    #[error("amount does not match the order total")]
    AmountMismatch,

    #[error("invalid amount")]
    InvalidAmount,

    #[error("invalid payer document")]
    InvalidDocument,

    #[error("payment could not be processed: {0}")]
    Gateway(String),

    #[error("order store failure: {0}")]
    Store(#[source] anyhow::Error),
}

impl From<GatewayError> for PaymentError {
    fn from(err: GatewayError) -> Self {
        match err {
            // `detail` is the processor's own status_detail / cause text,
            // which carries no PII and helps the payer fix a declined card.
            GatewayError::Api { detail, .. } => PaymentError::Gateway(detail),
            GatewayError::Http(err) => {
                tracing::error!(error = %err, "payment processor unreachable");
                PaymentError::Gateway("payment processor unavailable".to_string())
            }
            GatewayError::InvalidResponse(msg) => {
                tracing::error!(detail = %msg, "malformed payment processor response");
                PaymentError::Gateway("unexpected payment processor response".to_string())
            }
        }
    }
}

impl From<PaymentError> for AppError {
    fn from(err: PaymentError) -> Self {
        match err {
            PaymentError::OrderNotFound => AppError::NotFound(anyhow::anyhow!("order not found")),
            PaymentError::AlreadyPaid => {
                AppError::Conflict(anyhow::anyhow!("this order was already paid"))
            }
            PaymentError::AmountMismatch => {
                AppError::Conflict(anyhow::anyhow!("amount does not match the order total"))
            }
            PaymentError::InvalidAmount => AppError::BadRequest(anyhow::anyhow!("invalid amount")),
            PaymentError::InvalidDocument => {
                AppError::BadRequest(anyhow::anyhow!("invalid payer document"))
            }
            PaymentError::Gateway(detail) => AppError::BadGateway(detail),
            PaymentError::Store(err) => AppError::Database(err),
        }
    }
}
