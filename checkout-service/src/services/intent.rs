//! Payment intent builder.
//!
//! Turns a client-submitted payment request into a processor-ready intent,
//! rejecting anything that would let a client dictate a price or replay a
//! stale request, then creates the payment and persists its identity on
//! the order.

use std::sync::Arc;

use chrono::{Duration, Utc};
use uuid::Uuid;

use crate::config::StoreConfig;
use crate::dtos::{CardPaymentRequest, CardPaymentResponse, PixPaymentRequest, PixPaymentResponse};
use crate::error::PaymentError;
use crate::models::{Order, PaymentMethod, PaymentStatus};
use crate::services::mercadopago::{Identification, NewPayment, Payer, PaymentGateway};
use crate::services::reconciler::map_processor_status;
use crate::services::store::{OrderStore, OrderUpdate};

/// Currency epsilon for the client-amount tamper check.
const AMOUNT_EPSILON: f64 = 0.01;
/// Sanity ceiling for a single order.
const MAX_AMOUNT: f64 = 100_000.0;
/// PIX QR codes expire after this many minutes.
const PIX_EXPIRATION_MINUTES: i64 = 30;
/// The description is rendered by the processor's own UI; cap it.
const DESCRIPTION_MAX_CHARS: usize = 200;

#[derive(Clone)]
pub struct PaymentIntentBuilder {
    store: Arc<dyn OrderStore>,
    gateway: Arc<dyn PaymentGateway>,
    identity: StoreConfig,
}

impl PaymentIntentBuilder {
    pub fn new(
        store: Arc<dyn OrderStore>,
        gateway: Arc<dyn PaymentGateway>,
        identity: StoreConfig,
    ) -> Self {
        Self { store, gateway, identity }
    }

    /// Creates a PIX payment for the order and persists the QR payload.
    pub async fn create_pix_payment(
        &self,
        req: PixPaymentRequest,
    ) -> Result<PixPaymentResponse, PaymentError> {
        let order = self.load_payable_order(req.order_id, req.amount).await?;

        let expiration = Utc::now() + Duration::minutes(PIX_EXPIRATION_MINUTES);
        let intent = NewPayment {
            transaction_amount: req.amount,
            description: self.sanitize_description(req.description.as_deref()),
            payment_method_id: "pix".to_string(),
            payer: Payer {
                email: req
                    .payer_email
                    .unwrap_or_else(|| self.identity.fallback_payer_email.clone()),
                first_name: req.payer_name.unwrap_or_else(|| "Cliente".to_string()),
                last_name: None,
                identification: None,
            },
            token: None,
            installments: None,
            date_of_expiration: Some(expiration.to_rfc3339()),
            external_reference: order.id.to_string(),
            statement_descriptor: None,
        };

        // Idempotency key = order id: retries of an abandoned QR never
        // create a second processor charge.
        let payment = self.gateway.create_payment(&intent, &order.id.to_string()).await?;

        let pix = payment
            .point_of_interaction
            .as_ref()
            .and_then(|poi| poi.transaction_data.as_ref())
            .ok_or_else(|| {
                PaymentError::Gateway("processor did not return PIX data".to_string())
            })?;
        let qr_code = pix.qr_code.clone().ok_or_else(|| {
            PaymentError::Gateway("processor did not return a PIX QR payload".to_string())
        })?;

        self.persist_payment(
            order.id,
            OrderUpdate {
                payment_id: Some(payment.id.to_string()),
                payment_status: Some(PaymentStatus::AwaitingPayment),
                pix_qr_code: Some(qr_code.clone()),
                pix_qr_code_base64: pix.qr_code_base64.clone(),
                pix_expiration: Some(mongodb::bson::DateTime::from_chrono(expiration)),
                ..Default::default()
            },
        )
        .await;

        Ok(PixPaymentResponse {
            payment_id: payment.id.to_string(),
            qr_code,
            qr_code_base64: pix.qr_code_base64.clone(),
            expires_at: expiration.to_rfc3339(),
            payment_status: PaymentStatus::AwaitingPayment,
        })
    }

    /// Charges a tokenized card and applies the synchronous decision
    /// through the reconciliation mapping.
    pub async fn create_card_payment(
        &self,
        req: CardPaymentRequest,
    ) -> Result<CardPaymentResponse, PaymentError> {
        let document = normalize_document(&req.payer_document)?;
        let order = self.load_payable_order(req.order_id, req.amount).await?;

        let (first_name, last_name) = split_payer_name(&req.payer_name);
        let intent = NewPayment {
            transaction_amount: req.amount,
            description: self.sanitize_description(req.description.as_deref()),
            payment_method_id: req.payment_method_id.clone(),
            payer: Payer {
                email: req.payer_email.clone(),
                first_name,
                last_name: Some(last_name),
                identification: Some(Identification {
                    kind: req.payer_document_type.clone().unwrap_or_else(|| "CPF".to_string()),
                    number: document,
                }),
            },
            token: Some(req.token.clone()),
            installments: Some(req.installments.unwrap_or(1)),
            date_of_expiration: None,
            external_reference: order.id.to_string(),
            statement_descriptor: Some(self.identity.statement_descriptor.clone()),
        };

        // Method suffix keeps card retries from colliding with an earlier
        // abandoned PIX attempt on the same order.
        let idempotency_key = format!("{}-card", order.id);
        let payment = self.gateway.create_payment(&intent, &idempotency_key).await?;

        let (payment_status, order_status) =
            map_processor_status(payment.status, PaymentMethod::Card)
                .unwrap_or((order.payment_status, order.status));

        self.persist_payment(
            order.id,
            OrderUpdate {
                payment_id: Some(payment.id.to_string()),
                payment_method: Some(PaymentMethod::Card),
                payment_status: Some(payment_status),
                status: Some(order_status),
                ..Default::default()
            },
        )
        .await;

        Ok(CardPaymentResponse {
            payment_id: payment.id.to_string(),
            status: payment.status,
            status_detail: payment.status_detail,
            payment_status,
            order_status,
        })
    }

    /// Shared entry validation: amount sanity, order existence, the paid
    /// guard, and the amount-tamper check. All of it happens before any
    /// processor call.
    async fn load_payable_order(&self, order_id: Uuid, amount: f64) -> Result<Order, PaymentError> {
        if !amount.is_finite() || amount <= 0.0 || amount > MAX_AMOUNT {
            return Err(PaymentError::InvalidAmount);
        }

        let order = self
            .store
            .get(order_id)
            .await
            .map_err(PaymentError::Store)?
            .ok_or(PaymentError::OrderNotFound)?;

        if order.payment_status == PaymentStatus::Paid {
            tracing::warn!(%order_id, fraud_signal = true, "payment attempt on an already-paid order");
            return Err(PaymentError::AlreadyPaid);
        }

        if (order.total - amount).abs() > AMOUNT_EPSILON {
            tracing::warn!(
                %order_id,
                order_total = order.total,
                requested = amount,
                fraud_signal = true,
                "requested amount does not match the order total"
            );
            return Err(PaymentError::AmountMismatch);
        }

        Ok(order)
    }

    /// Persists the payment binding on the order. The processor call has
    /// already succeeded, so a persist failure is retried once and then
    /// logged: the next webhook or poll cycle re-binds the order through
    /// `external_reference`, and the stable idempotency key guarantees no
    /// second charge on retry.
    async fn persist_payment(&self, order_id: Uuid, update: OrderUpdate) {
        match self.store.update(order_id, update.clone()).await {
            Ok(true) => {}
            Ok(false) => {
                tracing::error!(%order_id, "order vanished while persisting payment binding");
            }
            Err(first) => {
                tracing::warn!(%order_id, error = %first, "persisting payment failed, retrying");
                if let Err(second) = self.store.update(order_id, update).await {
                    tracing::error!(
                        %order_id,
                        error = %second,
                        "payment persisted on processor only; webhook reconciliation will self-heal"
                    );
                }
            }
        }
    }

    fn sanitize_description(&self, raw: Option<&str>) -> String {
        sanitize_description(raw, &self.identity.name)
    }
}

/// Strips markup-significant characters from the attacker-influenced
/// description and caps its length before it reaches the processor's UI.
fn sanitize_description(raw: Option<&str>, store_name: &str) -> String {
    let default = format!("Pedido {store_name}");
    let raw = match raw {
        Some(text) if !text.trim().is_empty() => text,
        _ => &default,
    };
    raw.chars()
        .filter(|c| !matches!(c, '<' | '>' | '"' | '\'' | '&'))
        .take(DESCRIPTION_MAX_CHARS)
        .collect()
}

/// Strips punctuation from a Brazilian CPF and requires exactly 11 digits.
fn normalize_document(raw: &str) -> Result<String, PaymentError> {
    let digits: String = raw.chars().filter(|c| c.is_ascii_digit()).collect();
    if digits.len() != 11 {
        return Err(PaymentError::InvalidDocument);
    }
    Ok(digits)
}

fn split_payer_name(full: &str) -> (String, String) {
    let mut parts = full.split_whitespace();
    let first = parts.next().unwrap_or("Cliente").to_string();
    let rest: Vec<&str> = parts.collect();
    let last = if rest.is_empty() { "Sobrenome".to_string() } else { rest.join(" ") };
    (first, last)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn document_normalization() {
        assert_eq!(normalize_document("529.982.247-25").unwrap(), "52998224725");
        assert_eq!(normalize_document("52998224725").unwrap(), "52998224725");
        assert!(matches!(normalize_document("1234567890"), Err(PaymentError::InvalidDocument)));
        assert!(matches!(normalize_document("not-a-cpf"), Err(PaymentError::InvalidDocument)));
    }

    #[test]
    fn payer_name_splitting() {
        assert_eq!(
            split_payer_name("Maria da Silva"),
            ("Maria".to_string(), "da Silva".to_string())
        );
        assert_eq!(split_payer_name("Madonna"), ("Madonna".to_string(), "Sobrenome".to_string()));
        assert_eq!(split_payer_name(""), ("Cliente".to_string(), "Sobrenome".to_string()));
    }

    #[test]
    fn description_is_sanitized_and_capped() {
        assert_eq!(sanitize_description(Some("Bolo <script>&'\"x"), "Doce Sabor"), "Bolo scriptx");
        assert_eq!(sanitize_description(None, "Doce Sabor"), "Pedido Doce Sabor");
        assert_eq!(sanitize_description(Some("   "), "Doce Sabor"), "Pedido Doce Sabor");
        let long = "a".repeat(500);
        assert_eq!(
            sanitize_description(Some(&long), "Doce Sabor").chars().count(),
            DESCRIPTION_MAX_CHARS
        );
    }
}
