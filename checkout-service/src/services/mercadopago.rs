//! Mercado Pago payment gateway client and webhook verification.
//!
//! Implements the v1 payments API for creating PIX and card payments and
//! fetching a payment's current status, plus HMAC verification of the
//! processor's webhook notifications.

use async_trait::async_trait;
use hmac::{Hmac, Mac};
use reqwest::{Client, StatusCode};
use secrecy::{ExposeSecret, Secret};
use serde::{Deserialize, Serialize};
use sha2::Sha256;
use subtle::ConstantTimeEq;
use thiserror::Error;

use crate::config::MercadoPagoConfig;

type HmacSha256 = Hmac<Sha256>;

/// Processor-reported payment status vocabulary.
#[derive(Debug, Serialize, Deserialize, Clone, Copy, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum ProcessorStatus {
    Approved,
    Pending,
    InProcess,
    Rejected,
    Cancelled,
    Refunded,
    ChargedBack,
    /// Anything the processor adds later; reconciled as a no-op.
    #[serde(other)]
    Unknown,
}

#[derive(Debug, Serialize, Clone)]
pub struct Payer {
    pub email: String,
    pub first_name: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub last_name: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub identification: Option<Identification>,
}

#[derive(Debug, Serialize, Clone)]
pub struct Identification {
    #[serde(rename = "type")]
    pub kind: String,
    pub number: String,
}

/// Request body for creating a payment. PIX payments carry an expiration
/// and no token; card payments carry the tokenized card and installments.
#[derive(Debug, Serialize, Clone)]
pub struct NewPayment {
    pub transaction_amount: f64,
    pub description: String,
    pub payment_method_id: String,
    pub payer: Payer,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub token: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub installments: Option<u32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub date_of_expiration: Option<String>,
    /// Binds the processor payment back to the order id; the webhook path
    /// relies on this to recover from a failed local persist.
    pub external_reference: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub statement_descriptor: Option<String>,
}

#[derive(Debug, Deserialize, Clone)]
pub struct PixTransactionData {
    pub qr_code: Option<String>,
    pub qr_code_base64: Option<String>,
}

#[derive(Debug, Deserialize, Clone)]
pub struct PointOfInteraction {
    pub transaction_data: Option<PixTransactionData>,
}

/// A payment resource as returned by the processor.
#[derive(Debug, Deserialize, Clone)]
pub struct Payment {
    pub id: u64,
    pub status: ProcessorStatus,
    pub status_detail: Option<String>,
    pub external_reference: Option<String>,
    pub point_of_interaction: Option<PointOfInteraction>,
}

#[derive(Debug, Deserialize)]
struct ApiErrorBody {
    message: Option<String>,
    #[serde(default)]
    cause: Vec<ApiErrorCause>,
}

#[derive(Debug, Deserialize)]
struct ApiErrorCause {
    description: Option<String>,
}

#[derive(Debug, Error)]
pub enum GatewayError {
    #[error("http error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("processor rejected the request ({status}): {detail}")]
    Api { status: StatusCode, detail: String },

    #[error("malformed processor response: {0}")]
    InvalidResponse(String),
}

/// The payment processor surface the core consumes: create a pending
/// payment, fetch a payment by id.
#[async_trait]
pub trait PaymentGateway: Send + Sync {
    async fn create_payment(
        &self,
        payment: &NewPayment,
        idempotency_key: &str,
    ) -> Result<Payment, GatewayError>;

    async fn get_payment(&self, payment_id: &str) -> Result<Payment, GatewayError>;
}

#[derive(Clone)]
pub struct MercadoPagoClient {
    http: Client,
    access_token: Secret<String>,
    base_url: String,
}

impl MercadoPagoClient {
    pub fn new(config: &MercadoPagoConfig) -> Self {
        Self {
            http: Client::new(),
            access_token: config.access_token.clone(),
            base_url: config.api_base_url.trim_end_matches('/').to_string(),
        }
    }

    fn error_detail(body: &str) -> String {
        match serde_json::from_str::<ApiErrorBody>(body) {
            Ok(parsed) => parsed
                .message
                .or_else(|| parsed.cause.into_iter().find_map(|c| c.description))
                .unwrap_or_else(|| "unknown processor error".to_string()),
            Err(_) => "unknown processor error".to_string(),
        }
    }
}

#[async_trait]
impl PaymentGateway for MercadoPagoClient {
    async fn create_payment(
        &self,
        payment: &NewPayment,
        idempotency_key: &str,
    ) -> Result<Payment, GatewayError> {
        let url = format!("{}/v1/payments", self.base_url);

        let response = self
            .http
            .post(&url)
            .bearer_auth(self.access_token.expose_secret())
            .header("X-Idempotency-Key", idempotency_key)
            .json(payment)
            .send()
            .await?;

        let status = response.status();
        let body = response.text().await?;
        tracing::debug!(status = %status, "payment creation response");

        if status.is_success() {
            let payment: Payment = serde_json::from_str(&body)
                .map_err(|e| GatewayError::InvalidResponse(e.to_string()))?;
            tracing::info!(
                payment_id = payment.id,
                status = ?payment.status,
                external_reference = ?payment.external_reference,
                "processor payment created"
            );
            Ok(payment)
        } else {
            let detail = Self::error_detail(&body);
            tracing::error!(status = %status, detail = %detail, "payment creation failed");
            Err(GatewayError::Api { status, detail })
        }
    }

    async fn get_payment(&self, payment_id: &str) -> Result<Payment, GatewayError> {
        let url = format!("{}/v1/payments/{}", self.base_url, payment_id);

        let response = self
            .http
            .get(&url)
            .bearer_auth(self.access_token.expose_secret())
            .send()
            .await?;

        let status = response.status();
        let body = response.text().await?;

        if status.is_success() {
            serde_json::from_str(&body).map_err(|e| GatewayError::InvalidResponse(e.to_string()))
        } else {
            let detail = Self::error_detail(&body);
            Err(GatewayError::Api { status, detail })
        }
    }
}

/// Notification envelope posted by the processor to the webhook endpoint.
#[derive(Debug, Deserialize)]
pub struct WebhookEnvelope {
    #[serde(rename = "type")]
    pub kind: Option<String>,
    pub action: Option<String>,
    pub data: Option<WebhookData>,
}

#[derive(Debug, Deserialize)]
pub struct WebhookData {
    pub id: Option<serde_json::Value>,
}

impl WebhookEnvelope {
    /// Only payment notifications trigger reconciliation; everything else
    /// is acknowledged and ignored.
    pub fn is_payment_event(&self) -> bool {
        self.kind.as_deref() == Some("payment")
            || matches!(self.action.as_deref(), Some("payment.updated") | Some("payment.created"))
    }

    /// The notified payment id, normalised to a string (the processor sends
    /// it as a number or a string depending on the channel).
    pub fn payment_id(&self) -> Option<String> {
        match self.data.as_ref()?.id.as_ref()? {
            serde_json::Value::String(s) if !s.is_empty() => Some(s.clone()),
            serde_json::Value::Number(n) => Some(n.to_string()),
            _ => None,
        }
    }
}

/// Verifies the `x-signature` header of inbound webhooks.
///
/// The header carries `ts=<unix-seconds>,v1=<hex-hmac>`; the HMAC-SHA256 is
/// computed over the manifest `id:<dataId>;request-id:<requestId>;ts:<ts>;`
/// with the processor's shared secret.
#[derive(Clone)]
pub struct WebhookVerifier {
    secret: Secret<String>,
    pub enforce: bool,
}

impl WebhookVerifier {
    pub fn new(config: &MercadoPagoConfig) -> Self {
        Self { secret: config.webhook_secret.clone(), enforce: config.enforce_webhook_signatures }
    }

    pub fn verify(&self, signature_header: &str, request_id: &str, data_id: &str) -> bool {
        let Some((ts, v1)) = parse_signature_header(signature_header) else {
            tracing::warn!("malformed x-signature header");
            return false;
        };

        let manifest = format!("id:{data_id};request-id:{request_id};ts:{ts};");
        let Ok(mut mac) = HmacSha256::new_from_slice(self.secret.expose_secret().as_bytes()) else {
            return false;
        };
        mac.update(manifest.as_bytes());
        let expected = hex::encode(mac.finalize().into_bytes());

        let expected = expected.as_bytes();
        let provided = v1.as_bytes();
        if expected.len() != provided.len() {
            return false;
        }
        expected.ct_eq(provided).into()
    }
}

/// Parses `ts` and `v1` out of a comma-separated `key=value` header.
pub fn parse_signature_header(header: &str) -> Option<(String, String)> {
    let mut ts = None;
    let mut v1 = None;
    for part in header.split(',') {
        let mut kv = part.splitn(2, '=');
        let key = kv.next()?.trim();
        let value = kv.next()?.trim();
        match key {
            "ts" => ts = Some(value.to_string()),
            "v1" => v1 = Some(value.to_string()),
            _ => {}
        }
    }
    Some((ts?, v1?))
}
