use anyhow::Result;
use dotenvy::dotenv;
use secrecy::Secret;
use serde::Deserialize;
use std::env;

#[derive(Deserialize, Clone, Debug)]
pub struct Config {
    pub server: ServerConfig,
    pub database: DatabaseConfig,
    pub mercadopago: MercadoPagoConfig,
    pub store: StoreConfig,
    pub service_name: String,
}

#[derive(Deserialize, Clone, Debug)]
pub struct ServerConfig {
    pub host: String,
    pub port: u16,
}

#[derive(Deserialize, Clone, Debug)]
pub struct DatabaseConfig {
    pub url: Secret<String>,
    pub db_name: String,
}

#[derive(Deserialize, Clone, Debug)]
pub struct MercadoPagoConfig {
    pub access_token: Secret<String>,
    /// Shared secret for webhook signature verification.
    pub webhook_secret: Secret<String>,
    pub api_base_url: String,
    /// When true, webhooks with a missing or invalid signature are rejected
    /// with 401 and never reach the reconciler. When false (rollout mode) a
    /// mismatch is logged and processing continues.
    pub enforce_webhook_signatures: bool,
}

/// Storefront identity used when building payment intents.
#[derive(Deserialize, Clone, Debug)]
pub struct StoreConfig {
    pub name: String,
    /// Fallback payer email for guests who did not leave one.
    pub fallback_payer_email: String,
    /// Card statement descriptor shown on the payer's invoice.
    pub statement_descriptor: String,
}

impl Config {
    pub fn from_env() -> Result<Self> {
        dotenv().ok();

        let host = env::var("CHECKOUT_HOST").unwrap_or_else(|_| "0.0.0.0".to_string());
        let port = env::var("CHECKOUT_PORT").unwrap_or_else(|_| "3004".to_string()).parse()?;

        let db_url = env::var("CHECKOUT_DATABASE_URL").expect("CHECKOUT_DATABASE_URL must be set");
        let db_name = env::var("CHECKOUT_DATABASE_NAME").unwrap_or_else(|_| "checkout_db".to_string());

        let access_token =
            env::var("MERCADOPAGO_ACCESS_TOKEN").expect("MERCADOPAGO_ACCESS_TOKEN must be set");
        let webhook_secret = env::var("MERCADOPAGO_WEBHOOK_SECRET").unwrap_or_else(|_| access_token.clone());
        let api_base_url = env::var("MERCADOPAGO_API_BASE_URL")
            .unwrap_or_else(|_| "https://api.mercadopago.com".to_string());
        let enforce_webhook_signatures = env::var("MERCADOPAGO_ENFORCE_WEBHOOK_SIGNATURES")
            .map(|v| v.parse().unwrap_or(true))
            .unwrap_or(true);

        let store_name = env::var("STORE_NAME").unwrap_or_else(|_| "Doce Sabor".to_string());
        let fallback_payer_email = env::var("STORE_FALLBACK_PAYER_EMAIL")
            .unwrap_or_else(|_| "cliente@docesabor.com.br".to_string());
        let statement_descriptor =
            env::var("STORE_STATEMENT_DESCRIPTOR").unwrap_or_else(|_| "DOCESABOR".to_string());

        Ok(Self {
            server: ServerConfig { host, port },
            database: DatabaseConfig { url: Secret::new(db_url), db_name },
            mercadopago: MercadoPagoConfig {
                access_token: Secret::new(access_token),
                webhook_secret: Secret::new(webhook_secret),
                api_base_url,
                enforce_webhook_signatures,
            },
            store: StoreConfig { name: store_name, fallback_payer_email, statement_descriptor },
            service_name: "checkout-service".to_string(),
        })
    }
}
