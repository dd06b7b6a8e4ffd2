use std::collections::HashMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

use anyhow::Result;
use async_trait::async_trait;
use hmac::{Hmac, Mac};
use secrecy::Secret;
use serde_json::{json, Value};
use sha2::Sha256;
use uuid::Uuid;
use wiremock::MockServer;

use checkout_service::config::{
    Config, DatabaseConfig, MercadoPagoConfig, ServerConfig, StoreConfig,
};
use checkout_service::models::Order;
use checkout_service::services::store::{OrderStore, OrderUpdate};
use checkout_service::services::{MercadoPagoClient, Reconciler};
use checkout_service::{AppState, Application};

pub const WEBHOOK_SECRET: &str = "test-webhook-secret";

/// In-memory order store standing in for MongoDB. Counts `update` calls so
/// tests can assert that redelivered webhooks produce no extra writes.
#[derive(Default)]
pub struct InMemoryOrderStore {
    orders: Mutex<HashMap<Uuid, Order>>,
    update_calls: AtomicUsize,
}

impl InMemoryOrderStore {
    pub fn update_calls(&self) -> usize {
        self.update_calls.load(Ordering::SeqCst)
    }

    pub fn order(&self, id: Uuid) -> Option<Order> {
        self.orders.lock().unwrap().get(&id).cloned()
    }
}

#[async_trait]
impl OrderStore for InMemoryOrderStore {
    async fn insert(&self, order: Order) -> Result<()> {
        self.orders.lock().unwrap().insert(order.id, order);
        Ok(())
    }

    async fn get(&self, id: Uuid) -> Result<Option<Order>> {
        Ok(self.orders.lock().unwrap().get(&id).cloned())
    }

    async fn update(&self, id: Uuid, update: OrderUpdate) -> Result<bool> {
        self.update_calls.fetch_add(1, Ordering::SeqCst);
        let mut orders = self.orders.lock().unwrap();
        let Some(order) = orders.get_mut(&id) else {
            return Ok(false);
        };
        if let Some(payment_id) = update.payment_id {
            order.payment_id = Some(payment_id);
        }
        if let Some(method) = update.payment_method {
            order.payment_method = method;
        }
        if let Some(payment_status) = update.payment_status {
            order.payment_status = payment_status;
        }
        if let Some(status) = update.status {
            order.status = status;
        }
        if let Some(qr) = update.pix_qr_code {
            order.pix_qr_code = Some(qr);
        }
        if let Some(qr64) = update.pix_qr_code_base64 {
            order.pix_qr_code_base64 = Some(qr64);
        }
        if let Some(expiration) = update.pix_expiration {
            order.pix_expiration = Some(expiration);
        }
        order.updated_at = mongodb::bson::DateTime::now();
        Ok(true)
    }
}

pub struct TestApp {
    pub address: String,
    pub store: Arc<InMemoryOrderStore>,
    pub processor: MockServer,
    pub reconciler: Arc<Reconciler>,
    pub client: reqwest::Client,
}

impl TestApp {
    pub async fn spawn() -> Self {
        Self::spawn_with(true).await
    }

    pub async fn spawn_with(enforce_webhook_signatures: bool) -> Self {
        let processor = MockServer::start().await;

        let config = Config {
            server: ServerConfig { host: "127.0.0.1".to_string(), port: 0 },
            database: DatabaseConfig {
                url: Secret::new("mongodb://unused:27017".to_string()),
                db_name: "unused".to_string(),
            },
            mercadopago: MercadoPagoConfig {
                access_token: Secret::new("test-access-token".to_string()),
                webhook_secret: Secret::new(WEBHOOK_SECRET.to_string()),
                api_base_url: processor.uri(),
                enforce_webhook_signatures,
            },
            store: StoreConfig {
                name: "Doce Sabor".to_string(),
                fallback_payer_email: "cliente@docesabor.com.br".to_string(),
                statement_descriptor: "DOCESABOR".to_string(),
            },
            service_name: "checkout-service-test".to_string(),
        };

        let store = Arc::new(InMemoryOrderStore::default());
        let gateway = Arc::new(MercadoPagoClient::new(&config.mercadopago));
        let state = AppState::new(config, store.clone(), gateway);
        let reconciler = state.reconciler.clone();

        let app = Application::with_state(state).await.expect("failed to bind test application");
        let address = format!("http://127.0.0.1:{}", app.port());
        tokio::spawn(async move {
            app.run_until_stopped().await.ok();
        });

        TestApp { address, store, processor, reconciler, client: reqwest::Client::new() }
    }

    pub async fn post(&self, path: &str, body: &Value) -> reqwest::Response {
        self.client
            .post(format!("{}{}", self.address, path))
            .json(body)
            .send()
            .await
            .expect("request failed")
    }

    pub async fn get(&self, path: &str) -> reqwest::Response {
        self.client
            .get(format!("{}{}", self.address, path))
            .send()
            .await
            .expect("request failed")
    }

    /// Creates a valid order through the API and returns its id.
    pub async fn create_order(&self, total: f64) -> Uuid {
        let response = self.post("/orders", &order_body(total)).await;
        assert_eq!(response.status(), 201, "order creation failed");
        let body: Value = response.json().await.unwrap();
        body["id"].as_str().unwrap().parse().unwrap()
    }

    /// Delivers a correctly signed webhook for the given payment id.
    pub async fn deliver_webhook(&self, payment_id: u64) -> reqwest::Response {
        let request_id = Uuid::new_v4().to_string();
        let ts = "1704908010";
        let signature = sign_webhook(WEBHOOK_SECRET, &payment_id.to_string(), &request_id, ts);
        self.client
            .post(format!("{}/webhooks/mercadopago", self.address))
            .header("x-signature", format!("ts={ts},v1={signature}"))
            .header("x-request-id", request_id)
            .json(&json!({ "type": "payment", "data": { "id": payment_id } }))
            .send()
            .await
            .expect("webhook delivery failed")
    }
}

pub fn sign_webhook(secret: &str, data_id: &str, request_id: &str, ts: &str) -> String {
    let manifest = format!("id:{data_id};request-id:{request_id};ts:{ts};");
    let mut mac = Hmac::<Sha256>::new_from_slice(secret.as_bytes()).unwrap();
    mac.update(manifest.as_bytes());
    hex::encode(mac.finalize().into_bytes())
}

/// A checkout submission whose arithmetic identity holds for `total`.
pub fn order_body(total: f64) -> Value {
    json!({
        "items": [{
            "product_id": "brigadeiro-box",
            "name": "Caixa de Brigadeiros",
            "quantity": 1,
            "size": "12 un",
            "extras": ["granulado belga"],
            "unit_price": total - 8.0
        }],
        "subtotal": total - 8.0,
        "delivery_fee": 8.0,
        "discount": 0.0,
        "total": total,
        "customer_name": "Maria da Silva",
        "customer_email": "maria@example.com",
        "customer_phone": "+55 11 91234-5678",
        "delivery_address": {
            "postal_code": "01310-100",
            "street": "Avenida Paulista",
            "number": "1578",
            "complement": "ap 42",
            "neighborhood": "Bela Vista",
            "city": "São Paulo",
            "state": "SP"
        },
        "payment_method": "pix"
    })
}

/// Processor payment resource as returned by the mocked API.
pub fn payment_json(payment_id: u64, status: &str, order_id: Uuid) -> Value {
    json!({
        "id": payment_id,
        "status": status,
        "status_detail": if status == "approved" { "accredited" } else { "pending_waiting_transfer" },
        "external_reference": order_id.to_string(),
        "point_of_interaction": {
            "transaction_data": {
                "qr_code": "00020126580014br.gov.bcb.pix0136mock-pix-key",
                "qr_code_base64": "aVZCT1J3MEtHZ29BQUFBTg=="
            }
        }
    })
}
