//! Order store abstraction and its MongoDB implementation.
//!
//! The store is the sole shared resource between the three reconciliation
//! triggers; all durable state lives here.

use anyhow::Result;
use async_trait::async_trait;
use mongodb::bson::{doc, to_bson, DateTime, Document};
use mongodb::options::IndexOptions;
use mongodb::{Collection, Database, IndexModel};
use uuid::Uuid;

use crate::models::{Order, OrderStatus, PaymentMethod, PaymentStatus};

/// Partial update applied to a single order row. Only `Some` fields are
/// written; `updated_at` is always refreshed.
#[derive(Debug, Clone, Default)]
pub struct OrderUpdate {
    pub payment_id: Option<String>,
    pub payment_method: Option<PaymentMethod>,
    pub payment_status: Option<PaymentStatus>,
    pub status: Option<OrderStatus>,
    pub pix_qr_code: Option<String>,
    pub pix_qr_code_base64: Option<String>,
    pub pix_expiration: Option<DateTime>,
}

impl OrderUpdate {
    fn into_set_document(self) -> Result<Document> {
        let mut set = doc! { "updated_at": DateTime::now() };
        if let Some(payment_id) = self.payment_id {
            set.insert("payment_id", payment_id);
        }
        if let Some(method) = self.payment_method {
            set.insert("payment_method", to_bson(&method)?);
        }
        if let Some(payment_status) = self.payment_status {
            set.insert("payment_status", to_bson(&payment_status)?);
        }
        if let Some(status) = self.status {
            set.insert("status", to_bson(&status)?);
        }
        if let Some(qr) = self.pix_qr_code {
            set.insert("pix_qr_code", qr);
        }
        if let Some(qr64) = self.pix_qr_code_base64 {
            set.insert("pix_qr_code_base64", qr64);
        }
        if let Some(expiration) = self.pix_expiration {
            set.insert("pix_expiration", expiration);
        }
        Ok(set)
    }
}

/// Durable key-value record of orders: insert, point read, point update.
///
/// Single-row updates are atomic on the backend; the reconciler's
/// idempotent/terminal-state design makes last-writer-wins safe.
#[async_trait]
pub trait OrderStore: Send + Sync {
    async fn insert(&self, order: Order) -> Result<()>;

    async fn get(&self, id: Uuid) -> Result<Option<Order>>;

    /// Returns `false` when no order matched the id.
    async fn update(&self, id: Uuid, update: OrderUpdate) -> Result<bool>;
}

#[derive(Clone)]
pub struct MongoOrderStore {
    orders: Collection<Order>,
}

impl MongoOrderStore {
    pub fn new(db: &Database) -> Self {
        Self { orders: db.collection("orders") }
    }

    pub async fn init_indexes(&self) -> Result<()> {
        // Webhooks resolve orders through the processor payment id.
        let payment_id_index = IndexModel::builder()
            .keys(doc! { "payment_id": 1 })
            .options(IndexOptions::builder().name("payment_id_idx".to_string()).sparse(true).build())
            .build();

        // The admin order list reads by commercial status, newest first.
        let status_index = IndexModel::builder()
            .keys(doc! { "status": 1, "created_at": -1 })
            .options(IndexOptions::builder().name("status_created_idx".to_string()).build())
            .build();

        self.orders.create_indexes([payment_id_index, status_index], None).await?;
        tracing::info!("order store indexes initialized");
        Ok(())
    }
}

#[async_trait]
impl OrderStore for MongoOrderStore {
    async fn insert(&self, order: Order) -> Result<()> {
        self.orders.insert_one(order, None).await?;
        Ok(())
    }

    async fn get(&self, id: Uuid) -> Result<Option<Order>> {
        let order = self.orders.find_one(doc! { "_id": id.to_string() }, None).await?;
        Ok(order)
    }

    async fn update(&self, id: Uuid, update: OrderUpdate) -> Result<bool> {
        let set = update.into_set_document()?;
        let result = self
            .orders
            .update_one(doc! { "_id": id.to_string() }, doc! { "$set": set }, None)
            .await?;
        Ok(result.matched_count > 0)
    }
}
