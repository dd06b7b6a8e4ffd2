use mongodb::bson::DateTime;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// An order as persisted in the order store.
///
/// `payment_status` and `status` are written at creation and thereafter only
/// by the reconciler (or the card-sync path, which goes through the same
/// mapping table).
#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct Order {
    #[serde(rename = "_id")]
    pub id: Uuid,
    pub items: Vec<OrderItem>,
    pub subtotal: f64,
    pub delivery_fee: f64,
    #[serde(default)]
    pub discount: f64,
    pub total: f64,
    pub customer_name: String,
    pub customer_email: Option<String>,
    pub customer_phone: String,
    pub delivery_address: Address,
    pub payment_method: PaymentMethod,
    /// Processor-assigned payment id; absent until the first creation attempt.
    pub payment_id: Option<String>,
    pub payment_status: PaymentStatus,
    pub status: OrderStatus,
    pub pix_qr_code: Option<String>,
    pub pix_qr_code_base64: Option<String>,
    pub pix_expiration: Option<DateTime>,
    pub created_at: DateTime,
    pub updated_at: DateTime,
}

#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct OrderItem {
    pub product_id: String,
    /// Name snapshot at purchase time; catalog renames must not rewrite history.
    pub name: String,
    pub quantity: u32,
    pub size: Option<String>,
    #[serde(default)]
    pub extras: Vec<String>,
    pub unit_price: f64,
    pub line_total: f64,
}

#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct Address {
    pub postal_code: String,
    pub street: String,
    pub number: String,
    pub complement: Option<String>,
    pub neighborhood: String,
    pub city: String,
    pub state: String,
}

#[derive(Debug, Serialize, Deserialize, Clone, Copy, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum PaymentMethod {
    Pix,
    Card,
}

#[derive(Debug, Serialize, Deserialize, Clone, Copy, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum PaymentStatus {
    Pending,
    AwaitingPayment,
    Processing,
    Paid,
    Rejected,
    Cancelled,
    Refunded,
}

impl PaymentStatus {
    /// Statuses the polling controller treats as final.
    pub fn is_settled(&self) -> bool {
        matches!(
            self,
            PaymentStatus::Paid
                | PaymentStatus::Rejected
                | PaymentStatus::Cancelled
                | PaymentStatus::Refunded
        )
    }
}

#[derive(Debug, Serialize, Deserialize, Clone, Copy, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum OrderStatus {
    Pending,
    Confirmed,
    Preparing,
    Delivering,
    Delivered,
    Cancelled,
    Refunded,
}
