use serde::{Deserialize, Serialize};
use uuid::Uuid;
use validator::Validate;

use crate::models::{Order, OrderStatus, PaymentMethod, PaymentStatus};

#[derive(Debug, Deserialize, Validate)]
pub struct CreateOrderRequest {
    #[validate(length(min = 1, message = "cart is empty"), nested)]
    pub items: Vec<OrderItemRequest>,
    pub subtotal: f64,
    #[serde(default)]
    pub delivery_fee: f64,
    #[serde(default)]
    pub discount: f64,
    pub total: f64,
    #[validate(length(min = 2, max = 100, message = "name is required"))]
    pub customer_name: String,
    #[validate(email)]
    pub customer_email: Option<String>,
    #[validate(length(max = 20))]
    pub customer_phone: String,
    #[validate(nested)]
    pub delivery_address: AddressRequest,
    pub payment_method: PaymentMethod,
}

#[derive(Debug, Serialize, Deserialize, Validate)]
pub struct OrderItemRequest {
    #[validate(length(min = 1))]
    pub product_id: String,
    #[validate(length(min = 1))]
    pub name: String,
    #[validate(range(min = 1))]
    pub quantity: u32,
    pub size: Option<String>,
    #[serde(default)]
    pub extras: Vec<String>,
    pub unit_price: f64,
}

#[derive(Debug, Deserialize, Validate)]
pub struct AddressRequest {
    #[validate(length(min = 1, message = "postal code is required"))]
    pub postal_code: String,
    #[validate(length(min = 1, message = "street is required"))]
    pub street: String,
    #[validate(length(min = 1, message = "number is required"))]
    pub number: String,
    pub complement: Option<String>,
    pub neighborhood: String,
    pub city: String,
    pub state: String,
}

#[derive(Debug, Serialize)]
pub struct OrderResponse {
    pub id: Uuid,
    pub items: Vec<crate::models::OrderItem>,
    pub subtotal: f64,
    pub delivery_fee: f64,
    pub discount: f64,
    pub total: f64,
    pub customer_name: String,
    pub customer_email: Option<String>,
    pub customer_phone: String,
    pub delivery_address: crate::models::Address,
    pub payment_method: PaymentMethod,
    pub payment_id: Option<String>,
    pub payment_status: PaymentStatus,
    pub status: OrderStatus,
    pub pix_qr_code: Option<String>,
    pub pix_qr_code_base64: Option<String>,
    pub created_at: String,
    pub updated_at: String,
}

impl From<Order> for OrderResponse {
    fn from(order: Order) -> Self {
        Self {
            id: order.id,
            items: order.items,
            subtotal: order.subtotal,
            delivery_fee: order.delivery_fee,
            discount: order.discount,
            total: order.total,
            customer_name: order.customer_name,
            customer_email: order.customer_email,
            customer_phone: order.customer_phone,
            delivery_address: order.delivery_address,
            payment_method: order.payment_method,
            payment_id: order.payment_id,
            payment_status: order.payment_status,
            status: order.status,
            pix_qr_code: order.pix_qr_code,
            pix_qr_code_base64: order.pix_qr_code_base64,
            created_at: order.created_at.to_string(),
            updated_at: order.updated_at.to_string(),
        }
    }
}

/// Request to create an instant-transfer (PIX) payment for an order.
#[derive(Debug, Deserialize)]
pub struct PixPaymentRequest {
    pub order_id: Uuid,
    pub amount: f64,
    pub description: Option<String>,
    pub payer_email: Option<String>,
    pub payer_name: Option<String>,
}

#[derive(Debug, Serialize)]
pub struct PixPaymentResponse {
    pub payment_id: String,
    pub qr_code: String,
    pub qr_code_base64: Option<String>,
    pub expires_at: String,
    pub payment_status: PaymentStatus,
}

/// Request to charge a pre-tokenized card. The raw card number never
/// reaches this service.
#[derive(Debug, Deserialize)]
pub struct CardPaymentRequest {
    pub order_id: Uuid,
    pub amount: f64,
    pub description: Option<String>,
    pub token: String,
    pub payment_method_id: String,
    pub installments: Option<u32>,
    pub payer_email: String,
    pub payer_name: String,
    pub payer_document: String,
    pub payer_document_type: Option<String>,
}

#[derive(Debug, Serialize)]
pub struct CardPaymentResponse {
    pub payment_id: String,
    pub status: crate::services::mercadopago::ProcessorStatus,
    pub status_detail: Option<String>,
    pub payment_status: PaymentStatus,
    pub order_status: OrderStatus,
}
