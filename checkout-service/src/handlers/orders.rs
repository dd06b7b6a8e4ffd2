//! Order creation and lookup.
//!
//! Orders are created once, at checkout submission, in `pending/pending`
//! state; their status fields are only advanced by the reconciler
//! afterwards.

use axum::{
    extract::{Path, State},
    http::StatusCode,
    Json,
};
use mongodb::bson::DateTime;
use service_core::error::AppError;
use uuid::Uuid;
use validator::Validate;

use crate::dtos::{CreateOrderRequest, OrderResponse};
use crate::models::{Address, Order, OrderItem, OrderStatus, PaymentStatus};
use crate::AppState;

const TOTAL_EPSILON: f64 = 0.01;
const MIN_PHONE_DIGITS: usize = 10;

pub async fn create_order(
    State(state): State<AppState>,
    Json(payload): Json<CreateOrderRequest>,
) -> Result<(StatusCode, Json<OrderResponse>), AppError> {
    payload.validate()?;

    let phone_digits = payload.customer_phone.chars().filter(|c| c.is_ascii_digit()).count();
    if phone_digits < MIN_PHONE_DIGITS {
        return Err(AppError::BadRequest(anyhow::anyhow!("invalid phone number")));
    }

    if !payload.total.is_finite() || payload.total <= 0.0 {
        return Err(AppError::BadRequest(anyhow::anyhow!("invalid total")));
    }

    // The stored total is authoritative for every later payment; make sure
    // the arithmetic identity holds before it becomes authoritative.
    let computed = payload.subtotal + payload.delivery_fee - payload.discount;
    if (computed - payload.total).abs() > TOTAL_EPSILON {
        return Err(AppError::BadRequest(anyhow::anyhow!(
            "total does not match subtotal + delivery fee - discount"
        )));
    }

    let now = DateTime::now();
    let order = Order {
        id: Uuid::new_v4(),
        items: payload
            .items
            .into_iter()
            .map(|item| OrderItem {
                line_total: item.unit_price * f64::from(item.quantity),
                product_id: item.product_id,
                name: item.name,
                quantity: item.quantity,
                size: item.size,
                extras: item.extras,
                unit_price: item.unit_price,
            })
            .collect(),
        subtotal: payload.subtotal,
        delivery_fee: payload.delivery_fee,
        discount: payload.discount,
        total: payload.total,
        customer_name: truncated(payload.customer_name.trim(), 100),
        customer_email: payload.customer_email.map(|email| truncated(email.trim(), 255)),
        customer_phone: truncated(payload.customer_phone.trim(), 20),
        delivery_address: Address {
            postal_code: payload.delivery_address.postal_code,
            street: payload.delivery_address.street,
            number: payload.delivery_address.number,
            complement: payload.delivery_address.complement,
            neighborhood: payload.delivery_address.neighborhood,
            city: payload.delivery_address.city,
            state: payload.delivery_address.state,
        },
        payment_method: payload.payment_method,
        payment_id: None,
        payment_status: PaymentStatus::Pending,
        status: OrderStatus::Pending,
        pix_qr_code: None,
        pix_qr_code_base64: None,
        pix_expiration: None,
        created_at: now,
        updated_at: now,
    };

    tracing::info!(
        order_id = %order.id,
        total = order.total,
        payment_method = ?order.payment_method,
        "creating order"
    );

    state.store.insert(order.clone()).await.map_err(AppError::Database)?;

    Ok((StatusCode::CREATED, Json(OrderResponse::from(order))))
}

pub async fn get_order(
    State(state): State<AppState>,
    Path(order_id): Path<Uuid>,
) -> Result<Json<OrderResponse>, AppError> {
    let order = state
        .store
        .get(order_id)
        .await
        .map_err(AppError::Database)?
        .ok_or_else(|| AppError::NotFound(anyhow::anyhow!("order not found")))?;

    Ok(Json(OrderResponse::from(order)))
}

fn truncated(text: &str, max: usize) -> String {
    text.chars().take(max).collect()
}
