//! Payment reconciler: the single writer of `payment_status`/`status`.
//!
//! All three triggers (client poll, webhook push, card synchronous
//! response) funnel through the one mapping table here, so the processor
//! vocabulary is translated in exactly one place.

use std::sync::Arc;

use serde::Serialize;
use uuid::Uuid;

use crate::error::PaymentError;
use crate::models::{OrderStatus, PaymentMethod, PaymentStatus};
use crate::services::mercadopago::{PaymentGateway, ProcessorStatus};
use crate::services::store::{OrderStore, OrderUpdate};

/// Maps a processor status onto the order's status pair.
///
/// `None` means the status carries no transition for us (future processor
/// vocabulary, disputes in flight) and the order keeps its last-known state.
pub fn map_processor_status(
    status: ProcessorStatus,
    method: PaymentMethod,
) -> Option<(PaymentStatus, OrderStatus)> {
    match status {
        ProcessorStatus::Approved => Some((PaymentStatus::Paid, OrderStatus::Confirmed)),
        ProcessorStatus::Pending | ProcessorStatus::InProcess => {
            let payment_status = match method {
                PaymentMethod::Pix => PaymentStatus::AwaitingPayment,
                PaymentMethod::Card => PaymentStatus::Processing,
            };
            Some((payment_status, OrderStatus::Pending))
        }
        ProcessorStatus::Rejected => Some((PaymentStatus::Rejected, OrderStatus::Cancelled)),
        ProcessorStatus::Cancelled => Some((PaymentStatus::Cancelled, OrderStatus::Cancelled)),
        ProcessorStatus::Refunded | ProcessorStatus::ChargedBack => {
            Some((PaymentStatus::Refunded, OrderStatus::Refunded))
        }
        ProcessorStatus::Unknown => None,
    }
}

/// Status triple returned to callers. Nothing processor-internal (card
/// metadata, issuer details) crosses this boundary.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct PaymentStatusView {
    pub order_id: Uuid,
    pub payment_status: PaymentStatus,
    pub order_status: OrderStatus,
}

#[derive(Debug, Clone, Copy)]
pub struct ReconcileOutcome {
    pub view: PaymentStatusView,
    /// False when reconciliation was a no-op (already current, terminal
    /// guard, or an unmapped processor status). No-ops are not errors.
    pub applied: bool,
}

pub struct Reconciler {
    store: Arc<dyn OrderStore>,
    gateway: Arc<dyn PaymentGateway>,
}

impl Reconciler {
    pub fn new(store: Arc<dyn OrderStore>, gateway: Arc<dyn PaymentGateway>) -> Self {
        Self { store, gateway }
    }

    /// Applies a processor-reported status to the order, idempotently.
    pub async fn reconcile(
        &self,
        order_id: Uuid,
        processor_status: ProcessorStatus,
    ) -> Result<ReconcileOutcome, PaymentError> {
        let order = self
            .store
            .get(order_id)
            .await
            .map_err(PaymentError::Store)?
            .ok_or(PaymentError::OrderNotFound)?;

        let current = PaymentStatusView {
            order_id,
            payment_status: order.payment_status,
            order_status: order.status,
        };

        // Paid is terminal: a late-arriving stale notification must never
        // regress a paid order.
        if order.payment_status == PaymentStatus::Paid {
            return Ok(ReconcileOutcome { view: current, applied: false });
        }

        let Some((payment_status, order_status)) =
            map_processor_status(processor_status, order.payment_method)
        else {
            tracing::info!(%order_id, status = ?processor_status, "unmapped processor status, keeping current state");
            return Ok(ReconcileOutcome { view: current, applied: false });
        };

        if payment_status == order.payment_status && order_status == order.status {
            return Ok(ReconcileOutcome { view: current, applied: false });
        }

        self.store
            .update(
                order_id,
                OrderUpdate {
                    payment_status: Some(payment_status),
                    status: Some(order_status),
                    ..Default::default()
                },
            )
            .await
            .map_err(PaymentError::Store)?;

        tracing::info!(
            %order_id,
            from = ?current.payment_status,
            to = ?payment_status,
            "payment status reconciled"
        );

        Ok(ReconcileOutcome {
            view: PaymentStatusView { order_id, payment_status, order_status },
            applied: true,
        })
    }

    /// The poll operation: fetch the freshest processor status and
    /// reconcile it. Orders without a payment yet report their stored
    /// statuses without touching the gateway.
    pub async fn check_status(&self, order_id: Uuid) -> Result<PaymentStatusView, PaymentError> {
        let order = self
            .store
            .get(order_id)
            .await
            .map_err(PaymentError::Store)?
            .ok_or(PaymentError::OrderNotFound)?;

        let Some(payment_id) = order.payment_id.clone() else {
            return Ok(PaymentStatusView {
                order_id,
                payment_status: order.payment_status,
                order_status: order.status,
            });
        };

        let payment = self.gateway.get_payment(&payment_id).await?;
        let outcome = self.reconcile(order_id, payment.status).await?;
        Ok(outcome.view)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn approved_confirms_the_order() {
        for method in [PaymentMethod::Pix, PaymentMethod::Card] {
            assert_eq!(
                map_processor_status(ProcessorStatus::Approved, method),
                Some((PaymentStatus::Paid, OrderStatus::Confirmed))
            );
        }
    }

    #[test]
    fn pending_maps_by_method() {
        for status in [ProcessorStatus::Pending, ProcessorStatus::InProcess] {
            assert_eq!(
                map_processor_status(status, PaymentMethod::Pix),
                Some((PaymentStatus::AwaitingPayment, OrderStatus::Pending))
            );
            assert_eq!(
                map_processor_status(status, PaymentMethod::Card),
                Some((PaymentStatus::Processing, OrderStatus::Pending))
            );
        }
    }

    #[test]
    fn failure_statuses_cancel_or_refund() {
        assert_eq!(
            map_processor_status(ProcessorStatus::Rejected, PaymentMethod::Pix),
            Some((PaymentStatus::Rejected, OrderStatus::Cancelled))
        );
        assert_eq!(
            map_processor_status(ProcessorStatus::Cancelled, PaymentMethod::Card),
            Some((PaymentStatus::Cancelled, OrderStatus::Cancelled))
        );
        assert_eq!(
            map_processor_status(ProcessorStatus::Refunded, PaymentMethod::Pix),
            Some((PaymentStatus::Refunded, OrderStatus::Refunded))
        );
        assert_eq!(
            map_processor_status(ProcessorStatus::ChargedBack, PaymentMethod::Card),
            Some((PaymentStatus::Refunded, OrderStatus::Refunded))
        );
    }

    #[test]
    fn unknown_status_is_a_no_op() {
        assert_eq!(map_processor_status(ProcessorStatus::Unknown, PaymentMethod::Pix), None);
    }
}
