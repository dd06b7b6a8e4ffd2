//! Polling controller for pending payments.
//!
//! A best-effort convergence loop used while a checkout view is waiting on
//! an instant-transfer payment: every tick runs the status-check operation
//! (which reconciles against the freshest processor status) and publishes
//! the result. The loop stops on its own once the payment settles, and the
//! handle cancels the loop on drop so navigation away from the view can
//! never leave an orphaned poller firing requests.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use uuid::Uuid;

use crate::error::PaymentError;
use crate::services::reconciler::{PaymentStatusView, Reconciler};

pub const DEFAULT_POLL_INTERVAL: Duration = Duration::from_secs(5);

/// The operation a poller ticks against.
#[async_trait]
pub trait StatusSource: Send + Sync {
    async fn check(&self) -> Result<PaymentStatusView, PaymentError>;
}

/// Status source backed by the reconciler's poll operation.
pub struct OrderStatusSource {
    reconciler: Arc<Reconciler>,
    order_id: Uuid,
}

impl OrderStatusSource {
    pub fn new(reconciler: Arc<Reconciler>, order_id: Uuid) -> Self {
        Self { reconciler, order_id }
    }
}

#[async_trait]
impl StatusSource for OrderStatusSource {
    async fn check(&self) -> Result<PaymentStatusView, PaymentError> {
        self.reconciler.check_status(self.order_id).await
    }
}

pub struct PaymentPoller;

impl PaymentPoller {
    /// Spawns the polling loop. Transient check failures are logged and
    /// the loop keeps its fixed cadence; there is no backoff or retry cap.
    pub fn spawn(source: Arc<dyn StatusSource>, interval: Duration) -> PollHandle {
        let (tx, rx) = watch::channel(None);
        let token = CancellationToken::new();
        let loop_token = token.clone();

        let task = tokio::spawn(async move {
            loop {
                tokio::select! {
                    _ = loop_token.cancelled() => break,
                    _ = tokio::time::sleep(interval) => {
                        match source.check().await {
                            Ok(view) => {
                                let settled = view.payment_status.is_settled();
                                if tx.send(Some(view)).is_err() {
                                    // Every handle is gone; nobody is watching.
                                    break;
                                }
                                if settled {
                                    break;
                                }
                            }
                            Err(err) => {
                                tracing::warn!(error = %err, "status check failed, polling continues");
                            }
                        }
                    }
                }
            }
        });

        PollHandle { rx, token, task }
    }
}

/// Owning handle for a polling loop. Dropping it cancels the loop.
pub struct PollHandle {
    rx: watch::Receiver<Option<PaymentStatusView>>,
    token: CancellationToken,
    task: JoinHandle<()>,
}

impl PollHandle {
    pub fn latest(&self) -> Option<PaymentStatusView> {
        *self.rx.borrow()
    }

    /// A receiver observers can await `changed()` on.
    pub fn subscribe(&self) -> watch::Receiver<Option<PaymentStatusView>> {
        self.rx.clone()
    }

    pub fn cancel(&self) {
        self.token.cancel();
    }

    /// Waits for the loop to finish (settled status or cancellation).
    pub async fn until_stopped(mut self) -> Option<PaymentStatusView> {
        let _ = (&mut self.task).await;
        *self.rx.borrow()
    }
}

impl Drop for PollHandle {
    fn drop(&mut self) {
        self.token.cancel();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{OrderStatus, PaymentStatus};
    use std::collections::VecDeque;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Mutex;

    struct ScriptedSource {
        responses: Mutex<VecDeque<Result<PaymentStatusView, PaymentError>>>,
        last: PaymentStatusView,
        calls: AtomicUsize,
    }

    impl ScriptedSource {
        fn new(responses: Vec<Result<PaymentStatusView, PaymentError>>, last: PaymentStatusView) -> Self {
            Self { responses: Mutex::new(responses.into()), last, calls: AtomicUsize::new(0) }
        }

        fn calls(&self) -> usize {
            self.calls.load(Ordering::SeqCst)
        }
    }

    #[async_trait]
    impl StatusSource for ScriptedSource {
        async fn check(&self) -> Result<PaymentStatusView, PaymentError> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            self.responses.lock().unwrap().pop_front().unwrap_or(Ok(self.last))
        }
    }

    fn view(payment_status: PaymentStatus, order_status: OrderStatus) -> PaymentStatusView {
        PaymentStatusView { order_id: Uuid::new_v4(), payment_status, order_status }
    }

    #[tokio::test(start_paused = true)]
    async fn stops_once_payment_settles() {
        let pending = view(PaymentStatus::AwaitingPayment, OrderStatus::Pending);
        let paid = PaymentStatusView { payment_status: PaymentStatus::Paid, order_status: OrderStatus::Confirmed, ..pending };
        let source = Arc::new(ScriptedSource::new(vec![Ok(pending), Ok(pending), Ok(paid)], paid));

        let handle = PaymentPoller::spawn(source.clone(), Duration::from_secs(5));
        let final_view = handle.until_stopped().await;

        assert_eq!(final_view, Some(paid));
        assert_eq!(source.calls(), 3);
    }

    #[tokio::test(start_paused = true)]
    async fn rejected_terminates_the_loop() {
        let pending = view(PaymentStatus::Processing, OrderStatus::Pending);
        let rejected = PaymentStatusView { payment_status: PaymentStatus::Rejected, order_status: OrderStatus::Cancelled, ..pending };
        let source = Arc::new(ScriptedSource::new(vec![Ok(pending), Ok(rejected)], rejected));

        let handle = PaymentPoller::spawn(source.clone(), Duration::from_secs(5));
        let final_view = handle.until_stopped().await;

        assert_eq!(final_view, Some(rejected));
        assert_eq!(source.calls(), 2);
    }

    #[tokio::test(start_paused = true)]
    async fn failures_are_swallowed_and_polling_continues() {
        let paid = view(PaymentStatus::Paid, OrderStatus::Confirmed);
        let source = Arc::new(ScriptedSource::new(
            vec![Err(PaymentError::Gateway("timeout".to_string())), Ok(paid)],
            paid,
        ));

        let handle = PaymentPoller::spawn(source.clone(), Duration::from_secs(5));
        let final_view = handle.until_stopped().await;

        assert_eq!(final_view, Some(paid));
        assert_eq!(source.calls(), 2);
    }

    #[tokio::test(start_paused = true)]
    async fn cancellation_stops_the_loop_before_the_next_tick() {
        let pending = view(PaymentStatus::AwaitingPayment, OrderStatus::Pending);
        let source = Arc::new(ScriptedSource::new(vec![], pending));

        let handle = PaymentPoller::spawn(source.clone(), Duration::from_secs(5));
        handle.cancel();
        let final_view = handle.until_stopped().await;

        assert_eq!(final_view, None);
        assert_eq!(source.calls(), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn dropping_the_handle_cancels_the_loop() {
        let pending = view(PaymentStatus::AwaitingPayment, OrderStatus::Pending);
        let source = Arc::new(ScriptedSource::new(vec![], pending));

        let handle = PaymentPoller::spawn(source.clone(), Duration::from_secs(5));
        let token = handle.token.clone();
        drop(handle);

        assert!(token.is_cancelled());
        // Give the loop a chance to observe the cancellation.
        tokio::time::sleep(Duration::from_secs(30)).await;
        assert_eq!(source.calls(), 0);
    }
}
