use std::fmt::Debug;

use gateway_client::{GatewayStatus, GatewayTransaction};
use log::*;
use serde_json::{json, Value};
use spg_common::PaymentMethod;

use crate::{
    db_types::{Order, OrderNumber, OrderTransition, Transaction, TransactionRef, TransactionStatus, TransitionResult},
    events::{ClearCartEvent, EventProducers, NotificationEvent, NotificationKind},
    spe_api::{errors::WebhookError, order_objects::OrderDetails, webhook_objects::WebhookPayload},
    traits::{PaymentGatewayDatabase, PaymentGatewayError},
};

/// Where a processor status came from. This decides which notification an approval produces, and declines found by
/// the reconciliation worker are not notified at all.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UpdateOrigin {
    /// The synchronous response to transaction creation
    Checkout,
    Webhook,
    /// The reconciliation worker
    Poller,
    Refund,
}

#[derive(Debug, Clone)]
pub struct StatusUpdate {
    pub status: GatewayStatus,
    pub external_id: String,
    /// The payload to persist alongside the transaction, if any
    pub raw_payload: Option<String>,
    pub origin: UpdateOrigin,
    /// Passed through to notifications (payment instructions, decline reason)
    pub details: Value,
}

impl StatusUpdate {
    pub fn new<S: Into<String>>(status: GatewayStatus, external_id: S, origin: UpdateOrigin) -> Self {
        Self { status, external_id: external_id.into(), raw_payload: None, origin, details: Value::Null }
    }

    pub fn with_raw_payload(mut self, raw: String) -> Self {
        self.raw_payload = Some(raw);
        self
    }

    pub fn with_details(mut self, details: Value) -> Self {
        self.details = details;
        self
    }
}

/// The result of applying a processor status to an order and its transaction.
#[derive(Debug, Clone)]
pub struct AppliedUpdate {
    pub order: TransitionResult<Order>,
    /// `None` if the processor status has no transaction counterpart, or the transaction is not recorded yet
    pub transaction: Option<TransitionResult<Transaction>>,
}

impl AppliedUpdate {
    /// True if the order itself changed state
    pub fn is_applied(&self) -> bool {
        self.order.is_applied()
    }
}

/// `OrderFlowApi` owns the transition rules that checkout, webhooks and reconciliation share. Every processor status
/// goes through [`Self::apply_status_update`], which guarantees that concurrent or repeated deliveries of the same
/// outcome produce exactly one state change and one notification.
pub struct OrderFlowApi<B> {
    db: B,
    producers: EventProducers,
}

impl<B> Debug for OrderFlowApi<B> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "OrderFlowApi")
    }
}

impl<B: Clone> Clone for OrderFlowApi<B> {
    fn clone(&self) -> Self {
        Self { db: self.db.clone(), producers: self.producers.clone() }
    }
}

impl<B> OrderFlowApi<B> {
    pub fn new(db: B, producers: EventProducers) -> Self {
        Self { db, producers }
    }

    pub fn db(&self) -> &B {
        &self.db
    }
}

impl<B> OrderFlowApi<B>
where B: PaymentGatewayDatabase
{
    pub async fn fetch_order(&self, order_number: &OrderNumber) -> Result<Option<Order>, PaymentGatewayError> {
        self.db.fetch_order_by_number(order_number).await
    }

    /// The order, its latest transaction and its status history.
    pub async fn order_details(&self, order_number: &OrderNumber) -> Result<Option<OrderDetails>, PaymentGatewayError> {
        let Some(order) = self.db.fetch_order_by_number(order_number).await? else {
            return Ok(None);
        };
        let transaction = self.db.fetch_transaction_for_order(order.id).await?;
        let history = self.db.fetch_status_history(order.id).await?;
        Ok(Some(OrderDetails { order, transaction, history }))
    }

    /// Applies a processor status to the order and its transaction.
    ///
    /// * The transaction must belong to `order`. A processor id that is recorded against a different order is
    ///   rejected before anything is written.
    /// * The transaction moves first, then the order. Both moves are compare-and-set, so repeating an update is a
    ///   no-op.
    /// * If the transaction already settled on a different terminal status, the update lost a race and the order is
    ///   left alone. The order therefore always mirrors its transaction.
    /// * Unrecognized statuses are treated like `pending`: they can move a fresh order to `awaiting_payment` but
    ///   never out of a terminal state.
    /// * Notifications are published only if the order transition was applied by this call.
    pub async fn apply_status_update(
        &self,
        order: &Order,
        update: StatusUpdate,
    ) -> Result<AppliedUpdate, PaymentGatewayError> {
        let transaction = match TransactionStatus::from_gateway(&update.status) {
            Some(status) => self.move_transaction(order, &update, status).await?,
            None => {
                warn!(
                    "🔄️ Processor reported unrecognized status '{}' for transaction [{}] (order {})",
                    update.status, update.external_id, order.order_number
                );
                None
            },
        };
        if let Some(TransitionResult::Unchanged(tx)) = &transaction {
            let requested = TransactionStatus::from_gateway(&update.status);
            if tx.status.is_terminal() && Some(tx.status) != requested {
                debug!(
                    "🔄️ Transaction [{}] already settled as {}. Ignoring {} from {:?} for order {}.",
                    tx.external_id, tx.status, update.status, update.origin, order.order_number
                );
                let current = self
                    .db
                    .fetch_order_by_id(order.id)
                    .await?
                    .ok_or(PaymentGatewayError::OrderIdNotFound(order.id))?;
                return Ok(AppliedUpdate { order: TransitionResult::Unchanged(current), transaction });
            }
        }
        let target = OrderTransition::for_gateway_status(&update.status).unwrap_or(OrderTransition::AWAITING_PAYMENT);
        let result = self.db.transition_order(order.id, target).await?;
        match &result {
            TransitionResult::Applied(o) => {
                info!("🔄️ Order {} is now {} ({:?})", o.order_number, o.current_state(), update.origin);
                let tx = transaction.as_ref().map(|t| t.inner().clone());
                self.publish_outcome(o, tx, target, &update).await;
            },
            TransitionResult::Unchanged(o) => {
                debug!(
                    "🔄️ Order {} stays {}. {} from {:?} is a no-op.",
                    o.order_number,
                    o.current_state(),
                    update.status,
                    update.origin
                );
            },
        }
        Ok(AppliedUpdate { order: result, transaction })
    }

    async fn move_transaction(
        &self,
        order: &Order,
        update: &StatusUpdate,
        status: TransactionStatus,
    ) -> Result<Option<TransitionResult<Transaction>>, PaymentGatewayError> {
        let Some(existing) = self.db.fetch_transaction_by_external_id(&update.external_id).await? else {
            warn!(
                "🔄️ Transaction {} for order {} is not recorded yet. Only the order will be updated.",
                update.external_id, order.order_number
            );
            return Ok(None);
        };
        if existing.order_id != order.id {
            warn!(
                "🔄️ Transaction [{}] belongs to order #{}, not {}. Rejecting {} from {:?}.",
                existing.external_id, existing.order_id, order.order_number, update.status, update.origin
            );
            return Err(PaymentGatewayError::TransactionOrderMismatch {
                external_id: existing.external_id,
                order_number: order.order_number.to_string(),
            });
        }
        let tx_ref = TransactionRef::Id(existing.id);
        self.db.transition_transaction(&tx_ref, status, update.raw_payload.clone()).await.map(Some)
    }

    async fn publish_outcome(
        &self,
        order: &Order,
        transaction: Option<Transaction>,
        target: OrderTransition,
        update: &StatusUpdate,
    ) {
        let kind = match target {
            OrderTransition::APPROVED if update.origin == UpdateOrigin::Checkout => {
                Some(NotificationKind::OrderConfirmation)
            },
            OrderTransition::APPROVED => Some(NotificationKind::PaymentApproved),
            OrderTransition::DECLINED if update.origin == UpdateOrigin::Poller => None,
            OrderTransition::DECLINED => Some(NotificationKind::PaymentDeclined),
            OrderTransition::REFUNDED => Some(NotificationKind::PaymentRefunded),
            OrderTransition::AWAITING_PAYMENT if update.origin == UpdateOrigin::Checkout => {
                match order.payment_method {
                    PaymentMethod::Pix => Some(NotificationKind::PaymentPendingPix),
                    PaymentMethod::Boleto => Some(NotificationKind::PaymentPendingBoleto),
                    PaymentMethod::CreditCard => None,
                }
            },
            _ => None,
        };
        if let Some(kind) = kind {
            let mut event = NotificationEvent::new(kind, order.clone()).with_details(update.details.clone());
            if let Some(tx) = transaction {
                event = event.with_transaction(tx);
            }
            self.producers.publish_notification(event).await;
        }
        if target == OrderTransition::APPROVED {
            if let Some(user_id) = &order.user_id {
                debug!("🔄️ Clearing the cart of user {user_id} after payment for {}", order.order_number);
                let event = ClearCartEvent { user_id: user_id.clone(), order_number: order.order_number.clone() };
                self.producers.publish_clear_cart(event).await;
            }
        }
    }

    /// Handles a verified webhook. The order is looked up by the order number the processor echoes back.
    pub async fn process_webhook(&self, payload: WebhookPayload) -> Result<AppliedUpdate, WebhookError> {
        let data = payload.data;
        let order = self.db.fetch_order_by_number(&data.order_id).await?.ok_or_else(|| {
            warn!("🪝️ Received '{}' webhook for unknown order {}. Ignoring it.", payload.event, data.order_id);
            WebhookError::UnknownOrder(data.order_id.clone())
        })?;
        if let Some(amount) = data.amount {
            if amount != order.total_amount {
                warn!(
                    "🪝️ Webhook for order {} reports {amount}, but the order total is {}. Processing the status anyway.",
                    order.order_number, order.total_amount
                );
            }
        }
        let raw = serde_json::to_string(&data).map_err(|e| WebhookError::InvalidPayload(e.to_string()))?;
        let external_id = data.external_id().to_string();
        info!(
            "🪝️ '{}' webhook: order {} transaction [{external_id}] is {}",
            payload.event, order.order_number, data.status
        );
        let update = StatusUpdate::new(data.status.clone(), external_id, UpdateOrigin::Webhook)
            .with_raw_payload(raw)
            .with_details(data.details());
        Ok(self.apply_status_update(&order, update).await?)
    }

    /// Applies a status fetched by the reconciliation worker to the transaction's order.
    pub async fn reconcile_transaction(
        &self,
        tx: &Transaction,
        gateway_tx: &GatewayTransaction,
    ) -> Result<AppliedUpdate, PaymentGatewayError> {
        let order =
            self.db.fetch_order_by_id(tx.order_id).await?.ok_or(PaymentGatewayError::OrderIdNotFound(tx.order_id))?;
        let details = match &gateway_tx.message {
            Some(m) => json!({ "message": m }),
            None => Value::Null,
        };
        let update = StatusUpdate::new(gateway_tx.status.clone(), tx.external_id.clone(), UpdateOrigin::Poller)
            .with_raw_payload(gateway_tx.raw_json())
            .with_details(details);
        self.apply_status_update(&order, update).await
    }
}
