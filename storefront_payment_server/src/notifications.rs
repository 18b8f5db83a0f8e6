//! Notification dispatch.
//!
//! The engine publishes [`NotificationEvent`]s and [`ClearCartEvent`]s after state changes. This module subscribes to
//! them and hands them on. Delivery is fire-and-forget: a failure here never affects the order.
//!
//! The server has no mail transport of its own. Rendered messages are written to the log under the
//! `spg::notifications` target, which the deployment ships to the mailer. Details are redacted first.
use std::{future::Future, pin::Pin};

use log::*;
use serde::Serialize;
use serde_json::Value;
use storefront_payment_engine::{
    events::{ClearCartEvent, EventHooks, NotificationEvent, NotificationKind},
    helpers::redact_json,
};

const NOTIFICATION_TARGET: &str = "spg::notifications";

/// A customer message, ready for the mailer.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct OutgoingNotification {
    pub kind: NotificationKind,
    pub to: Option<String>,
    pub subject: String,
    pub order_number: String,
    pub total: String,
    pub details: Value,
}

pub fn subject_for(kind: NotificationKind, order_number: &str) -> String {
    match kind {
        NotificationKind::OrderConfirmation => format!("Confirmação de Pedido - {order_number}"),
        NotificationKind::PaymentApproved => format!("Pagamento Confirmado - Pedido {order_number}"),
        NotificationKind::PaymentDeclined => format!("Pagamento Recusado - Pedido {order_number}"),
        NotificationKind::PaymentPendingPix | NotificationKind::PaymentPendingBoleto => {
            format!("Instruções de Pagamento - Pedido {order_number}")
        },
        NotificationKind::PaymentRefunded => format!("Reembolso Processado - Pedido {order_number}"),
    }
}

pub fn render_notification(event: &NotificationEvent) -> OutgoingNotification {
    let order_number = event.order.order_number.to_string();
    OutgoingNotification {
        kind: event.kind,
        to: event.order.customer_email.clone(),
        subject: subject_for(event.kind, &order_number),
        total: event.order.total_amount.to_string(),
        order_number,
        details: redact_json(&event.details),
    }
}

fn dispatch(event: NotificationEvent) {
    let message = render_notification(&event);
    if message.to.is_none() {
        info!(
            target: NOTIFICATION_TARGET,
            "📬️ No email address for order {}. Skipping the {} notification.", message.order_number, message.kind
        );
        return;
    }
    match serde_json::to_string(&message) {
        Ok(json) => info!(target: NOTIFICATION_TARGET, "📬️ {json}"),
        Err(e) => warn!("📬️ Could not serialize the {} notification for {}. {e}", message.kind, message.order_number),
    }
}

fn clear_cart(event: ClearCartEvent) {
    info!(
        target: NOTIFICATION_TARGET,
        "📬️ Clearing the cart of user {} after payment of order {}", event.user_id, event.order_number
    );
}

/// Hooks that forward engine events to the notification log.
pub fn notification_hooks() -> EventHooks {
    let mut hooks = EventHooks::default();
    hooks
        .on_notification(|ev| {
            Box::pin(async move {
                dispatch(ev);
            }) as Pin<Box<dyn Future<Output = ()> + Send>>
        })
        .on_clear_cart(|ev| {
            Box::pin(async move {
                clear_cart(ev);
            }) as Pin<Box<dyn Future<Output = ()> + Send>>
        });
    hooks
}
