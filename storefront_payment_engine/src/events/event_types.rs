use std::fmt::Display;

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::db_types::{Order, OrderNumber, Transaction};

/// The customer-facing messages the engine asks the notification service to send.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum NotificationKind {
    /// Sent when a card payment is approved synchronously at checkout
    OrderConfirmation,
    /// Sent when a pending payment is later confirmed (webhook or reconciliation)
    PaymentApproved,
    PaymentDeclined,
    /// Carries the PIX QR code / copy-paste code
    PaymentPendingPix,
    /// Carries the boleto barcode / PDF link
    PaymentPendingBoleto,
    PaymentRefunded,
}

impl Display for NotificationKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            Self::OrderConfirmation => "order_confirmation",
            Self::PaymentApproved => "payment_approved",
            Self::PaymentDeclined => "payment_declined",
            Self::PaymentPendingPix => "payment_pending_pix",
            Self::PaymentPendingBoleto => "payment_pending_boleto",
            Self::PaymentRefunded => "payment_refunded",
        };
        f.write_str(s)
    }
}

/// A request to notify the customer about their order. Emitted at most once per actual state change.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NotificationEvent {
    pub kind: NotificationKind,
    pub order: Order,
    pub transaction: Option<Transaction>,
    /// Method-specific details: payment instructions, decline reason and the like
    pub details: Value,
}

impl NotificationEvent {
    pub fn new(kind: NotificationKind, order: Order) -> Self {
        Self { kind, order, transaction: None, details: Value::Null }
    }

    pub fn with_transaction(mut self, transaction: Transaction) -> Self {
        self.transaction = Some(transaction);
        self
    }

    pub fn with_details(mut self, details: Value) -> Self {
        self.details = details;
        self
    }
}

/// The customer's payment went through, so their cart can be emptied.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ClearCartEvent {
    pub user_id: String,
    pub order_number: OrderNumber,
}
