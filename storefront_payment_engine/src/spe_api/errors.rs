use thiserror::Error;

use crate::{db_types::OrderNumber, traits::PaymentGatewayError};

#[derive(Debug, Clone, Error)]
pub enum CheckoutError {
    #[error("The checkout request is invalid: {}", .0.join("; "))]
    Validation(Vec<String>),
    #[error("The payment gateway rejected our credentials. Order {order_number} was cancelled.")]
    GatewayAuthentication { order_number: OrderNumber },
    #[error("The payment gateway is unavailable. Order {order_number} was cancelled. {reason}")]
    GatewayUnavailable { order_number: OrderNumber, reason: String },
    #[error("The payment gateway rejected the payment for order {order_number}. {reason}")]
    GatewayRejected { order_number: OrderNumber, reason: String },
    #[error("Order {0} does not exist")]
    OrderNotFound(OrderNumber),
    #[error("Order {0} cannot be refunded. {1}")]
    NotRefundable(OrderNumber, String),
    #[error("Database error: {0}")]
    DatabaseError(#[from] PaymentGatewayError),
}

impl CheckoutError {
    pub fn validation<S: Into<String>>(msg: S) -> Self {
        Self::Validation(vec![msg.into()])
    }
}

#[derive(Debug, Clone, Error)]
pub enum WebhookError {
    #[error("Webhook refers to an unknown order {0}")]
    UnknownOrder(OrderNumber),
    #[error("Webhook payload could not be parsed. {0}")]
    InvalidPayload(String),
    #[error("Database error: {0}")]
    DatabaseError(#[from] PaymentGatewayError),
}
