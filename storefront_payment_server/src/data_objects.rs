use std::fmt::Display;

use serde::{Deserialize, Serialize};
use storefront_payment_engine::{
    db_types::{Cents, Order, OrderNumber, OrderStatusType, PaymentStatus},
    helpers::{CardBrand, InstallmentOption},
    AppliedUpdate,
};

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct JsonResponse {
    pub success: bool,
    pub message: String,
}

impl JsonResponse {
    pub fn success<S: Display>(message: S) -> Self {
        Self { success: true, message: message.to_string() }
    }

    pub fn failure<S: Display>(message: S) -> Self {
        Self { success: false, message: message.to_string() }
    }
}

/// Optional body of a refund request. Without an amount the full order is refunded.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct RefundParams {
    #[serde(default)]
    pub amount: Option<Cents>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct InstallmentsRequest {
    pub total_amount: Cents,
    #[serde(default)]
    pub card_brand: Option<CardBrand>,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct InstallmentsResponse {
    pub total_amount: Cents,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub card_brand: Option<CardBrand>,
    pub max_installments: u8,
    pub interest_rate: f64,
    pub options: Vec<InstallmentOption>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DetectBrandRequest {
    #[serde(alias = "number")]
    pub card_number: String,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct DetectBrandResponse {
    pub brand: CardBrand,
    pub supported: bool,
    pub max_installments: u8,
    pub interest_rate: f64,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CardValidationResponse {
    pub valid: bool,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub errors: Vec<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub brand: Option<CardBrand>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub last_digits: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub masked: Option<String>,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CardTokenResponse {
    pub success: bool,
    pub token: String,
    pub brand: CardBrand,
    pub last_digits: String,
    pub masked: String,
}

/// What the webhook endpoint returns to the processor.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct WebhookAck {
    pub success: bool,
    pub order_number: OrderNumber,
    pub status: OrderStatusType,
    pub payment_status: PaymentStatus,
    /// False when the delivery did not change anything (duplicates, late or out-of-order statuses)
    pub applied: bool,
}

impl From<&AppliedUpdate> for WebhookAck {
    fn from(update: &AppliedUpdate) -> Self {
        let order: &Order = update.order.inner();
        Self {
            success: true,
            order_number: order.order_number.clone(),
            status: order.status,
            payment_status: order.payment_status,
            applied: update.is_applied(),
        }
    }
}
