use gateway_client::{BoletoInstructions, PixInstructions};
use serde::{Deserialize, Serialize};
use spg_common::PaymentMethod;

use crate::{
    db_types::{Address, Order, OrderStatusEntry, Transaction},
    helpers::CardData,
};

/// A cart line as submitted by the storefront. Only the product reference and quantity are trusted; prices come from
/// the catalog.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CartItemRequest {
    pub product_id: String,
    pub quantity: i64,
}

impl CartItemRequest {
    pub fn new<S: Into<String>>(product_id: S, quantity: i64) -> Self {
        Self { product_id: product_id.into(), quantity }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CustomerInfo {
    #[serde(default)]
    pub name: Option<String>,
    #[serde(default)]
    pub email: Option<String>,
    #[serde(default)]
    pub phone: Option<String>,
    /// CPF or CNPJ
    #[serde(default)]
    pub document: Option<String>,
}

fn default_installments() -> u8 {
    1
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CheckoutRequest {
    pub items: Vec<CartItemRequest>,
    #[serde(alias = "address")]
    pub shipping_address: Address,
    pub payment_method: PaymentMethod,
    #[serde(default)]
    pub card_data: Option<CardData>,
    #[serde(default = "default_installments")]
    pub installments: u8,
    #[serde(default)]
    pub customer: Option<CustomerInfo>,
    #[serde(default)]
    pub user_id: Option<String>,
    /// Filled in by the server from the connection, never from the body
    #[serde(skip)]
    pub client_ip: Option<String>,
}

impl CheckoutRequest {
    pub fn new(items: Vec<CartItemRequest>, shipping_address: Address, payment_method: PaymentMethod) -> Self {
        Self {
            items,
            shipping_address,
            payment_method,
            card_data: None,
            installments: 1,
            customer: None,
            user_id: None,
            client_ip: None,
        }
    }

    pub fn with_card(mut self, card: CardData, installments: u8) -> Self {
        self.card_data = Some(card);
        self.installments = installments;
        self
    }

    pub fn with_user_id<S: Into<String>>(mut self, user_id: S) -> Self {
        self.user_id = Some(user_id.into());
        self
    }

    pub fn with_customer(mut self, customer: CustomerInfo) -> Self {
        self.customer = Some(customer);
        self
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "outcome", rename_all = "snake_case")]
pub enum CheckoutOutcome {
    Approved,
    AwaitingPayment,
    Declined { reason: String },
}

/// What the customer needs to complete an asynchronous payment.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct PaymentInstructions {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub pix: Option<PixInstructions>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub boleto: Option<BoletoInstructions>,
}

impl PaymentInstructions {
    pub fn is_empty(&self) -> bool {
        self.pix.is_none() && self.boleto.is_none()
    }
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CheckoutResult {
    pub order: Order,
    pub transaction: Option<Transaction>,
    #[serde(flatten)]
    pub outcome: CheckoutOutcome,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub instructions: Option<PaymentInstructions>,
}

/// An order together with its latest transaction and audit trail.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct OrderDetails {
    pub order: Order,
    pub transaction: Option<Transaction>,
    pub history: Vec<OrderStatusEntry>,
}
