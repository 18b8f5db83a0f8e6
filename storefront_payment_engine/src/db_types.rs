use std::{fmt::Display, str::FromStr};

use chrono::{DateTime, Utc};
use gateway_client::GatewayStatus;
use log::error;
use serde::{Deserialize, Serialize};
pub use spg_common::{Cents, PaymentMethod};
use sqlx::{FromRow, Type};
use thiserror::Error;

use crate::helpers::new_order_number;

#[derive(Debug, Clone, Error)]
#[error("Invalid status: {0}")]
pub struct ConversionError(String);

//--------------------------------------      OrderNumber      ---------------------------------------------------------
/// The customer-facing order reference, e.g. `ORD-1717171717171-x7Yq2b`. It is also the correlation key the processor
/// echoes back in webhooks.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Type, Serialize, Deserialize)]
#[sqlx(transparent)]
#[serde(transparent)]
pub struct OrderNumber(pub String);

impl OrderNumber {
    pub fn generate() -> Self {
        Self(new_order_number())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl FromStr for OrderNumber {
    type Err = ();

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Ok(Self(s.to_string()))
    }
}

impl From<String> for OrderNumber {
    fn from(s: String) -> Self {
        Self(s)
    }
}

impl From<&str> for OrderNumber {
    fn from(s: &str) -> Self {
        Self(s.to_string())
    }
}

impl Display for OrderNumber {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}

//--------------------------------------   OrderStatusType     ---------------------------------------------------------
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Type, Serialize, Deserialize)]
#[sqlx(rename_all = "snake_case")]
#[serde(rename_all = "snake_case")]
pub enum OrderStatusType {
    /// The order has been persisted but the processor has not been contacted yet.
    Pending,
    /// The processor accepted the transaction; we are waiting for the customer to pay (PIX / boleto) or for the
    /// processor to settle.
    AwaitingPayment,
    /// Payment was approved. The order can be fulfilled.
    Processing,
    /// The order has been handed to the carrier.
    Shipped,
    /// Payment was declined or could not be attempted.
    Cancelled,
    /// The payment was returned to the customer.
    Refunded,
}

impl Display for OrderStatusType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Pending => write!(f, "pending"),
            Self::AwaitingPayment => write!(f, "awaiting_payment"),
            Self::Processing => write!(f, "processing"),
            Self::Shipped => write!(f, "shipped"),
            Self::Cancelled => write!(f, "cancelled"),
            Self::Refunded => write!(f, "refunded"),
        }
    }
}

impl FromStr for OrderStatusType {
    type Err = ConversionError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "pending" => Ok(Self::Pending),
            "awaiting_payment" => Ok(Self::AwaitingPayment),
            "processing" => Ok(Self::Processing),
            "shipped" => Ok(Self::Shipped),
            "cancelled" => Ok(Self::Cancelled),
            "refunded" => Ok(Self::Refunded),
            s => Err(ConversionError(format!("Invalid order status: {s}"))),
        }
    }
}

impl From<String> for OrderStatusType {
    fn from(value: String) -> Self {
        value.parse().unwrap_or_else(|_| {
            error!("Invalid order status: {value}. But this conversion cannot fail. Defaulting to Pending");
            Self::Pending
        })
    }
}

//--------------------------------------     PaymentStatus     ---------------------------------------------------------
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Type, Serialize, Deserialize)]
#[sqlx(rename_all = "snake_case")]
#[serde(rename_all = "snake_case")]
pub enum PaymentStatus {
    Pending,
    Approved,
    Declined,
    Refunded,
}

impl PaymentStatus {
    pub fn is_terminal(&self) -> bool {
        !matches!(self, Self::Pending)
    }

    /// The payment statuses an order may be in for a transition *to* `self` to be legal.
    ///
    /// `pending -> pending` is allowed so that the order status can move from `pending` to `awaiting_payment`.
    /// `approved -> refunded` is the only way out of a terminal state. `declined` and `refunded` are absolute sinks.
    pub fn predecessors(&self) -> &'static [PaymentStatus] {
        match self {
            Self::Pending => &[Self::Pending],
            Self::Approved => &[Self::Pending],
            Self::Declined => &[Self::Pending],
            Self::Refunded => &[Self::Approved],
        }
    }
}

impl Display for PaymentStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Pending => write!(f, "pending"),
            Self::Approved => write!(f, "approved"),
            Self::Declined => write!(f, "declined"),
            Self::Refunded => write!(f, "refunded"),
        }
    }
}

impl FromStr for PaymentStatus {
    type Err = ConversionError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "pending" => Ok(Self::Pending),
            "approved" => Ok(Self::Approved),
            "declined" => Ok(Self::Declined),
            "refunded" => Ok(Self::Refunded),
            s => Err(ConversionError(format!("Invalid payment status: {s}"))),
        }
    }
}

//--------------------------------------   TransactionStatus   ---------------------------------------------------------
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Type, Serialize, Deserialize)]
#[sqlx(rename_all = "snake_case")]
#[serde(rename_all = "snake_case")]
pub enum TransactionStatus {
    Pending,
    Processing,
    Approved,
    Declined,
    Refunded,
}

impl TransactionStatus {
    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Approved | Self::Declined | Self::Refunded)
    }

    /// The statuses a transaction may be in for a transition *to* `self` to be legal.
    pub fn predecessors(&self) -> &'static [TransactionStatus] {
        match self {
            Self::Pending => &[],
            Self::Processing => &[Self::Pending],
            Self::Approved => &[Self::Pending, Self::Processing],
            Self::Declined => &[Self::Pending, Self::Processing],
            Self::Refunded => &[Self::Approved],
        }
    }

    /// Maps a processor status onto our vocabulary. Unrecognized statuses have no counterpart.
    pub fn from_gateway(status: &GatewayStatus) -> Option<Self> {
        match status {
            GatewayStatus::Pending => Some(Self::Pending),
            GatewayStatus::Processing => Some(Self::Processing),
            GatewayStatus::Approved => Some(Self::Approved),
            GatewayStatus::Declined => Some(Self::Declined),
            GatewayStatus::Refunded => Some(Self::Refunded),
            GatewayStatus::Unrecognized(_) => None,
        }
    }
}

impl Display for TransactionStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Pending => write!(f, "pending"),
            Self::Processing => write!(f, "processing"),
            Self::Approved => write!(f, "approved"),
            Self::Declined => write!(f, "declined"),
            Self::Refunded => write!(f, "refunded"),
        }
    }
}

//--------------------------------------    OrderTransition    ---------------------------------------------------------
/// A target (order status, payment status) pair. Orders only ever move between these pairs.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct OrderTransition {
    pub status: OrderStatusType,
    pub payment_status: PaymentStatus,
}

impl OrderTransition {
    pub const APPROVED: Self = Self { status: OrderStatusType::Processing, payment_status: PaymentStatus::Approved };
    pub const AWAITING_PAYMENT: Self =
        Self { status: OrderStatusType::AwaitingPayment, payment_status: PaymentStatus::Pending };
    pub const DECLINED: Self = Self { status: OrderStatusType::Cancelled, payment_status: PaymentStatus::Declined };
    pub const REFUNDED: Self = Self { status: OrderStatusType::Refunded, payment_status: PaymentStatus::Refunded };

    /// The order state a processor status implies. Unrecognized statuses imply nothing.
    pub fn for_gateway_status(status: &GatewayStatus) -> Option<Self> {
        match status {
            GatewayStatus::Approved => Some(Self::APPROVED),
            GatewayStatus::Declined => Some(Self::DECLINED),
            GatewayStatus::Pending | GatewayStatus::Processing => Some(Self::AWAITING_PAYMENT),
            GatewayStatus::Refunded => Some(Self::REFUNDED),
            GatewayStatus::Unrecognized(_) => None,
        }
    }
}

impl Display for OrderTransition {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "({}, {})", self.status, self.payment_status)
    }
}

//--------------------------------------       LineItem        ---------------------------------------------------------
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LineItem {
    pub product_id: String,
    pub name: String,
    pub quantity: u32,
    pub unit_price: Cents,
}

impl LineItem {
    pub fn new<S: Into<String>>(product_id: S, name: S, quantity: u32, unit_price: Cents) -> Self {
        Self { product_id: product_id.into(), name: name.into(), quantity, unit_price }
    }

    /// `unit_price * quantity`, or `None` on overflow
    pub fn subtotal(&self) -> Option<Cents> {
        self.unit_price.checked_mul(i64::from(self.quantity))
    }
}

//--------------------------------------        Address        ---------------------------------------------------------
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Address {
    #[serde(default)]
    pub recipient: Option<String>,
    #[serde(default)]
    pub street: String,
    #[serde(default)]
    pub number: String,
    #[serde(default)]
    pub complement: Option<String>,
    #[serde(default)]
    pub neighborhood: Option<String>,
    #[serde(default)]
    pub city: String,
    #[serde(default)]
    pub state: String,
    #[serde(default, alias = "cep")]
    pub zip_code: String,
}

impl Address {
    /// The names of required fields that are blank.
    pub fn missing_fields(&self) -> Vec<&'static str> {
        [
            ("street", &self.street),
            ("number", &self.number),
            ("city", &self.city),
            ("state", &self.state),
            ("zipCode", &self.zip_code),
        ]
        .into_iter()
        .filter(|(_, v)| v.trim().is_empty())
        .map(|(k, _)| k)
        .collect()
    }
}

//--------------------------------------         Order         ---------------------------------------------------------
#[derive(Debug, Clone, PartialEq, Eq, FromRow, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Order {
    pub id: i64,
    pub order_number: OrderNumber,
    pub user_id: Option<String>,
    pub customer_email: Option<String>,
    #[sqlx(json)]
    pub items: Vec<LineItem>,
    #[sqlx(json)]
    pub shipping_address: Address,
    pub payment_method: PaymentMethod,
    pub installments: i64,
    pub total_amount: Cents,
    pub status: OrderStatusType,
    pub payment_status: PaymentStatus,
    pub transaction_id: Option<i64>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Order {
    pub fn current_state(&self) -> OrderTransition {
        OrderTransition { status: self.status, payment_status: self.payment_status }
    }
}

//--------------------------------------       NewOrder        ---------------------------------------------------------
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NewOrder {
    pub order_number: OrderNumber,
    pub user_id: Option<String>,
    pub customer_email: Option<String>,
    pub items: Vec<LineItem>,
    pub shipping_address: Address,
    pub payment_method: PaymentMethod,
    pub installments: u8,
    pub total_amount: Cents,
}

impl NewOrder {
    /// Creates a new order draft with a fresh order number. The total is derived from the line items and is `None` if
    /// it would overflow.
    pub fn new(items: Vec<LineItem>, shipping_address: Address, payment_method: PaymentMethod) -> Option<Self> {
        let total_amount = total_for_items(&items)?;
        Some(Self {
            order_number: OrderNumber::generate(),
            user_id: None,
            customer_email: None,
            items,
            shipping_address,
            payment_method,
            installments: 1,
            total_amount,
        })
    }

    pub fn with_user_id<S: Into<String>>(mut self, user_id: S) -> Self {
        self.user_id = Some(user_id.into());
        self
    }

    pub fn with_customer_email<S: Into<String>>(mut self, email: S) -> Self {
        self.customer_email = Some(email.into());
        self
    }

    pub fn with_installments(mut self, installments: u8) -> Self {
        self.installments = installments;
        self
    }
}

/// Σ(unit price × quantity), or `None` on overflow
pub fn total_for_items(items: &[LineItem]) -> Option<Cents> {
    items.iter().try_fold(Cents::default(), |acc, item| acc.checked_add(item.subtotal()?))
}

//--------------------------------------      Transaction      ---------------------------------------------------------
#[derive(Debug, Clone, PartialEq, Eq, FromRow, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Transaction {
    pub id: i64,
    pub order_id: i64,
    pub external_id: String,
    pub amount: Cents,
    pub status: TransactionStatus,
    pub payment_method: PaymentMethod,
    pub installments: i64,
    #[serde(skip_serializing)]
    pub raw_response: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NewTransaction {
    pub order_id: i64,
    pub external_id: String,
    pub amount: Cents,
    pub status: TransactionStatus,
    pub payment_method: PaymentMethod,
    pub installments: u8,
    pub raw_response: Option<String>,
}

/// Identifies a transaction either by our id or by the processor's id.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TransactionRef {
    Id(i64),
    ExternalId(String),
}

impl Display for TransactionRef {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Id(id) => write!(f, "#{id}"),
            Self::ExternalId(id) => write!(f, "[{id}]"),
        }
    }
}

//--------------------------------------  OrderStatusHistory   ---------------------------------------------------------
/// One row of the audit trail the database keeps of every order status change.
#[derive(Debug, Clone, PartialEq, Eq, FromRow, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct OrderStatusEntry {
    pub id: i64,
    pub order_id: i64,
    pub status: OrderStatusType,
    pub payment_status: PaymentStatus,
    pub changed_at: DateTime<Utc>,
}

//--------------------------------------     CatalogEntry      ---------------------------------------------------------
/// The server-side price of a product, maintained by the catalog service.
#[derive(Debug, Clone, PartialEq, Eq, FromRow, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CatalogEntry {
    pub product_id: String,
    pub name: String,
    pub unit_price: Cents,
    pub updated_at: DateTime<Utc>,
}

//--------------------------------------   TransitionResult    ---------------------------------------------------------
/// The outcome of a compare-and-set status transition.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TransitionResult<T> {
    /// The record moved to the requested state. Side effects (notifications) belong to whoever got this result.
    Applied(T),
    /// The record was not in a legal predecessor state (most often: it already reached the requested state). The
    /// current record is returned unchanged.
    Unchanged(T),
}

impl<T> TransitionResult<T> {
    pub fn is_applied(&self) -> bool {
        matches!(self, Self::Applied(_))
    }

    pub fn inner(&self) -> &T {
        match self {
            Self::Applied(t) | Self::Unchanged(t) => t,
        }
    }

    pub fn into_inner(self) -> T {
        match self {
            Self::Applied(t) | Self::Unchanged(t) => t,
        }
    }
}
