use std::fmt::Display;

use serde::{de, Deserialize, Deserializer, Serialize};
use serde_json::{Map, Value};
use spg_common::{Cents, PaymentMethod, CURRENCY_CODE};

//--------------------------------------     GatewayStatus     --------------------------------------------------------
/// The status of a transaction as reported by the processor.
///
/// Statuses the processor may add in future are kept verbatim in `Unrecognized` rather than being rejected, so that a
/// new status never causes a webhook or poll response to be dropped.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(from = "String", into = "String")]
pub enum GatewayStatus {
    Pending,
    Processing,
    Approved,
    Declined,
    Refunded,
    Unrecognized(String),
}

impl GatewayStatus {
    /// True when the processor will not change its mind about this transaction any more (refunds aside).
    pub fn is_resolved(&self) -> bool {
        matches!(self, Self::Approved | Self::Declined | Self::Refunded)
    }

    pub fn as_str(&self) -> &str {
        match self {
            Self::Pending => "pending",
            Self::Processing => "processing",
            Self::Approved => "approved",
            Self::Declined => "declined",
            Self::Refunded => "refunded",
            Self::Unrecognized(s) => s.as_str(),
        }
    }
}

impl From<String> for GatewayStatus {
    fn from(value: String) -> Self {
        match value.trim().to_ascii_lowercase().as_str() {
            "pending" | "waiting_payment" => Self::Pending,
            "processing" => Self::Processing,
            "approved" | "paid" => Self::Approved,
            "declined" | "refused" => Self::Declined,
            "refunded" => Self::Refunded,
            _ => Self::Unrecognized(value),
        }
    }
}

impl From<&str> for GatewayStatus {
    fn from(value: &str) -> Self {
        Self::from(value.to_string())
    }
}

impl From<GatewayStatus> for String {
    fn from(value: GatewayStatus) -> Self {
        value.as_str().to_string()
    }
}

impl Display for GatewayStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

//--------------------------------------   GatewayTransaction   -------------------------------------------------------
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PixInstructions {
    #[serde(default)]
    pub qr_code: Option<String>,
    #[serde(default)]
    pub qr_code_url: Option<String>,
    #[serde(default)]
    pub copy_paste: Option<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BoletoInstructions {
    #[serde(default)]
    pub barcode: Option<String>,
    #[serde(default)]
    pub barcode_url: Option<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CardSummary {
    #[serde(default)]
    pub last_digits: Option<String>,
    #[serde(default)]
    pub brand: Option<String>,
}

/// A transaction as returned by the processor's create, status and refund endpoints.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GatewayTransaction {
    #[serde(deserialize_with = "string_or_number")]
    pub id: String,
    pub status: GatewayStatus,
    #[serde(default)]
    pub amount: Option<Cents>,
    #[serde(default)]
    pub currency: Option<String>,
    #[serde(default)]
    pub payment_method: Option<String>,
    #[serde(default)]
    pub pix: Option<PixInstructions>,
    #[serde(default)]
    pub boleto: Option<BoletoInstructions>,
    #[serde(default)]
    pub card: Option<CardSummary>,
    /// Human-readable explanation, usually only present on declines
    #[serde(default)]
    pub message: Option<String>,
    #[serde(default)]
    pub created_at: Option<String>,
    /// Any fields not modelled above. They are kept so that the raw payload we persist is complete.
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

impl GatewayTransaction {
    pub fn new<S: Into<String>>(id: S, status: GatewayStatus) -> Self {
        Self {
            id: id.into(),
            status,
            amount: None,
            currency: None,
            payment_method: None,
            pix: None,
            boleto: None,
            card: None,
            message: None,
            created_at: None,
            extra: Map::new(),
        }
    }

    pub fn with_amount(mut self, amount: Cents) -> Self {
        self.amount = Some(amount);
        self
    }

    pub fn with_pix(mut self, pix: PixInstructions) -> Self {
        self.pix = Some(pix);
        self
    }

    pub fn with_boleto(mut self, boleto: BoletoInstructions) -> Self {
        self.boleto = Some(boleto);
        self
    }

    pub fn with_message<S: Into<String>>(mut self, message: S) -> Self {
        self.message = Some(message.into());
        self
    }

    /// The transaction serialized back to JSON, for storing as the raw gateway payload.
    pub fn raw_json(&self) -> String {
        serde_json::to_string(self).unwrap_or_default()
    }
}

/// The processor wraps every response in this envelope.
#[derive(Debug, Clone, Deserialize)]
pub struct GatewayResponse {
    #[serde(default)]
    pub status: Option<u16>,
    #[serde(default)]
    pub message: Option<String>,
    #[serde(default)]
    pub data: Option<GatewayTransaction>,
    #[serde(default)]
    pub error: Option<String>,
}

fn string_or_number<'de, D: Deserializer<'de>>(deserializer: D) -> Result<String, D::Error> {
    match Value::deserialize(deserializer)? {
        Value::String(s) => Ok(s),
        Value::Number(n) => Ok(n.to_string()),
        other => Err(de::Error::custom(format!("expected a string or number id, got {other}"))),
    }
}

//--------------------------------------  CreateTransactionRequest ----------------------------------------------------
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct GatewayItem {
    pub title: String,
    pub unit_price: Cents,
    pub quantity: u32,
    pub tangible: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub external_ref: Option<String>,
}

#[derive(Debug, Clone, Serialize)]
pub struct GatewayDocument {
    pub number: String,
    #[serde(rename = "type")]
    pub document_type: String,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct GatewayAddress {
    pub street: String,
    pub street_number: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub complement: Option<String>,
    pub zip_code: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub neighborhood: Option<String>,
    pub city: String,
    pub state: String,
    pub country: String,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct GatewayCustomer {
    pub name: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub email: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub phone: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub document: Option<GatewayDocument>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub address: Option<GatewayAddress>,
}

#[derive(Debug, Clone, Serialize)]
pub struct GatewayShipping {
    pub fee: Cents,
    pub address: GatewayAddress,
}

/// Card details sent to the processor. Only the opaque token and display data are ever included.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CardDetails {
    pub token: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub brand: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub last_digits: Option<String>,
}

#[derive(Debug, Clone, Copy, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ExpiryDetails {
    pub expires_in_days: u32,
}

/// The method-specific part of a transaction request. It is flattened into the request body, producing a `card`,
/// `pix` or `boleto` block.
#[derive(Debug, Clone, Serialize)]
#[serde(untagged)]
pub enum MethodDetails {
    Card { card: CardDetails, installments: u8 },
    Pix { pix: ExpiryDetails },
    Boleto { boleto: ExpiryDetails },
}

impl MethodDetails {
    pub fn payment_method(&self) -> PaymentMethod {
        match self {
            Self::Card { .. } => PaymentMethod::CreditCard,
            Self::Pix { .. } => PaymentMethod::Pix,
            Self::Boleto { .. } => PaymentMethod::Boleto,
        }
    }
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CreateTransactionRequest {
    pub amount: Cents,
    pub currency: String,
    pub payment_method: PaymentMethod,
    pub description: String,
    pub items: Vec<GatewayItem>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub customer: Option<GatewayCustomer>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub shipping: Option<GatewayShipping>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub postback_url: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub ip: Option<String>,
    /// JSON-encoded correlation data. The processor echoes the order number back in webhooks.
    pub metadata: String,
    #[serde(flatten)]
    pub method: MethodDetails,
    #[serde(skip)]
    order_number: String,
}

impl CreateTransactionRequest {
    pub fn new<S: Into<String>>(order_number: S, amount: Cents, method: MethodDetails) -> Self {
        let order_number = order_number.into();
        let metadata = serde_json::json!({ "orderId": order_number }).to_string();
        Self {
            amount,
            currency: CURRENCY_CODE.to_string(),
            payment_method: method.payment_method(),
            description: format!("Order {order_number}"),
            items: vec![],
            customer: None,
            shipping: None,
            postback_url: None,
            ip: None,
            metadata,
            method,
            order_number,
        }
    }

    pub fn order_number(&self) -> &str {
        self.order_number.as_str()
    }

    pub fn with_items(mut self, items: Vec<GatewayItem>) -> Self {
        self.items = items;
        self
    }

    pub fn with_customer(mut self, customer: GatewayCustomer) -> Self {
        self.customer = Some(customer);
        self
    }

    pub fn with_customer_id(mut self, customer_id: &str) -> Self {
        self.metadata = serde_json::json!({ "orderId": self.order_number, "customerId": customer_id }).to_string();
        self
    }

    pub fn with_shipping(mut self, shipping: GatewayShipping) -> Self {
        self.shipping = Some(shipping);
        self
    }

    pub fn with_postback_url<S: Into<String>>(mut self, url: S) -> Self {
        self.postback_url = Some(url.into());
        self
    }

    pub fn with_ip<S: Into<String>>(mut self, ip: S) -> Self {
        self.ip = Some(ip.into());
        self
    }

    /// Falls back to a single line item covering the whole amount when none were supplied.
    pub fn items_or_default(&self) -> Vec<GatewayItem> {
        if !self.items.is_empty() {
            return self.items.clone();
        }
        vec![GatewayItem {
            title: self.description.clone(),
            unit_price: self.amount,
            quantity: 1,
            tangible: true,
            external_ref: Some(self.order_number.clone()),
        }]
    }
}
