use std::fmt;

use gateway_client::GatewayStatus;
use serde::{de, Deserialize, Deserializer, Serialize};
use serde_json::{json, Map, Value};
use spg_common::Cents;

use crate::db_types::OrderNumber;

/// The body of a processor webhook, e.g. `POST /webhooks/transactions`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WebhookPayload {
    #[serde(default)]
    pub event: String,
    pub data: WebhookData,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WebhookData {
    /// The event or transaction id. See [`WebhookData::external_id`].
    #[serde(deserialize_with = "string_or_number")]
    pub id: String,
    pub status: GatewayStatus,
    #[serde(default)]
    pub amount: Option<Cents>,
    #[serde(default)]
    pub payment_method: Option<String>,
    /// The order number we sent as correlation metadata
    pub order_id: OrderNumber,
    #[serde(default, deserialize_with = "opt_string_or_number")]
    pub transaction_id: Option<String>,
    #[serde(default)]
    pub customer_id: Option<String>,
    #[serde(default)]
    pub pix_qr_code: Option<String>,
    #[serde(default)]
    pub pix_copy_paste: Option<String>,
    #[serde(default)]
    pub boleto_barcode: Option<String>,
    #[serde(default)]
    pub boleto_url: Option<String>,
    #[serde(default)]
    pub message: Option<String>,
    #[serde(default)]
    pub created_at: Option<String>,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

impl WebhookData {
    /// The processor's id for the transaction this event is about. `transaction_id` wins over `id` when both are
    /// present, since some events carry their own id in `id`.
    pub fn external_id(&self) -> &str {
        self.transaction_id.as_deref().filter(|s| !s.is_empty()).unwrap_or(&self.id)
    }

    /// The method-specific fields, in the shape notifications expect.
    pub fn details(&self) -> Value {
        let mut details = Map::new();
        let fields = [
            ("pixQrCode", &self.pix_qr_code),
            ("pixCopyPaste", &self.pix_copy_paste),
            ("boletoBarcode", &self.boleto_barcode),
            ("boletoUrl", &self.boleto_url),
            ("message", &self.message),
        ];
        for (k, v) in fields {
            if let Some(v) = v {
                details.insert(k.to_string(), json!(v));
            }
        }
        Value::Object(details)
    }
}

struct StringOrNumber;

impl<'de> de::Visitor<'de> for StringOrNumber {
    type Value = String;

    fn expecting(&self, f: &mut fmt::Formatter) -> fmt::Result {
        f.write_str("a string or an integer")
    }

    fn visit_str<E: de::Error>(self, v: &str) -> Result<String, E> {
        Ok(v.to_string())
    }

    fn visit_u64<E: de::Error>(self, v: u64) -> Result<String, E> {
        Ok(v.to_string())
    }

    fn visit_i64<E: de::Error>(self, v: i64) -> Result<String, E> {
        Ok(v.to_string())
    }
}

fn string_or_number<'de, D: Deserializer<'de>>(d: D) -> Result<String, D::Error> {
    d.deserialize_any(StringOrNumber)
}

fn opt_string_or_number<'de, D: Deserializer<'de>>(d: D) -> Result<Option<String>, D::Error> {
    let v = Option::<Value>::deserialize(d)?;
    match v {
        None | Some(Value::Null) => Ok(None),
        Some(Value::String(s)) => Ok(Some(s)),
        Some(Value::Number(n)) => Ok(Some(n.to_string())),
        Some(other) => Err(de::Error::custom(format!("expected a string or number, got {other}"))),
    }
}
