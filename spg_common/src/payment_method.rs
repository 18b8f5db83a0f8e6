use std::{fmt::Display, str::FromStr};

use serde::{Deserialize, Serialize};
use sqlx::Type;
use thiserror::Error;

/// The ways a customer can pay for an order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Type, Serialize, Deserialize)]
#[sqlx(rename_all = "SCREAMING_SNAKE_CASE")]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum PaymentMethod {
    /// Instant bank transfer, settled asynchronously once the customer scans the QR code.
    Pix,
    /// Bank slip, settled asynchronously, usually days later.
    Boleto,
    /// Credit card, usually settled synchronously.
    CreditCard,
}

impl PaymentMethod {
    /// True for methods whose outcome is normally only known after the checkout call has returned.
    pub fn is_asynchronous(&self) -> bool {
        matches!(self, Self::Pix | Self::Boleto)
    }
}

impl Display for PaymentMethod {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Pix => write!(f, "PIX"),
            Self::Boleto => write!(f, "BOLETO"),
            Self::CreditCard => write!(f, "CREDIT_CARD"),
        }
    }
}

#[derive(Debug, Clone, Error)]
#[error("Invalid payment method: {0}")]
pub struct PaymentMethodParseError(String);

impl FromStr for PaymentMethod {
    type Err = PaymentMethodParseError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_uppercase().as_str() {
            "PIX" => Ok(Self::Pix),
            "BOLETO" => Ok(Self::Boleto),
            "CREDIT_CARD" | "CREDITCARD" | "CARD" => Ok(Self::CreditCard),
            _ => Err(PaymentMethodParseError(s.to_string())),
        }
    }
}
