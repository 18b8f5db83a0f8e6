//! Opaque card tokens.
//!
//! A token is `card_<payload>.<tag>` where `payload` is base64url-encoded JSON carrying the brand, last four digits,
//! expiry and issue time, and `tag` is an HMAC-SHA256 of the payload under the service's token key. The token never
//! contains the card number or CVV. Anyone holding the key can decode and check a token without any stored state.
use chrono::Utc;
use hmac::{Hmac, Mac};
use serde::{Deserialize, Serialize};
use sha2::Sha256;
use spg_common::Secret;
use thiserror::Error;

use super::card_validator::{validate_card, CardBrand, CardData};

pub const CARD_TOKEN_PREFIX: &str = "card_";

type HmacSha256 = Hmac<Sha256>;

#[derive(Debug, Clone, Error)]
pub enum CardTokenError {
    #[error("Cannot tokenize an invalid card: {}", .0.join(", "))]
    InvalidCard(Vec<String>),
    #[error("The token is not in the expected format")]
    Malformed,
    #[error("The token was not issued by this service")]
    BadSignature,
    #[error("Could not initialise the token key: {0}")]
    KeyError(String),
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TokenInfo {
    pub brand: CardBrand,
    pub last_digits: String,
    pub expiry_date: String,
    /// Unix millis at which the token was issued
    pub timestamp: i64,
}

#[derive(Clone)]
pub struct CardTokenizer {
    key: Secret<String>,
}

impl CardTokenizer {
    pub fn new(key: Secret<String>) -> Self {
        Self { key }
    }

    /// Validates the card and issues a token for it. Invalid cards are rejected with the full list of problems.
    pub fn issue_token(&self, card: &CardData) -> Result<String, CardTokenError> {
        let validation = validate_card(card);
        if !validation.valid {
            return Err(CardTokenError::InvalidCard(validation.errors));
        }
        let info = TokenInfo {
            brand: validation.brand.unwrap_or(CardBrand::Unknown),
            last_digits: validation.last4.unwrap_or_default(),
            expiry_date: card.expiry.trim().to_string(),
            timestamp: Utc::now().timestamp_millis(),
        };
        let json = serde_json::to_vec(&info).map_err(|_| CardTokenError::Malformed)?;
        let payload = base64::encode_config(json, base64::URL_SAFE_NO_PAD);
        let tag = self.sign(payload.as_bytes())?;
        Ok(format!("{CARD_TOKEN_PREFIX}{payload}.{tag}"))
    }

    /// True if the token was issued by this service and decodes to a complete [`TokenInfo`].
    pub fn validate_token(&self, token: &str) -> bool {
        self.decode_token(token).is_ok()
    }

    pub fn decode_token(&self, token: &str) -> Result<TokenInfo, CardTokenError> {
        let body = token.strip_prefix(CARD_TOKEN_PREFIX).ok_or(CardTokenError::Malformed)?;
        let (payload, tag) = body.split_once('.').ok_or(CardTokenError::Malformed)?;
        let tag = base64::decode_config(tag, base64::URL_SAFE_NO_PAD).map_err(|_| CardTokenError::Malformed)?;
        let mut mac = self.mac()?;
        mac.update(payload.as_bytes());
        mac.verify_slice(&tag).map_err(|_| CardTokenError::BadSignature)?;
        let json = base64::decode_config(payload, base64::URL_SAFE_NO_PAD).map_err(|_| CardTokenError::Malformed)?;
        let info: TokenInfo = serde_json::from_slice(&json).map_err(|_| CardTokenError::Malformed)?;
        if info.last_digits.is_empty() || info.expiry_date.is_empty() {
            return Err(CardTokenError::Malformed);
        }
        Ok(info)
    }

    fn mac(&self) -> Result<HmacSha256, CardTokenError> {
        HmacSha256::new_from_slice(self.key.reveal().as_bytes()).map_err(|e| CardTokenError::KeyError(e.to_string()))
    }

    fn sign(&self, data: &[u8]) -> Result<String, CardTokenError> {
        let mut mac = self.mac()?;
        mac.update(data);
        Ok(base64::encode_config(mac.finalize().into_bytes(), base64::URL_SAFE_NO_PAD))
    }
}
