//! Card number, expiry and CVV checks.
//!
//! These are format checks only. Whether a card can actually be charged is up to the processor.
use std::fmt::{Debug, Display};

use chrono::{Datelike, NaiveDate, Utc};
use once_cell::sync::Lazy;
use regex::Regex;
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum CardBrand {
    Visa,
    Mastercard,
    Amex,
    Diners,
    Discover,
    Jcb,
    Elo,
    Hipercard,
    Unknown,
}

impl CardBrand {
    pub fn cvv_length(&self) -> usize {
        match self {
            Self::Amex => 4,
            _ => 3,
        }
    }

    /// Brands the storefront advertises. Other brands are still passed on to the processor.
    pub fn is_supported(&self) -> bool {
        matches!(self, Self::Visa | Self::Mastercard | Self::Amex | Self::Diners | Self::Elo | Self::Hipercard)
    }
}

impl Display for CardBrand {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            Self::Visa => "VISA",
            Self::Mastercard => "MASTERCARD",
            Self::Amex => "AMEX",
            Self::Diners => "DINERS",
            Self::Discover => "DISCOVER",
            Self::Jcb => "JCB",
            Self::Elo => "ELO",
            Self::Hipercard => "HIPERCARD",
            Self::Unknown => "UNKNOWN",
        };
        f.write_str(s)
    }
}

static BRAND_PATTERNS: Lazy<Vec<(CardBrand, Regex)>> = Lazy::new(|| {
    [
        (CardBrand::Visa, r"^4[0-9]{12}(?:[0-9]{3})?$"),
        (CardBrand::Mastercard, r"^5[1-5][0-9]{14}$"),
        (CardBrand::Amex, r"^3[47][0-9]{13}$"),
        (CardBrand::Diners, r"^3(?:0[0-5]|[68][0-9])[0-9]{11}$"),
        (CardBrand::Discover, r"^6(?:011|5[0-9]{2})[0-9]{12}$"),
        (CardBrand::Jcb, r"^(?:2131|1800|35[0-9]{3})[0-9]{11}$"),
        (CardBrand::Elo, r"^63[0-9]{14}$"),
        (CardBrand::Hipercard, r"^606282[0-9]{10}$"),
    ]
    .into_iter()
    .filter_map(|(brand, pattern)| Regex::new(pattern).ok().map(|re| (brand, re)))
    .collect()
});

/// Card data as typed by the customer. It is only ever held in memory for the duration of a request.
///
/// `Debug` is implemented by hand so that the number and CVV can never end up in a log line.
#[derive(Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CardData {
    #[serde(alias = "cardNumber")]
    pub number: String,
    #[serde(alias = "cardHolder")]
    pub holder: String,
    #[serde(alias = "expiryDate")]
    pub expiry: String,
    pub cvv: String,
}

impl CardData {
    pub fn new<S: Into<String>>(number: S, holder: S, expiry: S, cvv: S) -> Self {
        Self { number: number.into(), holder: holder.into(), expiry: expiry.into(), cvv: cvv.into() }
    }

    pub fn last4(&self) -> String {
        let digits = digits_only(&self.number);
        digits[digits.len().saturating_sub(4)..].to_string()
    }
}

impl Debug for CardData {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CardData")
            .field("number", &mask_card_number(&self.number))
            .field("holder", &self.holder)
            .field("expiry", &self.expiry)
            .field("cvv", &"***")
            .finish()
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CardValidation {
    pub valid: bool,
    pub errors: Vec<String>,
    pub brand: Option<CardBrand>,
    pub last4: Option<String>,
}

pub fn digits_only(s: &str) -> String {
    s.chars().filter(char::is_ascii_digit).collect()
}

/// Luhn check on the digits of `number`. Separators are ignored; 13 to 19 digits are required.
pub fn validate_card_number(number: &str) -> bool {
    let digits = digits_only(number);
    if !(13..=19).contains(&digits.len()) {
        return false;
    }
    let sum: u32 = digits
        .bytes()
        .rev()
        .enumerate()
        .map(|(i, b)| {
            let d = u32::from(b - b'0');
            if i % 2 == 1 {
                let doubled = d * 2;
                if doubled > 9 {
                    doubled - 9
                } else {
                    doubled
                }
            } else {
                d
            }
        })
        .sum();
    sum % 10 == 0
}

pub fn detect_brand(number: &str) -> CardBrand {
    let digits = digits_only(number);
    BRAND_PATTERNS.iter().find(|(_, re)| re.is_match(&digits)).map(|(brand, _)| *brand).unwrap_or(CardBrand::Unknown)
}

/// Checks an `MM/YY` expiry against the current month.
pub fn validate_expiry(expiry: &str) -> bool {
    validate_expiry_at(expiry, Utc::now().date_naive())
}

/// Checks an `MM/YY` expiry against the month of `today`. A card is valid through the last day of its expiry month.
pub fn validate_expiry_at(expiry: &str, today: NaiveDate) -> bool {
    let Some((month, year)) = expiry.trim().split_once('/') else {
        return false;
    };
    if month.len() != 2 || year.len() != 2 {
        return false;
    }
    let (Ok(month), Ok(year)) = (month.parse::<u32>(), year.parse::<i32>()) else {
        return false;
    };
    if !(1..=12).contains(&month) {
        return false;
    }
    let century = today.year() - today.year() % 100;
    (century + year, month) >= (today.year(), today.month())
}

pub fn validate_cvv(cvv: &str, brand: CardBrand) -> bool {
    !cvv.is_empty() && cvv.chars().all(|c| c.is_ascii_digit()) && cvv.len() == brand.cvv_length()
}

/// Validates every field of the card and reports all problems found, not just the first.
pub fn validate_card(card: &CardData) -> CardValidation {
    let mut errors = Vec::new();
    let number = digits_only(&card.number);
    if card.number.trim().is_empty() {
        errors.push("Card number is required".to_string());
    } else if !validate_card_number(&card.number) {
        errors.push("Card number is invalid".to_string());
    }
    let holder = card.holder.trim();
    if holder.is_empty() {
        errors.push("Card holder name is required".to_string());
    } else if holder.chars().count() < 3 {
        errors.push("Card holder name must be at least 3 characters".to_string());
    }
    if card.expiry.trim().is_empty() {
        errors.push("Expiry date is required".to_string());
    } else if !validate_expiry(&card.expiry) {
        errors.push("Expiry date is invalid or the card has expired".to_string());
    }
    let brand = detect_brand(&number);
    if card.cvv.trim().is_empty() {
        errors.push("CVV is required".to_string());
    } else if !validate_cvv(card.cvv.trim(), brand) {
        errors.push(format!("CVV must be {} digits for {brand} cards", brand.cvv_length()));
    }
    let last4 = (number.len() >= 4).then(|| card.last4());
    CardValidation { valid: errors.is_empty(), errors, brand: (!number.is_empty()).then_some(brand), last4 }
}

/// `****-****-****-1234`. Safe to log.
pub fn mask_card_number(number: &str) -> String {
    let digits = digits_only(number);
    let last4 = &digits[digits.len().saturating_sub(4)..];
    format!("****-****-****-{last4}")
}

/// Groups digits in fours for display, e.g. `4111 1111 1111 1111`.
pub fn format_card_number(number: &str) -> String {
    digits_only(number).as_bytes().chunks(4).filter_map(|c| std::str::from_utf8(c).ok()).collect::<Vec<_>>().join(" ")
}
