//! Pure helper functions: card validation, installment math, card tokens, order numbers, log redaction and webhook
//! signatures. Nothing in here touches the database or the network.
mod card_token;
mod card_validator;
mod installments;
mod order_number;
mod redact;
mod webhook_signature;

pub use card_token::{CardTokenError, CardTokenizer, TokenInfo, CARD_TOKEN_PREFIX};
pub use card_validator::{
    detect_brand,
    digits_only,
    format_card_number,
    mask_card_number,
    validate_card,
    validate_card_number,
    validate_cvv,
    validate_expiry,
    validate_expiry_at,
    CardBrand,
    CardData,
    CardValidation,
};
pub use installments::{calculate_installments, InstallmentOption};
pub use order_number::new_order_number;
pub use redact::redact_json;
pub use webhook_signature::{calculate_hmac, verify_hmac};
