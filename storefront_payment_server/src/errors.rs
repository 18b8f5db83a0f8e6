use actix_web::{
    error::ResponseError,
    http::{header::ContentType, StatusCode},
    HttpResponse,
};
use log::error;
use serde_json::json;
use storefront_payment_engine::{helpers::CardTokenError, CheckoutError, PaymentGatewayError, WebhookError};
use thiserror::Error;

/// Everything a route or the server bootstrap can fail with. Each variant maps onto one HTTP status and renders as
/// `{"error": "..."}`. Validation failures also carry the full list under `"errors"`.
#[derive(Debug, Error)]
pub enum ServerError {
    #[error("Server start-up failed. {0}")]
    InitializeError(String),
    #[error("Storage failure. {0}")]
    BackendError(String),
    #[error("Malformed request: {0}")]
    InvalidRequestBody(String),
    #[error("The request is invalid: {}", .0.join("; "))]
    ValidationError(Vec<String>),
    #[error("Server I/O failure. {0}")]
    IOError(#[from] std::io::Error),
    #[error("Server misconfigured. {0}")]
    ConfigurationError(String),
    #[error("Not found. {0}")]
    NoRecordFound(String),
    #[error("{0}")]
    Conflict(String),
    #[error("The payment processor rejected the request. {0}")]
    GatewayRejected(String),
    #[error("The payment processor is unavailable. {0}")]
    GatewayUnavailable(String),
    #[error("The payment processor could not be reached with the configured credentials. {0}")]
    GatewayMisconfigured(String),
}

impl ResponseError for ServerError {
    fn status_code(&self) -> StatusCode {
        match self {
            Self::InvalidRequestBody(_) | Self::ValidationError(_) | Self::GatewayRejected(_) => StatusCode::BAD_REQUEST,
            Self::NoRecordFound(_) => StatusCode::NOT_FOUND,
            Self::Conflict(_) => StatusCode::CONFLICT,
            Self::GatewayMisconfigured(_) => StatusCode::BAD_GATEWAY,
            Self::GatewayUnavailable(_) => StatusCode::SERVICE_UNAVAILABLE,
            Self::InitializeError(_) | Self::BackendError(_) | Self::IOError(_) | Self::ConfigurationError(_) => {
                StatusCode::INTERNAL_SERVER_ERROR
            },
        }
    }

    fn error_response(&self) -> HttpResponse {
        let body = match self {
            Self::ValidationError(errors) => json!({ "error": self.to_string(), "errors": errors }),
            _ => json!({ "error": self.to_string() }),
        };
        HttpResponse::build(self.status_code()).insert_header(ContentType::json()).body(body.to_string())
    }
}

impl From<PaymentGatewayError> for ServerError {
    fn from(e: PaymentGatewayError) -> Self {
        match e {
            PaymentGatewayError::OrderNotFound(_) |
            PaymentGatewayError::OrderIdNotFound(_) |
            PaymentGatewayError::TransactionNotFound(_) => Self::NoRecordFound(e.to_string()),
            PaymentGatewayError::DuplicateOrder(_) |
            PaymentGatewayError::DuplicateTransaction(_) |
            PaymentGatewayError::TransactionOrderMismatch { .. } => {
                Self::Conflict(e.to_string())
            },
            PaymentGatewayError::DatabaseError(_) => Self::BackendError(e.to_string()),
        }
    }
}

impl From<CheckoutError> for ServerError {
    fn from(e: CheckoutError) -> Self {
        match e {
            CheckoutError::Validation(errors) => Self::ValidationError(errors),
            CheckoutError::GatewayAuthentication { .. } => {
                error!("💻️ Checkout failed because the processor rejected our credentials. {e}");
                Self::GatewayMisconfigured(e.to_string())
            },
            CheckoutError::GatewayUnavailable { .. } => Self::GatewayUnavailable(e.to_string()),
            CheckoutError::GatewayRejected { .. } => Self::GatewayRejected(e.to_string()),
            CheckoutError::OrderNotFound(_) => Self::NoRecordFound(e.to_string()),
            CheckoutError::NotRefundable(..) => Self::Conflict(e.to_string()),
            CheckoutError::DatabaseError(e) => e.into(),
        }
    }
}

impl From<WebhookError> for ServerError {
    fn from(e: WebhookError) -> Self {
        match e {
            WebhookError::UnknownOrder(_) => Self::NoRecordFound(e.to_string()),
            WebhookError::InvalidPayload(_) => Self::InvalidRequestBody(e.to_string()),
            WebhookError::DatabaseError(e) => e.into(),
        }
    }
}

impl From<CardTokenError> for ServerError {
    fn from(e: CardTokenError) -> Self {
        match e {
            CardTokenError::InvalidCard(errors) => Self::ValidationError(errors),
            CardTokenError::Malformed | CardTokenError::BadSignature => Self::InvalidRequestBody(e.to_string()),
            CardTokenError::KeyError(_) => Self::ConfigurationError(e.to_string()),
        }
    }
}
