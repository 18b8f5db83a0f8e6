use thiserror::Error;

#[derive(Debug, Clone, Error)]
pub enum GatewayError {
    #[error("Could not initialize client: {0}")]
    Initialization(String),
    /// The processor rejected our credentials (401/403). Retrying will not help; an operator has to fix the keys.
    #[error("Gateway rejected the credentials. Error {status}. {message}")]
    Authentication { status: u16, message: String },
    /// The processor rejected the request itself (4xx other than auth).
    #[error("Gateway rejected the request. Error {status}. {message}")]
    Validation { status: u16, message: String },
    /// Connection failures, timeouts, 5xx, 408 and 429.
    #[error("Gateway is temporarily unavailable. {0}")]
    Transient(String),
    #[error("Could not deserialize gateway response: {0}")]
    JsonError(String),
    #[error("Unexpected gateway failure: {0}")]
    Unknown(String),
}

impl GatewayError {
    pub fn is_retryable(&self) -> bool {
        matches!(self, Self::Transient(_))
    }

    /// Classifies a non-success HTTP status code returned by the processor.
    pub fn from_status(status: u16, message: String) -> Self {
        match status {
            401 | 403 => Self::Authentication { status, message },
            408 | 429 => Self::Transient(format!("Error {status}. {message}")),
            400..=499 => Self::Validation { status, message },
            500..=599 => Self::Transient(format!("Error {status}. {message}")),
            _ => Self::Unknown(format!("Error {status}. {message}")),
        }
    }
}

impl From<reqwest::Error> for GatewayError {
    fn from(e: reqwest::Error) -> Self {
        if e.is_timeout() || e.is_connect() {
            Self::Transient(e.to_string())
        } else if e.is_decode() {
            Self::JsonError(e.to_string())
        } else if let Some(status) = e.status() {
            Self::from_status(status.as_u16(), e.to_string())
        } else if e.is_request() {
            // Request errors without a status are I/O problems on the way out (e.g. connection reset)
            Self::Transient(e.to_string())
        } else {
            Self::Unknown(e.to_string())
        }
    }
}
