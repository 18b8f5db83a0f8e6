//! Client for the external payment processor.
//!
//! The processor accepts card, PIX and boleto transactions over a small REST API authenticated with HTTP Basic auth.
//! [`GatewayApi`] is the production implementation of the [`PaymentGateway`] trait, which is the seam the payment
//! engine and the reconciliation worker program against.
//!
//! Errors are classified into [`GatewayError`] variants so that callers can decide whether a failure is worth
//! retrying. Transaction creation retries transient failures with exponential backoff (see [`retry`]); status and
//! refund calls make a single attempt and leave retry policy to the caller.
mod api;
mod config;
mod data_objects;
mod error;
mod helpers;
pub mod retry;

pub use api::{GatewayApi, PaymentGateway};
pub use config::GatewayConfig;
pub use data_objects::{
    BoletoInstructions,
    CardDetails,
    CardSummary,
    CreateTransactionRequest,
    ExpiryDetails,
    GatewayAddress,
    GatewayCustomer,
    GatewayDocument,
    GatewayItem,
    GatewayResponse,
    GatewayShipping,
    GatewayStatus,
    GatewayTransaction,
    MethodDetails,
    PixInstructions,
};
pub use error::GatewayError;
pub use helpers::basic_auth_header;
pub use retry::RetryPolicy;
