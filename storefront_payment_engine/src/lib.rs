//! Storefront Payment Engine
//!
//! The storefront payment engine turns shopping carts into durable orders, hands them to an external payment
//! processor, and keeps each order consistent with the processor's asynchronous and not-fully-reliable notifications.
//!
//! The library is divided into these main sections:
//! 1. Database management and control ([`mod@traits`] and the SQLite backend). You should never need to access the
//!    database directly. Instead, use the public API provided by the payment engine. The exception is the data types
//!    used in the database. These are defined in the [`mod@db_types`] module and are public.
//! 2. The payment engine public API ([`mod@spe_api`]). [`CheckoutApi`] is the synchronous checkout entry point and
//!    [`OrderFlowApi`] owns the status-transition rules shared by checkout, webhooks and reconciliation.
//! 3. Card helpers ([`mod@helpers`]): Luhn and brand checks, installment plans, card tokens and webhook signatures.
//!
//! The engine also provides a set of events that can be subscribed to ([`mod@events`]). Notification requests and
//! cart-clearing requests are published there, and a simple actor framework lets you hook into them.
mod db;

pub mod db_types;
pub mod events;
pub mod helpers;
pub mod spe_api;
pub mod traits;

#[cfg(any(feature = "test_utils", test))]
pub mod test_utils;

#[cfg(feature = "sqlite")]
pub use db::sqlite::{db::SqliteDatabase, SqliteDatabaseError};
pub use spe_api::{
    checkout_api::{CheckoutApi, CheckoutOptions},
    errors::{CheckoutError, WebhookError},
    order_flow_api::{AppliedUpdate, OrderFlowApi, StatusUpdate, UpdateOrigin},
    order_objects,
    webhook_objects,
};
pub use traits::{OrderManagement, PaymentGatewayDatabase, PaymentGatewayError};
