//! # Storefront payment engine public API
//!
//! The `spe_api` module exposes the programmatic API of the payment engine.
//!
//! * [`checkout_api`] is the synchronous entry point. It validates a cart, persists the order, creates the processor
//!   transaction and applies the immediate outcome. It also handles refunds.
//! * [`order_flow_api`] owns the status-transition rules. Checkout, webhooks and the reconciliation worker all funnel
//!   processor statuses through [`order_flow_api::OrderFlowApi::apply_status_update`], which is the only place that
//!   decides which notifications to publish.
//!
//! # API usage
//!
//! An API instance is created by supplying a database backend that implements the backend traits, plus the event
//! producers that notification hooks are attached to.
//!
//! ```rust,ignore
//! use storefront_payment_engine::{events::EventProducers, OrderFlowApi, SqliteDatabase};
//! let db = SqliteDatabase::new_with_url(...).await?;
//! let api = OrderFlowApi::new(db, EventProducers::default());
//! let details = api.order_details(&order_number).await?;
//! ```

pub mod checkout_api;
pub mod errors;
pub mod order_flow_api;
pub mod order_objects;
pub mod webhook_objects;
