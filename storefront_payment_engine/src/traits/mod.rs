//! #  Order store contracts.
//!
//! This module defines the interface contracts of the payment engine database *backends*.
//!
//! * [`PaymentGatewayDatabase`] defines the write side: inserting orders and transactions, and moving them between
//!   states with compare-and-set semantics.
//! * [`OrderManagement`] provides the read-only queries used by the checkout, webhook and reconciliation flows.
//!
//! Every status change goes through [`PaymentGatewayDatabase::transition_order`] or
//! [`PaymentGatewayDatabase::transition_transaction`]. These guard the write with the set of legal predecessor states
//! in a single statement, so two writers racing to apply the same outcome cannot both observe a change.
mod order_management;
mod payment_gateway_database;

pub use order_management::OrderManagement;
pub use payment_gateway_database::{PaymentGatewayDatabase, PaymentGatewayError};
