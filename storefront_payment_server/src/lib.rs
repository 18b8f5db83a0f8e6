//! # SPG server
//! This crate hosts the HTTP side of the storefront payment gateway. It is responsible for:
//! * Taking checkout requests from the storefront and handing them to the payment engine.
//! * Receiving transaction webhooks from the payment processor, after checking their HMAC signature.
//! * Polling the processor for transactions whose webhook never arrived (see [`reconciliation_worker`]).
//! * Forwarding customer notifications and cart-clearing requests (see [`notifications`]).
//!
//! ## Configuration
//! The server is configured via environment variables. See [config](config/index.html) for more information.
//!
//! ## Routes
//! The server exposes the following routes:
//! * `/health`: A health check route that returns a 200 OK response.
//! * `POST /api/checkout`: Create an order and its payment.
//! * `GET /api/orders/{order_number}`: The order, its latest transaction and its status history.
//! * `POST /api/card/{validate,installments,token,detect-brand}`: Card helpers for the checkout form.
//! * `POST /webhooks/transactions`: Transaction status webhooks from the payment processor.
//!
//! Back-office routes are signed with `SPG_ADMIN_HMAC_SECRET` (see [`middleware`]) and are only mounted when that
//! secret is set:
//! * `POST /admin/orders/{order_number}/refund`: Refund an approved order.
//! * `GET /admin/reconciliation`, `POST /admin/reconciliation/{order_id}/stop`: Inspect and stop polling tasks.

pub mod cli;
pub mod config;
pub mod data_objects;
pub mod errors;
pub mod helpers;
pub mod middleware;
pub mod notifications;
pub mod reconciliation_worker;
pub mod routes;
pub mod server;

#[cfg(test)]
mod endpoint_tests;
