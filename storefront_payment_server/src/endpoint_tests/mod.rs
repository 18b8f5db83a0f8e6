pub mod helpers;

mod cards;
mod checkout;
mod reconciliation;
mod webhooks;
