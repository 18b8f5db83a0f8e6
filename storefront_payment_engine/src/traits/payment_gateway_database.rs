use spg_common::Cents;
use thiserror::Error;

use crate::{
    db_types::{
        CatalogEntry,
        NewOrder,
        NewTransaction,
        Order,
        OrderTransition,
        Transaction,
        TransactionRef,
        TransactionStatus,
        TransitionResult,
    },
    traits::OrderManagement,
};

/// This trait defines the highest level of behaviour for backends supporting the storefront payment engine.
///
/// This behaviour includes:
/// * Persisting new orders and the processor transactions created for them
/// * Compare-and-set status transitions for orders and transactions
/// * Maintaining the server-side price catalog
#[allow(async_fn_in_trait)]
pub trait PaymentGatewayDatabase: Clone + OrderManagement {
    /// The URL of the database
    fn url(&self) -> &str;

    /// Stores a new order in `pending`/`pending` state. The database records the initial status history entry.
    ///
    /// Order numbers are unique. Inserting a duplicate returns [`PaymentGatewayError::DuplicateOrder`].
    async fn insert_order(&self, order: NewOrder) -> Result<Order, PaymentGatewayError>;

    /// In a single atomic transaction,
    /// * stores the transaction
    /// * links it to its order (`orders.transaction_id`)
    ///
    /// External ids are unique. Inserting a duplicate returns [`PaymentGatewayError::DuplicateTransaction`].
    async fn insert_transaction(&self, tx: NewTransaction) -> Result<Transaction, PaymentGatewayError>;

    /// Moves the order to `target` if, and only if, its current payment status is one of
    /// `target.payment_status.predecessors()` and it is not already in the target state.
    ///
    /// Returns [`TransitionResult::Applied`] with the updated order if the write happened, or
    /// [`TransitionResult::Unchanged`] with the current order otherwise. Only one of several concurrent callers
    /// requesting the same transition will ever see `Applied`.
    async fn transition_order(
        &self,
        order_id: i64,
        target: OrderTransition,
    ) -> Result<TransitionResult<Order>, PaymentGatewayError>;

    /// Moves the transaction to `status` if its current status is one of `status.predecessors()`. When `raw_response`
    /// is given, it replaces the stored processor payload.
    async fn transition_transaction(
        &self,
        tx: &TransactionRef,
        status: TransactionStatus,
        raw_response: Option<String>,
    ) -> Result<TransitionResult<Transaction>, PaymentGatewayError>;

    /// Creates or updates the authoritative price for a product.
    async fn upsert_catalog_entry(
        &self,
        product_id: &str,
        name: &str,
        unit_price: Cents,
    ) -> Result<CatalogEntry, PaymentGatewayError>;

    /// Closes the database connection pool.
    async fn close(&mut self) -> Result<(), PaymentGatewayError>;
}

#[derive(Debug, Clone, Error)]
pub enum PaymentGatewayError {
    #[error("We have an internal database engine error. {0}")]
    DatabaseError(String),
    #[error("The requested order {0} does not exist")]
    OrderNotFound(String),
    #[error("The requested order with internal id {0} does not exist")]
    OrderIdNotFound(i64),
    #[error("The requested transaction {0} does not exist")]
    TransactionNotFound(String),
    #[error("Order {0} already exists")]
    DuplicateOrder(String),
    #[error("Transaction {0} has already been recorded")]
    DuplicateTransaction(String),
    #[error("Transaction {external_id} does not belong to order {order_number}")]
    TransactionOrderMismatch { external_id: String, order_number: String },
}
