use crate::{
    db_types::{CatalogEntry, Order, OrderNumber, OrderStatusEntry, Transaction},
    traits::PaymentGatewayError,
};

/// The `OrderManagement` trait defines the behaviour for querying information about orders, transactions and prices
/// in the database backend.
#[allow(async_fn_in_trait)]
pub trait OrderManagement {
    async fn fetch_order_by_id(&self, id: i64) -> Result<Option<Order>, PaymentGatewayError>;

    async fn fetch_order_by_number(&self, order_number: &OrderNumber) -> Result<Option<Order>, PaymentGatewayError>;

    /// Looks up a transaction by the identifier the processor assigned to it.
    async fn fetch_transaction_by_external_id(
        &self,
        external_id: &str,
    ) -> Result<Option<Transaction>, PaymentGatewayError>;

    /// The most recent transaction recorded against the order, if any.
    async fn fetch_transaction_for_order(&self, order_id: i64) -> Result<Option<Transaction>, PaymentGatewayError>;

    /// All transactions that have not reached a final outcome yet (`pending` or `processing`), oldest first.
    async fn fetch_pending_transactions(&self) -> Result<Vec<Transaction>, PaymentGatewayError>;

    /// The audit trail of status changes for the order, oldest first.
    async fn fetch_status_history(&self, order_id: i64) -> Result<Vec<OrderStatusEntry>, PaymentGatewayError>;

    async fn fetch_catalog_entry(&self, product_id: &str) -> Result<Option<CatalogEntry>, PaymentGatewayError>;
}
