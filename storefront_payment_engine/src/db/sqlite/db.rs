use std::fmt::Debug;

use log::*;
use spg_common::Cents;
use sqlx::{migrate, SqlitePool};

use super::{catalog, db_url, new_pool, orders, transactions, SqliteDatabaseError};
use crate::{
    db_types::{
        CatalogEntry,
        NewOrder,
        NewTransaction,
        Order,
        OrderNumber,
        OrderStatusEntry,
        OrderTransition,
        Transaction,
        TransactionRef,
        TransactionStatus,
        TransitionResult,
    },
    traits::{OrderManagement, PaymentGatewayDatabase, PaymentGatewayError},
};

#[derive(Clone)]
pub struct SqliteDatabase {
    url: String,
    pool: SqlitePool,
}

impl Debug for SqliteDatabase {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        writeln!(f, "SqliteDatabase ({:?})", self.pool)
    }
}

impl SqliteDatabase {
    /// Creates a new database API object using the `SPG_DATABASE_URL` environment variable, or the default location.
    pub async fn new(max_connections: u32) -> Result<Self, SqliteDatabaseError> {
        let url = db_url();
        SqliteDatabase::new_with_url(&url, max_connections).await
    }

    /// Creates a new database API object. The database file is created if it does not exist.
    pub async fn new_with_url(url: &str, max_connections: u32) -> Result<Self, SqliteDatabaseError> {
        let pool = new_pool(url, max_connections).await?;
        trace!("🗃️ Connected to database at {url}");
        Ok(Self { url: url.to_string(), pool })
    }

    pub fn pool(&self) -> &SqlitePool {
        &self.pool
    }

    /// Brings the schema up to date.
    pub async fn migrate(&self) -> Result<(), SqliteDatabaseError> {
        migrate!("./src/db/sqlite/migrations").run(&self.pool).await?;
        info!("🗃️ Database migrations complete");
        Ok(())
    }
}

impl OrderManagement for SqliteDatabase {
    async fn fetch_order_by_id(&self, id: i64) -> Result<Option<Order>, PaymentGatewayError> {
        let mut conn = self.pool.acquire().await?;
        Ok(orders::fetch_order_by_id(id, &mut conn).await?)
    }

    async fn fetch_order_by_number(&self, order_number: &OrderNumber) -> Result<Option<Order>, PaymentGatewayError> {
        let mut conn = self.pool.acquire().await?;
        Ok(orders::fetch_order_by_number(order_number, &mut conn).await?)
    }

    async fn fetch_transaction_by_external_id(
        &self,
        external_id: &str,
    ) -> Result<Option<Transaction>, PaymentGatewayError> {
        let mut conn = self.pool.acquire().await?;
        let tx = TransactionRef::ExternalId(external_id.to_string());
        Ok(transactions::fetch_transaction(&tx, &mut conn).await?)
    }

    async fn fetch_transaction_for_order(&self, order_id: i64) -> Result<Option<Transaction>, PaymentGatewayError> {
        let mut conn = self.pool.acquire().await?;
        Ok(transactions::fetch_transaction_for_order(order_id, &mut conn).await?)
    }

    async fn fetch_pending_transactions(&self) -> Result<Vec<Transaction>, PaymentGatewayError> {
        let mut conn = self.pool.acquire().await?;
        Ok(transactions::fetch_pending_transactions(&mut conn).await?)
    }

    async fn fetch_status_history(&self, order_id: i64) -> Result<Vec<OrderStatusEntry>, PaymentGatewayError> {
        let mut conn = self.pool.acquire().await?;
        Ok(orders::fetch_status_history(order_id, &mut conn).await?)
    }

    async fn fetch_catalog_entry(&self, product_id: &str) -> Result<Option<CatalogEntry>, PaymentGatewayError> {
        let mut conn = self.pool.acquire().await?;
        Ok(catalog::fetch_catalog_entry(product_id, &mut conn).await?)
    }
}

impl PaymentGatewayDatabase for SqliteDatabase {
    fn url(&self) -> &str {
        self.url.as_str()
    }

    async fn insert_order(&self, order: NewOrder) -> Result<Order, PaymentGatewayError> {
        let mut conn = self.pool.acquire().await?;
        let order = orders::insert_order(order, &mut conn).await?;
        debug!("🗃️ Order {} has been saved in the DB with id {}", order.order_number, order.id);
        Ok(order)
    }

    async fn insert_transaction(&self, tx: NewTransaction) -> Result<Transaction, PaymentGatewayError> {
        let mut db_tx = self.pool.begin().await?;
        let order_id = tx.order_id;
        let tx = transactions::insert_transaction(tx, &mut db_tx).await?;
        orders::link_transaction(order_id, tx.id, &mut db_tx).await?;
        db_tx.commit().await?;
        debug!("🗃️ Transaction {} [{}] recorded for order #{order_id}", tx.id, tx.external_id);
        Ok(tx)
    }

    async fn transition_order(
        &self,
        order_id: i64,
        target: OrderTransition,
    ) -> Result<TransitionResult<Order>, PaymentGatewayError> {
        let mut conn = self.pool.acquire().await?;
        Ok(orders::transition_order(order_id, target, &mut conn).await?)
    }

    async fn transition_transaction(
        &self,
        tx: &TransactionRef,
        status: TransactionStatus,
        raw_response: Option<String>,
    ) -> Result<TransitionResult<Transaction>, PaymentGatewayError> {
        let mut conn = self.pool.acquire().await?;
        Ok(transactions::transition_transaction(tx, status, raw_response, &mut conn).await?)
    }

    async fn upsert_catalog_entry(
        &self,
        product_id: &str,
        name: &str,
        unit_price: Cents,
    ) -> Result<CatalogEntry, PaymentGatewayError> {
        let mut conn = self.pool.acquire().await?;
        Ok(catalog::upsert_catalog_entry(product_id, name, unit_price, &mut conn).await?)
    }

    async fn close(&mut self) -> Result<(), PaymentGatewayError> {
        self.pool.close().await;
        Ok(())
    }
}

#[cfg(test)]
mod test {
    use spg_common::PaymentMethod;

    use super::*;
    use crate::{
        db_types::{Address, LineItem, OrderStatusType, PaymentStatus},
        test_utils::prepare_env::{prepare_test_env, random_db_path},
    };

    async fn new_db() -> SqliteDatabase {
        let url = random_db_path();
        prepare_test_env(&url).await;
        SqliteDatabase::new_with_url(&url, 5).await.expect("Error creating database")
    }

    fn new_order() -> NewOrder {
        let items = vec![LineItem::new("sku-1", "Camiseta", 2, Cents::from(2500))];
        NewOrder::new(items, Address::default(), PaymentMethod::Pix).unwrap().with_user_id("user-1")
    }

    #[tokio::test]
    async fn insert_and_fetch_order() {
        let db = new_db().await;
        let order = db.insert_order(new_order()).await.unwrap();
        assert_eq!(order.total_amount, Cents::from(5000));
        assert_eq!(order.status, OrderStatusType::Pending);
        assert_eq!(order.payment_status, PaymentStatus::Pending);
        assert_eq!(order.items.len(), 1);
        let fetched = db.fetch_order_by_number(&order.order_number).await.unwrap().unwrap();
        assert_eq!(fetched, order);
        let history = db.fetch_status_history(order.id).await.unwrap();
        assert_eq!(history.len(), 1);
    }

    #[tokio::test]
    async fn duplicate_order_numbers_are_rejected() {
        let db = new_db().await;
        let order = new_order();
        db.insert_order(order.clone()).await.unwrap();
        let err = db.insert_order(order).await.unwrap_err();
        assert!(matches!(err, PaymentGatewayError::DuplicateOrder(_)));
    }

    #[tokio::test]
    async fn transitions_are_compare_and_set() {
        let db = new_db().await;
        let order = db.insert_order(new_order()).await.unwrap();
        let r = db.transition_order(order.id, OrderTransition::AWAITING_PAYMENT).await.unwrap();
        assert!(r.is_applied());
        let r = db.transition_order(order.id, OrderTransition::AWAITING_PAYMENT).await.unwrap();
        assert!(!r.is_applied());
        let r = db.transition_order(order.id, OrderTransition::APPROVED).await.unwrap();
        assert!(r.is_applied());
        assert_eq!(r.inner().status, OrderStatusType::Processing);
        // Terminal states do not move backwards
        let r = db.transition_order(order.id, OrderTransition::DECLINED).await.unwrap();
        assert!(!r.is_applied());
        assert_eq!(r.inner().payment_status, PaymentStatus::Approved);
        let r = db.transition_order(order.id, OrderTransition::REFUNDED).await.unwrap();
        assert!(r.is_applied());
        let r = db.transition_order(order.id, OrderTransition::APPROVED).await.unwrap();
        assert!(!r.is_applied());
        let history = db.fetch_status_history(order.id).await.unwrap();
        let states = history.iter().map(|h| (h.status, h.payment_status)).collect::<Vec<_>>();
        assert_eq!(states, vec![
            (OrderStatusType::Pending, PaymentStatus::Pending),
            (OrderStatusType::AwaitingPayment, PaymentStatus::Pending),
            (OrderStatusType::Processing, PaymentStatus::Approved),
            (OrderStatusType::Refunded, PaymentStatus::Refunded),
        ]);
        let err = db.transition_order(9999, OrderTransition::APPROVED).await.unwrap_err();
        assert!(matches!(err, PaymentGatewayError::OrderIdNotFound(9999)));
    }

    #[tokio::test]
    async fn transactions_link_to_orders() {
        let db = new_db().await;
        let order = db.insert_order(new_order()).await.unwrap();
        let tx = NewTransaction {
            order_id: order.id,
            external_id: "tx_100".into(),
            amount: order.total_amount,
            status: TransactionStatus::Pending,
            payment_method: PaymentMethod::Pix,
            installments: 1,
            raw_response: Some("{}".into()),
        };
        let saved = db.insert_transaction(tx.clone()).await.unwrap();
        let order = db.fetch_order_by_id(order.id).await.unwrap().unwrap();
        assert_eq!(order.transaction_id, Some(saved.id));
        assert!(matches!(db.insert_transaction(tx).await, Err(PaymentGatewayError::DuplicateTransaction(_))));
        assert_eq!(db.fetch_pending_transactions().await.unwrap().len(), 1);

        let ext = TransactionRef::ExternalId("tx_100".into());
        let r = db.transition_transaction(&ext, TransactionStatus::Approved, Some("{\"ok\":1}".into())).await.unwrap();
        assert!(r.is_applied());
        assert_eq!(r.inner().raw_response.as_deref(), Some("{\"ok\":1}"));
        let r = db.transition_transaction(&ext, TransactionStatus::Approved, None).await.unwrap();
        assert!(!r.is_applied());
        assert!(db.fetch_pending_transactions().await.unwrap().is_empty());
        let missing = TransactionRef::ExternalId("nope".into());
        assert!(matches!(
            db.transition_transaction(&missing, TransactionStatus::Approved, None).await,
            Err(PaymentGatewayError::TransactionNotFound(_))
        ));
    }

    #[tokio::test]
    async fn catalog_upserts() {
        let db = new_db().await;
        assert!(db.fetch_catalog_entry("sku-1").await.unwrap().is_none());
        db.upsert_catalog_entry("sku-1", "Camiseta", Cents::from(2500)).await.unwrap();
        let e = db.upsert_catalog_entry("sku-1", "Camiseta Azul", Cents::from(2700)).await.unwrap();
        assert_eq!(e.unit_price, Cents::from(2700));
        let e = db.fetch_catalog_entry("sku-1").await.unwrap().unwrap();
        assert_eq!(e.name, "Camiseta Azul");
    }
}
