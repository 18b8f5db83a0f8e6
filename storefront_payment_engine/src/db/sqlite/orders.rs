use log::{debug, trace};
use sqlx::{types::Json, QueryBuilder, Sqlite, SqliteConnection};

use super::{errors::is_unique_violation, SqliteDatabaseError};
use crate::db_types::{NewOrder, Order, OrderNumber, OrderStatusEntry, OrderTransition, TransitionResult};

/// Inserts a new order into the database using the given connection. This is not atomic. You can embed this call
/// inside a transaction if you need to ensure atomicity, and pass `&mut *tx` as the connection argument.
///
/// The database trigger records the initial `pending/pending` status history entry.
pub async fn insert_order(order: NewOrder, conn: &mut SqliteConnection) -> Result<Order, SqliteDatabaseError> {
    let result = sqlx::query_as::<_, Order>(
        r#"
            INSERT INTO orders (
                order_number,
                user_id,
                customer_email,
                items,
                shipping_address,
                payment_method,
                installments,
                total_amount
            ) VALUES ($1, $2, $3, $4, $5, $6, $7, $8)
            RETURNING *;
        "#,
    )
    .bind(&order.order_number)
    .bind(&order.user_id)
    .bind(&order.customer_email)
    .bind(Json(&order.items))
    .bind(Json(&order.shipping_address))
    .bind(order.payment_method)
    .bind(i64::from(order.installments))
    .bind(order.total_amount)
    .fetch_one(conn)
    .await;
    match result {
        Ok(o) => Ok(o),
        Err(e) if is_unique_violation(&e) => Err(SqliteDatabaseError::DuplicateOrder(order.order_number.to_string())),
        Err(e) => Err(e.into()),
    }
}

pub async fn fetch_order_by_id(id: i64, conn: &mut SqliteConnection) -> Result<Option<Order>, SqliteDatabaseError> {
    let order = sqlx::query_as::<_, Order>("SELECT * FROM orders WHERE id = $1").bind(id).fetch_optional(conn).await?;
    Ok(order)
}

pub async fn fetch_order_by_number(
    order_number: &OrderNumber,
    conn: &mut SqliteConnection,
) -> Result<Option<Order>, SqliteDatabaseError> {
    let order = sqlx::query_as::<_, Order>("SELECT * FROM orders WHERE order_number = $1")
        .bind(order_number)
        .fetch_optional(conn)
        .await?;
    Ok(order)
}

/// Points the order at its current processor transaction.
pub(crate) async fn link_transaction(
    order_id: i64,
    transaction_id: i64,
    conn: &mut SqliteConnection,
) -> Result<(), SqliteDatabaseError> {
    let result = sqlx::query("UPDATE orders SET transaction_id = $1, updated_at = CURRENT_TIMESTAMP WHERE id = $2")
        .bind(transaction_id)
        .bind(order_id)
        .execute(conn)
        .await?;
    if result.rows_affected() == 0 {
        return Err(SqliteDatabaseError::OrderIdNotFound(order_id));
    }
    Ok(())
}

/// Conditionally moves the order into `target`.
///
/// The guard and the write are a single `UPDATE .. WHERE .. RETURNING` statement. If no row comes back, the order was
/// either not in a legal predecessor state or was already in the target state, and the current record is returned as
/// [`TransitionResult::Unchanged`].
pub(crate) async fn transition_order(
    order_id: i64,
    target: OrderTransition,
    conn: &mut SqliteConnection,
) -> Result<TransitionResult<Order>, SqliteDatabaseError> {
    let predecessors = target.payment_status.predecessors();
    let mut builder = QueryBuilder::<Sqlite>::new("UPDATE orders SET status = ");
    builder.push_bind(target.status.to_string());
    builder.push(", payment_status = ");
    builder.push_bind(target.payment_status.to_string());
    builder.push(", updated_at = CURRENT_TIMESTAMP WHERE id = ");
    builder.push_bind(order_id);
    builder.push(" AND payment_status IN (");
    let mut in_clause = builder.separated(", ");
    for status in predecessors {
        in_clause.push_bind(status.to_string());
    }
    builder.push(") AND (status <> ");
    builder.push_bind(target.status.to_string());
    builder.push(" OR payment_status <> ");
    builder.push_bind(target.payment_status.to_string());
    builder.push(") RETURNING *");
    trace!("🗃️ Executing query: {}", builder.sql());
    let updated = builder.build_query_as::<Order>().fetch_optional(&mut *conn).await?;
    match updated {
        Some(order) => {
            debug!("🗃️ Order #{} [{}] moved to {target}", order.id, order.order_number);
            Ok(TransitionResult::Applied(order))
        },
        None => {
            let current =
                fetch_order_by_id(order_id, conn).await?.ok_or(SqliteDatabaseError::OrderIdNotFound(order_id))?;
            trace!("🗃️ Order #{order_id} is {}. Transition to {target} skipped.", current.current_state());
            Ok(TransitionResult::Unchanged(current))
        },
    }
}

pub async fn fetch_status_history(
    order_id: i64,
    conn: &mut SqliteConnection,
) -> Result<Vec<OrderStatusEntry>, SqliteDatabaseError> {
    let history = sqlx::query_as::<_, OrderStatusEntry>(
        "SELECT id, order_id, status, payment_status, changed_at FROM order_status_history WHERE order_id = $1 ORDER \
         BY id ASC",
    )
    .bind(order_id)
    .fetch_all(conn)
    .await?;
    Ok(history)
}
