use log::{debug, trace};
use sqlx::{QueryBuilder, Sqlite, SqliteConnection};

use super::{errors::is_unique_violation, SqliteDatabaseError};
use crate::db_types::{NewTransaction, Transaction, TransactionRef, TransactionStatus, TransitionResult};

/// Inserts a new transaction record. This is not atomic; see [`crate::SqliteDatabase`] for the call that also links
/// the transaction to its order.
pub async fn insert_transaction(
    tx: NewTransaction,
    conn: &mut SqliteConnection,
) -> Result<Transaction, SqliteDatabaseError> {
    let result = sqlx::query_as::<_, Transaction>(
        r#"
            INSERT INTO transactions (
                order_id,
                external_id,
                amount,
                status,
                payment_method,
                installments,
                raw_response
            ) VALUES ($1, $2, $3, $4, $5, $6, $7)
            RETURNING *;
        "#,
    )
    .bind(tx.order_id)
    .bind(&tx.external_id)
    .bind(tx.amount)
    .bind(tx.status.to_string())
    .bind(tx.payment_method)
    .bind(i64::from(tx.installments))
    .bind(&tx.raw_response)
    .fetch_one(conn)
    .await;
    match result {
        Ok(t) => Ok(t),
        Err(e) if is_unique_violation(&e) => Err(SqliteDatabaseError::DuplicateTransaction(tx.external_id)),
        Err(e) => Err(e.into()),
    }
}

pub async fn fetch_transaction(
    tx: &TransactionRef,
    conn: &mut SqliteConnection,
) -> Result<Option<Transaction>, SqliteDatabaseError> {
    let query = match tx {
        TransactionRef::Id(id) => sqlx::query_as::<_, Transaction>("SELECT * FROM transactions WHERE id = $1").bind(*id),
        TransactionRef::ExternalId(id) => {
            sqlx::query_as::<_, Transaction>("SELECT * FROM transactions WHERE external_id = $1").bind(id.clone())
        },
    };
    Ok(query.fetch_optional(conn).await?)
}

pub async fn fetch_transaction_for_order(
    order_id: i64,
    conn: &mut SqliteConnection,
) -> Result<Option<Transaction>, SqliteDatabaseError> {
    let tx = sqlx::query_as::<_, Transaction>(
        "SELECT * FROM transactions WHERE order_id = $1 ORDER BY id DESC LIMIT 1",
    )
    .bind(order_id)
    .fetch_optional(conn)
    .await?;
    Ok(tx)
}

/// Transactions still waiting on the processor, oldest first
pub async fn fetch_pending_transactions(conn: &mut SqliteConnection) -> Result<Vec<Transaction>, SqliteDatabaseError> {
    let txs = sqlx::query_as::<_, Transaction>(
        "SELECT * FROM transactions WHERE status IN ('pending', 'processing') ORDER BY created_at ASC, id ASC",
    )
    .fetch_all(conn)
    .await?;
    trace!("🗃️ {} transactions awaiting a final status", txs.len());
    Ok(txs)
}

pub(crate) async fn transition_transaction(
    tx: &TransactionRef,
    status: TransactionStatus,
    raw_response: Option<String>,
    conn: &mut SqliteConnection,
) -> Result<TransitionResult<Transaction>, SqliteDatabaseError> {
    let predecessors = status.predecessors();
    if predecessors.is_empty() {
        let current = fetch_transaction(tx, conn).await?.ok_or(SqliteDatabaseError::TransactionNotFound(tx.to_string()))?;
        return Ok(TransitionResult::Unchanged(current));
    }
    let mut builder = QueryBuilder::<Sqlite>::new("UPDATE transactions SET status = ");
    builder.push_bind(status.to_string());
    builder.push(", raw_response = COALESCE(");
    builder.push_bind(raw_response);
    builder.push(", raw_response), updated_at = CURRENT_TIMESTAMP WHERE ");
    match tx {
        TransactionRef::Id(id) => {
            builder.push("id = ");
            builder.push_bind(*id);
        },
        TransactionRef::ExternalId(id) => {
            builder.push("external_id = ");
            builder.push_bind(id.clone());
        },
    }
    builder.push(" AND status IN (");
    let mut in_clause = builder.separated(", ");
    for s in predecessors {
        in_clause.push_bind(s.to_string());
    }
    builder.push(") RETURNING *");
    trace!("🗃️ Executing query: {}", builder.sql());
    let updated = builder.build_query_as::<Transaction>().fetch_optional(&mut *conn).await?;
    match updated {
        Some(t) => {
            debug!("🗃️ Transaction {} [{}] moved to {status}", t.id, t.external_id);
            Ok(TransitionResult::Applied(t))
        },
        None => {
            let current =
                fetch_transaction(tx, conn).await?.ok_or(SqliteDatabaseError::TransactionNotFound(tx.to_string()))?;
            trace!("🗃️ Transaction {tx} is {}. Transition to {status} skipped.", current.status);
            Ok(TransitionResult::Unchanged(current))
        },
    }
}
