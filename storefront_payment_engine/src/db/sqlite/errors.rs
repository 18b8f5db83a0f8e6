use thiserror::Error;

use crate::traits::PaymentGatewayError;

#[derive(Debug, Error)]
pub enum SqliteDatabaseError {
    #[error("Database connection error: {0}")]
    DriverError(#[from] sqlx::Error),
    #[error("Database migration error: {0}")]
    MigrationError(#[from] sqlx::migrate::MigrateError),
    #[error("Database query error: {0}")]
    QueryError(String),
    #[error("Cannot insert duplicate order {0}")]
    DuplicateOrder(String),
    #[error("Cannot insert duplicate transaction {0}")]
    DuplicateTransaction(String),
    #[error("Order #{0} does not exist")]
    OrderIdNotFound(i64),
    #[error("Transaction {0} does not exist")]
    TransactionNotFound(String),
}

impl From<SqliteDatabaseError> for PaymentGatewayError {
    fn from(e: SqliteDatabaseError) -> Self {
        match e {
            SqliteDatabaseError::DuplicateOrder(n) => PaymentGatewayError::DuplicateOrder(n),
            SqliteDatabaseError::DuplicateTransaction(id) => PaymentGatewayError::DuplicateTransaction(id),
            SqliteDatabaseError::OrderIdNotFound(id) => PaymentGatewayError::OrderIdNotFound(id),
            SqliteDatabaseError::TransactionNotFound(id) => PaymentGatewayError::TransactionNotFound(id),
            e => PaymentGatewayError::DatabaseError(e.to_string()),
        }
    }
}

impl From<sqlx::Error> for PaymentGatewayError {
    fn from(e: sqlx::Error) -> Self {
        PaymentGatewayError::from(SqliteDatabaseError::from(e))
    }
}

/// True if the error is a UNIQUE constraint violation
pub(crate) fn is_unique_violation(e: &sqlx::Error) -> bool {
    matches!(e, sqlx::Error::Database(db) if db.is_unique_violation())
}
