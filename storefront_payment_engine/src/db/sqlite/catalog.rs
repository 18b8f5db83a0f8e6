use spg_common::Cents;
use sqlx::SqliteConnection;

use super::SqliteDatabaseError;
use crate::db_types::CatalogEntry;

pub async fn fetch_catalog_entry(
    product_id: &str,
    conn: &mut SqliteConnection,
) -> Result<Option<CatalogEntry>, SqliteDatabaseError> {
    let entry = sqlx::query_as::<_, CatalogEntry>("SELECT * FROM catalog_prices WHERE product_id = $1")
        .bind(product_id)
        .fetch_optional(conn)
        .await?;
    Ok(entry)
}

pub async fn upsert_catalog_entry(
    product_id: &str,
    name: &str,
    unit_price: Cents,
    conn: &mut SqliteConnection,
) -> Result<CatalogEntry, SqliteDatabaseError> {
    let entry = sqlx::query_as::<_, CatalogEntry>(
        r#"
            INSERT INTO catalog_prices (product_id, name, unit_price) VALUES ($1, $2, $3)
            ON CONFLICT (product_id) DO UPDATE SET
                name = excluded.name,
                unit_price = excluded.unit_price,
                updated_at = CURRENT_TIMESTAMP
            RETURNING *;
        "#,
    )
    .bind(product_id)
    .bind(name)
    .bind(unit_price)
    .fetch_one(conn)
    .await?;
    Ok(entry)
}
