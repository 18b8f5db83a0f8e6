//! Throwaway SQLite databases for tests.
use log::*;
use sqlx::{migrate::MigrateDatabase, Sqlite};

use crate::SqliteDatabase;

/// Loads `.env.test`, starts logging and leaves a freshly migrated, empty database at `url`.
pub async fn prepare_test_env(url: &str) {
    dotenvy::from_filename(".env.test").ok();
    let _ = env_logger::try_init();
    recreate_database(url).await;
    let db = SqliteDatabase::new_with_url(url, 1).await.expect("Could not connect to the test database");
    db.migrate().await.expect("Test database migrations failed");
    debug!("🧪️ Test database ready at {url}");
}

/// A unique database file in the system temp directory, so tests running in parallel never share rows.
pub fn random_db_path() -> String {
    format!("sqlite://{}/spg_test_{:016x}.db", std::env::temp_dir().display(), rand::random::<u64>())
}

async fn recreate_database(url: &str) {
    if Sqlite::database_exists(url).await.unwrap_or(false) {
        if let Err(e) = Sqlite::drop_database(url).await {
            warn!("🧪️ Could not drop stale test database {url}: {e}");
        }
    }
    Sqlite::create_database(url).await.expect("Could not create the test database");
}
