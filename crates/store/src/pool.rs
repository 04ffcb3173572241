use std::str::FromStr;

use sqlx::sqlite::{SqliteConnectOptions, SqlitePoolOptions};
use sqlx::SqlitePool;

use crate::error::StoreResult;
use crate::schema::SCHEMA;

/// Open (creating if absent) the SQLite database at `database_url` and apply
/// the schema. `database_url` is an `sqlx` SQLite connection string, e.g.
/// `sqlite://relaydeck.db` or `sqlite::memory:` for tests.
pub async fn create_pool(database_url: &str) -> StoreResult<SqlitePool> {
    let options = SqliteConnectOptions::from_str(database_url)?
        .create_if_missing(true)
        .foreign_keys(true);

    let pool = SqlitePoolOptions::new()
        .max_connections(10)
        .connect_with(options)
        .await?;

    apply_schema(&pool).await?;
    Ok(pool)
}

/// Run the embedded DDL. Idempotent: every statement is `IF NOT EXISTS`, so
/// this is safe to call against an already-initialized database.
pub async fn apply_schema(pool: &SqlitePool) -> StoreResult<()> {
    for statement in SCHEMA.split(';').map(str::trim).filter(|s| !s.is_empty()) {
        sqlx::query(statement).execute(pool).await?;
    }
    Ok(())
}
