use std::time::Duration;

use sqlx::sqlite::SqlitePoolOptions;

use expenseflow_core::config::DatabaseConfig;

pub type DbPool = sqlx::SqlitePool;

/// How long a connection waits on SQLite's single writer before surfacing
/// SQLITE_BUSY. Submission and decision paths write the expense row, its
/// ledger rows, and the policy tables through the same pool.
const BUSY_TIMEOUT_MS: u32 = 5_000;

/// Opens the pool described by `config`. Every connection enforces foreign
/// keys, since ledger and step rows hang off their parent rows, and runs in
/// WAL mode.
pub async fn connect(config: &DatabaseConfig) -> Result<DbPool, sqlx::Error> {
    SqlitePoolOptions::new()
        .max_connections(config.max_connections.max(1))
        .acquire_timeout(Duration::from_secs(config.timeout_secs.max(1)))
        .after_connect(|conn, _meta| {
            Box::pin(async move {
                sqlx::query("PRAGMA foreign_keys = ON").execute(&mut *conn).await?;
                sqlx::query("PRAGMA journal_mode = WAL").execute(&mut *conn).await?;
                sqlx::query(&format!("PRAGMA busy_timeout = {BUSY_TIMEOUT_MS}"))
                    .execute(&mut *conn)
                    .await?;
                Ok(())
            })
        })
        .connect(&config.url)
        .await
}

#[cfg(test)]
pub(crate) async fn memory_pool() -> DbPool {
    let config = DatabaseConfig {
        url: "sqlite::memory:".to_string(),
        max_connections: 1,
        timeout_secs: 30,
    };
    connect(&config).await.expect("in-memory pool")
}
