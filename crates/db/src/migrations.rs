use sqlx::migrate::{MigrateError, Migrator};

use crate::DbPool;

pub static MIGRATOR: Migrator = sqlx::migrate!("../../migrations");

pub async fn run_pending(pool: &DbPool) -> Result<(), MigrateError> {
    MIGRATOR.run(pool).await
}

#[cfg(test)]
mod tests {
    use sqlx::Row;

    use super::run_pending;
    use crate::{connection::memory_pool, migrations::MIGRATOR};

    const MANAGED_TABLES: &[&str] = &[
        "employee",
        "expense",
        "approval_policy",
        "policy_step",
        "policy_step_approver",
        "approval_record",
    ];

    async fn table_count(pool: &sqlx::SqlitePool, name: &str) -> i64 {
        sqlx::query(
            "SELECT COUNT(*) AS count FROM sqlite_master WHERE type = 'table' AND name = ?",
        )
        .bind(name)
        .fetch_one(pool)
        .await
        .expect("check table")
        .get::<i64, _>("count")
    }

    #[tokio::test]
    async fn migrations_create_baseline_tables() {
        let pool = memory_pool().await;
        run_pending(&pool).await.expect("run migrations");

        for table in MANAGED_TABLES {
            assert_eq!(table_count(&pool, table).await, 1, "table `{table}` should exist");
        }
    }

    #[tokio::test]
    async fn migrations_are_reversible() {
        let pool = memory_pool().await;
        run_pending(&pool).await.expect("run migrations");

        MIGRATOR.undo(&pool, 0).await.expect("undo migrations");

        for table in MANAGED_TABLES {
            assert_eq!(table_count(&pool, table).await, 0, "table `{table}` should be dropped");
        }

        run_pending(&pool).await.expect("re-run migrations");

        for table in MANAGED_TABLES {
            assert_eq!(table_count(&pool, table).await, 1, "table `{table}` should be recreated");
        }
    }
}
