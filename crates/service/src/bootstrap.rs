use std::sync::Arc;

use thiserror::Error;
use tracing::info;

use expenseflow_core::config::{AppConfig, ConfigError, LoadOptions};
use expenseflow_db::repositories::{
    SqlApprovalLedgerRepository, SqlEmployeeRepository, SqlExpenseRepository, SqlPolicyRepository,
};
use expenseflow_db::{connect, migrations, DbPool};

use crate::service::{ExpenseService, Repositories};
use crate::telemetry::TracingAuditSink;

pub struct Application {
    pub config: AppConfig,
    pub db_pool: DbPool,
    pub service: Arc<ExpenseService>,
}

#[derive(Debug, Error)]
pub enum BootstrapError {
    #[error(transparent)]
    Config(#[from] ConfigError),
    #[error("database connection failed: {0}")]
    DatabaseConnect(#[source] sqlx::Error),
    #[error("database migration failed: {0}")]
    Migration(#[source] sqlx::migrate::MigrateError),
}

pub async fn bootstrap(options: LoadOptions) -> Result<Application, BootstrapError> {
    info!(
        event_name = "system.bootstrap.start",
        correlation_id = "bootstrap",
        "starting application bootstrap"
    );
    let config = AppConfig::load(options)?;

    let db_pool = connect(&config.database).await.map_err(BootstrapError::DatabaseConnect)?;
    info!(
        event_name = "system.bootstrap.database_connected",
        correlation_id = "bootstrap",
        "database connection established"
    );

    migrations::run_pending(&db_pool).await.map_err(BootstrapError::Migration)?;
    info!(
        event_name = "system.bootstrap.migrations_applied",
        correlation_id = "bootstrap",
        "database migrations applied"
    );

    let repositories = Repositories {
        expenses: Arc::new(SqlExpenseRepository::new(db_pool.clone())),
        ledger: Arc::new(SqlApprovalLedgerRepository::new(db_pool.clone())),
        policies: Arc::new(SqlPolicyRepository::new(db_pool.clone())),
        employees: Arc::new(SqlEmployeeRepository::new(db_pool.clone())),
    };
    let service = Arc::new(ExpenseService::new(repositories, Arc::new(TracingAuditSink)));

    Ok(Application { config, db_pool, service })
}

#[cfg(test)]
mod tests {
    use expenseflow_core::config::{ConfigOverrides, LoadOptions};

    use super::bootstrap;

    #[tokio::test]
    async fn bootstrap_connects_and_migrates_an_in_memory_database() {
        let app = bootstrap(LoadOptions {
            overrides: ConfigOverrides {
                database_url: Some("sqlite::memory:".to_string()),
                ..ConfigOverrides::default()
            },
            ..LoadOptions::default()
        })
        .await
        .expect("bootstrap");

        assert_eq!(app.config.database.url, "sqlite::memory:");
    }

    #[tokio::test]
    async fn bootstrap_rejects_an_unreachable_database_url() {
        let result = bootstrap(LoadOptions {
            overrides: ConfigOverrides {
                database_url: Some(
                    "sqlite:///nonexistent-dir/expenseflow.db?mode=ro".to_string(),
                ),
                ..ConfigOverrides::default()
            },
            ..LoadOptions::default()
        })
        .await;

        assert!(result.is_err());
    }
}
