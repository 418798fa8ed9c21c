use sqlx::{sqlite::SqliteRow, Row};

use expenseflow_core::domain::employee::{CompanyId, Employee, EmployeeId, Role};

use super::{EmployeeRepository, RepositoryError};
use crate::DbPool;

pub struct SqlEmployeeRepository {
    pool: DbPool,
}

impl SqlEmployeeRepository {
    pub fn new(pool: DbPool) -> Self {
        Self { pool }
    }
}

#[async_trait::async_trait]
impl EmployeeRepository for SqlEmployeeRepository {
    async fn find_by_id(&self, id: &EmployeeId) -> Result<Option<Employee>, RepositoryError> {
        let row = sqlx::query(
            "SELECT id, company_id, name, email, role, manager_id
             FROM employee
             WHERE id = ?",
        )
        .bind(&id.0)
        .fetch_optional(&self.pool)
        .await?;

        row.map(employee_from_row).transpose()
    }

    async fn save(&self, employee: Employee) -> Result<(), RepositoryError> {
        sqlx::query(
            "INSERT INTO employee (id, company_id, name, email, role, manager_id)
             VALUES (?, ?, ?, ?, ?, ?)
             ON CONFLICT(id) DO UPDATE SET
                company_id = excluded.company_id,
                name = excluded.name,
                email = excluded.email,
                role = excluded.role,
                manager_id = excluded.manager_id",
        )
        .bind(&employee.id.0)
        .bind(&employee.company_id.0)
        .bind(&employee.name)
        .bind(&employee.email)
        .bind(employee.role.as_str())
        .bind(employee.manager_id.as_ref().map(|id| id.0.as_str()))
        .execute(&self.pool)
        .await?;

        Ok(())
    }
}

fn employee_from_row(row: SqliteRow) -> Result<Employee, RepositoryError> {
    let role_raw = row.try_get::<String, _>("role")?;
    let role = Role::parse(&role_raw)
        .ok_or_else(|| RepositoryError::Decode(format!("unknown role `{role_raw}`")))?;

    Ok(Employee {
        id: EmployeeId(row.try_get("id")?),
        company_id: CompanyId(row.try_get("company_id")?),
        name: row.try_get("name")?,
        email: row.try_get("email")?,
        role,
        manager_id: row.try_get::<Option<String>, _>("manager_id")?.map(EmployeeId),
    })
}

#[cfg(test)]
mod tests {
    use expenseflow_core::domain::employee::{CompanyId, Employee, EmployeeId, Role};

    use crate::connection::memory_pool;
    use crate::migrations::run_pending;
    use crate::repositories::EmployeeRepository;

    use super::SqlEmployeeRepository;

    #[tokio::test]
    async fn save_and_find_round_trips_manager_chain() {
        let pool = memory_pool().await;
        run_pending(&pool).await.expect("run migrations");
        let repo = SqlEmployeeRepository::new(pool);

        let manager = Employee {
            id: EmployeeId("u-mgr".to_string()),
            company_id: CompanyId("c-1".to_string()),
            name: "Grace".to_string(),
            email: "grace@example.com".to_string(),
            role: Role::Manager,
            manager_id: None,
        };
        let report = Employee {
            id: EmployeeId("u-1".to_string()),
            company_id: CompanyId("c-1".to_string()),
            name: "Ada".to_string(),
            email: "ada@example.com".to_string(),
            role: Role::Employee,
            manager_id: Some(manager.id.clone()),
        };

        repo.save(manager.clone()).await.expect("save manager");
        repo.save(report.clone()).await.expect("save report");

        let found = repo.find_by_id(&report.id).await.expect("find report");
        assert_eq!(found, Some(report.clone()));

        let fallback = repo.manager_of(&report.id).await.expect("resolve manager");
        assert_eq!(fallback, Some(manager.id));
        let none = repo.manager_of(&EmployeeId("u-ghost".to_string())).await.expect("unknown");
        assert_eq!(none, None);
    }
}
