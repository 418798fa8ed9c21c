use sqlx::{sqlite::SqliteRow, Row};

use expenseflow_core::domain::employee::{CompanyId, EmployeeId};
use expenseflow_core::domain::expense::{
    Expense, ExpenseCategory, ExpenseId, ExpenseStatus, PaidBy,
};

use super::{
    parse_date, parse_decimal, parse_timestamp, parse_u32, ExpenseRepository, RepositoryError,
};
use crate::DbPool;

const EXPENSE_COLUMNS: &str = "id,
    employee_id,
    company_id,
    description,
    category,
    expense_date,
    amount,
    currency,
    amount_in_base_currency,
    paid_by,
    remarks,
    receipt_url,
    status,
    current_approval_step,
    created_at,
    updated_at";

pub struct SqlExpenseRepository {
    pool: DbPool,
}

impl SqlExpenseRepository {
    pub fn new(pool: DbPool) -> Self {
        Self { pool }
    }
}

#[async_trait::async_trait]
impl ExpenseRepository for SqlExpenseRepository {
    async fn find_by_id(&self, id: &ExpenseId) -> Result<Option<Expense>, RepositoryError> {
        let row = sqlx::query(&format!("SELECT {EXPENSE_COLUMNS} FROM expense WHERE id = ?"))
            .bind(&id.0)
            .fetch_optional(&self.pool)
            .await?;

        row.map(expense_from_row).transpose()
    }

    async fn find_owned(
        &self,
        id: &ExpenseId,
        employee_id: &EmployeeId,
    ) -> Result<Option<Expense>, RepositoryError> {
        let row = sqlx::query(&format!(
            "SELECT {EXPENSE_COLUMNS} FROM expense WHERE id = ? AND employee_id = ?"
        ))
        .bind(&id.0)
        .bind(&employee_id.0)
        .fetch_optional(&self.pool)
        .await?;

        row.map(expense_from_row).transpose()
    }

    async fn list_for_employee(
        &self,
        employee_id: &EmployeeId,
    ) -> Result<Vec<Expense>, RepositoryError> {
        let rows = sqlx::query(&format!(
            "SELECT {EXPENSE_COLUMNS} FROM expense
             WHERE employee_id = ?
             ORDER BY created_at DESC"
        ))
        .bind(&employee_id.0)
        .fetch_all(&self.pool)
        .await?;

        rows.into_iter().map(expense_from_row).collect()
    }

    async fn save(&self, expense: Expense) -> Result<(), RepositoryError> {
        sqlx::query(
            "INSERT INTO expense (
                id,
                employee_id,
                company_id,
                description,
                category,
                expense_date,
                amount,
                currency,
                amount_in_base_currency,
                paid_by,
                remarks,
                receipt_url,
                status,
                current_approval_step,
                created_at,
                updated_at
             ) VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)
             ON CONFLICT(id) DO UPDATE SET
                description = excluded.description,
                category = excluded.category,
                expense_date = excluded.expense_date,
                amount = excluded.amount,
                currency = excluded.currency,
                amount_in_base_currency = excluded.amount_in_base_currency,
                paid_by = excluded.paid_by,
                remarks = excluded.remarks,
                receipt_url = excluded.receipt_url,
                status = excluded.status,
                current_approval_step = excluded.current_approval_step,
                updated_at = excluded.updated_at",
        )
        .bind(&expense.id.0)
        .bind(&expense.employee_id.0)
        .bind(&expense.company_id.0)
        .bind(&expense.description)
        .bind(expense.category.as_str())
        .bind(expense.expense_date.format("%Y-%m-%d").to_string())
        .bind(expense.amount.to_string())
        .bind(&expense.currency)
        .bind(expense.amount_in_base_currency.to_string())
        .bind(expense.paid_by.as_str())
        .bind(&expense.remarks)
        .bind(expense.receipt_url.as_deref())
        .bind(expense.status.as_str())
        .bind(i64::from(expense.current_approval_step))
        .bind(expense.created_at.to_rfc3339())
        .bind(expense.updated_at.to_rfc3339())
        .execute(&self.pool)
        .await?;

        Ok(())
    }
}

fn expense_from_row(row: SqliteRow) -> Result<Expense, RepositoryError> {
    let status_raw = row.try_get::<String, _>("status")?;
    let status = ExpenseStatus::parse(&status_raw)
        .ok_or_else(|| RepositoryError::Decode(format!("unknown expense status `{status_raw}`")))?;

    let category_raw = row.try_get::<String, _>("category")?;
    let category = ExpenseCategory::parse(&category_raw).ok_or_else(|| {
        RepositoryError::Decode(format!("unknown expense category `{category_raw}`"))
    })?;

    let paid_by_raw = row.try_get::<String, _>("paid_by")?;
    let paid_by = PaidBy::parse(&paid_by_raw)
        .ok_or_else(|| RepositoryError::Decode(format!("unknown paid_by `{paid_by_raw}`")))?;

    Ok(Expense {
        id: ExpenseId(row.try_get("id")?),
        employee_id: EmployeeId(row.try_get("employee_id")?),
        company_id: CompanyId(row.try_get("company_id")?),
        description: row.try_get("description")?,
        category,
        expense_date: parse_date("expense_date", row.try_get("expense_date")?)?,
        amount: parse_decimal("amount", row.try_get("amount")?)?,
        currency: row.try_get("currency")?,
        amount_in_base_currency: parse_decimal(
            "amount_in_base_currency",
            row.try_get("amount_in_base_currency")?,
        )?,
        paid_by,
        remarks: row.try_get("remarks")?,
        receipt_url: row.try_get("receipt_url")?,
        status,
        current_approval_step: parse_u32(
            "current_approval_step",
            row.try_get("current_approval_step")?,
        )?,
        created_at: parse_timestamp("created_at", row.try_get("created_at")?)?,
        updated_at: parse_timestamp("updated_at", row.try_get("updated_at")?)?,
    })
}

#[cfg(test)]
mod tests {
    use chrono::{NaiveDate, Utc};
    use rust_decimal::Decimal;

    use expenseflow_core::domain::employee::{CompanyId, Employee, EmployeeId, Role};
    use expenseflow_core::domain::expense::{
        Expense, ExpenseCategory, ExpenseId, ExpenseStatus, PaidBy,
    };

    use crate::connection::memory_pool;
    use crate::migrations::run_pending;
    use crate::repositories::employee::SqlEmployeeRepository;
    use crate::repositories::{EmployeeRepository, ExpenseRepository};

    use super::SqlExpenseRepository;

    async fn pool_with_owner(owner: &str) -> crate::DbPool {
        let pool = memory_pool().await;
        run_pending(&pool).await.expect("run migrations");

        let employees = SqlEmployeeRepository::new(pool.clone());
        employees
            .save(Employee {
                id: EmployeeId(owner.to_string()),
                company_id: CompanyId("c-1".to_string()),
                name: "Ada".to_string(),
                email: format!("{owner}@example.com"),
                role: Role::Employee,
                manager_id: None,
            })
            .await
            .expect("save owner");

        pool
    }

    fn expense(id: &str, owner: &str) -> Expense {
        let now = Utc::now();
        Expense {
            id: ExpenseId(id.to_string()),
            employee_id: EmployeeId(owner.to_string()),
            company_id: CompanyId("c-1".to_string()),
            description: "Flight to the Berlin office".to_string(),
            category: ExpenseCategory::Travel,
            expense_date: NaiveDate::from_ymd_opt(2026, 4, 2).expect("valid date"),
            amount: Decimal::new(48_999, 2),
            currency: "EUR".to_string(),
            amount_in_base_currency: Decimal::new(53_100, 2),
            paid_by: PaidBy::Personal,
            remarks: "Booked late".to_string(),
            receipt_url: Some("https://receipts.example.com/r/42".to_string()),
            status: ExpenseStatus::Draft,
            current_approval_step: 0,
            created_at: now,
            updated_at: now,
        }
    }

    #[tokio::test]
    async fn save_and_find_round_trips_all_fields() {
        let pool = pool_with_owner("u-1").await;
        let repo = SqlExpenseRepository::new(pool);

        let original = expense("E-1", "u-1");
        repo.save(original.clone()).await.expect("save expense");

        let found = repo.find_by_id(&original.id).await.expect("find expense");
        let found = found.expect("expense should exist");

        assert_eq!(found.amount, original.amount);
        assert_eq!(found.expense_date, original.expense_date);
        assert_eq!(found.receipt_url, original.receipt_url);
        assert_eq!(found.status, ExpenseStatus::Draft);
    }

    #[tokio::test]
    async fn find_owned_filters_by_employee() {
        let pool = pool_with_owner("u-1").await;
        let repo = SqlExpenseRepository::new(pool);

        let original = expense("E-1", "u-1");
        repo.save(original.clone()).await.expect("save expense");

        let other = EmployeeId("u-2".to_string());
        let not_found = repo.find_owned(&original.id, &other).await.expect("find owned");
        assert!(not_found.is_none());

        let found =
            repo.find_owned(&original.id, &original.employee_id).await.expect("find owned");
        assert!(found.is_some());
    }

    #[tokio::test]
    async fn save_is_an_upsert() {
        let pool = pool_with_owner("u-1").await;
        let repo = SqlExpenseRepository::new(pool);

        let mut original = expense("E-1", "u-1");
        repo.save(original.clone()).await.expect("save expense");

        original.status = ExpenseStatus::WaitingApproval;
        original.current_approval_step = 1;
        repo.save(original.clone()).await.expect("update expense");

        let found = repo.find_by_id(&original.id).await.expect("find expense");
        let found = found.expect("expense should exist");
        assert_eq!(found.status, ExpenseStatus::WaitingApproval);
        assert_eq!(found.current_approval_step, 1);
    }
}
