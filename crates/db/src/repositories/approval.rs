use sqlx::{sqlite::SqliteRow, Row};

use expenseflow_core::domain::approval::{ApprovalRecord, ApprovalRecordId, ApprovalStatus};
use expenseflow_core::domain::employee::EmployeeId;
use expenseflow_core::domain::expense::ExpenseId;

use super::{
    parse_optional_timestamp, parse_timestamp, parse_u32, ApprovalLedgerRepository,
    RepositoryError,
};
use crate::DbPool;

const RECORD_COLUMNS: &str = "id,
    expense_id,
    approver_id,
    step,
    status,
    comments,
    decided_at,
    created_at";

pub struct SqlApprovalLedgerRepository {
    pool: DbPool,
}

impl SqlApprovalLedgerRepository {
    pub fn new(pool: DbPool) -> Self {
        Self { pool }
    }
}

#[async_trait::async_trait]
impl ApprovalLedgerRepository for SqlApprovalLedgerRepository {
    async fn find_by_id(
        &self,
        id: &ApprovalRecordId,
    ) -> Result<Option<ApprovalRecord>, RepositoryError> {
        let row =
            sqlx::query(&format!("SELECT {RECORD_COLUMNS} FROM approval_record WHERE id = ?"))
                .bind(&id.0)
                .fetch_optional(&self.pool)
                .await?;

        row.map(record_from_row).transpose()
    }

    async fn seed_step(&self, records: &[ApprovalRecord]) -> Result<(), RepositoryError> {
        let mut tx = self.pool.begin().await?;

        for record in records {
            sqlx::query(
                "INSERT INTO approval_record (
                    id,
                    expense_id,
                    approver_id,
                    step,
                    status,
                    comments,
                    decided_at,
                    created_at
                 ) VALUES (?, ?, ?, ?, ?, ?, ?, ?)",
            )
            .bind(&record.id.0)
            .bind(&record.expense_id.0)
            .bind(&record.approver_id.0)
            .bind(i64::from(record.step))
            .bind(record.status.as_str())
            .bind(&record.comments)
            .bind(record.decided_at.map(|value| value.to_rfc3339()))
            .bind(record.created_at.to_rfc3339())
            .execute(&mut *tx)
            .await?;
        }

        tx.commit().await?;
        Ok(())
    }

    async fn record_decision(&self, record: &ApprovalRecord) -> Result<(), RepositoryError> {
        let result = sqlx::query(
            "UPDATE approval_record
             SET status = ?, comments = ?, decided_at = ?
             WHERE id = ? AND status = 'pending'",
        )
        .bind(record.status.as_str())
        .bind(&record.comments)
        .bind(record.decided_at.map(|value| value.to_rfc3339()))
        .bind(&record.id.0)
        .execute(&self.pool)
        .await?;

        if result.rows_affected() == 0 {
            return Err(RepositoryError::Conflict(format!(
                "approval record `{}` is no longer pending",
                record.id.0
            )));
        }

        Ok(())
    }

    async fn list_for_step(
        &self,
        expense_id: &ExpenseId,
        step: u32,
    ) -> Result<Vec<ApprovalRecord>, RepositoryError> {
        let rows = sqlx::query(&format!(
            "SELECT {RECORD_COLUMNS} FROM approval_record
             WHERE expense_id = ? AND step = ?
             ORDER BY created_at ASC, id ASC"
        ))
        .bind(&expense_id.0)
        .bind(i64::from(step))
        .fetch_all(&self.pool)
        .await?;

        rows.into_iter().map(record_from_row).collect()
    }

    async fn list_for_expense(
        &self,
        expense_id: &ExpenseId,
    ) -> Result<Vec<ApprovalRecord>, RepositoryError> {
        let rows = sqlx::query(&format!(
            "SELECT {RECORD_COLUMNS} FROM approval_record
             WHERE expense_id = ?
             ORDER BY step ASC, created_at ASC, id ASC"
        ))
        .bind(&expense_id.0)
        .fetch_all(&self.pool)
        .await?;

        rows.into_iter().map(record_from_row).collect()
    }

    async fn list_pending_for_approver(
        &self,
        approver_id: &EmployeeId,
    ) -> Result<Vec<ApprovalRecord>, RepositoryError> {
        let rows = sqlx::query(&format!(
            "SELECT {RECORD_COLUMNS} FROM approval_record
             WHERE approver_id = ? AND status = 'pending'
             ORDER BY created_at ASC, id ASC"
        ))
        .bind(&approver_id.0)
        .fetch_all(&self.pool)
        .await?;

        rows.into_iter().map(record_from_row).collect()
    }
}

fn record_from_row(row: SqliteRow) -> Result<ApprovalRecord, RepositoryError> {
    let status_raw = row.try_get::<String, _>("status")?;
    let status = ApprovalStatus::parse(&status_raw).ok_or_else(|| {
        RepositoryError::Decode(format!("unknown approval status `{status_raw}`"))
    })?;

    Ok(ApprovalRecord {
        id: ApprovalRecordId(row.try_get("id")?),
        expense_id: ExpenseId(row.try_get("expense_id")?),
        approver_id: EmployeeId(row.try_get("approver_id")?),
        step: parse_u32("step", row.try_get("step")?)?,
        status,
        comments: row.try_get("comments")?,
        decided_at: parse_optional_timestamp("decided_at", row.try_get("decided_at")?)?,
        created_at: parse_timestamp("created_at", row.try_get("created_at")?)?,
    })
}

#[cfg(test)]
mod tests {
    use chrono::{NaiveDate, Utc};
    use rust_decimal::Decimal;

    use expenseflow_core::domain::approval::{ApprovalRecord, ApprovalStatus};
    use expenseflow_core::domain::employee::{CompanyId, Employee, EmployeeId, Role};
    use expenseflow_core::domain::expense::{
        Expense, ExpenseCategory, ExpenseId, ExpenseStatus, PaidBy,
    };

    use crate::connection::memory_pool;
    use crate::migrations::run_pending;
    use crate::repositories::employee::SqlEmployeeRepository;
    use crate::repositories::expense::SqlExpenseRepository;
    use crate::repositories::{
        ApprovalLedgerRepository, EmployeeRepository, ExpenseRepository, RepositoryError,
    };

    use super::SqlApprovalLedgerRepository;

    async fn seeded_pool() -> crate::DbPool {
        let pool = memory_pool().await;
        run_pending(&pool).await.expect("run migrations");

        let employees = SqlEmployeeRepository::new(pool.clone());
        for id in ["u-owner", "u-mgr", "u-fin"] {
            employees
                .save(Employee {
                    id: EmployeeId(id.to_string()),
                    company_id: CompanyId("c-1".to_string()),
                    name: id.to_string(),
                    email: format!("{id}@example.com"),
                    role: Role::Manager,
                    manager_id: None,
                })
                .await
                .expect("save employee");
        }

        let now = Utc::now();
        let expenses = SqlExpenseRepository::new(pool.clone());
        expenses
            .save(Expense {
                id: ExpenseId("E-1".to_string()),
                employee_id: EmployeeId("u-owner".to_string()),
                company_id: CompanyId("c-1".to_string()),
                description: "Team lunch".to_string(),
                category: ExpenseCategory::Food,
                expense_date: NaiveDate::from_ymd_opt(2026, 4, 2).expect("valid date"),
                amount: Decimal::new(8_000, 2),
                currency: "USD".to_string(),
                amount_in_base_currency: Decimal::new(8_000, 2),
                paid_by: PaidBy::Personal,
                remarks: String::new(),
                receipt_url: None,
                status: ExpenseStatus::WaitingApproval,
                current_approval_step: 1,
                created_at: now,
                updated_at: now,
            })
            .await
            .expect("save expense");

        pool
    }

    #[tokio::test]
    async fn seed_step_inserts_pending_records() {
        let pool = seeded_pool().await;
        let repo = SqlApprovalLedgerRepository::new(pool);

        let now = Utc::now();
        let records = vec![
            ApprovalRecord::pending(
                ExpenseId("E-1".to_string()),
                EmployeeId("u-mgr".to_string()),
                1,
                now,
            ),
            ApprovalRecord::pending(
                ExpenseId("E-1".to_string()),
                EmployeeId("u-fin".to_string()),
                1,
                now,
            ),
        ];
        repo.seed_step(&records).await.expect("seed step");

        let step_records =
            repo.list_for_step(&ExpenseId("E-1".to_string()), 1).await.expect("list step");
        assert_eq!(step_records.len(), 2);
        assert!(step_records.iter().all(ApprovalRecord::is_pending));
    }

    #[tokio::test]
    async fn record_decision_stamps_a_pending_record_once() {
        let pool = seeded_pool().await;
        let repo = SqlApprovalLedgerRepository::new(pool);

        let now = Utc::now();
        let mut record = ApprovalRecord::pending(
            ExpenseId("E-1".to_string()),
            EmployeeId("u-mgr".to_string()),
            1,
            now,
        );
        repo.seed_step(std::slice::from_ref(&record)).await.expect("seed step");

        record.status = ApprovalStatus::Approved;
        record.comments = "Looks fine".to_string();
        record.decided_at = Some(now);
        repo.record_decision(&record).await.expect("record decision");

        let found = repo.find_by_id(&record.id).await.expect("find record");
        let found = found.expect("record should exist");
        assert_eq!(found.status, ApprovalStatus::Approved);
        assert_eq!(found.comments, "Looks fine");
        assert!(found.decided_at.is_some());

        let second = repo.record_decision(&record).await;
        assert!(matches!(second, Err(RepositoryError::Conflict(_))));
    }

    #[tokio::test]
    async fn pending_queue_only_lists_undecided_records() {
        let pool = seeded_pool().await;
        let repo = SqlApprovalLedgerRepository::new(pool);

        let now = Utc::now();
        let mut decided = ApprovalRecord::pending(
            ExpenseId("E-1".to_string()),
            EmployeeId("u-mgr".to_string()),
            1,
            now,
        );
        let open = ApprovalRecord::pending(
            ExpenseId("E-1".to_string()),
            EmployeeId("u-fin".to_string()),
            1,
            now,
        );
        repo.seed_step(&[decided.clone(), open.clone()]).await.expect("seed step");

        decided.status = ApprovalStatus::Rejected;
        decided.decided_at = Some(now);
        repo.record_decision(&decided).await.expect("record decision");

        let mgr_queue = repo
            .list_pending_for_approver(&EmployeeId("u-mgr".to_string()))
            .await
            .expect("list pending");
        assert!(mgr_queue.is_empty());

        let fin_queue = repo
            .list_pending_for_approver(&EmployeeId("u-fin".to_string()))
            .await
            .expect("list pending");
        assert_eq!(fin_queue.len(), 1);
        assert_eq!(fin_queue[0].id, open.id);
    }
}
