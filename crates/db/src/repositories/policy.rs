use sqlx::{sqlite::SqliteRow, Row};

use expenseflow_core::domain::employee::{CompanyId, EmployeeId};
use expenseflow_core::domain::policy::{ApprovalMode, ApprovalPolicy, PolicyId, StepRule};

use super::{parse_timestamp, parse_u32, PolicyRepository, RepositoryError};
use crate::DbPool;

pub struct SqlPolicyRepository {
    pool: DbPool,
}

impl SqlPolicyRepository {
    pub fn new(pool: DbPool) -> Self {
        Self { pool }
    }

    async fn load_steps(&self, policy_id: &PolicyId) -> Result<Vec<StepRule>, RepositoryError> {
        let step_rows = sqlx::query(
            "SELECT step_number, mode, required_percentage
             FROM policy_step
             WHERE policy_id = ?
             ORDER BY step_number ASC",
        )
        .bind(&policy_id.0)
        .fetch_all(&self.pool)
        .await?;

        let approver_rows = sqlx::query(
            "SELECT step_number, approver_id, is_designated
             FROM policy_step_approver
             WHERE policy_id = ?
             ORDER BY step_number ASC, rowid ASC",
        )
        .bind(&policy_id.0)
        .fetch_all(&self.pool)
        .await?;

        let mut steps = Vec::with_capacity(step_rows.len());
        for step_row in step_rows {
            let step_number = parse_u32("step_number", step_row.try_get("step_number")?)?;

            let mut approvers = Vec::new();
            let mut designated = Vec::new();
            for approver_row in &approver_rows {
                let row_step = parse_u32("step_number", approver_row.try_get("step_number")?)?;
                if row_step != step_number {
                    continue;
                }
                let approver_id = EmployeeId(approver_row.try_get("approver_id")?);
                if approver_row.try_get::<i64, _>("is_designated")? != 0 {
                    designated.push(approver_id.clone());
                }
                approvers.push(approver_id);
            }

            let mode = mode_from_row(&step_row, step_number, designated)?;
            steps.push(StepRule { step_number, approvers, mode });
        }

        Ok(steps)
    }

    async fn load_policy(&self, row: SqliteRow) -> Result<ApprovalPolicy, RepositoryError> {
        let id = PolicyId(row.try_get("id")?);
        let steps = self.load_steps(&id).await?;

        Ok(ApprovalPolicy {
            id,
            company_id: CompanyId(row.try_get("company_id")?),
            name: row.try_get("name")?,
            steps,
            is_active: row.try_get::<i64, _>("is_active")? != 0,
            created_at: parse_timestamp("created_at", row.try_get("created_at")?)?,
        })
    }
}

#[async_trait::async_trait]
impl PolicyRepository for SqlPolicyRepository {
    async fn find_by_id(&self, id: &PolicyId) -> Result<Option<ApprovalPolicy>, RepositoryError> {
        let row = sqlx::query(
            "SELECT id, company_id, name, is_active, created_at
             FROM approval_policy
             WHERE id = ?",
        )
        .bind(&id.0)
        .fetch_optional(&self.pool)
        .await?;

        match row {
            Some(row) => Ok(Some(self.load_policy(row).await?)),
            None => Ok(None),
        }
    }

    async fn find_active(
        &self,
        company_id: &CompanyId,
    ) -> Result<Option<ApprovalPolicy>, RepositoryError> {
        let row = sqlx::query(
            "SELECT id, company_id, name, is_active, created_at
             FROM approval_policy
             WHERE company_id = ? AND is_active = 1",
        )
        .bind(&company_id.0)
        .fetch_optional(&self.pool)
        .await?;

        match row {
            Some(row) => Ok(Some(self.load_policy(row).await?)),
            None => Ok(None),
        }
    }

    async fn list_for_company(
        &self,
        company_id: &CompanyId,
    ) -> Result<Vec<ApprovalPolicy>, RepositoryError> {
        let rows = sqlx::query(
            "SELECT id, company_id, name, is_active, created_at
             FROM approval_policy
             WHERE company_id = ?
             ORDER BY created_at DESC, id ASC",
        )
        .bind(&company_id.0)
        .fetch_all(&self.pool)
        .await?;

        let mut policies = Vec::with_capacity(rows.len());
        for row in rows {
            policies.push(self.load_policy(row).await?);
        }
        Ok(policies)
    }

    async fn save(&self, policy: ApprovalPolicy) -> Result<(), RepositoryError> {
        let mut tx = self.pool.begin().await?;
        upsert_policy(&mut tx, &policy).await?;
        tx.commit().await?;
        Ok(())
    }

    async fn set_active(&self, policy: ApprovalPolicy) -> Result<(), RepositoryError> {
        let mut tx = self.pool.begin().await?;

        sqlx::query("UPDATE approval_policy SET is_active = 0 WHERE company_id = ?")
            .bind(&policy.company_id.0)
            .execute(&mut *tx)
            .await?;

        let activated = ApprovalPolicy { is_active: true, ..policy };
        upsert_policy(&mut tx, &activated).await?;

        tx.commit().await?;
        Ok(())
    }

    async fn delete(&self, id: &PolicyId) -> Result<(), RepositoryError> {
        sqlx::query("DELETE FROM approval_policy WHERE id = ?")
            .bind(&id.0)
            .execute(&self.pool)
            .await?;
        Ok(())
    }
}

async fn upsert_policy(
    tx: &mut sqlx::Transaction<'_, sqlx::Sqlite>,
    policy: &ApprovalPolicy,
) -> Result<(), RepositoryError> {
    sqlx::query(
        "INSERT INTO approval_policy (id, company_id, name, is_active, created_at)
         VALUES (?, ?, ?, ?, ?)
         ON CONFLICT(id) DO UPDATE SET
            company_id = excluded.company_id,
            name = excluded.name,
            is_active = excluded.is_active",
    )
    .bind(&policy.id.0)
    .bind(&policy.company_id.0)
    .bind(&policy.name)
    .bind(i64::from(policy.is_active))
    .bind(policy.created_at.to_rfc3339())
    .execute(&mut **tx)
    .await?;

    // Cascades into policy_step_approver.
    sqlx::query("DELETE FROM policy_step WHERE policy_id = ?")
        .bind(&policy.id.0)
        .execute(&mut **tx)
        .await?;

    for step in &policy.steps {
        insert_step(tx, &policy.id, step).await?;
    }

    Ok(())
}

async fn insert_step(
    tx: &mut sqlx::Transaction<'_, sqlx::Sqlite>,
    policy_id: &PolicyId,
    step: &StepRule,
) -> Result<(), RepositoryError> {
    let required_percentage = match step.mode {
        ApprovalMode::Percentage { required_percentage }
        | ApprovalMode::Hybrid { required_percentage, .. } => Some(i64::from(required_percentage)),
        ApprovalMode::All | ApprovalMode::Specific { .. } => None,
    };

    sqlx::query(
        "INSERT INTO policy_step (policy_id, step_number, mode, required_percentage)
         VALUES (?, ?, ?, ?)",
    )
    .bind(&policy_id.0)
    .bind(i64::from(step.step_number))
    .bind(step.mode.kind_str())
    .bind(required_percentage)
    .execute(&mut **tx)
    .await?;

    let designated = step.designated_approvers();
    for approver in &step.approvers {
        sqlx::query(
            "INSERT INTO policy_step_approver (policy_id, step_number, approver_id, is_designated)
             VALUES (?, ?, ?, ?)",
        )
        .bind(&policy_id.0)
        .bind(i64::from(step.step_number))
        .bind(&approver.0)
        .bind(i64::from(designated.contains(approver)))
        .execute(&mut **tx)
        .await?;
    }

    Ok(())
}

fn mode_from_row(
    row: &SqliteRow,
    step_number: u32,
    designated: Vec<EmployeeId>,
) -> Result<ApprovalMode, RepositoryError> {
    let kind = row.try_get::<String, _>("mode")?;
    let required_percentage = row
        .try_get::<Option<i64>, _>("required_percentage")?
        .map(|value| {
            u8::try_from(value).map_err(|_| {
                RepositoryError::Decode(format!(
                    "invalid required_percentage for step {step_number}: {value}"
                ))
            })
        })
        .transpose()?;

    match kind.as_str() {
        "all" => Ok(ApprovalMode::All),
        "percentage" => {
            let required_percentage = required_percentage.ok_or_else(|| {
                RepositoryError::Decode(format!(
                    "step {step_number} is percentage mode without a required_percentage"
                ))
            })?;
            Ok(ApprovalMode::Percentage { required_percentage })
        }
        "specific" => Ok(ApprovalMode::Specific { approvers: designated }),
        "hybrid" => {
            let required_percentage = required_percentage.ok_or_else(|| {
                RepositoryError::Decode(format!(
                    "step {step_number} is hybrid mode without a required_percentage"
                ))
            })?;
            Ok(ApprovalMode::Hybrid { required_percentage, approvers: designated })
        }
        other => Err(RepositoryError::Decode(format!("unknown approval mode `{other}`"))),
    }
}
