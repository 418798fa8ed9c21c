use std::str::FromStr;

use async_trait::async_trait;
use chrono::{DateTime, NaiveDate, Utc};
use rust_decimal::Decimal;
use thiserror::Error;

use expenseflow_core::domain::approval::{ApprovalRecord, ApprovalRecordId};
use expenseflow_core::domain::employee::{CompanyId, Employee, EmployeeId};
use expenseflow_core::domain::expense::{Expense, ExpenseId};
use expenseflow_core::domain::policy::{ApprovalPolicy, PolicyId};

pub mod approval;
pub mod employee;
pub mod expense;
pub mod memory;
pub mod policy;

pub use approval::SqlApprovalLedgerRepository;
pub use employee::SqlEmployeeRepository;
pub use expense::SqlExpenseRepository;
pub use memory::{
    InMemoryApprovalLedgerRepository, InMemoryEmployeeRepository, InMemoryExpenseRepository,
    InMemoryPolicyRepository,
};
pub use policy::SqlPolicyRepository;

#[derive(Debug, Error)]
pub enum RepositoryError {
    #[error("database error: {0}")]
    Database(#[from] sqlx::Error),
    #[error("decode error: {0}")]
    Decode(String),
    #[error("conflict: {0}")]
    Conflict(String),
}

#[async_trait]
pub trait ExpenseRepository: Send + Sync {
    async fn find_by_id(&self, id: &ExpenseId) -> Result<Option<Expense>, RepositoryError>;

    /// Owner-scoped lookup, for draft edits and submission.
    async fn find_owned(
        &self,
        id: &ExpenseId,
        employee_id: &EmployeeId,
    ) -> Result<Option<Expense>, RepositoryError>;

    async fn list_for_employee(
        &self,
        employee_id: &EmployeeId,
    ) -> Result<Vec<Expense>, RepositoryError>;

    async fn save(&self, expense: Expense) -> Result<(), RepositoryError>;
}

#[async_trait]
pub trait ApprovalLedgerRepository: Send + Sync {
    async fn find_by_id(
        &self,
        id: &ApprovalRecordId,
    ) -> Result<Option<ApprovalRecord>, RepositoryError>;

    /// Inserts the pending records for a freshly seeded step in one
    /// transaction.
    async fn seed_step(&self, records: &[ApprovalRecord]) -> Result<(), RepositoryError>;

    /// Persists a decided record. Guarded so only a still-pending row can be
    /// stamped; a lost race surfaces as `Conflict`.
    async fn record_decision(&self, record: &ApprovalRecord) -> Result<(), RepositoryError>;

    async fn list_for_step(
        &self,
        expense_id: &ExpenseId,
        step: u32,
    ) -> Result<Vec<ApprovalRecord>, RepositoryError>;

    async fn list_for_expense(
        &self,
        expense_id: &ExpenseId,
    ) -> Result<Vec<ApprovalRecord>, RepositoryError>;

    async fn list_pending_for_approver(
        &self,
        approver_id: &EmployeeId,
    ) -> Result<Vec<ApprovalRecord>, RepositoryError>;
}

#[async_trait]
pub trait PolicyRepository: Send + Sync {
    async fn find_by_id(&self, id: &PolicyId) -> Result<Option<ApprovalPolicy>, RepositoryError>;

    async fn find_active(
        &self,
        company_id: &CompanyId,
    ) -> Result<Option<ApprovalPolicy>, RepositoryError>;

    async fn list_for_company(
        &self,
        company_id: &CompanyId,
    ) -> Result<Vec<ApprovalPolicy>, RepositoryError>;

    /// Plain upsert; the caller controls the `is_active` flag.
    async fn save(&self, policy: ApprovalPolicy) -> Result<(), RepositoryError>;

    /// Activates the policy and deactivates every other policy in its
    /// company within one transaction.
    async fn set_active(&self, policy: ApprovalPolicy) -> Result<(), RepositoryError>;

    async fn delete(&self, id: &PolicyId) -> Result<(), RepositoryError>;
}

#[async_trait]
pub trait EmployeeRepository: Send + Sync {
    async fn find_by_id(&self, id: &EmployeeId) -> Result<Option<Employee>, RepositoryError>;

    /// The fallback approver consulted when no active policy covers an
    /// expense. Unknown employees resolve to `None`, same as employees
    /// without a manager.
    async fn manager_of(
        &self,
        employee_id: &EmployeeId,
    ) -> Result<Option<EmployeeId>, RepositoryError> {
        Ok(self.find_by_id(employee_id).await?.and_then(|employee| employee.manager_id))
    }

    async fn save(&self, employee: Employee) -> Result<(), RepositoryError>;
}

pub(crate) fn parse_timestamp(
    column: &str,
    value: String,
) -> Result<DateTime<Utc>, RepositoryError> {
    DateTime::parse_from_rfc3339(&value)
        .map(|parsed| parsed.with_timezone(&Utc))
        .map_err(|err| RepositoryError::Decode(format!("invalid timestamp in `{column}`: {err}")))
}

pub(crate) fn parse_optional_timestamp(
    column: &str,
    value: Option<String>,
) -> Result<Option<DateTime<Utc>>, RepositoryError> {
    value.map(|value| parse_timestamp(column, value)).transpose()
}

pub(crate) fn parse_date(column: &str, value: String) -> Result<NaiveDate, RepositoryError> {
    NaiveDate::parse_from_str(&value, "%Y-%m-%d")
        .map_err(|err| RepositoryError::Decode(format!("invalid date in `{column}`: {err}")))
}

pub(crate) fn parse_decimal(column: &str, value: String) -> Result<Decimal, RepositoryError> {
    Decimal::from_str(&value)
        .map_err(|err| RepositoryError::Decode(format!("invalid amount in `{column}`: {err}")))
}

pub(crate) fn parse_u32(column: &str, value: i64) -> Result<u32, RepositoryError> {
    u32::try_from(value).map_err(|_| {
        RepositoryError::Decode(format!(
            "invalid value for `{column}` (expected non-negative u32): {value}"
        ))
    })
}
