use std::sync::Arc;

use chrono::{NaiveDate, Utc};
use rust_decimal::Decimal;
use tracing::info;
use uuid::Uuid;

use expenseflow_core::audit::{AuditCategory, AuditContext, AuditEvent, AuditOutcome, AuditSink};
use expenseflow_core::domain::approval::{ApprovalDecision, ApprovalRecord, ApprovalRecordId};
use expenseflow_core::domain::employee::{CompanyId, Employee, EmployeeId};
use expenseflow_core::domain::expense::{
    Expense, ExpenseCategory, ExpenseId, ExpenseStatus, PaidBy,
};
use expenseflow_core::domain::policy::{ApprovalPolicy, PolicyId};
use expenseflow_core::errors::ApplicationError;
use expenseflow_core::workflow::{
    DecisionOutcome, SubmissionOutcome, WorkflowEngine, WorkflowError,
};
use expenseflow_db::repositories::{
    ApprovalLedgerRepository, EmployeeRepository, ExpenseRepository, PolicyRepository,
    RepositoryError,
};

use crate::locks::ExpenseLocks;

pub struct Repositories {
    pub expenses: Arc<dyn ExpenseRepository>,
    pub ledger: Arc<dyn ApprovalLedgerRepository>,
    pub policies: Arc<dyn PolicyRepository>,
    pub employees: Arc<dyn EmployeeRepository>,
}

/// Fields an employee supplies when opening a new draft.
pub struct ExpenseDraft {
    pub employee_id: EmployeeId,
    pub description: String,
    pub category: ExpenseCategory,
    pub expense_date: NaiveDate,
    pub amount: Decimal,
    pub currency: String,
    pub amount_in_base_currency: Decimal,
    pub paid_by: PaidBy,
    pub remarks: String,
    pub receipt_url: Option<String>,
}

/// Partial edit of a draft. `receipt_url` is doubly optional so a patch can
/// distinguish "leave as is" from "clear it".
#[derive(Default)]
pub struct ExpenseUpdate {
    pub description: Option<String>,
    pub category: Option<ExpenseCategory>,
    pub expense_date: Option<NaiveDate>,
    pub amount: Option<Decimal>,
    pub currency: Option<String>,
    pub amount_in_base_currency: Option<Decimal>,
    pub paid_by: Option<PaidBy>,
    pub remarks: Option<String>,
    pub receipt_url: Option<Option<String>>,
}

/// Orchestrates the pure workflow engine over the repositories: loads the
/// entities a transition needs, runs the engine, persists what came back, and
/// emits the audit trail. Submit and decision paths are serialized per
/// expense.
pub struct ExpenseService {
    repos: Repositories,
    engine: WorkflowEngine,
    audit: Arc<dyn AuditSink>,
    locks: ExpenseLocks,
}

impl ExpenseService {
    pub fn new(repos: Repositories, audit: Arc<dyn AuditSink>) -> Self {
        Self { repos, engine: WorkflowEngine::new(), audit, locks: ExpenseLocks::default() }
    }

    pub async fn register_employee(&self, employee: Employee) -> Result<(), ApplicationError> {
        self.repos.employees.save(employee).await.map_err(map_repo)
    }

    pub async fn create_expense(&self, draft: ExpenseDraft) -> Result<Expense, ApplicationError> {
        let owner = self
            .repos
            .employees
            .find_by_id(&draft.employee_id)
            .await
            .map_err(map_repo)?
            .ok_or(ApplicationError::NotFound { entity: "employee" })?;

        let now = Utc::now();
        let expense = Expense {
            id: ExpenseId(Uuid::new_v4().to_string()),
            employee_id: draft.employee_id,
            company_id: owner.company_id,
            description: draft.description,
            category: draft.category,
            expense_date: draft.expense_date,
            amount: draft.amount,
            currency: draft.currency,
            amount_in_base_currency: draft.amount_in_base_currency,
            paid_by: draft.paid_by,
            remarks: draft.remarks,
            receipt_url: draft.receipt_url,
            status: ExpenseStatus::Draft,
            current_approval_step: 0,
            created_at: now,
            updated_at: now,
        };

        self.repos.expenses.save(expense.clone()).await.map_err(map_repo)?;
        info!(
            event_name = "expense.draft_created",
            expense_id = %expense.id.0,
            employee_id = %expense.employee_id.0,
            "expense draft created"
        );
        Ok(expense)
    }

    /// Draft-only, owner-only edit.
    pub async fn update_expense(
        &self,
        expense_id: &ExpenseId,
        acting_employee_id: &EmployeeId,
        update: ExpenseUpdate,
    ) -> Result<Expense, ApplicationError> {
        let mut expense = self
            .repos
            .expenses
            .find_owned(expense_id, acting_employee_id)
            .await
            .map_err(map_repo)?
            .ok_or(ApplicationError::NotFound { entity: "expense" })?;

        if expense.status != ExpenseStatus::Draft {
            return Err(WorkflowError::InvalidExpenseState {
                status: expense.status,
                required: ExpenseStatus::Draft,
            }
            .into());
        }

        if let Some(description) = update.description {
            expense.description = description;
        }
        if let Some(category) = update.category {
            expense.category = category;
        }
        if let Some(expense_date) = update.expense_date {
            expense.expense_date = expense_date;
        }
        if let Some(amount) = update.amount {
            expense.amount = amount;
        }
        if let Some(currency) = update.currency {
            expense.currency = currency;
        }
        if let Some(amount_in_base_currency) = update.amount_in_base_currency {
            expense.amount_in_base_currency = amount_in_base_currency;
        }
        if let Some(paid_by) = update.paid_by {
            expense.paid_by = paid_by;
        }
        if let Some(remarks) = update.remarks {
            expense.remarks = remarks;
        }
        if let Some(receipt_url) = update.receipt_url {
            expense.receipt_url = receipt_url;
        }
        expense.updated_at = Utc::now();

        self.repos.expenses.save(expense.clone()).await.map_err(map_repo)?;
        Ok(expense)
    }

    /// `Draft -> WaitingApproval`. Seeds step 1 of the company's active
    /// policy, falls back to the owner's manager, or auto-approves when
    /// neither exists.
    pub async fn submit_expense(
        &self,
        expense_id: &ExpenseId,
        acting_employee_id: &EmployeeId,
    ) -> Result<SubmissionOutcome, ApplicationError> {
        let _guard = self.locks.acquire(expense_id).await;
        let correlation_id = Uuid::new_v4().to_string();

        let expense = self
            .repos
            .expenses
            .find_owned(expense_id, acting_employee_id)
            .await
            .map_err(map_repo)?
            .ok_or(ApplicationError::NotFound { entity: "expense" })?;

        let policy =
            self.repos.policies.find_active(&expense.company_id).await.map_err(map_repo)?;
        let manager = match &policy {
            Some(policy) if policy.has_steps() => None,
            _ => self.repos.employees.manager_of(acting_employee_id).await.map_err(map_repo)?,
        };

        let outcome =
            self.engine.submit(expense, policy.as_ref(), manager.as_ref(), Utc::now())?;

        if !outcome.seeded.is_empty() {
            self.repos.ledger.seed_step(&outcome.seeded).await.map_err(map_repo)?;
        }
        self.repos.expenses.save(outcome.expense.clone()).await.map_err(map_repo)?;

        info!(
            event_name = "workflow.expense_submitted",
            correlation_id = %correlation_id,
            expense_id = %outcome.expense.id.0,
            status = outcome.expense.status.as_str(),
            seeded = outcome.seeded.len(),
            "expense submitted"
        );
        self.audit.emit(
            AuditEvent::new(
                AuditContext::new(
                    Some(outcome.expense.id.clone()),
                    correlation_id,
                    acting_employee_id.0.clone(),
                ),
                "workflow.expense_submitted",
                AuditCategory::Submission,
                AuditOutcome::Success,
            )
            .with_metadata("status", outcome.expense.status.as_str())
            .with_metadata("seeded", outcome.seeded.len().to_string()),
        );

        Ok(outcome)
    }

    /// Applies one approver's decision to the record's expense.
    pub async fn process_decision(
        &self,
        record_id: &ApprovalRecordId,
        acting_approver_id: &EmployeeId,
        decision: ApprovalDecision,
        comments: Option<String>,
    ) -> Result<DecisionOutcome, ApplicationError> {
        let located = self
            .repos
            .ledger
            .find_by_id(record_id)
            .await
            .map_err(map_repo)?
            .ok_or(ApplicationError::Workflow(WorkflowError::ApprovalNotFound))?;

        let _guard = self.locks.acquire(&located.expense_id).await;
        let correlation_id = Uuid::new_v4().to_string();

        let actor = self
            .repos
            .employees
            .find_by_id(acting_approver_id)
            .await
            .map_err(map_repo)?
            .ok_or(ApplicationError::NotFound { entity: "employee" })?;
        if !actor.can_approve() {
            return Err(ApplicationError::RoleNotPermitted { role: actor.role });
        }

        // Re-read under the lock; a concurrent decision may already have
        // stamped this record or advanced the expense.
        let record = self
            .repos
            .ledger
            .find_by_id(record_id)
            .await
            .map_err(map_repo)?
            .ok_or(ApplicationError::Workflow(WorkflowError::ApprovalNotFound))?;
        let expense = self
            .repos
            .expenses
            .find_by_id(&record.expense_id)
            .await
            .map_err(map_repo)?
            .ok_or(ApplicationError::NotFound { entity: "expense" })?;
        let policy =
            self.repos.policies.find_active(&expense.company_id).await.map_err(map_repo)?;
        let step_records = self
            .repos
            .ledger
            .list_for_step(&record.expense_id, expense.current_approval_step)
            .await
            .map_err(map_repo)?;

        let outcome = self.engine.decide(
            record,
            acting_approver_id,
            decision,
            comments,
            &step_records,
            expense,
            policy.as_ref(),
            Utc::now(),
        )?;

        self.repos.ledger.record_decision(&outcome.record).await.map_err(map_repo)?;
        if !outcome.seeded.is_empty() {
            self.repos.ledger.seed_step(&outcome.seeded).await.map_err(map_repo)?;
        }
        self.repos.expenses.save(outcome.expense.clone()).await.map_err(map_repo)?;

        let audit_outcome = match decision {
            ApprovalDecision::Approved => AuditOutcome::Success,
            ApprovalDecision::Rejected => AuditOutcome::Rejected,
        };
        info!(
            event_name = "workflow.decision_applied",
            correlation_id = %correlation_id,
            expense_id = %outcome.expense.id.0,
            step = outcome.record.step,
            status = outcome.expense.status.as_str(),
            step_complete = outcome.step_complete,
            "approval decision applied"
        );
        self.audit.emit(
            AuditEvent::new(
                AuditContext::new(
                    Some(outcome.expense.id.clone()),
                    correlation_id,
                    acting_approver_id.0.clone(),
                ),
                "workflow.decision_applied",
                AuditCategory::Decision,
                audit_outcome,
            )
            .with_metadata("step", outcome.record.step.to_string())
            .with_metadata("decision", outcome.record.status.as_str())
            .with_metadata("expense_status", outcome.expense.status.as_str()),
        );

        Ok(outcome)
    }

    pub async fn expense_with_history(
        &self,
        expense_id: &ExpenseId,
    ) -> Result<(Expense, Vec<ApprovalRecord>), ApplicationError> {
        let expense = self
            .repos
            .expenses
            .find_by_id(expense_id)
            .await
            .map_err(map_repo)?
            .ok_or(ApplicationError::NotFound { entity: "expense" })?;
        let history = self.repos.ledger.list_for_expense(expense_id).await.map_err(map_repo)?;
        Ok((expense, history))
    }

    pub async fn list_expenses_for(
        &self,
        employee_id: &EmployeeId,
    ) -> Result<Vec<Expense>, ApplicationError> {
        self.repos.expenses.list_for_employee(employee_id).await.map_err(map_repo)
    }

    pub async fn pending_approvals_for(
        &self,
        approver_id: &EmployeeId,
    ) -> Result<Vec<ApprovalRecord>, ApplicationError> {
        self.repos.ledger.list_pending_for_approver(approver_id).await.map_err(map_repo)
    }

    /// Validates and activates a policy; every other policy in its company is
    /// deactivated in the same transaction.
    pub async fn activate_policy(
        &self,
        policy: ApprovalPolicy,
    ) -> Result<ApprovalPolicy, ApplicationError> {
        policy.validate()?;

        let activated = ApprovalPolicy { is_active: true, ..policy };
        self.repos.policies.set_active(activated.clone()).await.map_err(map_repo)?;

        info!(
            event_name = "policy.activated",
            policy_id = %activated.id.0,
            company_id = %activated.company_id.0,
            steps = activated.steps.len(),
            "approval policy activated"
        );
        self.audit.emit(
            AuditEvent::new(
                AuditContext::new(None, Uuid::new_v4().to_string(), "policy-store"),
                "policy.activated",
                AuditCategory::Policy,
                AuditOutcome::Success,
            )
            .with_metadata("policy_id", activated.id.0.clone())
            .with_metadata("steps", activated.steps.len().to_string()),
        );

        Ok(activated)
    }

    pub async fn deactivate_policy(
        &self,
        policy_id: &PolicyId,
    ) -> Result<ApprovalPolicy, ApplicationError> {
        let policy = self
            .repos
            .policies
            .find_by_id(policy_id)
            .await
            .map_err(map_repo)?
            .ok_or(ApplicationError::NotFound { entity: "policy" })?;

        let deactivated = ApprovalPolicy { is_active: false, ..policy };
        self.repos.policies.save(deactivated.clone()).await.map_err(map_repo)?;

        info!(
            event_name = "policy.deactivated",
            policy_id = %deactivated.id.0,
            "approval policy deactivated"
        );
        Ok(deactivated)
    }

    pub async fn active_policy(
        &self,
        company_id: &CompanyId,
    ) -> Result<Option<ApprovalPolicy>, ApplicationError> {
        self.repos.policies.find_active(company_id).await.map_err(map_repo)
    }

    pub async fn list_policies(
        &self,
        company_id: &CompanyId,
    ) -> Result<Vec<ApprovalPolicy>, ApplicationError> {
        self.repos.policies.list_for_company(company_id).await.map_err(map_repo)
    }

    pub async fn delete_policy(&self, policy_id: &PolicyId) -> Result<(), ApplicationError> {
        self.repos
            .policies
            .find_by_id(policy_id)
            .await
            .map_err(map_repo)?
            .ok_or(ApplicationError::NotFound { entity: "policy" })?;
        self.repos.policies.delete(policy_id).await.map_err(map_repo)?;

        info!(event_name = "policy.deleted", policy_id = %policy_id.0, "approval policy deleted");
        Ok(())
    }
}

fn map_repo(error: RepositoryError) -> ApplicationError {
    match error {
        RepositoryError::Conflict(message) => ApplicationError::Conflict(message),
        other => ApplicationError::Persistence(other.to_string()),
    }
}
