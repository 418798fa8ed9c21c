//! Pure approval-workflow transitions.
//!
//! The engine takes the entities a transition touches, returns the updated
//! entities plus any newly seeded ledger records, and leaves persistence to
//! the caller. Both transitions must be applied atomically by that caller,
//! serialized per expense.

use chrono::{DateTime, Utc};
use thiserror::Error;

use crate::domain::approval::{ApprovalDecision, ApprovalRecord, ApprovalRecordId, ApprovalStatus};
use crate::domain::employee::EmployeeId;
use crate::domain::expense::{Expense, ExpenseId, ExpenseStatus};
use crate::domain::policy::ApprovalPolicy;
use crate::errors::DomainError;
use crate::workflow::evaluate::evaluate_step;

#[derive(Clone, Debug, Error, PartialEq, Eq)]
pub enum WorkflowError {
    #[error("no pending approval record for the acting approver")]
    ApprovalNotFound,
    #[error("expense is {status:?}; the operation requires {required:?}")]
    InvalidExpenseState { status: ExpenseStatus, required: ExpenseStatus },
    #[error("approval record {id:?} was already decided as {status:?}")]
    AlreadyDecided { id: ApprovalRecordId, status: ApprovalStatus },
    #[error("approval record targets step {record_step} but the expense is at step {current_step}")]
    StaleStep { record_step: u32, current_step: u32 },
    #[error(transparent)]
    Domain(#[from] DomainError),
}

/// Result of the `Draft -> WaitingApproval` transition.
#[derive(Clone, Debug, PartialEq)]
pub struct SubmissionOutcome {
    pub expense: Expense,
    pub seeded: Vec<ApprovalRecord>,
}

/// Result of applying one approver's decision.
#[derive(Clone, Debug, PartialEq)]
pub struct DecisionOutcome {
    pub record: ApprovalRecord,
    pub expense: Expense,
    pub seeded: Vec<ApprovalRecord>,
    pub step_complete: bool,
}

#[derive(Clone, Copy, Debug, Default)]
pub struct WorkflowEngine;

impl WorkflowEngine {
    pub fn new() -> Self {
        Self
    }

    /// `Draft -> WaitingApproval`, seeding step 1 of the active policy.
    ///
    /// Without a policy (or with a stepless one) the employee's direct
    /// manager becomes a single-step approver; without a manager either, the
    /// expense auto-approves on the spot with zero records and step 0. A
    /// policy whose first step designates nobody auto-approves the same way
    /// rather than parking the expense with nothing pending.
    pub fn submit(
        &self,
        mut expense: Expense,
        policy: Option<&ApprovalPolicy>,
        manager: Option<&EmployeeId>,
        now: DateTime<Utc>,
    ) -> Result<SubmissionOutcome, WorkflowError> {
        if expense.status != ExpenseStatus::Draft {
            return Err(WorkflowError::InvalidExpenseState {
                status: expense.status.clone(),
                required: ExpenseStatus::Draft,
            });
        }

        expense.transition_to(ExpenseStatus::WaitingApproval)?;
        expense.updated_at = now;

        let mut seeded = Vec::new();
        match policy.filter(|policy| policy.has_steps()) {
            Some(policy) => {
                let first = policy.step_rule(1).filter(|rule| !rule.approvers.is_empty());
                match first {
                    Some(rule) => {
                        seeded = seed_step(&expense.id, 1, &rule.approvers, now);
                        expense.current_approval_step = 1;
                    }
                    None => {
                        expense.transition_to(ExpenseStatus::Approved)?;
                    }
                }
            }
            None => match manager {
                Some(manager_id) => {
                    seeded = seed_step(&expense.id, 1, std::slice::from_ref(manager_id), now);
                    expense.current_approval_step = 1;
                }
                None => {
                    expense.transition_to(ExpenseStatus::Approved)?;
                }
            },
        }

        Ok(SubmissionOutcome { expense, seeded })
    }

    /// Applies one approver's decision to the current step.
    ///
    /// `step_records` must be the full ledger record set for the expense's
    /// current step, including the (still pending) target record. A rejection
    /// finalizes the expense immediately, before completion is even
    /// evaluated; an approval re-evaluates the step and, when complete,
    /// either seeds the next step or finalizes the expense as approved.
    #[allow(clippy::too_many_arguments)]
    pub fn decide(
        &self,
        record: ApprovalRecord,
        acting_approver: &EmployeeId,
        decision: ApprovalDecision,
        comments: Option<String>,
        step_records: &[ApprovalRecord],
        mut expense: Expense,
        policy: Option<&ApprovalPolicy>,
        now: DateTime<Utc>,
    ) -> Result<DecisionOutcome, WorkflowError> {
        // Ownership failure is indistinguishable from absence on purpose.
        if record.approver_id != *acting_approver {
            return Err(WorkflowError::ApprovalNotFound);
        }
        if expense.status != ExpenseStatus::WaitingApproval {
            return Err(WorkflowError::InvalidExpenseState {
                status: expense.status.clone(),
                required: ExpenseStatus::WaitingApproval,
            });
        }
        if record.status != ApprovalStatus::Pending {
            return Err(WorkflowError::AlreadyDecided {
                id: record.id.clone(),
                status: record.status.clone(),
            });
        }
        if record.step != expense.current_approval_step {
            return Err(WorkflowError::StaleStep {
                record_step: record.step,
                current_step: expense.current_approval_step,
            });
        }

        let mut record = record;
        record.status = ApprovalStatus::from(decision);
        record.comments = comments.unwrap_or_default();
        record.decided_at = Some(now);
        expense.updated_at = now;

        // Reject-wins: any single rejection terminates the workflow, at any
        // step, regardless of other pending approvers or how close the step
        // was to its threshold.
        if decision == ApprovalDecision::Rejected {
            expense.transition_to(ExpenseStatus::Rejected)?;
            return Ok(DecisionOutcome { record, expense, seeded: Vec::new(), step_complete: false });
        }

        let mut current: Vec<ApprovalRecord> =
            step_records.iter().filter(|other| other.id != record.id).cloned().collect();
        current.push(record.clone());

        let rule = policy.and_then(|policy| policy.step_rule(record.step));
        let evaluation = evaluate_step(&current, rule);
        if !evaluation.complete {
            return Ok(DecisionOutcome { record, expense, seeded: Vec::new(), step_complete: false });
        }

        let next_step = record.step + 1;
        let next_rule = policy
            .and_then(|policy| policy.step_rule(next_step))
            .filter(|rule| !rule.approvers.is_empty());

        let seeded = match next_rule {
            Some(rule) => {
                let seeded = seed_step(&expense.id, next_step, &rule.approvers, now);
                expense.current_approval_step = next_step;
                seeded
            }
            None => {
                expense.transition_to(ExpenseStatus::Approved)?;
                Vec::new()
            }
        };

        Ok(DecisionOutcome { record, expense, seeded, step_complete: true })
    }
}

fn seed_step(
    expense_id: &ExpenseId,
    step: u32,
    approvers: &[EmployeeId],
    now: DateTime<Utc>,
) -> Vec<ApprovalRecord> {
    approvers
        .iter()
        .map(|approver| ApprovalRecord::pending(expense_id.clone(), approver.clone(), step, now))
        .collect()
}
