use std::collections::HashMap;

use tokio::sync::RwLock;

use expenseflow_core::domain::approval::{ApprovalRecord, ApprovalRecordId};
use expenseflow_core::domain::employee::{CompanyId, Employee, EmployeeId};
use expenseflow_core::domain::expense::{Expense, ExpenseId};
use expenseflow_core::domain::policy::{ApprovalPolicy, PolicyId};

use super::{
    ApprovalLedgerRepository, EmployeeRepository, ExpenseRepository, PolicyRepository,
    RepositoryError,
};

#[derive(Default)]
pub struct InMemoryExpenseRepository {
    expenses: RwLock<HashMap<String, Expense>>,
}

#[async_trait::async_trait]
impl ExpenseRepository for InMemoryExpenseRepository {
    async fn find_by_id(&self, id: &ExpenseId) -> Result<Option<Expense>, RepositoryError> {
        let expenses = self.expenses.read().await;
        Ok(expenses.get(&id.0).cloned())
    }

    async fn find_owned(
        &self,
        id: &ExpenseId,
        employee_id: &EmployeeId,
    ) -> Result<Option<Expense>, RepositoryError> {
        let expenses = self.expenses.read().await;
        Ok(expenses.get(&id.0).filter(|expense| expense.employee_id == *employee_id).cloned())
    }

    async fn list_for_employee(
        &self,
        employee_id: &EmployeeId,
    ) -> Result<Vec<Expense>, RepositoryError> {
        let expenses = self.expenses.read().await;
        let mut listed: Vec<Expense> = expenses
            .values()
            .filter(|expense| expense.employee_id == *employee_id)
            .cloned()
            .collect();
        listed.sort_by(|a, b| b.created_at.cmp(&a.created_at));
        Ok(listed)
    }

    async fn save(&self, expense: Expense) -> Result<(), RepositoryError> {
        let mut expenses = self.expenses.write().await;
        expenses.insert(expense.id.0.clone(), expense);
        Ok(())
    }
}

#[derive(Default)]
pub struct InMemoryApprovalLedgerRepository {
    records: RwLock<Vec<ApprovalRecord>>,
}

#[async_trait::async_trait]
impl ApprovalLedgerRepository for InMemoryApprovalLedgerRepository {
    async fn find_by_id(
        &self,
        id: &ApprovalRecordId,
    ) -> Result<Option<ApprovalRecord>, RepositoryError> {
        let records = self.records.read().await;
        Ok(records.iter().find(|record| record.id == *id).cloned())
    }

    async fn seed_step(&self, seeded: &[ApprovalRecord]) -> Result<(), RepositoryError> {
        let mut records = self.records.write().await;
        records.extend_from_slice(seeded);
        Ok(())
    }

    async fn record_decision(&self, decided: &ApprovalRecord) -> Result<(), RepositoryError> {
        let mut records = self.records.write().await;
        let Some(existing) = records.iter_mut().find(|record| record.id == decided.id) else {
            return Err(RepositoryError::Conflict(format!(
                "approval record `{}` does not exist",
                decided.id.0
            )));
        };

        if !existing.is_pending() {
            return Err(RepositoryError::Conflict(format!(
                "approval record `{}` is no longer pending",
                decided.id.0
            )));
        }

        *existing = decided.clone();
        Ok(())
    }

    async fn list_for_step(
        &self,
        expense_id: &ExpenseId,
        step: u32,
    ) -> Result<Vec<ApprovalRecord>, RepositoryError> {
        let records = self.records.read().await;
        Ok(records
            .iter()
            .filter(|record| record.expense_id == *expense_id && record.step == step)
            .cloned()
            .collect())
    }

    async fn list_for_expense(
        &self,
        expense_id: &ExpenseId,
    ) -> Result<Vec<ApprovalRecord>, RepositoryError> {
        let records = self.records.read().await;
        let mut listed: Vec<ApprovalRecord> =
            records.iter().filter(|record| record.expense_id == *expense_id).cloned().collect();
        listed.sort_by_key(|record| record.step);
        Ok(listed)
    }

    async fn list_pending_for_approver(
        &self,
        approver_id: &EmployeeId,
    ) -> Result<Vec<ApprovalRecord>, RepositoryError> {
        let records = self.records.read().await;
        Ok(records
            .iter()
            .filter(|record| record.approver_id == *approver_id && record.is_pending())
            .cloned()
            .collect())
    }
}

#[derive(Default)]
pub struct InMemoryPolicyRepository {
    policies: RwLock<HashMap<String, ApprovalPolicy>>,
}

#[async_trait::async_trait]
impl PolicyRepository for InMemoryPolicyRepository {
    async fn find_by_id(&self, id: &PolicyId) -> Result<Option<ApprovalPolicy>, RepositoryError> {
        let policies = self.policies.read().await;
        Ok(policies.get(&id.0).cloned())
    }

    async fn find_active(
        &self,
        company_id: &CompanyId,
    ) -> Result<Option<ApprovalPolicy>, RepositoryError> {
        let policies = self.policies.read().await;
        Ok(policies
            .values()
            .find(|policy| policy.company_id == *company_id && policy.is_active)
            .cloned())
    }

    async fn list_for_company(
        &self,
        company_id: &CompanyId,
    ) -> Result<Vec<ApprovalPolicy>, RepositoryError> {
        let policies = self.policies.read().await;
        let mut listed: Vec<ApprovalPolicy> =
            policies.values().filter(|policy| policy.company_id == *company_id).cloned().collect();
        listed.sort_by(|a, b| b.created_at.cmp(&a.created_at));
        Ok(listed)
    }

    async fn save(&self, policy: ApprovalPolicy) -> Result<(), RepositoryError> {
        let mut policies = self.policies.write().await;
        policies.insert(policy.id.0.clone(), policy);
        Ok(())
    }

    async fn set_active(&self, policy: ApprovalPolicy) -> Result<(), RepositoryError> {
        let mut policies = self.policies.write().await;
        for existing in policies.values_mut() {
            if existing.company_id == policy.company_id {
                existing.is_active = false;
            }
        }
        let activated = ApprovalPolicy { is_active: true, ..policy };
        policies.insert(activated.id.0.clone(), activated);
        Ok(())
    }

    async fn delete(&self, id: &PolicyId) -> Result<(), RepositoryError> {
        let mut policies = self.policies.write().await;
        policies.remove(&id.0);
        Ok(())
    }
}

#[derive(Default)]
pub struct InMemoryEmployeeRepository {
    employees: RwLock<HashMap<String, Employee>>,
}

#[async_trait::async_trait]
impl EmployeeRepository for InMemoryEmployeeRepository {
    async fn find_by_id(&self, id: &EmployeeId) -> Result<Option<Employee>, RepositoryError> {
        let employees = self.employees.read().await;
        Ok(employees.get(&id.0).cloned())
    }

    async fn save(&self, employee: Employee) -> Result<(), RepositoryError> {
        let mut employees = self.employees.write().await;
        employees.insert(employee.id.0.clone(), employee);
        Ok(())
    }
}
