use chrono::{DateTime, NaiveDate, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use crate::domain::employee::{CompanyId, EmployeeId};
use crate::errors::DomainError;

#[derive(Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ExpenseId(pub String);

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ExpenseStatus {
    Draft,
    WaitingApproval,
    Approved,
    Rejected,
}

impl ExpenseStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Draft => "draft",
            Self::WaitingApproval => "waiting_approval",
            Self::Approved => "approved",
            Self::Rejected => "rejected",
        }
    }

    pub fn parse(value: &str) -> Option<Self> {
        match value.trim().to_ascii_lowercase().as_str() {
            "draft" => Some(Self::Draft),
            "waiting_approval" => Some(Self::WaitingApproval),
            "approved" => Some(Self::Approved),
            "rejected" => Some(Self::Rejected),
            _ => None,
        }
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ExpenseCategory {
    Travel,
    Food,
    OfficeSupplies,
    Software,
    Hardware,
    Marketing,
    Other,
}

impl ExpenseCategory {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Travel => "travel",
            Self::Food => "food",
            Self::OfficeSupplies => "office_supplies",
            Self::Software => "software",
            Self::Hardware => "hardware",
            Self::Marketing => "marketing",
            Self::Other => "other",
        }
    }

    pub fn parse(value: &str) -> Option<Self> {
        match value.trim().to_ascii_lowercase().as_str() {
            "travel" => Some(Self::Travel),
            "food" => Some(Self::Food),
            "office_supplies" => Some(Self::OfficeSupplies),
            "software" => Some(Self::Software),
            "hardware" => Some(Self::Hardware),
            "marketing" => Some(Self::Marketing),
            "other" => Some(Self::Other),
            _ => None,
        }
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PaidBy {
    Company,
    Personal,
}

impl PaidBy {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Company => "company",
            Self::Personal => "personal",
        }
    }

    pub fn parse(value: &str) -> Option<Self> {
        match value.trim().to_ascii_lowercase().as_str() {
            "company" => Some(Self::Company),
            "personal" => Some(Self::Personal),
            _ => None,
        }
    }
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Expense {
    pub id: ExpenseId,
    pub employee_id: EmployeeId,
    pub company_id: CompanyId,
    pub description: String,
    pub category: ExpenseCategory,
    pub expense_date: NaiveDate,
    pub amount: Decimal,
    pub currency: String,
    pub amount_in_base_currency: Decimal,
    pub paid_by: PaidBy,
    pub remarks: String,
    pub receipt_url: Option<String>,
    pub status: ExpenseStatus,
    /// 0 while `Draft` (and when an expense auto-approves without any
    /// approver); otherwise the step whose ledger records are active.
    /// Retains the last active step once the expense is terminal.
    pub current_approval_step: u32,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Expense {
    pub fn is_terminal(&self) -> bool {
        matches!(self.status, ExpenseStatus::Approved | ExpenseStatus::Rejected)
    }

    pub fn can_transition_to(&self, next: &ExpenseStatus) -> bool {
        matches!(
            (&self.status, next),
            (ExpenseStatus::Draft, ExpenseStatus::WaitingApproval)
                | (ExpenseStatus::WaitingApproval, ExpenseStatus::Approved)
                | (ExpenseStatus::WaitingApproval, ExpenseStatus::Rejected)
        )
    }

    /// Status mutation is reserved for the workflow engine; everything else
    /// goes through the draft-edit path while the expense is still `Draft`.
    pub fn transition_to(&mut self, next: ExpenseStatus) -> Result<(), DomainError> {
        if self.can_transition_to(&next) {
            self.status = next;
            return Ok(());
        }

        Err(DomainError::InvalidExpenseTransition { from: self.status.clone(), to: next })
    }
}
