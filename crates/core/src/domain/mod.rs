pub mod approval;
pub mod employee;
pub mod expense;
pub mod policy;

pub use approval::{ApprovalDecision, ApprovalRecord, ApprovalRecordId, ApprovalStatus};
pub use employee::{CompanyId, Employee, EmployeeId, Role};
pub use expense::{Expense, ExpenseCategory, ExpenseId, ExpenseStatus, PaidBy};
pub use policy::{ApprovalMode, ApprovalPolicy, PolicyId, PolicyValidationError, StepRule};
