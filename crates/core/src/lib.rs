pub mod audit;
pub mod config;
pub mod domain;
pub mod errors;
pub mod workflow;

pub use audit::{
    AuditCategory, AuditContext, AuditEvent, AuditOutcome, AuditSink, InMemoryAuditSink,
};
pub use config::{AppConfig, ConfigError, ConfigOverrides, LoadOptions, LogFormat};
pub use domain::approval::{ApprovalDecision, ApprovalRecord, ApprovalRecordId, ApprovalStatus};
pub use domain::employee::{CompanyId, Employee, EmployeeId, Role};
pub use domain::expense::{Expense, ExpenseCategory, ExpenseId, ExpenseStatus, PaidBy};
pub use domain::policy::{
    ApprovalMode, ApprovalPolicy, PolicyId, PolicyValidationError, StepRule,
};
pub use errors::{ApplicationError, DomainError, InterfaceError};
pub use workflow::{
    evaluate_step, DecisionOutcome, StepEvaluation, SubmissionOutcome, WorkflowEngine,
    WorkflowError,
};
