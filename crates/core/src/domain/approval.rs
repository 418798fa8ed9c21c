use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::domain::employee::EmployeeId;
use crate::domain::expense::ExpenseId;

#[derive(Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ApprovalRecordId(pub String);

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ApprovalStatus {
    Pending,
    Approved,
    Rejected,
}

impl ApprovalStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Pending => "pending",
            Self::Approved => "approved",
            Self::Rejected => "rejected",
        }
    }

    pub fn parse(value: &str) -> Option<Self> {
        match value.trim().to_ascii_lowercase().as_str() {
            "pending" => Some(Self::Pending),
            "approved" => Some(Self::Approved),
            "rejected" => Some(Self::Rejected),
            _ => None,
        }
    }
}

/// What an approver may submit. `Pending` is not a decision, so this is a
/// separate two-variant type rather than a reuse of [`ApprovalStatus`].
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum ApprovalDecision {
    Approved,
    Rejected,
}

impl From<ApprovalDecision> for ApprovalStatus {
    fn from(decision: ApprovalDecision) -> Self {
        match decision {
            ApprovalDecision::Approved => Self::Approved,
            ApprovalDecision::Rejected => Self::Rejected,
        }
    }
}

/// One approver's durable vote at one step of one expense. Seeded `Pending`
/// by the workflow engine, decided at most once, never deleted.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct ApprovalRecord {
    pub id: ApprovalRecordId,
    pub expense_id: ExpenseId,
    pub approver_id: EmployeeId,
    pub step: u32,
    pub status: ApprovalStatus,
    pub comments: String,
    pub decided_at: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
}

impl ApprovalRecord {
    pub fn pending(
        expense_id: ExpenseId,
        approver_id: EmployeeId,
        step: u32,
        now: DateTime<Utc>,
    ) -> Self {
        Self {
            id: ApprovalRecordId(Uuid::new_v4().to_string()),
            expense_id,
            approver_id,
            step,
            status: ApprovalStatus::Pending,
            comments: String::new(),
            decided_at: None,
            created_at: now,
        }
    }

    pub fn is_pending(&self) -> bool {
        self.status == ApprovalStatus::Pending
    }
}
