use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::domain::employee::{CompanyId, EmployeeId};

#[derive(Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct PolicyId(pub String);

/// How a step is judged complete over its full ledger record set.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum ApprovalMode {
    /// Every approver at the step must approve.
    All,
    /// Approvals from at least `required_percentage` percent of the step's
    /// records satisfy the step.
    Percentage { required_percentage: u8 },
    /// A single approval from any of the designated approvers satisfies the
    /// step, regardless of remaining pending votes.
    Specific { approvers: Vec<EmployeeId> },
    /// Whichever of the specific or percentage conditions is met first.
    Hybrid { required_percentage: u8, approvers: Vec<EmployeeId> },
}

impl ApprovalMode {
    pub fn kind_str(&self) -> &'static str {
        match self {
            Self::All => "all",
            Self::Percentage { .. } => "percentage",
            Self::Specific { .. } => "specific",
            Self::Hybrid { .. } => "hybrid",
        }
    }
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct StepRule {
    pub step_number: u32,
    pub approvers: Vec<EmployeeId>,
    pub mode: ApprovalMode,
}

impl StepRule {
    /// The approvers whose lone approval can satisfy the step, when the mode
    /// designates any.
    pub fn designated_approvers(&self) -> &[EmployeeId] {
        match &self.mode {
            ApprovalMode::Specific { approvers } | ApprovalMode::Hybrid { approvers, .. } => {
                approvers
            }
            ApprovalMode::All | ApprovalMode::Percentage { .. } => &[],
        }
    }
}

/// The ordered step template an organization's expenses are approved
/// against. At most one policy per company is active at a time; the policy
/// store enforces that invariant transactionally on activation.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct ApprovalPolicy {
    pub id: PolicyId,
    pub company_id: CompanyId,
    pub name: String,
    pub steps: Vec<StepRule>,
    pub is_active: bool,
    pub created_at: DateTime<Utc>,
}

#[derive(Clone, Debug, Error, PartialEq, Eq)]
pub enum PolicyValidationError {
    #[error("policy `{name}` has no steps")]
    EmptySteps { name: String },
    #[error("policy steps must be numbered 1..N without gaps: expected step {expected}, found {found}")]
    NonSequentialSteps { expected: u32, found: u32 },
    #[error("step {step} requires {required_percentage}%, which exceeds 100%")]
    PercentageOutOfRange { step: u32, required_percentage: u8 },
    #[error("step {step} uses a specific/hybrid mode but designates no approvers")]
    NoDesignatedApprovers { step: u32 },
    #[error("step {step} designates approver `{approver}` who is not in the step's approver set")]
    DesignatedApproverNotInStep { step: u32, approver: String },
}

impl ApprovalPolicy {
    pub fn step_rule(&self, step_number: u32) -> Option<&StepRule> {
        self.steps.iter().find(|rule| rule.step_number == step_number)
    }

    pub fn has_steps(&self) -> bool {
        !self.steps.is_empty()
    }

    /// Rejects malformed configurations before they reach the policy store.
    /// Step numbers must be contiguous and 1-based so that the engine's
    /// `current + 1` advancement can never skip a configured rule.
    pub fn validate(&self) -> Result<(), PolicyValidationError> {
        if self.steps.is_empty() {
            return Err(PolicyValidationError::EmptySteps { name: self.name.clone() });
        }

        let mut numbers: Vec<u32> = self.steps.iter().map(|rule| rule.step_number).collect();
        numbers.sort_unstable();
        for (index, found) in numbers.iter().enumerate() {
            let expected = index as u32 + 1;
            if *found != expected {
                return Err(PolicyValidationError::NonSequentialSteps { expected, found: *found });
            }
        }

        for rule in &self.steps {
            let required_percentage = match rule.mode {
                ApprovalMode::Percentage { required_percentage }
                | ApprovalMode::Hybrid { required_percentage, .. } => Some(required_percentage),
                ApprovalMode::All | ApprovalMode::Specific { .. } => None,
            };
            if let Some(required_percentage) = required_percentage {
                if required_percentage > 100 {
                    return Err(PolicyValidationError::PercentageOutOfRange {
                        step: rule.step_number,
                        required_percentage,
                    });
                }
            }

            match &rule.mode {
                ApprovalMode::Specific { approvers } | ApprovalMode::Hybrid { approvers, .. } => {
                    if approvers.is_empty() {
                        return Err(PolicyValidationError::NoDesignatedApprovers {
                            step: rule.step_number,
                        });
                    }
                    for approver in approvers {
                        if !rule.approvers.contains(approver) {
                            return Err(PolicyValidationError::DesignatedApproverNotInStep {
                                step: rule.step_number,
                                approver: approver.0.clone(),
                            });
                        }
                    }
                }
                ApprovalMode::All | ApprovalMode::Percentage { .. } => {}
            }
        }

        Ok(())
    }
}
