use serde::{Deserialize, Serialize};

use crate::domain::approval::{ApprovalRecord, ApprovalStatus};
use crate::domain::employee::EmployeeId;
use crate::domain::policy::{ApprovalMode, StepRule};

/// The outcome of judging one step against its full ledger record set.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct StepEvaluation {
    pub complete: bool,
    pub approved: usize,
    pub total: usize,
}

/// Decides whether a step is satisfied, given the complete set of ledger
/// records for that step and the rule it was seeded from.
///
/// Only `Approved` records count toward completion; a `Rejected` decision
/// terminates the whole expense before this predicate is ever consulted, so
/// rejected entries never need special treatment here. An absent rule means
/// the step was seeded outside any policy (the manager fallback) and is
/// judged as `All`.
pub fn evaluate_step(records: &[ApprovalRecord], rule: Option<&StepRule>) -> StepEvaluation {
    let approved = records.iter().filter(|record| record.status == ApprovalStatus::Approved).count();
    let total = records.len();

    let complete = match rule.map(|rule| &rule.mode) {
        None | Some(ApprovalMode::All) => all_approved(records),
        Some(ApprovalMode::Percentage { required_percentage }) => {
            meets_percentage(approved, total, *required_percentage)
        }
        Some(ApprovalMode::Specific { approvers }) => {
            // An empty designated set degrades to the `All` condition rather
            // than making the step unsatisfiable.
            if approvers.is_empty() {
                all_approved(records)
            } else {
                has_designated_approval(records, approvers)
            }
        }
        Some(ApprovalMode::Hybrid { required_percentage, approvers }) => {
            has_designated_approval(records, approvers)
                || meets_percentage(approved, total, *required_percentage)
        }
    };

    StepEvaluation { complete, approved, total }
}

fn all_approved(records: &[ApprovalRecord]) -> bool {
    records.iter().all(|record| record.status == ApprovalStatus::Approved)
}

fn has_designated_approval(records: &[ApprovalRecord], designated: &[EmployeeId]) -> bool {
    records.iter().any(|record| {
        record.status == ApprovalStatus::Approved && designated.contains(&record.approver_id)
    })
}

// Integer form of approved/total*100 >= required, safe against the empty set.
fn meets_percentage(approved: usize, total: usize, required_percentage: u8) -> bool {
    total > 0 && approved * 100 >= usize::from(required_percentage) * total
}

#[cfg(test)]
mod tests {
    use chrono::Utc;

    use crate::domain::approval::{ApprovalRecord, ApprovalStatus};
    use crate::domain::employee::EmployeeId;
    use crate::domain::expense::ExpenseId;
    use crate::domain::policy::{ApprovalMode, StepRule};

    use super::evaluate_step;

    fn record(approver: &str, status: ApprovalStatus) -> ApprovalRecord {
        let mut record = ApprovalRecord::pending(
            ExpenseId("E-1".to_string()),
            EmployeeId(approver.to_string()),
            1,
            Utc::now(),
        );
        record.status = status;
        record
    }

    fn rule(mode: ApprovalMode, approvers: &[&str]) -> StepRule {
        StepRule {
            step_number: 1,
            approvers: approvers.iter().map(|id| EmployeeId(id.to_string())).collect(),
            mode,
        }
    }

    #[test]
    fn all_mode_requires_every_record_approved() {
        let rule = rule(ApprovalMode::All, &["m1", "m2"]);
        let partial = [
            record("m1", ApprovalStatus::Approved),
            record("m2", ApprovalStatus::Pending),
        ];
        assert!(!evaluate_step(&partial, Some(&rule)).complete);

        let full = [
            record("m1", ApprovalStatus::Approved),
            record("m2", ApprovalStatus::Approved),
        ];
        let evaluation = evaluate_step(&full, Some(&rule));
        assert!(evaluation.complete);
        assert_eq!((evaluation.approved, evaluation.total), (2, 2));
    }

    #[test]
    fn absent_rule_defaults_to_all() {
        let records = [record("m1", ApprovalStatus::Approved)];
        assert!(evaluate_step(&records, None).complete);

        let pending = [record("m1", ApprovalStatus::Pending)];
        assert!(!evaluate_step(&pending, None).complete);
    }

    #[test]
    fn percentage_mode_triggers_exactly_at_threshold() {
        let rule = rule(ApprovalMode::Percentage { required_percentage: 60 }, &["m1", "m2", "m3"]);

        // 1 of 3 approved: 33% < 60%.
        let one = [
            record("m1", ApprovalStatus::Approved),
            record("m2", ApprovalStatus::Pending),
            record("m3", ApprovalStatus::Pending),
        ];
        assert!(!evaluate_step(&one, Some(&rule)).complete);

        // 2 of 3 approved: 67% >= 60%.
        let two = [
            record("m1", ApprovalStatus::Approved),
            record("m2", ApprovalStatus::Approved),
            record("m3", ApprovalStatus::Pending),
        ];
        assert!(evaluate_step(&two, Some(&rule)).complete);
    }

    #[test]
    fn percentage_boundary_is_inclusive() {
        let rule = rule(ApprovalMode::Percentage { required_percentage: 50 }, &["m1", "m2"]);
        let records = [
            record("m1", ApprovalStatus::Approved),
            record("m2", ApprovalStatus::Pending),
        ];
        // Exactly 50% meets a 50% threshold.
        assert!(evaluate_step(&records, Some(&rule)).complete);
    }

    #[test]
    fn specific_mode_completes_on_any_designated_approval() {
        let rule = rule(
            ApprovalMode::Specific { approvers: vec![EmployeeId("m2".to_string())] },
            &["m1", "m2", "m3"],
        );

        let undesignated = [
            record("m1", ApprovalStatus::Approved),
            record("m2", ApprovalStatus::Pending),
            record("m3", ApprovalStatus::Pending),
        ];
        assert!(!evaluate_step(&undesignated, Some(&rule)).complete);

        let designated = [
            record("m1", ApprovalStatus::Pending),
            record("m2", ApprovalStatus::Approved),
            record("m3", ApprovalStatus::Pending),
        ];
        assert!(evaluate_step(&designated, Some(&rule)).complete);
    }

    #[test]
    fn specific_mode_with_no_designees_degrades_to_all() {
        let rule = rule(ApprovalMode::Specific { approvers: Vec::new() }, &["m1", "m2"]);
        let partial = [
            record("m1", ApprovalStatus::Approved),
            record("m2", ApprovalStatus::Pending),
        ];
        assert!(!evaluate_step(&partial, Some(&rule)).complete);
    }

    #[test]
    fn hybrid_mode_completes_on_whichever_condition_fires_first() {
        let rule = rule(
            ApprovalMode::Hybrid {
                required_percentage: 60,
                approvers: vec![EmployeeId("m3".to_string())],
            },
            &["m1", "m2", "m3"],
        );

        // Specific arm: one designated approval is enough at 33%.
        let specific = [
            record("m1", ApprovalStatus::Pending),
            record("m2", ApprovalStatus::Pending),
            record("m3", ApprovalStatus::Approved),
        ];
        assert!(evaluate_step(&specific, Some(&rule)).complete);

        // Percentage arm: two undesignated approvals reach 67%.
        let percentage = [
            record("m1", ApprovalStatus::Approved),
            record("m2", ApprovalStatus::Approved),
            record("m3", ApprovalStatus::Pending),
        ];
        assert!(evaluate_step(&percentage, Some(&rule)).complete);

        // Neither arm: a single undesignated approval.
        let neither = [
            record("m1", ApprovalStatus::Approved),
            record("m2", ApprovalStatus::Pending),
            record("m3", ApprovalStatus::Pending),
        ];
        assert!(!evaluate_step(&neither, Some(&rule)).complete);
    }

    #[test]
    fn empty_record_set_is_vacuously_complete_under_all_but_not_percentage() {
        let all = rule(ApprovalMode::All, &[]);
        assert!(evaluate_step(&[], Some(&all)).complete);

        let percentage = rule(ApprovalMode::Percentage { required_percentage: 50 }, &[]);
        assert!(!evaluate_step(&[], Some(&percentage)).complete);
    }
}
