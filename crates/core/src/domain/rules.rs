use std::collections::BTreeSet;

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::domain::user::Role;

#[derive(Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct RuleSetId(pub String);

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct ApprovalStep {
    pub step: u32,
    pub approver_role: Role,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct ApprovalRuleSet {
    pub id: RuleSetId,
    pub name: String,
    pub min_percent_to_approve: u8,
    pub steps: Vec<ApprovalStep>,
}

#[derive(Clone, Debug, Error, PartialEq, Eq)]
pub enum RuleSetError {
    #[error("rule set `{rule_set}` has no approval steps")]
    EmptySteps { rule_set: String },
    #[error("rule set `{rule_set}` declares step {step} more than once")]
    DuplicateStep { rule_set: String, step: u32 },
    #[error("rule set `{rule_set}` steps must run 1..={expected_last} without gaps, found {found:?}")]
    NonContiguousSteps { rule_set: String, expected_last: u32, found: Vec<u32> },
    #[error("rule set `{rule_set}` min_percent_to_approve must be within 0..=100, got {value}")]
    ThresholdOutOfRange { rule_set: String, value: u8 },
    #[error("rule set `{rule_set}` has no step {step}")]
    StepNotFound { rule_set: String, step: u32 },
}

impl ApprovalRuleSet {
    pub fn validate(&self) -> Result<(), RuleSetError> {
        if self.steps.is_empty() {
            return Err(RuleSetError::EmptySteps { rule_set: self.name.clone() });
        }

        if self.min_percent_to_approve > 100 {
            return Err(RuleSetError::ThresholdOutOfRange {
                rule_set: self.name.clone(),
                value: self.min_percent_to_approve,
            });
        }

        let mut seen = BTreeSet::new();
        for step in &self.steps {
            if !seen.insert(step.step) {
                return Err(RuleSetError::DuplicateStep {
                    rule_set: self.name.clone(),
                    step: step.step,
                });
            }
        }

        let expected_last = u32::try_from(self.steps.len()).unwrap_or(u32::MAX);
        let contiguous = seen.iter().copied().eq(1..=expected_last);
        if !contiguous {
            return Err(RuleSetError::NonContiguousSteps {
                rule_set: self.name.clone(),
                expected_last,
                found: seen.into_iter().collect(),
            });
        }

        Ok(())
    }

    pub fn step_for(&self, index: u32) -> Result<&ApprovalStep, RuleSetError> {
        self.steps.iter().find(|step| step.step == index).ok_or_else(|| {
            RuleSetError::StepNotFound { rule_set: self.name.clone(), step: index }
        })
    }

    pub fn last_step(&self) -> u32 {
        self.steps.iter().map(|step| step.step).max().unwrap_or(0)
    }

    pub fn is_last_step(&self, index: u32) -> bool {
        index == self.last_step()
    }

    pub fn steps_in_order(&self) -> Vec<ApprovalStep> {
        let mut steps = self.steps.clone();
        steps.sort_by_key(|step| step.step);
        steps
    }
}

#[cfg(test)]
mod tests {
    use super::{ApprovalRuleSet, ApprovalStep, RuleSetError, RuleSetId};
    use crate::domain::user::Role;

    fn rule_set(steps: &[(u32, Role)], threshold: u8) -> ApprovalRuleSet {
        ApprovalRuleSet {
            id: RuleSetId("1".to_owned()),
            name: "Default Misc Expenses".to_owned(),
            min_percent_to_approve: threshold,
            steps: steps
                .iter()
                .map(|(step, approver_role)| ApprovalStep { step: *step, approver_role: *approver_role })
                .collect(),
        }
    }

    #[test]
    fn accepts_contiguous_steps_declared_out_of_order() {
        let rules = rule_set(&[(2, Role::Admin), (1, Role::Manager)], 50);
        rules.validate().expect("valid rule set");
        assert_eq!(rules.last_step(), 2);
        assert_eq!(rules.steps_in_order()[0].approver_role, Role::Manager);
        assert_eq!(rules.step_for(2).expect("step 2").approver_role, Role::Admin);
    }

    #[test]
    fn rejects_empty_step_list() {
        let error = rule_set(&[], 50).validate().expect_err("empty steps");
        assert!(matches!(error, RuleSetError::EmptySteps { .. }));
    }

    #[test]
    fn rejects_duplicate_step_indices() {
        let error = rule_set(&[(1, Role::Manager), (1, Role::Admin)], 50)
            .validate()
            .expect_err("duplicate step");
        assert!(matches!(error, RuleSetError::DuplicateStep { step: 1, .. }));
    }

    #[test]
    fn rejects_gaps_and_sequences_not_starting_at_one() {
        let gap = rule_set(&[(1, Role::Manager), (3, Role::Admin)], 50)
            .validate()
            .expect_err("gap in steps");
        assert!(matches!(gap, RuleSetError::NonContiguousSteps { expected_last: 2, .. }));

        let zero_based =
            rule_set(&[(0, Role::Manager)], 50).validate().expect_err("steps are 1-based");
        assert!(matches!(zero_based, RuleSetError::NonContiguousSteps { .. }));
    }

    #[test]
    fn rejects_threshold_above_one_hundred() {
        let error = rule_set(&[(1, Role::Manager)], 101).validate().expect_err("threshold");
        assert_eq!(
            error,
            RuleSetError::ThresholdOutOfRange {
                rule_set: "Default Misc Expenses".to_owned(),
                value: 101
            }
        );
    }

    #[test]
    fn step_lookup_reports_missing_index() {
        let rules = rule_set(&[(1, Role::Manager)], 100);
        let error = rules.step_for(2).expect_err("no step 2");
        assert!(matches!(error, RuleSetError::StepNotFound { step: 2, .. }));
    }
}
