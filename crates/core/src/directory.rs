//! Approver directory: who may vote at a step, and which expenses a user can see.
//!
//! Everything here is a pure function over snapshots of the user and expense tables so
//! that both store implementations resolve eligibility identically.

use std::collections::{HashMap, HashSet};
use std::fmt;

use serde::{Deserialize, Serialize};

use crate::domain::expense::{Expense, ExpenseStatus};
use crate::domain::user::{Role, User, UserId};
use crate::errors::DomainError;

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EligibilityPolicy {
    /// Holders of the role on the owner's management chain, falling back to every
    /// holder of the role when the chain has none.
    #[default]
    ManagementChain,
    AllWithRole,
}

impl EligibilityPolicy {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::ManagementChain => "management_chain",
            Self::AllWithRole => "all_with_role",
        }
    }
}

impl fmt::Display for EligibilityPolicy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl std::str::FromStr for EligibilityPolicy {
    type Err = DomainError;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        match value.trim().to_ascii_lowercase().replace('-', "_").as_str() {
            "management_chain" => Ok(Self::ManagementChain),
            "all_with_role" => Ok(Self::AllWithRole),
            other => Err(DomainError::InvariantViolation(format!(
                "unknown eligibility policy `{other}` (expected management_chain|all_with_role)"
            ))),
        }
    }
}

/// Users entitled to cast a counted decision for `role` on an expense owned by
/// `owner_id`, sorted by id. The owner is never eligible.
pub fn eligible_approvers(
    users: &[User],
    role: Role,
    owner_id: &UserId,
    policy: EligibilityPolicy,
) -> Vec<UserId> {
    let holders_of_role = || {
        users.iter().filter(|user| user.role == role && &user.id != owner_id).map(|user| &user.id)
    };

    let mut eligible: Vec<UserId> = match policy {
        EligibilityPolicy::AllWithRole => holders_of_role().cloned().collect(),
        EligibilityPolicy::ManagementChain => {
            let by_id: HashMap<&UserId, &User> = users.iter().map(|user| (&user.id, user)).collect();
            let on_chain: Vec<UserId> = manager_chain(&by_id, owner_id)
                .into_iter()
                .filter(|manager_id| by_id.get(manager_id).is_some_and(|user| user.role == role))
                .filter(|manager_id| manager_id != owner_id)
                .collect();
            if on_chain.is_empty() {
                holders_of_role().cloned().collect()
            } else {
                on_chain
            }
        }
    };

    eligible.sort();
    eligible.dedup();
    eligible
}

/// Managers above `user_id`, nearest first. Stops at a missing link or a cycle.
pub fn manager_chain(by_id: &HashMap<&UserId, &User>, user_id: &UserId) -> Vec<UserId> {
    let mut chain = Vec::new();
    let mut visited = HashSet::new();
    let mut current = user_id.clone();

    loop {
        if !visited.insert(current.clone()) {
            break;
        }

        let Some(user) = by_id.get(&current) else {
            break;
        };
        let Some(manager_id) = &user.manager_id else {
            break;
        };
        if visited.contains(manager_id) {
            break;
        }

        chain.push(manager_id.clone());
        current = manager_id.clone();
    }

    chain
}

/// Expenses `viewer` may list: employees see their own, managers see their direct
/// reports' claims awaiting approval, admins see everything.
pub fn visible_expenses(viewer: &User, users: &[User], expenses: Vec<Expense>) -> Vec<Expense> {
    match viewer.role {
        Role::Admin => expenses,
        Role::Employee => {
            expenses.into_iter().filter(|expense| expense.owner_id == viewer.id).collect()
        }
        Role::Manager => {
            let reports: HashSet<&UserId> = users
                .iter()
                .filter(|user| user.manager_id.as_ref() == Some(&viewer.id))
                .map(|user| &user.id)
                .collect();
            expenses
                .into_iter()
                .filter(|expense| expense.status == ExpenseStatus::WaitingApproval)
                .filter(|expense| reports.contains(&expense.owner_id))
                .collect()
        }
    }
}
