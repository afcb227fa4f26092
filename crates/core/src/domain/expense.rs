use std::fmt;

use chrono::{DateTime, NaiveDate, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use crate::domain::user::UserId;
use crate::errors::DomainError;

#[derive(Clone, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct ExpenseId(pub String);

impl fmt::Display for ExpenseId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ExpenseStatus {
    Draft,
    WaitingApproval,
    Approved,
    Rejected,
}

impl ExpenseStatus {
    pub fn is_terminal(self) -> bool {
        matches!(self, Self::Approved | Self::Rejected)
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Self::Draft => "DRAFT",
            Self::WaitingApproval => "WAITING_APPROVAL",
            Self::Approved => "APPROVED",
            Self::Rejected => "REJECTED",
        }
    }
}

impl fmt::Display for ExpenseStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl std::str::FromStr for ExpenseStatus {
    type Err = DomainError;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        match value.trim().to_ascii_uppercase().as_str() {
            "DRAFT" => Ok(Self::Draft),
            "WAITING_APPROVAL" => Ok(Self::WaitingApproval),
            "APPROVED" => Ok(Self::Approved),
            "REJECTED" => Ok(Self::Rejected),
            other => Err(DomainError::InvariantViolation(format!("unknown expense status `{other}`"))),
        }
    }
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Expense {
    pub id: ExpenseId,
    pub owner_id: UserId,
    pub description: String,
    pub category: String,
    pub currency: String,
    pub amount: Decimal,
    pub date: NaiveDate,
    pub status: ExpenseStatus,
    /// 1-based approval step awaiting decisions; only set while waiting for approval.
    pub current_step: Option<u32>,
    pub notes: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// Fields an owner supplies when drafting a claim.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct NewExpense {
    pub owner_id: UserId,
    pub description: String,
    pub category: String,
    pub currency: String,
    pub amount: Decimal,
    pub date: NaiveDate,
    pub notes: Option<String>,
}

impl NewExpense {
    pub fn validate(&self) -> Result<(), DomainError> {
        if self.amount < Decimal::ZERO {
            return Err(DomainError::InvariantViolation(format!(
                "expense amount must not be negative (got {})",
                self.amount
            )));
        }
        if self.currency.trim().is_empty() {
            return Err(DomainError::InvariantViolation("expense currency is required".to_owned()));
        }
        if self.description.trim().is_empty() {
            return Err(DomainError::InvariantViolation(
                "expense description is required".to_owned(),
            ));
        }
        Ok(())
    }

    pub fn into_draft(self, id: ExpenseId, now: DateTime<Utc>) -> Expense {
        Expense {
            id,
            owner_id: self.owner_id,
            description: self.description,
            category: self.category,
            currency: self.currency.trim().to_ascii_uppercase(),
            amount: self.amount,
            date: self.date,
            status: ExpenseStatus::Draft,
            current_step: None,
            notes: self.notes,
            created_at: now,
            updated_at: now,
        }
    }
}
