use sqlx::sqlite::SqliteRow;

use reimburse_core::domain::approval::{Decision, DecisionEntry, DecisionId};
use reimburse_core::domain::expense::ExpenseId;
use reimburse_core::domain::user::{Role, UserId};

use super::{column, parse_enum, parse_timestamp, RepositoryError};
use crate::DbPool;

/// Append-only access to `approval_decision`. Rows are never updated or deleted.
pub struct SqlDecisionRepository {
    pool: DbPool,
}

impl SqlDecisionRepository {
    pub fn new(pool: DbPool) -> Self {
        Self { pool }
    }

    pub async fn append(&self, entry: &DecisionEntry) -> Result<(), RepositoryError> {
        insert(&self.pool, entry).await
    }

    pub async fn list_for_expense(
        &self,
        expense_id: &ExpenseId,
    ) -> Result<Vec<DecisionEntry>, RepositoryError> {
        let rows = sqlx::query(
            "SELECT id, expense_id, step_index, approver_id, approver_role, decision, comment, decided_at
             FROM approval_decision
             WHERE expense_id = ?
             ORDER BY seq",
        )
        .bind(&expense_id.0)
        .fetch_all(&self.pool)
        .await?;

        rows.iter().map(row_to_entry).collect()
    }
}

pub(crate) async fn insert<'e, E>(executor: E, entry: &DecisionEntry) -> Result<(), RepositoryError>
where
    E: sqlx::Executor<'e, Database = sqlx::Sqlite>,
{
    sqlx::query(
        "INSERT INTO approval_decision
             (id, expense_id, step_index, approver_id, approver_role, decision, comment, decided_at)
         VALUES (?, ?, ?, ?, ?, ?, ?, ?)",
    )
    .bind(&entry.id.0)
    .bind(&entry.expense_id.0)
    .bind(i64::from(entry.step))
    .bind(&entry.approver_id.0)
    .bind(entry.approver_role.as_str())
    .bind(entry.decision.as_str())
    .bind(&entry.comment)
    .bind(entry.decided_at.to_rfc3339())
    .execute(executor)
    .await?;

    Ok(())
}

fn row_to_entry(row: &SqliteRow) -> Result<DecisionEntry, RepositoryError> {
    let step: i64 = column(row, "step_index")?;
    let approver_role: String = column(row, "approver_role")?;
    let decision: String = column(row, "decision")?;
    let decided_at: String = column(row, "decided_at")?;

    Ok(DecisionEntry {
        id: DecisionId(column(row, "id")?),
        expense_id: ExpenseId(column(row, "expense_id")?),
        step: u32::try_from(step).map_err(|error| {
            RepositoryError::Decode(format!("approval_decision.step_index `{step}`: {error}"))
        })?,
        approver_id: UserId(column(row, "approver_id")?),
        approver_role: parse_enum::<Role>("approval_decision.approver_role", &approver_role)?,
        decision: parse_enum::<Decision>("approval_decision.decision", &decision)?,
        comment: column(row, "comment")?,
        decided_at: parse_timestamp("approval_decision.decided_at", &decided_at)?,
    })
}

#[cfg(test)]
mod tests {
    use chrono::{NaiveDate, Utc};
    use rust_decimal::Decimal;

    use reimburse_core::domain::approval::{Decision, DecisionEntry, DecisionId};
    use reimburse_core::domain::expense::{Expense, ExpenseId, ExpenseStatus};
    use reimburse_core::domain::user::{Role, User, UserId};

    use super::SqlDecisionRepository;
    use crate::repositories::{SqlExpenseRepository, SqlUserRepository};
    use crate::{connect_with_settings, migrations, DbPool};

    type TestResult<T> = Result<T, Box<dyn std::error::Error>>;

    async fn seeded_pool() -> TestResult<DbPool> {
        let pool = connect_with_settings("sqlite::memory:", 1, 30).await?;
        migrations::run_pending(&pool).await?;
        let users = SqlUserRepository::new(pool.clone());
        for (id, role) in [("2", Role::Manager), ("3", Role::Employee)] {
            users
                .save(&User {
                    id: UserId(id.into()),
                    name: format!("user-{id}"),
                    email: format!("user-{id}@example.com"),
                    role,
                    manager_id: None,
                })
                .await?;
        }
        SqlExpenseRepository::new(pool.clone())
            .save(&Expense {
                id: ExpenseId("1".into()),
                owner_id: UserId("3".into()),
                description: "Restaurant".into(),
                category: "Food".into(),
                currency: "USD".into(),
                amount: Decimal::new(4265, 2),
                date: NaiveDate::from_ymd_opt(2026, 10, 1).ok_or("date")?,
                status: ExpenseStatus::WaitingApproval,
                current_step: Some(1),
                notes: None,
                created_at: Utc::now(),
                updated_at: Utc::now(),
            })
            .await?;
        Ok(pool)
    }

    fn entry(id: &str, step: u32, decision: Decision) -> DecisionEntry {
        DecisionEntry {
            id: DecisionId(id.into()),
            expense_id: ExpenseId("1".into()),
            step,
            approver_id: UserId("2".into()),
            approver_role: Role::Manager,
            decision,
            comment: Some("checked receipt".into()),
            decided_at: Utc::now(),
        }
    }

    #[tokio::test]
    async fn decisions_come_back_in_append_order() -> TestResult<()> {
        let repo = SqlDecisionRepository::new(seeded_pool().await?);

        repo.append(&entry("d-b", 1, Decision::Approved)).await?;
        repo.append(&entry("d-a", 2, Decision::Rejected)).await?;

        let entries = repo.list_for_expense(&ExpenseId("1".into())).await?;
        let ids: Vec<_> = entries.iter().map(|entry| entry.id.0.as_str()).collect();
        assert_eq!(ids, vec!["d-b", "d-a"]);
        assert_eq!(entries[1].decision, Decision::Rejected);
        assert_eq!(entries[0].comment.as_deref(), Some("checked receipt"));
        Ok(())
    }

    #[tokio::test]
    async fn second_decision_for_same_step_violates_uniqueness() -> TestResult<()> {
        let repo = SqlDecisionRepository::new(seeded_pool().await?);

        repo.append(&entry("d-1", 1, Decision::Approved)).await?;
        let error = repo
            .append(&entry("d-2", 1, Decision::Rejected))
            .await
            .err()
            .ok_or("duplicate insert should fail")?;

        assert!(error.is_unique_violation());
        assert_eq!(repo.list_for_expense(&ExpenseId("1".into())).await?.len(), 1);
        Ok(())
    }
}
