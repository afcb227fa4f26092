use chrono::Utc;
use sqlx::sqlite::SqliteRow;

use reimburse_core::domain::rules::{ApprovalRuleSet, ApprovalStep, RuleSetId};
use reimburse_core::domain::user::Role;

use super::{column, parse_enum, RepositoryError};
use crate::DbPool;

/// The active approval rule set. The table holds at most one set; saving replaces it.
pub struct SqlRuleSetRepository {
    pool: DbPool,
}

impl SqlRuleSetRepository {
    pub fn new(pool: DbPool) -> Self {
        Self { pool }
    }

    /// Header and steps come from one read transaction, so a concurrent
    /// [`Self::replace_active`] is seen entirely or not at all.
    pub async fn load_active(&self) -> Result<Option<ApprovalRuleSet>, RepositoryError> {
        let mut tx = self.pool.begin().await?;

        let Some(row) = sqlx::query(
            "SELECT id, name, min_percent_to_approve
             FROM approval_rule_set
             ORDER BY updated_at DESC, id
             LIMIT 1",
        )
        .fetch_optional(&mut *tx)
        .await?
        else {
            tx.commit().await?;
            return Ok(None);
        };

        let id: String = column(&row, "id")?;
        let threshold: i64 = column(&row, "min_percent_to_approve")?;
        let step_rows = sqlx::query(
            "SELECT step_index, approver_role
             FROM approval_rule_step
             WHERE rule_set_id = ?
             ORDER BY step_index",
        )
        .bind(&id)
        .fetch_all(&mut *tx)
        .await?;
        tx.commit().await?;

        Ok(Some(ApprovalRuleSet {
            id: RuleSetId(id),
            name: column(&row, "name")?,
            min_percent_to_approve: u8::try_from(threshold).map_err(|error| {
                RepositoryError::Decode(format!(
                    "approval_rule_set.min_percent_to_approve `{threshold}`: {error}"
                ))
            })?,
            steps: step_rows.iter().map(row_to_step).collect::<Result<_, _>>()?,
        }))
    }

    pub async fn replace_active(&self, rule_set: &ApprovalRuleSet) -> Result<(), RepositoryError> {
        let mut tx = self.pool.begin().await?;

        sqlx::query("DELETE FROM approval_rule_step").execute(&mut *tx).await?;
        sqlx::query("DELETE FROM approval_rule_set").execute(&mut *tx).await?;

        sqlx::query(
            "INSERT INTO approval_rule_set (id, name, min_percent_to_approve, updated_at)
             VALUES (?, ?, ?, ?)",
        )
        .bind(&rule_set.id.0)
        .bind(&rule_set.name)
        .bind(i64::from(rule_set.min_percent_to_approve))
        .bind(Utc::now().to_rfc3339())
        .execute(&mut *tx)
        .await?;

        for step in rule_set.steps_in_order() {
            sqlx::query(
                "INSERT INTO approval_rule_step (rule_set_id, step_index, approver_role)
                 VALUES (?, ?, ?)",
            )
            .bind(&rule_set.id.0)
            .bind(i64::from(step.step))
            .bind(step.approver_role.as_str())
            .execute(&mut *tx)
            .await?;
        }

        tx.commit().await?;
        Ok(())
    }
}

fn row_to_step(row: &SqliteRow) -> Result<ApprovalStep, RepositoryError> {
    let step: i64 = column(row, "step_index")?;
    let role: String = column(row, "approver_role")?;

    Ok(ApprovalStep {
        step: u32::try_from(step).map_err(|error| {
            RepositoryError::Decode(format!("approval_rule_step.step_index `{step}`: {error}"))
        })?,
        approver_role: parse_enum::<Role>("approval_rule_step.approver_role", &role)?,
    })
}
