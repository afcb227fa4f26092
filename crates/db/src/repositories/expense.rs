use std::str::FromStr;

use chrono::NaiveDate;
use rust_decimal::Decimal;
use sqlx::sqlite::SqliteRow;

use reimburse_core::domain::expense::{Expense, ExpenseId, ExpenseStatus};
use reimburse_core::domain::user::UserId;
use reimburse_core::store::ExpenseRevision;

use super::{column, parse_enum, parse_timestamp, RepositoryError};
use crate::DbPool;

const DATE_FORMAT: &str = "%Y-%m-%d";

const SELECT_EXPENSE: &str = "SELECT id, owner_id, description, category, currency, amount,
        expense_date, status, current_step, notes, created_at, updated_at
 FROM expense";

pub struct SqlExpenseRepository {
    pool: DbPool,
}

impl SqlExpenseRepository {
    pub fn new(pool: DbPool) -> Self {
        Self { pool }
    }

    pub async fn find_by_id(&self, id: &ExpenseId) -> Result<Option<Expense>, RepositoryError> {
        let row = sqlx::query(&format!("{SELECT_EXPENSE} WHERE id = ?"))
            .bind(&id.0)
            .fetch_optional(&self.pool)
            .await?;

        row.as_ref().map(row_to_expense).transpose()
    }

    pub async fn list(&self) -> Result<Vec<Expense>, RepositoryError> {
        let rows = sqlx::query(&format!("{SELECT_EXPENSE} ORDER BY created_at, id"))
            .fetch_all(&self.pool)
            .await?;

        rows.iter().map(row_to_expense).collect()
    }

    pub async fn save(&self, expense: &Expense) -> Result<(), RepositoryError> {
        upsert(&self.pool, expense).await
    }
}

pub(crate) async fn upsert<'e, E>(executor: E, expense: &Expense) -> Result<(), RepositoryError>
where
    E: sqlx::Executor<'e, Database = sqlx::Sqlite>,
{
    sqlx::query(
        "INSERT INTO expense (id, owner_id, description, category, currency, amount,
                              expense_date, status, current_step, notes, created_at, updated_at)
         VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)
         ON CONFLICT(id) DO UPDATE SET
             description = excluded.description,
             category = excluded.category,
             currency = excluded.currency,
             amount = excluded.amount,
             expense_date = excluded.expense_date,
             status = excluded.status,
             current_step = excluded.current_step,
             notes = excluded.notes,
             updated_at = excluded.updated_at",
    )
    .bind(&expense.id.0)
    .bind(&expense.owner_id.0)
    .bind(&expense.description)
    .bind(&expense.category)
    .bind(&expense.currency)
    .bind(expense.amount.to_string())
    .bind(expense.date.format(DATE_FORMAT).to_string())
    .bind(expense.status.as_str())
    .bind(expense.current_step.map(i64::from))
    .bind(&expense.notes)
    .bind(expense.created_at.to_rfc3339())
    .bind(expense.updated_at.to_rfc3339())
    .execute(executor)
    .await?;

    Ok(())
}

/// Writes the decision-driven fields of `expense` only while the stored row and its
/// ledger still match `expected`. Returns whether the row was updated.
pub(crate) async fn update_if_unchanged<'e, E>(
    executor: E,
    expense: &Expense,
    expected: &ExpenseRevision,
) -> Result<bool, RepositoryError>
where
    E: sqlx::Executor<'e, Database = sqlx::Sqlite>,
{
    let decisions = i64::try_from(expected.decisions)
        .map_err(|error| RepositoryError::Decode(format!("ledger length: {error}")))?;

    let result = sqlx::query(
        "UPDATE expense
         SET status = ?, current_step = ?, updated_at = ?
         WHERE id = ?
           AND status = ?
           AND current_step IS ?
           AND (SELECT COUNT(*) FROM approval_decision WHERE expense_id = ?) = ?",
    )
    .bind(expense.status.as_str())
    .bind(expense.current_step.map(i64::from))
    .bind(expense.updated_at.to_rfc3339())
    .bind(&expense.id.0)
    .bind(expected.status.as_str())
    .bind(expected.current_step.map(i64::from))
    .bind(&expense.id.0)
    .bind(decisions)
    .execute(executor)
    .await?;

    Ok(result.rows_affected() == 1)
}

fn row_to_expense(row: &SqliteRow) -> Result<Expense, RepositoryError> {
    let amount: String = column(row, "amount")?;
    let date: String = column(row, "expense_date")?;
    let status: String = column(row, "status")?;
    let current_step: Option<i64> = column(row, "current_step")?;
    let created_at: String = column(row, "created_at")?;
    let updated_at: String = column(row, "updated_at")?;

    let current_step = current_step
        .map(u32::try_from)
        .transpose()
        .map_err(|error| RepositoryError::Decode(format!("expense.current_step: {error}")))?;

    Ok(Expense {
        id: ExpenseId(column(row, "id")?),
        owner_id: UserId(column(row, "owner_id")?),
        description: column(row, "description")?,
        category: column(row, "category")?,
        currency: column(row, "currency")?,
        amount: Decimal::from_str(&amount).map_err(|error| {
            RepositoryError::Decode(format!("expense.amount `{amount}`: {error}"))
        })?,
        date: NaiveDate::parse_from_str(&date, DATE_FORMAT).map_err(|error| {
            RepositoryError::Decode(format!("expense.expense_date `{date}`: {error}"))
        })?,
        status: parse_enum::<ExpenseStatus>("expense.status", &status)?,
        current_step,
        notes: column(row, "notes")?,
        created_at: parse_timestamp("expense.created_at", &created_at)?,
        updated_at: parse_timestamp("expense.updated_at", &updated_at)?,
    })
}
