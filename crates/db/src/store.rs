use async_trait::async_trait;
use tracing::debug;

use reimburse_core::directory::EligibilityPolicy;
use reimburse_core::domain::approval::DecisionEntry;
use reimburse_core::domain::expense::{Expense, ExpenseId};
use reimburse_core::domain::rules::ApprovalRuleSet;
use reimburse_core::domain::user::{User, UserId};
use reimburse_core::store::{ExpenseRevision, ExpenseStore, StoreError};

use crate::repositories::{
    decision, expense, RepositoryError, SqlDecisionRepository, SqlExpenseRepository,
    SqlRuleSetRepository, SqlUserRepository,
};
use crate::DbPool;

/// [`ExpenseStore`] over the SQLite schema in `migrations/`.
pub struct SqlStore {
    pool: DbPool,
    policy: EligibilityPolicy,
    users: SqlUserRepository,
    expenses: SqlExpenseRepository,
    decisions: SqlDecisionRepository,
    rules: SqlRuleSetRepository,
}

impl SqlStore {
    pub fn new(pool: DbPool, policy: EligibilityPolicy) -> Self {
        Self {
            users: SqlUserRepository::new(pool.clone()),
            expenses: SqlExpenseRepository::new(pool.clone()),
            decisions: SqlDecisionRepository::new(pool.clone()),
            rules: SqlRuleSetRepository::new(pool.clone()),
            pool,
            policy,
        }
    }

    pub fn pool(&self) -> &DbPool {
        &self.pool
    }
}

fn decision_error(error: RepositoryError, entry: &DecisionEntry) -> StoreError {
    if error.is_unique_violation() {
        return StoreError::DuplicateDecision {
            expense_id: entry.expense_id.clone(),
            approver_id: entry.approver_id.clone(),
            step: entry.step,
        };
    }
    error.into()
}

#[async_trait]
impl ExpenseStore for SqlStore {
    async fn find_user(&self, id: &UserId) -> Result<Option<User>, StoreError> {
        Ok(self.users.find_by_id(id).await?)
    }

    async fn find_user_by_email(&self, email: &str) -> Result<Option<User>, StoreError> {
        Ok(self.users.find_by_email(email).await?)
    }

    async fn list_users(&self) -> Result<Vec<User>, StoreError> {
        Ok(self.users.list().await?)
    }

    async fn save_user(&self, user: User) -> Result<(), StoreError> {
        self.users.save(&user).await.map_err(|error| {
            if error.is_unique_violation() {
                StoreError::DuplicateEmail(user.email.clone())
            } else {
                error.into()
            }
        })
    }

    async fn load_expense(&self, id: &ExpenseId) -> Result<Option<Expense>, StoreError> {
        Ok(self.expenses.find_by_id(id).await?)
    }

    async fn save_expense(&self, expense: Expense) -> Result<(), StoreError> {
        Ok(self.expenses.save(&expense).await?)
    }

    async fn list_expenses(&self) -> Result<Vec<Expense>, StoreError> {
        Ok(self.expenses.list().await?)
    }

    async fn load_rule_set(&self) -> Result<Option<ApprovalRuleSet>, StoreError> {
        Ok(self.rules.load_active().await?)
    }

    async fn save_rule_set(&self, rule_set: ApprovalRuleSet) -> Result<(), StoreError> {
        Ok(self.rules.replace_active(&rule_set).await?)
    }

    async fn append_decision(&self, entry: DecisionEntry) -> Result<(), StoreError> {
        self.decisions.append(&entry).await.map_err(|error| decision_error(error, &entry))
    }

    async fn load_decisions(
        &self,
        expense_id: &ExpenseId,
    ) -> Result<Vec<DecisionEntry>, StoreError> {
        Ok(self.decisions.list_for_expense(expense_id).await?)
    }

    /// The guarded update runs first so the transaction takes SQLite's write lock before
    /// the ledger count is compared; a writer in another process is either fully visible
    /// or not yet started.
    async fn append_decision_and_save_expense(
        &self,
        entry: DecisionEntry,
        expense: Expense,
        expected: ExpenseRevision,
    ) -> Result<(), StoreError> {
        let mut tx = self.pool.begin().await.map_err(RepositoryError::from)?;

        if !expense::update_if_unchanged(&mut *tx, &expense, &expected).await? {
            tx.rollback().await.map_err(RepositoryError::from)?;
            debug!(
                event_name = "store.stale_revision",
                expense_id = %expense.id,
                expected_decisions = expected.decisions,
                "expense changed since it was read; decision not written"
            );
            return Err(StoreError::StaleRevision { expense_id: expense.id });
        }
        decision::insert(&mut *tx, &entry).await.map_err(|error| decision_error(error, &entry))?;

        tx.commit().await.map_err(RepositoryError::from)?;
        debug!(
            event_name = "store.decision_committed",
            expense_id = %expense.id,
            step = entry.step,
            status = %expense.status,
            "decision and expense state committed together"
        );
        Ok(())
    }

    fn eligibility_policy(&self) -> EligibilityPolicy {
        self.policy
    }
}

#[cfg(test)]
mod tests {
    use chrono::{NaiveDate, Utc};
    use rust_decimal::Decimal;

    use reimburse_core::directory::EligibilityPolicy;
    use reimburse_core::domain::approval::{Decision, DecisionEntry, DecisionId};
    use reimburse_core::domain::expense::{Expense, ExpenseId, ExpenseStatus};
    use reimburse_core::domain::user::{Role, User, UserId};
    use reimburse_core::store::{ExpenseRevision, ExpenseStore, StoreError};

    use super::SqlStore;
    use crate::{connect_with_settings, migrations};

    type TestResult<T> = Result<T, Box<dyn std::error::Error>>;

    async fn store() -> TestResult<SqlStore> {
        let pool = connect_with_settings("sqlite::memory:", 1, 30).await?;
        migrations::run_pending(&pool).await?;
        Ok(SqlStore::new(pool, EligibilityPolicy::ManagementChain))
    }

    fn user(id: &str, email: &str, role: Role, manager: Option<&str>) -> User {
        User {
            id: UserId(id.into()),
            name: id.into(),
            email: email.into(),
            role,
            manager_id: manager.map(|manager| UserId(manager.into())),
        }
    }

    fn expense(status: ExpenseStatus, step: Option<u32>) -> Expense {
        Expense {
            id: ExpenseId("1".into()),
            owner_id: UserId("3".into()),
            description: "Restaurant".into(),
            category: "Food".into(),
            currency: "USD".into(),
            amount: Decimal::new(4265, 2),
            date: NaiveDate::from_ymd_opt(2026, 10, 1).expect("valid date"),
            status,
            current_step: step,
            notes: None,
            created_at: Utc::now(),
            updated_at: Utc::now(),
        }
    }

    fn entry(id: &str) -> DecisionEntry {
        DecisionEntry {
            id: DecisionId(id.into()),
            expense_id: ExpenseId("1".into()),
            step: 1,
            approver_id: UserId("2".into()),
            approver_role: Role::Manager,
            decision: Decision::Approved,
            comment: None,
            decided_at: Utc::now(),
        }
    }

    fn revision(current_step: Option<u32>, decisions: usize) -> ExpenseRevision {
        ExpenseRevision { status: ExpenseStatus::WaitingApproval, current_step, decisions }
    }

    async fn seed(store: &SqlStore) -> TestResult<()> {
        store.save_user(user("2", "mark@example.com", Role::Manager, None)).await?;
        store.save_user(user("3", "ramesh@example.com", Role::Employee, Some("2"))).await?;
        store.save_expense(expense(ExpenseStatus::WaitingApproval, Some(1))).await?;
        Ok(())
    }

    #[tokio::test]
    async fn email_collisions_surface_as_duplicate_email() -> TestResult<()> {
        let store = store().await?;
        seed(&store).await?;

        let error = store
            .save_user(user("9", "MARK@example.com", Role::Employee, None))
            .await
            .err()
            .ok_or("email collision should fail")?;
        assert_eq!(error, StoreError::DuplicateEmail("MARK@example.com".into()));
        Ok(())
    }

    #[tokio::test]
    async fn combined_write_rolls_back_expense_on_duplicate_decision() -> TestResult<()> {
        let store = store().await?;
        seed(&store).await?;

        store
            .append_decision_and_save_expense(
                entry("d-1"),
                expense(ExpenseStatus::WaitingApproval, Some(2)),
                revision(Some(1), 0),
            )
            .await?;
        let error = store
            .append_decision_and_save_expense(
                entry("d-2"),
                expense(ExpenseStatus::Approved, None),
                revision(Some(2), 1),
            )
            .await
            .err()
            .ok_or("duplicate should fail")?;

        assert!(matches!(error, StoreError::DuplicateDecision { step: 1, .. }));
        let stored = store.load_expense(&ExpenseId("1".into())).await?.ok_or("expense")?;
        assert_eq!(stored.status, ExpenseStatus::WaitingApproval);
        assert_eq!(stored.current_step, Some(2));
        assert_eq!(store.load_decisions(&ExpenseId("1".into())).await?.len(), 1);
        Ok(())
    }

    #[tokio::test]
    async fn combined_write_refuses_a_stale_revision() -> TestResult<()> {
        let store = store().await?;
        seed(&store).await?;

        store
            .append_decision_and_save_expense(
                entry("d-1"),
                expense(ExpenseStatus::WaitingApproval, Some(1)),
                revision(Some(1), 0),
            )
            .await?;
        let mut late = entry("d-2");
        late.approver_id = UserId("4".into());
        let error = store
            .append_decision_and_save_expense(
                late,
                expense(ExpenseStatus::Approved, None),
                revision(Some(1), 0),
            )
            .await
            .err()
            .ok_or("stale revision should fail")?;

        assert_eq!(error, StoreError::StaleRevision { expense_id: ExpenseId("1".into()) });
        let stored = store.load_expense(&ExpenseId("1".into())).await?.ok_or("expense")?;
        assert_eq!(stored.status, ExpenseStatus::WaitingApproval);
        assert_eq!(store.load_decisions(&ExpenseId("1".into())).await?.len(), 1);
        Ok(())
    }

    #[tokio::test]
    async fn eligible_approvers_use_the_configured_policy() -> TestResult<()> {
        let store = store().await?;
        seed(&store).await?;
        store.save_user(user("4", "maria@example.com", Role::Manager, None)).await?;

        let chain = store.resolve_eligible_approvers(Role::Manager, &UserId("3".into())).await?;
        assert_eq!(chain, vec![UserId("2".into())]);

        let pool = store.pool().clone();
        let everyone = SqlStore::new(pool, EligibilityPolicy::AllWithRole)
            .resolve_eligible_approvers(Role::Manager, &UserId("3".into()))
            .await?;
        assert_eq!(everyone, vec![UserId("2".into()), UserId("4".into())]);
        Ok(())
    }
}
