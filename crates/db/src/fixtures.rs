use serde::Serialize;
use sqlx::Executor;

use crate::connection::DbPool;
use crate::repositories::RepositoryError;

struct SeedUser {
    id: &'static str,
    name: &'static str,
    role: &'static str,
    manager_id: Option<&'static str>,
}

struct SeedExpense {
    id: &'static str,
    owner_id: &'static str,
    description: &'static str,
    status: &'static str,
}

const SEED_USERS: &[SeedUser] = &[
    SeedUser { id: "1", name: "Sarah", role: "ADMIN", manager_id: None },
    SeedUser { id: "2", name: "Mark", role: "MANAGER", manager_id: None },
    SeedUser { id: "3", name: "Ramesh", role: "EMPLOYEE", manager_id: Some("2") },
];

const SEED_EXPENSES: &[SeedExpense] = &[
    SeedExpense { id: "1", owner_id: "3", description: "Restaurant", status: "WAITING_APPROVAL" },
    SeedExpense { id: "2", owner_id: "3", description: "Ride", status: "DRAFT" },
];

/// Demo organisation used by `reimburse seed` and the integration tests: an admin, a
/// manager with one direct report, two expenses, and a two-step default rule set.
pub struct DemoOrgSeed;

impl DemoOrgSeed {
    pub const SQL: &str = include_str!("../../../config/fixtures/demo_org.sql");

    /// Applies the fixture. Rows that already exist are left alone, and an existing rule
    /// set is never replaced.
    pub async fn load(pool: &DbPool) -> Result<SeedResult, RepositoryError> {
        let mut tx = pool.begin().await?;

        tx.execute(sqlx::query(Self::SQL)).await?;
        tx.commit().await?;

        Ok(SeedResult {
            users_seeded: SEED_USERS.iter().map(|user| user.name).collect(),
            expenses_seeded: SEED_EXPENSES.iter().map(|expense| expense.description).collect(),
        })
    }

    pub async fn verify(pool: &DbPool) -> Result<VerificationResult, RepositoryError> {
        let mut checks = Vec::new();

        for user in SEED_USERS {
            let present: i64 = sqlx::query_scalar(
                "SELECT EXISTS(
                     SELECT 1 FROM app_user
                     WHERE id = ?1 AND role = ?2 AND manager_id IS ?3
                 )",
            )
            .bind(user.id)
            .bind(user.role)
            .bind(user.manager_id)
            .fetch_one(pool)
            .await?;
            checks.push((user.name, present == 1));
        }

        for expense in SEED_EXPENSES {
            let present: i64 = sqlx::query_scalar(
                "SELECT EXISTS(SELECT 1 FROM expense WHERE id = ?1 AND owner_id = ?2)",
            )
            .bind(expense.id)
            .bind(expense.owner_id)
            .fetch_one(pool)
            .await?;
            checks.push((expense.description, present == 1));
        }

        let rule_steps: i64 = sqlx::query_scalar(
            "SELECT COUNT(1) FROM approval_rule_step s
             JOIN approval_rule_set r ON r.id = s.rule_set_id",
        )
        .fetch_one(pool)
        .await?;
        checks.push(("active rule set", rule_steps > 0));

        let all_present = checks.iter().all(|(_, ok)| *ok);
        Ok(VerificationResult { all_present, checks })
    }
}

#[derive(Debug, Serialize)]
pub struct SeedResult {
    pub users_seeded: Vec<&'static str>,
    pub expenses_seeded: Vec<&'static str>,
}

#[derive(Debug, Serialize)]
pub struct VerificationResult {
    pub all_present: bool,
    pub checks: Vec<(&'static str, bool)>,
}
