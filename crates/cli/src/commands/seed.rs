use serde::Serialize;

use reimburse_core::config::LoadOptions;
use reimburse_db::{DemoOrgSeed, SeedResult};

use crate::commands::{execute, CommandFailure, CommandResult, CommandSuccess};

#[derive(Serialize)]
struct SeedOutput {
    #[serde(flatten)]
    seeded: SeedResult,
    checks: Vec<(&'static str, bool)>,
}

pub fn run(options: &LoadOptions) -> CommandResult {
    execute("seed", options, |store| async move {
        let seeded = DemoOrgSeed::load(store.pool())
            .await
            .map_err(|error| CommandFailure::new("seed_execution", error.to_string(), 6))?;
        let verification = DemoOrgSeed::verify(store.pool())
            .await
            .map_err(|error| CommandFailure::new("seed_verification", error.to_string(), 6))?;

        if !verification.all_present {
            return Err(CommandFailure::new(
                "seed_verification",
                verification_failure_message(&verification.checks),
                6,
            ));
        }

        let message = format!(
            "demo organisation loaded: {} users, {} expenses",
            seeded.users_seeded.len(),
            seeded.expenses_seeded.len()
        );
        CommandSuccess::with_payload(message, &SeedOutput { seeded, checks: verification.checks })
    })
}

fn verification_failure_message(checks: &[(&str, bool)]) -> String {
    let failed: Vec<&str> =
        checks.iter().filter_map(|(check, passed)| (!passed).then_some(*check)).collect();
    if failed.is_empty() {
        "some seed data failed to load".to_string()
    } else {
        format!("seed verification failed for checks: {}", failed.join(", "))
    }
}

#[cfg(test)]
mod tests {
    use super::verification_failure_message;

    #[test]
    fn failure_message_names_failed_checks() {
        let checks = [("Sarah", true), ("Restaurant", false), ("active rule set", false)];
        assert_eq!(
            verification_failure_message(&checks),
            "seed verification failed for checks: Restaurant, active rule set"
        );
    }

    #[test]
    fn failure_message_falls_back_when_every_check_passed() {
        assert_eq!(verification_failure_message(&[("Mark", true)]), "some seed data failed to load");
    }
}
