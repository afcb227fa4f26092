use reimburse_core::config::LoadOptions;

use crate::commands::{execute, CommandResult, CommandSuccess};

pub fn run(options: &LoadOptions) -> CommandResult {
    execute("migrate", options, |_store| async {
        Ok(CommandSuccess::message("applied pending migrations"))
    })
}
