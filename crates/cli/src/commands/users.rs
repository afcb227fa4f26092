use reimburse_core::admin::{Administration, NewUser};
use reimburse_core::config::LoadOptions;
use reimburse_core::domain::user::{Role, UserId};
use reimburse_core::store::ExpenseStore;

use crate::commands::{execute, resolve_actor, CommandFailure, CommandResult, CommandSuccess};

pub struct NewUserArgs {
    pub name: String,
    pub email: String,
    pub role: Role,
    pub manager: Option<String>,
}

pub fn list(options: &LoadOptions) -> CommandResult {
    execute("users", options, |store| async move {
        let users = store.list_users().await.map_err(CommandFailure::from_store)?;
        CommandSuccess::with_payload(format!("{} users", users.len()), &users)
    })
}

pub fn onboard(options: &LoadOptions, name: String, email: String) -> CommandResult {
    execute("users", options, |store| async move {
        let user = Administration::new(store).onboard(&name, &email).await?;
        CommandSuccess::with_payload(format!("user `{}` is {}", user.id, user.role), &user)
    })
}

pub fn create(options: &LoadOptions, actor: String, args: NewUserArgs) -> CommandResult {
    execute("users", options, |store| async move {
        let actor = resolve_actor(&store, &actor).await?;
        let user = Administration::new(store)
            .create_user(
                &actor,
                NewUser {
                    name: args.name,
                    email: args.email,
                    role: args.role,
                    manager_id: args.manager.map(UserId),
                },
            )
            .await?;
        CommandSuccess::with_payload(format!("created user `{}`", user.id), &user)
    })
}

pub fn assign_role(options: &LoadOptions, actor: String, user: String, role: Role) -> CommandResult {
    execute("users", options, |store| async move {
        let actor = resolve_actor(&store, &actor).await?;
        let user = Administration::new(store).assign_role(&actor, &UserId(user), role).await?;
        CommandSuccess::with_payload(format!("user `{}` is now {}", user.id, user.role), &user)
    })
}

pub fn assign_manager(
    options: &LoadOptions,
    actor: String,
    user: String,
    manager: Option<String>,
) -> CommandResult {
    execute("users", options, |store| async move {
        let actor = resolve_actor(&store, &actor).await?;
        let user = Administration::new(store)
            .assign_manager(&actor, &UserId(user), manager.map(UserId))
            .await?;
        let message = match &user.manager_id {
            Some(manager_id) => format!("user `{}` now reports to `{manager_id}`", user.id),
            None => format!("user `{}` has no manager", user.id),
        };
        CommandSuccess::with_payload(message, &user)
    })
}
