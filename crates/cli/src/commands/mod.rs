pub mod config;
pub mod decide;
pub mod expense;
pub mod migrate;
pub mod rules;
pub mod seed;
pub mod status;
pub mod users;

use std::future::Future;
use std::sync::Arc;

use serde::Serialize;
use serde_json::Value;

use reimburse_core::config::{AppConfig, LoadOptions};
use reimburse_core::domain::user::{User, UserId};
use reimburse_core::errors::{ApplicationError, InterfaceError};
use reimburse_core::identity::{CallerContext, IdentityProvider, SessionIdentityProvider};
use reimburse_core::store::StoreError;
use reimburse_db::{connect_with_config, migrations, SqlStore};

#[derive(Debug, Clone)]
pub struct CommandResult {
    pub exit_code: u8,
    pub output: String,
}

#[derive(Debug, Serialize)]
struct CommandOutcome {
    command: String,
    status: String,
    error_class: Option<String>,
    message: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    payload: Option<Value>,
}

impl CommandResult {
    pub fn success(command: &str, message: impl Into<String>) -> Self {
        Self::success_with_payload(command, message, None)
    }

    pub fn success_with_payload(
        command: &str,
        message: impl Into<String>,
        payload: Option<Value>,
    ) -> Self {
        let outcome = CommandOutcome {
            command: command.to_string(),
            status: "ok".to_string(),
            error_class: None,
            message: message.into(),
            payload,
        };
        Self { exit_code: 0, output: serialize_payload(outcome) }
    }

    pub fn failure(
        command: &str,
        error_class: &str,
        message: impl Into<String>,
        exit_code: u8,
    ) -> Self {
        let outcome = CommandOutcome {
            command: command.to_string(),
            status: "error".to_string(),
            error_class: Some(error_class.to_string()),
            message: message.into(),
            payload: None,
        };
        Self { exit_code, output: serialize_payload(outcome) }
    }
}

fn serialize_payload(payload: CommandOutcome) -> String {
    serde_json::to_string(&payload).unwrap_or_else(|error| {
        format!(
            "{{\"command\":\"unknown\",\"status\":\"error\",\"error_class\":\"serialization\",\"message\":\"{}\"}}",
            error.to_string().replace('\\', "\\\\").replace('"', "\\\"")
        )
    })
}

/// A successful command body: a human-readable line plus an optional JSON payload.
pub(crate) struct CommandSuccess {
    message: String,
    payload: Option<Value>,
}

impl CommandSuccess {
    pub(crate) fn message(message: impl Into<String>) -> Self {
        Self { message: message.into(), payload: None }
    }

    pub(crate) fn with_payload(
        message: impl Into<String>,
        payload: &impl Serialize,
    ) -> Result<Self, CommandFailure> {
        let payload = serde_json::to_value(payload)
            .map_err(|error| CommandFailure::new("serialization", error.to_string(), 12))?;
        Ok(Self { message: message.into(), payload: Some(payload) })
    }
}

#[derive(Debug)]
pub(crate) struct CommandFailure {
    error_class: String,
    message: String,
    exit_code: u8,
}

impl CommandFailure {
    pub(crate) fn new(error_class: &str, message: impl Into<String>, exit_code: u8) -> Self {
        Self { error_class: error_class.to_string(), message: message.into(), exit_code }
    }

    fn into_result(self, command: &str) -> CommandResult {
        CommandResult::failure(command, &self.error_class, self.message, self.exit_code)
    }
}

impl CommandFailure {
    pub(crate) fn from_store(error: StoreError) -> Self {
        ApplicationError::from(error).into()
    }
}

impl From<ApplicationError> for CommandFailure {
    fn from(error: ApplicationError) -> Self {
        let error_class = error.kind();
        let interface = error.into_interface("cli");
        let exit_code = match &interface {
            InterfaceError::BadRequest { .. } => 7,
            InterfaceError::Forbidden { .. } => 8,
            InterfaceError::NotFound { .. } => 9,
            InterfaceError::Conflict { .. } => 10,
            InterfaceError::ServiceUnavailable { .. } => 11,
            InterfaceError::Internal { .. } => 12,
        };
        Self::new(error_class, interface.to_string(), exit_code)
    }
}

pub(crate) fn load_config(options: &LoadOptions) -> Result<AppConfig, CommandFailure> {
    AppConfig::load(options.clone()).map_err(|error| {
        CommandFailure::new("config_validation", format!("configuration issue: {error}"), 2)
    })
}

/// Loads config, opens a migrated store and runs `body` on a fresh current-thread runtime.
pub(crate) fn execute<F, Fut>(command: &str, options: &LoadOptions, body: F) -> CommandResult
where
    F: FnOnce(Arc<SqlStore>) -> Fut,
    Fut: Future<Output = Result<CommandSuccess, CommandFailure>>,
{
    let config = match load_config(options) {
        Ok(config) => config,
        Err(failure) => return failure.into_result(command),
    };

    let runtime = match tokio::runtime::Builder::new_current_thread().enable_all().build() {
        Ok(runtime) => runtime,
        Err(error) => {
            return CommandResult::failure(
                command,
                "runtime_init",
                format!("failed to initialize async runtime: {error}"),
                3,
            );
        }
    };

    let result = runtime.block_on(async {
        let store = match open_store(&config).await {
            Ok(store) => Arc::new(store),
            Err(failure) => return Err(failure),
        };
        let outcome = body(Arc::clone(&store)).await;
        store.pool().close().await;
        outcome
    });

    match result {
        Ok(success) => CommandResult::success_with_payload(command, success.message, success.payload),
        Err(failure) => {
            tracing::warn!(
                event_name = "cli.command_failed",
                command,
                error_class = %failure.error_class,
                exit_code = failure.exit_code,
                "{}",
                failure.message
            );
            failure.into_result(command)
        }
    }
}

async fn open_store(config: &AppConfig) -> Result<SqlStore, CommandFailure> {
    let pool = connect_with_config(&config.database)
        .await
        .map_err(|error| CommandFailure::new("db_connectivity", error.to_string(), 4))?;
    migrations::run_pending(&pool)
        .await
        .map_err(|error| CommandFailure::new("migration", error.to_string(), 5))?;
    Ok(SqlStore::new(pool, config.approvals.eligibility))
}

/// Resolves `--as <user-id>` the same way a session-backed transport would.
pub(crate) async fn resolve_actor(
    store: &Arc<SqlStore>,
    actor_id: &str,
) -> Result<User, CommandFailure> {
    let provider = SessionIdentityProvider::new(Arc::clone(store));
    let context = CallerContext::for_user(UserId(actor_id.trim().to_owned()), "cli");
    Ok(provider.resolve_caller(&context).await?)
}
