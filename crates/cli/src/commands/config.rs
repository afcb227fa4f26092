use std::env;
use std::fs;
use std::path::Path;

use serde::Serialize;
use toml::Value;

use reimburse_core::config::{resolve_config_path, AppConfig, LoadOptions};

use crate::commands::{load_config, CommandResult};

#[derive(Debug, Serialize, PartialEq, Eq)]
struct ConfigField {
    key: &'static str,
    value: String,
    source: String,
}

pub fn run(options: &LoadOptions) -> CommandResult {
    let config = match load_config(options) {
        Ok(config) => config,
        Err(failure) => return failure.into_result("config"),
    };

    let config_file_path = resolve_config_path(options.config_path.as_deref());
    let config_file_doc = load_config_file_doc(config_file_path.as_deref());
    let fields = describe(&config, options, config_file_doc.as_ref(), config_file_path.as_deref());

    let mut lines =
        vec!["effective config (source precedence: override > env > file > default):".to_string()];
    lines.extend(fields.iter().map(render_line));

    match serde_json::to_value(&fields) {
        Ok(payload) => CommandResult::success_with_payload("config", lines.join("\n"), Some(payload)),
        Err(error) => CommandResult::failure("config", "serialization", error.to_string(), 12),
    }
}

fn describe(
    config: &AppConfig,
    options: &LoadOptions,
    doc: Option<&Value>,
    path: Option<&Path>,
) -> Vec<ConfigField> {
    let overrides = &options.overrides;
    let field = |key: &'static str, value: String, env_keys: &[&str], overridden: bool| {
        let source = if overridden {
            "override".to_string()
        } else {
            field_source(key, env_keys, doc, path)
        };
        ConfigField { key, value, source }
    };

    vec![
        field(
            "database.url",
            config.database.url.clone(),
            &["REIMBURSE_DATABASE_URL"],
            overrides.database_url.is_some(),
        ),
        field(
            "database.max_connections",
            config.database.max_connections.to_string(),
            &["REIMBURSE_DATABASE_MAX_CONNECTIONS"],
            false,
        ),
        field(
            "database.timeout_secs",
            config.database.timeout_secs.to_string(),
            &["REIMBURSE_DATABASE_TIMEOUT_SECS"],
            false,
        ),
        field(
            "approvals.eligibility",
            config.approvals.eligibility.to_string(),
            &["REIMBURSE_APPROVALS_ELIGIBILITY"],
            overrides.eligibility.is_some(),
        ),
        field(
            "logging.level",
            config.logging.level.clone(),
            &["REIMBURSE_LOGGING_LEVEL", "REIMBURSE_LOG_LEVEL"],
            overrides.log_level.is_some(),
        ),
        field(
            "logging.format",
            format!("{:?}", config.logging.format).to_ascii_lowercase(),
            &["REIMBURSE_LOGGING_FORMAT", "REIMBURSE_LOG_FORMAT"],
            overrides.log_format.is_some(),
        ),
    ]
}

fn load_config_file_doc(path: Option<&Path>) -> Option<Value> {
    let path = path?;
    let raw = fs::read_to_string(path).ok()?;
    raw.parse::<Value>().ok()
}

fn field_source(
    key_path: &str,
    env_keys: &[&str],
    config_file_doc: Option<&Value>,
    config_file_path: Option<&Path>,
) -> String {
    if let Some(env_key) = env_keys.iter().find(|key| env::var_os(key).is_some()) {
        return format!("env ({env_key})");
    }

    if let Some(doc) = config_file_doc {
        if contains_path(doc, key_path) {
            let file_path = config_file_path
                .map(|path| path.display().to_string())
                .unwrap_or_else(|| "config file".to_string());
            return format!("file ({file_path})");
        }
    }

    "default".to_string()
}

fn contains_path(root: &Value, key_path: &str) -> bool {
    let mut current = root;
    for key in key_path.split('.') {
        let Some(next) = current.get(key) else {
            return false;
        };
        current = next;
    }
    true
}

fn render_line(field: &ConfigField) -> String {
    format!("- {} = {} (source: {})", field.key, field.value, field.source)
}
