pub mod check;
pub mod config;
pub mod doctor;
pub mod list;
pub mod migrate;
pub mod provision;
pub mod status;
pub mod teardown;
pub mod toggle;

use serde::Serialize;
use serde_json::Value;
use tokio::runtime::Runtime;
use wsgate_core::config::{AppConfig, LoadOptions};
use wsgate_core::domain::workspace::WorkspaceId;
use wsgate_db::{open_registry, DbPool};

pub const EXIT_CONFIG: u8 = 2;
pub const EXIT_WORKSPACE_NOT_FOUND: u8 = 3;
pub const EXIT_CONFIG_WRITE: u8 = 4;
pub const EXIT_RESTART_FAILED: u8 = 5;
pub const EXIT_RUNTIME_INIT: u8 = 6;
pub const EXIT_REGISTRY: u8 = 7;
pub const EXIT_NAMESPACE_COLLISION: u8 = 8;
pub const EXIT_SCAFFOLD: u8 = 9;
pub const EXIT_CHECKS_FAILED: u8 = 10;

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
    details: Option<Value>,
}

impl CommandResult {
    pub fn success(command: &str, message: impl Into<String>) -> Self {
        Self::success_with_details(command, message, None)
    }

    pub fn success_with_details(
        command: &str,
        message: impl Into<String>,
        details: Option<Value>,
    ) -> Self {
        let payload = CommandOutcome {
            command: command.to_string(),
            status: "ok".to_string(),
            error_class: None,
            message: message.into(),
            details,
        };
        Self { exit_code: 0, output: serialize_payload(payload) }
    }

    pub fn failure(
        command: &str,
        error_class: &str,
        message: impl Into<String>,
        exit_code: u8,
    ) -> Self {
        Self::failure_with_details(command, error_class, message, exit_code, None)
    }

    pub fn failure_with_details(
        command: &str,
        error_class: &str,
        message: impl Into<String>,
        exit_code: u8,
        details: Option<Value>,
    ) -> Self {
        let payload = CommandOutcome {
            command: command.to_string(),
            status: "error".to_string(),
            error_class: Some(error_class.to_string()),
            message: message.into(),
            details,
        };
        Self { exit_code, output: serialize_payload(payload) }
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

pub(crate) fn to_details(value: &impl Serialize) -> Option<Value> {
    serde_json::to_value(value).ok()
}

pub(crate) fn load_config(command: &str) -> Result<AppConfig, CommandResult> {
    AppConfig::load(LoadOptions::default()).map_err(|error| {
        CommandResult::failure(
            command,
            "config_validation",
            format!("configuration issue: {error}"),
            EXIT_CONFIG,
        )
    })
}

pub(crate) fn async_runtime(command: &str) -> Result<Runtime, CommandResult> {
    tokio::runtime::Builder::new_current_thread().enable_all().build().map_err(|error| {
        CommandResult::failure(
            command,
            "runtime_init",
            format!("failed to initialize async runtime: {error}"),
            EXIT_RUNTIME_INIT,
        )
    })
}

/// An identifier that is not a `team_env` slug cannot name an existing workspace.
pub(crate) fn parse_workspace(command: &str, raw: &str) -> Result<WorkspaceId, CommandResult> {
    WorkspaceId::parse(raw).map_err(|error| {
        CommandResult::failure(
            command,
            "workspace_not_found",
            error.to_string(),
            EXIT_WORKSPACE_NOT_FOUND,
        )
    })
}

pub(crate) async fn registry(command: &str, config: &AppConfig) -> Result<DbPool, CommandResult> {
    open_registry(&config.registry).await.map_err(|error| {
        CommandResult::failure(command, "registry", error.to_string(), EXIT_REGISTRY)
    })
}

pub(crate) fn registry_failure(command: &str, error: impl std::fmt::Display) -> CommandResult {
    CommandResult::failure(command, "registry", error.to_string(), EXIT_REGISTRY)
}
