use std::time::Duration;

use serde_json::json;
use wsgate_core::config::AppConfig;
use wsgate_core::{ComposeRuntime, FsConfigStore, GatewayToggle, ToggleAction, ToggleError};

use crate::commands::{
    async_runtime, load_config, parse_workspace, to_details, CommandResult,
    EXIT_CONFIG_WRITE, EXIT_RESTART_FAILED, EXIT_WORKSPACE_NOT_FOUND,
};

/// A waiting toggle outlasts one full restart of the toggle holding the workspace.
const LOCK_WAIT_MARGIN_SECS: u64 = 30;

pub(crate) fn compose_runtime(config: &AppConfig) -> ComposeRuntime {
    ComposeRuntime::new(
        config.workspaces.root.clone(),
        config.runtime.compose_program.clone(),
        Duration::from_secs(config.runtime.restart_timeout_secs),
    )
}

pub(crate) fn gateway_toggle(config: &AppConfig) -> GatewayToggle<FsConfigStore, ComposeRuntime> {
    GatewayToggle::new(
        FsConfigStore::new(config.workspaces.root.clone()).with_lock_wait(Duration::from_secs(
            config.runtime.restart_timeout_secs.saturating_add(LOCK_WAIT_MARGIN_SECS),
        )),
        compose_runtime(config),
        config.gateway.container_url.clone(),
    )
}

pub fn run(action: ToggleAction, workspace: &str) -> CommandResult {
    let command = action.as_str();
    let config = match load_config(command) {
        Ok(config) => config,
        Err(result) => return result,
    };
    let workspace = match parse_workspace(command, workspace) {
        Ok(workspace) => workspace,
        Err(result) => return result,
    };
    let runtime = match async_runtime(command) {
        Ok(runtime) => runtime,
        Err(result) => return result,
    };

    let toggle = gateway_toggle(&config);
    let result = runtime.block_on(async {
        match action {
            ToggleAction::Enable => toggle.enable(&workspace).await,
            ToggleAction::Disable => toggle.disable(&workspace).await,
        }
    });

    match result {
        Ok(outcome) => {
            let message = format!(
                "workspace `{}` gateway {} and restarted{}",
                outcome.workspace,
                outcome.current.label(),
                if outcome.config_changed { "" } else { " (configuration already up to date)" }
            );
            CommandResult::success_with_details(command, message, to_details(&outcome))
        }
        Err(error) => failure(command, &error),
    }
}

fn failure(command: &str, error: &ToggleError) -> CommandResult {
    let (exit_code, details) = match error {
        ToggleError::WorkspaceNotFound { workspace, location } => (
            EXIT_WORKSPACE_NOT_FOUND,
            json!({ "workspace": workspace, "location": location }),
        ),
        ToggleError::ConfigWrite(write) => (
            EXIT_CONFIG_WRITE,
            json!({ "workspace": write.workspace, "location": write.location, "phase": write.phase }),
        ),
        ToggleError::RestartFailed(restart) => (
            EXIT_RESTART_FAILED,
            json!({ "workspace": restart.workspace, "rollback": restart.rollback }),
        ),
    };
    CommandResult::failure_with_details(
        command,
        error.error_class(),
        error.to_string(),
        exit_code,
        Some(details),
    )
}
