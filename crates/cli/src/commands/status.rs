use serde_json::json;
use wsgate_core::{ToggleError, WorkspaceConfigStore};

use crate::commands::toggle::gateway_toggle;
use crate::commands::{
    async_runtime, load_config, parse_workspace, CommandResult, EXIT_CONFIG_WRITE,
    EXIT_WORKSPACE_NOT_FOUND,
};

const COMMAND: &str = "status";

/// Read-only: reports the gateway link recorded in the workspace `.env`.
pub fn run(workspace: &str) -> CommandResult {
    let config = match load_config(COMMAND) {
        Ok(config) => config,
        Err(result) => return result,
    };
    let workspace = match parse_workspace(COMMAND, workspace) {
        Ok(workspace) => workspace,
        Err(result) => return result,
    };
    let runtime = match async_runtime(COMMAND) {
        Ok(runtime) => runtime,
        Err(result) => return result,
    };

    let toggle = gateway_toggle(&config);
    match runtime.block_on(toggle.status(&workspace)) {
        Ok(link) => CommandResult::success_with_details(
            COMMAND,
            format!("workspace `{workspace}` gateway {}", link.label()),
            Some(json!({
                "workspace": workspace,
                "gateway": link,
                "env_file": toggle.store().location(&workspace),
            })),
        ),
        Err(error) => {
            let exit_code = match error {
                ToggleError::WorkspaceNotFound { .. } => EXIT_WORKSPACE_NOT_FOUND,
                _ => EXIT_CONFIG_WRITE,
            };
            CommandResult::failure(COMMAND, error.error_class(), error.to_string(), exit_code)
        }
    }
}
