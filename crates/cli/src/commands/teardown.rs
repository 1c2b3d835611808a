use serde_json::json;
use tracing::{info, warn};
use wsgate_core::WorkspaceRuntime;
use wsgate_db::{SqlWorkspaceRepository, WorkspaceRepository};

use crate::commands::toggle::compose_runtime;
use crate::commands::{
    async_runtime, load_config, parse_workspace, registry, registry_failure, CommandResult,
    EXIT_RESTART_FAILED, EXIT_SCAFFOLD, EXIT_WORKSPACE_NOT_FOUND,
};

const COMMAND: &str = "teardown";

/// Stops the compose project and drops the registry row. `purge` also deletes the directory.
pub fn run(workspace: &str, purge: bool) -> CommandResult {
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

    let dir = config.workspaces.root.join(workspace.as_str());

    let result = runtime.block_on(async {
        let pool = registry(COMMAND, &config).await?;
        let repo = SqlWorkspaceRepository::new(pool.clone());
        let registered =
            repo.find(&workspace).await.map_err(|error| registry_failure(COMMAND, error))?;
        let dir_exists = dir.is_dir();

        if registered.is_none() && !dir_exists {
            return Err(CommandResult::failure(
                COMMAND,
                "workspace_not_found",
                format!("workspace `{workspace}` is neither registered nor present on disk"),
                EXIT_WORKSPACE_NOT_FOUND,
            ));
        }

        if dir_exists {
            compose_runtime(&config).teardown(&workspace).await.map_err(|error| {
                CommandResult::failure(
                    COMMAND,
                    "teardown_failed",
                    format!("workspace `{workspace}` could not be stopped: {error}"),
                    EXIT_RESTART_FAILED,
                )
            })?;
        } else {
            warn!(
                event_name = "workspace.teardown.directory_missing",
                workspace = %workspace,
                dir = %dir.display(),
                "workspace directory missing, skipping compose down"
            );
        }

        let unregistered =
            repo.delete(&workspace).await.map_err(|error| registry_failure(COMMAND, error))?;
        pool.close().await;

        let purged = if purge && dir_exists {
            tokio::fs::remove_dir_all(&dir).await.map_err(|error| {
                CommandResult::failure(
                    COMMAND,
                    "purge",
                    format!("could not remove `{}`: {error}", dir.display()),
                    EXIT_SCAFFOLD,
                )
            })?;
            true
        } else {
            false
        };

        info!(
            event_name = "workspace.teardown.completed",
            workspace = %workspace,
            unregistered,
            purged,
            "workspace torn down"
        );
        Ok::<_, CommandResult>((dir_exists, unregistered, purged))
    });

    match result {
        Ok((stopped, unregistered, purged)) => CommandResult::success_with_details(
            COMMAND,
            format!("workspace `{workspace}` torn down"),
            Some(json!({
                "workspace": workspace,
                "stopped": stopped,
                "unregistered": unregistered,
                "purged": purged,
            })),
        ),
        Err(result) => result,
    }
}
