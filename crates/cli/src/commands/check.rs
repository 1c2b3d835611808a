use wsgate_core::provision::{run_checks, CheckStatus};
use wsgate_db::{SqlWorkspaceRepository, WorkspaceRepository};

use crate::commands::{
    async_runtime, load_config, parse_workspace, registry, registry_failure, to_details,
    CommandResult, EXIT_CHECKS_FAILED,
};

const COMMAND: &str = "check";

/// Runs the provisioning checks and records the result when the workspace is registered.
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

    let report = run_checks(&workspace, &config.workspaces.root.join(workspace.as_str()));

    let recorded = runtime.block_on(async {
        let pool = registry(COMMAND, &config).await?;
        let recorded = SqlWorkspaceRepository::new(pool.clone())
            .record_checks(&workspace, report.status)
            .await
            .map_err(|error| registry_failure(COMMAND, error))?;
        pool.close().await;
        Ok::<_, CommandResult>(recorded)
    });
    if let Err(result) = recorded {
        return result;
    }

    match report.status {
        CheckStatus::Pass => CommandResult::success_with_details(
            COMMAND,
            format!("workspace `{workspace}` passed provisioning checks"),
            to_details(&report),
        ),
        CheckStatus::Fail => CommandResult::failure_with_details(
            COMMAND,
            "checks_failed",
            format!(
                "workspace `{workspace}` failed provisioning checks ({} missing)",
                report.missing.len()
            ),
            EXIT_CHECKS_FAILED,
            to_details(&report),
        ),
    }
}
