use serde::Serialize;
use wsgate_core::provision::CheckStatus;
use wsgate_db::{RegisteredWorkspace, SqlWorkspaceRepository, WorkspaceRepository};

use crate::commands::toggle::gateway_toggle;
use crate::commands::{
    async_runtime, load_config, registry, registry_failure, to_details, CommandResult,
};

const COMMAND: &str = "list";

#[derive(Debug, Serialize)]
struct ListedWorkspace {
    team_env: String,
    team_name: String,
    environment: String,
    runtime: String,
    host_port: u16,
    table_prefix: String,
    storage_prefix: String,
    repo_path: String,
    provisioning_checks: Option<CheckStatus>,
    /// `unknown` when the `.env` cannot be read.
    gateway: String,
}

pub fn run() -> CommandResult {
    let config = match load_config(COMMAND) {
        Ok(config) => config,
        Err(result) => return result,
    };
    let runtime = match async_runtime(COMMAND) {
        Ok(runtime) => runtime,
        Err(result) => return result,
    };

    let result = runtime.block_on(async {
        let pool = registry(COMMAND, &config).await?;
        let rows = SqlWorkspaceRepository::new(pool.clone())
            .list()
            .await
            .map_err(|error| registry_failure(COMMAND, error))?;
        pool.close().await;

        let toggle = gateway_toggle(&config);
        let mut listed = Vec::with_capacity(rows.len());
        for row in rows {
            let gateway = match toggle.status(&row.workspace.id).await {
                Ok(link) => link.label().to_string(),
                Err(_) => "unknown".to_string(),
            };
            listed.push(listed_workspace(row, gateway));
        }
        Ok::<_, CommandResult>(listed)
    });

    match result {
        Ok(listed) => CommandResult::success_with_details(
            COMMAND,
            format!("{} registered workspace(s)", listed.len()),
            to_details(&listed),
        ),
        Err(result) => result,
    }
}

fn listed_workspace(row: RegisteredWorkspace, gateway: String) -> ListedWorkspace {
    let workspace = row.workspace;
    ListedWorkspace {
        team_env: workspace.id.to_string(),
        team_name: workspace.team_name,
        environment: workspace.environment.to_string(),
        runtime: workspace.runtime,
        host_port: workspace.host_port,
        table_prefix: workspace.namespace.table_prefix,
        storage_prefix: workspace.namespace.storage_prefix,
        repo_path: row.repo_path,
        provisioning_checks: row.provisioning_checks,
        gateway,
    }
}
