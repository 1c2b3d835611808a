use std::path::Path;

use chrono::Utc;
use serde_json::json;
use tracing::{info, warn};
use wsgate_core::errors::DomainError;
use wsgate_core::provision::{
    plan, run_checks, scaffold, CheckStatus, ProvisionError, ProvisionRequest, ScaffoldOptions,
};
use wsgate_core::{Workspace, WorkspaceRuntime};
use wsgate_db::{RegisteredWorkspace, RepositoryError, SqlWorkspaceRepository, WorkspaceRepository};

use crate::commands::toggle::compose_runtime;
use crate::commands::{
    async_runtime, load_config, registry, registry_failure, CommandResult, EXIT_CHECKS_FAILED,
    EXIT_CONFIG, EXIT_NAMESPACE_COLLISION, EXIT_RESTART_FAILED, EXIT_SCAFFOLD,
};

const COMMAND: &str = "provision";

#[derive(Clone, Debug)]
pub struct ProvisionArgs {
    pub selection_key: i64,
    pub team: String,
    pub environment: String,
    pub runtime: String,
    pub host_port: Option<u16>,
    /// Run `compose up -d` once the files are in place.
    pub up: bool,
}

pub fn run(args: ProvisionArgs) -> CommandResult {
    let config = match load_config(COMMAND) {
        Ok(config) => config,
        Err(result) => return result,
    };
    let runtime = match async_runtime(COMMAND) {
        Ok(runtime) => runtime,
        Err(result) => return result,
    };

    let request = ProvisionRequest {
        selection_key: args.selection_key,
        team_name: args.team,
        environment: args.environment,
        runtime: args.runtime,
        host_port: args.host_port,
    };

    let result = runtime.block_on(async {
        let pool = registry(COMMAND, &config).await?;
        let repo = SqlWorkspaceRepository::new(pool.clone());
        let existing: Vec<_> = repo
            .list()
            .await
            .map_err(|error| registry_failure(COMMAND, error))?
            .into_iter()
            .map(|row| row.workspace)
            .collect();

        let plan = plan(&request, &existing, Utc::now()).map_err(provision_failure)?;
        let workspace = &plan.workspace;
        let options = ScaffoldOptions {
            gateway_host_url: config.gateway.host_url.clone(),
            gateway_container_url: config.gateway.container_url.clone(),
        };
        let dir_existed = config.workspaces.root.join(workspace.id.as_str()).exists();
        let scaffolded =
            scaffold(workspace, &config.workspaces.root, &options).map_err(provision_failure)?;

        let registered =
            register(&repo, workspace, &config.workspaces.root, &scaffolded.dir, !dir_existed)
                .await?;

        let checks = run_checks(&workspace.id, &scaffolded.dir);
        repo.record_checks(&workspace.id, checks.status)
            .await
            .map_err(|error| registry_failure(COMMAND, error))?;
        pool.close().await;

        info!(
            event_name = "workspace.provision.registered",
            workspace = %workspace.id,
            host_port = workspace.host_port,
            checks = checks.status.as_str(),
            "workspace provisioned"
        );

        let started = if args.up && checks.status == CheckStatus::Pass {
            compose_runtime(&config).start(&workspace.id).await.map_err(|error| {
                CommandResult::failure(
                    COMMAND,
                    "runtime_start",
                    format!("workspace `{}` was provisioned but did not start: {error}", workspace.id),
                    EXIT_RESTART_FAILED,
                )
            })?;
            true
        } else {
            false
        };

        Ok::<_, CommandResult>((plan, registered.repo_path, scaffolded, checks, started))
    });

    let (plan, repo_path, scaffolded, checks, started) = match result {
        Ok(parts) => parts,
        Err(result) => return result,
    };

    let details = json!({
        "plan": plan.kind,
        "workspace": plan.workspace,
        "repo_path": repo_path,
        "scaffold": scaffolded,
        "checks": checks,
        "started": started,
    });

    if checks.status == CheckStatus::Fail {
        return CommandResult::failure_with_details(
            COMMAND,
            "checks_failed",
            format!("workspace `{}` provisioned but checks failed", plan.workspace.id),
            EXIT_CHECKS_FAILED,
            Some(details),
        );
    }

    CommandResult::success_with_details(
        COMMAND,
        format!(
            "workspace `{}` provisioned on host port {}",
            plan.workspace.id, plan.workspace.host_port
        ),
        Some(details),
    )
}

/// Writes the registry row. A workspace directory created by this run is removed again when
/// the registry refuses the row.
async fn register<R: WorkspaceRepository>(
    repo: &R,
    workspace: &Workspace,
    root: &Path,
    dir: &Path,
    dir_created: bool,
) -> Result<RegisteredWorkspace, CommandResult> {
    let error = match repo.upsert(workspace, &workspace.repo_path(root)).await {
        Ok(registered) => return Ok(registered),
        Err(error) => error,
    };

    if dir_created {
        if let Err(cleanup) = tokio::fs::remove_dir_all(dir).await {
            warn!(
                event_name = "workspace.provision.cleanup_failed",
                workspace = %workspace.id,
                dir = %dir.display(),
                error = %cleanup,
                "could not remove scaffold of unregistered workspace"
            );
        }
    }

    Err(match error {
        RepositoryError::Conflict(message) => CommandResult::failure(
            COMMAND,
            "namespace_collision",
            message,
            EXIT_NAMESPACE_COLLISION,
        ),
        other => registry_failure(COMMAND, other),
    })
}

fn provision_failure(error: ProvisionError) -> CommandResult {
    match &error {
        ProvisionError::Domain(DomainError::NamespaceCollision { .. }) => CommandResult::failure(
            COMMAND,
            "namespace_collision",
            error.to_string(),
            EXIT_NAMESPACE_COLLISION,
        ),
        ProvisionError::Domain(_) => {
            CommandResult::failure(COMMAND, "invalid_request", error.to_string(), EXIT_CONFIG)
        }
        _ => CommandResult::failure(COMMAND, "scaffold", error.to_string(), EXIT_SCAFFOLD),
    }
}

#[cfg(test)]
mod tests {
    use chrono::Utc;
    use tempfile::TempDir;
    use wsgate_core::{Environment, Workspace};
    use wsgate_db::{InMemoryWorkspaceRepository, WorkspaceRepository};

    use super::register;
    use crate::commands::EXIT_NAMESPACE_COLLISION;

    fn workspace(team: &str, host_port: u16) -> Workspace {
        let environment = Environment::parse("dev").expect("valid environment");
        Workspace::derive(team, environment, 4, "python", host_port, Utc::now())
    }

    #[tokio::test]
    async fn refused_registration_removes_freshly_created_directory() {
        let root = TempDir::new().expect("tempdir");
        let repo = InMemoryWorkspaceRepository::default();
        let ops = workspace("Ops", 8510);
        repo.upsert(&ops, &ops.repo_path(root.path())).await.expect("seed ops");

        let finance = workspace("Finance", 8510);
        let dir = root.path().join(finance.id.as_str());
        std::fs::create_dir_all(&dir).expect("scaffold dir");

        let result = register(&repo, &finance, root.path(), &dir, true).await;

        let failure = result.expect_err("port already registered");
        assert_eq!(failure.exit_code, EXIT_NAMESPACE_COLLISION);
        assert!(!dir.exists());
    }

    #[tokio::test]
    async fn refused_registration_keeps_preexisting_directory() {
        let root = TempDir::new().expect("tempdir");
        let repo = InMemoryWorkspaceRepository::default();
        let ops = workspace("Ops", 8510);
        repo.upsert(&ops, &ops.repo_path(root.path())).await.expect("seed ops");

        let finance = workspace("Finance", 8510);
        let dir = root.path().join(finance.id.as_str());
        std::fs::create_dir_all(&dir).expect("existing dir");
        std::fs::write(dir.join(".env"), "KEEP=1\n").expect("existing env");

        assert!(register(&repo, &finance, root.path(), &dir, false).await.is_err());
        assert_eq!(std::fs::read_to_string(dir.join(".env")).expect("env"), "KEEP=1\n");
    }

    #[tokio::test]
    async fn registration_records_path_under_workspaces_root() {
        let root = TempDir::new().expect("tempdir");
        let repo = InMemoryWorkspaceRepository::default();
        let ops = workspace("Ops", 8510);
        let dir = root.path().join(ops.id.as_str());

        let registered = register(&repo, &ops, root.path(), &dir, true).await.expect("register");

        assert_eq!(registered.repo_path, dir.display().to_string());
    }
}
