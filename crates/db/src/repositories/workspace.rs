use chrono::{DateTime, Utc};
use sqlx::{sqlite::SqliteRow, Row};
use tracing::debug;

use wsgate_core::domain::workspace::{Environment, Namespace, Workspace, WorkspaceId};
use wsgate_core::provision::CheckStatus;

use super::{RegisteredWorkspace, RepositoryError, WorkspaceRepository};
use crate::DbPool;

const SELECT_COLUMNS: &str = "SELECT
        team_env,
        selection_key,
        team_name,
        environment,
        runtime,
        table_prefix,
        storage_prefix,
        host_port,
        container_port,
        repo_path,
        provisioning_checks,
        provisioned_at,
        created_at,
        updated_at
     FROM workspace_registry";

pub struct SqlWorkspaceRepository {
    pool: DbPool,
}

impl SqlWorkspaceRepository {
    pub fn new(pool: DbPool) -> Self {
        Self { pool }
    }
}

#[async_trait::async_trait]
impl WorkspaceRepository for SqlWorkspaceRepository {
    async fn upsert(
        &self,
        workspace: &Workspace,
        repo_path: &str,
    ) -> Result<RegisteredWorkspace, RepositoryError> {
        let now = Utc::now().to_rfc3339();
        sqlx::query(
            "INSERT INTO workspace_registry (
                team_env,
                selection_key,
                team_name,
                environment,
                runtime,
                table_prefix,
                storage_prefix,
                host_port,
                container_port,
                repo_path,
                provisioning_checks,
                provisioned_at,
                created_at,
                updated_at
             ) VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, NULL, ?, ?, ?)
             ON CONFLICT(team_env) DO UPDATE SET
                selection_key = excluded.selection_key,
                team_name = excluded.team_name,
                environment = excluded.environment,
                runtime = excluded.runtime,
                table_prefix = excluded.table_prefix,
                storage_prefix = excluded.storage_prefix,
                host_port = excluded.host_port,
                container_port = excluded.container_port,
                repo_path = excluded.repo_path,
                provisioning_checks = NULL,
                provisioned_at = excluded.provisioned_at,
                updated_at = excluded.updated_at",
        )
        .bind(workspace.id.as_str())
        .bind(workspace.selection_key)
        .bind(&workspace.team_name)
        .bind(workspace.environment.as_str())
        .bind(&workspace.runtime)
        .bind(&workspace.namespace.table_prefix)
        .bind(&workspace.namespace.storage_prefix)
        .bind(i64::from(workspace.host_port))
        .bind(i64::from(workspace.container_port))
        .bind(repo_path)
        .bind(workspace.provisioned_at.to_rfc3339())
        .bind(&now)
        .bind(&now)
        .execute(&self.pool)
        .await
        .map_err(|error| unique_violation_as_conflict(error, workspace))?;

        debug!(
            event_name = "registry.workspace.upserted",
            workspace = %workspace.id,
            host_port = workspace.host_port,
            "workspace registry row written"
        );

        self.find(&workspace.id).await?.ok_or_else(|| {
            RepositoryError::Decode(format!("workspace `{}` missing after upsert", workspace.id))
        })
    }

    async fn find(&self, id: &WorkspaceId) -> Result<Option<RegisteredWorkspace>, RepositoryError> {
        let row = sqlx::query(&format!("{SELECT_COLUMNS} WHERE team_env = ?"))
            .bind(id.as_str())
            .fetch_optional(&self.pool)
            .await?;

        row.map(registered_from_row).transpose()
    }

    async fn list(&self) -> Result<Vec<RegisteredWorkspace>, RepositoryError> {
        let rows = sqlx::query(&format!("{SELECT_COLUMNS} ORDER BY team_env ASC"))
            .fetch_all(&self.pool)
            .await?;

        rows.into_iter().map(registered_from_row).collect()
    }

    async fn delete(&self, id: &WorkspaceId) -> Result<bool, RepositoryError> {
        let result = sqlx::query("DELETE FROM workspace_registry WHERE team_env = ?")
            .bind(id.as_str())
            .execute(&self.pool)
            .await?;

        Ok(result.rows_affected() > 0)
    }

    async fn record_checks(
        &self,
        id: &WorkspaceId,
        status: CheckStatus,
    ) -> Result<bool, RepositoryError> {
        let result = sqlx::query(
            "UPDATE workspace_registry
             SET provisioning_checks = ?, updated_at = ?
             WHERE team_env = ?",
        )
        .bind(status.as_str())
        .bind(Utc::now().to_rfc3339())
        .bind(id.as_str())
        .execute(&self.pool)
        .await?;

        Ok(result.rows_affected() > 0)
    }
}

fn unique_violation_as_conflict(error: sqlx::Error, workspace: &Workspace) -> RepositoryError {
    match &error {
        sqlx::Error::Database(database) if database.is_unique_violation() => {
            RepositoryError::Conflict(format!(
                "workspace `{}` collides with a registered workspace: {}",
                workspace.id,
                database.message()
            ))
        }
        _ => RepositoryError::Database(error),
    }
}

fn registered_from_row(row: SqliteRow) -> Result<RegisteredWorkspace, RepositoryError> {
    let team_env: String = row.try_get("team_env")?;
    let id = WorkspaceId::parse(&team_env).map_err(|error| {
        RepositoryError::Decode(format!("invalid `team_env` `{team_env}`: {error}"))
    })?;
    let environment_raw: String = row.try_get("environment")?;
    let environment = Environment::parse(&environment_raw).map_err(|error| {
        RepositoryError::Decode(format!("invalid `environment` `{environment_raw}`: {error}"))
    })?;
    let provisioning_checks = row
        .try_get::<Option<String>, _>("provisioning_checks")?
        .map(|raw| {
            CheckStatus::parse(&raw).ok_or_else(|| {
                RepositoryError::Decode(format!("unknown provisioning check status `{raw}`"))
            })
        })
        .transpose()?;

    Ok(RegisteredWorkspace {
        workspace: Workspace {
            id,
            team_name: row.try_get("team_name")?,
            environment,
            selection_key: row.try_get("selection_key")?,
            runtime: row.try_get("runtime")?,
            namespace: Namespace {
                table_prefix: row.try_get("table_prefix")?,
                storage_prefix: row.try_get("storage_prefix")?,
            },
            host_port: parse_port("host_port", row.try_get("host_port")?)?,
            container_port: parse_port("container_port", row.try_get("container_port")?)?,
            provisioned_at: parse_timestamp("provisioned_at", row.try_get("provisioned_at")?)?,
        },
        repo_path: row.try_get("repo_path")?,
        provisioning_checks,
        created_at: parse_timestamp("created_at", row.try_get("created_at")?)?,
        updated_at: parse_timestamp("updated_at", row.try_get("updated_at")?)?,
    })
}

fn parse_port(column: &str, value: i64) -> Result<u16, RepositoryError> {
    u16::try_from(value).map_err(|_| {
        RepositoryError::Decode(format!("invalid value for `{column}` (expected port): {value}"))
    })
}

fn parse_timestamp(column: &str, value: String) -> Result<DateTime<Utc>, RepositoryError> {
    DateTime::parse_from_rfc3339(&value).map(|timestamp| timestamp.with_timezone(&Utc)).map_err(
        |error| {
            RepositoryError::Decode(format!("invalid timestamp in `{column}`: `{value}` ({error})"))
        },
    )
}
