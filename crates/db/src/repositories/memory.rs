use std::collections::BTreeMap;

use chrono::Utc;
use tokio::sync::RwLock;

use wsgate_core::domain::workspace::{Workspace, WorkspaceId};
use wsgate_core::provision::CheckStatus;

use super::{RegisteredWorkspace, RepositoryError, WorkspaceRepository};

/// Mirrors the uniqueness constraints of the `workspace_registry` table.
#[derive(Default)]
pub struct InMemoryWorkspaceRepository {
    rows: RwLock<BTreeMap<WorkspaceId, RegisteredWorkspace>>,
}

#[async_trait::async_trait]
impl WorkspaceRepository for InMemoryWorkspaceRepository {
    async fn upsert(
        &self,
        workspace: &Workspace,
        repo_path: &str,
    ) -> Result<RegisteredWorkspace, RepositoryError> {
        let mut rows = self.rows.write().await;

        if let Some(holder) = rows.values().find(|row| {
            let other = &row.workspace;
            other.id != workspace.id
                && (other.host_port == workspace.host_port
                    || other.namespace.table_prefix == workspace.namespace.table_prefix
                    || other.namespace.storage_prefix == workspace.namespace.storage_prefix)
        }) {
            return Err(RepositoryError::Conflict(format!(
                "workspace `{}` collides with registered workspace `{}`",
                workspace.id, holder.workspace.id
            )));
        }

        let now = Utc::now();
        let created_at = rows.get(&workspace.id).map(|row| row.created_at).unwrap_or(now);
        let row = RegisteredWorkspace {
            workspace: workspace.clone(),
            repo_path: repo_path.to_string(),
            provisioning_checks: None,
            created_at,
            updated_at: now,
        };
        rows.insert(workspace.id.clone(), row.clone());
        Ok(row)
    }

    async fn find(&self, id: &WorkspaceId) -> Result<Option<RegisteredWorkspace>, RepositoryError> {
        let rows = self.rows.read().await;
        Ok(rows.get(id).cloned())
    }

    async fn list(&self) -> Result<Vec<RegisteredWorkspace>, RepositoryError> {
        let rows = self.rows.read().await;
        Ok(rows.values().cloned().collect())
    }

    async fn delete(&self, id: &WorkspaceId) -> Result<bool, RepositoryError> {
        let mut rows = self.rows.write().await;
        Ok(rows.remove(id).is_some())
    }

    async fn record_checks(
        &self,
        id: &WorkspaceId,
        status: CheckStatus,
    ) -> Result<bool, RepositoryError> {
        let mut rows = self.rows.write().await;
        match rows.get_mut(id) {
            Some(row) => {
                row.provisioning_checks = Some(status);
                row.updated_at = Utc::now();
                Ok(true)
            }
            None => Ok(false),
        }
    }
}
