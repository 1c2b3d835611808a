use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::Serialize;
use thiserror::Error;

use wsgate_core::domain::workspace::{Workspace, WorkspaceId};
use wsgate_core::provision::CheckStatus;

pub mod memory;
pub mod workspace;

pub use memory::InMemoryWorkspaceRepository;
pub use workspace::SqlWorkspaceRepository;

#[derive(Debug, Error)]
pub enum RepositoryError {
    #[error("database error: {0}")]
    Database(#[from] sqlx::Error),
    #[error("decode error: {0}")]
    Decode(String),
    #[error("registry conflict: {0}")]
    Conflict(String),
}

/// Registry row: the workspace plus bookkeeping the domain type does not carry.
#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct RegisteredWorkspace {
    #[serde(flatten)]
    pub workspace: Workspace,
    pub repo_path: String,
    pub provisioning_checks: Option<CheckStatus>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

#[async_trait]
pub trait WorkspaceRepository: Send + Sync {
    /// Inserts or replaces the row keyed by `team_env`. Resets the recorded check status.
    async fn upsert(
        &self,
        workspace: &Workspace,
        repo_path: &str,
    ) -> Result<RegisteredWorkspace, RepositoryError>;
    async fn find(&self, id: &WorkspaceId) -> Result<Option<RegisteredWorkspace>, RepositoryError>;
    /// Ordered by `team_env`.
    async fn list(&self) -> Result<Vec<RegisteredWorkspace>, RepositoryError>;
    async fn delete(&self, id: &WorkspaceId) -> Result<bool, RepositoryError>;
    async fn record_checks(
        &self,
        id: &WorkspaceId,
        status: CheckStatus,
    ) -> Result<bool, RepositoryError>;
}
