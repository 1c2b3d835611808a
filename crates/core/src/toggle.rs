//! Attach a workspace to, or isolate it from, the Central Gateway.
//!
//! A toggle is one logical transaction: read the `.env`, write the new link (only if the
//! content changes), verify the write by reading it back, restart the workspace. When the
//! restart fails the previous `.env` bytes are written back and the outcome of that
//! rollback is part of the returned error. The running process is not restarted again
//! after a rollback, so until the next successful restart it may not match the file.
//!
//! Calls for the same workspace are serialised for the whole transaction: in process by a
//! per-workspace mutex, across processes by the store's lock.

use std::collections::HashMap;
use std::sync::Arc;

use chrono::{DateTime, Utc};
use serde::Serialize;
use tokio::sync::{Mutex, OwnedMutexGuard};
use tracing::{error, info, warn};
use uuid::Uuid;

use crate::domain::gateway::GatewayLink;
use crate::domain::workspace::WorkspaceId;
use crate::envfile::EnvFile;
use crate::errors::{ConfigWriteError, RestartFailedError, RollbackOutcome, ToggleError, WritePhase};
use crate::runtime::WorkspaceRuntime;
use crate::store::{ConfigLock, StoreError, WorkspaceConfigStore};

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ToggleAction {
    Enable,
    Disable,
}

impl ToggleAction {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Enable => "enable",
            Self::Disable => "disable",
        }
    }
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct ToggleOutcome {
    pub operation_id: Uuid,
    pub workspace: WorkspaceId,
    pub action: ToggleAction,
    pub previous: GatewayLink,
    pub current: GatewayLink,
    pub config_changed: bool,
    pub restarted_at: DateTime<Utc>,
}

#[derive(Default)]
struct WorkspaceLocks {
    inner: Mutex<HashMap<WorkspaceId, Arc<Mutex<()>>>>,
}

impl WorkspaceLocks {
    async fn acquire(&self, workspace: &WorkspaceId) -> OwnedMutexGuard<()> {
        let lock = {
            let mut locks = self.inner.lock().await;
            Arc::clone(locks.entry(workspace.clone()).or_default())
        };
        lock.lock_owned().await
    }
}

pub struct GatewayToggle<S, R> {
    store: S,
    runtime: R,
    gateway_url: String,
    locks: WorkspaceLocks,
}

impl<S, R> GatewayToggle<S, R>
where
    S: WorkspaceConfigStore,
    R: WorkspaceRuntime,
{
    /// `gateway_url` is the address written into `.env`, as seen from inside the container.
    pub fn new(store: S, runtime: R, gateway_url: impl Into<String>) -> Self {
        Self { store, runtime, gateway_url: gateway_url.into(), locks: WorkspaceLocks::default() }
    }

    pub fn store(&self) -> &S {
        &self.store
    }

    pub fn runtime(&self) -> &R {
        &self.runtime
    }

    pub fn gateway_url(&self) -> &str {
        &self.gateway_url
    }

    pub async fn enable(&self, workspace: &WorkspaceId) -> Result<ToggleOutcome, ToggleError> {
        self.apply(workspace, ToggleAction::Enable).await
    }

    pub async fn disable(&self, workspace: &WorkspaceId) -> Result<ToggleOutcome, ToggleError> {
        self.apply(workspace, ToggleAction::Disable).await
    }

    pub async fn status(&self, workspace: &WorkspaceId) -> Result<GatewayLink, ToggleError> {
        let contents = self.read(workspace).await?;
        Ok(GatewayLink::from_env_file(&EnvFile::parse(&contents)))
    }

    async fn apply(
        &self,
        workspace: &WorkspaceId,
        action: ToggleAction,
    ) -> Result<ToggleOutcome, ToggleError> {
        let operation_id = Uuid::new_v4();
        let desired = match action {
            ToggleAction::Enable => GatewayLink::enabled(self.gateway_url.clone()),
            ToggleAction::Disable => GatewayLink::Disabled,
        };

        let _guard = self.locks.acquire(workspace).await;
        let _claim = self.claim(workspace).await?;
        info!(
            event_name = "workspace.gateway.toggle.start",
            correlation_id = %operation_id,
            workspace = %workspace,
            action = action.as_str(),
            "gateway toggle started"
        );

        let original = self.read(workspace).await?;
        let mut env = EnvFile::parse(&original);
        let previous = GatewayLink::from_env_file(&env);
        desired.apply_to(&mut env);
        let rendered = env.render();
        let config_changed = rendered != original;

        if config_changed {
            self.store
                .write(workspace, &rendered)
                .await
                .map_err(|source| self.write_error(workspace, WritePhase::Write, source.to_string()))?;
        }

        if let Err(reason) = self.verify(workspace, &desired).await {
            let rollback = self.rollback(workspace, &original, config_changed).await;
            warn!(
                event_name = "workspace.gateway.toggle.verify_failed",
                correlation_id = %operation_id,
                workspace = %workspace,
                rollback = %rollback,
                "configuration did not read back as written"
            );
            return Err(self
                .write_error(workspace, WritePhase::Verify, format!("{reason} (rollback: {rollback})"))
                .into());
        }

        if let Err(restart_error) = self.runtime.restart(workspace).await {
            let rollback = self.rollback(workspace, &original, config_changed).await;
            error!(
                event_name = "workspace.gateway.toggle.restart_failed",
                correlation_id = %operation_id,
                workspace = %workspace,
                error = %restart_error,
                rollback = %rollback,
                "workspace restart failed"
            );
            return Err(RestartFailedError {
                workspace: workspace.to_string(),
                reason: restart_error.to_string(),
                rollback,
            }
            .into());
        }

        info!(
            event_name = "workspace.gateway.toggle.completed",
            correlation_id = %operation_id,
            workspace = %workspace,
            action = action.as_str(),
            gateway = desired.label(),
            config_changed,
            "gateway toggle applied and workspace restarted"
        );

        Ok(ToggleOutcome {
            operation_id,
            workspace: workspace.clone(),
            action,
            previous,
            current: desired,
            config_changed,
            restarted_at: Utc::now(),
        })
    }

    async fn claim(&self, workspace: &WorkspaceId) -> Result<ConfigLock, ToggleError> {
        self.store.lock(workspace).await.map_err(|error| match error {
            StoreError::NotFound { location } => {
                ToggleError::WorkspaceNotFound { workspace: workspace.to_string(), location }
            }
            other => self.write_error(workspace, WritePhase::Lock, other.to_string()).into(),
        })
    }

    async fn read(&self, workspace: &WorkspaceId) -> Result<String, ToggleError> {
        self.store.read(workspace).await.map_err(|error| match error {
            StoreError::NotFound { location } => {
                ToggleError::WorkspaceNotFound { workspace: workspace.to_string(), location }
            }
            other => self.write_error(workspace, WritePhase::Read, other.to_string()).into(),
        })
    }

    async fn verify(&self, workspace: &WorkspaceId, desired: &GatewayLink) -> Result<(), String> {
        let stored = self.store.read(workspace).await.map_err(|error| error.to_string())?;
        let actual = GatewayLink::from_env_file(&EnvFile::parse(&stored));
        if &actual != desired {
            return Err(format!("expected gateway {}, found {}", desired.label(), actual.label()));
        }
        Ok(())
    }

    async fn rollback(
        &self,
        workspace: &WorkspaceId,
        original: &str,
        config_changed: bool,
    ) -> RollbackOutcome {
        if !config_changed {
            return RollbackOutcome::NotNeeded;
        }
        match self.store.write(workspace, original).await {
            Ok(()) => RollbackOutcome::Restored,
            Err(error) => RollbackOutcome::Failed(error.to_string()),
        }
    }

    fn write_error(
        &self,
        workspace: &WorkspaceId,
        phase: WritePhase,
        reason: String,
    ) -> ConfigWriteError {
        ConfigWriteError {
            workspace: workspace.to_string(),
            location: self.store.location(workspace),
            phase,
            reason,
        }
    }
}
