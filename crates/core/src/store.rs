//! Persistence of workspace `.env` files.

use std::collections::HashMap;
use std::io::ErrorKind;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Mutex;
use std::time::Duration;

use async_trait::async_trait;
use thiserror::Error;
use tokio::sync::RwLock;
use tokio::time::Instant;
use tracing::warn;

use crate::domain::workspace::WorkspaceId;

pub const ENV_FILE_NAME: &str = ".env";
const TEMP_FILE_NAME: &str = ".env.wsgate-tmp";
const LOCK_FILE_NAME: &str = ".env.wsgate-lock";
const LOCK_RETRY_INTERVAL: Duration = Duration::from_millis(50);
pub const DEFAULT_LOCK_WAIT: Duration = Duration::from_secs(180);

#[derive(Debug, Error)]
pub enum StoreError {
    #[error("no configuration at `{location}`")]
    NotFound { location: String },
    #[error("i/o failure at `{location}`: {source}")]
    Io {
        location: String,
        #[source]
        source: std::io::Error,
    },
    #[error("store rejected the operation: {0}")]
    Rejected(String),
    #[error("`{location}` is still held by another toggle after {waited_secs}s")]
    Locked { location: String, waited_secs: u64 },
}

/// Exclusive claim on one workspace configuration, released on drop.
#[derive(Debug)]
pub struct ConfigLock {
    path: Option<PathBuf>,
}

impl ConfigLock {
    /// A claim with nothing to release, for stores that live in a single process.
    pub fn unheld() -> Self {
        Self { path: None }
    }
}

impl Drop for ConfigLock {
    fn drop(&mut self) {
        let Some(path) = self.path.take() else {
            return;
        };
        if let Err(error) = std::fs::remove_file(&path) {
            if error.kind() != ErrorKind::NotFound {
                warn!(
                    event_name = "workspace.config.lock_release_failed",
                    path = %path.display(),
                    error = %error,
                    "could not remove workspace lock file"
                );
            }
        }
    }
}

#[async_trait]
pub trait WorkspaceConfigStore: Send + Sync {
    /// Human-readable location of the configuration, used in errors and logs.
    fn location(&self, workspace: &WorkspaceId) -> String;

    async fn read(&self, workspace: &WorkspaceId) -> Result<String, StoreError>;

    async fn write(&self, workspace: &WorkspaceId, contents: &str) -> Result<(), StoreError>;

    /// Claims the workspace for one read, write and restart cycle.
    async fn lock(&self, _workspace: &WorkspaceId) -> Result<ConfigLock, StoreError> {
        Ok(ConfigLock::unheld())
    }
}

/// Stores `<root>/<team_env>/.env`.
///
/// Locks are `<root>/<team_env>/.env.wsgate-lock` files created exclusively, so separate
/// processes toggling the same workspace wait for each other. A lock left behind by a
/// killed process has to be removed by hand.
#[derive(Clone, Debug)]
pub struct FsConfigStore {
    root: PathBuf,
    lock_wait: Duration,
}

impl FsConfigStore {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into(), lock_wait: DEFAULT_LOCK_WAIT }
    }

    pub fn with_lock_wait(mut self, lock_wait: Duration) -> Self {
        self.lock_wait = lock_wait;
        self
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    pub fn workspace_dir(&self, workspace: &WorkspaceId) -> PathBuf {
        self.root.join(workspace.as_str())
    }

    pub fn env_path(&self, workspace: &WorkspaceId) -> PathBuf {
        self.workspace_dir(workspace).join(ENV_FILE_NAME)
    }
}

#[async_trait]
impl WorkspaceConfigStore for FsConfigStore {
    fn location(&self, workspace: &WorkspaceId) -> String {
        self.env_path(workspace).display().to_string()
    }

    async fn read(&self, workspace: &WorkspaceId) -> Result<String, StoreError> {
        let path = self.env_path(workspace);
        tokio::fs::read_to_string(&path).await.map_err(|source| {
            let location = path.display().to_string();
            if source.kind() == ErrorKind::NotFound {
                StoreError::NotFound { location }
            } else {
                StoreError::Io { location, source }
            }
        })
    }

    async fn write(&self, workspace: &WorkspaceId, contents: &str) -> Result<(), StoreError> {
        let path = self.env_path(workspace);
        let temp = self.workspace_dir(workspace).join(TEMP_FILE_NAME);
        let io_error =
            |source: std::io::Error| StoreError::Io { location: path.display().to_string(), source };

        tokio::fs::write(&temp, contents).await.map_err(io_error)?;
        // The replacement keeps the mode of the file it replaces.
        let replaced = match tokio::fs::metadata(&path).await {
            Ok(metadata) => tokio::fs::set_permissions(&temp, metadata.permissions()).await,
            Err(_) => Ok(()),
        };
        if let Err(source) = replaced {
            let _ = tokio::fs::remove_file(&temp).await;
            return Err(io_error(source));
        }
        if let Err(source) = tokio::fs::rename(&temp, &path).await {
            let _ = tokio::fs::remove_file(&temp).await;
            return Err(io_error(source));
        }
        Ok(())
    }

    async fn lock(&self, workspace: &WorkspaceId) -> Result<ConfigLock, StoreError> {
        let path = self.workspace_dir(workspace).join(LOCK_FILE_NAME);
        let started = Instant::now();
        loop {
            let attempt =
                tokio::fs::OpenOptions::new().write(true).create_new(true).open(&path).await;
            match attempt {
                Ok(_) => return Ok(ConfigLock { path: Some(path) }),
                Err(source) if source.kind() == ErrorKind::AlreadyExists => {
                    if started.elapsed() >= self.lock_wait {
                        return Err(StoreError::Locked {
                            location: path.display().to_string(),
                            waited_secs: self.lock_wait.as_secs(),
                        });
                    }
                    tokio::time::sleep(LOCK_RETRY_INTERVAL).await;
                }
                Err(source) if source.kind() == ErrorKind::NotFound => {
                    return Err(StoreError::NotFound { location: self.location(workspace) });
                }
                Err(source) => {
                    return Err(StoreError::Io { location: path.display().to_string(), source });
                }
            }
        }
    }
}

/// In-process store with failure injection, for tests and dry runs.
#[derive(Default)]
pub struct InMemoryConfigStore {
    files: RwLock<HashMap<WorkspaceId, String>>,
    writes: AtomicUsize,
    successful_writes_left: Mutex<Option<usize>>,
    discard_writes: AtomicBool,
}

impl InMemoryConfigStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn insert(&self, workspace: WorkspaceId, contents: impl Into<String>) {
        self.files.write().await.insert(workspace, contents.into());
    }

    pub async fn contents(&self, workspace: &WorkspaceId) -> Option<String> {
        self.files.read().await.get(workspace).cloned()
    }

    /// Number of write attempts, successful or not.
    pub fn write_count(&self) -> usize {
        self.writes.load(Ordering::SeqCst)
    }

    /// Lets `successes` more writes through, then rejects every write after that.
    pub fn fail_writes_after(&self, successes: usize) {
        if let Ok(mut left) = self.successful_writes_left.lock() {
            *left = Some(successes);
        }
    }

    /// Acknowledges writes without storing them.
    pub fn discard_writes(&self) {
        self.discard_writes.store(true, Ordering::SeqCst);
    }

    fn take_write_permit(&self) -> bool {
        match self.successful_writes_left.lock() {
            Ok(mut left) => match left.as_mut() {
                None => true,
                Some(0) => false,
                Some(remaining) => {
                    *remaining -= 1;
                    true
                }
            },
            Err(_) => false,
        }
    }
}

#[async_trait]
impl WorkspaceConfigStore for InMemoryConfigStore {
    fn location(&self, workspace: &WorkspaceId) -> String {
        format!("memory://{workspace}/{ENV_FILE_NAME}")
    }

    async fn read(&self, workspace: &WorkspaceId) -> Result<String, StoreError> {
        self.files
            .read()
            .await
            .get(workspace)
            .cloned()
            .ok_or_else(|| StoreError::NotFound { location: self.location(workspace) })
    }

    async fn write(&self, workspace: &WorkspaceId, contents: &str) -> Result<(), StoreError> {
        self.writes.fetch_add(1, Ordering::SeqCst);
        if !self.take_write_permit() {
            return Err(StoreError::Rejected(format!("write to {} refused", self.location(workspace))));
        }
        if self.discard_writes.load(Ordering::SeqCst) {
            return Ok(());
        }
        self.files.write().await.insert(workspace.clone(), contents.to_string());
        Ok(())
    }
}
