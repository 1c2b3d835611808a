//! Process management for workspace compose projects.

use std::collections::HashMap;
use std::path::PathBuf;
use std::process::Stdio;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Mutex;
use std::time::Duration;

use async_trait::async_trait;
use thiserror::Error;
use tokio::process::Command;
use tracing::{debug, warn};

use crate::domain::workspace::WorkspaceId;

#[derive(Debug, Error)]
pub enum RuntimeError {
    #[error("could not launch `{program}`: {source}")]
    Spawn {
        program: String,
        #[source]
        source: std::io::Error,
    },
    #[error("`{command}` exited with {status}: {stderr}")]
    ExitStatus { command: String, status: String, stderr: String },
    #[error("`{command}` did not finish within {timeout_secs}s")]
    Timeout { command: String, timeout_secs: u64 },
    #[error("workspace directory `{0}` does not exist")]
    MissingDirectory(String),
    #[error("runtime refused the operation: {0}")]
    Refused(String),
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum RuntimeAction {
    Start,
    Restart,
    Teardown,
}

impl RuntimeAction {
    fn compose_args(self) -> &'static [&'static str] {
        match self {
            Self::Start => &["compose", "up", "-d"],
            // `compose restart` keeps the old container environment; recreate to pick up `.env`.
            Self::Restart => &["compose", "up", "-d", "--force-recreate"],
            Self::Teardown => &["compose", "down"],
        }
    }
}

#[async_trait]
pub trait WorkspaceRuntime: Send + Sync {
    async fn start(&self, workspace: &WorkspaceId) -> Result<(), RuntimeError>;

    async fn restart(&self, workspace: &WorkspaceId) -> Result<(), RuntimeError>;

    async fn teardown(&self, workspace: &WorkspaceId) -> Result<(), RuntimeError>;
}

/// Drives `<program> compose ...` inside `<root>/<team_env>`.
#[derive(Clone, Debug)]
pub struct ComposeRuntime {
    root: PathBuf,
    program: String,
    timeout: Duration,
}

impl ComposeRuntime {
    pub fn new(root: impl Into<PathBuf>, program: impl Into<String>, timeout: Duration) -> Self {
        Self { root: root.into(), program: program.into(), timeout }
    }

    async fn run(&self, workspace: &WorkspaceId, action: RuntimeAction) -> Result<(), RuntimeError> {
        let dir = self.root.join(workspace.as_str());
        if !dir.is_dir() {
            return Err(RuntimeError::MissingDirectory(dir.display().to_string()));
        }

        let args = action.compose_args();
        let command = format!("{} {}", self.program, args.join(" "));
        debug!(
            event_name = "workspace.runtime.exec",
            workspace = %workspace,
            command = %command,
            "running compose command"
        );

        let mut compose = Command::new(&self.program);
        compose
            .args(args)
            .current_dir(&dir)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true);

        let output = match tokio::time::timeout(self.timeout, compose.output()).await {
            Ok(result) => result
                .map_err(|source| RuntimeError::Spawn { program: self.program.clone(), source })?,
            Err(_) => {
                return Err(RuntimeError::Timeout {
                    command,
                    timeout_secs: self.timeout.as_secs(),
                })
            }
        };

        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr).trim().to_string();
            warn!(
                event_name = "workspace.runtime.exit_failure",
                workspace = %workspace,
                command = %command,
                status = %output.status,
                "compose command failed"
            );
            return Err(RuntimeError::ExitStatus {
                command,
                status: output.status.to_string(),
                stderr,
            });
        }

        Ok(())
    }
}

#[async_trait]
impl WorkspaceRuntime for ComposeRuntime {
    async fn start(&self, workspace: &WorkspaceId) -> Result<(), RuntimeError> {
        self.run(workspace, RuntimeAction::Start).await
    }

    async fn restart(&self, workspace: &WorkspaceId) -> Result<(), RuntimeError> {
        self.run(workspace, RuntimeAction::Restart).await
    }

    async fn teardown(&self, workspace: &WorkspaceId) -> Result<(), RuntimeError> {
        self.run(workspace, RuntimeAction::Teardown).await
    }
}

/// Counts invocations per workspace; optionally fails every call.
#[derive(Default)]
pub struct RecordingRuntime {
    calls: Mutex<HashMap<(WorkspaceId, RuntimeAction), usize>>,
    failing: AtomicBool,
}

impl RecordingRuntime {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn set_failing(&self, failing: bool) {
        self.failing.store(failing, Ordering::SeqCst);
    }

    pub fn count(&self, workspace: &WorkspaceId, action: RuntimeAction) -> usize {
        self.calls
            .lock()
            .map(|calls| calls.get(&(workspace.clone(), action)).copied().unwrap_or(0))
            .unwrap_or(0)
    }

    pub fn restarts(&self, workspace: &WorkspaceId) -> usize {
        self.count(workspace, RuntimeAction::Restart)
    }

    fn record(&self, workspace: &WorkspaceId, action: RuntimeAction) -> Result<(), RuntimeError> {
        if let Ok(mut calls) = self.calls.lock() {
            *calls.entry((workspace.clone(), action)).or_default() += 1;
        }
        if self.failing.load(Ordering::SeqCst) {
            return Err(RuntimeError::Refused(format!("{action:?} of {workspace} refused")));
        }
        Ok(())
    }
}

#[async_trait]
impl WorkspaceRuntime for RecordingRuntime {
    async fn start(&self, workspace: &WorkspaceId) -> Result<(), RuntimeError> {
        self.record(workspace, RuntimeAction::Start)
    }

    async fn restart(&self, workspace: &WorkspaceId) -> Result<(), RuntimeError> {
        self.record(workspace, RuntimeAction::Restart)
    }

    async fn teardown(&self, workspace: &WorkspaceId) -> Result<(), RuntimeError> {
        self.record(workspace, RuntimeAction::Teardown)
    }
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use tempfile::TempDir;

    use super::{ComposeRuntime, RecordingRuntime, RuntimeAction, RuntimeError, WorkspaceRuntime};
    use crate::domain::workspace::WorkspaceId;

    fn workspace() -> WorkspaceId {
        WorkspaceId::parse("team_1_dev").expect("valid workspace id")
    }

    #[tokio::test]
    async fn compose_runtime_requires_workspace_directory() {
        let dir = TempDir::new().expect("tempdir");
        let runtime = ComposeRuntime::new(dir.path(), "docker", Duration::from_secs(5));

        let error = runtime.restart(&workspace()).await.expect_err("missing directory");
        assert!(matches!(error, RuntimeError::MissingDirectory(_)));
    }

    #[tokio::test]
    async fn compose_runtime_reports_unknown_program_as_spawn_failure() {
        let dir = TempDir::new().expect("tempdir");
        std::fs::create_dir_all(dir.path().join("team_1_dev")).expect("workspace dir");
        let runtime = ComposeRuntime::new(
            dir.path(),
            "wsgate-definitely-not-a-real-binary",
            Duration::from_secs(5),
        );

        let error = runtime.restart(&workspace()).await.expect_err("spawn failure");
        assert!(matches!(error, RuntimeError::Spawn { .. }));
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn compose_runtime_maps_non_zero_exit() {
        let dir = TempDir::new().expect("tempdir");
        std::fs::create_dir_all(dir.path().join("team_1_dev")).expect("workspace dir");
        let runtime = ComposeRuntime::new(dir.path(), "false", Duration::from_secs(5));

        let error = runtime.teardown(&workspace()).await.expect_err("non-zero exit");
        assert!(matches!(error, RuntimeError::ExitStatus { ref command, .. } if command == "false compose down"));
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn compose_runtime_restart_recreates_containers() {
        let dir = TempDir::new().expect("tempdir");
        std::fs::create_dir_all(dir.path().join("team_1_dev")).expect("workspace dir");
        let runtime = ComposeRuntime::new(dir.path(), "false", Duration::from_secs(5));

        let error = runtime.restart(&workspace()).await.expect_err("non-zero exit");
        assert!(matches!(
            error,
            RuntimeError::ExitStatus { ref command, .. }
                if command == "false compose up -d --force-recreate"
        ));
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn compose_runtime_times_out_slow_commands() {
        use std::os::unix::fs::PermissionsExt;

        let dir = TempDir::new().expect("tempdir");
        std::fs::create_dir_all(dir.path().join("team_1_dev")).expect("workspace dir");
        let program = dir.path().join("slow-compose");
        std::fs::write(&program, "#!/bin/sh\nsleep 5\n").expect("write script");
        std::fs::set_permissions(&program, std::fs::Permissions::from_mode(0o755))
            .expect("chmod script");
        let runtime =
            ComposeRuntime::new(dir.path(), program.display().to_string(), Duration::from_secs(1));

        let started = std::time::Instant::now();
        let error = runtime.restart(&workspace()).await.expect_err("timeout");

        assert!(matches!(error, RuntimeError::Timeout { timeout_secs: 1, .. }));
        assert!(started.elapsed() < Duration::from_secs(4));
    }

    #[tokio::test]
    async fn recording_runtime_counts_per_action() {
        let runtime = RecordingRuntime::new();
        let id = workspace();

        runtime.restart(&id).await.expect("restart");
        runtime.restart(&id).await.expect("restart");
        runtime.set_failing(true);
        assert!(runtime.start(&id).await.is_err());

        assert_eq!(runtime.restarts(&id), 2);
        assert_eq!(runtime.count(&id, RuntimeAction::Start), 1);
        assert_eq!(runtime.count(&id, RuntimeAction::Teardown), 0);
    }
}
