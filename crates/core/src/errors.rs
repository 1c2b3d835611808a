use std::fmt;

use serde::Serialize;
use thiserror::Error;

#[derive(Clone, Debug, Error, PartialEq, Eq)]
pub enum DomainError {
    #[error("invalid {kind} `{value}`: expected {expected}")]
    InvalidIdentifier { kind: &'static str, value: String, expected: String },
    #[error("namespace collision on {field} `{value}`: already held by workspace `{holder}`")]
    NamespaceCollision { field: &'static str, value: String, holder: String },
    #[error("domain invariant violation: {0}")]
    InvariantViolation(String),
}

/// Failures surfaced by `enable`/`disable`. None of them are recovered silently.
#[derive(Debug, Error)]
pub enum ToggleError {
    #[error("workspace `{workspace}` not found: no configuration at `{location}`")]
    WorkspaceNotFound { workspace: String, location: String },
    #[error(transparent)]
    ConfigWrite(#[from] ConfigWriteError),
    #[error(transparent)]
    RestartFailed(#[from] RestartFailedError),
}

impl ToggleError {
    pub fn error_class(&self) -> &'static str {
        match self {
            Self::WorkspaceNotFound { .. } => "workspace_not_found",
            Self::ConfigWrite(_) => "config_write",
            Self::RestartFailed(_) => "restart_failed",
        }
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum WritePhase {
    Lock,
    Read,
    Write,
    Verify,
}

impl fmt::Display for WritePhase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::Lock => "lock",
            Self::Read => "read",
            Self::Write => "write",
            Self::Verify => "verify",
        })
    }
}

#[derive(Debug, Error)]
#[error("could not {phase} configuration of workspace `{workspace}` at `{location}`: {reason}")]
pub struct ConfigWriteError {
    pub workspace: String,
    pub location: String,
    pub phase: WritePhase,
    pub reason: String,
}

/// What happened to the `.env` after the runtime refused to restart.
#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
#[serde(tag = "outcome", content = "reason", rename_all = "snake_case")]
pub enum RollbackOutcome {
    NotNeeded,
    Restored,
    Failed(String),
}

impl fmt::Display for RollbackOutcome {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::NotNeeded => f.write_str("not needed"),
            Self::Restored => f.write_str("previous configuration restored"),
            Self::Failed(reason) => write!(f, "failed: {reason}"),
        }
    }
}

#[derive(Debug, Error)]
#[error("workspace `{workspace}` failed to restart: {reason} (config rollback: {rollback})")]
pub struct RestartFailedError {
    pub workspace: String,
    pub reason: String,
    pub rollback: RollbackOutcome,
}
