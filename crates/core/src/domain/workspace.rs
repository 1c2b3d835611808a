use std::fmt;
use std::path::Path;
use std::str::FromStr;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::errors::DomainError;
use crate::naming;

/// `team_env` slug identifying one workspace.
#[derive(Clone, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct WorkspaceId(String);

impl WorkspaceId {
    pub fn parse(value: &str) -> Result<Self, DomainError> {
        let value = value.trim();
        if !naming::is_valid_slug(value) || naming::split_team_env(value).is_none() {
            return Err(DomainError::InvalidIdentifier {
                kind: "workspace",
                value: value.to_string(),
                expected: "lowercase `<team>_<env>` slug".to_string(),
            });
        }
        Ok(Self(value.to_string()))
    }

    pub fn from_parts(team_name: &str, environment: &Environment) -> Self {
        Self(naming::team_env_slug(team_name, environment.as_str()))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for WorkspaceId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl FromStr for WorkspaceId {
    type Err = DomainError;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        Self::parse(value)
    }
}

impl TryFrom<String> for WorkspaceId {
    type Error = DomainError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        Self::parse(&value)
    }
}

impl From<WorkspaceId> for String {
    fn from(value: WorkspaceId) -> Self {
        value.0
    }
}

/// Deployment environment token such as `dev`, `qa` or `prod`.
#[derive(Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct Environment(String);

impl Environment {
    pub fn parse(value: &str) -> Result<Self, DomainError> {
        let normalized = value.trim().to_ascii_lowercase();
        if !naming::is_valid_environment(&normalized) {
            return Err(DomainError::InvalidIdentifier {
                kind: "environment",
                value: value.to_string(),
                expected: "alphanumeric token starting with a letter (dev, qa, prod, ...)"
                    .to_string(),
            });
        }
        Ok(Self(normalized))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for Environment {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl TryFrom<String> for Environment {
    type Error = DomainError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        Self::parse(&value)
    }
}

impl From<Environment> for String {
    fn from(value: Environment) -> Self {
        value.0
    }
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Namespace {
    pub table_prefix: String,
    pub storage_prefix: String,
}

impl Namespace {
    pub fn for_workspace(id: &WorkspaceId) -> Self {
        let (table_prefix, storage_prefix) = naming::prefixes(id.as_str());
        Self { table_prefix, storage_prefix }
    }
}

/// One provisioned team/environment deployment.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Workspace {
    pub id: WorkspaceId,
    pub team_name: String,
    pub environment: Environment,
    pub selection_key: i64,
    pub runtime: String,
    pub namespace: Namespace,
    pub host_port: u16,
    pub container_port: u16,
    pub provisioned_at: DateTime<Utc>,
}

impl Workspace {
    pub fn derive(
        team_name: &str,
        environment: Environment,
        selection_key: i64,
        runtime: &str,
        host_port: u16,
        provisioned_at: DateTime<Utc>,
    ) -> Self {
        let id = WorkspaceId::from_parts(team_name, &environment);
        let runtime = runtime.trim().to_ascii_lowercase();
        Self {
            namespace: Namespace::for_workspace(&id),
            container_port: naming::container_port(&runtime),
            id,
            team_name: team_name.trim().to_string(),
            environment,
            selection_key,
            runtime,
            host_port,
            provisioned_at,
        }
    }

    /// Directory of the workspace under the configured workspaces root.
    pub fn repo_path(&self, root: &Path) -> String {
        root.join(self.id.as_str()).display().to_string()
    }

    pub fn is_same_team(&self, team_name: &str) -> bool {
        self.team_name.trim().eq_ignore_ascii_case(team_name.trim())
    }
}
