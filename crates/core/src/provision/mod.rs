//! Provisioning of new team/environment workspaces.
//!
//! [`plan`] is pure: it derives the workspace from the request and checks it against the
//! workspaces already registered. [`scaffold::scaffold`] then writes the files the
//! workspace container is built from, and [`checks::run_checks`] verifies them.

pub mod checks;
pub mod scaffold;

use std::collections::BTreeSet;
use std::path::PathBuf;

use chrono::{DateTime, Utc};
use serde::Serialize;
use thiserror::Error;

use crate::domain::workspace::{Environment, Workspace, WorkspaceId};
use crate::errors::DomainError;
use crate::naming;

pub use checks::{run_checks, CheckReport, CheckStatus, REQUIRED_FILES};
pub use scaffold::{read_manifest, scaffold, ScaffoldOptions, ScaffoldReport, MANIFEST_FILE};

#[derive(Debug, Error)]
pub enum ProvisionError {
    #[error(transparent)]
    Domain(#[from] DomainError),
    #[error("could not write `{path}`: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("could not render `{template}`: {message}")]
    Template { template: String, message: String },
    #[error("workspace manifest `{path}` is invalid: {message}")]
    Manifest { path: PathBuf, message: String },
}

#[derive(Clone, Debug)]
pub struct ProvisionRequest {
    pub selection_key: i64,
    pub team_name: String,
    pub environment: String,
    pub runtime: String,
    pub host_port: Option<u16>,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum PlanKind {
    Create,
    Reprovision,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct ProvisionPlan {
    pub kind: PlanKind,
    pub workspace: Workspace,
}

pub fn plan(
    request: &ProvisionRequest,
    existing: &[Workspace],
    now: DateTime<Utc>,
) -> Result<ProvisionPlan, ProvisionError> {
    let team_name = request.team_name.trim();
    if team_name.is_empty() {
        return Err(DomainError::InvalidIdentifier {
            kind: "team",
            value: request.team_name.clone(),
            expected: "non-empty team name".to_string(),
        }
        .into());
    }

    let environment = Environment::parse(&request.environment)?;
    let id = WorkspaceId::from_parts(team_name, &environment);

    let current = existing.iter().find(|workspace| workspace.id == id);
    if let Some(current) = current {
        if !current.is_same_team(team_name) {
            return Err(DomainError::NamespaceCollision {
                field: "team_env",
                value: id.to_string(),
                holder: format!("{} (team `{}`)", current.id, current.team_name),
            }
            .into());
        }
    }

    let others: Vec<&Workspace> = existing.iter().filter(|workspace| workspace.id != id).collect();
    let host_port = choose_host_port(request.host_port, current, &others, &environment)?;

    let workspace = Workspace::derive(
        team_name,
        environment,
        request.selection_key,
        &request.runtime,
        host_port,
        now,
    );

    for other in &others {
        if other.namespace.table_prefix == workspace.namespace.table_prefix {
            return Err(collision("table_prefix", &workspace.namespace.table_prefix, other));
        }
        if other.namespace.storage_prefix == workspace.namespace.storage_prefix {
            return Err(collision("storage_prefix", &workspace.namespace.storage_prefix, other));
        }
    }

    let kind = if current.is_some() { PlanKind::Reprovision } else { PlanKind::Create };
    Ok(ProvisionPlan { kind, workspace })
}

fn choose_host_port(
    requested: Option<u16>,
    current: Option<&Workspace>,
    others: &[&Workspace],
    environment: &Environment,
) -> Result<u16, ProvisionError> {
    let holder_of = |port: u16| others.iter().find(|workspace| workspace.host_port == port);

    if let Some(port) = requested {
        if port == 0 {
            return Err(DomainError::InvariantViolation("host port must be non-zero".into()).into());
        }
        if let Some(holder) = holder_of(port) {
            return Err(collision("host_port", &port.to_string(), holder));
        }
        return Ok(port);
    }

    if let Some(current) = current {
        if holder_of(current.host_port).is_none() {
            return Ok(current.host_port);
        }
    }

    let taken: BTreeSet<u16> = others.iter().map(|workspace| workspace.host_port).collect();
    naming::allocate_host_port(environment.as_str(), &taken).ok_or_else(|| {
        DomainError::InvariantViolation(format!(
            "no free host port for environment `{environment}` in {}..={}",
            naming::OVERFLOW_PORTS.start(),
            naming::OVERFLOW_PORTS.end()
        ))
        .into()
    })
}

fn collision(field: &'static str, value: &str, holder: &Workspace) -> ProvisionError {
    DomainError::NamespaceCollision {
        field,
        value: value.to_string(),
        holder: holder.id.to_string(),
    }
    .into()
}
