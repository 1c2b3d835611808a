use std::path::Path;

use serde::{Deserialize, Serialize};

use super::scaffold::{read_manifest, MANIFEST_FILE};
use crate::domain::workspace::WorkspaceId;

/// Files a workspace directory must contain before its container can be built.
pub const REQUIRED_FILES: [&str; 6] = [
    "docker-compose.yml",
    "Dockerfile",
    "requirements.txt",
    MANIFEST_FILE,
    "app.py",
    "README.md",
];

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CheckStatus {
    Pass,
    Fail,
}

impl CheckStatus {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Pass => "pass",
            Self::Fail => "fail",
        }
    }

    pub fn parse(value: &str) -> Option<Self> {
        match value {
            "pass" => Some(Self::Pass),
            "fail" => Some(Self::Fail),
            _ => None,
        }
    }
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct CheckReport {
    pub workspace: WorkspaceId,
    pub status: CheckStatus,
    pub repo_path: String,
    pub missing: Vec<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub manifest_problem: Option<String>,
}

pub fn run_checks(workspace: &WorkspaceId, dir: &Path) -> CheckReport {
    let missing: Vec<String> = REQUIRED_FILES
        .iter()
        .filter(|name| !dir.join(name).is_file())
        .map(|name| name.to_string())
        .collect();

    let manifest_problem = if missing.iter().any(|name| name == MANIFEST_FILE) {
        None
    } else {
        match read_manifest(dir) {
            Ok(manifest) if &manifest.id == workspace => None,
            Ok(manifest) => Some(format!("manifest describes `{}`", manifest.id)),
            Err(error) => Some(error.to_string()),
        }
    };

    let status = if missing.is_empty() && manifest_problem.is_none() {
        CheckStatus::Pass
    } else {
        CheckStatus::Fail
    };

    CheckReport {
        workspace: workspace.clone(),
        status,
        repo_path: dir.display().to_string(),
        missing,
        manifest_problem,
    }
}

#[cfg(test)]
mod tests {
    use std::fs;

    use chrono::Utc;
    use tempfile::TempDir;

    use super::{run_checks, CheckStatus};
    use crate::domain::workspace::{Environment, Workspace, WorkspaceId};
    use crate::provision::scaffold::{scaffold, ScaffoldOptions};

    fn options() -> ScaffoldOptions {
        ScaffoldOptions {
            gateway_host_url: "http://localhost:7000".to_string(),
            gateway_container_url: "http://host.docker.internal:7000".to_string(),
        }
    }

    #[test]
    fn freshly_scaffolded_workspace_passes() {
        let dir = TempDir::new().expect("tempdir");
        let environment = Environment::parse("dev").expect("valid environment");
        let workspace = Workspace::derive("Ops", environment, 3, "python", 8510, Utc::now());
        let report = scaffold(&workspace, dir.path(), &options()).expect("scaffold");

        let checks = run_checks(&workspace.id, &report.dir);
        assert_eq!(checks.status, CheckStatus::Pass);
        assert!(checks.missing.is_empty());
    }

    #[test]
    fn missing_files_are_listed_in_order() {
        let dir = TempDir::new().expect("tempdir");
        fs::write(dir.path().join("Dockerfile"), "FROM scratch\n").expect("dockerfile");
        let id = WorkspaceId::parse("ops_dev").expect("valid workspace id");

        let checks = run_checks(&id, dir.path());
        assert_eq!(checks.status, CheckStatus::Fail);
        assert_eq!(
            checks.missing,
            vec![
                "docker-compose.yml",
                "requirements.txt",
                "workspace_manifest.json",
                "app.py",
                "README.md"
            ]
        );
        assert!(checks.manifest_problem.is_none());
    }

    #[test]
    fn manifest_for_another_workspace_fails() {
        let dir = TempDir::new().expect("tempdir");
        let environment = Environment::parse("dev").expect("valid environment");
        let workspace = Workspace::derive("Ops", environment, 3, "python", 8510, Utc::now());
        let report = scaffold(&workspace, dir.path(), &options()).expect("scaffold");
        let other = WorkspaceId::parse("finance_dev").expect("valid workspace id");

        let checks = run_checks(&other, &report.dir);
        assert_eq!(checks.status, CheckStatus::Fail);
        assert_eq!(checks.manifest_problem.as_deref(), Some("manifest describes `ops_dev`"));
    }
}
