use std::fs;
use std::path::{Path, PathBuf};

use serde::Serialize;
use tera::{Context, Tera};
use tracing::info;

use super::ProvisionError;
use crate::domain::gateway::GATEWAY_URL_KEY;
use crate::domain::workspace::Workspace;
use crate::store::ENV_FILE_NAME;

pub const MANIFEST_FILE: &str = "workspace_manifest.json";

const COMPOSE_TEMPLATE: &str = r#"services:
  app:
    build:
      context: .
      dockerfile: Dockerfile
    container_name: {{ team_env }}
    ports:
      - "{{ host_port }}:{{ container_port }}"
    environment:
      TEAM_ENV: "{{ team_env }}"
      TABLE_PREFIX: "{{ table_prefix }}"
      STORAGE_PREFIX: "{{ storage_prefix }}"
      {{ gateway_key }}: ${{ "{" }}{{ gateway_key }}:-}
    extra_hosts:
      - "host.docker.internal:host-gateway"
"#;

const DOCKERFILE_TEMPLATE: &str = r#"FROM python:3.11-slim
WORKDIR /app
COPY requirements.txt .
RUN pip install --no-cache-dir -r requirements.txt
COPY . .
EXPOSE {{ container_port }}
CMD ["streamlit", "run", "app.py", "--server.port={{ container_port }}", "--server.address=0.0.0.0"]
"#;

const REQUIREMENTS_TEMPLATE: &str = "streamlit\n";

const APP_TEMPLATE: &str = r#"import json
import os

import streamlit as st

st.set_page_config(page_title="{{ team_env }}", layout="centered")
st.title("{{ team_env }}")
try:
    with open("{{ manifest_file }}", encoding="utf-8") as handle:
        st.subheader("Workspace Manifest")
        st.json(json.load(handle), expanded=False)
except OSError as error:
    st.warning(f"Manifest not found: {error}")
st.write("Workspace is alive.")
st.caption(f"TEAM_ENV={os.getenv('TEAM_ENV')} | TABLE_PREFIX={os.getenv('TABLE_PREFIX')} | STORAGE_PREFIX={os.getenv('STORAGE_PREFIX')}")
st.caption(f"{{ gateway_key }}={os.getenv('{{ gateway_key }}') or '(disconnected)'}")
"#;

const README_TEMPLATE: &str = r#"# {{ team_env }}

- **Team:** {{ team_name }}
- **Environment:** {{ environment }}
- **Runtime:** {{ runtime }}
- **Selection key:** {{ selection_key }}
- **Table prefix:** `{{ table_prefix }}`
- **Storage prefix:** `{{ storage_prefix }}`
- **Folder:** `{{ repo_path }}`

## Run

```bash
cd {{ repo_path }}
docker compose up -d
```

Open: http://localhost:{{ host_port }}

## Central Gateway

Connect this workspace (sets `{{ gateway_key }}` in `.env` and restarts the container):

```bash
wsgate enable {{ team_env }}
```

Disconnect (isolates the workspace):

```bash
wsgate disable {{ team_env }}
```

Gateway on the host: {{ gateway_host_url }}
Gateway from inside the container: {{ gateway_container_url }}
"#;

const TEMPLATES: [(&str, &str); 5] = [
    ("docker-compose.yml", COMPOSE_TEMPLATE),
    ("Dockerfile", DOCKERFILE_TEMPLATE),
    ("requirements.txt", REQUIREMENTS_TEMPLATE),
    ("app.py", APP_TEMPLATE),
    ("README.md", README_TEMPLATE),
];

#[derive(Clone, Debug)]
pub struct ScaffoldOptions {
    pub gateway_host_url: String,
    pub gateway_container_url: String,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct ScaffoldReport {
    pub dir: PathBuf,
    pub written: Vec<String>,
    /// `false` when an existing `.env` (and its gateway link) was kept.
    pub env_created: bool,
}

/// Writes the workspace files under `<root>/<team_env>`.
pub fn scaffold(
    workspace: &Workspace,
    root: &Path,
    options: &ScaffoldOptions,
) -> Result<ScaffoldReport, ProvisionError> {
    let dir = root.join(workspace.id.as_str());
    fs::create_dir_all(&dir).map_err(|source| ProvisionError::Io { path: dir.clone(), source })?;

    let mut tera = Tera::default();
    tera.add_raw_templates(TEMPLATES).map_err(|error| ProvisionError::Template {
        template: "scaffold".to_string(),
        message: error.to_string(),
    })?;
    let context = template_context(workspace, root, options);

    let mut written = Vec::with_capacity(TEMPLATES.len() + 2);
    for (name, _) in TEMPLATES {
        let rendered = tera.render(name, &context).map_err(|error| ProvisionError::Template {
            template: name.to_string(),
            message: error.to_string(),
        })?;
        write_file(&dir.join(name), &rendered)?;
        written.push(name.to_string());
    }

    let manifest = serde_json::to_string_pretty(workspace).map_err(|error| {
        ProvisionError::Manifest { path: dir.join(MANIFEST_FILE), message: error.to_string() }
    })?;
    write_file(&dir.join(MANIFEST_FILE), &format!("{manifest}\n"))?;
    written.push(MANIFEST_FILE.to_string());

    let env_path = dir.join(ENV_FILE_NAME);
    let env_created = !env_path.exists();
    if env_created {
        write_file(&env_path, "")?;
        written.push(ENV_FILE_NAME.to_string());
    }

    info!(
        event_name = "workspace.provision.scaffolded",
        workspace = %workspace.id,
        dir = %dir.display(),
        env_created,
        "workspace scaffold written"
    );

    Ok(ScaffoldReport { dir, written, env_created })
}

pub fn read_manifest(dir: &Path) -> Result<Workspace, ProvisionError> {
    let path = dir.join(MANIFEST_FILE);
    let raw = fs::read_to_string(&path)
        .map_err(|source| ProvisionError::Io { path: path.clone(), source })?;
    serde_json::from_str(&raw)
        .map_err(|error| ProvisionError::Manifest { path, message: error.to_string() })
}

fn template_context(workspace: &Workspace, root: &Path, options: &ScaffoldOptions) -> Context {
    let mut context = Context::new();
    context.insert("team_env", workspace.id.as_str());
    context.insert("team_name", &workspace.team_name);
    context.insert("environment", workspace.environment.as_str());
    context.insert("runtime", &workspace.runtime);
    context.insert("selection_key", &workspace.selection_key);
    context.insert("table_prefix", &workspace.namespace.table_prefix);
    context.insert("storage_prefix", &workspace.namespace.storage_prefix);
    context.insert("host_port", &workspace.host_port);
    context.insert("container_port", &workspace.container_port);
    context.insert("repo_path", &workspace.repo_path(root));
    context.insert("manifest_file", MANIFEST_FILE);
    context.insert("gateway_key", GATEWAY_URL_KEY);
    context.insert("gateway_host_url", &options.gateway_host_url);
    context.insert("gateway_container_url", &options.gateway_container_url);
    context
}

fn write_file(path: &Path, contents: &str) -> Result<(), ProvisionError> {
    fs::write(path, contents).map_err(|source| ProvisionError::Io { path: path.to_path_buf(), source })
}
