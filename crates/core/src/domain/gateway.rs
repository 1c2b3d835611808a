use serde::{Deserialize, Serialize};

use crate::envfile::EnvFile;

/// Key in a workspace `.env` that carries the gateway link.
pub const GATEWAY_URL_KEY: &str = "LLM_GATEWAY_URL";

/// Gateway address as seen from inside a workspace container.
pub const DEFAULT_CONTAINER_GATEWAY_URL: &str = "http://host.docker.internal:7000";

/// Gateway address as seen from the host.
pub const DEFAULT_HOST_GATEWAY_URL: &str = "http://localhost:7000";

/// Connectivity between one workspace and the Central Gateway.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "state", rename_all = "snake_case")]
pub enum GatewayLink {
    Enabled { url: String },
    Disabled,
}

impl GatewayLink {
    pub fn enabled(url: impl Into<String>) -> Self {
        Self::Enabled { url: url.into() }
    }

    /// An empty value counts as disabled, matching `${LLM_GATEWAY_URL:-}` in compose files.
    pub fn from_env_file(env: &EnvFile) -> Self {
        match env.get(GATEWAY_URL_KEY) {
            Some(url) if !url.trim().is_empty() => Self::Enabled { url: url.trim().to_string() },
            _ => Self::Disabled,
        }
    }

    pub fn apply_to(&self, env: &mut EnvFile) {
        match self {
            Self::Enabled { url } => env.set(GATEWAY_URL_KEY, url),
            Self::Disabled => env.remove(GATEWAY_URL_KEY),
        }
    }

    pub fn label(&self) -> &'static str {
        match self {
            Self::Enabled { .. } => "enabled",
            Self::Disabled => "disabled",
        }
    }
}
