use std::env;
use std::fs;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::domain::gateway::{DEFAULT_CONTAINER_GATEWAY_URL, DEFAULT_HOST_GATEWAY_URL};

pub const CONFIG_FILE_CANDIDATES: [&str; 2] = ["wsgate.toml", "config/wsgate.toml"];

#[derive(Clone, Debug)]
pub struct AppConfig {
    pub workspaces: WorkspacesConfig,
    pub gateway: GatewayConfig,
    pub runtime: RuntimeConfig,
    pub registry: RegistryConfig,
    pub logging: LoggingConfig,
}

#[derive(Clone, Debug)]
pub struct WorkspacesConfig {
    pub root: PathBuf,
}

#[derive(Clone, Debug)]
pub struct GatewayConfig {
    pub container_url: String,
    pub host_url: String,
    pub probe_timeout_secs: u64,
}

#[derive(Clone, Debug)]
pub struct RuntimeConfig {
    pub compose_program: String,
    pub restart_timeout_secs: u64,
}

#[derive(Clone, Debug)]
pub struct RegistryConfig {
    pub url: String,
    pub max_connections: u32,
    pub timeout_secs: u64,
}

#[derive(Clone, Debug)]
pub struct LoggingConfig {
    pub level: String,
    pub format: LogFormat,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LogFormat {
    Compact,
    Pretty,
    Json,
}

#[derive(Clone, Debug, Default)]
pub struct ConfigOverrides {
    pub workspaces_root: Option<PathBuf>,
    pub gateway_container_url: Option<String>,
    pub compose_program: Option<String>,
    pub registry_url: Option<String>,
    pub log_level: Option<String>,
}

#[derive(Clone, Debug, Default)]
pub struct LoadOptions {
    pub config_path: Option<PathBuf>,
    pub require_file: bool,
    pub overrides: ConfigOverrides,
}

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("could not read config file `{path}`: {source}")]
    ReadFile { path: PathBuf, source: std::io::Error },
    #[error("could not parse config file `{path}`: {source}")]
    ParseFile { path: PathBuf, source: toml::de::Error },
    #[error("required config file was not found: `{0}`")]
    MissingConfigFile(PathBuf),
    #[error("environment variable interpolation failed for `{var}`")]
    MissingEnvInterpolation { var: String },
    #[error("unterminated environment interpolation expression")]
    UnterminatedInterpolation,
    #[error("invalid environment override for `{key}`: `{value}`")]
    InvalidEnvOverride { key: String, value: String },
    #[error("configuration validation failed: {0}")]
    Validation(String),
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            workspaces: WorkspacesConfig { root: PathBuf::from("apps") },
            gateway: GatewayConfig {
                container_url: DEFAULT_CONTAINER_GATEWAY_URL.to_string(),
                host_url: DEFAULT_HOST_GATEWAY_URL.to_string(),
                probe_timeout_secs: 5,
            },
            runtime: RuntimeConfig {
                compose_program: "docker".to_string(),
                restart_timeout_secs: 120,
            },
            registry: RegistryConfig {
                url: "sqlite://wsgate.db".to_string(),
                max_connections: 5,
                timeout_secs: 30,
            },
            logging: LoggingConfig { level: "info".to_string(), format: LogFormat::Compact },
        }
    }
}

impl std::str::FromStr for LogFormat {
    type Err = ConfigError;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        match value.trim().to_ascii_lowercase().as_str() {
            "compact" => Ok(Self::Compact),
            "pretty" => Ok(Self::Pretty),
            "json" => Ok(Self::Json),
            other => Err(ConfigError::Validation(format!(
                "unsupported log format `{other}` (expected compact|pretty|json)"
            ))),
        }
    }
}

impl AppConfig {
    pub fn load(options: LoadOptions) -> Result<Self, ConfigError> {
        let mut config = Self::default();
        let maybe_path = resolve_config_path(options.config_path.as_deref());

        if let Some(path) = maybe_path {
            let patch = read_patch(&path)?;
            config.apply_patch(patch);
        } else if options.require_file {
            let expected =
                options.config_path.unwrap_or_else(|| PathBuf::from(CONFIG_FILE_CANDIDATES[0]));
            return Err(ConfigError::MissingConfigFile(expected));
        }

        config.apply_env_overrides()?;
        config.apply_overrides(options.overrides);
        config.validate()?;

        Ok(config)
    }

    fn apply_patch(&mut self, patch: ConfigPatch) {
        if let Some(workspaces) = patch.workspaces {
            if let Some(root) = workspaces.root {
                self.workspaces.root = root;
            }
        }

        if let Some(gateway) = patch.gateway {
            if let Some(container_url) = gateway.container_url {
                self.gateway.container_url = container_url;
            }
            if let Some(host_url) = gateway.host_url {
                self.gateway.host_url = host_url;
            }
            if let Some(probe_timeout_secs) = gateway.probe_timeout_secs {
                self.gateway.probe_timeout_secs = probe_timeout_secs;
            }
        }

        if let Some(runtime) = patch.runtime {
            if let Some(compose_program) = runtime.compose_program {
                self.runtime.compose_program = compose_program;
            }
            if let Some(restart_timeout_secs) = runtime.restart_timeout_secs {
                self.runtime.restart_timeout_secs = restart_timeout_secs;
            }
        }

        if let Some(registry) = patch.registry {
            if let Some(url) = registry.url {
                self.registry.url = url;
            }
            if let Some(max_connections) = registry.max_connections {
                self.registry.max_connections = max_connections;
            }
            if let Some(timeout_secs) = registry.timeout_secs {
                self.registry.timeout_secs = timeout_secs;
            }
        }

        if let Some(logging) = patch.logging {
            if let Some(level) = logging.level {
                self.logging.level = level;
            }
            if let Some(format) = logging.format {
                self.logging.format = format;
            }
        }
    }

    fn apply_env_overrides(&mut self) -> Result<(), ConfigError> {
        if let Some(value) = read_env("WSGATE_WORKSPACES_ROOT") {
            self.workspaces.root = PathBuf::from(value);
        }

        if let Some(value) = read_env("WSGATE_GATEWAY_CONTAINER_URL") {
            self.gateway.container_url = value;
        }
        if let Some(value) = read_env("WSGATE_GATEWAY_HOST_URL") {
            self.gateway.host_url = value;
        }
        if let Some(value) = read_env("WSGATE_GATEWAY_PROBE_TIMEOUT_SECS") {
            self.gateway.probe_timeout_secs =
                parse_u64("WSGATE_GATEWAY_PROBE_TIMEOUT_SECS", &value)?;
        }

        if let Some(value) = read_env("WSGATE_RUNTIME_COMPOSE_PROGRAM") {
            self.runtime.compose_program = value;
        }
        if let Some(value) = read_env("WSGATE_RUNTIME_RESTART_TIMEOUT_SECS") {
            self.runtime.restart_timeout_secs =
                parse_u64("WSGATE_RUNTIME_RESTART_TIMEOUT_SECS", &value)?;
        }

        if let Some(value) = read_env("WSGATE_REGISTRY_URL") {
            self.registry.url = value;
        }
        if let Some(value) = read_env("WSGATE_REGISTRY_MAX_CONNECTIONS") {
            self.registry.max_connections = parse_u32("WSGATE_REGISTRY_MAX_CONNECTIONS", &value)?;
        }
        if let Some(value) = read_env("WSGATE_REGISTRY_TIMEOUT_SECS") {
            self.registry.timeout_secs = parse_u64("WSGATE_REGISTRY_TIMEOUT_SECS", &value)?;
        }

        let log_level = read_env("WSGATE_LOGGING_LEVEL").or_else(|| read_env("WSGATE_LOG_LEVEL"));
        if let Some(value) = log_level {
            self.logging.level = value;
        }
        let log_format =
            read_env("WSGATE_LOGGING_FORMAT").or_else(|| read_env("WSGATE_LOG_FORMAT"));
        if let Some(value) = log_format {
            self.logging.format = value.parse()?;
        }

        Ok(())
    }

    fn apply_overrides(&mut self, overrides: ConfigOverrides) {
        if let Some(root) = overrides.workspaces_root {
            self.workspaces.root = root;
        }
        if let Some(container_url) = overrides.gateway_container_url {
            self.gateway.container_url = container_url;
        }
        if let Some(compose_program) = overrides.compose_program {
            self.runtime.compose_program = compose_program;
        }
        if let Some(registry_url) = overrides.registry_url {
            self.registry.url = registry_url;
        }
        if let Some(log_level) = overrides.log_level {
            self.logging.level = log_level;
        }
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        validate_workspaces(&self.workspaces)?;
        validate_gateway(&self.gateway)?;
        validate_runtime(&self.runtime)?;
        validate_registry(&self.registry)?;
        validate_logging(&self.logging)?;
        Ok(())
    }
}

/// Config file that `load` would pick up, if any.
pub fn resolve_config_path(explicit_path: Option<&Path>) -> Option<PathBuf> {
    if let Some(path) = explicit_path {
        return path.exists().then_some(path.to_path_buf());
    }

    CONFIG_FILE_CANDIDATES.iter().map(PathBuf::from).find(|path| path.exists())
}

fn read_patch(path: &Path) -> Result<ConfigPatch, ConfigError> {
    let raw = fs::read_to_string(path)
        .map_err(|source| ConfigError::ReadFile { path: path.to_path_buf(), source })?;

    let interpolated = interpolate_env_vars(&raw)?;
    toml::from_str::<ConfigPatch>(&interpolated)
        .map_err(|source| ConfigError::ParseFile { path: path.to_path_buf(), source })
}

fn interpolate_env_vars(input: &str) -> Result<String, ConfigError> {
    let mut output = String::with_capacity(input.len());
    let mut chars = input.chars().peekable();

    while let Some(ch) = chars.next() {
        if ch == '$' && matches!(chars.peek(), Some('{')) {
            chars.next();
            let mut key = String::new();

            loop {
                match chars.next() {
                    Some('}') => break,
                    Some(next) => key.push(next),
                    None => return Err(ConfigError::UnterminatedInterpolation),
                }
            }

            let value = env::var(&key)
                .map_err(|_| ConfigError::MissingEnvInterpolation { var: key.clone() })?;
            output.push_str(&value);
            continue;
        }

        output.push(ch);
    }

    Ok(output)
}

fn validate_workspaces(workspaces: &WorkspacesConfig) -> Result<(), ConfigError> {
    if workspaces.root.as_os_str().is_empty() {
        return Err(ConfigError::Validation("workspaces.root must not be empty".to_string()));
    }
    Ok(())
}

fn validate_gateway(gateway: &GatewayConfig) -> Result<(), ConfigError> {
    for (key, url) in [
        ("gateway.container_url", &gateway.container_url),
        ("gateway.host_url", &gateway.host_url),
    ] {
        if !url.starts_with("http://") && !url.starts_with("https://") {
            return Err(ConfigError::Validation(format!(
                "{key} must start with http:// or https://"
            )));
        }
        if url.chars().any(|ch| ch.is_whitespace() || ch == '#') {
            return Err(ConfigError::Validation(format!(
                "{key} must not contain whitespace or `#` (it is written into .env files)"
            )));
        }
    }

    if gateway.probe_timeout_secs == 0 || gateway.probe_timeout_secs > 60 {
        return Err(ConfigError::Validation(
            "gateway.probe_timeout_secs must be in range 1..=60".to_string(),
        ));
    }

    Ok(())
}

fn validate_runtime(runtime: &RuntimeConfig) -> Result<(), ConfigError> {
    if runtime.compose_program.trim().is_empty() {
        return Err(ConfigError::Validation(
            "runtime.compose_program must name an executable (usually `docker`)".to_string(),
        ));
    }

    if runtime.restart_timeout_secs == 0 || runtime.restart_timeout_secs > 900 {
        return Err(ConfigError::Validation(
            "runtime.restart_timeout_secs must be in range 1..=900".to_string(),
        ));
    }

    Ok(())
}

fn validate_registry(registry: &RegistryConfig) -> Result<(), ConfigError> {
    let url = registry.url.trim();
    let sqlite_url =
        url.starts_with("sqlite://") || url.starts_with("sqlite::") || url == ":memory:";
    if !sqlite_url {
        return Err(ConfigError::Validation(
            "registry.url must be a sqlite URL (`sqlite://...`, `sqlite::...`, or `:memory:`)"
                .to_string(),
        ));
    }

    if registry.max_connections == 0 {
        return Err(ConfigError::Validation(
            "registry.max_connections must be greater than zero".to_string(),
        ));
    }

    if registry.timeout_secs == 0 || registry.timeout_secs > 300 {
        return Err(ConfigError::Validation(
            "registry.timeout_secs must be in range 1..=300".to_string(),
        ));
    }

    Ok(())
}

fn validate_logging(logging: &LoggingConfig) -> Result<(), ConfigError> {
    let level = logging.level.trim().to_ascii_lowercase();
    match level.as_str() {
        "trace" | "debug" | "info" | "warn" | "error" => Ok(()),
        _ => Err(ConfigError::Validation(
            "logging.level must be one of trace|debug|info|warn|error".to_string(),
        )),
    }
}

fn read_env(key: &str) -> Option<String> {
    env::var(key).ok().filter(|value| !value.trim().is_empty())
}

fn parse_u32(key: &str, value: &str) -> Result<u32, ConfigError> {
    value.parse::<u32>().map_err(|_| ConfigError::InvalidEnvOverride {
        key: key.to_string(),
        value: value.to_string(),
    })
}

fn parse_u64(key: &str, value: &str) -> Result<u64, ConfigError> {
    value.parse::<u64>().map_err(|_| ConfigError::InvalidEnvOverride {
        key: key.to_string(),
        value: value.to_string(),
    })
}

#[derive(Debug, Default, Deserialize)]
struct ConfigPatch {
    workspaces: Option<WorkspacesPatch>,
    gateway: Option<GatewayPatch>,
    runtime: Option<RuntimePatch>,
    registry: Option<RegistryPatch>,
    logging: Option<LoggingPatch>,
}

#[derive(Debug, Default, Deserialize)]
struct WorkspacesPatch {
    root: Option<PathBuf>,
}

#[derive(Debug, Default, Deserialize)]
struct GatewayPatch {
    container_url: Option<String>,
    host_url: Option<String>,
    probe_timeout_secs: Option<u64>,
}

#[derive(Debug, Default, Deserialize)]
struct RuntimePatch {
    compose_program: Option<String>,
    restart_timeout_secs: Option<u64>,
}

#[derive(Debug, Default, Deserialize)]
struct RegistryPatch {
    url: Option<String>,
    max_connections: Option<u32>,
    timeout_secs: Option<u64>,
}

#[derive(Debug, Default, Deserialize)]
struct LoggingPatch {
    level: Option<String>,
    format: Option<LogFormat>,
}

#[cfg(test)]
mod tests {
    use std::env;
    use std::fs;
    use std::io;
    use std::path::PathBuf;
    use std::sync::{Mutex, OnceLock};

    use tempfile::TempDir;

    use super::{AppConfig, ConfigError, ConfigOverrides, LoadOptions, LogFormat};

    static ENV_LOCK: OnceLock<Mutex<()>> = OnceLock::new();

    fn env_lock() -> &'static Mutex<()> {
        ENV_LOCK.get_or_init(|| Mutex::new(()))
    }

    fn clear_vars(vars: &[&str]) {
        for var in vars {
            env::remove_var(var);
        }
    }

    fn ensure(condition: bool, message: &'static str) -> Result<(), String> {
        if condition {
            Ok(())
        } else {
            Err(message.to_string())
        }
    }

    #[test]
    fn defaults_point_at_local_gateway_and_docker() -> Result<(), String> {
        let _guard = env_lock().lock().map_err(|_| "env lock is poisoned".to_string())?;

        let config = AppConfig::load(LoadOptions::default())
            .map_err(|err| format!("config load failed: {err}"))?;

        ensure(
            config.gateway.container_url == "http://host.docker.internal:7000",
            "container gateway url should default to host.docker.internal:7000",
        )?;
        ensure(
            config.gateway.host_url == "http://localhost:7000",
            "host gateway url should default to localhost:7000",
        )?;
        ensure(config.runtime.compose_program == "docker", "compose program should be docker")?;
        ensure(config.workspaces.root == PathBuf::from("apps"), "workspaces root should be apps")?;
        ensure(
            matches!(config.logging.format, LogFormat::Compact),
            "default logging format should be compact",
        )
    }

    #[test]
    fn file_load_supports_env_interpolation() -> Result<(), String> {
        let _guard = env_lock().lock().map_err(|_| "env lock is poisoned".to_string())?;

        env::set_var("TEST_WSGATE_GATEWAY_HOST", "gateway.internal");

        let result = (|| -> Result<(), String> {
            let dir = TempDir::new().map_err(|err: io::Error| err.to_string())?;
            let path = dir.path().join("wsgate.toml");
            fs::write(
                &path,
                r#"
[gateway]
container_url = "http://${TEST_WSGATE_GATEWAY_HOST}:7000"
"#,
            )
            .map_err(|err| err.to_string())?;

            let config =
                AppConfig::load(LoadOptions { config_path: Some(path), ..LoadOptions::default() })
                    .map_err(|err| format!("config load failed: {err}"))?;

            ensure(
                config.gateway.container_url == "http://gateway.internal:7000",
                "container url should be interpolated from environment",
            )
        })();

        clear_vars(&["TEST_WSGATE_GATEWAY_HOST"]);
        result
    }

    #[test]
    fn precedence_defaults_file_env_overrides() -> Result<(), String> {
        let _guard = env_lock().lock().map_err(|_| "env lock is poisoned".to_string())?;

        env::set_var("WSGATE_REGISTRY_URL", "sqlite://from-env.db");
        env::set_var("WSGATE_RUNTIME_COMPOSE_PROGRAM", "podman");

        let result = (|| -> Result<(), String> {
            let dir = TempDir::new().map_err(|err: io::Error| err.to_string())?;
            let path = dir.path().join("wsgate.toml");
            fs::write(
                &path,
                r#"
[workspaces]
root = "/srv/workspaces"

[registry]
url = "sqlite://from-file.db"

[runtime]
compose_program = "nerdctl"

[logging]
level = "warn"
"#,
            )
            .map_err(|err| err.to_string())?;

            let config = AppConfig::load(LoadOptions {
                config_path: Some(path),
                overrides: ConfigOverrides {
                    registry_url: Some("sqlite://from-override.db".to_string()),
                    log_level: Some("debug".to_string()),
                    ..ConfigOverrides::default()
                },
                ..LoadOptions::default()
            })
            .map_err(|err| format!("config load failed: {err}"))?;

            ensure(
                config.registry.url == "sqlite://from-override.db",
                "override registry url should win",
            )?;
            ensure(config.logging.level == "debug", "overridden log level should be debug")?;
            ensure(
                config.runtime.compose_program == "podman",
                "env compose program should win over file and defaults",
            )?;
            ensure(
                config.workspaces.root == PathBuf::from("/srv/workspaces"),
                "file workspaces root should win over default",
            )
        })();

        clear_vars(&["WSGATE_REGISTRY_URL", "WSGATE_RUNTIME_COMPOSE_PROGRAM"]);
        result
    }

    #[test]
    fn logging_env_aliases_are_supported() -> Result<(), String> {
        let _guard = env_lock().lock().map_err(|_| "env lock is poisoned".to_string())?;

        env::set_var("WSGATE_LOG_LEVEL", "warn");
        env::set_var("WSGATE_LOG_FORMAT", "json");

        let result = (|| -> Result<(), String> {
            let config = AppConfig::load(LoadOptions::default())
                .map_err(|err| format!("config load failed: {err}"))?;

            ensure(config.logging.level == "warn", "warning log level should be set from env var")?;
            ensure(
                matches!(config.logging.format, LogFormat::Json),
                "json logging format should be set from env var",
            )
        })();

        clear_vars(&["WSGATE_LOG_LEVEL", "WSGATE_LOG_FORMAT"]);
        result
    }

    #[test]
    fn gateway_url_with_whitespace_is_rejected() -> Result<(), String> {
        let _guard = env_lock().lock().map_err(|_| "env lock is poisoned".to_string())?;

        env::set_var("WSGATE_GATEWAY_CONTAINER_URL", "http://bad host:7000");

        let result = (|| -> Result<(), String> {
            let error = match AppConfig::load(LoadOptions::default()) {
                Ok(_) => {
                    return Err("expected validation failure but config load succeeded".to_string())
                }
                Err(error) => error,
            };
            ensure(
                matches!(
                    error,
                    ConfigError::Validation(ref message) if message.contains("gateway.container_url")
                ),
                "validation failure should mention gateway.container_url",
            )
        })();

        clear_vars(&["WSGATE_GATEWAY_CONTAINER_URL"]);
        result
    }

    #[test]
    fn invalid_numeric_env_override_is_reported() -> Result<(), String> {
        let _guard = env_lock().lock().map_err(|_| "env lock is poisoned".to_string())?;

        env::set_var("WSGATE_RUNTIME_RESTART_TIMEOUT_SECS", "soon");

        let result = (|| -> Result<(), String> {
            let failed = matches!(
                AppConfig::load(LoadOptions::default()),
                Err(ConfigError::InvalidEnvOverride { ref key, .. })
                    if key == "WSGATE_RUNTIME_RESTART_TIMEOUT_SECS"
            );
            ensure(failed, "non-numeric timeout should fail with InvalidEnvOverride")
        })();

        clear_vars(&["WSGATE_RUNTIME_RESTART_TIMEOUT_SECS"]);
        result
    }
}
