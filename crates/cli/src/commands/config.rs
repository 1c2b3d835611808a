use std::env;
use std::fs;
use std::path::Path;

use toml::Value;
use wsgate_core::config::{resolve_config_path, AppConfig, LoadOptions};

use crate::commands::{CommandResult, EXIT_CONFIG};

struct Field<'a> {
    key_path: &'static str,
    env_keys: &'static [&'static str],
    value: &'a str,
}

/// Plain text rather than a JSON outcome; exits with the config code when loading fails.
pub fn run() -> CommandResult {
    match AppConfig::load(LoadOptions::default()) {
        Ok(config) => CommandResult { exit_code: 0, output: render(&config) },
        Err(error) => CommandResult {
            exit_code: EXIT_CONFIG,
            output: format!("config validation failed: {error}"),
        },
    }
}

fn render(config: &AppConfig) -> String {
    let config_file_path = resolve_config_path(None);
    let config_file_doc = load_config_file_doc(config_file_path.as_deref());

    let workspaces_root = config.workspaces.root.display().to_string();
    let probe_timeout = config.gateway.probe_timeout_secs.to_string();
    let restart_timeout = config.runtime.restart_timeout_secs.to_string();
    let max_connections = config.registry.max_connections.to_string();
    let registry_timeout = config.registry.timeout_secs.to_string();
    let log_format = format!("{:?}", config.logging.format);

    let fields = [
        Field {
            key_path: "workspaces.root",
            env_keys: &["WSGATE_WORKSPACES_ROOT"],
            value: &workspaces_root,
        },
        Field {
            key_path: "gateway.container_url",
            env_keys: &["WSGATE_GATEWAY_CONTAINER_URL"],
            value: &config.gateway.container_url,
        },
        Field {
            key_path: "gateway.host_url",
            env_keys: &["WSGATE_GATEWAY_HOST_URL"],
            value: &config.gateway.host_url,
        },
        Field {
            key_path: "gateway.probe_timeout_secs",
            env_keys: &["WSGATE_GATEWAY_PROBE_TIMEOUT_SECS"],
            value: &probe_timeout,
        },
        Field {
            key_path: "runtime.compose_program",
            env_keys: &["WSGATE_RUNTIME_COMPOSE_PROGRAM"],
            value: &config.runtime.compose_program,
        },
        Field {
            key_path: "runtime.restart_timeout_secs",
            env_keys: &["WSGATE_RUNTIME_RESTART_TIMEOUT_SECS"],
            value: &restart_timeout,
        },
        Field {
            key_path: "registry.url",
            env_keys: &["WSGATE_REGISTRY_URL"],
            value: &config.registry.url,
        },
        Field {
            key_path: "registry.max_connections",
            env_keys: &["WSGATE_REGISTRY_MAX_CONNECTIONS"],
            value: &max_connections,
        },
        Field {
            key_path: "registry.timeout_secs",
            env_keys: &["WSGATE_REGISTRY_TIMEOUT_SECS"],
            value: &registry_timeout,
        },
        Field {
            key_path: "logging.level",
            env_keys: &["WSGATE_LOGGING_LEVEL", "WSGATE_LOG_LEVEL"],
            value: &config.logging.level,
        },
        Field {
            key_path: "logging.format",
            env_keys: &["WSGATE_LOGGING_FORMAT", "WSGATE_LOG_FORMAT"],
            value: &log_format,
        },
    ];

    let mut lines = vec!["effective config (source precedence: env > file > default):".to_string()];
    for field in &fields {
        let source = field_source(
            field.key_path,
            field.env_keys,
            config_file_doc.as_ref(),
            config_file_path.as_deref(),
        );
        lines.push(render_line(field.key_path, field.value, source));
    }

    lines.join("\n")
}

fn load_config_file_doc(path: Option<&Path>) -> Option<Value> {
    let path = path?;
    let raw = fs::read_to_string(path).ok()?;
    raw.parse::<Value>().ok()
}

fn field_source(
    key_path: &str,
    env_keys: &[&str],
    config_file_doc: Option<&Value>,
    config_file_path: Option<&Path>,
) -> String {
    if let Some(env_key) = env_keys.iter().find(|key| {
        env::var(key).map(|value| !value.trim().is_empty()).unwrap_or(false)
    }) {
        return format!("env ({env_key})");
    }

    if let Some(doc) = config_file_doc {
        if contains_path(doc, key_path) {
            let file_path = config_file_path
                .map(|path| path.display().to_string())
                .unwrap_or_else(|| "config file".to_string());
            return format!("file ({file_path})");
        }
    }

    "default".to_string()
}

fn contains_path(root: &Value, key_path: &str) -> bool {
    let mut current = root;
    for key in key_path.split('.') {
        let Some(next) = current.get(key) else {
            return false;
        };
        current = next;
    }
    true
}

fn render_line(key: &str, value: &str, source: String) -> String {
    format!("- {key} = {value} (source: {source})")
}
