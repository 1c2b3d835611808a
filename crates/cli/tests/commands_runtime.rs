#![cfg(unix)]

use std::env;
use std::fs;
use std::path::Path;
use std::sync::{Mutex, OnceLock};

use serde_json::Value;
use tempfile::TempDir;
use wsgate_cli::commands::provision::ProvisionArgs;
use wsgate_cli::commands::{
    check, config, doctor, list, migrate, provision, status, teardown, toggle,
};
use wsgate_core::ToggleAction;

const ORIGINAL_ENV: &str = "# team settings\nAPP_MODE=demo\n\nexport FEATURE_X=\"on\"\n";

#[test]
fn enable_then_disable_restores_original_env() {
    let root = TempDir::new().expect("tempdir");
    let env_path = seed_workspace(root.path(), "ops_dev", ORIGINAL_ENV);

    with_workspace_env(root.path(), "true", || {
        let enabled = toggle::run(ToggleAction::Enable, "ops_dev");
        assert_eq!(enabled.exit_code, 0, "expected enable success: {}", enabled.output);
        let payload = parse_payload(&enabled.output);
        assert_eq!(payload["command"], "enable");
        assert_eq!(payload["status"], "ok");
        assert_eq!(payload["details"]["current"]["state"], "enabled");
        assert_eq!(payload["details"]["config_changed"], true);

        let contents = fs::read_to_string(&env_path).expect("read env");
        assert!(contents.starts_with(ORIGINAL_ENV));
        assert!(contents.contains("LLM_GATEWAY_URL=http://host.docker.internal:7000\n"));

        let disabled = toggle::run(ToggleAction::Disable, "ops_dev");
        assert_eq!(disabled.exit_code, 0, "expected disable success: {}", disabled.output);
        let payload = parse_payload(&disabled.output);
        assert_eq!(payload["details"]["previous"]["state"], "enabled");
        assert_eq!(payload["details"]["current"]["state"], "disabled");
        assert_eq!(fs::read_to_string(&env_path).expect("read env"), ORIGINAL_ENV);
    });
}

#[test]
fn disable_on_isolated_workspace_keeps_bytes() {
    let root = TempDir::new().expect("tempdir");
    let env_path = seed_workspace(root.path(), "ops_qa", ORIGINAL_ENV);

    with_workspace_env(root.path(), "true", || {
        let result = toggle::run(ToggleAction::Disable, "ops_qa");
        assert_eq!(result.exit_code, 0, "expected disable success: {}", result.output);

        let payload = parse_payload(&result.output);
        assert_eq!(payload["details"]["config_changed"], false);
        assert_eq!(fs::read_to_string(&env_path).expect("read env"), ORIGINAL_ENV);
    });
}

#[test]
fn enable_unknown_workspace_reports_not_found_without_writing() {
    let root = TempDir::new().expect("tempdir");

    with_workspace_env(root.path(), "true", || {
        let result = toggle::run(ToggleAction::Enable, "ghost_dev");
        assert_eq!(result.exit_code, 3, "expected workspace-not-found code");

        let payload = parse_payload(&result.output);
        assert_eq!(payload["status"], "error");
        assert_eq!(payload["error_class"], "workspace_not_found");
        assert!(!root.path().join("ghost_dev").exists());
    });
}

#[test]
fn enable_rejects_identifier_that_is_not_a_slug() {
    let root = TempDir::new().expect("tempdir");

    with_workspace_env(root.path(), "true", || {
        let result = toggle::run(ToggleAction::Enable, "../etc");
        assert_eq!(result.exit_code, 3);
        assert_eq!(parse_payload(&result.output)["error_class"], "workspace_not_found");
    });
}

#[test]
fn failed_restart_rolls_back_env_and_reports_it() {
    let root = TempDir::new().expect("tempdir");
    let env_path = seed_workspace(root.path(), "ops_prod", ORIGINAL_ENV);

    with_workspace_env(root.path(), "false", || {
        let result = toggle::run(ToggleAction::Enable, "ops_prod");
        assert_eq!(result.exit_code, 5, "expected restart-failed code");

        let payload = parse_payload(&result.output);
        assert_eq!(payload["error_class"], "restart_failed");
        assert_eq!(payload["details"]["rollback"]["outcome"], "restored");
        assert_eq!(fs::read_to_string(&env_path).expect("read env"), ORIGINAL_ENV);
    });
}

#[test]
fn unwritable_workspace_reports_config_write_failure() {
    use std::os::unix::fs::PermissionsExt;

    let root = TempDir::new().expect("tempdir");
    let env_path = seed_workspace(root.path(), "ops_dev", ORIGINAL_ENV);
    let dir = root.path().join("ops_dev");
    fs::set_permissions(&dir, fs::Permissions::from_mode(0o555)).expect("make dir read-only");
    // Privileged users ignore directory modes.
    let writable = fs::write(dir.join(".write-test"), "").is_ok();
    if writable {
        fs::set_permissions(&dir, fs::Permissions::from_mode(0o755)).expect("restore dir mode");
        return;
    }

    with_workspace_env(root.path(), "true", || {
        let result = toggle::run(ToggleAction::Enable, "ops_dev");
        assert_eq!(result.exit_code, 4, "expected config-write code: {}", result.output);

        let payload = parse_payload(&result.output);
        assert_eq!(payload["error_class"], "config_write");
        assert_eq!(fs::read_to_string(&env_path).expect("read env"), ORIGINAL_ENV);
    });

    fs::set_permissions(&dir, fs::Permissions::from_mode(0o755)).expect("restore dir mode");
}

#[test]
fn status_reports_gateway_link() {
    let root = TempDir::new().expect("tempdir");
    seed_workspace(root.path(), "ops_dev", "LLM_GATEWAY_URL=http://gw.internal:7000\n");

    with_workspace_env(root.path(), "true", || {
        let result = status::run("ops_dev");
        assert_eq!(result.exit_code, 0);

        let payload = parse_payload(&result.output);
        assert_eq!(payload["details"]["gateway"]["state"], "enabled");
        assert_eq!(payload["details"]["gateway"]["url"], "http://gw.internal:7000");
    });
}

#[test]
fn provision_registers_scaffolds_and_allocates_ports() {
    let root = TempDir::new().expect("tempdir");

    with_workspace_env(root.path(), "true", || {
        let first = provision::run(provision_args("Team 1", "dev", None));
        assert_eq!(first.exit_code, 0, "expected provision success: {}", first.output);
        let payload = parse_payload(&first.output);
        assert_eq!(payload["details"]["plan"], "create");
        assert_eq!(payload["details"]["workspace"]["id"], "team_1_dev");
        assert_eq!(payload["details"]["workspace"]["host_port"], 8510);
        assert_eq!(payload["details"]["checks"]["status"], "pass");
        let repo_path = root.path().join("team_1_dev").display().to_string();
        assert_eq!(payload["details"]["repo_path"], repo_path.as_str());
        let readme = fs::read_to_string(root.path().join("team_1_dev/README.md")).expect("readme");
        assert!(readme.contains(&format!("cd {repo_path}")));
        assert!(root.path().join("team_1_dev/docker-compose.yml").is_file());
        assert!(root.path().join("team_1_dev/.env").is_file());

        let second = provision::run(provision_args("Team 2", "dev", None));
        assert_eq!(second.exit_code, 0, "expected provision success: {}", second.output);
        assert_eq!(parse_payload(&second.output)["details"]["workspace"]["host_port"], 8520);

        let again = provision::run(provision_args("Team 1", "dev", None));
        assert_eq!(again.exit_code, 0, "expected re-provision success: {}", again.output);
        let payload = parse_payload(&again.output);
        assert_eq!(payload["details"]["plan"], "reprovision");
        assert_eq!(payload["details"]["workspace"]["host_port"], 8510);

        let listed = list::run();
        assert_eq!(listed.exit_code, 0);
        let payload = parse_payload(&listed.output);
        let rows = payload["details"].as_array().expect("list details should be an array");
        assert_eq!(rows.len(), 2);
        assert_eq!(rows[0]["team_env"], "team_1_dev");
        assert_eq!(rows[0]["gateway"], "disabled");
        assert_eq!(rows[0]["provisioning_checks"], "pass");
        assert_eq!(rows[0]["repo_path"], repo_path.as_str());
    });
}

#[test]
fn provision_rejects_port_held_by_another_workspace() {
    let root = TempDir::new().expect("tempdir");

    with_workspace_env(root.path(), "true", || {
        let first = provision::run(provision_args("Ops", "dev", None));
        assert_eq!(first.exit_code, 0, "expected provision success: {}", first.output);

        let clash = provision::run(provision_args("Finance", "qa", Some(8510)));
        assert_eq!(clash.exit_code, 8, "expected namespace collision code");
        assert_eq!(parse_payload(&clash.output)["error_class"], "namespace_collision");
        assert!(!root.path().join("finance_qa").exists());
    });
}

#[test]
fn check_reports_missing_files() {
    let root = TempDir::new().expect("tempdir");
    seed_workspace(root.path(), "ops_dev", "");

    with_workspace_env(root.path(), "true", || {
        let result = check::run("ops_dev");
        assert_eq!(result.exit_code, 10, "expected checks-failed code");

        let payload = parse_payload(&result.output);
        assert_eq!(payload["error_class"], "checks_failed");
        let missing = payload["details"]["missing"].as_array().expect("missing list");
        assert_eq!(missing.len(), 6);
    });
}

#[test]
fn teardown_with_purge_removes_directory_and_registry_row() {
    let root = TempDir::new().expect("tempdir");

    with_workspace_env(root.path(), "true", || {
        let provisioned = provision::run(provision_args("Ops", "qa", None));
        assert_eq!(provisioned.exit_code, 0, "expected provision success: {}", provisioned.output);

        let result = teardown::run("ops_qa", true);
        assert_eq!(result.exit_code, 0, "expected teardown success: {}", result.output);
        let payload = parse_payload(&result.output);
        assert_eq!(payload["details"]["unregistered"], true);
        assert_eq!(payload["details"]["purged"], true);
        assert!(!root.path().join("ops_qa").exists());

        let listed = parse_payload(&list::run().output);
        assert_eq!(listed["details"].as_array().map(Vec::len), Some(0));

        let again = teardown::run("ops_qa", false);
        assert_eq!(again.exit_code, 3);
    });
}

#[test]
fn migrate_returns_success_with_valid_env() {
    let root = TempDir::new().expect("tempdir");

    with_workspace_env(root.path(), "true", || {
        let result = migrate::run();
        assert_eq!(result.exit_code, 0, "expected successful migrate run");

        let payload = parse_payload(&result.output);
        assert_eq!(payload["command"], "migrate");
        assert_eq!(payload["status"], "ok");
    });
}

#[test]
fn commands_return_config_failure_for_invalid_registry_url() {
    with_env(&[("WSGATE_REGISTRY_URL", "postgres://localhost/wsgate")], || {
        for result in [migrate::run(), toggle::run(ToggleAction::Enable, "ops_dev"), list::run()] {
            assert_eq!(result.exit_code, 2, "expected config validation failure code");
            let payload = parse_payload(&result.output);
            assert_eq!(payload["status"], "error");
            assert_eq!(payload["error_class"], "config_validation");
        }
    });
}

#[test]
fn config_attributes_env_sources() {
    let root = TempDir::new().expect("tempdir");

    with_workspace_env(root.path(), "true", || {
        let result = config::run();
        assert_eq!(result.exit_code, 0);
        let output = result.output;
        assert!(output.contains("workspaces.root"));
        assert!(output.contains("(source: env (WSGATE_WORKSPACES_ROOT))"));
        assert!(output.contains("- gateway.container_url = http://host.docker.internal:7000 (source: default)"));
    });
}

#[test]
fn config_and_doctor_exit_with_config_code_on_invalid_settings() {
    with_env(&[("WSGATE_REGISTRY_URL", "postgres://localhost/wsgate")], || {
        let shown = config::run();
        assert_eq!(shown.exit_code, 2);
        assert!(shown.output.starts_with("config validation failed"));

        let report = doctor::run(true);
        assert_eq!(report.exit_code, 2);
        let payload = parse_payload(&report.output);
        assert_eq!(payload["overall_status"], "fail");
        assert_eq!(payload["checks"][0]["name"], "config_validation");
        assert_eq!(payload["checks"][0]["status"], "fail");
    });
}

fn provision_args(team: &str, environment: &str, host_port: Option<u16>) -> ProvisionArgs {
    ProvisionArgs {
        selection_key: 1,
        team: team.to_string(),
        environment: environment.to_string(),
        runtime: "python".to_string(),
        host_port,
        up: false,
    }
}

fn seed_workspace(root: &Path, team_env: &str, contents: &str) -> std::path::PathBuf {
    let dir = root.join(team_env);
    fs::create_dir_all(&dir).expect("create workspace dir");
    let env_path = dir.join(".env");
    fs::write(&env_path, contents).expect("write env");
    env_path
}

fn parse_payload(output: &str) -> Value {
    serde_json::from_str(output).expect("command output should be valid JSON")
}

fn with_workspace_env(root: &Path, compose_program: &str, test_fn: impl FnOnce()) {
    let root_value = root.display().to_string();
    let registry_url = format!("sqlite://{}", root.join("registry.db").display());
    with_env(
        &[
            ("WSGATE_WORKSPACES_ROOT", root_value.as_str()),
            ("WSGATE_RUNTIME_COMPOSE_PROGRAM", compose_program),
            ("WSGATE_RUNTIME_RESTART_TIMEOUT_SECS", "10"),
            ("WSGATE_REGISTRY_URL", registry_url.as_str()),
        ],
        test_fn,
    );
}

fn with_env(vars: &[(&str, &str)], test_fn: impl FnOnce()) {
    static ENV_LOCK: OnceLock<Mutex<()>> = OnceLock::new();
    let _guard = ENV_LOCK
        .get_or_init(|| Mutex::new(()))
        .lock()
        .unwrap_or_else(|poisoned| poisoned.into_inner());

    let keys = [
        "WSGATE_WORKSPACES_ROOT",
        "WSGATE_GATEWAY_CONTAINER_URL",
        "WSGATE_GATEWAY_HOST_URL",
        "WSGATE_GATEWAY_PROBE_TIMEOUT_SECS",
        "WSGATE_RUNTIME_COMPOSE_PROGRAM",
        "WSGATE_RUNTIME_RESTART_TIMEOUT_SECS",
        "WSGATE_REGISTRY_URL",
        "WSGATE_REGISTRY_MAX_CONNECTIONS",
        "WSGATE_REGISTRY_TIMEOUT_SECS",
        "WSGATE_LOGGING_LEVEL",
        "WSGATE_LOGGING_FORMAT",
        "WSGATE_LOG_LEVEL",
        "WSGATE_LOG_FORMAT",
    ];

    let previous_values: Vec<(&str, Option<String>)> =
        keys.iter().map(|key| (*key, env::var(key).ok())).collect();

    for key in &keys {
        env::remove_var(key);
    }
    for (key, value) in vars {
        env::set_var(key, value);
    }

    test_fn();

    for (key, value) in previous_values {
        if let Some(value) = value {
            env::set_var(key, value);
        } else {
            env::remove_var(key);
        }
    }
}
