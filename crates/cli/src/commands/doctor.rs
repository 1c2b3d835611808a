use std::time::Duration;

use anyhow::Context;
use serde::Serialize;
use wsgate_core::config::{AppConfig, LoadOptions};
use wsgate_db::open_registry;

use crate::commands::{CommandResult, EXIT_CONFIG};

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
enum CheckStatus {
    Pass,
    Fail,
    Skipped,
}

#[derive(Debug, Serialize)]
struct DoctorCheck {
    name: &'static str,
    status: CheckStatus,
    details: String,
}

#[derive(Debug, Serialize)]
struct DoctorReport {
    overall_status: CheckStatus,
    summary: String,
    checks: Vec<DoctorCheck>,
}

const CHECK_NAMES: [&str; 3] = ["registry_connectivity", "workspaces_root", "gateway_reachability"];

pub fn run(json_output: bool) -> CommandResult {
    let report = build_report();
    let exit_code = if report.overall_status == CheckStatus::Pass { 0 } else { EXIT_CONFIG };

    let output = if json_output {
        serde_json::to_string_pretty(&report).unwrap_or_else(|error| {
            format!(
                "{{\"overall_status\":\"fail\",\"summary\":\"doctor serialization failed\",\"error\":\"{}\"}}",
                escape_json(&error.to_string())
            )
        })
    } else {
        render_human(&report)
    };

    CommandResult { exit_code, output }
}

fn build_report() -> DoctorReport {
    let mut checks = Vec::new();

    match AppConfig::load(LoadOptions::default()) {
        Ok(config) => {
            checks.push(DoctorCheck {
                name: "config_validation",
                status: CheckStatus::Pass,
                details: "configuration loaded and validated".to_string(),
            });
            checks.extend(run_environment_checks(&config));
        }
        Err(error) => {
            checks.push(DoctorCheck {
                name: "config_validation",
                status: CheckStatus::Fail,
                details: error.to_string(),
            });
            checks.extend(CHECK_NAMES.into_iter().map(|name| DoctorCheck {
                name,
                status: CheckStatus::Skipped,
                details: "skipped because configuration did not load".to_string(),
            }));
        }
    }

    let all_pass = checks.iter().all(|check| check.status == CheckStatus::Pass);
    let overall_status = if all_pass { CheckStatus::Pass } else { CheckStatus::Fail };
    let summary = if all_pass {
        "doctor: all readiness checks passed".to_string()
    } else {
        "doctor: one or more readiness checks failed".to_string()
    };

    DoctorReport { overall_status, summary, checks }
}

fn run_environment_checks(config: &AppConfig) -> Vec<DoctorCheck> {
    let runtime = match tokio::runtime::Builder::new_current_thread().enable_all().build() {
        Ok(runtime) => runtime,
        Err(error) => {
            return CHECK_NAMES
                .into_iter()
                .map(|name| DoctorCheck {
                    name,
                    status: CheckStatus::Fail,
                    details: format!("failed to initialize async runtime: {error}"),
                })
                .collect();
        }
    };

    runtime.block_on(async {
        vec![
            check_registry(config).await,
            check_workspaces_root(config),
            check_gateway(config).await,
        ]
    })
}

async fn check_registry(config: &AppConfig) -> DoctorCheck {
    match open_registry(&config.registry).await {
        Ok(pool) => {
            pool.close().await;
            DoctorCheck {
                name: "registry_connectivity",
                status: CheckStatus::Pass,
                details: format!("connected and migrated `{}`", config.registry.url),
            }
        }
        Err(error) => DoctorCheck {
            name: "registry_connectivity",
            status: CheckStatus::Fail,
            details: error.to_string(),
        },
    }
}

fn check_workspaces_root(config: &AppConfig) -> DoctorCheck {
    let root = &config.workspaces.root;
    if root.is_dir() {
        DoctorCheck {
            name: "workspaces_root",
            status: CheckStatus::Pass,
            details: format!("`{}` exists", root.display()),
        }
    } else {
        DoctorCheck {
            name: "workspaces_root",
            status: CheckStatus::Fail,
            details: format!("`{}` is not a directory", root.display()),
        }
    }
}

async fn check_gateway(config: &AppConfig) -> DoctorCheck {
    match probe_gateway(&config.gateway.host_url, config.gateway.probe_timeout_secs).await {
        Ok(details) => {
            DoctorCheck { name: "gateway_reachability", status: CheckStatus::Pass, details }
        }
        Err(error) => DoctorCheck {
            name: "gateway_reachability",
            status: CheckStatus::Fail,
            details: format!("{error:#}"),
        },
    }
}

async fn probe_gateway(host_url: &str, timeout_secs: u64) -> anyhow::Result<String> {
    let url = format!("{}/health", host_url.trim_end_matches('/'));
    let client = reqwest::Client::builder()
        .timeout(Duration::from_secs(timeout_secs))
        .build()
        .context("failed to build http client")?;
    let response = client
        .get(&url)
        .send()
        .await
        .with_context(|| format!("gateway at `{url}` is unreachable"))?
        .error_for_status()
        .with_context(|| format!("gateway at `{url}` reported unhealthy"))?;
    Ok(format!("`{url}` answered {}", response.status()))
}

fn render_human(report: &DoctorReport) -> String {
    let mut lines = Vec::new();
    lines.push(report.summary.clone());

    for check in &report.checks {
        let marker = match check.status {
            CheckStatus::Pass => "ok",
            CheckStatus::Fail => "fail",
            CheckStatus::Skipped => "skip",
        };
        lines.push(format!("- [{marker}] {}: {}", check.name, check.details));
    }

    lines.join("\n")
}

fn escape_json(value: &str) -> String {
    value.replace('\\', "\\\\").replace('"', "\\\"")
}
