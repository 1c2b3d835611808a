//! Deterministic naming for workspaces.
//!
//! A workspace is identified by its `team_env` slug, built from the team name and
//! environment token. Table and storage prefixes are derived from that slug, so two
//! workspaces share a prefix only if they share a slug. Environment tokens never
//! contain `_`, which lets a `team_env` be split back at its last underscore and keeps
//! the mapping from (team slug, environment) to prefixes injective.

use std::collections::BTreeSet;
use std::ops::RangeInclusive;

/// Host port used when an environment has no dedicated slot.
pub const FALLBACK_HOST_PORT: u16 = 8519;

/// Ports handed out when the preferred slot for an environment is already taken.
pub const OVERFLOW_PORTS: RangeInclusive<u16> = 8520..=8599;

pub fn slugify(value: &str) -> String {
    let mut slug = String::with_capacity(value.len());
    let mut in_run = false;

    for ch in value.trim().chars().flat_map(char::to_lowercase) {
        if ch.is_ascii_alphanumeric() || ch == '_' {
            slug.push(ch);
            in_run = false;
        } else if !in_run {
            slug.push('_');
            in_run = true;
        }
    }

    match slug.chars().next() {
        Some(first) if first.is_ascii_alphabetic() => slug,
        _ => format!("a_{slug}"),
    }
}

pub fn team_env_slug(team_name: &str, environment: &str) -> String {
    format!("{}_{}", slugify(team_name), environment)
}

/// Returns `(table_prefix, storage_prefix)` for a `team_env` slug.
pub fn prefixes(team_env: &str) -> (String, String) {
    (format!("{team_env}_"), format!("{team_env}/"))
}

/// Splits a `team_env` slug into its team slug and environment token.
pub fn split_team_env(team_env: &str) -> Option<(&str, &str)> {
    let (team, environment) = team_env.rsplit_once('_')?;
    if team.is_empty() || environment.is_empty() {
        return None;
    }
    Some((team, environment))
}

pub fn is_valid_slug(value: &str) -> bool {
    let mut chars = value.chars();
    matches!(chars.next(), Some(first) if first.is_ascii_lowercase())
        && chars.all(|ch| ch.is_ascii_lowercase() || ch.is_ascii_digit() || ch == '_')
}

pub fn is_valid_environment(value: &str) -> bool {
    let mut chars = value.chars();
    matches!(chars.next(), Some(first) if first.is_ascii_lowercase())
        && chars.all(|ch| ch.is_ascii_lowercase() || ch.is_ascii_digit())
}

/// Port the application listens on inside its container.
pub fn container_port(runtime: &str) -> u16 {
    match runtime.trim().to_ascii_lowercase().as_str() {
        "django" => 8000,
        "flask" => 8501,
        ".net" | "java" => 8080,
        "python" => 8001,
        _ => 8501,
    }
}

pub fn preferred_host_port(environment: &str) -> u16 {
    match environment {
        "dev" => 8510,
        "qa" => 8511,
        "prod" => 8512,
        _ => FALLBACK_HOST_PORT,
    }
}

/// Picks the preferred port for the environment, or the first free overflow port.
pub fn allocate_host_port(environment: &str, taken: &BTreeSet<u16>) -> Option<u16> {
    let preferred = preferred_host_port(environment);
    if !taken.contains(&preferred) {
        return Some(preferred);
    }
    OVERFLOW_PORTS.into_iter().find(|port| !taken.contains(port))
}
