use std::{fs, path::Path, time::Duration};

use serde::Deserialize;
use shared::domain::{Reviewer, ReviewerRole};
use tracing::warn;

pub const SETTINGS_FILE: &str = "console.toml";

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ConsoleSettings {
    /// `None` runs the console without a backend; every call is unavailable.
    pub api_base_url: Option<String>,
    pub api_token: Option<String>,
    pub cache_ttl_ms: u64,
    pub refresh_grace_period_ms: u64,
    pub request_timeout_secs: u64,
    pub reviewer_id: String,
    pub reviewer_name: String,
    pub reviewer_role: ReviewerRole,
}

impl Default for ConsoleSettings {
    fn default() -> Self {
        Self {
            api_base_url: None,
            api_token: None,
            cache_ttl_ms: 300_000,
            refresh_grace_period_ms: 2_000,
            request_timeout_secs: 30,
            reviewer_id: "console".into(),
            reviewer_name: "Console Operator".into(),
            reviewer_role: ReviewerRole::Employee,
        }
    }
}

impl ConsoleSettings {
    pub fn cache_ttl(&self) -> Duration {
        Duration::from_millis(self.cache_ttl_ms)
    }

    pub fn refresh_grace_period(&self) -> Duration {
        Duration::from_millis(self.refresh_grace_period_ms)
    }

    pub fn request_timeout(&self) -> Duration {
        Duration::from_secs(self.request_timeout_secs)
    }

    pub fn reviewer(&self) -> Reviewer {
        Reviewer {
            id: self.reviewer_id.clone(),
            name: self.reviewer_name.clone(),
            role: self.reviewer_role,
        }
    }
}

#[derive(Debug, Default, Deserialize)]
struct FileSettings {
    api_base_url: Option<String>,
    api_token: Option<String>,
    cache_ttl_ms: Option<u64>,
    refresh_grace_period_ms: Option<u64>,
    request_timeout_secs: Option<u64>,
    reviewer_id: Option<String>,
    reviewer_name: Option<String>,
    reviewer_role: Option<ReviewerRole>,
}

pub fn load_settings(path: Option<&Path>) -> ConsoleSettings {
    load_settings_from(path.unwrap_or(Path::new(SETTINGS_FILE)), |key| {
        std::env::var(key).ok()
    })
}

/// Defaults, then the TOML file at `path` if it exists, then `APP__*`
/// variables looked up through `env`.
pub fn load_settings_from(path: &Path, env: impl Fn(&str) -> Option<String>) -> ConsoleSettings {
    let mut settings = ConsoleSettings::default();

    if let Ok(raw) = fs::read_to_string(path) {
        match toml::from_str::<FileSettings>(&raw) {
            Ok(file_cfg) => apply_file(&mut settings, file_cfg),
            Err(err) => warn!(path = %path.display(), error = %err, "ignoring unreadable settings file"),
        }
    }

    if let Some(v) = env("APP__API_BASE_URL") {
        settings.api_base_url = non_empty(v);
    }
    if let Some(v) = env("APP__API_TOKEN") {
        settings.api_token = non_empty(v);
    }
    if let Some(v) = env("APP__CACHE_TTL_MS") {
        parse_into(&mut settings.cache_ttl_ms, "APP__CACHE_TTL_MS", &v);
    }
    if let Some(v) = env("APP__REFRESH_GRACE_PERIOD_MS") {
        parse_into(
            &mut settings.refresh_grace_period_ms,
            "APP__REFRESH_GRACE_PERIOD_MS",
            &v,
        );
    }
    if let Some(v) = env("APP__REQUEST_TIMEOUT_SECS") {
        parse_into(&mut settings.request_timeout_secs, "APP__REQUEST_TIMEOUT_SECS", &v);
    }
    if let Some(v) = env("APP__REVIEWER_ID") {
        settings.reviewer_id = v;
    }
    if let Some(v) = env("APP__REVIEWER_NAME") {
        settings.reviewer_name = v;
    }
    if let Some(v) = env("APP__REVIEWER_ROLE") {
        match parse_role(&v) {
            Some(role) => settings.reviewer_role = role,
            None => warn!(value = %v, "ignoring unknown APP__REVIEWER_ROLE"),
        }
    }

    settings
}

fn apply_file(settings: &mut ConsoleSettings, file_cfg: FileSettings) {
    if let Some(v) = file_cfg.api_base_url {
        settings.api_base_url = non_empty(v);
    }
    if let Some(v) = file_cfg.api_token {
        settings.api_token = non_empty(v);
    }
    if let Some(v) = file_cfg.cache_ttl_ms {
        settings.cache_ttl_ms = v;
    }
    if let Some(v) = file_cfg.refresh_grace_period_ms {
        settings.refresh_grace_period_ms = v;
    }
    if let Some(v) = file_cfg.request_timeout_secs {
        settings.request_timeout_secs = v;
    }
    if let Some(v) = file_cfg.reviewer_id {
        settings.reviewer_id = v;
    }
    if let Some(v) = file_cfg.reviewer_name {
        settings.reviewer_name = v;
    }
    if let Some(v) = file_cfg.reviewer_role {
        settings.reviewer_role = v;
    }
}

fn parse_into(slot: &mut u64, key: &str, raw: &str) {
    match raw.trim().parse::<u64>() {
        Ok(parsed) => *slot = parsed,
        Err(err) => warn!(key, value = raw, error = %err, "ignoring non-numeric override"),
    }
}

fn parse_role(raw: &str) -> Option<ReviewerRole> {
    match raw.trim().to_ascii_lowercase().as_str() {
        "admin" => Some(ReviewerRole::Admin),
        "employee" => Some(ReviewerRole::Employee),
        _ => None,
    }
}

fn non_empty(value: String) -> Option<String> {
    let trimmed = value.trim();
    (!trimmed.is_empty()).then(|| trimmed.to_string())
}

#[cfg(test)]
#[path = "tests/config_tests.rs"]
mod tests;
