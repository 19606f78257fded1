use std::{collections::HashMap, fs, path::Path, time::Duration};

use anyhow::Context;
use serde::Deserialize;

pub const DEFAULT_CONFIG_FILE: &str = "console.toml";

#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct Settings {
    pub api_url: String,
    pub region: Option<String>,
    pub poll_interval_secs: u64,
    pub request_timeout_secs: u64,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            api_url: "http://127.0.0.1:5001".into(),
            region: None,
            poll_interval_secs: 5,
            request_timeout_secs: 30,
        }
    }
}

impl Settings {
    pub fn poll_interval(&self) -> Duration {
        Duration::from_secs(self.poll_interval_secs.max(1))
    }

    pub fn request_timeout(&self) -> Duration {
        Duration::from_secs(self.request_timeout_secs.max(1))
    }
}

/// Defaults, then `console.toml` (or `path`), then environment variables.
/// `APP__*` variables win over the plain ones.
pub fn load_settings(path: Option<&Path>) -> anyhow::Result<Settings> {
    let path = path.unwrap_or_else(|| Path::new(DEFAULT_CONFIG_FILE));
    let raw = match fs::read_to_string(path) {
        Ok(raw) => Some(raw),
        Err(err) if err.kind() == std::io::ErrorKind::NotFound => None,
        Err(err) => {
            return Err(err).with_context(|| format!("reading {}", path.display()));
        }
    };
    resolve_settings(raw.as_deref(), |key| std::env::var(key).ok())
        .with_context(|| format!("loading settings from {}", path.display()))
}

pub(crate) fn resolve_settings(
    file: Option<&str>,
    env: impl Fn(&str) -> Option<String>,
) -> anyhow::Result<Settings> {
    let mut settings = Settings::default();

    if let Some(raw) = file {
        let file_cfg: HashMap<String, toml::Value> =
            toml::from_str(raw).context("parsing settings file")?;
        let text = |key: &str| {
            file_cfg.get(key).map(|value| match value {
                toml::Value::String(text) => text.clone(),
                other => other.to_string(),
            })
        };
        if let Some(v) = text("api_url") {
            settings.api_url = v;
        }
        if let Some(v) = text("region") {
            settings.region = Some(v);
        }
        if let Some(v) = text("poll_interval_secs") {
            settings.poll_interval_secs = parse_secs("poll_interval_secs", &v)?;
        }
        if let Some(v) = text("request_timeout_secs") {
            settings.request_timeout_secs = parse_secs("request_timeout_secs", &v)?;
        }
    }

    if let Some(v) = env("PCUI_API_URL") {
        settings.api_url = v;
    }
    if let Some(v) = env("APP__API_URL") {
        settings.api_url = v;
    }

    if let Some(v) = env("PCUI_REGION") {
        settings.region = Some(v);
    }
    if let Some(v) = env("APP__REGION") {
        settings.region = Some(v);
    }

    if let Some(v) = env("APP__POLL_INTERVAL_SECS") {
        settings.poll_interval_secs = parse_secs("APP__POLL_INTERVAL_SECS", &v)?;
    }
    if let Some(v) = env("APP__REQUEST_TIMEOUT_SECS") {
        settings.request_timeout_secs = parse_secs("APP__REQUEST_TIMEOUT_SECS", &v)?;
    }

    settings.region = settings.region.filter(|region| !region.trim().is_empty());
    Ok(settings)
}

fn parse_secs(key: &str, value: &str) -> anyhow::Result<u64> {
    value
        .trim()
        .parse()
        .with_context(|| format!("{key} must be a whole number of seconds, got {value:?}"))
}

#[cfg(test)]
#[path = "tests/config_tests.rs"]
mod tests;
