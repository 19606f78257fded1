use std::{
    collections::HashMap,
    env, fs,
    time::{Duration, SystemTime, UNIX_EPOCH},
};

use super::{load_settings, resolve_settings, Settings};

fn env_of(pairs: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
    let vars: HashMap<String, String> = pairs
        .iter()
        .map(|(k, v)| (k.to_string(), v.to_string()))
        .collect();
    move |key| vars.get(key).cloned()
}

#[test]
fn defaults_without_file_or_env() {
    let settings = resolve_settings(None, env_of(&[])).expect("settings");
    assert_eq!(settings, Settings::default());
    assert_eq!(settings.poll_interval(), Duration::from_secs(5));
}

#[test]
fn file_values_override_defaults() {
    let raw = r#"
api_url = "https://console.example.com"
region = "eu-west-1"
poll_interval_secs = 10
request_timeout_secs = "45"
"#;
    let settings = resolve_settings(Some(raw), env_of(&[])).expect("settings");

    assert_eq!(settings.api_url, "https://console.example.com");
    assert_eq!(settings.region.as_deref(), Some("eu-west-1"));
    assert_eq!(settings.poll_interval_secs, 10);
    assert_eq!(settings.request_timeout(), Duration::from_secs(45));
}

#[test]
fn app_prefixed_env_wins_over_plain_env_and_file() {
    let settings = resolve_settings(
        Some("api_url = \"http://file\"\nregion = \"us-east-1\""),
        env_of(&[
            ("PCUI_API_URL", "http://plain"),
            ("APP__API_URL", "http://app"),
            ("PCUI_REGION", "eu-central-1"),
            ("APP__POLL_INTERVAL_SECS", "2"),
        ]),
    )
    .expect("settings");

    assert_eq!(settings.api_url, "http://app");
    assert_eq!(settings.region.as_deref(), Some("eu-central-1"));
    assert_eq!(settings.poll_interval_secs, 2);
}

#[test]
fn blank_region_means_unset() {
    let settings =
        resolve_settings(None, env_of(&[("APP__REGION", "  ")])).expect("settings");
    assert_eq!(settings.region, None);
}

#[test]
fn malformed_numbers_are_rejected() {
    let err = resolve_settings(None, env_of(&[("APP__REQUEST_TIMEOUT_SECS", "soon")]))
        .expect_err("bad timeout");
    assert!(err.to_string().contains("APP__REQUEST_TIMEOUT_SECS"));
}

#[test]
fn zero_interval_is_clamped() {
    let settings = Settings {
        poll_interval_secs: 0,
        ..Settings::default()
    };
    assert_eq!(settings.poll_interval(), Duration::from_secs(1));
}

#[test]
fn missing_file_falls_back_to_defaults() {
    let suffix = SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .expect("clock")
        .as_nanos();
    let path = env::temp_dir().join(format!("pcui_console_missing_{suffix}.toml"));

    let settings = load_settings(Some(&path)).expect("settings");
    assert!(!settings.api_url.is_empty());
}

#[test]
fn unreadable_toml_is_an_error() {
    let suffix = SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .expect("clock")
        .as_nanos();
    let path = env::temp_dir().join(format!("pcui_console_bad_{suffix}.toml"));
    fs::write(&path, "api_url = [unclosed").expect("write");

    assert!(load_settings(Some(&path)).is_err());

    fs::remove_file(path).expect("cleanup");
}
