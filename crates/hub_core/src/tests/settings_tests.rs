use super::*;

use std::collections::HashMap;

fn lookup_from(pairs: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
    let vars: HashMap<String, String> = pairs
        .iter()
        .map(|(k, v)| (k.to_string(), v.to_string()))
        .collect();
    move |name| vars.get(name).cloned()
}

#[test]
fn defaults_match_documented_values() {
    let settings = HubSettings::default();
    assert_eq!(settings.hub_document, "./hubData.json");
    assert_eq!(settings.search_endpoint, "https://swisscows.com/web?query=");
    assert_eq!(settings.default_home.as_deref(), Some("https://archive.org"));
    assert_eq!(settings.fallback_window(), Duration::from_millis(4_500));
    assert_eq!(settings.notice_duration(), Duration::from_secs(4));

    let policy = settings.fetch_policy().expect("valid");
    assert_eq!(policy.max_attempts(), 3);
    assert_eq!(policy.per_attempt_timeout(), Duration::from_secs(15));
}

#[test]
fn env_overrides_replace_values() {
    let mut settings = HubSettings::default();
    apply_env_overrides(
        &mut settings,
        lookup_from(&[
            ("HUBSHELL__HUB_DOCUMENT", "https://hub.example/hubData.json"),
            ("HUBSHELL__FALLBACK_WINDOW_MS", "2000"),
            ("HUBSHELL__FETCH_MAX_ATTEMPTS", " 5 "),
            ("HUBSHELL__DEFAULT_HOME", ""),
            ("HUBSHELL__NEWS_FEED", "https://feeds.example/rss"),
        ]),
    );

    assert_eq!(settings.hub_document, "https://hub.example/hubData.json");
    assert_eq!(settings.fallback_window_ms, 2_000);
    assert_eq!(settings.fetch_max_attempts, 5);
    assert_eq!(settings.default_home, None);
    assert_eq!(settings.news_feed.as_deref(), Some("https://feeds.example/rss"));
}

#[test]
fn invalid_numeric_overrides_are_ignored() {
    let mut settings = HubSettings::default();
    apply_env_overrides(
        &mut settings,
        lookup_from(&[
            ("HUBSHELL__FETCH_TIMEOUT_MS", "soon"),
            ("HUBSHELL__FETCH_MAX_ATTEMPTS", "-1"),
        ]),
    );
    assert_eq!(settings, HubSettings::default());
}

#[test]
fn zero_attempts_yield_invalid_policy() {
    let settings = HubSettings {
        fetch_max_attempts: 0,
        ..HubSettings::default()
    };
    assert!(matches!(
        settings.fetch_policy(),
        Err(BoundedError::InvalidPolicy(_))
    ));
}

#[test]
fn reads_settings_file() {
    let dir = tempfile::tempdir().expect("tempdir");
    let path = dir.path().join("hubshell.toml");
    fs::write(
        &path,
        r#"
hub_document = "/srv/hub/hubData.json"
fallback_window_ms = 6000
news_feed = ""
"#,
    )
    .expect("write");

    let settings = load_settings_file(&path).expect("valid").expect("present");
    assert_eq!(settings.hub_document, "/srv/hub/hubData.json");
    assert_eq!(settings.fallback_window_ms, 6_000);
    assert_eq!(settings.news_feed, None);
    assert_eq!(settings.fetch_timeout_ms, 15_000);
}

#[test]
fn missing_file_is_not_an_error() {
    let dir = tempfile::tempdir().expect("tempdir");
    assert!(load_settings_file(&dir.path().join("absent.toml"))
        .expect("no error")
        .is_none());
}

#[test]
fn malformed_file_is_reported() {
    let dir = tempfile::tempdir().expect("tempdir");
    let path = dir.path().join("hubshell.toml");
    fs::write(&path, "fallback_window_ms = \"soon\"\n").expect("write");
    assert!(matches!(
        load_settings_file(&path),
        Err(SettingsError::Parse { .. })
    ));

    fs::write(&path, "unknown_key = 1\n").expect("write");
    assert!(matches!(
        load_settings_file(&path),
        Err(SettingsError::Parse { .. })
    ));
}
