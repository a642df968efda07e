use std::{
    fs,
    path::{Path, PathBuf},
    time::Duration,
};

use serde::Deserialize;
use thiserror::Error;
use tracing::{debug, warn};

use crate::{
    bounded::{BoundedError, RetryPolicy},
    feed::DEFAULT_NEWS_FEED,
    load_session::{SessionConfig, DEFAULT_BLACKLIST, DEFAULT_SEARCH_ENDPOINT},
};

pub const CONFIG_PATH_ENV: &str = "HUBSHELL_CONFIG";
pub const DEFAULT_CONFIG_FILE: &str = "hubshell.toml";

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HubSettings {
    pub hub_document: String,
    pub search_endpoint: String,
    pub default_home: Option<String>,
    pub fallback_window_ms: u64,
    pub fetch_timeout_ms: u64,
    pub fetch_max_attempts: u32,
    pub notice_duration_ms: u64,
    pub news_feed: Option<String>,
}

impl Default for HubSettings {
    fn default() -> Self {
        Self {
            hub_document: "./hubData.json".into(),
            search_endpoint: DEFAULT_SEARCH_ENDPOINT.into(),
            default_home: Some("https://archive.org".into()),
            fallback_window_ms: 4_500,
            fetch_timeout_ms: 15_000,
            fetch_max_attempts: 3,
            notice_duration_ms: 4_000,
            news_feed: Some(DEFAULT_NEWS_FEED.into()),
        }
    }
}

impl HubSettings {
    pub fn fallback_window(&self) -> Duration {
        Duration::from_millis(self.fallback_window_ms)
    }

    pub fn notice_duration(&self) -> Duration {
        Duration::from_millis(self.notice_duration_ms)
    }

    pub fn fetch_policy(&self) -> Result<RetryPolicy, BoundedError> {
        RetryPolicy::new(
            self.fetch_max_attempts,
            Duration::from_millis(self.fetch_timeout_ms),
        )
    }

    pub fn session_config(&self) -> SessionConfig {
        SessionConfig {
            search_endpoint: self.search_endpoint.clone(),
            fallback_window: self.fallback_window(),
            default_home: self.default_home.clone(),
            blacklist: DEFAULT_BLACKLIST.iter().map(|domain| domain.to_string()).collect(),
        }
    }
}

#[derive(Debug, Error)]
pub enum SettingsError {
    #[error("failed to read settings file {path}: {source}")]
    Read {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("invalid settings file {path}: {source}")]
    Parse {
        path: PathBuf,
        #[source]
        source: toml::de::Error,
    },
}

#[derive(Debug, Default, Deserialize)]
#[serde(default, deny_unknown_fields)]
struct SettingsFile {
    hub_document: Option<String>,
    search_endpoint: Option<String>,
    default_home: Option<String>,
    fallback_window_ms: Option<u64>,
    fetch_timeout_ms: Option<u64>,
    fetch_max_attempts: Option<u32>,
    notice_duration_ms: Option<u64>,
    news_feed: Option<String>,
}

/// Defaults, then the settings file, then `HUBSHELL__*` variables.
/// An unreadable or invalid file is reported and skipped.
pub fn load_settings() -> HubSettings {
    let path = std::env::var(CONFIG_PATH_ENV)
        .map(PathBuf::from)
        .unwrap_or_else(|_| PathBuf::from(DEFAULT_CONFIG_FILE));

    let mut settings = HubSettings::default();
    match read_settings_file(&path) {
        Ok(Some(file)) => {
            debug!(path = %path.display(), "settings: loaded file");
            apply_file(&mut settings, file);
        }
        Ok(None) => {}
        Err(err) => warn!("settings: {err}"),
    }
    apply_env_overrides(&mut settings, |name| std::env::var(name).ok());
    settings
}

/// Reads `path` strictly. A missing file is `Ok(None)`.
pub fn load_settings_file(path: &Path) -> Result<Option<HubSettings>, SettingsError> {
    Ok(read_settings_file(path)?.map(|file| {
        let mut settings = HubSettings::default();
        apply_file(&mut settings, file);
        settings
    }))
}

fn read_settings_file(path: &Path) -> Result<Option<SettingsFile>, SettingsError> {
    let raw = match fs::read_to_string(path) {
        Ok(raw) => raw,
        Err(err) if err.kind() == std::io::ErrorKind::NotFound => return Ok(None),
        Err(source) => {
            return Err(SettingsError::Read {
                path: path.to_path_buf(),
                source,
            })
        }
    };
    toml::from_str(&raw)
        .map(Some)
        .map_err(|source| SettingsError::Parse {
            path: path.to_path_buf(),
            source,
        })
}

fn apply_file(settings: &mut HubSettings, file: SettingsFile) {
    if let Some(v) = file.hub_document {
        settings.hub_document = v;
    }
    if let Some(v) = file.search_endpoint {
        settings.search_endpoint = v;
    }
    if let Some(v) = file.default_home {
        settings.default_home = non_empty(v);
    }
    if let Some(v) = file.fallback_window_ms {
        settings.fallback_window_ms = v;
    }
    if let Some(v) = file.fetch_timeout_ms {
        settings.fetch_timeout_ms = v;
    }
    if let Some(v) = file.fetch_max_attempts {
        settings.fetch_max_attempts = v;
    }
    if let Some(v) = file.notice_duration_ms {
        settings.notice_duration_ms = v;
    }
    if let Some(v) = file.news_feed {
        settings.news_feed = non_empty(v);
    }
}

/// Applies `HUBSHELL__*` overrides looked up through `lookup`. Empty
/// `DEFAULT_HOME` or `NEWS_FEED` values switch the feature off.
pub fn apply_env_overrides(settings: &mut HubSettings, lookup: impl Fn(&str) -> Option<String>) {
    if let Some(v) = lookup("HUBSHELL__HUB_DOCUMENT") {
        settings.hub_document = v;
    }
    if let Some(v) = lookup("HUBSHELL__SEARCH_ENDPOINT") {
        settings.search_endpoint = v;
    }
    if let Some(v) = lookup("HUBSHELL__DEFAULT_HOME") {
        settings.default_home = non_empty(v);
    }
    if let Some(v) = lookup("HUBSHELL__NEWS_FEED") {
        settings.news_feed = non_empty(v);
    }

    if let Some(v) = parse_number(&lookup, "HUBSHELL__FALLBACK_WINDOW_MS") {
        settings.fallback_window_ms = v;
    }
    if let Some(v) = parse_number(&lookup, "HUBSHELL__FETCH_TIMEOUT_MS") {
        settings.fetch_timeout_ms = v;
    }
    if let Some(v) = parse_number(&lookup, "HUBSHELL__FETCH_MAX_ATTEMPTS") {
        settings.fetch_max_attempts = v;
    }
}

fn parse_number<T: std::str::FromStr>(
    lookup: &impl Fn(&str) -> Option<String>,
    name: &str,
) -> Option<T> {
    let raw = lookup(name)?;
    match raw.trim().parse::<T>() {
        Ok(parsed) => Some(parsed),
        Err(_) => {
            warn!(variable = name, value = %raw, "settings: ignoring non-numeric override");
            None
        }
    }
}

fn non_empty(value: String) -> Option<String> {
    let trimmed = value.trim();
    (!trimmed.is_empty()).then(|| trimmed.to_string())
}

#[cfg(test)]
#[path = "tests/settings_tests.rs"]
mod tests;
