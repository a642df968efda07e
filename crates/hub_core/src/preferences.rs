use std::{
    path::{Path, PathBuf},
    sync::{Mutex, PoisonError},
};

use anyhow::{anyhow, Context};
use shared::hub::PersistedPreferences;

const PREFERENCES_FILE: &str = "preferences.json";

/// Where the last active mode is remembered between runs.
///
/// Failures are reported to the caller, which treats them as non-fatal.
pub trait PreferenceStore: Send + Sync {
    fn load_mode(&self) -> anyhow::Result<Option<String>>;
    fn save_mode(&self, mode: &str) -> anyhow::Result<()>;
}

/// `preferences.json` in a directory of its own.
#[derive(Debug, Clone)]
pub struct JsonPreferenceStore {
    path: PathBuf,
}

impl JsonPreferenceStore {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    /// `<config dir>/hubshell/preferences.json`, or `None` when the platform
    /// has no user config directory.
    pub fn in_user_config_dir() -> Option<Self> {
        dirs::config_dir().map(|base| Self::new(base.join("hubshell").join(PREFERENCES_FILE)))
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    fn read(&self) -> anyhow::Result<PersistedPreferences> {
        let text = match std::fs::read_to_string(&self.path) {
            Ok(text) => text,
            Err(err) if err.kind() == std::io::ErrorKind::NotFound => {
                return Ok(PersistedPreferences::default())
            }
            Err(err) => {
                return Err(err).with_context(|| format!("failed to read {}", self.path.display()))
            }
        };
        serde_json::from_str(&text)
            .with_context(|| format!("failed to parse preferences at {}", self.path.display()))
    }
}

impl PreferenceStore for JsonPreferenceStore {
    fn load_mode(&self) -> anyhow::Result<Option<String>> {
        Ok(self.read()?.mode)
    }

    fn save_mode(&self, mode: &str) -> anyhow::Result<()> {
        let parent = self
            .path
            .parent()
            .ok_or_else(|| anyhow!("preferences path {} has no parent", self.path.display()))?;
        std::fs::create_dir_all(parent)
            .with_context(|| format!("could not prepare preferences directory '{}'", parent.display()))?;

        let mut preferences = self.read().unwrap_or_default();
        preferences.mode = Some(mode.to_string());
        let serialized = serde_json::to_string_pretty(&preferences)?;
        std::fs::write(&self.path, serialized)
            .with_context(|| format!("failed to write {}", self.path.display()))
    }
}

/// Keeps the mode in memory only. Used when no config directory exists.
#[derive(Debug, Default)]
pub struct MemoryPreferenceStore {
    mode: Mutex<Option<String>>,
}

impl MemoryPreferenceStore {
    pub fn with_mode(mode: impl Into<String>) -> Self {
        Self {
            mode: Mutex::new(Some(mode.into())),
        }
    }
}

impl PreferenceStore for MemoryPreferenceStore {
    fn load_mode(&self) -> anyhow::Result<Option<String>> {
        Ok(self.mode.lock().unwrap_or_else(PoisonError::into_inner).clone())
    }

    fn save_mode(&self, mode: &str) -> anyhow::Result<()> {
        *self.mode.lock().unwrap_or_else(PoisonError::into_inner) = Some(mode.to_string());
        Ok(())
    }
}
