//! User-editable application settings.

use serde::{Deserialize, Serialize};
use std::fs;
use std::path::Path;
use std::time::Duration;
use tracing::warn;

use crate::error::ConfigError;

/// Default chat request timeout in seconds.
pub const DEFAULT_CHAT_TIMEOUT_SECS: u64 = 180;

/// Settings persisted as `settings.json` in the data directory.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct AppSettings {
    /// Global preamble placed before every profile's system prompt.
    pub main_prompt: String,
    pub user_name: String,
    /// Chat request timeout in seconds.
    pub chat_timeout: u64,
}

impl Default for AppSettings {
    fn default() -> Self {
        Self {
            main_prompt: String::new(),
            user_name: "User".to_string(),
            chat_timeout: DEFAULT_CHAT_TIMEOUT_SECS,
        }
    }
}

impl AppSettings {
    /// Load settings; a missing or corrupt file is replaced with defaults.
    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        let parsed = fs::read_to_string(path)
            .ok()
            .and_then(|content| match serde_json::from_str(&content) {
                Ok(settings) => Some(settings),
                Err(e) => {
                    warn!("Ignoring unreadable settings file {:?}: {}", path, e);
                    None
                }
            });

        match parsed {
            Some(settings) => Ok(settings),
            None => {
                let settings = Self::default();
                settings.save(path)?;
                Ok(settings)
            }
        }
    }

    pub fn save(&self, path: &Path) -> Result<(), ConfigError> {
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent)?;
        }
        fs::write(path, serde_json::to_string_pretty(self)?)?;
        Ok(())
    }

    /// Chat timeout, falling back to the default when unset.
    pub fn chat_timeout(&self) -> Duration {
        if self.chat_timeout == 0 {
            Duration::from_secs(DEFAULT_CHAT_TIMEOUT_SECS)
        } else {
            Duration::from_secs(self.chat_timeout)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[test]
    fn test_missing_file_writes_defaults() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("settings.json");

        let settings = AppSettings::load(&path).unwrap();
        assert_eq!(settings, AppSettings::default());
        assert!(path.exists());
    }

    #[test]
    fn test_corrupt_file_replaced() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("settings.json");
        fs::write(&path, "{not json").unwrap();

        let settings = AppSettings::load(&path).unwrap();
        assert_eq!(settings.chat_timeout, 180);

        let rewritten = fs::read_to_string(&path).unwrap();
        assert!(rewritten.contains("\"chat_timeout\": 180"));
    }

    #[test]
    fn test_partial_file_fills_defaults() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("settings.json");
        fs::write(&path, r#"{"main_prompt":"Be brief."}"#).unwrap();

        let settings = AppSettings::load(&path).unwrap();
        assert_eq!(settings.main_prompt, "Be brief.");
        assert_eq!(settings.user_name, "User");
        assert_eq!(settings.chat_timeout(), Duration::from_secs(180));
    }
}
