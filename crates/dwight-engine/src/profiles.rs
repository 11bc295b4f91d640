//! Model profiles: named (model, system prompt, temperature) bundles.

use serde::{Deserialize, Serialize};
use std::fs;
use std::path::Path;
use tracing::{debug, warn};

use crate::error::{ConfigError, ValidationError};

/// A named configuration a session runs under.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ModelProfile {
    pub name: String,
    /// Backend model identifier, e.g. `llama3.2:3b`.
    pub model: String,
    pub system_prompt: String,
    pub temperature: f32,
}

impl ModelProfile {
    pub fn new(
        name: impl Into<String>,
        model: impl Into<String>,
        system_prompt: impl Into<String>,
        temperature: f32,
    ) -> Self {
        Self {
            name: name.into(),
            model: model.into(),
            system_prompt: system_prompt.into(),
            temperature,
        }
    }

    fn validate(&self) -> Result<(), ValidationError> {
        if (0.0..=1.0).contains(&self.temperature) {
            Ok(())
        } else {
            Err(ValidationError::TemperatureOutOfRange(self.temperature))
        }
    }
}

/// The built-in profiles used when nothing is configured.
pub fn default_profiles() -> Vec<ModelProfile> {
    vec![
        ModelProfile::new(
            "Coder Assistant",
            "qwen2.5-coder:7b",
            "You are a helpful coding assistant. Provide clear, concise code examples.",
            0.7,
        ),
        ModelProfile::new(
            "General Assistant",
            "llama3.2:3b",
            "You are a helpful AI assistant.",
            0.8,
        ),
        ModelProfile::new(
            "Creative Writer",
            "llama3.2:3b",
            "You are a creative writing assistant. Be imaginative and descriptive.",
            0.9,
        ),
    ]
}

/// Ordered profiles with one marked current. Never empty.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ProfileSet {
    profiles: Vec<ModelProfile>,
    current_profile: usize,
}

impl Default for ProfileSet {
    fn default() -> Self {
        Self {
            profiles: default_profiles(),
            current_profile: 0,
        }
    }
}

impl ProfileSet {
    /// Build a set from explicit profiles; falls back to the defaults if empty.
    pub fn new(profiles: Vec<ModelProfile>) -> Self {
        if profiles.is_empty() {
            return Self::default();
        }
        Self {
            profiles,
            current_profile: 0,
        }
    }

    /// Load from disk. A missing or corrupt file is replaced with the defaults.
    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        if !path.exists() {
            debug!("No profile file at {:?}, writing defaults", path);
            let set = Self::default();
            set.save(path)?;
            return Ok(set);
        }

        let content = fs::read_to_string(path)?;
        let mut set: ProfileSet = match serde_json::from_str(&content) {
            Ok(set) => set,
            Err(e) => {
                warn!("Ignoring unreadable profile file {:?}: {}", path, e);
                let set = Self::default();
                set.save(path)?;
                return Ok(set);
            }
        };
        if set.profiles.is_empty() {
            warn!("Profile file {:?} has no profiles, using defaults", path);
            set.profiles = default_profiles();
        }
        if set.current_profile >= set.profiles.len() {
            set.current_profile = 0;
        }
        Ok(set)
    }

    pub fn save(&self, path: &Path) -> Result<(), ConfigError> {
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent)?;
        }
        fs::write(path, serde_json::to_string_pretty(self)?)?;
        Ok(())
    }

    pub fn profiles(&self) -> &[ModelProfile] {
        &self.profiles
    }

    pub fn len(&self) -> usize {
        self.profiles.len()
    }

    pub fn is_empty(&self) -> bool {
        self.profiles.is_empty()
    }

    pub fn current_index(&self) -> usize {
        self.current_profile
    }

    pub fn current(&self) -> &ModelProfile {
        &self.profiles[self.current_profile]
    }

    pub fn set_current(&mut self, index: usize) -> Result<&ModelProfile, ValidationError> {
        if index >= self.profiles.len() {
            return Err(ValidationError::ProfileOutOfRange {
                index,
                len: self.profiles.len(),
            });
        }
        self.current_profile = index;
        Ok(self.current())
    }

    /// Cycle forward, wrapping around.
    pub fn next(&mut self) -> &ModelProfile {
        self.current_profile = (self.current_profile + 1) % self.profiles.len();
        self.current()
    }

    /// Cycle backward, wrapping around.
    pub fn previous(&mut self) -> &ModelProfile {
        let len = self.profiles.len();
        self.current_profile = (self.current_profile + len - 1) % len;
        self.current()
    }

    pub fn add(&mut self, profile: ModelProfile) -> Result<usize, ValidationError> {
        profile.validate()?;
        self.profiles.push(profile);
        Ok(self.profiles.len() - 1)
    }

    pub fn update(&mut self, index: usize, profile: ModelProfile) -> Result<(), ValidationError> {
        profile.validate()?;
        let len = self.profiles.len();
        let slot = self
            .profiles
            .get_mut(index)
            .ok_or(ValidationError::ProfileOutOfRange { index, len })?;
        *slot = profile;
        Ok(())
    }

    pub fn remove(&mut self, index: usize) -> Result<ModelProfile, ValidationError> {
        let len = self.profiles.len();
        if index >= len {
            return Err(ValidationError::ProfileOutOfRange { index, len });
        }
        if len == 1 {
            return Err(ValidationError::LastProfile);
        }

        let removed = self.profiles.remove(index);
        if self.current_profile > index || self.current_profile >= self.profiles.len() {
            self.current_profile = self.current_profile.saturating_sub(1);
        }
        Ok(removed)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[test]
    fn test_cycle_wraps() {
        let mut set = ProfileSet::default();
        assert_eq!(set.current().name, "Coder Assistant");
        set.previous();
        assert_eq!(set.current().name, "Creative Writer");
        set.next();
        set.next();
        assert_eq!(set.current().name, "General Assistant");
    }

    #[test]
    fn test_set_current_out_of_range() {
        let mut set = ProfileSet::default();
        assert_eq!(
            set.set_current(7).unwrap_err(),
            ValidationError::ProfileOutOfRange { index: 7, len: 3 }
        );
        assert_eq!(set.current_index(), 0);
    }

    #[test]
    fn test_temperature_validated() {
        let mut set = ProfileSet::default();
        let hot = ModelProfile::new("Hot", "llama3.2:1b", "", 1.5);
        assert!(matches!(
            set.add(hot),
            Err(ValidationError::TemperatureOutOfRange(_))
        ));
    }

    #[test]
    fn test_remove_keeps_current_valid() {
        let mut set = ProfileSet::default();
        set.set_current(2).unwrap();
        set.remove(2).unwrap();
        assert_eq!(set.current_index(), 1);

        set.remove(0).unwrap();
        assert_eq!(set.current().name, "General Assistant");
        assert_eq!(set.remove(0), Err(ValidationError::LastProfile));
    }

    #[test]
    fn test_load_writes_defaults() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("models.json");

        let set = ProfileSet::load(&path).unwrap();
        assert!(path.exists());
        assert_eq!(set.len(), 3);
    }

    #[test]
    fn test_save_load_preserves_current() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("models.json");

        let mut set = ProfileSet::default();
        set.set_current(1).unwrap();
        set.save(&path).unwrap();

        let loaded = ProfileSet::load(&path).unwrap();
        assert_eq!(loaded.current().model, "llama3.2:3b");
    }

    #[test]
    fn test_corrupt_file_replaced() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("models.json");
        fs::write(&path, "{\"profiles\": [").unwrap();

        let set = ProfileSet::load(&path).unwrap();
        assert_eq!(set, ProfileSet::default());

        let rewritten: ProfileSet = serde_json::from_str(&fs::read_to_string(&path).unwrap()).unwrap();
        assert_eq!(rewritten.len(), 3);
    }

    #[test]
    fn test_load_empty_profiles_falls_back() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("models.json");
        fs::write(&path, r#"{"profiles":[],"current_profile":4}"#).unwrap();

        let set = ProfileSet::load(&path).unwrap();
        assert_eq!(set.len(), 3);
        assert_eq!(set.current_index(), 0);
    }
}
