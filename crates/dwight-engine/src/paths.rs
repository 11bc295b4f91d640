//! Path utilities for Dwight data directories.

use std::path::{Path, PathBuf};

/// Default data directory (~/.dwight/), or `./.dwight` without a home directory.
pub fn default_data_dir() -> PathBuf {
    dirs::home_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join(".dwight")
}

/// Directory holding one JSON file per conversation.
pub fn conversations_dir(data_dir: &Path) -> PathBuf {
    data_dir.join("conversations")
}

/// Directory the CLI writes exports into.
pub fn exports_dir(data_dir: &Path) -> PathBuf {
    data_dir.join("exports")
}

pub fn settings_path(data_dir: &Path) -> PathBuf {
    data_dir.join("settings.json")
}

pub fn profiles_path(data_dir: &Path) -> PathBuf {
    data_dir.join("models.json")
}
