// SPDX-License-Identifier: AGPL-3.0-or-later
// Copyright (C) 2025 Blackman Artificial Intelligence Technologies Inc.

use std::path::{Path, PathBuf};

use crate::error::Result;

use super::Settings;

impl Settings {
    /// Get the default settings file path.
    pub fn default_path() -> PathBuf {
        Self::chatrelay_home().join("settings.json")
    }

    /// Load settings from the default path.
    pub fn load() -> Result<Self> {
        Self::load_from(&Self::default_path())
    }

    /// Load settings from a specific path, then apply environment overrides.
    pub fn load_from(path: &Path) -> Result<Self> {
        let mut settings = if path.exists() {
            let content = std::fs::read_to_string(path)?;
            serde_json::from_str(&content)?
        } else {
            tracing::debug!(path = %path.display(), "settings file not found, using defaults");
            Self::default()
        };
        settings.apply_env_overrides();
        Ok(settings)
    }

    /// Save settings to a specific path, fully overwriting.
    pub fn save_to(&self, path: &Path) -> Result<()> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let content = serde_json::to_string_pretty(self)?;
        std::fs::write(path, content)?;
        Ok(())
    }

    /// Get the chatrelay home directory (~/.chatrelay or $CHATRELAY_HOME).
    pub fn chatrelay_home() -> PathBuf {
        if let Ok(home) = std::env::var("CHATRELAY_HOME") {
            return PathBuf::from(home);
        }
        dirs::home_dir()
            .unwrap_or_else(|| PathBuf::from("."))
            .join(".chatrelay")
    }

    /// Apply `CHATRELAY_*` environment overrides.
    pub fn apply_env_overrides(&mut self) {
        if let Ok(bind) = std::env::var("CHATRELAY_BIND") {
            if !bind.trim().is_empty() {
                self.server.bind = bind;
            }
        }
    }
}
