// src/config.rs

//! Local client configuration
//!
//! A two-level `section.key = value` store persisted as TOML. The user file
//! (`$XDG_CONFIG_HOME/canvas.toml`) wins over the system file
//! (`/etc/canvas/canvas.toml`); saving always writes the user file.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fs;
use std::path::{Path, PathBuf};
use tracing::debug;

use crate::error::{Error, Result};

/// System-wide configuration file
pub const SYSTEM_CONFIG_PATH: &str = "/etc/canvas/canvas.toml";

const CONFIG_FILE: &str = "canvas.toml";

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Config {
    sections: BTreeMap<String, BTreeMap<String, String>>,
    #[serde(skip)]
    path: Option<PathBuf>,
}

impl Config {
    /// Default location of the user configuration file
    pub fn user_path() -> Option<PathBuf> {
        dirs::config_dir().map(|dir| dir.join(CONFIG_FILE))
    }

    /// Load the user file, else the system file, else start empty
    pub fn load() -> Result<Self> {
        let user = Self::user_path();

        let source = user
            .iter()
            .cloned()
            .chain(std::iter::once(PathBuf::from(SYSTEM_CONFIG_PATH)))
            .find(|p| p.exists());

        let mut config = match source {
            Some(path) => Self::read(&path)?,
            None => Self::default(),
        };
        config.path = user;
        Ok(config)
    }

    /// Read `path` and save back to it
    pub fn load_from(path: &Path) -> Result<Self> {
        let mut config = if path.exists() {
            Self::read(path)?
        } else {
            Self::default()
        };
        config.path = Some(path.to_path_buf());
        Ok(config)
    }

    fn read(path: &Path) -> Result<Self> {
        debug!("Reading configuration from {}", path.display());
        let text = fs::read_to_string(path)?;
        toml::from_str(&text)
            .map_err(|e| Error::Config(format!("failed to parse {}: {}", path.display(), e)))
    }

    pub fn save(&self) -> Result<()> {
        let path = self
            .path
            .as_ref()
            .ok_or_else(|| Error::Config("no user configuration directory".to_string()))?;

        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent)?;
        }

        let text = toml::to_string(self)
            .map_err(|e| Error::Config(format!("failed to serialize configuration: {}", e)))?;
        fs::write(path, text)?;
        debug!("Saved configuration to {}", path.display());
        Ok(())
    }

    pub fn get(&self, section: &str, key: &str) -> Option<&str> {
        self.sections.get(section)?.get(key).map(String::as_str)
    }

    pub fn set(&mut self, section: &str, key: &str, value: impl Into<String>) {
        self.sections
            .entry(section.to_string())
            .or_default()
            .insert(key.to_string(), value.into());
    }

    /// Remove a key, returning whether it existed
    pub fn unset(&mut self, section: &str, key: &str) -> bool {
        let Some(entries) = self.sections.get_mut(section) else {
            return false;
        };
        let removed = entries.remove(key).is_some();
        if entries.is_empty() {
            self.sections.remove(section);
        }
        removed
    }

    pub fn sections(&self) -> impl Iterator<Item = &str> {
        self.sections.keys().map(String::as_str)
    }
}

/// Split `section.key`
pub fn split_key(name: &str) -> Result<(&str, &str)> {
    let parts: Vec<&str> = name.split('.').collect();
    match parts.as_slice() {
        [key] => Err(Error::Config(format!("key does not contain a section: {}", key))),
        [section, key] if !section.is_empty() && !key.is_empty() => Ok((*section, *key)),
        _ => Err(Error::Config(format!(
            "expected 'section.key', got '{}'",
            name
        ))),
    }
}
