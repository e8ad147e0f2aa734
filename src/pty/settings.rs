//! User-facing shell configuration.
//!
//! Settings are read through a [`SettingsProvider`] on every resolution, so an
//! edited settings file or a swapped provider applies to the next PTY without
//! rebuilding the manager.

use std::fs;
use std::io;
use std::path::{Path, PathBuf};

use serde::Deserialize;
use tracing::warn;

use crate::error::Result;

/// Shell overrides configured by the user.
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct ShellSettings {
    /// Empty means "no override".
    pub default_shell: String,
    pub shell_args: Vec<String>,
}

impl ShellSettings {
    /// The configured shell, if one is set.
    pub fn configured_shell(&self) -> Option<&str> {
        let shell = self.default_shell.trim();
        (!shell.is_empty()).then_some(shell)
    }
}

/// Read-only source of [`ShellSettings`].
pub trait SettingsProvider: Send + Sync {
    fn shell_settings(&self) -> Option<ShellSettings>;
}

impl<F> SettingsProvider for F
where
    F: Fn() -> Option<ShellSettings> + Send + Sync,
{
    fn shell_settings(&self) -> Option<ShellSettings> {
        self()
    }
}

/// Fixed settings value.
#[derive(Debug, Clone, Default)]
pub struct StaticSettings(pub ShellSettings);

impl SettingsProvider for StaticSettings {
    fn shell_settings(&self) -> Option<ShellSettings> {
        Some(self.0.clone())
    }
}

/// Settings stored as JSON on disk, re-read on every call.
#[derive(Debug, Clone)]
pub struct FileSettingsProvider {
    path: PathBuf,
}

impl FileSettingsProvider {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    /// `<config dir>/ptyward/settings.json`, if the platform has a config dir.
    pub fn default_location() -> Option<Self> {
        dirs::config_dir().map(|dir| Self::new(dir.join("ptyward").join("settings.json")))
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Load the file. A missing file is `Ok(None)`.
    pub fn load(&self) -> Result<Option<ShellSettings>> {
        let raw = match fs::read_to_string(&self.path) {
            Ok(raw) => raw,
            Err(e) if e.kind() == io::ErrorKind::NotFound => return Ok(None),
            Err(e) => return Err(e.into()),
        };
        Ok(Some(serde_json::from_str(&raw)?))
    }
}

impl SettingsProvider for FileSettingsProvider {
    fn shell_settings(&self) -> Option<ShellSettings> {
        match self.load() {
            Ok(settings) => settings,
            Err(e) => {
                warn!("Ignoring unreadable settings {}: {}", self.path.display(), e);
                None
            }
        }
    }
}
