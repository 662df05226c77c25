use std::fs;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::profiles::{default_config_dir, ProfilesError};

pub const DEFAULT_RENDER_CAP: usize = 1000;

/// Execution settings consumed by the dispatcher. Stored as
/// `settings.toml` next to the profile catalog; callers may also build
/// them directly.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
pub struct Settings {
    #[serde(default = "default_render_cap")]
    pub render_cap: usize,
    #[serde(default)]
    pub auto_commit: bool,
}

fn default_render_cap() -> usize {
    DEFAULT_RENDER_CAP
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            render_cap: DEFAULT_RENDER_CAP,
            auto_commit: false,
        }
    }
}

#[derive(Debug, Error)]
pub enum SettingsError {
    #[error("failed to resolve default config path: {0}")]
    Config(#[from] ProfilesError),
    #[error("failed to read settings file at {path}: {source}")]
    Read {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("failed to parse settings file at {path}: {source}")]
    Parse {
        path: PathBuf,
        #[source]
        source: toml::de::Error,
    },
    #[error("render cap must be a positive integer (found 0 in {path})")]
    InvalidRenderCap { path: PathBuf },
    #[error("failed to create config directory at {path}: {source}")]
    CreateDir {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("failed to serialize settings: {source}")]
    Serialize {
        #[source]
        source: toml::ser::Error,
    },
    #[error("failed to write settings file at {path}: {source}")]
    Write {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
}

impl Settings {
    pub fn load_default() -> Result<Self, SettingsError> {
        Self::load_from_path(default_settings_path()?)
    }

    pub fn load_from_path(path: impl Into<PathBuf>) -> Result<Self, SettingsError> {
        let path = path.into();
        if !path.exists() {
            return Ok(Self::default());
        }

        let raw = fs::read_to_string(&path).map_err(|source| SettingsError::Read {
            path: path.clone(),
            source,
        })?;
        if raw.trim().is_empty() {
            return Ok(Self::default());
        }

        let settings: Self = toml::from_str(&raw).map_err(|source| SettingsError::Parse {
            path: path.clone(),
            source,
        })?;
        if settings.render_cap == 0 {
            return Err(SettingsError::InvalidRenderCap { path });
        }
        Ok(settings)
    }

    pub fn persist_to_path(&self, path: &Path) -> Result<(), SettingsError> {
        if let Some(parent_dir) = path.parent() {
            fs::create_dir_all(parent_dir).map_err(|source| SettingsError::CreateDir {
                path: parent_dir.to_path_buf(),
                source,
            })?;
        }

        let rendered =
            toml::to_string_pretty(self).map_err(|source| SettingsError::Serialize { source })?;
        fs::write(path, rendered).map_err(|source| SettingsError::Write {
            path: path.to_path_buf(),
            source,
        })
    }
}

pub fn default_settings_path() -> Result<PathBuf, SettingsError> {
    Ok(default_config_dir()?.join("settings.toml"))
}

#[cfg(test)]
mod tests {
    use tempfile::TempDir;

    use super::{Settings, SettingsError, DEFAULT_RENDER_CAP};

    #[test]
    fn missing_file_yields_defaults() {
        let temp_dir = TempDir::new().expect("failed to create temp directory");
        let settings = Settings::load_from_path(temp_dir.path().join("settings.toml"))
            .expect("failed to load settings");
        assert_eq!(settings.render_cap, DEFAULT_RENDER_CAP);
        assert!(!settings.auto_commit);
    }

    #[test]
    fn persist_and_reload_round_trips() {
        let temp_dir = TempDir::new().expect("failed to create temp directory");
        let path = temp_dir.path().join("settings.toml");

        let settings = Settings {
            render_cap: 250,
            auto_commit: true,
        };
        settings
            .persist_to_path(&path)
            .expect("failed to persist settings");

        let reloaded = Settings::load_from_path(&path).expect("failed to reload settings");
        assert_eq!(reloaded, settings);
    }

    #[test]
    fn zero_render_cap_is_rejected() {
        let temp_dir = TempDir::new().expect("failed to create temp directory");
        let path = temp_dir.path().join("settings.toml");
        std::fs::write(&path, "render_cap = 0\n").expect("failed to seed settings file");

        let err = Settings::load_from_path(&path).expect_err("zero cap should be rejected");
        assert!(matches!(err, SettingsError::InvalidRenderCap { .. }));
    }

    #[test]
    fn partial_file_fills_in_defaults() {
        let temp_dir = TempDir::new().expect("failed to create temp directory");
        let path = temp_dir.path().join("settings.toml");
        std::fs::write(&path, "auto_commit = true\n").expect("failed to seed settings file");

        let settings = Settings::load_from_path(&path).expect("failed to load settings");
        assert_eq!(settings.render_cap, DEFAULT_RENDER_CAP);
        assert!(settings.auto_commit);
    }
}
