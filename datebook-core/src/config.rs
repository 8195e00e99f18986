//! Client configuration at ~/.config/datebook/config.toml
//!
//! Every key can be overridden from the environment with a `DATEBOOK_`
//! prefix, e.g. `DATEBOOK_API_BASE_URL`.

use std::path::{Path, PathBuf};
use std::time::Duration;

use config::{Config, Environment, File};
use serde::{Deserialize, Serialize};

use crate::constants::{DEFAULT_API_BASE_URL, DEFAULT_REFRESH_INTERVAL};
use crate::error::{DatebookError, DatebookResult};

const STORAGE_FILE: &str = "storage.json";

fn default_api_base_url() -> String {
    DEFAULT_API_BASE_URL.to_string()
}

fn default_data_dir() -> PathBuf {
    dirs::data_dir()
        .map(|dir| dir.join("datebook"))
        .unwrap_or_else(|| PathBuf::from("~/.datebook"))
}

fn default_refresh_interval() -> String {
    humantime::format_duration(DEFAULT_REFRESH_INTERVAL).to_string()
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DatebookConfig {
    #[serde(default = "default_api_base_url")]
    pub api_base_url: String,

    #[serde(default = "default_data_dir")]
    pub data_dir: PathBuf,

    /// How often the access token is renewed, e.g. "1h" or "45m"
    #[serde(default = "default_refresh_interval")]
    pub refresh_interval: String,
}

impl Default for DatebookConfig {
    fn default() -> Self {
        DatebookConfig {
            api_base_url: default_api_base_url(),
            data_dir: default_data_dir(),
            refresh_interval: default_refresh_interval(),
        }
    }
}

impl DatebookConfig {
    pub fn config_path() -> DatebookResult<PathBuf> {
        let config_dir = dirs::config_dir()
            .ok_or_else(|| DatebookError::Config("Could not determine config directory".into()))?
            .join("datebook");

        Ok(config_dir.join("config.toml"))
    }

    /// Load from the default location, writing a commented-out default file
    /// on first run.
    pub fn load() -> DatebookResult<Self> {
        let path = Self::config_path()?;

        if !path.exists() {
            Self::create_default_config(&path)?;
        }

        Self::load_from(&path)
    }

    pub fn load_from(path: &Path) -> DatebookResult<Self> {
        Self::build(path, true)
    }

    /// Load only what is written in the file, ignoring `DATEBOOK_*`
    /// overrides. Use this before editing and saving the file.
    pub fn load_file(path: &Path) -> DatebookResult<Self> {
        Self::build(path, false)
    }

    fn build(path: &Path, with_env: bool) -> DatebookResult<Self> {
        let mut builder = Config::builder().add_source(File::from(path.to_path_buf()).required(false));
        if with_env {
            builder = builder.add_source(Environment::with_prefix("DATEBOOK"));
        }

        let config: DatebookConfig = builder
            .build()
            .map_err(|e| DatebookError::Config(e.to_string()))?
            .try_deserialize()
            .map_err(|e| DatebookError::Config(e.to_string()))?;

        config.refresh_interval()?;
        Ok(config)
    }

    pub fn refresh_interval(&self) -> DatebookResult<Duration> {
        let interval = humantime::parse_duration(&self.refresh_interval).map_err(|e| {
            DatebookError::Config(format!(
                "Invalid refresh_interval '{}': {e}",
                self.refresh_interval
            ))
        })?;

        if interval.is_zero() {
            return Err(DatebookError::Config("refresh_interval must be positive".into()));
        }
        Ok(interval)
    }

    /// Data directory with `~` expanded.
    pub fn data_path(&self) -> PathBuf {
        let full_path_str = shellexpand::tilde(&self.data_dir.to_string_lossy()).into_owned();
        PathBuf::from(full_path_str)
    }

    pub fn storage_path(&self) -> PathBuf {
        self.data_path().join(STORAGE_FILE)
    }

    /// Save the current config to `path`. An invalid refresh interval is
    /// rejected before anything is written.
    pub fn save(&self, path: &Path) -> DatebookResult<()> {
        self.refresh_interval()?;

        let content =
            toml::to_string_pretty(self).map_err(|e| DatebookError::Config(e.to_string()))?;

        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }

        std::fs::write(path, content)
            .map_err(|e| DatebookError::Config(format!("Could not write config file: {e}")))?;

        Ok(())
    }

    /// Create a default config file with all options commented out.
    pub fn create_default_config(path: &Path) -> DatebookResult<()> {
        let contents = format!(
            "\
# datebook configuration

# Backend the client talks to:
# api_base_url = \"{}\"

# Where tokens, settings and caches are kept:
# data_dir = \"{}\"

# How often the access token is renewed in `datebook watch`:
# refresh_interval = \"{}\"
",
            DEFAULT_API_BASE_URL,
            default_data_dir().display(),
            default_refresh_interval(),
        );

        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent).map_err(|e| {
                DatebookError::Config(format!("Could not create config directory: {e}"))
            })?;
        }

        std::fs::write(path, contents)
            .map_err(|e| DatebookError::Config(format!("Could not write config file: {e}")))?;

        Ok(())
    }
}
