//! Configuration management with environment variable support.
//!
//! This module provides [`Config`] for loading and validating FileVault
//! settings from JSON files and environment variables.
//!
//! ## Environment Variables
//!
//! - `FILEVAULT_CONFIG`: Override config file path
//! - `FILEVAULT_DISK`: Override the default disk name
//! - `FILEVAULT_CIPHER`: Override the cipher (`AES-128-CBC` or `AES-256-CBC`)
//! - `FILEVAULT_KEY`: Encryption key, read by the CLI only and never stored in the config file

use crate::key::Cipher;
use crate::storage::{Disks, LocalStorage};
use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::env;
use std::fs;
use std::path::Path;
use tracing::{debug, info, warn};

/// Environment variable names for configuration overrides
pub const ENV_CONFIG_PATH: &str = "FILEVAULT_CONFIG";
pub const ENV_DEFAULT_DISK: &str = "FILEVAULT_DISK";
pub const ENV_CIPHER: &str = "FILEVAULT_CIPHER";
pub const ENV_KEY: &str = "FILEVAULT_KEY";

/// Config file used when no path is given
pub const DEFAULT_CONFIG_PATH: &str = "config.json";

const DEFAULT_DISK: &str = "local";

/// The config path asked for, by argument or by `FILEVAULT_CONFIG`
pub fn config_path(path: Option<&str>) -> Option<String> {
    path.map(String::from)
        .or_else(|| env::var(ENV_CONFIG_PATH).ok())
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DiskConfig {
    pub root: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    #[serde(default = "default_disk_name")]
    pub default_disk: String,
    #[serde(default)]
    pub cipher: Cipher,
    #[serde(default)]
    pub disks: BTreeMap<String, DiskConfig>,
}

fn default_disk_name() -> String {
    DEFAULT_DISK.to_string()
}

impl Default for Config {
    fn default() -> Self {
        Self::new(DEFAULT_DISK, "./storage")
    }
}

impl Config {
    /// Load config from file path
    pub fn load(path: &str) -> Result<Self> {
        let s =
            fs::read_to_string(path).with_context(|| format!("reading config file {}", path))?;
        let mut config: Config =
            serde_json::from_str(&s).with_context(|| format!("parsing config file {}", path))?;
        config.apply_env_overrides()?;
        config.validate()?;
        Ok(config)
    }

    /// Load config with environment variable overrides
    /// Priority: ENV vars > config file > defaults
    ///
    /// A path given explicitly, or through `FILEVAULT_CONFIG`, must exist.
    /// Without one, `config.json` is used when present and defaults otherwise.
    pub fn load_with_env(path: Option<&str>) -> Result<Self> {
        if let Some(p) = config_path(path) {
            info!(path = %p, "loading config from file");
            return Self::load(&p);
        }

        if Path::new(DEFAULT_CONFIG_PATH).exists() {
            info!(path = DEFAULT_CONFIG_PATH, "loading config from file");
            return Self::load(DEFAULT_CONFIG_PATH);
        }

        debug!("using default configuration");
        let mut config = Config::default();
        config.apply_env_overrides()?;
        config.validate()?;
        Ok(config)
    }

    fn apply_env_overrides(&mut self) -> Result<()> {
        if let Ok(disk) = env::var(ENV_DEFAULT_DISK) {
            debug!(disk = %disk, "overriding default_disk from environment");
            self.default_disk = disk;
        }

        if let Ok(cipher) = env::var(ENV_CIPHER) {
            debug!(cipher = %cipher, "overriding cipher from environment");
            self.cipher = cipher
                .parse()
                .with_context(|| format!("{} is not a supported cipher", ENV_CIPHER))?;
        }

        Ok(())
    }

    /// Validate configuration values
    pub fn validate(&self) -> Result<()> {
        if self.disks.is_empty() {
            anyhow::bail!("at least one disk must be configured");
        }

        if !self.disks.contains_key(&self.default_disk) {
            anyhow::bail!("default disk '{}' is not configured", self.default_disk);
        }

        for (name, disk) in &self.disks {
            if disk.root.trim().is_empty() {
                anyhow::bail!("disk '{}' has an empty root", name);
            }
            if disk.root.contains("..") {
                warn!(disk = %name, root = %disk.root, "disk root contains '..' - consider using absolute paths");
            }
        }

        Ok(())
    }

    /// Create a single-disk config
    pub fn new(default_disk: impl Into<String>, root: impl Into<String>) -> Self {
        let default_disk = default_disk.into();
        let mut disks = BTreeMap::new();
        disks.insert(default_disk.clone(), DiskConfig { root: root.into() });
        Self {
            default_disk,
            cipher: Cipher::default(),
            disks,
        }
    }

    /// Build the disk registry described by this config
    pub fn disks(&self) -> Disks<LocalStorage> {
        self.disks
            .iter()
            .fold(Disks::new(self.default_disk.clone()), |disks, (name, disk)| {
                disks.with_disk(name.clone(), LocalStorage::new(&disk.root))
            })
    }
}
