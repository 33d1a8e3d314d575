use anyhow::{Context, Result, bail};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fs;
use std::io::ErrorKind;
use std::path::Path;

use crate::auth::AuthConfig;

pub const DEFAULT_CONFIG_FILE: &str = ".opcall.yaml";
pub const CONFIG_ENV: &str = "OPCALL_CONFIG";

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ProfileConfig {
    pub spec_file: String,
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub server_url: String,
    #[serde(default, skip_serializing_if = "AuthConfig::is_empty")]
    pub auth: AuthConfig,
}

/// Profiles by name, kept sorted.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Config(BTreeMap<String, ProfileConfig>);

impl Config {
    /// Reads the profiles. A missing file is an empty config.
    pub fn read_or_default(path: &Path) -> Result<Self> {
        match fs::read_to_string(path) {
            Ok(raw) => Self::parse(&raw, path),
            Err(err) if err.kind() == ErrorKind::NotFound => Ok(Config::default()),
            Err(err) => Err(err).with_context(|| format!("failed to read {}", path.display())),
        }
    }

    fn parse(raw: &str, path: &Path) -> Result<Self> {
        if raw.trim().is_empty() {
            bail!("{} is empty", path.display());
        }
        serde_yaml::from_str(raw).with_context(|| format!("failed to parse {}", path.display()))
    }

    pub fn write(&self, path: &Path) -> Result<()> {
        let raw = serde_yaml::to_string(self).context("failed to serialize config")?;
        fs::write(path, raw).with_context(|| format!("failed to write {}", path.display()))
    }

    pub fn get(&self, profile: &str) -> Option<&ProfileConfig> {
        self.0.get(profile)
    }

    pub fn insert(&mut self, profile: impl Into<String>, cfg: ProfileConfig) {
        self.0.insert(profile.into(), cfg);
    }

    pub fn remove(&mut self, profile: &str) -> Option<ProfileConfig> {
        self.0.remove(profile)
    }

    pub fn profiles(&self) -> impl Iterator<Item = &str> {
        self.0.keys().map(String::as_str)
    }
}
