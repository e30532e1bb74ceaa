//! Service configuration.
//!
//! Read once at start-up from `config.toml`, then overridden by `KG_*`
//! environment variables. A missing file is replaced by a template of the
//! defaults and start-up stops so the operator can review it.

use std::path::Path;

use anyhow::anyhow;
use serde::{Deserialize, Serialize};

use crate::error::{LibError, Result};

pub const CONFIG_FILE: &str = "config.toml";

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    pub host: String,
    /// `0` lets the OS pick a free port when the listener binds.
    pub port: u16,
    pub database: DatabaseConfig,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct DatabaseConfig {
    pub url: String,
    /// Run embedded migrations before serving.
    pub migrate: bool,
    pub max_connections: u32,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            host: "0.0.0.0".to_string(),
            port: 8080,
            database: DatabaseConfig::default(),
        }
    }
}

impl Default for DatabaseConfig {
    fn default() -> Self {
        Self {
            url: "sqlite://kg.db".to_string(),
            migrate: true,
            max_connections: 5,
        }
    }
}

impl Config {
    /// `config.toml` in the working directory, with process environment overrides.
    pub fn load() -> Result<Self> {
        let mut config = Self::load_from(CONFIG_FILE)?;
        config.apply_overrides(|key| std::env::var(key).ok())?;
        Ok(config)
    }

    pub fn load_from(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        if !path.exists() {
            let template = toml::to_string_pretty(&Self::default()).map_err(|err| {
                LibError::config("Failed to render config template", anyhow!(err))
            })?;
            std::fs::write(path, template).map_err(|err| {
                LibError::config("Failed to write config template", anyhow!(err))
            })?;
            return Err(LibError::config(
                "Config file was missing; a template has been written",
                anyhow!("wrote default configuration to {}", path.display()),
            ));
        }

        let contents = std::fs::read_to_string(path)
            .map_err(|err| LibError::config("Failed to read config file", anyhow!(err)))?;
        Self::from_toml(&contents)
    }

    pub fn from_toml(contents: &str) -> Result<Self> {
        toml::from_str(contents)
            .map_err(|err| LibError::config("Failed to parse config file", anyhow!(err)))
    }

    /// Applies `KG_HOST`, `KG_PORT` and `KG_DATABASE_URL` from `lookup`.
    pub fn apply_overrides(&mut self, lookup: impl Fn(&str) -> Option<String>) -> Result<()> {
        if let Some(host) = lookup("KG_HOST") {
            self.host = host;
        }
        if let Some(port) = lookup("KG_PORT") {
            self.port = port.parse().map_err(|err| {
                LibError::config("Invalid KG_PORT", anyhow!("{:?}: {}", port, err))
            })?;
        }
        if let Some(url) = lookup("KG_DATABASE_URL") {
            self.database.url = url;
        }
        Ok(())
    }

    /// `host:port` to bind; with port `0` the OS assigns one at bind time.
    pub fn bind_addr(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }
}
