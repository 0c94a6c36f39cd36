//! Configuration file support for tatib
//!
//! Reads from .tatib/config.toml

use serde::{Deserialize, Serialize};
use std::path::PathBuf;

/// Configuration structure
#[derive(Debug, Deserialize, Serialize, Default, Clone)]
pub struct Config {
    /// HTTP server settings
    #[serde(default)]
    pub server: ServerConfig,
}

/// Server-related configuration
#[derive(Debug, Deserialize, Serialize, Clone)]
pub struct ServerConfig {
    /// Port for `tatib serve`
    /// Default: 7878
    #[serde(default = "default_port")]
    pub port: u16,

    /// Default page size for violation listings (clamped to 1..=100)
    /// Default: 20
    #[serde(default = "default_page_size")]
    pub page_size: i64,
}

fn default_port() -> u16 {
    7878
}

fn default_page_size() -> i64 {
    20
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            port: default_port(),
            page_size: default_page_size(),
        }
    }
}

impl Config {
    /// Load config from .tatib/config.toml
    /// Returns default config if file doesn't exist
    pub fn load() -> Self {
        if let Some(path) = Self::find_config_path() {
            if let Ok(contents) = std::fs::read_to_string(&path) {
                if let Ok(config) = toml::from_str(&contents) {
                    return config;
                }
            }
        }
        Self::default()
    }

    /// Find config.toml by walking up directory tree
    fn find_config_path() -> Option<PathBuf> {
        let current_dir = std::env::current_dir().ok()?;
        let mut dir = current_dir.as_path();

        loop {
            let config_path = dir.join(".tatib").join("config.toml");
            if config_path.exists() {
                return Some(config_path);
            }

            match dir.parent() {
                Some(parent) => dir = parent,
                None => break,
            }
        }
        None
    }

    /// Effective page size after clamping
    pub fn page_size(&self) -> i64 {
        self.server.page_size.clamp(1, crate::query::MAX_PAGE_SIZE)
    }
}
