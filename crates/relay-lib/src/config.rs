// ============================
// parley-relay-lib/src/config.rs
// ============================
//! Configuration management.
use ::config::{Config, Environment, File};
use anyhow::Result;
use serde::Deserialize;
use std::net::SocketAddr;
use std::path::PathBuf;

/// Application settings
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct Settings {
    /// Server bind address
    pub bind_addr: SocketAddr,
    /// Log level used when `RUST_LOG` is not set
    pub log_level: String,
    /// CORS origin allowlist; an empty list permits any origin
    pub allowed_origins: Vec<String>,
    /// Optional directory holding the static client bundle
    pub static_dir: Option<PathBuf>,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            bind_addr: "127.0.0.1:3000".parse().unwrap(),
            log_level: "info".to_string(),
            allowed_origins: Vec::new(),
            static_dir: None,
        }
    }
}

impl Settings {
    /// Load settings from the default location
    pub fn load() -> Result<Self> {
        Self::load_from("config/default")
    }

    /// Load settings from a specific file, layered with `PARLEY_` environment
    /// variables. The file may be TOML, YAML or JSON and is optional.
    pub fn load_from(path: &str) -> Result<Self> {
        let cfg = Config::builder()
            .add_source(File::with_name(path).required(false))
            .add_source(Environment::with_prefix("PARLEY"))
            .build()?;

        let settings: Settings = cfg.try_deserialize()?;
        Ok(settings)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_settings() {
        let settings = Settings::default();
        assert_eq!(settings.bind_addr.port(), 3000);
        assert_eq!(settings.log_level, "info");
        assert!(settings.allowed_origins.is_empty());
        assert!(settings.static_dir.is_none());
    }

    #[test]
    fn test_load_from_missing_file_uses_defaults() {
        let settings = Settings::load_from("does/not/exist").unwrap();
        assert_eq!(settings.bind_addr, Settings::default().bind_addr);
        assert_eq!(settings.log_level, "info");
    }
}
