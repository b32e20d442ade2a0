//! Configuration using Figment
//!
//! Configuration is loaded from:
//! 1. an optional TOML file (base configuration)
//! 2. environment variables prefixed with `SRDIR_`, nested keys separated by `__`
//!
//! Every field has a default, so an empty figment yields a working setup.
//!
//! # Example
//! ```no_run
//! use srdir::config::SrdirConfig;
//!
//! # fn main() -> srdir::Result<()> {
//! let config = SrdirConfig::load_from("config/srdir.toml")?;
//! println!("Chunk size: {} bytes", config.archive.chunk_bytes);
//! # Ok(())
//! # }
//! ```

use figment::{
    providers::{Env, Format, Serialized, Toml},
    Figment,
};
use serde::{Deserialize, Serialize};
use std::path::Path;

use crate::error::{Result, SrdirError};

/// Default chunk file size in bytes (4 MiB).
pub const DEFAULT_CHUNK_BYTES: usize = 4 * 1024 * 1024;

/// Default content of the `version` marker file.
pub const DEFAULT_FORMAT_VERSION: &str = "2";

/// Top-level configuration
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct SrdirConfig {
    /// Archive layout settings
    #[serde(default)]
    pub archive: ArchiveConfig,
    /// Logging settings
    #[serde(default)]
    pub logging: LoggingConfig,
}

/// Archive layout configuration
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ArchiveConfig {
    /// Size of one chunk file in bytes; sizes every accumulator
    #[serde(default = "default_chunk_bytes")]
    pub chunk_bytes: usize,
    /// Value recorded under `sigrok version` in the metadata record
    #[serde(default = "default_producer_version")]
    pub producer_version: String,
    /// Content of the `version` marker file
    #[serde(default = "default_format_version")]
    pub format_version: String,
}

/// Logging configuration
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LoggingConfig {
    /// Logging level (trace, debug, info, warn, error)
    #[serde(default = "default_log_level")]
    pub level: String,
    /// Output format (pretty, compact, json)
    #[serde(default = "default_log_format")]
    pub format: String,
}

// Default value functions
fn default_chunk_bytes() -> usize {
    DEFAULT_CHUNK_BYTES
}

fn default_producer_version() -> String {
    env!("CARGO_PKG_VERSION").to_string()
}

fn default_format_version() -> String {
    DEFAULT_FORMAT_VERSION.to_string()
}

fn default_log_level() -> String {
    "info".to_string()
}

fn default_log_format() -> String {
    "compact".to_string()
}

impl Default for ArchiveConfig {
    fn default() -> Self {
        Self {
            chunk_bytes: default_chunk_bytes(),
            producer_version: default_producer_version(),
            format_version: default_format_version(),
        }
    }
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: default_log_level(),
            format: default_log_format(),
        }
    }
}

impl SrdirConfig {
    /// Load configuration from defaults and `SRDIR_` environment variables only
    pub fn load() -> Result<Self> {
        Self::extract(Self::figment())
    }

    /// Load configuration from a TOML file, overridden by environment variables
    ///
    /// A missing file is not an error; its layer is simply empty.
    /// Example: `SRDIR_ARCHIVE__CHUNK_BYTES=65536`
    pub fn load_from<P: AsRef<Path>>(path: P) -> Result<Self> {
        Self::extract(
            Figment::from(Serialized::defaults(SrdirConfig::default()))
                .merge(Toml::file(path.as_ref()))
                .merge(Env::prefixed("SRDIR_").split("__")),
        )
    }

    fn figment() -> Figment {
        Figment::from(Serialized::defaults(SrdirConfig::default()))
            .merge(Env::prefixed("SRDIR_").split("__"))
    }

    fn extract(figment: Figment) -> Result<Self> {
        let config: SrdirConfig = figment.extract()?;
        config.validate()?;
        Ok(config)
    }

    /// Validate configuration after loading
    pub fn validate(&self) -> Result<()> {
        let valid_levels = ["trace", "debug", "info", "warn", "error"];
        if !valid_levels.contains(&self.logging.level.as_str()) {
            return Err(SrdirError::Configuration(format!(
                "Invalid log level '{}'. Must be one of: {}",
                self.logging.level,
                valid_levels.join(", ")
            )));
        }

        let valid_formats = ["pretty", "compact", "json"];
        if !valid_formats.contains(&self.logging.format.as_str()) {
            return Err(SrdirError::Configuration(format!(
                "Invalid log format '{}'. Must be one of: {}",
                self.logging.format,
                valid_formats.join(", ")
            )));
        }

        if self.archive.chunk_bytes < std::mem::size_of::<f32>() {
            return Err(SrdirError::Configuration(format!(
                "Invalid chunk_bytes {}. Must hold at least one analog sample ({} bytes)",
                self.archive.chunk_bytes,
                std::mem::size_of::<f32>()
            )));
        }

        let version = self.archive.format_version.as_bytes();
        if version.len() != 1 || !version[0].is_ascii_graphic() {
            return Err(SrdirError::Configuration(format!(
                "Invalid format_version '{}'. Must be a single printable character",
                self.archive.format_version
            )));
        }

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use figment::Jail;

    #[test]
    fn defaults_are_valid() {
        let config = SrdirConfig::default();
        assert_eq!(config.archive.chunk_bytes, 4 * 1024 * 1024);
        assert_eq!(config.archive.format_version, "2");
        assert!(config.validate().is_ok());
    }

    #[test]
    fn file_and_env_layers() {
        Jail::expect_with(|jail| {
            jail.create_file(
                "srdir.toml",
                r#"
                [archive]
                chunk_bytes = 1024
                producer_version = "0.6.0"

                [logging]
                level = "debug"
                "#,
            )?;
            jail.set_env("SRDIR_ARCHIVE__CHUNK_BYTES", "64");

            let config = SrdirConfig::load_from("srdir.toml").map_err(|e| e.to_string())?;
            assert_eq!(config.archive.chunk_bytes, 64);
            assert_eq!(config.archive.producer_version, "0.6.0");
            assert_eq!(config.archive.format_version, "2");
            assert_eq!(config.logging.level, "debug");
            assert_eq!(config.logging.format, "compact");
            Ok(())
        });
    }

    #[test]
    fn missing_file_uses_defaults() {
        Jail::expect_with(|_jail| {
            let config = SrdirConfig::load_from("absent.toml").map_err(|e| e.to_string())?;
            assert_eq!(config, SrdirConfig::default());
            Ok(())
        });
    }

    #[test]
    fn invalid_log_level() {
        let mut config = SrdirConfig::default();
        config.logging.level = "loud".to_string();
        assert!(matches!(
            config.validate(),
            Err(SrdirError::Configuration(_))
        ));
    }

    #[test]
    fn chunk_too_small_for_one_float() {
        let mut config = SrdirConfig::default();
        config.archive.chunk_bytes = 3;
        assert!(config.validate().is_err());
    }

    #[test]
    fn format_version_must_be_one_byte() {
        let mut config = SrdirConfig::default();
        config.archive.format_version = "22".to_string();
        assert!(config.validate().is_err());
        config.archive.format_version = String::new();
        assert!(config.validate().is_err());
    }

    #[test]
    fn malformed_env_value_is_a_config_error() {
        Jail::expect_with(|jail| {
            jail.set_env("SRDIR_ARCHIVE__CHUNK_BYTES", "lots");
            match SrdirConfig::load() {
                Err(SrdirError::Config(_)) => Ok(()),
                other => Err(format!("unexpected result: {other:?}").into()),
            }
        });
    }
}
