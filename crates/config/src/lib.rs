//! Configuration management for the translation service
//!
//! Supports loading configuration from:
//! - YAML files under `config/` (`default`, then `{env}`)
//! - Environment variables (NMT__ prefix, `__` section separator)
//!
//! Page assets (the inline stylesheet) are read once at startup via
//! [`load_stylesheet`].

pub mod assets;
pub mod settings;

pub use assets::load_stylesheet;
pub use settings::{
    load_settings, load_settings_from, ModelProvider, ModelSettings, ObservabilityConfig,
    RuntimeEnvironment, ServerConfig, SessionConfig, Settings, UiConfig,
};

use thiserror::Error;

#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("Configuration file not found: {0}")]
    FileNotFound(String),

    #[error("Failed to parse configuration: {0}")]
    ParseError(String),

    #[error("Missing required field: {0}")]
    MissingField(String),

    #[error("Invalid value for {field}: {message}")]
    InvalidValue { field: String, message: String },

    #[error("Environment error: {0}")]
    Environment(String),
}

impl From<config::ConfigError> for ConfigError {
    fn from(err: config::ConfigError) -> Self {
        ConfigError::ParseError(err.to_string())
    }
}
