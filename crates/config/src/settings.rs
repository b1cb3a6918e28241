//! Main settings module

use config::{Config, Environment, File};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

use crate::ConfigError;

/// Runtime environment
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum RuntimeEnvironment {
    /// Development mode - relaxed validation, warnings only
    #[default]
    Development,
    /// Staging mode - stricter validation
    Staging,
    /// Production mode - all validations enforced
    Production,
}

impl RuntimeEnvironment {
    /// Check if this is a production environment
    pub fn is_production(&self) -> bool {
        matches!(self, Self::Production)
    }

    /// Check if strict validation should be applied
    pub fn is_strict(&self) -> bool {
        matches!(self, Self::Production | Self::Staging)
    }
}

/// Main application settings
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct Settings {
    /// Runtime environment (development, staging, production)
    #[serde(default)]
    pub environment: RuntimeEnvironment,

    /// Server configuration
    #[serde(default)]
    pub server: ServerConfig,

    /// Translation model configuration
    #[serde(default)]
    pub model: ModelSettings,

    /// Page configuration
    #[serde(default)]
    pub ui: UiConfig,

    /// Session lifetime configuration
    #[serde(default)]
    pub sessions: SessionConfig,

    /// Observability configuration
    #[serde(default)]
    pub observability: ObservabilityConfig,
}

impl Settings {
    /// Create default settings
    pub fn new() -> Self {
        Self::default()
    }

    /// Validate settings
    pub fn validate(&self) -> Result<(), ConfigError> {
        self.validate_server()?;
        self.validate_model()?;
        self.validate_ui()?;
        self.validate_sessions()?;
        Ok(())
    }

    fn validate_server(&self) -> Result<(), ConfigError> {
        if self.server.port == 0 {
            return Err(ConfigError::InvalidValue {
                field: "server.port".to_string(),
                message: "Port cannot be 0".to_string(),
            });
        }

        if self.environment.is_production()
            && self.server.cors_enabled
            && self.server.cors_origins.is_empty()
        {
            return Err(ConfigError::InvalidValue {
                field: "server.cors_origins".to_string(),
                message: "Production requires explicit CORS origins".to_string(),
            });
        }

        Ok(())
    }

    fn validate_model(&self) -> Result<(), ConfigError> {
        // Decoder start token plus the forced language token
        if self.model.max_length < 2 {
            return Err(ConfigError::InvalidValue {
                field: "model.max_length".to_string(),
                message: "Must be at least 2".to_string(),
            });
        }

        if self.model.provider == ModelProvider::M2m100
            && self.model.local_path.is_none()
            && self.model.model_id.trim().is_empty()
        {
            return Err(ConfigError::MissingField("model.model_id".to_string()));
        }

        if self.model.weights_file.trim().is_empty() {
            return Err(ConfigError::MissingField("model.weights_file".to_string()));
        }

        if self.model.provider == ModelProvider::Passthrough && self.environment.is_strict() {
            tracing::warn!("Passthrough model provider configured outside development");
        }

        Ok(())
    }

    fn validate_ui(&self) -> Result<(), ConfigError> {
        if self.ui.wrap_width == 0 {
            return Err(ConfigError::InvalidValue {
                field: "ui.wrap_width".to_string(),
                message: "Wrap width must be positive".to_string(),
            });
        }
        Ok(())
    }

    fn validate_sessions(&self) -> Result<(), ConfigError> {
        if self.sessions.max_sessions == 0 {
            return Err(ConfigError::InvalidValue {
                field: "sessions.max_sessions".to_string(),
                message: "At least one session must be allowed".to_string(),
            });
        }
        if self.sessions.timeout_seconds == 0 {
            return Err(ConfigError::InvalidValue {
                field: "sessions.timeout_seconds".to_string(),
                message: "Session timeout cannot be 0".to_string(),
            });
        }
        if self.sessions.cleanup_interval_seconds == 0 {
            return Err(ConfigError::InvalidValue {
                field: "sessions.cleanup_interval_seconds".to_string(),
                message: "Cleanup interval cannot be 0".to_string(),
            });
        }
        Ok(())
    }
}

/// Server configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServerConfig {
    /// HTTP server host
    #[serde(default = "default_host")]
    pub host: String,

    /// HTTP server port
    #[serde(default = "default_port")]
    pub port: u16,

    /// Enable CORS
    #[serde(default = "default_true")]
    pub cors_enabled: bool,

    /// CORS allowed origins
    #[serde(default)]
    pub cors_origins: Vec<String>,
}

fn default_host() -> String {
    "0.0.0.0".to_string()
}
fn default_port() -> u16 {
    8080
}
fn default_true() -> bool {
    true
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: default_host(),
            port: default_port(),
            cors_enabled: default_true(),
            // Empty by default - must be explicitly configured for production
            cors_origins: Vec::new(),
        }
    }
}

/// Which backend produces translations
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum ModelProvider {
    /// Native M2M100 via Candle
    #[default]
    M2m100,
    /// Echo backend, no weights required
    Passthrough,
}

/// Translation model configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ModelSettings {
    #[serde(default)]
    pub provider: ModelProvider,

    /// Hugging Face hub model id
    #[serde(default = "default_model_id")]
    pub model_id: String,

    /// Hub revision (branch, tag or commit)
    #[serde(default = "default_revision")]
    pub revision: String,

    /// Read model files from this directory instead of the hub
    #[serde(default)]
    pub local_path: Option<PathBuf>,

    /// Override the hub cache directory
    #[serde(default)]
    pub cache_dir: Option<PathBuf>,

    /// Safetensors weights file name inside the model repo
    #[serde(default = "default_weights_file")]
    pub weights_file: String,

    /// Maximum generated sequence length (decoder start token included)
    #[serde(default = "default_max_length")]
    pub max_length: usize,

    /// Reuse one loaded model across all sessions
    #[serde(default = "default_true")]
    pub share_across_sessions: bool,
}

fn default_model_id() -> String {
    "facebook/m2m100_418M".to_string()
}
fn default_revision() -> String {
    "main".to_string()
}
fn default_weights_file() -> String {
    "model.safetensors".to_string()
}
fn default_max_length() -> usize {
    70
}

impl Default for ModelSettings {
    fn default() -> Self {
        Self {
            provider: ModelProvider::default(),
            model_id: default_model_id(),
            revision: default_revision(),
            local_path: None,
            cache_dir: None,
            weights_file: default_weights_file(),
            max_length: default_max_length(),
            share_across_sessions: default_true(),
        }
    }
}

/// Page configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct UiConfig {
    /// Stylesheet inlined into every page
    #[serde(default = "default_stylesheet_path")]
    pub stylesheet_path: PathBuf,

    #[serde(default = "default_page_title")]
    pub page_title: String,

    /// Line width for escaped input/output text
    #[serde(default = "default_wrap_width")]
    pub wrap_width: usize,

    #[serde(default = "default_footer")]
    pub footer: String,
}

fn default_stylesheet_path() -> PathBuf {
    PathBuf::from("static/style.css")
}
fn default_page_title() -> String {
    "Neural Machine Translation".to_string()
}
fn default_wrap_width() -> usize {
    100
}
fn default_footer() -> String {
    "© 2024 Neural Machine Translation App".to_string()
}

impl Default for UiConfig {
    fn default() -> Self {
        Self {
            stylesheet_path: default_stylesheet_path(),
            page_title: default_page_title(),
            wrap_width: default_wrap_width(),
            footer: default_footer(),
        }
    }
}

/// Session lifetime configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SessionConfig {
    #[serde(default = "default_max_sessions")]
    pub max_sessions: usize,

    /// Idle time after which a session is dropped
    #[serde(default = "default_session_timeout")]
    pub timeout_seconds: u64,

    #[serde(default = "default_cleanup_interval")]
    pub cleanup_interval_seconds: u64,
}

fn default_max_sessions() -> usize {
    1000
}
fn default_session_timeout() -> u64 {
    3600 // 1 hour
}
fn default_cleanup_interval() -> u64 {
    300 // 5 minutes
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            max_sessions: default_max_sessions(),
            timeout_seconds: default_session_timeout(),
            cleanup_interval_seconds: default_cleanup_interval(),
        }
    }
}

/// Observability configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ObservabilityConfig {
    /// Log level
    #[serde(default = "default_log_level")]
    pub log_level: String,

    /// Enable JSON logging
    #[serde(default)]
    pub log_json: bool,

    /// Enable metrics
    #[serde(default = "default_true")]
    pub metrics_enabled: bool,
}

fn default_log_level() -> String {
    "info".to_string()
}

impl Default for ObservabilityConfig {
    fn default() -> Self {
        Self {
            log_level: default_log_level(),
            log_json: false,
            metrics_enabled: true,
        }
    }
}

/// Load settings from files and environment
///
/// Priority (highest to lowest):
/// 1. Environment variables (NMT__ prefix, `__` separated)
/// 2. config/{env}.yaml (if env specified)
/// 3. config/default.yaml
pub fn load_settings(env: Option<&str>) -> Result<Settings, ConfigError> {
    load_settings_from(Path::new("config"), env)
}

/// Same as [`load_settings`] with an explicit config directory
pub fn load_settings_from(config_dir: &Path, env: Option<&str>) -> Result<Settings, ConfigError> {
    let mut builder = Config::builder();

    // Load default config
    builder = builder.add_source(File::from(config_dir.join("default")).required(false));

    // Load environment-specific config
    if let Some(env_name) = env {
        builder = builder.add_source(File::from(config_dir.join(env_name)).required(false));
    }

    // Load from environment variables
    builder = builder.add_source(
        Environment::with_prefix("NMT")
            .prefix_separator("__")
            .separator("__")
            .try_parsing(true),
    );

    let config = builder.build()?;
    let settings: Settings = config.try_deserialize()?;

    // Validate
    settings.validate()?;

    Ok(settings)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_settings() {
        let settings = Settings::default();
        assert_eq!(settings.server.port, 8080);
        assert_eq!(settings.model.model_id, "facebook/m2m100_418M");
        assert_eq!(settings.model.max_length, 70);
        assert_eq!(settings.ui.wrap_width, 100);
        assert!(settings.validate().is_ok());
    }

    #[test]
    fn test_server_validation() {
        let mut settings = Settings::default();

        // Port cannot be 0
        settings.server.port = 0;
        assert!(settings.validate_server().is_err());
        settings.server.port = 8080;

        assert!(settings.validate_server().is_ok());
    }

    #[test]
    fn test_production_cors_validation() {
        let mut settings = Settings::default();
        settings.environment = RuntimeEnvironment::Production;

        // Production with CORS enabled requires explicit origins
        assert!(settings.validate_server().is_err());

        settings.server.cors_origins = vec!["https://translate.example.com".to_string()];
        assert!(settings.validate_server().is_ok());
    }

    #[test]
    fn test_model_validation() {
        let mut settings = Settings::default();

        settings.model.max_length = 1;
        assert!(settings.validate_model().is_err());
        settings.model.max_length = 70;

        // Empty hub id is fine when a local directory is given
        settings.model.model_id = "  ".to_string();
        assert!(matches!(
            settings.validate_model(),
            Err(ConfigError::MissingField(_))
        ));
        settings.model.local_path = Some(PathBuf::from("models/m2m100_418M"));
        assert!(settings.validate_model().is_ok());
    }

    #[test]
    fn test_ui_and_session_validation() {
        let mut settings = Settings::default();
        settings.ui.wrap_width = 0;
        assert!(settings.validate().is_err());
        settings.ui.wrap_width = 80;

        settings.sessions.timeout_seconds = 0;
        assert!(settings.validate().is_err());
        settings.sessions.timeout_seconds = 60;

        assert!(settings.validate().is_ok());
    }

    #[test]
    fn test_load_from_directory() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(
            dir.path().join("default.yaml"),
            "server:\n  port: 9000\nmodel:\n  provider: passthrough\n",
        )
        .unwrap();
        std::fs::write(dir.path().join("staging.yaml"), "ui:\n  wrap_width: 60\n").unwrap();

        let settings = load_settings_from(dir.path(), Some("staging")).unwrap();
        assert_eq!(settings.server.port, 9000);
        assert_eq!(settings.model.provider, ModelProvider::Passthrough);
        assert_eq!(settings.ui.wrap_width, 60);
        // Untouched sections keep their defaults
        assert_eq!(settings.model.max_length, 70);
    }

    #[test]
    fn test_load_rejects_invalid_file() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join("default.yaml"), "ui:\n  wrap_width: 0\n").unwrap();
        assert!(load_settings_from(dir.path(), None).is_err());
    }
}
