//! Configuration System
//!
//! Layered configuration for the annotation engine, the word provider and logging.
//! Sources, lowest to highest precedence: built-in defaults, the user config file
//! (`<config dir>/altscan/config.toml`), an explicitly named file, and environment
//! variables of the form `ALTSCAN_<SECTION>__<KEY>`.

use crate::error::EngineError;
use crate::logging::LoggingConfig;
use crate::word_source::{DEFAULT_CONNECT_TIMEOUT_SECS, DEFAULT_ENDPOINT, DEFAULT_FALLBACK_WORD};
use config::builder::DefaultState;
use config::{ConfigBuilder, ConfigError, Environment, File};
use directories::ProjectDirs;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use tracing::debug;

/// Default presence-only marker written on engine-annotated images
pub const DEFAULT_MARKER_ATTRIBUTE: &str = "data-altscan-annotated";

/// Root configuration structure
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct AltscanConfig {
    #[serde(default)]
    pub engine: EngineConfig,

    #[serde(default)]
    pub word_source: WordSourceConfig,

    #[serde(default)]
    pub logging: LoggingConfig,
}

/// Annotation engine settings
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EngineConfig {
    /// Re-annotate images this engine marked earlier instead of skipping any image with alt text
    #[serde(default)]
    pub overwrite_existing: bool,

    /// Attribute recording that an image's alt text was generated by the engine
    #[serde(default = "default_marker_attribute")]
    pub marker_attribute: String,
}

fn default_marker_attribute() -> String {
    DEFAULT_MARKER_ATTRIBUTE.to_string()
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            overwrite_existing: false,
            marker_attribute: default_marker_attribute(),
        }
    }
}

/// Word provider settings
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WordSourceConfig {
    #[serde(default = "default_endpoint")]
    pub endpoint: String,

    #[serde(default = "default_fallback_word")]
    pub fallback_word: String,

    #[serde(default = "default_connect_timeout_secs")]
    pub connect_timeout_secs: u64,

    /// Overall request timeout; unset leaves a hung request pending
    #[serde(default)]
    pub request_timeout_secs: Option<u64>,
}

fn default_endpoint() -> String {
    DEFAULT_ENDPOINT.to_string()
}

fn default_fallback_word() -> String {
    DEFAULT_FALLBACK_WORD.to_string()
}

fn default_connect_timeout_secs() -> u64 {
    DEFAULT_CONNECT_TIMEOUT_SECS
}

impl Default for WordSourceConfig {
    fn default() -> Self {
        Self {
            endpoint: default_endpoint(),
            fallback_word: default_fallback_word(),
            connect_timeout_secs: default_connect_timeout_secs(),
            request_timeout_secs: None,
        }
    }
}

/// Configuration validation errors
#[derive(Debug, Clone)]
pub enum ValidationError {
    Engine(String),
    WordSource(String),
}

impl std::fmt::Display for ValidationError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ValidationError::Engine(msg) => write!(f, "Engine: {}", msg),
            ValidationError::WordSource(msg) => write!(f, "Word source: {}", msg),
        }
    }
}

impl std::error::Error for ValidationError {}

impl EngineConfig {
    pub fn validate(&self) -> Result<(), String> {
        if self.marker_attribute.trim().is_empty() {
            return Err("Marker attribute cannot be empty".to_string());
        }
        if self.marker_attribute.chars().any(char::is_whitespace) {
            return Err(format!(
                "Marker attribute '{}' cannot contain whitespace",
                self.marker_attribute
            ));
        }
        Ok(())
    }
}

impl WordSourceConfig {
    pub fn validate(&self) -> Result<(), String> {
        if !(self.endpoint.starts_with("http://") || self.endpoint.starts_with("https://")) {
            return Err(format!(
                "Endpoint '{}' must be an http(s) URL",
                self.endpoint
            ));
        }
        if self.fallback_word.trim().is_empty() {
            return Err("Fallback word cannot be empty".to_string());
        }
        Ok(())
    }
}

impl AltscanConfig {
    /// Validate the entire configuration
    pub fn validate(&self) -> Result<(), Vec<ValidationError>> {
        let mut errors = Vec::new();

        if let Err(e) = self.engine.validate() {
            errors.push(ValidationError::Engine(e));
        }
        if let Err(e) = self.word_source.validate() {
            errors.push(ValidationError::WordSource(e));
        }

        if errors.is_empty() {
            Ok(())
        } else {
            Err(errors)
        }
    }
}

/// Loads [`AltscanConfig`] from files and the environment
pub struct ConfigLoader;

impl ConfigLoader {
    /// Path of the per-user config file, if a home directory can be resolved
    pub fn user_config_path() -> Option<PathBuf> {
        ProjectDirs::from("", "", "altscan").map(|dirs| dirs.config_dir().join("config.toml"))
    }

    /// Load user file, optional explicit file and environment, then validate
    pub fn load(explicit: Option<&Path>) -> Result<AltscanConfig, EngineError> {
        let mut builder = config::Config::builder();
        if let Some(user_path) = Self::user_config_path() {
            debug!(config_path = %user_path.display(), "Checking user configuration file");
            builder = builder.add_source(File::from(user_path).required(false));
        }
        if let Some(path) = explicit {
            builder = builder.add_source(File::from(path.to_path_buf()).required(true));
        }
        Self::finish(builder)
    }

    /// Load a single file plus environment overrides, skipping the user file
    pub fn load_from_file(path: &Path) -> Result<AltscanConfig, EngineError> {
        let builder =
            config::Config::builder().add_source(File::from(path.to_path_buf()).required(true));
        Self::finish(builder)
    }

    fn finish(builder: ConfigBuilder<DefaultState>) -> Result<AltscanConfig, EngineError> {
        let config: AltscanConfig = builder
            .add_source(Self::environment())
            .build()?
            .try_deserialize()
            .map_err(|e: ConfigError| EngineError::ConfigError(e.to_string()))?;

        config.validate().map_err(|errors| {
            let messages: Vec<String> = errors.iter().map(|e| e.to_string()).collect();
            EngineError::ConfigError(format!(
                "Configuration validation failed:\n{}",
                messages.join("\n")
            ))
        })?;
        Ok(config)
    }

    fn environment() -> Environment {
        Environment::with_prefix("ALTSCAN")
            .prefix_separator("_")
            .separator("__")
            .try_parsing(true)
    }
}
