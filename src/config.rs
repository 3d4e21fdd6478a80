//! Application configuration using Figment
//!
//! Configuration is loaded from:
//! 1. `config/capture_session.toml` (base configuration)
//! 2. Environment variables prefixed with `CAPTURE_SESSION_`, where `__`
//!    separates nested keys
//!
//! # Example
//! ```no_run
//! use capture_session::config::AppConfig;
//!
//! let config = AppConfig::load()?;
//! config.validate()?;
//! println!("Camera: {}", config.session.camera_id);
//! # Ok::<(), Box<dyn std::error::Error>>(())
//! ```

use capture_core::Surface;
use capture_driver_mock::MockDeviceConfig;
use figment::{
    providers::{Env, Format, Serialized, Toml},
    Figment,
};
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::path::Path;

/// Default location of the configuration file.
pub const DEFAULT_CONFIG_PATH: &str = "config/capture_session.toml";

/// Prefix for environment overrides.
pub const ENV_PREFIX: &str = "CAPTURE_SESSION_";

const VALID_LOG_LEVELS: [&str; 5] = ["trace", "debug", "info", "warn", "error"];
const VALID_LOG_FORMATS: [&str; 3] = ["pretty", "compact", "json"];

/// Top-level configuration
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct AppConfig {
    /// Application settings
    #[serde(default)]
    pub application: ApplicationConfig,
    /// Session settings
    #[serde(default)]
    pub session: SessionConfig,
    /// Mock device settings
    #[serde(default)]
    pub mock: MockDeviceConfig,
}

/// Application-level configuration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ApplicationConfig {
    /// Application name
    #[serde(default = "default_name")]
    pub name: String,
    /// Logging level (trace, debug, info, warn, error)
    #[serde(default = "default_log_level")]
    pub log_level: String,
    /// Logging format (pretty, compact, json)
    #[serde(default = "default_log_format")]
    pub log_format: String,
}

/// Capture session configuration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SessionConfig {
    /// Camera the session is opened on
    #[serde(default = "default_camera_id")]
    pub camera_id: String,
    /// Output surfaces configured before capturing
    #[serde(default = "default_outputs")]
    pub outputs: Vec<String>,
}

fn default_name() -> String {
    "capture-session".to_string()
}

fn default_log_level() -> String {
    "info".to_string()
}

fn default_log_format() -> String {
    "pretty".to_string()
}

fn default_camera_id() -> String {
    "0".to_string()
}

fn default_outputs() -> Vec<String> {
    vec!["preview".to_string()]
}

impl Default for ApplicationConfig {
    fn default() -> Self {
        Self {
            name: default_name(),
            log_level: default_log_level(),
            log_format: default_log_format(),
        }
    }
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            camera_id: default_camera_id(),
            outputs: default_outputs(),
        }
    }
}

impl SessionConfig {
    /// Output names as surfaces, in configured order.
    pub fn surfaces(&self) -> Vec<Surface> {
        self.outputs.iter().map(Surface::new).collect()
    }
}

impl AppConfig {
    /// Load configuration from the default file and environment variables
    ///
    /// Example override: `CAPTURE_SESSION_APPLICATION__LOG_LEVEL=debug`
    pub fn load() -> Result<Self, figment::Error> {
        Self::load_from(DEFAULT_CONFIG_PATH)
    }

    /// Load configuration from a specific file path
    ///
    /// A missing file is not an error; defaults and environment still apply.
    pub fn load_from<P: AsRef<Path>>(path: P) -> Result<Self, figment::Error> {
        Self::figment(path).extract()
    }

    /// The provider stack used by [`AppConfig::load_from`].
    pub fn figment<P: AsRef<Path>>(path: P) -> Figment {
        Figment::from(Serialized::defaults(AppConfig::default()))
            .merge(Toml::file(path.as_ref()))
            .merge(Env::prefixed(ENV_PREFIX).split("__"))
    }

    /// Validate configuration after loading
    pub fn validate(&self) -> Result<(), String> {
        let level = self.application.log_level.to_lowercase();
        if !VALID_LOG_LEVELS.contains(&level.as_str()) {
            return Err(format!(
                "Invalid log_level '{}'. Must be one of: {}",
                self.application.log_level,
                VALID_LOG_LEVELS.join(", ")
            ));
        }

        let format = self.application.log_format.to_lowercase();
        if !VALID_LOG_FORMATS.contains(&format.as_str()) {
            return Err(format!(
                "Invalid log_format '{}'. Must be one of: {}",
                self.application.log_format,
                VALID_LOG_FORMATS.join(", ")
            ));
        }

        if self.session.camera_id.trim().is_empty() {
            return Err("session.camera_id must not be empty".to_string());
        }

        let mut names = HashSet::new();
        for output in &self.session.outputs {
            if output.trim().is_empty() {
                return Err("session.outputs must not contain empty names".to_string());
            }
            if !names.insert(output) {
                return Err(format!("Duplicate output: {}", output));
            }
        }

        self.mock.validate()
    }
}
