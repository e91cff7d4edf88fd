use config::{Config, ConfigError, Environment, File};
use serde::{Deserialize, Serialize};
use std::path::Path;
use tracing::{debug, info};

#[derive(Debug, Deserialize, Serialize, Clone)]
pub struct InspectConfig {
    #[serde(default)]
    pub api: ApiConfig,
    #[serde(default)]
    pub media: MediaConfig,
    #[serde(default)]
    pub upload: UploadConfig,
    #[serde(default)]
    pub system: SystemConfig,
}

#[derive(Debug, Deserialize, Serialize, Clone)]
pub struct ApiConfig {
    /// Base URL of the HostIQ backend API
    #[serde(default = "default_base_url")]
    pub base_url: String,

    /// Bearer token attached to every request when present
    #[serde(default)]
    pub auth_token: Option<String>,

    /// Per-request timeout in seconds
    #[serde(default = "default_timeout_seconds")]
    pub timeout_seconds: u64,
}

#[derive(Debug, Deserialize, Serialize, Clone)]
pub struct MediaConfig {
    /// Maximum image width after client-side resizing
    #[serde(default = "default_max_width")]
    pub max_width: u32,

    /// JPEG quality (1-100) used when re-encoding for upload
    #[serde(default = "default_jpeg_quality")]
    pub jpeg_quality: u8,
}

/// What to do when a valuable-item verification upload fails
#[derive(Debug, Deserialize, Serialize, Clone, Copy, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum VerificationFailurePolicy {
    /// Abort the whole submission, same as room-photo uploads
    Abort,
    /// Log the failure and keep going; the inspection is still submitted
    Continue,
}

#[derive(Debug, Deserialize, Serialize, Clone)]
pub struct UploadConfig {
    #[serde(default = "default_verification_failure_policy")]
    pub verification_failure_policy: VerificationFailurePolicy,
}

#[derive(Debug, Deserialize, Serialize, Clone)]
pub struct SystemConfig {
    /// Session event bus capacity
    #[serde(default = "default_event_bus_capacity")]
    pub event_bus_capacity: usize,
}

fn default_base_url() -> String {
    "http://localhost:8080".to_string()
}

fn default_timeout_seconds() -> u64 {
    30
}

fn default_max_width() -> u32 {
    960
}

fn default_jpeg_quality() -> u8 {
    30
}

fn default_verification_failure_policy() -> VerificationFailurePolicy {
    VerificationFailurePolicy::Abort
}

fn default_event_bus_capacity() -> usize {
    100
}

impl Default for ApiConfig {
    fn default() -> Self {
        Self {
            base_url: default_base_url(),
            auth_token: None,
            timeout_seconds: default_timeout_seconds(),
        }
    }
}

impl Default for MediaConfig {
    fn default() -> Self {
        Self {
            max_width: default_max_width(),
            jpeg_quality: default_jpeg_quality(),
        }
    }
}

impl Default for UploadConfig {
    fn default() -> Self {
        Self {
            verification_failure_policy: default_verification_failure_policy(),
        }
    }
}

impl Default for SystemConfig {
    fn default() -> Self {
        Self {
            event_bus_capacity: default_event_bus_capacity(),
        }
    }
}

impl Default for InspectConfig {
    fn default() -> Self {
        Self {
            api: ApiConfig::default(),
            media: MediaConfig::default(),
            upload: UploadConfig::default(),
            system: SystemConfig::default(),
        }
    }
}

impl InspectConfig {
    /// Load configuration from a TOML file, layered with HOSTIQ_* environment
    /// variables (e.g. HOSTIQ_API__BASE_URL)
    pub fn load_from_file<P: AsRef<Path>>(path: P) -> Result<Self, ConfigError> {
        let path = path.as_ref();
        debug!("Loading configuration from: {}", path.display());

        let config = Config::builder()
            .add_source(File::from(path).required(false))
            .add_source(Environment::with_prefix("HOSTIQ").separator("__"))
            .build()?;

        let config: InspectConfig = config.try_deserialize()?;
        info!("Configuration loaded");
        Ok(config)
    }

    /// Validate configuration values
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.api.base_url.is_empty() {
            return Err(ConfigError::Message("api.base_url must not be empty".into()));
        }
        if self.api.timeout_seconds == 0 {
            return Err(ConfigError::Message(
                "api.timeout_seconds must be greater than 0".into(),
            ));
        }
        if self.media.max_width == 0 {
            return Err(ConfigError::Message(
                "media.max_width must be greater than 0".into(),
            ));
        }
        if self.media.jpeg_quality == 0 || self.media.jpeg_quality > 100 {
            return Err(ConfigError::Message(
                "media.jpeg_quality must be between 1 and 100".into(),
            ));
        }
        if self.system.event_bus_capacity == 0 {
            return Err(ConfigError::Message(
                "system.event_bus_capacity must be greater than 0".into(),
            ));
        }
        Ok(())
    }
}
