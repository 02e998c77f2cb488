//! Configuration options for a batch transcription run

use crate::error::{DecodeError, Result};
use serde::{Deserialize, Serialize};
use std::path::Path;
use std::time::Duration;

/// Configuration for a batch transcription run
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct BatchConfig {
    /// URL of the inference endpoint (multipart POST)
    pub inference_url: String,

    /// URL of the liveness endpoint (GET)
    pub health_url: String,

    /// Maximum number of transcription requests in flight at once
    pub concurrency_limit: usize,

    /// Maximum number of simultaneously open outbound connections
    pub connection_limit: usize,

    /// Whole-request timeout in seconds (connect + send + receive)
    pub request_timeout_secs: u64,

    /// File suffix that marks an entry of the audio directory as part of the corpus
    pub media_extension: String,

    /// Content type sent with each audio part
    pub content_type: String,

    /// Multipart field name carrying the audio bytes
    pub file_field: String,
}

impl Default for BatchConfig {
    fn default() -> Self {
        Self {
            inference_url: "http://localhost:8001/asr".to_string(),
            health_url: "http://localhost:8001/ping".to_string(),
            concurrency_limit: 10,
            connection_limit: 10,
            request_timeout_secs: 300,
            media_extension: ".mp3".to_string(),
            content_type: "audio/mp3".to_string(),
            file_field: "file".to_string(),
        }
    }
}

impl BatchConfig {
    /// Create a new configuration with default values
    pub fn new() -> Self {
        Self::default()
    }

    /// Load a configuration from a TOML file; absent keys keep their defaults
    pub fn from_toml_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();
        let content = std::fs::read_to_string(path).map_err(|e| {
            DecodeError::Configuration(format!(
                "Failed to read config file {}: {}",
                path.display(),
                e
            ))
        })?;
        Self::from_toml_str(&content)
    }

    /// Parse a configuration from TOML text
    pub fn from_toml_str(content: &str) -> Result<Self> {
        toml::from_str(content)
            .map_err(|e| DecodeError::Configuration(format!("Invalid config file: {}", e)))
    }

    pub fn with_inference_url<S: Into<String>>(mut self, url: S) -> Self {
        self.inference_url = url.into();
        self
    }

    pub fn with_health_url<S: Into<String>>(mut self, url: S) -> Self {
        self.health_url = url.into();
        self
    }

    /// Set the application-level concurrency cap
    pub fn with_concurrency_limit(mut self, limit: usize) -> Self {
        self.concurrency_limit = limit;
        self
    }

    /// Set the transport-level connection cap
    pub fn with_connection_limit(mut self, limit: usize) -> Self {
        self.connection_limit = limit;
        self
    }

    /// Set the per-request timeout in seconds
    pub fn with_timeout_secs(mut self, secs: u64) -> Self {
        self.request_timeout_secs = secs;
        self
    }

    pub fn with_media_extension<S: Into<String>>(mut self, extension: S) -> Self {
        self.media_extension = extension.into();
        self
    }

    /// Per-request timeout as a [`Duration`]
    pub fn request_timeout(&self) -> Duration {
        Duration::from_secs(self.request_timeout_secs)
    }

    /// Check that every knob holds a usable value
    pub fn validate(&self) -> Result<()> {
        if self.concurrency_limit == 0 {
            return Err(DecodeError::Configuration(
                "concurrency_limit must be at least 1".to_string(),
            ));
        }
        if self.connection_limit == 0 {
            return Err(DecodeError::Configuration(
                "connection_limit must be at least 1".to_string(),
            ));
        }
        if self.request_timeout_secs == 0 {
            return Err(DecodeError::Configuration(
                "request_timeout_secs must be at least 1".to_string(),
            ));
        }
        if self.media_extension.is_empty() {
            return Err(DecodeError::Configuration(
                "media_extension must not be empty".to_string(),
            ));
        }
        if self.file_field.is_empty() {
            return Err(DecodeError::Configuration(
                "file_field must not be empty".to_string(),
            ));
        }
        reqwest::multipart::Part::text("")
            .mime_str(&self.content_type)
            .map_err(|e| {
                DecodeError::Configuration(format!(
                    "Invalid content_type '{}': {}",
                    self.content_type, e
                ))
            })?;
        for (name, url) in [
            ("inference_url", &self.inference_url),
            ("health_url", &self.health_url),
        ] {
            reqwest::Url::parse(url).map_err(|e| {
                DecodeError::Configuration(format!("Invalid {} '{}': {}", name, url, e))
            })?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults_are_valid() {
        let config = BatchConfig::default();
        assert!(config.validate().is_ok());
        assert_eq!(config.media_extension, ".mp3");
        assert_eq!(config.file_field, "file");
        assert_eq!(config.request_timeout(), Duration::from_secs(300));
    }

    #[test]
    fn test_zero_limits_rejected() {
        let config = BatchConfig::new().with_concurrency_limit(0);
        assert!(matches!(
            config.validate(),
            Err(DecodeError::Configuration(_))
        ));

        let config = BatchConfig::new().with_connection_limit(0);
        assert!(config.validate().is_err());

        let config = BatchConfig::new().with_timeout_secs(0);
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_bad_url_rejected() {
        let config = BatchConfig::new().with_inference_url("not a url");
        let err = config.validate().unwrap_err();
        assert!(err.to_string().contains("inference_url"));
    }

    #[test]
    fn test_partial_toml_keeps_defaults() {
        let config = BatchConfig::from_toml_str(
            r#"
            inference_url = "http://asr:8001/asr"
            concurrency_limit = 4
            "#,
        )
        .unwrap();

        assert_eq!(config.inference_url, "http://asr:8001/asr");
        assert_eq!(config.concurrency_limit, 4);
        assert_eq!(config.connection_limit, 10);
        assert_eq!(config.health_url, "http://localhost:8001/ping");
    }

    #[test]
    fn test_invalid_toml() {
        let result = BatchConfig::from_toml_str("concurrency_limit = \"many\"");
        assert!(matches!(result, Err(DecodeError::Configuration(_))));
    }
}
