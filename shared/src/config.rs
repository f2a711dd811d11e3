use secrecy::SecretString;
use serde::Deserialize;
use thiserror::Error;

use crate::error::{AppError, ErrorKind};
use crate::http::ValidatedUrl;
use crate::{
    DEFAULT_FUNCTION_TIMEOUT_MS, MAX_FUNCTION_TIMEOUT_MS, NEXT_PAGE_PREFETCH_THRESHOLD,
    PUBLIC_GALLERY_PAGE_SIZE, THUMBNAIL_WIDTH,
};

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ConfigError {
    #[error("failed to parse config: {0}")]
    Parse(String),
    #[error("invalid value for `{field}`: {reason}")]
    Invalid { field: &'static str, reason: String },
}

impl From<ConfigError> for AppError {
    fn from(e: ConfigError) -> Self {
        AppError::new(ErrorKind::InvalidState, e.to_string())
    }
}

#[derive(Clone, Debug, PartialEq, Eq, Deserialize)]
#[serde(default)]
pub struct GalleryConfig {
    pub page_size: u32,
    /// Load the next page once the last visible item is this close to the end.
    pub prefetch_threshold: usize,
    pub thumbnail_width: u32,
}

impl Default for GalleryConfig {
    fn default() -> Self {
        Self {
            page_size: PUBLIC_GALLERY_PAGE_SIZE,
            prefetch_threshold: NEXT_PAGE_PREFETCH_THRESHOLD,
            thumbnail_width: THUMBNAIL_WIDTH,
        }
    }
}

impl GalleryConfig {
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.page_size == 0 {
            return Err(ConfigError::Invalid {
                field: "gallery.page_size",
                reason: "must be > 0".into(),
            });
        }
        if self.thumbnail_width == 0 {
            return Err(ConfigError::Invalid {
                field: "gallery.thumbnail_width",
                reason: "must be > 0".into(),
            });
        }
        Ok(())
    }
}

#[derive(Clone, Debug, Deserialize)]
pub struct FunctionsConfig {
    pub project_url: String,
    pub anon_key: SecretString,
    #[serde(default = "default_timeout_ms")]
    pub timeout_ms: u64,
}

fn default_timeout_ms() -> u64 {
    DEFAULT_FUNCTION_TIMEOUT_MS
}

impl FunctionsConfig {
    pub fn new(project_url: impl Into<String>, anon_key: impl Into<String>) -> Self {
        Self {
            project_url: project_url.into(),
            anon_key: SecretString::new(anon_key.into()),
            timeout_ms: DEFAULT_FUNCTION_TIMEOUT_MS,
        }
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        let url = ValidatedUrl::new(self.project_url.as_str()).map_err(|e| {
            ConfigError::Invalid {
                field: "functions.project_url",
                reason: e.to_string(),
            }
        })?;
        if url.scheme() != "https" {
            return Err(ConfigError::Invalid {
                field: "functions.project_url",
                reason: "must use https".into(),
            });
        }
        if self.timeout_ms == 0 || self.timeout_ms > MAX_FUNCTION_TIMEOUT_MS {
            return Err(ConfigError::Invalid {
                field: "functions.timeout_ms",
                reason: format!("must be within 1..={MAX_FUNCTION_TIMEOUT_MS}"),
            });
        }
        Ok(())
    }
}

#[derive(Clone, Debug, Deserialize)]
pub struct ClientConfig {
    #[serde(default)]
    pub gallery: GalleryConfig,
    pub functions: FunctionsConfig,
}

impl ClientConfig {
    pub fn from_json_str(raw: &str) -> Result<Self, ConfigError> {
        let config: Self =
            serde_json::from_str(raw).map_err(|e| ConfigError::Parse(e.to_string()))?;
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        self.gallery.validate()?;
        self.functions.validate()
    }
}
