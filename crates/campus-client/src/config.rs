//! Configuration for the Campus LMS client.
//!
//! Settings come from `campus.json` (all fields optional), then from the
//! environment, then from whatever the caller overrides explicitly.

use std::path::Path;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::error::{ClientError, Result};

/// The default config file name.
const CONFIG_FILE_NAME: &str = "campus.json";

/// Environment variables consulted for the API base, in priority order.
pub const API_BASE_ENV_VARS: [&str; 3] = [
    "CAMPUS_API_BASE",
    "NEXT_PUBLIC_API_BASE",
    "NEXT_PUBLIC_API_BASE_URL",
];

/// Environment variables consulted for the "me" path override.
pub const ME_PATH_ENV_VARS: [&str; 2] = ["CAMPUS_ME_PATH", "NEXT_PUBLIC_ME_PATH"];

fn default_api_base() -> String {
    "http://127.0.0.1:8000".to_string()
}

const fn default_request_timeout_ms() -> u64 {
    15_000
}

const fn default_refresh_timeout_ms() -> u64 {
    10_000
}

fn default_session_dir() -> String {
    ".campus".to_string()
}

/// Client configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ClientConfig {
    /// Base URL of the backend, without a trailing path.
    #[serde(default = "default_api_base")]
    pub api_base: String,

    /// Timeout for ordinary requests in milliseconds.
    #[serde(default = "default_request_timeout_ms")]
    pub request_timeout_ms: u64,

    /// Timeout for the token refresh call in milliseconds.
    #[serde(default = "default_refresh_timeout_ms")]
    pub refresh_timeout_ms: u64,

    /// Extra "current user" path tried before the built-in candidates.
    #[serde(default)]
    pub me_path: Option<String>,

    /// Which field carries the course state in course updates.
    #[serde(default)]
    pub course_status_field: StatusField,

    /// Multipart field name for the course banner upload.
    #[serde(default)]
    pub banner_field: BannerField,

    /// Directory holding the persisted local-scope token file.
    #[serde(default = "default_session_dir")]
    pub session_dir: String,
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self {
            api_base: default_api_base(),
            request_timeout_ms: default_request_timeout_ms(),
            refresh_timeout_ms: default_refresh_timeout_ms(),
            me_path: None,
            course_status_field: StatusField::default(),
            banner_field: BannerField::default(),
            session_dir: default_session_dir(),
        }
    }
}

impl ClientConfig {
    /// Loads `campus.json` from the given directory.
    ///
    /// # Errors
    ///
    /// Returns an error if the file exists but is invalid.
    pub fn load_from_dir(dir: &Path) -> Result<Self> {
        Self::load_from_file(&dir.join(CONFIG_FILE_NAME))
    }

    /// Loads configuration from a specific file path.
    ///
    /// If the file does not exist, returns the default configuration.
    ///
    /// # Errors
    ///
    /// Returns `ClientError::ConfigParse` if the file exists but cannot be
    /// read or parsed, and `ClientError::ConfigValidation` if a value is out
    /// of range.
    pub fn load_from_file(path: &Path) -> Result<Self> {
        let contents = match std::fs::read_to_string(path) {
            Ok(contents) => contents,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                let config = Self::default();
                config.validate()?;
                return Ok(config);
            }
            Err(e) => {
                return Err(ClientError::config_parse(
                    path,
                    format!("failed to read file: {e}"),
                ));
            }
        };

        let config: Self = serde_json::from_str(&contents)
            .map_err(|e| ClientError::config_parse(path, e.to_string()))?;
        config.validate()?;
        Ok(config)
    }

    /// Applies environment overrides read through `lookup`.
    ///
    /// The first non-empty variable of [`API_BASE_ENV_VARS`] replaces
    /// `api_base`; likewise [`ME_PATH_ENV_VARS`] for `me_path`.
    #[must_use]
    pub fn with_env_overrides<F>(mut self, lookup: F) -> Self
    where
        F: Fn(&str) -> Option<String>,
    {
        let first = |names: &[&str]| {
            names
                .iter()
                .filter_map(|name| lookup(name))
                .map(|v| v.trim().to_string())
                .find(|v| !v.is_empty())
        };
        if let Some(base) = first(&API_BASE_ENV_VARS) {
            self.api_base = base;
        }
        if let Some(me_path) = first(&ME_PATH_ENV_VARS) {
            self.me_path = Some(me_path);
        }
        self
    }

    /// Applies overrides from the process environment.
    #[must_use]
    pub fn with_process_env(self) -> Self {
        self.with_env_overrides(|name| std::env::var(name).ok())
    }

    /// Sets the API base URL.
    #[must_use]
    pub fn with_api_base(mut self, api_base: impl Into<String>) -> Self {
        self.api_base = api_base.into();
        self
    }

    /// Returns the request timeout.
    #[must_use]
    pub const fn request_timeout(&self) -> Duration {
        Duration::from_millis(self.request_timeout_ms)
    }

    /// Returns the refresh timeout.
    #[must_use]
    pub const fn refresh_timeout(&self) -> Duration {
        Duration::from_millis(self.refresh_timeout_ms)
    }

    /// Validates the configuration values.
    ///
    /// # Errors
    ///
    /// Returns `ClientError::ConfigValidation` if any check fails.
    pub fn validate(&self) -> Result<()> {
        let base = self.api_base.trim();
        if base.is_empty() {
            return Err(ClientError::config_validation(
                "apiBase must not be empty",
                "Set apiBase in campus.json or export CAMPUS_API_BASE",
            ));
        }

        if !(base.starts_with("http://") || base.starts_with("https://")) {
            return Err(ClientError::config_validation(
                format!("apiBase '{base}' must start with http:// or https://"),
                "Use a full URL such as http://127.0.0.1:8000",
            ));
        }

        if reqwest::Url::parse(base).is_err() {
            return Err(ClientError::config_validation(
                format!("apiBase '{base}' is not a valid URL"),
                "Use a full URL such as http://127.0.0.1:8000",
            ));
        }

        if self.request_timeout_ms == 0 {
            return Err(ClientError::config_validation(
                "requestTimeoutMs must be greater than 0",
                "Set requestTimeoutMs to at least 1 in your campus.json",
            ));
        }

        if self.refresh_timeout_ms == 0 {
            return Err(ClientError::config_validation(
                "refreshTimeoutMs must be greater than 0",
                "Set refreshTimeoutMs to at least 1 in your campus.json",
            ));
        }

        if self.session_dir.trim().is_empty() {
            return Err(ClientError::config_validation(
                "sessionDir must not be empty",
                "Provide a directory path in your campus.json (use '.' for current directory)",
            ));
        }

        Ok(())
    }
}

/// Field that carries the course state when updating a course.
///
/// Some backend versions expose `status`, others `visibility`; only one is
/// sent per request.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum StatusField {
    /// Send `status` (default).
    #[default]
    Status,
    /// Send `visibility`.
    Visibility,
}

impl StatusField {
    /// Returns the form field name.
    #[must_use]
    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::Status => "status",
            Self::Visibility => "visibility",
        }
    }

    fn from_str_case_insensitive(s: &str) -> Option<Self> {
        match s.to_lowercase().as_str() {
            "status" => Some(Self::Status),
            "visibility" => Some(Self::Visibility),
            _ => None,
        }
    }
}

impl<'de> Deserialize<'de> for StatusField {
    fn deserialize<D>(deserializer: D) -> std::result::Result<Self, D::Error>
    where
        D: serde::Deserializer<'de>,
    {
        let s = String::deserialize(deserializer)?;
        Self::from_str_case_insensitive(&s).ok_or_else(|| {
            serde::de::Error::custom(format!(
                "invalid course status field '{s}': expected one of 'status', 'visibility'"
            ))
        })
    }
}

impl Serialize for StatusField {
    fn serialize<S>(&self, serializer: S) -> std::result::Result<S::Ok, S::Error>
    where
        S: serde::Serializer,
    {
        serializer.serialize_str(self.as_str())
    }
}

/// Multipart field name for a course banner image.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum BannerField {
    /// `banner_img` (default).
    #[default]
    BannerImg,
    /// `banner_image`.
    BannerImage,
}

impl BannerField {
    /// Returns the form field name.
    #[must_use]
    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::BannerImg => "banner_img",
            Self::BannerImage => "banner_image",
        }
    }

    fn from_str_case_insensitive(s: &str) -> Option<Self> {
        match s.to_lowercase().as_str() {
            "banner_img" => Some(Self::BannerImg),
            "banner_image" => Some(Self::BannerImage),
            _ => None,
        }
    }
}

impl<'de> Deserialize<'de> for BannerField {
    fn deserialize<D>(deserializer: D) -> std::result::Result<Self, D::Error>
    where
        D: serde::Deserializer<'de>,
    {
        let s = String::deserialize(deserializer)?;
        Self::from_str_case_insensitive(&s).ok_or_else(|| {
            serde::de::Error::custom(format!(
                "invalid banner field '{s}': expected one of 'banner_img', 'banner_image'"
            ))
        })
    }
}

impl Serialize for BannerField {
    fn serialize<S>(&self, serializer: S) -> std::result::Result<S::Ok, S::Error>
    where
        S: serde::Serializer,
    {
        serializer.serialize_str(self.as_str())
    }
}
