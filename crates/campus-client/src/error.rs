//! Error types for the Campus LMS client.
//!
//! Every failure surfaces as a [`ClientError`]. HTTP failures keep the
//! status code and the server-provided detail so callers can pick a message
//! the same way the web pages do.

use std::path::PathBuf;

use serde_json::Value;

use crate::validate::ValidationError;

/// A specialized `Result` type for client operations.
pub type Result<T> = std::result::Result<T, ClientError>;

/// Errors that can occur while talking to the LMS backend.
#[derive(Debug, thiserror::Error)]
pub enum ClientError {
    // ========================================================================
    // Configuration Errors
    // ========================================================================
    /// Invalid JSON syntax in the configuration file.
    #[error("Invalid JSON in config file '{path}': {message}\n\nSuggestion: Validate your campus.json with a JSON linter")]
    ConfigParse {
        /// Path to the configuration file.
        path: PathBuf,
        /// Description of the parse error.
        message: String,
    },

    /// Configuration validation failed.
    #[error("Invalid configuration: {message}\n\nSuggestion: {suggestion}")]
    ConfigValidation {
        /// Description of the validation failure.
        message: String,
        /// Actionable suggestion for the user.
        suggestion: String,
    },

    // ========================================================================
    // HTTP Errors
    // ========================================================================
    /// The backend answered with a non-success status.
    #[error("{method} {path} failed with HTTP {status}: {}", .detail.as_deref().unwrap_or("no detail"))]
    Http {
        /// Request method.
        method: String,
        /// Normalized request path.
        path: String,
        /// HTTP status code.
        status: u16,
        /// Server-provided detail message, if any.
        detail: Option<String>,
        /// Parsed JSON body, if the body was JSON.
        body: Option<Value>,
    },

    /// The request did not complete within the configured timeout.
    #[error("Request to {path} timed out\n\nSuggestion: Check that the backend is reachable")]
    Timeout {
        /// Normalized request path.
        path: String,
    },

    /// Connection or protocol failure below HTTP.
    #[error("Network error: {0}\n\nSuggestion: Check the apiBase setting and your network connection")]
    Transport(#[from] reqwest::Error),

    /// JSON serialization/deserialization error.
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    // ========================================================================
    // Auth Errors
    // ========================================================================
    /// Reading or writing stored tokens failed.
    #[error(transparent)]
    Session(#[from] campus_session::SessionError),

    /// The login response carried no usable access token.
    #[error("Login response did not contain an access token{}", .hint.as_deref().map(|h| format!(" ({h})")).unwrap_or_default())]
    MissingToken {
        /// What the server sent instead, when recognizable.
        hint: Option<String>,
    },

    // ========================================================================
    // Client-side Errors
    // ========================================================================
    /// Input rejected before any request was sent.
    #[error(transparent)]
    Validation(#[from] ValidationError),

    /// Every candidate path of a fallback lookup failed without a response.
    #[error("No route matched: tried {}", .paths.join(", "))]
    NoRouteMatched {
        /// Paths that were tried, in order.
        paths: Vec<String>,
    },
}

/// Extracts a human-readable message from an error body.
///
/// Lookup order: `detail`, `message`, first entry of `non_field_errors`, or
/// the body itself when it is a plain string.
pub fn detail_from_body(body: &Value) -> Option<String> {
    if let Some(s) = body.as_str() {
        return (!s.is_empty()).then(|| s.to_string());
    }
    let text = |v: &Value| v.as_str().filter(|s| !s.is_empty()).map(str::to_string);
    body.get("detail")
        .and_then(text)
        .or_else(|| body.get("message").and_then(text))
        .or_else(|| {
            body.get("non_field_errors")
                .and_then(Value::as_array)
                .and_then(|errors| errors.first())
                .and_then(text)
        })
}

impl ClientError {
    /// Creates a new `ConfigParse` error with the given path and message.
    #[must_use]
    pub fn config_parse(path: impl Into<PathBuf>, message: impl Into<String>) -> Self {
        Self::ConfigParse {
            path: path.into(),
            message: message.into(),
        }
    }

    /// Creates a new `ConfigValidation` error with the given message and suggestion.
    #[must_use]
    pub fn config_validation(message: impl Into<String>, suggestion: impl Into<String>) -> Self {
        Self::ConfigValidation {
            message: message.into(),
            suggestion: suggestion.into(),
        }
    }

    /// Creates a new `Http` error, pulling the detail out of `body`.
    #[must_use]
    pub fn http(
        method: impl Into<String>,
        path: impl Into<String>,
        status: u16,
        body: Option<Value>,
    ) -> Self {
        let detail = body.as_ref().and_then(detail_from_body);
        Self::Http {
            method: method.into(),
            path: path.into(),
            status,
            detail,
            body,
        }
    }

    /// Returns the HTTP status code, if this is an HTTP error.
    #[must_use]
    pub const fn status(&self) -> Option<u16> {
        match self {
            Self::Http { status, .. } => Some(*status),
            _ => None,
        }
    }

    /// Returns the server-provided detail, if any.
    #[must_use]
    pub fn detail(&self) -> Option<&str> {
        match self {
            Self::Http { detail, .. } => detail.as_deref(),
            _ => None,
        }
    }

    /// Returns `true` for 401 and 403 responses.
    ///
    /// Fallback lookups stop at these instead of trying the next path.
    #[must_use]
    pub const fn is_auth_failure(&self) -> bool {
        matches!(self.status(), Some(401 | 403))
    }

    /// Returns `true` if this error has one of the given status codes.
    #[must_use]
    pub fn has_status(&self, codes: &[u16]) -> bool {
        self.status().is_some_and(|s| codes.contains(&s))
    }

    /// Returns `true` if retrying the same call later may succeed.
    #[must_use]
    pub fn is_transient(&self) -> bool {
        match self {
            Self::Timeout { .. } => true,
            Self::Transport(e) => e.is_connect() || e.is_timeout(),
            Self::Http { status, .. } => *status >= 500,
            _ => false,
        }
    }

    /// Returns the message to show a user: the server detail when present,
    /// otherwise `fallback`.
    #[must_use]
    pub fn user_message<'a>(&'a self, fallback: &'a str) -> &'a str {
        self.detail().unwrap_or(fallback)
    }
}
