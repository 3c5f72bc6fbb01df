//! Campus Session Storage
//!
//! Token storage for the Campus LMS client.
//!
//! The backend hands out a short-lived access token and a longer-lived
//! refresh token. They are kept in two scopes that mirror what a browser
//! offers: a [`MemoryStore`] that lives as long as the process (session
//! scope) and a [`FileStore`] persisted to disk (local scope). The
//! [`TokenStore`] applies the key conventions on top of both.

use std::path::PathBuf;

use thiserror::Error;

mod store;
mod tokens;

pub use store::{FileStore, MemoryStore};
pub use tokens::{LoginTokens, TokenStore, LOCAL_FILE_NAME};

/// Errors that can occur while reading or writing stored tokens.
#[derive(Debug, Error)]
pub enum SessionError {
    /// Reading or writing the backing file failed.
    #[error("session storage I/O error on '{path}': {source}")]
    Io {
        /// Path of the backing file.
        path: PathBuf,
        /// Underlying I/O error.
        #[source]
        source: std::io::Error,
    },

    /// The backing file exists but is not a JSON object of strings.
    #[error("corrupted session file '{path}': {message}\n\nSuggestion: Delete the file and log in again")]
    Corrupted {
        /// Path of the backing file.
        path: PathBuf,
        /// Description of the parse failure.
        message: String,
    },

    /// A cached value could not be encoded as JSON.
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

impl SessionError {
    /// Creates a new `Io` error for the given path.
    #[must_use]
    pub fn io(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        Self::Io {
            path: path.into(),
            source,
        }
    }

    /// Creates a new `Corrupted` error for the given path.
    #[must_use]
    pub fn corrupted(path: impl Into<PathBuf>, message: impl Into<String>) -> Self {
        Self::Corrupted {
            path: path.into(),
            message: message.into(),
        }
    }
}

/// Storage keys used by the client.
///
/// The string forms are shared with the web frontend so that both read the
/// same entries.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum AuthKey {
    /// JWT access token.
    Access,
    /// JWT refresh token.
    Refresh,
    /// Access token under its alternate spelling.
    AccessToken,
    /// Refresh token under its alternate spelling.
    RefreshToken,
    /// Legacy DRF token from the old session mode.
    Key,
    /// Cached JSON of the signed-in user.
    Me,
    /// Timestamp written on logout so other clients can notice it.
    LogoutBroadcast,
}

impl AuthKey {
    /// Every key that holds credentials or user data. Cleared on logout.
    pub const AUTH_KEYS: [Self; 6] = [
        Self::Access,
        Self::Refresh,
        Self::AccessToken,
        Self::RefreshToken,
        Self::Key,
        Self::Me,
    ];

    /// Returns the storage key string.
    #[must_use]
    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::Access => "access",
            Self::Refresh => "refresh",
            Self::AccessToken => "access_token",
            Self::RefreshToken => "refresh_token",
            Self::Key => "key",
            Self::Me => "me",
            Self::LogoutBroadcast => "logout-broadcast",
        }
    }
}

impl std::fmt::Display for AuthKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A string key/value store with browser-storage semantics.
///
/// Reads never fail; a missing or unreadable entry is simply absent.
pub trait KeyValueStore: std::fmt::Debug + Send + Sync {
    /// Returns the value stored under `key`, if any.
    fn get(&self, key: &str) -> Option<String>;

    /// Stores `value` under `key`, replacing any previous value.
    fn set(&self, key: &str, value: &str) -> Result<(), SessionError>;

    /// Removes `key`. Removing a missing key is not an error.
    fn remove(&self, key: &str) -> Result<(), SessionError>;
}
