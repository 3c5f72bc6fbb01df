//! Auth-key conventions layered over the two storage scopes.

use std::path::Path;
use std::sync::Arc;

use chrono::{DateTime, TimeZone, Utc};
use serde::{de::DeserializeOwned, Serialize};
use tracing::{debug, warn};

use crate::{AuthKey, FileStore, KeyValueStore, MemoryStore, SessionError};

/// File name of the local-scope store inside a session directory.
pub const LOCAL_FILE_NAME: &str = "local.json";

/// Tokens returned by a successful login.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LoginTokens {
    /// Access token sent as `Bearer`.
    pub access: String,
    /// Refresh token, when the backend issues one.
    pub refresh: Option<String>,
}

/// Which of the two scopes a lookup reads from.
#[derive(Debug, Clone, Copy)]
enum Scope {
    Session,
    Local,
}

/// Token storage shared by the API client and its callers.
///
/// Cloning is cheap; clones share the same underlying stores.
#[derive(Debug, Clone)]
pub struct TokenStore {
    session: Arc<dyn KeyValueStore>,
    local: Arc<dyn KeyValueStore>,
}

impl TokenStore {
    /// Creates a token store over explicit session and local stores.
    #[must_use]
    pub fn new(session: Arc<dyn KeyValueStore>, local: Arc<dyn KeyValueStore>) -> Self {
        Self { session, local }
    }

    /// Creates a token store where both scopes live in memory.
    #[must_use]
    pub fn in_memory() -> Self {
        Self::new(Arc::new(MemoryStore::new()), Arc::new(MemoryStore::new()))
    }

    /// Creates a token store whose local scope is persisted in `dir`.
    ///
    /// # Errors
    ///
    /// Returns an error if an existing local file cannot be read or parsed.
    pub fn persistent(dir: impl AsRef<Path>) -> Result<Self, SessionError> {
        let local = FileStore::open(dir.as_ref().join(LOCAL_FILE_NAME))?;
        Ok(Self::new(Arc::new(MemoryStore::new()), Arc::new(local)))
    }

    fn scope(&self, scope: Scope) -> &dyn KeyValueStore {
        match scope {
            Scope::Session => self.session.as_ref(),
            Scope::Local => self.local.as_ref(),
        }
    }

    fn first_of(&self, lookups: &[(Scope, AuthKey)]) -> Option<String> {
        lookups
            .iter()
            .find_map(|(scope, key)| {
                self.scope(*scope)
                    .get(key.as_str())
                    .filter(|v| !v.is_empty())
            })
    }

    fn remove_everywhere(&self, keys: &[AuthKey]) -> Result<(), SessionError> {
        for key in keys {
            self.local.remove(key.as_str())?;
            self.session.remove(key.as_str())?;
        }
        Ok(())
    }

    /// Returns the access token to send as `Bearer`.
    ///
    /// Any legacy `key` entry is purged first so it can never be mistaken
    /// for a JWT. Lookup order: session `access`, local `access`, session
    /// `access_token`, local `access_token`.
    pub fn bearer(&self) -> Option<String> {
        if let Err(e) = self.remove_everywhere(&[AuthKey::Key]) {
            warn!(error = %e, "Failed to purge legacy token key");
        }
        self.first_of(&[
            (Scope::Session, AuthKey::Access),
            (Scope::Local, AuthKey::Access),
            (Scope::Session, AuthKey::AccessToken),
            (Scope::Local, AuthKey::AccessToken),
        ])
    }

    /// Returns any stored credential, including a legacy `key` token.
    ///
    /// Unlike [`bearer`](Self::bearer) this never mutates storage.
    pub fn any_access(&self) -> Option<String> {
        self.first_of(&[
            (Scope::Session, AuthKey::Access),
            (Scope::Local, AuthKey::Access),
            (Scope::Session, AuthKey::AccessToken),
            (Scope::Local, AuthKey::AccessToken),
            (Scope::Local, AuthKey::Key),
            (Scope::Session, AuthKey::Key),
        ])
    }

    /// Returns the refresh token: session first, then local.
    pub fn refresh_token(&self) -> Option<String> {
        self.first_of(&[(Scope::Session, AuthKey::Refresh), (Scope::Local, AuthKey::Refresh)])
    }

    /// Stores a renewed access token in both scopes.
    pub fn set_access(&self, token: &str) -> Result<(), SessionError> {
        self.session.set(AuthKey::Access.as_str(), token)?;
        self.local.set(AuthKey::Access.as_str(), token)?;
        debug!("Stored renewed access token");
        Ok(())
    }

    /// Stores the tokens of a fresh login in the local scope.
    pub fn store_login(&self, tokens: &LoginTokens) -> Result<(), SessionError> {
        self.local.set(AuthKey::Access.as_str(), &tokens.access)?;
        if let Some(refresh) = &tokens.refresh {
            self.local.set(AuthKey::Refresh.as_str(), refresh)?;
        }
        Ok(())
    }

    /// Removes every token (but not the cached user) from both scopes.
    pub fn clear_tokens(&self) -> Result<(), SessionError> {
        self.remove_everywhere(&[
            AuthKey::Access,
            AuthKey::Refresh,
            AuthKey::AccessToken,
            AuthKey::RefreshToken,
            AuthKey::Key,
        ])
    }

    /// Removes every auth key, including the cached user, from both scopes.
    pub fn clear_auth(&self) -> Result<(), SessionError> {
        self.remove_everywhere(&AuthKey::AUTH_KEYS)?;
        debug!("Cleared stored auth");
        Ok(())
    }

    /// Removes only the given keys from the local scope.
    pub fn remove_local(&self, keys: &[AuthKey]) -> Result<(), SessionError> {
        for key in keys {
            self.local.remove(key.as_str())?;
        }
        Ok(())
    }

    /// Returns the cached signed-in user, if present and parseable.
    pub fn cached_me<T: DeserializeOwned>(&self) -> Option<T> {
        let raw = self.local.get(AuthKey::Me.as_str())?;
        serde_json::from_str(&raw).ok()
    }

    /// Caches the signed-in user as JSON in the local scope.
    pub fn cache_me<T: Serialize>(&self, me: &T) -> Result<(), SessionError> {
        let json = serde_json::to_string(me)?;
        self.local.set(AuthKey::Me.as_str(), &json)
    }

    /// Records a logout so that other clients sharing the local scope can
    /// notice it.
    pub fn broadcast_logout(&self, at: DateTime<Utc>) -> Result<(), SessionError> {
        self.local.set(
            AuthKey::LogoutBroadcast.as_str(),
            &at.timestamp_millis().to_string(),
        )
    }

    /// Returns the time of the last logout broadcast, if any.
    pub fn last_logout_broadcast(&self) -> Option<DateTime<Utc>> {
        let raw = self.local.get(AuthKey::LogoutBroadcast.as_str())?;
        let millis = raw.trim().parse::<i64>().ok()?;
        Utc.timestamp_millis_opt(millis).single()
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    fn stores() -> (Arc<MemoryStore>, Arc<MemoryStore>, TokenStore) {
        let session = Arc::new(MemoryStore::new());
        let local = Arc::new(MemoryStore::new());
        let tokens = TokenStore::new(session.clone(), local.clone());
        (session, local, tokens)
    }

    #[test]
    fn bearer_prefers_session_then_local_then_alternate_key() {
        let (session, local, tokens) = stores();
        assert_eq!(tokens.bearer(), None);

        local.set("access_token", "local-alt").unwrap();
        assert_eq!(tokens.bearer().as_deref(), Some("local-alt"));

        session.set("access_token", "session-alt").unwrap();
        assert_eq!(tokens.bearer().as_deref(), Some("session-alt"));

        local.set("access", "local-access").unwrap();
        assert_eq!(tokens.bearer().as_deref(), Some("local-access"));

        session.set("access", "session-access").unwrap();
        assert_eq!(tokens.bearer().as_deref(), Some("session-access"));
    }

    #[test]
    fn bearer_purges_legacy_key() {
        let (session, local, tokens) = stores();
        local.set("key", "drf-token").unwrap();
        session.set("key", "drf-token").unwrap();

        assert_eq!(tokens.bearer(), None);
        assert_eq!(local.get("key"), None);
        assert_eq!(session.get("key"), None);
    }

    #[test]
    fn any_access_falls_back_to_legacy_key_without_purging() {
        let (_session, local, tokens) = stores();
        local.set("key", "drf-token").unwrap();

        assert_eq!(tokens.any_access().as_deref(), Some("drf-token"));
        assert_eq!(local.get("key").as_deref(), Some("drf-token"));
    }

    #[test]
    fn empty_values_count_as_missing() {
        let (session, local, tokens) = stores();
        local.set("access", "").unwrap();
        assert_eq!(tokens.bearer(), None);

        session.set("access", "").unwrap();
        local.set("access", "good").unwrap();
        assert_eq!(tokens.bearer().as_deref(), Some("good"));

        session.set("refresh", "").unwrap();
        local.set("refresh", "local-refresh").unwrap();
        assert_eq!(tokens.refresh_token().as_deref(), Some("local-refresh"));
    }

    #[test]
    fn refresh_token_prefers_session() {
        let (session, local, tokens) = stores();
        local.set("refresh", "local-refresh").unwrap();
        assert_eq!(tokens.refresh_token().as_deref(), Some("local-refresh"));

        session.set("refresh", "session-refresh").unwrap();
        assert_eq!(tokens.refresh_token().as_deref(), Some("session-refresh"));
    }

    #[test]
    fn set_access_writes_both_scopes() {
        let (session, local, tokens) = stores();
        tokens.set_access("renewed").unwrap();
        assert_eq!(session.get("access").as_deref(), Some("renewed"));
        assert_eq!(local.get("access").as_deref(), Some("renewed"));
    }

    #[test]
    fn store_login_writes_local_only() {
        let (session, local, tokens) = stores();
        tokens
            .store_login(&LoginTokens {
                access: "a".to_string(),
                refresh: Some("r".to_string()),
            })
            .unwrap();

        assert_eq!(local.get("access").as_deref(), Some("a"));
        assert_eq!(local.get("refresh").as_deref(), Some("r"));
        assert!(session.is_empty());
    }

    #[test]
    fn clear_tokens_keeps_cached_user() {
        let (session, local, tokens) = stores();
        local.set("access", "a").unwrap();
        session.set("refresh_token", "r").unwrap();
        tokens.cache_me(&serde_json::json!({"id": "u1"})).unwrap();

        tokens.clear_tokens().unwrap();

        assert_eq!(local.get("access"), None);
        assert_eq!(session.get("refresh_token"), None);
        assert!(local.get("me").is_some());
    }

    #[test]
    fn clear_auth_removes_every_auth_key() {
        let (session, local, tokens) = stores();
        for key in AuthKey::AUTH_KEYS {
            local.set(key.as_str(), "x").unwrap();
            session.set(key.as_str(), "x").unwrap();
        }
        local.set("unrelated", "keep").unwrap();

        tokens.clear_auth().unwrap();

        for key in AuthKey::AUTH_KEYS {
            assert_eq!(local.get(key.as_str()), None, "local {key} not cleared");
            assert_eq!(session.get(key.as_str()), None, "session {key} not cleared");
        }
        assert_eq!(local.get("unrelated").as_deref(), Some("keep"));
    }

    #[test]
    fn cached_me_roundtrip_and_garbage() {
        let (_session, local, tokens) = stores();
        assert_eq!(tokens.cached_me::<serde_json::Value>(), None);

        tokens
            .cache_me(&serde_json::json!({"id": "u1", "email": "a@b.co"}))
            .unwrap();
        let me: serde_json::Value = tokens.cached_me().unwrap();
        assert_eq!(me["email"], "a@b.co");

        local.set("me", "{not json").unwrap();
        assert_eq!(tokens.cached_me::<serde_json::Value>(), None);
    }

    #[test]
    fn logout_broadcast_records_millis() {
        let (_session, local, tokens) = stores();
        let at = Utc.timestamp_millis_opt(1_760_000_000_123).single().unwrap();

        tokens.broadcast_logout(at).unwrap();

        assert_eq!(local.get("logout-broadcast").as_deref(), Some("1760000000123"));
        assert_eq!(tokens.last_logout_broadcast(), Some(at));
    }

    #[test]
    fn persistent_store_survives_reopen() {
        let dir = std::env::temp_dir().join(format!("campus-tokens-{}", std::process::id()));
        std::fs::remove_dir_all(&dir).ok();

        let tokens = TokenStore::persistent(&dir).unwrap();
        tokens
            .store_login(&LoginTokens {
                access: "a".to_string(),
                refresh: None,
            })
            .unwrap();
        tokens.set_access("b").unwrap();
        drop(tokens);

        let reopened = TokenStore::persistent(&dir).unwrap();
        // Session scope is gone, local scope kept the renewed token
        assert_eq!(reopened.bearer().as_deref(), Some("b"));
        assert_eq!(reopened.refresh_token(), None);

        std::fs::remove_dir_all(&dir).ok();
    }
}
