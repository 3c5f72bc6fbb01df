//! Shared HTTP client with bearer auth and single-flight token refresh.
//!
//! Every feature module funnels its calls through [`ApiClient::execute`]:
//!
//! 1. Allow-listed auth endpoints go out without `Authorization`; every
//!    other request carries `Bearer <access>` when a token is stored.
//! 2. A 401 on a protected request triggers one refresh (shared by all
//!    concurrent callers through [`RefreshGate`]) and a single replay.
//! 3. A failed refresh clears stored auth and the original 401 is returned.

use std::sync::Arc;

use reqwest::multipart::{Form, Part};
use reqwest::{Method, Response, StatusCode};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tracing::{debug, info, instrument, warn};

use campus_session::TokenStore;

use crate::config::ClientConfig;
use crate::error::{ClientError, Result};
use crate::refresh::{RefreshGate, RefreshOutcome};

/// Token refresh endpoint.
pub const REFRESH_PATH: &str = "/api/token/refresh/";

/// Endpoints that must never carry an `Authorization` header.
///
/// Matched as prefixes of the normalized request path.
pub const NO_AUTH_PATHS: [&str; 6] = [
    "/api/auth/login/",
    "/api/auth/password/reset/",
    "/api/auth/password/reset/confirm/",
    "/api/auth/registration/",
    "/api/auth/google/token-login/",
    REFRESH_PATH,
];

/// Reduces a request URL to the path used for allow-list matching.
///
/// Absolute URLs keep only their path; relative ones drop the query string.
#[must_use]
pub fn normalize_path(url: &str) -> String {
    if url.starts_with("http://") || url.starts_with("https://") {
        if let Ok(parsed) = reqwest::Url::parse(url) {
            return parsed.path().to_string();
        }
    }
    url.split_once('?').map_or(url, |(path, _)| path).to_string()
}

/// Returns `true` if the request must go out without credentials.
#[must_use]
pub fn is_no_auth_path(url: &str) -> bool {
    let path = normalize_path(url);
    NO_AUTH_PATHS.iter().any(|prefix| path.starts_with(prefix))
}

/// Resolves a media reference returned by the backend to an absolute URL.
///
/// Absolute `http(s)` URLs are returned unchanged; anything else is joined
/// to `base` with exactly one slash.
#[must_use]
pub fn absolute_media_url(base: &str, reference: &str) -> String {
    if reference.starts_with("http://") || reference.starts_with("https://") {
        return reference.to_string();
    }
    format!(
        "{}/{}",
        base.trim_end_matches('/'),
        reference.trim_start_matches('/')
    )
}

/// A list response: either a bare array or a paginated `{results: [...]}`.
#[derive(Debug, Clone)]
pub enum ListPayload<T> {
    /// Bare JSON array.
    Items(Vec<T>),
    /// Paginated page.
    Page {
        /// Items of this page.
        results: Vec<T>,
    },
}

impl<'de, T: DeserializeOwned> Deserialize<'de> for ListPayload<T> {
    fn deserialize<D>(deserializer: D) -> std::result::Result<Self, D::Error>
    where
        D: serde::Deserializer<'de>,
    {
        use serde::de::Error;

        // Decode the envelope first so item errors keep their own message.
        match Value::deserialize(deserializer)? {
            Value::Array(items) => serde_json::from_value(Value::Array(items))
                .map(Self::Items)
                .map_err(D::Error::custom),
            Value::Object(mut page) => match page.remove("results") {
                Some(results) => serde_json::from_value(results)
                    .map(|results| Self::Page { results })
                    .map_err(|e| D::Error::custom(format!("results: {e}"))),
                None => Err(D::Error::custom(
                    "expected a list or a page with a `results` field",
                )),
            },
            other => Err(D::Error::custom(format!(
                "expected a list or a paginated page, got {other}"
            ))),
        }
    }
}

impl<T> ListPayload<T> {
    /// Returns the items regardless of the envelope.
    #[must_use]
    pub fn into_vec(self) -> Vec<T> {
        match self {
            Self::Items(items) | Self::Page { results: items } => items,
        }
    }
}

/// One field of a multipart form.
///
/// Parts are plain data so a request can be rebuilt for its replay after a
/// token refresh.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FormPart {
    /// A text field.
    Text {
        /// Field name.
        name: String,
        /// Field value.
        value: String,
    },
    /// A file upload.
    File {
        /// Field name.
        name: String,
        /// File name reported to the server.
        file_name: String,
        /// MIME type, if known.
        content_type: Option<String>,
        /// File contents.
        bytes: Vec<u8>,
    },
}

impl FormPart {
    /// Creates a text field.
    #[must_use]
    pub fn text(name: impl Into<String>, value: impl Into<String>) -> Self {
        Self::Text {
            name: name.into(),
            value: value.into(),
        }
    }

    /// Creates a file field with no explicit content type.
    #[must_use]
    pub fn file(name: impl Into<String>, file: &UploadFile) -> Self {
        Self::File {
            name: name.into(),
            file_name: file.file_name.clone(),
            content_type: file.content_type.clone(),
            bytes: file.bytes.clone(),
        }
    }
}

/// A file to upload.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UploadFile {
    /// File name reported to the server.
    pub file_name: String,
    /// MIME type, if known.
    pub content_type: Option<String>,
    /// File contents.
    pub bytes: Vec<u8>,
}

impl UploadFile {
    /// Creates an upload from in-memory bytes.
    #[must_use]
    pub fn new(file_name: impl Into<String>, bytes: Vec<u8>) -> Self {
        Self {
            file_name: file_name.into(),
            content_type: None,
            bytes,
        }
    }

    /// Sets the MIME type.
    #[must_use]
    pub fn with_content_type(mut self, content_type: impl Into<String>) -> Self {
        self.content_type = Some(content_type.into());
        self
    }

    /// Reads a file from disk, using its file name.
    ///
    /// # Errors
    ///
    /// Returns a validation error if the file cannot be read.
    pub async fn from_path(path: impl AsRef<std::path::Path>) -> Result<Self> {
        let path = path.as_ref();
        let bytes = tokio::fs::read(path).await.map_err(|e| {
            crate::validate::ValidationError::new("file", format!("{}: {e}", path.display()))
        })?;
        let file_name = path
            .file_name()
            .map_or_else(|| "upload".to_string(), |n| n.to_string_lossy().into_owned());
        Ok(Self::new(file_name, bytes))
    }
}

/// Request body.
#[derive(Debug, Clone, Default, PartialEq)]
pub enum Body {
    /// No body.
    #[default]
    Empty,
    /// JSON body.
    Json(Value),
    /// `multipart/form-data` body.
    Multipart(Vec<FormPart>),
}

/// A replayable API request.
#[derive(Debug, Clone)]
pub struct ApiRequest {
    method: Method,
    path: String,
    query: Vec<(String, String)>,
    body: Body,
}

impl ApiRequest {
    /// Creates a request with no query and no body.
    #[must_use]
    pub fn new(method: Method, path: impl Into<String>) -> Self {
        Self {
            method,
            path: path.into(),
            query: Vec::new(),
            body: Body::Empty,
        }
    }

    /// Creates a `GET` request.
    #[must_use]
    pub fn get(path: impl Into<String>) -> Self {
        Self::new(Method::GET, path)
    }

    /// Creates a `POST` request.
    #[must_use]
    pub fn post(path: impl Into<String>) -> Self {
        Self::new(Method::POST, path)
    }

    /// Creates a `PUT` request.
    #[must_use]
    pub fn put(path: impl Into<String>) -> Self {
        Self::new(Method::PUT, path)
    }

    /// Creates a `PATCH` request.
    #[must_use]
    pub fn patch(path: impl Into<String>) -> Self {
        Self::new(Method::PATCH, path)
    }

    /// Creates a `DELETE` request.
    #[must_use]
    pub fn delete(path: impl Into<String>) -> Self {
        Self::new(Method::DELETE, path)
    }

    /// Appends a query parameter.
    #[must_use]
    pub fn with_query(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.query.push((key.into(), value.into()));
        self
    }

    /// Sets a JSON body.
    ///
    /// # Errors
    ///
    /// Returns an error if `body` cannot be serialized.
    pub fn with_json<B: Serialize + ?Sized>(mut self, body: &B) -> Result<Self> {
        self.body = Body::Json(serde_json::to_value(body)?);
        Ok(self)
    }

    /// Sets a multipart body.
    #[must_use]
    pub fn with_form(mut self, parts: Vec<FormPart>) -> Self {
        self.body = Body::Multipart(parts);
        self
    }

    /// Returns the request method.
    #[must_use]
    pub const fn method(&self) -> &Method {
        &self.method
    }

    /// Returns the request path as given.
    #[must_use]
    pub fn path(&self) -> &str {
        &self.path
    }

    /// Returns the query parameters.
    #[must_use]
    pub fn query(&self) -> &[(String, String)] {
        &self.query
    }

    /// Returns the body.
    #[must_use]
    pub const fn body(&self) -> &Body {
        &self.body
    }
}

fn build_form(parts: &[FormPart]) -> Result<Form> {
    let mut form = Form::new();
    for part in parts {
        form = match part {
            FormPart::Text { name, value } => form.text(name.clone(), value.clone()),
            FormPart::File {
                name,
                file_name,
                content_type,
                bytes,
            } => {
                let mut file = Part::bytes(bytes.clone()).file_name(file_name.clone());
                if let Some(content_type) = content_type {
                    file = file.mime_str(content_type)?;
                }
                form.part(name.clone(), file)
            }
        };
    }
    Ok(form)
}

#[derive(Debug, Deserialize)]
struct RefreshResponse {
    #[serde(default)]
    access: Option<String>,
}

#[derive(Debug)]
struct Inner {
    http: reqwest::Client,
    base: String,
    tokens: TokenStore,
    gate: RefreshGate,
    config: ClientConfig,
}

/// The shared API client.
///
/// Cloning is cheap; clones share the HTTP connection pool, the token store
/// and the refresh gate.
#[derive(Debug, Clone)]
pub struct ApiClient {
    inner: Arc<Inner>,
}

impl ApiClient {
    /// Creates a client for the configured backend.
    ///
    /// # Errors
    ///
    /// Returns an error if the configuration is invalid or the HTTP client
    /// cannot be built.
    pub fn new(config: ClientConfig, tokens: TokenStore) -> Result<Self> {
        config.validate()?;
        let http = reqwest::Client::builder()
            .timeout(config.request_timeout())
            .build()?;
        let base = config.api_base.trim().trim_end_matches('/').to_string();
        info!(api_base = %base, "API client ready");
        Ok(Self {
            inner: Arc::new(Inner {
                http,
                base,
                tokens,
                gate: RefreshGate::new(),
                config,
            }),
        })
    }

    /// Returns the token store.
    #[must_use]
    pub fn tokens(&self) -> &TokenStore {
        &self.inner.tokens
    }

    /// Returns the configuration.
    #[must_use]
    pub fn config(&self) -> &ClientConfig {
        &self.inner.config
    }

    /// Returns the API base URL without a trailing slash.
    #[must_use]
    pub fn api_base(&self) -> &str {
        &self.inner.base
    }

    /// Returns `true` while a token refresh is in flight.
    #[must_use]
    pub fn is_refreshing(&self) -> bool {
        self.inner.gate.is_refreshing()
    }

    /// Resolves a media reference against the API base.
    #[must_use]
    pub fn media_url(&self, reference: &str) -> String {
        absolute_media_url(&self.inner.base, reference)
    }

    fn url(&self, path: &str) -> String {
        if path.starts_with("http://") || path.starts_with("https://") {
            path.to_string()
        } else if path.starts_with('/') {
            format!("{}{path}", self.inner.base)
        } else {
            format!("{}/{path}", self.inner.base)
        }
    }

    /// Sends `request` through the auth pipeline and returns the successful
    /// response.
    ///
    /// # Errors
    ///
    /// Returns `ClientError::Http` for non-success statuses (after at most
    /// one refresh-and-replay on 401), `Timeout` or `Transport` for network
    /// failures.
    #[instrument(skip(self, request), fields(method = %request.method, path = %normalize_path(&request.path)))]
    pub async fn execute(&self, request: &ApiRequest) -> Result<Response> {
        let path = normalize_path(&request.path);
        let public = is_no_auth_path(&path);
        let token = if public {
            None
        } else {
            self.inner.tokens.bearer()
        };

        let response = self.dispatch(request, &path, token.as_deref()).await?;
        if response.status() != StatusCode::UNAUTHORIZED || public {
            return self.check(request, &path, response).await;
        }

        let original = self.error_from(request, &path, response).await;
        let Some(replay_token) = self.recover(token.as_deref()).await else {
            return Err(original);
        };

        debug!("Replaying request with renewed token");
        let response = self.dispatch(request, &path, Some(&replay_token)).await?;
        self.check(request, &path, response).await
    }

    /// Obtains a token to replay with after a 401, or `None` to give up.
    async fn recover(&self, used: Option<&str>) -> Option<String> {
        let Some(refresh) = self.inner.tokens.refresh_token() else {
            debug!("No refresh token stored; not retrying");
            return None;
        };

        // Someone else already replaced the token we were rejected with
        if let Some(current) = self.inner.tokens.bearer() {
            if used != Some(current.as_str()) {
                debug!("Access token changed since request; replaying without refresh");
                return Some(current);
            }
        }

        match self
            .inner
            .gate
            .run(|| self.refresh_access(refresh))
            .await
        {
            RefreshOutcome::Renewed(token) => Some(token),
            RefreshOutcome::Failed | RefreshOutcome::Abandoned => None,
        }
    }

    /// Performs the refresh call. Only ever run by the gate's leader.
    async fn refresh_access(&self, refresh: String) -> RefreshOutcome {
        let result = self
            .inner
            .http
            .post(self.url(REFRESH_PATH))
            .timeout(self.inner.config.refresh_timeout())
            .json(&serde_json::json!({ "refresh": refresh }))
            .send()
            .await;

        let access = match result {
            Ok(response) if response.status().is_success() => response
                .json::<RefreshResponse>()
                .await
                .ok()
                .and_then(|body| body.access)
                .filter(|token| !token.is_empty()),
            Ok(response) => {
                warn!(status = response.status().as_u16(), "Token refresh rejected");
                None
            }
            Err(e) => {
                warn!(error = %e, "Token refresh request failed");
                None
            }
        };

        if let Some(token) = access {
            if let Err(e) = self.inner.tokens.set_access(&token) {
                warn!(error = %e, "Failed to store renewed access token");
            }
            info!("Access token refreshed");
            RefreshOutcome::Renewed(token)
        } else {
            if let Err(e) = self.inner.tokens.clear_auth() {
                warn!(error = %e, "Failed to clear stored auth");
            }
            warn!("Token refresh failed; signed out");
            RefreshOutcome::Failed
        }
    }

    async fn dispatch(
        &self,
        request: &ApiRequest,
        path: &str,
        token: Option<&str>,
    ) -> Result<Response> {
        let mut builder = self
            .inner
            .http
            .request(request.method.clone(), self.url(&request.path));
        if !request.query.is_empty() {
            builder = builder.query(&request.query);
        }
        if let Some(token) = token {
            builder = builder.bearer_auth(token);
        }
        builder = match &request.body {
            Body::Empty => builder,
            Body::Json(value) => builder.json(value),
            Body::Multipart(parts) => builder.multipart(build_form(parts)?),
        };

        debug!(authenticated = token.is_some(), "Sending request");
        let response = builder.send().await.map_err(|e| {
            if e.is_timeout() {
                ClientError::Timeout {
                    path: path.to_string(),
                }
            } else {
                ClientError::Transport(e)
            }
        })?;
        debug!(status = response.status().as_u16(), "Received response");
        Ok(response)
    }

    async fn check(&self, request: &ApiRequest, path: &str, response: Response) -> Result<Response> {
        if response.status().is_success() {
            Ok(response)
        } else {
            Err(self.error_from(request, path, response).await)
        }
    }

    async fn error_from(&self, request: &ApiRequest, path: &str, response: Response) -> ClientError {
        let status = response.status().as_u16();
        let body = match response.bytes().await {
            Ok(bytes) if bytes.is_empty() => None,
            Ok(bytes) => Some(serde_json::from_slice(&bytes).unwrap_or_else(|_| {
                Value::String(String::from_utf8_lossy(&bytes).trim().to_string())
            })),
            Err(e) => {
                debug!(error = %e, "Failed to read error body");
                None
            }
        };
        let error = ClientError::http(request.method.as_str(), path, status, body);
        debug!(status, detail = ?error.detail(), "Request failed");
        error
    }

    /// Sends `request` and decodes the JSON response.
    ///
    /// An empty body decodes as JSON `null`.
    ///
    /// # Errors
    ///
    /// Returns any pipeline error, or `ClientError::Json` if the body does
    /// not match `T`.
    pub async fn fetch<T: DeserializeOwned>(&self, request: ApiRequest) -> Result<T> {
        let response = self.execute(&request).await?;
        let bytes = response.bytes().await?;
        if bytes.iter().all(u8::is_ascii_whitespace) {
            return Ok(serde_json::from_value(Value::Null)?);
        }
        Ok(serde_json::from_slice(&bytes)?)
    }

    /// Sends `request` and discards the response body.
    ///
    /// # Errors
    ///
    /// Returns any pipeline error.
    pub async fn send(&self, request: ApiRequest) -> Result<()> {
        self.execute(&request).await?;
        Ok(())
    }

    /// `GET path` decoded as `T`.
    ///
    /// # Errors
    ///
    /// See [`fetch`](Self::fetch).
    pub async fn get<T: DeserializeOwned>(&self, path: &str) -> Result<T> {
        self.fetch(ApiRequest::get(path)).await
    }

    /// `POST path` with a JSON body, decoded as `T`.
    ///
    /// # Errors
    ///
    /// See [`fetch`](Self::fetch).
    pub async fn post<T, B>(&self, path: &str, body: &B) -> Result<T>
    where
        T: DeserializeOwned,
        B: Serialize + ?Sized,
    {
        self.fetch(ApiRequest::post(path).with_json(body)?).await
    }

    /// `PUT path` with a JSON body, decoded as `T`.
    ///
    /// # Errors
    ///
    /// See [`fetch`](Self::fetch).
    pub async fn put<T, B>(&self, path: &str, body: &B) -> Result<T>
    where
        T: DeserializeOwned,
        B: Serialize + ?Sized,
    {
        self.fetch(ApiRequest::put(path).with_json(body)?).await
    }

    /// `PATCH path` with a JSON body, decoded as `T`.
    ///
    /// # Errors
    ///
    /// See [`fetch`](Self::fetch).
    pub async fn patch<T, B>(&self, path: &str, body: &B) -> Result<T>
    where
        T: DeserializeOwned,
        B: Serialize + ?Sized,
    {
        self.fetch(ApiRequest::patch(path).with_json(body)?).await
    }

    /// `DELETE path`.
    ///
    /// # Errors
    ///
    /// See [`send`](Self::send).
    pub async fn delete(&self, path: &str) -> Result<()> {
        self.send(ApiRequest::delete(path)).await
    }

    /// Tries each path with `GET` until one succeeds.
    ///
    /// Stops at the first 401/403. When every path fails the last error is
    /// returned.
    ///
    /// # Errors
    ///
    /// Returns the stopping auth error, the last failure, or
    /// `ClientError::NoRouteMatched` when `paths` is empty.
    pub async fn get_with_fallback<T, P>(&self, paths: &[P]) -> Result<T>
    where
        T: DeserializeOwned,
        P: AsRef<str>,
    {
        let mut last = None;
        for path in paths {
            match self.get(path.as_ref()).await {
                Ok(value) => return Ok(value),
                Err(e) if e.is_auth_failure() => return Err(e),
                Err(e) => {
                    debug!(path = path.as_ref(), error = %e, "Fallback candidate failed");
                    last = Some(e);
                }
            }
        }
        Err(last.unwrap_or_else(|| ClientError::NoRouteMatched {
            paths: paths.iter().map(|p| p.as_ref().to_string()).collect(),
        }))
    }
}
