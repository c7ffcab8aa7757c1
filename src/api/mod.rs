//! Web API caller and snapshot bootstrap.
//!
//! [`ApiClient`] invokes one API method over HTTP and unwraps the standard
//! `{"ok": bool, "error": code, ...}` envelope. [`SnapshotFetcher`] is the
//! seam the client uses to obtain the bootstrap snapshot:
//! [`HttpSnapshotFetcher`] calls `rtm.start`, [`StaticSnapshot`] replays a
//! fixed body.

use std::fmt;

use futures_util::future::BoxFuture;
use serde_json::Value;

use crate::config::ClientConfig;
use crate::domain::Snapshot;
use crate::error::RtmError;

/// API method that returns the bootstrap snapshot.
pub const RTM_START: &str = "rtm.start";

/// Errors raised while calling the Web API.
#[derive(Debug, thiserror::Error)]
pub enum ApiError {
    /// The request could not be sent or the response body not read.
    #[error("http error: {0}")]
    Http(#[from] reqwest::Error),

    /// The method URL could not be built.
    #[error("invalid api url: {0}")]
    InvalidUrl(String),

    /// The server answered with `ok: false`.
    #[error("{message}")]
    Rejected {
        /// Machine-readable error code, e.g. `"invalid_auth"`.
        code: String,
        /// The code in readable form, e.g. `"Invalid auth"`.
        message: String,
    },

    /// The response body is not a JSON object.
    #[error("malformed api response: {0}")]
    Decode(String),
}

/// Calls Web API methods with a bearer token.
#[derive(Clone)]
pub struct ApiClient {
    http: reqwest::Client,
    base_url: String,
    token: String,
}

impl ApiClient {
    /// Creates a caller from the client configuration.
    ///
    /// # Errors
    ///
    /// Returns [`ApiError::Http`] if the HTTP client cannot be initialized.
    pub fn new(config: &ClientConfig) -> Result<Self, ApiError> {
        let http = reqwest::Client::builder().build()?;
        Ok(Self {
            http,
            base_url: config.api_base_url.clone(),
            token: config.token.clone(),
        })
    }

    /// Base URL method names are appended to.
    #[must_use]
    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    /// Invokes `method` with the given arguments and returns the full
    /// response body once the envelope reports success.
    ///
    /// # Errors
    ///
    /// - [`ApiError::InvalidUrl`] if the method URL cannot be built
    /// - [`ApiError::Http`] on network or HTTP status failure
    /// - [`ApiError::Rejected`] when the body carries `ok: false`
    /// - [`ApiError::Decode`] when the body is not a JSON object
    pub async fn call(&self, method: &str, args: &[(&str, &str)]) -> Result<Value, ApiError> {
        let url = format!("{}{method}", self.base_url);
        let url = reqwest::Url::parse_with_params(&url, args)
            .map_err(|e| ApiError::InvalidUrl(format!("{url}: {e}")))?;

        tracing::debug!(method, "calling api");
        let body = self
            .http
            .post(url)
            .bearer_auth(&self.token)
            .send()
            .await?
            .error_for_status()?
            .json::<Value>()
            .await?;

        check_envelope(body)
    }
}

impl fmt::Debug for ApiClient {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ApiClient")
            .field("base_url", &self.base_url)
            .field("token", &"<redacted>")
            .finish_non_exhaustive()
    }
}

/// Validates the `{"ok": ..}` envelope of an API response.
///
/// # Errors
///
/// Returns [`ApiError::Decode`] if `body` is not an object and
/// [`ApiError::Rejected`] if `ok` is not `true`.
pub fn check_envelope(body: Value) -> Result<Value, ApiError> {
    let Some(obj) = body.as_object() else {
        return Err(ApiError::Decode("response is not a JSON object".to_string()));
    };
    if obj.get("ok").and_then(Value::as_bool) == Some(true) {
        return Ok(body);
    }
    let code = obj
        .get("error")
        .and_then(Value::as_str)
        .unwrap_or("unknown_error")
        .to_string();
    Err(ApiError::Rejected {
        message: humanize(&code),
        code,
    })
}

/// Turns an error code into a sentence: `"not_authed"` → `"Not authed"`.
#[must_use]
pub fn humanize(code: &str) -> String {
    let spaced = code.replace('_', " ");
    let mut chars = spaced.chars();
    match chars.next() {
        Some(first) => first.to_uppercase().chain(chars).collect(),
        None => String::new(),
    }
}

/// Source of the bootstrap snapshot.
pub trait SnapshotFetcher: Send + Sync + fmt::Debug {
    /// Fetches and decodes a fresh snapshot.
    ///
    /// # Errors
    ///
    /// Returns a [`RtmError::Connection`] if the call fails, is rejected,
    /// or the body does not decode as a snapshot.
    fn fetch(&self) -> BoxFuture<'_, Result<Snapshot, RtmError>>;
}

/// Fetches the snapshot with an `rtm.start` call.
#[derive(Debug, Clone)]
pub struct HttpSnapshotFetcher {
    api: ApiClient,
}

impl HttpSnapshotFetcher {
    /// Wraps an API caller.
    #[must_use]
    pub fn new(api: ApiClient) -> Self {
        Self { api }
    }
}

impl SnapshotFetcher for HttpSnapshotFetcher {
    fn fetch(&self) -> BoxFuture<'_, Result<Snapshot, RtmError>> {
        Box::pin(async move {
            let body = self.api.call(RTM_START, &[]).await?;
            Ok(Snapshot::from_payload(&body)?)
        })
    }
}

/// Replays a fixed `rtm.start` response body.
///
/// The envelope is checked on every fetch, so a body with `ok: false`
/// reproduces a rejected bootstrap.
#[derive(Debug, Clone)]
pub struct StaticSnapshot {
    body: Value,
}

impl StaticSnapshot {
    /// Creates a fetcher returning `body`.
    #[must_use]
    pub fn new(body: Value) -> Self {
        Self { body }
    }
}

impl SnapshotFetcher for StaticSnapshot {
    fn fetch(&self) -> BoxFuture<'_, Result<Snapshot, RtmError>> {
        Box::pin(async move {
            let body = check_envelope(self.body.clone())?;
            Ok(Snapshot::from_payload(&body)?)
        })
    }
}
