//! Remote API client for the Segment Public API.
//!
//! Resources talk to the remote system only through the [`Api`] trait, which
//! takes an [`ApiRequest`] and yields either an [`ApiResponse`] (status plus
//! decoded JSON body) or an [`ApiError`]. [`HttpClient`] is the production
//! implementation over `reqwest`; tests use [`crate::testing::ScriptedApi`].
//!
//! Every Segment response wraps its payload in a `{"data": {...}}` envelope and
//! every error response carries `{"errors": [{"type", "message", "field"}]}`.

use std::borrow::Cow;
use std::fmt;

use async_trait::async_trait;
use reqwest::header::{ACCEPT, CONTENT_TYPE, USER_AGENT};
use reqwest::Method;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tracing::debug;
use url::Url;

/// Media type of the Segment Public API.
pub const MEDIA_TYPE: &str = "application/vnd.segment.v1+json";

/// Percent-encode one path segment, such as an identifier taken from state.
///
/// `/`, `?` and `#` inside the value stay part of the segment.
pub fn segment(value: &str) -> Cow<'_, str> {
    urlencoding::encode(value)
}

/// A request to the remote API.
#[derive(Debug, Clone, PartialEq)]
pub struct ApiRequest {
    /// HTTP method.
    pub method: Method,
    /// Path relative to the API base URL, e.g. `/sources/abc`.
    pub path: String,
    /// Query string parameters, in order.
    pub query: Vec<(String, String)>,
    /// JSON body, if any.
    pub body: Option<Value>,
}

impl ApiRequest {
    /// Create a request with the given method and path.
    pub fn new(method: Method, path: impl Into<String>) -> Self {
        Self {
            method,
            path: path.into(),
            query: Vec::new(),
            body: None,
        }
    }

    /// A `GET` request.
    pub fn get(path: impl Into<String>) -> Self {
        Self::new(Method::GET, path)
    }

    /// A `POST` request.
    pub fn post(path: impl Into<String>) -> Self {
        Self::new(Method::POST, path)
    }

    /// A `PATCH` request.
    pub fn patch(path: impl Into<String>) -> Self {
        Self::new(Method::PATCH, path)
    }

    /// A `PUT` request.
    pub fn put(path: impl Into<String>) -> Self {
        Self::new(Method::PUT, path)
    }

    /// A `DELETE` request.
    pub fn delete(path: impl Into<String>) -> Self {
        Self::new(Method::DELETE, path)
    }

    /// Append a query parameter.
    pub fn with_query(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.query.push((key.into(), value.into()));
        self
    }

    /// Attach a JSON body.
    pub fn with_body(mut self, body: Value) -> Self {
        self.body = Some(body);
        self
    }

    /// Look up a query parameter by name.
    pub fn query_param(&self, key: &str) -> Option<&str> {
        self.query
            .iter()
            .find(|(k, _)| k == key)
            .map(|(_, v)| v.as_str())
    }
}

/// A successful response from the remote API.
#[derive(Debug, Clone, PartialEq)]
pub struct ApiResponse {
    /// HTTP status code.
    pub status: u16,
    /// Decoded JSON body (`Null` for an empty body).
    pub body: Value,
}

impl ApiResponse {
    /// Create a response from a status code and body.
    pub fn new(status: u16, body: Value) -> Self {
        Self { status, body }
    }

    /// The value at `data.<key>` in the response envelope.
    pub fn data(&self, key: &str) -> Option<&Value> {
        self.body
            .get("data")
            .and_then(|data| data.get(key))
            .filter(|value| !value.is_null())
    }
}

/// A single structured error reported by the remote API.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ApiErrorDetail {
    /// Error category, e.g. `not-found` or `validation`.
    #[serde(rename = "type", default, skip_serializing_if = "Option::is_none")]
    pub kind: Option<String>,
    /// Human-readable message.
    pub message: String,
    /// Request field the error refers to.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub field: Option<String>,
}

impl fmt::Display for ApiErrorDetail {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.field {
            Some(field) => write!(f, "{} (field: {})", self.message, field),
            None => f.write_str(&self.message),
        }
    }
}

#[derive(Deserialize)]
struct ErrorEnvelope {
    #[serde(default)]
    errors: Vec<ApiErrorDetail>,
}

/// Errors returned by an [`Api`] call.
#[derive(Debug, thiserror::Error)]
pub enum ApiError {
    /// The remote API answered with a non-2xx status.
    #[error("remote API returned status {status}: {message}")]
    Status {
        /// HTTP status code.
        status: u16,
        /// Structured error messages joined, or the raw body when none were sent.
        message: String,
        /// Structured errors from the response body.
        errors: Vec<ApiErrorDetail>,
    },

    /// The request never produced a response.
    #[error("transport error: {0}")]
    Transport(#[from] reqwest::Error),

    /// The response body was not valid JSON.
    #[error("invalid response body: {0}")]
    Decode(#[from] serde_json::Error),

    /// The request URL could not be built.
    #[error("invalid request URL: {0}")]
    Url(#[from] url::ParseError),

    /// The request path does not resolve to itself under the base URL.
    #[error("request path '{0}' is not a plain resource path")]
    Path(String),
}

impl ApiError {
    /// Build a status error from a raw response body.
    ///
    /// Structured `errors` are preferred; the raw body is the fallback detail.
    pub fn from_response(status: u16, body: &str) -> Self {
        let errors = serde_json::from_str::<ErrorEnvelope>(body)
            .map(|envelope| envelope.errors)
            .unwrap_or_default();
        let message = if errors.is_empty() {
            let trimmed = body.trim();
            if trimmed.is_empty() {
                "no response body".to_string()
            } else {
                trimmed.to_string()
            }
        } else {
            errors
                .iter()
                .map(ToString::to_string)
                .collect::<Vec<_>>()
                .join("; ")
        };
        Self::Status {
            status,
            message,
            errors,
        }
    }

    /// The HTTP status, when the remote answered.
    pub fn status(&self) -> Option<u16> {
        match self {
            Self::Status { status, .. } => Some(*status),
            _ => None,
        }
    }

    /// Whether the remote reported that the object does not exist.
    pub fn is_not_found(&self) -> bool {
        self.status() == Some(404)
    }

    /// Operator-facing detail: the remote's structured message, else the transport error.
    pub fn detail(&self) -> String {
        match self {
            Self::Status {
                status, message, ..
            } => format!("{} (HTTP {})", message, status),
            other => other.to_string(),
        }
    }
}

/// The remote API capability consumed by every resource.
#[async_trait]
pub trait Api: Send + Sync {
    /// Send a request and return the decoded response.
    ///
    /// Non-2xx responses are returned as [`ApiError::Status`].
    async fn send(&self, request: ApiRequest) -> Result<ApiResponse, ApiError>;
}

/// [`Api`] implementation over HTTPS with a bearer token.
#[derive(Clone)]
pub struct HttpClient {
    http: reqwest::Client,
    base_url: Url,
    token: String,
}

impl fmt::Debug for HttpClient {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("HttpClient")
            .field("base_url", &self.base_url.as_str())
            .field("token", &"<redacted>")
            .finish()
    }
}

impl HttpClient {
    /// Create a client for the given base URL and token.
    pub fn new(base_url: Url, token: impl Into<String>) -> Self {
        Self::with_http_client(reqwest::Client::new(), base_url, token)
    }

    /// Create a client reusing an existing `reqwest` client.
    pub fn with_http_client(
        http: reqwest::Client,
        mut base_url: Url,
        token: impl Into<String>,
    ) -> Self {
        // `Url::join` replaces the last segment unless the base ends with a slash.
        if !base_url.path().ends_with('/') {
            let path = format!("{}/", base_url.path());
            base_url.set_path(&path);
        }
        Self {
            http,
            base_url,
            token: token.into(),
        }
    }

    /// The normalized base URL.
    pub fn base_url(&self) -> &Url {
        &self.base_url
    }

    fn url_for(&self, path: &str) -> Result<Url, ApiError> {
        let relative = path.trim_start_matches('/');
        let url = self.base_url.join(relative)?;
        // Dot segments, queries and fragments would point the request elsewhere.
        let expected = format!("{}{}", self.base_url.path(), relative);
        if url.path() != expected || url.query().is_some() || url.fragment().is_some() {
            return Err(ApiError::Path(path.to_string()));
        }
        Ok(url)
    }
}

#[async_trait]
impl Api for HttpClient {
    async fn send(&self, request: ApiRequest) -> Result<ApiResponse, ApiError> {
        let url = self.url_for(&request.path)?;
        let mut builder = self
            .http
            .request(request.method.clone(), url)
            .bearer_auth(&self.token)
            .header(ACCEPT, MEDIA_TYPE)
            .header(USER_AGENT, concat!("segment-provider/", env!("CARGO_PKG_VERSION")));

        if !request.query.is_empty() {
            builder = builder.query(&request.query);
        }
        if let Some(body) = &request.body {
            builder = builder
                .header(CONTENT_TYPE, MEDIA_TYPE)
                .body(serde_json::to_vec(body)?);
        }

        let response = builder.send().await?;
        let status = response.status();
        let text = response.text().await?;
        debug!(
            method = %request.method,
            path = %request.path,
            status = status.as_u16(),
            "Remote API call completed"
        );

        if !status.is_success() {
            return Err(ApiError::from_response(status.as_u16(), &text));
        }

        let body = if text.trim().is_empty() {
            Value::Null
        } else {
            serde_json::from_str(&text)?
        };
        Ok(ApiResponse::new(status.as_u16(), body))
    }
}
