//! Provider-level configuration.
//!
//! Two settings, each taken from the provider configuration block first and
//! the environment second:
//!
//! | Setting | Config key | Environment | Default |
//! |---|---|---|---|
//! | API base URL | `url` | `SEGMENT_PUBLIC_API_URL` | `https://api.segmentapis.com` |
//! | API token | `token` | `SEGMENT_PUBLIC_API_TOKEN` | none, mandatory |
//!
//! Resolution happens once, at Configure. Failures are configuration errors
//! of the provider, never of an individual resource.

use std::fmt;

use serde::Deserialize;
use serde_json::Value;
use url::Url;

use crate::error::ProviderError;
use crate::schema::{Attribute, Diagnostic, Schema};

/// Production endpoint of the Segment Public API.
pub const DEFAULT_API_URL: &str = "https://api.segmentapis.com";

/// Environment variable overriding the API base URL.
pub const URL_ENV: &str = "SEGMENT_PUBLIC_API_URL";

/// Environment variable holding the API token.
pub const TOKEN_ENV: &str = "SEGMENT_PUBLIC_API_TOKEN";

#[derive(Debug, Default, Deserialize)]
#[serde(deny_unknown_fields)]
struct RawConfig {
    #[serde(default)]
    url: Option<String>,
    #[serde(default)]
    token: Option<String>,
}

/// Resolved provider configuration.
#[derive(Clone, PartialEq)]
pub struct ProviderConfig {
    /// API base URL.
    pub url: Url,
    /// API token.
    pub token: String,
}

impl fmt::Debug for ProviderConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ProviderConfig")
            .field("url", &self.url.as_str())
            .field("token", &"<redacted>")
            .finish()
    }
}

impl ProviderConfig {
    /// Schema of the provider configuration block.
    pub fn schema() -> Schema {
        Schema::v0()
            .with_attribute(
                "url",
                Attribute::optional_string().with_description(format!(
                    "Base URL of the Segment Public API. Defaults to ${} or {}.",
                    URL_ENV, DEFAULT_API_URL
                )),
            )
            .with_attribute(
                "token",
                Attribute::optional_string()
                    .sensitive()
                    .with_description(format!("API token. Defaults to ${}.", TOKEN_ENV)),
            )
    }

    /// Resolve from a configuration block and the process environment.
    pub fn from_value(config: &Value) -> Result<Self, ProviderError> {
        Self::resolve(config, |key| std::env::var(key).ok())
    }

    /// Resolve from a configuration block and an environment lookup.
    pub fn resolve(
        config: &Value,
        env: impl Fn(&str) -> Option<String>,
    ) -> Result<Self, ProviderError> {
        let raw = parse_raw(config)?;

        let url = non_empty(raw.url)
            .or_else(|| non_empty(env(URL_ENV)))
            .unwrap_or_else(|| DEFAULT_API_URL.to_string());
        let url = Url::parse(&url).map_err(|e| {
            ProviderError::Configuration(format!("invalid API URL '{}': {}", url, e))
        })?;

        let token = non_empty(raw.token)
            .or_else(|| non_empty(env(TOKEN_ENV)))
            .ok_or_else(|| {
                ProviderError::Configuration(format!(
                    "an API token is required: set `token` or ${}",
                    TOKEN_ENV
                ))
            })?;

        Ok(Self { url, token })
    }

    /// Check the shape of a configuration block without requiring the token.
    ///
    /// The token may still arrive through the environment at Configure time.
    pub fn validate(config: &Value) -> Vec<Diagnostic> {
        let raw = match parse_raw(config) {
            Ok(raw) => raw,
            Err(e) => return e.diagnostics(),
        };
        let mut diagnostics = Vec::new();
        if let Some(url) = non_empty(raw.url) {
            if let Err(e) = Url::parse(&url) {
                diagnostics.push(
                    Diagnostic::error("Invalid API URL")
                        .with_detail(format!("'{}': {}", url, e))
                        .with_attribute("url"),
                );
            }
        }
        diagnostics
    }
}

fn parse_raw(config: &Value) -> Result<RawConfig, ProviderError> {
    if config.is_null() {
        return Ok(RawConfig::default());
    }
    serde_json::from_value(config.clone())
        .map_err(|e| ProviderError::Configuration(format!("invalid provider configuration: {}", e)))
}

fn non_empty(value: Option<String>) -> Option<String> {
    value.filter(|v| !v.trim().is_empty())
}
