//! Error types surfaced to the configuration engine.
//!
//! Every failure ends up as one or more [`Diagnostic`]s on the engine's
//! diagnostics channel. The variants keep the kinds apart so an operator can
//! tell "the remote rejected this" ([`ProviderError::Remote`]) from "the
//! provider could not map the response" ([`ProviderError::StatePopulation`]).

use thiserror::Error;

use crate::client::ApiError;
use crate::schema::Diagnostic;

/// Errors returned by provider operations.
#[derive(Debug, Error)]
pub enum ProviderError {
    /// A remote call failed; `summary` names the action and resource type.
    #[error("{summary}: {source}")]
    Remote {
        /// e.g. "Unable to create source".
        summary: String,
        /// The underlying remote failure.
        #[source]
        source: ApiError,
    },

    /// The remote call succeeded but its response could not be mapped into state.
    #[error("{summary}: {detail}")]
    StatePopulation {
        /// e.g. "Unable to populate source state".
        summary: String,
        /// What was missing or malformed.
        detail: String,
    },

    /// The import identifier could not be decoded.
    #[error("Invalid import identifier: {0}")]
    InvalidImportId(String),

    /// Local validation or decode failures, all reported together.
    #[error("{}", summarize(.0))]
    Diagnostics(Vec<Diagnostic>),

    /// The provider configuration is unusable.
    #[error("Configuration error: {0}")]
    Configuration(String),

    /// A lifecycle operation arrived before Configure.
    #[error("Provider has not been configured")]
    NotConfigured,

    /// The requested resource or data source type is unknown.
    #[error("Unknown resource type: {0}")]
    UnknownResource(String),

    /// State could not be encoded or decoded.
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

impl ProviderError {
    /// Build a [`ProviderError::Diagnostics`] from a single error diagnostic.
    pub fn diagnostic(diagnostic: Diagnostic) -> Self {
        Self::Diagnostics(vec![diagnostic])
    }

    /// Render this error as engine diagnostics.
    pub fn diagnostics(&self) -> Vec<Diagnostic> {
        match self {
            Self::Remote { summary, source } => {
                vec![Diagnostic::error(summary.clone()).with_detail(source.detail())]
            }
            Self::StatePopulation { summary, detail } => {
                vec![Diagnostic::error(summary.clone()).with_detail(detail.clone())]
            }
            Self::InvalidImportId(detail) => {
                vec![Diagnostic::error("Invalid import identifier").with_detail(detail.clone())]
            }
            Self::Diagnostics(diagnostics) => diagnostics.clone(),
            Self::Configuration(detail) => {
                vec![Diagnostic::error("Invalid provider configuration")
                    .with_detail(detail.clone())]
            }
            other => vec![Diagnostic::error(other.to_string())],
        }
    }

    /// The remote failure behind this error, if any.
    pub fn api_error(&self) -> Option<&ApiError> {
        match self {
            Self::Remote { source, .. } => Some(source),
            _ => None,
        }
    }
}

fn summarize(diagnostics: &[Diagnostic]) -> String {
    match diagnostics {
        [] => "no diagnostics".to_string(),
        [only] => match &only.detail {
            Some(detail) => format!("{}: {}", only.summary, detail),
            None => only.summary.clone(),
        },
        [first, rest @ ..] => format!("{} (and {} more)", first.summary, rest.len()),
    }
}
