//! Import identifiers.
//!
//! Import seeds state for an object that already exists remotely. Each
//! resource type declares an [`ImportFormat`]: either a bare identifier or a
//! `:`-joined pair such as `<destination_id>:<filter_id>`. Decoding is strict;
//! malformed input is rejected outright and never partially imported.

use std::fmt;

use crate::error::ProviderError;

/// Delimiter between the segments of a composite import identifier.
pub const DELIMITER: char = ':';

/// Shape of a resource type's import identifier.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ImportFormat {
    /// A single identifier passed through as-is.
    Single(&'static str),
    /// Two identifiers joined by [`DELIMITER`].
    Pair(&'static str, &'static str),
}

impl fmt::Display for ImportFormat {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Single(name) => write!(f, "<{}>", name),
            Self::Pair(first, second) => write!(f, "<{}>{}<{}>", first, DELIMITER, second),
        }
    }
}

/// A decoded import identifier.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ImportId {
    /// A bare identifier.
    Single(String),
    /// A parent/child pair.
    Pair(String, String),
}

impl ImportId {
    /// Decode `raw` according to `format`.
    pub fn parse(raw: &str, format: ImportFormat) -> Result<Self, ProviderError> {
        let invalid = |reason: String| {
            ProviderError::InvalidImportId(format!("{}, expected {}", reason, format))
        };

        if raw.trim().is_empty() {
            return Err(invalid("identifier is empty".to_string()));
        }

        match format {
            ImportFormat::Single(_) => Ok(Self::Single(raw.to_string())),
            ImportFormat::Pair(..) => {
                let parts: Vec<&str> = raw.split(DELIMITER).collect();
                match parts.as_slice() {
                    [first, second] if !first.trim().is_empty() && !second.trim().is_empty() => {
                        Ok(Self::Pair(first.to_string(), second.to_string()))
                    }
                    [_, _] => Err(invalid(format!("'{}' has an empty segment", raw))),
                    _ => Err(invalid(format!(
                        "'{}' has {} segment(s)",
                        raw,
                        parts.len()
                    ))),
                }
            }
        }
    }

    /// The first (or only) identifier.
    pub fn first(&self) -> &str {
        match self {
            Self::Single(id) | Self::Pair(id, _) => id,
        }
    }

    /// The second identifier of a pair; empty for a bare identifier.
    pub fn second(&self) -> &str {
        match self {
            Self::Single(_) => "",
            Self::Pair(_, id) => id,
        }
    }
}
