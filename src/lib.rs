//! Segment Provider
//!
//! Reconciles declared Segment workspace objects (sources, destinations,
//! filters, warehouses, tracking plans, functions, labels and users) against
//! the Segment Public API for a declarative configuration engine.
//!
//! # Overview
//!
//! - **Resource adapter**: [`resource::Resource`] describes one resource type;
//!   [`resource::ResourceAdapter`] gives every type the same lifecycle contract
//!   (validation before remote calls, not-found handling, error wrapping)
//! - **Settings maps**: open-ended settings travel as canonical JSON text and
//!   are diffed against the remote object so removed keys are deleted
//! - **Import identifiers**: single ids or `:`-joined pairs
//! - **Remote client**: the [`client::Api`] capability and its `reqwest`
//!   implementation
//! - **Provider**: [`SegmentProvider`] implements [`ProviderService`], the
//!   operations the engine invokes
//! - **Logging**: integration with `tracing` for structured logging
//!
//! # Quick Start
//!
//! ```ignore
//! use segment_provider::{init_logging, ProviderService, SegmentProvider};
//! use serde_json::json;
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     init_logging();
//!
//!     let provider = SegmentProvider::new();
//!     // token falls back to $SEGMENT_PUBLIC_API_TOKEN
//!     provider.configure(json!({})).await?;
//!
//!     let state = provider
//!         .create("segment_label", json!({"key": "environment", "value": "prod"}))
//!         .await?;
//!     println!("{}", state);
//!     Ok(())
//! }
//! ```
//!
//! # Lifecycle contract
//!
//! | Operation | Behavior |
//! |---|---|
//! | Create / Update | plan validated first; on error nothing is sent |
//! | Read | a remote not-found returns `None`: drop from state |
//! | Delete | a remote not-found is success |
//! | Import | the identifier seeds state; a read completes it |

#![warn(missing_docs)]
#![warn(clippy::all)]

pub mod client;
pub mod config;
pub mod data_sources;
pub mod error;
pub mod import;
pub mod logging;
pub mod pagination;
pub mod provider;
pub mod resource;
pub mod resources;
pub mod schema;
pub mod service;
pub mod settings;
pub mod testing;
pub mod validation;

// Re-export main types at crate root
pub use error::ProviderError;
pub use logging::{init_logging, init_logging_with_default, try_init_logging};
pub use provider::SegmentProvider;
pub use schema::ProviderSchema;
pub use service::{ImportedResource, ProviderMetadata, ProviderService};
pub use validation::{is_valid, validate};

// Re-export async_trait for convenience
pub use async_trait::async_trait;

// Re-export commonly used external types
pub use serde_json;
pub use tracing;
