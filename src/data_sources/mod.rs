//! Segment data sources: read-only lookups.

use std::sync::Arc;

use crate::client::Api;
use crate::resource::{DataSource, DataSourceAdapter, DynDataSource};
use crate::schema::Schema;

pub mod destination_metadata;
pub mod source;

pub use destination_metadata::DestinationMetadataLookup;
pub use source::SourceLookup;

/// Schemas of every data source type, keyed by type name.
pub fn schemas() -> Vec<(&'static str, Schema)> {
    vec![
        (SourceLookup::TYPE_NAME, SourceLookup::schema()),
        (
            DestinationMetadataLookup::TYPE_NAME,
            DestinationMetadataLookup::schema(),
        ),
    ]
}

/// Every data source type, bound to one API handle.
pub fn all(api: &Arc<dyn Api>) -> Vec<Box<dyn DynDataSource>> {
    vec![
        Box::new(DataSourceAdapter::new(SourceLookup::new(api.clone()))),
        Box::new(DataSourceAdapter::new(DestinationMetadataLookup::new(api.clone()))),
    ]
}
