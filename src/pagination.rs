//! Cursor pagination over Segment list endpoints.
//!
//! List endpoints take `pagination.count` and `pagination.cursor` query
//! parameters and report the cursor of the following page in
//! `data.pagination.next`. Readers accumulate every page before mapping
//! anything into state.

use std::future::Future;

use serde::de::DeserializeOwned;
use serde_json::Value;
use tracing::debug;

use crate::client::{Api, ApiRequest, ApiResponse};
use crate::resource::ResourceError;

/// Page size requested from list endpoints; the remote API's ceiling.
pub const MAX_PAGE_SIZE: u32 = 200;

/// One page of a listing.
#[derive(Debug, Clone, PartialEq)]
pub struct Page<T> {
    /// Items on this page.
    pub items: Vec<T>,
    /// Cursor of the next page, if there is one.
    pub next: Option<String>,
}

impl<T> Page<T> {
    /// A page with no following page.
    pub fn last(items: Vec<T>) -> Self {
        Self { items, next: None }
    }
}

/// Fetch pages until the remote stops reporting a next cursor.
///
/// `fetch` receives the cursor of the page to load (`None` for the first).
/// Items are concatenated in page order.
pub async fn collect_pages<T, E, F, Fut>(mut fetch: F) -> Result<Vec<T>, E>
where
    F: FnMut(Option<String>) -> Fut,
    Fut: Future<Output = Result<Page<T>, E>>,
{
    let mut items = Vec::new();
    let mut cursor = None;
    loop {
        let page = fetch(cursor.take()).await?;
        items.extend(page.items);
        match page.next {
            Some(next) if !next.is_empty() => cursor = Some(next),
            _ => break,
        }
    }
    Ok(items)
}

/// List every item at `data.<key>` of a paginated endpoint.
pub async fn list_all<T: DeserializeOwned>(
    api: &dyn Api,
    path: &str,
    key: &str,
) -> Result<Vec<T>, ResourceError> {
    collect_pages(|cursor| async move {
        let mut request =
            ApiRequest::get(path).with_query("pagination.count", MAX_PAGE_SIZE.to_string());
        if let Some(cursor) = cursor {
            request = request.with_query("pagination.cursor", cursor);
        }
        let response = api.send(request).await?;
        let page = parse_page(&response, key)?;
        debug!(path, items = page.items.len(), has_next = page.next.is_some(), "Fetched page");
        Ok(page)
    })
    .await
}

fn parse_page<T: DeserializeOwned>(
    response: &ApiResponse,
    key: &str,
) -> Result<Page<T>, ResourceError> {
    let items = match response.data(key) {
        Some(value) => serde_json::from_value(value.clone()).map_err(|e| {
            ResourceError::Populate(format!("data.{} has an unexpected shape: {}", key, e))
        })?,
        None => Vec::new(),
    };
    let next = response
        .data("pagination")
        .and_then(|pagination| pagination.get("next"))
        .and_then(Value::as_str)
        .map(str::to_string);
    Ok(Page { items, next })
}
