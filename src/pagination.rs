//! Sequential page walking over list endpoints.

use reqwest::header::HeaderMap;
use serde::de::DeserializeOwned;
use tracing::debug;

use crate::error::{FetchError, Result};
use crate::transport::Transport;

/// Fetch every page of `base_url` and concatenate the records.
///
/// Pages are requested in order starting at 1. The walk stops at the first
/// empty page, or once `max_pages` pages have been fetched.
pub async fn fetch_all<T: DeserializeOwned>(
    transport: &Transport,
    base_url: &str,
    headers: &HeaderMap,
    max_pages: Option<u32>,
) -> Result<Vec<T>> {
    let mut results = Vec::new();
    let mut page = 1u32;

    loop {
        let url = page_url(base_url, page);
        let body = transport.get(&url, headers).await?;
        let records: Vec<T> =
            serde_json::from_slice(&body).map_err(|e| FetchError::decode(&url, e))?;

        debug!("Page {} of {} returned {} records", page, base_url, records.len());

        let empty = records.is_empty();
        results.extend(records);

        if empty || max_pages.is_some_and(|max| page >= max) {
            break;
        }
        page += 1;
    }

    Ok(results)
}

fn page_url(base_url: &str, page: u32) -> String {
    let separator = if base_url.contains('?') { '&' } else { '?' };
    format!("{}{}page={}", base_url, separator, page)
}
