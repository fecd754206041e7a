//! File content and directory listings for a single repository.
//!
//! Private repositories can only be read through the authenticated contents
//! API, which costs rate-limit budget and wraps the bytes in base64. Public
//! repositories are read from the raw host instead, which is unmetered.
//! Listings have no raw equivalent and always go through the API.

use backon::{ConstantBuilder, Retryable};
use base64::Engine;
use reqwest::header::HeaderMap;
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use std::sync::atomic::{AtomicU32, Ordering};
use std::time::Duration;
use tracing::{debug, warn};

use crate::error::{FetchError, Result};
use crate::transport::Transport;

/// Where file bytes are read from
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ContentSource {
    /// Authenticated contents API (base64 payload)
    Api,
    /// Raw host, public repositories only
    Raw,
}

impl ContentSource {
    pub fn for_visibility(private: bool) -> Self {
        if private {
            ContentSource::Api
        } else {
            ContentSource::Raw
        }
    }
}

/// Kind of a directory entry, as tagged by the contents API
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum EntryKind {
    File,
    Dir,
    /// Symlinks, submodules and anything newer
    #[serde(other)]
    Other,
}

/// One entry of a directory listing
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DirEntry {
    /// Path relative to the repository root
    pub path: String,

    #[serde(rename = "type")]
    pub kind: EntryKind,
}

impl DirEntry {
    pub fn is_file(&self) -> bool {
        self.kind == EntryKind::File
    }

    pub fn is_dir(&self) -> bool {
        self.kind == EntryKind::Dir
    }
}

#[derive(Deserialize)]
struct ContentPayload {
    content: String,
}

/// Reads files and listings of one repository
#[derive(Clone)]
pub struct ContentResolver {
    transport: Transport,
    source: ContentSource,
    api_url: String,
    raw_url: String,
    branch: String,
    headers: HeaderMap,
}

impl ContentResolver {
    /// `api_url` is the repository's API URL, `raw_url` its root on the raw
    /// host (`{raw_host}/{owner}/{repo}`).
    pub fn new(
        transport: Transport,
        source: ContentSource,
        api_url: &str,
        raw_url: &str,
        branch: &str,
        headers: HeaderMap,
    ) -> Self {
        Self {
            transport,
            source,
            api_url: api_url.trim_end_matches('/').to_string(),
            raw_url: raw_url.trim_end_matches('/').to_string(),
            branch: branch.to_string(),
            headers,
        }
    }

    pub fn source(&self) -> ContentSource {
        self.source
    }

    /// Fetch a file, or `None` if it does not exist
    pub async fn fetch_file(&self, path: &str) -> Result<Option<Vec<u8>>> {
        match self.fetch_bytes(path).await {
            Ok(bytes) => Ok(Some(bytes)),
            Err(e) if e.is_not_found() => {
                debug!("{} not found in {}", path, self.api_url);
                Ok(None)
            }
            Err(e) => Err(e),
        }
    }

    /// List a directory; a missing directory is an empty listing
    pub async fn list_directory(&self, dir: &str) -> Result<Vec<DirEntry>> {
        let route = format!("contents/{}?branch={}", listing_path(dir), self.branch);
        match self.call_api(&route).await {
            Ok(entries) => Ok(entries),
            Err(e) if e.is_not_found() => {
                debug!("Directory {} not found in {}", dir, self.api_url);
                Ok(Vec::new())
            }
            Err(e) => Err(e),
        }
    }

    /// GET `{api_url}/{route}` and parse the JSON body
    pub async fn call_api<T: DeserializeOwned>(&self, route: &str) -> Result<T> {
        let url = format!("{}/{}", self.api_url, route.trim_start_matches('/'));
        let body = self.download(&url, &self.headers, route).await?;
        serde_json::from_slice(&body).map_err(|e| FetchError::decode(&url, e))
    }

    async fn fetch_bytes(&self, path: &str) -> Result<Vec<u8>> {
        let path = path.trim_start_matches('/');
        match self.source {
            ContentSource::Api => {
                let route = format!("contents/{}?branch={}", path, self.branch);
                let payload: ContentPayload = self.call_api(&route).await?;
                decode_content(&payload.content)
                    .map_err(|e| FetchError::decode(&format!("{}/{}", self.api_url, route), e))
            }
            ContentSource::Raw => {
                let url = format!("{}/{}/{}", self.raw_url, self.branch, path);
                self.download(&url, &HeaderMap::new(), path).await
            }
        }
    }

    /// GET with retries on timeout; the final error names `path`
    async fn download(&self, url: &str, headers: &HeaderMap, path: &str) -> Result<Vec<u8>> {
        let max_attempts = self.transport.max_attempts();
        let backoff = ConstantBuilder::default()
            .with_delay(Duration::ZERO)
            .with_max_times(max_attempts.saturating_sub(1) as usize);

        let attempt = AtomicU32::new(0);
        let transport = &self.transport;
        let counter = &attempt;
        let get = move || {
            counter.fetch_add(1, Ordering::SeqCst);
            transport.get(url, headers)
        };

        let result = get
            .retry(backoff)
            .when(FetchError::is_timeout)
            .notify(|_, _| {
                warn!(
                    "Timeout fetching {} (attempt {}/{}), retrying",
                    path,
                    attempt.load(Ordering::SeqCst),
                    max_attempts
                );
            })
            .await;

        match result {
            Err(e) if e.is_timeout() => Err(FetchError::Exhausted {
                path: path.to_string(),
                attempts: attempt.load(Ordering::SeqCst),
                source: Box::new(e),
            }),
            other => other,
        }
    }
}

/// Contents API path for a directory; `.` is the repository root
fn listing_path(dir: &str) -> &str {
    match dir.trim_matches('/') {
        "." => "",
        other => other.strip_prefix("./").unwrap_or(other),
    }
}

/// The API wraps base64 at 60 columns, so whitespace has to go first
fn decode_content(content: &str) -> std::result::Result<Vec<u8>, base64::DecodeError> {
    let compact: String = content.chars().filter(|c| !c.is_whitespace()).collect();
    base64::engine::general_purpose::STANDARD.decode(compact)
}
