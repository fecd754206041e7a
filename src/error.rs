//! Classified fetch errors.
//!
//! Every failure coming out of the fetch layer is a [`FetchError`]. Callers
//! decide policy by classification: a 404 means "missing", a timeout may be
//! retried, anything else is fatal for the current call.

use thiserror::Error;

/// Result alias for the fetch layer.
pub type Result<T> = std::result::Result<T, FetchError>;

#[derive(Debug, Error)]
pub enum FetchError {
    /// The server answered with something other than 200.
    #[error("HTTP get error, retried {retries} times\n{url}\nCode: {status}\n{body}")]
    Http {
        url: String,
        status: u16,
        body: String,
        retries: u32,
    },

    #[error("Timeout error during request {url}: {message}")]
    Timeout { url: String, message: String },

    #[error("Connection error during request {url}: {message}")]
    Connection { url: String, message: String },

    /// The body did not have the shape the endpoint promises.
    #[error("Unable to decode response from {url}: {message}")]
    Decode { url: String, message: String },

    #[error("Failed to build HTTP client: {message}")]
    Client { message: String },

    /// The token cannot be sent as an `Authorization` header.
    #[error("Invalid access token: {message}")]
    InvalidToken { message: String },

    #[error("Giving up on {path} after {attempts} attempts: {source}")]
    Exhausted {
        path: String,
        attempts: u32,
        #[source]
        source: Box<FetchError>,
    },
}

impl FetchError {
    /// HTTP status code, if the failure came from a response.
    pub fn status(&self) -> Option<u16> {
        match self {
            FetchError::Http { status, .. } => Some(*status),
            FetchError::Exhausted { source, .. } => source.status(),
            _ => None,
        }
    }

    pub fn is_not_found(&self) -> bool {
        self.status() == Some(404)
    }

    pub fn is_timeout(&self) -> bool {
        match self {
            FetchError::Timeout { .. } => true,
            FetchError::Exhausted { source, .. } => source.is_timeout(),
            _ => false,
        }
    }

    /// The URL of the request that failed.
    pub fn url(&self) -> Option<&str> {
        match self {
            FetchError::Http { url, .. }
            | FetchError::Timeout { url, .. }
            | FetchError::Connection { url, .. }
            | FetchError::Decode { url, .. } => Some(url),
            FetchError::Client { .. } | FetchError::InvalidToken { .. } => None,
            FetchError::Exhausted { source, .. } => source.url(),
        }
    }

    /// Classify a reqwest failure into a timeout or a connection error.
    pub(crate) fn from_reqwest(url: &str, err: reqwest::Error) -> Self {
        if err.is_timeout() {
            FetchError::Timeout {
                url: url.to_string(),
                message: err.to_string(),
            }
        } else {
            FetchError::Connection {
                url: url.to_string(),
                message: err.to_string(),
            }
        }
    }

    pub(crate) fn decode(url: &str, message: impl std::fmt::Display) -> Self {
        FetchError::Decode {
            url: url.to_string(),
            message: message.to_string(),
        }
    }
}
