use async_trait::async_trait;
use reqwest::header::{HeaderMap, HeaderValue, AUTHORIZATION};
use reqwest::StatusCode;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, warn};

use crate::error::{FetchError, Result};

/// Total attempts for a single GET, including rate-limit retries
pub const MAX_ATTEMPTS: u32 = 3;

/// Extra wait on top of the advertised reset time, in case our clock drifts
pub const RATE_LIMIT_MARGIN: Duration = Duration::from_secs(60);

/// Default per-request timeout
pub const DEFAULT_TIMEOUT: Duration = Duration::from_secs(30);

const RATE_LIMIT_REMAINING: &str = "x-ratelimit-remaining";
const RATE_LIMIT_RESET: &str = "x-ratelimit-reset";

/// Source of wall-clock time and sleeping for the retry loop
#[async_trait]
pub trait Clock: Send + Sync {
    /// Current time as Unix seconds
    fn now(&self) -> i64;

    async fn sleep(&self, duration: Duration);
}

/// Real clock backed by chrono and tokio
#[derive(Debug, Clone, Copy, Default)]
pub struct SystemClock;

#[async_trait]
impl Clock for SystemClock {
    fn now(&self) -> i64 {
        chrono::Utc::now().timestamp()
    }

    async fn sleep(&self, duration: Duration) {
        tokio::time::sleep(duration).await;
    }
}

/// Build request headers for an optional token.
///
/// `Authorization: token {token}` is only present when a token is given, so
/// anonymous requests fall back to the unauthenticated rate limit. A token
/// that cannot be a header value is an error, never a silent downgrade to
/// anonymous access.
pub fn auth_headers(token: Option<&str>) -> Result<HeaderMap> {
    let mut headers = HeaderMap::new();
    if let Some(token) = token {
        let mut value = HeaderValue::from_str(&format!("token {}", token)).map_err(|_| {
            FetchError::InvalidToken {
                message: "token contains characters that are not allowed in a header".to_string(),
            }
        })?;
        value.set_sensitive(true);
        headers.insert(AUTHORIZATION, value);
    }
    Ok(headers)
}

/// Result of a single GET attempt
#[derive(Debug)]
pub enum RequestOutcome {
    Success(Vec<u8>),
    /// Quota is exhausted; the server told us when it resets
    RateLimited {
        wait: Duration,
        status: u16,
        body: String,
    },
    Failed {
        status: u16,
        body: String,
    },
}

/// Authenticated GET with rate-limit aware retries
#[derive(Clone)]
pub struct Transport {
    client: reqwest::Client,
    clock: Arc<dyn Clock>,
    max_attempts: u32,
    rate_limit_margin: Duration,
}

impl Transport {
    /// Create a transport whose requests time out after `timeout`
    pub fn new(timeout: Duration) -> Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(timeout)
            .user_agent(concat!(env!("CARGO_PKG_NAME"), "/", env!("CARGO_PKG_VERSION")))
            .build()
            .map_err(|e| FetchError::Client {
                message: e.to_string(),
            })?;

        Ok(Self {
            client,
            clock: Arc::new(SystemClock),
            max_attempts: MAX_ATTEMPTS,
            rate_limit_margin: RATE_LIMIT_MARGIN,
        })
    }

    pub fn with_clock(mut self, clock: Arc<dyn Clock>) -> Self {
        self.clock = clock;
        self
    }

    pub fn with_max_attempts(mut self, max_attempts: u32) -> Self {
        self.max_attempts = max_attempts.max(1);
        self
    }

    pub fn with_rate_limit_margin(mut self, margin: Duration) -> Self {
        self.rate_limit_margin = margin;
        self
    }

    pub fn max_attempts(&self) -> u32 {
        self.max_attempts
    }

    /// GET `url` and return the body of a 200 response.
    ///
    /// A 403 with an exhausted quota sleeps until the advertised reset (plus
    /// the margin) and tries again, up to `max_attempts` in total. Any other
    /// status fails immediately. Timeouts and connection errors are never
    /// retried here.
    pub async fn get(&self, url: &str, headers: &HeaderMap) -> Result<Vec<u8>> {
        let mut attempt = 0;
        loop {
            let outcome = self.attempt(url, headers).await?;
            let last_attempt = attempt + 1 >= self.max_attempts;

            match outcome {
                RequestOutcome::Success(body) => return Ok(body),
                RequestOutcome::RateLimited { wait, .. } if !last_attempt => {
                    warn!(
                        "Github rate limit exhausted, retrying in {}s ({})",
                        wait.as_secs(),
                        url
                    );
                    self.clock.sleep(wait + self.rate_limit_margin).await;
                    attempt += 1;
                }
                RequestOutcome::RateLimited { status, body, .. }
                | RequestOutcome::Failed { status, body } => {
                    return Err(FetchError::Http {
                        url: url.to_string(),
                        status,
                        body,
                        retries: attempt,
                    });
                }
            }
        }
    }

    async fn attempt(&self, url: &str, headers: &HeaderMap) -> Result<RequestOutcome> {
        debug!("GET {}", url);

        let response = self
            .client
            .get(url)
            .headers(headers.clone())
            .send()
            .await
            .map_err(|e| FetchError::from_reqwest(url, e))?;

        let status = response.status();
        if status == StatusCode::OK {
            let body = response
                .bytes()
                .await
                .map_err(|e| FetchError::from_reqwest(url, e))?;
            return Ok(RequestOutcome::Success(body.to_vec()));
        }

        let wait = if status == StatusCode::FORBIDDEN {
            self.rate_limit_wait(response.headers())
        } else {
            None
        };
        debug!("GET {} returned {}", url, status);
        let body = match response.text().await {
            Ok(body) => body,
            Err(e) => {
                debug!("Failed to read {} body from {}: {}", status, url, e);
                format!("<unreadable body: {}>", e)
            }
        };

        Ok(match wait {
            Some(wait) => RequestOutcome::RateLimited {
                wait,
                status: status.as_u16(),
                body,
            },
            None => RequestOutcome::Failed {
                status: status.as_u16(),
                body,
            },
        })
    }

    /// Time until the quota resets, if the headers say it is exhausted
    fn rate_limit_wait(&self, headers: &HeaderMap) -> Option<Duration> {
        let remaining = headers.get(RATE_LIMIT_REMAINING)?.to_str().ok()?;
        if remaining.trim() != "0" {
            return None;
        }

        let reset: i64 = headers.get(RATE_LIMIT_RESET)?.to_str().ok()?.trim().parse().ok()?;
        let wait = (reset - self.clock.now()).max(0);
        Some(Duration::from_secs(wait as u64))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    struct FixedClock(i64);

    #[async_trait]
    impl Clock for FixedClock {
        fn now(&self) -> i64 {
            self.0
        }

        async fn sleep(&self, _duration: Duration) {}
    }

    fn transport_at(now: i64) -> Transport {
        Transport::new(DEFAULT_TIMEOUT)
            .expect("Failed to build transport")
            .with_clock(Arc::new(FixedClock(now)))
    }

    fn headers(pairs: &[(&'static str, &str)]) -> HeaderMap {
        let mut map = HeaderMap::new();
        for (name, value) in pairs {
            map.insert(*name, HeaderValue::from_str(value).unwrap());
        }
        map
    }

    #[test]
    fn test_auth_headers_with_token() {
        let headers = auth_headers(Some("abc123")).unwrap();
        assert_eq!(headers.get(AUTHORIZATION).unwrap(), "token abc123");
        assert!(headers.get(AUTHORIZATION).unwrap().is_sensitive());
    }

    #[test]
    fn test_auth_headers_without_token() {
        assert!(auth_headers(None).unwrap().is_empty());
    }

    #[test]
    fn test_auth_headers_reject_token_with_newline() {
        let err = auth_headers(Some("abc\ndef")).unwrap_err();
        assert!(matches!(err, FetchError::InvalidToken { .. }));
        assert!(err.url().is_none());
    }

    #[test]
    fn test_rate_limit_wait_from_reset_header() {
        let transport = transport_at(1_000);
        let map = headers(&[(RATE_LIMIT_REMAINING, "0"), (RATE_LIMIT_RESET, "1003")]);
        assert_eq!(transport.rate_limit_wait(&map), Some(Duration::from_secs(3)));
    }

    #[test]
    fn test_rate_limit_wait_requires_exhausted_quota() {
        let transport = transport_at(1_000);
        let map = headers(&[(RATE_LIMIT_REMAINING, "12"), (RATE_LIMIT_RESET, "1003")]);
        assert_eq!(transport.rate_limit_wait(&map), None);
    }

    #[test]
    fn test_rate_limit_wait_requires_parseable_reset() {
        let transport = transport_at(1_000);
        assert_eq!(
            transport.rate_limit_wait(&headers(&[(RATE_LIMIT_REMAINING, "0")])),
            None
        );
        let map = headers(&[(RATE_LIMIT_REMAINING, "0"), (RATE_LIMIT_RESET, "soon")]);
        assert_eq!(transport.rate_limit_wait(&map), None);
    }

    #[test]
    fn test_rate_limit_wait_in_the_past_is_zero() {
        let transport = transport_at(2_000);
        let map = headers(&[(RATE_LIMIT_REMAINING, "0"), (RATE_LIMIT_RESET, "1000")]);
        assert_eq!(transport.rate_limit_wait(&map), Some(Duration::ZERO));
    }

    /// Serve one response whose body is shorter than its Content-Length
    fn truncated_response_server() -> String {
        use std::io::{Read, Write};

        let listener = std::net::TcpListener::bind("127.0.0.1:0").unwrap();
        let addr = listener.local_addr().unwrap();
        std::thread::spawn(move || {
            if let Ok((mut stream, _)) = listener.accept() {
                let mut request = [0u8; 1024];
                let _ = stream.read(&mut request);
                let _ = stream.write_all(
                    b"HTTP/1.1 502 Bad Gateway\r\nContent-Length: 100\r\n\r\npartial",
                );
            }
        });
        format!("http://{}/repos/o/r", addr)
    }

    #[tokio::test]
    async fn test_unreadable_error_body_is_reported() {
        let url = truncated_response_server();
        let err = transport_at(0)
            .get(&url, &HeaderMap::new())
            .await
            .unwrap_err();

        match err {
            FetchError::Http { status, body, .. } => {
                assert_eq!(status, 502);
                assert!(body.starts_with("<unreadable body"), "body was {:?}", body);
            }
            other => panic!("unexpected error: {:?}", other),
        }
    }

    #[test]
    fn test_max_attempts_is_at_least_one() {
        let transport = transport_at(0).with_max_attempts(0);
        assert_eq!(transport.max_attempts(), 1);
    }
}
