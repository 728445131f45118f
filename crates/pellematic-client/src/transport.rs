//! Async HTTP transport with escalating timeouts

use reqwest::StatusCode;
use std::time::Duration;
use tracing::{debug, trace, warn};

use crate::query::ClientError;

/// Per-attempt timeouts; the controller is slow to answer while busy
pub const DEFAULT_TIMEOUTS: [Duration; 2] = [Duration::from_secs(6), Duration::from_secs(12)];

/// GET-only HTTP transport for the controller
pub struct HttpTransport {
    client: reqwest::Client,
    timeouts: Vec<Duration>,
}

impl HttpTransport {
    /// Create a transport with the default 6 s / 12 s schedule
    pub fn new() -> Result<Self, ClientError> {
        Self::with_timeouts(DEFAULT_TIMEOUTS.to_vec())
    }

    /// Create a transport with a custom timeout schedule, one attempt per entry
    pub fn with_timeouts(timeouts: Vec<Duration>) -> Result<Self, ClientError> {
        let client = reqwest::Client::builder().build()?;
        let timeouts = if timeouts.is_empty() {
            DEFAULT_TIMEOUTS.to_vec()
        } else {
            timeouts
        };
        Ok(Self { client, timeouts })
    }

    pub fn attempts(&self) -> usize {
        self.timeouts.len()
    }

    /// Fetch a URL, retrying connect failures and timeouts
    ///
    /// Non-success status codes are returned immediately; only transport
    /// failures move on to the next, longer timeout.
    pub async fn get(&self, url: &str) -> Result<Vec<u8>, ClientError> {
        let mut last_error = String::new();

        for (attempt, timeout) in self.timeouts.iter().enumerate() {
            trace!(
                url = %redact(url),
                attempt = attempt + 1,
                timeout_ms = timeout.as_millis() as u64,
                "Sending request"
            );

            match self.attempt(url, *timeout).await {
                Ok((status, body)) if status.is_success() => {
                    debug!(url = %redact(url), bytes = body.len(), "Received response");
                    return Ok(body);
                }
                Ok((status, _)) => {
                    return Err(ClientError::Status {
                        status: status.as_u16(),
                        url: redact(url),
                    });
                }
                Err(e) if is_retryable(&e) => {
                    warn!(
                        url = %redact(url),
                        attempt = attempt + 1,
                        of = self.timeouts.len(),
                        error = %e,
                        "Request failed, retrying"
                    );
                    last_error = e.to_string();
                }
                Err(e) => return Err(ClientError::Http(e)),
            }
        }

        Err(ClientError::Exhausted {
            attempts: self.timeouts.len(),
            last: last_error,
        })
    }

    async fn attempt(
        &self,
        url: &str,
        timeout: Duration,
    ) -> Result<(StatusCode, Vec<u8>), reqwest::Error> {
        let response = self.client.get(url).timeout(timeout).send().await?;
        let status = response.status();
        let body = response.bytes().await?;
        Ok((status, body.to_vec()))
    }
}

fn is_retryable(error: &reqwest::Error) -> bool {
    error.is_timeout() || error.is_connect()
}

/// Strip the path (which carries the device password) from a URL for logging
pub fn redact(url: &str) -> String {
    let Some((scheme, rest)) = url.split_once("://") else {
        return "<invalid url>".to_string();
    };
    let host = rest.split('/').next().unwrap_or_default();
    format!("{}://{}/***", scheme, host)
}
