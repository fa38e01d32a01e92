//! Relief-coordination server client
//!
//! Wraps `reqwest::Client` with bearer authentication, base URL handling and
//! the mapping from HTTP outcomes to [`RemoteError`]:
//!
//! | Outcome                    | Error                              |
//! |----------------------------|------------------------------------|
//! | 401                        | `ExpiredToken`                     |
//! | 429 after retries, 5xx, 4xx| `Server { status, message }`       |
//! | connect / timeout / reset  | `Network`                          |
//! | body does not parse        | `Decode`                           |

use std::time::Duration;

use reqwest::{Client, RequestBuilder, StatusCode};
use serde::de::DeserializeOwned;
use tracing::{debug, info, warn};

use reliefsync_core::ports::RemoteError;

/// Wait used when a 429 response carries no usable `Retry-After`
const DEFAULT_RETRY_AFTER: Duration = Duration::from_secs(5);

/// Longest `Retry-After` honored before giving up on the request
const MAX_RETRY_AFTER: Duration = Duration::from_secs(60);

const DEFAULT_MAX_RETRIES: u32 = 2;

const REQUEST_TIMEOUT: Duration = Duration::from_secs(60);

/// Longest error body kept in [`RemoteError::Server`] messages
const MAX_ERROR_BODY: usize = 512;

pub struct ApiClient {
    client: Client,
    base_url: String,
    access_token: Option<String>,
    max_retries: u32,
}

impl ApiClient {
    /// Creates a client for the server at `base_url`
    ///
    /// Requests carry `Authorization: Bearer <token>` when a token is set.
    pub fn new(base_url: impl Into<String>, access_token: Option<String>) -> Self {
        let client = Client::builder()
            .timeout(REQUEST_TIMEOUT)
            .build()
            .unwrap_or_else(|e| {
                warn!(error = %e, "Falling back to default HTTP client");
                Client::new()
            });

        Self {
            client,
            base_url: base_url.into().trim_end_matches('/').to_string(),
            access_token,
            max_retries: DEFAULT_MAX_RETRIES,
        }
    }

    /// Sets how many times a 429 response is retried
    pub fn with_max_retries(mut self, max_retries: u32) -> Self {
        self.max_retries = max_retries;
        self
    }

    /// Updates the access token (e.g., after the user signs in again)
    pub fn set_access_token(&mut self, token: impl Into<String>) {
        self.access_token = Some(token.into());
        debug!("Updated API access token");
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    /// Authenticated GET request for `path` relative to the base URL
    pub fn get(&self, path: &str) -> RequestBuilder {
        let request = self.client.get(format!("{}{}", self.base_url, path));
        match &self.access_token {
            Some(token) => request.bearer_auth(token),
            None => request,
        }
    }

    /// GET `path` with `query` and decode the JSON body
    pub async fn get_json<T: DeserializeOwned>(
        &self,
        path: &str,
        query: &[(&str, String)],
    ) -> Result<T, RemoteError> {
        let mut attempt = 0u32;
        loop {
            debug!(path, attempt, "GET");
            let response = self
                .get(path)
                .query(query)
                .send()
                .await
                .map_err(transport_error)?;

            let status = response.status();

            if status == StatusCode::TOO_MANY_REQUESTS && attempt < self.max_retries {
                let retry_after = response
                    .headers()
                    .get(reqwest::header::RETRY_AFTER)
                    .and_then(|v| v.to_str().ok())
                    .map(parse_retry_after)
                    .unwrap_or(DEFAULT_RETRY_AFTER);

                if retry_after <= MAX_RETRY_AFTER {
                    info!(
                        path,
                        attempt,
                        retry_after_ms = retry_after.as_millis() as u64,
                        "Received 429, backing off"
                    );
                    tokio::time::sleep(retry_after).await;
                    attempt += 1;
                    continue;
                }
            }

            if status == StatusCode::UNAUTHORIZED {
                return Err(RemoteError::ExpiredToken);
            }

            if !status.is_success() {
                let body = response.text().await.unwrap_or_default();
                let message = truncate(body.trim(), MAX_ERROR_BODY);
                warn!(path, status = status.as_u16(), "Request failed");
                return Err(RemoteError::Server {
                    status: status.as_u16(),
                    message,
                });
            }

            let bytes = response.bytes().await.map_err(transport_error)?;
            return serde_json::from_slice(&bytes)
                .map_err(|e| RemoteError::Decode(format!("GET {path}: {e}")));
        }
    }
}

fn transport_error(e: reqwest::Error) -> RemoteError {
    if e.is_decode() {
        RemoteError::Decode(e.to_string())
    } else {
        RemoteError::Network(e.to_string())
    }
}

/// Seconds form only; anything else uses the default wait
fn parse_retry_after(value: &str) -> Duration {
    value
        .trim()
        .parse::<u64>()
        .map(Duration::from_secs)
        .unwrap_or(DEFAULT_RETRY_AFTER)
}

fn truncate(text: &str, max: usize) -> String {
    match text.char_indices().nth(max) {
        Some((end, _)) => format!("{}…", &text[..end]),
        None => text.to_string(),
    }
}
