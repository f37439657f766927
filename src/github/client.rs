// GitHub API HTTP client.
// Handles authentication, status mapping, and rate limit header tracking.

use std::sync::{Mutex, PoisonError};
use std::time::Duration;

use reqwest::{
    Client, Response, StatusCode,
    header::{ACCEPT, AUTHORIZATION, HeaderMap, HeaderValue, USER_AGENT},
};

use crate::error::{ChatError, Result};

use super::types::RateLimitSnapshot;

const GITHUB_API_BASE: &str = "https://api.github.com";
const GITHUB_API_VERSION: &str = "2022-11-28";

/// Authenticated GitHub client with rate limit header tracking.
pub struct GitHubClient {
    client: Client,
    rate_limit: Mutex<RateLimitSnapshot>,
}

impl GitHubClient {
    /// Create a new client with the given token.
    pub fn new(token: &str) -> Result<Self> {
        let mut headers = HeaderMap::new();

        headers.insert(
            AUTHORIZATION,
            HeaderValue::from_str(&format!("Bearer {}", token))
                .map_err(|e| ChatError::Other(e.to_string()))?,
        );
        headers.insert(
            ACCEPT,
            HeaderValue::from_static("application/vnd.github+json"),
        );
        headers.insert(
            "X-GitHub-Api-Version",
            HeaderValue::from_static(GITHUB_API_VERSION),
        );
        headers.insert(USER_AGENT, HeaderValue::from_static("bananachat"));

        let client = Client::builder()
            .default_headers(headers)
            .build()
            .map_err(ChatError::Network)?;

        Ok(Self {
            client,
            rate_limit: Mutex::new(RateLimitSnapshot::default()),
        })
    }

    /// Create a client from the GITHUB_TOKEN environment variable.
    pub fn from_env() -> Result<Self> {
        let token = std::env::var("GITHUB_TOKEN").map_err(|_| ChatError::MissingToken)?;
        Self::new(&token)
    }

    /// Last rate limit snapshot reported by the API.
    pub fn rate_limit(&self) -> RateLimitSnapshot {
        self.rate_limit
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    /// Make a GET request to an API endpoint path.
    pub async fn get(&self, endpoint: &str) -> Result<Response> {
        let url = format!("{}{}", GITHUB_API_BASE, endpoint);
        let response = self
            .client
            .get(&url)
            .send()
            .await
            .map_err(ChatError::Network)?;

        self.update_rate_limit(&response);
        self.check_response(response).await
    }

    /// Make a GET request with query parameters.
    pub async fn get_with_params<T: serde::Serialize + ?Sized>(
        &self,
        endpoint: &str,
        params: &T,
    ) -> Result<Response> {
        let url = format!("{}{}", GITHUB_API_BASE, endpoint);
        let response = self
            .client
            .get(&url)
            .query(params)
            .send()
            .await
            .map_err(ChatError::Network)?;

        self.update_rate_limit(&response);
        self.check_response(response).await
    }

    /// Make a GET request to an absolute URL (content downloads).
    pub async fn get_absolute(&self, url: &str) -> Result<Response> {
        let response = self
            .client
            .get(url)
            .send()
            .await
            .map_err(ChatError::Network)?;

        self.update_rate_limit(&response);
        self.check_response(response).await
    }

    /// Update the rate limit snapshot from response headers.
    fn update_rate_limit(&self, response: &Response) {
        let mut snapshot = self
            .rate_limit
            .lock()
            .unwrap_or_else(PoisonError::into_inner);

        if let Some(limit) = header_u64(response, "x-ratelimit-limit") {
            snapshot.limit = limit;
        }
        if let Some(remaining) = header_u64(response, "x-ratelimit-remaining") {
            snapshot.remaining = remaining;
        }
        if let Some(reset) = header_u64(response, "x-ratelimit-reset") {
            snapshot.reset = reset;
        }
    }

    /// Check response status and convert errors.
    async fn check_response(&self, response: Response) -> Result<Response> {
        match response.status() {
            StatusCode::OK | StatusCode::CREATED | StatusCode::ACCEPTED => Ok(response),
            StatusCode::UNAUTHORIZED => Err(ChatError::Unauthorized),
            StatusCode::NOT_FOUND => {
                let url = response.url().to_string();
                Err(ChatError::NotFound(url))
            }
            StatusCode::FORBIDDEN | StatusCode::TOO_MANY_REQUESTS => {
                let snapshot = self.rate_limit();
                if snapshot.remaining == 0 {
                    Err(ChatError::RateLimited {
                        retry_after: snapshot.retry_after(),
                    })
                } else {
                    Err(ChatError::Other(format!(
                        "forbidden: {}",
                        response.text().await.unwrap_or_default()
                    )))
                }
            }
            status => Err(ChatError::Other(format!(
                "HTTP {}: {}",
                status,
                response.text().await.unwrap_or_default()
            ))),
        }
    }
}

fn header_u64(response: &Response, name: &str) -> Option<u64> {
    response
        .headers()
        .get(name)
        .and_then(|v| v.to_str().ok())
        .and_then(|v| v.parse().ok())
}

impl RateLimitSnapshot {
    /// Wait until the reported reset time, clamped to zero when the reset
    /// epoch has already passed.
    pub fn retry_after(&self) -> Duration {
        let now = chrono::Utc::now().timestamp();
        Duration::from_secs((self.reset as i64).saturating_sub(now).max(0) as u64)
    }
}
