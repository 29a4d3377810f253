use anyhow::Result;
use log::{info, warn};
use reqwest::{Client, Response, StatusCode};
use serde::{Deserialize, Serialize};
use std::time::Duration as StdDuration;
use tokio::time::sleep;

/// HTTP-related error types and retry logic utilities
#[derive(Debug)]
pub struct RetryableError {
    pub error: anyhow::Error,
    pub is_retryable: bool,
    pub backoff_ms: u64,
}

impl RetryableError {
    pub fn new(error: anyhow::Error, is_retryable: bool, backoff_ms: u64) -> Self {
        Self {
            error,
            is_retryable,
            backoff_ms,
        }
    }

    /// Create a retryable error based on HTTP status code
    pub fn from_http_status(
        status: StatusCode,
        error: anyhow::Error,
        attempt: u32,
        config: &RetryConfig,
    ) -> Self {
        let is_retryable = is_retryable_status(status);
        let backoff_ms = if is_retryable {
            calculate_backoff(attempt, config.initial_backoff_ms, config.backoff_multiplier)
        } else {
            0
        };

        Self::new(error, is_retryable, backoff_ms)
    }

    /// Create a retryable error from a non-success response, consuming its body
    pub async fn from_response(response: Response, attempt: u32, config: &RetryConfig) -> Self {
        let status = response.status();
        let body = response
            .text()
            .await
            .unwrap_or_else(|_| "Failed to read response body".to_string());

        let error = anyhow::anyhow!(format_http_error(status, &body));
        Self::from_http_status(status, error, attempt, config)
    }

    /// Create a retryable error from a transport failure
    pub fn from_network_error(error: reqwest::Error, attempt: u32, config: &RetryConfig) -> Self {
        if is_retryable_network_error(&error) {
            let backoff = calculate_backoff(
                attempt,
                config.initial_backoff_ms,
                config.backoff_multiplier,
            );
            Self::new(anyhow::anyhow!(error), true, backoff)
        } else {
            Self::new(anyhow::anyhow!(error), false, 0)
        }
    }
}

/// Retry and timeout policy shared by the HTTP fetch and the warehouse calls.
///
/// `max_attempts` counts the first try, so `1` disables retrying.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct RetryConfig {
    pub max_attempts: u32,
    pub initial_backoff_ms: u64,
    pub backoff_multiplier: u64,
    pub timeout_seconds: u64,
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            max_attempts: 5,
            initial_backoff_ms: 1000,
            backoff_multiplier: 2,
            timeout_seconds: 30,
        }
    }
}

impl RetryConfig {
    /// Single attempt, no waiting. Handy for tests and one-shot tools.
    pub fn no_retry() -> Self {
        Self {
            max_attempts: 1,
            initial_backoff_ms: 0,
            ..Self::default()
        }
    }
}

/// HTTP client with built-in retry logic
pub struct HttpClient {
    client: Client,
    retry_config: RetryConfig,
}

impl HttpClient {
    /// Create a new HTTP client with custom retry configuration
    pub fn with_config(retry_config: RetryConfig) -> Result<Self> {
        let client = Client::builder()
            .timeout(StdDuration::from_secs(retry_config.timeout_seconds))
            .user_agent(concat!("price-etl/", env!("CARGO_PKG_VERSION")))
            .build()?;

        Ok(Self {
            client,
            retry_config,
        })
    }

    /// Get the underlying reqwest client
    pub fn client(&self) -> &Client {
        &self.client
    }

    /// Execute an HTTP request with automatic retry logic.
    ///
    /// Returns the first 2xx response. Non-retryable statuses and transport
    /// errors fail immediately; retryable ones back off exponentially until
    /// `max_attempts` is reached.
    pub async fn execute_with_retry<F, Fut>(
        &self,
        operation_name: &str,
        request_fn: F,
    ) -> Result<Response>
    where
        F: Fn() -> Fut,
        Fut: std::future::Future<Output = Result<Response, reqwest::Error>>,
    {
        let max_attempts = self.retry_config.max_attempts.max(1);
        let mut attempt = 0;

        loop {
            attempt += 1;

            let retryable_error = match request_fn().await {
                Ok(response) if response.status().is_success() => {
                    if attempt > 1 {
                        info!(
                            "{} succeeded after {} retries",
                            operation_name,
                            attempt - 1
                        );
                    }
                    return Ok(response);
                }
                Ok(response) => {
                    RetryableError::from_response(response, attempt, &self.retry_config).await
                }
                Err(e) => RetryableError::from_network_error(e, attempt, &self.retry_config),
            };

            if !retryable_error.is_retryable {
                return Err(anyhow::anyhow!(
                    "{} failed (attempt {}/{}): {}",
                    operation_name,
                    attempt,
                    max_attempts,
                    retryable_error.error
                ));
            }

            if attempt >= max_attempts {
                return Err(anyhow::anyhow!(
                    "Max retries exceeded for {} (attempt {}/{}): {}",
                    operation_name,
                    attempt,
                    max_attempts,
                    retryable_error.error
                ));
            }

            warn!(
                "{} failed (attempt {}/{}), retrying in {}ms: {}",
                operation_name,
                attempt,
                max_attempts,
                retryable_error.backoff_ms,
                retryable_error.error
            );

            sleep(StdDuration::from_millis(retryable_error.backoff_ms)).await;
        }
    }
}

/// Check if an HTTP status code is retryable
pub fn is_retryable_status(status: StatusCode) -> bool {
    matches!(
        status,
        StatusCode::TOO_MANY_REQUESTS
            | StatusCode::INTERNAL_SERVER_ERROR
            | StatusCode::BAD_GATEWAY
            | StatusCode::SERVICE_UNAVAILABLE
            | StatusCode::GATEWAY_TIMEOUT
            | StatusCode::REQUEST_TIMEOUT
    )
}

/// Check if a network error is retryable
pub fn is_retryable_network_error(error: &reqwest::Error) -> bool {
    error.is_timeout() || error.is_connect()
}

/// Calculate exponential backoff delay
pub fn calculate_backoff(attempt: u32, initial_backoff: u64, multiplier: u64) -> u64 {
    initial_backoff.saturating_mul(multiplier.saturating_pow(attempt.saturating_sub(1)))
}

/// Format HTTP error message with status code
pub fn format_http_error(status: StatusCode, body: &str) -> String {
    format!("HTTP {} error: {}", status.as_u16(), body)
}
