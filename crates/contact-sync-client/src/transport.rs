use std::time::Duration;

use contact_sync_core::error::AppError;
use contact_sync_core::retry::RetryPolicy;
use reqwest::{Client, Request, RequestBuilder, Response};

const DEFAULT_TIMEOUT: Duration = Duration::from_secs(30);
const USER_AGENT: &str = concat!("contact-sync/", env!("CARGO_PKG_VERSION"));

/// HTTP transport that retries transient failures per a [`RetryPolicy`].
///
/// Retries forcelisted statuses and transport failures for idempotent
/// methods. Other methods are only retried when the connection itself
/// failed. Any other non-success status is returned immediately as
/// [`AppError::HttpStatus`].
#[derive(Clone)]
pub struct RetryingTransport {
    client: Client,
    policy: RetryPolicy,
    timeout_secs: u64,
}

impl RetryingTransport {
    pub fn new(policy: RetryPolicy) -> Result<Self, AppError> {
        Self::with_timeout(policy, DEFAULT_TIMEOUT)
    }

    pub fn with_timeout(policy: RetryPolicy, timeout: Duration) -> Result<Self, AppError> {
        let client = Client::builder()
            .user_agent(USER_AGENT)
            .timeout(timeout)
            .build()
            .map_err(|e| AppError::ConfigError(format!("Failed to build HTTP client: {e}")))?;

        Ok(Self {
            client,
            policy,
            timeout_secs: timeout.as_secs(),
        })
    }

    pub fn client(&self) -> &Client {
        &self.client
    }

    /// Build and execute a request.
    pub async fn send(&self, builder: RequestBuilder) -> Result<Response, AppError> {
        let request = builder
            .build()
            .map_err(|e| AppError::Generic(format!("Invalid request: {e}")))?;
        self.execute(request).await
    }

    /// Execute a request, retrying on forcelisted statuses and transport errors.
    pub async fn execute(&self, request: Request) -> Result<Response, AppError> {
        let url = request.url().to_string();
        let attempts = self.policy.max_attempts();
        let replayable = self.policy.allows_method(request.method().as_str());
        let mut last_error = String::new();

        for attempt in 1..=attempts {
            if attempt > 1 {
                let delay = self.policy.delay_for_retry(attempt - 1);
                tracing::warn!(%url, attempt, delay_ms = delay.as_millis() as u64, error = %last_error, "Retrying request");
                tokio::time::sleep(delay).await;
            }

            let Some(outgoing) = request.try_clone() else {
                return Err(AppError::Generic(format!(
                    "Request body for {url} cannot be replayed"
                )));
            };

            match self.client.execute(outgoing).await {
                Ok(response) => {
                    let status = response.status();
                    if status.is_success() {
                        return Ok(response);
                    }
                    let code = status.as_u16();
                    if !replayable || !self.policy.should_retry_status(code) {
                        return Err(AppError::HttpStatus { status: code, url });
                    }
                    last_error = format!("HTTP {code}");
                }
                Err(e) => {
                    let unsent = e.is_connect();
                    let error = map_reqwest_error(e, self.timeout_secs);
                    if !error.is_retryable() || !(replayable || unsent) {
                        return Err(error);
                    }
                    last_error = error.to_string();
                }
            }
        }

        Err(AppError::RetriesExhausted {
            url,
            attempts,
            last_error,
        })
    }
}

/// Map a reqwest send failure onto the error taxonomy.
pub(crate) fn map_reqwest_error(e: reqwest::Error, timeout_secs: u64) -> AppError {
    if e.is_timeout() {
        AppError::Timeout(timeout_secs)
    } else if e.is_connect() {
        AppError::NetworkError(format!("Connection failed: {e}"))
    } else if e.is_builder() {
        AppError::Generic(format!("Invalid request: {e}"))
    } else {
        AppError::NetworkError(e.to_string())
    }
}

/// Read a JSON body, reporting decode failures as invalid responses.
pub(crate) async fn read_json<T: serde::de::DeserializeOwned>(
    response: Response,
) -> Result<T, AppError> {
    let url = response.url().to_string();
    response
        .json()
        .await
        .map_err(|e| AppError::InvalidResponse(format!("Failed to decode body from {url}: {e}")))
}

/// Read a text body.
pub(crate) async fn read_text(response: Response) -> Result<String, AppError> {
    let url = response.url().to_string();
    response
        .text()
        .await
        .map_err(|e| AppError::InvalidResponse(format!("Failed to read body from {url}: {e}")))
}
