//! REST client for the user directory.

use std::future::Future;
use std::time::Duration;

use async_trait::async_trait;
use backoff::{backoff::Backoff, ExponentialBackoffBuilder};
use reqwest::{Client, Url};
use serde::Serialize;
use tracing::{debug, info, warn};

use notifier_types::{DirectorySettings, User, UserId};

use crate::{DirectoryError, UserDirectory};

/// Configuration for the HTTP directory client.
#[derive(Debug, Clone)]
pub struct HttpDirectoryConfig {
    /// Base URL of the directory (e.g., "https://localhost:7013")
    pub base_url: String,

    /// Per-request timeout
    pub timeout: Duration,

    /// Retries after the first attempt for retryable failures
    pub max_retries: u32,

    /// First backoff delay; later delays grow exponentially
    pub initial_backoff: Duration,
}

impl HttpDirectoryConfig {
    pub fn new(base_url: impl Into<String>) -> Self {
        Self {
            base_url: base_url.into(),
            timeout: Duration::from_secs(30),
            max_retries: 2,
            initial_backoff: Duration::from_millis(500),
        }
    }

    pub fn from_settings(settings: &DirectorySettings) -> Self {
        Self {
            timeout: Duration::from_secs(settings.timeout_secs),
            max_retries: settings.max_retries,
            ..Self::new(settings.base_url.clone())
        }
    }
}

/// Acknowledgment body sent with `mark-email-sent`.
#[derive(Debug, Serialize)]
struct MarkEmailedRequest {
    emailed: bool,
}

/// Directory client speaking the `/api/User` REST contract.
pub struct HttpUserDirectory {
    client: Client,
    base_url: Url,
    config: HttpDirectoryConfig,
}

impl HttpUserDirectory {
    pub fn new(config: HttpDirectoryConfig) -> Result<Self, DirectoryError> {
        let base_url = Url::parse(&config.base_url)
            .map_err(|e| DirectoryError::Config(format!("'{}': {}", config.base_url, e)))?;
        if base_url.cannot_be_a_base() {
            return Err(DirectoryError::Config(format!(
                "'{}' cannot be used as a base URL",
                config.base_url
            )));
        }

        let client = Client::builder()
            .timeout(config.timeout)
            .build()
            .map_err(|e| DirectoryError::Config(e.to_string()))?;

        Ok(Self {
            client,
            base_url,
            config,
        })
    }

    fn endpoint(&self, segments: &[&str]) -> Url {
        let mut url = self.base_url.clone();
        // cannot_be_a_base was rejected in new()
        if let Ok(mut path) = url.path_segments_mut() {
            path.pop_if_empty().extend(segments);
        }
        url
    }

    fn users_url(&self) -> Url {
        self.endpoint(&["api", "User"])
    }

    fn mark_emailed_url(&self, id: &UserId) -> Url {
        self.endpoint(&["api", "User", id.as_str(), "mark-email-sent"])
    }

    /// Run `request` until it succeeds, fails permanently, or retries run out.
    async fn with_retry<T, F, Fut>(&self, operation: &str, mut request: F) -> Result<T, DirectoryError>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = Result<T, DirectoryError>>,
    {
        let mut backoff = ExponentialBackoffBuilder::new()
            .with_initial_interval(self.config.initial_backoff)
            .with_max_elapsed_time(
                self.config
                    .timeout
                    .checked_mul(self.config.max_retries.saturating_add(1)),
            )
            .build();

        let mut attempts: u32 = 0;

        loop {
            attempts = attempts.saturating_add(1);
            debug!(operation, attempt = attempts, "Calling user directory");

            match request().await {
                Ok(value) => return Ok(value),
                Err(e) if !e.is_retryable() || attempts > self.config.max_retries => {
                    return Err(e);
                }
                Err(e) => match backoff.next_backoff() {
                    Some(delay) => {
                        warn!(
                            operation,
                            error = %e,
                            retry_in_ms = delay.as_millis(),
                            "Directory call failed, retrying"
                        );
                        tokio::time::sleep(delay).await;
                    }
                    None => return Err(e),
                },
            }
        }
    }

    async fn fetch_users(&self) -> Result<Vec<User>, DirectoryError> {
        let response = self
            .client
            .get(self.users_url())
            .send()
            .await
            .map_err(|e| DirectoryError::Unavailable(e.to_string()))?;

        let response = check_status(response).await?;

        response
            .json::<Vec<User>>()
            .await
            .map_err(|e| DirectoryError::InvalidResponse(e.to_string()))
    }

    async fn send_mark_emailed(&self, id: &UserId) -> Result<(), DirectoryError> {
        let response = self
            .client
            .put(self.mark_emailed_url(id))
            .json(&MarkEmailedRequest { emailed: true })
            .send()
            .await
            .map_err(|e| DirectoryError::Unavailable(e.to_string()))?;

        check_status(response).await.map(|_| ())
    }
}

async fn check_status(response: reqwest::Response) -> Result<reqwest::Response, DirectoryError> {
    let status = response.status();
    if status.is_success() {
        return Ok(response);
    }
    let body = response.text().await.unwrap_or_default();
    Err(DirectoryError::Status {
        status: status.as_u16(),
        body,
    })
}

#[async_trait]
impl UserDirectory for HttpUserDirectory {
    async fn list_users(&self) -> Result<Vec<User>, DirectoryError> {
        let users = self.with_retry("list_users", || self.fetch_users()).await?;
        info!(count = users.len(), "Fetched users from directory");
        Ok(users)
    }

    async fn mark_emailed(&self, id: &UserId) -> Result<(), DirectoryError> {
        self.with_retry("mark_emailed", || self.send_mark_emailed(id))
            .await?;
        debug!(user_id = %id, "Directory acknowledged email");
        Ok(())
    }
}
