//! CMS publish API client.
//!
//! Thin HTTP wrapper with the retry policy the pipeline relies on:
//! transient failures (timeout, connect, 429, 5xx) retry with exponential
//! backoff up to a bounded count; authentication and field-rejection
//! responses fail immediately and are never retried.

use std::time::Duration;

use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use draftline_shared::{CmsConfig, DraftlineError, Result};

/// User-Agent string for CMS requests.
const USER_AGENT: &str = concat!("Draftline/", env!("CARGO_PKG_VERSION"));

/// SEO meta fields carried on the post payload.
#[derive(Debug, Clone, Default, Serialize)]
pub struct SeoMeta {
    pub title: String,
    pub description: String,
    pub focus_keyword: String,
}

/// Post payload for create and update calls.
#[derive(Debug, Clone, Serialize)]
pub struct PostPayload {
    pub title: String,
    pub slug: String,
    pub content: String,
    pub category: String,
    pub tags: Vec<String>,
    pub schema_types: Vec<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub featured_image: Option<String>,
    pub seo: SeoMeta,
}

/// Remote post reference returned by the CMS.
#[derive(Debug, Clone, Deserialize)]
pub struct RemotePost {
    pub id: i64,
    pub link: String,
}

/// HTTP client for the CMS publish API.
pub struct CmsClient {
    client: reqwest::Client,
    base_url: String,
    username: String,
    app_password: String,
    max_retries: u32,
    backoff_ms: u64,
}

impl CmsClient {
    /// Build a client from config plus the resolved app password.
    pub fn from_config(config: &CmsConfig, app_password: &str) -> Result<Self> {
        let client = reqwest::Client::builder()
            .user_agent(USER_AGENT)
            .timeout(Duration::from_secs(config.timeout_secs))
            .build()
            .map_err(|e| DraftlineError::Transient(format!("client build: {e}")))?;

        Ok(Self {
            client,
            base_url: config.base_url.trim_end_matches('/').to_string(),
            username: config.username.clone(),
            app_password: app_password.to_string(),
            max_retries: config.max_retries,
            backoff_ms: config.backoff_ms,
        })
    }

    /// Create a new remote post.
    pub async fn create_post(&self, payload: &PostPayload) -> Result<RemotePost> {
        let url = format!("{}/api/posts", self.base_url);
        self.send_json(&url, payload).await
    }

    /// Update an existing remote post in place, preserving its identifier.
    pub async fn update_post(&self, remote_id: i64, payload: &PostPayload) -> Result<RemotePost> {
        let url = format!("{}/api/posts/{remote_id}", self.base_url);
        self.send_json(&url, payload).await
    }

    /// POST a JSON payload with retry/backoff, classifying failures.
    async fn send_json(&self, url: &str, payload: &PostPayload) -> Result<RemotePost> {
        let mut last_err = DraftlineError::Transient("no attempt made".into());

        for attempt in 0..=self.max_retries {
            if attempt > 0 {
                let wait = Duration::from_millis(self.backoff_ms * (1 << (attempt - 1)));
                warn!(url, attempt, wait_ms = wait.as_millis() as u64, "retrying CMS call");
                tokio::time::sleep(wait).await;
            }

            let result = self
                .client
                .post(url)
                .basic_auth(&self.username, Some(&self.app_password))
                .json(payload)
                .send()
                .await;

            let response = match result {
                Ok(r) => r,
                Err(e) => {
                    // Timeouts and connection errors are transient.
                    last_err = DraftlineError::Transient(format!("{url}: {e}"));
                    continue;
                }
            };

            let status = response.status();
            debug!(url, status = status.as_u16(), attempt, "CMS response");

            match status.as_u16() {
                200 | 201 => {
                    return response
                        .json::<RemotePost>()
                        .await
                        .map_err(|e| DraftlineError::parse(format!("CMS response: {e}")));
                }
                401 | 403 => {
                    let body = response.text().await.unwrap_or_default();
                    return Err(DraftlineError::Auth(format!("HTTP {status}: {body}")));
                }
                400 | 422 => {
                    let body = response.text().await.unwrap_or_default();
                    return Err(DraftlineError::FieldRejected(format!(
                        "HTTP {status}: {body}"
                    )));
                }
                429 | 500..=599 => {
                    last_err = DraftlineError::Transient(format!("{url}: HTTP {status}"));
                    continue;
                }
                other => {
                    last_err =
                        DraftlineError::Transient(format!("{url}: unexpected HTTP {other}"));
                    continue;
                }
            }
        }

        Err(last_err)
    }
}
