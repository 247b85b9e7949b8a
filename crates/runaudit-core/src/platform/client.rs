//! HTTP client for the platform runs API

use reqwest::Client;
use tracing::{debug, warn};
use url::Url;

use crate::config::PlatformConfig;
use crate::error::{Error, Result};
use crate::models::{AuditWindow, RunsPage};

use super::RunSource;

const RUNS_PATH: &str = "/api/v1/runs";
const ORG_HEADER: &str = "x-organization-id";

/// Runs API client with bounded timeouts and a fixed retry count
pub struct RunsClient {
    client: Client,
    runs_url: Url,
    auth_header: String,
    bearer: String,
    org_id: String,
    use_case_id: String,
    max_retries: u32,
}

impl RunsClient {
    /// Create a new runs client
    pub fn new(config: &PlatformConfig) -> Result<Self> {
        let client = Client::builder()
            .connect_timeout(config.connect_timeout)
            // reqwest 0.11 has no separate read timeout; bound the whole exchange
            .timeout(config.connect_timeout + config.read_timeout)
            .build()?;

        let runs_url = config
            .base_url
            .join(RUNS_PATH)
            .map_err(|e| Error::config(format!("invalid runs URL: {e}")))?;

        Ok(Self {
            client,
            runs_url,
            auth_header: config.auth_header.clone(),
            bearer: format!("Bearer {}", config.api_key),
            org_id: config.org_id.clone(),
            use_case_id: config.use_case_id.clone(),
            max_retries: config.max_retries,
        })
    }

    async fn fetch_once(&self, start: &str, limit: u32) -> Result<RunsPage> {
        let limit = limit.to_string();
        let response = self
            .client
            .get(self.runs_url.clone())
            .header(self.auth_header.as_str(), &self.bearer)
            .header(ORG_HEADER, &self.org_id)
            .query(&[
                ("limit", limit.as_str()),
                ("use_case_id", self.use_case_id.as_str()),
                ("start", start),
            ])
            .send()
            .await?;

        if !response.status().is_success() {
            let status = response.status();
            let body = response.text().await.unwrap_or_default();
            return Err(Error::UpstreamStatus {
                status: status.as_u16(),
                body,
            });
        }

        Ok(response.json::<RunsPage>().await?)
    }
}

#[async_trait::async_trait]
impl RunSource for RunsClient {
    async fn fetch_runs(&self, window: &AuditWindow, limit: u32) -> Result<RunsPage> {
        let start = window.start_param();
        let attempts = self.max_retries + 1;
        let mut attempt = 0;

        loop {
            attempt += 1;
            debug!(url = %self.runs_url, start = %start, limit, attempt, "Fetching runs");

            match self.fetch_once(&start, limit).await {
                Ok(page) => return Ok(page),
                Err(e) if e.is_retryable() && attempt < attempts => {
                    warn!(error = %e, attempt, max_attempts = attempts, "Runs fetch failed, retrying");
                }
                Err(e) => return Err(e),
            }
        }
    }
}
