use crate::api::{QueueStatusResponse, TestResponse};
use crate::error::{DispatcherError, Result};
use crate::scheduler::WorkItem;
use crate::sink::TestRequestBody;

/// HTTP client for a running dispatcher, used by the CLI subcommands.
#[derive(Debug, Clone)]
pub struct DispatcherClient {
    http: reqwest::Client,
    base_url: String,
}

impl DispatcherClient {
    pub fn new(base_url: &str) -> Self {
        Self {
            http: reqwest::Client::new(),
            base_url: base_url.trim_end_matches('/').to_string(),
        }
    }

    /// Submit `item` to `POST /test`.
    ///
    /// Rejections that carry a `{message, status}` body (400, 500, 502) are
    /// returned as a [`TestResponse`]. Any other non-success answer, such as
    /// a 408 from the request timeout, becomes
    /// [`DispatcherError::UnexpectedStatus`].
    pub async fn submit(&self, item: WorkItem) -> Result<TestResponse> {
        let response = self
            .http
            .post(format!("{}/test", self.base_url))
            .json(&TestRequestBody::from(item))
            .send()
            .await?;

        let status = response.status();
        let body = response.bytes().await?;

        if status.is_success() {
            return serde_json::from_slice(&body)
                .map_err(|e| DispatcherError::Decode(e.to_string()));
        }

        serde_json::from_slice(&body).map_err(|_| DispatcherError::UnexpectedStatus {
            status: status.as_u16(),
            body: String::from_utf8_lossy(&body).trim().to_string(),
        })
    }

    /// Fetch `GET /api/queue`.
    pub async fn queue_status(&self) -> Result<QueueStatusResponse> {
        let status = self
            .http
            .get(format!("{}/api/queue", self.base_url))
            .send()
            .await?
            .error_for_status()?
            .json()
            .await?;
        Ok(status)
    }
}
