use std::time::Duration;

use async_trait::async_trait;
use serde::Serialize;

use crate::error::Result;
use crate::sink::{OccupancyEvent, OverflowReport, ReportSink, TelemetrySink};

const DEFAULT_SINK_TIMEOUT: Duration = Duration::from_secs(2);

/// POSTs JSON bodies to a fixed URL.
#[derive(Debug, Clone)]
struct JsonPoster {
    client: reqwest::Client,
    endpoint: String,
}

impl JsonPoster {
    fn new(endpoint: &str) -> Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(DEFAULT_SINK_TIMEOUT)
            .build()?;
        Ok(Self {
            client,
            endpoint: endpoint.to_string(),
        })
    }

    async fn post<T: Serialize + ?Sized>(&self, body: &T) -> Result<reqwest::StatusCode> {
        let response = self
            .client
            .post(&self.endpoint)
            .json(body)
            .send()
            .await?
            .error_for_status()?;
        Ok(response.status())
    }
}

/// Publishes occupancy events to an HTTP collector.
#[derive(Debug, Clone)]
pub struct HttpTelemetrySink {
    poster: JsonPoster,
}

impl HttpTelemetrySink {
    pub fn new(endpoint: &str) -> Result<Self> {
        Ok(Self {
            poster: JsonPoster::new(endpoint)?,
        })
    }
}

#[async_trait]
impl TelemetrySink for HttpTelemetrySink {
    async fn publish(&self, event: OccupancyEvent) {
        match self.poster.post(&event).await {
            Ok(_) => tracing::debug!(
                endpoint = %self.poster.endpoint,
                available_space = event.available_space,
                "Occupancy event published"
            ),
            Err(e) => tracing::warn!(
                endpoint = %self.poster.endpoint,
                error = %e,
                "Failed to publish occupancy event"
            ),
        }
    }
}

/// Sends overflow reports to the upstream user service.
#[derive(Debug, Clone)]
pub struct HttpReportSink {
    poster: JsonPoster,
}

impl HttpReportSink {
    pub fn new(endpoint: &str) -> Result<Self> {
        Ok(Self {
            poster: JsonPoster::new(endpoint)?,
        })
    }
}

#[async_trait]
impl ReportSink for HttpReportSink {
    async fn report(&self, report: OverflowReport) {
        match self.poster.post(&report).await {
            Ok(status) => tracing::info!(
                endpoint = %self.poster.endpoint,
                status = %status,
                source_id = report.test_req.source_id,
                test_number = report.test_req.test_number,
                "Overflow report sent"
            ),
            Err(e) => tracing::warn!(
                endpoint = %self.poster.endpoint,
                error = %e,
                "Failed to send overflow report"
            ),
        }
    }
}
